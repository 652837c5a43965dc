#![forbid(unsafe_code)]

//! Disk-resident ordered index: bucket layout, navigation, mutation and bulk loading.

/// Bucket page format and in-place mutators.
pub mod page;

mod bound;
mod cursor;
mod head;
mod key;
mod key_cursor;
mod ordering;
mod stats;
mod tree;

pub use bound::SeekBound;
pub use cursor::{CursorRegistry, IndexCursor};
pub use head::{BucketDeletionNotification, CatalogHead, HeadManager, NoopDeletionNotification};
pub use key::{Fields, IndexKey, KeyBuilder, KeyRef};
pub(crate) use key_cursor::KeyCursor;
pub use ordering::{Direction, FieldOrder, KeyOrdering};
pub use stats::{BTreeStats, BTreeStatsSnapshot};
pub use tree::{
    BTree, BTreeBuilder, BTreeOptions, Located, Position, ValidateOptions, ValidationReport,
};

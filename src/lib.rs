//! Disk-resident ordered index over a transactional page store.
//!
//! Keys are composite byte-string fields compared under a per-field ascending or
//! descending mask; each entry maps a key to a record location. The tree lives in
//! fixed-size bucket pages reached through [`types::PageId`] handles, and every
//! mutation runs inside a caller-owned [`primitives::pager::WriteGuard`] that commits
//! or rolls back as a unit.
//!
//! ```
//! use sombra_index::storage::IndexConfig;
//! use sombra_index::storage::btree::{Direction, IndexKey};
//! use sombra_index::types::RecordLoc;
//!
//! # fn main() -> sombra_index::types::Result<()> {
//! let (pager, tree) = IndexConfig::default().open()?;
//! let mut write = pager.begin_write()?;
//! tree.insert(&mut write, &IndexKey::from_text("ada"), RecordLoc(7), false)?;
//! pager.commit(write)?;
//!
//! let read = pager.begin_read()?;
//! let hit = tree.locate(&read, &IndexKey::from_text("ada"), RecordLoc(7), Direction::Forward)?;
//! assert!(hit.found);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod primitives;
pub mod storage;
pub mod types;

#![forbid(unsafe_code)]
//! Core identifiers and the crate-wide error type.

use std::fmt;

/// Location handle for a bucket page. `PageId(0)` is reserved as the null handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct PageId(pub u64);

impl PageId {
    /// The null page handle, never handed out by a page store.
    pub const NULL: PageId = PageId(0);

    /// Returns `true` for the null handle.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Maps the null handle to `None`.
    pub fn non_null(self) -> Option<PageId> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    pub(crate) fn from_option(id: Option<PageId>) -> PageId {
        id.unwrap_or(PageId::NULL)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location handle of an indexed record.
///
/// Record locations break ties between equal keys, so `(key, RecordLoc)` pairs are
/// totally ordered. [`RecordLoc::MIN`] and [`RecordLoc::MAX`] bracket every real location
/// and are used to position before or after all entries sharing a key.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RecordLoc(pub u64);

impl RecordLoc {
    /// Sorts before every record location.
    pub const MIN: RecordLoc = RecordLoc(0);
    /// Sorts after every record location.
    pub const MAX: RecordLoc = RecordLoc(u64::MAX);
}

impl fmt::Display for RecordLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Errors surfaced by the index and its page store.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Insert rejected by a uniqueness constraint.
    #[error("duplicate key in index {index}: {key}")]
    DuplicateKey {
        /// Name of the index that rejected the key.
        index: String,
        /// Rendered key.
        key: String,
    },
    /// The exact `(key, record)` pair is already present.
    #[error("key/record pair already in index")]
    KeyAlreadyIndexed,
    /// Encoded key exceeds the per-bucket key maximum.
    #[error("key too large: {len} bytes (max {max})")]
    KeyTooLarge {
        /// Encoded key length.
        len: usize,
        /// Largest accepted encoded key length.
        max: usize,
    },
    /// Bulk builder received a key that sorts before the previous key.
    #[error("bad key order in btree builder")]
    KeyOutOfOrder,
    /// Bulk builder used after `commit`.
    #[error("btree builder already committed")]
    BuilderCommitted,
    /// Bulk load stopped by the caller's interrupt check between levels.
    #[error("btree builder interrupted")]
    Interrupted,
    /// `init_as_empty` called on a tree that already has a root.
    #[error("index already initialized")]
    AlreadyInitialized,
    /// Operation requires a root bucket but the index has none.
    #[error("index has no root bucket")]
    Uninitialized,
    /// Page handle does not resolve to a live page.
    #[error("page {0} not found")]
    PageNotFound(PageId),
    /// Page store exhausted.
    #[error("page store exhausted ({limit} pages)")]
    OutOfPages {
        /// Configured page limit.
        limit: u64,
    },
    /// Structural inconsistency detected.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Invalid argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

//! Ordered index storage.
//!
//! Hosts the bucket B-tree and the configuration used to open it over a page store.

/// Disk-resident B-tree index.
///
/// Buckets, navigation, mutation, bulk loading, validation and cursors.
pub mod btree;

mod options;

pub use options::{ConfigError, IndexConfig, LoggingConfig, DEFAULT_LOG_LEVEL};

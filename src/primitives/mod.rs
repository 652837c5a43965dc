//! Low-level primitives the index is built on.
//!
//! Includes byte encoders and the paging layer that stands in for the external
//! block store.

/// Byte-level encoders shared by the key codec.
pub mod bytes;

/// Transactional page store.
///
/// Hands out fixed-size pages by location handle and scopes every mutation in a
/// write guard that rolls back on drop.
pub mod pager;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{IndexError, Result};

/// Sort direction of one key field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrder {
    /// Smaller values first.
    Ascending,
    /// Larger values first.
    Descending,
}

/// Per-field ascending/descending mask for composite keys.
///
/// Fields past [`KeyOrdering::MAX_FIELDS`] always sort ascending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyOrdering {
    descending: u32,
}

impl KeyOrdering {
    /// Number of fields whose direction can be configured.
    pub const MAX_FIELDS: usize = 32;

    /// Every field ascending.
    pub const fn ascending() -> Self {
        Self { descending: 0 }
    }

    /// Builds an ordering from an explicit per-field list.
    pub fn from_fields(fields: &[FieldOrder]) -> Result<Self> {
        if fields.len() > Self::MAX_FIELDS {
            return Err(IndexError::Invalid("key ordering supports at most 32 fields"));
        }
        let mut ordering = Self::ascending();
        for (idx, order) in fields.iter().enumerate() {
            if *order == FieldOrder::Descending {
                ordering.descending |= 1 << idx;
            }
        }
        Ok(ordering)
    }

    /// Returns a copy with `field` sorted descending.
    pub fn with_descending(self, field: usize) -> Result<Self> {
        if field >= Self::MAX_FIELDS {
            return Err(IndexError::Invalid("key ordering supports at most 32 fields"));
        }
        Ok(Self {
            descending: self.descending | (1 << field),
        })
    }

    /// Returns `true` if `field` sorts descending.
    pub fn is_descending(&self, field: usize) -> bool {
        field < Self::MAX_FIELDS && self.descending & (1 << field) != 0
    }

    /// Applies the direction of `field` to a raw byte comparison.
    #[inline]
    pub fn apply(&self, field: usize, raw: Ordering) -> Ordering {
        if self.is_descending(field) {
            raw.reverse()
        } else {
            raw
        }
    }
}

/// Scan direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Toward larger entries.
    Forward,
    /// Toward smaller entries.
    Backward,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    /// Comparison result that places a key before the scan start in this direction.
    pub(crate) fn behind(self) -> Ordering {
        match self {
            Direction::Forward => Ordering::Less,
            Direction::Backward => Ordering::Greater,
        }
    }
}

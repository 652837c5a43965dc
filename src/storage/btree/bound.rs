use std::cmp::Ordering;

use smallvec::SmallVec;

use super::{Direction, IndexKey, KeyOrdering, KeyRef};

/// Composite seek target used by range scans.
///
/// The first `prefix` fields must match exactly. When `after_prefix` is set, every key
/// sharing the prefix counts as behind the target, so a seek lands past the whole
/// prefix group. Otherwise each following field is compared against its bound; an
/// exclusive bound treats an equal field as behind the target. Fields without a bound
/// match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeekBound {
    prefix: SmallVec<[Vec<u8>; 4]>,
    after_prefix: bool,
    suffix: SmallVec<[(Vec<u8>, bool); 4]>,
}

impl SeekBound {
    /// A bound with no constraints; matches every key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound positioned at `key`, including or excluding entries equal to it.
    pub fn at_key(key: &IndexKey, inclusive: bool) -> Self {
        let mut bound = Self::new();
        let count = key.field_count();
        for (idx, field) in key.fields().enumerate() {
            let last = idx + 1 == count;
            bound.suffix.push((field.to_vec(), inclusive || !last));
        }
        bound
    }

    /// Appends a field that must match exactly.
    pub fn push_prefix(mut self, field: impl AsRef<[u8]>) -> Self {
        self.prefix.push(field.as_ref().to_vec());
        self
    }

    /// Takes the leading fields of `key` as the exact-match prefix.
    pub fn with_prefix_of(mut self, key: &IndexKey, len: usize) -> Self {
        for field in key.fields().take(len) {
            self.prefix.push(field.to_vec());
        }
        self
    }

    /// Positions the seek after every key sharing the prefix.
    pub fn after_prefix(mut self, after: bool) -> Self {
        self.after_prefix = after;
        self
    }

    /// Appends a bound for the next field after the prefix.
    pub fn push_bound(mut self, field: impl AsRef<[u8]>, inclusive: bool) -> Self {
        self.suffix.push((field.as_ref().to_vec(), inclusive));
        self
    }

    /// Number of exact-match fields.
    pub fn prefix_len(&self) -> usize {
        self.prefix.len()
    }

    /// Compares `key` with the target. `Less` means `key` sits before the target when
    /// scanning in `direction`'s natural key order.
    pub fn compare(&self, key: KeyRef<'_>, ordering: KeyOrdering, direction: Direction) -> Ordering {
        let mut fields = key.fields();
        let mut idx = 0;
        for expected in &self.prefix {
            let Some(actual) = fields.next() else {
                return Ordering::Less;
            };
            let cmp = ordering.apply(idx, actual.cmp(expected.as_slice()));
            if cmp != Ordering::Equal {
                return cmp;
            }
            idx += 1;
        }
        if self.after_prefix {
            return direction.behind();
        }
        for (actual, (bound, inclusive)) in fields.zip(self.suffix.iter()) {
            let cmp = ordering.apply(idx, actual.cmp(bound.as_slice()));
            if cmp != Ordering::Equal {
                return cmp;
            }
            if !inclusive {
                return direction.behind();
            }
            idx += 1;
        }
        Ordering::Equal
    }
}

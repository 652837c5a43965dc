/// Configuration knobs for one index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BTreeOptions {
    /// Name reported in duplicate-key errors and used as the catalog entry for the head.
    pub index_name: String,
    /// Per-field sort direction; fields past the list sort ascending.
    pub fields: Vec<FieldOrder>,
    /// Optional cap on entries per bucket, applied on top of the byte capacity.
    pub max_entries_per_bucket: Option<usize>,
    /// Run a strict validation pass after every insert, unindex and builder commit.
    pub validate_writes: bool,
}

impl Default for BTreeOptions {
    fn default() -> Self {
        Self {
            index_name: "index".to_owned(),
            fields: Vec::new(),
            max_entries_per_bucket: None,
            validate_writes: false,
        }
    }
}

impl BTreeOptions {
    /// Checks option ranges.
    pub fn validate(&self) -> Result<()> {
        if self.index_name.is_empty() {
            return Err(IndexError::Invalid("index name must not be empty"));
        }
        if matches!(self.max_entries_per_bucket, Some(max) if max < 3) {
            return Err(IndexError::Invalid(
                "max_entries_per_bucket must be at least 3",
            ));
        }
        self.ordering().map(|_| ())
    }

    /// Comparator described by `fields`.
    pub fn ordering(&self) -> Result<KeyOrdering> {
        KeyOrdering::from_fields(&self.fields)
    }
}

/// Capacity rules derived from the page size and options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Layout {
    pub(super) body: usize,
    pub(super) key_max: usize,
    pub(super) max_entries: Option<usize>,
    pub(super) low_water: usize,
}

impl Layout {
    pub(super) fn new(page_size: usize, max_entries: Option<usize>) -> Result<Self> {
        if page_size < 256 {
            return Err(IndexError::Invalid("page too small for index buckets"));
        }
        let body = page_size - page::BUCKET_HEADER_LEN;
        let key_max = page_size / 8;
        let low_water = body / 2 - key_max - page::ENTRY_LEN + 1;
        Ok(Self {
            body,
            key_max,
            max_entries,
            low_water,
        })
    }

    /// Whether a bucket holding `footprint` stays within capacity.
    pub(super) fn fits(&self, footprint: Footprint) -> bool {
        footprint.bytes <= self.body && self.max_entries.map_or(true, |max| footprint.count <= max)
    }

    /// Whether one more entry may join a bucket currently holding `count` entries.
    pub(super) fn count_allows_one_more(&self, count: usize) -> bool {
        self.max_entries.map_or(true, |max| count < max)
    }

    pub(super) fn below_low_water(&self, footprint: Footprint) -> bool {
        match self.max_entries {
            Some(max) => footprint.count < max / 2,
            None => footprint.bytes < self.low_water,
        }
    }
}

/// Entry position: a bucket handle plus an entry slot inside it.
///
/// Positions are only meaningful until the next structural change; cursors that
/// outlive a write must go through [`BTree::restore_position`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    /// Bucket holding the entry.
    pub bucket: PageId,
    /// Entry slot inside the bucket.
    pub slot: usize,
}

/// Result of [`BTree::locate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Located {
    /// `true` when the exact live `(key, record)` pair exists.
    pub found: bool,
    /// Exact match, or the nearest live neighbor in the scan direction; `None` past the end.
    pub position: Option<Position>,
}

/// Controls for [`BTree::full_validate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Panic on the first report with issues instead of logging them.
    pub strict: bool,
    /// Render an indented structural dump into the report.
    pub dump: bool,
}

/// Outcome of a full-tree walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Live entries.
    pub live_keys: u64,
    /// Tombstoned entries still present in buckets.
    pub unused_keys: u64,
    /// Buckets reachable from the head.
    pub buckets: u64,
    /// Levels below the root; `0` when the root is a leaf.
    pub depth: usize,
    /// Human-readable descriptions of every inconsistency found.
    pub issues: Vec<String>,
    /// Structural dump, when requested.
    pub dump: Option<String>,
}

impl ValidationReport {
    /// `true` when no issue was found.
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Disk-resident ordered index mapping composite keys to record locations.
///
/// Buckets reference each other only through [`PageId`] handles that are resolved
/// against the caller's guard on every access. Reads take any [`PageRead`]; every
/// structural change takes the caller's [`WriteGuard`], which owns commit and rollback.
pub struct BTree {
    pub(super) head: Arc<dyn HeadManager>,
    pub(super) deletion: Arc<dyn BucketDeletionNotification>,
    pub(super) options: BTreeOptions,
    pub(super) ordering: KeyOrdering,
    pub(super) layout: Layout,
    pub(super) stats: Arc<BTreeStats>,
}

/// Pending insertion into one bucket; splits hand the separator up as a new job.
pub(super) struct InsertJob {
    pub(super) bucket: PageId,
    pub(super) pos: usize,
    pub(super) entry: OwnedEntry,
    pub(super) rchild: Option<PageId>,
}

/// Outcome of trying to fix an underflowing bucket against its siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum BalanceOutcome {
    /// Entries moved across the separator; the parent kept its key count.
    Rebalanced,
    /// Two siblings merged; the parent lost one key.
    Merged,
}

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of index statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeStatsSnapshot {
    /// Number of root-to-leaf descents performed
    pub searches: u64,
    /// Number of entries inserted, revivals included
    pub inserts: u64,
    /// Number of entries unindexed
    pub unindexes: u64,
    /// Number of leaf bucket splits performed
    pub leaf_splits: u64,
    /// Number of internal bucket splits performed
    pub internal_splits: u64,
    /// Number of splits that grew the tree by one level
    pub root_splits: u64,
    /// Number of sibling merges performed
    pub merges: u64,
    /// Number of sibling rebalances performed
    pub rebalances: u64,
    /// Number of bucket packs that rewrote a page
    pub packs: u64,
    /// Number of root collapses that shrank the tree by one level
    pub root_collapses: u64,
    /// Number of buckets released to the page store
    pub buckets_freed: u64,
    /// Number of tombstoned entries revived by insert
    pub tombstones_revived: u64,
}

/// Thread-safe statistics tracking for index operations.
#[derive(Default)]
pub struct BTreeStats {
    searches: AtomicU64,
    inserts: AtomicU64,
    unindexes: AtomicU64,
    leaf_splits: AtomicU64,
    internal_splits: AtomicU64,
    root_splits: AtomicU64,
    merges: AtomicU64,
    rebalances: AtomicU64,
    packs: AtomicU64,
    root_collapses: AtomicU64,
    buckets_freed: AtomicU64,
    tombstones_revived: AtomicU64,
}

impl BTreeStats {
    /// Returns the current count of descents.
    pub fn searches(&self) -> u64 {
        self.searches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of inserts.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of unindexes.
    pub fn unindexes(&self) -> u64 {
        self.unindexes.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of leaf splits.
    pub fn leaf_splits(&self) -> u64 {
        self.leaf_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of internal splits.
    pub fn internal_splits(&self) -> u64 {
        self.internal_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of splits that allocated a new root.
    pub fn root_splits(&self) -> u64 {
        self.root_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of merges.
    pub fn merges(&self) -> u64 {
        self.merges.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of rebalances.
    pub fn rebalances(&self) -> u64 {
        self.rebalances.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of packs that rewrote a bucket.
    pub fn packs(&self) -> u64 {
        self.packs.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of root collapses.
    pub fn root_collapses(&self) -> u64 {
        self.root_collapses.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of buckets freed.
    pub fn buckets_freed(&self) -> u64 {
        self.buckets_freed.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of tombstones revived by insert.
    pub fn tombstones_revived(&self) -> u64 {
        self.tombstones_revived.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_searches(&self) {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_unindexes(&self) {
        self.unindexes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_internal_splits(&self) {
        self.internal_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_splits(&self) {
        self.root_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_merges(&self) {
        self.merges.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_rebalances(&self) {
        self.rebalances.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_packs(&self) {
        self.packs.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_collapses(&self) {
        self.root_collapses.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_buckets_freed(&self) {
        self.buckets_freed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_tombstones_revived(&self) {
        self.tombstones_revived
            .fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> BTreeStatsSnapshot {
        BTreeStatsSnapshot {
            searches: self.searches(),
            inserts: self.inserts(),
            unindexes: self.unindexes(),
            leaf_splits: self.leaf_splits(),
            internal_splits: self.internal_splits(),
            root_splits: self.root_splits(),
            merges: self.merges(),
            rebalances: self.rebalances(),
            packs: self.packs(),
            root_collapses: self.root_collapses(),
            buckets_freed: self.buckets_freed(),
            tombstones_revived: self.tombstones_revived(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "sombra_index::stats",
            searches = snapshot.searches,
            inserts = snapshot.inserts,
            unindexes = snapshot.unindexes,
            leaf_splits = snapshot.leaf_splits,
            internal_splits = snapshot.internal_splits,
            root_splits = snapshot.root_splits,
            merges = snapshot.merges,
            rebalances = snapshot.rebalances,
            packs = snapshot.packs,
            root_collapses = snapshot.root_collapses,
            buckets_freed = snapshot.buckets_freed,
            tombstones_revived = snapshot.tombstones_revived,
            "index stats snapshot"
        );
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::types::{IndexError, PageId, Result};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 8192;
/// Smallest supported page size.
pub const MIN_PAGE_SIZE: u32 = 256;
/// Largest supported page size; bucket offsets are 16-bit.
pub const MAX_PAGE_SIZE: u32 = 32 * 1024;

/// Configuration for the page store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagerOptions {
    /// Page size in bytes. Must be a power of two within
    /// [`MIN_PAGE_SIZE`]..=[`MAX_PAGE_SIZE`].
    pub page_size: u32,
    /// Upper bound on live pages; allocation fails once reached.
    pub max_pages: Option<u64>,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
        }
    }
}

impl PagerOptions {
    /// Checks the options for unsupported values.
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two()
            || self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
        {
            return Err(IndexError::Invalid(
                "page_size must be a power of two between 256 and 32768",
            ));
        }
        if self.max_pages == Some(0) {
            return Err(IndexError::Invalid("max_pages must be positive"));
        }
        Ok(())
    }
}

/// Read access to pages, shared by read and write guards.
pub trait PageRead {
    /// Returns the page size in bytes.
    fn page_size(&self) -> usize;
    /// Resolves a page handle to its bytes.
    fn page(&self, id: PageId) -> Result<&[u8]>;
    /// Looks up a named root handle.
    fn root(&self, name: &str) -> Option<PageId>;
}

/// Snapshot of pager counters. Only committed write guards contribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PagerStats {
    /// Pages allocated.
    pub allocations: u64,
    /// Pages freed.
    pub frees: u64,
    /// Pages live after the last commit.
    pub live_pages: u64,
    /// Write guards committed.
    pub commits: u64,
    /// Write guards dropped without commit.
    pub rollbacks: u64,
}

#[derive(Default)]
struct StatsCounters {
    allocations: AtomicU64,
    frees: AtomicU64,
    live_pages: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

struct PagerState {
    pages: HashMap<PageId, Box<[u8]>>,
    free: Vec<PageId>,
    next_id: u64,
    roots: BTreeMap<String, PageId>,
}

/// In-memory page store with scoped, rollback-on-drop write guards.
///
/// A single [`WriteGuard`] holds the store exclusively; readers share it. Freed page ids
/// are recycled last-in first-out.
pub struct Pager {
    options: PagerOptions,
    state: RwLock<PagerState>,
    stats: StatsCounters,
}

impl Pager {
    /// Creates an empty page store.
    pub fn new(options: PagerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            state: RwLock::new(PagerState {
                pages: HashMap::new(),
                free: Vec::new(),
                next_id: 1,
                roots: BTreeMap::new(),
            }),
            stats: StatsCounters::default(),
        })
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> u32 {
        self.options.page_size
    }

    /// Returns the options the store was created with.
    pub fn options(&self) -> &PagerOptions {
        &self.options
    }

    /// Begins a shared read scope.
    pub fn begin_read(&self) -> Result<ReadGuard<'_>> {
        Ok(ReadGuard {
            state: self.state.read(),
            page_size: self.options.page_size as usize,
        })
    }

    /// Begins an exclusive write scope.
    pub fn begin_write(&self) -> Result<WriteGuard<'_>> {
        let state = self.state.write();
        let free_snapshot = state.free.clone();
        let next_id_snapshot = state.next_id;
        Ok(WriteGuard {
            pager: self,
            state,
            original_pages: HashMap::new(),
            free_snapshot,
            next_id_snapshot,
            roots_snapshot: None,
            allocations: 0,
            frees: 0,
            committed: false,
        })
    }

    /// Makes every change made through `guard` permanent.
    pub fn commit(&self, mut guard: WriteGuard<'_>) -> Result<()> {
        if !std::ptr::eq(self, guard.pager) {
            return Err(IndexError::Invalid("write guard belongs to another pager"));
        }
        guard.committed = true;
        self.stats
            .allocations
            .fetch_add(guard.allocations, AtomicOrdering::Relaxed);
        self.stats
            .frees
            .fetch_add(guard.frees, AtomicOrdering::Relaxed);
        self.stats
            .live_pages
            .store(guard.state.pages.len() as u64, AtomicOrdering::Relaxed);
        self.stats.commits.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::trace!(
            target: "sombra_index::pager",
            touched = guard.original_pages.len(),
            allocations = guard.allocations,
            frees = guard.frees,
            "committed write guard"
        );
        Ok(())
    }

    /// Returns a snapshot of the store counters.
    pub fn stats(&self) -> PagerStats {
        PagerStats {
            allocations: self.stats.allocations.load(AtomicOrdering::Relaxed),
            frees: self.stats.frees.load(AtomicOrdering::Relaxed),
            live_pages: self.stats.live_pages.load(AtomicOrdering::Relaxed),
            commits: self.stats.commits.load(AtomicOrdering::Relaxed),
            rollbacks: self.stats.rollbacks.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Shared read scope over the page store.
pub struct ReadGuard<'a> {
    state: RwLockReadGuard<'a, PagerState>,
    page_size: usize,
}

impl<'a> PageRead for ReadGuard<'a> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page(&self, id: PageId) -> Result<&[u8]> {
        self.state
            .pages
            .get(&id)
            .map(|page| &page[..])
            .ok_or(IndexError::PageNotFound(id))
    }

    fn root(&self, name: &str) -> Option<PageId> {
        self.state.roots.get(name).copied()
    }
}

/// Exclusive write scope, tracking original page images for rollback.
pub struct WriteGuard<'a> {
    pager: &'a Pager,
    state: RwLockWriteGuard<'a, PagerState>,
    original_pages: HashMap<PageId, Option<Box<[u8]>>>,
    free_snapshot: Vec<PageId>,
    next_id_snapshot: u64,
    roots_snapshot: Option<BTreeMap<String, PageId>>,
    allocations: u64,
    frees: u64,
    committed: bool,
}

impl<'a> WriteGuard<'a> {
    /// Returns a mutable view of a live page, recording its original image first.
    pub fn page_mut(&mut self, id: PageId) -> Result<&mut [u8]> {
        if !self.original_pages.contains_key(&id) {
            let original = self
                .state
                .pages
                .get(&id)
                .cloned()
                .ok_or(IndexError::PageNotFound(id))?;
            self.original_pages.insert(id, Some(original));
        }
        self.state
            .pages
            .get_mut(&id)
            .map(|page| &mut page[..])
            .ok_or(IndexError::PageNotFound(id))
    }

    /// Allocates a zeroed page.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if let Some(limit) = self.pager.options.max_pages {
            if self.state.pages.len() as u64 >= limit {
                return Err(IndexError::OutOfPages { limit });
            }
        }
        let id = match self.state.free.pop() {
            Some(id) => id,
            None => {
                let id = PageId(self.state.next_id);
                self.state.next_id += 1;
                id
            }
        };
        self.original_pages.entry(id).or_insert(None);
        let page = vec![0u8; self.pager.options.page_size as usize].into_boxed_slice();
        self.state.pages.insert(id, page);
        self.allocations += 1;
        Ok(id)
    }

    /// Releases a page; later reads of `id` fail until it is reallocated.
    pub fn free_page(&mut self, id: PageId) -> Result<()> {
        let page = self
            .state
            .pages
            .remove(&id)
            .ok_or(IndexError::PageNotFound(id))?;
        self.original_pages.entry(id).or_insert(Some(page));
        self.state.free.push(id);
        self.frees += 1;
        Ok(())
    }

    /// Sets or clears a named root handle.
    pub fn set_root(&mut self, name: &str, id: Option<PageId>) {
        if self.roots_snapshot.is_none() {
            self.roots_snapshot = Some(self.state.roots.clone());
        }
        match id {
            Some(id) => {
                self.state.roots.insert(name.to_owned(), id);
            }
            None => {
                self.state.roots.remove(name);
            }
        }
    }

    fn rollback(&mut self) {
        let originals = std::mem::take(&mut self.original_pages);
        let touched = originals.len();
        for (id, original) in originals {
            match original {
                Some(page) => {
                    self.state.pages.insert(id, page);
                }
                None => {
                    self.state.pages.remove(&id);
                }
            }
        }
        self.state.free = std::mem::take(&mut self.free_snapshot);
        self.state.next_id = self.next_id_snapshot;
        if let Some(roots) = self.roots_snapshot.take() {
            self.state.roots = roots;
        }
        self.pager
            .stats
            .rollbacks
            .fetch_add(1, AtomicOrdering::Relaxed);
        tracing::debug!(target: "sombra_index::pager", touched, "rolled back write guard");
    }
}

impl<'a> PageRead for WriteGuard<'a> {
    fn page_size(&self) -> usize {
        self.pager.options.page_size as usize
    }

    fn page(&self, id: PageId) -> Result<&[u8]> {
        self.state
            .pages
            .get(&id)
            .map(|page| &page[..])
            .ok_or(IndexError::PageNotFound(id))
    }

    fn root(&self, name: &str) -> Option<PageId> {
        self.state.roots.get(name).copied()
    }
}

impl<'a> Drop for WriteGuard<'a> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

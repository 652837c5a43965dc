use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::primitives::pager::PageRead;
use crate::types::{PageId, RecordLoc, Result};

use super::bound::SeekBound;
use super::head::BucketDeletionNotification;
use super::key::IndexKey;
use super::ordering::Direction;
use super::tree::{BTree, Position};

type SavedSlot = Mutex<Option<Position>>;

/// Registry of saved cursors, notified before buckets are freed.
///
/// Clearing the saved bucket of every cursor positioned in a freed bucket forces the
/// next restore to relocate by key instead of trusting a recycled page.
#[derive(Default)]
pub struct CursorRegistry {
    saved: Mutex<Vec<Weak<SavedSlot>>>,
}

impl CursorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, slot: &Arc<SavedSlot>) {
        let mut saved = self.saved.lock();
        if !saved.iter().any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(slot))) {
            saved.push(Arc::downgrade(slot));
        }
    }

    /// Number of live registered cursors.
    pub fn len(&self) -> usize {
        self.saved
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Returns `true` when no live cursor is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BucketDeletionNotification for CursorRegistry {
    fn about_to_delete_bucket(&self, bucket: PageId) {
        let mut saved = self.saved.lock();
        saved.retain(|weak| weak.strong_count() > 0);
        let mut invalidated = 0usize;
        for slot in saved.iter().filter_map(Weak::upgrade) {
            let mut position = slot.lock();
            if matches!(*position, Some(pos) if pos.bucket == bucket) {
                *position = None;
                invalidated += 1;
            }
        }
        if invalidated > 0 {
            tracing::trace!(
                target: "sombra_index::cursor",
                bucket = bucket.0,
                invalidated,
                "invalidated saved cursors"
            );
        }
    }
}

/// Scan cursor over one index.
///
/// A cursor only holds a position between calls. Before yielding, call `save`; after
/// the caller reacquires its guard, `restore` re-resolves the position even if buckets
/// were split, merged, packed or freed in between.
pub struct IndexCursor<'t> {
    tree: &'t BTree,
    direction: Direction,
    position: Option<Position>,
    saved: Option<(IndexKey, RecordLoc)>,
    slot: Arc<SavedSlot>,
    registry: Option<Arc<CursorRegistry>>,
}

impl<'t> IndexCursor<'t> {
    /// A cursor that is not tracked by any registry.
    pub fn new(tree: &'t BTree, direction: Direction) -> Self {
        Self {
            tree,
            direction,
            position: None,
            saved: None,
            slot: Arc::new(Mutex::new(None)),
            registry: None,
        }
    }

    /// A cursor whose saved position is invalidated through `registry`.
    pub fn with_registry(tree: &'t BTree, direction: Direction, registry: &Arc<CursorRegistry>) -> Self {
        let mut cursor = Self::new(tree, direction);
        cursor.registry = Some(Arc::clone(registry));
        cursor
    }

    /// Scan direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current position, `None` at end of scan.
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Returns `true` once the scan ran off the end.
    pub fn is_eof(&self) -> bool {
        self.position.is_none()
    }

    /// Positions at the first live entry in the scan direction.
    pub fn seek_first(&mut self, read: &dyn PageRead) -> Result<()> {
        self.position = self.tree.first(read, self.direction)?;
        Ok(())
    }

    /// Positions at `(key, loc)` or its neighbor in the scan direction. Returns whether
    /// the exact pair exists.
    pub fn seek(&mut self, read: &dyn PageRead, key: &IndexKey, loc: RecordLoc) -> Result<bool> {
        let located = self.tree.locate(read, key, loc, self.direction)?;
        self.position = located.position;
        Ok(located.found)
    }

    /// Positions at the first live entry satisfying `bound`.
    pub fn seek_bound(&mut self, read: &dyn PageRead, bound: &SeekBound) -> Result<()> {
        self.position = self.tree.custom_locate(read, bound, self.direction)?;
        Ok(())
    }

    /// Skips ahead to the first live entry satisfying `bound`, never moving backward.
    pub fn advance_to(&mut self, read: &dyn PageRead, bound: &SeekBound) -> Result<()> {
        if let Some(position) = self.position {
            self.position = self.tree.advance_to(read, position, bound, self.direction)?;
        }
        Ok(())
    }

    /// Entry under the cursor.
    pub fn current(&self, read: &dyn PageRead) -> Result<Option<(IndexKey, RecordLoc)>> {
        self.position
            .map(|position| self.tree.entry_at(read, position))
            .transpose()
    }

    /// Returns the entry under the cursor and steps past it.
    pub fn next(&mut self, read: &dyn PageRead) -> Result<Option<(IndexKey, RecordLoc)>> {
        let Some(position) = self.position else {
            return Ok(None);
        };
        let entry = self.tree.entry_at(read, position)?;
        self.position = self.tree.advance(read, position, self.direction)?;
        Ok(Some(entry))
    }

    /// Remembers the current entry so the scan can survive tree changes.
    pub fn save(&mut self, read: &dyn PageRead) -> Result<()> {
        self.saved = self.current(read)?;
        *self.slot.lock() = self.position;
        if let Some(registry) = &self.registry {
            registry.register(&self.slot);
        }
        Ok(())
    }

    /// Re-resolves the position recorded by the last `save`.
    pub fn restore(&mut self, read: &dyn PageRead) -> Result<()> {
        let Some((key, loc)) = self.saved.take() else {
            self.position = None;
            return Ok(());
        };
        let position = self.slot.lock().take();
        self.position = self
            .tree
            .restore_position(read, &key, loc, self.direction, position)?;
        Ok(())
    }
}

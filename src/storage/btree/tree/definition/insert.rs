impl BTree {
    /// Adds `(key, loc)`.
    ///
    /// With `dups_allowed == false`, a live entry with an equal key and a different
    /// record rejects the insert before anything is written. Re-inserting a tombstoned
    /// pair revives it in place.
    pub fn insert(
        &self,
        write: &mut WriteGuard<'_>,
        key: &IndexKey,
        loc: RecordLoc,
        dups_allowed: bool,
    ) -> Result<()> {
        self.check_key_size(key)?;
        let root = self.head.head(&*write)?.ok_or(IndexError::Uninitialized)?;
        if !dups_allowed {
            self.dup_key_check(&*write, key, loc)?;
        }
        self.stats.inc_searches();
        let mut current = root;
        loop {
            let bucket = self.bucket(&*write, current)?;
            let (found, slot) = self.search_bucket(&bucket, key.as_key(), loc)?;
            if found {
                if bucket.is_used(slot)? {
                    return Err(IndexError::KeyAlreadyIndexed);
                }
                BucketMut::new(write.page_mut(current)?)?.set_used(slot, true)?;
                self.stats.inc_tombstones_revived();
                tracing::trace!(
                    target: "sombra_index::btree",
                    bucket = current.0,
                    slot,
                    "revived tombstoned entry"
                );
                break;
            }
            match bucket.child(slot)? {
                Some(child) => current = child,
                None => {
                    let entry = OwnedEntry::new(key.clone(), loc, None);
                    self.insert_here(write, current, slot, entry, None)?;
                    break;
                }
            }
        }
        self.stats.inc_inserts();
        self.after_write(&*write)
    }

    /// Inserts `entry` at `pos` of `bucket`, with `entry.child` to its left and `rchild`
    /// to its right, splitting upward as far as needed.
    pub(super) fn insert_here(
        &self,
        write: &mut WriteGuard<'_>,
        bucket: PageId,
        pos: usize,
        entry: OwnedEntry,
        rchild: Option<PageId>,
    ) -> Result<()> {
        let mut job = Some(InsertJob {
            bucket,
            pos,
            entry,
            rchild,
        });
        while let Some(next) = job.take() {
            job = self.insert_into_bucket(write, next)?;
        }
        Ok(())
    }

    fn insert_into_bucket(
        &self,
        write: &mut WriteGuard<'_>,
        job: InsertJob,
    ) -> Result<Option<InsertJob>> {
        let InsertJob {
            bucket: id,
            mut pos,
            entry,
            rchild,
        } = job;
        let key_len = entry.key.encoded_len();
        let (mut room, packed) = {
            let bucket = self.bucket(&*write, id)?;
            let header = bucket.header();
            (
                header.empty_size as usize >= entry.footprint()
                    && self.layout.count_allows_one_more(bucket.len()),
                header.is_packed(),
            )
        };
        if !room && !packed {
            let mut bucket = BucketMut::new(write.page_mut(id)?)?;
            pos = bucket.pack(id, pos)?;
            room = bucket.has_room(key_len)
                && self
                    .layout
                    .count_allows_one_more(bucket.header()?.count as usize);
            self.stats.inc_packs();
        }
        if room {
            let mut bucket = BucketMut::new(write.page_mut(id)?)?;
            bucket.insert_at(pos, entry.key.as_key(), entry.record, entry.child, entry.used)?;
            bucket.set_child(pos + 1, rchild)?;
            for child in [entry.child, rchild].into_iter().flatten() {
                self.set_parent(write, child, Some(id))?;
            }
            return Ok(None);
        }
        self.split(write, id, pos, entry, rchild)
    }

    /// Splits `id` around a separator chosen from its entries plus `entry`.
    ///
    /// The lower half stays in `id`, the upper half moves to a new sibling, and the
    /// separator is handed back as the next job against the parent. Splitting the root
    /// grows the tree by one level instead.
    fn split(
        &self,
        write: &mut WriteGuard<'_>,
        id: PageId,
        pos: usize,
        entry: OwnedEntry,
        rchild: Option<PageId>,
    ) -> Result<Option<InsertJob>> {
        let (mut entries, mut next_child, parent, was_leaf) = {
            let bucket = self.bucket(&*write, id)?;
            (
                bucket.entries()?,
                bucket.next_child(),
                bucket.parent(),
                bucket.is_leaf(),
            )
        };
        entries.insert(pos, entry);
        match entries.get_mut(pos + 1) {
            Some(after) => after.child = rchild,
            None => next_child = rchild,
        }
        let split = self.split_index(&entries, pos)?;
        let right: Vec<OwnedEntry> = entries.split_off(split + 1);
        let mut separator = entries
            .pop()
            .ok_or(IndexError::Corruption("split produced no separator"))?;
        let left = entries;

        BucketMut::new(write.page_mut(id)?)?.rewrite(&left, separator.child)?;
        let right_id = self.allocate_bucket(write, parent)?;
        BucketMut::new(write.page_mut(right_id)?)?.rewrite(&right, next_child)?;
        separator.child = Some(id);
        self.fix_parent_ptrs(write, id)?;
        self.fix_parent_ptrs(write, right_id)?;
        if was_leaf {
            self.stats.inc_leaf_splits();
        } else {
            self.stats.inc_internal_splits();
        }
        tracing::debug!(
            target: "sombra_index::btree",
            left = id.0,
            right = right_id.0,
            left_len = left.len(),
            right_len = right.len(),
            leaf = was_leaf,
            "split bucket"
        );

        match parent {
            Some(parent) => {
                let idx = self.index_in_parent(&*write, parent, id)?;
                Ok(Some(InsertJob {
                    bucket: parent,
                    pos: idx,
                    entry: separator,
                    rchild: Some(right_id),
                }))
            }
            None => {
                let root = self.allocate_bucket(write, None)?;
                {
                    let mut bucket = BucketMut::new(write.page_mut(root)?)?;
                    if !bucket.push_back(&separator)? {
                        return Err(IndexError::Corruption("separator does not fit new root"));
                    }
                    bucket.set_next_child(Some(right_id));
                }
                self.set_parent(write, id, Some(root))?;
                self.set_parent(write, right_id, Some(root))?;
                self.head.set_head(write, root)?;
                self.stats.inc_root_splits();
                tracing::debug!(
                    target: "sombra_index::btree",
                    index = %self.options.index_name,
                    root = root.0,
                    "grew tree by one level"
                );
                Ok(None)
            }
        }
    }

    /// Chooses the separator slot for an overflowing entry list.
    ///
    /// Entries are weighed by bytes from the right until half the total is passed, or a
    /// tenth when the new entry was appended at the end so ascending loads leave left
    /// halves nearly full. The nearest slot whose halves both fit wins.
    fn split_index(&self, entries: &[OwnedEntry], inserted_at: usize) -> Result<usize> {
        let len = entries.len();
        if len < 3 {
            return Err(IndexError::Corruption("too few entries to split"));
        }
        let total: usize = entries.iter().map(OwnedEntry::footprint).sum();
        let limit = if inserted_at + 1 == len { total / 10 } else { total / 2 };
        let mut split = len - 1;
        let mut right_size = 0;
        while split > 0 {
            right_size += entries[split].footprint();
            if right_size > limit {
                break;
            }
            split -= 1;
        }
        let preferred = split.clamp(1, len - 2);
        self.fitting_split(entries, preferred)
            .ok_or(IndexError::Corruption("no split point fits both halves"))
    }

    /// Slot nearest `preferred` whose left and right halves both fit a bucket.
    pub(super) fn fitting_split(&self, entries: &[OwnedEntry], preferred: usize) -> Option<usize> {
        let len = entries.len();
        if len < 3 {
            return None;
        }
        let fits = |split: usize| {
            self.layout.fits(Footprint::of(&entries[..split]))
                && self.layout.fits(Footprint::of(&entries[split + 1..]))
        };
        (0..len).find_map(|distance| {
            let below = preferred.checked_sub(distance).filter(|s| *s >= 1);
            let above = Some(preferred + distance).filter(|s| *s <= len - 2);
            [below, above].into_iter().flatten().find(|split| fits(*split))
        })
    }

    pub(super) fn allocate_bucket(
        &self,
        write: &mut WriteGuard<'_>,
        parent: Option<PageId>,
    ) -> Result<PageId> {
        let id = write.allocate_page()?;
        BucketMut::init(write.page_mut(id)?, parent)?;
        Ok(id)
    }

    pub(super) fn set_parent(
        &self,
        write: &mut WriteGuard<'_>,
        child: PageId,
        parent: Option<PageId>,
    ) -> Result<()> {
        BucketMut::new(write.page_mut(child)?)?.set_parent(parent);
        Ok(())
    }

    /// Points every child of `id` back at `id`.
    pub(super) fn fix_parent_ptrs(&self, write: &mut WriteGuard<'_>, id: PageId) -> Result<()> {
        let children: SmallVec<[PageId; 16]> = {
            let bucket = self.bucket(&*write, id)?;
            let mut children = SmallVec::new();
            for idx in 0..=bucket.len() {
                if let Some(child) = bucket.child(idx)? {
                    children.push(child);
                }
            }
            children
        };
        for child in children {
            self.set_parent(write, child, Some(id))?;
        }
        Ok(())
    }
}

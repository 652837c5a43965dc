impl BTree {
    /// Removes `(key, loc)`. Returns `false` when the pair is not present as a live entry.
    pub fn unindex(&self, write: &mut WriteGuard<'_>, key: &IndexKey, loc: RecordLoc) -> Result<bool> {
        if self.head.head(&*write)?.is_none() {
            return Err(IndexError::Uninitialized);
        }
        if key.encoded_len() > self.layout.key_max {
            return Ok(false);
        }
        let (found, position) = self.locate_raw(&*write, key.as_key(), loc, Direction::Forward)?;
        let position = match position {
            Some(position) if found => position,
            _ => return Ok(false),
        };
        let (used, is_leaf) = {
            let bucket = self.bucket(&*write, position.bucket)?;
            (bucket.is_used(position.slot)?, bucket.is_leaf())
        };
        if !used {
            return Ok(false);
        }
        if is_leaf {
            BucketMut::new(write.page_mut(position.bucket)?)?.set_used(position.slot, false)?;
            self.settle_after_delete(write, position.bucket)?;
        } else {
            self.delete_internal_key(write, position.bucket, position.slot)?;
        }
        self.stats.inc_unindexes();
        self.after_write(&*write)?;
        Ok(true)
    }

    /// Replaces internal entry `slot` of `id` with its in-order predecessor, which is
    /// then removed from its leaf.
    fn delete_internal_key(&self, write: &mut WriteGuard<'_>, id: PageId, slot: usize) -> Result<()> {
        let predecessor = self.advance_raw(&*write, Position { bucket: id, slot }, Direction::Backward)?;
        let leaf = predecessor
            .ok_or(IndexError::Corruption("internal entry without predecessor"))?
            .bucket;
        let (leaf_len, leaf_is_leaf) = {
            let mut bucket = BucketMut::new(write.page_mut(leaf)?)?;
            let len = bucket.header()?.count as usize;
            bucket.pack(leaf, len)?;
            let header = bucket.header()?;
            (header.count as usize, header.is_leaf())
        };
        if !leaf_is_leaf {
            return Err(IndexError::Corruption("predecessor is not in a leaf"));
        }
        if leaf_len == 0 {
            // Every predecessor candidate was a tombstone: keep the internal entry as one.
            BucketMut::new(write.page_mut(id)?)?.set_used(slot, false)?;
            return self.settle_after_delete(write, leaf);
        }
        let replacement = {
            let bucket = self.bucket(&*write, leaf)?;
            bucket.entry(leaf_len - 1)?.to_owned_entry()
        };
        self.set_internal_key(write, id, slot, replacement.key, replacement.record, replacement.used)?;
        BucketMut::new(write.page_mut(leaf)?)?.remove_at(leaf_len - 1)?;
        self.settle_after_delete(write, leaf)
    }

    /// Rewrites the key of internal entry `slot`, keeping both neighboring children.
    /// The bucket may split if the new key is larger than the old one.
    pub(super) fn set_internal_key(
        &self,
        write: &mut WriteGuard<'_>,
        id: PageId,
        slot: usize,
        key: IndexKey,
        record: RecordLoc,
        used: bool,
    ) -> Result<()> {
        let (lchild, rchild) = {
            let bucket = self.bucket(&*write, id)?;
            (bucket.child(slot)?, bucket.child(slot + 1)?)
        };
        BucketMut::new(write.page_mut(id)?)?.remove_at(slot)?;
        let entry = OwnedEntry {
            key,
            record,
            child: lchild,
            used,
        };
        self.insert_here(write, id, slot, entry, rchild)
    }

    /// Restores occupancy after an entry left `id`, cascading toward the root.
    fn settle_after_delete(&self, write: &mut WriteGuard<'_>, id: PageId) -> Result<()> {
        let mut current = id;
        loop {
            let (parent, empty, next_child, underflow) = {
                let bucket = self.bucket(&*write, current)?;
                let footprint = bucket.packed_footprint()?;
                (
                    bucket.parent(),
                    bucket.is_empty(),
                    bucket.next_child(),
                    bucket.is_empty() || self.layout.below_low_water(footprint),
                )
            };
            if !underflow {
                return Ok(());
            }
            {
                let mut bucket = BucketMut::new(write.page_mut(current)?)?;
                let len = bucket.header()?.count as usize;
                let before = bucket.header()?.is_packed();
                bucket.pack(current, len)?;
                if !before {
                    self.stats.inc_packs();
                }
            }
            let Some(parent) = parent else {
                if empty {
                    if let Some(child) = next_child {
                        self.collapse_root(write, current, child)?;
                    }
                }
                return Ok(());
            };
            match self.balance_with_neighbors(write, parent, current)? {
                BalanceOutcome::Rebalanced => return Ok(()),
                BalanceOutcome::Merged => current = parent,
            }
        }
    }

    /// Evens out `id` against a sibling, merging when the pair fits in one bucket.
    ///
    /// The right sibling is tried before the left one, and a rebalance is preferred
    /// unless the pair can merge.
    fn balance_with_neighbors(
        &self,
        write: &mut WriteGuard<'_>,
        parent: PageId,
        id: PageId,
    ) -> Result<BalanceOutcome> {
        let (idx, parent_len) = {
            let bucket = self.bucket(&*write, parent)?;
            let idx = bucket
                .index_of_child(id)?
                .ok_or(IndexError::Corruption("child missing from its parent"))?;
            (idx, bucket.len())
        };
        let has_right = idx < parent_len;
        let has_left = idx > 0;
        if !has_right && !has_left {
            return Err(IndexError::Corruption("non-root bucket without siblings"));
        }
        if has_right && !self.can_merge_children(write, parent, idx)? {
            self.balance_children(write, parent, idx)?;
            return Ok(BalanceOutcome::Rebalanced);
        }
        if has_left && !self.can_merge_children(write, parent, idx - 1)? {
            self.balance_children(write, parent, idx - 1)?;
            return Ok(BalanceOutcome::Rebalanced);
        }
        let left_idx = if has_right { idx } else { idx - 1 };
        self.merge_children(write, parent, left_idx)?;
        Ok(BalanceOutcome::Merged)
    }

    /// Children of `parent` at `left_idx` and `left_idx + 1`, each packed.
    fn packed_children(
        &self,
        write: &mut WriteGuard<'_>,
        parent: PageId,
        left_idx: usize,
    ) -> Result<(PageId, PageId, OwnedEntry)> {
        let (left, right, separator) = {
            let bucket = self.bucket(&*write, parent)?;
            let left = bucket
                .child(left_idx)?
                .ok_or(IndexError::Corruption("internal entry without child"))?;
            let right = bucket
                .child(left_idx + 1)?
                .ok_or(IndexError::Corruption("internal entry without child"))?;
            (left, right, bucket.entry(left_idx)?.to_owned_entry())
        };
        for id in [left, right] {
            let mut bucket = BucketMut::new(write.page_mut(id)?)?;
            let len = bucket.header()?.count as usize;
            bucket.pack(id, len)?;
        }
        Ok((left, right, separator))
    }

    /// Left entries, the separator pulled down, then right entries, minus droppable
    /// tombstones; plus the right bucket's trailing child.
    fn concat_children(
        &self,
        write: &WriteGuard<'_>,
        left: PageId,
        right: PageId,
        mut separator: OwnedEntry,
    ) -> Result<(Vec<OwnedEntry>, Option<PageId>)> {
        let left_bucket = self.bucket(write, left)?;
        let right_bucket = self.bucket(write, right)?;
        let mut entries = left_bucket.entries()?;
        separator.child = left_bucket.next_child();
        entries.push(separator);
        entries.extend(right_bucket.entries()?);
        entries.retain(|entry| !entry.droppable());
        Ok((entries, right_bucket.next_child()))
    }

    fn can_merge_children(
        &self,
        write: &mut WriteGuard<'_>,
        parent: PageId,
        left_idx: usize,
    ) -> Result<bool> {
        let (left, right, separator) = self.packed_children(write, parent, left_idx)?;
        let mut footprint = self.bucket(&*write, left)?.packed_footprint()?;
        let right_footprint = self.bucket(&*write, right)?.packed_footprint()?;
        footprint.count += right_footprint.count;
        footprint.bytes += right_footprint.bytes;
        footprint.add(separator.key.encoded_len());
        Ok(self.layout.fits(footprint))
    }

    /// Folds the right child into the left one and drops their separator from `parent`.
    fn merge_children(&self, write: &mut WriteGuard<'_>, parent: PageId, left_idx: usize) -> Result<()> {
        let (left, right, separator) = self.packed_children(write, parent, left_idx)?;
        let (entries, next_child) = self.concat_children(write, left, right, separator)?;
        BucketMut::new(write.page_mut(left)?)?.rewrite(&entries, next_child)?;
        self.fix_parent_ptrs(write, left)?;
        self.free_bucket(write, right)?;
        {
            let mut bucket = BucketMut::new(write.page_mut(parent)?)?;
            bucket.remove_at(left_idx)?;
            bucket.set_child(left_idx, Some(left))?;
        }
        self.stats.inc_merges();
        tracing::debug!(
            target: "sombra_index::btree",
            left = left.0,
            freed = right.0,
            parent = parent.0,
            entries = entries.len(),
            "merged buckets"
        );
        Ok(())
    }

    /// Redistributes the children at `left_idx` and `left_idx + 1` around a new separator.
    fn balance_children(&self, write: &mut WriteGuard<'_>, parent: PageId, left_idx: usize) -> Result<()> {
        let (left, right, separator) = self.packed_children(write, parent, left_idx)?;
        let (mut entries, next_child) = self.concat_children(write, left, right, separator)?;
        let split = self
            .balanced_split(&entries)
            .ok_or(IndexError::Corruption("no balance point fits both siblings"))?;
        let right_entries = entries.split_off(split + 1);
        let new_separator = entries
            .pop()
            .ok_or(IndexError::Corruption("balance produced no separator"))?;
        BucketMut::new(write.page_mut(left)?)?.rewrite(&entries, new_separator.child)?;
        BucketMut::new(write.page_mut(right)?)?.rewrite(&right_entries, next_child)?;
        self.fix_parent_ptrs(write, left)?;
        self.fix_parent_ptrs(write, right)?;
        self.set_internal_key(
            write,
            parent,
            left_idx,
            new_separator.key,
            new_separator.record,
            new_separator.used,
        )?;
        self.stats.inc_rebalances();
        tracing::debug!(
            target: "sombra_index::btree",
            left = left.0,
            right = right.0,
            left_len = entries.len(),
            right_len = right_entries.len(),
            "rebalanced siblings"
        );
        Ok(())
    }

    /// Separator slot splitting the concatenated siblings roughly in half.
    fn balanced_split(&self, entries: &[OwnedEntry]) -> Option<usize> {
        let len = entries.len();
        if len < 3 {
            return None;
        }
        let preferred = match self.layout.max_entries {
            Some(_) => len / 2,
            None => {
                let total: usize = entries.iter().map(OwnedEntry::footprint).sum();
                let limit = total / 2;
                let mut right_size = 0;
                let mut split = len - 1;
                while split > 0 {
                    right_size += entries[split].footprint();
                    if right_size > limit {
                        break;
                    }
                    split -= 1;
                }
                split
            }
        };
        self.fitting_split(entries, preferred.clamp(1, len - 2))
    }

    /// Replaces an empty internal root with its only child.
    fn collapse_root(&self, write: &mut WriteGuard<'_>, root: PageId, child: PageId) -> Result<()> {
        self.head.set_head(write, child)?;
        self.set_parent(write, child, None)?;
        self.free_bucket(write, root)?;
        self.stats.inc_root_collapses();
        tracing::debug!(
            target: "sombra_index::btree",
            index = %self.options.index_name,
            root = child.0,
            freed = root.0,
            "collapsed root"
        );
        Ok(())
    }
}

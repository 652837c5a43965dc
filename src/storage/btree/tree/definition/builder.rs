/// Bottom-up bulk loader for an empty index.
///
/// Keys must arrive in ascending `(key, record)` order. Each key is appended to the
/// current leaf without searching from the root; `commit` then builds the internal
/// levels and installs the new root.
pub struct BTreeBuilder<'a, 'w> {
    tree: &'a BTree,
    write: &'a mut WriteGuard<'w>,
    dups_allowed: bool,
    old_head: Option<PageId>,
    leaves: Vec<PageId>,
    last: Option<(IndexKey, RecordLoc)>,
    count: u64,
    committed: bool,
}

impl BTree {
    /// Starts a bulk load. The index must have no head or an empty root leaf.
    pub fn builder<'a, 'w>(
        &'a self,
        write: &'a mut WriteGuard<'w>,
        dups_allowed: bool,
    ) -> Result<BTreeBuilder<'a, 'w>> {
        let old_head = self.head.head(&*write)?;
        if let Some(head) = old_head {
            let root = self.bucket(&*write, head)?;
            if !root.is_empty() || !root.is_leaf() {
                return Err(IndexError::Invalid("bulk load requires an empty index"));
            }
        }
        let first = self.allocate_bucket(write, None)?;
        Ok(BTreeBuilder {
            tree: self,
            write,
            dups_allowed,
            old_head,
            leaves: vec![first],
            last: None,
            count: 0,
            committed: false,
        })
    }
}

impl<'a, 'w> BTreeBuilder<'a, 'w> {
    /// Appends the next key. Rejected keys leave the buckets written so far untouched.
    pub fn add_key(&mut self, key: &IndexKey, loc: RecordLoc) -> Result<()> {
        if self.committed {
            return Err(IndexError::BuilderCommitted);
        }
        self.tree.check_key_size(key)?;
        if let Some((last_key, last_loc)) = &self.last {
            match key.compare(last_key, self.tree.ordering) {
                Ordering::Less => return Err(IndexError::KeyOutOfOrder),
                Ordering::Equal if !self.dups_allowed => {
                    return Err(IndexError::DuplicateKey {
                        index: self.tree.options.index_name.clone(),
                        key: key.to_string(),
                    });
                }
                Ordering::Equal if loc <= *last_loc => return Err(IndexError::KeyOutOfOrder),
                _ => {}
            }
        }
        let entry = OwnedEntry::new(key.clone(), loc, None);
        let current = *self
            .leaves
            .last()
            .ok_or(IndexError::Corruption("builder lost its current leaf"))?;
        if !self.try_push(current, &entry)? {
            let leaf = self.tree.allocate_bucket(self.write, None)?;
            self.leaves.push(leaf);
            if !self.try_push(leaf, &entry)? {
                return Err(IndexError::Corruption("key does not fit an empty bucket"));
            }
        }
        self.last = Some((key.clone(), loc));
        self.count += 1;
        Ok(())
    }

    /// Keys accepted so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Builds the internal levels, installs the root and returns the number of keys loaded.
    pub fn commit(&mut self) -> Result<u64> {
        self.commit_interruptible(|_| false)
    }

    /// Like [`commit`](Self::commit), but asks `interrupt` before building each internal
    /// level (1 is the level above the leaves). Returning `true` stops the load with
    /// [`IndexError::Interrupted`]; the head is untouched and dropping the write guard
    /// discards the buckets written so far.
    pub fn commit_interruptible(&mut self, mut interrupt: impl FnMut(usize) -> bool) -> Result<u64> {
        if self.committed {
            return Err(IndexError::BuilderCommitted);
        }
        self.committed = true;
        let mut children = std::mem::take(&mut self.leaves);
        let mut separators = Vec::with_capacity(children.len().saturating_sub(1));
        for &leaf in children.iter().take(children.len().saturating_sub(1)) {
            let mut entry = BucketMut::new(self.write.page_mut(leaf)?)?.pop_back(leaf)?;
            entry.child = Some(leaf);
            separators.push(entry);
        }
        let mut depth = 0usize;
        while children.len() > 1 {
            if interrupt(depth + 1) {
                tracing::debug!(
                    target: "sombra_index::btree",
                    index = %self.tree.options.index_name,
                    keys = self.count,
                    level = depth + 1,
                    "bulk load interrupted"
                );
                return Err(IndexError::Interrupted);
            }
            (children, separators) = self.build_level(&children, separators)?;
            depth += 1;
        }
        let root = *children
            .first()
            .ok_or(IndexError::Corruption("builder produced no root"))?;
        self.tree.head.set_head(self.write, root)?;
        if let Some(old) = self.old_head.filter(|old| *old != root) {
            self.tree.free_bucket(self.write, old)?;
        }
        tracing::debug!(
            target: "sombra_index::btree",
            index = %self.tree.options.index_name,
            keys = self.count,
            depth,
            root = root.0,
            "bulk load committed"
        );
        self.tree.after_write(&*self.write)?;
        Ok(self.count)
    }

    fn try_push(&mut self, id: PageId, entry: &OwnedEntry) -> Result<bool> {
        let mut bucket = BucketMut::new(self.write.page_mut(id)?)?;
        if !self
            .tree
            .layout
            .count_allows_one_more(bucket.header()?.count as usize)
        {
            return Ok(false);
        }
        bucket.push_back(entry)
    }

    /// Builds the level above `children`, where `separators[i]` sits between
    /// `children[i]` and `children[i + 1]`. Returns the new buckets and the separators
    /// promoted between them.
    fn build_level(
        &mut self,
        children: &[PageId],
        separators: Vec<OwnedEntry>,
    ) -> Result<(Vec<PageId>, Vec<OwnedEntry>)> {
        let last_child = *children
            .last()
            .ok_or(IndexError::Corruption("builder level without children"))?;
        let total = separators.len();
        let mut ups = Vec::new();
        let mut promoted = Vec::new();
        let mut current = self.tree.allocate_bucket(self.write, None)?;
        for (idx, separator) in separators.into_iter().enumerate() {
            if self.try_push(current, &separator)? {
                continue;
            }
            if idx + 1 == total {
                // Closing on the final separator would leave the last bucket empty, so
                // promote the previous entry instead.
                let mut previous = BucketMut::new(self.write.page_mut(current)?)?.pop_back(current)?;
                BucketMut::new(self.write.page_mut(current)?)?.set_next_child(previous.child);
                previous.child = Some(current);
                self.tree.fix_parent_ptrs(self.write, current)?;
                ups.push(current);
                promoted.push(previous);
                current = self.tree.allocate_bucket(self.write, None)?;
                if !self.try_push(current, &separator)? {
                    return Err(IndexError::Corruption("separator does not fit an empty bucket"));
                }
            } else {
                let mut separator = separator;
                BucketMut::new(self.write.page_mut(current)?)?.set_next_child(separator.child);
                separator.child = Some(current);
                self.tree.fix_parent_ptrs(self.write, current)?;
                ups.push(current);
                promoted.push(separator);
                current = self.tree.allocate_bucket(self.write, None)?;
            }
        }
        BucketMut::new(self.write.page_mut(current)?)?.set_next_child(Some(last_child));
        self.tree.fix_parent_ptrs(self.write, current)?;
        ups.push(current);
        Ok((ups, promoted))
    }
}

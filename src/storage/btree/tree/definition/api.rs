impl BTree {
    /// Opens an index over `pager` with explicit head and deletion collaborators.
    pub fn new(
        pager: &Pager,
        options: BTreeOptions,
        head: Arc<dyn HeadManager>,
        deletion: Arc<dyn BucketDeletionNotification>,
    ) -> Result<Self> {
        options.validate()?;
        let ordering = options.ordering()?;
        let layout = Layout::new(pager.page_size() as usize, options.max_entries_per_bucket)?;
        Ok(Self {
            head,
            deletion,
            options,
            ordering,
            layout,
            stats: Arc::new(BTreeStats::default()),
        })
    }

    /// Opens an index whose head lives in the pager catalog under `options.index_name`.
    pub fn with_catalog(pager: &Pager, options: BTreeOptions) -> Result<Self> {
        let head = Arc::new(CatalogHead::new(options.index_name.clone()));
        Self::new(pager, options, head, Arc::new(NoopDeletionNotification))
    }

    /// Options the index was opened with.
    pub fn options(&self) -> &BTreeOptions {
        &self.options
    }

    /// Comparator applied to keys.
    pub fn ordering(&self) -> KeyOrdering {
        self.ordering
    }

    /// Largest accepted encoded key, in bytes.
    pub fn key_max(&self) -> usize {
        self.layout.key_max
    }

    /// Occupancy below which a non-root bucket is rebalanced or merged: an entry count
    /// when `max_entries_per_bucket` is set, packed bytes otherwise.
    pub fn low_water_mark(&self) -> usize {
        match self.layout.max_entries {
            Some(max) => max / 2,
            None => self.layout.low_water,
        }
    }

    /// Current root bucket, re-read from the head collaborator.
    pub fn head(&self, read: &dyn PageRead) -> Result<Option<PageId>> {
        self.head.head(read)
    }

    /// Access the live statistics counters for this index.
    pub fn stats(&self) -> Arc<BTreeStats> {
        Arc::clone(&self.stats)
    }

    /// Snapshot the current statistics counters.
    pub fn stats_snapshot(&self) -> BTreeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Emit the current statistics to the tracing sink.
    pub fn emit_stats(&self) {
        self.stats.emit_tracing();
    }

    /// Allocates an empty root bucket and records it as the head.
    pub fn init_as_empty(&self, write: &mut WriteGuard<'_>) -> Result<PageId> {
        if self.head.head(&*write)?.is_some() {
            return Err(IndexError::AlreadyInitialized);
        }
        let root = self.allocate_bucket(write, None)?;
        self.head.set_head(write, root)?;
        tracing::debug!(
            target: "sombra_index::btree",
            index = %self.options.index_name,
            root = root.0,
            "initialized empty index"
        );
        Ok(root)
    }

    /// Finds `(key, loc)`.
    ///
    /// On a miss the position lands on the nearest live entry in `direction`: the next
    /// greater entry for forward scans, the next smaller one for backward scans.
    pub fn locate(
        &self,
        read: &dyn PageRead,
        key: &IndexKey,
        loc: RecordLoc,
        direction: Direction,
    ) -> Result<Located> {
        let (found, position) = self.locate_raw(read, key.as_key(), loc, direction)?;
        let Some(position) = position else {
            return Ok(Located {
                found: false,
                position: None,
            });
        };
        if found && self.bucket(read, position.bucket)?.is_used(position.slot)? {
            return Ok(Located {
                found: true,
                position: Some(position),
            });
        }
        Ok(Located {
            found: false,
            position: self.skip_unused(read, Some(position), direction)?,
        })
    }

    /// Moves one live entry in `direction`, crossing bucket boundaries as needed.
    pub fn advance(
        &self,
        read: &dyn PageRead,
        position: Position,
        direction: Direction,
    ) -> Result<Option<Position>> {
        let next = self.advance_raw(read, position, direction)?;
        self.skip_unused(read, next, direction)
    }

    /// First live entry in `direction`: the smallest for forward scans, the largest for
    /// backward scans.
    pub fn first(&self, read: &dyn PageRead, direction: Direction) -> Result<Option<Position>> {
        let Some(root) = self.head.head(read)? else {
            return Ok(None);
        };
        let mut current = root;
        loop {
            let bucket = self.bucket(read, current)?;
            if bucket.is_empty() {
                if bucket.next_child().is_some() {
                    return Err(IndexError::Corruption("internal bucket without entries"));
                }
                return Ok(None);
            }
            let slot = match direction {
                Direction::Forward => 0,
                Direction::Backward => bucket.len() - 1,
            };
            let child_slot = match direction {
                Direction::Forward => 0,
                Direction::Backward => bucket.len(),
            };
            match bucket.child(child_slot)? {
                Some(child) => current = child,
                None => {
                    let start = Position {
                        bucket: current,
                        slot,
                    };
                    return self.skip_unused(read, Some(start), direction);
                }
            }
        }
    }

    /// Returns `true` when no live entry is reachable from the head.
    pub fn is_empty(&self, read: &dyn PageRead) -> Result<bool> {
        Ok(self.first(read, Direction::Forward)?.is_none())
    }

    /// Returns `true` if some live entry has a key equal to `key`, whatever its record.
    pub fn exists(&self, read: &dyn PageRead, key: &IndexKey) -> Result<bool> {
        Ok(self.first_live_with_key(read, key)?.is_some())
    }

    /// Fails with [`IndexError::DuplicateKey`] if a live entry equal to `key` belongs to
    /// a record other than `loc`.
    pub fn dup_key_check(&self, read: &dyn PageRead, key: &IndexKey, loc: RecordLoc) -> Result<()> {
        match self.first_live_with_key(read, key)? {
            Some(existing) if existing != loc => Err(IndexError::DuplicateKey {
                index: self.options.index_name.clone(),
                key: key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Key stored at `position`.
    pub fn key_at(&self, read: &dyn PageRead, position: Position) -> Result<IndexKey> {
        Ok(self.bucket(read, position.bucket)?.key(position.slot)?.to_key())
    }

    /// Record location stored at `position`.
    pub fn record_at(&self, read: &dyn PageRead, position: Position) -> Result<RecordLoc> {
        Ok(self.bucket(read, position.bucket)?.entry(position.slot)?.record)
    }

    /// Key and record location stored at `position`.
    pub fn entry_at(&self, read: &dyn PageRead, position: Position) -> Result<(IndexKey, RecordLoc)> {
        let entry = self.bucket(read, position.bucket)?.entry(position.slot)?;
        Ok((entry.key.to_key(), entry.record))
    }

    pub(super) fn bucket<'a>(&self, read: &'a dyn PageRead, id: PageId) -> Result<BucketRef<'a>> {
        BucketRef::new(id, read.page(id)?)
    }

    pub(super) fn compare_entry(
        &self,
        key: KeyRef<'_>,
        loc: RecordLoc,
        other_key: KeyRef<'_>,
        other_loc: RecordLoc,
    ) -> Ordering {
        key.compare(other_key, self.ordering)
            .then_with(|| loc.cmp(&other_loc))
    }

    fn check_key_size(&self, key: &IndexKey) -> Result<()> {
        if key.encoded_len() > self.layout.key_max {
            return Err(IndexError::KeyTooLarge {
                len: key.encoded_len(),
                max: self.layout.key_max,
            });
        }
        Ok(())
    }

    /// Record of the first live entry whose key equals `key`.
    fn first_live_with_key(&self, read: &dyn PageRead, key: &IndexKey) -> Result<Option<RecordLoc>> {
        let (_, mut position) = self.locate_raw(read, key.as_key(), RecordLoc::MIN, Direction::Forward)?;
        while let Some(pos) = position {
            let entry = self.bucket(read, pos.bucket)?.entry(pos.slot)?;
            if entry.used {
                if entry.key.compare(key.as_key(), self.ordering) == Ordering::Equal {
                    return Ok(Some(entry.record));
                }
                return Ok(None);
            }
            position = self.advance_raw(read, pos, Direction::Forward)?;
        }
        Ok(None)
    }

    fn after_write(&self, read: &dyn PageRead) -> Result<()> {
        if self.options.validate_writes {
            self.full_validate(
                read,
                ValidateOptions {
                    strict: true,
                    dump: false,
                },
            )?;
        }
        Ok(())
    }
}

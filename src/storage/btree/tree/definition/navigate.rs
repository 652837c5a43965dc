impl BTree {
    /// Re-resolves a cursor after the tree may have changed underneath it.
    ///
    /// `position` is the cursor's last known slot, or `None` when the bucket it pointed
    /// into was freed. The saved slot is trusted only if it, or the slot before it, still
    /// holds exactly `(saved_key, saved_loc)`; otherwise the pair is located again from
    /// the head.
    pub fn restore_position(
        &self,
        read: &dyn PageRead,
        saved_key: &IndexKey,
        saved_loc: RecordLoc,
        direction: Direction,
        position: Option<Position>,
    ) -> Result<Option<Position>> {
        if let Some(position) = position {
            match self.bucket(read, position.bucket) {
                Ok(bucket) => {
                    let candidates = [Some(position.slot), position.slot.checked_sub(1)];
                    for slot in candidates.into_iter().flatten() {
                        if key_is_at(&bucket, slot, saved_key, saved_loc)? {
                            let here = Position {
                                bucket: position.bucket,
                                slot,
                            };
                            return self.skip_unused(read, Some(here), direction);
                        }
                    }
                }
                Err(IndexError::PageNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(self.locate(read, saved_key, saved_loc, direction)?.position)
    }

    /// Binary search for `(key, loc)` inside one bucket.
    ///
    /// Returns whether an entry compares equal (tombstones included) and the slot of the
    /// first entry not less than the target.
    pub(super) fn search_bucket(
        &self,
        bucket: &BucketRef<'_>,
        key: KeyRef<'_>,
        loc: RecordLoc,
    ) -> Result<(bool, usize)> {
        let mut lo = 0;
        let mut hi = bucket.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = bucket.entry(mid)?;
            match self.compare_entry(entry.key, entry.record, key, loc) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok((true, mid)),
            }
        }
        Ok((false, lo))
    }

    /// Descends from the head looking for `(key, loc)` without skipping tombstones.
    ///
    /// An exact hit reports its slot even when it is a tombstone. A miss reports the
    /// neighbor in `direction`, climbing back through the visited ancestors when the
    /// leaf has no entry on that side.
    pub(super) fn locate_raw(
        &self,
        read: &dyn PageRead,
        key: KeyRef<'_>,
        loc: RecordLoc,
        direction: Direction,
    ) -> Result<(bool, Option<Position>)> {
        let Some(root) = self.head.head(read)? else {
            return Ok((false, None));
        };
        self.stats.inc_searches();
        let mut path: SmallVec<[(PageId, usize, usize); 8]> = SmallVec::new();
        let mut current = root;
        loop {
            let bucket = self.bucket(read, current)?;
            let (found, slot) = self.search_bucket(&bucket, key, loc)?;
            if found {
                return Ok((
                    true,
                    Some(Position {
                        bucket: current,
                        slot,
                    }),
                ));
            }
            path.push((current, slot, bucket.len()));
            match bucket.child(slot)? {
                Some(child) => current = child,
                None => break,
            }
        }
        while let Some((bucket, slot, len)) = path.pop() {
            match direction {
                Direction::Forward if slot < len => {
                    return Ok((false, Some(Position { bucket, slot })));
                }
                Direction::Backward if slot > 0 => {
                    return Ok((
                        false,
                        Some(Position {
                            bucket,
                            slot: slot - 1,
                        }),
                    ));
                }
                _ => {}
            }
        }
        Ok((false, None))
    }

    /// Steps to the adjacent entry in key order, tombstones included.
    pub(super) fn advance_raw(
        &self,
        read: &dyn PageRead,
        position: Position,
        direction: Direction,
    ) -> Result<Option<Position>> {
        let bucket = self.bucket(read, position.bucket)?;
        if position.slot >= bucket.len() {
            return Err(IndexError::Invalid("position past end of bucket"));
        }
        // The subtree between this entry and its neighbor comes first.
        let down_slot = match direction {
            Direction::Forward => position.slot + 1,
            Direction::Backward => position.slot,
        };
        if let Some(mut down) = bucket.child(down_slot)? {
            loop {
                let child = self.bucket(read, down)?;
                if child.is_empty() {
                    return Err(IndexError::Corruption("empty bucket below internal entry"));
                }
                let (slot, next_slot) = match direction {
                    Direction::Forward => (0, 0),
                    Direction::Backward => (child.len() - 1, child.len()),
                };
                match child.child(next_slot)? {
                    Some(next) => down = next,
                    None => return Ok(Some(Position { bucket: down, slot })),
                }
            }
        }
        let within = match direction {
            Direction::Forward => Some(position.slot + 1).filter(|slot| *slot < bucket.len()),
            Direction::Backward => position.slot.checked_sub(1),
        };
        if let Some(slot) = within {
            return Ok(Some(Position {
                bucket: position.bucket,
                slot,
            }));
        }
        let mut child = position.bucket;
        let mut ancestor = bucket.parent();
        while let Some(parent_id) = ancestor {
            let parent = self.bucket(read, parent_id)?;
            let idx = parent
                .index_of_child(child)?
                .ok_or(IndexError::Corruption("child missing from its parent"))?;
            match direction {
                Direction::Forward if idx < parent.len() => {
                    return Ok(Some(Position {
                        bucket: parent_id,
                        slot: idx,
                    }));
                }
                Direction::Backward if idx > 0 => {
                    return Ok(Some(Position {
                        bucket: parent_id,
                        slot: idx - 1,
                    }));
                }
                _ => {}
            }
            child = parent_id;
            ancestor = parent.parent();
        }
        Ok(None)
    }

    /// Moves past tombstones in `direction`.
    pub(super) fn skip_unused(
        &self,
        read: &dyn PageRead,
        mut position: Option<Position>,
        direction: Direction,
    ) -> Result<Option<Position>> {
        while let Some(pos) = position {
            if self.bucket(read, pos.bucket)?.is_used(pos.slot)? {
                break;
            }
            position = self.advance_raw(read, pos, direction)?;
        }
        Ok(position)
    }

    /// Slot of `child` in its parent.
    pub(super) fn index_in_parent(
        &self,
        read: &dyn PageRead,
        parent: PageId,
        child: PageId,
    ) -> Result<usize> {
        self.bucket(read, parent)?
            .index_of_child(child)?
            .ok_or(IndexError::Corruption("child missing from its parent"))
    }
}

fn key_is_at(
    bucket: &BucketRef<'_>,
    slot: usize,
    key: &IndexKey,
    loc: RecordLoc,
) -> Result<bool> {
    if slot >= bucket.len() {
        return Ok(false);
    }
    let entry = bucket.entry(slot)?;
    Ok(entry.record == loc && entry.key.as_bytes() == key.as_bytes())
}

/// Slot to fall back to when a seek runs off a leaf: the closest ancestor entry still
/// ahead of the target.
type BestParent = Option<Position>;

impl BTree {
    /// Positions at the first live entry satisfying `bound` when scanning in `direction`.
    pub fn custom_locate(
        &self,
        read: &dyn PageRead,
        bound: &SeekBound,
        direction: Direction,
    ) -> Result<Option<Position>> {
        let Some(root) = self.head.head(read)? else {
            return Ok(None);
        };
        self.stats.inc_searches();
        let mut best_parent = None;
        let position = self.custom_locate_from(read, root, bound, direction, &mut best_parent)?;
        self.skip_unused(read, position, direction)
    }

    /// Moves a scan forward to the first live entry satisfying `bound`, starting from
    /// `position` and only climbing as far up the tree as needed.
    pub fn advance_to(
        &self,
        read: &dyn PageRead,
        position: Position,
        bound: &SeekBound,
        direction: Direction,
    ) -> Result<Option<Position>> {
        let ahead = |ord: Ordering| match direction {
            Direction::Forward => ord != Ordering::Less,
            Direction::Backward => ord != Ordering::Greater,
        };
        let mut bucket = self.bucket(read, position.bucket)?;
        if ahead(self.bound_cmp(bound, bucket.key(position.slot)?, direction)) {
            return self.skip_unused(read, Some(position), direction);
        }
        let (low, high, edge) = match direction {
            Direction::Forward => (position.slot, bucket.len() - 1, bucket.len() - 1),
            Direction::Backward => (0, position.slot, 0),
        };
        let mut best_parent = None;
        let mut current = position.bucket;
        if ahead(self.bound_cmp(bound, bucket.key(edge)?, direction)) {
            return match self.custom_find(read, current, low, high, bound, direction, &mut best_parent)? {
                SeekStep::Settled(position) => self.skip_unused(read, Some(position), direction),
                SeekStep::Descend(child) => {
                    let position =
                        self.custom_locate_from(read, child, bound, direction, &mut best_parent)?;
                    self.skip_unused(read, position, direction)
                }
            };
        }
        while let Some(parent) = bucket.parent() {
            current = parent;
            bucket = self.bucket(read, current)?;
            if bucket.is_empty() {
                return Err(IndexError::Corruption("internal bucket without entries"));
            }
            let edge = match direction {
                Direction::Forward => bucket.len() - 1,
                Direction::Backward => 0,
            };
            if ahead(self.bound_cmp(bound, bucket.key(edge)?, direction)) {
                break;
            }
        }
        let position = self.custom_locate_from(read, current, bound, direction, &mut best_parent)?;
        self.skip_unused(read, position, direction)
    }

    fn bound_cmp(&self, bound: &SeekBound, key: KeyRef<'_>, direction: Direction) -> Ordering {
        bound.compare(key, self.ordering, direction)
    }

    /// Descends from `start` toward the first entry satisfying `bound`, tombstones included.
    fn custom_locate_from(
        &self,
        read: &dyn PageRead,
        start: PageId,
        bound: &SeekBound,
        direction: Direction,
        best_parent: &mut BestParent,
    ) -> Result<Option<Position>> {
        let mut current = start;
        loop {
            let bucket = self.bucket(read, current)?;
            if bucket.is_empty() {
                return Ok(None);
            }
            let last = bucket.len() - 1;
            let (near, far) = match direction {
                Direction::Forward => (0, last),
                Direction::Backward => (last, 0),
            };
            let near_cmp = self.bound_cmp(bound, bucket.key(near)?, direction);
            let near_ahead = match direction {
                Direction::Forward => near_cmp != Ordering::Less,
                Direction::Backward => near_cmp != Ordering::Greater,
            };
            if near_ahead {
                let down = match direction {
                    Direction::Forward => bucket.child(0)?,
                    Direction::Backward => bucket.next_child(),
                };
                let here = Position {
                    bucket: current,
                    slot: near,
                };
                match down {
                    Some(child) => {
                        *best_parent = Some(here);
                        current = child;
                        continue;
                    }
                    None => return Ok(Some(here)),
                }
            }
            let far_cmp = self.bound_cmp(bound, bucket.key(far)?, direction);
            let far_behind = match direction {
                Direction::Forward => far_cmp == Ordering::Less,
                Direction::Backward => far_cmp == Ordering::Greater,
            };
            if far_behind {
                let down = match direction {
                    Direction::Forward => bucket.next_child(),
                    Direction::Backward => bucket.child(0)?,
                };
                match down {
                    Some(child) => {
                        current = child;
                        continue;
                    }
                    None => return Ok(*best_parent),
                }
            }
            match self.custom_find(read, current, 0, last, bound, direction, best_parent)? {
                SeekStep::Settled(position) => return Ok(Some(position)),
                SeekStep::Descend(child) => current = child,
            }
        }
    }

    /// Narrows `[low, high]` to adjacent slots straddling the target, where the bound
    /// is known to lie after `low` and at or before `high` in key order.
    #[allow(clippy::too_many_arguments)]
    fn custom_find(
        &self,
        read: &dyn PageRead,
        id: PageId,
        mut low: usize,
        mut high: usize,
        bound: &SeekBound,
        direction: Direction,
        best_parent: &mut BestParent,
    ) -> Result<SeekStep> {
        let bucket = self.bucket(read, id)?;
        loop {
            if low + 1 >= high {
                let slot = match direction {
                    Direction::Forward => high,
                    Direction::Backward => low,
                };
                let here = Position { bucket: id, slot };
                return match bucket.child(high)? {
                    Some(child) => {
                        *best_parent = Some(here);
                        Ok(SeekStep::Descend(child))
                    }
                    None => Ok(SeekStep::Settled(here)),
                };
            }
            let middle = low + (high - low) / 2;
            match self.bound_cmp(bound, bucket.key(middle)?, direction) {
                Ordering::Less => low = middle,
                Ordering::Greater => high = middle,
                Ordering::Equal => match direction {
                    Direction::Forward => high = middle,
                    Direction::Backward => low = middle,
                },
            }
        }
    }
}

enum SeekStep {
    Settled(Position),
    Descend(PageId),
}

struct ValidateFrame {
    id: PageId,
    parent: Option<PageId>,
    depth: usize,
    lower: Option<(IndexKey, RecordLoc)>,
    upper: Option<(IndexKey, RecordLoc)>,
}

impl BTree {
    /// Walks every bucket reachable from the head and checks structural invariants.
    ///
    /// Checked: entry order inside each bucket, entries against the separators above
    /// them, parent pointers, header byte accounting, leaf depth, and live/tombstone
    /// counts. In strict mode any issue panics, since mutating a corrupt tree risks
    /// silent data loss; otherwise issues are logged and returned in the report.
    pub fn full_validate(&self, read: &dyn PageRead, options: ValidateOptions) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let mut dump = options.dump.then(String::new);
        let Some(root) = self.head.head(read)? else {
            report.dump = dump;
            return Ok(report);
        };
        let mut leaf_depth: Option<usize> = None;
        let mut visited = HashSet::new();
        let mut stack = vec![ValidateFrame {
            id: root,
            parent: None,
            depth: 0,
            lower: None,
            upper: None,
        }];
        while let Some(frame) = stack.pop() {
            let id = frame.id;
            if !visited.insert(id) {
                report.issues.push(format!("bucket {id}: reachable more than once"));
                continue;
            }
            let bucket = match self.bucket(read, id) {
                Ok(bucket) => bucket,
                Err(IndexError::Corruption(msg)) => {
                    report.issues.push(format!("bucket {id}: {msg}"));
                    continue;
                }
                Err(err) => return Err(err),
            };
            report.buckets += 1;
            report.depth = report.depth.max(frame.depth);
            if bucket.parent() != frame.parent {
                report.issues.push(format!(
                    "bucket {id}: parent pointer {:?} expected {:?}",
                    bucket.parent(),
                    frame.parent
                ));
            }
            let entries = match bucket.entries() {
                Ok(entries) => entries,
                Err(IndexError::Corruption(msg)) => {
                    report.issues.push(format!("bucket {id}: {msg}"));
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Some(out) = dump.as_mut() {
                let indent = "  ".repeat(frame.depth);
                let _ = writeln!(
                    out,
                    "{indent}bucket {id} n={} leaf={} parent={:?}",
                    entries.len(),
                    bucket.is_leaf(),
                    bucket.parent()
                );
                for entry in &entries {
                    let marker = if entry.used { "" } else { " (unused)" };
                    let _ = writeln!(out, "{indent}  {} @ {}{marker}", entry.key, entry.record);
                }
            }

            let mut previous = frame.lower.as_ref().map(|(key, loc)| (key.as_key(), *loc));
            for (slot, entry) in entries.iter().enumerate() {
                if entry.used {
                    report.live_keys += 1;
                } else {
                    report.unused_keys += 1;
                }
                if let Some((key, loc)) = previous {
                    if self.compare_entry(key, loc, entry.key.as_key(), entry.record) != Ordering::Less {
                        report.issues.push(format!("bucket {id}: entry {slot} out of order"));
                    }
                }
                previous = Some((entry.key.as_key(), entry.record));
            }
            if let (Some((key, loc)), Some((upper_key, upper_loc))) = (previous, frame.upper.as_ref()) {
                if self.compare_entry(key, loc, upper_key.as_key(), *upper_loc) != Ordering::Less {
                    report
                        .issues
                        .push(format!("bucket {id}: entries exceed the separator above"));
                }
            }

            if bucket.is_leaf() {
                if entries.iter().any(|entry| entry.child.is_some()) {
                    report.issues.push(format!("bucket {id}: leaf entry with a child"));
                }
                match leaf_depth {
                    None => leaf_depth = Some(frame.depth),
                    Some(depth) if depth != frame.depth => {
                        report
                            .issues
                            .push(format!("bucket {id}: leaf at depth {} expected {depth}", frame.depth));
                    }
                    Some(_) => {}
                }
                continue;
            }
            if entries.is_empty() {
                report.issues.push(format!("bucket {id}: internal bucket without entries"));
            }
            for slot in (0..=entries.len()).rev() {
                let child = match bucket.child(slot)? {
                    Some(child) => child,
                    None => {
                        report.issues.push(format!("bucket {id}: missing child {slot}"));
                        continue;
                    }
                };
                let lower = match slot {
                    0 => frame.lower.clone(),
                    _ => Some((entries[slot - 1].key.clone(), entries[slot - 1].record)),
                };
                let upper = match entries.get(slot) {
                    Some(entry) => Some((entry.key.clone(), entry.record)),
                    None => frame.upper.clone(),
                };
                stack.push(ValidateFrame {
                    id: child,
                    parent: Some(id),
                    depth: frame.depth + 1,
                    lower,
                    upper,
                });
            }
        }
        report.dump = dump;

        if !report.is_valid() {
            if options.strict {
                panic!(
                    "index {} failed validation: {:?}",
                    self.options.index_name, report.issues
                );
            }
            for issue in &report.issues {
                tracing::warn!(
                    target: "sombra_index::validate",
                    index = %self.options.index_name,
                    %issue,
                    "index validation issue"
                );
            }
        }
        Ok(report)
    }
}

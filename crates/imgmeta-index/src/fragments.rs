//! The fragment set of a single object.
//!
//! [`ObjectFragments`] keeps records keyed by index, plus a secondary map
//! from start offset to index. Because stored records never conflict, start
//! offsets are unique and index order equals byte order, so both point and
//! range lookups resolve through one ordered-map probe.

use std::collections::BTreeMap;
use std::ops::Bound;

use imgmeta_types::{FragmentRecord, MetaError, ObjectSummary, Result};

/// Result of a successful store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The record was added. `new_object` is set for the object's first record.
    Inserted { new_object: bool },
    /// An identical record was already stored; nothing changed.
    Unchanged,
}

impl StoreOutcome {
    /// Returns `true` if the store changed state.
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }

    /// Returns `true` if the store created the object.
    pub fn is_new_object(&self) -> bool {
        matches!(self, Self::Inserted { new_object: true })
    }
}

/// All fragment records of one object path.
#[derive(Clone, Debug, Default)]
pub struct ObjectFragments {
    by_index: BTreeMap<u64, FragmentRecord>,
    by_start: BTreeMap<u64, u64>,
    last: Option<u64>,
}

impl ObjectFragments {
    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// The terminal record, if stored.
    pub fn last(&self) -> Option<&FragmentRecord> {
        self.last.and_then(|index| self.by_index.get(&index))
    }

    /// The record with the highest index.
    pub fn highest(&self) -> Option<&FragmentRecord> {
        self.by_index.values().next_back()
    }

    /// Decide whether `record` can be stored, without changing anything.
    ///
    /// `path` is only used for error context.
    pub fn check(&self, path: &str, record: &FragmentRecord) -> Result<StoreOutcome> {
        record.validate()?;

        if let Some(existing) = self.by_index.get(&record.index) {
            if existing == record {
                return Ok(StoreOutcome::Unchanged);
            }
            return Err(MetaError::DuplicateIndex {
                path: path.to_string(),
                index: record.index,
            });
        }

        if let Some(existing) = self.conflicting(record) {
            return Err(MetaError::Overlap {
                path: path.to_string(),
                index: record.index,
                start: record.start,
                end: record.end,
                existing: existing.index,
            });
        }

        if record.is_last {
            if let Some(last) = self.last() {
                return Err(MetaError::MultipleLastFragment {
                    path: path.to_string(),
                    index: record.index,
                    existing: last.index,
                });
            }
        }

        let before = self.by_index.range(..record.index).next_back();
        if let Some((_, prev)) = before {
            if !prev.precedes(record) {
                return Err(MetaError::OutOfOrder {
                    path: path.to_string(),
                    index: record.index,
                    existing: prev.index,
                });
            }
        }
        let after = self
            .by_index
            .range((Bound::Excluded(record.index), Bound::Unbounded))
            .next();
        if let Some((_, next)) = after {
            if !record.precedes(next) {
                return Err(MetaError::OutOfOrder {
                    path: path.to_string(),
                    index: record.index,
                    existing: next.index,
                });
            }
            if record.is_last {
                return Err(MetaError::BeyondLastFragment {
                    path: path.to_string(),
                    index: next.index,
                    last: record.index,
                });
            }
        }

        if let Some(last) = self.last() {
            if record.index > last.index {
                return Err(MetaError::BeyondLastFragment {
                    path: path.to_string(),
                    index: record.index,
                    last: last.index,
                });
            }
        }

        Ok(StoreOutcome::Inserted {
            new_object: self.is_empty(),
        })
    }

    /// Add a record previously accepted by [`check`](Self::check).
    pub fn insert(&mut self, record: FragmentRecord) {
        if record.is_last {
            self.last = Some(record.index);
        }
        self.by_start.insert(record.start, record.index);
        self.by_index.insert(record.index, record);
    }

    /// Check and insert in one step.
    pub fn store(&mut self, path: &str, record: FragmentRecord) -> Result<StoreOutcome> {
        let outcome = self.check(path, &record)?;
        if outcome.is_inserted() {
            self.insert(record);
        }
        Ok(outcome)
    }

    /// Records ordered by index.
    pub fn ordered(&self) -> Vec<FragmentRecord> {
        self.by_index.values().copied().collect()
    }

    /// The record stored under `index`.
    pub fn get_by_index(&self, index: u64) -> Option<&FragmentRecord> {
        self.by_index.get(&index)
    }

    /// The record covering `[start, end)`; see [`FragmentRecord::covers`].
    pub fn get_by_range(&self, path: &str, start: u64, end: u64) -> Result<FragmentRecord> {
        if start > end {
            return Err(MetaError::InvalidRange { start, end });
        }

        // The covering record has the greatest start <= `start`. Its
        // predecessor is probed too so a conflicting pair that slipped past
        // `check` is reported instead of silently picked.
        let matches: Vec<&FragmentRecord> = self
            .by_start
            .range(..=start)
            .rev()
            .take(2)
            .filter_map(|(_, index)| self.by_index.get(index))
            .filter(|record| record.covers(start, end))
            .collect();

        match matches.as_slice() {
            [] => Err(MetaError::fragment_not_found(
                path,
                format!("fragment covering [{start}, {end})"),
            )),
            [record] => Ok(**record),
            _ => Err(MetaError::RangeAmbiguous {
                path: path.to_string(),
                start,
                end,
                matches: matches.len(),
            }),
        }
    }

    /// Completeness summary.
    pub fn summary(&self) -> ObjectSummary {
        ObjectSummary::from_ordered(&self.ordered())
    }

    fn conflicting(&self, record: &FragmentRecord) -> Option<&FragmentRecord> {
        let at_or_before = self
            .by_start
            .range(..=record.start)
            .next_back()
            .map(|(_, index)| index);
        // A zero-length record has nothing strictly inside it, and an empty
        // doubly-excluded range would panic.
        let inside = (record.start < record.end)
            .then(|| {
                self.by_start
                    .range((Bound::Excluded(record.start), Bound::Excluded(record.end)))
                    .map(|(_, index)| index)
            })
            .into_iter()
            .flatten();

        at_or_before
            .into_iter()
            .chain(inside)
            .filter_map(|index| self.by_index.get(index))
            .find(|existing| record.conflicts_with(existing))
    }
}

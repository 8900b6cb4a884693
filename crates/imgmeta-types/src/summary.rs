//! Completeness summary of a stored object.

use serde::{Deserialize, Serialize};

use crate::record::FragmentRecord;

/// What is known about an object without listing every fragment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Number of stored fragments.
    pub fragment_count: usize,
    /// Whether the terminal fragment has arrived.
    pub complete: bool,
    /// Total object size, known once the object is complete.
    pub size: Option<u64>,
    /// Sum of the stored fragment lengths.
    pub covered_bytes: u64,
    /// Whether fragments tile `[0, max end)` without gaps.
    pub contiguous: bool,
    /// The terminal fragment, if stored.
    pub last: Option<FragmentRecord>,
}

impl ObjectSummary {
    /// Summarize records already ordered by index.
    pub fn from_ordered(records: &[FragmentRecord]) -> Self {
        let last = records.iter().find(|r| r.is_last).copied();
        let mut expected_start = 0;
        let mut contiguous = true;
        for record in records {
            if record.start != expected_start {
                contiguous = false;
            }
            expected_start = record.end;
        }
        Self {
            fragment_count: records.len(),
            complete: last.is_some(),
            size: last.map(|r| r.end),
            covered_bytes: records.iter().map(FragmentRecord::len).sum(),
            contiguous,
            last,
        }
    }

    /// Returns `true` when every byte of a complete object is stored.
    pub fn is_fully_stored(&self) -> bool {
        self.complete && self.contiguous
    }
}

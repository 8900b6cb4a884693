//! Fragment records and the ingest-facing [`MetaInfo`] envelope.
//!
//! Field names serialize in the `PascalCase` form the ingest layer emits
//! (`Index`, `Start`, `End`, `GroupId`, `FileId`, `IsLast`).

use serde::{Deserialize, Serialize};

use crate::error::{MetaError, Result};

/// Identifier of a storage group (shard) holding fragment bytes.
///
/// Zero doubles as "unassigned"; see [`FragmentRecord::is_unassigned`].
pub type GroupId = u16;

/// Identifier of a physical backend file inside a group.
pub type FileId = u64;

/// One contiguous stored chunk of an object.
///
/// Records are immutable once stored. The byte range is half-open:
/// `[start, end)`. A zero-length record (`start == end`) stands for the
/// position `start` itself, which is how an empty object or a trailing
/// completion fragment is described.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentRecord {
    /// Sequence number ordering fragments within the object.
    pub index: u64,
    /// First byte offset covered.
    pub start: u64,
    /// One past the last byte offset covered.
    pub end: u64,
    /// Storage group holding the bytes.
    #[serde(default)]
    pub group_id: GroupId,
    /// Backend file within the group.
    #[serde(default)]
    pub file_id: FileId,
    /// Whether this is the object's terminal fragment.
    pub is_last: bool,
}

impl FragmentRecord {
    /// Create a record that is not the object's last fragment.
    pub fn new(index: u64, start: u64, end: u64, group_id: GroupId, file_id: FileId) -> Self {
        Self {
            index,
            start,
            end,
            group_id,
            file_id,
            is_last: false,
        }
    }

    /// Mark this record as the object's terminal fragment.
    pub fn into_last(mut self) -> Self {
        self.is_last = true;
        self
    }

    /// Reject records whose range runs backwards.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(MetaError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` for a zero-length record.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns `true` if the group or file id carries the zero sentinel.
    ///
    /// Zero is stored as given; whether it means "unassigned" or a literal
    /// id zero is for the caller to decide.
    pub fn is_unassigned(&self) -> bool {
        self.group_id == 0 || self.file_id == 0
    }

    /// Whether this record holds the whole of `[start, end)`.
    ///
    /// An empty query `start == end` is a point lookup for byte `start`:
    /// it matches the record containing that byte, or a zero-length record
    /// sitting exactly at `start`.
    pub fn covers(&self, start: u64, end: u64) -> bool {
        if start < end {
            self.start <= start && end <= self.end
        } else if start == end {
            if self.is_empty() {
                self.start == start
            } else {
                self.start <= start && start < self.end
            }
        } else {
            false
        }
    }

    /// Whether the two records claim a common byte or position.
    pub fn conflicts_with(&self, other: &FragmentRecord) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (false, false) => self.start < other.end && other.start < self.end,
            (true, _) => other.covers(self.start, self.start),
            (false, true) => self.covers(other.start, other.start),
        }
    }

    /// Whether this record lies entirely before `other` in byte order.
    pub fn precedes(&self, other: &FragmentRecord) -> bool {
        self.end <= other.start
    }
}

/// A path and the fragment record to store under it.
///
/// `value` is absent only for directory markers, which carry no fragment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaInfo {
    /// Object or directory-marker path.
    pub path: String,
    /// Fragment to record for an object path.
    pub value: Option<FragmentRecord>,
}

impl MetaInfo {
    /// Envelope for a fragment of an object.
    pub fn fragment(path: impl Into<String>, record: FragmentRecord) -> Self {
        Self {
            path: path.into(),
            value: Some(record),
        }
    }

    /// Envelope for a directory marker.
    pub fn marker(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: None,
        }
    }
}

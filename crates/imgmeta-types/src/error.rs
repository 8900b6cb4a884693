//! Error types shared by all imgmeta layers.

use thiserror::Error;

/// Errors that can occur while storing or querying object metadata.
#[derive(Debug, Error)]
pub enum MetaError {
    /// The path is malformed and cannot be normalized.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// No object, or no fragment matching the query, exists at the path.
    #[error("{what} not found: {path}")]
    NotFound { path: String, what: String },

    /// A different record is already stored under the same index.
    #[error("fragment index {index} already stored with different contents: {path}")]
    DuplicateIndex { path: String, index: u64 },

    /// The byte range overlaps a fragment already stored for the path.
    #[error("fragment {index} [{start}, {end}) overlaps fragment {existing}: {path}")]
    Overlap {
        path: String,
        index: u64,
        start: u64,
        end: u64,
        existing: u64,
    },

    /// Another fragment of the object is already marked as the last one.
    #[error("fragment {index} marked last but fragment {existing} already is: {path}")]
    MultipleLastFragment {
        path: String,
        index: u64,
        existing: u64,
    },

    /// More than one stored fragment covers the requested range.
    #[error("range [{start}, {end}) matches {matches} fragments: {path}")]
    RangeAmbiguous {
        path: String,
        start: u64,
        end: u64,
        matches: usize,
    },

    /// An index and a range were both given and they disagree.
    #[error("fragment {index} does not cover [{start}, {end}): {path}")]
    AmbiguousQuery {
        path: String,
        index: u64,
        start: u64,
        end: u64,
    },

    /// A byte range with `start > end`.
    #[error("invalid range [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },

    /// Index order disagrees with byte order.
    #[error("fragment {index} is out of order relative to fragment {existing}: {path}")]
    OutOfOrder {
        path: String,
        index: u64,
        existing: u64,
    },

    /// A fragment would follow the object's last fragment.
    #[error("fragment {index} lies beyond last fragment {last}: {path}")]
    BeyondLastFragment { path: String, index: u64, last: u64 },

    /// A non-directory path was stored without a fragment record.
    #[error("missing fragment record for object path: {path}")]
    MissingValue { path: String },

    /// A lock guarding index state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// I/O error from the journal or config file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl MetaError {
    /// `NotFound` for an object with no stored fragments.
    pub fn object_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            what: "object".into(),
        }
    }

    /// `NotFound` for a fragment query that matched nothing.
    pub fn fragment_not_found(path: impl Into<String>, what: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            what: what.into(),
        }
    }

    /// Returns `true` for a missing object or fragment.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for errors that signal inconsistent fragment data.
    ///
    /// These are surfaced to the caller and never resolved in place.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateIndex { .. }
                | Self::Overlap { .. }
                | Self::MultipleLastFragment { .. }
                | Self::RangeAmbiguous { .. }
                | Self::OutOfOrder { .. }
                | Self::BeyondLastFragment { .. }
        )
    }
}

/// Convenience type alias for imgmeta operations.
pub type Result<T> = std::result::Result<T, MetaError>;

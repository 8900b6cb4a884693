//! Mutation records and the [`Journal`] hook the driver writes them to.

use imgmeta_types::{MetaInfo, Result};
use serde::{Deserialize, Serialize};

/// One accepted mutation, in the form it is journaled and replayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    /// A fragment or directory marker was stored (canonical path).
    Store(MetaInfo),
    /// An object and/or marker was deleted (canonical path).
    Delete(String),
}

/// Sink for accepted mutations.
///
/// The driver calls [`record`](Journal::record) inside the path's critical
/// section, after validation and before the indexes change. An error aborts
/// the mutation.
pub trait Journal: Send + Sync {
    /// Persist `entry`.
    fn record(&self, entry: &LogRecord) -> Result<()>;
}

/// A journal that keeps nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoJournal;

impl Journal for NoJournal {
    fn record(&self, _entry: &LogRecord) -> Result<()> {
        Ok(())
    }
}

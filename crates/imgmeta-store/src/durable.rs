//! Log-backed driver: the in-memory indexes rebuilt from [`MetaLog`] on
//! open.

use std::fs;
use std::path::Path;

use imgmeta_path::PathCodec;
use imgmeta_types::{MetaInfo, Result};
use serde::Serialize;
use tracing::info;

use crate::config::MetaConfig;
use crate::driver::MetaStore;
use crate::journal::LogRecord;
use crate::log::{MetaLog, SyncMode, LOG_FILE_NAME};

/// Metadata store that journals every accepted mutation to `meta.log`.
pub type DurableMetaDriver = MetaStore<MetaLog>;

/// What a [`compact`](MetaStore::compact) pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CompactionStats {
    /// Records in the rewritten log.
    pub records: usize,
    /// Log size in bytes before the rewrite.
    pub bytes_before: u64,
    /// Log size in bytes after the rewrite.
    pub bytes_after: u64,
}

impl MetaStore<MetaLog> {
    /// Open the store in `config.storage.data_dir`, replaying its log.
    pub fn open(config: &MetaConfig) -> Result<Self> {
        config.validate()?;
        Self::open_in(
            &config.storage.data_dir,
            config.codec()?,
            config.index.shards,
            config.storage.sync,
        )
    }

    /// Open the store in `dir`, creating the directory and log if needed.
    pub fn open_in(dir: &Path, codec: PathCodec, shards: usize, sync: SyncMode) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let log = MetaLog::open(&dir.join(LOG_FILE_NAME), sync)?;
        let records = log.recover()?;
        let recovered = records.len();

        let store = Self::with_journal(codec, shards, log);
        let applied = store.replay(records);
        info!(
            path = %store.journal.path().display(),
            recovered,
            applied,
            objects = store.fragments.object_count()?,
            "metadata store opened"
        );
        Ok(store)
    }

    /// Rewrite the log as a snapshot of the current state.
    ///
    /// Mutations are blocked for the duration. The snapshot holds one
    /// record per directory marker and per stored fragment.
    pub fn compact(&self) -> Result<CompactionStats> {
        let frozen = self.fragments.freeze()?;
        let markers = self.directories.markers()?;

        let mut records: Vec<LogRecord> = markers
            .iter()
            .filter_map(|dir| self.codec.marker_for(dir))
            .map(|marker| LogRecord::Store(MetaInfo::marker(marker.into_string())))
            .collect();
        for (path, fragments) in frozen.entries() {
            records.extend(
                fragments
                    .into_iter()
                    .map(|record| LogRecord::Store(MetaInfo::fragment(path.as_str(), record))),
            );
        }

        let bytes_before = self.journal.offset()?;
        self.journal.rewrite(&records)?;
        let stats = CompactionStats {
            records: records.len(),
            bytes_before,
            bytes_after: self.journal.offset()?,
        };
        drop(frozen);

        info!(
            records = stats.records,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "metadata log compacted"
        );
        Ok(stats)
    }
}

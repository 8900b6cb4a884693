//! [`MetaStore`]: the path codec, fragment index and directory index behind
//! one [`MetaDriver`] implementation.
//!
//! Every mutation runs inside the critical section of one path:
//!
//! 1. normalize the path and take its shard lock,
//! 2. validate against the current records,
//! 3. update the directory index,
//! 4. hand the mutation to the [`Journal`], undoing step 3 if it fails,
//! 5. update the fragment index.
//!
//! The directory and journal locks are only taken under a shard lock, and
//! never at the same time.

use imgmeta_index::{DirectoryIndex, FragmentIndex, StoreOutcome, DEFAULT_SHARDS};
use imgmeta_path::{CanonicalPath, PathCodec};
use imgmeta_types::{FragmentRecord, MetaError, MetaInfo, ObjectSummary, Result};
use tracing::{debug, warn};

use crate::config::MetaConfig;
use crate::journal::{Journal, LogRecord, NoJournal};
use crate::traits::MetaDriver;

/// A metadata store writing accepted mutations to journal `J`.
pub struct MetaStore<J = NoJournal> {
    pub(crate) codec: PathCodec,
    pub(crate) fragments: FragmentIndex,
    pub(crate) directories: DirectoryIndex,
    pub(crate) journal: J,
}

/// Metadata store without persistence.
pub type InMemoryMetaDriver = MetaStore<NoJournal>;

impl MetaStore<NoJournal> {
    /// Create an empty in-memory store with the default namespace.
    pub fn new() -> Self {
        Self::with_journal(PathCodec::default(), DEFAULT_SHARDS, NoJournal)
    }

    /// Create an empty in-memory store from validated configuration.
    pub fn from_config(config: &MetaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_journal(
            config.codec()?,
            config.index.shards,
            NoJournal,
        ))
    }
}

impl Default for MetaStore<NoJournal> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J: Journal> MetaStore<J> {
    /// Create an empty store over `codec` with `shards` lock shards.
    pub fn with_journal(codec: PathCodec, shards: usize, journal: J) -> Self {
        Self {
            directories: DirectoryIndex::new(codec.clone()),
            fragments: FragmentIndex::new(shards),
            codec,
            journal,
        }
    }

    /// The codec paths are normalized with.
    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    /// The journal mutations are written to.
    pub fn journal(&self) -> &J {
        &self.journal
    }

    /// Number of objects with at least one fragment.
    pub fn object_count(&self) -> Result<usize> {
        self.fragments.object_count()
    }

    /// Every directory registered through an explicit marker.
    pub fn markers(&self) -> Result<Vec<CanonicalPath>> {
        self.directories.markers()
    }

    /// Returns `true` if `path` is the root, has children, or is marked.
    pub fn is_directory(&self, path: &str) -> Result<bool> {
        let dir = self.codec.normalize(path)?;
        self.directories.is_directory(&dir)
    }

    /// Apply recovered records without journaling them again.
    ///
    /// Records that no longer apply are logged and skipped. Returns the
    /// number of records applied.
    pub(crate) fn replay(&self, records: impl IntoIterator<Item = LogRecord>) -> usize {
        let mut applied = 0;
        for record in records {
            let result = match &record {
                LogRecord::Store(info) => self.store_with(info, &NoJournal).map(|_| ()),
                LogRecord::Delete(path) => self.delete_with(path, &NoJournal).map(|_| ()),
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => warn!(?record, error = %e, "skipping unreplayable log record"),
            }
        }
        applied
    }

    fn store_with(&self, info: &MetaInfo, journal: &dyn Journal) -> Result<StoreOutcome> {
        let path = self.codec.normalize(&info.path)?;
        if self.codec.is_root(&path) {
            return Err(MetaError::InvalidPath {
                path: info.path.clone(),
                reason: "the root directory cannot hold metadata".into(),
            });
        }
        if self.codec.is_directory_marker(&path) {
            return self.store_marker(&path, journal);
        }

        let record = info.value.ok_or_else(|| MetaError::MissingValue {
            path: path.to_string(),
        })?;
        let mut guard = self.fragments.lock(&path)?;
        let outcome = guard.check(&record).inspect_err(|e| {
            debug!(path = %path, index = record.index, error = %e, "fragment rejected");
        })?;
        if !outcome.is_inserted() {
            return Ok(outcome);
        }

        let new_object = outcome.is_new_object();
        if new_object {
            self.directories.insert_object(&path)?;
        }
        let entry = LogRecord::Store(MetaInfo::fragment(path.as_str(), record));
        if let Err(e) = journal.record(&entry) {
            if new_object {
                undo(&path, self.directories.remove_object(&path));
            }
            return Err(e);
        }
        guard.insert(record);
        Ok(outcome)
    }

    fn store_marker(&self, marker: &CanonicalPath, journal: &dyn Journal) -> Result<StoreOutcome> {
        let dir = self
            .codec
            .marker_target(marker)
            .ok_or_else(|| MetaError::InvalidPath {
                path: marker.to_string(),
                reason: "directory marker must name a directory".into(),
            })?;
        let _guard = self.fragments.lock(&dir)?;
        if self.directories.has_marker(&dir)? {
            return Ok(StoreOutcome::Unchanged);
        }

        self.directories.insert_marker(&dir)?;
        if let Err(e) = journal.record(&LogRecord::Store(MetaInfo::marker(marker.as_str()))) {
            undo(&dir, self.directories.remove_marker(&dir).map(|_| ()));
            return Err(e);
        }
        Ok(StoreOutcome::Inserted { new_object: true })
    }

    fn delete_with(&self, path: &str, journal: &dyn Journal) -> Result<usize> {
        let path = self.codec.normalize(path)?;
        if self.codec.is_root(&path) {
            return Err(MetaError::InvalidPath {
                path: path.to_string(),
                reason: "the root directory cannot be deleted".into(),
            });
        }

        // A marker and the object it names share a critical section.
        let is_marker = self.codec.is_directory_marker(&path);
        let key = if is_marker {
            match self.codec.marker_target(&path) {
                Some(dir) => dir,
                None => return Ok(0),
            }
        } else {
            path.clone()
        };

        let mut guard = self.fragments.lock(&key)?;
        let fragments = if is_marker { 0 } else { guard.fragment_count() };
        let marked = self.directories.has_marker(&key)?;
        if fragments == 0 && !marked {
            return Ok(0);
        }

        if fragments > 0 {
            self.directories.remove_object(&path)?;
        }
        if marked {
            if let Err(e) = self.directories.remove_marker(&key) {
                if fragments > 0 {
                    undo(&path, self.directories.insert_object(&path));
                }
                return Err(e);
            }
        }
        if let Err(e) = journal.record(&LogRecord::Delete(path.to_string())) {
            if fragments > 0 {
                undo(&path, self.directories.insert_object(&path));
            }
            if marked {
                undo(&key, self.directories.insert_marker(&key).map(|_| ()));
            }
            return Err(e);
        }
        if fragments > 0 {
            guard.remove();
        }
        let removed = fragments + usize::from(marked);
        debug!(path = %path, removed, "metadata deleted");
        Ok(removed)
    }

    /// The directory a listing request refers to. A marker path lists the
    /// directory it names.
    fn listing_target(&self, path: &str) -> Result<CanonicalPath> {
        let dir = self.codec.normalize(path)?;
        if self.codec.is_directory_marker(&dir) {
            if let Some(target) = self.codec.marker_target(&dir) {
                return Ok(target);
            }
        }
        Ok(dir)
    }
}

/// Report a directory index update that could not be reverted.
fn undo(path: &CanonicalPath, result: Result<()>) {
    if let Err(e) = result {
        warn!(path = %path, error = %e, "directory index out of step after journal failure");
    }
}

impl<J: Journal> MetaDriver for MetaStore<J> {
    fn store_meta_info(&self, info: &MetaInfo) -> Result<StoreOutcome> {
        self.store_with(info, &self.journal)
    }

    fn delete_file_meta_info(&self, path: &str) -> Result<usize> {
        self.delete_with(path, &self.journal)
    }

    fn get_directory_info(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.listing_target(path)?;
        self.directories.list_children(&dir)
    }

    fn get_file_meta_info(&self, path: &str, detail: bool) -> Result<Vec<FragmentRecord>> {
        let path = self.codec.normalize(path)?;
        if detail {
            self.fragments.get_all(&path)
        } else {
            Ok(vec![self.fragments.tail(&path)?])
        }
    }

    fn get_fragment_meta_info(
        &self,
        path: &str,
        index: u64,
        start: u64,
        end: u64,
    ) -> Result<FragmentRecord> {
        let path = self.codec.normalize(path)?;
        if start > end {
            return Err(MetaError::InvalidRange { start, end });
        }
        if index == 0 {
            return self.fragments.get_by_range(&path, start, end);
        }

        let record = self.fragments.get_by_index(&path, index)?;
        if (start, end) != (0, 0) && !record.covers(start, end) {
            return Err(MetaError::AmbiguousQuery {
                path: path.to_string(),
                index,
                start,
                end,
            });
        }
        Ok(record)
    }

    fn get_object_summary(&self, path: &str) -> Result<ObjectSummary> {
        let path = self.codec.normalize(path)?;
        self.fragments.summary(&path)
    }
}

impl<J> std::fmt::Debug for MetaStore<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaStore")
            .field("namespace", self.codec.namespace())
            .field("fragments", &self.fragments)
            .finish_non_exhaustive()
    }
}

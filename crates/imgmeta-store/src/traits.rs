//! The [`MetaDriver`] trait: the metadata service contract.
//!
//! Any backend (in-memory, log-backed, an external key-value engine)
//! implements this trait. Upstream, the ingest layer feeds it [`MetaInfo`]
//! records and the read path asks it where a byte range lives.

use imgmeta_index::StoreOutcome;
use imgmeta_types::{FragmentRecord, MetaInfo, ObjectSummary, Result};

/// Storage-engine-agnostic metadata store.
///
/// Implementations must be thread-safe (`Send + Sync`). Mutations of one
/// path are serialized; mutations of different paths may run in parallel.
/// A read that starts after a mutation returned observes its effects.
pub trait MetaDriver: Send + Sync {
    /// Record a fragment, or register a directory marker.
    ///
    /// Marker paths (final segment carrying the directory prefix) ignore
    /// `info.value`. Other paths require a value. Re-storing an identical
    /// record returns [`StoreOutcome::Unchanged`].
    fn store_meta_info(&self, info: &MetaInfo) -> Result<StoreOutcome>;

    /// Remove every fragment of the object at `path` and the directory
    /// marker at that path.
    ///
    /// Returns the number of entries removed. Deleting a missing path
    /// returns `Ok(0)`.
    fn delete_file_meta_info(&self, path: &str) -> Result<usize>;

    /// Sorted names of the immediate children of directory `path`.
    ///
    /// An empty and a nonexistent directory both yield an empty list.
    fn get_directory_info(&self, path: &str) -> Result<Vec<String>>;

    /// Fragments of the object at `path`.
    ///
    /// With `detail`, every record ordered by index. Without, one record:
    /// the last fragment if the object is complete, otherwise the fragment
    /// with the highest index (check `is_last` to tell the two apart).
    fn get_file_meta_info(&self, path: &str, detail: bool) -> Result<Vec<FragmentRecord>>;

    /// Resolve one fragment.
    ///
    /// A nonzero `index` selects by index; a non-empty `(start, end)` given
    /// alongside must then fall inside that fragment. With `index == 0` the
    /// fragment covering `[start, end)` is returned; `start == end` is a
    /// point lookup for byte `start`.
    fn get_fragment_meta_info(
        &self,
        path: &str,
        index: u64,
        start: u64,
        end: u64,
    ) -> Result<FragmentRecord>;

    /// Completeness and coverage of the object at `path`.
    fn get_object_summary(&self, path: &str) -> Result<ObjectSummary>;

    /// Store several records in order, stopping at the first error.
    ///
    /// Records stored before the failing one stay stored.
    fn store_batch(&self, infos: &[MetaInfo]) -> Result<Vec<StoreOutcome>> {
        infos.iter().map(|info| self.store_meta_info(info)).collect()
    }

    /// Returns `true` if the object's last fragment has been stored.
    fn is_complete(&self, path: &str) -> Result<bool> {
        Ok(self.get_object_summary(path)?.complete)
    }
}

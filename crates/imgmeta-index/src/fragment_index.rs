//! The sharded path → fragment-set index.
//!
//! Every mutation of a path happens under the write lock of the shard that
//! path hashes to. [`FragmentIndex::lock`] hands that lock out as a
//! [`PathGuard`] so a caller can extend the critical section over related
//! work (directory updates, journaling) before the change is applied.

use std::collections::HashMap;
use std::sync::RwLockWriteGuard;

use imgmeta_path::CanonicalPath;
use imgmeta_types::{FragmentRecord, MetaError, ObjectSummary, Result};
use tracing::debug;

use crate::fragments::{ObjectFragments, StoreOutcome};
use crate::shards::Shards;

type Shard = HashMap<CanonicalPath, ObjectFragments>;

/// Default number of lock shards.
pub const DEFAULT_SHARDS: usize = 64;

/// Fragment sets for every object path.
pub struct FragmentIndex {
    shards: Shards<Shard>,
}

impl FragmentIndex {
    /// Create an index with `shards` lock shards.
    pub fn new(shards: usize) -> Self {
        Self {
            shards: Shards::with_default(shards),
        }
    }

    /// Number of lock shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Take the write lock serializing mutations of `path`.
    pub fn lock(&self, path: &CanonicalPath) -> Result<PathGuard<'_>> {
        Ok(PathGuard {
            path: path.clone(),
            shard: self.shards.write(path)?,
        })
    }

    /// Store `record` under `path`; see [`ObjectFragments::check`].
    pub fn store(&self, path: &CanonicalPath, record: FragmentRecord) -> Result<StoreOutcome> {
        self.lock(path)?.store(record)
    }

    /// Remove every record of `path`; returns how many were removed.
    pub fn delete(&self, path: &CanonicalPath) -> Result<usize> {
        Ok(self.lock(path)?.remove())
    }

    /// All records of `path` ordered by index.
    pub fn get_all(&self, path: &CanonicalPath) -> Result<Vec<FragmentRecord>> {
        self.with_object(path, ObjectFragments::ordered)
    }

    /// The record stored under `index`.
    pub fn get_by_index(&self, path: &CanonicalPath, index: u64) -> Result<FragmentRecord> {
        self.with_object(path, |fragments| fragments.get_by_index(index).copied())?
            .ok_or_else(|| MetaError::fragment_not_found(path.as_str(), format!("fragment {index}")))
    }

    /// The record covering `[start, end)`.
    pub fn get_by_range(
        &self,
        path: &CanonicalPath,
        start: u64,
        end: u64,
    ) -> Result<FragmentRecord> {
        self.with_object(path, |fragments| {
            fragments.get_by_range(path.as_str(), start, end)
        })?
    }

    /// The terminal record if stored, else the highest-index record.
    pub fn tail(&self, path: &CanonicalPath) -> Result<FragmentRecord> {
        self.with_object(path, |fragments| {
            fragments.last().or_else(|| fragments.highest()).copied()
        })?
        .ok_or_else(|| MetaError::object_not_found(path.as_str()))
    }

    /// Completeness summary of `path`.
    pub fn summary(&self, path: &CanonicalPath) -> Result<ObjectSummary> {
        self.with_object(path, ObjectFragments::summary)
    }

    /// Returns `true` if `path` has at least one record.
    pub fn contains(&self, path: &CanonicalPath) -> Result<bool> {
        Ok(self.shards.read(path)?.contains_key(path))
    }

    /// Number of objects with at least one record.
    pub fn object_count(&self) -> Result<usize> {
        self.shards.try_fold(0, |acc, shard| acc + shard.len())
    }

    /// Every object path with its ordered records, sorted by path.
    ///
    /// Shards are read one at a time; use [`freeze`](Self::freeze) for a
    /// snapshot that must be consistent across paths.
    pub fn entries(&self) -> Result<Vec<(CanonicalPath, Vec<FragmentRecord>)>> {
        let mut entries = self.shards.try_fold(Vec::new(), |mut acc, shard| {
            acc.extend(
                shard
                    .iter()
                    .map(|(path, fragments)| (path.clone(), fragments.ordered())),
            );
            acc
        })?;
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(entries)
    }

    /// Lock every shard, blocking all mutations until the result is dropped.
    pub fn freeze(&self) -> Result<FrozenIndex<'_>> {
        Ok(FrozenIndex {
            shards: self.shards.write_all()?,
        })
    }

    fn with_object<T>(
        &self,
        path: &CanonicalPath,
        f: impl FnOnce(&ObjectFragments) -> T,
    ) -> Result<T> {
        let shard = self.shards.read(path)?;
        shard
            .get(path)
            .map(f)
            .ok_or_else(|| MetaError::object_not_found(path.as_str()))
    }
}

impl Default for FragmentIndex {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl std::fmt::Debug for FragmentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentIndex")
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Exclusive access to the shard owning one path.
///
/// Other paths in the same shard are blocked too; paths in other shards are
/// not.
pub struct PathGuard<'a> {
    path: CanonicalPath,
    shard: RwLockWriteGuard<'a, Shard>,
}

impl PathGuard<'_> {
    /// The path this guard was taken for.
    pub fn path(&self) -> &CanonicalPath {
        &self.path
    }

    /// Number of records currently stored for the path.
    pub fn fragment_count(&self) -> usize {
        self.shard.get(&self.path).map_or(0, ObjectFragments::len)
    }

    /// Validate `record` against the path's current records.
    pub fn check(&self, record: &FragmentRecord) -> Result<StoreOutcome> {
        match self.shard.get(&self.path) {
            Some(fragments) => fragments.check(self.path.as_str(), record),
            None => ObjectFragments::default().check(self.path.as_str(), record),
        }
    }

    /// Apply a record accepted by [`check`](Self::check).
    pub fn insert(&mut self, record: FragmentRecord) {
        self.shard
            .entry(self.path.clone())
            .or_default()
            .insert(record);
        debug!(path = %self.path, index = record.index, start = record.start, end = record.end, "fragment stored");
    }

    /// Check and apply in one step.
    pub fn store(&mut self, record: FragmentRecord) -> Result<StoreOutcome> {
        let outcome = self.check(&record)?;
        if outcome.is_inserted() {
            self.insert(record);
        }
        Ok(outcome)
    }

    /// Drop every record of the path; returns how many were removed.
    pub fn remove(&mut self) -> usize {
        let removed = self.shard.remove(&self.path).map_or(0, |f| f.len());
        if removed > 0 {
            debug!(path = %self.path, removed, "object fragments removed");
        }
        removed
    }
}

/// All shards of a [`FragmentIndex`] held at once.
pub struct FrozenIndex<'a> {
    shards: Vec<RwLockWriteGuard<'a, Shard>>,
}

impl FrozenIndex<'_> {
    /// Every object path with its ordered records, sorted by path.
    pub fn entries(&self) -> Vec<(CanonicalPath, Vec<FragmentRecord>)> {
        let mut entries: Vec<_> = self
            .shards
            .iter()
            .flat_map(|shard| shard.iter())
            .map(|(path, fragments)| (path.clone(), fragments.ordered()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use imgmeta_path::PathCodec;

    use super::*;

    fn path(s: &str) -> CanonicalPath {
        PathCodec::default().normalize(s).unwrap()
    }

    fn rec(index: u64, start: u64, end: u64) -> FragmentRecord {
        FragmentRecord::new(index, start, end, 1, 42)
    }

    #[test]
    fn store_and_get_all() {
        let index = FragmentIndex::default();
        let p = path("/img/1");
        index.store(&p, rec(1, 100, 150).into_last()).unwrap();
        index.store(&p, rec(0, 0, 100)).unwrap();

        let all = index.get_all(&p).unwrap();
        assert_eq!(all.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1]);
        assert!(index.contains(&p).unwrap());
        assert_eq!(index.object_count().unwrap(), 1);
    }

    #[test]
    fn missing_path_is_not_found() {
        let index = FragmentIndex::default();
        let p = path("/nope");
        assert!(index.get_all(&p).unwrap_err().is_not_found());
        assert!(index.get_by_index(&p, 0).unwrap_err().is_not_found());
        assert!(index.get_by_range(&p, 0, 0).unwrap_err().is_not_found());
        assert!(index.tail(&p).unwrap_err().is_not_found());
    }

    #[test]
    fn get_by_index_missing_fragment() {
        let index = FragmentIndex::default();
        let p = path("/img/1");
        index.store(&p, rec(0, 0, 100)).unwrap();
        assert_eq!(index.get_by_index(&p, 0).unwrap(), rec(0, 0, 100));
        let err = index.get_by_index(&p, 7).unwrap_err();
        assert!(err.to_string().contains("fragment 7"));
    }

    #[test]
    fn delete_is_idempotent() {
        let index = FragmentIndex::default();
        let p = path("/img/1");
        index.store(&p, rec(0, 0, 100)).unwrap();
        index.store(&p, rec(1, 100, 200)).unwrap();
        assert_eq!(index.delete(&p).unwrap(), 2);
        assert_eq!(index.delete(&p).unwrap(), 0);
        assert!(!index.contains(&p).unwrap());
    }

    #[test]
    fn tail_prefers_last_fragment() {
        let index = FragmentIndex::default();
        let p = path("/img/1");
        index.store(&p, rec(0, 0, 100)).unwrap();
        index.store(&p, rec(4, 400, 500)).unwrap();
        assert_eq!(index.tail(&p).unwrap().index, 4);
        assert!(!index.tail(&p).unwrap().is_last);

        index.store(&p, rec(5, 500, 510).into_last()).unwrap();
        assert!(index.tail(&p).unwrap().is_last);
    }

    #[test]
    fn guard_check_does_not_apply() {
        let index = FragmentIndex::default();
        let p = path("/img/1");
        let guard = index.lock(&p).unwrap();
        assert!(guard.check(&rec(0, 0, 10)).unwrap().is_new_object());
        assert_eq!(guard.fragment_count(), 0);
        drop(guard);
        assert!(!index.contains(&p).unwrap());
    }

    #[test]
    fn entries_are_sorted_by_path() {
        let index = FragmentIndex::new(4);
        for name in ["/b", "/a/2", "/a/1", "/c"] {
            index.store(&path(name), rec(0, 0, 1)).unwrap();
        }
        let names: Vec<String> = index
            .entries()
            .unwrap()
            .into_iter()
            .map(|(p, _)| p.into_string())
            .collect();
        assert_eq!(names, vec!["/a/1", "/a/2", "/b", "/c"]);

        let frozen = index.freeze().unwrap();
        assert_eq!(frozen.entries().len(), 4);
    }

    #[test]
    fn concurrent_disjoint_stores_to_one_path() {
        let index = Arc::new(FragmentIndex::default());
        let p = path("/img/concurrent");

        let handles: Vec<_> = (0..16u64)
            .map(|i| {
                let index = Arc::clone(&index);
                let p = p.clone();
                thread::spawn(move || index.store(&p, rec(i, i * 10, i * 10 + 10)))
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic").unwrap();
        }
        assert_eq!(index.get_all(&p).unwrap().len(), 16);
    }

    #[test]
    fn concurrent_overlapping_stores_one_wins() {
        let index = Arc::new(FragmentIndex::default());
        let p = path("/img/race");

        let handles: Vec<_> = (0..2u64)
            .map(|i| {
                let index = Arc::clone(&index);
                let p = p.clone();
                thread::spawn(move || index.store(&p, rec(i, 0, 100 + i)))
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let overlaps = results
            .iter()
            .filter(|r| matches!(r, Err(MetaError::Overlap { .. })))
            .count();
        assert_eq!((ok, overlaps), (1, 1));
        assert_eq!(index.get_all(&p).unwrap().len(), 1);
    }
}

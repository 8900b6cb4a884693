//! Directory listings derived from stored paths.
//!
//! Paths are stored flat, so directories only exist implicitly. The index
//! keeps, for every directory with at least one child, a map from child name
//! to a reference count of the reasons that child is visible:
//!
//! - an object stored at exactly that path,
//! - a directory marker naming that path,
//! - that path being a directory with children of its own.
//!
//! A child disappears from its parent when its count reaches zero, and an
//! emptied directory is unlinked from its own parent in turn.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use imgmeta_path::{CanonicalPath, PathCodec};
use imgmeta_types::{MetaError, Result};
use tracing::debug;

#[derive(Debug, Default)]
struct DirectoryTree {
    children: HashMap<CanonicalPath, BTreeMap<String, usize>>,
    markers: BTreeSet<CanonicalPath>,
}

impl DirectoryTree {
    fn link(&mut self, codec: &PathCodec, path: &CanonicalPath) {
        let Some(name) = codec.file_name(path) else {
            return;
        };
        let parent = codec.parent_of(path);
        let entries = self.children.entry(parent.clone()).or_default();
        let parent_was_empty = entries.is_empty();
        *entries.entry(name.to_string()).or_insert(0) += 1;
        if parent_was_empty {
            self.link(codec, &parent);
        }
    }

    fn unlink(&mut self, codec: &PathCodec, path: &CanonicalPath) {
        let Some(name) = codec.file_name(path) else {
            return;
        };
        let parent = codec.parent_of(path);
        let Some(entries) = self.children.get_mut(&parent) else {
            return;
        };
        let remaining = match entries.get_mut(name) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return,
        };
        if remaining > 0 {
            return;
        }
        entries.remove(name);
        if entries.is_empty() {
            self.children.remove(&parent);
            self.unlink(codec, &parent);
        }
    }
}

/// Immediate-child listings for every directory path.
#[derive(Debug)]
pub struct DirectoryIndex {
    codec: PathCodec,
    tree: RwLock<DirectoryTree>,
}

impl DirectoryIndex {
    /// Create an empty index over the codec's namespace.
    pub fn new(codec: PathCodec) -> Self {
        Self {
            codec,
            tree: RwLock::new(DirectoryTree::default()),
        }
    }

    /// Record that an object now exists at `path`.
    ///
    /// Call once per object, when its first fragment is stored.
    pub fn insert_object(&self, path: &CanonicalPath) -> Result<()> {
        self.write()?.link(&self.codec, path);
        Ok(())
    }

    /// Record that the object at `path` is gone.
    pub fn remove_object(&self, path: &CanonicalPath) -> Result<()> {
        self.write()?.unlink(&self.codec, path);
        Ok(())
    }

    /// Register an explicit marker for directory `dir`.
    ///
    /// Returns `false` if the marker already existed.
    pub fn insert_marker(&self, dir: &CanonicalPath) -> Result<bool> {
        let mut tree = self.write()?;
        if !tree.markers.insert(dir.clone()) {
            return Ok(false);
        }
        tree.link(&self.codec, dir);
        debug!(dir = %dir, "directory marker added");
        Ok(true)
    }

    /// Drop the explicit marker for directory `dir`.
    ///
    /// Returns `false` if there was no marker.
    pub fn remove_marker(&self, dir: &CanonicalPath) -> Result<bool> {
        let mut tree = self.write()?;
        if !tree.markers.remove(dir) {
            return Ok(false);
        }
        tree.unlink(&self.codec, dir);
        debug!(dir = %dir, "directory marker removed");
        Ok(true)
    }

    /// Returns `true` if an explicit marker exists for `dir`.
    pub fn has_marker(&self, dir: &CanonicalPath) -> Result<bool> {
        Ok(self.read()?.markers.contains(dir))
    }

    /// Every directory with an explicit marker, sorted.
    pub fn markers(&self) -> Result<Vec<CanonicalPath>> {
        Ok(self.read()?.markers.iter().cloned().collect())
    }

    /// Sorted names of the immediate children of `dir`.
    ///
    /// Empty for both an empty and a nonexistent directory.
    pub fn list_children(&self, dir: &CanonicalPath) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .children
            .get(dir)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Returns `true` if `dir` is the root, has children, or is marked.
    pub fn is_directory(&self, dir: &CanonicalPath) -> Result<bool> {
        if self.codec.is_root(dir) {
            return Ok(true);
        }
        let tree = self.read()?;
        Ok(tree.children.contains_key(dir) || tree.markers.contains(dir))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, DirectoryTree>> {
        self.tree
            .read()
            .map_err(|e| MetaError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, DirectoryTree>> {
        self.tree
            .write()
            .map_err(|e| MetaError::LockPoisoned(e.to_string()))
    }
}

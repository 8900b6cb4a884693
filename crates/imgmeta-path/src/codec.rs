//! Canonical paths and the [`PathCodec`] that produces them.
//!
//! Canonical form:
//! - starts with exactly one separator;
//! - no empty segments, no trailing separator (except the root itself);
//! - no `.` or `..` segments, no control characters;
//! - the directory prefix appears on the final segment only.
//!
//! Input is lenient about redundant separators: `a//b/` normalizes to `/a/b`.

use std::fmt;

use imgmeta_types::{MetaError, Result};

use crate::namespace::Namespace;

/// A path in canonical form. Only a [`PathCodec`] can construct one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// The canonical text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the canonical text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pure path operations over a fixed [`Namespace`].
#[derive(Clone, Debug, Default)]
pub struct PathCodec {
    namespace: Namespace,
}

impl PathCodec {
    /// Create a codec for the given namespace.
    pub fn new(namespace: Namespace) -> Result<Self> {
        namespace.validate()?;
        Ok(Self { namespace })
    }

    /// The namespace this codec was built with.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The root path (the bare separator).
    pub fn root(&self) -> CanonicalPath {
        CanonicalPath(self.namespace.separator.to_string())
    }

    /// Returns `true` for the root path.
    pub fn is_root(&self, path: &CanonicalPath) -> bool {
        path.0.chars().eq(std::iter::once(self.namespace.separator))
    }

    /// Normalize caller input into a [`CanonicalPath`].
    ///
    /// # Examples
    ///
    /// ```
    /// use imgmeta_path::PathCodec;
    ///
    /// let codec = PathCodec::default();
    /// assert_eq!(codec.normalize("img//1/").unwrap().as_str(), "/img/1");
    /// assert_eq!(codec.normalize("///").unwrap().as_str(), "/");
    /// assert!(codec.normalize("").is_err());
    /// assert!(codec.normalize("/a/../b").is_err());
    /// ```
    pub fn normalize(&self, path: &str) -> Result<CanonicalPath> {
        if path.is_empty() {
            return Err(invalid(path, "path must not be empty"));
        }

        let sep = self.namespace.separator;
        let segments: Vec<&str> = path.split(sep).filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Ok(self.root());
        }

        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            self.check_segment(path, segment)?;
            if segment.starts_with(self.namespace.directory_prefix.as_str()) {
                if i != last {
                    return Err(invalid(
                        path,
                        "directory prefix is only allowed on the final segment",
                    ));
                }
                let target = &segment[self.namespace.directory_prefix.len()..];
                if target.is_empty()
                    || target.starts_with(self.namespace.directory_prefix.as_str())
                {
                    return Err(invalid(path, "directory marker must name a directory"));
                }
            }
        }

        let mut canonical = String::with_capacity(path.len() + 1);
        for segment in &segments {
            canonical.push(sep);
            canonical.push_str(segment);
        }
        Ok(CanonicalPath(canonical))
    }

    /// The immediate parent of `path`; the root for top-level paths and for
    /// the root itself.
    pub fn parent_of(&self, path: &CanonicalPath) -> CanonicalPath {
        match path.0.rfind(self.namespace.separator) {
            Some(0) | None => self.root(),
            Some(idx) => CanonicalPath(path.0[..idx].to_string()),
        }
    }

    /// The final segment, or `None` for the root.
    pub fn file_name<'a>(&self, path: &'a CanonicalPath) -> Option<&'a str> {
        if self.is_root(path) {
            return None;
        }
        let sep = self.namespace.separator;
        path.0
            .rfind(sep)
            .map(|idx| &path.0[idx + sep.len_utf8()..])
    }

    /// Segments of `path`, root first. The root has none.
    pub fn segments<'a>(&self, path: &'a CanonicalPath) -> impl Iterator<Item = &'a str> {
        path.0
            .split(self.namespace.separator)
            .filter(|s| !s.is_empty())
    }

    /// Append one segment to a directory path.
    pub fn join(&self, dir: &CanonicalPath, name: &str) -> Result<CanonicalPath> {
        if name.is_empty() || name.contains(self.namespace.separator) {
            return Err(invalid(name, "name must be a single non-empty segment"));
        }
        self.check_segment(name, name)?;
        let mut joined = if self.is_root(dir) {
            String::new()
        } else {
            dir.0.clone()
        };
        joined.push(self.namespace.separator);
        joined.push_str(name);
        self.normalize(&joined)
    }

    /// Returns `true` if the final segment carries the directory prefix.
    pub fn is_directory_marker(&self, path: &CanonicalPath) -> bool {
        self.file_name(path)
            .is_some_and(|name| name.starts_with(self.namespace.directory_prefix.as_str()))
    }

    /// Returns `true` if the final segment carries the tag prefix.
    pub fn is_tag(&self, path: &CanonicalPath) -> bool {
        self.file_name(path)
            .is_some_and(|name| name.starts_with(self.namespace.tag_prefix.as_str()))
    }

    /// The directory a marker stands for: `/a/DIRECTORY_x` → `/a/x`.
    ///
    /// Returns `None` if `path` is not a marker.
    pub fn marker_target(&self, path: &CanonicalPath) -> Option<CanonicalPath> {
        let name = self
            .file_name(path)?
            .strip_prefix(self.namespace.directory_prefix.as_str())?;
        let parent = self.parent_of(path);
        self.join(&parent, name).ok()
    }

    /// The marker path standing for directory `dir`: `/a/x` → `/a/DIRECTORY_x`.
    ///
    /// Returns `None` for the root, which always exists.
    pub fn marker_for(&self, dir: &CanonicalPath) -> Option<CanonicalPath> {
        let name = self.file_name(dir)?;
        if name.starts_with(self.namespace.directory_prefix.as_str()) {
            return None;
        }
        let marker_name = format!("{}{name}", self.namespace.directory_prefix);
        self.join(&self.parent_of(dir), &marker_name).ok()
    }

    fn check_segment(&self, path: &str, segment: &str) -> Result<()> {
        if segment == "." || segment == ".." {
            return Err(invalid(path, "relative segments are not allowed"));
        }
        if segment.chars().any(char::is_control) {
            return Err(invalid(path, "control characters are not allowed"));
        }
        Ok(())
    }
}

fn invalid(path: &str, reason: &str) -> MetaError {
    MetaError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PathCodec {
        PathCodec::default()
    }

    fn path(s: &str) -> CanonicalPath {
        codec().normalize(s).unwrap()
    }

    #[test]
    fn normalize_canonical_input_is_unchanged() {
        assert_eq!(path("/img/1").as_str(), "/img/1");
        assert_eq!(path("/a/b/c").as_str(), "/a/b/c");
    }

    #[test]
    fn normalize_strips_redundant_separators() {
        assert_eq!(path("//img///1").as_str(), "/img/1");
        assert_eq!(path("/img/1/").as_str(), "/img/1");
        assert_eq!(path("img/1").as_str(), "/img/1");
    }

    #[test]
    fn normalize_root() {
        let c = codec();
        assert!(c.is_root(&path("/")));
        assert!(c.is_root(&path("////")));
        assert!(!c.is_root(&path("/a")));
    }

    #[test]
    fn reject_empty_path() {
        let err = codec().normalize("").unwrap_err();
        assert!(matches!(err, MetaError::InvalidPath { .. }));
    }

    #[test]
    fn reject_relative_segments() {
        assert!(codec().normalize("/a/./b").is_err());
        assert!(codec().normalize("/a/..").is_err());
        assert!(codec().normalize("..").is_err());
    }

    #[test]
    fn reject_control_characters() {
        assert!(codec().normalize("/a/b\0c").is_err());
        assert!(codec().normalize("/a\n/b").is_err());
    }

    #[test]
    fn reject_directory_prefix_in_middle() {
        assert!(codec().normalize("/a/DIRECTORY_x/b").is_err());
        assert!(codec().normalize("/a/DIRECTORY_").is_err());
        assert!(codec().normalize("/a/DIRECTORY_DIRECTORY_x").is_err());
        assert!(codec().normalize("/a/DIRECTORY_x").is_ok());
    }

    #[test]
    fn parent_of_nested_and_top_level() {
        let c = codec();
        assert_eq!(c.parent_of(&path("/a/b/c")).as_str(), "/a/b");
        assert_eq!(c.parent_of(&path("/a")).as_str(), "/");
        assert_eq!(c.parent_of(&path("/")).as_str(), "/");
    }

    #[test]
    fn file_name_and_segments() {
        let c = codec();
        let p = path("/img/2024/cat.jpg");
        assert_eq!(c.file_name(&p), Some("cat.jpg"));
        assert_eq!(c.segments(&p).collect::<Vec<_>>(), vec!["img", "2024", "cat.jpg"]);
        assert_eq!(c.file_name(&path("/")), None);
        assert_eq!(c.segments(&path("/")).count(), 0);
    }

    #[test]
    fn join_builds_child_paths() {
        let c = codec();
        assert_eq!(c.join(&path("/"), "a").unwrap().as_str(), "/a");
        assert_eq!(c.join(&path("/a"), "b").unwrap().as_str(), "/a/b");
        assert!(c.join(&path("/a"), "b/c").is_err());
        assert!(c.join(&path("/a"), "").is_err());
        assert!(c.join(&path("/a"), "..").is_err());
    }

    #[test]
    fn directory_markers() {
        let c = codec();
        let marker = path("/a/DIRECTORY_empty");
        assert!(c.is_directory_marker(&marker));
        assert!(!c.is_directory_marker(&path("/a/empty")));
        assert!(!c.is_directory_marker(&path("/")));
        assert_eq!(c.marker_target(&marker).unwrap().as_str(), "/a/empty");
        assert_eq!(c.marker_for(&path("/a/empty")).unwrap(), marker);
        assert!(c.marker_target(&path("/a/b")).is_none());
        assert!(c.marker_for(&path("/")).is_none());
    }

    #[test]
    fn top_level_marker() {
        let c = codec();
        let marker = path("/DIRECTORY_top");
        assert_eq!(c.marker_target(&marker).unwrap().as_str(), "/top");
        assert_eq!(c.marker_for(&path("/top")).unwrap(), marker);
    }

    #[test]
    fn tags_are_recognized() {
        let c = codec();
        assert!(c.is_tag(&path("/img/tag_sunset")));
        assert!(!c.is_tag(&path("/img/sunset")));
    }

    #[test]
    fn custom_separator() {
        let c = PathCodec::new(Namespace {
            separator: ':',
            ..Namespace::default()
        })
        .unwrap();
        let p = c.normalize("a::b:").unwrap();
        assert_eq!(p.as_str(), ":a:b");
        assert_eq!(c.parent_of(&p).as_str(), ":a");
        assert_eq!(c.parent_of(&c.parent_of(&p)).as_str(), ":");
        // The slash is an ordinary character under this namespace.
        assert_eq!(c.normalize("x/y").unwrap().as_str(), ":x/y");
    }

    #[test]
    fn invalid_namespace_is_rejected() {
        let ns = Namespace {
            separator: ' ',
            ..Namespace::default()
        };
        assert!(PathCodec::new(ns).is_err());
    }
}

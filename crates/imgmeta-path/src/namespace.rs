//! Namespace conventions: separator and reserved prefixes.
//!
//! A [`Namespace`] is loaded once at startup and handed to the codec by
//! value. Nothing mutates it afterwards.

use imgmeta_types::{MetaError, Result};
use serde::{Deserialize, Serialize};

/// Default segment separator.
pub const DEFAULT_SEPARATOR: char = '/';

/// Default prefix marking a directory-marker segment.
pub const DEFAULT_DIRECTORY_PREFIX: &str = "DIRECTORY_";

/// Default prefix marking a tag segment.
pub const DEFAULT_TAG_PREFIX: &str = "tag_";

/// The path namespace shared by every imgmeta component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespace {
    /// Character joining path segments.
    pub separator: char,
    /// Prefix of a final segment that denotes a directory marker.
    pub directory_prefix: String,
    /// Prefix of a final segment that denotes a tag.
    pub tag_prefix: String,
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            directory_prefix: DEFAULT_DIRECTORY_PREFIX.to_string(),
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
        }
    }
}

impl Namespace {
    /// Check that the separator and prefixes can be told apart.
    pub fn validate(&self) -> Result<()> {
        let sep = self.separator;
        if sep.is_alphanumeric() || sep.is_whitespace() || sep.is_control() {
            return Err(MetaError::Config(format!(
                "separator {sep:?} must be a visible non-alphanumeric character"
            )));
        }
        for (name, prefix) in [
            ("directory_prefix", &self.directory_prefix),
            ("tag_prefix", &self.tag_prefix),
        ] {
            if prefix.is_empty() {
                return Err(MetaError::Config(format!("{name} must not be empty")));
            }
            if prefix.contains(sep) {
                return Err(MetaError::Config(format!(
                    "{name} {prefix:?} must not contain the separator {sep:?}"
                )));
            }
            if prefix.chars().any(char::is_control) {
                return Err(MetaError::Config(format!(
                    "{name} {prefix:?} contains a control character"
                )));
            }
        }
        if self.directory_prefix.starts_with(&self.tag_prefix)
            || self.tag_prefix.starts_with(&self.directory_prefix)
        {
            return Err(MetaError::Config(format!(
                "directory_prefix {:?} and tag_prefix {:?} must not be prefixes of each other",
                self.directory_prefix, self.tag_prefix
            )));
        }
        Ok(())
    }
}

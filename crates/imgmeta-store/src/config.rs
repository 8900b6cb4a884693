use std::fs;
use std::path::{Path, PathBuf};

use imgmeta_index::DEFAULT_SHARDS;
use imgmeta_path::{Namespace, PathCodec};
use imgmeta_types::{MetaError, Result};
use serde::{Deserialize, Serialize};

use crate::log::SyncMode;

/// Top-level configuration, usually read from a TOML file.
///
/// Every section and key is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    pub namespace: Namespace,
    pub index: IndexConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of lock shards in the fragment index.
    pub shards: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the metadata log.
    pub data_dir: PathBuf,
    pub sync: SyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./imgmeta-data"),
            sync: SyncMode::default(),
        }
    }
}

impl MetaConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| MetaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            MetaError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.namespace.validate()?;
        if self.index.shards == 0 {
            return Err(MetaError::Config("index.shards must be at least 1".into()));
        }
        Ok(())
    }

    /// A path codec over the configured namespace.
    pub fn codec(&self) -> Result<PathCodec> {
        PathCodec::new(self.namespace.clone())
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| MetaError::Config(e.to_string()))
    }
}

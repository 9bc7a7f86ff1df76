use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Database open configuration (SPEC_FULL A.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory sled will manage.
    pub path: PathBuf,

    /// Initial `size_max` for the content-addressed cache (spec §4.8).
    #[serde(default = "default_cache_size_max")]
    pub cache_size_max: u64,

    /// Expected genesis configuration checksum. If the database already has
    /// a `CfgChecksum` parameter and it disagrees, `Db::open` refuses to run
    /// (spec §6). `None` skips the check (fresh or test databases).
    #[serde(default)]
    pub cfg_checksum: Option<[u8; 32]>,
}

fn default_cache_size_max() -> u64 {
    64 * 1024 * 1024
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Config {
            path: path.into(),
            cache_size_max: default_cache_size_max(),
            cfg_checksum: None,
        }
    }

    pub fn with_cfg_checksum(mut self, checksum: [u8; 32]) -> Self {
        self.cfg_checksum = Some(checksum);
        self
    }

    /// Loads a config from a JSON file on disk (the node's usual on-disk
    /// config format, alongside genesis/peer-list files).
    pub fn from_json_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| DbError::Open(sled::Error::Io(e)))?;
        serde_json::from_str(&raw).map_err(|e| DbError::inconsistent(format!("invalid config JSON: {e}")))
    }

    pub fn to_json_string(&self) -> DbResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DbError::inconsistent(format!("cannot serialize config: {e}")))
    }
}

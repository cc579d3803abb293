use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use storage::ReclaimPolicy;

use crate::error::{CmfsError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub disk_path: PathBuf,
    pub total_blocks: u64,
    pub cache_capacity: usize,
    pub prediction_limit: usize,
    pub index_order: usize,
    pub max_tags_per_file: usize,
    pub reclaim_policy: ReclaimPolicy,
    pub decay_interval_ms: u64, // 0 disables the ticker
    pub owner: String,
    pub max_requests: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disk_path: PathBuf::from("cmfs_data.img"),
            total_blocks: 1000, // ~4MB disk
            cache_capacity: 50,
            prediction_limit: storage::DEFAULT_PREDICTION_LIMIT,
            index_order: storage::DEFAULT_ORDER,
            max_tags_per_file: storage::DEFAULT_MAX_TAGS_PER_FILE,
            reclaim_policy: ReclaimPolicy::Leak,
            decay_interval_ms: 60_000,
            owner: "cmfs".to_string(),
            max_requests: None,
        }
    }
}

impl Config {
    pub fn new(disk_path: impl Into<PathBuf>, total_blocks: u64, cache_capacity: usize) -> Self {
        Self {
            disk_path: disk_path.into(),
            total_blocks,
            cache_capacity,
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CmfsError::InvalidConfig(format!("Cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_blocks == 0 {
            return Err(CmfsError::InvalidConfig(
                "total_blocks must be at least 1".to_string(),
            ));
        }
        if self
            .total_blocks
            .checked_mul(storage::BLOCK_SIZE as u64)
            .is_none()
        {
            return Err(CmfsError::InvalidConfig(format!(
                "total_blocks of {} overflows the image length",
                self.total_blocks
            )));
        }
        if self.index_order < 3 {
            return Err(CmfsError::InvalidConfig(format!(
                "index_order must be at least 3, got {}",
                self.index_order
            )));
        }
        if self.prediction_limit == 0 {
            return Err(CmfsError::InvalidConfig(
                "prediction_limit must be at least 1".to_string(),
            ));
        }
        if self.disk_path.as_os_str().is_empty() {
            return Err(CmfsError::InvalidConfig("disk_path is empty".to_string()));
        }
        Ok(())
    }
}

impl From<Config> for storage::EngineConfig {
    fn from(config: Config) -> Self {
        storage::EngineConfig {
            disk_path: config.disk_path,
            total_blocks: config.total_blocks,
            cache_capacity: config.cache_capacity,
            prediction_limit: config.prediction_limit,
            index_order: config.index_order,
            max_tags_per_file: config.max_tags_per_file,
            reclaim_policy: config.reclaim_policy,
            owner: config.owner,
            permissions: 0o644,
        }
    }
}

impl From<Config> for api::Config {
    fn from(config: Config) -> Self {
        api::Config {
            max_requests: config.max_requests,
        }
    }
}

//! Database configuration, deserialized from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DbError, DbResult};
use crate::transaction::ccm::CcmStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub data_dir: PathBuf,
    pub page_size: usize,
    pub buffer_pool_bytes: usize,
    pub wal_path: PathBuf,
    pub ccm_strategy: CcmStrategy,
    pub tcp_port: u16,
    pub optimizer: OptimizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub elitism: usize,
    pub rng_seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { population_size: 50, generations: 30, mutation_rate: 0.1, elitism: 2, rng_seed: 42 }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            page_size: 4096,
            buffer_pool_bytes: 128 * 1024 * 1024,
            wal_path: PathBuf::from("./data/wal.log"),
            ccm_strategy: CcmStrategy::TwoPhaseLocking,
            tcp_port: 5433,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl DbConfig {
    pub fn from_toml_str(s: &str) -> DbResult<Self> {
        toml::from_str(s).map_err(|e| DbError::Io(format!("config: {e}")))
    }

    pub fn from_file(path: &std::path::Path) -> DbResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

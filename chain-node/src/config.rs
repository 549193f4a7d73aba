//! Node configuration surface. Nothing here is inferred at runtime
//! beyond the data directory default.

use std::path::PathBuf;

use chain_types::block::{MAX_BLOCK_SIZE, MAX_TXS_PER_BLOCK};
use chain_state::chain::MAX_REORG_DEPTH;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for blocks/, index/, and wal/.
    pub data_dir: PathBuf,
    /// Consensus-fixed; must match the network being followed.
    pub max_block_size: usize,
    /// Consensus-fixed; must match the network being followed.
    pub max_txs_per_block: usize,
    /// Soft cap on total mempool entry bytes, triggering eviction.
    pub mempool_capacity_bytes: usize,
    /// Expiry, in seconds, for admitted mempool entries.
    pub mempool_ttl_secs: u64,
    /// Max blocks a reorg may disconnect before it is rejected.
    pub reorg_depth_limit: u64,
    /// Age, in blocks, at which a body is repacked into gzip cold storage.
    pub compress_depth: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            max_block_size: MAX_BLOCK_SIZE,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            mempool_capacity_bytes: 300 * 1024 * 1024,
            mempool_ttl_secs: 14 * 24 * 60 * 60,
            reorg_depth_limit: MAX_REORG_DEPTH,
            compress_depth: 1000,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("chain-core")
}

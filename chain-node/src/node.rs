//! The node facade: the single entry point external callers use to
//! submit already-decoded blocks and transactions and to serve read
//! queries, keeping validation, the chain state machine, and the
//! mempool behind one consistent API.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chain_consensus::validator;
use chain_state::{AddBlockOutcome, AddressIndexEntry, ChainStateMachine, ChainTip, Storage};
use chain_types::amount::{Amount, NonNegative};
use chain_types::block::Block;
use chain_types::event::EventSink;
use chain_types::hash::Hash;
use chain_types::transaction::Transaction;
use chain_types::Address;

use chain_mempool::Mempool;

use crate::config::Config;
use crate::error::NodeError;

/// How many immediate ancestors feed the median-time-past check.
/// Matches the window size Bitcoin's own timestamp rule uses.
const MEDIAN_TIME_WINDOW: u64 = 11;

pub struct Node {
    chain: ChainStateMachine,
    mempool: Mempool,
    config: Config,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}

impl Node {
    /// Opens (or initializes) every owned component against `config`'s
    /// data directory. `genesis` seeds a fresh chain; it is ignored if
    /// the data directory already holds a tip.
    pub fn open(config: Config, genesis: Block, sink: Arc<dyn EventSink>) -> Result<Self, NodeError> {
        let storage = Storage::open(&config.data_dir, config.compress_depth, sink.clone())?;
        let wal_path = config.data_dir.join("wal").join("reorg.log");
        let chain = ChainStateMachine::open(storage, &wal_path, genesis, sink.clone(), config.reorg_depth_limit)?;
        let mempool = Mempool::new(config.mempool_capacity_bytes, config.mempool_ttl_secs, sink);

        Ok(Node { chain, mempool, config })
    }

    fn ancestor_timestamps(&self, parent_height: u64) -> Result<Vec<u64>, NodeError> {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIME_WINDOW as usize);
        let start = parent_height.saturating_sub(MEDIAN_TIME_WINDOW.saturating_sub(1));
        for height in start..=parent_height {
            if let Some(block) = self.chain.get_block_by_height(height)? {
                timestamps.push(block.header.timestamp);
            }
        }
        Ok(timestamps)
    }

    /// Validates and applies one block, then reconciles the mempool
    /// against whatever the chain state machine connected or
    /// disconnected.
    pub fn add_block(&self, block: Block) -> Result<AddBlockOutcome, NodeError> {
        validator::validate_stateless(&block)?;

        let parent_height = block.height().saturating_sub(1);
        let ancestors = self.ancestor_timestamps(parent_height)?;
        let now = now_unix();
        let utxo = self.chain.utxo_snapshot();
        let nonce = self.chain.nonce_snapshot();
        validator::validate_contextual(&block, &utxo, &nonce, &ancestors, now)?;

        let outcome = self.chain.add_block(block)?;

        for connected in &outcome.connected_blocks {
            self.mempool.on_block_confirmed(connected);
            let _ = self.chain.compress_if_due(connected.height(), connected.hash());
        }
        if !outcome.disconnected_blocks.is_empty() {
            let utxo = self.chain.utxo_snapshot();
            let nonce = self.chain.nonce_snapshot();
            self.mempool
                .resurrect(&outcome.disconnected_blocks, &utxo, &nonce, now);
        }

        Ok(outcome)
    }

    /// Admits `tx` into the mempool against the current tip's snapshots.
    pub fn submit_tx(&self, tx: Transaction) -> Result<Hash, NodeError> {
        let utxo = self.chain.utxo_snapshot();
        let nonce = self.chain.nonce_snapshot();
        Ok(self.mempool.admit(tx, &utxo, &nonce, now_unix())?)
    }

    pub fn get_balance(&self, address: &Address) -> Amount<NonNegative> {
        self.chain.utxo_snapshot().balance(address)
    }

    pub fn get_history(
        &self,
        address: &Address,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AddressIndexEntry>, NodeError> {
        Ok(self.chain.history(address, offset, limit)?)
    }

    pub fn get_tip(&self) -> ChainTip {
        self.chain.tip()
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, NodeError> {
        Ok(self.chain.get_block_by_height(height)?)
    }

    pub fn get_block_by_hash(&self, hash: Hash) -> Result<Option<Block>, NodeError> {
        Ok(self.chain.get_block_by_hash(hash)?)
    }

    /// Checks the mempool first, then confirmed storage — a pending
    /// transaction and a just-confirmed one can both answer this query.
    pub fn get_tx(&self, txid: Hash) -> Result<Option<Transaction>, NodeError> {
        if let Some(tx) = self.mempool.get(txid) {
            return Ok(Some(tx));
        }
        Ok(self.chain.get_tx(txid)?)
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }
}

//! The storage engine: append-only block bodies, the two sled indexes,
//! the reorg WAL, and a bounded decode cache, unified behind one type.

pub mod block_file;
pub mod index;
pub mod wal;

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use chain_types::block::Block;
use chain_types::codec::Canonical;
use chain_types::event::{Event, EventSink};
use chain_types::hash::Hash;
use chain_types::Address;

use crate::error::StorageError;
use block_file::{BlockFiles, BlockLocation};
use index::{AddressIndex, AddressIndexEntry, BlockIndex};

const DEFAULT_CACHE_CAPACITY: usize = 256;

pub struct Storage {
    hot: Mutex<BlockFiles>,
    cold: Mutex<BlockFiles>,
    block_index: BlockIndex,
    address_index: AddressIndex,
    db: sled::Db,
    cache: Mutex<lru::LruCache<Hash, Block>>,
    compress_depth: u64,
    sink: Arc<dyn EventSink>,
}

impl Storage {
    pub fn open(
        data_dir: &Path,
        compress_depth: u64,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let hot = BlockFiles::open(&data_dir.join("blocks"))?;
        let cold = BlockFiles::open(&data_dir.join("blocks").join("compressed"))?;
        let db = sled::open(data_dir.join("index"))?;
        let block_index = BlockIndex::open(&db)?;
        let address_index = AddressIndex::open(&db)?;

        Ok(Storage {
            hot: Mutex::new(hot),
            cold: Mutex::new(cold),
            block_index,
            address_index,
            db,
            cache: Mutex::new(lru::LruCache::new(DEFAULT_CACHE_CAPACITY)),
            compress_depth,
            sink,
        })
    }

    /// Writes a block body plus its block-index and address-index
    /// entries as one logical batch: the body append fsyncs
    /// first, and only then are the indexes updated, so a crash between
    /// the two leaves an orphaned but harmless block file rather than a
    /// dangling index entry.
    pub fn put_block(
        &self,
        block: &Block,
        address_entries: &[AddressIndexEntry],
    ) -> Result<(), StorageError> {
        let bytes = block.encode_to_vec();
        let location = self.hot.lock().unwrap().append(&bytes)?;

        self.block_index.insert(block.height(), block.hash(), location)?;
        for tx in &block.transactions {
            self.block_index.insert_tx(tx.txid(), block.height())?;
        }
        for entry in address_entries {
            self.address_index.insert(entry)?;
        }
        self.block_index.flush()?;
        self.address_index.flush()?;

        self.cache.lock().unwrap().put(block.hash(), block.clone());
        Ok(())
    }

    /// Persists a block that is not (yet) on the active chain — a branch
    /// candidate the chain state machine may later reorganize onto.
    pub fn store_branch_block(&self, block: &Block) -> Result<(), StorageError> {
        let bytes = block.encode_to_vec();
        let location = self.hot.lock().unwrap().append(&bytes)?;
        self.block_index.insert_hash_only(block.hash(), location)?;
        self.block_index.flush()?;
        self.cache.lock().unwrap().put(block.hash(), block.clone());
        Ok(())
    }

    /// Undoes the index side of [`Storage::put_block`] for a disconnected
    /// block: the body stays in the append-only file (it is never
    /// physically deleted), only the indexes stop pointing at it.
    pub fn disconnect_block(
        &self,
        height: u64,
        hash: Hash,
        address_entries: &[AddressIndexEntry],
    ) -> Result<(), StorageError> {
        self.block_index.remove_height(height)?;
        self.block_index.remove_hash(hash)?;
        let mut seen_txids = std::collections::HashSet::new();
        for entry in address_entries {
            self.address_index
                .remove(&entry.address, entry.block_height, entry.tx_index_in_block)?;
            if seen_txids.insert(entry.txid) {
                self.block_index.remove_tx(entry.txid)?;
            }
        }
        self.block_index.flush()?;
        self.address_index.flush()?;
        self.cache.lock().unwrap().pop(&hash);
        Ok(())
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.block_index.by_height(height)? {
            None => Ok(None),
            Some(location) => Ok(Some(self.load(location)?)),
        }
    }

    pub fn get_block_by_hash(&self, hash: Hash) -> Result<Option<Block>, StorageError> {
        if let Some(block) = self.cache.lock().unwrap().get(&hash) {
            return Ok(Some(block.clone()));
        }
        match self.block_index.by_hash(hash)? {
            None => Ok(None),
            Some(location) => Ok(Some(self.load(location)?)),
        }
    }

    fn load(&self, location: BlockLocation) -> Result<Block, StorageError> {
        let path_owner = if location.compressed { &self.cold } else { &self.hot };
        let raw = path_owner.lock().unwrap().read(location).map_err(|err| {
            if matches!(err, StorageError::PathEscape) {
                self.sink.emit_security(Event::SecurityViolation {
                    kind: "path_escape".to_string(),
                    detail: format!("block location {:?} resolved outside the data directory", location),
                });
            }
            err
        })?;

        let bytes = if location.compressed {
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            out
        } else {
            raw
        };

        let mut slice = bytes.as_slice();
        let block = Block::decode(&mut slice)?;
        self.cache.lock().unwrap().put(block.hash(), block.clone());
        Ok(block)
    }

    /// Flushes both sled indexes to disk. Called on orderly node shutdown.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Persists the active `ChainTip` across restarts. Callers pass the
    /// canonical encoding; `chain::ChainStateMachine` owns the type.
    pub fn set_tip_meta(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.block_index.set_meta(b"tip", bytes)
    }

    pub fn get_tip_meta(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.block_index.get_meta(b"tip")
    }

    /// Finds a confirmed transaction by id via the block it was
    /// confirmed in. Unconfirmed (mempool-resident) transactions are not
    /// visible here — callers check the mempool first.
    pub fn get_tx(&self, txid: Hash) -> Result<Option<chain_types::transaction::Transaction>, StorageError> {
        let height = match self.block_index.height_by_txid(txid)? {
            Some(h) => h,
            None => return Ok(None),
        };
        let block = match self.get_block_by_height(height)? {
            Some(b) => b,
            None => return Ok(None),
        };
        Ok(block.transactions.into_iter().find(|tx| tx.txid() == txid))
    }

    pub fn iter_address(
        &self,
        address: &Address,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AddressIndexEntry>, StorageError> {
        self.address_index.iter_address(address, offset, limit)
    }

    /// Repacks `height`'s block into the gzip cold store once the tip is
    /// at least `compress_depth` blocks ahead of it. A no-op if the
    /// block is too recent or already compressed.
    pub fn compress_if_due(&self, tip_height: u64, height: u64, hash: Hash) -> Result<(), StorageError> {
        if tip_height < height + self.compress_depth {
            return Ok(());
        }
        let location = match self.block_index.by_hash(hash)? {
            Some(loc) => loc,
            None => return Ok(()),
        };
        if location.compressed {
            return Ok(());
        }

        let raw = self.hot.lock().unwrap().read(location)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed_bytes = encoder.finish()?;

        let mut new_location = self.cold.lock().unwrap().append(&compressed_bytes)?;
        new_location.compressed = true;
        self.block_index.insert(height, hash, new_location)?;
        self.block_index.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::event::NullEventSink;

    fn sample_block(height: u64) -> Block {
        use chain_types::address::Address;
        use chain_types::amount::{Amount, NonNegative};
        use chain_types::block::{CompactTarget, Header};
        use chain_types::hash::merkle_root;
        use chain_types::transaction::{Transaction, TxKind, TxOutput};

        let miner = Address::from_pubkey_hash([height as u8; 20]);
        let coinbase = Transaction::new(
            1,
            TxKind::Coinbase,
            None,
            miner,
            Amount::<NonNegative>::new(50).unwrap(),
            Amount::zero(),
            0,
            1_700_000_000 + height,
            vec![],
            vec![TxOutput {
                address: miner,
                amount: Amount::new(50).unwrap(),
            }],
            None,
            None,
        );
        let txs = vec![coinbase];
        let merkle = merkle_root(&txs.iter().map(|t| t.txid()).collect::<Vec<_>>());
        let header = Header::new(1, height, Hash::ZERO, merkle, 1_700_000_000, CompactTarget(0), 0);
        Block {
            header,
            transactions: txs,
            cumulative_work: primitive_types::U256::from(height),
        }
    }

    #[test]
    fn put_then_get_by_height_and_hash_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), 1000, Arc::new(NullEventSink)).unwrap();
        let block = sample_block(1);
        storage.put_block(&block, &[]).unwrap();

        let by_height = storage.get_block_by_height(1).unwrap().unwrap();
        assert_eq!(by_height.hash(), block.hash());
        let by_hash = storage.get_block_by_hash(block.hash()).unwrap().unwrap();
        assert_eq!(by_hash.hash(), block.hash());
    }

    #[test]
    fn disconnect_removes_index_entries_but_not_the_body_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), 1000, Arc::new(NullEventSink)).unwrap();
        let block = sample_block(1);
        storage.put_block(&block, &[]).unwrap();
        storage.disconnect_block(1, block.hash(), &[]).unwrap();

        assert!(storage.get_block_by_height(1).unwrap().is_none());
        assert!(storage.get_block_by_hash(block.hash()).unwrap().is_none());
    }

    #[test]
    fn compression_round_trips_through_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), 0, Arc::new(NullEventSink)).unwrap();
        let block = sample_block(1);
        storage.put_block(&block, &[]).unwrap();

        storage.compress_if_due(10, 1, block.hash()).unwrap();
        storage.cache.lock().unwrap().clear();

        let fetched = storage.get_block_by_hash(block.hash()).unwrap().unwrap();
        assert_eq!(fetched.hash(), block.hash());
    }
}

//! `index/blocks.db` and `index/address.db` — sled-backed key-value
//! indexes, each a set of prefixed keyspaces within one tree
//! (`h:`/`x:`/`t:` for blocks, inverted-height keys for addresses).

use chain_types::codec::{Canonical, MapDecoder, MapEncoder};
use chain_types::hash::Hash;
use chain_types::Address;

use crate::error::StorageError;
use crate::storage::block_file::BlockLocation;

impl Canonical for BlockLocation {
    fn encode(&self, out: &mut Vec<u8>) {
        MapEncoder::new()
            .field("file_id", &self.file_id)
            .field("offset", &self.offset)
            .field("compressed", &self.compressed)
            .finish(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, chain_types::error::CodecError> {
        let mut dec = MapDecoder::parse(buf)?;
        let file_id = dec.field("file_id")?;
        let offset = dec.field("offset")?;
        let compressed = dec.field("compressed")?;
        dec.finish_strict()?;
        Ok(BlockLocation {
            file_id,
            offset,
            compressed,
        })
    }
}

/// `index/blocks.db`: `h:<height be>` and `x:<hash>` both map to the
/// same `BlockLocation`.
pub struct BlockIndex {
    tree: sled::Tree,
}

impl BlockIndex {
    pub fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(BlockIndex {
            tree: db.open_tree("blocks_index")?,
        })
    }

    fn height_key(height: u64) -> Vec<u8> {
        let mut key = b"h:".to_vec();
        key.extend_from_slice(&height.to_be_bytes());
        key
    }

    fn hash_key(hash: Hash) -> Vec<u8> {
        let mut key = b"x:".to_vec();
        key.extend_from_slice(hash.as_bytes());
        key
    }

    fn txid_key(txid: Hash) -> Vec<u8> {
        let mut key = b"t:".to_vec();
        key.extend_from_slice(txid.as_bytes());
        key
    }

    /// Records which block height confirmed `txid`, so `get_tx` can find
    /// it without an address to scan by.
    pub fn insert_tx(&self, txid: Hash, height: u64) -> Result<(), StorageError> {
        self.tree.insert(Self::txid_key(txid), &height.to_be_bytes())?;
        Ok(())
    }

    pub fn remove_tx(&self, txid: Hash) -> Result<(), StorageError> {
        self.tree.remove(Self::txid_key(txid))?;
        Ok(())
    }

    pub fn height_by_txid(&self, txid: Hash) -> Result<Option<u64>, StorageError> {
        match self.tree.get(Self::txid_key(txid))? {
            None => Ok(None),
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(Some(u64::from_be_bytes(buf)))
            }
        }
    }

    pub fn insert(&self, height: u64, hash: Hash, location: BlockLocation) -> Result<(), StorageError> {
        let value = location.encode_to_vec();
        self.tree.insert(Self::height_key(height), value.clone())?;
        self.tree.insert(Self::hash_key(hash), value)?;
        Ok(())
    }

    /// Stores a block that isn't (yet) on the active chain — a branch
    /// head candidate — so it can still be looked up by hash while the
    /// chain state machine decides whether to reorganize onto it. No
    /// height key is written, since the height keyspace reflects the
    /// active chain only.
    pub fn insert_hash_only(&self, hash: Hash, location: BlockLocation) -> Result<(), StorageError> {
        self.tree.insert(Self::hash_key(hash), location.encode_to_vec())?;
        Ok(())
    }

    pub fn remove_height(&self, height: u64) -> Result<(), StorageError> {
        self.tree.remove(Self::height_key(height))?;
        Ok(())
    }

    pub fn remove_hash(&self, hash: Hash) -> Result<(), StorageError> {
        self.tree.remove(Self::hash_key(hash))?;
        Ok(())
    }

    pub fn by_height(&self, height: u64) -> Result<Option<BlockLocation>, StorageError> {
        self.get(&Self::height_key(height))
    }

    pub fn by_hash(&self, hash: Hash) -> Result<Option<BlockLocation>, StorageError> {
        self.get(&Self::hash_key(hash))
    }

    fn get(&self, key: &[u8]) -> Result<Option<BlockLocation>, StorageError> {
        match self.tree.get(key)? {
            None => Ok(None),
            Some(bytes) => {
                let mut slice: &[u8] = &bytes;
                Ok(Some(BlockLocation::decode(&mut slice)?))
            }
        }
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.tree.flush()?;
        Ok(())
    }

    /// Small key-value slot for chain state machine metadata (currently
    /// just the active `ChainTip`) that doesn't warrant its own sled tree.
    pub fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let mut full = b"m:".to_vec();
        full.extend_from_slice(key);
        Ok(self.tree.get(full)?.map(|v| v.to_vec()))
    }

    pub fn set_meta(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut full = b"m:".to_vec();
        full.extend_from_slice(key);
        self.tree.insert(full, value)?;
        Ok(())
    }
}

/// One entry in a per-address transaction history.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressIndexEntry {
    pub address: Address,
    pub block_height: u64,
    pub tx_index_in_block: u32,
    pub txid: Hash,
    pub direction: Direction,
    pub amount: chain_types::Amount,
    pub timestamp: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Sent,
    Received,
}

impl Canonical for Direction {
    fn encode(&self, out: &mut Vec<u8>) {
        let tag: u8 = match self {
            Direction::Sent => 0,
            Direction::Received => 1,
        };
        tag.encode(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, chain_types::error::CodecError> {
        match u8::decode(buf)? {
            0 => Ok(Direction::Sent),
            1 => Ok(Direction::Received),
            other => Err(chain_types::error::CodecError::BadTag(other)),
        }
    }
}

impl Canonical for AddressIndexEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        MapEncoder::new()
            .field("address", &self.address)
            .field("block_height", &self.block_height)
            .field("tx_index_in_block", &self.tx_index_in_block)
            .field("txid", &self.txid)
            .field("direction", &self.direction)
            .field("amount", &self.amount)
            .field("timestamp", &self.timestamp)
            .finish(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, chain_types::error::CodecError> {
        let mut dec = MapDecoder::parse(buf)?;
        let address = dec.field("address")?;
        let block_height = dec.field("block_height")?;
        let tx_index_in_block = dec.field("tx_index_in_block")?;
        let txid = dec.field("txid")?;
        let direction = dec.field("direction")?;
        let amount = dec.field("amount")?;
        let timestamp = dec.field("timestamp")?;
        dec.finish_strict()?;
        Ok(AddressIndexEntry {
            address,
            block_height,
            tx_index_in_block,
            txid,
            direction,
            amount,
            timestamp,
        })
    }
}

/// `index/address.db`: `a:<address><!><height be><tx_index be>` →
/// `AddressIndexEntry`. The height/tx_index components are bitwise
/// inverted before encoding so that sled's natural ascending key order
/// yields the newest entry first per address — `(address, height desc,
/// tx_index desc)` — without a reverse scan.
pub struct AddressIndex {
    tree: sled::Tree,
}

impl AddressIndex {
    pub fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(AddressIndex {
            tree: db.open_tree("address_index")?,
        })
    }

    fn key(address: &Address, height: u64, tx_index: u32) -> Vec<u8> {
        let mut key = b"a:".to_vec();
        key.extend_from_slice(address.as_bytes());
        key.push(b'!');
        key.extend_from_slice(&(u64::MAX - height).to_be_bytes());
        key.extend_from_slice(&(u32::MAX - tx_index).to_be_bytes());
        key
    }

    fn prefix(address: &Address) -> Vec<u8> {
        let mut key = b"a:".to_vec();
        key.extend_from_slice(address.as_bytes());
        key.push(b'!');
        key
    }

    pub fn insert(&self, entry: &AddressIndexEntry) -> Result<(), StorageError> {
        let key = Self::key(&entry.address, entry.block_height, entry.tx_index_in_block);
        self.tree.insert(key, entry.encode_to_vec())?;
        Ok(())
    }

    pub fn remove(&self, address: &Address, height: u64, tx_index: u32) -> Result<(), StorageError> {
        self.tree.remove(Self::key(address, height, tx_index))?;
        Ok(())
    }

    /// Returns up to `limit` entries for `address`, newest-first,
    /// skipping the first `offset` entries.
    pub fn iter_address(
        &self,
        address: &Address,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AddressIndexEntry>, StorageError> {
        let prefix = Self::prefix(address);
        let mut out = Vec::with_capacity(limit);
        for (i, kv) in self.tree.scan_prefix(&prefix).enumerate() {
            if i < offset {
                continue;
            }
            if out.len() >= limit {
                break;
            }
            let (_, value) = kv?;
            let mut slice: &[u8] = &value;
            out.push(AddressIndexEntry::decode(&mut slice)?);
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.tree.flush()?;
        Ok(())
    }
}

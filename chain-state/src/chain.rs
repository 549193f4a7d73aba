//! The chain state machine: the single writer that decides, for every
//! incoming block, whether to extend the active tip, file it as a
//! branch head, reorganize onto a heavier branch, or park it as an
//! orphan. Every tip-moving operation is wrapped in the WAL so a crash
//! mid-reorg recovers cleanly.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use primitive_types::U256;

use chain_types::block::Block;
use chain_types::codec::{Canonical, MapDecoder, MapEncoder};
use chain_types::error::CodecError;
use chain_types::event::{Event, EventSink};
use chain_types::hash::Hash;
use chain_types::transaction::Transaction;

use crate::error::ChainError;
use crate::nonce::{NonceSnapshot, NonceTracker};
use crate::storage::index::{AddressIndexEntry, Direction};
use crate::storage::wal::{ReorgBeginPayload, Wal, WalKind};
use crate::storage::Storage;
use crate::utxo::{UtxoSet, UtxoSnapshot};

/// How many orphan blocks (unknown parent) the pool tolerates before
/// rejecting new ones outright, independent of `Config::reorg_depth_limit`.
const DEFAULT_MAX_ORPHANS: usize = 64;

/// Finality depth: reorgs deeper than this are rejected outright.
pub const MAX_REORG_DEPTH: u64 = 100;
/// How often a WAL `CHECKPOINT` record is written.
pub const CHECKPOINT_INTERVAL: u64 = 1000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainTip {
    pub hash: Hash,
    pub height: u64,
    pub cumulative_work: U256,
}

impl Canonical for ChainTip {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut work_be = [0u8; 32];
        self.cumulative_work.to_big_endian(&mut work_be);
        MapEncoder::new()
            .field("hash", &self.hash)
            .field("height", &self.height)
            .field("cumulative_work", &work_be)
            .finish(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let mut dec = MapDecoder::parse(buf)?;
        let hash = dec.field("hash")?;
        let height = dec.field("height")?;
        let work_be: [u8; 32] = dec.field("cumulative_work")?;
        dec.finish_strict()?;
        Ok(ChainTip {
            hash,
            height,
            cumulative_work: U256::from_big_endian(&work_be),
        })
    }
}

/// What happened as a result of `add_block`, handed back to the node
/// facade so it can reconcile the mempool without `chain-state`
/// depending on `chain-mempool`.
#[derive(Clone, Debug)]
pub struct AddBlockOutcome {
    pub connected_heights: Vec<u64>,
    pub disconnected_heights: Vec<u64>,
    pub confirmed_txids: Vec<Hash>,
    pub reverted_txids: Vec<Hash>,
    /// The connected blocks themselves, in height order, so a caller can
    /// reconcile its own mempool (`on_block_confirmed`) without a second
    /// round trip through storage.
    pub connected_blocks: Vec<Block>,
    /// The disconnected blocks (old-chain order, tip-first), so a caller
    /// can resurrect their transactions back into the mempool after
    /// their index entries have already been removed.
    pub disconnected_blocks: Vec<Block>,
    pub new_tip: ChainTip,
}

impl AddBlockOutcome {
    fn unchanged(tip: ChainTip) -> Self {
        AddBlockOutcome {
            connected_heights: vec![],
            disconnected_heights: vec![],
            confirmed_txids: vec![],
            reverted_txids: vec![],
            connected_blocks: vec![],
            disconnected_blocks: vec![],
            new_tip: tip,
        }
    }
}

fn address_entries_for_tx(tx: &Transaction, height: u64, tx_index: u32) -> Vec<AddressIndexEntry> {
    let mut out = Vec::with_capacity(2);
    if let Some(sender) = tx.sender {
        let debited = tx.amount.checked_add(tx.fee).unwrap_or(tx.amount);
        out.push(AddressIndexEntry {
            address: sender,
            block_height: height,
            tx_index_in_block: tx_index,
            txid: tx.txid(),
            direction: Direction::Sent,
            amount: debited,
            timestamp: tx.timestamp,
        });
    }
    out.push(AddressIndexEntry {
        address: tx.recipient,
        block_height: height,
        tx_index_in_block: tx_index,
        txid: tx.txid(),
        direction: Direction::Received,
        amount: tx.amount,
        timestamp: tx.timestamp,
    });
    out
}

fn address_entries_for_block(block: &Block) -> Vec<AddressIndexEntry> {
    block
        .transactions
        .iter()
        .enumerate()
        .flat_map(|(i, tx)| address_entries_for_tx(tx, block.height(), i as u32))
        .collect()
}

pub struct ChainStateMachine {
    utxo: UtxoSet,
    nonce: NonceTracker,
    storage: Storage,
    wal: Mutex<Wal>,
    tip: Mutex<ChainTip>,
    branch_heads: Mutex<Vec<ChainTip>>,
    orphans: Mutex<HashMap<Hash, Block>>,
    sink: Arc<dyn EventSink>,
    max_reorg_depth: u64,
    max_orphans: usize,
}

impl ChainStateMachine {
    /// Opens (or initializes, for a fresh data directory) the chain state
    /// machine. UTXO and nonce state are never themselves persisted —
    /// only `Storage` and the WAL are durable — so a restart replays
    /// every block from genesis to reconstruct them.
    pub fn open(
        storage: Storage,
        wal_path: &Path,
        genesis: Block,
        sink: Arc<dyn EventSink>,
        max_reorg_depth: u64,
    ) -> Result<Self, ChainError> {
        let mut wal = Wal::open(wal_path)?;
        let mut redo: Option<ReorgBeginPayload> = None;
        match Wal::last_reorg_intent(wal_path)? {
            Some((payload, true)) => {
                // The commit record made it to disk, but the durable
                // disconnect/connect it authorizes may not have (fully)
                // run. Storage is reconciled below, after genesis/replay
                // sets up `utxo`/`nonce`, then `tip_meta` is corrected to
                // match; nothing here is rolled back.
                redo = Some(payload);
            }
            Some((payload, false)) => {
                wal.append(WalKind::ReorgAbort, &[])?;
                sink.emit(Event::ReorgAborted {
                    attempted_tip: payload.new_tip,
                    reason: "unresolved REORG_BEGIN found at startup; old tip retained".to_string(),
                });
            }
            None => {}
        }

        if let Some(payload) = redo {
            apply_reorg_storage(&storage, &payload.disconnect, &payload.connect)?;
            let new_tip_block = storage.get_block_by_hash(payload.new_tip)?.ok_or_else(|| {
                ChainError::Invalid("reorg commit's new tip block is missing from storage".to_string())
            })?;
            let new_tip = ChainTip {
                hash: new_tip_block.hash(),
                height: new_tip_block.height(),
                cumulative_work: new_tip_block.cumulative_work,
            };
            storage.set_tip_meta(&new_tip.encode_to_vec())?;
            sink.emit(Event::ChainReorganized {
                from: payload.old_tip,
                to: payload.new_tip,
                disconnected: payload.disconnect.len(),
                connected: payload.connect.len(),
            });
        }

        let utxo = UtxoSet::new();
        let nonce = NonceTracker::new();

        let tip = match storage.get_tip_meta()? {
            Some(bytes) => {
                let mut slice = bytes.as_slice();
                let recorded_tip = ChainTip::decode(&mut slice)?;
                for height in 0..=recorded_tip.height {
                    let block = storage.get_block_by_height(height)?.ok_or_else(|| {
                        ChainError::Invalid(format!(
                            "missing block at height {} during startup replay",
                            height
                        ))
                    })?;
                    replay_block(&utxo, &nonce, &block)?;
                }
                recorded_tip
            }
            None => {
                let new_tip = ChainTip {
                    hash: genesis.hash(),
                    height: genesis.height(),
                    cumulative_work: genesis.cumulative_work,
                };
                replay_block(&utxo, &nonce, &genesis)?;
                let entries = address_entries_for_block(&genesis);
                storage.put_block(&genesis, &entries)?;
                storage.set_tip_meta(&new_tip.encode_to_vec())?;
                new_tip
            }
        };

        Ok(ChainStateMachine {
            utxo,
            nonce,
            storage,
            wal: Mutex::new(wal),
            tip: Mutex::new(tip),
            branch_heads: Mutex::new(Vec::new()),
            orphans: Mutex::new(HashMap::new()),
            sink,
            max_reorg_depth,
            max_orphans: DEFAULT_MAX_ORPHANS,
        })
    }

    pub fn tip(&self) -> ChainTip {
        self.tip.lock().unwrap().clone()
    }

    pub fn utxo_snapshot(&self) -> UtxoSnapshot {
        self.utxo.snapshot()
    }

    pub fn nonce_snapshot(&self) -> NonceSnapshot {
        self.nonce.snapshot()
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, ChainError> {
        Ok(self.storage.get_block_by_height(height)?)
    }

    pub fn get_block_by_hash(&self, hash: Hash) -> Result<Option<Block>, ChainError> {
        Ok(self.storage.get_block_by_hash(hash)?)
    }

    pub fn get_tx(&self, txid: Hash) -> Result<Option<Transaction>, ChainError> {
        Ok(self.storage.get_tx(txid)?)
    }

    /// Repacks `height` into cold storage once it has aged past the
    /// configured depth. Cheap no-op otherwise; safe for a caller to
    /// invoke after every connected block.
    pub fn compress_if_due(&self, height: u64, hash: Hash) -> Result<(), ChainError> {
        let tip_height = self.tip().height;
        Ok(self.storage.compress_if_due(tip_height, height, hash)?)
    }

    pub fn history(
        &self,
        address: &chain_types::Address,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AddressIndexEntry>, ChainError> {
        Ok(self.storage.iter_address(address, offset, limit)?)
    }

    /// Accepts one validated block. The caller is responsible
    /// for stateless and PoW validation before calling this — the chain
    /// state machine only performs contextual checks inherent to
    /// sequencing (UTXO/nonce application, reorg depth, orphan handling).
    pub fn add_block(&self, block: Block) -> Result<AddBlockOutcome, ChainError> {
        let tip = self.tip();

        if block.height() + self.max_reorg_depth <= tip.height {
            return Err(ChainError::OrphanBeyondWindow(block.height()));
        }

        let outcome = if block.header.prev_hash == tip.hash {
            self.extend(block, tip)
        } else if self.storage.get_block_by_hash(block.header.prev_hash)?.is_some() {
            self.branch_or_reorg(block, tip)
        } else {
            let mut orphans = self.orphans.lock().unwrap();
            if orphans.len() >= self.max_orphans {
                return Err(ChainError::OrphanPoolFull);
            }
            orphans.insert(block.hash(), block);
            return Err(ChainError::UnknownParent);
        }?;

        self.drain_orphans(outcome.new_tip.hash);
        Ok(outcome)
    }

    fn drain_orphans(&self, new_tip_hash: Hash) {
        let ready = {
            let mut orphans = self.orphans.lock().unwrap();
            let ready: Vec<Hash> = orphans
                .values()
                .filter(|b| b.header.prev_hash == new_tip_hash)
                .map(|b| b.hash())
                .collect();
            ready
                .iter()
                .filter_map(|h| orphans.remove(h))
                .collect::<Vec<_>>()
        };
        for block in ready {
            let _ = self.add_block(block);
        }
    }

    fn connect_one(&self, block: &Block) -> Result<(Vec<Hash>, Vec<AddressIndexEntry>), ChainError> {
        let mut confirmed = Vec::with_capacity(block.transactions.len());
        let mut entries = Vec::new();
        for (i, tx) in block.transactions.iter().enumerate() {
            self.utxo.apply_tx(tx)?;
            if let Some(sender) = tx.sender {
                self.nonce.check_and_reserve(&sender, tx.account_nonce)?;
                self.nonce.commit(&sender, tx.account_nonce);
            }
            confirmed.push(tx.txid());
            entries.extend(address_entries_for_tx(tx, block.height(), i as u32));
        }
        Ok((confirmed, entries))
    }

    fn extend(&self, block: Block, tip: ChainTip) -> Result<AddBlockOutcome, ChainError> {
        let utxo_snapshot = self.utxo.snapshot();
        let nonce_snapshot = self.nonce.snapshot();

        let payload = ReorgBeginPayload {
            old_tip: tip.hash,
            new_tip: block.hash(),
            disconnect: vec![],
            connect: vec![block.hash()],
        };
        let mut wal = self.wal.lock().unwrap();
        wal.append(WalKind::ReorgBegin, &payload.encode_to_vec())?;

        let attempt = self.connect_one(&block).and_then(|(confirmed, entries)| {
            self.storage.put_block(&block, &entries)?;
            Ok((confirmed, entries))
        });

        match attempt {
            Ok((confirmed, _entries)) => {
                let new_tip = ChainTip {
                    hash: block.hash(),
                    height: block.height(),
                    cumulative_work: block.cumulative_work,
                };
                self.storage.set_tip_meta(&new_tip.encode_to_vec())?;
                wal.append(WalKind::ReorgCommit, &[])?;
                *self.tip.lock().unwrap() = new_tip.clone();
                self.sink.emit(Event::BlockConnected {
                    height: new_tip.height,
                    hash: new_tip.hash,
                });
                Ok(AddBlockOutcome {
                    connected_heights: vec![new_tip.height],
                    disconnected_heights: vec![],
                    confirmed_txids: confirmed,
                    reverted_txids: vec![],
                    connected_blocks: vec![block],
                    disconnected_blocks: vec![],
                    new_tip,
                })
            }
            Err(e) => {
                self.utxo.restore(utxo_snapshot);
                self.nonce.restore(nonce_snapshot);
                wal.append(WalKind::ReorgAbort, &[]).ok();
                self.sink.emit(Event::BlockRejected {
                    hash: block.hash(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn branch_or_reorg(&self, block: Block, tip: ChainTip) -> Result<AddBlockOutcome, ChainError> {
        self.storage.store_branch_block(&block)?;

        let new_head = ChainTip {
            hash: block.hash(),
            height: block.height(),
            cumulative_work: block.cumulative_work,
        };

        if block.cumulative_work <= tip.cumulative_work {
            let mut heads = self.branch_heads.lock().unwrap();
            heads.retain(|h| h.hash != block.header.prev_hash);
            heads.push(new_head);
            return Ok(AddBlockOutcome::unchanged(tip));
        }

        self.reorganize(block, tip)
    }

    /// Walks from `new_tip_block` back to the common ancestor with the
    /// active chain, then from there forward from `old_tip` to find the
    /// set of blocks to disconnect, then runs the two-phase commit.
    fn reorganize(&self, new_tip_block: Block, old_tip: ChainTip) -> Result<AddBlockOutcome, ChainError> {
        let mut connect: Vec<Block> = vec![new_tip_block];
        let common_ancestor_hash;
        loop {
            let parent_hash = connect.first().unwrap().header.prev_hash;
            let parent = self
                .storage
                .get_block_by_hash(parent_hash)?
                .ok_or(ChainError::UnknownParent)?;
            let on_active_chain = self
                .storage
                .get_block_by_height(parent.height())?
                .map(|b| b.hash() == parent_hash)
                .unwrap_or(false);
            if on_active_chain {
                common_ancestor_hash = parent_hash;
                break;
            }
            connect.insert(0, parent);
        }

        let common_height = self
            .storage
            .get_block_by_hash(common_ancestor_hash)?
            .ok_or(ChainError::UnknownParent)?
            .height();

        let depth = old_tip.height.saturating_sub(common_height);
        if depth > self.max_reorg_depth {
            return Err(ChainError::ReorgTooDeep(depth as usize, self.max_reorg_depth as usize));
        }

        let mut disconnect = Vec::new();
        for h in (common_height + 1..=old_tip.height).rev() {
            if let Some(b) = self.storage.get_block_by_height(h)? {
                disconnect.push(b);
            }
        }

        let payload = ReorgBeginPayload {
            old_tip: old_tip.hash,
            new_tip: connect.last().unwrap().hash(),
            disconnect: disconnect.iter().map(|b| b.hash()).collect(),
            connect: connect.iter().map(|b| b.hash()).collect(),
        };
        let mut wal = self.wal.lock().unwrap();
        wal.append(WalKind::ReorgBegin, &payload.encode_to_vec())?;

        let utxo_snapshot = self.utxo.snapshot();
        let nonce_snapshot = self.nonce.snapshot();

        match self.apply_reorg_memory(&disconnect, &connect) {
            Ok((confirmed, reverted, new_tip)) => {
                // The commit record is durable before any index is
                // touched: a crash between here and the end of this
                // block is redriven from `payload`'s own hash lists by
                // `open`'s recovery, so storage can be brought up to
                // date at leisure afterward.
                wal.append(WalKind::ReorgCommit, &[])?;

                apply_reorg_storage(&self.storage, &payload.disconnect, &payload.connect)?;
                self.storage.set_tip_meta(&new_tip.encode_to_vec())?;
                *self.tip.lock().unwrap() = new_tip.clone();

                let mut heads = self.branch_heads.lock().unwrap();
                heads.retain(|h| h.hash != new_tip.hash);
                heads.push(old_tip.clone());
                drop(heads);

                self.sink.emit(Event::ChainReorganized {
                    from: old_tip.hash,
                    to: new_tip.hash,
                    disconnected: disconnect.len(),
                    connected: connect.len(),
                });

                Ok(AddBlockOutcome {
                    connected_heights: connect.iter().map(|b| b.height()).collect(),
                    disconnected_heights: disconnect.iter().map(|b| b.height()).collect(),
                    confirmed_txids: confirmed,
                    reverted_txids: reverted,
                    connected_blocks: connect.clone(),
                    disconnected_blocks: disconnect.clone(),
                    new_tip,
                })
            }
            Err(e) => {
                // Nothing durable was touched yet, so undoing the
                // in-memory effects is enough to match `old_tip` again.
                self.utxo.restore(utxo_snapshot);
                self.nonce.restore(nonce_snapshot);
                wal.append(WalKind::ReorgAbort, &[]).ok();
                self.sink.emit(Event::ReorgAborted {
                    attempted_tip: connect.last().unwrap().hash(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Reverts `disconnect` and connects `connect` against the in-memory
    /// UTXO/nonce state only. Durable storage is left untouched here —
    /// the caller applies that separately, after the WAL commit record
    /// is fsynced, so a crash between the two always leaves a consistent
    /// story to redrive from (see `apply_reorg_storage` and `open`).
    fn apply_reorg_memory(
        &self,
        disconnect: &[Block],
        connect: &[Block],
    ) -> Result<(Vec<Hash>, Vec<Hash>, ChainTip), ChainError> {
        let mut reverted = Vec::new();
        for block in disconnect {
            for tx in block.transactions.iter().rev() {
                self.utxo.revert_tx(tx);
                if let Some(sender) = tx.sender {
                    self.nonce.rollback_commit(&sender);
                }
                reverted.push(tx.txid());
            }
        }

        let mut confirmed = Vec::new();
        let mut new_tip: Option<ChainTip> = None;
        for block in connect {
            let (txids, _entries) = self.connect_one(block)?;
            confirmed.extend(txids);
            new_tip = Some(ChainTip {
                hash: block.hash(),
                height: block.height(),
                cumulative_work: block.cumulative_work,
            });
        }

        Ok((
            confirmed,
            reverted,
            new_tip.expect("reorganize is only called with a non-empty connect list"),
        ))
    }
}

/// Applies the storage side of an already-committed reorg, driven
/// purely by the hash lists from its `REORG_COMMIT`-backed `REORG_BEGIN`
/// payload: removes the disconnected blocks' index entries in tip-first
/// order, then reinserts the connected blocks at their active height.
/// Every block here is already durable by the time this runs —
/// disconnect blocks are still fully indexed on the active chain until
/// their turn comes, and connect blocks were already stored as branch
/// candidates (or by an earlier, interrupted pass of this same
/// function) — so repeated calls for the same payload are safe.
fn apply_reorg_storage(storage: &Storage, disconnect: &[Hash], connect: &[Hash]) -> Result<(), ChainError> {
    for hash in disconnect {
        let block = match storage.get_block_by_hash(*hash)? {
            Some(block) => block,
            None => continue, // already disconnected by an earlier, interrupted pass
        };
        let entries = address_entries_for_block(&block);
        storage.disconnect_block(block.height(), block.hash(), &entries)?;
    }

    for hash in connect {
        let block = storage.get_block_by_hash(*hash)?.ok_or_else(|| {
            ChainError::Invalid(format!("reorg commit references a missing block {:?}", hash))
        })?;
        let already_active = storage
            .get_block_by_height(block.height())?
            .map(|b| b.hash() == block.hash())
            .unwrap_or(false);
        if already_active {
            continue;
        }
        let entries = address_entries_for_block(&block);
        storage.put_block(&block, &entries)?;
    }
    Ok(())
}

fn replay_block(utxo: &UtxoSet, nonce: &NonceTracker, block: &Block) -> Result<(), ChainError> {
    for tx in &block.transactions {
        utxo.apply_tx(tx)?;
        if let Some(sender) = tx.sender {
            nonce.check_and_reserve(&sender, tx.account_nonce)?;
            nonce.commit(&sender, tx.account_nonce);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::address::Address;
    use chain_types::amount::{Amount, NonNegative};
    use chain_types::block::{CompactTarget, Header};
    use chain_types::event::NullEventSink;
    use chain_types::hash::merkle_root;
    use chain_types::transaction::{TxKind, TxOutput};

    fn coinbase_block(height: u64, prev_hash: Hash, miner: Address, work: u64) -> Block {
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
        let header = Header::new(1, height, prev_hash, merkle, 1_700_000_000 + height, CompactTarget(0), 0);
        Block {
            header,
            transactions: txs,
            cumulative_work: U256::from(work),
        }
    }

    fn open_machine(dir: &std::path::Path) -> ChainStateMachine {
        let storage = Storage::open(dir, 1000, Arc::new(NullEventSink)).unwrap();
        let genesis = coinbase_block(0, Hash::ZERO, Address::from_pubkey_hash([0u8; 20]), 1);
        ChainStateMachine::open(storage, &dir.join("wal").join("reorg.log"), genesis, Arc::new(NullEventSink), MAX_REORG_DEPTH).unwrap()
    }

    #[test]
    fn extending_the_tip_connects_and_updates_balance() {
        let dir = tempfile::tempdir().unwrap();
        let machine = open_machine(dir.path());
        let miner = Address::from_pubkey_hash([1u8; 20]);
        let genesis_hash = machine.tip().hash;

        let b1 = coinbase_block(1, genesis_hash, miner, 2);
        let outcome = machine.add_block(b1.clone()).unwrap();

        assert_eq!(outcome.new_tip.height, 1);
        assert_eq!(machine.tip().hash, b1.hash());
        assert_eq!(machine.utxo_snapshot().balance(&miner).atoms(), 50);
    }

    #[test]
    fn lower_work_branch_is_recorded_but_does_not_move_the_tip() {
        let dir = tempfile::tempdir().unwrap();
        let machine = open_machine(dir.path());
        let genesis_hash = machine.tip().hash;

        let a1 = coinbase_block(1, genesis_hash, Address::from_pubkey_hash([1u8; 20]), 5);
        machine.add_block(a1.clone()).unwrap();

        // An alternate child of genesis with less work than `a1`: a
        // genuine branch point, since its parent is no longer the tip.
        let weak = coinbase_block(1, genesis_hash, Address::from_pubkey_hash([2u8; 20]), 1);
        let outcome = machine.add_block(weak).unwrap();
        assert_eq!(outcome.new_tip.hash, a1.hash());
        assert_eq!(machine.tip().hash, a1.hash());
    }

    #[test]
    fn reorg_to_heavier_branch_disconnects_and_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let machine = open_machine(dir.path());
        let genesis_hash = machine.tip().hash;

        let a1 = coinbase_block(1, genesis_hash, Address::from_pubkey_hash([1u8; 20]), 2);
        machine.add_block(a1.clone()).unwrap();

        let b1 = coinbase_block(1, genesis_hash, Address::from_pubkey_hash([2u8; 20]), 1);
        let outcome = machine.add_block(b1.clone()).unwrap();
        assert!(outcome.connected_heights.is_empty());
        assert_eq!(machine.tip().hash, a1.hash());

        let b2 = coinbase_block(2, b1.hash(), Address::from_pubkey_hash([2u8; 20]), 5);
        let outcome = machine.add_block(b2.clone()).unwrap();
        assert_eq!(machine.tip().hash, b2.hash());
        assert_eq!(outcome.disconnected_heights, vec![1]);
        assert_eq!(outcome.connected_heights, vec![1, 2]);
    }

    #[test]
    fn reorg_commit_durably_recorded_but_not_yet_applied_is_redone_on_open() {
        // Reproduces a crash between the WAL's `ReorgCommit` fsync and
        // the durable index update it authorizes: `a1` is still active
        // in storage, `b1`/`b2` are still unindexed branch candidates.
        // `open` must finish the commit rather than fail startup replay.
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("wal").join("reorg.log");
        let miner_a = Address::from_pubkey_hash([1u8; 20]);
        let miner_b = Address::from_pubkey_hash([2u8; 20]);

        let genesis = coinbase_block(0, Hash::ZERO, Address::from_pubkey_hash([0u8; 20]), 1);
        let genesis_hash = genesis.hash();

        let storage = Storage::open(dir.path(), 1000, Arc::new(NullEventSink)).unwrap();
        storage.put_block(&genesis, &address_entries_for_block(&genesis)).unwrap();

        let a1 = coinbase_block(1, genesis_hash, miner_a, 2);
        storage.put_block(&a1, &address_entries_for_block(&a1)).unwrap();
        let active_tip = ChainTip {
            hash: a1.hash(),
            height: 1,
            cumulative_work: a1.cumulative_work,
        };
        storage.set_tip_meta(&active_tip.encode_to_vec()).unwrap();

        let b1 = coinbase_block(1, genesis_hash, miner_b, 1);
        let b2 = coinbase_block(2, b1.hash(), miner_b, 5);
        storage.store_branch_block(&b1).unwrap();
        storage.store_branch_block(&b2).unwrap();

        let payload = ReorgBeginPayload {
            old_tip: a1.hash(),
            new_tip: b2.hash(),
            disconnect: vec![a1.hash()],
            connect: vec![b1.hash(), b2.hash()],
        };
        let mut wal = Wal::open(&wal_path).unwrap();
        wal.append(WalKind::ReorgBegin, &payload.encode_to_vec()).unwrap();
        wal.append(WalKind::ReorgCommit, &[]).unwrap();
        drop(wal);

        let machine =
            ChainStateMachine::open(storage, &wal_path, genesis, Arc::new(NullEventSink), MAX_REORG_DEPTH).unwrap();

        assert_eq!(machine.tip().hash, b2.hash());
        assert_eq!(machine.tip().height, 2);
        assert!(machine.get_block_by_hash(a1.hash()).unwrap().is_none());
        assert_eq!(machine.get_block_by_height(1).unwrap().unwrap().hash(), b1.hash());
        assert_eq!(machine.get_block_by_height(2).unwrap().unwrap().hash(), b2.hash());
        assert_eq!(machine.utxo_snapshot().balance(&miner_b).atoms(), 100);
        assert_eq!(machine.utxo_snapshot().balance(&miner_a).atoms(), 0);
    }

    #[test]
    fn unknown_parent_is_parked_as_an_orphan() {
        let dir = tempfile::tempdir().unwrap();
        let machine = open_machine(dir.path());
        let dangling = coinbase_block(5, Hash([9u8; 32]), Address::from_pubkey_hash([3u8; 20]), 1);
        assert!(matches!(machine.add_block(dangling), Err(ChainError::UnknownParent)));
    }

    #[test]
    fn block_outside_the_reorg_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), 1000, Arc::new(NullEventSink)).unwrap();
        let miner = Address::from_pubkey_hash([1u8; 20]);
        let genesis = coinbase_block(0, Hash::ZERO, miner, 1);
        let genesis_hash = genesis.hash();
        let machine = ChainStateMachine::open(
            storage,
            &dir.path().join("wal").join("reorg.log"),
            genesis,
            Arc::new(NullEventSink),
            /* max_reorg_depth */ 2,
        )
        .unwrap();

        let mut prev_hash = genesis_hash;
        for height in 1..=3u64 {
            let block = coinbase_block(height, prev_hash, miner, height + 1);
            prev_hash = block.hash();
            machine.add_block(block).unwrap();
        }
        assert_eq!(machine.tip().height, 3);

        // Height 0 is 3 below the tip, past the configured 2-block window.
        let stale = coinbase_block(0, Hash::ZERO, miner, 1);
        assert!(matches!(
            machine.add_block(stale),
            Err(ChainError::OrphanBeyondWindow(0))
        ));
    }
}

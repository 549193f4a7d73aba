//! The mempool: admitted transactions ordered by fee_per_byte, with its
//! own reservation bookkeeping independent of the chain state machine's
//! `UtxoSet` — the mempool exclusively owns its entries and reservation
//! records. A fee-sorted binary heap with tombstone compaction backs
//! selection, with RBF replacement on top.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chain_state::{NonceSnapshot, UtxoSnapshot};
use chain_types::block::Block;
use chain_types::event::{Event, EventSink};
use chain_types::hash::Hash;
use chain_types::transaction::{OutPoint, Transaction};
use chain_types::Address;

use chain_consensus::validator;
use chain_consensus::ValidationError;

use crate::error::AdmitError;

impl From<ValidationError> for AdmitError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::BadSignature => AdmitError::BadSignature,
            ValidationError::FeeTooLow(..) => AdmitError::FeeTooLow,
            ValidationError::Utxo(_) => AdmitError::UnknownInput,
            ValidationError::Nonce(_) => AdmitError::NonceInvalid,
            ValidationError::InsufficientFunds(_) => AdmitError::UnknownInput,
            _ => AdmitError::Malformed,
        }
    }
}

#[derive(Clone)]
struct MempoolEntry {
    tx: Transaction,
    arrival_seq: u64,
    fee_per_byte: u64,
    size: usize,
    expires_at: u64,
}

/// Priority key for the admission heap: highest `fee_per_byte` first,
/// ties broken by earliest `arrival_seq`. `Ord` is defined so a
/// max-`BinaryHeap` pops in exactly that order.
#[derive(Clone, Eq, PartialEq)]
struct HeapKey {
    fee_per_byte: u64,
    arrival_seq: u64,
    txid: Hash,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fee_per_byte
            .cmp(&other.fee_per_byte)
            .then_with(|| other.arrival_seq.cmp(&self.arrival_seq))
            .then_with(|| other.txid.as_bytes().cmp(self.txid.as_bytes()))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    entries: HashMap<Hash, MempoolEntry>,
    /// Input outpoint → the mempool txid currently reserving it.
    spent: HashMap<OutPoint, Hash>,
    /// `(sender, account_nonce)` → the mempool txid currently reserving
    /// that nonce. Mirrors `spent`, but on the nonce side of admission,
    /// so a sender can hold more than one in-flight transaction at
    /// successive nonces and a same-nonce resend is handled as a
    /// fee-replacement rather than an automatic `Nonce::Reused` gap.
    nonce_reservations: HashMap<(Address, u64), Hash>,
    heap: BinaryHeap<HeapKey>,
}

pub struct Mempool {
    inner: Mutex<Inner>,
    tombstones: AtomicUsize,
    next_seq: AtomicU64,
    capacity_bytes: usize,
    ttl_secs: u64,
    sink: Arc<dyn EventSink>,
}

impl Mempool {
    pub fn new(capacity_bytes: usize, ttl_secs: u64, sink: Arc<dyn EventSink>) -> Self {
        Mempool {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                spent: HashMap::new(),
                nonce_reservations: HashMap::new(),
                heap: BinaryHeap::new(),
            }),
            tombstones: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            capacity_bytes,
            ttl_secs,
            sink,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, txid: Hash) -> bool {
        self.inner.lock().unwrap().entries.contains_key(&txid)
    }

    pub fn get(&self, txid: Hash) -> Option<Transaction> {
        self.inner.lock().unwrap().entries.get(&txid).map(|e| e.tx.clone())
    }

    /// Admits `tx` after stateless and contextual validation, enforcing
    /// the no-duplicate-reservation rule and RBF replacement. Admission
    /// and reservation happen under one lock acquisition, so either
    /// both occur or neither does.
    pub fn admit(
        &self,
        tx: Transaction,
        utxo: &UtxoSnapshot,
        nonce: &NonceSnapshot,
        now: u64,
    ) -> Result<Hash, AdmitError> {
        if tx.is_coinbase() {
            return Err(AdmitError::Malformed);
        }
        validator::signature_is_valid(&tx)?;
        validator::fee_is_valid(&tx)?;
        validator::inputs_exist_and_unspent(&tx, utxo)?;
        validator::sender_has_sufficient_value(&tx, utxo)?;

        let txid = tx.txid();
        let size = tx.encoded_len();
        let fee_per_byte = tx.fee.atoms() / (size as u64).max(1);

        let mut inner = self.inner.lock().unwrap();
        self.expire_locked(&mut inner, now);

        if inner.entries.contains_key(&txid) {
            return Ok(txid);
        }

        // A resend at a nonce the mempool already holds is a same-nonce
        // replacement candidate below, not a new reservation — anything
        // else must be exactly the next nonce after every reservation
        // already held for this sender (`current` plus however many are
        // pending), so several in-flight transactions from one sender
        // stack up contiguously instead of only ever admitting one.
        if let Some(sender) = tx.sender {
            if !inner.nonce_reservations.contains_key(&(sender, tx.account_nonce)) {
                let pending_count = inner
                    .nonce_reservations
                    .keys()
                    .filter(|(addr, _)| *addr == sender)
                    .count() as u64;
                let expected = nonce.current(&sender) + pending_count;
                validator::nonce_is_contiguous(&tx, expected)?;
            }
        }

        let mut to_replace: Option<Hash> = None;
        for input in &tx.inputs {
            if let Some(&conflicting) = inner.spent.get(input) {
                let conflicting_fee = inner.entries[&conflicting].fee_per_byte;
                if fee_per_byte > conflicting_fee {
                    to_replace = Some(conflicting);
                } else {
                    return Err(AdmitError::ConflictingReservation);
                }
            }
        }
        if let Some(sender) = tx.sender {
            if let Some(&conflicting) = inner.nonce_reservations.get(&(sender, tx.account_nonce)) {
                let conflicting_fee = inner.entries[&conflicting].fee_per_byte;
                if fee_per_byte > conflicting_fee {
                    to_replace = Some(conflicting);
                } else {
                    return Err(AdmitError::ConflictingReservation);
                }
            }
        }
        if let Some(old_txid) = to_replace {
            Self::evict_locked(&mut inner, old_txid, &self.tombstones);
            self.sink.emit(Event::MempoolEvicted {
                txid: old_txid,
                reason: "replaced by higher-fee conflicting transaction".to_string(),
            });
        }

        let entry = MempoolEntry {
            tx: tx.clone(),
            arrival_seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            fee_per_byte,
            size,
            expires_at: now + self.ttl_secs,
        };
        for input in &tx.inputs {
            inner.spent.insert(*input, txid);
        }
        if let Some(sender) = tx.sender {
            inner.nonce_reservations.insert((sender, tx.account_nonce), txid);
        }
        inner.heap.push(HeapKey {
            fee_per_byte,
            arrival_seq: entry.arrival_seq,
            txid,
        });
        inner.entries.insert(txid, entry);

        self.enforce_capacity_locked(&mut inner);

        self.sink.emit(Event::MempoolAdmitted {
            txid,
            fee_per_byte: fee_per_byte as f64,
        });
        Ok(txid)
    }

    /// Removes `txid`, releasing its input reservations. O(1) plus a
    /// tombstone that a later compaction reclaims.
    pub fn remove(&self, txid: Hash) {
        let mut inner = self.inner.lock().unwrap();
        Self::evict_locked(&mut inner, txid, &self.tombstones);
    }

    fn evict_locked(inner: &mut Inner, txid: Hash, tombstones: &AtomicUsize) {
        if let Some(entry) = inner.entries.remove(&txid) {
            for input in &entry.tx.inputs {
                if inner.spent.get(input) == Some(&txid) {
                    inner.spent.remove(input);
                }
            }
            if let Some(sender) = entry.tx.sender {
                let key = (sender, entry.tx.account_nonce);
                if inner.nonce_reservations.get(&key) == Some(&txid) {
                    inner.nonce_reservations.remove(&key);
                }
            }
            tombstones.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Drops entries whose `expires_at` has passed `now`. Called
    /// opportunistically on every `admit`, and may also be driven by an
    /// external sweep timer.
    pub fn expire_stale(&self, now: u64) {
        let mut inner = self.inner.lock().unwrap();
        self.expire_locked(&mut inner, now);
    }

    fn expire_locked(&self, inner: &mut Inner, now: u64) {
        let expired: Vec<Hash> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(txid, _)| *txid)
            .collect();
        for txid in expired {
            Self::evict_locked(inner, txid, &self.tombstones);
            self.sink.emit(Event::MempoolEvicted {
                txid,
                reason: "expired".to_string(),
            });
        }
        self.compact_if_due_locked(inner);
    }

    fn compact_if_due_locked(&self, inner: &mut Inner) {
        let tombstoned = self.tombstones.load(Ordering::SeqCst);
        if inner.heap.len() == 0 || tombstoned * 2 < inner.heap.len() {
            return;
        }
        let rebuilt: BinaryHeap<HeapKey> = inner
            .entries
            .values()
            .map(|e| HeapKey {
                fee_per_byte: e.fee_per_byte,
                arrival_seq: e.arrival_seq,
                txid: e.tx.txid(),
            })
            .collect();
        inner.heap = rebuilt;
        self.tombstones.store(0, Ordering::SeqCst);
    }

    /// Evicts the lowest-`fee_per_byte` entries until the mempool's
    /// total encoded size is back under `capacity_bytes`, skipping any
    /// entry one of whose outputs is still referenced by a
    /// higher-fee-per-byte mempool child (child-pays-for-parent).
    fn enforce_capacity_locked(&self, inner: &mut Inner) {
        let mut total: usize = inner.entries.values().map(|e| e.size).sum();
        if total <= self.capacity_bytes {
            return;
        }

        let mut by_fee: Vec<(Hash, u64)> = inner.entries.iter().map(|(id, e)| (*id, e.fee_per_byte)).collect();
        by_fee.sort_by_key(|(_, fee)| *fee);

        for (txid, fee) in by_fee {
            if total <= self.capacity_bytes {
                break;
            }
            let has_higher_fee_child = inner.entries.values().any(|child| {
                child.fee_per_byte > fee && child.tx.inputs.iter().any(|i| i.txid == txid)
            });
            if has_higher_fee_child {
                continue;
            }
            if let Some(entry) = inner.entries.get(&txid) {
                total -= entry.size;
            }
            Self::evict_locked(inner, txid, &self.tombstones);
            self.sink.emit(Event::MempoolEvicted {
                txid,
                reason: "evicted to respect mempool capacity".to_string(),
            });
        }
    }

    /// Highest-fee-first selection respecting `target_size`,
    /// `target_count`, and parent-before-child ordering among mempool
    /// transactions. A transaction whose unconfirmed parent hasn't been
    /// selected yet is deferred to a later pass rather than included
    /// out of order.
    pub fn select_for_block(&self, target_size: usize, target_count: usize) -> Vec<Transaction> {
        let inner = self.inner.lock().unwrap();
        let mut heap = inner.heap.clone();
        let mut ordered = Vec::with_capacity(inner.entries.len());
        while let Some(key) = heap.pop() {
            if inner.entries.contains_key(&key.txid) {
                ordered.push(key.txid);
            }
        }

        let mut selected = Vec::new();
        let mut selected_set: HashSet<Hash> = HashSet::new();
        let mut total_size = 0usize;

        let mut pending = ordered;
        loop {
            let mut made_progress = false;
            let mut remaining = Vec::with_capacity(pending.len());
            for txid in pending {
                if selected.len() >= target_count {
                    break;
                }
                let entry = &inner.entries[&txid];
                let parent_ready = entry.tx.inputs.iter().all(|input| {
                    !inner.entries.contains_key(&input.txid) || selected_set.contains(&input.txid)
                });
                if !parent_ready {
                    remaining.push(txid);
                    continue;
                }
                if total_size + entry.size > target_size {
                    continue;
                }
                selected.push(entry.tx.clone());
                selected_set.insert(txid);
                total_size += entry.size;
                made_progress = true;
            }
            if !made_progress || selected.len() >= target_count {
                break;
            }
            pending = remaining;
        }
        selected
    }

    /// Removes every transaction the block confirmed, and evicts any
    /// remaining entry whose inputs the block's transactions already
    /// spent (a conflict surfaced by a reorg).
    pub fn on_block_confirmed(&self, block: &Block) {
        let mut inner = self.inner.lock().unwrap();
        let mut confirmed_outpoints: HashSet<OutPoint> = HashSet::new();
        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            confirmed_outpoints.extend(tx.inputs.iter().copied());
            Self::evict_locked(&mut inner, tx.txid(), &self.tombstones);
        }

        let conflicting: Vec<Hash> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.tx.inputs.iter().any(|i| confirmed_outpoints.contains(i)))
            .map(|(txid, _)| *txid)
            .collect();
        for txid in conflicting {
            Self::evict_locked(&mut inner, txid, &self.tombstones);
            self.sink.emit(Event::MempoolEvicted {
                txid,
                reason: "input spent by a confirmed block".to_string(),
            });
        }
    }

    /// Re-admits transactions from disconnected blocks whose inputs are
    /// still unspent against the post-reorg state.
    pub fn resurrect(&self, disconnected_blocks: &[Block], utxo: &UtxoSnapshot, nonce: &NonceSnapshot, now: u64) {
        for block in disconnected_blocks {
            for tx in block.transactions.iter().skip(1) {
                let _ = self.admit(tx.clone(), utxo, nonce, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_state::{NonceTracker, UtxoSet};
    use chain_types::address::Address;
    use chain_types::amount::{Amount, NonNegative};
    use chain_types::event::NullEventSink;
    use chain_types::transaction::{TxKind, TxOutput};
    use proptest::prelude::*;

    fn coinbase(owner: Address, amount: u64) -> Transaction {
        Transaction::new(
            1,
            TxKind::Coinbase,
            None,
            owner,
            Amount::<NonNegative>::new(amount).unwrap(),
            Amount::zero(),
            0,
            1_700_000_000,
            vec![],
            vec![TxOutput { address: owner, amount: Amount::new(amount).unwrap() }],
            None,
            None,
        )
    }

    fn spend(prev_txid: Hash, sender: Address, recipient: Address, amount: u64, fee: u64, nonce: u64) -> Transaction {
        Transaction::new(
            1,
            TxKind::Transfer,
            Some(sender),
            recipient,
            Amount::new(amount).unwrap(),
            Amount::new(fee).unwrap(),
            nonce,
            1_700_000_100,
            vec![OutPoint { txid: prev_txid, vout: 0 }],
            vec![TxOutput { address: recipient, amount: Amount::new(amount).unwrap() }],
            None,
            None,
        )
    }

    fn fixture() -> (UtxoSet, NonceTracker, Address, Transaction) {
        let utxo = UtxoSet::new();
        let nonce = NonceTracker::new();
        let owner = Address::from_pubkey_hash([1u8; 20]);
        let cb = coinbase(owner, 1000);
        utxo.apply_tx(&cb).unwrap();
        (utxo, nonce, owner, cb)
    }

    #[test]
    fn admits_a_well_formed_transfer() {
        let (utxo, nonce, owner, cb) = fixture();
        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let recipient = Address::from_pubkey_hash([2u8; 20]);
        let tx = spend(cb.txid(), owner, recipient, 90, 10, 0);

        let txid = mempool.admit(tx, &utxo.snapshot(), &nonce.snapshot(), 1_700_000_200).unwrap();
        assert!(mempool.contains(txid));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn conflicting_input_is_rejected_without_rbf() {
        let (utxo, nonce, owner, cb) = fixture();
        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let recipient = Address::from_pubkey_hash([2u8; 20]);

        let tx_a = spend(cb.txid(), owner, recipient, 90, 20, 0);
        let tx_b = spend(cb.txid(), owner, recipient, 80, 10, 0);

        mempool.admit(tx_a, &utxo.snapshot(), &nonce.snapshot(), 1_700_000_200).unwrap();
        let err = mempool.admit(tx_b, &utxo.snapshot(), &nonce.snapshot(), 1_700_000_200).unwrap_err();
        assert_eq!(err, AdmitError::ConflictingReservation);
    }

    #[test]
    fn higher_fee_conflict_replaces_the_lower_fee_entry() {
        let (utxo, nonce, owner, cb) = fixture();
        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let recipient = Address::from_pubkey_hash([2u8; 20]);

        let tx_a = spend(cb.txid(), owner, recipient, 90, 10, 0);
        let tx_b = spend(cb.txid(), owner, recipient, 80, 20, 0);

        let txid_a = mempool.admit(tx_a, &utxo.snapshot(), &nonce.snapshot(), 1_700_000_200).unwrap();
        let txid_b = mempool.admit(tx_b, &utxo.snapshot(), &nonce.snapshot(), 1_700_000_200).unwrap();

        assert!(!mempool.contains(txid_a));
        assert!(mempool.contains(txid_b));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn second_tx_from_the_same_sender_is_admitted_at_the_next_nonce() {
        let utxo = UtxoSet::new();
        let nonce = NonceTracker::new();
        let owner = Address::from_pubkey_hash([1u8; 20]);
        let recipient = Address::from_pubkey_hash([2u8; 20]);
        let cb_a = coinbase(owner, 1000);
        let cb_b = coinbase(owner, 1000);
        utxo.apply_tx(&cb_a).unwrap();
        utxo.apply_tx(&cb_b).unwrap();

        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let tx_a = spend(cb_a.txid(), owner, recipient, 10, 5, 0);
        let tx_b = spend(cb_b.txid(), owner, recipient, 10, 5, 1);

        let txid_a = mempool.admit(tx_a, &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();
        let txid_b = mempool.admit(tx_b, &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();

        assert!(mempool.contains(txid_a));
        assert!(mempool.contains(txid_b));
        assert_eq!(mempool.len(), 2);
    }

    #[test]
    fn resend_at_an_already_held_nonce_is_a_replacement_not_a_gap() {
        let (utxo, nonce, owner, cb) = fixture();
        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let recipient = Address::from_pubkey_hash([2u8; 20]);

        let low_fee = spend(cb.txid(), owner, recipient, 90, 10, 0);
        let high_fee = spend(cb.txid(), owner, recipient, 80, 20, 0);

        let txid_low = mempool.admit(low_fee, &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();
        let txid_high = mempool.admit(high_fee, &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();

        assert!(!mempool.contains(txid_low));
        assert!(mempool.contains(txid_high));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn releasing_a_reservation_lets_a_later_sender_reuse_its_nonce_slot() {
        let (utxo, nonce, owner, cb) = fixture();
        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let recipient = Address::from_pubkey_hash([2u8; 20]);

        let tx_a = spend(cb.txid(), owner, recipient, 90, 10, 0);
        let txid_a = mempool.admit(tx_a, &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();
        mempool.remove(txid_a);

        let cb2 = coinbase(owner, 1000);
        utxo.apply_tx(&cb2).unwrap();
        let tx_b = spend(cb2.txid(), owner, recipient, 90, 10, 0);
        let txid_b = mempool.admit(tx_b, &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();
        assert!(mempool.contains(txid_b));
    }

    #[test]
    fn select_for_block_orders_by_fee_per_byte_desc() {
        let utxo = UtxoSet::new();
        let nonce = NonceTracker::new();
        let owner = Address::from_pubkey_hash([1u8; 20]);
        let recipient = Address::from_pubkey_hash([2u8; 20]);
        let cb_a = coinbase(owner, 1000);
        let cb_b = coinbase(owner, 1000);
        utxo.apply_tx(&cb_a).unwrap();
        utxo.apply_tx(&cb_b).unwrap();

        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let low_fee = spend(cb_a.txid(), owner, recipient, 10, 1, 0);
        let high_fee = spend(cb_b.txid(), owner, recipient, 10, 1000, 1);

        mempool.admit(low_fee.clone(), &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();
        mempool.admit(high_fee.clone(), &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();

        let selected = mempool.select_for_block(usize::MAX, 10);
        assert_eq!(selected[0].txid(), high_fee.txid());
        assert_eq!(selected[1].txid(), low_fee.txid());
    }

    #[test]
    fn on_block_confirmed_removes_included_and_conflicting_entries() {
        let (utxo, nonce, owner, cb) = fixture();
        let mempool = Mempool::new(1_000_000, 3600, Arc::new(NullEventSink));
        let recipient = Address::from_pubkey_hash([2u8; 20]);
        let tx = spend(cb.txid(), owner, recipient, 90, 10, 0);
        let txid = mempool.admit(tx.clone(), &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();

        use chain_types::block::{CompactTarget, Header};
        use chain_types::hash::{merkle_root, Hash as H};
        let block_txs = vec![coinbase(owner, 50), tx];
        let merkle = merkle_root(&block_txs.iter().map(|t| t.txid()).collect::<Vec<_>>());
        let header = Header::new(1, 1, H::ZERO, merkle, 1_700_000_300, CompactTarget(0), 0);
        let block = Block {
            header,
            transactions: block_txs,
            cumulative_work: primitive_types::U256::zero(),
        };

        mempool.on_block_confirmed(&block);
        assert!(!mempool.contains(txid));
        assert_eq!(mempool.len(), 0);
    }

    proptest! {
        /// Every admitted transaction here has the same shape and differs
        /// only in `fee`, so byte size is constant and fee order is
        /// fee-per-byte order: selection must come back sorted by fee,
        /// highest first.
        #[test]
        fn select_for_block_is_always_sorted_by_fee_desc(
            fees in proptest::collection::hash_set(1u64..10_000, 2..15),
            owner in chain_test::address_strategy(),
            recipient in chain_test::address_strategy(),
        ) {
            let utxo = UtxoSet::new();
            let nonce = NonceTracker::new();
            let mempool = Mempool::new(10_000_000, 3600, Arc::new(NullEventSink));

            let fees: Vec<u64> = fees.into_iter().collect();
            for (i, fee) in fees.iter().enumerate() {
                let cb = coinbase(owner, 1000);
                utxo.apply_tx(&cb).unwrap();
                let tx = spend(cb.txid(), owner, recipient, 10, *fee, i as u64);
                mempool.admit(tx, &utxo.snapshot(), &nonce.snapshot(), 0).unwrap();
            }

            let selected = mempool.select_for_block(usize::MAX, fees.len());
            prop_assert_eq!(selected.len(), fees.len());
            for pair in selected.windows(2) {
                prop_assert!(pair[0].fee.atoms() >= pair[1].fee.atoms());
            }
        }
    }
}

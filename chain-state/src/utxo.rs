//! The UTXO set: owned outputs, spend/unspend, and snapshots.
//!
//! The live set is a persistent (copy-on-write) `HashMap` behind a single
//! mutex: `snapshot()` just clones the `Arc`, an O(1) refcount bump, and
//! mutation uses `Arc::make_mut`, which clones the underlying map only
//! when a snapshot is still outstanding. Readers holding a snapshot never
//! block the writer, and the writer never blocks on a reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chain_types::amount::{Amount, NonNegative};
use chain_types::hash::Hash;
use chain_types::transaction::{OutPoint, Transaction};
use chain_types::Address;

use crate::error::UtxoError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReservationId(u64);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UtxoStatus {
    Unspent,
    Pending(ReservationId),
    Spent,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtxoRecord {
    pub owner: Address,
    pub amount: Amount<NonNegative>,
    pub status: UtxoStatus,
}

type UtxoMap = HashMap<OutPoint, UtxoRecord>;

/// An O(1)-to-clone read handle on the set as of some point in time.
#[derive(Clone)]
pub struct UtxoSnapshot(Arc<UtxoMap>);

impl UtxoSnapshot {
    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoRecord> {
        self.0.get(outpoint)
    }

    pub fn is_unspent(&self, outpoint: &OutPoint) -> bool {
        matches!(
            self.0.get(outpoint),
            Some(UtxoRecord {
                status: UtxoStatus::Unspent,
                ..
            })
        )
    }

    /// Sum of every UTXO in `Unspent` status owned by `addr`. Used to
    /// answer `get_balance` from a consistent point-in-time view.
    pub fn balance(&self, addr: &Address) -> Amount<NonNegative> {
        let mut total = Amount::zero();
        for record in self.0.values() {
            if &record.owner == addr && record.status == UtxoStatus::Unspent {
                total = total.checked_add(record.amount).expect(
                    "sum of confirmed unspent outputs can never exceed MAX_SUPPLY",
                );
            }
        }
        total
    }
}

pub struct UtxoSet {
    map: Mutex<Arc<UtxoMap>>,
    reservations: Mutex<HashMap<ReservationId, Vec<OutPoint>>>,
    next_reservation: AtomicU64,
}

impl UtxoSet {
    pub fn new() -> Self {
        UtxoSet {
            map: Mutex::new(Arc::new(HashMap::new())),
            reservations: Mutex::new(HashMap::new()),
            next_reservation: AtomicU64::new(1),
        }
    }

    pub fn get(&self, txid: Hash, vout: u32) -> Option<UtxoRecord> {
        let outpoint = OutPoint { txid, vout };
        self.map.lock().unwrap().get(&outpoint).cloned()
    }

    pub fn snapshot(&self) -> UtxoSnapshot {
        UtxoSnapshot(self.map.lock().unwrap().clone())
    }

    pub fn restore(&self, snapshot: UtxoSnapshot) {
        *self.map.lock().unwrap() = snapshot.0;
    }

    fn reject_duplicate_inputs(tx: &Transaction) -> Result<(), UtxoError> {
        let mut seen = std::collections::HashSet::new();
        for input in &tx.inputs {
            if !seen.insert(*input) {
                return Err(UtxoError::DuplicateInput(input.txid, input.vout));
            }
        }
        Ok(())
    }

    /// Reserves every input of `tx` atomically: either all inputs become
    /// `Pending(id)`, or none do. Intra-transaction duplicate inputs are
    /// rejected before any state is touched.
    pub fn reserve(&self, tx: &Transaction) -> Result<ReservationId, UtxoError> {
        Self::reject_duplicate_inputs(tx)?;

        let mut map_guard = self.map.lock().unwrap();
        for input in &tx.inputs {
            match map_guard.get(input) {
                None => return Err(UtxoError::UnknownInput(input.txid, input.vout)),
                Some(UtxoRecord { status: UtxoStatus::Spent, .. }) => {
                    return Err(UtxoError::AlreadySpent(input.txid, input.vout))
                }
                Some(UtxoRecord { status: UtxoStatus::Pending(_), .. }) => {
                    return Err(UtxoError::AlreadyReserved(input.txid, input.vout))
                }
                Some(UtxoRecord { status: UtxoStatus::Unspent, .. }) => {}
            }
        }

        let id = ReservationId(self.next_reservation.fetch_add(1, Ordering::SeqCst));
        let map = Arc::make_mut(&mut map_guard);
        for input in &tx.inputs {
            if let Some(record) = map.get_mut(input) {
                record.status = UtxoStatus::Pending(id);
            }
        }
        drop(map_guard);

        self.reservations
            .lock()
            .unwrap()
            .insert(id, tx.inputs.clone());
        Ok(id)
    }

    /// Clears a reservation, returning its inputs to `Unspent`.
    pub fn release(&self, id: ReservationId) {
        let outpoints = self.reservations.lock().unwrap().remove(&id);
        let Some(outpoints) = outpoints else { return };

        let mut map_guard = self.map.lock().unwrap();
        let map = Arc::make_mut(&mut map_guard);
        for outpoint in outpoints {
            if let Some(record) = map.get_mut(&outpoint) {
                if record.status == UtxoStatus::Pending(id) {
                    record.status = UtxoStatus::Unspent;
                }
            }
        }
    }

    /// Marks every input spent and inserts every output as unspent.
    /// Called when a transaction is confirmed in a connected block.
    pub fn apply_tx(&self, tx: &Transaction) -> Result<(), UtxoError> {
        let txid = tx.txid();
        let mut map_guard = self.map.lock().unwrap();

        for input in &tx.inputs {
            match map_guard.get(input) {
                Some(UtxoRecord { status: UtxoStatus::Spent, .. }) => {
                    return Err(UtxoError::AlreadySpent(input.txid, input.vout))
                }
                None => return Err(UtxoError::UnknownInput(input.txid, input.vout)),
                _ => {}
            }
        }

        let map = Arc::make_mut(&mut map_guard);
        for input in &tx.inputs {
            map.get_mut(input).unwrap().status = UtxoStatus::Spent;
        }
        for (vout, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                txid,
                vout: vout as u32,
            };
            map.insert(
                outpoint,
                UtxoRecord {
                    owner: output.address,
                    amount: output.amount,
                    status: UtxoStatus::Unspent,
                },
            );
        }
        Ok(())
    }

    /// Undoes [`UtxoSet::apply_tx`]: outputs are removed entirely, and
    /// inputs go back to `Unspent`. Callers must invoke this in reverse
    /// transaction order relative to how the block was applied.
    pub fn revert_tx(&self, tx: &Transaction) {
        let txid = tx.txid();
        let mut map_guard = self.map.lock().unwrap();
        let map = Arc::make_mut(&mut map_guard);

        for (vout, _) in tx.outputs.iter().enumerate() {
            map.remove(&OutPoint {
                txid,
                vout: vout as u32,
            });
        }
        for input in &tx.inputs {
            if let Some(record) = map.get_mut(input) {
                record.status = UtxoStatus::Unspent;
            }
        }
    }
}

impl Default for UtxoSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::amount::Amount;
    use chain_types::transaction::{TxKind, TxOutput};
    use proptest::prelude::*;

    fn coinbase(txid_seed: u8, owner: Address, amount: u64) -> Transaction {
        Transaction::new(
            1,
            TxKind::Coinbase,
            None,
            owner,
            Amount::new(amount).unwrap(),
            Amount::zero(),
            0,
            1_700_000_000 + txid_seed as u64,
            vec![],
            vec![TxOutput {
                address: owner,
                amount: Amount::new(amount).unwrap(),
            }],
            None,
            None,
        )
    }

    fn spend(prev: &Transaction, owner: Address, amount: u64, fee: u64) -> Transaction {
        Transaction::new(
            1,
            TxKind::Transfer,
            Some(prev.outputs[0].address),
            owner,
            Amount::new(amount).unwrap(),
            Amount::new(fee).unwrap(),
            1,
            1_700_000_100,
            vec![OutPoint {
                txid: prev.txid(),
                vout: 0,
            }],
            vec![TxOutput {
                address: owner,
                amount: Amount::new(amount).unwrap(),
            }],
            None,
            None,
        )
    }

    #[test]
    fn apply_then_revert_restores_the_set_bytewise() {
        let set = UtxoSet::new();
        let owner = Address::from_pubkey_hash([1u8; 20]);
        let coinbase_tx = coinbase(0, owner, 100);
        set.apply_tx(&coinbase_tx).unwrap();

        let before = set.snapshot();

        let spender = Address::from_pubkey_hash([2u8; 20]);
        let spend_tx = spend(&coinbase_tx, spender, 90, 10);
        set.apply_tx(&spend_tx).unwrap();
        set.revert_tx(&spend_tx);

        let after = set.snapshot();
        let outpoint = OutPoint {
            txid: coinbase_tx.txid(),
            vout: 0,
        };
        assert_eq!(before.get(&outpoint), after.get(&outpoint));
    }

    #[test]
    fn reserve_then_release_restores_the_set() {
        let set = UtxoSet::new();
        let owner = Address::from_pubkey_hash([1u8; 20]);
        let coinbase_tx = coinbase(0, owner, 100);
        set.apply_tx(&coinbase_tx).unwrap();

        let before = set.snapshot();
        let spend_tx = spend(&coinbase_tx, owner, 90, 10);
        let id = set.reserve(&spend_tx).unwrap();
        set.release(id);
        let after = set.snapshot();

        let outpoint = OutPoint {
            txid: coinbase_tx.txid(),
            vout: 0,
        };
        assert_eq!(before.get(&outpoint), after.get(&outpoint));
    }

    #[test]
    fn duplicate_input_rejected_before_any_mutation() {
        let set = UtxoSet::new();
        let owner = Address::from_pubkey_hash([1u8; 20]);
        let coinbase_tx = coinbase(0, owner, 100);
        set.apply_tx(&coinbase_tx).unwrap();

        let outpoint = OutPoint {
            txid: coinbase_tx.txid(),
            vout: 0,
        };
        let tx = Transaction::new(
            1,
            TxKind::Transfer,
            Some(owner),
            owner,
            Amount::new(300).unwrap(),
            Amount::zero(),
            1,
            1_700_000_200,
            vec![outpoint, outpoint, outpoint],
            vec![TxOutput {
                address: owner,
                amount: Amount::new(300).unwrap(),
            }],
            None,
            None,
        );

        let before = set.snapshot();
        assert!(matches!(set.reserve(&tx), Err(UtxoError::DuplicateInput(_, _))));
        let after = set.snapshot();
        assert_eq!(before.get(&outpoint), after.get(&outpoint));
    }

    #[test]
    fn double_reservation_is_rejected() {
        let set = UtxoSet::new();
        let owner = Address::from_pubkey_hash([1u8; 20]);
        let coinbase_tx = coinbase(0, owner, 100);
        set.apply_tx(&coinbase_tx).unwrap();

        let tx_a = spend(&coinbase_tx, owner, 90, 10);
        let tx_b = spend(&coinbase_tx, owner, 80, 20);

        let _id_a = set.reserve(&tx_a).unwrap();
        assert!(matches!(
            set.reserve(&tx_b),
            Err(UtxoError::AlreadyReserved(_, _))
        ));
    }

    proptest! {
        /// Minting a batch of coinbase outputs to distinct addresses must
        /// leave every recipient's balance equal to exactly what they
        /// were minted, and the sum across all recipients equal to the
        /// total minted — no atom appears or disappears along the way.
        #[test]
        fn balances_conserve_across_a_minting_batch(
            amounts in proptest::collection::vec(chain_test::small_amount_strategy(), 1..20),
        ) {
            let set = UtxoSet::new();
            let mut expected_total = 0u64;
            let mut per_address = Vec::with_capacity(amounts.len());
            for (i, amount) in amounts.iter().enumerate() {
                let owner = Address::from_pubkey_hash([i as u8; 20]);
                let tx = coinbase(i as u8, owner, amount.atoms());
                set.apply_tx(&tx).unwrap();
                expected_total += amount.atoms();
                per_address.push(owner);
            }

            let snapshot = set.snapshot();
            let mut observed_total = 0u64;
            for (addr, amount) in per_address.iter().zip(amounts.iter()) {
                let balance = snapshot.balance(addr).atoms();
                prop_assert_eq!(balance, amount.atoms());
                observed_total += balance;
            }
            prop_assert_eq!(observed_total, expected_total);
        }
    }
}

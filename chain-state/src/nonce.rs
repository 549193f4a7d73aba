//! Per-sender monotonic nonces. Same copy-on-write `Arc` pattern as
//! [`crate::utxo::UtxoSet`], for the same reason: snapshots must be
//! free for readers and never block the writer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chain_types::Address;

use crate::error::NonceError;

type NonceMap = HashMap<Address, NonceState>;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct NonceState {
    /// Highest committed nonce + 1; i.e. the next nonce a confirmed tx
    /// from this sender must use.
    current: u64,
    /// Nonces reserved by mempool entries but not yet committed.
    pending: u64,
}

#[derive(Clone)]
pub struct NonceSnapshot(Arc<NonceMap>);

impl NonceSnapshot {
    pub fn current(&self, addr: &Address) -> u64 {
        self.0.get(addr).map(|s| s.current).unwrap_or(0)
    }
}

pub struct NonceTracker {
    map: Mutex<Arc<NonceMap>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        NonceTracker {
            map: Mutex::new(Arc::new(HashMap::new())),
        }
    }

    pub fn current(&self, addr: &Address) -> u64 {
        self.map
            .lock()
            .unwrap()
            .get(addr)
            .map(|s| s.current)
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> NonceSnapshot {
        NonceSnapshot(self.map.lock().unwrap().clone())
    }

    pub fn restore(&self, snapshot: NonceSnapshot) {
        *self.map.lock().unwrap() = snapshot.0;
    }

    /// A transaction's `account_nonce` must equal `current(sender) +
    /// pending_count(sender)`. On success, the nonce is provisionally
    /// reserved (bumping the pending count) so a second transaction from
    /// the same sender can be admitted at the next nonce without
    /// racing this one.
    pub fn check_and_reserve(&self, addr: &Address, nonce: u64) -> Result<(), NonceError> {
        let mut map_guard = self.map.lock().unwrap();
        let state = map_guard.get(addr).copied().unwrap_or_default();
        let expected = state.current + state.pending;

        if nonce < state.current {
            return Err(NonceError::Stale {
                addr: format!("{:?}", addr),
                given: nonce,
                current: state.current,
            });
        }
        if nonce < expected {
            return Err(NonceError::Reused {
                addr: format!("{:?}", addr),
                given: nonce,
            });
        }
        if nonce > expected {
            return Err(NonceError::Gap {
                addr: format!("{:?}", addr),
                given: nonce,
                expected,
            });
        }

        let map = Arc::make_mut(&mut map_guard);
        map.entry(*addr).or_default().pending += 1;
        Ok(())
    }

    /// Called only after the containing block is durably persisted:
    /// advances `current` by one and drops the matching pending
    /// reservation.
    pub fn commit(&self, addr: &Address, nonce: u64) {
        let mut map_guard = self.map.lock().unwrap();
        let map = Arc::make_mut(&mut map_guard);
        let state = map.entry(*addr).or_default();
        if state.pending > 0 {
            state.pending -= 1;
        }
        if nonce >= state.current {
            state.current = nonce + 1;
        }
    }

    /// Releases a reservation made by `check_and_reserve` without
    /// committing it — mempool eviction or reorg rollback.
    pub fn release(&self, addr: &Address) {
        let mut map_guard = self.map.lock().unwrap();
        let map = Arc::make_mut(&mut map_guard);
        if let Some(state) = map.get_mut(addr) {
            state.pending = state.pending.saturating_sub(1);
        }
    }

    /// Rolls `current` back by one — used when disconnecting a
    /// confirmed non-coinbase transaction during a reorg.
    pub fn rollback_commit(&self, addr: &Address) {
        let mut map_guard = self.map.lock().unwrap();
        let map = Arc::make_mut(&mut map_guard);
        if let Some(state) = map.get_mut(addr) {
            state.current = state.current.saturating_sub(1);
        }
    }
}

impl Default for NonceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_nonces_commit_in_order() {
        let tracker = NonceTracker::new();
        let addr = Address::from_pubkey_hash([1u8; 20]);

        tracker.check_and_reserve(&addr, 0).unwrap();
        tracker.commit(&addr, 0);
        assert_eq!(tracker.current(&addr), 1);

        tracker.check_and_reserve(&addr, 1).unwrap();
        tracker.commit(&addr, 1);
        assert_eq!(tracker.current(&addr), 2);
    }

    #[test]
    fn gap_is_rejected() {
        let tracker = NonceTracker::new();
        let addr = Address::from_pubkey_hash([1u8; 20]);
        assert!(matches!(
            tracker.check_and_reserve(&addr, 5),
            Err(NonceError::Gap { .. })
        ));
    }

    #[test]
    fn reuse_is_rejected() {
        let tracker = NonceTracker::new();
        let addr = Address::from_pubkey_hash([1u8; 20]);
        tracker.check_and_reserve(&addr, 0).unwrap();
        tracker.commit(&addr, 0);
        assert!(matches!(
            tracker.check_and_reserve(&addr, 0),
            Err(NonceError::Stale { .. })
        ));
    }

    #[test]
    fn persistence_failure_leaves_nonce_unchanged() {
        // Scenario 6: reserve succeeds, but the block never gets
        // committed (caller simply never calls `commit`/`release`
        // because `put_block` failed) — current() must still be 0 so
        // the sender can retry with the original nonce.
        let tracker = NonceTracker::new();
        let addr = Address::from_pubkey_hash([1u8; 20]);
        for n in 0..5 {
            tracker.check_and_reserve(&addr, n).unwrap();
            tracker.commit(&addr, n);
        }
        assert_eq!(tracker.current(&addr), 5);

        tracker.check_and_reserve(&addr, 5).unwrap();
        // simulated storage failure: release instead of commit
        tracker.release(&addr);
        assert_eq!(tracker.current(&addr), 5);
    }
}

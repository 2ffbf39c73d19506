//! Transaction bookkeeping: id generation and per-transaction state. The
//! concurrency strategy itself lives in [`ccm`]; this module only tracks
//! which transactions exist and whether they're active, committed, or
//! aborted.

pub mod ccm;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub state: TransactionState,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self { id, state: TransactionState::Active }
    }
}

/// Issues monotonic transaction ids and tracks liveness. Sequential ids
/// double as the timestamp source for the timestamp-ordering and MVCC
/// strategies, matching `ts_order_of_arrival = begin_order` from the spec.
#[derive(Debug, Default)]
pub struct TransactionManager {
    next_id: AtomicU64,
    transactions: HashMap<TransactionId, Transaction>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), transactions: HashMap::new() }
    }

    pub fn begin(&mut self) -> TransactionId {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.transactions.insert(id, Transaction::new(id));
        id
    }

    pub fn set_state(&mut self, id: TransactionId, state: TransactionState) {
        if let Some(tx) = self.transactions.get_mut(&id) {
            tx.state = state;
        }
    }

    pub fn state(&self, id: TransactionId) -> Option<TransactionState> {
        self.transactions.get(&id).map(|tx| tx.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_start_active() {
        let mut tm = TransactionManager::new();
        let a = tm.begin();
        let b = tm.begin();
        assert!(b.0 > a.0);
        assert_eq!(tm.state(a), Some(TransactionState::Active));
    }
}

//! Optimistic concurrency control: reads are unbuffered and unchecked,
//! writes are recorded privately, and the whole transaction is validated
//! against every transaction that committed during its lifetime. No teacher
//! equivalent; modeled directly on Kung & Robinson's three-phase protocol
//! as described in spec §4.7.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use super::{ConcurrencyControlManager, ObjectId};
use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;

struct ActiveTx {
    start_seq: u64,
    read_set: HashSet<ObjectId>,
    write_set: HashSet<ObjectId>,
}

struct CommittedTx {
    finish_seq: u64,
    write_set: HashSet<ObjectId>,
}

struct State {
    next_seq: u64,
    active: std::collections::HashMap<TransactionId, ActiveTx>,
    committed: VecDeque<CommittedTx>,
}

pub struct Optimistic {
    state: Mutex<State>,
}

const COMMITTED_HISTORY_CAP: usize = 4096;

impl Optimistic {
    pub fn new() -> Self {
        Self { state: Mutex::new(State { next_seq: 0, active: std::collections::HashMap::new(), committed: VecDeque::new() }) }
    }
}

impl ConcurrencyControlManager for Optimistic {
    fn begin(&self, tid: TransactionId) {
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.active.insert(tid, ActiveTx { start_seq: seq, read_set: HashSet::new(), write_set: HashSet::new() });
    }

    fn request_read(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(tx) = state.active.get_mut(&tid) {
            tx.read_set.insert(object.clone());
        }
        Ok(())
    }

    fn request_write(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(tx) = state.active.get_mut(&tid) {
            tx.write_set.insert(object.clone());
        }
        Ok(())
    }

    fn commit(&self, tid: TransactionId) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let tx = state
            .active
            .remove(&tid)
            .ok_or_else(|| DbError::ConcurrencyAbort(format!("transaction {} not active", tid.0)))?;

        let conflict = state
            .committed
            .iter()
            .filter(|c| c.finish_seq > tx.start_seq)
            .any(|c| c.write_set.iter().any(|o| tx.read_set.contains(o)));
        if conflict {
            return Err(DbError::ConcurrencyAbort(format!("validation failed for transaction {}", tid.0)));
        }

        let finish_seq = state.next_seq;
        state.next_seq += 1;
        state.committed.push_back(CommittedTx { finish_seq, write_set: tx.write_set });
        while state.committed.len() > COMMITTED_HISTORY_CAP {
            state.committed.pop_front();
        }
        Ok(())
    }

    fn abort(&self, tid: TransactionId) {
        self.state.lock().unwrap().active.remove(&tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_transactions_both_commit() {
        let ccm = Optimistic::new();
        let t1 = TransactionId(1);
        let t2 = TransactionId(2);
        ccm.begin(t1);
        ccm.begin(t2);
        ccm.request_write(t1, &"a".to_string()).unwrap();
        ccm.request_write(t2, &"b".to_string()).unwrap();
        assert!(ccm.commit(t1).is_ok());
        assert!(ccm.commit(t2).is_ok());
    }

    #[test]
    fn overlapping_write_after_read_fails_validation() {
        let ccm = Optimistic::new();
        let t1 = TransactionId(1);
        let t2 = TransactionId(2);
        ccm.begin(t1);
        ccm.begin(t2);
        ccm.request_read(t1, &"a".to_string()).unwrap();
        ccm.request_write(t2, &"a".to_string()).unwrap();
        ccm.commit(t2).unwrap();
        assert!(ccm.commit(t1).is_err());
    }
}

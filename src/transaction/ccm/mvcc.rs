//! MVCC (snapshot read): readers never block, writers record private
//! versions that become visible atomically at commit. Write-write conflicts
//! are resolved first-committer-wins. Grounded in the `VersionedValue`
//! snapshot/committed-ids shape of `core/storage/engine/traits/mod.rs`,
//! reduced here to the CCM's synchronization role — the storage layer holds
//! the actual row versions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{ConcurrencyControlManager, ObjectId};
use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;

struct ActiveTx {
    snapshot_ts: u64,
    write_set: HashSet<ObjectId>,
}

struct CommittedWrite {
    commit_ts: u64,
    write_set: HashSet<ObjectId>,
}

struct State {
    next_ts: u64,
    active: HashMap<TransactionId, ActiveTx>,
    history: VecDeque<CommittedWrite>,
}

pub struct Mvcc {
    state: Mutex<State>,
}

const HISTORY_CAP: usize = 4096;

impl Mvcc {
    pub fn new() -> Self {
        Self { state: Mutex::new(State { next_ts: 0, active: HashMap::new(), history: VecDeque::new() }) }
    }
}

impl ConcurrencyControlManager for Mvcc {
    fn begin(&self, tid: TransactionId) {
        let mut state = self.state.lock().unwrap();
        let ts = state.next_ts;
        state.active.insert(tid, ActiveTx { snapshot_ts: ts, write_set: HashSet::new() });
    }

    fn request_read(&self, _tid: TransactionId, _object: &ObjectId) -> DbResult<()> {
        // Visibility (newest version with commit_ts <= snapshot) is resolved by the
        // storage layer; the CCM never blocks a snapshot read.
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
            .history
            .iter()
            .filter(|c| c.commit_ts > tx.snapshot_ts)
            .any(|c| c.write_set.iter().any(|o| tx.write_set.contains(o)));
        if conflict {
            return Err(DbError::ConcurrencyAbort(format!(
                "write-write conflict for transaction {}: lost to an earlier committer",
                tid.0
            )));
        }

        let commit_ts = state.next_ts;
        state.next_ts += 1;
        state.history.push_back(CommittedWrite { commit_ts, write_set: tx.write_set });
        while state.history.len() > HISTORY_CAP {
            state.history.pop_front();
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
    fn second_writer_loses_on_write_write_conflict() {
        let ccm = Mvcc::new();
        let t1 = TransactionId(1);
        let t2 = TransactionId(2);
        ccm.begin(t1);
        ccm.begin(t2);
        ccm.request_write(t1, &"a".to_string()).unwrap();
        ccm.request_write(t2, &"a".to_string()).unwrap();
        assert!(ccm.commit(t1).is_ok());
        assert!(ccm.commit(t2).is_err());
    }

    #[test]
    fn disjoint_writes_both_commit() {
        let ccm = Mvcc::new();
        let t1 = TransactionId(1);
        let t2 = TransactionId(2);
        ccm.begin(t1);
        ccm.begin(t2);
        ccm.request_write(t1, &"a".to_string()).unwrap();
        ccm.request_write(t2, &"b".to_string()).unwrap();
        assert!(ccm.commit(t1).is_ok());
        assert!(ccm.commit(t2).is_ok());
    }
}

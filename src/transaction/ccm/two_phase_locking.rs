//! Strict 2PL: shared/exclusive locks held until commit or abort, deadlocks
//! broken by wound-wait. Grounded in the lock table shape of
//! `lock_manager.rs` plus the wait-for-graph cycle check from
//! `acid_manager.rs`'s `DeadlockDetector`, adapted to actually block the
//! requesting thread (with a timeout) instead of returning a conflict error
//! immediately.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{ConcurrencyControlManager, ObjectId};
use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;

const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Default)]
struct LockState {
    holders: Vec<(TransactionId, LockMode)>,
    #[allow(dead_code)]
    waiters: VecDeque<TransactionId>,
}

struct Inner {
    lock_table: HashMap<ObjectId, LockState>,
    held_by_tx: HashMap<TransactionId, HashSet<ObjectId>>,
    start_order: HashMap<TransactionId, u64>,
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
    next_order: u64,
}

pub struct TwoPhaseLocking {
    inner: Mutex<Inner>,
    wakeup: Condvar,
}

impl TwoPhaseLocking {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                lock_table: HashMap::new(),
                held_by_tx: HashMap::new(),
                start_order: HashMap::new(),
                wait_for: HashMap::new(),
                next_order: 0,
            }),
            wakeup: Condvar::new(),
        }
    }

    fn conflicts(mode: LockMode, holders: &[(TransactionId, LockMode)], tid: TransactionId) -> Vec<TransactionId> {
        holders
            .iter()
            .filter(|(holder, held_mode)| {
                *holder != tid && (mode == LockMode::Exclusive || *held_mode == LockMode::Exclusive)
            })
            .map(|(holder, _)| *holder)
            .collect()
    }

    fn has_cycle(wait_for: &HashMap<TransactionId, HashSet<TransactionId>>, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if let Some(next) = wait_for.get(&current) {
                for &n in next {
                    if n == start {
                        return true;
                    }
                    if visited.insert(n) {
                        stack.push(n);
                    }
                }
            }
        }
        false
    }

    fn request(&self, tid: TransactionId, object: &ObjectId, mode: LockMode) -> DbResult<()> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        let mut guard = self.inner.lock().unwrap();
        loop {
            let state = guard.lock_table.entry(object.clone()).or_default();
            let conflicting = Self::conflicts(mode, &state.holders, tid);
            if conflicting.is_empty() {
                state.holders.push((tid, mode));
                guard.held_by_tx.entry(tid).or_default().insert(object.clone());
                guard.wait_for.remove(&tid);
                return Ok(());
            }

            let requester_order = if let Some(&order) = guard.start_order.get(&tid) {
                order
            } else {
                let n = guard.next_order;
                guard.next_order += 1;
                guard.start_order.insert(tid, n);
                n
            };
            let older_than_all = conflicting.iter().all(|holder| {
                requester_order < *guard.start_order.get(holder).unwrap_or(&u64::MAX)
            });

            if older_than_all {
                // Wound: abort every younger holder and take the lock.
                for victim in &conflicting {
                    self.release_all(&mut guard, *victim);
                }
                let state = guard.lock_table.entry(object.clone()).or_default();
                state.holders.push((tid, mode));
                guard.held_by_tx.entry(tid).or_default().insert(object.clone());
                return Ok(());
            }

            for holder in &conflicting {
                guard.wait_for.entry(tid).or_default().insert(*holder);
            }
            if Self::has_cycle(&guard.wait_for, tid) {
                guard.wait_for.remove(&tid);
                return Err(DbError::ConcurrencyAbort(format!("deadlock detected for transaction {}", tid.0)));
            }

            let now = Instant::now();
            if now >= deadline {
                guard.wait_for.remove(&tid);
                return Err(DbError::ConcurrencyAbort(format!("lock timeout for transaction {}", tid.0)));
            }
            let (g, timeout) = self.wakeup.wait_timeout(guard, deadline - now).unwrap();
            guard = g;
            if timeout.timed_out() {
                guard.wait_for.remove(&tid);
                return Err(DbError::ConcurrencyAbort(format!("lock timeout for transaction {}", tid.0)));
            }
        }
    }

    fn release_all(&self, guard: &mut Inner, tid: TransactionId) {
        if let Some(objects) = guard.held_by_tx.remove(&tid) {
            for object in objects {
                if let Some(state) = guard.lock_table.get_mut(&object) {
                    state.holders.retain(|(holder, _)| *holder != tid);
                    if state.holders.is_empty() {
                        guard.lock_table.remove(&object);
                    }
                }
            }
        }
        guard.wait_for.remove(&tid);
        for deps in guard.wait_for.values_mut() {
            deps.remove(&tid);
        }
        guard.start_order.remove(&tid);
    }
}

impl ConcurrencyControlManager for TwoPhaseLocking {
    fn begin(&self, tid: TransactionId) {
        let mut guard = self.inner.lock().unwrap();
        if !guard.start_order.contains_key(&tid) {
            let n = guard.next_order;
            guard.next_order += 1;
            guard.start_order.insert(tid, n);
        }
    }

    fn request_read(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        self.request(tid, object, LockMode::Shared)
    }

    fn request_write(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        self.request(tid, object, LockMode::Exclusive)
    }

    fn commit(&self, tid: TransactionId) -> DbResult<()> {
        let mut guard = self.inner.lock().unwrap();
        self.release_all(&mut guard, tid);
        drop(guard);
        self.wakeup.notify_all();
        Ok(())
    }

    fn abort(&self, tid: TransactionId) {
        let mut guard = self.inner.lock().unwrap();
        self.release_all(&mut guard, tid);
        drop(guard);
        self.wakeup.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_from_different_transactions_coexist() {
        let ccm = TwoPhaseLocking::new();
        let t1 = TransactionId(1);
        let t2 = TransactionId(2);
        ccm.begin(t1);
        ccm.begin(t2);
        assert!(ccm.request_read(t1, &"rows:1".to_string()).is_ok());
        assert!(ccm.request_read(t2, &"rows:1".to_string()).is_ok());
    }

    #[test]
    fn exclusive_lock_blocks_until_holder_commits() {
        let ccm = TwoPhaseLocking::new();
        let t1 = TransactionId(1);
        let t2 = TransactionId(2);
        ccm.begin(t1);
        ccm.begin(t2);
        ccm.request_write(t1, &"rows:1".to_string()).unwrap();
        // t2 is younger, so it waits rather than wounding t1; release lets it through.
        ccm.commit(t1).unwrap();
        assert!(ccm.request_write(t2, &"rows:1".to_string()).is_ok());
    }

    #[test]
    fn older_transaction_wounds_younger_holder() {
        let ccm = TwoPhaseLocking::new();
        let young = TransactionId(5);
        let old = TransactionId(1);
        ccm.begin(old);
        ccm.begin(young);
        ccm.request_write(young, &"rows:1".to_string()).unwrap();
        assert!(ccm.request_write(old, &"rows:1".to_string()).is_ok());
    }
}

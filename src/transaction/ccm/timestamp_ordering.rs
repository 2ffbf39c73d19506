//! Timestamp-ordering CCM: a transaction's begin order is its timestamp.
//! Non-blocking — conflicting reads/writes abort immediately rather than
//! waiting, per spec §4.7. No teacher equivalent; modeled directly on the
//! classical Bernstein/Goodman protocol the spec describes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use super::{ConcurrencyControlManager, ObjectId};
use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;

#[derive(Default)]
struct ObjectClock {
    read_ts: u64,
    write_ts: u64,
}

pub struct TimestampOrdering {
    next_ts: AtomicU64,
    timestamps: Mutex<HashMap<TransactionId, u64>>,
    clocks: Mutex<HashMap<ObjectId, ObjectClock>>,
}

impl TimestampOrdering {
    pub fn new() -> Self {
        Self { next_ts: AtomicU64::new(0), timestamps: Mutex::new(HashMap::new()), clocks: Mutex::new(HashMap::new()) }
    }

    fn ts_of(&self, tid: TransactionId) -> u64 {
        *self.timestamps.lock().unwrap().get(&tid).expect("transaction must begin() before use")
    }
}

impl ConcurrencyControlManager for TimestampOrdering {
    fn begin(&self, tid: TransactionId) {
        let ts = self.next_ts.fetch_add(1, AtomicOrdering::SeqCst);
        self.timestamps.lock().unwrap().insert(tid, ts);
    }

    fn request_read(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        let ts = self.ts_of(tid);
        let mut clocks = self.clocks.lock().unwrap();
        let clock = clocks.entry(object.clone()).or_default();
        if ts < clock.write_ts {
            return Err(DbError::ConcurrencyAbort(format!("read at ts {ts} precedes write_ts {}", clock.write_ts)));
        }
        clock.read_ts = clock.read_ts.max(ts);
        Ok(())
    }

    fn request_write(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        let ts = self.ts_of(tid);
        let mut clocks = self.clocks.lock().unwrap();
        let clock = clocks.entry(object.clone()).or_default();
        if ts < clock.read_ts || ts < clock.write_ts {
            return Err(DbError::ConcurrencyAbort(format!(
                "write at ts {ts} precedes read_ts {} or write_ts {}",
                clock.read_ts, clock.write_ts
            )));
        }
        clock.write_ts = ts;
        Ok(())
    }

    fn commit(&self, tid: TransactionId) -> DbResult<()> {
        self.timestamps.lock().unwrap().remove(&tid);
        Ok(())
    }

    fn abort(&self, tid: TransactionId) {
        self.timestamps.lock().unwrap().remove(&tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_after_newer_read_is_rejected() {
        let ccm = TimestampOrdering::new();
        let old = TransactionId(1);
        let new = TransactionId(2);
        ccm.begin(old);
        ccm.begin(new);
        ccm.request_read(new, &"rows:1".to_string()).unwrap();
        assert!(ccm.request_write(old, &"rows:1".to_string()).is_err());
    }

    #[test]
    fn in_order_access_succeeds() {
        let ccm = TimestampOrdering::new();
        let t1 = TransactionId(1);
        ccm.begin(t1);
        assert!(ccm.request_write(t1, &"rows:1".to_string()).is_ok());
        assert!(ccm.request_read(t1, &"rows:1".to_string()).is_ok());
    }
}

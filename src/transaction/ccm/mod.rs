//! Concurrency-control manager façade: one trait, four interchangeable
//! strategies selected by [`CcmStrategy`]. Every storage access the
//! executor makes is preceded by a `request_read`/`request_write` call
//! through whichever strategy the database is configured with.

pub mod mvcc;
pub mod optimistic;
pub mod timestamp_ordering;
pub mod two_phase_locking;

use serde::{Deserialize, Serialize};

use crate::error::DbResult;
use crate::transaction::TransactionId;

pub use mvcc::Mvcc;
pub use optimistic::Optimistic;
pub use timestamp_ordering::TimestampOrdering;
pub use two_phase_locking::TwoPhaseLocking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CcmStrategy {
    TwoPhaseLocking,
    TimestampOrdering,
    Optimistic,
    Mvcc,
}

/// An object identifier the CCM synchronizes on — a table name for
/// coarse-grained catalog operations, or `table:row_id` for per-row access.
pub type ObjectId = String;

pub trait ConcurrencyControlManager: Send + Sync {
    fn begin(&self, tid: TransactionId);
    fn request_read(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()>;
    fn request_write(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()>;
    fn commit(&self, tid: TransactionId) -> DbResult<()>;
    fn abort(&self, tid: TransactionId);
}

/// Dispatches to whichever strategy the database was configured with.
/// A closed enum rather than `Box<dyn ConcurrencyControlManager>` since the
/// set of strategies is fixed and known at compile time.
pub enum Ccm {
    TwoPhaseLocking(TwoPhaseLocking),
    TimestampOrdering(TimestampOrdering),
    Optimistic(Optimistic),
    Mvcc(Mvcc),
}

impl Ccm {
    pub fn new(strategy: CcmStrategy) -> Self {
        match strategy {
            CcmStrategy::TwoPhaseLocking => Ccm::TwoPhaseLocking(TwoPhaseLocking::new()),
            CcmStrategy::TimestampOrdering => Ccm::TimestampOrdering(TimestampOrdering::new()),
            CcmStrategy::Optimistic => Ccm::Optimistic(Optimistic::new()),
            CcmStrategy::Mvcc => Ccm::Mvcc(Mvcc::new()),
        }
    }
}

impl ConcurrencyControlManager for Ccm {
    fn begin(&self, tid: TransactionId) {
        match self {
            Ccm::TwoPhaseLocking(m) => m.begin(tid),
            Ccm::TimestampOrdering(m) => m.begin(tid),
            Ccm::Optimistic(m) => m.begin(tid),
            Ccm::Mvcc(m) => m.begin(tid),
        }
    }

    fn request_read(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        match self {
            Ccm::TwoPhaseLocking(m) => m.request_read(tid, object),
            Ccm::TimestampOrdering(m) => m.request_read(tid, object),
            Ccm::Optimistic(m) => m.request_read(tid, object),
            Ccm::Mvcc(m) => m.request_read(tid, object),
        }
    }

    fn request_write(&self, tid: TransactionId, object: &ObjectId) -> DbResult<()> {
        match self {
            Ccm::TwoPhaseLocking(m) => m.request_write(tid, object),
            Ccm::TimestampOrdering(m) => m.request_write(tid, object),
            Ccm::Optimistic(m) => m.request_write(tid, object),
            Ccm::Mvcc(m) => m.request_write(tid, object),
        }
    }

    fn commit(&self, tid: TransactionId) -> DbResult<()> {
        match self {
            Ccm::TwoPhaseLocking(m) => m.commit(tid),
            Ccm::TimestampOrdering(m) => m.commit(tid),
            Ccm::Optimistic(m) => m.commit(tid),
            Ccm::Mvcc(m) => m.commit(tid),
        }
    }

    fn abort(&self, tid: TransactionId) {
        match self {
            Ccm::TwoPhaseLocking(m) => m.abort(tid),
            Ccm::TimestampOrdering(m) => m.abort(tid),
            Ccm::Optimistic(m) => m.abort(tid),
            Ccm::Mvcc(m) => m.abort(tid),
        }
    }
}

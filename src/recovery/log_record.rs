//! Write-ahead log record shapes.
//!
//! Adapted from the teacher's `core/wal/log_record.rs` `LogRecord` enum
//! (Begin/Commit/Abort/Insert/Delete/Update/Checkpoint) to this crate's
//! row-level storage model: a write record carries its table name and the
//! row's before/after images directly, instead of a page id/slot id and a
//! raw byte payload, since there's no B-tree-page-type distinction to make.

use serde::{Deserialize, Serialize};

use crate::storage::Row;
use crate::transaction::TransactionId;

pub type Lsn = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    Begin { lsn: Lsn, tid: TransactionId },
    Commit { lsn: Lsn, tid: TransactionId },
    Abort { lsn: Lsn, tid: TransactionId },
    /// Before/after row images for one write. `before: None` is an insert,
    /// `after: None` is a delete; both present is an update.
    Write { lsn: Lsn, tid: TransactionId, table: String, before: Option<Row>, after: Option<Row> },
    CheckpointBegin { lsn: Lsn },
    CheckpointEnd { lsn: Lsn, active: Vec<TransactionId> },
}

impl LogRecord {
    pub fn lsn(&self) -> Lsn {
        match self {
            Self::Begin { lsn, .. }
            | Self::Commit { lsn, .. }
            | Self::Abort { lsn, .. }
            | Self::Write { lsn, .. }
            | Self::CheckpointBegin { lsn }
            | Self::CheckpointEnd { lsn, .. } => *lsn,
        }
    }

    pub fn tid(&self) -> Option<TransactionId> {
        match self {
            Self::Begin { tid, .. } | Self::Commit { tid, .. } | Self::Abort { tid, .. } | Self::Write { tid, .. } => {
                Some(*tid)
            }
            Self::CheckpointBegin { .. } | Self::CheckpointEnd { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_record_round_trips_through_bincode() {
        let record = LogRecord::Write {
            lsn: 3,
            tid: TransactionId(1),
            table: "t".to_string(),
            before: None,
            after: Some(vec![("id".to_string(), crate::storage::Value::Integer(1))]),
        };
        let bytes = bincode::serialize(&record).unwrap();
        let decoded: LogRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(record, decoded);
    }
}

//! Write-ahead logging and crash recovery.

pub mod log_record;
pub mod manager;
pub mod wal;

pub use log_record::{LogRecord, Lsn};
pub use manager::{recover, RecoveryCriteria};
pub use wal::Wal;

//! Unified error taxonomy.
//!
//! The seven kinds are behavioral (call-site meaning), not one type per
//! subsystem: a storage failure during recovery is still `Storage`, not a
//! distinct `RecoveryStorage` variant.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum DbError {
    /// Lexical or parse error: bad SQL syntax.
    Parse { message: String, line: usize, column: usize },
    /// Structurally valid parse that violates a catalog/arity invariant.
    Validation(String),
    /// The GA or a rule applier failed to produce a usable plan.
    Optimization(String),
    /// Runtime execution failure (type mismatch, unknown column, ...).
    Execution(String),
    /// The concurrency-control manager chose this transaction as a victim.
    ConcurrencyAbort(String),
    /// Unrecoverable storage I/O.
    Storage(String),
    /// The log had an uncommitted tail at startup; recovery is required.
    RecoveryRequired(String),
    /// Transparent wrapper for lower-level I/O and serialization errors.
    Io(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { message, line, column } => {
                write!(f, "parse error at {line}:{column}: {message}")
            }
            Self::Validation(m) => write!(f, "validation error: {m}"),
            Self::Optimization(m) => write!(f, "optimization error: {m}"),
            Self::Execution(m) => write!(f, "execution error: {m}"),
            Self::ConcurrencyAbort(m) => write!(f, "transaction aborted: {m}"),
            Self::Storage(m) => write!(f, "storage error: {m}"),
            Self::RecoveryRequired(m) => write!(f, "recovery required: {m}"),
            Self::Io(m) => write!(f, "io error: {m}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<bincode::Error> for DbError {
    fn from(e: bincode::Error) -> Self {
        Self::Io(format!("bincode: {e}"))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Io(format!("json: {e}"))
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Exit codes for the optional batch entry point (`bin/oxiql.rs`).
impl DbError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Parse { .. } | Self::Validation(_) => 1,
            Self::ConcurrencyAbort(_) => 2,
            Self::Storage(_) | Self::Io(_) => 3,
            Self::Optimization(_) | Self::Execution(_) | Self::RecoveryRequired(_) => 4,
        }
    }
}

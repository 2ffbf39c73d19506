//! Public connection surface: parse, validate, optimize, and execute a SQL
//! statement against an open database, the way the teacher's `api` module
//! wraps `core::query::commands` dispatch — generalized here to the full
//! SQL pipeline instead of a handful of key/value commands.

use std::path::Path;

use crate::config::DbConfig;
use crate::error::DbResult;
use crate::executor::{ExecOutcome, Executor};
use crate::optimizer;
use crate::query::parser::parse;
use crate::query::tree::NodeType;
use crate::query::validator::validate;
use crate::recovery::wal::Wal;
use crate::recovery::recover;
use crate::storage::engine::StorageEngine;
use crate::storage::Value;
use crate::transaction::ccm::{Ccm, ConcurrencyControlManager};
use crate::transaction::{TransactionManager, TransactionState};

/// A result row, built from a [`storage::Row`](crate::storage::Row)'s
/// `(column, value)` pairs with the table tag stripped.
pub type Row = Vec<(String, Value)>;

/// The outcome of a single statement: either the rows it produced (for
/// SELECT-shaped statements) or the number of rows it touched (for
/// INSERT/UPDATE/DELETE/DDL).
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected: u64,
}

impl QueryResult {
    fn from_rows(rows: Vec<crate::storage::Row>) -> Self {
        let columns = rows.first().map(|r| r.iter().map(|(c, _)| c.clone()).collect()).unwrap_or_default();
        Self { columns, rows, affected: 0 }
    }

    fn from_affected(affected: u64) -> Self {
        Self { columns: Vec::new(), rows: Vec::new(), affected }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.affected == 0
    }
}

/// An open database: the storage engine, the configured concurrency-control
/// strategy, and the transaction id generator, bundled behind one SQL entry
/// point.
pub struct Connection {
    storage: StorageEngine,
    ccm: Ccm,
    txm: TransactionManager,
    wal: Wal,
    optimizer: crate::config::OptimizerConfig,
}

impl Connection {
    /// Opens (or creates) a database rooted at `path`, using default
    /// configuration. Use [`Connection::open_with_config`] to choose a
    /// concurrency-control strategy or tune the optimizer.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let mut config = DbConfig::default();
        config.data_dir = path.as_ref().to_path_buf();
        config.wal_path = path.as_ref().join("wal.log");
        Self::open_with_config(config)
    }

    /// Opens a database, replaying its write-ahead log first: every
    /// committed write is REDOne, and every write left over from a
    /// transaction with no matching commit/abort record is UNDOne.
    pub fn open_with_config(config: DbConfig) -> DbResult<Self> {
        let mut storage = StorageEngine::open(config.data_dir.clone(), config.page_size, config.buffer_pool_bytes)?;
        recover(&mut storage, &config.wal_path, None)?;
        let wal = Wal::open(&config.wal_path)?;
        Ok(Self {
            storage,
            ccm: Ccm::new(config.ccm_strategy),
            txm: TransactionManager::new(),
            wal,
            optimizer: config.optimizer,
        })
    }

    /// Parses, validates, optimizes, and runs one SQL statement, wrapping
    /// it in its own transaction unless the statement is itself a
    /// `BEGIN TRANSACTION` block (which manages its own commit/abort).
    pub fn execute(&mut self, sql: &str) -> DbResult<QueryResult> {
        let root = parse(sql)?;
        validate(&root, self.storage.catalog())?;
        let plan = optimizer::optimize(&root, self.storage.catalog(), &self.optimizer).plan;

        let tid = self.txm.begin();
        let manages_own_transaction =
            matches!(plan.borrow().node_type, NodeType::BeginTransaction | NodeType::Commit);
        if !manages_own_transaction {
            self.ccm.begin(tid);
        }

        let begin_lsn = self.wal.next_lsn();
        self.wal.append(&crate::recovery::LogRecord::Begin { lsn: begin_lsn, tid })?;

        let mut executor = Executor::with_wal(&mut self.storage, &self.ccm, &mut self.wal);
        match executor.execute(&plan, tid) {
            Ok(outcome) => {
                if !manages_own_transaction {
                    self.ccm.commit(tid)?;
                }
                self.txm.set_state(tid, TransactionState::Committed);
                let lsn = self.wal.next_lsn();
                self.wal.append(&crate::recovery::LogRecord::Commit { lsn, tid })?;
                Ok(match outcome {
                    ExecOutcome::Rows(rows) => QueryResult::from_rows(rows),
                    ExecOutcome::Affected(n) => QueryResult::from_affected(n),
                })
            }
            Err(e) => {
                if !manages_own_transaction {
                    self.ccm.abort(tid);
                }
                self.txm.set_state(tid, TransactionState::Aborted);
                let lsn = self.wal.next_lsn();
                self.wal.append(&crate::recovery::LogRecord::Abort { lsn, tid })?;
                Err(e)
            }
        }
    }

    /// Alias for [`Connection::execute`]; SELECT and DML share one pipeline
    /// here, so both names reach the same entry point.
    pub fn query(&mut self, sql: &str) -> DbResult<QueryResult> {
        self.execute(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (Connection, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let conn = Connection::open(dir.path()).expect("open");
        (conn, dir)
    }

    #[test]
    fn create_insert_select_round_trips() {
        let (mut conn, _dir) = open_temp();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);").unwrap();
        conn.execute("INSERT INTO t (id, name) VALUES (1, 'a');").unwrap();
        let result = conn.execute("SELECT id, name FROM t WHERE id = 1;").unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.columns, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn invalid_table_reference_is_rejected_before_execution() {
        let (mut conn, _dir) = open_temp();
        let err = conn.execute("SELECT * FROM nope;").unwrap_err();
        assert!(matches!(err, crate::error::DbError::Validation(_)));
    }

    #[test]
    fn update_reports_affected_row_count() {
        let (mut conn, _dir) = open_temp();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, age INTEGER);").unwrap();
        conn.execute("INSERT INTO t (id, age) VALUES (1, 10);").unwrap();
        let result = conn.execute("UPDATE t SET age = age + 1 WHERE id = 1;").unwrap();
        assert_eq!(result.affected, 1);
    }

    #[test]
    fn reopening_a_database_preserves_committed_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let mut conn = Connection::open(dir.path()).unwrap();
            conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);").unwrap();
            conn.execute("INSERT INTO t (id, name) VALUES (1, 'a');").unwrap();
        }
        let mut conn = Connection::open(dir.path()).unwrap();
        let result = conn.execute("SELECT * FROM t;").unwrap();
        assert_eq!(result.row_count(), 1);
    }
}

#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::correctness,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    deprecated,
    unused,
    clippy::todo,
    clippy::unimplemented,
    clippy::unreachable,
    clippy::missing_safety_doc
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::option_if_let_else,
    clippy::cognitive_complexity,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp,
    clippy::doc_markdown,
    clippy::module_inception,
    clippy::single_match_else,
    clippy::items_after_statements,
    clippy::match_same_arms
)]

//! # oxiql - a miniature relational database
//!
//! oxiql is an embedded relational database: a SQL tokenizer/parser, a
//! mutable relational-algebra query tree, an equivalence-preserving rule
//! set plus a genetic-algorithm optimizer, a recursive executor, a paged
//! storage engine, four pluggable concurrency-control strategies, and a
//! write-ahead log for crash recovery.
//!
//! ## Quick start
//!
//! ```no_run
//! use oxiql::Connection;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = Connection::open("my_database.db")?;
//!
//! conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")?;
//! conn.execute("INSERT INTO users (id, name, age) VALUES (1, 'Alice', 30)")?;
//!
//! let result = conn.execute("SELECT * FROM users WHERE age > 25")?;
//! assert_eq!(result.row_count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`query`**: tokenizer, recursive-descent parser, and the `QueryTree`
//!   the rest of the crate operates on.
//! - **`optimizer`**: deterministic rewrites followed by a genetic search
//!   over the remaining equivalence-preserving rules.
//! - **`executor`**: recursive evaluator that turns an optimized plan into
//!   rows or an affected-row count.
//! - **`storage`**: paged heap files behind an LRU buffer pool, with
//!   optional hash/B-tree secondary indexes.
//! - **`transaction`**: transaction bookkeeping plus four interchangeable
//!   concurrency-control strategies (2PL, timestamp ordering, optimistic,
//!   MVCC).
//! - **`recovery`**: write-ahead log and REDO/UNDO crash recovery.
//! - **`net`**: the optional TCP wire protocol for out-of-process clients.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod net;
pub mod optimizer;
pub mod query;
pub mod recovery;
pub mod storage;
pub mod transaction;

pub use api::{Connection, QueryResult};
pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use storage::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn connection_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let mut conn = Connection::open(&db_path).expect("failed to open connection");

        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT);")
            .expect("failed to create table");
        conn.execute("INSERT INTO test (id, value) VALUES (1, 'hello');")
            .expect("failed to insert data");

        let result = conn.execute("SELECT * FROM test WHERE id = 1;").expect("failed to query data");

        assert!(!result.is_empty());
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn begin_transaction_block_runs_its_statements_and_commits() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_tx.db");

        let mut conn = Connection::open(&db_path).expect("failed to open connection");

        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT);")
            .expect("failed to create table");

        conn.execute(
            "BEGIN TRANSACTION; INSERT INTO test (id, value) VALUES (1, 'test'); INSERT INTO test (id, value) VALUES (2, 'other'); COMMIT;",
        )
        .expect("failed to run transaction block");

        let result = conn.execute("SELECT * FROM test;").expect("failed to query data");

        assert_eq!(result.row_count(), 2);
    }
}

//! Optional secondary indexes. An index only narrows which rows a scan
//! visits; it never changes which rows match a predicate, so query results
//! are identical with or without one.

pub mod btree;
pub mod hash;

use crate::storage::page::RowId;
use crate::storage::Value;

pub use btree::BTreeIndex;
pub use hash::HashIndex;

/// A secondary index over a single column: exact-key and range lookups
/// return `RowId`s for the caller to fetch and re-check against the full
/// predicate (the index itself never drops a match).
pub trait Index: Send {
    fn insert(&mut self, key: Value, row: RowId);
    fn remove(&mut self, key: &Value, row: RowId);
    fn lookup(&self, key: &Value) -> Vec<RowId>;
    fn range(&self, low: Option<&Value>, high: Option<&Value>) -> Vec<RowId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Hash,
    BTree,
}

pub fn new_index(kind: IndexKind) -> Box<dyn Index> {
    match kind {
        IndexKind::Hash => Box::new(HashIndex::new()),
        IndexKind::BTree => Box::new(BTreeIndex::new()),
    }
}

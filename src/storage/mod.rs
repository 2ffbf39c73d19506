//! Storage engine: paged heap tables behind an LRU buffer pool, plus the
//! `DataRetrieval`/`DataWrite`/`DataDeletion` request/response shapes the
//! executor issues through the concurrency-control manager.

pub mod buffer_pool;
pub mod catalog;
pub mod engine;
pub mod heap;
pub mod index;
pub mod page;

use serde::{Deserialize, Serialize};

/// A cell value. Mirrors `catalog::LogicalType`'s variants plus `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Text(String),
    Boolean(bool),
    Date(chrono::NaiveDate),
    Null,
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Integer(i) => i.hash(state),
            Value::Text(s) => s.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Text(_) => "VARCHAR",
            Value::Boolean(_) => "BOOLEAN",
            Value::Date(_) => "DATE",
            Value::Null => "NULL",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// One stored record: column name to value, in table-definition order.
pub type Row = Vec<(String, Value)>;

/// A single column-name -> literal assignment, used by `UPDATE` and by
/// `INSERT`'s column-list/value-list pairing.
pub type Assignment = (String, Value);

#[derive(Debug, Clone)]
pub enum SearchType {
    Sequential,
    Indexed { column: String },
}

/// A conjunctive predicate: all conditions must hold. `Eq`/`Lt`/etc. match
/// the tokenizer's comparison operators; evaluated by the storage layer
/// only for simple column-vs-literal predicates push-able to an index scan.
/// General predicates (joins, OR, nested boolean expressions) are
/// evaluated by the executor over the raw scan instead.
#[derive(Debug, Clone)]
pub struct SimpleCondition {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub struct DataRetrieval {
    pub table: String,
    pub columns: Vec<String>,
    pub conditions: Vec<SimpleCondition>,
    pub search_type: SearchType,
}

/// `conditions.is_empty()` means insert `values` as a new row; otherwise
/// update matching rows' `columns` to `values`.
#[derive(Debug, Clone)]
pub struct DataWrite {
    pub table: String,
    pub columns: Vec<String>,
    pub conditions: Vec<SimpleCondition>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct DataDeletion {
    pub table: String,
    pub conditions: Vec<SimpleCondition>,
}

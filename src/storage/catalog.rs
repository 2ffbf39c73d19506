//! Table catalog: schema metadata for every table in the database.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Data,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalType {
    Integer,
    Varchar(u32),
    Boolean,
    Date,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub logical_type: LogicalType,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub kind: TableKind,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Per-table statistics consumed by the cost model and by index/scan
/// decisions: tuple count, block count, tuple size in bytes, blocking
/// factor, and per-column distinct-value estimates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistic {
    pub n_r: u64,
    pub b_r: u64,
    pub l_r: u64,
    pub f_r: u64,
    pub distinct_values: HashMap<String, u64>,
}

/// Read-mostly table catalog; the storage engine takes an exclusive latch
/// for writers (`create_table`/`drop_table`), while lookups never block
/// each other.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: HashMap<String, Table>,
}

impl Catalog {
    pub fn new() -> Self {
        Self { tables: HashMap::new() }
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn drop_table(&mut self, name: &str) -> bool {
        self.tables.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Resolves an unqualified column name to the single table that
    /// defines it, among `candidates`. Returns `None` if zero or more than
    /// one candidate defines the column (ambiguous).
    pub fn resolve_unqualified(&self, column: &str, candidates: &[String]) -> Option<String> {
        let mut found = None;
        for t in candidates {
            if let Some(table) = self.tables.get(t) {
                if table.column(column).is_some() {
                    if found.is_some() {
                        return None;
                    }
                    found = Some(t.clone());
                }
            }
        }
        found
    }
}

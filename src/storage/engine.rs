//! Storage engine façade: binds a `Catalog` entry to a per-table heap file
//! and buffer pool, and answers `read_block`/`write_block`/`delete_block`
//! against the conjunctive `SimpleCondition` list. Index use is an internal
//! optimization only — with or without one, the rows returned are the same.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{DbError, DbResult};
use crate::storage::buffer_pool::BufferPool;
use crate::storage::catalog::{Catalog, Statistic, Table};
use crate::storage::heap::HeapFile;
use crate::storage::index::{new_index, Index, IndexKind};
use crate::storage::page::{PageId, RowId};
use crate::storage::{CompareOp, DataDeletion, DataRetrieval, DataWrite, Row, SearchType, SimpleCondition};

struct TableStorage {
    pool: BufferPool,
    indexes: HashMap<String, Box<dyn Index>>,
}

pub struct StorageEngine {
    data_dir: PathBuf,
    page_size: usize,
    buffer_pool_bytes: usize,
    catalog: Catalog,
    tables: HashMap<String, TableStorage>,
}

fn matches(row: &Row, conditions: &[SimpleCondition]) -> bool {
    conditions.iter().all(|cond| {
        row.iter().find(|(name, _)| name == &cond.column).is_some_and(|(_, value)| {
            let cmp = value.partial_cmp(&cond.value);
            match (cond.op, cmp) {
                (CompareOp::Eq, _) => value == &cond.value,
                (CompareOp::Ne, _) => value != &cond.value,
                (CompareOp::Lt, Some(o)) => o.is_lt(),
                (CompareOp::Le, Some(o)) => o.is_le(),
                (CompareOp::Gt, Some(o)) => o.is_gt(),
                (CompareOp::Ge, Some(o)) => o.is_ge(),
                _ => false,
            }
        })
    })
}

fn project(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .filter_map(|c| row.iter().find(|(name, _)| name == c).cloned())
        .collect()
}

impl StorageEngine {
    pub fn open(data_dir: PathBuf, page_size: usize, buffer_pool_bytes: usize) -> DbResult<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let catalog_path = data_dir.join("catalog.json");
        let catalog = if catalog_path.exists() {
            let text = std::fs::read_to_string(&catalog_path)?;
            serde_json::from_str(&text)?
        } else {
            Catalog::new()
        };
        let mut engine =
            Self { data_dir, page_size, buffer_pool_bytes, catalog, tables: HashMap::new() };
        let names = engine.catalog.table_names();
        for name in names {
            engine.open_table_storage(&name)?;
        }
        Ok(engine)
    }

    fn heap_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(table).join("heap.bin")
    }

    fn open_table_storage(&mut self, table: &str) -> DbResult<()> {
        let heap = HeapFile::open(&self.heap_path(table), self.page_size)?;
        let pool = BufferPool::new(heap, self.buffer_pool_bytes, self.page_size);
        self.tables.insert(table.to_string(), TableStorage { pool, indexes: HashMap::new() });
        Ok(())
    }

    fn persist_catalog(&self) -> DbResult<()> {
        let text = serde_json::to_string_pretty(&self.catalog)?;
        std::fs::write(self.data_dir.join("catalog.json"), text)?;
        Ok(())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn create_table(&mut self, table: Table) -> DbResult<()> {
        if self.catalog.contains(&table.name) {
            return Err(DbError::Validation(format!("table {} already exists", table.name)));
        }
        let name = table.name.clone();
        self.catalog.add_table(table);
        self.open_table_storage(&name)?;
        self.persist_catalog()
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        if !self.catalog.drop_table(name) {
            return Err(DbError::Validation(format!("unknown table {name}")));
        }
        self.tables.remove(name);
        let _ = std::fs::remove_dir_all(self.data_dir.join(name));
        self.persist_catalog()
    }

    fn table_storage(&mut self, name: &str) -> DbResult<&mut TableStorage> {
        self.tables.get_mut(name).ok_or_else(|| DbError::Validation(format!("unknown table {name}")))
    }

    /// Iterates every live row in the table, in page then slot order.
    pub fn scan(&mut self, table: &str) -> DbResult<Vec<(RowId, Row)>> {
        let storage = self.table_storage(table)?;
        let page_count = storage.pool.page_count();
        let mut out = Vec::new();
        for i in 0..page_count {
            let page = storage.pool.fetch(PageId(i))?;
            for (slot, row) in page.occupied() {
                out.push((RowId { page: PageId(i), slot }, row.clone()));
            }
        }
        Ok(out)
    }

    fn indexed_row_ids(&mut self, table: &str, request: &DataRetrieval) -> Option<Vec<RowId>> {
        let SearchType::Indexed { column } = &request.search_type else { return None };
        let eq_value = request.conditions.iter().find(|c| &c.column == column && c.op == CompareOp::Eq)?;
        let storage = self.tables.get(table)?;
        let index = storage.indexes.get(column)?;
        Some(index.lookup(&eq_value.value))
    }

    pub fn read_block(&mut self, request: &DataRetrieval) -> DbResult<Vec<Row>> {
        let candidates: Vec<Row> = match self.indexed_row_ids(&request.table, request) {
            Some(ids) => {
                let storage = self.table_storage(&request.table)?;
                ids.into_iter()
                    .filter_map(|id| storage.pool.fetch(id.page).ok().and_then(|p| p.get(id.slot).cloned()))
                    .collect()
            }
            None => self.scan(&request.table)?.into_iter().map(|(_, row)| row).collect(),
        };
        Ok(candidates
            .into_iter()
            .filter(|row| matches(row, &request.conditions))
            .map(|row| project(&row, &request.columns))
            .collect())
    }

    pub fn write_block(&mut self, request: &DataWrite) -> DbResult<u64> {
        if request.conditions.is_empty() {
            let row: Row = request.columns.iter().cloned().zip(request.values.iter().cloned()).collect();
            self.insert_row(&request.table, row)?;
            return Ok(1);
        }
        let matching = self.scan(&request.table)?;
        let mut affected = 0u64;
        let storage = self.table_storage(&request.table)?;
        for (id, row) in matching {
            if !matches(&row, &request.conditions) {
                continue;
            }
            let mut updated = row.clone();
            for (col, val) in request.columns.iter().zip(request.values.iter()) {
                if let Some(cell) = updated.iter_mut().find(|(name, _)| name == col) {
                    cell.1 = val.clone();
                } else {
                    updated.push((col.clone(), val.clone()));
                }
            }
            let page = storage.pool.fetch(id.page)?;
            if page.update(id.slot, updated) {
                storage.pool.mark_dirty(id.page);
                affected += 1;
            }
        }
        Ok(affected)
    }

    pub fn delete_block(&mut self, request: &DataDeletion) -> DbResult<u64> {
        let matching = self.scan(&request.table)?;
        let mut affected = 0u64;
        let storage = self.table_storage(&request.table)?;
        for (id, row) in matching {
            if !matches(&row, &request.conditions) {
                continue;
            }
            let page = storage.pool.fetch(id.page)?;
            if page.delete(id.slot) {
                storage.pool.mark_dirty(id.page);
                for (column, index) in storage.indexes.iter_mut() {
                    if let Some((_, value)) = row.iter().find(|(name, _)| name == column) {
                        index.remove(value, id);
                    }
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn insert_row(&mut self, table: &str, row: Row) -> DbResult<RowId> {
        let page_size = self.page_size;
        let storage = self.table_storage(table)?;
        let page_count = storage.pool.page_count();
        for i in 0..page_count {
            let page = storage.pool.fetch(PageId(i))?;
            let slot = page.insert(row.clone());
            if page.to_bytes(page_size).is_ok() {
                storage.pool.mark_dirty(PageId(i));
                let id = RowId { page: PageId(i), slot };
                reindex_insert(storage, &row, id);
                return Ok(id);
            }
            page.delete(slot);
        }
        let new_page = storage.pool.allocate_page()?;
        let page = storage.pool.fetch(new_page)?;
        let slot = page.insert(row.clone());
        storage.pool.mark_dirty(new_page);
        let id = RowId { page: new_page, slot };
        reindex_insert(storage, &row, id);
        Ok(id)
    }

    pub fn set_index(&mut self, table: &str, column: &str, kind: IndexKind) -> DbResult<()> {
        let rows = self.scan(table)?;
        let storage = self.table_storage(table)?;
        let mut index = new_index(kind);
        for (id, row) in &rows {
            if let Some((_, value)) = row.iter().find(|(name, _)| name == column) {
                index.insert(value.clone(), *id);
            }
        }
        storage.indexes.insert(column.to_string(), index);
        Ok(())
    }

    pub fn get_stats(&mut self, table: &str) -> DbResult<Statistic> {
        let l_r = self
            .catalog
            .get(table)
            .ok_or_else(|| DbError::Validation(format!("unknown table {table}")))?
            .columns
            .len() as u64
            * 8;
        let rows = self.scan(table)?;
        let mut stat = Statistic { l_r, n_r: rows.len() as u64, ..Statistic::default() };
        stat.b_r = self.table_storage(table)?.pool.page_count() as u64;
        stat.f_r = if stat.b_r > 0 { stat.n_r / stat.b_r.max(1) } else { 0 };
        for (column, _) in rows.first().map(|(_, r)| r.clone()).unwrap_or_default() {
            let distinct: std::collections::HashSet<String> =
                rows.iter().filter_map(|(_, r)| r.iter().find(|(n, _)| n == &column).map(|(_, v)| v.to_string())).collect();
            stat.distinct_values.insert(column, distinct.len() as u64);
        }
        Ok(stat)
    }
}

fn reindex_insert(storage: &mut TableStorage, row: &Row, id: RowId) {
    for (column, index) in storage.indexes.iter_mut() {
        if let Some((_, value)) = row.iter().find(|(name, _)| name == column) {
            index.insert(value.clone(), id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::catalog::{ColumnDefinition, LogicalType, TableKind};
    use crate::storage::Value;

    fn sample_table() -> Table {
        Table {
            name: "widgets".to_string(),
            columns: vec![
                ColumnDefinition { name: "id".to_string(), logical_type: LogicalType::Integer, is_primary_key: true },
                ColumnDefinition { name: "name".to_string(), logical_type: LogicalType::Varchar(32), is_primary_key: false },
            ],
            primary_keys: vec!["id".to_string()],
            foreign_keys: vec![],
            kind: TableKind::Data,
        }
    }

    #[test]
    fn insert_read_update_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(dir.path().to_path_buf(), 4096, 4096 * 4).unwrap();
        engine.create_table(sample_table()).unwrap();

        engine
            .write_block(&DataWrite {
                table: "widgets".to_string(),
                columns: vec!["id".to_string(), "name".to_string()],
                conditions: vec![],
                values: vec![Value::Integer(1), Value::Text("bolt".to_string())],
            })
            .unwrap();

        let rows = engine
            .read_block(&DataRetrieval {
                table: "widgets".to_string(),
                columns: vec![],
                conditions: vec![],
                search_type: SearchType::Sequential,
            })
            .unwrap();
        assert_eq!(rows.len(), 1);

        let updated = engine
            .write_block(&DataWrite {
                table: "widgets".to_string(),
                columns: vec!["name".to_string()],
                conditions: vec![SimpleCondition { column: "id".to_string(), op: CompareOp::Eq, value: Value::Integer(1) }],
                values: vec![Value::Text("nut".to_string())],
            })
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = engine
            .delete_block(&DataDeletion {
                table: "widgets".to_string(),
                conditions: vec![SimpleCondition { column: "id".to_string(), op: CompareOp::Eq, value: Value::Integer(1) }],
            })
            .unwrap();
        assert_eq!(deleted, 1);

        let rows = engine
            .read_block(&DataRetrieval {
                table: "widgets".to_string(),
                columns: vec![],
                conditions: vec![],
                search_type: SearchType::Sequential,
            })
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn results_identical_with_or_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(dir.path().to_path_buf(), 4096, 4096 * 4).unwrap();
        engine.create_table(sample_table()).unwrap();
        for i in 0..5 {
            engine
                .write_block(&DataWrite {
                    table: "widgets".to_string(),
                    columns: vec!["id".to_string(), "name".to_string()],
                    conditions: vec![],
                    values: vec![Value::Integer(i), Value::Text(format!("item{i}"))],
                })
                .unwrap();
        }
        let request = DataRetrieval {
            table: "widgets".to_string(),
            columns: vec![],
            conditions: vec![SimpleCondition { column: "id".to_string(), op: CompareOp::Eq, value: Value::Integer(3) }],
            search_type: SearchType::Sequential,
        };
        let without_index = engine.read_block(&request).unwrap();

        engine.set_index("widgets", "id", IndexKind::Hash).unwrap();
        let indexed_request = DataRetrieval { search_type: SearchType::Indexed { column: "id".to_string() }, ..request };
        let with_index = engine.read_block(&indexed_request).unwrap();

        assert_eq!(without_index, with_index);
    }
}

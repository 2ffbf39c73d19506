//! Recursive plan evaluator: walks a (possibly optimized) `QueryTree` bottom
//! up, routing every table access through the active concurrency-control
//! manager before it reaches storage. Mirrors the recursive `Box<QueryPlanNode>`
//! evaluation shape of the teacher's `core/optimizer/mod.rs`, generalized from
//! a fixed plan-node enum to the uniform tagged tree.

pub mod condition;

use std::collections::HashSet;

use condition::{column_ref_parts, eval_bool, eval_value, ExecRow};

use crate::error::{DbError, DbResult};
use crate::query::tree::{NodeRef, NodeType};
use crate::recovery::log_record::LogRecord;
use crate::recovery::wal::Wal;
use crate::storage::catalog::{ColumnDefinition, ForeignKey, LogicalType, Table, TableKind};
use crate::storage::engine::StorageEngine;
use crate::storage::{CompareOp, DataDeletion, DataRetrieval, DataWrite, Row, SearchType, SimpleCondition, Value};
use crate::transaction::ccm::{Ccm, ConcurrencyControlManager};
use crate::transaction::TransactionId;

pub enum ExecOutcome {
    Rows(Vec<Row>),
    Affected(u64),
}

pub struct Executor<'a> {
    storage: &'a mut StorageEngine,
    ccm: &'a Ccm,
    wal: Option<&'a mut Wal>,
}

fn to_exec_row(table: &str, row: Row) -> ExecRow {
    row.into_iter().map(|(c, v)| (table.to_string(), c, v)).collect()
}

fn to_storage_row(row: ExecRow) -> Row {
    row.into_iter().map(|(_, c, v)| (c, v)).collect()
}

fn concat_rows(left: &ExecRow, right: &ExecRow) -> ExecRow {
    let mut out = left.clone();
    out.extend(right.iter().cloned());
    out
}

fn logical_type(name: &str) -> DbResult<LogicalType> {
    match name.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" => Ok(LogicalType::Integer),
        "VARCHAR" | "TEXT" | "STRING" => Ok(LogicalType::Varchar(255)),
        "BOOLEAN" | "BOOL" => Ok(LogicalType::Boolean),
        "DATE" => Ok(LogicalType::Date),
        other => Err(DbError::Validation(format!("unknown data type {other}"))),
    }
}

impl<'a> Executor<'a> {
    pub fn new(storage: &'a mut StorageEngine, ccm: &'a Ccm) -> Self {
        Self { storage, ccm, wal: None }
    }

    /// Like [`Executor::new`], but logs a before/after-image `Write` record
    /// to `wal` ahead of every INSERT/UPDATE/DELETE this executor applies.
    pub fn with_wal(storage: &'a mut StorageEngine, ccm: &'a Ccm, wal: &'a mut Wal) -> Self {
        Self { storage, ccm, wal: Some(wal) }
    }

    fn log_write(&mut self, tid: TransactionId, table: &str, before: Option<Row>, after: Option<Row>) -> DbResult<()> {
        let Some(wal) = self.wal.as_deref_mut() else { return Ok(()) };
        let lsn = wal.next_lsn();
        wal.append(&LogRecord::Write { lsn, tid, table: table.to_string(), before, after })
    }

    /// Top-level entry point: dispatches a parsed/optimized statement root.
    pub fn execute(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<ExecOutcome> {
        let node_type = node.borrow().node_type;
        match node_type {
            NodeType::Project | NodeType::Sort | NodeType::Filter | NodeType::Limit | NodeType::Join
            | NodeType::Relation | NodeType::Alias => {
                let rows = self.eval_rows(node, tid)?;
                Ok(ExecOutcome::Rows(rows.into_iter().map(to_storage_row).collect()))
            }
            NodeType::InsertQuery => self.execute_insert(node, tid),
            NodeType::UpdateQuery => self.execute_update(node, tid),
            NodeType::DeleteQuery => self.execute_delete(node, tid),
            NodeType::CreateTable => self.execute_create_table(node),
            NodeType::DropTable => self.execute_drop_table(node),
            NodeType::BeginTransaction => self.execute_begin_transaction(node, tid),
            NodeType::Commit => {
                if node.borrow().value == "COMMIT" {
                    self.ccm.commit(tid)?;
                } else {
                    self.ccm.abort(tid);
                }
                Ok(ExecOutcome::Affected(0))
            }
            other => Err(DbError::Execution(format!("{other:?} is not an executable statement"))),
        }
    }

    fn eval_condition(&mut self, cond: &NodeRef, row: &ExecRow, tid: TransactionId) -> DbResult<bool> {
        let mut subquery_rows = |root: &NodeRef| -> DbResult<usize> { Ok(self.eval_rows(root, tid)?.len()) };
        eval_bool(cond, row, &mut subquery_rows)
    }

    fn scan_table(&mut self, table: &str, tag: &str, tid: TransactionId) -> DbResult<Vec<ExecRow>> {
        self.ccm.request_read(tid, &table.to_string())?;
        let request = DataRetrieval {
            table: table.to_string(),
            columns: vec![],
            conditions: vec![],
            search_type: SearchType::Sequential,
        };
        let rows = self.storage.read_block(&request)?;
        Ok(rows.into_iter().map(|r| to_exec_row(tag, r)).collect())
    }

    /// Evaluates any row-producing node into its tagged intermediate rows.
    fn eval_rows(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<Vec<ExecRow>> {
        let node_type = node.borrow().node_type;
        match node_type {
            NodeType::Relation => {
                let table = node.borrow().value.clone();
                self.scan_table(&table, &table, tid)
            }
            NodeType::Alias => {
                let child = node.borrow().children[0].clone();
                let alias = node.borrow().value.clone();
                if child.borrow().node_type == NodeType::Relation {
                    let table = child.borrow().value.clone();
                    self.scan_table(&table, &alias, tid)
                } else {
                    let rows = self.eval_rows(&child, tid)?;
                    Ok(rows
                        .into_iter()
                        .map(|r| r.into_iter().map(|(_, c, v)| (alias.clone(), c, v)).collect())
                        .collect())
                }
            }
            NodeType::Filter => {
                let children = node.borrow().children.clone();
                let source = self.eval_rows(&children[0], tid)?;
                let mut out = Vec::new();
                for row in source {
                    if self.eval_condition(&children[1], &row, tid)? {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            NodeType::Join => self.eval_join(node, tid),
            NodeType::Sort => {
                let children = node.borrow().children.clone();
                let direction = node.borrow().value.clone();
                let mut rows = self.eval_rows(&children[1], tid)?;
                let mut keyed: Vec<(Value, ExecRow)> = rows
                    .drain(..)
                    .map(|r| {
                        let key = eval_value(&children[0], &r).unwrap_or(Value::Null);
                        (key, r)
                    })
                    .collect();
                keyed.sort_by(|(a, _), (b, _)| {
                    let ord = a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
                    if direction == "DESC" { ord.reverse() } else { ord }
                });
                Ok(keyed.into_iter().map(|(_, r)| r).collect())
            }
            NodeType::Limit => {
                let children = node.borrow().children.clone();
                let n: usize = node
                    .borrow()
                    .value
                    .parse()
                    .map_err(|_| DbError::Execution("LIMIT value is not a non-negative integer".into()))?;
                let mut rows = self.eval_rows(&children[0], tid)?;
                rows.truncate(n);
                Ok(rows)
            }
            NodeType::Project => self.eval_project(node, tid),
            other => Err(DbError::Execution(format!("{other:?} does not produce rows"))),
        }
    }

    fn eval_join(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<Vec<ExecRow>> {
        let kind = node.borrow().value.clone();
        let children = node.borrow().children.clone();
        let left = self.eval_rows(&children[0], tid)?;
        let right = self.eval_rows(&children[1], tid)?;

        match kind.as_str() {
            "CROSS" => {
                let mut out = Vec::with_capacity(left.len() * right.len());
                for l in &left {
                    for r in &right {
                        out.push(concat_rows(l, r));
                    }
                }
                Ok(out)
            }
            "INNER" => {
                let cond = children[2].clone();
                let mut out = Vec::new();
                for l in &left {
                    for r in &right {
                        let merged = concat_rows(l, r);
                        if self.eval_condition(&cond, &merged, tid)? {
                            out.push(merged);
                        }
                    }
                }
                Ok(out)
            }
            "NATURAL" => {
                let (Some(sample_l), Some(sample_r)) = (left.first(), right.first()) else { return Ok(Vec::new()) };
                let left_cols: HashSet<&str> = sample_l.iter().map(|(_, c, _)| c.as_str()).collect();
                let right_cols: HashSet<&str> = sample_r.iter().map(|(_, c, _)| c.as_str()).collect();
                let shared: HashSet<String> = left_cols.intersection(&right_cols).map(|s| s.to_string()).collect();
                let mut out = Vec::new();
                for l in &left {
                    for r in &right {
                        let equal = shared.iter().all(|c| {
                            let lv = l.iter().find(|(_, name, _)| name == c).map(|(_, _, v)| v);
                            let rv = r.iter().find(|(_, name, _)| name == c).map(|(_, _, v)| v);
                            lv == rv
                        });
                        if equal {
                            let mut merged = l.clone();
                            merged.extend(r.iter().filter(|(_, c, _)| !shared.contains(c)).cloned());
                            out.push(merged);
                        }
                    }
                }
                Ok(out)
            }
            other => Err(DbError::Execution(format!("unknown join kind {other}"))),
        }
    }

    fn eval_project(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<Vec<ExecRow>> {
        let is_star = node.borrow().value == "*";
        let children = node.borrow().children.clone();
        let source = children.last().expect("PROJECT always carries a data-producing last child").clone();
        let rows = self.eval_rows(&source, tid)?;
        if is_star {
            return Ok(rows);
        }
        let columns = &children[..children.len() - 1];
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut projected = ExecRow::new();
            for col in columns {
                let name = project_column_name(col);
                let value = eval_value(col, &row)?;
                projected.push((String::new(), name, value));
            }
            out.push(projected);
        }
        Ok(out)
    }

    fn execute_insert(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<ExecOutcome> {
        let table = node.borrow().value.clone();
        let children = node.borrow().children.clone();
        let columns: Vec<String> =
            children[0].borrow().children.iter().map(|c| c.borrow().value.clone()).collect();
        let empty_row = ExecRow::new();
        let values: Vec<Value> =
            children[1].borrow().children.iter().map(|v| eval_value(v, &empty_row)).collect::<DbResult<_>>()?;
        self.ccm.request_write(tid, &table)?;
        let after_row: Row = columns.iter().cloned().zip(values.iter().cloned()).collect();
        self.log_write(tid, &table, None, Some(after_row))?;
        let affected = self.storage.write_block(&DataWrite { table, columns, conditions: vec![], values })?;
        Ok(ExecOutcome::Affected(affected))
    }

    /// Row-identifying equality conditions built from a row's own current
    /// values, used so `UPDATE`/`DELETE` can re-address one already-matched
    /// row through storage's bulk `write_block`/`delete_block`.
    fn identity_conditions(row: &Row) -> Vec<SimpleCondition> {
        row.iter().map(|(c, v)| SimpleCondition { column: c.clone(), op: CompareOp::Eq, value: v.clone() }).collect()
    }

    fn execute_update(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<ExecOutcome> {
        let table = node.borrow().value.clone();
        let children = node.borrow().children.clone();
        let mut assignments = Vec::new();
        let mut condition = None;
        for child in &children {
            if child.borrow().node_type == NodeType::Assignment {
                let column = child.borrow().value.clone();
                let expr = child.borrow().children[0].clone();
                assignments.push((column, expr));
            } else {
                condition = Some(child.clone());
            }
        }

        self.ccm.request_write(tid, &table)?;
        let rows = self.storage.scan(&table)?;
        let mut affected = 0u64;
        for (_, row) in rows {
            let exec_row = to_exec_row(&table, row.clone());
            if let Some(cond) = &condition {
                if !self.eval_condition(cond, &exec_row, tid)? {
                    continue;
                }
            }
            let mut columns = Vec::with_capacity(assignments.len());
            let mut values = Vec::with_capacity(assignments.len());
            for (column, expr) in &assignments {
                columns.push(column.clone());
                values.push(eval_value(expr, &exec_row)?);
            }
            let mut after_row = row.clone();
            for (column, value) in columns.iter().zip(values.iter()) {
                if let Some(cell) = after_row.iter_mut().find(|(c, _)| c == column) {
                    cell.1 = value.clone();
                }
            }
            self.log_write(tid, &table, Some(row.clone()), Some(after_row))?;
            let conditions = Self::identity_conditions(&row);
            affected += self.storage.write_block(&DataWrite { table: table.clone(), columns, conditions, values })?;
        }
        Ok(ExecOutcome::Affected(affected))
    }

    fn execute_delete(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<ExecOutcome> {
        let table = node.borrow().value.clone();
        let condition = node.borrow().children.first().cloned();

        self.ccm.request_write(tid, &table)?;
        let rows = self.storage.scan(&table)?;
        let mut affected = 0u64;
        for (_, row) in rows {
            if let Some(cond) = &condition {
                let exec_row = to_exec_row(&table, row.clone());
                if !self.eval_condition(cond, &exec_row, tid)? {
                    continue;
                }
            }
            self.log_write(tid, &table, Some(row.clone()), None)?;
            let conditions = Self::identity_conditions(&row);
            affected += self.storage.delete_block(&DataDeletion { table: table.clone(), conditions })?;
        }
        Ok(ExecOutcome::Affected(affected))
    }

    fn execute_create_table(&mut self, node: &NodeRef) -> DbResult<ExecOutcome> {
        let name = node.borrow().value.clone();
        let def_list = node.borrow().children[0].clone();
        let col_defs = def_list.borrow().children.clone();

        let mut columns = Vec::new();
        let mut primary_keys = Vec::new();
        let mut foreign_keys = Vec::new();
        for def in &col_defs {
            let col_name = def.borrow().value.clone();
            let def_children = def.borrow().children.clone();
            let mut data_type = None;
            let mut is_primary_key = false;
            for child in &def_children {
                match child.borrow().node_type {
                    NodeType::DataType => data_type = Some(child.borrow().value.clone()),
                    NodeType::PrimaryKey => is_primary_key = true,
                    NodeType::ForeignKey => {
                        let refs = child.borrow().children[0].clone();
                        let ref_table = refs.borrow().value.clone();
                        let ref_column = refs.borrow().children[0].borrow().value.clone();
                        foreign_keys.push(ForeignKey {
                            column: col_name.clone(),
                            references_table: ref_table,
                            references_column: ref_column,
                        });
                    }
                    _ => {}
                }
            }
            let data_type = data_type.ok_or_else(|| DbError::Validation(format!("column {col_name} has no type")))?;
            if is_primary_key {
                primary_keys.push(col_name.clone());
            }
            columns.push(ColumnDefinition { name: col_name, logical_type: logical_type(&data_type)?, is_primary_key });
        }

        self.storage.create_table(Table { name, columns, primary_keys, foreign_keys, kind: TableKind::Data })?;
        Ok(ExecOutcome::Affected(0))
    }

    fn execute_drop_table(&mut self, node: &NodeRef) -> DbResult<ExecOutcome> {
        let name = node.borrow().value.clone();
        self.storage.drop_table(&name)?;
        Ok(ExecOutcome::Affected(0))
    }

    fn execute_begin_transaction(&mut self, node: &NodeRef, tid: TransactionId) -> DbResult<ExecOutcome> {
        self.ccm.begin(tid);
        for child in &node.borrow().children.clone() {
            if child.borrow().node_type == NodeType::Commit {
                if child.borrow().value == "ABORT" {
                    self.ccm.abort(tid);
                } else {
                    self.ccm.commit(tid)?;
                }
                return Ok(ExecOutcome::Affected(0));
            }
            if let Err(e) = self.execute(child, tid) {
                self.ccm.abort(tid);
                return Err(e);
            }
        }
        self.ccm.commit(tid)?;
        Ok(ExecOutcome::Affected(0))
    }
}

fn project_column_name(node: &NodeRef) -> String {
    match node.borrow().node_type {
        NodeType::Alias => node.borrow().value.clone(),
        NodeType::ColumnRef => column_ref_parts(node).1,
        _ => node.borrow().value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::reset_ids_for_test;
    use crate::storage::catalog::{ColumnDefinition as CD, LogicalType as LT, Table as Tbl, TableKind as TK};
    use crate::transaction::ccm::CcmStrategy;
    use crate::transaction::TransactionManager;

    fn open_engine() -> (tempfile::TempDir, StorageEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::open(dir.path().to_path_buf(), 4096, 4096 * 8).unwrap();
        (dir, engine)
    }

    fn users_table() -> Tbl {
        Tbl {
            name: "users".to_string(),
            columns: vec![
                CD { name: "id".to_string(), logical_type: LT::Integer, is_primary_key: true },
                CD { name: "age".to_string(), logical_type: LT::Integer, is_primary_key: false },
            ],
            primary_keys: vec!["id".to_string()],
            foreign_keys: vec![],
            kind: TK::Data,
        }
    }

    #[test]
    fn insert_then_filtered_select_round_trips() {
        reset_ids_for_test();
        let (_dir, mut engine) = open_engine();
        engine.create_table(users_table()).unwrap();
        let ccm = Ccm::new(CcmStrategy::TwoPhaseLocking);
        let mut txm = TransactionManager::new();

        for (id, age) in [(1, 20), (2, 40)] {
            let tid = txm.begin();
            ccm.begin(tid);
            let root = parse(&format!("INSERT INTO users (id, age) VALUES ({id}, {age});")).unwrap();
            let mut exec = Executor::new(&mut engine, &ccm);
            exec.execute(&root, tid).unwrap();
            ccm.commit(tid).unwrap();
        }

        let tid = txm.begin();
        ccm.begin(tid);
        let root = parse("SELECT id FROM users WHERE age >= 30;").unwrap();
        let mut exec = Executor::new(&mut engine, &ccm);
        let ExecOutcome::Rows(rows) = exec.execute(&root, tid).unwrap() else { panic!("expected rows") };
        ccm.commit(tid).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec![("id".to_string(), Value::Integer(2))]);
    }

    #[test]
    fn update_sets_value_relative_to_existing_column() {
        reset_ids_for_test();
        let (_dir, mut engine) = open_engine();
        engine.create_table(users_table()).unwrap();
        let ccm = Ccm::new(CcmStrategy::Mvcc);
        let mut txm = TransactionManager::new();

        let tid = txm.begin();
        ccm.begin(tid);
        let insert = parse("INSERT INTO users (id, age) VALUES (1, 20);").unwrap();
        Executor::new(&mut engine, &ccm).execute(&insert, tid).unwrap();
        ccm.commit(tid).unwrap();

        let tid = txm.begin();
        ccm.begin(tid);
        let update = parse("UPDATE users SET age = age + 1 WHERE id = 1;").unwrap();
        let ExecOutcome::Affected(n) = Executor::new(&mut engine, &ccm).execute(&update, tid).unwrap() else {
            panic!("expected affected count")
        };
        ccm.commit(tid).unwrap();
        assert_eq!(n, 1);

        let tid = txm.begin();
        ccm.begin(tid);
        let select = parse("SELECT age FROM users;").unwrap();
        let ExecOutcome::Rows(rows) = Executor::new(&mut engine, &ccm).execute(&select, tid).unwrap() else {
            panic!("expected rows")
        };
        ccm.commit(tid).unwrap();
        assert_eq!(rows[0], vec![("age".to_string(), Value::Integer(21))]);
    }
}

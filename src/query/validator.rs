//! Post-parse structural check over a `QueryTree`.
//!
//! Enforces arity per node type, RELATION-against-catalog lookups, JOIN
//! value membership, and PROJECT non-emptiness. Every violation raises the
//! single `DbError::Validation` kind, naming the offending node.

use crate::error::{DbError, DbResult};
use crate::query::tree::{NodeRef, NodeType};
use crate::storage::catalog::Catalog;

pub fn validate(root: &NodeRef, catalog: &Catalog) -> DbResult<()> {
    check_node(root, catalog)
}

fn check_node(node: &NodeRef, catalog: &Catalog) -> DbResult<()> {
    let (node_type, value, child_count) = {
        let n = node.borrow();
        (n.node_type, n.value.clone(), n.children.len())
    };

    match node_type {
        NodeType::Relation => {
            if !catalog.contains(&value) {
                return Err(DbError::Validation(format!("unknown table '{value}' in RELATION node")));
            }
        }
        NodeType::Project => {
            if child_count == 0 {
                return Err(DbError::Validation("PROJECT must have a data-producing child".into()));
            }
        }
        NodeType::Join => {
            if !matches!(value.as_str(), "NATURAL" | "INNER" | "CROSS") {
                return Err(DbError::Validation(format!("invalid JOIN value '{value}'")));
            }
            if value == "NATURAL" && child_count != 2 {
                return Err(DbError::Validation("NATURAL JOIN must have exactly two children".into()));
            }
            if value != "NATURAL" && !(child_count == 2 || child_count == 3) {
                return Err(DbError::Validation("JOIN must have two or three children".into()));
            }
        }
        NodeType::Filter => {
            if child_count != 2 {
                return Err(DbError::Validation("FILTER must have exactly two children".into()));
            }
        }
        NodeType::Operator => match value.as_str() {
            "AND" | "OR" => {
                if child_count < 2 {
                    return Err(DbError::Validation(format!("{value} requires at least two conditions")));
                }
            }
            "NOT" => {
                if child_count != 1 {
                    return Err(DbError::Validation("NOT requires exactly one condition".into()));
                }
            }
            other => {
                return Err(DbError::Validation(format!("unknown OPERATOR value '{other}'")));
            }
        },
        NodeType::Array | NodeType::Limit => {}
        _ => {}
    }

    for child in &node.borrow().children {
        check_node(child, catalog)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::reset_ids_for_test;
    use crate::storage::catalog::{ColumnDefinition, LogicalType, Table, TableKind};

    fn catalog_with_users() -> Catalog {
        let mut c = Catalog::new();
        c.add_table(Table {
            name: "users".into(),
            columns: vec![
                ColumnDefinition { name: "id".into(), logical_type: LogicalType::Integer, is_primary_key: true },
                ColumnDefinition { name: "age".into(), logical_type: LogicalType::Integer, is_primary_key: false },
            ],
            primary_keys: vec!["id".into()],
            foreign_keys: vec![],
            kind: TableKind::Data,
        });
        c
    }

    #[test]
    fn rejects_unknown_table() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM ghosts;").unwrap();
        let err = validate(&root, &Catalog::new()).unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        let _ = catalog_with_users();
    }

    #[test]
    fn accepts_known_table() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM users WHERE age >= 30;").unwrap();
        validate(&root, &catalog_with_users()).unwrap();
    }
}

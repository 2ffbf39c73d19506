//! Rule 8 — projection push-down over JOIN (deterministic, applied once
//! pre-GA). Skipped when the upper PROJECT is `*`.

use std::collections::HashSet;

use crate::query::tree::{clone_tree, NodeRef, NodeType, QueryTree};
use crate::storage::catalog::Catalog;

pub fn apply(root: &NodeRef, catalog: &Catalog) -> NodeRef {
    let cloned = clone_tree(root, true);
    rewrite(&cloned, catalog)
}

fn column_name_of(col_ref: &NodeRef) -> String {
    col_ref
        .borrow()
        .children
        .iter()
        .find(|c| c.borrow().node_type == NodeType::ColumnName)
        .map(|c| c.borrow().value.clone())
        .unwrap_or_default()
}

fn extract_projected_columns(project: &NodeRef) -> Vec<String> {
    let b = project.borrow();
    let mut out = Vec::new();
    for c in &b.children[..b.children.len() - 1] {
        let target = if c.borrow().node_type == NodeType::Alias {
            c.borrow().children[0].clone()
        } else {
            c.clone()
        };
        if target.borrow().node_type == NodeType::ColumnRef {
            out.push(column_name_of(&target));
        }
    }
    out
}

fn extract_condition_columns(cond: &NodeRef) -> Vec<String> {
    let mut out = Vec::new();
    crate::query::tree::traverse_preorder(cond, &mut |n| {
        if n.borrow().node_type == NodeType::ColumnRef {
            out.push(column_name_of(n));
        }
    });
    out
}

fn underlying_table_name(side: &NodeRef) -> Option<String> {
    let mut found = None;
    crate::query::tree::traverse_preorder(side, &mut |n| {
        if found.is_none() && n.borrow().node_type == NodeType::Relation {
            found = Some(n.borrow().value.clone());
        }
    });
    found
}

fn create_smart_project(columns: &HashSet<String>, source: NodeRef, catalog: &Catalog) -> NodeRef {
    let filtered: Vec<String> = if let Some(table_name) = underlying_table_name(&source) {
        if let Some(table) = catalog.get(&table_name) {
            let mut v: Vec<String> = columns.iter().filter(|c| table.column(c).is_some()).cloned().collect();
            v.sort();
            v
        } else {
            let mut v: Vec<String> = columns.iter().cloned().collect();
            v.sort();
            v
        }
    } else {
        let mut v: Vec<String> = columns.iter().cloned().collect();
        v.sort();
        v
    };
    let project = QueryTree::new(NodeType::Project, "");
    for c in filtered {
        let col_ref = QueryTree::new(NodeType::ColumnRef, "");
        QueryTree::push_child(&col_ref, QueryTree::new(NodeType::ColumnName, c));
        QueryTree::push_child(&project, col_ref);
    }
    QueryTree::push_child(&project, source);
    project
}

fn rewrite(node: &NodeRef, catalog: &Catalog) -> NodeRef {
    let children: Vec<NodeRef> = node.borrow().children.clone();
    let rewritten_children: Vec<NodeRef> = children.iter().map(|c| rewrite(c, catalog)).collect();
    let (nt, val, id) = {
        let n = node.borrow();
        (n.node_type, n.value.clone(), n.id)
    };
    let rebuilt = QueryTree::new_with_id(id, nt, val.clone());
    for c in &rewritten_children {
        QueryTree::push_child(&rebuilt, c.clone());
    }

    if nt == NodeType::Project && val != "*" {
        let data_child = rebuilt.borrow().children.last().unwrap().clone();
        if data_child.borrow().node_type == NodeType::Join && data_child.borrow().value == "INNER" {
            let join = data_child;
            let projected = extract_projected_columns(&rebuilt);
            let join_cond = join.borrow().children.get(2).cloned();
            let join_cols = join_cond.as_ref().map(extract_condition_columns).unwrap_or_default();
            if !projected.is_empty() && join_cond.is_some() {
                let mut all: HashSet<String> = projected.into_iter().collect();
                all.extend(join_cols);
                let left = join.borrow().children[0].clone();
                let right = join.borrow().children[1].clone();
                let new_left = create_smart_project(&all, left, catalog);
                let new_right = create_smart_project(&all, right, catalog);
                let mut jb = join.borrow_mut();
                jb.children[0] = new_left.clone();
                jb.children[1] = new_right.clone();
                drop(jb);
                new_left.borrow_mut().parent = Some(std::rc::Rc::downgrade(&join));
                new_right.borrow_mut().parent = Some(std::rc::Rc::downgrade(&join));
            }
        }
    }

    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::{find_nodes_by_type, reset_ids_for_test};

    #[test]
    fn skipped_when_project_is_star() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM a INNER JOIN b ON a.x = b.y;").unwrap();
        let rewritten = apply(&root, &Catalog::new());
        let join = find_nodes_by_type(&rewritten, NodeType::Join)[0].clone();
        assert_eq!(join.borrow().children[0].borrow().node_type, NodeType::Relation);
    }

    #[test]
    fn pushes_projection_onto_join_sides() {
        reset_ids_for_test();
        let root = parse("SELECT x FROM a INNER JOIN b ON a.x = b.y;").unwrap();
        let rewritten = apply(&root, &Catalog::new());
        let join = find_nodes_by_type(&rewritten, NodeType::Join)[0].clone();
        assert_eq!(join.borrow().children[0].borrow().node_type, NodeType::Project);
    }
}

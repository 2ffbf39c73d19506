//! Rule 7 — filter push-down over JOIN (deterministic, applied once
//! pre-GA, not part of the GA's parameter registry).
//!
//! For a FILTER directly above a JOIN, partition its conjunctive
//! conditions by which side's tables they reference. Conditions touching
//! only one side move into a new FILTER on that side's child; conditions
//! touching both (or neither, unresolvably) remain above the JOIN.

use std::collections::HashSet;

use crate::query::tree::{clone_tree, NodeRef, NodeType, QueryTree};
use crate::storage::catalog::Catalog;

pub fn apply(root: &NodeRef, catalog: &Catalog) -> NodeRef {
    let cloned = clone_tree(root, true);
    rewrite(&cloned, catalog)
}

fn is_and(n: &NodeRef) -> bool {
    let b = n.borrow();
    b.node_type == NodeType::Operator && b.value == "AND"
}

fn flatten_conditions(cond: &NodeRef) -> Vec<NodeRef> {
    if is_and(cond) {
        cond.borrow().children.clone()
    } else {
        vec![cond.clone()]
    }
}

fn underlying_table_names(side: &NodeRef) -> HashSet<String> {
    let mut out = HashSet::new();
    crate::query::tree::traverse_preorder(side, &mut |n| {
        let b = n.borrow();
        if b.node_type == NodeType::Relation {
            out.insert(b.value.clone());
        }
        if b.node_type == NodeType::Alias {
            out.insert(b.value.clone());
        }
    });
    out
}

/// Tables a single condition references, resolving unqualified column
/// names against the catalog when exactly one side's table defines them.
fn condition_tables(cond: &NodeRef, left: &HashSet<String>, right: &HashSet<String>, catalog: &Catalog) -> (bool, bool) {
    let mut touches_left = false;
    let mut touches_right = false;
    crate::query::tree::traverse_preorder(cond, &mut |n| {
        let b = n.borrow();
        if b.node_type != NodeType::ColumnRef {
            return;
        }
        let table_child = b.children.iter().find(|c| c.borrow().node_type == NodeType::TableName);
        if let Some(t) = table_child {
            let name = t.borrow().value.clone();
            if left.contains(&name) {
                touches_left = true;
            }
            if right.contains(&name) {
                touches_right = true;
            }
        } else {
            let col_name = b.children.first().map(|c| c.borrow().value.clone()).unwrap_or_default();
            let mut candidates: Vec<String> = left.iter().cloned().collect();
            candidates.extend(right.iter().cloned());
            if let Some(resolved) = catalog.resolve_unqualified(&col_name, &candidates) {
                if left.contains(&resolved) {
                    touches_left = true;
                } else if right.contains(&resolved) {
                    touches_right = true;
                }
            } else {
                touches_left = true;
                touches_right = true;
            }
        }
    });
    (touches_left, touches_right)
}

fn wrap_filter(source: NodeRef, conditions: Vec<NodeRef>) -> NodeRef {
    if conditions.is_empty() {
        return source;
    }
    let cond_node = if conditions.len() == 1 {
        conditions.into_iter().next().unwrap()
    } else {
        let and_node = QueryTree::new(NodeType::Operator, "AND");
        for c in conditions {
            QueryTree::push_child(&and_node, c);
        }
        and_node
    };
    let filter = QueryTree::new(NodeType::Filter, "WHERE");
    QueryTree::push_child(&filter, source);
    QueryTree::push_child(&filter, cond_node);
    filter
}

fn rewrite(node: &NodeRef, catalog: &Catalog) -> NodeRef {
    let children: Vec<NodeRef> = node.borrow().children.clone();
    let rewritten_children: Vec<NodeRef> = children.iter().map(|c| rewrite(c, catalog)).collect();
    let (nt, val, id) = {
        let n = node.borrow();
        (n.node_type, n.value.clone(), n.id)
    };
    let rebuilt = QueryTree::new_with_id(id, nt, val);
    for c in &rewritten_children {
        QueryTree::push_child(&rebuilt, c.clone());
    }

    if nt == NodeType::Filter && rebuilt.borrow().children[0].borrow().node_type == NodeType::Join {
        let join = rebuilt.borrow().children[0].clone();
        let cond = rebuilt.borrow().children[1].clone();
        let left_side = join.borrow().children[0].clone();
        let right_side = join.borrow().children[1].clone();
        let left_names = underlying_table_names(&left_side);
        let right_names = underlying_table_names(&right_side);

        let mut left_conds = Vec::new();
        let mut right_conds = Vec::new();
        let mut remaining = Vec::new();
        for c in flatten_conditions(&cond) {
            let (touches_left, touches_right) = condition_tables(&c, &left_names, &right_names, catalog);
            match (touches_left, touches_right) {
                (true, false) => left_conds.push(c),
                (false, true) => right_conds.push(c),
                _ => remaining.push(c),
            }
        }

        if left_conds.is_empty() && right_conds.is_empty() {
            return rebuilt;
        }

        let new_left = wrap_filter(left_side, left_conds);
        let new_right = wrap_filter(right_side, right_conds);
        {
            let mut jb = join.borrow_mut();
            jb.children[0] = new_left.clone();
            jb.children[1] = new_right.clone();
        }
        new_left.borrow_mut().parent = Some(std::rc::Rc::downgrade(&join));
        new_right.borrow_mut().parent = Some(std::rc::Rc::downgrade(&join));

        if remaining.is_empty() {
            return join;
        }
        return wrap_filter(join, remaining);
    }

    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::{find_nodes_by_type, reset_ids_for_test};

    #[test]
    fn pushes_single_side_conditions_down() {
        reset_ids_for_test();
        let root = parse(
            "SELECT * FROM users INNER JOIN orders ON users.id = orders.user_id WHERE users.age > 18;",
        )
        .unwrap();
        let rewritten = apply(&root, &Catalog::new());
        let join = find_nodes_by_type(&rewritten, NodeType::Join)[0].clone();
        let left = join.borrow().children[0].clone();
        assert_eq!(left.borrow().node_type, NodeType::Filter);
        assert!(find_nodes_by_type(&rewritten, NodeType::Filter)
            .iter()
            .all(|f| f.borrow().children[0].borrow().node_type != NodeType::Join));
    }
}

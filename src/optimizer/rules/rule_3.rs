//! Rule 3 — projection elimination (deterministic, applied once pre-GA).
//!
//! When a PROJECT has a PROJECT child, collapse them: the outer
//! projection's column set wins, unless the outer is `*`, in which case
//! the inner's columns are inherited.

use crate::query::tree::{clone_tree, NodeRef, NodeType, QueryTree};

pub fn apply(root: &NodeRef) -> NodeRef {
    let cloned = clone_tree(root, true);
    collapse(&cloned)
}

fn collapse(node: &NodeRef) -> NodeRef {
    let children: Vec<NodeRef> = node.borrow().children.clone();
    let rebuilt_children: Vec<NodeRef> = children.iter().map(collapse).collect();

    let (nt, val, id) = {
        let n = node.borrow();
        (n.node_type, n.value.clone(), n.id)
    };

    if nt == NodeType::Project {
        if let Some(data_child) = rebuilt_children.last() {
            if data_child.borrow().node_type == NodeType::Project {
                let inner = data_child.clone();
                let outer_is_star = val == "*";
                let (final_cols, final_val, inner_data): (Vec<NodeRef>, String, NodeRef) = {
                    let inner_borrow = inner.borrow();
                    let inner_data = inner_borrow.children.last().unwrap().clone();
                    let inner_cols: Vec<NodeRef> = inner_borrow.children[..inner_borrow.children.len() - 1].to_vec();
                    if outer_is_star {
                        (inner_cols, inner_borrow.value.clone(), inner_data)
                    } else {
                        let outer_cols = rebuilt_children[..rebuilt_children.len() - 1].to_vec();
                        (outer_cols, val.clone(), inner_data)
                    }
                };
                let collapsed = QueryTree::new_with_id(id, NodeType::Project, final_val);
                for c in final_cols {
                    QueryTree::push_child(&collapsed, c);
                }
                QueryTree::push_child(&collapsed, inner_data);
                return collapsed;
            }
        }
    }

    let rebuilt = QueryTree::new_with_id(id, nt, val);
    for c in rebuilt_children {
        QueryTree::push_child(&rebuilt, c);
    }
    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tree::reset_ids_for_test;

    #[test]
    fn collapses_nested_star_projection() {
        reset_ids_for_test();
        let inner_rel = QueryTree::new(NodeType::Relation, "t");
        let inner_project = QueryTree::new(NodeType::Project, "name");
        QueryTree::push_child(&inner_project, QueryTree::new(NodeType::ColumnRef, "name"));
        QueryTree::push_child(&inner_project, inner_rel);
        let outer_project = QueryTree::new(NodeType::Project, "*");
        QueryTree::push_child(&outer_project, inner_project);

        let collapsed = apply(&outer_project);
        assert_eq!(collapsed.borrow().node_type, NodeType::Project);
        assert_eq!(collapsed.borrow().value, "name");
        assert!(collapsed.borrow().children.last().unwrap().borrow().node_type == NodeType::Relation);
    }
}

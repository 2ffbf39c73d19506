//! Rule 6 — join associativity (`join_associativity_params`).
//!
//! For a JOIN whose left child is also a JOIN (or, mirrored, whose right
//! child is also a JOIN), a three-valued parameter chooses `right`,
//! `left`, or `none`. A `right`/`left` rewrite that would reference tables
//! outside the new inner subtree is refused: the node is returned
//! unchanged, so refusing is always safe to request.

use rand::seq::SliceRandom;
use rand::RngCore;
use std::collections::{HashMap, HashSet};

use super::{AssocDirection, PatternId, PatternMetadata, Rule, RuleParams};
use crate::query::tree::{clone_tree, traverse_preorder, NodeRef, NodeType, QueryTree};

pub struct Rule6;

fn collect_tables(node: &NodeRef) -> HashSet<String> {
    let mut out = HashSet::new();
    traverse_preorder(node, &mut |n| {
        let b = n.borrow();
        if b.node_type == NodeType::Relation || b.node_type == NodeType::Alias {
            out.insert(b.value.clone());
        }
    });
    out
}

fn collect_tables_in_condition(cond: &NodeRef) -> HashSet<String> {
    let mut out = HashSet::new();
    traverse_preorder(cond, &mut |n| {
        let b = n.borrow();
        if b.node_type == NodeType::ColumnRef {
            for c in &b.children {
                if c.borrow().node_type == NodeType::TableName {
                    out.insert(c.borrow().value.clone());
                }
            }
        }
    });
    out
}

fn is_left_reassociable(join: &NodeRef) -> bool {
    join.borrow().children[0].borrow().node_type == NodeType::Join
}

fn is_right_reassociable(join: &NodeRef) -> bool {
    join.borrow().children.len() > 1 && join.borrow().children[1].borrow().node_type == NodeType::Join
}

/// `(A theta1 B) theta2 C` -> `A theta1 (B theta2 C)`.
fn reassociate_right(outer: &NodeRef) -> NodeRef {
    let left_join = outer.borrow().children[0].clone();
    let right_c = outer.borrow().children[1].clone();
    let theta2 = outer.borrow().children.get(2).cloned();

    let a = left_join.borrow().children[0].clone();
    let b = left_join.borrow().children[1].clone();
    let theta1 = left_join.borrow().children.get(2).cloned();

    if let Some(theta2) = &theta2 {
        let tables_bc: HashSet<String> = collect_tables(&b).union(&collect_tables(&right_c)).cloned().collect();
        let tables_theta2 = collect_tables_in_condition(theta2);
        if !tables_theta2.is_subset(&tables_bc) {
            return outer.clone();
        }
    }

    let outer_id = outer.borrow().id;
    let left_id = left_join.borrow().id;
    let outer_val = outer.borrow().value.clone();
    let left_val = left_join.borrow().value.clone();

    let new_inner = QueryTree::new_with_id(outer_id, NodeType::Join, outer_val);
    QueryTree::push_child(&new_inner, b);
    QueryTree::push_child(&new_inner, right_c);
    if let Some(t2) = theta2 {
        QueryTree::push_child(&new_inner, t2);
    }

    let new_outer = QueryTree::new_with_id(left_id, NodeType::Join, left_val);
    QueryTree::push_child(&new_outer, a);
    QueryTree::push_child(&new_outer, new_inner);
    if let Some(t1) = theta1 {
        QueryTree::push_child(&new_outer, t1);
    }
    new_outer
}

/// `A theta1 (B theta2 C)` -> `(A theta1 B) theta2 C`.
fn reassociate_left(outer: &NodeRef) -> NodeRef {
    let a = outer.borrow().children[0].clone();
    let right_join = outer.borrow().children[1].clone();
    let theta1 = outer.borrow().children.get(2).cloned();

    let b = right_join.borrow().children[0].clone();
    let c = right_join.borrow().children[1].clone();
    let theta2 = right_join.borrow().children.get(2).cloned();

    if let Some(theta1) = &theta1 {
        let tables_ab: HashSet<String> = collect_tables(&a).union(&collect_tables(&b)).cloned().collect();
        let tables_theta1 = collect_tables_in_condition(theta1);
        if !tables_theta1.is_subset(&tables_ab) {
            return outer.clone();
        }
    }

    let outer_id = outer.borrow().id;
    let right_id = right_join.borrow().id;
    let outer_val = outer.borrow().value.clone();
    let right_val = right_join.borrow().value.clone();

    let new_inner = QueryTree::new_with_id(outer_id, NodeType::Join, outer_val);
    QueryTree::push_child(&new_inner, a);
    QueryTree::push_child(&new_inner, b);
    if let Some(t1) = theta1 {
        QueryTree::push_child(&new_inner, t1);
    }

    let new_outer = QueryTree::new_with_id(right_id, NodeType::Join, right_val);
    QueryTree::push_child(&new_outer, new_inner);
    QueryTree::push_child(&new_outer, c);
    if let Some(t2) = theta2 {
        QueryTree::push_child(&new_outer, t2);
    }
    new_outer
}

impl Rule for Rule6 {
    fn operation_name(&self) -> &'static str {
        "join_associativity_params"
    }

    fn analyze(&self, root: &NodeRef) -> Vec<(PatternId, PatternMetadata)> {
        let mut out = Vec::new();
        traverse_preorder(root, &mut |n| {
            if n.borrow().node_type == NodeType::Join && (is_left_reassociable(n) || is_right_reassociable(n)) {
                out.push((PatternId::NodeId(n.borrow().id), PatternMetadata::Reassociable));
            }
        });
        out
    }

    fn generate(&self, _metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams {
        let options = [AssocDirection::Left, AssocDirection::Right, AssocDirection::None];
        RuleParams::JoinAssociativity(*options.choose(rng).unwrap())
    }

    fn mutate(&self, params: &RuleParams, _metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams {
        let RuleParams::JoinAssociativity(current) = params else { return params.clone() };
        let all = [AssocDirection::Left, AssocDirection::Right, AssocDirection::None];
        let remaining: Vec<AssocDirection> = all.into_iter().filter(|d| d != current).collect();
        RuleParams::JoinAssociativity(*remaining.choose(rng).unwrap())
    }

    fn apply(&self, root: &NodeRef, params: &HashMap<PatternId, RuleParams>) -> NodeRef {
        let cloned = clone_tree(root, true);
        rewrite_once(&cloned, params)
    }
}

fn rewrite_once(node: &NodeRef, params: &HashMap<PatternId, RuleParams>) -> NodeRef {
    let children: Vec<NodeRef> = node.borrow().children.clone();
    let rewritten_children: Vec<NodeRef> = children.iter().map(|c| rewrite_once(c, params)).collect();

    let (nt, val, id) = {
        let n = node.borrow();
        (n.node_type, n.value.clone(), n.id)
    };
    let rebuilt = QueryTree::new_with_id(id, nt, val);
    for c in rewritten_children {
        QueryTree::push_child(&rebuilt, c);
    }

    if nt == NodeType::Join {
        let direction = match params.get(&PatternId::NodeId(id)) {
            Some(RuleParams::JoinAssociativity(d)) => *d,
            _ => AssocDirection::Right,
        };
        match direction {
            AssocDirection::Right if is_left_reassociable(&rebuilt) => return reassociate_right(&rebuilt),
            AssocDirection::Left if is_right_reassociable(&rebuilt) => return reassociate_left(&rebuilt),
            _ => {}
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
    fn refuses_rewrite_when_condition_escapes_subtree() {
        reset_ids_for_test();
        let root = parse(
            "SELECT * FROM a INNER JOIN b ON a.x = b.y INNER JOIN c ON a.z = c.w;",
        )
        .unwrap();
        let outer_join = find_nodes_by_type(&root, NodeType::Join)
            .into_iter()
            .find(|j| is_left_reassociable(j))
            .expect("reassociable join");
        let before_id_set: std::collections::HashSet<u64> =
            find_nodes_by_type(&root, NodeType::Join).iter().map(|j| j.borrow().id).collect();
        let mut map = HashMap::new();
        map.insert(PatternId::NodeId(outer_join.borrow().id), RuleParams::JoinAssociativity(AssocDirection::Right));
        let rewritten = Rule6.apply(&root, &map);
        let after_id_set: std::collections::HashSet<u64> =
            find_nodes_by_type(&rewritten, NodeType::Join).iter().map(|j| j.borrow().id).collect();
        assert_eq!(before_id_set, after_id_set);
    }
}

//! Rule 4 — merge a FILTER's conditions into an underlying JOIN's
//! condition child (`join_params`).
//!
//! Pattern: a FILTER whose data descendant, possibly through intermediate
//! FILTERs, is a JOIN. The parameter per JOIN id is a subset of candidate
//! condition ids drawn from the FILTER chain above it. Moving the first
//! condition into a CROSS join flips its value to INNER.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::{BTreeSet, HashMap};

use super::{PatternId, PatternMetadata, Rule, RuleParams};
use crate::query::tree::{clone_tree, traverse_preorder, NodeRef, NodeType, QueryTree};

pub struct Rule4;

fn is_and(n: &NodeRef) -> bool {
    let b = n.borrow();
    b.node_type == NodeType::Operator && b.value == "AND"
}

fn collect_ids_flatten_and(cond: &NodeRef, out: &mut Vec<u64>) {
    if is_and(cond) {
        for c in &cond.borrow().children {
            out.push(c.borrow().id);
        }
    } else {
        out.push(cond.borrow().id);
    }
}

fn is_chain_interior(n: &NodeRef) -> bool {
    let parent = n.borrow().parent_node();
    match parent {
        Some(p) if p.borrow().node_type == NodeType::Filter => {
            std::rc::Rc::ptr_eq(&p.borrow().children[0], n)
        }
        _ => false,
    }
}

/// Walks a FILTER chain downward, flattening every condition, until it
/// bottoms out. Returns the underlying JOIN and the flattened condition
/// ids if the chain sits directly above one.
fn walk_chain(top_filter: &NodeRef) -> Option<(NodeRef, Vec<u64>)> {
    let mut conds = Vec::new();
    let mut cursor = top_filter.clone();
    loop {
        let (data, cond) = {
            let c = cursor.borrow();
            (c.children[0].clone(), c.children[1].clone())
        };
        collect_ids_flatten_and(&cond, &mut conds);
        let data_type = data.borrow().node_type;
        if data_type == NodeType::Filter {
            cursor = data;
        } else if data_type == NodeType::Join {
            return Some((data, conds));
        } else {
            return None;
        }
    }
}

#[allow(dead_code)]
fn existing_join_condition_ids(join: &NodeRef) -> Vec<u64> {
    let b = join.borrow();
    if b.children.len() == 3 {
        let mut out = Vec::new();
        collect_ids_flatten_and(&b.children[2], &mut out);
        out
    } else {
        Vec::new()
    }
}

impl Rule for Rule4 {
    fn operation_name(&self) -> &'static str {
        "join_params"
    }

    fn analyze(&self, root: &NodeRef) -> Vec<(PatternId, PatternMetadata)> {
        let mut out = Vec::new();
        traverse_preorder(root, &mut |n| {
            if n.borrow().node_type == NodeType::Filter && !is_chain_interior(n) {
                if let Some((join, conds)) = walk_chain(n) {
                    out.push((PatternId::NodeId(join.borrow().id), PatternMetadata::JoinMergeCandidates(conds)));
                }
            }
        });
        out
    }

    fn generate(&self, metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams {
        let candidates = match metadata {
            PatternMetadata::JoinMergeCandidates(ids) => ids.clone(),
            _ => Vec::new(),
        };
        let mut chosen = Vec::new();
        for id in candidates {
            if rng.gen_bool(0.5) {
                chosen.push(id);
            }
        }
        RuleParams::JoinConditionSubset(chosen)
    }

    fn mutate(&self, params: &RuleParams, metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams {
        let RuleParams::JoinConditionSubset(subset) = params else { return params.clone() };
        let candidates = match metadata {
            PatternMetadata::JoinMergeCandidates(ids) => ids.clone(),
            _ => Vec::new(),
        };
        let mut subset = subset.clone();
        if !subset.is_empty() && rng.gen_bool(0.5) {
            let idx = rng.gen_range(0..subset.len());
            subset.remove(idx);
        } else {
            let remaining: Vec<u64> = candidates.into_iter().filter(|c| !subset.contains(c)).collect();
            if let Some(pick) = remaining.choose(rng) {
                subset.push(*pick);
            }
        }
        RuleParams::JoinConditionSubset(subset)
    }

    fn apply(&self, root: &NodeRef, params: &HashMap<PatternId, RuleParams>) -> NodeRef {
        let cloned = clone_tree(root, true);
        rewrite(&cloned, params);
        cloned
    }
}

fn rewrite(node: &NodeRef, params: &HashMap<PatternId, RuleParams>) {
    let children: Vec<NodeRef> = node.borrow().children.clone();
    for c in &children {
        rewrite(c, params);
    }
    if node.borrow().node_type == NodeType::Filter && !is_chain_interior(node) {
        if let Some((join, _all_conds)) = walk_chain(node) {
            let join_id = join.borrow().id;
            if let Some(RuleParams::JoinConditionSubset(subset)) = params.get(&PatternId::NodeId(join_id)) {
                if !subset.is_empty() {
                    merge_into_join(node, &join, subset);
                }
            }
        }
    }
}

/// Detaches each selected condition id from the FILTER chain rooted at
/// `top_filter` and splices it into `join`'s condition child, then wires
/// `top_filter`'s parent to whatever remains of the chain (or directly to
/// the join if every condition was merged away).
fn merge_into_join(top_filter: &NodeRef, join: &NodeRef, selected: &[u64]) {
    let selected_set: BTreeSet<u64> = selected.iter().copied().collect();
    let mut remaining_by_level: Vec<(NodeRef, Vec<NodeRef>)> = Vec::new();
    let mut merged_conditions = Vec::new();

    let mut cursor = top_filter.clone();
    let final_data_source;
    loop {
        let (data, cond) = {
            let c = cursor.borrow();
            (c.children[0].clone(), c.children[1].clone())
        };
        let mut local_conds = Vec::new();
        if is_and(&cond) {
            for c in &cond.borrow().children {
                local_conds.push(c.clone());
            }
        } else {
            local_conds.push(cond.clone());
        }
        let mut keep_here = Vec::new();
        for c in local_conds {
            if selected_set.contains(&c.borrow().id) {
                merged_conditions.push(c);
            } else {
                keep_here.push(c);
            }
        }
        remaining_by_level.push((cursor.clone(), keep_here));
        if data.borrow().node_type == NodeType::Filter {
            cursor = data;
        } else {
            final_data_source = data;
            break;
        }
    }

    let existing_join_cond = if join.borrow().children.len() == 3 {
        Some(join.borrow().children[2].clone())
    } else {
        None
    };
    let mut new_join_conds = Vec::new();
    if let Some(existing) = &existing_join_cond {
        if is_and(existing) {
            new_join_conds.extend(existing.borrow().children.iter().cloned());
        } else {
            new_join_conds.push(existing.clone());
        }
    }
    new_join_conds.extend(merged_conditions);

    let new_cond_node = if new_join_conds.len() == 1 {
        new_join_conds.pop().unwrap()
    } else {
        let and_node = QueryTree::new(NodeType::Operator, "AND");
        for c in new_join_conds {
            QueryTree::push_child(&and_node, c);
        }
        and_node
    };

    {
        let mut jb = join.borrow_mut();
        if jb.children.len() == 3 {
            jb.children[2] = new_cond_node.clone();
        } else {
            jb.children.push(new_cond_node.clone());
        }
        if jb.value == "CROSS" {
            jb.value = "INNER".to_string();
        }
    }
    new_cond_node.borrow_mut().parent = Some(std::rc::Rc::downgrade(join));

    let mut current = final_data_source;
    for (filter_node, keep) in remaining_by_level.into_iter().rev() {
        if keep.is_empty() {
            continue;
        }
        let new_cond = if keep.len() == 1 {
            keep.into_iter().next().unwrap()
        } else {
            let and_node = QueryTree::new(NodeType::Operator, "AND");
            for c in keep {
                QueryTree::push_child(&and_node, c);
            }
            and_node
        };
        let mut fb = filter_node.borrow_mut();
        fb.children = vec![current.clone(), new_cond.clone()];
        drop(fb);
        current.borrow_mut().parent = Some(std::rc::Rc::downgrade(&filter_node));
        new_cond.borrow_mut().parent = Some(std::rc::Rc::downgrade(&filter_node));
        current = filter_node;
    }

    crate::query::tree::replace_child(top_filter, &current);
}

/// The full set of condition ids merged away across every JOIN's params,
/// used by the genetic optimizer to rewrite `filter_params` afterward
/// (§4.4.3's post-merge filter_params adjustment).
pub fn merged_condition_ids(params: &HashMap<PatternId, RuleParams>) -> BTreeSet<u64> {
    let mut out = BTreeSet::new();
    for v in params.values() {
        if let RuleParams::JoinConditionSubset(ids) = v {
            out.extend(ids.iter().copied());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::reset_ids_for_test;

    #[test]
    fn merges_condition_into_cross_join_and_flips_value() {
        reset_ids_for_test();
        let root = parse(
            "SELECT * FROM users, orders WHERE users.id = orders.user_id;",
        )
        .unwrap();
        let rule = Rule4;
        let patterns = rule.analyze(&root);
        assert_eq!(patterns.len(), 1);
        let (PatternId::NodeId(join_id), PatternMetadata::JoinMergeCandidates(ids)) = &patterns[0] else {
            panic!()
        };
        let mut map = HashMap::new();
        map.insert(PatternId::NodeId(*join_id), RuleParams::JoinConditionSubset(ids.clone()));
        let rewritten = rule.apply(&root, &map);
        let joins = crate::query::tree::find_nodes_by_type(&rewritten, NodeType::Join);
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].borrow().value, "INNER");
        assert_eq!(joins[0].borrow().children.len(), 3);
    }
}

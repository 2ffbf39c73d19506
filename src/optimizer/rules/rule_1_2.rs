//! Rule 1 & 2 — selection cascading and commutativity, unified as a single
//! signature-keyed `filter_params` operation.
//!
//! A *signature* is the frozen set of condition-node ids occurring under a
//! maximal contiguous chain of FILTER nodes above one data source. `apply`
//! first collapses every such chain into one FILTER over an n-ary
//! OPERATOR("AND") (the *aggressive uncascade*), then rebuilds a FILTER
//! cascade per signature following the parameter's mixed order list.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::{BTreeSet, HashMap};

use super::{OrderItem, PatternId, PatternMetadata, Rule, RuleParams};
use crate::query::tree::{clone_tree, NodeRef, NodeType, QueryTree};

pub struct Rule1And2;

/// Collapses every maximal contiguous chain of FILTER nodes into a single
/// FILTER whose condition child is an n-ary OPERATOR("AND") (or the lone
/// condition if the chain had only one). Recurses into the resulting data
/// subtree and into every other node's children, so filters nested inside
/// JOIN sides or subqueries are uncascaded too.
pub fn uncascade(node: &NodeRef) -> NodeRef {
    let node_type = node.borrow().node_type;
    if node_type == NodeType::Filter {
        let mut conditions = Vec::new();
        let mut cursor = node.clone();
        loop {
            let (data_child, cond_child) = {
                let c = cursor.borrow();
                (c.children[0].clone(), c.children[1].clone())
            };
            collect_conditions(&cond_child, &mut conditions);
            if data_child.borrow().node_type == NodeType::Filter {
                cursor = data_child;
            } else {
                let uncascaded_data = uncascade(&data_child);
                let new_filter = QueryTree::new(NodeType::Filter, "WHERE");
                let cond_node = if conditions.len() == 1 {
                    conditions.pop().unwrap()
                } else {
                    let and_node = QueryTree::new(NodeType::Operator, "AND");
                    for c in conditions {
                        QueryTree::push_child(&and_node, c);
                    }
                    and_node
                };
                QueryTree::push_child(&new_filter, uncascaded_data);
                QueryTree::push_child(&new_filter, cond_node);
                return new_filter;
            }
        }
    }

    let children: Vec<NodeRef> = node.borrow().children.clone();
    if children.is_empty() {
        return node.clone();
    }
    let (nt, val) = {
        let n = node.borrow();
        (n.node_type, n.value.clone())
    };
    let rebuilt = QueryTree::new(nt, val);
    for c in children {
        QueryTree::push_child(&rebuilt, uncascade(&c));
    }
    rebuilt
}

fn collect_conditions(cond_node: &NodeRef, out: &mut Vec<NodeRef>) {
    let is_and = {
        let n = cond_node.borrow();
        n.node_type == NodeType::Operator && n.value == "AND"
    };
    if is_and {
        for c in &cond_node.borrow().children {
            out.push(c.clone());
        }
    } else {
        out.push(cond_node.clone());
    }
}

fn signature_of(cond_node: &NodeRef) -> (BTreeSet<u64>, Vec<u64>) {
    let mut ids = Vec::new();
    collect_condition_ids(cond_node, &mut ids);
    (ids.iter().copied().collect(), ids)
}

fn collect_condition_ids(cond_node: &NodeRef, out: &mut Vec<u64>) {
    let is_and = {
        let n = cond_node.borrow();
        n.node_type == NodeType::Operator && n.value == "AND"
    };
    if is_and {
        for c in &cond_node.borrow().children {
            out.push(c.borrow().id);
        }
    } else {
        out.push(cond_node.borrow().id);
    }
}

impl Rule for Rule1And2 {
    fn operation_name(&self) -> &'static str {
        "filter_params"
    }

    fn analyze(&self, root: &NodeRef) -> Vec<(PatternId, PatternMetadata)> {
        let uncascaded = uncascade(root);
        let mut out = Vec::new();
        crate::query::tree::traverse_preorder(&uncascaded, &mut |n| {
            if n.borrow().node_type == NodeType::Filter {
                let cond = n.borrow().children[1].clone();
                let (sig, _) = signature_of(&cond);
                out.push((PatternId::Signature(sig.clone()), PatternMetadata::ConditionSignature(sig)));
            }
        });
        out
    }

    fn generate(&self, metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams {
        let ids = match metadata {
            PatternMetadata::ConditionSignature(s) => s.iter().copied().collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        RuleParams::FilterOrder(random_order(ids, rng))
    }

    fn mutate(&self, params: &RuleParams, metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams {
        let RuleParams::FilterOrder(order) = params else { return params.clone() };
        let _ = metadata;
        let mut order = order.clone();
        if order.is_empty() {
            return RuleParams::FilterOrder(order);
        }
        match rng.gen_range(0..4) {
            0 if order.len() >= 2 => {
                let i = rng.gen_range(0..order.len());
                let j = rng.gen_range(0..order.len());
                order.swap(i, j);
            }
            1 => {
                let singles: Vec<usize> =
                    order.iter().enumerate().filter(|(_, it)| matches!(it, OrderItem::Single(_))).map(|(i, _)| i).collect();
                if singles.len() >= 2 {
                    let a = singles[0];
                    let b = singles[1];
                    let (ia, ib) = if let (OrderItem::Single(x), OrderItem::Single(y)) = (&order[a], &order[b]) {
                        (*x, *y)
                    } else {
                        unreachable!()
                    };
                    let mut keep = Vec::new();
                    for (idx, item) in order.into_iter().enumerate() {
                        if idx != a && idx != b {
                            keep.push(item);
                        }
                    }
                    keep.push(OrderItem::Group(vec![ia, ib]));
                    order = keep;
                }
            }
            2 => {
                let groups: Vec<usize> =
                    order.iter().enumerate().filter(|(_, it)| matches!(it, OrderItem::Group(g) if g.len() > 1)).map(|(i, _)| i).collect();
                if let Some(&gi) = groups.first() {
                    if let OrderItem::Group(ids) = order.remove(gi) {
                        for id in ids {
                            order.push(OrderItem::Single(id));
                        }
                    }
                }
            }
            _ => {
                let groups: Vec<usize> =
                    order.iter().enumerate().filter(|(_, it)| matches!(it, OrderItem::Group(g) if g.len() > 2)).map(|(i, _)| i).collect();
                if let Some(&gi) = groups.first() {
                    if let OrderItem::Group(ids) = order.remove(gi) {
                        let mid = ids.len() / 2;
                        let (left, right) = ids.split_at(mid);
                        order.push(OrderItem::Group(left.to_vec()));
                        order.push(OrderItem::Group(right.to_vec()));
                    }
                }
            }
        }
        RuleParams::FilterOrder(order)
    }

    fn apply(&self, root: &NodeRef, params: &HashMap<PatternId, RuleParams>) -> NodeRef {
        let cloned = clone_tree(root, true);
        let uncascaded = uncascade(&cloned);
        rebuild(&uncascaded, params)
    }
}

fn rebuild(node: &NodeRef, params: &HashMap<PatternId, RuleParams>) -> NodeRef {
    if node.borrow().node_type == NodeType::Filter {
        let (data_child, cond_child) = {
            let n = node.borrow();
            (n.children[0].clone(), n.children[1].clone())
        };
        let rebuilt_data = rebuild(&data_child, params);
        let (sig, ids_in_order) = signature_of(&cond_child);
        let id_map = build_id_map(&cond_child);

        let order = match params.get(&PatternId::Signature(sig)) {
            Some(RuleParams::FilterOrder(order)) => order.clone(),
            _ => vec![OrderItem::Group(ids_in_order)],
        };

        let mut current = rebuilt_data;
        for item in order.iter().rev() {
            let filter = QueryTree::new(NodeType::Filter, "WHERE");
            let cond_node = match item {
                OrderItem::Single(id) => id_map.get(id).cloned().expect("condition id present"),
                OrderItem::Group(ids) if ids.len() == 1 => id_map.get(&ids[0]).cloned().expect("condition id present"),
                OrderItem::Group(ids) => {
                    let and_node = QueryTree::new(NodeType::Operator, "AND");
                    for id in ids {
                        if let Some(c) = id_map.get(id) {
                            QueryTree::push_child(&and_node, c.clone());
                        }
                    }
                    and_node
                }
            };
            QueryTree::push_child(&filter, current);
            QueryTree::push_child(&filter, cond_node);
            current = filter;
        }
        return current;
    }

    let children: Vec<NodeRef> = node.borrow().children.clone();
    if children.is_empty() {
        return node.clone();
    }
    let (nt, val, id) = {
        let n = node.borrow();
        (n.node_type, n.value.clone(), n.id)
    };
    let rebuilt = QueryTree::new_with_id(id, nt, val);
    for c in children {
        QueryTree::push_child(&rebuilt, rebuild(&c, params));
    }
    rebuilt
}

fn build_id_map(cond_node: &NodeRef) -> HashMap<u64, NodeRef> {
    let mut map = HashMap::new();
    let is_and = {
        let n = cond_node.borrow();
        n.node_type == NodeType::Operator && n.value == "AND"
    };
    if is_and {
        for c in &cond_node.borrow().children {
            map.insert(c.borrow().id, c.clone());
        }
    } else {
        map.insert(cond_node.borrow().id, cond_node.clone());
    }
    map
}

fn random_order(mut ids: Vec<u64>, rng: &mut dyn RngCore) -> Vec<OrderItem> {
    ids.shuffle(rng);
    let mut out = Vec::new();
    let mut i = 0;
    while i < ids.len() {
        if i + 1 < ids.len() && rng.gen_bool(0.3) {
            out.push(OrderItem::Group(vec![ids[i], ids[i + 1]]));
            i += 2;
        } else {
            out.push(OrderItem::Single(ids[i]));
            i += 1;
        }
    }
    out
}

/// Removes merged condition ids (Rule 4 moved them into a JOIN) from a
/// filter_params order list: singles referencing a merged id are dropped,
/// groups shrink, and groups left empty are elided entirely.
pub fn adjust_filter_params(order: &[OrderItem], merged_ids: &BTreeSet<u64>) -> Vec<OrderItem> {
    let mut out = Vec::new();
    for item in order {
        match item {
            OrderItem::Single(id) => {
                if !merged_ids.contains(id) {
                    out.push(item.clone());
                }
            }
            OrderItem::Group(ids) => {
                let remaining: Vec<u64> = ids.iter().copied().filter(|i| !merged_ids.contains(i)).collect();
                if remaining.len() == 1 {
                    out.push(OrderItem::Single(remaining[0]));
                } else if !remaining.is_empty() {
                    out.push(OrderItem::Group(remaining));
                }
            }
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
    fn signature_preserved_across_random_order() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM t WHERE a > 1 AND b = 2 AND c < 3;").unwrap();
        let rule = Rule1And2;
        let patterns = rule.analyze(&root);
        assert_eq!(patterns.len(), 1);
        let (PatternId::Signature(sig), PatternMetadata::ConditionSignature(sig2)) = &patterns[0] else {
            panic!("expected signature pattern")
        };
        assert_eq!(sig, sig2);
        let mut rng = rand::thread_rng();
        let RuleParams::FilterOrder(order) = rule.generate(&patterns[0].1, &mut rng) else { panic!() };
        let mut flattened = BTreeSet::new();
        for item in &order {
            match item {
                OrderItem::Single(id) => {
                    flattened.insert(*id);
                }
                OrderItem::Group(ids) => flattened.extend(ids.iter().copied()),
            }
        }
        assert_eq!(&flattened, sig);
    }
}

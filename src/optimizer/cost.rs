//! Structural cost estimator. A direct port of the converged Python
//! `get_cost` formula: base 100, plus 40 per FILTER, 30 per OPERATOR/
//! OPERATOR_S, 150 per JOIN. Total, deterministic, non-negative.

use crate::query::tree::{traverse_preorder, NodeRef, NodeType};

pub fn cost(root: &NodeRef) -> u64 {
    let mut filter_count = 0u64;
    let mut operator_count = 0u64;
    let mut join_count = 0u64;
    traverse_preorder(root, &mut |n| match n.borrow().node_type {
        NodeType::Filter => filter_count += 1,
        NodeType::Operator | NodeType::OperatorS => operator_count += 1,
        NodeType::Join => join_count += 1,
        _ => {}
    });
    100 + filter_count * 40 + operator_count * 30 + join_count * 150
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::reset_ids_for_test;

    #[test]
    fn base_cost_for_relation_only() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM t;").unwrap();
        assert_eq!(cost(&root), 100);
    }

    #[test]
    fn cost_increases_with_filter_and_join() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM a INNER JOIN b ON a.x = b.y WHERE a.z > 1;").unwrap();
        assert_eq!(cost(&root), 100 + 40 + 150);
    }
}

//! Rule 5 — join commutativity (`join_child_params`).
//!
//! Per JOIN id, a boolean parameter decides whether to swap the two data
//! children. Column references carry their table qualifiers, so the join
//! condition itself never needs rewriting.

use rand::{Rng, RngCore};
use std::collections::HashMap;

use super::{PatternId, PatternMetadata, Rule, RuleParams};
use crate::query::tree::{clone_tree, traverse_preorder, NodeRef, NodeType};

pub struct Rule5;

impl Rule for Rule5 {
    fn operation_name(&self) -> &'static str {
        "join_child_params"
    }

    fn analyze(&self, root: &NodeRef) -> Vec<(PatternId, PatternMetadata)> {
        let mut out = Vec::new();
        traverse_preorder(root, &mut |n| {
            if n.borrow().node_type == NodeType::Join {
                out.push((PatternId::NodeId(n.borrow().id), PatternMetadata::JoinChildren));
            }
        });
        out
    }

    fn generate(&self, _metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams {
        RuleParams::JoinChildSwap(rng.gen_bool(0.5))
    }

    fn mutate(&self, params: &RuleParams, _metadata: &PatternMetadata, _rng: &mut dyn RngCore) -> RuleParams {
        let RuleParams::JoinChildSwap(swap) = params else { return params.clone() };
        RuleParams::JoinChildSwap(!swap)
    }

    fn apply(&self, root: &NodeRef, params: &HashMap<PatternId, RuleParams>) -> NodeRef {
        let cloned = clone_tree(root, true);
        traverse_preorder(&cloned, &mut |n| {
            if n.borrow().node_type == NodeType::Join {
                let n_id = n.borrow().id;
                if let Some(RuleParams::JoinChildSwap(true)) = params.get(&PatternId::NodeId(n_id)) {
                    let mut b = n.borrow_mut();
                    b.children.swap(0, 1);
                }
            }
        });
        cloned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::reset_ids_for_test;

    #[test]
    fn swap_exchanges_join_children() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM a INNER JOIN b ON a.x = b.y;").unwrap();
        let join = crate::query::tree::find_nodes_by_type(&root, NodeType::Join)[0].clone();
        let left_before = join.borrow().children[0].borrow().value.clone();
        let mut map = HashMap::new();
        map.insert(PatternId::NodeId(join.borrow().id), RuleParams::JoinChildSwap(true));
        let rewritten = Rule5.apply(&root, &map);
        let join2 = crate::query::tree::find_nodes_by_type(&rewritten, NodeType::Join)[0].clone();
        assert_ne!(join2.borrow().children[0].borrow().value, left_before);
    }
}

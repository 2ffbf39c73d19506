//! The four-operation rule contract shared by every transformation rule:
//! `analyze` discovers rewrite opportunities, `generate`/`copy`/`mutate`
//! manipulate a rule's parameter space, and `apply` performs the
//! equivalence-preserving rewrite.

pub mod rule_1_2;
pub mod rule_3;
pub mod rule_4;
pub mod rule_5;
pub mod rule_6;
pub mod rule_7;
pub mod rule_8;

use rand::RngCore;
use std::collections::BTreeSet;

use crate::query::tree::NodeRef;

/// A stable key identifying a rule-applicable pattern: either a single node
/// id, or a signature (the frozen set of condition ids under one
/// contiguous FILTER chain, used by Rule 1/2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternId {
    NodeId(u64),
    Signature(BTreeSet<u64>),
}

/// An element of Rule 1/2's mixed-order parameter: a lone condition id
/// cascades as its own FILTER, a group stays together under one AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderItem {
    Single(u64),
    Group(Vec<u64>),
}

/// The three-way decision for Rule 6 (join associativity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocDirection {
    Left,
    Right,
    None,
}

/// Per-operation parameter value. One rule operation ("filter_params",
/// "join_params", "join_child_params", "join_associativity_params") owns
/// exactly one variant; callers match on the operation name, not the
/// variant, to route generically through the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleParams {
    FilterOrder(Vec<OrderItem>),
    JoinConditionSubset(Vec<u64>),
    JoinChildSwap(bool),
    JoinAssociativity(AssocDirection),
}

/// Per-pattern metadata returned by `analyze`, consumed by `generate`.
#[derive(Debug, Clone)]
pub enum PatternMetadata {
    ConditionSignature(BTreeSet<u64>),
    JoinMergeCandidates(Vec<u64>),
    JoinChildren,
    Reassociable,
}

pub trait Rule {
    fn operation_name(&self) -> &'static str;

    fn analyze(&self, root: &NodeRef) -> Vec<(PatternId, PatternMetadata)>;

    fn generate(&self, metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams;

    fn copy_params(&self, params: &RuleParams) -> RuleParams {
        params.clone()
    }

    fn mutate(&self, params: &RuleParams, metadata: &PatternMetadata, rng: &mut dyn RngCore) -> RuleParams;

    /// Rewrites `root` given a parameter value per pattern id. Returns a
    /// fresh tree (preserve-id clone internally, then mutated) so the
    /// caller's original `root` is left untouched.
    fn apply(&self, root: &NodeRef, params: &std::collections::HashMap<PatternId, RuleParams>) -> NodeRef;
}

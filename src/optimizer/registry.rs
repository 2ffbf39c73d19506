//! Rule-parameter manager: registry mapping operation names to rule
//! handlers. Mirrors the teacher's `RuleManager` (a `Vec<Box<dyn Rule>>`
//! consulted by name) but keyed by the GA's four tunable operations.

use std::collections::HashMap;

use super::rules::rule_1_2::Rule1And2;
use super::rules::rule_4::Rule4;
use super::rules::rule_5::Rule5;
use super::rules::rule_6::Rule6;
use super::rules::Rule;

pub struct RuleRegistry {
    rules: HashMap<&'static str, Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        let mut rules: HashMap<&'static str, Box<dyn Rule>> = HashMap::new();
        rules.insert("filter_params", Box::new(Rule1And2));
        rules.insert("join_params", Box::new(Rule4));
        rules.insert("join_child_params", Box::new(Rule5));
        rules.insert("join_associativity_params", Box::new(Rule6));
        Self { rules }
    }

    pub fn get(&self, operation: &str) -> &dyn Rule {
        self.rules.get(operation).expect("unknown operation").as_ref()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        vec!["filter_params", "join_params", "join_child_params", "join_associativity_params"]
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

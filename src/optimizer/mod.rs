//! Query optimizer: deterministic rewrites (3, 7, 8) applied once, then a
//! genetic search over the GA-tunable operations (1/2, 4, 5, 6).

pub mod cost;
pub mod genetic;
pub mod registry;
pub mod rules;

use crate::config::OptimizerConfig;
use crate::query::tree::NodeRef;
use crate::storage::catalog::Catalog;
use genetic::{GenerationRecord, GeneticOptimizer};
use registry::RuleRegistry;

/// Applies the deterministic, non-GA rules once: projection elimination
/// (3), filter push-down (7), projection push-down (8).
pub fn deterministic_pass(root: &NodeRef, catalog: &Catalog) -> NodeRef {
    let after_3 = rules::rule_3::apply(root);
    let after_7 = rules::rule_7::apply(&after_3, catalog);
    rules::rule_8::apply(&after_7, catalog)
}

pub struct OptimizationResult {
    pub plan: NodeRef,
    pub history: Vec<GenerationRecord>,
}

/// Runs the full optimization pipeline: the deterministic pass, then the
/// genetic search over the remaining rules.
pub fn optimize(root: &NodeRef, catalog: &Catalog, config: &OptimizerConfig) -> OptimizationResult {
    let base = deterministic_pass(root, catalog);
    let registry = RuleRegistry::new();
    let mut ga = GeneticOptimizer::new(config.population_size, config.generations, config.mutation_rate, config.elitism, config.rng_seed);
    let (plan, history) = ga.optimize(&base, &registry);
    OptimizationResult { plan, history }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::reset_ids_for_test;

    #[test]
    fn optimize_never_increases_cost_versus_base_plan() {
        reset_ids_for_test();
        let root = parse(
            "SELECT a.x FROM a INNER JOIN b ON a.id = b.a_id WHERE a.y > 1 AND b.z < 2;",
        )
        .unwrap();
        let catalog = Catalog::new();
        let base_cost = cost::cost(&deterministic_pass(&root, &catalog));
        let mut config = OptimizerConfig::default();
        config.population_size = 10;
        config.generations = 4;
        let result = optimize(&root, &catalog, &config);
        let optimized_cost = cost::cost(&result.plan);
        assert!(optimized_cost <= base_cost);
    }
}

//! Genetic optimizer: builds a population of `Individual`s, each owning a
//! per-operation parameter map; breeds via crossover + mutation with
//! elitism; fitness is the cost of the individual's rewritten plan.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use super::cost::cost;
use super::registry::RuleRegistry;
use super::rules::rule_1_2::adjust_filter_params;
use super::rules::rule_4::merged_condition_ids;
use super::rules::{OrderItem, PatternId, PatternMetadata, RuleParams};
use crate::query::tree::NodeRef;

pub type OperationParams = HashMap<&'static str, HashMap<PatternId, RuleParams>>;

/// One candidate plan, identified by its per-operation parameter map. The
/// rewritten plan is a pure function of `(base_query, operation_params)`;
/// it's cached lazily and invalidated on mutation, since deep-cloning
/// plans dominates the GA's cost.
#[derive(Clone)]
pub struct Individual {
    pub operation_params: OperationParams,
    base_query: NodeRef,
    cached_plan: RefCell<Option<NodeRef>>,
    cached_fitness: RefCell<Option<u64>>,
    pub genealogy: Vec<String>,
}

fn order_contains(order: &[OrderItem], id: u64) -> bool {
    order.iter().any(|item| match item {
        OrderItem::Single(x) => *x == id,
        OrderItem::Group(xs) => xs.contains(&id),
    })
}

/// Ensures every join-targeted condition id is present in `filter_params`
/// before Rule 1/2 runs, so Rule 4 can still find it inside the rebuilt
/// FILTER cascade.
fn inject_join_params_into_filter(
    filter_params: &HashMap<PatternId, RuleParams>,
    join_params: &HashMap<PatternId, RuleParams>,
) -> HashMap<PatternId, RuleParams> {
    let mut out = filter_params.clone();
    let referenced = merged_condition_ids(join_params);
    for id in referenced {
        let present = out.values().any(|v| matches!(v, RuleParams::FilterOrder(order) if order_contains(order, id)));
        if present {
            continue;
        }
        if let Some(key) = out.keys().find(|k| matches!(k, PatternId::Signature(s) if s.contains(&id))).cloned() {
            if let Some(RuleParams::FilterOrder(order)) = out.get_mut(&key) {
                order.push(OrderItem::Single(id));
            }
        }
    }
    out
}

impl Individual {
    pub fn new(base_query: NodeRef, operation_params: OperationParams) -> Self {
        Self { operation_params, base_query, cached_plan: RefCell::new(None), cached_fitness: RefCell::new(None), genealogy: Vec::new() }
    }

    /// Derives the rewritten plan, running the rules in the fixed order
    /// Rule 1/2 -> Rule 4 -> Rule 6 -> Rule 5, then caches it.
    pub fn plan(&self, registry: &RuleRegistry) -> NodeRef {
        if let Some(cached) = self.cached_plan.borrow().as_ref() {
            return cached.clone();
        }
        let empty = HashMap::new();
        let filter_params = self.operation_params.get("filter_params").unwrap_or(&empty);
        let join_params = self.operation_params.get("join_params").unwrap_or(&empty);
        let assoc_params = self.operation_params.get("join_associativity_params").unwrap_or(&empty);
        let child_params = self.operation_params.get("join_child_params").unwrap_or(&empty);

        let injected = inject_join_params_into_filter(filter_params, join_params);
        let after_1_2 = registry.get("filter_params").apply(&self.base_query, &injected);
        let after_4 = registry.get("join_params").apply(&after_1_2, join_params);
        let after_6 = registry.get("join_associativity_params").apply(&after_4, assoc_params);
        let after_5 = registry.get("join_child_params").apply(&after_6, child_params);

        *self.cached_plan.borrow_mut() = Some(after_5.clone());
        after_5
    }

    pub fn fitness(&self, registry: &RuleRegistry) -> u64 {
        if let Some(f) = *self.cached_fitness.borrow() {
            return f;
        }
        let plan = self.plan(registry);
        let f = cost(&plan);
        *self.cached_fitness.borrow_mut() = Some(f);
        f
    }

    fn invalidate(&self) {
        *self.cached_plan.borrow_mut() = None;
        *self.cached_fitness.borrow_mut() = None;
    }
}

const COUPLED_OPERATIONS: [&str; 2] = ["filter_params", "join_params"];

pub struct GenerationRecord {
    pub generation: usize,
    pub best: u64,
}

pub struct GeneticOptimizer {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub elitism: usize,
    rng: StdRng,
}

impl GeneticOptimizer {
    pub fn new(population_size: usize, generations: usize, mutation_rate: f64, elitism: usize, seed: u64) -> Self {
        Self { population_size, generations, mutation_rate, elitism, rng: StdRng::seed_from_u64(seed) }
    }

    /// Runs the GA over `base_query` (already validated and pre-GA
    /// deterministic-rewritten). Returns the best plan found and the
    /// per-generation best-fitness history.
    pub fn optimize(&mut self, base_query: &NodeRef, registry: &RuleRegistry) -> (NodeRef, Vec<GenerationRecord>) {
        let base_analysis: HashMap<&'static str, Vec<(PatternId, PatternMetadata)>> =
            registry.operations().into_iter().map(|op| (op, registry.get(op).analyze(base_query))).collect();

        let mut population: Vec<Individual> = (0..self.population_size)
            .map(|_| self.random_individual(base_query, &base_analysis, registry))
            .collect();

        let mut history = Vec::new();
        for generation in 0..self.generations {
            for ind in &population {
                ind.invalidate();
            }
            population.sort_by_key(|ind| ind.fitness(registry));
            let best = population[0].fitness(registry);
            history.push(GenerationRecord { generation, best });

            let mut next_pop: Vec<Individual> = population.iter().take(self.elitism).cloned().collect();
            while next_pop.len() < self.population_size {
                let top = &population[..population.len().min(10)];
                let parent_a = top.choose(&mut self.rng).expect("non-empty population");
                let parent_b = top.choose(&mut self.rng).expect("non-empty population");
                let (mut child1, mut child2) = self.crossover(parent_a, parent_b, base_query);
                if self.rng.gen_bool(self.mutation_rate) {
                    child1 = self.mutate(&child1, &base_analysis, registry);
                }
                if self.rng.gen_bool(self.mutation_rate) {
                    child2 = self.mutate(&child2, &base_analysis, registry);
                }
                next_pop.push(child1);
                if next_pop.len() < self.population_size {
                    next_pop.push(child2);
                }
            }
            next_pop.truncate(self.population_size);
            population = next_pop;
        }

        for ind in &population {
            ind.invalidate();
        }
        population.sort_by_key(|ind| ind.fitness(registry));
        let best_plan = population[0].plan(registry);
        (best_plan, history)
    }

    fn random_individual(
        &mut self,
        base_query: &NodeRef,
        base_analysis: &HashMap<&'static str, Vec<(PatternId, PatternMetadata)>>,
        registry: &RuleRegistry,
    ) -> Individual {
        let mut operation_params = OperationParams::new();
        for (op, patterns) in base_analysis {
            let mut map = HashMap::new();
            for (pid, meta) in patterns {
                let params = registry.get(op).generate(meta, &mut self.rng);
                map.insert(pid.clone(), params);
            }
            operation_params.insert(*op, map);
        }
        Individual::new(base_query.clone(), operation_params)
    }

    fn crossover(&mut self, a: &Individual, b: &Individual, base_query: &NodeRef) -> (Individual, Individual) {
        let mut ops1 = OperationParams::new();
        let mut ops2 = OperationParams::new();
        let mut genealogy1 = Vec::new();
        let mut genealogy2 = Vec::new();

        let a_first = self.rng.gen_bool(0.5);
        for op in a.operation_params.keys().chain(b.operation_params.keys()).collect::<BTreeSet<_>>() {
            if COUPLED_OPERATIONS.contains(op) {
                let (from_a, from_b) = if a_first {
                    (a.operation_params.get(op).cloned(), b.operation_params.get(op).cloned())
                } else {
                    (b.operation_params.get(op).cloned(), a.operation_params.get(op).cloned())
                };
                if let Some(v) = from_a {
                    ops1.insert(*op, v);
                    genealogy1.push(format!("[COUPLED] {op} all from Parent A"));
                }
                if let Some(v) = from_b {
                    ops2.insert(*op, v);
                    genealogy2.push(format!("[COUPLED] {op} all from Parent B"));
                }
            } else {
                let empty = HashMap::new();
                let map_a = a.operation_params.get(op).unwrap_or(&empty);
                let map_b = b.operation_params.get(op).unwrap_or(&empty);
                let mut child1_map = HashMap::new();
                let mut child2_map = HashMap::new();
                for key in map_a.keys().chain(map_b.keys()).collect::<BTreeSet<_>>() {
                    match (map_a.get(key), map_b.get(key)) {
                        (Some(va), Some(vb)) => {
                            if self.rng.gen_bool(0.5) {
                                child1_map.insert(key.clone(), va.clone());
                                child2_map.insert(key.clone(), vb.clone());
                            } else {
                                child1_map.insert(key.clone(), vb.clone());
                                child2_map.insert(key.clone(), va.clone());
                            }
                        }
                        (Some(va), None) => {
                            child1_map.insert(key.clone(), va.clone());
                            child2_map.insert(key.clone(), va.clone());
                        }
                        (None, Some(vb)) => {
                            child1_map.insert(key.clone(), vb.clone());
                            child2_map.insert(key.clone(), vb.clone());
                        }
                        (None, None) => {}
                    }
                }
                ops1.insert(*op, child1_map);
                ops2.insert(*op, child2_map);
            }
        }

        let mut i1 = Individual::new(base_query.clone(), ops1);
        let mut i2 = Individual::new(base_query.clone(), ops2);
        i1.genealogy = genealogy1;
        i2.genealogy = genealogy2;
        (i1, i2)
    }

    fn mutate(
        &mut self,
        ind: &Individual,
        base_analysis: &HashMap<&'static str, Vec<(PatternId, PatternMetadata)>>,
        registry: &RuleRegistry,
    ) -> Individual {
        let mut new_ops = ind.operation_params.clone();
        let ops: Vec<&'static str> = new_ops.keys().copied().collect();
        if ops.is_empty() {
            return ind.clone();
        }
        let chosen_op = *ops.choose(&mut self.rng).unwrap();
        let keys: Vec<PatternId> = new_ops.get(chosen_op).map(|m| m.keys().cloned().collect()).unwrap_or_default();
        if keys.is_empty() {
            return ind.clone();
        }
        let chosen_key = keys.choose(&mut self.rng).unwrap().clone();
        let metadata = base_analysis
            .get(chosen_op)
            .and_then(|patterns| patterns.iter().find(|(pid, _)| pid == &chosen_key))
            .map(|(_, m)| m.clone());
        if let (Some(map), Some(meta)) = (new_ops.get_mut(chosen_op), metadata) {
            if let Some(current) = map.get(&chosen_key).cloned() {
                let mutated = registry.get(chosen_op).mutate(&current, &meta, &mut self.rng);
                map.insert(chosen_key.clone(), mutated);
            }
        }
        let mut new_ind = Individual::new(ind.base_query.clone(), new_ops);
        new_ind.genealogy = ind.genealogy.clone();
        new_ind.genealogy.push(format!("mutated {chosen_op}"));
        new_ind
    }
}

/// After Rule 4 merges conditions into a JOIN, `filter_params` signatures
/// that lost conditions must be rewritten so a later generation's Rule 1/2
/// pass doesn't try to re-cascade ids that no longer live in any FILTER.
pub fn rewrite_filter_params_after_merge(
    filter_params: &HashMap<PatternId, RuleParams>,
    join_params: &HashMap<PatternId, RuleParams>,
) -> HashMap<PatternId, RuleParams> {
    let merged = merged_condition_ids(join_params);
    filter_params
        .iter()
        .map(|(k, v)| {
            let new_v = match v {
                RuleParams::FilterOrder(order) => RuleParams::FilterOrder(adjust_filter_params(order, &merged)),
                other => other.clone(),
            };
            (k.clone(), new_v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::tree::reset_ids_for_test;

    #[test]
    fn ga_history_is_monotonically_non_increasing() {
        reset_ids_for_test();
        let root = parse("SELECT * FROM a INNER JOIN b ON a.x = b.y WHERE a.z > 1 AND a.w < 2;").unwrap();
        let registry = RuleRegistry::new();
        let mut ga = GeneticOptimizer::new(12, 5, 0.3, 2, 7);
        let (_best_plan, history) = ga.optimize(&root, &registry);
        for w in history.windows(2) {
            assert!(w[1].best <= w[0].best);
        }
    }
}

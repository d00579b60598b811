//! Invariant and failure-semantics tests for the search session.

use std::collections::HashSet;

use crate::cost::LoopFeatureCostModel;
use crate::database::{Database, MemoryDatabase, TuningRecord};
use crate::search::EvolutionarySearch;
use crate::state::SearchState;
use crate::test::helpers::*;
use crate::tuning::TuningOptions;

fn options() -> TuningOptions {
    TuningOptions::builder()
        .init_population_num(6)
        .pick_database_topk(0)
        .cross_over_num(2)
        .num_samples_per_iteration(4)
        .eps_greedy(0.25)
        .build()
}

fn run(seed: u64) -> Vec<(u64, f64)> {
    let (_registry, task) = host_task(matmul_module(), "determinism");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, seed);
    search
        .search_eps_greedy(&options())
        .unwrap()
        .iter()
        .map(|s| (s.structural_hash(), s.predicted_cost()))
        .collect()
}

#[test]
fn test_fixed_seed_is_reproducible() {
    assert_eq!(run(42), run(42));
    assert_eq!(run(7), run(7));
}

#[test]
fn test_different_seeds_explore_differently() {
    // Not an API guarantee, but with these seeds the streams diverge; a
    // regression here means seeding stopped reaching the pipeline.
    assert_ne!(run(42), run(1042));
}

#[test]
fn test_result_size_bound_and_dedup() {
    let (_registry, task) = host_task(matmul_module(), "bounds");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 13);

    let result = search.search_eps_greedy(&options()).unwrap();
    assert!(result.len() <= options().num_samples_per_iteration);

    let hashes: HashSet<u64> = result.iter().map(SearchState::structural_hash).collect();
    assert_eq!(hashes.len(), result.len(), "returned list contains structural duplicates");
}

#[test]
fn test_search_bests_sorted_and_visited() {
    let (_registry, task) = host_task(matmul_module(), "sorted");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 21);

    let result = search.search_bests(&options()).unwrap();
    for pair in result.windows(2) {
        assert!(pair[0].predicted_cost() <= pair[1].predicted_cost());
    }
    assert_eq!(search.visited_count(), result.len());

    // A second generation never resurfaces the recorded candidates.
    let again = search.search_bests(&options()).unwrap();
    let seen: HashSet<u64> = result.iter().map(SearchState::structural_hash).collect();
    for state in &again {
        assert!(!seen.contains(&state.structural_hash()));
    }
}

#[test]
fn test_unscorable_model_degrades_to_infinity() {
    let (_registry, task) = host_task(matmul_module(), "unscorable");
    let model = UnscorableCostModel;
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 3);

    let result = search.search_bests(&options()).unwrap();
    assert!(!result.is_empty());
    for state in &result {
        // NaN from the model is mapped to +inf, never surfaced.
        assert!(state.predicted_cost().is_infinite());
    }
}

#[test]
fn test_corrupt_database_record_is_skipped() {
    let (_registry, task) = host_task(matmul_module(), "corrupt");
    let mut db = MemoryDatabase::new();
    db.add_record(TuningRecord { task_key: "corrupt".to_owned(), trace: vec![0xde, 0xad], predicted_cost: 0.1 })
        .unwrap();

    let model = LoopFeatureCostModel::default();
    let mut search = EvolutionarySearch::new(task, &model, &db, 5);
    let opts = TuningOptions::builder()
        .init_population_num(4)
        .pick_database_topk(1)
        .num_samples_per_iteration(2)
        .build();

    // The record fails to decode; the search proceeds on sketches alone.
    let result = search.search_bests(&opts).unwrap();
    assert!(!result.is_empty());
}

#[test]
fn test_unreplayable_record_is_skipped() {
    use kuzna_ir::{IrSchedule, RandomEngine};

    // A trace recorded against a different module shape.
    let mut foreign = IrSchedule::new(two_func_module(), RandomEngine::new(1));
    foreign.parallel("x").unwrap();

    let (_registry, task) = host_task(matmul_module(), "foreign");
    let mut db = MemoryDatabase::new();
    db.add_record(TuningRecord::new("foreign", foreign.trace(), 0.1).unwrap()).unwrap();

    let model = LoopFeatureCostModel::default();
    let mut search = EvolutionarySearch::new(task, &model, &db, 5);
    let opts = TuningOptions::builder()
        .init_population_num(4)
        .pick_database_topk(1)
        .num_samples_per_iteration(2)
        .build();
    let result = search.search_bests(&opts).unwrap();
    assert!(!result.is_empty());
}

#[test]
fn test_sketch_exhaustion_is_tolerated() {
    let (_registry, task) = host_task(matmul_module(), "exhaustion");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 9);

    // Far more candidates requested than the rule pipeline can produce; the
    // search continues with the smaller population.
    let opts = TuningOptions::builder()
        .init_population_num(64)
        .pick_database_topk(0)
        .num_samples_per_iteration(8)
        .build();
    let result = search.search_bests(&opts).unwrap();
    assert!(!result.is_empty());
    assert!(result.len() <= 8);
}

#[test]
fn test_elementwise_pipeline_inlines() {
    let (_registry, task) = host_task(elementwise_module(), "ewise");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 17);

    let result = search.search_bests(&options()).unwrap();
    assert!(!result.is_empty());
    // The auto-inline rule fires somewhere in the explored space.
    let inlined_somewhere = result.iter().any(|s| {
        s.schedule()
            .trace()
            .steps()
            .iter()
            .any(|step| matches!(step, kuzna_ir::Step::ComputeInline { .. }))
    });
    assert!(inlined_somewhere);
}

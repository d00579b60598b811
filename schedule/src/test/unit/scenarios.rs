//! End-to-end seed scenarios for the search pipeline.

use std::collections::HashSet;

use kuzna_ir::{IrSchedule, RandomEngine, Step};

use crate::cost::LoopFeatureCostModel;
use crate::database::{Database, MemoryDatabase, TuningRecord};
use crate::search::EvolutionarySearch;
use crate::state::SearchState;
use crate::test::helpers::*;
use crate::tuning::TuningOptions;

#[test]
fn test_pure_sketch_population() {
    let (_registry, task) = host_task(matmul_module(), "scenario_sketch");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 42);

    let options = TuningOptions::builder()
        .init_population_num(4)
        .pick_database_topk(0)
        .cross_over_num(0)
        .num_samples_per_iteration(2)
        .eps_greedy(0.0)
        .build();
    let result = search.search_eps_greedy(&options).unwrap();

    assert!(!result.is_empty());
    assert!(result.len() <= 2);
    for pair in result.windows(2) {
        assert!(pair[0].predicted_cost() <= pair[1].predicted_cost());
    }
    for state in &result {
        assert!(state.is_scored());
        assert!(state.predicted_cost().is_finite());
        assert!(!state.schedule().trace().is_empty());
    }
    assert_eq!(search.visited_count(), result.len());
}

#[test]
fn test_database_seed_ranks_first() {
    let (_registry, task) = host_task(matmul_module(), "scenario_db");

    // Two stored schedules: a cheap one annotated parallel, a costlier one
    // vectorized. Their two-step traces beat any five-step sketch under the
    // trace-length model.
    let mut parallel_sch = IrSchedule::new(matmul_module(), RandomEngine::new(1));
    parallel_sch.split("i", &[32, 2]).unwrap();
    parallel_sch.parallel("i.0").unwrap();
    let mut vectorized_sch = IrSchedule::new(matmul_module(), RandomEngine::new(2));
    vectorized_sch.split("i", &[16, 4]).unwrap();
    vectorized_sch.vectorize("k").unwrap();

    let mut db = MemoryDatabase::new();
    db.add_record(TuningRecord::new("scenario_db", parallel_sch.trace(), 1.0).unwrap()).unwrap();
    db.add_record(TuningRecord::new("scenario_db", vectorized_sch.trace(), 3.0).unwrap()).unwrap();

    let model = TraceLengthCostModel;
    let mut search = EvolutionarySearch::new(task, &model, &db, 42);
    let options = TuningOptions::builder()
        .init_population_num(4)
        .pick_database_topk(2)
        .cross_over_num(0)
        .num_samples_per_iteration(4)
        .eps_greedy(0.0)
        .build();
    let result = search.search_bests(&options).unwrap();

    assert!(result.len() >= 2);
    // The cost-1.0 record leads: no sketch scores lower, and the insertion
    // tie-break keeps it ahead of the cost-3.0 record.
    assert_eq!(result[0].predicted_cost(), 2.0);
    assert!(result[0].schedule().trace().steps().iter().any(|s| matches!(s, Step::Parallel { .. })));
}

#[test]
fn test_crossover_count_with_two_parents() {
    let (_registry, task) = host_task(two_func_module(), "scenario_crossover");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task.clone(), &model, &db, 7);

    let mut left = IrSchedule::new(task.module().deep_copy(), RandomEngine::new(1));
    left.parallel("i").unwrap();
    let mut right = IrSchedule::new(task.module().deep_copy(), RandomEngine::new(2));
    right.unroll("i").unwrap();
    right.unroll("x").unwrap();
    let population = vec![SearchState::new(left), SearchState::new(right)];

    // Two originals plus exactly three crossover children, all scored.
    let result = search.evolve(&population, 3, 10);
    assert_eq!(result.len(), 5);
    for state in &result {
        assert!(state.is_scored());
    }
}

#[test]
fn test_crossover_skipped_with_single_parent() {
    let (_registry, task) = host_task(two_func_module(), "scenario_lone");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task.clone(), &model, &db, 7);

    let population = vec![SearchState::new(IrSchedule::new(task.module().deep_copy(), RandomEngine::new(1)))];
    let result = search.evolve(&population, 5, 10);
    assert_eq!(result.len(), 1);
}

#[test]
fn test_repeated_searches_are_disjoint() {
    let (_registry, task) = host_task(matmul_module(), "scenario_repeat");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 100);

    let options = TuningOptions::builder()
        .init_population_num(6)
        .pick_database_topk(0)
        .num_samples_per_iteration(4)
        .eps_greedy(0.25)
        .build();

    let first = search.search_eps_greedy(&options).unwrap();
    let second = search.search_eps_greedy(&options).unwrap();
    assert!(!first.is_empty());

    let seen: HashSet<u64> = first.iter().map(SearchState::structural_hash).collect();
    for state in &second {
        assert!(!seen.contains(&state.structural_hash()), "second call returned a visited candidate");
    }
}

#[test]
fn test_eps_greedy_slot_allocation() {
    let (_registry, task) = host_task(matmul_module(), "scenario_slots");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    // Seed 0 exercises the zero-state normalization.
    let mut search = EvolutionarySearch::new(task, &model, &db, 0);

    let bests: Vec<SearchState> = (0..10).map(|i| state_with_extent(10 + i, i as f64)).collect();
    let rands: Vec<SearchState> = (0..5).map(|i| state_with_extent(100 + i, f64::NAN)).collect();

    // floor(10 * 0.3) = 3 random slots, 7 best slots.
    let picked = search.pick_next_generation_eps_greedy(&bests, &rands, 10, 0.3);
    assert_eq!(picked.len(), 10);
    for i in 0..7 {
        assert_eq!(picked[i], bests[i]);
    }
    for i in 0..3 {
        assert_eq!(picked[7 + i], rands[i]);
    }
}

#[test]
fn test_eps_greedy_backfills_from_bests() {
    let (_registry, task) = host_task(matmul_module(), "scenario_backfill");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();
    let mut search = EvolutionarySearch::new(task, &model, &db, 0);

    let bests: Vec<SearchState> = (0..10).map(|i| state_with_extent(10 + i, i as f64)).collect();
    // One usable random sketch plus a structural duplicate that dedups away.
    let rands = vec![state_with_extent(100, f64::NAN), state_with_extent(100, f64::NAN)];

    let picked = search.pick_next_generation_eps_greedy(&bests, &rands, 10, 0.3);
    assert_eq!(picked.len(), 10);
    assert_eq!(picked[7], rands[0]);
    // Slots the random sketches could not fill fall back to bests.
    assert_eq!(picked[8], bests[7]);
    assert_eq!(picked[9], bests[8]);
}

#[test]
fn test_eps_boundaries() {
    let (_registry, task) = host_task(matmul_module(), "scenario_eps");
    let model = LoopFeatureCostModel::default();
    let db = MemoryDatabase::new();

    let bests: Vec<SearchState> = (0..6).map(|i| state_with_extent(10 + i, i as f64)).collect();
    let rands: Vec<SearchState> = (0..6).map(|i| state_with_extent(100 + i, f64::NAN)).collect();

    // eps = 0: everything from bests.
    let mut search = EvolutionarySearch::new(task.clone(), &model, &db, 1);
    let picked = search.pick_next_generation_eps_greedy(&bests, &rands, 4, 0.0);
    assert_eq!(picked, bests[..4].to_vec());

    // eps = 1: random sketches first, then backfill from bests.
    let mut search = EvolutionarySearch::new(task, &model, &db, 1);
    let picked = search.pick_next_generation_eps_greedy(&bests[..2], &rands[..2], 4, 1.0);
    assert_eq!(picked[..2], rands[..2]);
    assert_eq!(picked[2..], bests[..2]);
}

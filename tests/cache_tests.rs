//! Cache eligibility and cached-step lookup tests.

mod common;

use common::*;
use pipestack_core::cache::{find_cached_step_run, generate_cache_key, CacheKeyInputs};
use pipestack_core::constants::ExecutionStatus;
use pipestack_core::is_cache_enabled;
use pipestack_core::store::MemoryStore;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The full step-flag x pipeline-flag truth table, all six combinations.
#[test]
fn cache_eligibility_truth_table() {
    // Step flag enabled wins regardless of pipeline flag.
    assert!(is_cache_enabled(Some(true), true));
    assert!(is_cache_enabled(Some(true), false));
    // Step flag disabled wins regardless of pipeline flag.
    assert!(!is_cache_enabled(Some(false), true));
    assert!(!is_cache_enabled(Some(false), false));
    // Unset step flag takes the pipeline default.
    assert!(is_cache_enabled(None, true));
    assert!(!is_cache_enabled(None, false));
}

#[test]
fn different_inputs_produce_different_keys() {
    let parameters = json!({"epochs": 5});
    let empty_params = json!({});
    let no_artifacts = BTreeMap::new();
    let outputs = BTreeMap::new();
    let base = CacheKeyInputs {
        project: Uuid::nil(),
        artifact_store: Uuid::nil(),
        artifact_store_path: "/srv/artifacts",
        step_source: "steps.train",
        parameters: &parameters,
        input_artifacts: &no_artifacts,
        outputs: &outputs,
        caching_parameters: &empty_params,
    };
    let key = generate_cache_key(&base);

    let other_params = json!({"epochs": 6});
    let changed = CacheKeyInputs {
        parameters: &other_params,
        ..base.clone()
    };
    assert_ne!(key, generate_cache_key(&changed));

    let changed_inputs = BTreeMap::from([("dataset".to_string(), Uuid::new_v4())]);
    let changed = CacheKeyInputs {
        input_artifacts: &changed_inputs,
        ..base
    };
    assert_ne!(key, generate_cache_key(&changed));
}

#[tokio::test]
async fn lookup_returns_newest_completed_match_in_project() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;

    let older_run = RunBuilder::new(&scope).build(&store).await;
    let older = StepRunBuilder::new(&older_run)
        .with_cache_key("abc123")
        .with_status(ExecutionStatus::Completed)
        .build(&store)
        .await;
    let newer_run = RunBuilder::new(&scope).build(&store).await;
    let newer = StepRunBuilder::new(&newer_run)
        .with_cache_key("abc123")
        .with_status(ExecutionStatus::Completed)
        .build(&store)
        .await;

    let found = find_cached_step_run(&store, scope.project.id, "abc123")
        .await
        .unwrap()
        .expect("cache candidate");
    assert_eq!(found.id, newer.id);
    assert_ne!(found.id, older.id);
}

#[tokio::test]
async fn lookup_ignores_unfinished_and_failed_steps() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    StepRunBuilder::new(&run)
        .with_cache_key("abc123")
        .with_status(ExecutionStatus::Running)
        .build(&store)
        .await;
    StepRunBuilder::new(&run)
        .with_cache_key("abc123")
        .with_status(ExecutionStatus::Failed)
        .build(&store)
        .await;

    let found = find_cached_step_run(&store, scope.project.id, "abc123")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn lookup_is_scoped_to_the_project() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let other_scope = test_scope(&store).await;

    let foreign_run = RunBuilder::new(&other_scope).build(&store).await;
    StepRunBuilder::new(&foreign_run)
        .with_cache_key("abc123")
        .with_status(ExecutionStatus::Completed)
        .build(&store)
        .await;

    let found = find_cached_step_run(&store, scope.project.id, "abc123")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn lookup_with_unknown_key_returns_none() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;

    let found = find_cached_step_run(&store, scope.project.id, "never-computed")
        .await
        .unwrap();
    assert!(found.is_none());
}

//! Property-based tests for the pure decision functions and the paging
//! contract.

use pipestack_core::cache::{generate_cache_key, CacheKeyInputs};
use pipestack_core::constants::{system, ExecutionStatus};
use pipestack_core::models::{
    run_status_from_steps, Page, Pagination, ProjectFilter, ProjectRequest,
};
use pipestack_core::store::{MemoryStore, Store};
use pipestack_core::{is_cache_enabled, NameOrId};
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

fn status_strategy() -> impl Strategy<Value = ExecutionStatus> {
    prop_oneof![
        Just(ExecutionStatus::Running),
        Just(ExecutionStatus::Completed),
        Just(ExecutionStatus::Failed),
        Just(ExecutionStatus::Cached),
    ]
}

proptest! {
    /// A failed step always fails the run, whatever else happened.
    #[test]
    fn any_failed_step_fails_the_run(
        mut statuses in prop::collection::vec(status_strategy(), 0..8),
        position in 0usize..8,
    ) {
        let position = position.min(statuses.len());
        statuses.insert(position, ExecutionStatus::Failed);
        prop_assert_eq!(
            run_status_from_steps(&statuses, statuses.len()),
            ExecutionStatus::Failed
        );
    }

    /// The run completes only when every resolved step reported a
    /// successful terminal status.
    #[test]
    fn completion_requires_every_step_successful(
        statuses in prop::collection::vec(status_strategy(), 0..8),
        missing in 0usize..3,
    ) {
        let num_steps = statuses.len() + missing;
        let rollup = run_status_from_steps(&statuses, num_steps);
        if rollup == ExecutionStatus::Completed {
            prop_assert_eq!(missing, 0);
            prop_assert!(statuses.iter().all(ExecutionStatus::is_successful));
        }
    }

    /// The step-level flag always wins when set.
    #[test]
    fn step_cache_flag_dominates(step in any::<bool>(), pipeline in any::<bool>()) {
        prop_assert_eq!(is_cache_enabled(Some(step), pipeline), step);
    }

    /// Cache keys ignore JSON object key ordering.
    #[test]
    fn cache_key_ignores_parameter_insertion_order(
        entries in prop::collection::btree_map("[a-z]{1,8}", 0i64..1000, 0..6),
    ) {
        let forward: serde_json::Value =
            entries.iter().map(|(k, v)| (k.clone(), serde_json::json!(v))).collect::<serde_json::Map<_, _>>().into();
        let reversed: serde_json::Value =
            entries.iter().rev().map(|(k, v)| (k.clone(), serde_json::json!(v))).collect::<serde_json::Map<_, _>>().into();
        let empty = serde_json::json!({});
        let no_artifacts = BTreeMap::new();
        let outputs = BTreeMap::new();
        let base = CacheKeyInputs {
            project: Uuid::nil(),
            artifact_store: Uuid::nil(),
            artifact_store_path: "/srv/artifacts",
            step_source: "steps.train",
            parameters: &forward,
            input_artifacts: &no_artifacts,
            outputs: &outputs,
            caching_parameters: &empty,
        };
        let swapped = CacheKeyInputs { parameters: &reversed, ..base.clone() };
        prop_assert_eq!(generate_cache_key(&base), generate_cache_key(&swapped));
    }

    /// Any string that is not a UUID resolves as a name, never an ID.
    #[test]
    fn non_uuid_strings_resolve_as_names(name in "[a-z][a-z0-9_-]{0,30}") {
        prop_assume!(name.parse::<Uuid>().is_err());
        prop_assert_eq!(NameOrId::from(name.as_str()), NameOrId::Name(name));
    }

    /// Page sizes are always clamped into the allowed range.
    #[test]
    fn pagination_limit_is_clamped(size in any::<u32>()) {
        let limit = Pagination::with_size(size).limit();
        prop_assert!(limit >= 1);
        prop_assert!(limit <= system::MAX_PAGE_SIZE);
    }

    /// Walking all pages visits every record exactly once, in insertion
    /// order, for any page size.
    #[test]
    fn paging_partitions_the_record_set(count in 1usize..25, size in 1u32..8) {
        tokio_test::block_on(async move {
            let store = MemoryStore::new();
            let mut expected = Vec::new();
            for index in 0..count {
                let name = format!("project-{index:02}");
                store
                    .create_project(ProjectRequest { name: name.clone(), description: None })
                    .await
                    .unwrap();
                expected.push(name);
            }

            let mut seen = Vec::new();
            let mut cursor = None;
            loop {
                let page: Page<_> = store
                    .list_projects(ProjectFilter {
                        pagination: Pagination { size, cursor },
                        ..Default::default()
                    })
                    .await
                    .unwrap();
                cursor = page.next_cursor;
                seen.extend(page.items.into_iter().map(|project| project.name));
                if cursor.is_none() {
                    break;
                }
            }
            assert_eq!(seen, expected);
        });
    }
}

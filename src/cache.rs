//! # Cache Eligibility Evaluation
//!
//! Decides whether a step's prior outputs may be reused instead of
//! re-executing it, fingerprints step configurations into stable cache
//! keys, and locates the newest successful step run carrying the same key.
//! The evaluator answers the binary "is caching permitted" question only;
//! acting on a located candidate is the orchestrator's job.

use crate::constants::ExecutionStatus;
use crate::error::Result;
use crate::models::{Pagination, StepRunFilter, StepRunResponse};
use crate::store::Store;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

/// Resolve whether caching is permitted for a step.
///
/// The per-step flag wins when set; an unset step flag defers to the
/// pipeline-level default.
pub fn is_cache_enabled(step_enable_cache: Option<bool>, pipeline_enable_cache: bool) -> bool {
    step_enable_cache.unwrap_or(pipeline_enable_cache)
}

/// Everything that makes two step executions interchangeable.
///
/// Two steps with equal fingerprints over these inputs produce the same
/// outputs, so the newer one may reuse the older one's artifacts.
#[derive(Debug, Clone)]
pub struct CacheKeyInputs<'a> {
    pub project: Uuid,
    /// The artifact store the outputs would be written to. A different
    /// store (or a different root path) invalidates the cache.
    pub artifact_store: Uuid,
    pub artifact_store_path: &'a str,
    /// Import path of the step implementation.
    pub step_source: &'a str,
    pub parameters: &'a serde_json::Value,
    /// Resolved input artifacts, keyed by declared input name.
    pub input_artifacts: &'a BTreeMap<String, Uuid>,
    /// Output names mapped to their materializer sources.
    pub outputs: &'a BTreeMap<String, String>,
    /// Extra values the step folds into its key.
    pub caching_parameters: &'a serde_json::Value,
}

/// Fingerprint a step configuration into a stable cache key.
///
/// The key is a SHA-256 hex digest over the project, the artifact store
/// identity and path, the step source, the sorted parameters, the named
/// input artifact IDs, the output names and materializers, and the sorted
/// caching parameters. Equal keys mean interchangeable executions.
pub fn generate_cache_key(inputs: &CacheKeyInputs<'_>) -> String {
    let mut hasher = Sha256::new();

    hasher.update(inputs.project.as_bytes());

    hasher.update(inputs.artifact_store.as_bytes());
    hasher.update(inputs.artifact_store_path.as_bytes());

    hasher.update(inputs.step_source.as_bytes());

    hash_sorted_object(&mut hasher, inputs.parameters);

    for (name, artifact_id) in inputs.input_artifacts {
        hasher.update(name.as_bytes());
        hasher.update(artifact_id.as_bytes());
    }

    for (name, materializer) in inputs.outputs {
        hasher.update(name.as_bytes());
        hasher.update(materializer.as_bytes());
    }

    hash_sorted_object(&mut hasher, inputs.caching_parameters);

    format!("{:x}", hasher.finalize())
}

/// Fold a JSON object into the hash in key order. Non-object values hash
/// their canonical serialization so malformed configurations still produce
/// a deterministic key.
fn hash_sorted_object(hasher: &mut Sha256, value: &serde_json::Value) {
    match value.as_object() {
        Some(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            for (key, entry) in entries {
                hasher.update(key.as_bytes());
                hasher.update(entry.to_string().as_bytes());
            }
        }
        None => hasher.update(value.to_string().as_bytes()),
    }
}

/// Locate the newest successfully completed step run in the project that
/// carries the given cache key, or `None` when nothing is reusable.
pub async fn find_cached_step_run(
    store: &dyn Store,
    project_id: Uuid,
    cache_key: &str,
) -> Result<Option<StepRunResponse>> {
    let mut newest: Option<StepRunResponse> = None;
    let mut run_projects: HashMap<Uuid, Option<Uuid>> = HashMap::new();
    let mut cursor = None;

    loop {
        let page = store
            .list_run_steps(StepRunFilter {
                cache_key: Some(cache_key.to_string()),
                status: Some(ExecutionStatus::Completed),
                pagination: Pagination {
                    size: crate::constants::system::MAX_PAGE_SIZE,
                    cursor,
                },
                ..Default::default()
            })
            .await?;
        cursor = page.next_cursor;

        for candidate in page.items {
            let project = match run_projects.get(&candidate.pipeline_run) {
                Some(project) => *project,
                None => {
                    let run = store.get_run(&candidate.pipeline_run.into()).await?;
                    run_projects.insert(candidate.pipeline_run, run.project);
                    run.project
                }
            };
            // Pages arrive in insertion order, so the last match is the
            // newest candidate.
            if project == Some(project_id) {
                newest = Some(candidate);
            }
        }

        if cursor.is_none() {
            break;
        }
    }

    if let Some(candidate) = &newest {
        debug!(
            step_run_id = %candidate.id,
            cache_key,
            "found reusable step run"
        );
    }
    Ok(newest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_flag_wins_when_set() {
        assert!(is_cache_enabled(Some(true), true));
        assert!(is_cache_enabled(Some(true), false));
        assert!(!is_cache_enabled(Some(false), true));
        assert!(!is_cache_enabled(Some(false), false));
    }

    #[test]
    fn unset_step_flag_defers_to_pipeline() {
        assert!(is_cache_enabled(None, true));
        assert!(!is_cache_enabled(None, false));
    }

    #[test]
    fn cache_key_is_stable_across_invocations() {
        let parameters = json!({"epochs": 10, "lr": 0.01});
        let caching_parameters = json!({});
        let inputs_map = BTreeMap::from([("dataset".to_string(), Uuid::new_v4())]);
        let outputs = BTreeMap::from([(
            "model".to_string(),
            "materializers.pickle.PickleMaterializer".to_string(),
        )]);
        let inputs = CacheKeyInputs {
            project: Uuid::new_v4(),
            artifact_store: Uuid::new_v4(),
            artifact_store_path: "s3://artifacts",
            step_source: "steps.train.train_model",
            parameters: &parameters,
            input_artifacts: &inputs_map,
            outputs: &outputs,
            caching_parameters: &caching_parameters,
        };
        assert_eq!(generate_cache_key(&inputs), generate_cache_key(&inputs));
    }

    #[test]
    fn parameter_order_does_not_change_the_key() {
        let forward = json!({"a": 1, "b": 2});
        let reversed: serde_json::Value =
            serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        let caching_parameters = json!({});
        let empty = BTreeMap::new();
        let outputs = BTreeMap::new();
        let base = CacheKeyInputs {
            project: Uuid::nil(),
            artifact_store: Uuid::nil(),
            artifact_store_path: "/tmp/store",
            step_source: "steps.load.load_data",
            parameters: &forward,
            input_artifacts: &empty,
            outputs: &outputs,
            caching_parameters: &caching_parameters,
        };
        let swapped = CacheKeyInputs {
            parameters: &reversed,
            ..base.clone()
        };
        assert_eq!(generate_cache_key(&base), generate_cache_key(&swapped));
    }

    #[test]
    fn changed_source_changes_the_key() {
        let parameters = json!({});
        let empty = BTreeMap::new();
        let outputs = BTreeMap::new();
        let base = CacheKeyInputs {
            project: Uuid::nil(),
            artifact_store: Uuid::nil(),
            artifact_store_path: "/tmp/store",
            step_source: "steps.train.train_model",
            parameters: &parameters,
            input_artifacts: &empty,
            outputs: &outputs,
            caching_parameters: &parameters,
        };
        let changed = CacheKeyInputs {
            step_source: "steps.train.train_model_v2",
            ..base.clone()
        };
        assert_ne!(generate_cache_key(&base), generate_cache_key(&changed));
    }
}

//! # Pipeline Run Model
//!
//! One execution of a pipeline against a specific stack. Run records are
//! immutable history: only status, timing, and counters move after
//! creation, and the `pipeline`/`stack`/`project` references are weak —
//! deleting the parent nulls the link but never deletes the run.

use crate::constants::ExecutionStatus;

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Globally unique run name, usually derived from the pipeline name and
    /// a timestamp by the orchestrator.
    pub name: String,
    /// `None` for unlisted runs that were started without a registered
    /// pipeline definition.
    pub pipeline: Option<Uuid>,
    pub stack: Option<Uuid>,
    pub project: Uuid,
    pub user: Uuid,
    pub status: ExecutionStatus,
    /// Serialized runtime configuration the run was launched with.
    pub pipeline_configuration: serde_json::Value,
    pub num_steps: Option<i32>,
    /// Correlation ID assigned by the orchestrator backend.
    pub orchestrator_run_id: Option<String>,
    /// Source-control revision the client launched from, if clean.
    pub git_sha: Option<String>,
    pub client_version: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: Uuid,
    pub name: String,
    pub pipeline: Option<Uuid>,
    pub stack: Option<Uuid>,
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub status: ExecutionStatus,
    pub pipeline_configuration: serde_json::Value,
    pub num_steps: Option<i32>,
    pub orchestrator_run_id: Option<String>,
    pub git_sha: Option<String>,
    pub client_version: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunUpdate {
    pub status: Option<ExecutionStatus>,
    pub num_steps: Option<i32>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub pipeline: Option<Uuid>,
    pub stack: Option<Uuid>,
    pub name: Option<String>,
    pub status: Option<ExecutionStatus>,
    /// When true, only runs not associated with any pipeline.
    pub unlisted: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Roll up a run status from its step statuses.
///
/// Any failed step fails the run; a running step, or fewer reported steps
/// than the run resolved, keeps it running; otherwise the run completed.
pub fn run_status_from_steps(
    step_statuses: &[ExecutionStatus],
    num_steps: usize,
) -> ExecutionStatus {
    if step_statuses.contains(&ExecutionStatus::Failed) {
        return ExecutionStatus::Failed;
    }
    if step_statuses.contains(&ExecutionStatus::Running) || step_statuses.len() < num_steps {
        return ExecutionStatus::Running;
    }
    ExecutionStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_step_fails_the_run() {
        let statuses = [
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Running,
        ];
        assert_eq!(run_status_from_steps(&statuses, 3), ExecutionStatus::Failed);
    }

    #[test]
    fn missing_steps_keep_the_run_running() {
        let statuses = [ExecutionStatus::Completed, ExecutionStatus::Cached];
        assert_eq!(run_status_from_steps(&statuses, 3), ExecutionStatus::Running);
    }

    #[test]
    fn all_steps_finished_completes_the_run() {
        let statuses = [ExecutionStatus::Completed, ExecutionStatus::Cached];
        assert_eq!(
            run_status_from_steps(&statuses, 2),
            ExecutionStatus::Completed
        );
    }
}

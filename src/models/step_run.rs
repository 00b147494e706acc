//! # Step Run Model
//!
//! The execution record of a single step within a pipeline run. A step run
//! belongs to exactly one run, declares its inputs by upstream output name,
//! and carries the resolved configuration the cache-eligibility decision
//! and cache-key fingerprint are computed from.

use crate::constants::ExecutionStatus;

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRunRequest {
    /// Step name, unique within the run.
    pub name: String,
    pub pipeline_run: Uuid,
    /// Import path of the step implementation.
    pub source: String,
    pub parameters: serde_json::Value,
    /// Extra values folded into the cache key by the fingerprint.
    pub caching_parameters: serde_json::Value,
    /// Per-step cache override; `None` defers to the pipeline-level flag.
    pub enable_cache: Option<bool>,
    /// Declared inputs: upstream output names this step consumes.
    pub inputs: Vec<String>,
    pub cache_key: Option<String>,
    pub docstring: Option<String>,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRunResponse {
    pub id: Uuid,
    pub name: String,
    pub pipeline_run: Uuid,
    pub source: String,
    pub parameters: serde_json::Value,
    pub caching_parameters: serde_json::Value,
    pub enable_cache: Option<bool>,
    pub inputs: Vec<String>,
    pub cache_key: Option<String>,
    pub docstring: Option<String>,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRunUpdate {
    pub status: Option<ExecutionStatus>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRunFilter {
    pub pipeline_run: Option<Uuid>,
    pub name: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub cache_key: Option<String>,
    #[serde(default)]
    pub pagination: Pagination,
}

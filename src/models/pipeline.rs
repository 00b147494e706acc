//! # Pipeline Model
//!
//! A named, versioned pipeline definition: an ordered graph of step
//! declarations. Unique by name within a project. Runs reference pipelines
//! weakly, so deleting a definition never erases run history.

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declaration of one step inside a pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    /// Import path of the step implementation.
    pub source: String,
    /// Names of steps that must complete before this one starts.
    #[serde(default)]
    pub upstream_steps: Vec<String>,
    /// Per-step cache override; `None` defers to the pipeline-level flag.
    #[serde(default)]
    pub enable_cache: Option<bool>,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

/// The ordered step graph a pipeline declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default = "default_spec_version")]
    pub version: String,
    pub steps: Vec<StepSpec>,
}

impl PipelineSpec {
    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|step| step.name == name)
    }
}

fn default_spec_version() -> String {
    "0.2".to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub name: String,
    pub docstring: Option<String>,
    pub spec: PipelineSpec,
    pub project: Uuid,
    pub user: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub id: Uuid,
    pub name: String,
    pub docstring: Option<String>,
    pub spec: PipelineSpec,
    pub project: Uuid,
    pub user: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineUpdate {
    pub name: Option<String>,
    pub docstring: Option<String>,
    pub spec: Option<PipelineSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub name: Option<String>,
    #[serde(default)]
    pub pagination: Pagination,
}

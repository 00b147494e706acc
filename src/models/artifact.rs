//! # Artifact Model
//!
//! A materialized step output: a URI plus the step run that produced it.
//! Artifacts are immutable once created; consumers are derived from the
//! declared inputs of later steps, not stored on the artifact itself.

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    /// Output name under which the producer step exposes this artifact.
    pub name: String,
    pub uri: String,
    pub data_type: Option<String>,
    /// Import path of the materializer that wrote the artifact.
    pub materializer: Option<String>,
    pub producer_step_run: Uuid,
    /// True when the artifact was reused from a cache hit rather than
    /// freshly materialized.
    pub is_cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResponse {
    pub id: Uuid,
    pub name: String,
    pub uri: String,
    pub data_type: Option<String>,
    pub materializer: Option<String>,
    pub producer_step_run: Uuid,
    pub is_cached: bool,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFilter {
    pub uri: Option<String>,
    pub producer_step_run: Option<Uuid>,
    pub name: Option<String>,
    pub is_cached: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

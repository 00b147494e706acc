//! # Stack Model
//!
//! A named bundle of stack components, at most one per component type,
//! describing the infrastructure a pipeline run executes on. The map shape
//! enforces the one-per-type invariant structurally; referenced components
//! must exist when the stack is created or updated.

use crate::constants::StackComponentType;

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRequest {
    pub name: String,
    pub description: Option<String>,
    pub components: BTreeMap<StackComponentType, Uuid>,
    pub project: Uuid,
    pub user: Uuid,
    pub is_shared: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub components: BTreeMap<StackComponentType, Uuid>,
    pub project: Uuid,
    pub user: Option<Uuid>,
    pub is_shared: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl StackResponse {
    /// Whether every required component type is present.
    pub fn is_complete(&self) -> bool {
        self.missing_required_types().is_empty()
    }

    /// Required component types the stack does not provide yet.
    pub fn missing_required_types(&self) -> Vec<StackComponentType> {
        [
            StackComponentType::Orchestrator,
            StackComponentType::ArtifactStore,
        ]
        .into_iter()
        .filter(|component_type| !self.components.contains_key(component_type))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the full component map when present.
    pub components: Option<BTreeMap<StackComponentType, Uuid>>,
    pub is_shared: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    /// Only stacks that contain this component.
    pub component_id: Option<Uuid>,
    pub name: Option<String>,
    pub is_shared: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

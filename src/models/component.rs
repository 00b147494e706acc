//! # Stack Component Model
//!
//! A configured instance of a flavor: one piece of infrastructure
//! (orchestrator, artifact store, ...) that stacks can bundle. Unique by
//! (name, type) within the owner scope; deleting a component still
//! referenced by a stack is rejected.

use crate::constants::StackComponentType;

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRequest {
    pub name: String,
    pub component_type: StackComponentType,
    /// Name of the flavor this component is configured from.
    pub flavor: String,
    /// Implementation-specific configuration, opaque to the store.
    pub configuration: serde_json::Value,
    pub project: Uuid,
    pub user: Uuid,
    pub is_shared: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResponse {
    pub id: Uuid,
    pub name: String,
    pub component_type: StackComponentType,
    pub flavor: String,
    pub configuration: serde_json::Value,
    pub project: Uuid,
    pub user: Option<Uuid>,
    pub is_shared: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub name: Option<String>,
    pub configuration: Option<serde_json::Value>,
    pub is_shared: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub component_type: Option<StackComponentType>,
    pub flavor: Option<String>,
    pub name: Option<String>,
    pub is_shared: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

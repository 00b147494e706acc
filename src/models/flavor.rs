//! # Flavor Model
//!
//! A flavor describes one concrete implementation backing a stack component
//! type, e.g. a specific orchestrator or model-serving backend. Components
//! reference flavors by name within their component type.

use crate::constants::StackComponentType;

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorRequest {
    pub name: String,
    pub component_type: StackComponentType,
    /// Import path of the implementation this flavor describes.
    pub source: String,
    /// JSON schema of the configuration the implementation accepts.
    pub config_schema: serde_json::Value,
    pub integration: Option<String>,
    pub project: Uuid,
    pub user: Uuid,
    /// Shared flavors are visible to every user of the project.
    pub is_shared: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorResponse {
    pub id: Uuid,
    pub name: String,
    pub component_type: StackComponentType,
    pub source: String,
    pub config_schema: serde_json::Value,
    pub integration: Option<String>,
    pub project: Uuid,
    /// Owner; nulled if the owning user is deleted.
    pub user: Option<Uuid>,
    pub is_shared: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlavorFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub component_type: Option<StackComponentType>,
    pub name: Option<String>,
    pub is_shared: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

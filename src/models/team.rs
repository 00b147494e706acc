//! Teams group users so role assignments can target many principals at once.

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRequest {
    pub name: String,
    /// Member user IDs; every referenced user must exist.
    pub users: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamResponse {
    pub id: Uuid,
    pub name: String,
    pub users: Vec<Uuid>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamUpdate {
    pub name: Option<String>,
    /// Replaces the full membership list when present.
    pub users: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamFilter {
    pub name: Option<String>,
    /// Only teams that contain this user.
    pub user: Option<Uuid>,
    #[serde(default)]
    pub pagination: Pagination,
}

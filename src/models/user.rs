//! # User Model
//!
//! Identity principals. Users own workspace-scoped resources and receive
//! permissions through role assignments, directly or via team membership.
//! No credential material lives here; authentication is an external concern.

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRequest {
    pub name: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    /// Deactivated users keep their records but stop receiving grants.
    pub active: bool,
}

impl UserRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: None,
            email: None,
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFilter {
    pub name: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

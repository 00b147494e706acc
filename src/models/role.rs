//! # Role and Role Assignment Models
//!
//! A role is a named permission bundle; a role assignment binds it to a
//! user or a team, optionally scoped to a project. Assignments without a
//! project scope are global and apply everywhere.

use crate::constants::PermissionType;

use super::page::Pagination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRequest {
    pub name: String,
    pub permissions: BTreeSet<PermissionType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleResponse {
    pub id: Uuid,
    pub name: String,
    pub permissions: BTreeSet<PermissionType>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl RoleResponse {
    pub fn grants(&self, permission: PermissionType) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub permissions: Option<BTreeSet<PermissionType>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleFilter {
    pub name: Option<String>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Binds a (user-or-team, role, optional project scope) triple.
///
/// Exactly one of `user` and `team` must be set; this is validated before
/// the assignment reaches the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignmentRequest {
    pub role: Uuid,
    pub user: Option<Uuid>,
    pub team: Option<Uuid>,
    /// `None` makes the assignment global.
    pub project: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignmentResponse {
    pub id: Uuid,
    pub role: Uuid,
    pub user: Option<Uuid>,
    pub team: Option<Uuid>,
    pub project: Option<Uuid>,
    pub created: DateTime<Utc>,
}

impl RoleAssignmentResponse {
    /// Whether this assignment applies to the given project scope. Global
    /// assignments apply regardless of project.
    pub fn applies_to(&self, project: Option<Uuid>) -> bool {
        match self.project {
            None => true,
            Some(scoped) => project == Some(scoped),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignmentFilter {
    pub role: Option<Uuid>,
    pub user: Option<Uuid>,
    pub team: Option<Uuid>,
    pub project: Option<Uuid>,
    #[serde(default)]
    pub pagination: Pagination,
}

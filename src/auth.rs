//! # Access Control Layer
//!
//! Maps (principal, required permission, resource scope) to an allow/deny
//! decision. A principal's applicable role assignments are its direct
//! assignments plus the assignments of every team it belongs to; an
//! assignment applies when it is global or when its project matches the
//! scope. The check runs before any store mutation, so a denial has no
//! side effects.

use crate::constants::PermissionType;
use crate::error::{Result, StoreError};
use crate::identifier::NameOrId;
use crate::models::{
    Pagination, RoleAssignmentFilter, RoleAssignmentResponse, TeamFilter,
};
use crate::store::Store;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// The scope a store operation acts on: the whole deployment or a single
/// project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    Global,
    Project(Uuid),
}

impl ResourceScope {
    fn project(&self) -> Option<Uuid> {
        match self {
            Self::Global => None,
            Self::Project(project) => Some(*project),
        }
    }
}

impl From<Option<Uuid>> for ResourceScope {
    fn from(project: Option<Uuid>) -> Self {
        project.map_or(Self::Global, Self::Project)
    }
}

/// Authorization decisions over a store injected at construction.
pub struct AccessControl {
    store: Arc<dyn Store>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Accept or reject an operation. Errors with
    /// [`StoreError::Authorization`] unless some role resolved for the
    /// principal grants the required permission in the given scope.
    pub async fn authorize(
        &self,
        user: &NameOrId,
        permission: PermissionType,
        scope: ResourceScope,
    ) -> Result<()> {
        if self.is_authorized(user, permission, scope).await? {
            return Ok(());
        }
        Err(StoreError::Authorization(format!(
            "user {user} lacks {permission} permission in {scope:?}"
        )))
    }

    /// The decision behind [`authorize`](Self::authorize), without the
    /// error wrapping.
    pub async fn is_authorized(
        &self,
        user: &NameOrId,
        permission: PermissionType,
        scope: ResourceScope,
    ) -> Result<bool> {
        let user = self.store.get_user(user).await?;
        if !user.active {
            debug!(user = %user.name, "denying deactivated user");
            return Ok(false);
        }

        let assignments = self.resolve_assignments(user.id).await?;
        let applicable: BTreeSet<Uuid> = assignments
            .iter()
            .filter(|assignment| assignment.applies_to(scope.project()))
            .map(|assignment| assignment.role)
            .collect();

        for role_id in applicable {
            let role = self.store.get_role(&role_id.into()).await?;
            if role.grants(permission) {
                debug!(
                    user = %user.name,
                    role = %role.name,
                    %permission,
                    "authorized"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every assignment that targets the user, directly or through a team
    /// membership.
    async fn resolve_assignments(&self, user_id: Uuid) -> Result<Vec<RoleAssignmentResponse>> {
        let mut assignments = self
            .drain_assignments(RoleAssignmentFilter {
                user: Some(user_id),
                ..Default::default()
            })
            .await?;

        let mut cursor = None;
        loop {
            let teams = self
                .store
                .list_teams(TeamFilter {
                    user: Some(user_id),
                    pagination: Pagination {
                        size: crate::constants::system::MAX_PAGE_SIZE,
                        cursor,
                    },
                    ..Default::default()
                })
                .await?;
            cursor = teams.next_cursor;
            for team in teams.items {
                assignments.extend(
                    self.drain_assignments(RoleAssignmentFilter {
                        team: Some(team.id),
                        ..Default::default()
                    })
                    .await?,
                );
            }
            if cursor.is_none() {
                break;
            }
        }

        Ok(assignments)
    }

    async fn drain_assignments(
        &self,
        filter: RoleAssignmentFilter,
    ) -> Result<Vec<RoleAssignmentResponse>> {
        let mut assignments = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .list_role_assignments(RoleAssignmentFilter {
                    pagination: Pagination {
                        size: crate::constants::system::MAX_PAGE_SIZE,
                        cursor,
                    },
                    ..filter.clone()
                })
                .await?;
            cursor = page.next_cursor;
            assignments.extend(page.items);
            if cursor.is_none() {
                break;
            }
        }
        Ok(assignments)
    }
}

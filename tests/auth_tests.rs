//! Access control resolution tests: direct assignments, team-mediated
//! assignments, and global versus project scoping.

mod common;

use common::*;
use pipestack_core::auth::{AccessControl, ResourceScope};
use pipestack_core::constants::PermissionType;
use pipestack_core::models::{RoleAssignmentRequest, TeamRequest};
use pipestack_core::store::{MemoryStore, Store};
use pipestack_core::NameOrId;
use std::sync::Arc;

async fn fixture() -> (Arc<MemoryStore>, AccessControl) {
    let store = Arc::new(MemoryStore::new());
    let access = AccessControl::new(Arc::clone(&store) as Arc<dyn Store>);
    (store, access)
}

#[tokio::test]
async fn direct_assignment_grants_the_permission() {
    let (store, access) = fixture().await;
    let scope = test_scope(store.as_ref()).await;
    let role = RoleBuilder::new()
        .with_permission(PermissionType::Write)
        .build(store.as_ref())
        .await;
    store
        .create_role_assignment(RoleAssignmentRequest {
            role: role.id,
            user: Some(scope.user.id),
            team: None,
            project: Some(scope.project.id),
        })
        .await
        .unwrap();

    access
        .authorize(
            &NameOrId::Id(scope.user.id),
            PermissionType::Write,
            ResourceScope::Project(scope.project.id),
        )
        .await
        .unwrap();

    // The bundle grants write only, not read.
    let err = access
        .authorize(
            &NameOrId::Id(scope.user.id),
            PermissionType::Read,
            ResourceScope::Project(scope.project.id),
        )
        .await
        .unwrap_err();
    assert!(err.is_authorization());
}

#[tokio::test]
async fn team_membership_carries_assignments_to_members() {
    let (store, access) = fixture().await;
    let scope = test_scope(store.as_ref()).await;
    let role = RoleBuilder::new()
        .with_permission(PermissionType::Read)
        .build(store.as_ref())
        .await;
    let team = store
        .create_team(TeamRequest {
            name: unique_name("team"),
            users: vec![scope.user.id],
        })
        .await
        .unwrap();
    store
        .create_role_assignment(RoleAssignmentRequest {
            role: role.id,
            user: None,
            team: Some(team.id),
            project: Some(scope.project.id),
        })
        .await
        .unwrap();

    access
        .authorize(
            &NameOrId::Id(scope.user.id),
            PermissionType::Read,
            ResourceScope::Project(scope.project.id),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn global_assignments_apply_in_every_project() {
    let (store, access) = fixture().await;
    let scope = test_scope(store.as_ref()).await;
    let role = RoleBuilder::new()
        .with_permission(PermissionType::Admin)
        .build(store.as_ref())
        .await;
    store
        .create_role_assignment(RoleAssignmentRequest {
            role: role.id,
            user: Some(scope.user.id),
            team: None,
            project: None,
        })
        .await
        .unwrap();

    access
        .authorize(
            &NameOrId::Id(scope.user.id),
            PermissionType::Admin,
            ResourceScope::Project(scope.project.id),
        )
        .await
        .unwrap();
    access
        .authorize(
            &NameOrId::Id(scope.user.id),
            PermissionType::Admin,
            ResourceScope::Global,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn project_scoped_assignments_do_not_leak_across_projects() {
    let (store, access) = fixture().await;
    let scope = test_scope(store.as_ref()).await;
    let other_project = ProjectBuilder::new().build(store.as_ref()).await;
    let role = RoleBuilder::new()
        .with_permission(PermissionType::Write)
        .build(store.as_ref())
        .await;
    store
        .create_role_assignment(RoleAssignmentRequest {
            role: role.id,
            user: Some(scope.user.id),
            team: None,
            project: Some(scope.project.id),
        })
        .await
        .unwrap();

    let err = access
        .authorize(
            &NameOrId::Id(scope.user.id),
            PermissionType::Write,
            ResourceScope::Project(other_project.id),
        )
        .await
        .unwrap_err();
    assert!(err.is_authorization());
}

#[tokio::test]
async fn users_without_assignments_are_rejected() {
    let (store, access) = fixture().await;
    let user = UserBuilder::new().build(store.as_ref()).await;

    let err = access
        .authorize(
            &NameOrId::Id(user.id),
            PermissionType::Read,
            ResourceScope::Global,
        )
        .await
        .unwrap_err();
    assert!(err.is_authorization());
}

#[tokio::test]
async fn deactivated_users_lose_their_grants() {
    let (store, access) = fixture().await;
    let user = UserBuilder::new().inactive().build(store.as_ref()).await;
    let role = RoleBuilder::new()
        .with_permission(PermissionType::Read)
        .build(store.as_ref())
        .await;
    store
        .create_role_assignment(RoleAssignmentRequest {
            role: role.id,
            user: Some(user.id),
            team: None,
            project: None,
        })
        .await
        .unwrap();

    let err = access
        .authorize(
            &NameOrId::Id(user.id),
            PermissionType::Read,
            ResourceScope::Global,
        )
        .await
        .unwrap_err();
    assert!(err.is_authorization());
}

#[tokio::test]
async fn unknown_principals_fail_with_not_found() {
    let (_store, access) = fixture().await;
    let err = access
        .authorize(
            &NameOrId::Id(uuid::Uuid::new_v4()),
            PermissionType::Read,
            ResourceScope::Global,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

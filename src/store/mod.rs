//! # Store Interface
//!
//! The abstract facade every surrounding component goes through: resource
//! CRUD with scoped-uniqueness and referential invariants, compound-key
//! lookups, and cursor-paged listing. The trait is a capability contract
//! with two backings selected by configuration — a map-backed
//! [`MemoryStore`] and a transactional [`SqlStore`] — never by subclassing.
//!
//! ## Contracts
//!
//! * `create_*` fails with [`StoreError::EntityExists`] when a
//!   scoped-uniqueness invariant is violated and with
//!   [`StoreError::NotFound`] when a referenced parent is missing; on
//!   success it returns the resource with generated ID and timestamps.
//! * `get_*` fails with [`StoreError::NotFound`]; it never returns a
//!   partial result.
//! * `list_*` treats every absent filter field as "no constraint" and
//!   returns an empty page rather than an error when nothing matches.
//!   Pages are ordered by a monotonic insertion sequence, so a concurrent
//!   insert cannot duplicate an already-returned record on a later page.
//! * `update_*` fails with [`StoreError::NotFound`] for unknown IDs and
//!   re-validates uniqueness when a rename is requested; a failed update
//!   mutates nothing.
//! * `delete_*` fails with [`StoreError::NotFound`] for unknown IDs and
//!   with [`StoreError::Conflict`] when deletion would violate a
//!   referential invariant. Deleting a parent of historical runs nulls the
//!   weak reference instead of cascading into history.
//!
//! Every mutating call is atomic: the uniqueness check and the write are
//! evaluated in one atomic unit, and the backend's own constraint is the
//! final arbiter under concurrency.
//!
//! [`StoreError::EntityExists`]: crate::error::StoreError::EntityExists
//! [`StoreError::NotFound`]: crate::error::StoreError::NotFound
//! [`StoreError::Conflict`]: crate::error::StoreError::Conflict

pub mod memory;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::constants::{system, StackComponentType};
use crate::error::{Result, StoreError};
use crate::identifier::NameOrId;
use crate::lineage;
use crate::models::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Build the store backing selected by the given configuration.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Postgres => Ok(Arc::new(SqlStore::connect(config).await?)),
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // --------
    // Projects
    // --------

    async fn create_project(&self, request: ProjectRequest) -> Result<ProjectResponse>;

    async fn get_project(&self, project: &NameOrId) -> Result<ProjectResponse>;

    async fn list_projects(&self, filter: ProjectFilter) -> Result<Page<ProjectResponse>>;

    async fn update_project(
        &self,
        project_id: Uuid,
        update: ProjectUpdate,
    ) -> Result<ProjectResponse>;

    /// Delete a project. Definition-kind children (stacks, components,
    /// flavors, pipelines, scoped role assignments) are removed with it;
    /// historical runs survive with their `project` reference nulled.
    async fn delete_project(&self, project: &NameOrId) -> Result<()>;

    // -----
    // Users
    // -----

    async fn create_user(&self, request: UserRequest) -> Result<UserResponse>;

    async fn get_user(&self, user: &NameOrId) -> Result<UserResponse>;

    async fn list_users(&self, filter: UserFilter) -> Result<Page<UserResponse>>;

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> Result<UserResponse>;

    /// Delete a user. Resources the user owned survive with a nulled owner
    /// reference; the user's direct role assignments and team memberships
    /// are removed.
    async fn delete_user(&self, user: &NameOrId) -> Result<()>;

    // -----
    // Teams
    // -----

    async fn create_team(&self, request: TeamRequest) -> Result<TeamResponse>;

    async fn get_team(&self, team: &NameOrId) -> Result<TeamResponse>;

    async fn list_teams(&self, filter: TeamFilter) -> Result<Page<TeamResponse>>;

    async fn update_team(&self, team_id: Uuid, update: TeamUpdate) -> Result<TeamResponse>;

    async fn delete_team(&self, team: &NameOrId) -> Result<()>;

    // -----
    // Roles
    // -----

    async fn create_role(&self, request: RoleRequest) -> Result<RoleResponse>;

    async fn get_role(&self, role: &NameOrId) -> Result<RoleResponse>;

    async fn list_roles(&self, filter: RoleFilter) -> Result<Page<RoleResponse>>;

    async fn update_role(&self, role_id: Uuid, update: RoleUpdate) -> Result<RoleResponse>;

    /// Delete a role. Rejected with [`StoreError::Conflict`] while any
    /// assignment still references it.
    ///
    /// [`StoreError::Conflict`]: crate::error::StoreError::Conflict
    async fn delete_role(&self, role: &NameOrId) -> Result<()>;

    // ----------------
    // Role assignments
    // ----------------

    async fn create_role_assignment(
        &self,
        request: RoleAssignmentRequest,
    ) -> Result<RoleAssignmentResponse>;

    async fn get_role_assignment(&self, assignment_id: Uuid) -> Result<RoleAssignmentResponse>;

    async fn list_role_assignments(
        &self,
        filter: RoleAssignmentFilter,
    ) -> Result<Page<RoleAssignmentResponse>>;

    async fn delete_role_assignment(&self, assignment_id: Uuid) -> Result<()>;

    // -------
    // Flavors
    // -------

    async fn create_flavor(&self, request: FlavorRequest) -> Result<FlavorResponse>;

    async fn get_flavor(&self, flavor_id: Uuid) -> Result<FlavorResponse>;

    async fn list_flavors(&self, filter: FlavorFilter) -> Result<Page<FlavorResponse>>;

    /// Delete a flavor. Rejected with [`StoreError::Conflict`] while a
    /// component of the same project and type is configured from it.
    ///
    /// [`StoreError::Conflict`]: crate::error::StoreError::Conflict
    async fn delete_flavor(&self, flavor_id: Uuid) -> Result<()>;

    // ----------------
    // Stack components
    // ----------------

    async fn create_stack_component(&self, request: ComponentRequest)
        -> Result<ComponentResponse>;

    async fn get_stack_component(&self, component_id: Uuid) -> Result<ComponentResponse>;

    async fn list_stack_components(
        &self,
        filter: ComponentFilter,
    ) -> Result<Page<ComponentResponse>>;

    async fn update_stack_component(
        &self,
        component_id: Uuid,
        update: ComponentUpdate,
    ) -> Result<ComponentResponse>;

    /// Delete a stack component. Rejected with [`StoreError::Conflict`]
    /// while any stack still bundles it.
    ///
    /// [`StoreError::Conflict`]: crate::error::StoreError::Conflict
    async fn delete_stack_component(&self, component_id: Uuid) -> Result<()>;

    // ------
    // Stacks
    // ------

    async fn create_stack(&self, request: StackRequest) -> Result<StackResponse>;

    async fn get_stack(&self, stack_id: Uuid) -> Result<StackResponse>;

    async fn list_stacks(&self, filter: StackFilter) -> Result<Page<StackResponse>>;

    async fn update_stack(&self, stack_id: Uuid, update: StackUpdate) -> Result<StackResponse>;

    /// Delete a stack. Runs that used it keep their records with the
    /// `stack` reference nulled.
    async fn delete_stack(&self, stack_id: Uuid) -> Result<()>;

    // ---------
    // Pipelines
    // ---------

    async fn create_pipeline(&self, request: PipelineRequest) -> Result<PipelineResponse>;

    async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineResponse>;

    async fn list_pipelines(&self, filter: PipelineFilter) -> Result<Page<PipelineResponse>>;

    async fn update_pipeline(
        &self,
        pipeline_id: Uuid,
        update: PipelineUpdate,
    ) -> Result<PipelineResponse>;

    /// Delete a pipeline definition. Runs of the pipeline keep their
    /// records with the `pipeline` reference nulled.
    async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<()>;

    // -------------
    // Pipeline runs
    // -------------

    async fn create_run(&self, request: RunRequest) -> Result<RunResponse>;

    async fn get_run(&self, run: &NameOrId) -> Result<RunResponse>;

    async fn list_runs(&self, filter: RunFilter) -> Result<Page<RunResponse>>;

    async fn update_run(&self, run_id: Uuid, update: RunUpdate) -> Result<RunResponse>;

    // ---------
    // Step runs
    // ---------

    async fn create_run_step(&self, request: StepRunRequest) -> Result<StepRunResponse>;

    async fn get_run_step(&self, step_id: Uuid) -> Result<StepRunResponse>;

    async fn list_run_steps(&self, filter: StepRunFilter) -> Result<Page<StepRunResponse>>;

    async fn update_run_step(
        &self,
        step_id: Uuid,
        update: StepRunUpdate,
    ) -> Result<StepRunResponse>;

    // ---------
    // Artifacts
    // ---------

    async fn create_artifact(&self, request: ArtifactRequest) -> Result<ArtifactResponse>;

    async fn get_artifact(&self, artifact_id: Uuid) -> Result<ArtifactResponse>;

    async fn list_artifacts(&self, filter: ArtifactFilter) -> Result<Page<ArtifactResponse>>;

    // -------------------------------------------------------------------
    // Compound-key lookups, implemented over the generic list methods so
    // backends only provide the primitive surface.
    // -------------------------------------------------------------------

    /// Get a pipeline by name within a project.
    async fn get_pipeline_in_project(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<PipelineResponse> {
        let page = self
            .list_pipelines(PipelineFilter {
                project: Some(project_id),
                name: Some(name.to_string()),
                pagination: Pagination::with_size(1),
                ..Default::default()
            })
            .await?;
        page.items.into_iter().next().ok_or_else(|| {
            StoreError::NotFound(format!("pipeline '{name}' in project {project_id}"))
        })
    }

    /// Get a flavor by name and component type within a project.
    async fn get_flavor_by_name_and_type(
        &self,
        project_id: Uuid,
        name: &str,
        component_type: StackComponentType,
    ) -> Result<FlavorResponse> {
        let page = self
            .list_flavors(FlavorFilter {
                project: Some(project_id),
                name: Some(name.to_string()),
                component_type: Some(component_type),
                pagination: Pagination::with_size(1),
                ..Default::default()
            })
            .await?;
        page.items.into_iter().next().ok_or_else(|| {
            StoreError::NotFound(format!("{component_type} flavor '{name}' in project {project_id}"))
        })
    }

    /// Resolve a step's declared inputs to the artifacts produced under the
    /// same output name by earlier steps of the same run.
    async fn get_run_step_inputs(
        &self,
        step_id: Uuid,
    ) -> Result<BTreeMap<String, ArtifactResponse>> {
        let step = self.get_run_step(step_id).await?;
        let steps = collect_run_steps(self, step.pipeline_run).await?;
        let artifacts = collect_step_artifacts(self, &steps).await?;
        let index = steps
            .iter()
            .position(|candidate| candidate.id == step.id)
            .ok_or_else(|| StoreError::NotFound(format!("step run {step_id}")))?;
        lineage::resolve_declared_inputs(index, &steps, &artifacts)
    }
}

/// Fetch every step run of a run, in insertion (execution) order.
pub(crate) async fn collect_run_steps<S: Store + ?Sized>(
    store: &S,
    run_id: Uuid,
) -> Result<Vec<StepRunResponse>> {
    let mut steps = Vec::new();
    let mut cursor = None;
    loop {
        let page = store
            .list_run_steps(StepRunFilter {
                pipeline_run: Some(run_id),
                pagination: Pagination {
                    size: system::MAX_PAGE_SIZE,
                    cursor,
                },
                ..Default::default()
            })
            .await?;
        cursor = page.next_cursor;
        steps.extend(page.items);
        if cursor.is_none() {
            break;
        }
    }
    Ok(steps)
}

/// Fetch the artifacts produced by each of the given steps, keyed by
/// producer step ID.
pub(crate) async fn collect_step_artifacts<S: Store + ?Sized>(
    store: &S,
    steps: &[StepRunResponse],
) -> Result<HashMap<Uuid, Vec<ArtifactResponse>>> {
    let fetches = steps.iter().map(|step| async move {
        let mut artifacts = Vec::new();
        let mut cursor = None;
        loop {
            let page = store
                .list_artifacts(ArtifactFilter {
                    producer_step_run: Some(step.id),
                    pagination: Pagination {
                        size: system::MAX_PAGE_SIZE,
                        cursor,
                    },
                    ..Default::default()
                })
                .await?;
            cursor = page.next_cursor;
            artifacts.extend(page.items);
            if cursor.is_none() {
                break;
            }
        }
        Ok::<_, StoreError>((step.id, artifacts))
    });
    let collected = futures::future::try_join_all(fetches).await?;
    Ok(collected.into_iter().collect())
}

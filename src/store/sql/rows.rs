//! Persisted row shapes and their conversions into response models.
//!
//! Rows mirror the normalized schema one-to-one; every conversion into the
//! domain model lives here so the model types stay plain data.

use crate::constants::{ExecutionStatus, PermissionType, StackComponentType};
use crate::error::Result;
use crate::models::*;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

fn parse_status(status: String) -> Result<ExecutionStatus> {
    Ok(serde_json::from_value(Value::String(status))?)
}

fn parse_component_type(component_type: String) -> Result<StackComponentType> {
    Ok(serde_json::from_value(Value::String(component_type))?)
}

#[derive(FromRow)]
pub(crate) struct ProjectRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRow {
    pub fn into_response(self) -> Result<ProjectResponse> {
        Ok(ProjectResponse {
            id: self.id,
            name: self.name,
            description: self.description,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_response(self) -> Result<UserResponse> {
        Ok(UserResponse {
            id: self.id,
            name: self.name,
            full_name: self.full_name,
            email: self.email,
            active: self.active,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct TeamRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    /// JSONB array of member user IDs, aggregated from `team_members`.
    pub users: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamRow {
    pub fn into_response(self) -> Result<TeamResponse> {
        Ok(TeamResponse {
            id: self.id,
            name: self.name,
            users: serde_json::from_value(self.users)?,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct RoleRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub permissions: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleRow {
    pub fn into_response(self) -> Result<RoleResponse> {
        let permissions: BTreeSet<PermissionType> = serde_json::from_value(self.permissions)?;
        Ok(RoleResponse {
            id: self.id,
            name: self.name,
            permissions,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct RoleAssignmentRow {
    pub id: Uuid,
    pub seq: i64,
    pub role_id: Uuid,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RoleAssignmentRow {
    pub fn into_response(self) -> Result<RoleAssignmentResponse> {
        Ok(RoleAssignmentResponse {
            id: self.id,
            role: self.role_id,
            user: self.user_id,
            team: self.team_id,
            project: self.project_id,
            created: self.created_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct FlavorRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub component_type: String,
    pub source: String,
    pub config_schema: Value,
    pub integration: Option<String>,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlavorRow {
    pub fn into_response(self) -> Result<FlavorResponse> {
        Ok(FlavorResponse {
            id: self.id,
            name: self.name,
            component_type: parse_component_type(self.component_type)?,
            source: self.source,
            config_schema: self.config_schema,
            integration: self.integration,
            project: self.project_id,
            user: self.user_id,
            is_shared: self.is_shared,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct ComponentRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub component_type: String,
    pub flavor: String,
    pub configuration: Value,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentRow {
    pub fn into_response(self) -> Result<ComponentResponse> {
        Ok(ComponentResponse {
            id: self.id,
            name: self.name,
            component_type: parse_component_type(self.component_type)?,
            flavor: self.flavor,
            configuration: self.configuration,
            project: self.project_id,
            user: self.user_id,
            is_shared: self.is_shared,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct StackRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub description: Option<String>,
    /// JSONB object of component_type → component ID, aggregated from
    /// `stack_composition`.
    pub components: Value,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StackRow {
    pub fn into_response(self) -> Result<StackResponse> {
        let components: BTreeMap<StackComponentType, Uuid> =
            serde_json::from_value(self.components)?;
        Ok(StackResponse {
            id: self.id,
            name: self.name,
            description: self.description,
            components,
            project: self.project_id,
            user: self.user_id,
            is_shared: self.is_shared,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct PipelineRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub docstring: Option<String>,
    pub spec: Value,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRow {
    pub fn into_response(self) -> Result<PipelineResponse> {
        Ok(PipelineResponse {
            id: self.id,
            name: self.name,
            docstring: self.docstring,
            spec: serde_json::from_value(self.spec)?,
            project: self.project_id,
            user: self.user_id,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct RunRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub pipeline_id: Option<Uuid>,
    pub stack_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: String,
    pub pipeline_configuration: Value,
    pub num_steps: Option<i32>,
    pub orchestrator_run_id: Option<String>,
    pub git_sha: Option<String>,
    pub client_version: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRow {
    pub fn into_response(self) -> Result<RunResponse> {
        Ok(RunResponse {
            id: self.id,
            name: self.name,
            pipeline: self.pipeline_id,
            stack: self.stack_id,
            project: self.project_id,
            user: self.user_id,
            status: parse_status(self.status)?,
            pipeline_configuration: self.pipeline_configuration,
            num_steps: self.num_steps,
            orchestrator_run_id: self.orchestrator_run_id,
            git_sha: self.git_sha,
            client_version: self.client_version,
            start_time: self.start_time,
            end_time: self.end_time,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct StepRunRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub pipeline_run_id: Uuid,
    pub source: String,
    pub parameters: Value,
    pub caching_parameters: Value,
    pub enable_cache: Option<bool>,
    pub inputs: Value,
    pub cache_key: Option<String>,
    pub docstring: Option<String>,
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepRunRow {
    pub fn into_response(self) -> Result<StepRunResponse> {
        Ok(StepRunResponse {
            id: self.id,
            name: self.name,
            pipeline_run: self.pipeline_run_id,
            source: self.source,
            parameters: self.parameters,
            caching_parameters: self.caching_parameters,
            enable_cache: self.enable_cache,
            inputs: serde_json::from_value(self.inputs)?,
            cache_key: self.cache_key,
            docstring: self.docstring,
            status: parse_status(self.status)?,
            start_time: self.start_time,
            end_time: self.end_time,
            created: self.created_at,
            updated: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct ArtifactRow {
    pub id: Uuid,
    pub seq: i64,
    pub name: String,
    pub uri: String,
    pub data_type: Option<String>,
    pub materializer: Option<String>,
    pub producer_step_run_id: Uuid,
    pub is_cached: bool,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRow {
    pub fn into_response(self) -> Result<ArtifactResponse> {
        Ok(ArtifactResponse {
            id: self.id,
            name: self.name,
            uri: self.uri,
            data_type: self.data_type,
            materializer: self.materializer,
            producer_step_run: self.producer_step_run_id,
            is_cached: self.is_cached,
            created: self.created_at,
        })
    }
}

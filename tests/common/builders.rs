//! Test data builders for store integration tests.

#![allow(dead_code)] // Not every test file uses every builder

use super::unique_name;
use pipestack_core::constants::{ExecutionStatus, PermissionType, StackComponentType};
use pipestack_core::models::{
    ArtifactRequest, ArtifactResponse, ComponentRequest, ComponentResponse, PipelineRequest,
    PipelineResponse, PipelineSpec, ProjectRequest, ProjectResponse, RoleRequest, RoleResponse,
    RunRequest, RunResponse, StackRequest, StackResponse, StepRunRequest, StepRunResponse,
    StepSpec, UserRequest, UserResponse,
};
use pipestack_core::store::Store;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A project plus an owning user, the scope most resources need.
pub struct TestScope {
    pub project: ProjectResponse,
    pub user: UserResponse,
}

pub async fn test_scope(store: &dyn Store) -> TestScope {
    let project = ProjectBuilder::new().build(store).await;
    let user = UserBuilder::new().build(store).await;
    TestScope { project, user }
}

pub struct ProjectBuilder {
    name: Option<String>,
    description: Option<String>,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            description: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub async fn build(self, store: &dyn Store) -> ProjectResponse {
        store
            .create_project(ProjectRequest {
                name: self.name.unwrap_or_else(|| unique_name("project")),
                description: self.description,
            })
            .await
            .expect("Failed to create test project")
    }
}

pub struct UserBuilder {
    name: Option<String>,
    active: bool,
}

impl UserBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            active: true,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub async fn build(self, store: &dyn Store) -> UserResponse {
        store
            .create_user(UserRequest {
                name: self.name.unwrap_or_else(|| unique_name("user")),
                full_name: None,
                email: None,
                active: self.active,
            })
            .await
            .expect("Failed to create test user")
    }
}

pub struct RoleBuilder {
    name: Option<String>,
    permissions: BTreeSet<PermissionType>,
}

impl RoleBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_permission(mut self, permission: PermissionType) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub async fn build(self, store: &dyn Store) -> RoleResponse {
        store
            .create_role(RoleRequest {
                name: self.name.unwrap_or_else(|| unique_name("role")),
                permissions: self.permissions,
            })
            .await
            .expect("Failed to create test role")
    }
}

pub struct ComponentBuilder {
    name: Option<String>,
    component_type: StackComponentType,
    flavor: String,
    project: Uuid,
    user: Uuid,
    is_shared: bool,
}

impl ComponentBuilder {
    pub fn new(scope: &TestScope) -> Self {
        Self {
            name: None,
            component_type: StackComponentType::Orchestrator,
            flavor: "local".to_string(),
            project: scope.project.id,
            user: scope.user.id,
            is_shared: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_type(mut self, component_type: StackComponentType) -> Self {
        self.component_type = component_type;
        self
    }

    pub fn with_flavor(mut self, flavor: &str) -> Self {
        self.flavor = flavor.to_string();
        self
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = user;
        self
    }

    pub fn shared(mut self) -> Self {
        self.is_shared = true;
        self
    }

    pub async fn build(self, store: &dyn Store) -> ComponentResponse {
        store
            .create_stack_component(ComponentRequest {
                name: self.name.unwrap_or_else(|| unique_name("component")),
                component_type: self.component_type,
                flavor: self.flavor,
                configuration: json!({}),
                project: self.project,
                user: self.user,
                is_shared: self.is_shared,
            })
            .await
            .expect("Failed to create test stack component")
    }
}

pub struct StackBuilder {
    name: Option<String>,
    components: BTreeMap<StackComponentType, Uuid>,
    project: Uuid,
    user: Uuid,
    is_shared: bool,
}

impl StackBuilder {
    pub fn new(scope: &TestScope) -> Self {
        Self {
            name: None,
            components: BTreeMap::new(),
            project: scope.project.id,
            user: scope.user.id,
            is_shared: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_component(mut self, component: &ComponentResponse) -> Self {
        self.components
            .insert(component.component_type, component.id);
        self
    }

    pub fn shared(mut self) -> Self {
        self.is_shared = true;
        self
    }

    pub async fn build(self, store: &dyn Store) -> StackResponse {
        store
            .create_stack(StackRequest {
                name: self.name.unwrap_or_else(|| unique_name("stack")),
                description: None,
                components: self.components,
                project: self.project,
                user: self.user,
                is_shared: self.is_shared,
            })
            .await
            .expect("Failed to create test stack")
    }
}

pub struct PipelineBuilder {
    name: Option<String>,
    steps: Vec<StepSpec>,
    project: Uuid,
    user: Uuid,
}

impl PipelineBuilder {
    pub fn new(scope: &TestScope) -> Self {
        Self {
            name: None,
            steps: Vec::new(),
            project: scope.project.id,
            user: scope.user.id,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_step(mut self, name: &str) -> Self {
        self.steps.push(StepSpec {
            name: name.to_string(),
            source: format!("steps.{name}"),
            upstream_steps: Vec::new(),
            enable_cache: None,
            parameters: json!({}),
        });
        self
    }

    pub async fn build(self, store: &dyn Store) -> PipelineResponse {
        store
            .create_pipeline(PipelineRequest {
                name: self.name.unwrap_or_else(|| unique_name("pipeline")),
                docstring: None,
                spec: PipelineSpec {
                    version: "0.2".to_string(),
                    steps: self.steps,
                },
                project: self.project,
                user: self.user,
            })
            .await
            .expect("Failed to create test pipeline")
    }
}

pub struct RunBuilder {
    name: Option<String>,
    pipeline: Option<Uuid>,
    stack: Option<Uuid>,
    project: Uuid,
    user: Uuid,
    status: ExecutionStatus,
}

impl RunBuilder {
    pub fn new(scope: &TestScope) -> Self {
        Self {
            name: None,
            pipeline: None,
            stack: None,
            project: scope.project.id,
            user: scope.user.id,
            status: ExecutionStatus::Running,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_pipeline(mut self, pipeline: &PipelineResponse) -> Self {
        self.pipeline = Some(pipeline.id);
        self
    }

    pub fn with_stack(mut self, stack: &StackResponse) -> Self {
        self.stack = Some(stack.id);
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    pub async fn build(self, store: &dyn Store) -> RunResponse {
        store
            .create_run(RunRequest {
                name: self.name.unwrap_or_else(|| unique_name("run")),
                pipeline: self.pipeline,
                stack: self.stack,
                project: self.project,
                user: self.user,
                status: self.status,
                pipeline_configuration: json!({}),
                num_steps: None,
                orchestrator_run_id: None,
                git_sha: None,
                client_version: None,
                start_time: None,
            })
            .await
            .expect("Failed to create test pipeline run")
    }
}

pub struct StepRunBuilder {
    name: Option<String>,
    pipeline_run: Uuid,
    inputs: Vec<String>,
    enable_cache: Option<bool>,
    cache_key: Option<String>,
    status: ExecutionStatus,
}

impl StepRunBuilder {
    pub fn new(run: &RunResponse) -> Self {
        Self {
            name: None,
            pipeline_run: run.id,
            inputs: Vec::new(),
            enable_cache: None,
            cache_key: None,
            status: ExecutionStatus::Completed,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_input(mut self, input: &str) -> Self {
        self.inputs.push(input.to_string());
        self
    }

    pub fn with_cache_key(mut self, cache_key: &str) -> Self {
        self.cache_key = Some(cache_key.to_string());
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    pub async fn build(self, store: &dyn Store) -> StepRunResponse {
        let name = self.name.unwrap_or_else(|| unique_name("step"));
        store
            .create_run_step(StepRunRequest {
                source: format!("steps.{name}"),
                name,
                pipeline_run: self.pipeline_run,
                parameters: json!({}),
                caching_parameters: json!({}),
                enable_cache: self.enable_cache,
                inputs: self.inputs,
                cache_key: self.cache_key,
                docstring: None,
                status: self.status,
                start_time: None,
            })
            .await
            .expect("Failed to create test step run")
    }
}

pub struct ArtifactBuilder {
    name: Option<String>,
    uri: Option<String>,
    producer_step_run: Uuid,
    is_cached: bool,
}

impl ArtifactBuilder {
    pub fn new(producer: &StepRunResponse) -> Self {
        Self {
            name: None,
            uri: None,
            producer_step_run: producer.id,
            is_cached: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn cached(mut self) -> Self {
        self.is_cached = true;
        self
    }

    pub async fn build(self, store: &dyn Store) -> ArtifactResponse {
        let name = self.name.unwrap_or_else(|| unique_name("artifact"));
        store
            .create_artifact(ArtifactRequest {
                uri: self
                    .uri
                    .unwrap_or_else(|| format!("s3://artifacts/{name}")),
                name,
                data_type: None,
                materializer: None,
                producer_step_run: self.producer_step_run,
                is_cached: self.is_cached,
            })
            .await
            .expect("Failed to create test artifact")
    }
}

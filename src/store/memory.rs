//! # In-Memory Store
//!
//! Map-backed store used by tests and ephemeral clients. All tables live
//! behind one `parking_lot::RwLock`, so a mutating call holds the write
//! lock for its whole check-then-write sequence — the same atomicity the
//! SQL backend gets from transactions plus constraints. Records carry a
//! store-wide monotonic insertion sequence that orders list pages.

use crate::error::{Result, StoreError};
use crate::identifier::NameOrId;
use crate::models::*;
use crate::validation::{validate_json_object, validate_name, validate_uri};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::Store;

struct Record<T> {
    seq: i64,
    model: T,
}

#[derive(Default)]
struct Tables {
    next_seq: i64,
    projects: HashMap<Uuid, Record<ProjectResponse>>,
    users: HashMap<Uuid, Record<UserResponse>>,
    teams: HashMap<Uuid, Record<TeamResponse>>,
    roles: HashMap<Uuid, Record<RoleResponse>>,
    role_assignments: HashMap<Uuid, Record<RoleAssignmentResponse>>,
    flavors: HashMap<Uuid, Record<FlavorResponse>>,
    components: HashMap<Uuid, Record<ComponentResponse>>,
    stacks: HashMap<Uuid, Record<StackResponse>>,
    pipelines: HashMap<Uuid, Record<PipelineResponse>>,
    runs: HashMap<Uuid, Record<RunResponse>>,
    step_runs: HashMap<Uuid, Record<StepRunResponse>>,
    artifacts: HashMap<Uuid, Record<ArtifactResponse>>,
}

impl Tables {
    fn next_seq(&mut self) -> i64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Assemble one page from (sequence, model) matches.
fn page_from<T: Clone>(mut matches: Vec<(i64, T)>, pagination: &Pagination) -> Page<T> {
    matches.sort_by_key(|(seq, _)| *seq);
    let total = matches.len() as u64;
    let limit = pagination.limit() as usize;
    let after = pagination.cursor.unwrap_or(i64::MIN);

    let mut remaining = matches.into_iter().filter(|(seq, _)| *seq > after);
    let mut items = Vec::with_capacity(limit);
    let mut last_seq = None;
    for (seq, model) in remaining.by_ref().take(limit) {
        last_seq = Some(seq);
        items.push(model);
    }
    let next_cursor = if remaining.next().is_some() {
        last_seq
    } else {
        None
    };

    Page {
        items,
        total,
        size: pagination.limit(),
        next_cursor,
    }
}

fn matches_name(filter: &Option<String>, name: &str) -> bool {
    filter.as_deref().map_or(true, |wanted| wanted == name)
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

// Lookup helpers shared by the trait methods. All take the already-locked
// table set so callers control the critical section.
impl Tables {
    fn project_id(&self, project: &NameOrId) -> Result<Uuid> {
        match project {
            NameOrId::Id(id) if self.projects.contains_key(id) => Ok(*id),
            NameOrId::Name(name) => self
                .projects
                .values()
                .find(|record| record.model.name == *name)
                .map(|record| record.model.id)
                .ok_or_else(|| StoreError::NotFound(format!("project {name}"))),
            NameOrId::Id(id) => Err(StoreError::NotFound(format!("project {id}"))),
        }
    }

    fn user_id(&self, user: &NameOrId) -> Result<Uuid> {
        match user {
            NameOrId::Id(id) if self.users.contains_key(id) => Ok(*id),
            NameOrId::Name(name) => self
                .users
                .values()
                .find(|record| record.model.name == *name)
                .map(|record| record.model.id)
                .ok_or_else(|| StoreError::NotFound(format!("user {name}"))),
            NameOrId::Id(id) => Err(StoreError::NotFound(format!("user {id}"))),
        }
    }

    fn team_id(&self, team: &NameOrId) -> Result<Uuid> {
        match team {
            NameOrId::Id(id) if self.teams.contains_key(id) => Ok(*id),
            NameOrId::Name(name) => self
                .teams
                .values()
                .find(|record| record.model.name == *name)
                .map(|record| record.model.id)
                .ok_or_else(|| StoreError::NotFound(format!("team {name}"))),
            NameOrId::Id(id) => Err(StoreError::NotFound(format!("team {id}"))),
        }
    }

    fn role_id(&self, role: &NameOrId) -> Result<Uuid> {
        match role {
            NameOrId::Id(id) if self.roles.contains_key(id) => Ok(*id),
            NameOrId::Name(name) => self
                .roles
                .values()
                .find(|record| record.model.name == *name)
                .map(|record| record.model.id)
                .ok_or_else(|| StoreError::NotFound(format!("role {name}"))),
            NameOrId::Id(id) => Err(StoreError::NotFound(format!("role {id}"))),
        }
    }

    fn require_project(&self, project_id: Uuid) -> Result<()> {
        if self.projects.contains_key(&project_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("project {project_id}")))
        }
    }

    fn require_user(&self, user_id: Uuid) -> Result<()> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("user {user_id}")))
        }
    }

    /// Shared/private scoped-uniqueness check for stacks: shared records
    /// collide per project, private records per (project, owner).
    fn stack_name_taken(
        &self,
        name: &str,
        project: Uuid,
        owner: Option<Uuid>,
        is_shared: bool,
        exclude: Option<Uuid>,
    ) -> bool {
        self.stacks.values().any(|record| {
            let stack = &record.model;
            Some(stack.id) != exclude
                && stack.project == project
                && stack.name == name
                && stack.is_shared == is_shared
                && (is_shared || stack.user == owner)
        })
    }

    fn component_name_taken(
        &self,
        name: &str,
        component_type: crate::constants::StackComponentType,
        project: Uuid,
        owner: Option<Uuid>,
        is_shared: bool,
        exclude: Option<Uuid>,
    ) -> bool {
        self.components.values().any(|record| {
            let component = &record.model;
            Some(component.id) != exclude
                && component.project == project
                && component.component_type == component_type
                && component.name == name
                && component.is_shared == is_shared
                && (is_shared || component.user == owner)
        })
    }

    fn flavor_name_taken(
        &self,
        name: &str,
        component_type: crate::constants::StackComponentType,
        project: Uuid,
        owner: Option<Uuid>,
        is_shared: bool,
    ) -> bool {
        self.flavors.values().any(|record| {
            let flavor = &record.model;
            flavor.project == project
                && flavor.component_type == component_type
                && flavor.name == name
                && flavor.is_shared == is_shared
                && (is_shared || flavor.user == owner)
        })
    }

    /// Validate that every component of a stack request exists, lives in
    /// the stack's project, and matches the type it is bundled under.
    fn check_stack_components(
        &self,
        project: Uuid,
        components: &std::collections::BTreeMap<crate::constants::StackComponentType, Uuid>,
    ) -> Result<()> {
        for (component_type, component_id) in components {
            let component = self
                .components
                .get(component_id)
                .map(|record| &record.model)
                .ok_or_else(|| {
                    StoreError::NotFound(format!("stack component {component_id}"))
                })?;
            if component.component_type != *component_type {
                return Err(StoreError::Validation(format!(
                    "component {component_id} is a {} component, not {component_type}",
                    component.component_type
                )));
            }
            if component.project != project {
                return Err(StoreError::Validation(format!(
                    "component {component_id} belongs to another project"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    // --------
    // Projects
    // --------

    async fn create_project(&self, request: ProjectRequest) -> Result<ProjectResponse> {
        validate_name("project", &request.name)?;
        let mut tables = self.tables.write();
        if tables
            .projects
            .values()
            .any(|record| record.model.name == request.name)
        {
            return Err(StoreError::EntityExists(format!(
                "project '{}'",
                request.name
            )));
        }
        let now = Utc::now();
        let model = ProjectResponse {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables.projects.insert(model.id, Record { seq, model: model.clone() });
        debug!(project = %model.name, id = %model.id, "created project");
        Ok(model)
    }

    async fn get_project(&self, project: &NameOrId) -> Result<ProjectResponse> {
        let tables = self.tables.read();
        let id = tables.project_id(project)?;
        Ok(tables.projects[&id].model.clone())
    }

    async fn list_projects(&self, filter: ProjectFilter) -> Result<Page<ProjectResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .projects
            .values()
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_project(
        &self,
        project_id: Uuid,
        update: ProjectUpdate,
    ) -> Result<ProjectResponse> {
        if let Some(name) = &update.name {
            validate_name("project", name)?;
        }
        let mut tables = self.tables.write();
        tables
            .projects
            .get(&project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))?;
        if let Some(name) = &update.name {
            if tables
                .projects
                .values()
                .any(|record| record.model.id != project_id && record.model.name == *name)
            {
                return Err(StoreError::EntityExists(format!("project '{name}'")));
            }
        }
        let record = tables.projects.get_mut(&project_id).expect("checked above");
        if let Some(name) = update.name {
            record.model.name = name;
        }
        if let Some(description) = update.description {
            record.model.description = Some(description);
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    async fn delete_project(&self, project: &NameOrId) -> Result<()> {
        let mut tables = self.tables.write();
        let id = tables.project_id(project)?;
        tables.stacks.retain(|_, record| record.model.project != id);
        tables.components.retain(|_, record| record.model.project != id);
        tables.flavors.retain(|_, record| record.model.project != id);
        tables.pipelines.retain(|_, record| record.model.project != id);
        tables
            .role_assignments
            .retain(|_, record| record.model.project != Some(id));
        let now = Utc::now();
        for record in tables.runs.values_mut() {
            if record.model.project == Some(id) {
                record.model.project = None;
                record.model.updated = now;
            }
        }
        tables.projects.remove(&id);
        debug!(project = %id, "deleted project");
        Ok(())
    }

    // -----
    // Users
    // -----

    async fn create_user(&self, request: UserRequest) -> Result<UserResponse> {
        validate_name("user", &request.name)?;
        let mut tables = self.tables.write();
        if tables
            .users
            .values()
            .any(|record| record.model.name == request.name)
        {
            return Err(StoreError::EntityExists(format!("user '{}'", request.name)));
        }
        let now = Utc::now();
        let model = UserResponse {
            id: Uuid::new_v4(),
            name: request.name,
            full_name: request.full_name,
            email: request.email,
            active: request.active,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables.users.insert(model.id, Record { seq, model: model.clone() });
        Ok(model)
    }

    async fn get_user(&self, user: &NameOrId) -> Result<UserResponse> {
        let tables = self.tables.read();
        let id = tables.user_id(user)?;
        Ok(tables.users[&id].model.clone())
    }

    async fn list_users(&self, filter: UserFilter) -> Result<Page<UserResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .users
            .values()
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .active
                    .map_or(true, |active| record.model.active == active)
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> Result<UserResponse> {
        if let Some(name) = &update.name {
            validate_name("user", name)?;
        }
        let mut tables = self.tables.write();
        tables
            .users
            .get(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        if let Some(name) = &update.name {
            if tables
                .users
                .values()
                .any(|record| record.model.id != user_id && record.model.name == *name)
            {
                return Err(StoreError::EntityExists(format!("user '{name}'")));
            }
        }
        let record = tables.users.get_mut(&user_id).expect("checked above");
        if let Some(name) = update.name {
            record.model.name = name;
        }
        if let Some(full_name) = update.full_name {
            record.model.full_name = Some(full_name);
        }
        if let Some(email) = update.email {
            record.model.email = Some(email);
        }
        if let Some(active) = update.active {
            record.model.active = active;
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    async fn delete_user(&self, user: &NameOrId) -> Result<()> {
        let mut tables = self.tables.write();
        let id = tables.user_id(user)?;
        tables
            .role_assignments
            .retain(|_, record| record.model.user != Some(id));
        let now = Utc::now();
        for record in tables.teams.values_mut() {
            if record.model.users.contains(&id) {
                record.model.users.retain(|member| *member != id);
                record.model.updated = now;
            }
        }
        for record in tables.flavors.values_mut() {
            if record.model.user == Some(id) {
                record.model.user = None;
            }
        }
        for record in tables.components.values_mut() {
            if record.model.user == Some(id) {
                record.model.user = None;
            }
        }
        for record in tables.stacks.values_mut() {
            if record.model.user == Some(id) {
                record.model.user = None;
            }
        }
        for record in tables.pipelines.values_mut() {
            if record.model.user == Some(id) {
                record.model.user = None;
            }
        }
        for record in tables.runs.values_mut() {
            if record.model.user == Some(id) {
                record.model.user = None;
            }
        }
        tables.users.remove(&id);
        debug!(user = %id, "deleted user");
        Ok(())
    }

    // -----
    // Teams
    // -----

    async fn create_team(&self, request: TeamRequest) -> Result<TeamResponse> {
        validate_name("team", &request.name)?;
        let mut tables = self.tables.write();
        if tables
            .teams
            .values()
            .any(|record| record.model.name == request.name)
        {
            return Err(StoreError::EntityExists(format!("team '{}'", request.name)));
        }
        let mut users = request.users;
        users.sort();
        users.dedup();
        for user_id in &users {
            tables.require_user(*user_id)?;
        }
        let now = Utc::now();
        let model = TeamResponse {
            id: Uuid::new_v4(),
            name: request.name,
            users,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables.teams.insert(model.id, Record { seq, model: model.clone() });
        Ok(model)
    }

    async fn get_team(&self, team: &NameOrId) -> Result<TeamResponse> {
        let tables = self.tables.read();
        let id = tables.team_id(team)?;
        Ok(tables.teams[&id].model.clone())
    }

    async fn list_teams(&self, filter: TeamFilter) -> Result<Page<TeamResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .teams
            .values()
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .user
                    .map_or(true, |user| record.model.users.contains(&user))
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_team(&self, team_id: Uuid, update: TeamUpdate) -> Result<TeamResponse> {
        if let Some(name) = &update.name {
            validate_name("team", name)?;
        }
        let mut tables = self.tables.write();
        tables
            .teams
            .get(&team_id)
            .ok_or_else(|| StoreError::NotFound(format!("team {team_id}")))?;
        if let Some(name) = &update.name {
            if tables
                .teams
                .values()
                .any(|record| record.model.id != team_id && record.model.name == *name)
            {
                return Err(StoreError::EntityExists(format!("team '{name}'")));
            }
        }
        let users = match update.users {
            Some(mut requested) => {
                requested.sort();
                requested.dedup();
                for user_id in &requested {
                    tables.require_user(*user_id)?;
                }
                Some(requested)
            }
            None => None,
        };
        let record = tables.teams.get_mut(&team_id).expect("checked above");
        if let Some(name) = update.name {
            record.model.name = name;
        }
        if let Some(users) = users {
            record.model.users = users;
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    async fn delete_team(&self, team: &NameOrId) -> Result<()> {
        let mut tables = self.tables.write();
        let id = tables.team_id(team)?;
        tables
            .role_assignments
            .retain(|_, record| record.model.team != Some(id));
        tables.teams.remove(&id);
        Ok(())
    }

    // -----
    // Roles
    // -----

    async fn create_role(&self, request: RoleRequest) -> Result<RoleResponse> {
        validate_name("role", &request.name)?;
        let mut tables = self.tables.write();
        if tables
            .roles
            .values()
            .any(|record| record.model.name == request.name)
        {
            return Err(StoreError::EntityExists(format!("role '{}'", request.name)));
        }
        let now = Utc::now();
        let model = RoleResponse {
            id: Uuid::new_v4(),
            name: request.name,
            permissions: request.permissions,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables.roles.insert(model.id, Record { seq, model: model.clone() });
        Ok(model)
    }

    async fn get_role(&self, role: &NameOrId) -> Result<RoleResponse> {
        let tables = self.tables.read();
        let id = tables.role_id(role)?;
        Ok(tables.roles[&id].model.clone())
    }

    async fn list_roles(&self, filter: RoleFilter) -> Result<Page<RoleResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .roles
            .values()
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_role(&self, role_id: Uuid, update: RoleUpdate) -> Result<RoleResponse> {
        if let Some(name) = &update.name {
            validate_name("role", name)?;
        }
        let mut tables = self.tables.write();
        tables
            .roles
            .get(&role_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
        if let Some(name) = &update.name {
            if tables
                .roles
                .values()
                .any(|record| record.model.id != role_id && record.model.name == *name)
            {
                return Err(StoreError::EntityExists(format!("role '{name}'")));
            }
        }
        let record = tables.roles.get_mut(&role_id).expect("checked above");
        if let Some(name) = update.name {
            record.model.name = name;
        }
        if let Some(permissions) = update.permissions {
            record.model.permissions = permissions;
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    async fn delete_role(&self, role: &NameOrId) -> Result<()> {
        let mut tables = self.tables.write();
        let id = tables.role_id(role)?;
        if tables
            .role_assignments
            .values()
            .any(|record| record.model.role == id)
        {
            return Err(StoreError::Conflict(format!(
                "role {id} still has active assignments"
            )));
        }
        tables.roles.remove(&id);
        Ok(())
    }

    // ----------------
    // Role assignments
    // ----------------

    async fn create_role_assignment(
        &self,
        request: RoleAssignmentRequest,
    ) -> Result<RoleAssignmentResponse> {
        if request.user.is_some() == request.team.is_some() {
            return Err(StoreError::Validation(
                "role assignment must target exactly one of user or team".into(),
            ));
        }
        let mut tables = self.tables.write();
        if !tables.roles.contains_key(&request.role) {
            return Err(StoreError::NotFound(format!("role {}", request.role)));
        }
        if let Some(user_id) = request.user {
            tables.require_user(user_id)?;
        }
        if let Some(team_id) = request.team {
            if !tables.teams.contains_key(&team_id) {
                return Err(StoreError::NotFound(format!("team {team_id}")));
            }
        }
        if let Some(project_id) = request.project {
            tables.require_project(project_id)?;
        }
        let model = RoleAssignmentResponse {
            id: Uuid::new_v4(),
            role: request.role,
            user: request.user,
            team: request.team,
            project: request.project,
            created: Utc::now(),
        };
        let seq = tables.next_seq();
        tables
            .role_assignments
            .insert(model.id, Record { seq, model: model.clone() });
        Ok(model)
    }

    async fn get_role_assignment(&self, assignment_id: Uuid) -> Result<RoleAssignmentResponse> {
        let tables = self.tables.read();
        tables
            .role_assignments
            .get(&assignment_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("role assignment {assignment_id}")))
    }

    async fn list_role_assignments(
        &self,
        filter: RoleAssignmentFilter,
    ) -> Result<Page<RoleAssignmentResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .role_assignments
            .values()
            .filter(|record| filter.role.map_or(true, |role| record.model.role == role))
            .filter(|record| filter.user.map_or(true, |user| record.model.user == Some(user)))
            .filter(|record| filter.team.map_or(true, |team| record.model.team == Some(team)))
            .filter(|record| {
                filter
                    .project
                    .map_or(true, |project| record.model.project == Some(project))
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn delete_role_assignment(&self, assignment_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        tables
            .role_assignments
            .remove(&assignment_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("role assignment {assignment_id}")))
    }

    // -------
    // Flavors
    // -------

    async fn create_flavor(&self, request: FlavorRequest) -> Result<FlavorResponse> {
        validate_name("flavor", &request.name)?;
        validate_json_object("config_schema", &request.config_schema)?;
        let mut tables = self.tables.write();
        tables.require_project(request.project)?;
        tables.require_user(request.user)?;
        if tables.flavor_name_taken(
            &request.name,
            request.component_type,
            request.project,
            Some(request.user),
            request.is_shared,
        ) {
            return Err(StoreError::EntityExists(format!(
                "{} flavor '{}'",
                request.component_type, request.name
            )));
        }
        let now = Utc::now();
        let model = FlavorResponse {
            id: Uuid::new_v4(),
            name: request.name,
            component_type: request.component_type,
            source: request.source,
            config_schema: request.config_schema,
            integration: request.integration,
            project: request.project,
            user: Some(request.user),
            is_shared: request.is_shared,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables.flavors.insert(model.id, Record { seq, model: model.clone() });
        Ok(model)
    }

    async fn get_flavor(&self, flavor_id: Uuid) -> Result<FlavorResponse> {
        let tables = self.tables.read();
        tables
            .flavors
            .get(&flavor_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("flavor {flavor_id}")))
    }

    async fn list_flavors(&self, filter: FlavorFilter) -> Result<Page<FlavorResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .flavors
            .values()
            .filter(|record| {
                filter
                    .project
                    .map_or(true, |project| record.model.project == project)
            })
            .filter(|record| filter.user.map_or(true, |user| record.model.user == Some(user)))
            .filter(|record| {
                filter
                    .component_type
                    .map_or(true, |ty| record.model.component_type == ty)
            })
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .is_shared
                    .map_or(true, |shared| record.model.is_shared == shared)
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn delete_flavor(&self, flavor_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        let flavor = tables
            .flavors
            .get(&flavor_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("flavor {flavor_id}")))?;
        if let Some(component) = tables.components.values().find(|record| {
            record.model.project == flavor.project
                && record.model.component_type == flavor.component_type
                && record.model.flavor == flavor.name
        }) {
            return Err(StoreError::Conflict(format!(
                "flavor '{}' is used by stack component '{}'",
                flavor.name, component.model.name
            )));
        }
        tables.flavors.remove(&flavor_id);
        Ok(())
    }

    // ----------------
    // Stack components
    // ----------------

    async fn create_stack_component(
        &self,
        request: ComponentRequest,
    ) -> Result<ComponentResponse> {
        validate_name("stack component", &request.name)?;
        validate_json_object("configuration", &request.configuration)?;
        let mut tables = self.tables.write();
        tables.require_project(request.project)?;
        tables.require_user(request.user)?;
        if tables.component_name_taken(
            &request.name,
            request.component_type,
            request.project,
            Some(request.user),
            request.is_shared,
            None,
        ) {
            return Err(StoreError::EntityExists(format!(
                "{} component '{}'",
                request.component_type, request.name
            )));
        }
        let now = Utc::now();
        let model = ComponentResponse {
            id: Uuid::new_v4(),
            name: request.name,
            component_type: request.component_type,
            flavor: request.flavor,
            configuration: request.configuration,
            project: request.project,
            user: Some(request.user),
            is_shared: request.is_shared,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables
            .components
            .insert(model.id, Record { seq, model: model.clone() });
        debug!(component = %model.name, ty = %model.component_type, "registered stack component");
        Ok(model)
    }

    async fn get_stack_component(&self, component_id: Uuid) -> Result<ComponentResponse> {
        let tables = self.tables.read();
        tables
            .components
            .get(&component_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("stack component {component_id}")))
    }

    async fn list_stack_components(
        &self,
        filter: ComponentFilter,
    ) -> Result<Page<ComponentResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .components
            .values()
            .filter(|record| {
                filter
                    .project
                    .map_or(true, |project| record.model.project == project)
            })
            .filter(|record| filter.user.map_or(true, |user| record.model.user == Some(user)))
            .filter(|record| {
                filter
                    .component_type
                    .map_or(true, |ty| record.model.component_type == ty)
            })
            .filter(|record| {
                filter
                    .flavor
                    .as_deref()
                    .map_or(true, |flavor| record.model.flavor == flavor)
            })
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .is_shared
                    .map_or(true, |shared| record.model.is_shared == shared)
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_stack_component(
        &self,
        component_id: Uuid,
        update: ComponentUpdate,
    ) -> Result<ComponentResponse> {
        if let Some(name) = &update.name {
            validate_name("stack component", name)?;
        }
        if let Some(configuration) = &update.configuration {
            validate_json_object("configuration", configuration)?;
        }
        let mut tables = self.tables.write();
        let current = tables
            .components
            .get(&component_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("stack component {component_id}")))?;
        let new_name = update.name.clone().unwrap_or_else(|| current.name.clone());
        let new_shared = update.is_shared.unwrap_or(current.is_shared);
        if (new_name != current.name || new_shared != current.is_shared)
            && tables.component_name_taken(
                &new_name,
                current.component_type,
                current.project,
                current.user,
                new_shared,
                Some(component_id),
            )
        {
            return Err(StoreError::EntityExists(format!(
                "{} component '{new_name}'",
                current.component_type
            )));
        }
        let record = tables
            .components
            .get_mut(&component_id)
            .expect("checked above");
        if let Some(name) = update.name {
            record.model.name = name;
        }
        if let Some(configuration) = update.configuration {
            record.model.configuration = configuration;
        }
        if let Some(is_shared) = update.is_shared {
            record.model.is_shared = is_shared;
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    async fn delete_stack_component(&self, component_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.components.contains_key(&component_id) {
            return Err(StoreError::NotFound(format!(
                "stack component {component_id}"
            )));
        }
        if let Some(stack) = tables.stacks.values().find(|record| {
            record
                .model
                .components
                .values()
                .any(|id| *id == component_id)
        }) {
            return Err(StoreError::Conflict(format!(
                "stack component {component_id} is used by stack '{}'",
                stack.model.name
            )));
        }
        tables.components.remove(&component_id);
        Ok(())
    }

    // ------
    // Stacks
    // ------

    async fn create_stack(&self, request: StackRequest) -> Result<StackResponse> {
        validate_name("stack", &request.name)?;
        let mut tables = self.tables.write();
        tables.require_project(request.project)?;
        tables.require_user(request.user)?;
        tables.check_stack_components(request.project, &request.components)?;
        if tables.stack_name_taken(
            &request.name,
            request.project,
            Some(request.user),
            request.is_shared,
            None,
        ) {
            return Err(StoreError::EntityExists(format!(
                "stack '{}'",
                request.name
            )));
        }
        let now = Utc::now();
        let model = StackResponse {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            components: request.components,
            project: request.project,
            user: Some(request.user),
            is_shared: request.is_shared,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables.stacks.insert(model.id, Record { seq, model: model.clone() });
        debug!(stack = %model.name, id = %model.id, "registered stack");
        Ok(model)
    }

    async fn get_stack(&self, stack_id: Uuid) -> Result<StackResponse> {
        let tables = self.tables.read();
        tables
            .stacks
            .get(&stack_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("stack {stack_id}")))
    }

    async fn list_stacks(&self, filter: StackFilter) -> Result<Page<StackResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .stacks
            .values()
            .filter(|record| {
                filter
                    .project
                    .map_or(true, |project| record.model.project == project)
            })
            .filter(|record| filter.user.map_or(true, |user| record.model.user == Some(user)))
            .filter(|record| {
                filter.component_id.map_or(true, |component| {
                    record.model.components.values().any(|id| *id == component)
                })
            })
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .is_shared
                    .map_or(true, |shared| record.model.is_shared == shared)
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_stack(&self, stack_id: Uuid, update: StackUpdate) -> Result<StackResponse> {
        if let Some(name) = &update.name {
            validate_name("stack", name)?;
        }
        let mut tables = self.tables.write();
        let current = tables
            .stacks
            .get(&stack_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("stack {stack_id}")))?;
        if let Some(components) = &update.components {
            tables.check_stack_components(current.project, components)?;
        }
        let new_name = update.name.clone().unwrap_or_else(|| current.name.clone());
        let new_shared = update.is_shared.unwrap_or(current.is_shared);
        if (new_name != current.name || new_shared != current.is_shared)
            && tables.stack_name_taken(
                &new_name,
                current.project,
                current.user,
                new_shared,
                Some(stack_id),
            )
        {
            return Err(StoreError::EntityExists(format!("stack '{new_name}'")));
        }
        let record = tables.stacks.get_mut(&stack_id).expect("checked above");
        if let Some(name) = update.name {
            record.model.name = name;
        }
        if let Some(description) = update.description {
            record.model.description = Some(description);
        }
        if let Some(components) = update.components {
            record.model.components = components;
        }
        if let Some(is_shared) = update.is_shared {
            record.model.is_shared = is_shared;
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    async fn delete_stack(&self, stack_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.stacks.contains_key(&stack_id) {
            return Err(StoreError::NotFound(format!("stack {stack_id}")));
        }
        let now = Utc::now();
        for record in tables.runs.values_mut() {
            if record.model.stack == Some(stack_id) {
                record.model.stack = None;
                record.model.updated = now;
            }
        }
        tables.stacks.remove(&stack_id);
        debug!(stack = %stack_id, "deleted stack");
        Ok(())
    }

    // ---------
    // Pipelines
    // ---------

    async fn create_pipeline(&self, request: PipelineRequest) -> Result<PipelineResponse> {
        validate_name("pipeline", &request.name)?;
        let mut step_names = std::collections::HashSet::new();
        for step in &request.spec.steps {
            validate_name("pipeline step", &step.name)?;
            if !step_names.insert(step.name.as_str()) {
                return Err(StoreError::Validation(format!(
                    "pipeline spec declares step '{}' more than once",
                    step.name
                )));
            }
        }
        let mut tables = self.tables.write();
        tables.require_project(request.project)?;
        tables.require_user(request.user)?;
        if tables.pipelines.values().any(|record| {
            record.model.project == request.project && record.model.name == request.name
        }) {
            return Err(StoreError::EntityExists(format!(
                "pipeline '{}'",
                request.name
            )));
        }
        let now = Utc::now();
        let model = PipelineResponse {
            id: Uuid::new_v4(),
            name: request.name,
            docstring: request.docstring,
            spec: request.spec,
            project: request.project,
            user: Some(request.user),
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables
            .pipelines
            .insert(model.id, Record { seq, model: model.clone() });
        debug!(pipeline = %model.name, id = %model.id, "registered pipeline");
        Ok(model)
    }

    async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineResponse> {
        let tables = self.tables.read();
        tables
            .pipelines
            .get(&pipeline_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("pipeline {pipeline_id}")))
    }

    async fn list_pipelines(&self, filter: PipelineFilter) -> Result<Page<PipelineResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .pipelines
            .values()
            .filter(|record| {
                filter
                    .project
                    .map_or(true, |project| record.model.project == project)
            })
            .filter(|record| filter.user.map_or(true, |user| record.model.user == Some(user)))
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_pipeline(
        &self,
        pipeline_id: Uuid,
        update: PipelineUpdate,
    ) -> Result<PipelineResponse> {
        if let Some(name) = &update.name {
            validate_name("pipeline", name)?;
        }
        let mut tables = self.tables.write();
        let current = tables
            .pipelines
            .get(&pipeline_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("pipeline {pipeline_id}")))?;
        if let Some(name) = &update.name {
            if *name != current.name
                && tables.pipelines.values().any(|record| {
                    record.model.project == current.project && record.model.name == *name
                })
            {
                return Err(StoreError::EntityExists(format!("pipeline '{name}'")));
            }
        }
        let record = tables.pipelines.get_mut(&pipeline_id).expect("checked above");
        if let Some(name) = update.name {
            record.model.name = name;
        }
        if let Some(docstring) = update.docstring {
            record.model.docstring = Some(docstring);
        }
        if let Some(spec) = update.spec {
            record.model.spec = spec;
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.pipelines.contains_key(&pipeline_id) {
            return Err(StoreError::NotFound(format!("pipeline {pipeline_id}")));
        }
        let now = Utc::now();
        for record in tables.runs.values_mut() {
            if record.model.pipeline == Some(pipeline_id) {
                record.model.pipeline = None;
                record.model.updated = now;
            }
        }
        tables.pipelines.remove(&pipeline_id);
        debug!(pipeline = %pipeline_id, "deleted pipeline");
        Ok(())
    }

    // -------------
    // Pipeline runs
    // -------------

    async fn create_run(&self, request: RunRequest) -> Result<RunResponse> {
        validate_name("pipeline run", &request.name)?;
        validate_json_object("pipeline_configuration", &request.pipeline_configuration)?;
        let mut tables = self.tables.write();
        tables.require_project(request.project)?;
        tables.require_user(request.user)?;
        if let Some(pipeline_id) = request.pipeline {
            if !tables.pipelines.contains_key(&pipeline_id) {
                return Err(StoreError::NotFound(format!("pipeline {pipeline_id}")));
            }
        }
        if let Some(stack_id) = request.stack {
            if !tables.stacks.contains_key(&stack_id) {
                return Err(StoreError::NotFound(format!("stack {stack_id}")));
            }
        }
        if tables
            .runs
            .values()
            .any(|record| record.model.name == request.name)
        {
            return Err(StoreError::EntityExists(format!(
                "pipeline run '{}'",
                request.name
            )));
        }
        let now = Utc::now();
        let model = RunResponse {
            id: Uuid::new_v4(),
            name: request.name,
            pipeline: request.pipeline,
            stack: request.stack,
            project: Some(request.project),
            user: Some(request.user),
            status: request.status,
            pipeline_configuration: request.pipeline_configuration,
            num_steps: request.num_steps,
            orchestrator_run_id: request.orchestrator_run_id,
            git_sha: request.git_sha,
            client_version: request.client_version,
            start_time: request.start_time,
            end_time: None,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables.runs.insert(model.id, Record { seq, model: model.clone() });
        debug!(run = %model.name, id = %model.id, "created pipeline run");
        Ok(model)
    }

    async fn get_run(&self, run: &NameOrId) -> Result<RunResponse> {
        let tables = self.tables.read();
        match run {
            NameOrId::Id(id) => tables
                .runs
                .get(id)
                .map(|record| record.model.clone())
                .ok_or_else(|| StoreError::NotFound(format!("pipeline run {id}"))),
            NameOrId::Name(name) => tables
                .runs
                .values()
                .find(|record| record.model.name == *name)
                .map(|record| record.model.clone())
                .ok_or_else(|| StoreError::NotFound(format!("pipeline run {name}"))),
        }
    }

    async fn list_runs(&self, filter: RunFilter) -> Result<Page<RunResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .runs
            .values()
            .filter(|record| {
                filter
                    .project
                    .map_or(true, |project| record.model.project == Some(project))
            })
            .filter(|record| filter.user.map_or(true, |user| record.model.user == Some(user)))
            .filter(|record| {
                filter
                    .pipeline
                    .map_or(true, |pipeline| record.model.pipeline == Some(pipeline))
            })
            .filter(|record| {
                filter
                    .stack
                    .map_or(true, |stack| record.model.stack == Some(stack))
            })
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .status
                    .map_or(true, |status| record.model.status == status)
            })
            .filter(|record| {
                filter.unlisted.map_or(true, |unlisted| {
                    record.model.pipeline.is_none() == unlisted
                })
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_run(&self, run_id: Uuid, update: RunUpdate) -> Result<RunResponse> {
        let mut tables = self.tables.write();
        let record = tables
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::NotFound(format!("pipeline run {run_id}")))?;
        if let Some(status) = update.status {
            record.model.status = status;
        }
        if let Some(num_steps) = update.num_steps {
            record.model.num_steps = Some(num_steps);
        }
        if let Some(end_time) = update.end_time {
            record.model.end_time = Some(end_time);
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    // ---------
    // Step runs
    // ---------

    async fn create_run_step(&self, request: StepRunRequest) -> Result<StepRunResponse> {
        validate_name("step run", &request.name)?;
        validate_json_object("parameters", &request.parameters)?;
        validate_json_object("caching_parameters", &request.caching_parameters)?;
        let mut tables = self.tables.write();
        if !tables.runs.contains_key(&request.pipeline_run) {
            return Err(StoreError::NotFound(format!(
                "pipeline run {}",
                request.pipeline_run
            )));
        }
        if tables.step_runs.values().any(|record| {
            record.model.pipeline_run == request.pipeline_run
                && record.model.name == request.name
        }) {
            return Err(StoreError::EntityExists(format!(
                "step run '{}' in run {}",
                request.name, request.pipeline_run
            )));
        }
        let now = Utc::now();
        let model = StepRunResponse {
            id: Uuid::new_v4(),
            name: request.name,
            pipeline_run: request.pipeline_run,
            source: request.source,
            parameters: request.parameters,
            caching_parameters: request.caching_parameters,
            enable_cache: request.enable_cache,
            inputs: request.inputs,
            cache_key: request.cache_key,
            docstring: request.docstring,
            status: request.status,
            start_time: request.start_time,
            end_time: None,
            created: now,
            updated: now,
        };
        let seq = tables.next_seq();
        tables
            .step_runs
            .insert(model.id, Record { seq, model: model.clone() });
        Ok(model)
    }

    async fn get_run_step(&self, step_id: Uuid) -> Result<StepRunResponse> {
        let tables = self.tables.read();
        tables
            .step_runs
            .get(&step_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("step run {step_id}")))
    }

    async fn list_run_steps(&self, filter: StepRunFilter) -> Result<Page<StepRunResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .step_runs
            .values()
            .filter(|record| {
                filter
                    .pipeline_run
                    .map_or(true, |run| record.model.pipeline_run == run)
            })
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .status
                    .map_or(true, |status| record.model.status == status)
            })
            .filter(|record| {
                filter
                    .cache_key
                    .as_deref()
                    .map_or(true, |key| record.model.cache_key.as_deref() == Some(key))
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }

    async fn update_run_step(
        &self,
        step_id: Uuid,
        update: StepRunUpdate,
    ) -> Result<StepRunResponse> {
        let mut tables = self.tables.write();
        let record = tables
            .step_runs
            .get_mut(&step_id)
            .ok_or_else(|| StoreError::NotFound(format!("step run {step_id}")))?;
        if let Some(status) = update.status {
            record.model.status = status;
        }
        if let Some(end_time) = update.end_time {
            record.model.end_time = Some(end_time);
        }
        record.model.updated = Utc::now();
        Ok(record.model.clone())
    }

    // ---------
    // Artifacts
    // ---------

    async fn create_artifact(&self, request: ArtifactRequest) -> Result<ArtifactResponse> {
        validate_name("artifact", &request.name)?;
        validate_uri(&request.uri)?;
        let mut tables = self.tables.write();
        if !tables.step_runs.contains_key(&request.producer_step_run) {
            return Err(StoreError::NotFound(format!(
                "step run {}",
                request.producer_step_run
            )));
        }
        let model = ArtifactResponse {
            id: Uuid::new_v4(),
            name: request.name,
            uri: request.uri,
            data_type: request.data_type,
            materializer: request.materializer,
            producer_step_run: request.producer_step_run,
            is_cached: request.is_cached,
            created: Utc::now(),
        };
        let seq = tables.next_seq();
        tables
            .artifacts
            .insert(model.id, Record { seq, model: model.clone() });
        Ok(model)
    }

    async fn get_artifact(&self, artifact_id: Uuid) -> Result<ArtifactResponse> {
        let tables = self.tables.read();
        tables
            .artifacts
            .get(&artifact_id)
            .map(|record| record.model.clone())
            .ok_or_else(|| StoreError::NotFound(format!("artifact {artifact_id}")))
    }

    async fn list_artifacts(&self, filter: ArtifactFilter) -> Result<Page<ArtifactResponse>> {
        let tables = self.tables.read();
        let matches = tables
            .artifacts
            .values()
            .filter(|record| {
                filter
                    .uri
                    .as_deref()
                    .map_or(true, |uri| record.model.uri == uri)
            })
            .filter(|record| {
                filter
                    .producer_step_run
                    .map_or(true, |step| record.model.producer_step_run == step)
            })
            .filter(|record| matches_name(&filter.name, &record.model.name))
            .filter(|record| {
                filter
                    .is_cached
                    .map_or(true, |cached| record.model.is_cached == cached)
            })
            .map(|record| (record.seq, record.model.clone()))
            .collect();
        Ok(page_from(matches, &filter.pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let created = store
                .create_project(ProjectRequest {
                    name: "ml-platform".to_string(),
                    description: None,
                })
                .await
                .unwrap();
            let fetched = store
                .get_project(&NameOrId::Id(created.id))
                .await
                .unwrap();
            assert_eq!(created, fetched);
            let by_name = store
                .get_project(&NameOrId::Name("ml-platform".to_string()))
                .await
                .unwrap();
            assert_eq!(created, by_name);
        });
    }

    #[test]
    fn duplicate_project_names_are_rejected() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let request = ProjectRequest {
                name: "duplicated".to_string(),
                description: None,
            };
            store.create_project(request.clone()).await.unwrap();
            let err = store.create_project(request).await.unwrap_err();
            assert!(err.is_entity_exists());
        });
    }

    #[test]
    fn pages_are_keyed_on_insertion_order() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            for index in 0..5 {
                store
                    .create_project(ProjectRequest {
                        name: format!("project-{index}"),
                        description: None,
                    })
                    .await
                    .unwrap();
            }
            let first = store
                .list_projects(ProjectFilter {
                    pagination: Pagination::with_size(2),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(first.len(), 2);
            assert_eq!(first.total, 5);
            assert!(first.next_cursor.is_some());
            assert_eq!(first.items[0].name, "project-0");
        });
    }
}

//! # SQL Store
//!
//! Transactional PostgreSQL backing for the store contract. Uniqueness and
//! referential invariants are enforced by the schema itself — unique
//! (partial) indexes and foreign keys — so a racing mutation is decided by
//! the database, not by a pre-check; constraint violations are translated
//! into the store error taxonomy at this boundary.
//!
//! List queries are assembled with `QueryBuilder`, ordered by each table's
//! monotonic `seq` column, and paged with an exclusive cursor bound so a
//! concurrent insert can never duplicate an already-returned record.

mod rows;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::identifier::NameOrId;
use crate::models::*;
use crate::validation::{validate_json_object, validate_name, validate_uri};
use async_trait::async_trait;
use rows::*;
use sqlx::error::ErrorKind;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::Store;

pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    /// Connect to the configured database and run pending migrations.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool, e.g. one shared with an embedding service.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Database(err.into()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Translate a write-time database error for a create or update: the
/// schema's unique index is the final arbiter of scoped uniqueness, and a
/// foreign-key failure means a referenced parent is gone.
fn write_err(err: sqlx::Error, entity: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.kind() {
            ErrorKind::UniqueViolation => return StoreError::EntityExists(entity.to_string()),
            ErrorKind::ForeignKeyViolation => {
                return StoreError::NotFound(format!("resource referenced by {entity}"))
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

/// Translate a delete-time database error: a foreign-key failure means the
/// record is still referenced.
fn delete_err(err: sqlx::Error, entity: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.kind(), ErrorKind::ForeignKeyViolation) {
            return StoreError::Conflict(format!("{entity} is still referenced"));
        }
    }
    StoreError::Database(err)
}

/// Resolve a name-or-ID against a table with a unique `name` column.
async fn named_pk<'e, E>(executor: E, table: &str, kind: &str, ident: &NameOrId) -> Result<Uuid>
where
    E: PgExecutor<'e>,
{
    let found: Option<Uuid> = match ident {
        NameOrId::Id(id) => {
            sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = $1"))
                .bind(id)
                .fetch_optional(executor)
                .await?
        }
        NameOrId::Name(name) => {
            sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE name = $1"))
                .bind(name)
                .fetch_optional(executor)
                .await?
        }
    };
    found.ok_or_else(|| StoreError::NotFound(format!("{kind} {ident}")))
}

async fn require_row<'e, E>(executor: E, table: &str, kind: &str, id: Uuid) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let exists: bool =
        sqlx::query_scalar(&format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"))
            .bind(id)
            .fetch_one(executor)
            .await?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("{kind} {id}")))
    }
}

/// Assemble a page from rows fetched with `LIMIT limit + 1`.
fn build_page<R, T>(
    mut fetched: Vec<R>,
    total: i64,
    pagination: &Pagination,
    seq_of: fn(&R) -> i64,
    convert: fn(R) -> Result<T>,
) -> Result<Page<T>> {
    let limit = pagination.limit() as usize;
    let has_more = fetched.len() > limit;
    fetched.truncate(limit);
    let next_cursor = if has_more {
        fetched.last().map(seq_of)
    } else {
        None
    };
    let items = fetched.into_iter().map(convert).collect::<Result<Vec<_>>>()?;
    Ok(Page {
        items,
        total: total.max(0) as u64,
        size: pagination.limit(),
        next_cursor,
    })
}

/// Incrementally attach `WHERE`/`AND` clauses to a builder.
struct Conditions<'a, 'b> {
    builder: &'a mut QueryBuilder<'b, Postgres>,
    has_conditions: bool,
}

impl<'a, 'b> Conditions<'a, 'b> {
    fn new(builder: &'a mut QueryBuilder<'b, Postgres>) -> Self {
        Self {
            builder,
            has_conditions: false,
        }
    }

    fn clause(&mut self, sql: &str) -> &mut QueryBuilder<'b, Postgres> {
        if self.has_conditions {
            self.builder.push(" AND ");
        } else {
            self.builder.push(" WHERE ");
            self.has_conditions = true;
        }
        self.builder.push(sql)
    }
}

const TEAM_SELECT: &str = "SELECT t.id, t.seq, t.name, \
     COALESCE(jsonb_agg(m.user_id ORDER BY m.user_id) FILTER (WHERE m.user_id IS NOT NULL), '[]'::jsonb) AS users, \
     t.created_at, t.updated_at \
     FROM teams t LEFT JOIN team_members m ON m.team_id = t.id";

const STACK_SELECT: &str = "SELECT s.id, s.seq, s.name, s.description, \
     COALESCE(jsonb_object_agg(c.component_type, c.component_id) FILTER (WHERE c.component_id IS NOT NULL), '{}'::jsonb) AS components, \
     s.project_id, s.user_id, s.is_shared, s.created_at, s.updated_at \
     FROM stacks s LEFT JOIN stack_composition c ON c.stack_id = s.id";

async fn fetch_team<'e, E>(executor: E, team_id: Uuid) -> Result<TeamResponse>
where
    E: PgExecutor<'e>,
{
    let row: Option<TeamRow> =
        sqlx::query_as(&format!("{TEAM_SELECT} WHERE t.id = $1 GROUP BY t.id"))
            .bind(team_id)
            .fetch_optional(executor)
            .await?;
    row.ok_or_else(|| StoreError::NotFound(format!("team {team_id}")))?
        .into_response()
}

async fn fetch_stack<'e, E>(executor: E, stack_id: Uuid) -> Result<StackResponse>
where
    E: PgExecutor<'e>,
{
    let row: Option<StackRow> =
        sqlx::query_as(&format!("{STACK_SELECT} WHERE s.id = $1 GROUP BY s.id"))
            .bind(stack_id)
            .fetch_optional(executor)
            .await?;
    row.ok_or_else(|| StoreError::NotFound(format!("stack {stack_id}")))?
        .into_response()
}

/// Validate stack composition against the components table: every entry
/// must exist, live in the stack's project, and match its declared type.
async fn check_stack_components(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    project_id: Uuid,
    components: &std::collections::BTreeMap<crate::constants::StackComponentType, Uuid>,
) -> Result<()> {
    for (component_type, component_id) in components {
        let found: Option<(String, Uuid)> = sqlx::query_as(
            "SELECT component_type, project_id FROM stack_components WHERE id = $1",
        )
        .bind(component_id)
        .fetch_optional(&mut **tx)
        .await?;
        let (actual_type, actual_project) = found.ok_or_else(|| {
            StoreError::NotFound(format!("stack component {component_id}"))
        })?;
        if actual_type != component_type.as_str() {
            return Err(StoreError::Validation(format!(
                "component {component_id} is a {actual_type} component, not {component_type}"
            )));
        }
        if actual_project != project_id {
            return Err(StoreError::Validation(format!(
                "component {component_id} belongs to another project"
            )));
        }
    }
    Ok(())
}

async fn insert_stack_composition(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    stack_id: Uuid,
    stack_name: &str,
    components: &std::collections::BTreeMap<crate::constants::StackComponentType, Uuid>,
) -> Result<()> {
    for (component_type, component_id) in components {
        sqlx::query(
            "INSERT INTO stack_composition (stack_id, component_type, component_id) \
             VALUES ($1, $2, $3)",
        )
        .bind(stack_id)
        .bind(component_type.as_str())
        .bind(component_id)
        .execute(&mut **tx)
        .await
        .map_err(|err| write_err(err, &format!("stack '{stack_name}'")))?;
    }
    Ok(())
}

#[async_trait]
impl Store for SqlStore {
    // --------
    // Projects
    // --------

    async fn create_project(&self, request: ProjectRequest) -> Result<ProjectResponse> {
        validate_name("project", &request.name)?;
        let row: ProjectRow = sqlx::query_as(
            "INSERT INTO projects (id, name, description) VALUES ($1, $2, $3) \
             RETURNING id, seq, name, description, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| write_err(err, &format!("project '{}'", request.name)))?;
        debug!(project = %row.name, id = %row.id, "created project");
        row.into_response()
    }

    async fn get_project(&self, project: &NameOrId) -> Result<ProjectResponse> {
        let id = named_pk(&self.pool, "projects", "project", project).await?;
        let row: ProjectRow = sqlx::query_as(
            "SELECT id, seq, name, description, created_at, updated_at \
             FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.into_response()
    }

    async fn list_projects(&self, filter: ProjectFilter) -> Result<Page<ProjectResponse>> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM projects");
        {
            let mut conditions = Conditions::new(&mut count_builder);
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
        }
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, description, created_at, updated_at FROM projects",
        );
        {
            let mut conditions = Conditions::new(&mut builder);
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(cursor) = filter.pagination.cursor {
                conditions.clause("seq > ").push_bind(cursor);
            }
        }
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<ProjectRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(fetched, total, &filter.pagination, |row| row.seq, ProjectRow::into_response)
    }

    async fn update_project(
        &self,
        project_id: Uuid,
        update: ProjectUpdate,
    ) -> Result<ProjectResponse> {
        if let Some(name) = &update.name {
            validate_name("project", name)?;
        }
        let row: Option<ProjectRow> = sqlx::query_as(
            "UPDATE projects SET name = COALESCE($2, name), \
             description = COALESCE($3, description), updated_at = now() \
             WHERE id = $1 \
             RETURNING id, seq, name, description, created_at, updated_at",
        )
        .bind(project_id)
        .bind(&update.name)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| write_err(err, &format!("project '{}'", update.name.as_deref().unwrap_or(""))))?;
        row.ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))?
            .into_response()
    }

    async fn delete_project(&self, project: &NameOrId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id = named_pk(&mut *tx, "projects", "project", project).await?;
        // Definition-kind children go with the project; runs are preserved
        // through the SET NULL foreign keys. Stacks go first so their
        // composition rows release the components.
        sqlx::query("DELETE FROM stacks WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM stack_components WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM flavors WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM pipelines WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(project = %id, "deleted project");
        Ok(())
    }

    // -----
    // Users
    // -----

    async fn create_user(&self, request: UserRequest) -> Result<UserResponse> {
        validate_name("user", &request.name)?;
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (id, name, full_name, email, active) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, seq, name, full_name, email, active, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.full_name)
        .bind(&request.email)
        .bind(request.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| write_err(err, &format!("user '{}'", request.name)))?;
        row.into_response()
    }

    async fn get_user(&self, user: &NameOrId) -> Result<UserResponse> {
        let id = named_pk(&self.pool, "users", "user", user).await?;
        let row: UserRow = sqlx::query_as(
            "SELECT id, seq, name, full_name, email, active, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.into_response()
    }

    async fn list_users(&self, filter: UserFilter) -> Result<Page<UserResponse>> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM users");
        {
            let mut conditions = Conditions::new(&mut count_builder);
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(active) = filter.active {
                conditions.clause("active = ").push_bind(active);
            }
        }
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, full_name, email, active, created_at, updated_at FROM users",
        );
        {
            let mut conditions = Conditions::new(&mut builder);
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(active) = filter.active {
                conditions.clause("active = ").push_bind(active);
            }
            if let Some(cursor) = filter.pagination.cursor {
                conditions.clause("seq > ").push_bind(cursor);
            }
        }
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<UserRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(fetched, total, &filter.pagination, |row| row.seq, UserRow::into_response)
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> Result<UserResponse> {
        if let Some(name) = &update.name {
            validate_name("user", name)?;
        }
        let row: Option<UserRow> = sqlx::query_as(
            "UPDATE users SET name = COALESCE($2, name), \
             full_name = COALESCE($3, full_name), email = COALESCE($4, email), \
             active = COALESCE($5, active), updated_at = now() \
             WHERE id = $1 \
             RETURNING id, seq, name, full_name, email, active, created_at, updated_at",
        )
        .bind(user_id)
        .bind(&update.name)
        .bind(&update.full_name)
        .bind(&update.email)
        .bind(update.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| write_err(err, &format!("user '{}'", update.name.as_deref().unwrap_or(""))))?;
        row.ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?
            .into_response()
    }

    async fn delete_user(&self, user: &NameOrId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id = named_pk(&mut *tx, "users", "user", user).await?;
        // Memberships and direct assignments cascade; owned resources keep
        // their records with the owner reference nulled by the schema.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(user = %id, "deleted user");
        Ok(())
    }

    // -----
    // Teams
    // -----

    async fn create_team(&self, request: TeamRequest) -> Result<TeamResponse> {
        validate_name("team", &request.name)?;
        let mut members: Vec<Uuid> = request.users;
        members.sort();
        members.dedup();
        let mut tx = self.pool.begin().await?;
        for user_id in &members {
            require_row(&mut *tx, "users", "user", *user_id).await?;
        }
        let team_id = Uuid::new_v4();
        sqlx::query("INSERT INTO teams (id, name) VALUES ($1, $2)")
            .bind(team_id)
            .bind(&request.name)
            .execute(&mut *tx)
            .await
            .map_err(|err| write_err(err, &format!("team '{}'", request.name)))?;
        for user_id in &members {
            sqlx::query("INSERT INTO team_members (team_id, user_id) VALUES ($1, $2)")
                .bind(team_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(|err| write_err(err, &format!("team '{}'", request.name)))?;
        }
        let team = fetch_team(&mut *tx, team_id).await?;
        tx.commit().await?;
        Ok(team)
    }

    async fn get_team(&self, team: &NameOrId) -> Result<TeamResponse> {
        let id = named_pk(&self.pool, "teams", "team", team).await?;
        fetch_team(&self.pool, id).await
    }

    async fn list_teams(&self, filter: TeamFilter) -> Result<Page<TeamResponse>> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM teams t");
        {
            let mut conditions = Conditions::new(&mut count_builder);
            if let Some(name) = &filter.name {
                conditions.clause("t.name = ").push_bind(name.clone());
            }
            if let Some(user) = filter.user {
                conditions
                    .clause(
                        "EXISTS (SELECT 1 FROM team_members tm \
                         WHERE tm.team_id = t.id AND tm.user_id = ",
                    )
                    .push_bind(user)
                    .push(")");
            }
        }
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(TEAM_SELECT);
        {
            let mut conditions = Conditions::new(&mut builder);
            if let Some(name) = &filter.name {
                conditions.clause("t.name = ").push_bind(name.clone());
            }
            if let Some(user) = filter.user {
                conditions
                    .clause(
                        "EXISTS (SELECT 1 FROM team_members tm \
                         WHERE tm.team_id = t.id AND tm.user_id = ",
                    )
                    .push_bind(user)
                    .push(")");
            }
            if let Some(cursor) = filter.pagination.cursor {
                conditions.clause("t.seq > ").push_bind(cursor);
            }
        }
        builder.push(" GROUP BY t.id ORDER BY t.seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<TeamRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(fetched, total, &filter.pagination, |row| row.seq, TeamRow::into_response)
    }

    async fn update_team(&self, team_id: Uuid, update: TeamUpdate) -> Result<TeamResponse> {
        if let Some(name) = &update.name {
            validate_name("team", name)?;
        }
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "teams", "team", team_id).await?;
        if let Some(name) = &update.name {
            sqlx::query("UPDATE teams SET name = $2, updated_at = now() WHERE id = $1")
                .bind(team_id)
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(|err| write_err(err, &format!("team '{name}'")))?;
        }
        if let Some(users) = update.users {
            let mut members = users;
            members.sort();
            members.dedup();
            for user_id in &members {
                require_row(&mut *tx, "users", "user", *user_id).await?;
            }
            sqlx::query("DELETE FROM team_members WHERE team_id = $1")
                .bind(team_id)
                .execute(&mut *tx)
                .await?;
            for user_id in &members {
                sqlx::query("INSERT INTO team_members (team_id, user_id) VALUES ($1, $2)")
                    .bind(team_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("UPDATE teams SET updated_at = now() WHERE id = $1")
                .bind(team_id)
                .execute(&mut *tx)
                .await?;
        }
        let team = fetch_team(&mut *tx, team_id).await?;
        tx.commit().await?;
        Ok(team)
    }

    async fn delete_team(&self, team: &NameOrId) -> Result<()> {
        let id = named_pk(&self.pool, "teams", "team", team).await?;
        sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -----
    // Roles
    // -----

    async fn create_role(&self, request: RoleRequest) -> Result<RoleResponse> {
        validate_name("role", &request.name)?;
        let permissions = serde_json::to_value(&request.permissions)?;
        let row: RoleRow = sqlx::query_as(
            "INSERT INTO roles (id, name, permissions) VALUES ($1, $2, $3) \
             RETURNING id, seq, name, permissions, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(permissions)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| write_err(err, &format!("role '{}'", request.name)))?;
        row.into_response()
    }

    async fn get_role(&self, role: &NameOrId) -> Result<RoleResponse> {
        let id = named_pk(&self.pool, "roles", "role", role).await?;
        let row: RoleRow = sqlx::query_as(
            "SELECT id, seq, name, permissions, created_at, updated_at FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.into_response()
    }

    async fn list_roles(&self, filter: RoleFilter) -> Result<Page<RoleResponse>> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM roles");
        {
            let mut conditions = Conditions::new(&mut count_builder);
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
        }
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, permissions, created_at, updated_at FROM roles",
        );
        {
            let mut conditions = Conditions::new(&mut builder);
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(cursor) = filter.pagination.cursor {
                conditions.clause("seq > ").push_bind(cursor);
            }
        }
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<RoleRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(fetched, total, &filter.pagination, |row| row.seq, RoleRow::into_response)
    }

    async fn update_role(&self, role_id: Uuid, update: RoleUpdate) -> Result<RoleResponse> {
        if let Some(name) = &update.name {
            validate_name("role", name)?;
        }
        let permissions = update
            .permissions
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let row: Option<RoleRow> = sqlx::query_as(
            "UPDATE roles SET name = COALESCE($2, name), \
             permissions = COALESCE($3, permissions), updated_at = now() \
             WHERE id = $1 \
             RETURNING id, seq, name, permissions, created_at, updated_at",
        )
        .bind(role_id)
        .bind(&update.name)
        .bind(permissions)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| write_err(err, &format!("role '{}'", update.name.as_deref().unwrap_or(""))))?;
        row.ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?
            .into_response()
    }

    async fn delete_role(&self, role: &NameOrId) -> Result<()> {
        let id = named_pk(&self.pool, "roles", "role", role).await?;
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| delete_err(err, &format!("role {id}")))?;
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
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "roles", "role", request.role).await?;
        if let Some(user_id) = request.user {
            require_row(&mut *tx, "users", "user", user_id).await?;
        }
        if let Some(team_id) = request.team {
            require_row(&mut *tx, "teams", "team", team_id).await?;
        }
        if let Some(project_id) = request.project {
            require_row(&mut *tx, "projects", "project", project_id).await?;
        }
        let row: RoleAssignmentRow = sqlx::query_as(
            "INSERT INTO role_assignments (id, role_id, user_id, team_id, project_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, seq, role_id, user_id, team_id, project_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(request.role)
        .bind(request.user)
        .bind(request.team)
        .bind(request.project)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| write_err(err, "role assignment"))?;
        tx.commit().await?;
        row.into_response()
    }

    async fn get_role_assignment(&self, assignment_id: Uuid) -> Result<RoleAssignmentResponse> {
        let row: Option<RoleAssignmentRow> = sqlx::query_as(
            "SELECT id, seq, role_id, user_id, team_id, project_id, created_at \
             FROM role_assignments WHERE id = $1",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("role assignment {assignment_id}")))?
            .into_response()
    }

    async fn list_role_assignments(
        &self,
        filter: RoleAssignmentFilter,
    ) -> Result<Page<RoleAssignmentResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(role) = filter.role {
                conditions.clause("role_id = ").push_bind(role);
            }
            if let Some(user) = filter.user {
                conditions.clause("user_id = ").push_bind(user);
            }
            if let Some(team) = filter.team {
                conditions.clause("team_id = ").push_bind(team);
            }
            if let Some(project) = filter.project {
                conditions.clause("project_id = ").push_bind(project);
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM role_assignments");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, role_id, user_id, team_id, project_id, created_at \
             FROM role_assignments",
        );
        apply(&mut builder, true);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<RoleAssignmentRow> =
            builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(
            fetched,
            total,
            &filter.pagination,
            |row| row.seq,
            RoleAssignmentRow::into_response,
        )
    }

    async fn delete_role_assignment(&self, assignment_id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM role_assignments WHERE id = $1")
            .bind(assignment_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "role assignment {assignment_id}"
            )));
        }
        Ok(())
    }

    // -------
    // Flavors
    // -------

    async fn create_flavor(&self, request: FlavorRequest) -> Result<FlavorResponse> {
        validate_name("flavor", &request.name)?;
        validate_json_object("config_schema", &request.config_schema)?;
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "projects", "project", request.project).await?;
        require_row(&mut *tx, "users", "user", request.user).await?;
        let row: FlavorRow = sqlx::query_as(
            "INSERT INTO flavors \
             (id, name, component_type, source, config_schema, integration, project_id, user_id, is_shared) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, seq, name, component_type, source, config_schema, integration, \
                       project_id, user_id, is_shared, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(request.component_type.as_str())
        .bind(&request.source)
        .bind(&request.config_schema)
        .bind(&request.integration)
        .bind(request.project)
        .bind(request.user)
        .bind(request.is_shared)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            write_err(
                err,
                &format!("{} flavor '{}'", request.component_type, request.name),
            )
        })?;
        tx.commit().await?;
        row.into_response()
    }

    async fn get_flavor(&self, flavor_id: Uuid) -> Result<FlavorResponse> {
        let row: Option<FlavorRow> = sqlx::query_as(
            "SELECT id, seq, name, component_type, source, config_schema, integration, \
             project_id, user_id, is_shared, created_at, updated_at \
             FROM flavors WHERE id = $1",
        )
        .bind(flavor_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("flavor {flavor_id}")))?
            .into_response()
    }

    async fn list_flavors(&self, filter: FlavorFilter) -> Result<Page<FlavorResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(project) = filter.project {
                conditions.clause("project_id = ").push_bind(project);
            }
            if let Some(user) = filter.user {
                conditions.clause("user_id = ").push_bind(user);
            }
            if let Some(component_type) = filter.component_type {
                conditions
                    .clause("component_type = ")
                    .push_bind(component_type.as_str());
            }
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(is_shared) = filter.is_shared {
                conditions.clause("is_shared = ").push_bind(is_shared);
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM flavors");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, component_type, source, config_schema, integration, \
             project_id, user_id, is_shared, created_at, updated_at FROM flavors",
        );
        apply(&mut builder, true);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<FlavorRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(fetched, total, &filter.pagination, |row| row.seq, FlavorRow::into_response)
    }

    async fn delete_flavor(&self, flavor_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let flavor: Option<(String, String, Uuid)> = sqlx::query_as(
            "SELECT name, component_type, project_id FROM flavors WHERE id = $1",
        )
        .bind(flavor_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (name, component_type, project_id) =
            flavor.ok_or_else(|| StoreError::NotFound(format!("flavor {flavor_id}")))?;
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM stack_components \
             WHERE project_id = $1 AND component_type = $2 AND flavor = $3)",
        )
        .bind(project_id)
        .bind(&component_type)
        .bind(&name)
        .fetch_one(&mut *tx)
        .await?;
        if in_use {
            return Err(StoreError::Conflict(format!(
                "flavor '{name}' is used by a stack component"
            )));
        }
        sqlx::query("DELETE FROM flavors WHERE id = $1")
            .bind(flavor_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "projects", "project", request.project).await?;
        require_row(&mut *tx, "users", "user", request.user).await?;
        let row: ComponentRow = sqlx::query_as(
            "INSERT INTO stack_components \
             (id, name, component_type, flavor, configuration, project_id, user_id, is_shared) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, seq, name, component_type, flavor, configuration, \
                       project_id, user_id, is_shared, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(request.component_type.as_str())
        .bind(&request.flavor)
        .bind(&request.configuration)
        .bind(request.project)
        .bind(request.user)
        .bind(request.is_shared)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            write_err(
                err,
                &format!("{} component '{}'", request.component_type, request.name),
            )
        })?;
        tx.commit().await?;
        debug!(component = %row.name, ty = %row.component_type, "registered stack component");
        row.into_response()
    }

    async fn get_stack_component(&self, component_id: Uuid) -> Result<ComponentResponse> {
        let row: Option<ComponentRow> = sqlx::query_as(
            "SELECT id, seq, name, component_type, flavor, configuration, \
             project_id, user_id, is_shared, created_at, updated_at \
             FROM stack_components WHERE id = $1",
        )
        .bind(component_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("stack component {component_id}")))?
            .into_response()
    }

    async fn list_stack_components(
        &self,
        filter: ComponentFilter,
    ) -> Result<Page<ComponentResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(project) = filter.project {
                conditions.clause("project_id = ").push_bind(project);
            }
            if let Some(user) = filter.user {
                conditions.clause("user_id = ").push_bind(user);
            }
            if let Some(component_type) = filter.component_type {
                conditions
                    .clause("component_type = ")
                    .push_bind(component_type.as_str());
            }
            if let Some(flavor) = &filter.flavor {
                conditions.clause("flavor = ").push_bind(flavor.clone());
            }
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(is_shared) = filter.is_shared {
                conditions.clause("is_shared = ").push_bind(is_shared);
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM stack_components");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, component_type, flavor, configuration, \
             project_id, user_id, is_shared, created_at, updated_at FROM stack_components",
        );
        apply(&mut builder, true);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<ComponentRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(
            fetched,
            total,
            &filter.pagination,
            |row| row.seq,
            ComponentRow::into_response,
        )
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
        let row: Option<ComponentRow> = sqlx::query_as(
            "UPDATE stack_components SET name = COALESCE($2, name), \
             configuration = COALESCE($3, configuration), \
             is_shared = COALESCE($4, is_shared), updated_at = now() \
             WHERE id = $1 \
             RETURNING id, seq, name, component_type, flavor, configuration, \
                       project_id, user_id, is_shared, created_at, updated_at",
        )
        .bind(component_id)
        .bind(&update.name)
        .bind(&update.configuration)
        .bind(update.is_shared)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            write_err(
                err,
                &format!("component '{}'", update.name.as_deref().unwrap_or("")),
            )
        })?;
        row.ok_or_else(|| StoreError::NotFound(format!("stack component {component_id}")))?
            .into_response()
    }

    async fn delete_stack_component(&self, component_id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM stack_components WHERE id = $1")
            .bind(component_id)
            .execute(&self.pool)
            .await
            .map_err(|err| delete_err(err, &format!("stack component {component_id}")))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "stack component {component_id}"
            )));
        }
        Ok(())
    }

    // ------
    // Stacks
    // ------

    async fn create_stack(&self, request: StackRequest) -> Result<StackResponse> {
        validate_name("stack", &request.name)?;
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "projects", "project", request.project).await?;
        require_row(&mut *tx, "users", "user", request.user).await?;
        check_stack_components(&mut tx, request.project, &request.components).await?;
        let stack_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO stacks (id, name, description, project_id, user_id, is_shared) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(stack_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.project)
        .bind(request.user)
        .bind(request.is_shared)
        .execute(&mut *tx)
        .await
        .map_err(|err| write_err(err, &format!("stack '{}'", request.name)))?;
        insert_stack_composition(&mut tx, stack_id, &request.name, &request.components).await?;
        let stack = fetch_stack(&mut *tx, stack_id).await?;
        tx.commit().await?;
        debug!(stack = %stack.name, id = %stack.id, "registered stack");
        Ok(stack)
    }

    async fn get_stack(&self, stack_id: Uuid) -> Result<StackResponse> {
        fetch_stack(&self.pool, stack_id).await
    }

    async fn list_stacks(&self, filter: StackFilter) -> Result<Page<StackResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(project) = filter.project {
                conditions.clause("s.project_id = ").push_bind(project);
            }
            if let Some(user) = filter.user {
                conditions.clause("s.user_id = ").push_bind(user);
            }
            if let Some(component_id) = filter.component_id {
                conditions
                    .clause(
                        "EXISTS (SELECT 1 FROM stack_composition sc \
                         WHERE sc.stack_id = s.id AND sc.component_id = ",
                    )
                    .push_bind(component_id)
                    .push(")");
            }
            if let Some(name) = &filter.name {
                conditions.clause("s.name = ").push_bind(name.clone());
            }
            if let Some(is_shared) = filter.is_shared {
                conditions.clause("s.is_shared = ").push_bind(is_shared);
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("s.seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM stacks s");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(STACK_SELECT);
        apply(&mut builder, true);
        builder.push(" GROUP BY s.id ORDER BY s.seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<StackRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(fetched, total, &filter.pagination, |row| row.seq, StackRow::into_response)
    }

    async fn update_stack(&self, stack_id: Uuid, update: StackUpdate) -> Result<StackResponse> {
        if let Some(name) = &update.name {
            validate_name("stack", name)?;
        }
        let mut tx = self.pool.begin().await?;
        let project_id: Option<Uuid> =
            sqlx::query_scalar("SELECT project_id FROM stacks WHERE id = $1")
                .bind(stack_id)
                .fetch_optional(&mut *tx)
                .await?;
        let project_id =
            project_id.ok_or_else(|| StoreError::NotFound(format!("stack {stack_id}")))?;
        if let Some(components) = &update.components {
            check_stack_components(&mut tx, project_id, components).await?;
            sqlx::query("DELETE FROM stack_composition WHERE stack_id = $1")
                .bind(stack_id)
                .execute(&mut *tx)
                .await?;
            insert_stack_composition(
                &mut tx,
                stack_id,
                update.name.as_deref().unwrap_or("stack"),
                components,
            )
            .await?;
        }
        sqlx::query(
            "UPDATE stacks SET name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             is_shared = COALESCE($4, is_shared), updated_at = now() \
             WHERE id = $1",
        )
        .bind(stack_id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.is_shared)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            write_err(err, &format!("stack '{}'", update.name.as_deref().unwrap_or("")))
        })?;
        let stack = fetch_stack(&mut *tx, stack_id).await?;
        tx.commit().await?;
        Ok(stack)
    }

    async fn delete_stack(&self, stack_id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM stacks WHERE id = $1")
            .bind(stack_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("stack {stack_id}")));
        }
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
        let spec = serde_json::to_value(&request.spec)?;
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "projects", "project", request.project).await?;
        require_row(&mut *tx, "users", "user", request.user).await?;
        let row: PipelineRow = sqlx::query_as(
            "INSERT INTO pipelines (id, name, docstring, spec, project_id, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, seq, name, docstring, spec, project_id, user_id, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.docstring)
        .bind(spec)
        .bind(request.project)
        .bind(request.user)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| write_err(err, &format!("pipeline '{}'", request.name)))?;
        tx.commit().await?;
        debug!(pipeline = %row.name, id = %row.id, "registered pipeline");
        row.into_response()
    }

    async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineResponse> {
        let row: Option<PipelineRow> = sqlx::query_as(
            "SELECT id, seq, name, docstring, spec, project_id, user_id, created_at, updated_at \
             FROM pipelines WHERE id = $1",
        )
        .bind(pipeline_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("pipeline {pipeline_id}")))?
            .into_response()
    }

    async fn list_pipelines(&self, filter: PipelineFilter) -> Result<Page<PipelineResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(project) = filter.project {
                conditions.clause("project_id = ").push_bind(project);
            }
            if let Some(user) = filter.user {
                conditions.clause("user_id = ").push_bind(user);
            }
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM pipelines");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, docstring, spec, project_id, user_id, created_at, updated_at \
             FROM pipelines",
        );
        apply(&mut builder, true);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<PipelineRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(
            fetched,
            total,
            &filter.pagination,
            |row| row.seq,
            PipelineRow::into_response,
        )
    }

    async fn update_pipeline(
        &self,
        pipeline_id: Uuid,
        update: PipelineUpdate,
    ) -> Result<PipelineResponse> {
        if let Some(name) = &update.name {
            validate_name("pipeline", name)?;
        }
        let spec = update.spec.as_ref().map(serde_json::to_value).transpose()?;
        let row: Option<PipelineRow> = sqlx::query_as(
            "UPDATE pipelines SET name = COALESCE($2, name), \
             docstring = COALESCE($3, docstring), spec = COALESCE($4, spec), \
             updated_at = now() \
             WHERE id = $1 \
             RETURNING id, seq, name, docstring, spec, project_id, user_id, created_at, updated_at",
        )
        .bind(pipeline_id)
        .bind(&update.name)
        .bind(&update.docstring)
        .bind(spec)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            write_err(err, &format!("pipeline '{}'", update.name.as_deref().unwrap_or("")))
        })?;
        row.ok_or_else(|| StoreError::NotFound(format!("pipeline {pipeline_id}")))?
            .into_response()
    }

    async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM pipelines WHERE id = $1")
            .bind(pipeline_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("pipeline {pipeline_id}")));
        }
        debug!(pipeline = %pipeline_id, "deleted pipeline");
        Ok(())
    }

    // -------------
    // Pipeline runs
    // -------------

    async fn create_run(&self, request: RunRequest) -> Result<RunResponse> {
        validate_name("pipeline run", &request.name)?;
        validate_json_object("pipeline_configuration", &request.pipeline_configuration)?;
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "projects", "project", request.project).await?;
        require_row(&mut *tx, "users", "user", request.user).await?;
        if let Some(pipeline_id) = request.pipeline {
            require_row(&mut *tx, "pipelines", "pipeline", pipeline_id).await?;
        }
        if let Some(stack_id) = request.stack {
            require_row(&mut *tx, "stacks", "stack", stack_id).await?;
        }
        let row: RunRow = sqlx::query_as(
            "INSERT INTO pipeline_runs \
             (id, name, pipeline_id, stack_id, project_id, user_id, status, \
              pipeline_configuration, num_steps, orchestrator_run_id, git_sha, \
              client_version, start_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING id, seq, name, pipeline_id, stack_id, project_id, user_id, status, \
                       pipeline_configuration, num_steps, orchestrator_run_id, git_sha, \
                       client_version, start_time, end_time, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(request.pipeline)
        .bind(request.stack)
        .bind(request.project)
        .bind(request.user)
        .bind(request.status.to_string())
        .bind(&request.pipeline_configuration)
        .bind(request.num_steps)
        .bind(&request.orchestrator_run_id)
        .bind(&request.git_sha)
        .bind(&request.client_version)
        .bind(request.start_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| write_err(err, &format!("pipeline run '{}'", request.name)))?;
        tx.commit().await?;
        debug!(run = %row.name, id = %row.id, "created pipeline run");
        row.into_response()
    }

    async fn get_run(&self, run: &NameOrId) -> Result<RunResponse> {
        let id = named_pk(&self.pool, "pipeline_runs", "pipeline run", run).await?;
        let row: RunRow = sqlx::query_as(
            "SELECT id, seq, name, pipeline_id, stack_id, project_id, user_id, status, \
             pipeline_configuration, num_steps, orchestrator_run_id, git_sha, \
             client_version, start_time, end_time, created_at, updated_at \
             FROM pipeline_runs WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.into_response()
    }

    async fn list_runs(&self, filter: RunFilter) -> Result<Page<RunResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(project) = filter.project {
                conditions.clause("project_id = ").push_bind(project);
            }
            if let Some(user) = filter.user {
                conditions.clause("user_id = ").push_bind(user);
            }
            if let Some(pipeline) = filter.pipeline {
                conditions.clause("pipeline_id = ").push_bind(pipeline);
            }
            if let Some(stack) = filter.stack {
                conditions.clause("stack_id = ").push_bind(stack);
            }
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(status) = filter.status {
                conditions.clause("status = ").push_bind(status.to_string());
            }
            match filter.unlisted {
                Some(true) => {
                    conditions.clause("pipeline_id IS NULL");
                }
                Some(false) => {
                    conditions.clause("pipeline_id IS NOT NULL");
                }
                None => {}
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM pipeline_runs");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, pipeline_id, stack_id, project_id, user_id, status, \
             pipeline_configuration, num_steps, orchestrator_run_id, git_sha, \
             client_version, start_time, end_time, created_at, updated_at FROM pipeline_runs",
        );
        apply(&mut builder, true);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<RunRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(fetched, total, &filter.pagination, |row| row.seq, RunRow::into_response)
    }

    async fn update_run(&self, run_id: Uuid, update: RunUpdate) -> Result<RunResponse> {
        let row: Option<RunRow> = sqlx::query_as(
            "UPDATE pipeline_runs SET status = COALESCE($2, status), \
             num_steps = COALESCE($3, num_steps), end_time = COALESCE($4, end_time), \
             updated_at = now() \
             WHERE id = $1 \
             RETURNING id, seq, name, pipeline_id, stack_id, project_id, user_id, status, \
                       pipeline_configuration, num_steps, orchestrator_run_id, git_sha, \
                       client_version, start_time, end_time, created_at, updated_at",
        )
        .bind(run_id)
        .bind(update.status.map(|status| status.to_string()))
        .bind(update.num_steps)
        .bind(update.end_time)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("pipeline run {run_id}")))?
            .into_response()
    }

    // ---------
    // Step runs
    // ---------

    async fn create_run_step(&self, request: StepRunRequest) -> Result<StepRunResponse> {
        validate_name("step run", &request.name)?;
        validate_json_object("parameters", &request.parameters)?;
        validate_json_object("caching_parameters", &request.caching_parameters)?;
        let inputs = serde_json::to_value(&request.inputs)?;
        let mut tx = self.pool.begin().await?;
        require_row(&mut *tx, "pipeline_runs", "pipeline run", request.pipeline_run).await?;
        let row: StepRunRow = sqlx::query_as(
            "INSERT INTO step_runs \
             (id, name, pipeline_run_id, source, parameters, caching_parameters, \
              enable_cache, inputs, cache_key, docstring, status, start_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING id, seq, name, pipeline_run_id, source, parameters, caching_parameters, \
                       enable_cache, inputs, cache_key, docstring, status, start_time, end_time, \
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(request.pipeline_run)
        .bind(&request.source)
        .bind(&request.parameters)
        .bind(&request.caching_parameters)
        .bind(request.enable_cache)
        .bind(inputs)
        .bind(&request.cache_key)
        .bind(&request.docstring)
        .bind(request.status.to_string())
        .bind(request.start_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            write_err(
                err,
                &format!("step run '{}' in run {}", request.name, request.pipeline_run),
            )
        })?;
        tx.commit().await?;
        row.into_response()
    }

    async fn get_run_step(&self, step_id: Uuid) -> Result<StepRunResponse> {
        let row: Option<StepRunRow> = sqlx::query_as(
            "SELECT id, seq, name, pipeline_run_id, source, parameters, caching_parameters, \
             enable_cache, inputs, cache_key, docstring, status, start_time, end_time, \
             created_at, updated_at \
             FROM step_runs WHERE id = $1",
        )
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("step run {step_id}")))?
            .into_response()
    }

    async fn list_run_steps(&self, filter: StepRunFilter) -> Result<Page<StepRunResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(run) = filter.pipeline_run {
                conditions.clause("pipeline_run_id = ").push_bind(run);
            }
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(status) = filter.status {
                conditions.clause("status = ").push_bind(status.to_string());
            }
            if let Some(cache_key) = &filter.cache_key {
                conditions.clause("cache_key = ").push_bind(cache_key.clone());
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM step_runs");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, pipeline_run_id, source, parameters, caching_parameters, \
             enable_cache, inputs, cache_key, docstring, status, start_time, end_time, \
             created_at, updated_at FROM step_runs",
        );
        apply(&mut builder, true);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<StepRunRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(
            fetched,
            total,
            &filter.pagination,
            |row| row.seq,
            StepRunRow::into_response,
        )
    }

    async fn update_run_step(
        &self,
        step_id: Uuid,
        update: StepRunUpdate,
    ) -> Result<StepRunResponse> {
        let row: Option<StepRunRow> = sqlx::query_as(
            "UPDATE step_runs SET status = COALESCE($2, status), \
             end_time = COALESCE($3, end_time), updated_at = now() \
             WHERE id = $1 \
             RETURNING id, seq, name, pipeline_run_id, source, parameters, caching_parameters, \
                       enable_cache, inputs, cache_key, docstring, status, start_time, end_time, \
                       created_at, updated_at",
        )
        .bind(step_id)
        .bind(update.status.map(|status| status.to_string()))
        .bind(update.end_time)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("step run {step_id}")))?
            .into_response()
    }

    // ---------
    // Artifacts
    // ---------

    async fn create_artifact(&self, request: ArtifactRequest) -> Result<ArtifactResponse> {
        validate_name("artifact", &request.name)?;
        validate_uri(&request.uri)?;
        let row: ArtifactRow = sqlx::query_as(
            "INSERT INTO artifacts \
             (id, name, uri, data_type, materializer, producer_step_run_id, is_cached) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, seq, name, uri, data_type, materializer, producer_step_run_id, \
                       is_cached, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.uri)
        .bind(&request.data_type)
        .bind(&request.materializer)
        .bind(request.producer_step_run)
        .bind(request.is_cached)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| write_err(err, &format!("artifact '{}'", request.name)))?;
        row.into_response()
    }

    async fn get_artifact(&self, artifact_id: Uuid) -> Result<ArtifactResponse> {
        let row: Option<ArtifactRow> = sqlx::query_as(
            "SELECT id, seq, name, uri, data_type, materializer, producer_step_run_id, \
             is_cached, created_at \
             FROM artifacts WHERE id = $1",
        )
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("artifact {artifact_id}")))?
            .into_response()
    }

    async fn list_artifacts(&self, filter: ArtifactFilter) -> Result<Page<ArtifactResponse>> {
        let apply = |builder: &mut QueryBuilder<Postgres>, with_cursor: bool| {
            let mut conditions = Conditions::new(builder);
            if let Some(uri) = &filter.uri {
                conditions.clause("uri = ").push_bind(uri.clone());
            }
            if let Some(producer) = filter.producer_step_run {
                conditions.clause("producer_step_run_id = ").push_bind(producer);
            }
            if let Some(name) = &filter.name {
                conditions.clause("name = ").push_bind(name.clone());
            }
            if let Some(is_cached) = filter.is_cached {
                conditions.clause("is_cached = ").push_bind(is_cached);
            }
            if with_cursor {
                if let Some(cursor) = filter.pagination.cursor {
                    conditions.clause("seq > ").push_bind(cursor);
                }
            }
        };

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM artifacts");
        apply(&mut count_builder, false);
        let total: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::new(
            "SELECT id, seq, name, uri, data_type, materializer, producer_step_run_id, \
             is_cached, created_at FROM artifacts",
        );
        apply(&mut builder, true);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(filter.pagination.limit() as i64 + 1);
        let fetched: Vec<ArtifactRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        build_page(
            fetched,
            total,
            &filter.pagination,
            |row| row.seq,
            ArtifactRow::into_response,
        )
    }
}

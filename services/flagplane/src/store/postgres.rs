//! Postgres-backed implementation of the flagplane store.
//!
//! # What this module is
//! Implements [`CatalogStore`] and [`PermissionStore`] on Postgres via `sqlx`. It is the durable
//! store of record for users, projects, scopes, flags, flag values, memberships, and grants.
//!
//! # Key invariants
//! - Alias, API key, `(project, scope alias)` and `(project, flag key)` uniqueness is enforced by
//!   unique constraints; violations surface as [`StoreError::Conflict`].
//! - Composite writes run in one transaction: project creation with seeded scopes and owner
//!   grants, flag and scope creation with their value rows, scope deletion with grant cleanup,
//!   and permission replacement.
//! - Grant inserts use `ON CONFLICT DO NOTHING`, so duplicate adds are no-ops.
//! - Removing guarded grants (`manage_users`, `delete_project`) first locks the project's holder
//!   rows with `FOR UPDATE`, so two concurrent revokes cannot both see a second holder.
//! - Project deletion relies on `ON DELETE CASCADE`; scope deletion removes grants explicitly
//!   before the scope row.
//!
//! # Security notes
//! - Database URLs may contain credentials; never log them.
//! - API keys are stored as issued because holders of `view_api_key` must be able to read them
//!   back.
//!
//! # Operational notes
//! - Migrations run at startup via `sqlx::migrate!("./migrations")`, before any request is served.
//! - Connection pooling and acquire timeouts are explicit so DB failures surface quickly.
use super::{
    CatalogStore, NewMembership, NewProject, PermissionStore, StoreError, StoreResult,
};
use crate::config::PostgresConfig;
use crate::model::{
    Flag, FlagValue, FlagValueRecord, MemberPermissions, Membership, Project, Scope, ScopeGrant,
    User,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flagplane_authz::{GlobalRole, ProjectPermission, ScopePermission};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Durable flagplane store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use flagplane::config::PostgresConfig;
/// use flagplane::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    username: String,
    full_name: String,
    role: String,
    is_active: bool,
    must_change_password: bool,
    password_hash: String,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
struct DbProject {
    id: Uuid,
    alias: String,
    name: String,
    description: Option<String>,
    api_key: String,
    is_archived: bool,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbScope {
    id: Uuid,
    project_id: Uuid,
    alias: String,
    name: String,
    description: Option<String>,
    idx: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbFlag {
    id: Uuid,
    project_id: Uuid,
    key: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbFlagValue {
    flag_id: Uuid,
    scope_id: Uuid,
    enabled: bool,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbFlagValueRecord {
    flag_key: String,
    scope_id: Uuid,
    scope_alias: String,
    enabled: bool,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbMembership {
    project_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbGuardedHolder {
    user_id: Uuid,
    permission: String,
    is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
struct DbScopeGrant {
    scope_id: Uuid,
    permission: String,
}

const USER_COLUMNS: &str = "id, username, full_name, role, is_active, must_change_password, \
     password_hash, created_at, last_login_at";
const PROJECT_COLUMNS: &str =
    "id, alias, name, description, api_key, is_archived, created_by, created_at, updated_at";
const SCOPE_COLUMNS: &str = "id, project_id, alias, name, description, idx, created_at";
const FLAG_COLUMNS: &str = "id, project_id, key, name, description, created_at, updated_at";

impl PostgresStore {
    /// Connect to Postgres and apply embedded migrations.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        // Avoid logging `pg.url`; it may carry credentials.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    async fn insert_project_grants(
        tx: &mut Transaction<'_, Postgres>,
        project_id: Uuid,
        user_id: Uuid,
        permissions: impl IntoIterator<Item = ProjectPermission>,
    ) -> StoreResult<()> {
        for permission in permissions {
            sqlx::query(
                r#"INSERT INTO project_grants (project_id, user_id, permission)
                   VALUES ($1, $2, $3) ON CONFLICT DO NOTHING"#,
            )
            .bind(project_id)
            .bind(user_id)
            .bind(permission.as_str())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_scope_grants(
        tx: &mut Transaction<'_, Postgres>,
        project_id: Uuid,
        user_id: Uuid,
        grants: impl IntoIterator<Item = ScopeGrant>,
    ) -> StoreResult<()> {
        for grant in grants {
            sqlx::query(
                r#"INSERT INTO scope_grants (project_id, user_id, scope_id, permission)
                   VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING"#,
            )
            .bind(project_id)
            .bind(user_id)
            .bind(grant.scope_id)
            .bind(grant.permission.as_str())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Locks the project's grant rows for the guarded permissions in `dropped`
    /// and fails when `user_id` holds one of them with no other active holder.
    /// Rows are locked in key order. A blocked caller re-reads what the first
    /// one left.
    async fn ensure_other_active_holders(
        tx: &mut Transaction<'_, Postgres>,
        project_id: Uuid,
        user_id: Uuid,
        dropped: impl IntoIterator<Item = ProjectPermission>,
    ) -> StoreResult<()> {
        let guarded: Vec<ProjectPermission> = dropped
            .into_iter()
            .filter(|permission| permission.is_guarded())
            .collect();
        if guarded.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = guarded
            .iter()
            .map(|permission| permission.as_str().to_string())
            .collect();
        let holders = sqlx::query_as::<_, DbGuardedHolder>(
            r#"SELECT g.user_id, g.permission, u.is_active
               FROM project_grants g
               JOIN users u ON u.id = g.user_id
               WHERE g.project_id = $1 AND g.permission = ANY($2)
               ORDER BY g.user_id, g.permission
               FOR UPDATE OF g"#,
        )
        .bind(project_id)
        .bind(names)
        .fetch_all(&mut **tx)
        .await?;
        for permission in guarded {
            let name = permission.as_str();
            let held = holders
                .iter()
                .any(|row| row.user_id == user_id && row.permission == name);
            let covered = holders
                .iter()
                .any(|row| row.user_id != user_id && row.permission == name && row.is_active);
            if held && !covered {
                return Err(StoreError::LastHolder(permission));
            }
        }
        Ok(())
    }

    async fn require_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<()> {
        if self.is_member(user_id, project_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound("membership".into()))
        }
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn count_users(&self) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        let insert = sqlx::query(
            r#"INSERT INTO users (id, username, full_name, role, is_active, must_change_password,
                                  password_hash, created_at, last_login_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.must_change_password)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await;
        map_unique(insert, "username exists")?;
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("user".into()))?;
        user_from_db(row)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_db)
        .transpose()
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(user_from_db)
        .collect()
    }

    async fn update_user(&self, user: User) -> StoreResult<User> {
        let result = sqlx::query(
            r#"UPDATE users SET username = $2, full_name = $3, role = $4, is_active = $5,
                   must_change_password = $6, password_hash = $7, last_login_at = $8
               WHERE id = $1"#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.must_change_password)
        .bind(&user.password_hash)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await;
        if map_unique(result, "username exists")? == 0 {
            return Err(StoreError::NotFound("user".into()));
        }
        Ok(user)
    }

    async fn create_project(&self, new: NewProject) -> StoreResult<Project> {
        let project = new.project;
        let mut tx = self.pool.begin().await?;
        let insert = sqlx::query(
            r#"INSERT INTO projects (id, alias, name, description, api_key, is_archived,
                                     created_by, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(project.id)
        .bind(&project.alias)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.api_key)
        .bind(project.is_archived)
        .bind(project.created_by)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await;
        map_unique(insert, "project alias or api key exists")?;

        for scope in &new.scopes {
            sqlx::query(
                r#"INSERT INTO scopes (id, project_id, alias, name, description, idx, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(scope.id)
            .bind(scope.project_id)
            .bind(&scope.alias)
            .bind(&scope.name)
            .bind(&scope.description)
            .bind(scope.index)
            .bind(scope.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"INSERT INTO memberships (project_id, user_id, joined_at) VALUES ($1, $2, $3)"#,
        )
        .bind(project.id)
        .bind(project.created_by)
        .bind(project.created_at)
        .execute(&mut *tx)
        .await?;
        Self::insert_project_grants(&mut tx, project.id, project.created_by, new.owner_permissions)
            .await?;

        tx.commit().await?;
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> StoreResult<Project> {
        let row = sqlx::query_as::<_, DbProject>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("project".into()))?;
        Ok(project_from_db(row))
    }

    async fn find_project_by_alias(&self, alias: &str) -> StoreResult<Option<Project>> {
        Ok(sqlx::query_as::<_, DbProject>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE alias = $1"
        ))
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?
        .map(project_from_db))
    }

    async fn find_project_by_api_key(&self, api_key: &str) -> StoreResult<Option<Project>> {
        Ok(sqlx::query_as::<_, DbProject>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE api_key = $1"
        ))
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?
        .map(project_from_db))
    }

    async fn list_projects(&self, include_archived: bool) -> StoreResult<Vec<Project>> {
        Ok(sqlx::query_as::<_, DbProject>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE ($1 OR NOT is_archived)
             ORDER BY created_at DESC"
        ))
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(project_from_db)
        .collect())
    }

    async fn list_projects_for_user(
        &self,
        user_id: Uuid,
        include_archived: bool,
    ) -> StoreResult<Vec<Project>> {
        Ok(sqlx::query_as::<_, DbProject>(
            r#"SELECT p.id, p.alias, p.name, p.description, p.api_key, p.is_archived,
                      p.created_by, p.created_at, p.updated_at
               FROM projects p
               JOIN memberships m ON m.project_id = p.id
               WHERE m.user_id = $1 AND ($2 OR NOT p.is_archived)
               ORDER BY p.created_at DESC"#,
        )
        .bind(user_id)
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(project_from_db)
        .collect())
    }

    async fn update_project(&self, project: Project) -> StoreResult<Project> {
        let result = sqlx::query(
            r#"UPDATE projects SET alias = $2, name = $3, description = $4, api_key = $5,
                   is_archived = $6, updated_at = $7
               WHERE id = $1"#,
        )
        .bind(project.id)
        .bind(&project.alias)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.api_key)
        .bind(project.is_archived)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await;
        if map_unique(result, "project alias or api key exists")? == 0 {
            return Err(StoreError::NotFound("project".into()));
        }
        Ok(project)
    }

    async fn delete_project(&self, project_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("project".into()));
        }
        Ok(())
    }

    async fn create_scope(&self, scope: Scope) -> StoreResult<Scope> {
        let mut tx = self.pool.begin().await?;
        let insert = sqlx::query(
            r#"INSERT INTO scopes (id, project_id, alias, name, description, idx, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(scope.id)
        .bind(scope.project_id)
        .bind(&scope.alias)
        .bind(&scope.name)
        .bind(&scope.description)
        .bind(scope.index)
        .bind(scope.created_at)
        .execute(&mut *tx)
        .await;
        map_unique(insert, "scope alias exists")?;

        sqlx::query(
            r#"INSERT INTO flag_values (flag_id, scope_id, enabled, updated_at)
               SELECT id, $2, FALSE, $3 FROM flags WHERE project_id = $1"#,
        )
        .bind(scope.project_id)
        .bind(scope.id)
        .bind(scope.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(scope)
    }

    async fn get_scope(&self, scope_id: Uuid) -> StoreResult<Scope> {
        let row = sqlx::query_as::<_, DbScope>(&format!(
            "SELECT {SCOPE_COLUMNS} FROM scopes WHERE id = $1"
        ))
        .bind(scope_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("scope".into()))?;
        Ok(scope_from_db(row))
    }

    async fn find_scope_by_alias(
        &self,
        project_id: Uuid,
        alias: &str,
    ) -> StoreResult<Option<Scope>> {
        Ok(sqlx::query_as::<_, DbScope>(&format!(
            "SELECT {SCOPE_COLUMNS} FROM scopes WHERE project_id = $1 AND alias = $2"
        ))
        .bind(project_id)
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?
        .map(scope_from_db))
    }

    async fn list_scopes(&self, project_id: Uuid) -> StoreResult<Vec<Scope>> {
        Ok(sqlx::query_as::<_, DbScope>(&format!(
            "SELECT {SCOPE_COLUMNS} FROM scopes WHERE project_id = $1 ORDER BY idx"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(scope_from_db)
        .collect())
    }

    async fn update_scope(&self, scope: Scope) -> StoreResult<Scope> {
        let result = sqlx::query(
            r#"UPDATE scopes SET alias = $2, name = $3, description = $4 WHERE id = $1"#,
        )
        .bind(scope.id)
        .bind(&scope.alias)
        .bind(&scope.name)
        .bind(&scope.description)
        .execute(&self.pool)
        .await;
        if map_unique(result, "scope alias exists")? == 0 {
            return Err(StoreError::NotFound("scope".into()));
        }
        Ok(scope)
    }

    async fn delete_scope(&self, scope_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM scope_grants WHERE scope_id = $1")
            .bind(scope_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM flag_values WHERE scope_id = $1")
            .bind(scope_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM scopes WHERE id = $1")
            .bind(scope_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("scope".into()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create_flag(&self, flag: Flag) -> StoreResult<Flag> {
        let mut tx = self.pool.begin().await?;
        let insert = sqlx::query(
            r#"INSERT INTO flags (id, project_id, key, name, description, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(flag.id)
        .bind(flag.project_id)
        .bind(&flag.key)
        .bind(&flag.name)
        .bind(&flag.description)
        .bind(flag.created_at)
        .bind(flag.updated_at)
        .execute(&mut *tx)
        .await;
        map_unique(insert, "flag key exists")?;

        sqlx::query(
            r#"INSERT INTO flag_values (flag_id, scope_id, enabled, updated_at)
               SELECT $2, id, FALSE, $3 FROM scopes WHERE project_id = $1"#,
        )
        .bind(flag.project_id)
        .bind(flag.id)
        .bind(flag.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(flag)
    }

    async fn get_flag(&self, flag_id: Uuid) -> StoreResult<Flag> {
        let row = sqlx::query_as::<_, DbFlag>(&format!(
            "SELECT {FLAG_COLUMNS} FROM flags WHERE id = $1"
        ))
        .bind(flag_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("flag".into()))?;
        Ok(flag_from_db(row))
    }

    async fn find_flag_by_key(&self, project_id: Uuid, key: &str) -> StoreResult<Option<Flag>> {
        Ok(sqlx::query_as::<_, DbFlag>(&format!(
            "SELECT {FLAG_COLUMNS} FROM flags WHERE project_id = $1 AND key = $2"
        ))
        .bind(project_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .map(flag_from_db))
    }

    async fn list_flags(&self, project_id: Uuid) -> StoreResult<Vec<Flag>> {
        Ok(sqlx::query_as::<_, DbFlag>(&format!(
            "SELECT {FLAG_COLUMNS} FROM flags WHERE project_id = $1 ORDER BY key"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(flag_from_db)
        .collect())
    }

    async fn update_flag(&self, flag: Flag) -> StoreResult<Flag> {
        let result = sqlx::query(
            r#"UPDATE flags SET key = $2, name = $3, description = $4, updated_at = $5
               WHERE id = $1"#,
        )
        .bind(flag.id)
        .bind(&flag.key)
        .bind(&flag.name)
        .bind(&flag.description)
        .bind(flag.updated_at)
        .execute(&self.pool)
        .await;
        if map_unique(result, "flag key exists")? == 0 {
            return Err(StoreError::NotFound("flag".into()));
        }
        Ok(flag)
    }

    async fn delete_flag(&self, flag_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM flags WHERE id = $1")
            .bind(flag_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("flag".into()));
        }
        Ok(())
    }

    async fn list_flag_values(&self, flag_id: Uuid) -> StoreResult<Vec<FlagValue>> {
        Ok(sqlx::query_as::<_, DbFlagValue>(
            r#"SELECT v.flag_id, v.scope_id, v.enabled, v.updated_at
               FROM flag_values v JOIN scopes s ON s.id = v.scope_id
               WHERE v.flag_id = $1
               ORDER BY s.idx"#,
        )
        .bind(flag_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(value_from_db)
        .collect())
    }

    async fn list_scope_values(&self, scope_id: Uuid) -> StoreResult<Vec<FlagValue>> {
        Ok(sqlx::query_as::<_, DbFlagValue>(
            r#"SELECT flag_id, scope_id, enabled, updated_at FROM flag_values WHERE scope_id = $1"#,
        )
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(value_from_db)
        .collect())
    }

    async fn get_flag_value(
        &self,
        flag_id: Uuid,
        scope_id: Uuid,
    ) -> StoreResult<Option<FlagValue>> {
        Ok(sqlx::query_as::<_, DbFlagValue>(
            r#"SELECT flag_id, scope_id, enabled, updated_at FROM flag_values
               WHERE flag_id = $1 AND scope_id = $2"#,
        )
        .bind(flag_id)
        .bind(scope_id)
        .fetch_optional(&self.pool)
        .await?
        .map(value_from_db))
    }

    async fn set_flag_value(&self, value: FlagValue) -> StoreResult<FlagValue> {
        sqlx::query(
            r#"INSERT INTO flag_values (flag_id, scope_id, enabled, updated_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (flag_id, scope_id)
               DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = EXCLUDED.updated_at"#,
        )
        .bind(value.flag_id)
        .bind(value.scope_id)
        .bind(value.enabled)
        .bind(value.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                StoreError::NotFound("flag or scope".into())
            } else {
                StoreError::from(err)
            }
        })?;
        Ok(value)
    }

    async fn lookup_flag_value(
        &self,
        project_alias: &str,
        scope_alias: &str,
        flag_key: &str,
    ) -> StoreResult<Option<FlagValueRecord>> {
        Ok(sqlx::query_as::<_, DbFlagValueRecord>(
            r#"SELECT f.key AS flag_key, s.id AS scope_id, s.alias AS scope_alias,
                      v.enabled, v.updated_at
               FROM projects p
               JOIN flags f ON f.project_id = p.id
               JOIN scopes s ON s.project_id = p.id
               JOIN flag_values v ON v.flag_id = f.id AND v.scope_id = s.id
               WHERE p.alias = $1 AND s.alias = $2 AND f.key = $3"#,
        )
        .bind(project_alias)
        .bind(scope_alias)
        .bind(flag_key)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| FlagValueRecord {
            flag_key: row.flag_key,
            scope_id: row.scope_id,
            scope_alias: row.scope_alias,
            enabled: row.enabled,
            updated_at: row.updated_at,
        }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl PermissionStore for PostgresStore {
    async fn is_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM memberships WHERE project_id = $1 AND user_id = $2)",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_membership(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        Ok(sqlx::query_as::<_, DbMembership>(
            "SELECT project_id, user_id, joined_at FROM memberships
             WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(membership_from_db))
    }

    async fn list_members(&self, project_id: Uuid) -> StoreResult<Vec<Membership>> {
        Ok(sqlx::query_as::<_, DbMembership>(
            "SELECT project_id, user_id, joined_at FROM memberships
             WHERE project_id = $1 ORDER BY joined_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(membership_from_db)
        .collect())
    }

    async fn add_member(&self, new: NewMembership) -> StoreResult<Membership> {
        let membership = new.membership;
        let mut tx = self.pool.begin().await?;
        let insert = sqlx::query(
            "INSERT INTO memberships (project_id, user_id, joined_at) VALUES ($1, $2, $3)",
        )
        .bind(membership.project_id)
        .bind(membership.user_id)
        .bind(membership.joined_at)
        .execute(&mut *tx)
        .await;
        map_unique(insert, "membership exists")?;
        Self::insert_project_grants(
            &mut tx,
            membership.project_id,
            membership.user_id,
            new.project_permissions,
        )
        .await?;
        Self::insert_scope_grants(
            &mut tx,
            membership.project_id,
            membership.user_id,
            new.scope_grants,
        )
        .await?;
        tx.commit().await?;
        Ok(membership)
    }

    async fn remove_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_other_active_holders(&mut tx, project_id, user_id, ProjectPermission::ALL)
            .await?;
        // Grants cascade through the membership foreign key.
        let result = sqlx::query("DELETE FROM memberships WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("membership".into()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn has_project_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permission: ProjectPermission,
    ) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM project_grants
                            WHERE project_id = $1 AND user_id = $2 AND permission = $3)",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(permission.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn has_scope_permission(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        permission: ScopePermission,
    ) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM scope_grants
                            WHERE scope_id = $1 AND user_id = $2 AND permission = $3)",
        )
        .bind(scope_id)
        .bind(user_id)
        .bind(permission.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeSet<ProjectPermission>> {
        sqlx::query_scalar::<_, String>(
            "SELECT permission FROM project_grants WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|raw| {
            raw.parse::<ProjectPermission>()
                .map_err(|err| StoreError::Unexpected(anyhow!(err)))
        })
        .collect()
    }

    async fn list_scope_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeMap<Uuid, BTreeSet<ScopePermission>>> {
        let rows = sqlx::query_as::<_, DbScopeGrant>(
            "SELECT scope_id, permission FROM scope_grants WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let mut map: BTreeMap<Uuid, BTreeSet<ScopePermission>> = BTreeMap::new();
        for row in rows {
            let permission = row
                .permission
                .parse::<ScopePermission>()
                .map_err(|err| StoreError::Unexpected(anyhow!(err)))?;
            map.entry(row.scope_id).or_default().insert(permission);
        }
        Ok(map)
    }

    async fn grant_project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permissions: &[ProjectPermission],
    ) -> StoreResult<()> {
        self.require_member(user_id, project_id).await?;
        let mut tx = self.pool.begin().await?;
        Self::insert_project_grants(&mut tx, project_id, user_id, permissions.iter().copied())
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn revoke_project_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permission: ProjectPermission,
    ) -> StoreResult<()> {
        self.require_member(user_id, project_id).await?;
        let mut tx = self.pool.begin().await?;
        Self::ensure_other_active_holders(&mut tx, project_id, user_id, [permission]).await?;
        sqlx::query(
            "DELETE FROM project_grants WHERE project_id = $1 AND user_id = $2 AND permission = $3",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(permission.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn grant_scope_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        grants: &[ScopeGrant],
    ) -> StoreResult<()> {
        self.require_member(user_id, project_id).await?;
        let mut tx = self.pool.begin().await?;
        Self::insert_scope_grants(&mut tx, project_id, user_id, grants.iter().copied()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn revoke_scope_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        grant: ScopeGrant,
    ) -> StoreResult<()> {
        self.require_member(user_id, project_id).await?;
        sqlx::query(
            "DELETE FROM scope_grants
             WHERE project_id = $1 AND user_id = $2 AND scope_id = $3 AND permission = $4",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(grant.scope_id)
        .bind(grant.permission.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permissions: &MemberPermissions,
    ) -> StoreResult<()> {
        self.require_member(user_id, project_id).await?;
        let mut tx = self.pool.begin().await?;
        let dropped = ProjectPermission::ALL
            .into_iter()
            .filter(|permission| !permissions.project_permissions.contains(permission));
        Self::ensure_other_active_holders(&mut tx, project_id, user_id, dropped).await?;
        sqlx::query("DELETE FROM project_grants WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scope_grants WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        Self::insert_project_grants(
            &mut tx,
            project_id,
            user_id,
            permissions.project_permissions.iter().copied(),
        )
        .await?;
        Self::insert_scope_grants(&mut tx, project_id, user_id, permissions.scope_grants())
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Maps a unique-constraint violation to `Conflict` and returns rows affected otherwise.
fn map_unique(
    result: Result<sqlx::postgres::PgQueryResult, sqlx::Error>,
    conflict: &str,
) -> StoreResult<u64> {
    match result {
        Ok(done) => Ok(done.rows_affected()),
        Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(conflict.into())),
        Err(err) => Err(StoreError::Unexpected(err.into())),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23503").unwrap_or(false);
    }
    false
}

fn user_from_db(row: DbUser) -> StoreResult<User> {
    let role = row
        .role
        .parse::<GlobalRole>()
        .map_err(|err| StoreError::Unexpected(anyhow!(err)))?;
    Ok(User {
        id: row.id,
        username: row.username,
        full_name: row.full_name,
        role,
        is_active: row.is_active,
        must_change_password: row.must_change_password,
        password_hash: row.password_hash,
        created_at: row.created_at,
        last_login_at: row.last_login_at,
    })
}

fn project_from_db(row: DbProject) -> Project {
    Project {
        id: row.id,
        alias: row.alias,
        name: row.name,
        description: row.description,
        api_key: row.api_key,
        is_archived: row.is_archived,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn scope_from_db(row: DbScope) -> Scope {
    Scope {
        id: row.id,
        project_id: row.project_id,
        alias: row.alias,
        name: row.name,
        description: row.description,
        index: row.idx,
        created_at: row.created_at,
    }
}

fn flag_from_db(row: DbFlag) -> Flag {
    Flag {
        id: row.id,
        project_id: row.project_id,
        key: row.key,
        name: row.name,
        description: row.description,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn value_from_db(row: DbFlagValue) -> FlagValue {
    FlagValue {
        flag_id: row.flag_id,
        scope_id: row.scope_id,
        enabled: row.enabled,
        updated_at: row.updated_at,
    }
}

fn membership_from_db(row: DbMembership) -> Membership {
    Membership {
        project_id: row.project_id,
        user_id: row.user_id,
        joined_at: row.joined_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_role_is_unexpected() {
        let row = DbUser {
            id: Uuid::new_v4(),
            username: "u".to_string(),
            full_name: "U".to_string(),
            role: "root".to_string(),
            is_active: true,
            must_change_password: false,
            password_hash: String::new(),
            created_at: Utc::now(),
            last_login_at: None,
        };
        assert!(matches!(user_from_db(row), Err(StoreError::Unexpected(_))));
    }

    #[test]
    fn scope_row_maps_index() {
        let row = DbScope {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            alias: "dev".to_string(),
            name: "Development".to_string(),
            description: None,
            idx: 2,
            created_at: Utc::now(),
        };
        assert_eq!(scope_from_db(row).index, 2);
    }
}

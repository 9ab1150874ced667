//! In-memory implementation of the flagplane store.
//!
//! # Purpose
//! Implements [`CatalogStore`] and [`PermissionStore`] entirely in memory. It
//! exists for:
//! - local development and tests (no external dependencies)
//! - single-node deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - All tables live behind one `tokio::sync::RwLock`, so composite writes
//!   (project creation with seeded scopes, scope deletion with grant cleanup,
//!   permission replacement) are atomic with respect to every reader.
//!
//! # Performance characteristics
//! - Reads are concurrent; writes are serialized.
//! - Cascades scan the dependent tables. That is fine for dev workloads but
//!   would be slow at very large scale.
use super::{
    CatalogStore, NewMembership, NewProject, PermissionStore, StoreError, StoreResult,
};
use crate::model::{
    Flag, FlagValue, FlagValueRecord, MemberPermissions, Membership, Project, Scope, ScopeGrant,
    User,
};
use async_trait::async_trait;
use flagplane_authz::{ProjectPermission, ScopePermission};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Key of a membership: `(project_id, user_id)`.
type MemberKey = (Uuid, Uuid);

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    projects: HashMap<Uuid, Project>,
    scopes: HashMap<Uuid, Scope>,
    flags: HashMap<Uuid, Flag>,
    /// Keyed by `(flag_id, scope_id)`.
    values: HashMap<(Uuid, Uuid), FlagValue>,
    memberships: HashMap<MemberKey, Membership>,
    project_grants: HashSet<(MemberKey, ProjectPermission)>,
    scope_grants: HashSet<(MemberKey, ScopeGrant)>,
}

impl Tables {
    fn project_conflict(&self, candidate: &Project) -> Option<&'static str> {
        self.projects.values().find_map(|existing| {
            if existing.id == candidate.id {
                return None;
            }
            if existing.alias == candidate.alias {
                Some("project alias exists")
            } else if existing.api_key == candidate.api_key {
                Some("project api key exists")
            } else {
                None
            }
        })
    }

    fn scope_alias_taken(&self, candidate: &Scope) -> bool {
        self.scopes.values().any(|existing| {
            existing.id != candidate.id
                && existing.project_id == candidate.project_id
                && existing.alias == candidate.alias
        })
    }

    fn flag_key_taken(&self, candidate: &Flag) -> bool {
        self.flags.values().any(|existing| {
            existing.id != candidate.id
                && existing.project_id == candidate.project_id
                && existing.key == candidate.key
        })
    }

    fn require_member(&self, key: MemberKey) -> StoreResult<()> {
        if self.memberships.contains_key(&key) {
            Ok(())
        } else {
            Err(StoreError::NotFound("membership".into()))
        }
    }

    /// Fails when `key` holds a guarded permission in `dropped` that no other
    /// active member of the project holds.
    fn ensure_other_active_holders(
        &self,
        key: MemberKey,
        dropped: impl IntoIterator<Item = ProjectPermission>,
    ) -> StoreResult<()> {
        let (project_id, user_id) = key;
        for permission in dropped {
            if !permission.is_guarded() || !self.project_grants.contains(&(key, permission)) {
                continue;
            }
            let covered = self.project_grants.iter().any(|((member_project, member), held)| {
                *member_project == project_id
                    && *member != user_id
                    && *held == permission
                    && self.users.get(member).is_some_and(|user| user.is_active)
            });
            if !covered {
                return Err(StoreError::LastHolder(permission));
            }
        }
        Ok(())
    }

    fn remove_scope_rows(&mut self, scope_id: Uuid) {
        self.values.retain(|(_, value_scope), _| *value_scope != scope_id);
        self.scope_grants
            .retain(|(_, grant)| grant.scope_id != scope_id);
        self.scopes.remove(&scope_id);
    }

    fn publish_gauges(&self) {
        metrics::gauge!("flagplane_projects_total").set(self.projects.len() as f64);
        metrics::gauge!("flagplane_flags_total").set(self.flags.len() as f64);
    }
}

/// In-memory flagplane store. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn count_users(&self) -> StoreResult<u64> {
        Ok(self.tables.read().await.users.len() as u64)
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|existing| existing.username == user.username)
        {
            return Err(StoreError::Conflict("username exists".into()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<User> {
        self.tables
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("user".into()))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn update_user(&self, user: User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Err(StoreError::NotFound("user".into()));
        }
        if tables
            .users
            .values()
            .any(|existing| existing.id != user.id && existing.username == user.username)
        {
            return Err(StoreError::Conflict("username exists".into()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_project(&self, new: NewProject) -> StoreResult<Project> {
        let mut tables = self.tables.write().await;
        if let Some(conflict) = tables.project_conflict(&new.project) {
            return Err(StoreError::Conflict(conflict.into()));
        }
        let project = new.project;
        let owner = (project.id, project.created_by);
        tables.projects.insert(project.id, project.clone());
        for scope in new.scopes {
            tables.scopes.insert(scope.id, scope);
        }
        tables.memberships.insert(
            owner,
            Membership {
                project_id: project.id,
                user_id: project.created_by,
                joined_at: project.created_at,
            },
        );
        for permission in new.owner_permissions {
            tables.project_grants.insert((owner, permission));
        }
        tables.publish_gauges();
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> StoreResult<Project> {
        self.tables
            .read()
            .await
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("project".into()))
    }

    async fn find_project_by_alias(&self, alias: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .tables
            .read()
            .await
            .projects
            .values()
            .find(|project| project.alias == alias)
            .cloned())
    }

    async fn find_project_by_api_key(&self, api_key: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .tables
            .read()
            .await
            .projects
            .values()
            .find(|project| project.api_key == api_key)
            .cloned())
    }

    async fn list_projects(&self, include_archived: bool) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .tables
            .read()
            .await
            .projects
            .values()
            .filter(|project| include_archived || !project.is_archived)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn list_projects_for_user(
        &self,
        user_id: Uuid,
        include_archived: bool,
    ) -> StoreResult<Vec<Project>> {
        let tables = self.tables.read().await;
        let mut projects: Vec<Project> = tables
            .projects
            .values()
            .filter(|project| include_archived || !project.is_archived)
            .filter(|project| tables.memberships.contains_key(&(project.id, user_id)))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn update_project(&self, project: Project) -> StoreResult<Project> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&project.id) {
            return Err(StoreError::NotFound("project".into()));
        }
        if let Some(conflict) = tables.project_conflict(&project) {
            return Err(StoreError::Conflict(conflict.into()));
        }
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn delete_project(&self, project_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.projects.remove(&project_id).is_none() {
            return Err(StoreError::NotFound("project".into()));
        }
        let scope_ids: Vec<Uuid> = tables
            .scopes
            .values()
            .filter(|scope| scope.project_id == project_id)
            .map(|scope| scope.id)
            .collect();
        for scope_id in scope_ids {
            tables.remove_scope_rows(scope_id);
        }
        let flag_ids: HashSet<Uuid> = tables
            .flags
            .values()
            .filter(|flag| flag.project_id == project_id)
            .map(|flag| flag.id)
            .collect();
        tables.values.retain(|(flag_id, _), _| !flag_ids.contains(flag_id));
        tables.flags.retain(|id, _| !flag_ids.contains(id));
        tables
            .memberships
            .retain(|(member_project, _), _| *member_project != project_id);
        tables
            .project_grants
            .retain(|((member_project, _), _)| *member_project != project_id);
        tables
            .scope_grants
            .retain(|((member_project, _), _)| *member_project != project_id);
        tables.publish_gauges();
        Ok(())
    }

    async fn create_scope(&self, scope: Scope) -> StoreResult<Scope> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&scope.project_id) {
            return Err(StoreError::NotFound("project".into()));
        }
        if tables.scope_alias_taken(&scope) {
            return Err(StoreError::Conflict("scope alias exists".into()));
        }
        let flag_ids: Vec<Uuid> = tables
            .flags
            .values()
            .filter(|flag| flag.project_id == scope.project_id)
            .map(|flag| flag.id)
            .collect();
        for flag_id in flag_ids {
            tables.values.insert(
                (flag_id, scope.id),
                FlagValue {
                    flag_id,
                    scope_id: scope.id,
                    enabled: false,
                    updated_at: scope.created_at,
                },
            );
        }
        tables.scopes.insert(scope.id, scope.clone());
        Ok(scope)
    }

    async fn get_scope(&self, scope_id: Uuid) -> StoreResult<Scope> {
        self.tables
            .read()
            .await
            .scopes
            .get(&scope_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("scope".into()))
    }

    async fn find_scope_by_alias(
        &self,
        project_id: Uuid,
        alias: &str,
    ) -> StoreResult<Option<Scope>> {
        Ok(self
            .tables
            .read()
            .await
            .scopes
            .values()
            .find(|scope| scope.project_id == project_id && scope.alias == alias)
            .cloned())
    }

    async fn list_scopes(&self, project_id: Uuid) -> StoreResult<Vec<Scope>> {
        let mut scopes: Vec<Scope> = self
            .tables
            .read()
            .await
            .scopes
            .values()
            .filter(|scope| scope.project_id == project_id)
            .cloned()
            .collect();
        scopes.sort_by_key(|scope| scope.index);
        Ok(scopes)
    }

    async fn update_scope(&self, scope: Scope) -> StoreResult<Scope> {
        let mut tables = self.tables.write().await;
        if !tables.scopes.contains_key(&scope.id) {
            return Err(StoreError::NotFound("scope".into()));
        }
        if tables.scope_alias_taken(&scope) {
            return Err(StoreError::Conflict("scope alias exists".into()));
        }
        tables.scopes.insert(scope.id, scope.clone());
        Ok(scope)
    }

    async fn delete_scope(&self, scope_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.scopes.contains_key(&scope_id) {
            return Err(StoreError::NotFound("scope".into()));
        }
        tables.remove_scope_rows(scope_id);
        Ok(())
    }

    async fn create_flag(&self, flag: Flag) -> StoreResult<Flag> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&flag.project_id) {
            return Err(StoreError::NotFound("project".into()));
        }
        if tables.flag_key_taken(&flag) {
            return Err(StoreError::Conflict("flag key exists".into()));
        }
        let scope_ids: Vec<Uuid> = tables
            .scopes
            .values()
            .filter(|scope| scope.project_id == flag.project_id)
            .map(|scope| scope.id)
            .collect();
        for scope_id in scope_ids {
            tables.values.insert(
                (flag.id, scope_id),
                FlagValue {
                    flag_id: flag.id,
                    scope_id,
                    enabled: false,
                    updated_at: flag.created_at,
                },
            );
        }
        tables.flags.insert(flag.id, flag.clone());
        tables.publish_gauges();
        Ok(flag)
    }

    async fn get_flag(&self, flag_id: Uuid) -> StoreResult<Flag> {
        self.tables
            .read()
            .await
            .flags
            .get(&flag_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("flag".into()))
    }

    async fn find_flag_by_key(&self, project_id: Uuid, key: &str) -> StoreResult<Option<Flag>> {
        Ok(self
            .tables
            .read()
            .await
            .flags
            .values()
            .find(|flag| flag.project_id == project_id && flag.key == key)
            .cloned())
    }

    async fn list_flags(&self, project_id: Uuid) -> StoreResult<Vec<Flag>> {
        let mut flags: Vec<Flag> = self
            .tables
            .read()
            .await
            .flags
            .values()
            .filter(|flag| flag.project_id == project_id)
            .cloned()
            .collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(flags)
    }

    async fn update_flag(&self, flag: Flag) -> StoreResult<Flag> {
        let mut tables = self.tables.write().await;
        if !tables.flags.contains_key(&flag.id) {
            return Err(StoreError::NotFound("flag".into()));
        }
        if tables.flag_key_taken(&flag) {
            return Err(StoreError::Conflict("flag key exists".into()));
        }
        tables.flags.insert(flag.id, flag.clone());
        Ok(flag)
    }

    async fn delete_flag(&self, flag_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.flags.remove(&flag_id).is_none() {
            return Err(StoreError::NotFound("flag".into()));
        }
        tables.values.retain(|(value_flag, _), _| *value_flag != flag_id);
        tables.publish_gauges();
        Ok(())
    }

    async fn list_flag_values(&self, flag_id: Uuid) -> StoreResult<Vec<FlagValue>> {
        let tables = self.tables.read().await;
        let mut values: Vec<FlagValue> = tables
            .values
            .values()
            .filter(|value| value.flag_id == flag_id)
            .cloned()
            .collect();
        values.sort_by_key(|value| {
            tables
                .scopes
                .get(&value.scope_id)
                .map(|scope| scope.index)
                .unwrap_or(i32::MAX)
        });
        Ok(values)
    }

    async fn list_scope_values(&self, scope_id: Uuid) -> StoreResult<Vec<FlagValue>> {
        Ok(self
            .tables
            .read()
            .await
            .values
            .values()
            .filter(|value| value.scope_id == scope_id)
            .cloned()
            .collect())
    }

    async fn get_flag_value(
        &self,
        flag_id: Uuid,
        scope_id: Uuid,
    ) -> StoreResult<Option<FlagValue>> {
        Ok(self
            .tables
            .read()
            .await
            .values
            .get(&(flag_id, scope_id))
            .cloned())
    }

    async fn set_flag_value(&self, value: FlagValue) -> StoreResult<FlagValue> {
        let mut tables = self.tables.write().await;
        if !tables.flags.contains_key(&value.flag_id) {
            return Err(StoreError::NotFound("flag".into()));
        }
        if !tables.scopes.contains_key(&value.scope_id) {
            return Err(StoreError::NotFound("scope".into()));
        }
        tables
            .values
            .insert((value.flag_id, value.scope_id), value.clone());
        Ok(value)
    }

    async fn lookup_flag_value(
        &self,
        project_alias: &str,
        scope_alias: &str,
        flag_key: &str,
    ) -> StoreResult<Option<FlagValueRecord>> {
        let tables = self.tables.read().await;
        let Some(project) = tables
            .projects
            .values()
            .find(|project| project.alias == project_alias)
        else {
            return Ok(None);
        };
        let scope = tables
            .scopes
            .values()
            .find(|scope| scope.project_id == project.id && scope.alias == scope_alias);
        let flag = tables
            .flags
            .values()
            .find(|flag| flag.project_id == project.id && flag.key == flag_key);
        let (Some(scope), Some(flag)) = (scope, flag) else {
            return Ok(None);
        };
        Ok(tables
            .values
            .get(&(flag.id, scope.id))
            .map(|value| FlagValueRecord {
                flag_key: flag.key.clone(),
                scope_id: scope.id,
                scope_alias: scope.alias.clone(),
                enabled: value.enabled,
                updated_at: value.updated_at,
            }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn is_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .memberships
            .contains_key(&(project_id, user_id)))
    }

    async fn get_membership(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .tables
            .read()
            .await
            .memberships
            .get(&(project_id, user_id))
            .cloned())
    }

    async fn list_members(&self, project_id: Uuid) -> StoreResult<Vec<Membership>> {
        let mut members: Vec<Membership> = self
            .tables
            .read()
            .await
            .memberships
            .values()
            .filter(|member| member.project_id == project_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    async fn add_member(&self, new: NewMembership) -> StoreResult<Membership> {
        let mut tables = self.tables.write().await;
        let membership = new.membership;
        let key = (membership.project_id, membership.user_id);
        if !tables.projects.contains_key(&membership.project_id) {
            return Err(StoreError::NotFound("project".into()));
        }
        if tables.memberships.contains_key(&key) {
            return Err(StoreError::Conflict("membership exists".into()));
        }
        tables.memberships.insert(key, membership.clone());
        for permission in new.project_permissions {
            tables.project_grants.insert((key, permission));
        }
        for grant in new.scope_grants {
            tables.scope_grants.insert((key, grant));
        }
        Ok(membership)
    }

    async fn remove_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = (project_id, user_id);
        tables.require_member(key)?;
        tables.ensure_other_active_holders(key, ProjectPermission::ALL)?;
        tables.memberships.remove(&key);
        tables.project_grants.retain(|(member, _)| *member != key);
        tables.scope_grants.retain(|(member, _)| *member != key);
        Ok(())
    }

    async fn has_project_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permission: ProjectPermission,
    ) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .project_grants
            .contains(&((project_id, user_id), permission)))
    }

    async fn has_scope_permission(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        permission: ScopePermission,
    ) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .scope_grants
            .iter()
            .any(|((_, member), grant)| {
                *member == user_id && grant.scope_id == scope_id && grant.permission == permission
            }))
    }

    async fn list_project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeSet<ProjectPermission>> {
        let key = (project_id, user_id);
        Ok(self
            .tables
            .read()
            .await
            .project_grants
            .iter()
            .filter(|(member, _)| *member == key)
            .map(|(_, permission)| *permission)
            .collect())
    }

    async fn list_scope_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeMap<Uuid, BTreeSet<ScopePermission>>> {
        let key = (project_id, user_id);
        let mut map: BTreeMap<Uuid, BTreeSet<ScopePermission>> = BTreeMap::new();
        for (member, grant) in self.tables.read().await.scope_grants.iter() {
            if *member == key {
                map.entry(grant.scope_id)
                    .or_default()
                    .insert(grant.permission);
            }
        }
        Ok(map)
    }

    async fn grant_project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permissions: &[ProjectPermission],
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = (project_id, user_id);
        tables.require_member(key)?;
        for permission in permissions {
            tables.project_grants.insert((key, *permission));
        }
        Ok(())
    }

    async fn revoke_project_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permission: ProjectPermission,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = (project_id, user_id);
        tables.require_member(key)?;
        tables.ensure_other_active_holders(key, [permission])?;
        tables.project_grants.remove(&(key, permission));
        Ok(())
    }

    async fn grant_scope_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        grants: &[ScopeGrant],
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = (project_id, user_id);
        tables.require_member(key)?;
        for grant in grants {
            tables.scope_grants.insert((key, *grant));
        }
        Ok(())
    }

    async fn revoke_scope_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        grant: ScopeGrant,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = (project_id, user_id);
        tables.require_member(key)?;
        tables.scope_grants.remove(&(key, grant));
        Ok(())
    }

    async fn replace_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permissions: &MemberPermissions,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = (project_id, user_id);
        tables.require_member(key)?;
        let dropped: Vec<ProjectPermission> = ProjectPermission::ALL
            .into_iter()
            .filter(|permission| !permissions.project_permissions.contains(permission))
            .collect();
        tables.ensure_other_active_holders(key, dropped)?;
        tables.project_grants.retain(|(member, _)| *member != key);
        tables.scope_grants.retain(|(member, _)| *member != key);
        for permission in &permissions.project_permissions {
            tables.project_grants.insert((key, *permission));
        }
        for grant in permissions.scope_grants() {
            tables.scope_grants.insert((key, grant));
        }
        Ok(())
    }
}

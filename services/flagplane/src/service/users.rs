//! Global user administration. Admin only.
use super::error::Validator;
use super::{FieldError, ServiceError, ServiceResult, Services};
use crate::service::types::{CreateUserRequest, UpdateUserRequest};
use crate::auth::password::check_password_strength;
use crate::auth::principal::Principal;
use crate::authz::Requirement;
use crate::model::User;
use crate::observability::audit;
use crate::store::CatalogStore;
use chrono::Utc;
use uuid::Uuid;

const NO_PROJECT: &str = "-";

fn validate_username(validator: &mut Validator, username: &str) {
    validator.check(
        !username.is_empty() && username.len() <= 64,
        "username",
        "must be between 1 and 64 characters",
    );
    validator.check(
        !username.chars().any(char::is_whitespace),
        "username",
        "must not contain whitespace",
    );
}

impl Services {
    pub async fn create_user(
        &self,
        principal: &Principal,
        request: CreateUserRequest,
    ) -> ServiceResult<User> {
        self.authorize(principal, None, Requirement::Admin).await?;
        let mut validator = Validator::default();
        validate_username(&mut validator, &request.username);
        validator.name("full_name", &request.full_name);
        validator.finish()?;
        if let Err(message) = check_password_strength(&request.temporary_password) {
            return Err(ServiceError::Validation(vec![FieldError::new(
                "temporary_password",
                message,
            )]));
        }
        if self
            .store
            .find_user_by_username(&request.username)
            .await?
            .is_some()
        {
            return Err(ServiceError::BadRequest(format!(
                "username '{}' is already taken",
                request.username
            )));
        }
        let password_hash = self.hasher.hash(&request.temporary_password).await?;
        let user = self
            .store
            .create_user(User {
                id: Uuid::new_v4(),
                username: request.username,
                full_name: request.full_name.trim().to_string(),
                role: request.role,
                is_active: true,
                must_change_password: true,
                password_hash,
                created_at: Utc::now(),
                last_login_at: None,
            })
            .await?;
        audit(&principal.username, NO_PROJECT, "user", "create");
        Ok(user)
    }

    pub async fn list_users(&self, principal: &Principal) -> ServiceResult<Vec<User>> {
        self.authorize(principal, None, Requirement::Admin).await?;
        Ok(self.store.list_users().await?)
    }

    pub async fn get_user(&self, principal: &Principal, user_id: Uuid) -> ServiceResult<User> {
        self.authorize(principal, None, Requirement::Admin).await?;
        Ok(self.store.get_user(user_id).await?)
    }

    pub async fn update_user(
        &self,
        principal: &Principal,
        user_id: Uuid,
        request: UpdateUserRequest,
    ) -> ServiceResult<User> {
        self.authorize(principal, None, Requirement::Admin).await?;
        let mut user = self.store.get_user(user_id).await?;
        if let Some(full_name) = &request.full_name {
            Validator::default().name("full_name", full_name).finish()?;
            user.full_name = full_name.trim().to_string();
        }
        if let Some(role) = request.role {
            if user.id == principal.user_id && role != user.role {
                return Err(ServiceError::BadRequest(
                    "you cannot change your own role".to_string(),
                ));
            }
            user.role = role;
        }
        let user = self.store.update_user(user).await?;
        audit(&principal.username, NO_PROJECT, "user", "update");
        Ok(user)
    }

    /// Soft delete. The account keeps its memberships but can no longer sign in
    /// and loses any admin bypass.
    ///
    /// Inactive members no longer count as holders of `manage_users` or
    /// `delete_project`, so other grants cannot be revoked down to them.
    /// Deactivating a project's last active holder is still allowed; an admin
    /// then recovers the project through the bypass.
    pub async fn deactivate_user(&self, principal: &Principal, user_id: Uuid) -> ServiceResult<()> {
        self.authorize(principal, None, Requirement::Admin).await?;
        if user_id == principal.user_id {
            return Err(ServiceError::BadRequest(
                "you cannot deactivate your own account".to_string(),
            ));
        }
        let mut user = self.store.get_user(user_id).await?;
        if !user.is_active {
            return Ok(());
        }
        user.is_active = false;
        self.store.update_user(user).await?;
        tracing::info!(%user_id, actor = %principal.user_id, "user deactivated");
        audit(&principal.username, NO_PROJECT, "user", "deactivate");
        Ok(())
    }
}

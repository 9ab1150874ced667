//! Interactive sign-in and account self-service.
use super::{FieldError, ServiceError, ServiceResult, Services};
use crate::service::types::{ChangePasswordRequest, LoginResponse};
use crate::auth::password::check_password_strength;
use crate::auth::principal::Principal;
use crate::config::AdminSeedConfig;
use crate::model::User;
use crate::observability::audit;
use crate::store::{CatalogStore, StoreError};
use chrono::Utc;
use flagplane_authz::GlobalRole;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "invalid username or password";

impl Services {
    /// Verifies credentials and mints a session assertion. Unknown users,
    /// inactive users and wrong passwords all fail the same way, and each
    /// costs one password verification.
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<LoginResponse> {
        let verified = match self.store.find_user_by_username(username).await? {
            Some(user) if user.is_active => self
                .hasher
                .verify(password, &user.password_hash)
                .await?
                .then_some(user),
            _ => {
                self.hasher.verify_decoy(password).await?;
                None
            }
        };
        let Some(mut user) = verified else {
            metrics::counter!("flagplane_login_failures_total").increment(1);
            tracing::info!(username, "login rejected");
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };
        user.last_login_at = Some(Utc::now());
        let user = self.store.update_user(user).await?;
        let token = self.signer.mint(&user)?;
        tracing::info!(user_id = %user.id, "login");
        Ok(LoginResponse {
            token,
            expires_in: self.signer.ttl().as_secs(),
            user,
        })
    }

    /// The live record behind a session. Fails once the account is deactivated.
    pub async fn me(&self, principal: &Principal) -> ServiceResult<User> {
        match self.store.get_user(principal.user_id).await {
            Ok(user) if user.is_active => Ok(user),
            Ok(_) | Err(StoreError::NotFound(_)) => Err(ServiceError::Unauthorized(
                "account is no longer active".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn change_password(
        &self,
        principal: &Principal,
        request: ChangePasswordRequest,
    ) -> ServiceResult<()> {
        let mut user = self.me(principal).await?;
        if !self
            .hasher
            .verify(&request.current_password, &user.password_hash)
            .await?
        {
            return Err(ServiceError::BadRequest(
                "current password is incorrect".to_string(),
            ));
        }
        if let Err(message) = check_password_strength(&request.new_password) {
            return Err(ServiceError::Validation(vec![FieldError::new(
                "new_password",
                message,
            )]));
        }
        user.password_hash = self.hasher.hash(&request.new_password).await?;
        user.must_change_password = false;
        self.store.update_user(user).await?;
        audit(&principal.username, "-", "user", "change_password");
        Ok(())
    }

    /// Creates the first administrator when the user table is empty.
    /// Returns `None` when users already exist or no seed is configured.
    pub async fn bootstrap_admin(
        &self,
        seed: Option<&AdminSeedConfig>,
    ) -> ServiceResult<Option<User>> {
        if self.store.count_users().await? > 0 {
            return Ok(None);
        }
        let Some(seed) = seed else {
            tracing::warn!(
                "no users exist and no admin seed is configured; set FLAGPLANE_ADMIN_USERNAME and FLAGPLANE_ADMIN_PASSWORD"
            );
            return Ok(None);
        };
        if let Err(message) = check_password_strength(&seed.password) {
            return Err(ServiceError::Validation(vec![FieldError::new(
                "admin_password",
                message,
            )]));
        }
        let password_hash = self.hasher.hash(&seed.password).await?;
        let user = self
            .store
            .create_user(User {
                id: Uuid::new_v4(),
                username: seed.username.clone(),
                full_name: seed.full_name.clone(),
                role: GlobalRole::Admin,
                is_active: true,
                must_change_password: false,
                password_hash,
                created_at: Utc::now(),
                last_login_at: None,
            })
            .await?;
        tracing::info!(user_id = %user.id, username = %user.username, "bootstrap admin created");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::types::CreateUserRequest;
    use crate::auth::password::{HashError, PasswordHasher};
    use crate::auth::session::SessionSigner;
    use crate::cache::InMemoryEvaluationCache;
    use crate::service::testing::harness;
    use crate::store::memory::InMemoryStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn seed() -> AdminSeedConfig {
        AdminSeedConfig {
            username: "admin".into(),
            password: "Bootstrap1pass".into(),
            full_name: "System Administrator".into(),
        }
    }

    #[tokio::test]
    async fn bootstrap_runs_once() {
        let h = harness();
        let admin = h
            .services
            .bootstrap_admin(Some(&seed()))
            .await
            .expect("bootstrap")
            .expect("created");
        assert_eq!(admin.role, GlobalRole::Admin);
        assert!(h
            .services
            .bootstrap_admin(Some(&seed()))
            .await
            .expect("second run")
            .is_none());
    }

    #[tokio::test]
    async fn bootstrap_without_seed_does_nothing() {
        let h = harness();
        assert!(h.services.bootstrap_admin(None).await.expect("run").is_none());
        assert_eq!(h.store.count_users().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn login_issues_verifiable_session() {
        let h = harness();
        h.services
            .bootstrap_admin(Some(&seed()))
            .await
            .expect("bootstrap");
        let response = h
            .services
            .login("admin", "Bootstrap1pass")
            .await
            .expect("login");
        assert_eq!(response.expires_in, 3600);
        assert!(response.user.last_login_at.is_some());
        let principal = h.services.signer.verify(&response.token).expect("verify");
        assert_eq!(principal.user_id, response.user.id);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let h = harness();
        let admin = h
            .services
            .bootstrap_admin(Some(&seed()))
            .await
            .expect("bootstrap")
            .expect("created");
        let principal = Principal::from(&admin);
        let user = h
            .services
            .create_user(
                &principal,
                CreateUserRequest {
                    username: "jamie".into(),
                    full_name: "Jamie".into(),
                    temporary_password: "Temporary1".into(),
                    role: GlobalRole::User,
                },
            )
            .await
            .expect("create");
        h.services
            .deactivate_user(&principal, user.id)
            .await
            .expect("deactivate");

        let attempts = [
            ("nobody", "Temporary1"),
            ("admin", "wrong-password"),
            ("jamie", "Temporary1"),
        ];
        for (username, password) in attempts {
            let err = h
                .services
                .login(username, password)
                .await
                .expect_err("rejected");
            let ServiceError::Unauthorized(message) = err else {
                panic!("expected unauthorized, got {err:?}");
            };
            assert_eq!(message, INVALID_CREDENTIALS);
        }
    }

    #[derive(Default)]
    struct CountingHasher {
        verifies: AtomicUsize,
    }

    impl PasswordHasher for CountingHasher {
        fn hash(&self, secret: &str) -> Result<String, HashError> {
            Ok(format!("plain:{secret}"))
        }

        fn verify(&self, secret: &str, digest: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            digest.strip_prefix("plain:") == Some(secret)
        }
    }

    #[tokio::test]
    async fn every_rejected_login_runs_one_verification() {
        let counting = Arc::new(CountingHasher::default());
        let services = Services::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryEvaluationCache::with_limits(
                Duration::from_secs(60),
                Duration::from_secs(5),
            )),
            counting.clone(),
            SessionSigner::from_seed([9u8; 32], Duration::from_secs(3600)).expect("signer"),
        );
        services
            .bootstrap_admin(Some(&seed()))
            .await
            .expect("bootstrap")
            .expect("created");

        for (username, password) in [("nobody", "Temporary1"), ("admin", "wrong-password")] {
            let before = counting.verifies.load(Ordering::SeqCst);
            let err = services
                .login(username, password)
                .await
                .expect_err("rejected");
            assert!(matches!(err, ServiceError::Unauthorized(_)));
            assert_eq!(counting.verifies.load(Ordering::SeqCst), before + 1, "{username}");
        }
        assert!(services.login("admin", "Bootstrap1pass").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_logins_share_the_runtime() {
        let h = harness();
        h.services
            .bootstrap_admin(Some(&seed()))
            .await
            .expect("bootstrap")
            .expect("created");
        let attempts: Vec<_> = ["Bootstrap1pass", "wrong-password", "Bootstrap1pass"]
            .into_iter()
            .map(|password| {
                let services = h.services.clone();
                tokio::spawn(async move { services.login("admin", password).await.is_ok() })
            })
            .collect();
        let mut outcomes = Vec::new();
        for attempt in attempts {
            outcomes.push(attempt.await.expect("join"));
        }
        assert_eq!(outcomes, vec![true, false, true]);
    }

    #[tokio::test]
    async fn change_password_clears_forced_change() {
        let h = harness();
        let admin = h
            .services
            .bootstrap_admin(Some(&seed()))
            .await
            .expect("bootstrap")
            .expect("created");
        let principal = Principal::from(&admin);
        let user = h
            .services
            .create_user(
                &principal,
                CreateUserRequest {
                    username: "jamie".into(),
                    full_name: "Jamie".into(),
                    temporary_password: "Temporary1".into(),
                    role: GlobalRole::User,
                },
            )
            .await
            .expect("create");
        let jamie = Principal::from(&user);

        let err = h
            .services
            .change_password(
                &jamie,
                ChangePasswordRequest {
                    current_password: "Wrong1pass".into(),
                    new_password: "Brand1newpass".into(),
                },
            )
            .await
            .expect_err("wrong current");
        assert!(matches!(err, ServiceError::BadRequest(_)));

        h.services
            .change_password(
                &jamie,
                ChangePasswordRequest {
                    current_password: "Temporary1".into(),
                    new_password: "Brand1newpass".into(),
                },
            )
            .await
            .expect("change");
        let refreshed = h.services.me(&jamie).await.expect("me");
        assert!(!refreshed.must_change_password);
        assert!(h.services.login("jamie", "Brand1newpass").await.is_ok());
    }
}

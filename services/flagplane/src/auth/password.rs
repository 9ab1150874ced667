//! Credential hashing.
//!
//! The service layer only sees [`BlockingHasher`], which runs a
//! [`PasswordHasher`] on tokio's blocking pool. The Argon2id implementation
//! stores PHC strings so parameters travel with each hash.
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Secret hashed once to produce the decoy digest.
const DECOY_SECRET: &str = "flagplane-decoy-credential";

#[derive(Debug, Error)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, HashError>;
    /// Malformed digests verify as `false`.
    fn verify(&self, secret: &str, digest: &str) -> bool;
}

#[derive(Debug, Default, Clone)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| HashError::Hash(err.to_string()))
    }

    fn verify(&self, secret: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Async front for a [`PasswordHasher`]. Every hash and verify runs under
/// `spawn_blocking`.
#[derive(Clone)]
pub struct BlockingHasher {
    inner: Arc<dyn PasswordHasher>,
    decoy: Arc<OnceCell<String>>,
}

impl BlockingHasher {
    pub fn new(inner: Arc<dyn PasswordHasher>) -> Self {
        Self {
            inner,
            decoy: Arc::new(OnceCell::new()),
        }
    }

    pub async fn hash(&self, secret: &str) -> Result<String, HashError> {
        let inner = Arc::clone(&self.inner);
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || inner.hash(&secret)).await?
    }

    pub async fn verify(&self, secret: &str, digest: &str) -> Result<bool, HashError> {
        let inner = Arc::clone(&self.inner);
        let secret = secret.to_owned();
        let digest = digest.to_owned();
        Ok(tokio::task::spawn_blocking(move || inner.verify(&secret, &digest)).await?)
    }

    /// Verifies `secret` against a digest no account owns. Always resolves
    /// to `false`.
    pub async fn verify_decoy(&self, secret: &str) -> Result<bool, HashError> {
        let digest = self
            .decoy
            .get_or_try_init(|| self.hash(DECOY_SECRET))
            .await?
            .clone();
        self.verify(secret, &digest).await?;
        Ok(false)
    }
}

/// At least 8 characters with an uppercase letter, a lowercase letter, and a digit.
pub fn check_password_strength(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("password must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("password must contain a digit");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hash_then_verify() {
        let hasher = Argon2Hasher;
        let digest = hasher.hash("Correct1horse").expect("hash");
        assert!(digest.starts_with("$argon2"));
        assert!(hasher.verify("Correct1horse", &digest));
        assert!(!hasher.verify("correct1horse", &digest));
        assert!(!hasher.verify("Correct1horse", "not-a-phc-string"));
    }

    #[derive(Default)]
    struct CountingHasher {
        verifies: AtomicUsize,
        hashes: AtomicUsize,
    }

    impl PasswordHasher for CountingHasher {
        fn hash(&self, secret: &str) -> Result<String, HashError> {
            self.hashes.fetch_add(1, Ordering::SeqCst);
            Ok(format!("plain:{secret}"))
        }

        fn verify(&self, secret: &str, digest: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            digest.strip_prefix("plain:") == Some(secret)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_hasher_runs_argon2_off_the_runtime() {
        let hasher = BlockingHasher::new(Arc::new(Argon2Hasher));
        let digest = hasher.hash("Correct1horse").await.expect("hash");
        let (good, bad) = tokio::join!(
            hasher.verify("Correct1horse", &digest),
            hasher.verify("Wrong1horse", &digest),
        );
        assert!(good.expect("verify"));
        assert!(!bad.expect("verify"));
    }

    #[tokio::test]
    async fn decoy_verification_does_the_work_and_never_matches() {
        let counting = Arc::new(CountingHasher::default());
        let hasher = BlockingHasher::new(counting.clone());

        assert!(!hasher.verify_decoy("flagplane-decoy-credential").await.expect("decoy"));
        assert!(!hasher.verify_decoy("anything").await.expect("decoy"));
        assert_eq!(counting.verifies.load(Ordering::SeqCst), 2);
        // The decoy digest is computed once.
        assert_eq!(counting.hashes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn strength_rules() {
        assert!(check_password_strength("Short1").is_err());
        assert!(check_password_strength("alllowercase1").is_err());
        assert!(check_password_strength("ALLUPPERCASE1").is_err());
        assert!(check_password_strength("NoDigitsHere").is_err());
        assert!(check_password_strength("Good1Password").is_ok());
    }
}

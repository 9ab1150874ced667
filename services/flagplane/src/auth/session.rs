//! Session assertions for interactive users.
//!
//! # Purpose
//! Mints and verifies the signed identity assertion handed out at login. The
//! assertion is an EdDSA (Ed25519) JWT carrying the user id, display name, and
//! global role; later requests present it as the `flagplane_session` cookie or
//! as a bearer token.
//!
//! # Key invariants
//! - Only EdDSA is accepted. The verifier pins the algorithm, issuer, and audience.
//! - The assertion is trusted for identity only. Every permission check still
//!   goes to the permission store.
//!
//! # Security
//! - The signing seed is never logged or serialized.
//! - Rotating the seed invalidates every outstanding session.
use crate::auth::principal::Principal;
use crate::model::User;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flagplane_authz::GlobalRole;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "flagplane_session";
const ISSUER: &str = "flagplane";
const AUDIENCE: &str = "flagplane-session";

/// Claims carried by a session assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    pub sub: Uuid,
    pub username: String,
    pub name: String,
    pub role: GlobalRole,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("key error: {0}")]
    Key(String),
}

/// Signs and verifies session assertions with one Ed25519 key.
#[derive(Clone)]
pub struct SessionSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn from_seed(seed: [u8; 32], ttl: Duration) -> Result<Self, TokenError> {
        // jsonwebtoken wants PKCS8 DER for signing and the raw `x` component for verifying.
        let signing_key = Ed25519SigningKey::from_bytes(&seed);
        let der = signing_key
            .to_pkcs8_der()
            .map_err(|err| TokenError::Key(format!("encode Ed25519 key: {err}")))?;
        let encoding = EncodingKey::from_ed_der(der.as_bytes());
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
        let decoding = DecodingKey::from_ed_components(&x)?;
        Ok(Self {
            encoding,
            decoding,
            ttl,
        })
    }

    /// Generates a fresh key. Sessions do not survive a restart.
    pub fn ephemeral(ttl: Duration) -> Result<Self, TokenError> {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(seed, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn mint(&self, user: &User) -> Result<String, TokenError> {
        let now = now_epoch_seconds();
        let claims = SessionClaims {
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            sub: user.id,
            username: user.username.clone(),
            name: user.full_name.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::EdDSA),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[ISSUER]);
        validation.leeway = 30;
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)?;
        Ok(Principal::from(data.claims))
    }
}

fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

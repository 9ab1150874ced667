//! Service configuration.
//!
//! Values come from `FLAGPLANE_*` environment variables; when `FLAGPLANE_CONFIG`
//! names a YAML file its keys override the environment.
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_CACHE_LOAD_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
pub const DEFAULT_ADMIN_FULL_NAME: &str = "System Administrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub load_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            load_timeout: Duration::from_millis(DEFAULT_CACHE_LOAD_TIMEOUT_MS),
        }
    }
}

/// Signing material and lifetime for session assertions.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl: Duration,
    /// Raw Ed25519 seed; `None` generates an ephemeral key at startup.
    pub signing_seed: Option<[u8; 32]>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("ttl", &self.ttl)
            .field("signing_seed", &self.signing_seed.map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            signing_seed: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AdminSeedConfig {
    pub username: String,
    pub password: String,
    pub full_name: String,
}

impl std::fmt::Debug for AdminSeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeedConfig")
            .field("username", &self.username)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct FlagplaneConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub admin: Option<AdminSeedConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct FlagplaneConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres_url: Option<String>,
    postgres_max_connections: Option<u32>,
    cache_ttl_secs: Option<u64>,
    cache_load_timeout_ms: Option<u64>,
    session_ttl_secs: Option<u64>,
    session_key: Option<String>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    admin_full_name: Option<String>,
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("parse {name}")),
        Err(_) => Ok(default),
    }
}

fn decode_seed(raw: &str) -> Result<[u8; 32]> {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let bytes = URL_SAFE_NO_PAD
        .decode(raw.trim_end_matches('='))
        .context("decode session key")?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow::anyhow!("session key must be 32 bytes, got {}", bytes.len()))
}

impl FlagplaneConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("FLAGPLANE_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8443".to_string())
            .parse()
            .with_context(|| "parse FLAGPLANE_BIND")?;
        let metrics_bind = std::env::var("FLAGPLANE_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| "parse FLAGPLANE_METRICS_BIND")?;
        let storage = std::env::var("FLAGPLANE_STORAGE")
            .unwrap_or_else(|_| "memory".to_string())
            .parse::<StorageBackend>()
            .with_context(|| "parse FLAGPLANE_STORAGE")?;
        let postgres = match std::env::var("FLAGPLANE_POSTGRES_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse("FLAGPLANE_POSTGRES_MAX_CONNECTIONS", 10)?,
                connect_timeout_ms: 5_000,
                acquire_timeout_ms: 5_000,
            }),
            Err(_) => None,
        };
        let cache = CacheConfig {
            ttl: Duration::from_secs(env_parse(
                "FLAGPLANE_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )?),
            load_timeout: Duration::from_millis(env_parse(
                "FLAGPLANE_CACHE_LOAD_TIMEOUT_MS",
                DEFAULT_CACHE_LOAD_TIMEOUT_MS,
            )?),
        };
        let session = SessionConfig {
            ttl: Duration::from_secs(env_parse(
                "FLAGPLANE_SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL_SECS,
            )?),
            signing_seed: std::env::var("FLAGPLANE_SESSION_KEY")
                .ok()
                .map(|raw| decode_seed(&raw))
                .transpose()
                .with_context(|| "parse FLAGPLANE_SESSION_KEY")?,
        };
        let admin = match (
            std::env::var("FLAGPLANE_ADMIN_USERNAME"),
            std::env::var("FLAGPLANE_ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(AdminSeedConfig {
                username,
                password,
                full_name: std::env::var("FLAGPLANE_ADMIN_FULLNAME")
                    .unwrap_or_else(|_| DEFAULT_ADMIN_FULL_NAME.to_string()),
            }),
            _ => None,
        };
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            cache,
            session,
            admin,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("FLAGPLANE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read FLAGPLANE_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: FlagplaneConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse flagplane config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(url) = override_cfg.postgres_url {
            let max_connections = override_cfg
                .postgres_max_connections
                .or(self.postgres.as_ref().map(|pg| pg.max_connections))
                .unwrap_or(10);
            self.postgres = Some(PostgresConfig {
                url,
                max_connections,
                connect_timeout_ms: 5_000,
                acquire_timeout_ms: 5_000,
            });
        } else if let (Some(max), Some(pg)) =
            (override_cfg.postgres_max_connections, self.postgres.as_mut())
        {
            pg.max_connections = max;
        }
        if let Some(value) = override_cfg.cache_ttl_secs {
            self.cache.ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.cache_load_timeout_ms {
            self.cache.load_timeout = Duration::from_millis(value);
        }
        if let Some(value) = override_cfg.session_ttl_secs {
            self.session.ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.session_key {
            self.session.signing_seed =
                Some(decode_seed(&value).with_context(|| "parse session_key")?);
        }
        if let (Some(username), Some(password)) =
            (override_cfg.admin_username, override_cfg.admin_password)
        {
            self.admin = Some(AdminSeedConfig {
                username,
                password,
                full_name: override_cfg
                    .admin_full_name
                    .unwrap_or_else(|| DEFAULT_ADMIN_FULL_NAME.to_string()),
            });
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("FLAGPLANE_POSTGRES_URL is required when storage is postgres");
        }
        Ok(())
    }
}

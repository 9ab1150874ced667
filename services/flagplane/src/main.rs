//! Flagplane HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, storage, the evaluation cache and session signing,
//! seeds the first administrator, then serves the API and metrics listeners
//! until ctrl-c.
use anyhow::Context;
use flagplane::app::{AppState, build_router};
use flagplane::auth::password::Argon2Hasher;
use flagplane::auth::session::SessionSigner;
use flagplane::cache::InMemoryEvaluationCache;
use flagplane::config::{FlagplaneConfig, StorageBackend};
use flagplane::observability;
use flagplane::service::Services;
use flagplane::store::memory::InMemoryStore;
use flagplane::store::postgres::PostgresStore;
use flagplane::store::{CatalogStore, FlagplaneStore};
use std::future::Future;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FlagplaneConfig::from_env_or_yaml().context("load flagplane config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: FlagplaneConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability()?;
    let state = build_state(&config).await?;
    state
        .services
        .bootstrap_admin(config.admin.as_ref())
        .await
        .context("bootstrap admin")?;

    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, "flagplane listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {
            tracing::info!("shutdown requested");
        }
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

async fn build_state(config: &FlagplaneConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn FlagplaneStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(
                PostgresStore::connect(pg)
                    .await
                    .context("connect postgres")?,
            )
        }
    };
    if !store.is_durable() {
        tracing::warn!("using in-memory storage; all data is lost on restart");
    }

    let signer = match config.session.signing_seed {
        Some(seed) => SessionSigner::from_seed(seed, config.session.ttl),
        None => {
            tracing::warn!("FLAGPLANE_SESSION_KEY not set; sessions will not survive a restart");
            SessionSigner::ephemeral(config.session.ttl)
        }
    }
    .context("session signing key")?;

    let services = Services::new(
        store,
        Arc::new(InMemoryEvaluationCache::new(&config.cache)),
        Arc::new(Argon2Hasher),
        signer,
    );
    Ok(AppState { services })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagplane::config::{AdminSeedConfig, CacheConfig, SessionConfig};
    use serial_test::serial;

    fn memory_config() -> FlagplaneConfig {
        FlagplaneConfig {
            bind_addr: "127.0.0.1:0".parse().expect("bind"),
            metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
            storage: StorageBackend::Memory,
            postgres: None,
            cache: CacheConfig::default(),
            session: SessionConfig::default(),
            admin: Some(AdminSeedConfig {
                username: "admin".to_string(),
                password: "Bootstrap1pass".to_string(),
                full_name: "System Administrator".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn build_state_memory_backend() {
        let state = build_state(&memory_config()).await.expect("state");
        assert_eq!(state.services.store.backend_name(), "memory");
        assert!(!state.services.store.is_durable());
    }

    #[tokio::test]
    async fn build_state_postgres_requires_config() {
        let mut config = memory_config();
        config.storage = StorageBackend::Postgres;
        let err = build_state(&config).await.err().expect("missing postgres");
        assert!(err.to_string().contains("postgres configuration missing"));
    }

    #[tokio::test]
    #[serial]
    async fn run_with_shutdown_starts_and_stops() {
        run_with_shutdown(memory_config(), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        })
        .await
        .expect("run should stop cleanly");
    }
}

//! In-process evaluation cache.
//!
//! One mutex guards the entry map, the tag -> keys reverse index, and the
//! in-flight loads, so a lookup and the decision to start a load are one
//! atomic step. The lock is never held across an await.
//!
//! Loads run on spawned tasks and write their own result back. Each load has
//! a flight id; invalidation drops matching flights, and a finishing load only
//! stores its value if its flight is still the current one for the key.
use super::{
    CacheError, CacheResult, CacheTag, CachedFlagValue, EvaluationCache, FlagCacheKey, LoadFuture,
};
use crate::config::CacheConfig;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type SharedLoad = Shared<BoxFuture<'static, CacheResult<Option<CachedFlagValue>>>>;

struct Entry {
    value: CachedFlagValue,
    tags: Vec<CacheTag>,
    expires_at: Instant,
}

struct Flight {
    id: u64,
    tags: Vec<CacheTag>,
    load: SharedLoad,
}

#[derive(Default)]
struct State {
    entries: HashMap<FlagCacheKey, Entry>,
    tag_index: HashMap<CacheTag, HashSet<FlagCacheKey>>,
    in_flight: HashMap<FlagCacheKey, Flight>,
    next_flight: u64,
}

impl State {
    fn remove_entry(&mut self, key: &FlagCacheKey) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        true
    }

    fn insert_entry(&mut self, key: FlagCacheKey, value: CachedFlagValue, tags: Vec<CacheTag>, ttl: Duration) {
        self.remove_entry(&key);
        for tag in &tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.entries.insert(
            key,
            Entry {
                value,
                tags,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn finish_flight(
        &mut self,
        key: &FlagCacheKey,
        id: u64,
        result: &CacheResult<Option<CachedFlagValue>>,
        ttl: Duration,
    ) {
        let current = matches!(self.in_flight.get(key), Some(flight) if flight.id == id);
        if !current {
            tracing::debug!(flag_key = %key.flag_key, "discarding superseded cache load");
            return;
        }
        let Some(flight) = self.in_flight.remove(key) else {
            return;
        };
        if let Ok(Some(value)) = result {
            self.insert_entry(key.clone(), value.clone(), flight.tags, ttl);
        }
    }
}

#[derive(Clone)]
pub struct InMemoryEvaluationCache {
    state: Arc<Mutex<State>>,
    ttl: Duration,
    load_timeout: Duration,
}

impl InMemoryEvaluationCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_limits(config.ttl, config.load_timeout)
    }

    pub fn with_limits(ttl: Duration, load_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ttl,
            load_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_load(&self, key: FlagCacheKey, id: u64, loader: LoadFuture) -> SharedLoad {
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;
        let timeout = self.load_timeout;
        let handle = tokio::spawn(async move {
            let result =
                match tokio::time::timeout(timeout, AssertUnwindSafe(loader).catch_unwind()).await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(CacheError::Load("loader panicked".to_string())),
                    Err(_) => Err(CacheError::Timeout),
                };
            if let Err(err) = &result {
                tracing::warn!(flag_key = %key.flag_key, error = %err, "cache load failed");
            }
            state.lock().finish_flight(&key, id, &result, ttl);
            result
        });
        async move {
            handle
                .await
                .unwrap_or_else(|err| Err(CacheError::Load(format!("load task: {err}"))))
        }
        .boxed()
        .shared()
    }
}

#[async_trait]
impl EvaluationCache for InMemoryEvaluationCache {
    async fn get_or_populate(
        &self,
        key: FlagCacheKey,
        tags: Vec<CacheTag>,
        loader: LoadFuture,
    ) -> CacheResult<Option<CachedFlagValue>> {
        let load = {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.get(&key)
                && entry.expires_at > Instant::now()
            {
                metrics::counter!("flagplane_cache_hits_total").increment(1);
                return Ok(Some(entry.value.clone()));
            }
            state.remove_entry(&key);
            metrics::counter!("flagplane_cache_misses_total").increment(1);
            match state.in_flight.get(&key) {
                Some(flight) => flight.load.clone(),
                None => {
                    state.next_flight += 1;
                    let id = state.next_flight;
                    let load = self.spawn_load(key.clone(), id, loader);
                    state.in_flight.insert(
                        key,
                        Flight {
                            id,
                            tags,
                            load: load.clone(),
                        },
                    );
                    load
                }
            }
        };
        load.await
    }

    async fn invalidate_tags(&self, tags: &[CacheTag]) {
        let mut state = self.state.lock();
        let mut evicted = 0u64;
        for tag in tags {
            if let Some(keys) = state.tag_index.remove(tag) {
                for key in keys {
                    if state.remove_entry(&key) {
                        evicted += 1;
                    }
                }
            }
        }
        state
            .in_flight
            .retain(|_, flight| !flight.tags.iter().any(|tag| tags.contains(tag)));
        metrics::counter!("flagplane_cache_invalidations_total", "kind" => "tag").increment(1);
        tracing::debug!(tags = ?tags, evicted, "cache tags invalidated");
    }

    async fn invalidate_key(&self, key: &FlagCacheKey) {
        let mut state = self.state.lock();
        state.remove_entry(key);
        state.in_flight.remove(key);
        metrics::counter!("flagplane_cache_invalidations_total", "kind" => "key").increment(1);
    }
}

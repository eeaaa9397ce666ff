//! Read-through cache decorator.
//!
//! Reads (`getList`, `getOne`, `getMany`, `getManyReference`) are cached
//! under `{namespace}:{resource}:{operation}:{params}`. Every mutation drops
//! all keys of its resource, whether or not it succeeded. A failing cache
//! store only costs a warning; the call falls through to the wrapped provider.
//!
//! Each resource carries a generation that mutations bump when they
//! invalidate. A read only stores its result if the generation it started
//! under is still current, so a value loaded before a concurrent write can
//! never be cached after that write's invalidation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tower::Layer;
use tracing::{debug, warn};

use common::{AppError, AppResult};
use domain::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, IdsResult, ListResult, Query, RecordResult, RecordsResult, UpdateManyParams,
    UpdateParams,
};

use crate::provider::{operation, DataProvider, SharedProvider};

/// Default key namespace
pub const DEFAULT_CACHE_NAMESPACE: &str = "data_provider";

/// String store with expiry and prefix invalidation.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;

    /// Remove every key starting with `prefix`, returning how many went
    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<u64>;
}

// =============================================================================
// In-process store
// =============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// TTL map held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

// =============================================================================
// Redis store
// =============================================================================

/// Redis-backed store over a multiplexed connection manager.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

fn cache_error(e: RedisError) -> AppError {
    AppError::internal(format!("Cache error: {}", e))
}

/// Escape glob metacharacters for `KEYS`
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl RedisCache {
    /// Connect to Redis.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Redis cache connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(cache_error)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(cache_error)
    }

    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{}*", glob_escape(prefix)))
            .await
            .map_err(cache_error)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted: u64 = conn.del(&keys).await.map_err(cache_error)?;
        Ok(deleted)
    }
}

// =============================================================================
// Decorator
// =============================================================================

/// Serves repeated reads from a [`CacheStore`].
pub struct CachingProvider {
    inner: SharedProvider,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    namespace: String,
    /// Mutation count per resource. Locked across every cache write and
    /// every invalidation.
    generations: Mutex<HashMap<String, u64>>,
}

impl CachingProvider {
    pub fn new(inner: SharedProvider, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            inner,
            store,
            ttl,
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            generations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn prefix(&self, resource: &str) -> String {
        format!("{}:{}:", self.namespace, resource)
    }

    async fn generation(&self, resource: &str) -> u64 {
        self.generations
            .lock()
            .await
            .get(resource)
            .copied()
            .unwrap_or(0)
    }

    fn key<P: Serialize>(&self, resource: &str, operation: &str, params: &P) -> Option<String> {
        let params = serde_json::to_string(params).ok()?;
        Some(format!("{}{}:{}", self.prefix(resource), operation, params))
    }

    async fn cached<P, T, F>(
        &self,
        resource: &str,
        operation: &str,
        params: &P,
        load: F,
    ) -> AppResult<T>
    where
        P: Serialize + Sync,
        T: Serialize + DeserializeOwned + Send,
        F: Future<Output = AppResult<T>> + Send,
    {
        let Some(key) = self.key(resource, operation, params) else {
            return load.await;
        };
        let generation = self.generation(resource).await;

        match self.store.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!(resource, operation, "Cache hit");
                    return Ok(value);
                }
                // Treat deserialization errors as cache miss
                Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cache entry"),
            },
            Ok(None) => debug!(resource, operation, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache read failed"),
        }

        let value = load.await?;
        let json = match serde_json::to_string(&value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Result not cacheable");
                return Ok(value);
            }
        };

        let generations = self.generations.lock().await;
        if generations.get(resource).copied().unwrap_or(0) != generation {
            debug!(resource, operation, "Resource changed during load, not caching");
            return Ok(value);
        }
        if let Err(e) = self.store.set(&key, json, self.ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
        drop(generations);
        Ok(value)
    }

    async fn invalidating<T, F>(&self, resource: &str, mutation: F) -> AppResult<T>
    where
        T: Send,
        F: Future<Output = AppResult<T>> + Send,
    {
        let result = mutation.await;

        let mut generations = self.generations.lock().await;
        *generations.entry(resource.to_string()).or_insert(0) += 1;
        match self.store.invalidate_prefix(&self.prefix(resource)).await {
            Ok(removed) => debug!(resource, removed, "Cache invalidated"),
            Err(e) => warn!(resource, error = %e, "Cache invalidation failed"),
        }
        drop(generations);
        result
    }
}

#[async_trait]
impl DataProvider for CachingProvider {
    async fn get_list(&self, resource: &str, query: Query) -> AppResult<ListResult> {
        let load = self.inner.get_list(resource, query.clone());
        self.cached(resource, operation::GET_LIST, &query, load).await
    }

    async fn get_one(&self, resource: &str, params: GetOneParams) -> AppResult<RecordResult> {
        let load = self.inner.get_one(resource, params.clone());
        self.cached(resource, operation::GET_ONE, &params, load).await
    }

    async fn get_many(&self, resource: &str, params: GetManyParams) -> AppResult<RecordsResult> {
        let load = self.inner.get_many(resource, params.clone());
        self.cached(resource, operation::GET_MANY, &params, load).await
    }

    async fn get_many_reference(
        &self,
        resource: &str,
        params: GetManyReferenceParams,
    ) -> AppResult<ListResult> {
        let load = self.inner.get_many_reference(resource, params.clone());
        self.cached(resource, operation::GET_MANY_REFERENCE, &params, load)
            .await
    }

    async fn create(&self, resource: &str, params: CreateParams) -> AppResult<RecordResult> {
        self.invalidating(resource, self.inner.create(resource, params))
            .await
    }

    async fn update(&self, resource: &str, params: UpdateParams) -> AppResult<RecordResult> {
        self.invalidating(resource, self.inner.update(resource, params))
            .await
    }

    async fn update_many(&self, resource: &str, params: UpdateManyParams) -> AppResult<IdsResult> {
        self.invalidating(resource, self.inner.update_many(resource, params))
            .await
    }

    async fn delete(&self, resource: &str, params: DeleteParams) -> AppResult<RecordResult> {
        self.invalidating(resource, self.inner.delete(resource, params))
            .await
    }

    async fn delete_many(&self, resource: &str, params: DeleteManyParams) -> AppResult<IdsResult> {
        self.invalidating(resource, self.inner.delete_many(resource, params))
            .await
    }
}

/// [`Layer`] producing [`CachingProvider`]s that share one store.
#[derive(Clone)]
pub struct CachingLayer {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    namespace: String,
}

impl CachingLayer {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

impl Layer<SharedProvider> for CachingLayer {
    type Service = SharedProvider;

    fn layer(&self, inner: SharedProvider) -> SharedProvider {
        Arc::new(
            CachingProvider::new(inner, Arc::clone(&self.store), self.ttl)
                .with_namespace(self.namespace.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_cache_invalidates_by_prefix() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        for key in ["ns:users:getList:{}", "ns:users:getOne:{}", "ns:posts:getList:{}"] {
            cache.set(key, "x".to_string(), ttl).await.unwrap();
        }

        assert_eq!(cache.invalidate_prefix("ns:users:").await.unwrap(), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn test_glob_escape() {
        assert_eq!(glob_escape("ns:us*rs:"), "ns:us\\*rs:");
    }
}

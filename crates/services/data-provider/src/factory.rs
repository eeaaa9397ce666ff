//! Provider construction, composition and switching.
//!
//! [`ProviderFactory`] turns a [`ProviderConfig`] into a decorated
//! [`SharedProvider`]. Backends are built lazily, once per factory and kind,
//! so every provider of one kind shares the same data. [`ProviderHandle`] is
//! the mutable slot callers hold: it dispatches each call to whatever provider
//! is active when the call starts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OnceCell, RwLock};
use tower::Layer;
use tracing::{info, warn};

use common::{AppResult, ProviderConfig, ProviderKind};
use domain::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, IdsResult, ListResult, Query, RecordResult, RecordsResult, UpdateManyParams,
    UpdateParams,
};

use crate::local::{delay_from_config, FileStore, LocalProvider};
use crate::middleware::caching::DEFAULT_CACHE_NAMESPACE;
use crate::middleware::{
    CacheStore, CachingLayer, LoggingLayer, MemoryCache, ProviderStack, RedisCache,
};
use crate::provider::{DataProvider, SharedProvider};
use crate::relational::RelationalProvider;

/// Backend singletons and shared decorator state.
struct Backends {
    local: OnceCell<SharedProvider>,
    relational: OnceCell<SharedProvider>,
    cache: OnceCell<Arc<dyn CacheStore>>,
    /// Applied inside the configured logging and caching layers
    extra_layers: ProviderStack,
}

impl Backends {
    async fn backend(&self, kind: ProviderKind, config: &ProviderConfig) -> AppResult<SharedProvider> {
        let provider = match kind {
            ProviderKind::Local => self
                .local
                .get_or_init(|| async { build_local(config) })
                .await
                .clone(),
            ProviderKind::Relational => self
                .relational
                .get_or_try_init(|| build_relational(config))
                .await?
                .clone(),
        };
        Ok(provider)
    }

    async fn cache_store(&self, config: &ProviderConfig) -> Arc<dyn CacheStore> {
        self.cache
            .get_or_init(|| async {
                let Some(url) = config.cache.url.as_deref() else {
                    return Arc::new(MemoryCache::new()) as Arc<dyn CacheStore>;
                };
                match RedisCache::connect(url).await {
                    Ok(redis) => Arc::new(redis) as Arc<dyn CacheStore>,
                    Err(e) => {
                        warn!(error = %e, "Redis unavailable, caching in memory");
                        Arc::new(MemoryCache::new())
                    }
                }
            })
            .await
            .clone()
    }

    async fn create_provider(&self, config: &ProviderConfig) -> AppResult<SharedProvider> {
        let kind = config.kind()?;
        let backend = self.backend(kind, config).await?;

        let mut stack = ProviderStack::new();
        if config.options.enable_logging {
            stack = stack.layer(LoggingLayer::new());
        }
        if config.options.enable_caching {
            let store = self.cache_store(config).await;
            let ttl = Duration::from_secs(config.cache.ttl_seconds);
            // Per-kind namespace so a switch never serves the other backend's entries
            stack = stack.layer(
                CachingLayer::new(store, ttl)
                    .with_namespace(format!("{}:{}", DEFAULT_CACHE_NAMESPACE, kind)),
            );
        }

        info!(
            provider = %kind,
            logging = config.options.enable_logging,
            caching = config.options.enable_caching,
            custom_layers = self.extra_layers.len(),
            "Data provider created"
        );
        Ok(stack.apply(self.extra_layers.apply(backend)))
    }
}

fn build_local(config: &ProviderConfig) -> SharedProvider {
    let mut provider = LocalProvider::new()
        .with_registry(config.resources.clone())
        .with_search_mode(config.options.search_mode)
        .with_delay(delay_from_config(&config.local));

    if config.options.enable_local_persistence {
        info!(dir = %config.local.store_dir.display(), "Local persistence enabled");
        provider = provider.with_store(Arc::new(FileStore::new(config.local.store_dir.clone())));
    }
    Arc::new(provider)
}

async fn build_relational(config: &ProviderConfig) -> AppResult<SharedProvider> {
    let provider = RelationalProvider::connect(&config.database, config.resources.clone())
        .await?
        .with_search_mode(config.options.search_mode);
    Ok(Arc::new(provider))
}

/// Builder for [`ProviderFactory`], mainly for injecting test doubles.
#[derive(Default)]
pub struct ProviderFactoryBuilder {
    local: Option<SharedProvider>,
    relational: Option<SharedProvider>,
    cache: Option<Arc<dyn CacheStore>>,
    layers: ProviderStack,
}

impl ProviderFactoryBuilder {
    /// Use this provider as the local backend singleton
    pub fn local_backend(mut self, provider: SharedProvider) -> Self {
        self.local = Some(provider);
        self
    }

    /// Use this provider as the relational backend singleton
    pub fn relational_backend(mut self, provider: SharedProvider) -> Self {
        self.relational = Some(provider);
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Add a custom decorator inside the configured ones
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<SharedProvider, Service = SharedProvider> + Send + Sync + 'static,
    {
        self.layers = self.layers.layer(layer);
        self
    }

    pub fn build(self) -> ProviderFactory {
        ProviderFactory {
            backends: Arc::new(Backends {
                local: OnceCell::new_with(self.local),
                relational: OnceCell::new_with(self.relational),
                cache: OnceCell::new_with(self.cache),
                extra_layers: self.layers,
            }),
            instance: OnceCell::new(),
        }
    }
}

/// Creates providers from configuration.
pub struct ProviderFactory {
    backends: Arc<Backends>,
    instance: OnceCell<ProviderHandle>,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ProviderFactoryBuilder {
        ProviderFactoryBuilder::default()
    }

    /// Backend of the configured kind wrapped in the configured layers.
    ///
    /// Unknown types fail with `UnknownProviderType`.
    pub async fn create_provider(&self, config: &ProviderConfig) -> AppResult<SharedProvider> {
        self.backends.create_provider(config).await
    }

    /// New handle with its own active-provider slot
    pub async fn handle(&self, config: &ProviderConfig) -> AppResult<ProviderHandle> {
        let provider = self.create_provider(config).await?;
        Ok(ProviderHandle {
            active: Arc::new(RwLock::new(Active {
                config: config.clone(),
                provider,
            })),
            backends: Arc::clone(&self.backends),
        })
    }

    /// The factory-wide handle, built from `config` on first use.
    ///
    /// Later calls return the same handle whatever config they pass; use
    /// [`ProviderHandle::switch_provider`] to change it.
    pub async fn get_instance(&self, config: &ProviderConfig) -> AppResult<ProviderHandle> {
        self.instance
            .get_or_try_init(|| self.handle(config))
            .await
            .cloned()
    }
}

struct Active {
    config: ProviderConfig,
    provider: SharedProvider,
}

/// Switchable provider slot.
///
/// Clones share the slot. Each call resolves the active provider when it
/// starts, so a switch never redirects a call already in flight.
#[derive(Clone)]
pub struct ProviderHandle {
    active: Arc<RwLock<Active>>,
    backends: Arc<Backends>,
}

impl ProviderHandle {
    /// Provider serving new calls
    pub async fn current(&self) -> SharedProvider {
        Arc::clone(&self.active.read().await.provider)
    }

    /// Configuration of the active provider
    pub async fn config(&self) -> ProviderConfig {
        self.active.read().await.config.clone()
    }

    /// Replace the active provider and configuration.
    ///
    /// On error the previous provider stays active.
    pub async fn switch_provider(&self, config: ProviderConfig) -> AppResult<()> {
        let provider = self.backends.create_provider(&config).await?;
        let mut active = self.active.write().await;
        info!(
            from = %active.config.provider_type,
            to = %config.provider_type,
            "Switched data provider"
        );
        *active = Active { config, provider };
        Ok(())
    }

    /// Handle starting from this one's provider with a slot of its own
    pub async fn isolated(&self) -> Self {
        let active = self.active.read().await;
        Self {
            active: Arc::new(RwLock::new(Active {
                config: active.config.clone(),
                provider: Arc::clone(&active.provider),
            })),
            backends: Arc::clone(&self.backends),
        }
    }
}

#[async_trait]
impl DataProvider for ProviderHandle {
    async fn get_list(&self, resource: &str, query: Query) -> AppResult<ListResult> {
        self.current().await.get_list(resource, query).await
    }

    async fn get_one(&self, resource: &str, params: GetOneParams) -> AppResult<RecordResult> {
        self.current().await.get_one(resource, params).await
    }

    async fn get_many(&self, resource: &str, params: GetManyParams) -> AppResult<RecordsResult> {
        self.current().await.get_many(resource, params).await
    }

    async fn get_many_reference(
        &self,
        resource: &str,
        params: GetManyReferenceParams,
    ) -> AppResult<ListResult> {
        self.current().await.get_many_reference(resource, params).await
    }

    async fn create(&self, resource: &str, params: CreateParams) -> AppResult<RecordResult> {
        self.current().await.create(resource, params).await
    }

    async fn update(&self, resource: &str, params: UpdateParams) -> AppResult<RecordResult> {
        self.current().await.update(resource, params).await
    }

    async fn update_many(&self, resource: &str, params: UpdateManyParams) -> AppResult<IdsResult> {
        self.current().await.update_many(resource, params).await
    }

    async fn delete(&self, resource: &str, params: DeleteParams) -> AppResult<RecordResult> {
        self.current().await.delete(resource, params).await
    }

    async fn delete_many(&self, resource: &str, params: DeleteManyParams) -> AppResult<IdsResult> {
        self.current().await.delete_many(resource, params).await
    }
}

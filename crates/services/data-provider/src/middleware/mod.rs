//! Provider decorators.
//!
//! A decorator is a [`tower::Layer`] that wraps a [`SharedProvider`] in
//! another [`SharedProvider`]. [`ProviderStack`] applies an ordered list of
//! them: the first layer added is the outermost one and sees every call first.
//!
//! ```ignore
//! let stack = ProviderStack::new()
//!     .layer(LoggingLayer::new())
//!     .layer(CachingLayer::new(Arc::new(MemoryCache::new()), ttl));
//! let provider = stack.apply(backend);
//! ```

pub mod caching;
pub mod logging;

pub use caching::{CacheStore, CachingLayer, CachingProvider, MemoryCache, RedisCache};
pub use logging::{LoggingLayer, LoggingProvider};

use tower::Layer;

use crate::provider::SharedProvider;

/// Type-erased provider decorator
pub type BoxProviderLayer =
    Box<dyn Layer<SharedProvider, Service = SharedProvider> + Send + Sync>;

/// Ordered list of decorators, outermost first.
#[derive(Default)]
pub struct ProviderStack {
    layers: Vec<BoxProviderLayer>,
}

impl ProviderStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer inside the ones already added
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<SharedProvider, Service = SharedProvider> + Send + Sync + 'static,
    {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn push(&mut self, layer: BoxProviderLayer) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap a provider; the innermost layer is applied first
    pub fn apply(&self, provider: SharedProvider) -> SharedProvider {
        self.layers
            .iter()
            .rev()
            .fold(provider, |inner, layer| layer.layer(inner))
    }
}

impl std::fmt::Debug for ProviderStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderStack")
            .field("layers", &self.layers.len())
            .finish()
    }
}

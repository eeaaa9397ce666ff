//! Data provider - backend-agnostic resource access.
//!
//! One [`DataProvider`] contract with two backends:
//! - [`LocalProvider`]: in-memory collections, optionally mirrored to disk
//! - [`RelationalProvider`]: SQL tables through SeaORM
//!
//! Providers are composed with [`tower::Layer`] decorators (logging, caching)
//! by a [`ProviderFactory`], and callers hold a switchable [`ProviderHandle`].

pub mod factory;
pub mod local;
pub mod middleware;
pub mod provider;
pub mod relational;

pub use factory::{ProviderFactory, ProviderFactoryBuilder, ProviderHandle};
pub use local::LocalProvider;
pub use middleware::{
    BoxProviderLayer, CacheStore, CachingLayer, LoggingLayer, MemoryCache, ProviderStack,
    RedisCache,
};
pub use provider::{operation, DataProvider, SharedProvider};
pub use relational::{OrmClient, RelationalProvider, SeaOrmClient};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockDataProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use relational::MockOrmClient;

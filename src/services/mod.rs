// Service exports
pub mod cache;
pub mod connection;
pub mod store;

pub use cache::{build_cache, CacheError, CacheKey, CacheStatus, MemoryCache, NoopCache, RedisCache, ResultCache};
pub use connection::{ConnectionError, ConnectionSource, ConnectionSupplier, RetryPolicy};
pub use store::{PostgresProviderStore, ProviderStore, StaticProviderStore, StoreError};

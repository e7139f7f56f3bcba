use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{CacheBackend, CacheSettings};
use crate::models::{MatchQuery, QueryKind};

/// Errors that can occur with cache operations
///
/// These never leave this module through [`ResultCache`]; callers only see
/// a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Reachability of the cache backend, reported by the health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Available,
    Unavailable,
    Disabled,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Available => "available",
            CacheStatus::Unavailable => "unavailable",
            CacheStatus::Disabled => "disabled",
        }
    }
}

/// Key/value store with expiry used to memoize matching results
///
/// Implementations absorb every backend failure: `get` reports a miss and
/// `set`/`delete` become no-ops. Values are opaque strings.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: String, ttl: Duration);

    async fn delete(&self, key: &str);

    async fn status(&self) -> CacheStatus;
}

/// Cache that stores nothing, used when no backend is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl ResultCache for NoopCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}

    async fn status(&self) -> CacheStatus {
        CacheStatus::Disabled
    }
}

#[derive(Clone)]
struct MemoryEntry {
    value: Arc<str>,
    expires_at: Instant,
}

/// In-process cache with per-entry expiry
///
/// `max_ttl` bounds how long any entry can live regardless of the TTL passed
/// to `set`.
#[derive(Clone)]
pub struct MemoryCache {
    entries: moka::future::Cache<String, MemoryEntry>,
}

impl MemoryCache {
    pub fn new(max_entries: u64, max_ttl: Duration) -> Self {
        let entries = moka::future::Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(max_ttl)
            .build();

        Self { entries }
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key).await?;
        if entry.expires_at <= Instant::now() {
            self.entries.invalidate(key).await;
            return None;
        }
        Some(entry.value.to_string())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = MemoryEntry {
            value: Arc::from(value),
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
    }

    async fn delete(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    async fn status(&self) -> CacheStatus {
        CacheStatus::Available
    }
}

/// Redis-backed cache with an optional in-process front tier
///
/// The front tier (L1) is per instance and fastest; redis (L2) is shared
/// across instances. Every redis call is bounded by the operation timeout and
/// a timeout is handled like any other backend failure.
pub struct RedisCache {
    redis: ConnectionManager,
    l1: Option<MemoryCache>,
    op_timeout: Duration,
}

impl RedisCache {
    /// Connect to redis, failing if the server cannot be reached within `connect_timeout`
    pub async fn connect(
        redis_url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
        l1: Option<MemoryCache>,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(connect_timeout))??;

        Ok(Self {
            redis,
            l1,
            op_timeout,
        })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
            .map_err(CacheError::from)
    }

    /// Fetch a value together with its remaining lifetime in milliseconds
    async fn try_get(&self, key: &str) -> Result<(Option<String>, i64), CacheError> {
        let mut conn = self.redis.clone();
        let (value, pttl): (Option<String>, i64) = self
            .bounded(
                redis::pipe()
                    .cmd("GET")
                    .arg(key)
                    .cmd("PTTL")
                    .arg(key)
                    .query_async(&mut conn),
            )
            .await?;
        Ok((value, pttl))
    }

    async fn try_set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let _: () = self
            .bounded(
                redis::cmd("PSETEX")
                    .arg(key)
                    .arg(ttl_ms)
                    .arg(value)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        let _: () = self
            .bounded(redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn try_ping(&self) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        let _: String = self
            .bounded(redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        if let Some(l1) = &self.l1 {
            if let Some(value) = l1.get(key).await {
                tracing::trace!("L1 cache hit: {}", key);
                return Some(value);
            }
        }

        match self.try_get(key).await {
            Ok((Some(value), pttl)) => {
                tracing::trace!("L2 cache hit: {}", key);
                if let (Some(l1), Ok(remaining)) = (&self.l1, u64::try_from(pttl)) {
                    l1.set(key, value.clone(), Duration::from_millis(remaining))
                        .await;
                }
                Some(value)
            }
            Ok((None, _)) => None,
            Err(e) => {
                tracing::warn!("Cache get failed for {}, treating as miss: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        if let Err(e) = self.try_set(key, &value, ttl).await {
            tracing::warn!("Cache set failed for {}: {}", key, e);
        }
        if let Some(l1) = &self.l1 {
            l1.set(key, value, ttl).await;
        }
    }

    async fn delete(&self, key: &str) {
        if let Some(l1) = &self.l1 {
            l1.delete(key).await;
        }
        if let Err(e) = self.try_delete(key).await {
            tracing::warn!("Cache delete failed for {}: {}", key, e);
        }
    }

    async fn status(&self) -> CacheStatus {
        match self.try_ping().await {
            Ok(()) => CacheStatus::Available,
            Err(e) => {
                tracing::debug!("Cache ping failed: {}", e);
                CacheStatus::Unavailable
            }
        }
    }
}

/// Build the configured cache backend
///
/// A redis backend that cannot be reached at startup falls back to
/// [`NoopCache`]; the service keeps working uncached.
pub async fn build_cache(settings: &CacheSettings) -> Arc<dyn ResultCache> {
    let ttl = Duration::from_secs(settings.ttl_secs.max(1));

    match settings.backend {
        CacheBackend::None => {
            tracing::info!("Result cache disabled by configuration");
            Arc::new(NoopCache)
        }
        CacheBackend::Memory => {
            tracing::info!(
                "In-process result cache enabled ({} entries, TTL: {}s)",
                settings.l1_cache_size,
                ttl.as_secs()
            );
            Arc::new(MemoryCache::new(settings.l1_cache_size.max(1), ttl))
        }
        CacheBackend::Redis => {
            let Some(redis_url) = settings.redis_url.as_deref() else {
                tracing::warn!("Redis cache selected but no redis_url configured, running without cache");
                return Arc::new(NoopCache);
            };

            let l1 = (settings.l1_cache_size > 0)
                .then(|| MemoryCache::new(settings.l1_cache_size, ttl));

            match RedisCache::connect(
                redis_url,
                Duration::from_millis(settings.connect_timeout_ms),
                Duration::from_millis(settings.operation_timeout_ms),
                l1,
            )
            .await
            {
                Ok(cache) => {
                    tracing::info!(
                        "Redis result cache connected (L1: {} entries, TTL: {}s)",
                        settings.l1_cache_size,
                        ttl.as_secs()
                    );
                    Arc::new(cache)
                }
                Err(e) => {
                    tracing::warn!("Redis connection failed ({}), running without cache", e);
                    Arc::new(NoopCache)
                }
            }
        }
    }
}

/// Cache key builder
///
/// Floats use the shortest round-trip form with `-0.0` folded into `0.0`.
/// The service type is percent-encoded so it cannot contain the `:`
/// separator or collide with the `*` placeholder.
pub struct CacheKey;

impl CacheKey {
    /// Key for a nearest-provider lookup
    ///
    /// Only the origin and service type affect the result, so the range and
    /// limit parameters are left out.
    pub fn nearest(query: &MatchQuery) -> String {
        format!(
            "match:{}:{}:{}:{}",
            QueryKind::Nearest.as_str(),
            canonical(query.origin.latitude),
            canonical(query.origin.longitude),
            service_part(query)
        )
    }

    /// Key for a ranked provider listing, covering every parameter after defaults
    pub fn ranked(query: &MatchQuery) -> String {
        format!(
            "match:{}:{}:{}:{}:{}:{}",
            QueryKind::Ranked.as_str(),
            canonical(query.origin.latitude),
            canonical(query.origin.longitude),
            service_part(query),
            canonical(query.max_distance()),
            query.result_limit()
        )
    }
}

fn service_part(query: &MatchQuery) -> String {
    query
        .service_filter()
        .map(|s| urlencoding::encode(s).into_owned())
        .unwrap_or_else(|| "*".to_string())
}

#[inline]
fn canonical(value: f64) -> f64 {
    value + 0.0
}

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::{
    distance::haversine_distance,
    validation::{validate, validate_coordinate, ValidationError},
};
use crate::models::{Coordinate, MatchCandidate, MatchQuery, NearestMatch, Provider};
use crate::services::{CacheKey, ConnectionError, ProviderStore, ResultCache, StoreError};

/// Time-to-live for memoized matching results
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Why a nearest lookup produced no provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The store returned no providers at all
    NoProvidersAvailable,
    /// Providers existed but none had usable coordinates
    NoValidCoordinates,
    /// Providers had usable coordinates but none offer the requested service
    NoMatchingService,
}

impl NotFoundReason {
    /// Human-readable message for API responses
    pub fn message(&self) -> &'static str {
        match self {
            NotFoundReason::NoProvidersAvailable => "No providers currently available",
            NotFoundReason::NoValidCoordinates => "No providers with valid coordinates found",
            NotFoundReason::NoMatchingService => "No providers offer the requested service",
        }
    }
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::NoProvidersAvailable => write!(f, "no providers available"),
            NotFoundReason::NoValidCoordinates => write!(f, "no valid coordinates"),
            NotFoundReason::NoMatchingService => write!(f, "no providers offer the requested service"),
        }
    }
}

/// Outcome of a matching request other than success
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not found: {reason}")]
    NotFound {
        reason: NotFoundReason,
        total_providers: usize,
        valid_providers: usize,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for MatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Connection(e) => MatchError::Connection(e),
            other => MatchError::Internal(other.to_string()),
        }
    }
}

/// Providers that survived coordinate validation and the service filter
struct Scan {
    candidates: Vec<MatchCandidate>,
    valid_coordinates: usize,
}

/// Matching orchestrator
///
/// # Pipeline Stages
/// 1. Query validation
/// 2. Result cache lookup
/// 3. Provider snapshot from the store
/// 4. Per-provider coordinate validation, service filter and distance
/// 5. Selection (nearest) or range filter, sort and truncation (ranked)
/// 6. Result cache population
///
/// The engine holds no mutable state of its own; the store and cache are
/// shared handles safe for concurrent use.
#[derive(Clone)]
pub struct MatchingEngine {
    store: Arc<dyn ProviderStore>,
    cache: Arc<dyn ResultCache>,
    cache_ttl: Duration,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn ProviderStore>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            store,
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Find the single closest available provider
    ///
    /// Every provider with valid coordinates is considered. `max_distance_km`
    /// and `limit` are neither checked nor applied. Ties resolve to the
    /// provider encountered first in store order.
    pub async fn find_nearest(&self, query: &MatchQuery) -> Result<NearestMatch, MatchError> {
        let origin = validate_coordinate(query.origin.latitude, query.origin.longitude)?;

        let key = CacheKey::nearest(query);
        if let Some(hit) = self.cached::<NearestMatch>(&key).await {
            return Ok(hit);
        }

        let providers = self.store.available_providers().await?;
        let total_providers = providers.len();
        if total_providers == 0 {
            return Err(MatchError::NotFound {
                reason: NotFoundReason::NoProvidersAvailable,
                total_providers: 0,
                valid_providers: 0,
            });
        }

        let scan = scan_providers(origin, providers, query.service_filter());
        if scan.valid_coordinates == 0 {
            return Err(MatchError::NotFound {
                reason: NotFoundReason::NoValidCoordinates,
                total_providers,
                valid_providers: 0,
            });
        }

        let valid_providers = scan.candidates.len();
        let Some(nearest) = scan
            .candidates
            .into_iter()
            .reduce(|best, c| if c.distance_km < best.distance_km { c } else { best })
        else {
            return Err(MatchError::NotFound {
                reason: NotFoundReason::NoMatchingService,
                total_providers,
                valid_providers: 0,
            });
        };

        tracing::info!(
            "Found nearest provider: ID {} at {:.2}km",
            nearest.provider.id,
            nearest.distance_km
        );

        let result = NearestMatch {
            candidate: nearest,
            total_providers_checked: total_providers,
            valid_providers_found: valid_providers,
        };

        self.remember(&key, &result).await;
        Ok(result)
    }

    /// Rank available providers within `max_distance_km` of the origin
    ///
    /// Results are sorted by ascending distance and truncated to `limit`. An
    /// empty list is a valid outcome.
    pub async fn find_ranked(&self, query: &MatchQuery) -> Result<Vec<MatchCandidate>, MatchError> {
        let origin = check_ranked_query(query)?;

        let key = CacheKey::ranked(query);
        if let Some(hit) = self.cached::<Vec<MatchCandidate>>(&key).await {
            return Ok(hit);
        }

        let providers = self.store.available_providers().await?;
        let total_providers = providers.len();
        let max_distance_km = query.max_distance();

        let mut ranked: Vec<MatchCandidate> = scan_providers(origin, providers, query.service_filter())
            .candidates
            .into_iter()
            .filter(|c| c.distance_km <= max_distance_km)
            .collect();

        // Stable sort keeps store order among equal distances
        ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        ranked.truncate(query.result_limit());

        tracing::info!(
            "Ranked {} providers within {}km (from {} available)",
            ranked.len(),
            max_distance_km,
            total_providers
        );

        self.remember(&key, &ranked).await;
        Ok(ranked)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                tracing::debug!("Ignoring undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn remember<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.cache.set(key, json, self.cache_ttl).await,
            Err(e) => tracing::warn!("Failed to serialize result for {}: {}", key, e),
        }
    }
}

/// Validate the query origin and the range and limit parameters
fn check_ranked_query(query: &MatchQuery) -> Result<Coordinate, ValidationError> {
    let origin = validate_coordinate(query.origin.latitude, query.origin.longitude)?;

    let max_distance_km = query.max_distance();
    if !max_distance_km.is_finite() || max_distance_km <= 0.0 {
        return Err(ValidationError::InvalidParameter {
            field: "max_distance_km",
            reason: "must be a positive number",
        });
    }
    if query.result_limit() == 0 {
        return Err(ValidationError::InvalidParameter {
            field: "limit",
            reason: "must be at least 1",
        });
    }

    Ok(origin)
}

/// Validate each provider's coordinates, apply the service filter and measure distance
///
/// Providers with bad coordinates are skipped, never fatal.
fn scan_providers(origin: Coordinate, providers: Vec<Provider>, service_type: Option<&str>) -> Scan {
    let mut candidates = Vec::with_capacity(providers.len());
    let mut valid_coordinates = 0;

    for provider in providers {
        let coordinate = match validate(&provider.latitude, &provider.longitude) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Skipping provider {} - {}", provider.id, e);
                continue;
            }
        };
        valid_coordinates += 1;

        if let Some(service_type) = service_type {
            if !provider.offers(service_type) {
                continue;
            }
        }

        let distance_km = haversine_distance(origin, coordinate);
        candidates.push(MatchCandidate { provider, distance_km });
    }

    Scan {
        candidates,
        valid_coordinates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Availability;
    use crate::services::{MemoryCache, NoopCache, StaticProviderStore};
    use serde_json::{json, Value};

    fn create_provider(id: &str, lat: Value, lon: Value, services: &[&str]) -> Provider {
        Provider {
            id: id.to_string(),
            name: format!("Provider {}", id),
            latitude: lat,
            longitude: lon,
            service_types: services.iter().map(|s| s.to_string()).collect(),
            rating: 4.0,
            total_jobs: 12,
            availability: Availability::Available,
        }
    }

    fn origin() -> MatchQuery {
        MatchQuery::new(Coordinate { latitude: 0.0, longitude: 0.0 })
    }

    fn engine(providers: Vec<Provider>) -> (MatchingEngine, Arc<StaticProviderStore>) {
        let store = Arc::new(StaticProviderStore::new(providers));
        let engine = MatchingEngine::new(store.clone(), Arc::new(NoopCache));
        (engine, store)
    }

    #[tokio::test]
    async fn test_find_nearest_basic() {
        let (engine, _) = engine(vec![
            create_provider("far", json!(0.045), json!(0.0), &["towing"]),
            create_provider("here", json!(0.0), json!(0.0), &["towing"]),
        ]);

        let result = engine.find_nearest(&origin()).await.unwrap();
        assert_eq!(result.candidate.provider.id, "here");
        assert_eq!(result.candidate.distance_km, 0.0);
        assert_eq!(result.total_providers_checked, 2);
        assert_eq!(result.valid_providers_found, 2);
    }

    #[tokio::test]
    async fn test_find_nearest_ignores_max_distance() {
        let (engine, _) = engine(vec![create_provider("far", json!(10.0), json!(10.0), &[])]);

        let query = origin().with_max_distance_km(1.0);
        let result = engine.find_nearest(&query).await.unwrap();
        assert_eq!(result.candidate.provider.id, "far");
        assert!(result.candidate.distance_km > 1000.0);
    }

    #[tokio::test]
    async fn test_find_nearest_tie_goes_to_first() {
        let (engine, _) = engine(vec![
            create_provider("north", json!(0.01), json!(0.0), &[]),
            create_provider("south", json!(-0.01), json!(0.0), &[]),
        ]);

        let result = engine.find_nearest(&origin()).await.unwrap();
        assert_eq!(result.candidate.provider.id, "north");
    }

    #[tokio::test]
    async fn test_find_nearest_not_found_reasons() {
        let (empty, _) = engine(vec![]);
        let err = empty.find_nearest(&origin()).await.unwrap_err();
        assert!(matches!(
            err,
            MatchError::NotFound { reason: NotFoundReason::NoProvidersAvailable, .. }
        ));

        let (malformed, _) = engine(vec![
            create_provider("a", json!("garbage"), json!(0.0), &[]),
            create_provider("b", json!(95.0), json!(0.0), &[]),
        ]);
        let err = malformed.find_nearest(&origin()).await.unwrap_err();
        assert!(matches!(
            err,
            MatchError::NotFound {
                reason: NotFoundReason::NoValidCoordinates,
                total_providers: 2,
                valid_providers: 0
            }
        ));

        let (wrong_service, _) = engine(vec![create_provider("a", json!(0.0), json!(0.0), &["fuel"])]);
        let err = wrong_service
            .find_nearest(&origin().with_service_type("towing"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::NotFound { reason: NotFoundReason::NoMatchingService, .. }
        ));
    }

    #[tokio::test]
    async fn test_find_nearest_skips_malformed_providers() {
        let (engine, _) = engine(vec![
            create_provider("bad", Value::Null, json!(0.0), &[]),
            create_provider("good", json!("0.02"), json!("0.0"), &[]),
        ]);

        let result = engine.find_nearest(&origin()).await.unwrap();
        assert_eq!(result.candidate.provider.id, "good");
        assert_eq!(result.total_providers_checked, 2);
        assert_eq!(result.valid_providers_found, 1);
    }

    #[tokio::test]
    async fn test_find_ranked_distance_filtering() {
        // 0.135 degrees of latitude is ~15km, 0.081 is ~9km
        let (engine, _) = engine(vec![
            create_provider("15km", json!(0.135), json!(0.0), &[]),
            create_provider("9km", json!(0.081), json!(0.0), &[]),
        ]);

        let result = engine
            .find_ranked(&origin().with_max_distance_km(10.0))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].provider.id, "9km");
    }

    #[tokio::test]
    async fn test_find_ranked_sorted_and_limited() {
        let providers: Vec<Provider> = (0..30)
            .map(|i| {
                let lat = ((i * 7) % 30) as f64 * 0.01;
                create_provider(&i.to_string(), json!(lat), json!(0.0), &[])
            })
            .collect();
        let (engine, _) = engine(providers);

        let result = engine.find_ranked(&origin().with_limit(5)).await.unwrap();
        assert_eq!(result.len(), 5);
        for pair in result.windows(2) {
            assert!(pair[0].distance_km <= pair[1].distance_km);
        }
        assert_eq!(result[0].provider.id, "0");
    }

    #[tokio::test]
    async fn test_find_ranked_service_filter() {
        let (engine, _) = engine(vec![
            create_provider("fuel", json!(0.01), json!(0.0), &["fuel"]),
            create_provider("tow", json!(0.02), json!(0.0), &["towing", "fuel"]),
        ]);

        let result = engine
            .find_ranked(&origin().with_service_type("towing"))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].provider.id, "tow");
    }

    #[tokio::test]
    async fn test_find_ranked_empty_is_ok() {
        let (engine, _) = engine(vec![]);
        assert!(engine.find_ranked(&origin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_query_never_reaches_store() {
        let (engine, store) = engine(vec![create_provider("a", json!(0.0), json!(0.0), &[])]);

        let bad_origin = MatchQuery::new(Coordinate { latitude: 120.0, longitude: 0.0 });
        assert!(matches!(
            engine.find_ranked(&bad_origin).await,
            Err(MatchError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let bad_distance = origin().with_max_distance_km(-1.0);
        assert!(matches!(
            engine.find_ranked(&bad_distance).await,
            Err(MatchError::Validation(ValidationError::InvalidParameter { .. }))
        ));

        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_find_nearest_accepts_unused_parameters() {
        let (engine, store) = engine(vec![create_provider("a", json!(0.01), json!(0.0), &[])]);

        let query = origin().with_max_distance_km(0.0).with_limit(0);
        let result = engine.find_nearest(&query).await.unwrap();
        assert_eq!(result.candidate.provider.id, "a");

        let bad_origin = MatchQuery::new(Coordinate { latitude: 0.0, longitude: 181.0 });
        assert!(matches!(
            engine.find_nearest(&bad_origin).await,
            Err(MatchError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_nearest_cache_shared_across_unused_parameters() {
        let store = Arc::new(StaticProviderStore::new(vec![create_provider(
            "a",
            json!(0.01),
            json!(0.0),
            &[],
        )]));
        let cache = Arc::new(MemoryCache::new(100, Duration::from_secs(60)));
        let engine = MatchingEngine::new(store.clone(), cache);

        engine.find_nearest(&origin()).await.unwrap();
        engine
            .find_nearest(&origin().with_max_distance_km(3.0).with_limit(7))
            .await
            .unwrap();
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_is_distinct() {
        let store = Arc::new(StaticProviderStore::unreachable());
        let engine = MatchingEngine::new(store, Arc::new(NoopCache));

        assert!(matches!(
            engine.find_nearest(&origin()).await,
            Err(MatchError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = Arc::new(StaticProviderStore::new(vec![create_provider(
            "a",
            json!(0.01),
            json!(0.0),
            &[],
        )]));
        let cache = Arc::new(MemoryCache::new(100, Duration::from_secs(60)));
        let engine = MatchingEngine::new(store.clone(), cache);

        let first = engine.find_ranked(&origin()).await.unwrap();
        let second = engine.find_ranked(&origin()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.fetch_count(), 1);

        // A different operation uses a different key
        engine.find_nearest(&origin()).await.unwrap();
        assert_eq!(store.fetch_count(), 2);
    }
}

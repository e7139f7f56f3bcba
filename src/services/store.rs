use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseSettings;
use crate::models::{Availability, Provider};
use crate::services::connection::{ConnectionError, ConnectionSupplier, RetryPolicy};

/// Errors that can occur when reading providers
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

/// Source of providers eligible for matching
///
/// Implementations apply the availability filter at the source; the matching
/// engine treats every returned provider as available.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Snapshot of currently available providers, in store order
    async fn available_providers(&self) -> Result<Vec<Provider>, StoreError>;

    /// Whether the backing store is reachable right now
    async fn health_check(&self) -> bool;
}

/// PostgreSQL provider store
///
/// Coordinates are read as text so that rows with malformed values still
/// reach the engine, which skips them individually.
pub struct PostgresProviderStore {
    supplier: ConnectionSupplier<PgPool>,
}

impl PostgresProviderStore {
    pub fn new(supplier: ConnectionSupplier<PgPool>) -> Self {
        Self { supplier }
    }

    /// Create the pool and store from settings
    ///
    /// Fails if the initial pool cannot be established.
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .test_before_acquire(true)
            .connect(&settings.url)
            .await?;

        let policy = RetryPolicy::new(
            settings.retry_attempts,
            Duration::from_millis(settings.retry_initial_backoff_ms),
        );

        Ok(Self::new(ConnectionSupplier::new(pool, policy)))
    }

    fn provider_from_row(row: &PgRow) -> Result<Provider, sqlx::Error> {
        let text_or_null = |v: Option<String>| v.map(Value::String).unwrap_or(Value::Null);
        let availability: Option<String> = row.try_get("availability")?;

        Ok(Provider {
            id: row.try_get("id")?,
            name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
            latitude: text_or_null(row.try_get("latitude")?),
            longitude: text_or_null(row.try_get("longitude")?),
            service_types: row.try_get("service_types")?,
            rating: row.try_get("rating")?,
            total_jobs: row.try_get("total_jobs")?,
            availability: availability
                .as_deref()
                .unwrap_or_default()
                .parse()
                .unwrap_or(Availability::Unknown),
        })
    }
}

#[async_trait]
impl ProviderStore for PostgresProviderStore {
    async fn available_providers(&self) -> Result<Vec<Provider>, StoreError> {
        let query = r#"
            SELECT
                id::text AS id,
                name,
                latitude::text AS latitude,
                longitude::text AS longitude,
                COALESCE(service_types, ARRAY[]::text[]) AS service_types,
                COALESCE(rating, 0)::float8 AS rating,
                COALESCE(total_jobs, 0)::int8 AS total_jobs,
                availability
            FROM service_providers
            WHERE status = 'active'
              AND availability = 'available'
        "#;

        let mut conn = self.supplier.acquire().await?;
        let rows = sqlx::query(query).fetch_all(&mut *conn).await?;

        let providers = rows
            .iter()
            .map(Self::provider_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!("Found {} available providers", providers.len());

        Ok(providers)
    }

    async fn health_check(&self) -> bool {
        // Single attempt; the health endpoint reports current state without retrying
        match sqlx::query("SELECT 1").fetch_one(self.supplier.source()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Database health check failed: {}", e);
                false
            }
        }
    }
}

/// In-memory provider store
///
/// Counts fetches so callers can observe whether a request reached the
/// store, and can be switched into a failing mode that reports the store
/// as unreachable.
#[derive(Debug, Default)]
pub struct StaticProviderStore {
    providers: Vec<Provider>,
    unreachable: bool,
    fetches: AtomicUsize,
}

impl StaticProviderStore {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self {
            providers,
            unreachable: false,
            fetches: AtomicUsize::new(0),
        }
    }

    /// A store whose every fetch fails as if all connection attempts were exhausted
    pub fn unreachable() -> Self {
        Self {
            providers: Vec::new(),
            unreachable: true,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of `available_providers` calls so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderStore for StaticProviderStore {
    async fn available_providers(&self) -> Result<Vec<Provider>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(ConnectionError::Exhausted {
                attempts: RetryPolicy::default().max_attempts,
                last_error: "connection refused".to_string(),
            }
            .into());
        }
        Ok(self.providers.clone())
    }

    async fn health_check(&self) -> bool {
        !self.unreachable
    }
}

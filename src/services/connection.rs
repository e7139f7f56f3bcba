use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use thiserror::Error;

/// Raised when no connection could be acquired within the retry budget
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("data store unreachable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

/// Something that can hand out a single data-store connection
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Connection: Send;

    async fn try_acquire(&self) -> Result<Self::Connection, sqlx::Error>;
}

#[async_trait]
impl ConnectionSource for PgPool {
    type Connection = PoolConnection<Postgres>;

    async fn try_acquire(&self) -> Result<Self::Connection, sqlx::Error> {
        self.acquire().await
    }
}

/// Hands out connections from a source, retrying failed acquisitions
///
/// Connections are pool handles that return to the pool when dropped, so
/// they are released on every exit path of the caller.
#[derive(Debug, Clone)]
pub struct ConnectionSupplier<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: ConnectionSource> ConnectionSupplier<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Acquire a connection, sleeping between failed attempts
    pub async fn acquire(&self) -> Result<S::Connection, ConnectionError> {
        let mut attempt = 1;
        loop {
            match self.source.try_acquire().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::warn!(
                        "Database connection error (attempt {}/{}): {}",
                        attempt,
                        self.policy.max_attempts,
                        e
                    );

                    if attempt >= self.policy.max_attempts {
                        tracing::error!("All database connection attempts failed");
                        return Err(ConnectionError::Exhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    tokio::time::sleep(self.policy.backoff_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use crate::models::domain::Provider;

/// Response for the nearest provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestProviderResponse {
    pub provider: Provider,
    pub distance_km: f64,
    pub total_providers_checked: usize,
    pub valid_providers_found: usize,
}

/// One entry of the ranked provider list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedProvider {
    #[serde(flatten)]
    pub provider: Provider,
    pub distance_km: f64,
}

/// Returned with 404 when no provider qualifies for a nearest lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotFoundResponse {
    pub message: String,
    pub total_providers: usize,
    pub valid_providers: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub cache: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

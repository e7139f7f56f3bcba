use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use validator::Validate;

use crate::config::MatchingSettings;
use crate::core::{round_km, validate, MatchError, MatchingEngine, ValidationError};
use crate::models::{
    Coordinate, ErrorResponse, HealthResponse, MatchProvidersRequest, MatchQuery, NearestProviderResponse,
    NotFoundResponse, RankedProvider,
};
use crate::services::{ProviderStore, ResultCache};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: MatchingEngine,
    pub store: Arc<dyn ProviderStore>,
    pub cache: Arc<dyn ResultCache>,
    pub matching: MatchingSettings,
}

/// Configure all provider-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/providers/nearest", web::post().to(find_nearest_provider))
        .route("/providers/match", web::post().to(match_providers));
}

/// Health check endpoint
///
/// Reports data store reachability independently of the matching logic.
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let db_healthy = state.store.health_check().await;
    let cache_status = state.cache.status().await;

    let (status, database) = if db_healthy {
        ("healthy", "connected")
    } else {
        ("degraded", "disconnected")
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        service: "nearest-provider-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        cache: cache_status.as_str().to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Find nearest provider endpoint
///
/// POST /api/v1/providers/nearest
///
/// Request body:
/// ```json
/// {
///   "latitude": 40.7128,
///   "longitude": -74.0060,
///   "service_type": "towing"
/// }
/// ```
async fn find_nearest_provider(
    state: web::Data<AppState>,
    req: web::Json<MatchProvidersRequest>,
) -> HttpResponse {
    let span = tracing::info_span!("find_nearest_provider", request_id = %uuid::Uuid::new_v4());

    async move {
        let started = Instant::now();

        let query = match build_nearest_query(&req) {
            Ok(query) => query,
            Err(response) => return response,
        };

        let response = match state.engine.find_nearest(&query).await {
            Ok(result) => HttpResponse::Ok().json(NearestProviderResponse {
                provider: result.candidate.provider,
                distance_km: round_km(result.candidate.distance_km),
                total_providers_checked: result.total_providers_checked,
                valid_providers_found: result.valid_providers_found,
            }),
            Err(e) => error_response(e),
        };

        warn_if_slow("find_nearest_provider", started, state.matching.slow_request_ms);
        response
    }
    .instrument(span)
    .await
}

/// Ranked providers endpoint
///
/// POST /api/v1/providers/match
///
/// Request body:
/// ```json
/// {
///   "latitude": 40.7128,
///   "longitude": -74.0060,
///   "service_type": "towing",
///   "max_distance_km": 25,
///   "limit": 10
/// }
/// ```
async fn match_providers(
    state: web::Data<AppState>,
    req: web::Json<MatchProvidersRequest>,
) -> HttpResponse {
    let span = tracing::info_span!("match_providers", request_id = %uuid::Uuid::new_v4());

    async move {
        let started = Instant::now();

        let query = match build_ranked_query(&req, &state.matching) {
            Ok(query) => query,
            Err(response) => return response,
        };

        let response = match state.engine.find_ranked(&query).await {
            Ok(ranked) => {
                let body: Vec<RankedProvider> = ranked
                    .into_iter()
                    .map(|c| RankedProvider {
                        provider: c.provider,
                        distance_km: round_km(c.distance_km),
                    })
                    .collect();
                HttpResponse::Ok().json(body)
            }
            Err(e) => error_response(e),
        };

        warn_if_slow("match_providers", started, state.matching.slow_request_ms);
        response
    }
    .instrument(span)
    .await
}

/// Validate the request origin and service type for a nearest lookup
///
/// `max_distance_km` and `limit` are ignored.
fn build_nearest_query(req: &MatchProvidersRequest) -> Result<MatchQuery, HttpResponse> {
    let req = req.without_ranking_params();
    let origin = request_origin(&req)?;

    Ok(MatchQuery {
        origin,
        service_type: req.service_type,
        max_distance_km: None,
        limit: None,
    })
}

/// Validate the request body and turn it into a ranked query with configured defaults
fn build_ranked_query(
    req: &MatchProvidersRequest,
    settings: &MatchingSettings,
) -> Result<MatchQuery, HttpResponse> {
    let origin = request_origin(req)?;

    // Cap limit to prevent oversized responses; validation guarantees it is positive
    let max_limit = usize::from(settings.max_limit);
    let limit = match req.limit {
        Some(limit) => usize::try_from(limit).map_or(max_limit, |l| l.min(max_limit)),
        None => usize::from(settings.default_limit).min(max_limit),
    };

    Ok(MatchQuery {
        origin,
        service_type: req.service_type.clone(),
        max_distance_km: Some(req.max_distance_km.unwrap_or(settings.default_max_distance_km)),
        limit: Some(limit),
    })
}

/// Run the derive checks and coordinate validation shared by both endpoints
fn request_origin(req: &MatchProvidersRequest) -> Result<Coordinate, HttpResponse> {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for matching request: {}", errors);
        return Err(bad_request(errors.to_string()));
    }

    let (Some(latitude), Some(longitude)) = (&req.latitude, &req.longitude) else {
        return Err(validation_failure(ValidationError::MissingCoordinates));
    };

    validate(latitude, longitude).map_err(validation_failure)
}

fn validation_failure(error: ValidationError) -> HttpResponse {
    tracing::info!("Rejected matching request: {}", error);
    bad_request(error.to_string())
}

fn bad_request(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message,
        status_code: 400,
    })
}

/// Map engine failures onto HTTP responses without leaking internals
fn error_response(error: MatchError) -> HttpResponse {
    match error {
        MatchError::Validation(e) => validation_failure(e),
        MatchError::NotFound {
            reason,
            total_providers,
            valid_providers,
        } => {
            tracing::info!("No provider found: {}", reason);
            HttpResponse::NotFound().json(NotFoundResponse {
                message: reason.message().to_string(),
                total_providers,
                valid_providers,
            })
        }
        MatchError::Connection(e) => {
            tracing::error!("Failed to reach provider store: {}", e);
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                error: "Database connection failed".to_string(),
                message: "The provider database is currently unreachable".to_string(),
                status_code: 503,
            })
        }
        MatchError::Internal(e) => {
            tracing::error!("Unexpected matching failure: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Internal server error".to_string(),
                message: "An unexpected error occurred".to_string(),
                status_code: 500,
            })
        }
    }
}

fn warn_if_slow(operation: &str, started: Instant, threshold_ms: u64) {
    let elapsed = started.elapsed();
    if elapsed > Duration::from_millis(threshold_ms) {
        tracing::warn!(
            "Slow request: {} took {:.2} seconds",
            operation,
            elapsed.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> MatchProvidersRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_build_ranked_query_applies_defaults() {
        let settings = MatchingSettings::default();
        let query =
            build_ranked_query(&request(json!({"latitude": 1.0, "longitude": "2"})), &settings)
                .unwrap();

        assert_eq!(query.origin.longitude, 2.0);
        assert_eq!(query.max_distance_km, Some(50.0));
        assert_eq!(query.limit, Some(20));
    }

    #[test]
    fn test_build_ranked_query_caps_limit() {
        let settings = MatchingSettings::default();
        for limit in [500, 70_000] {
            let query = build_ranked_query(
                &request(json!({"latitude": 1.0, "longitude": 2.0, "limit": limit})),
                &settings,
            )
            .unwrap();

            assert_eq!(query.limit, Some(100));
        }
    }

    #[test]
    fn test_build_ranked_query_rejects_missing_coordinates() {
        let settings = MatchingSettings::default();
        let response =
            build_ranked_query(&request(json!({"latitude": 1.0})), &settings).unwrap_err();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_build_nearest_query_ignores_ranking_params() {
        let query = build_nearest_query(&request(
            json!({"latitude": 0, "longitude": 0, "max_distance_km": 0, "limit": -3}),
        ))
        .unwrap();

        assert_eq!(query.max_distance_km, None);
        assert_eq!(query.limit, None);
    }
}

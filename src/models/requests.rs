use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Request body shared by the nearest and ranked matching endpoints
///
/// Coordinates are accepted as raw JSON values so that numeric strings and
/// malformed input reach the coordinate validator instead of failing JSON
/// extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct MatchProvidersRequest {
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
    #[validate(length(max = 64, message = "must be at most 64 characters"))]
    #[serde(default, alias = "serviceType")]
    pub service_type: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "must be greater than 0"))]
    #[serde(default, alias = "maxDistanceKm")]
    pub max_distance_km: Option<f64>,
    /// Signed so that zero and negative values fail validation with a field
    /// message; values above the configured maximum are capped later
    #[validate(range(min = 1, message = "must be at least 1"))]
    #[serde(default)]
    pub limit: Option<i64>,
}

impl MatchProvidersRequest {
    /// Copy of the request without the range and limit parameters
    ///
    /// Nearest lookups never apply them, so they are not validated either.
    pub fn without_ranking_params(&self) -> Self {
        Self {
            max_distance_km: None,
            limit: None,
            ..self.clone()
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Default search radius when a query does not specify one
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;

/// Default number of ranked results when a query does not specify one
pub const DEFAULT_LIMIT: usize = 20;

/// A validated geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Provider availability as recorded by the data store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Busy,
    Offline,
    #[serde(other)]
    Unknown,
}

impl FromStr for Availability {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "available" | "1" | "true" => Availability::Available,
            "busy" => Availability::Busy,
            "offline" | "0" | "false" => Availability::Offline,
            _ => Availability::Unknown,
        })
    }
}

/// Service provider as read from the data store
///
/// Coordinates are kept as raw JSON values because source rows may hold
/// malformed data. They are validated per request by the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub latitude: Value,
    #[serde(default)]
    pub longitude: Value,
    #[serde(default)]
    pub service_types: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_jobs: i64,
    pub availability: Availability,
}

impl Provider {
    /// Whether this provider offers the given service type (exact match)
    pub fn offers(&self, service_type: &str) -> bool {
        self.service_types.iter().any(|s| s == service_type)
    }
}

/// A provider paired with its distance from the query origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub provider: Provider,
    pub distance_km: f64,
}

/// Result of a nearest-provider lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestMatch {
    pub candidate: MatchCandidate,
    /// Providers returned by the store
    pub total_providers_checked: usize,
    /// Providers that passed coordinate validation and the service filter
    pub valid_providers_found: usize,
}

/// Parameters of one matching request
#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub origin: Coordinate,
    pub service_type: Option<String>,
    pub max_distance_km: Option<f64>,
    pub limit: Option<usize>,
}

impl MatchQuery {
    pub fn new(origin: Coordinate) -> Self {
        Self {
            origin,
            service_type: None,
            max_distance_km: None,
            limit: None,
        }
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    pub fn with_max_distance_km(mut self, max_distance_km: f64) -> Self {
        self.max_distance_km = Some(max_distance_km);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Service type filter, with blank values treated as no filter
    pub fn service_filter(&self) -> Option<&str> {
        self.service_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance_km.unwrap_or(DEFAULT_MAX_DISTANCE_KM)
    }

    pub fn result_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// Which matching operation produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Nearest,
    Ranked,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Nearest => "nearest",
            QueryKind::Ranked => "ranked",
        }
    }
}

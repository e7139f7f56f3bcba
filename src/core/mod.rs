// Core algorithm exports
pub mod distance;
pub mod matcher;
pub mod validation;

pub use distance::{haversine_distance, round_km, EARTH_RADIUS_KM};
pub use matcher::{MatchError, MatchingEngine, NotFoundReason, DEFAULT_CACHE_TTL};
pub use validation::{validate, validate_coordinate, CoordinateField, ValidationError};

//! Road Assist Geo - nearest service provider matching
//!
//! This library locates the closest available roadside-assistance provider to
//! a client's position and ranks providers by great-circle distance. Results
//! are memoized in a short-lived cache and provider data is read through a
//! retrying connection supplier.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{haversine_distance, validate, MatchError, MatchingEngine, NotFoundReason, ValidationError};
pub use models::{Coordinate, MatchCandidate, MatchQuery, NearestMatch, Provider};
pub use services::{ProviderStore, ResultCache};

// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Availability, Coordinate, MatchCandidate, MatchQuery, NearestMatch, Provider, QueryKind,
    DEFAULT_LIMIT, DEFAULT_MAX_DISTANCE_KM,
};
pub use requests::MatchProvidersRequest;
pub use responses::{
    ErrorResponse, HealthResponse, NearestProviderResponse, NotFoundResponse, RankedProvider,
};

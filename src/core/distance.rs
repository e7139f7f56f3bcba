use crate::models::Coordinate;

/// Earth's radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate the Haversine distance between two points in kilometers
///
/// The intermediate term is clamped to `[0, 1]` so rounding error cannot push
/// antipodal points past the square root's domain. Identical points yield 0
/// and no pair yields more than `π * EARTH_RADIUS_KM`.
#[inline]
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Round a distance to two decimals for presentation
#[inline]
pub fn round_km(distance_km: f64) -> f64 {
    (distance_km * 100.0).round() / 100.0
}

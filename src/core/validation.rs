use crate::models::Coordinate;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Coordinate component named in validation messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateField {
    Latitude,
    Longitude,
}

impl fmt::Display for CoordinateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateField::Latitude => write!(f, "Latitude"),
            CoordinateField::Longitude => write!(f, "Longitude"),
        }
    }
}

/// Client-side input errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Both latitude and longitude are required")]
    MissingCoordinates,

    #[error("Invalid coordinate format: {field} must be a finite number")]
    InvalidFormat { field: CoordinateField },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: CoordinateField,
        min: f64,
        max: f64,
    },

    #[error("{field} {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: &'static str,
    },
}

/// Parse one raw coordinate component into a finite float
///
/// Numbers are taken as-is and strings are trimmed and parsed. Anything else
/// (null, booleans, arrays, objects) is rejected.
pub fn parse_component(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Validate raw latitude/longitude input and build a coordinate
///
/// Out-of-range values are rejected, never clamped. Bounds are inclusive.
pub fn validate(raw_lat: &Value, raw_lng: &Value) -> Result<Coordinate, ValidationError> {
    let latitude = parse_component(raw_lat).ok_or(ValidationError::InvalidFormat {
        field: CoordinateField::Latitude,
    })?;
    let longitude = parse_component(raw_lng).ok_or(ValidationError::InvalidFormat {
        field: CoordinateField::Longitude,
    })?;

    validate_coordinate(latitude, longitude)
}

/// Range-check already-numeric coordinates
pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<Coordinate, ValidationError> {
    if !latitude.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: CoordinateField::Latitude,
        });
    }
    if !longitude.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: CoordinateField::Longitude,
        });
    }
    if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        return Err(ValidationError::OutOfRange {
            field: CoordinateField::Latitude,
            min: MIN_LATITUDE,
            max: MAX_LATITUDE,
        });
    }
    if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        return Err(ValidationError::OutOfRange {
            field: CoordinateField::Longitude,
            min: MIN_LONGITUDE,
            max: MAX_LONGITUDE,
        });
    }

    Ok(Coordinate { latitude, longitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_numbers_and_numeric_strings() {
        let c = validate(&json!(40.7128), &json!("-74.0060")).unwrap();
        assert_eq!(c.latitude, 40.7128);
        assert_eq!(c.longitude, -74.006);

        let c = validate(&json!(" 12 "), &json!(0)).unwrap();
        assert_eq!(c.latitude, 12.0);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(validate_coordinate(90.0, 180.0).is_ok());
        assert!(validate_coordinate(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            validate(&json!("north"), &json!(1.0)),
            Err(ValidationError::InvalidFormat { field: CoordinateField::Latitude })
        );
        assert_eq!(
            validate(&json!(1.0), &Value::Null),
            Err(ValidationError::InvalidFormat { field: CoordinateField::Longitude })
        );
        assert!(validate(&json!(true), &json!(1.0)).is_err());
        assert!(validate(&json!("NaN"), &json!(1.0)).is_err());
        assert!(validate(&json!("inf"), &json!(1.0)).is_err());
    }

    #[test]
    fn test_out_of_range_messages() {
        let err = validate_coordinate(91.0, 0.0).unwrap_err();
        assert_eq!(err.to_string(), "Latitude must be between -90 and 90");

        let err = validate_coordinate(0.0, -180.5).unwrap_err();
        assert_eq!(err.to_string(), "Longitude must be between -180 and 180");
    }
}

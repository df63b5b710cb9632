//! Validation for input supplied from outside the build pipeline.
//!
//! Everything here returns [`LookupError`] so the serving layer can map a
//! failure straight onto a status code.

use crate::error::LookupError;
use quadcluster_types::{Bounds, GeoPoint, QuadKey, Zoom};

/// Validates a quadkey taken from a request path.
///
/// The longest servable key belongs to zoom `max_zoom - 1` and therefore has
/// `max_zoom` digits.
///
/// # Examples
///
/// ```
/// use quadcluster::compute::validation::validate_quadkey;
///
/// assert!(validate_quadkey("3203", 16).is_ok());
///
/// // Empty key
/// assert_eq!(validate_quadkey("", 16).unwrap_err().status_code(), 404);
///
/// // Longer than the deepest zoom
/// let err = validate_quadkey("320132321300211100", 16).unwrap_err();
/// assert_eq!(err.status_code(), 400);
///
/// // Not a base-4 digit
/// assert_eq!(validate_quadkey("3205", 16).unwrap_err().status_code(), 400);
/// ```
pub fn validate_quadkey(raw: &str, max_zoom: Zoom) -> Result<QuadKey, LookupError> {
    Ok(QuadKey::parse_bounded(raw, usize::from(max_zoom))?)
}

/// Validates that a requested zoom has buckets.
pub fn validate_zoom(zoom: Zoom, min_zoom: Zoom, max_zoom: Zoom) -> Result<(), LookupError> {
    if zoom < min_zoom || zoom >= max_zoom {
        return Err(LookupError::BadRequest(format!(
            "zoom {} outside [{}, {})",
            zoom, min_zoom, max_zoom
        )));
    }
    Ok(())
}

/// Validates a coordinate pair against the clustering bounds.
pub fn validate_coordinate(
    longitude: f64,
    latitude: f64,
    bounds: &Bounds,
) -> Result<GeoPoint, LookupError> {
    if !longitude.is_finite() {
        return Err(LookupError::BadRequest(format!(
            "longitude must be finite, got: {}",
            longitude
        )));
    }

    if !latitude.is_finite() {
        return Err(LookupError::BadRequest(format!(
            "latitude must be finite, got: {}",
            latitude
        )));
    }

    let point = GeoPoint::new(0, longitude, latitude);
    if !bounds.contains(&point) {
        return Err(LookupError::BadRequest(format!(
            "({}, {}) is outside lon [{}, {}], lat [{}, {}]",
            longitude, latitude, bounds.min_lon, bounds.max_lon, bounds.min_lat, bounds.max_lat
        )));
    }

    Ok(point)
}

/// Validates a search radius in meters.
pub fn validate_radius(radius_meters: f64) -> Result<(), LookupError> {
    if !radius_meters.is_finite() || radius_meters < 0.0 {
        return Err(LookupError::BadRequest(format!(
            "radius must be a non-negative finite number, got: {}",
            radius_meters
        )));
    }
    Ok(())
}

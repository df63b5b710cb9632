use geo::{Point, Rect, coord};
use serde::{Deserialize, Serialize};

use crate::quadkey::Quadrant;

/// Identifier of a facility point as issued by the source collaborator.
pub type PointId = u64;

/// A geolocated facility point.
///
/// Points are produced by the upstream source and never mutated by the index
/// builder; they are shared read-only across worker threads.
///
/// # Examples
///
/// ```
/// use quadcluster_types::point::GeoPoint;
///
/// let point = GeoPoint::new(42, 37.61776, 55.75577);
/// assert_eq!(point.id, 42);
/// assert_eq!(point.to_point().x(), 37.61776);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: PointId,
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(id: PointId, longitude: f64, latitude: f64) -> Self {
        Self {
            id,
            longitude,
            latitude,
        }
    }

    /// Convert to a `geo::Point` (x = longitude, y = latitude).
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Whether both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite()
    }
}

/// Axis-aligned longitude/latitude rectangle that quadkeys subdivide.
///
/// Midpoint ties are resolved toward the upper half: a coordinate strictly
/// less than the midpoint lands in the south (or west) half, anything equal
/// or greater lands in the north (or east) half.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Bounds {
    /// The world rectangle used for every index: longitude [-180, 180],
    /// latitude [-85, 85].
    pub const WORLD: Bounds = Bounds {
        min_lon: -180.0,
        max_lon: 180.0,
        min_lat: -85.0,
        max_lat: 85.0,
    };

    pub const fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// Midpoint as `(longitude, latitude)`.
    #[inline]
    pub fn midpoint(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) * 0.5,
            (self.min_lat + self.max_lat) * 0.5,
        )
    }

    /// Quadrant of this rectangle that contains `point`.
    #[inline]
    pub fn quadrant(&self, point: &GeoPoint) -> Quadrant {
        let (mid_lon, mid_lat) = self.midpoint();
        Quadrant::from_halves(point.latitude >= mid_lat, point.longitude >= mid_lon)
    }

    /// The half-width, half-height sub-rectangle for `quadrant`.
    pub fn sub_bounds(&self, quadrant: Quadrant) -> Bounds {
        let (mid_lon, mid_lat) = self.midpoint();
        let mut next = *self;
        if quadrant.is_north() {
            next.min_lat = mid_lat;
        } else {
            next.max_lat = mid_lat;
        }
        if quadrant.is_east() {
            next.min_lon = mid_lon;
        } else {
            next.max_lon = mid_lon;
        }
        next
    }

    /// Inclusive containment test on both axes.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lon..=self.max_lon).contains(&point.longitude)
            && (self.min_lat..=self.max_lat).contains(&point.latitude)
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_lon, y: self.min_lat },
            coord! { x: self.max_lon, y: self.max_lat },
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::WORLD
    }
}

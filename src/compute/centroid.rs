//! Running arithmetic mean of member coordinates.

use quadcluster_types::{ClusterAggregate, GeoPoint, QuadKey};

/// Accumulates coordinate sums so a centroid can be produced either from raw
/// members or from already-reduced child buckets (weighted by their size).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CentroidAccumulator {
    sum_lon: f64,
    sum_lat: f64,
    count: u64,
}

impl CentroidAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, longitude: f64, latitude: f64) {
        self.sum_lon += longitude;
        self.sum_lat += latitude;
        self.count += 1;
    }

    #[inline]
    pub fn add_point(&mut self, point: &GeoPoint) {
        self.add(point.longitude, point.latitude);
    }

    /// Fold in a reduced bucket as `size` members located at its centroid.
    pub fn add_weighted(&mut self, longitude: f64, latitude: f64, size: u64) {
        let weight = size as f64;
        self.sum_lon += longitude * weight;
        self.sum_lat += latitude * weight;
        self.count += size;
    }

    pub fn add_aggregate(&mut self, aggregate: &ClusterAggregate) {
        self.add_weighted(aggregate.longitude, aggregate.latitude, aggregate.size);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean `(longitude, latitude)`, or `None` when nothing was added.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some((self.sum_lon / n, self.sum_lat / n))
    }

    pub fn finish(&self, quadkey: QuadKey) -> Option<ClusterAggregate> {
        let (longitude, latitude) = self.centroid()?;
        Some(ClusterAggregate::new(quadkey, longitude, latitude, self.count))
    }
}

impl<'a> FromIterator<&'a GeoPoint> for CentroidAccumulator {
    fn from_iter<T: IntoIterator<Item = &'a GeoPoint>>(iter: T) -> Self {
        let mut acc = Self::new();
        for point in iter {
            acc.add_point(point);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_three_members() {
        let points = [
            GeoPoint::new(1, 0.0, 0.0),
            GeoPoint::new(2, 2.0, 0.0),
            GeoPoint::new(3, 1.0, 3.0),
        ];
        let acc: CentroidAccumulator = points.iter().collect();
        assert_eq!(acc.centroid(), Some((1.0, 1.0)));

        let aggregate = acc.finish(QuadKey::parse("0").unwrap()).unwrap();
        assert_eq!(aggregate.size, 3);
        assert_eq!((aggregate.longitude, aggregate.latitude), (1.0, 1.0));
    }

    #[test]
    fn test_empty_has_no_centroid() {
        let acc = CentroidAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.centroid(), None);
        assert!(acc.finish(QuadKey::root()).is_none());
    }

    #[test]
    fn test_weighted_children_match_flat_mean() {
        let mut left = CentroidAccumulator::new();
        left.add(0.0, 0.0);
        left.add(2.0, 0.0);
        let mut right = CentroidAccumulator::new();
        right.add(1.0, 3.0);

        let (l_lon, l_lat) = left.centroid().unwrap();
        let (r_lon, r_lat) = right.centroid().unwrap();

        let mut parent = CentroidAccumulator::new();
        parent.add_weighted(l_lon, l_lat, left.count());
        parent.add_weighted(r_lon, r_lat, right.count());
        assert_eq!(parent.count(), 3);
        assert_eq!(parent.centroid(), Some((1.0, 1.0)));
    }
}

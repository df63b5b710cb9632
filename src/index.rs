//! Per-zoom geo index of cluster aggregates.
//!
//! Each zoom level keeps two views of the same aggregates: an ordered map
//! keyed by quadkey for exact and prefix ("branch") lookups, and an R-tree of
//! centroids for radius and rectangle queries.

use geo::{Distance, Haversine, Point, Rect};
use quadcluster_types::{ClusterAggregate, QuadKey, Zoom};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use std::collections::BTreeMap;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

type IndexedCentroid = GeomWithData<[f64; 2], QuadKey>;

fn indexed_centroid(aggregate: &ClusterAggregate) -> Option<IndexedCentroid> {
    (aggregate.longitude.is_finite() && aggregate.latitude.is_finite()).then(|| {
        IndexedCentroid::new(
            [aggregate.longitude, aggregate.latitude],
            aggregate.quadkey.clone(),
        )
    })
}

/// Aggregates of a single zoom level.
#[derive(Debug, Default)]
pub struct GeoIndex {
    zoom: Zoom,
    entries: BTreeMap<QuadKey, ClusterAggregate>,
    tree: RTree<IndexedCentroid>,
}

impl GeoIndex {
    pub fn new(zoom: Zoom) -> Self {
        Self {
            zoom,
            entries: BTreeMap::new(),
            tree: RTree::new(),
        }
    }

    /// Bulk-load an index, e.g. when restoring a snapshot.
    pub fn from_aggregates(zoom: Zoom, aggregates: Vec<ClusterAggregate>) -> Self {
        let centroids = aggregates.iter().filter_map(indexed_centroid).collect();
        let entries = aggregates
            .into_iter()
            .map(|a| (a.quadkey.clone(), a))
            .collect();
        Self {
            zoom,
            entries,
            tree: RTree::bulk_load(centroids),
        }
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    /// Insert or replace the aggregate for its quadkey, returning the previous
    /// one.
    ///
    /// A centroid with non-finite coordinates is kept for exact and prefix
    /// lookups but left out of the R-tree.
    pub fn insert(&mut self, aggregate: ClusterAggregate) -> Option<ClusterAggregate> {
        let centroid = indexed_centroid(&aggregate);
        if centroid.is_none() {
            log::warn!(
                "zoom {}: centroid of {} is not finite, leaving it out of the spatial index",
                self.zoom,
                aggregate.quadkey
            );
        }
        let previous = self.entries.insert(aggregate.quadkey.clone(), aggregate);

        if let Some(stale) = previous.as_ref().and_then(indexed_centroid) {
            self.tree.remove(&stale);
        }
        if let Some(centroid) = centroid {
            self.tree.insert(centroid);
        }

        previous
    }

    pub fn get(&self, quadkey: &QuadKey) -> Option<&ClusterAggregate> {
        self.entries.get(quadkey)
    }

    /// All aggregates whose quadkey starts with `prefix`, in key order.
    pub fn with_prefix(&self, prefix: &QuadKey) -> Vec<ClusterAggregate> {
        self.entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.as_str().starts_with(prefix.as_str()))
            .map(|(_, aggregate)| aggregate.clone())
            .collect()
    }

    /// Aggregates whose centroid lies within `radius_meters` of `center`,
    /// nearest first, paired with their distance in meters.
    pub fn within_radius(
        &self,
        center: &Point,
        radius_meters: f64,
        limit: usize,
    ) -> Vec<(ClusterAggregate, f64)> {
        if limit == 0 || !radius_meters.is_finite() || radius_meters < 0.0 {
            return Vec::new();
        }
        if !(center.x().is_finite() && center.y().is_finite()) {
            log::warn!("Rejecting radius query with non-finite center");
            return Vec::new();
        }

        let lat_degrees = (radius_meters / EARTH_RADIUS_METERS).to_degrees();
        let mut lon_degrees =
            (radius_meters / (EARTH_RADIUS_METERS * center.y().to_radians().cos())).to_degrees();
        if !lon_degrees.is_finite() || lon_degrees > 180.0 {
            lon_degrees = 360.0;
        }

        let (min_lat, max_lat) = (center.y() - lat_degrees, center.y() + lat_degrees);
        let (min_lon, max_lon) = (center.x() - lon_degrees, center.x() + lon_degrees);
        let mut envelopes = vec![AABB::from_corners([min_lon, min_lat], [max_lon, max_lat])];
        // Circles crossing the antimeridian continue on the other side.
        if lon_degrees <= 180.0 {
            if min_lon < -180.0 {
                envelopes.push(AABB::from_corners([min_lon + 360.0, min_lat], [180.0, max_lat]));
            }
            if max_lon > 180.0 {
                envelopes.push(AABB::from_corners([-180.0, min_lat], [max_lon - 360.0, max_lat]));
            }
        }

        let mut results: Vec<_> = envelopes
            .iter()
            .flat_map(|envelope| self.tree.locate_in_envelope(envelope))
            .filter_map(|centroid| {
                let [x, y] = *centroid.geom();
                let distance = Haversine.distance(*center, Point::new(x, y));
                if distance <= radius_meters {
                    self.entries
                        .get(&centroid.data)
                        .map(|aggregate| (aggregate.clone(), distance))
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    /// Aggregates whose centroid lies inside `rect` (inclusive), in key order.
    pub fn within_rect(&self, rect: &Rect) -> Vec<ClusterAggregate> {
        let (min, max) = (rect.min(), rect.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            log::warn!("Rejecting bounding box query with non-finite coordinates");
            return Vec::new();
        }

        let envelope = AABB::from_corners([min.x, min.y], [max.x, max.y]);
        let mut results: Vec<_> = self
            .tree
            .locate_in_envelope(&envelope)
            .filter_map(|centroid| self.entries.get(&centroid.data).cloned())
            .collect();
        results.sort_by(|a, b| a.quadkey.cmp(&b.quadkey));
        results
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterAggregate> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn aggregate(key: &str, lon: f64, lat: f64, size: u64) -> ClusterAggregate {
        ClusterAggregate::new(QuadKey::parse(key).unwrap(), lon, lat, size)
    }

    fn sample_index() -> GeoIndex {
        let mut index = GeoIndex::new(2);
        index.insert(aggregate("320", 37.6, 55.7, 10));
        index.insert(aggregate("321", 39.7, 47.2, 4));
        index.insert(aggregate("212", -74.0, 40.7, 7));
        index
    }

    #[test]
    fn test_exact_lookup() {
        let index = sample_index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(&QuadKey::parse("320").unwrap()).unwrap().size, 10);
        assert!(index.get(&QuadKey::parse("333").unwrap()).is_none());
    }

    #[test]
    fn test_insert_replaces_previous() {
        let mut index = sample_index();
        let previous = index.insert(aggregate("320", 30.0, 50.0, 11));
        assert_eq!(previous.unwrap().size, 10);
        assert_eq!(index.len(), 3);

        // the stale centroid must be gone from the R-tree too
        let near_old = index.within_radius(&Point::new(37.6, 55.7), 1_000.0, 10);
        assert!(near_old.is_empty());
        let near_new = index.within_radius(&Point::new(30.0, 50.0), 1_000.0, 10);
        assert_eq!(near_new.len(), 1);
        assert_eq!(near_new[0].0.size, 11);
    }

    #[test]
    fn test_prefix_lookup() {
        let index = sample_index();
        let branch = index.with_prefix(&QuadKey::parse("32").unwrap());
        let keys: Vec<_> = branch.iter().map(|a| a.quadkey.as_str()).collect();
        assert_eq!(keys, vec!["320", "321"]);
        assert_eq!(index.with_prefix(&QuadKey::root()).len(), 3);
        assert!(index.with_prefix(&QuadKey::parse("0").unwrap()).is_empty());
    }

    #[test]
    fn test_radius_query_sorted_by_distance() {
        let index = sample_index();
        let results = index.within_radius(&Point::new(37.0, 55.0), 1_500_000.0, 10);
        let keys: Vec<_> = results.iter().map(|(a, _)| a.quadkey.as_str()).collect();
        assert_eq!(keys, vec!["320", "321"]);
        assert!(results[0].1 < results[1].1);

        let limited = index.within_radius(&Point::new(37.0, 55.0), 1_500_000.0, 1);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_rect_query() {
        let index = sample_index();
        let rect = Rect::new(coord! { x: 30.0, y: 40.0 }, coord! { x: 40.0, y: 60.0 });
        let keys: Vec<_> = index
            .within_rect(&rect)
            .into_iter()
            .map(|a| a.quadkey.into_string())
            .collect();
        assert_eq!(keys, vec!["320", "321"]);
    }

    #[test]
    fn test_non_finite_queries_are_rejected() {
        let index = sample_index();
        assert!(index.within_radius(&Point::new(f64::NAN, 0.0), 10.0, 10).is_empty());
        let rect = Rect::new(coord! { x: f64::NAN, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        assert!(index.within_rect(&rect).is_empty());
    }

    #[test]
    fn test_bulk_load_matches_inserts() {
        let index = GeoIndex::from_aggregates(
            2,
            vec![aggregate("320", 37.6, 55.7, 10), aggregate("212", -74.0, 40.7, 7)],
        );
        assert_eq!(index.zoom(), 2);
        assert_eq!(index.len(), 2);
        assert_eq!(index.within_radius(&Point::new(-74.0, 40.7), 100.0, 5).len(), 1);
    }

    #[test]
    fn test_radius_query_wraps_antimeridian() {
        let mut index = GeoIndex::new(3);
        index.insert(aggregate("0202", -179.9, 10.0, 2));
        index.insert(aggregate("1313", 179.95, 10.0, 3));
        index.insert(aggregate("1300", 170.0, 10.0, 1));

        let results = index.within_radius(&Point::new(179.9, 10.0), 50_000.0, 10);
        let keys: Vec<_> = results.iter().map(|(a, _)| a.quadkey.as_str()).collect();
        assert_eq!(keys, vec!["1313", "0202"]);

        let west = index.within_radius(&Point::new(-179.95, 10.0), 50_000.0, 10);
        assert_eq!(west.len(), 2);
    }

    #[test]
    fn test_non_finite_centroid_kept_for_lookups_only() {
        let mut index = sample_index();
        index.insert(aggregate("000", f64::NAN, f64::NAN, 1));
        index.insert(aggregate("000", f64::NAN, 0.0, 2));
        assert_eq!(index.get(&QuadKey::parse("000").unwrap()).unwrap().size, 2);
        assert_eq!(index.with_prefix(&QuadKey::parse("0").unwrap()).len(), 1);

        let all = Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 });
        assert_eq!(index.within_rect(&all).len(), 3);

        index.insert(aggregate("000", 1.0, 1.0, 3));
        assert_eq!(index.within_rect(&all).len(), 4);

        let restored = GeoIndex::from_aggregates(
            1,
            vec![aggregate("00", f64::NAN, 1.0, 1), aggregate("01", 5.0, 1.0, 1)],
        );
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.within_rect(&all).len(), 1);
    }
}

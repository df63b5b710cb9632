//! Read-side lookups for the serving layer.
//!
//! Every method validates its raw input first and reports failures as
//! [`LookupError`], which maps onto 400/404/503 responses.

use crate::compute::quadkey::encode;
use crate::compute::validation::{
    validate_coordinate, validate_quadkey, validate_radius, validate_zoom,
};
use crate::config::ClusterConfig;
use crate::error::LookupError;
use crate::storage::ClusterStore;
use geo::{Point, Rect};
use quadcluster_types::{Bounds, BucketKey, ClusterAggregate, GeoPoint, PointId, QuadKey, Zoom};

/// Query handle over a built index.
pub struct ClusterQuery<'a, S: ClusterStore + ?Sized> {
    store: &'a S,
    bounds: Bounds,
    min_zoom: Zoom,
    max_zoom: Zoom,
}

impl<'a, S> ClusterQuery<'a, S>
where
    S: ClusterStore + ?Sized,
{
    pub fn new(store: &'a S, config: &ClusterConfig) -> Self {
        Self {
            store,
            bounds: config.bounds,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
        }
    }

    /// Aggregate stored under exactly `quadkey`.
    pub fn cluster(&self, quadkey: &str) -> Result<ClusterAggregate, LookupError> {
        let (zoom, key) = self.parse(quadkey)?;
        self.store
            .aggregate(zoom, &key)?
            .ok_or_else(|| LookupError::NotFound(format!("no cluster at {}", key)))
    }

    /// The aggregate at `quadkey` plus every finer aggregate below it,
    /// coarsest first.
    pub fn branch(&self, quadkey: &str) -> Result<Vec<ClusterAggregate>, LookupError> {
        let (zoom, key) = self.parse(quadkey)?;

        let mut found = Vec::new();
        for level in zoom..self.max_zoom {
            found.extend(self.store.aggregates_with_prefix(level, &key)?);
        }

        if found.is_empty() {
            return Err(LookupError::NotFound(format!("no clusters under {}", key)));
        }
        log::trace!("branch {}: {} aggregates", key, found.len());
        Ok(found)
    }

    /// Point ids in the bucket at `quadkey`.
    pub fn members(&self, quadkey: &str) -> Result<Vec<PointId>, LookupError> {
        let (zoom, key) = self.parse(quadkey)?;
        let bucket = BucketKey::new(zoom, key);
        let members = self.store.members(&bucket)?;
        if members.is_empty() {
            return Err(LookupError::NotFound(format!("no bucket at {}", bucket)));
        }
        Ok(members)
    }

    /// Quadkey of a coordinate with `depth` digits (default: `max_zoom`).
    pub fn coord_to_quadkey(
        &self,
        longitude: f64,
        latitude: f64,
        depth: Option<usize>,
    ) -> Result<QuadKey, LookupError> {
        let max_depth = usize::from(self.max_zoom);
        let depth = depth.unwrap_or(max_depth);
        if depth == 0 || depth > max_depth {
            return Err(LookupError::BadRequest(format!(
                "depth must be in [1, {}], got {}",
                max_depth, depth
            )));
        }
        let point = validate_coordinate(longitude, latitude, &self.bounds)?;
        Ok(encode(&point, depth, &self.bounds))
    }

    /// Aggregates of `zoom` whose centroid is within `radius_meters` of
    /// `center`, nearest first.
    pub fn clusters_within_radius(
        &self,
        zoom: Zoom,
        center: &Point,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<(ClusterAggregate, f64)>, LookupError> {
        validate_zoom(zoom, self.min_zoom, self.max_zoom)?;
        validate_radius(radius_meters)?;
        validate_coordinate(center.x(), center.y(), &self.bounds)?;
        Ok(self
            .store
            .aggregates_within_radius(zoom, center, radius_meters, limit)?)
    }

    pub fn clusters_in_rect(
        &self,
        zoom: Zoom,
        rect: &Rect,
    ) -> Result<Vec<ClusterAggregate>, LookupError> {
        validate_zoom(zoom, self.min_zoom, self.max_zoom)?;
        Ok(self.store.aggregates_in_rect(zoom, rect)?)
    }

    /// Raw source points inside `rect`. Points with non-finite coordinates
    /// are never returned.
    pub fn points_in_rect(&self, rect: &Rect) -> Result<Vec<GeoPoint>, LookupError> {
        let (min, max) = (rect.min(), rect.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(LookupError::BadRequest(
                "rectangle corners must be finite".to_string(),
            ));
        }
        Ok(self.store.points_within(rect)?)
    }

    fn parse(&self, quadkey: &str) -> Result<(Zoom, QuadKey), LookupError> {
        let key = validate_quadkey(quadkey, self.max_zoom)?;
        let zoom = key
            .zoom()
            .ok_or_else(|| LookupError::NotFound("empty quadkey".to_string()))?;
        Ok((zoom, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use geo::coord;

    fn fixture() -> (MemoryStore, ClusterConfig) {
        let store = MemoryStore::new();
        let config = ClusterConfig::default().with_zoom_range(1, 4);
        let entries = [
            (1, "32", 37.0, 55.0, 2),
            (2, "320", 37.0, 55.0, 2),
            (3, "3203", 37.6, 55.7, 1),
            (3, "3202", 36.0, 54.0, 1),
            (2, "301", 100.0, 10.0, 5),
        ];
        for (zoom, key, lon, lat, size) in entries {
            let aggregate = ClusterAggregate::new(QuadKey::parse(key).unwrap(), lon, lat, size);
            store.geo_add(zoom, &aggregate).unwrap();
        }
        store
            .add_member(&BucketKey::new(3, QuadKey::parse("3203").unwrap()), 7)
            .unwrap();
        (store, config)
    }

    #[test]
    fn test_cluster_lookup() {
        let (store, config) = fixture();
        let query = ClusterQuery::new(&store, &config);

        assert_eq!(query.cluster("3203").unwrap().size, 1);
        assert_eq!(query.cluster("").unwrap_err().status_code(), 404);
        assert_eq!(query.cluster("32031").unwrap_err().status_code(), 400);
        assert_eq!(query.cluster("3303").unwrap_err().status_code(), 404);
        assert_eq!(query.cluster("32x3").unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_branch_includes_self_and_descendants() {
        let (store, config) = fixture();
        let query = ClusterQuery::new(&store, &config);

        let keys: Vec<String> = query
            .branch("32")
            .unwrap()
            .into_iter()
            .map(|a| a.quadkey.into_string())
            .collect();
        assert_eq!(keys, vec!["32", "320", "3202", "3203"]);

        assert_eq!(query.branch("3203").unwrap().len(), 1);
        assert_eq!(query.branch("33").unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_members() {
        let (store, config) = fixture();
        let query = ClusterQuery::new(&store, &config);
        assert_eq!(query.members("3203").unwrap(), vec![7]);
        assert_eq!(query.members("3202").unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_coord_to_quadkey() {
        let store = MemoryStore::new();
        let config = ClusterConfig::default();
        let query = ClusterQuery::new(&store, &config);

        assert_eq!(
            query.coord_to_quadkey(56.6, 34.84, None).unwrap().as_str(),
            "3032120002331333"
        );
        assert_eq!(
            query.coord_to_quadkey(56.6, 34.84, Some(12)).unwrap().as_str(),
            "303212000233"
        );
        assert_eq!(query.coord_to_quadkey(56.6, 34.84, Some(17)).unwrap_err().status_code(), 400);
        assert_eq!(query.coord_to_quadkey(56.6, f64::NAN, None).unwrap_err().status_code(), 400);
        assert_eq!(query.coord_to_quadkey(56.6, 88.0, None).unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_spatial_queries() {
        let (store, config) = fixture();
        let query = ClusterQuery::new(&store, &config);

        let near = query
            .clusters_within_radius(3, &Point::new(37.6, 55.7), 50_000.0, 10)
            .unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].0.quadkey.as_str(), "3203");

        let rect = Rect::new(coord! { x: 30.0, y: 50.0 }, coord! { x: 40.0, y: 60.0 });
        assert_eq!(query.clusters_in_rect(3, &rect).unwrap().len(), 2);

        assert_eq!(query.clusters_in_rect(9, &rect).unwrap_err().status_code(), 400);
        assert!(query
            .clusters_within_radius(3, &Point::new(37.6, 55.7), -1.0, 10)
            .is_err());
    }

    #[test]
    fn test_points_in_rect() {
        let (store, config) = fixture();
        store.put_point(&GeoPoint::new(1, 37.6, 55.7)).unwrap();
        store.put_point(&GeoPoint::new(2, 100.0, 10.0)).unwrap();
        store.put_point(&GeoPoint::new(3, f64::NAN, 55.0)).unwrap();
        let query = ClusterQuery::new(&store, &config);

        let rect = Rect::new(coord! { x: 30.0, y: 50.0 }, coord! { x: 40.0, y: 60.0 });
        let ids: Vec<PointId> = query.points_in_rect(&rect).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1]);

        let open = Rect::new(coord! { x: f64::NAN, y: 50.0 }, coord! { x: 40.0, y: 60.0 });
        assert_eq!(query.points_in_rect(&open).unwrap_err().status_code(), 400);
    }
}

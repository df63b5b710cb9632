use quadcluster::storage::ReducedBucket;
use quadcluster::{
    BucketKey, ClusterAggregate, ClusterConfig, ClusterError, ClusterIndexBuilder, ClusterStore,
    GeoPoint, MemoryStore, Phase, Point, PointId, QuadKey, Rect, Reducer, ReducerHandle,
    StoreError, StoreStats, VecSource, Zoom,
};
use quadcluster::error::StoreResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory store that starts failing one primitive after a number of calls.
struct FlakyStore {
    inner: MemoryStore,
    fail_add_member_after: Option<usize>,
    fail_geo_add: bool,
    add_member_calls: AtomicUsize,
}

impl FlakyStore {
    fn failing_inserts(after: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_add_member_after: Some(after),
            fail_geo_add: false,
            add_member_calls: AtomicUsize::new(0),
        }
    }

    fn failing_geo_add() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_add_member_after: None,
            fail_geo_add: true,
            add_member_calls: AtomicUsize::new(0),
        }
    }
}

impl ClusterStore for FlakyStore {
    fn put_point(&self, point: &GeoPoint) -> StoreResult<()> {
        self.inner.put_point(point)
    }

    fn point(&self, id: PointId) -> StoreResult<Option<GeoPoint>> {
        self.inner.point(id)
    }

    fn point_count(&self) -> StoreResult<usize> {
        self.inner.point_count()
    }

    fn points_within(&self, rect: &Rect) -> StoreResult<Vec<GeoPoint>> {
        self.inner.points_within(rect)
    }

    fn add_member(&self, key: &BucketKey, id: PointId) -> StoreResult<bool> {
        let calls = self.add_member_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_add_member_after
            && calls >= limit
        {
            return Err(StoreError::new(key, "connection reset"));
        }
        self.inner.add_member(key, id)
    }

    fn members(&self, key: &BucketKey) -> StoreResult<Vec<PointId>> {
        self.inner.members(key)
    }

    fn bucket_keys(&self) -> StoreResult<Vec<BucketKey>> {
        self.inner.bucket_keys()
    }

    fn load_reducer(&self, reducer: Reducer) -> StoreResult<ReducerHandle> {
        self.inner.load_reducer(reducer)
    }

    fn eval_reducer(&self, handle: &ReducerHandle, key: &BucketKey) -> StoreResult<ReducedBucket> {
        self.inner.eval_reducer(handle, key)
    }

    fn geo_add(&self, zoom: Zoom, aggregate: &ClusterAggregate) -> StoreResult<()> {
        if self.fail_geo_add {
            return Err(StoreError::new(&aggregate.quadkey, "geo index unavailable"));
        }
        self.inner.geo_add(zoom, aggregate)
    }

    fn aggregate(&self, zoom: Zoom, quadkey: &QuadKey) -> StoreResult<Option<ClusterAggregate>> {
        self.inner.aggregate(zoom, quadkey)
    }

    fn aggregates_with_prefix(
        &self,
        zoom: Zoom,
        prefix: &QuadKey,
    ) -> StoreResult<Vec<ClusterAggregate>> {
        self.inner.aggregates_with_prefix(zoom, prefix)
    }

    fn aggregates_within_radius(
        &self,
        zoom: Zoom,
        center: &Point,
        radius_meters: f64,
        limit: usize,
    ) -> StoreResult<Vec<(ClusterAggregate, f64)>> {
        self.inner
            .aggregates_within_radius(zoom, center, radius_meters, limit)
    }

    fn aggregates_in_rect(&self, zoom: Zoom, rect: &Rect) -> StoreResult<Vec<ClusterAggregate>> {
        self.inner.aggregates_in_rect(zoom, rect)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        self.inner.stats()
    }
}

fn points(n: u64) -> Vec<GeoPoint> {
    (0..n)
        .map(|i| GeoPoint::new(i, (i % 360) as f64 - 179.0, (i % 170) as f64 - 84.0))
        .collect()
}

#[test]
fn test_insert_failure_aborts_assignment() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = Arc::new(FlakyStore::failing_inserts(25));
    let config = ClusterConfig::default()
        .with_zoom_range(2, 10)
        .with_workers(4)
        .with_queue_capacity(2);
    let builder = ClusterIndexBuilder::new(store.clone(), config).unwrap();

    let err = builder.build(&mut VecSource::new(points(2_000))).unwrap_err();
    match &err {
        ClusterError::StoreIo { phase, message, .. } => {
            assert_eq!(*phase, Phase::Assignment);
            assert_eq!(message, "connection reset");
        }
        other => panic!("expected StoreIo, got {:?}", other),
    }
    assert!(err.to_string().starts_with("assignment: store failure at zoom "));

    // Nothing was aggregated after the abort.
    assert_eq!(store.stats().unwrap().aggregate_count, 0);
}

#[test]
fn test_geo_add_failure_aborts_aggregation() {
    let store = Arc::new(FlakyStore::failing_geo_add());
    let config = ClusterConfig::default().with_zoom_range(1, 4);
    let builder = ClusterIndexBuilder::new(store, config).unwrap();

    let err = builder.build(&mut VecSource::new(points(10))).unwrap_err();
    assert!(matches!(
        err,
        ClusterError::StoreIo {
            phase: Phase::Aggregation,
            ..
        }
    ));
}

#[test]
fn test_recorded_key_without_members_is_fatal() {
    let config = ClusterConfig::default().with_zoom_range(1, 4);
    let builder = ClusterIndexBuilder::in_memory(config).unwrap();

    let ghost = BucketKey::new(2, QuadKey::parse("012").unwrap());
    let err = builder.aggregate(vec![ghost]).unwrap_err();
    assert!(matches!(err, ClusterError::InvariantViolation { .. }));
    assert_eq!(builder.store().stats().unwrap().aggregate_count, 0);
}

#[test]
fn test_empty_source() {
    let builder = ClusterIndexBuilder::in_memory(ClusterConfig::default()).unwrap();
    let report = builder.build(&mut VecSource::default()).unwrap();
    assert_eq!(report.points, 0);
    assert_eq!(report.total_aggregates(), 0);
}

#[test]
fn test_out_of_bounds_points_are_not_rejected() {
    let config = ClusterConfig::default().with_zoom_range(0, 3);
    let builder = ClusterIndexBuilder::in_memory(config).unwrap();
    let report = builder
        .build(&mut VecSource::new(vec![GeoPoint::new(1, 500.0, -400.0)]))
        .unwrap();
    assert_eq!(report.events, 3);
    assert_eq!(builder.query().cluster("1").unwrap().size, 1);
}

#[test]
fn test_non_finite_points_survive_build_and_rebuild() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = ClusterConfig::default().with_zoom_range(0, 3);
    let builder = ClusterIndexBuilder::in_memory(config).unwrap();

    let mut points = Vec::new();
    for id in 0..20u64 {
        points.push(GeoPoint::new(id, f64::NAN, 10.0));
        points.push(GeoPoint::new(100 + id, 10.0, f64::INFINITY));
        points.push(GeoPoint::new(200 + id, -10.0, -10.0));
        points.push(GeoPoint::new(300 + id, -10.5, -10.5));
    }

    let report = builder.build(&mut VecSource::new(points.clone())).unwrap();
    assert_eq!(report.points, 80);
    assert_eq!(builder.store().stats().unwrap().point_count, 80);
    assert_eq!(builder.query().cluster("0").unwrap().size, 40);

    let rect = Rect::new((-20.0, -20.0), (0.0, 0.0));
    assert_eq!(builder.query().points_in_rect(&rect).unwrap().len(), 40);
    let near = builder
        .query()
        .clusters_within_radius(0, &Point::new(-10.0, -10.0), 500_000.0, 10)
        .unwrap();
    assert_eq!(near.len(), 1);
    assert_eq!(near[0].0.quadkey.as_str(), "0");

    let rebuild = builder.build(&mut VecSource::new(points)).unwrap();
    assert_eq!(rebuild.points, 80);
    assert_eq!(rebuild.new_memberships, 0);
    assert_eq!(builder.store().stats().unwrap().point_count, 80);
}

#[test]
fn test_duplicate_ids_in_source() {
    let config = ClusterConfig::default().with_zoom_range(0, 2);
    let builder = ClusterIndexBuilder::in_memory(config).unwrap();
    let report = builder
        .build(&mut VecSource::new(vec![
            GeoPoint::new(1, 10.0, 10.0),
            GeoPoint::new(1, 10.0, 10.0),
        ]))
        .unwrap();
    assert_eq!(report.events, 4);
    assert_eq!(report.new_memberships, 2);
    assert_eq!(builder.query().cluster("3").unwrap().size, 1);
}

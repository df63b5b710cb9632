//! In-memory backing store.
//!
//! Buckets live in a `DashMap`, so inserts into different buckets proceed in
//! parallel while each bucket is mutated under its shard lock. Reducers run
//! while holding the bucket's read guard, which makes the read-reduce atomic
//! with respect to concurrent inserts into that bucket.

use crate::compute::centroid::CentroidAccumulator;
use crate::error::{StoreError, StoreResult};
use crate::index::GeoIndex;
use crate::storage::{ClusterStore, ReducedBucket, Reducer, ReducerHandle, StoreStats};
use dashmap::DashMap;
use geo::{Point, Rect};
use parking_lot::{Mutex, RwLock};
use quadcluster_types::{BucketKey, ClusterAggregate, GeoPoint, PointId, QuadKey, Zoom};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

type IndexedPoint = GeomWithData<[f64; 2], PointId>;

pub struct MemoryStore {
    points: DashMap<PointId, GeoPoint>,
    /// Bounding queries over points go through this one lock.
    point_tree: Mutex<RTree<IndexedPoint>>,
    buckets: DashMap<BucketKey, FxHashSet<PointId>>,
    reducers: RwLock<FxHashMap<u64, Reducer>>,
    next_reducer_id: AtomicU64,
    geo_indexes: RwLock<BTreeMap<Zoom, GeoIndex>>,
    operations: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            points: DashMap::new(),
            point_tree: Mutex::new(RTree::new()),
            buckets: DashMap::new(),
            reducers: RwLock::new(FxHashMap::default()),
            next_reducer_id: AtomicU64::new(1),
            geo_indexes: RwLock::new(BTreeMap::new()),
            operations: AtomicU64::new(0),
        }
    }

    /// Copy of every aggregate, grouped by zoom.
    pub fn aggregates_by_zoom(&self) -> BTreeMap<Zoom, Vec<ClusterAggregate>> {
        self.geo_indexes
            .read()
            .iter()
            .map(|(zoom, index)| (*zoom, index.iter().cloned().collect()))
            .collect()
    }

    /// Replace the geo indexes wholesale, e.g. from a snapshot.
    pub fn restore_aggregates(&self, aggregates: BTreeMap<Zoom, Vec<ClusterAggregate>>) {
        let restored = aggregates
            .into_iter()
            .map(|(zoom, entries)| (zoom, GeoIndex::from_aggregates(zoom, entries)))
            .collect();
        *self.geo_indexes.write() = restored;
    }

    fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    fn reduce_centroid(&self, key: &BucketKey) -> StoreResult<ReducedBucket> {
        let Some(bucket) = self.buckets.get(key) else {
            return Ok(ReducedBucket::default());
        };

        let mut acc = CentroidAccumulator::new();
        for id in bucket.iter() {
            let point = self.points.get(id).ok_or_else(|| {
                StoreError::new(key, format!("member {} has no stored coordinates", id))
            })?;
            acc.add_point(&point);
        }

        Ok(match acc.centroid() {
            Some((longitude, latitude)) => ReducedBucket {
                longitude,
                latitude,
                size: acc.count(),
            },
            None => ReducedBucket::default(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStore for MemoryStore {
    fn put_point(&self, point: &GeoPoint) -> StoreResult<()> {
        let mut tree = self.point_tree.lock();
        let previous = self.points.insert(point.id, *point);

        if let Some(old) = previous
            && old.is_finite()
        {
            tree.remove(&IndexedPoint::new([old.longitude, old.latitude], old.id));
        }
        if point.is_finite() {
            tree.insert(IndexedPoint::new([point.longitude, point.latitude], point.id));
        } else {
            log::warn!(
                "point {} has non-finite coordinates, leaving it out of the bounding index",
                point.id
            );
        }
        drop(tree);

        self.record_operation();
        Ok(())
    }

    fn point(&self, id: PointId) -> StoreResult<Option<GeoPoint>> {
        Ok(self.points.get(&id).map(|p| *p))
    }

    fn point_count(&self) -> StoreResult<usize> {
        Ok(self.points.len())
    }

    fn points_within(&self, rect: &Rect) -> StoreResult<Vec<GeoPoint>> {
        let (min, max) = (rect.min(), rect.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            log::warn!("Rejecting bounding box query with non-finite coordinates");
            return Ok(Vec::new());
        }

        let envelope = AABB::from_corners([min.x, min.y], [max.x, max.y]);
        let ids: Vec<PointId> = {
            let tree = self.point_tree.lock();
            tree.locate_in_envelope(&envelope).map(|p| p.data).collect()
        };

        let mut points: Vec<GeoPoint> = ids
            .into_iter()
            .filter_map(|id| self.points.get(&id).map(|p| *p))
            .collect();
        points.sort_by_key(|p| p.id);
        Ok(points)
    }

    fn add_member(&self, key: &BucketKey, id: PointId) -> StoreResult<bool> {
        self.record_operation();
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return Ok(bucket.insert(id));
        }
        Ok(self.buckets.entry(key.clone()).or_default().insert(id))
    }

    fn members(&self, key: &BucketKey) -> StoreResult<Vec<PointId>> {
        let mut members: Vec<PointId> = self
            .buckets
            .get(key)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();
        Ok(members)
    }

    fn bucket_keys(&self) -> StoreResult<Vec<BucketKey>> {
        let mut keys: Vec<BucketKey> = self
            .buckets
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn load_reducer(&self, reducer: Reducer) -> StoreResult<ReducerHandle> {
        let id = self.next_reducer_id.fetch_add(1, Ordering::Relaxed);
        self.reducers.write().insert(id, reducer);
        log::debug!("registered reducer {:?} as #{}", reducer, id);
        Ok(ReducerHandle::new(id, reducer))
    }

    fn eval_reducer(&self, handle: &ReducerHandle, key: &BucketKey) -> StoreResult<ReducedBucket> {
        let reducer = self
            .reducers
            .read()
            .get(&handle.id())
            .copied()
            .ok_or_else(|| StoreError::new(key, format!("unknown reducer #{}", handle.id())))?;

        match reducer {
            Reducer::Centroid => self.reduce_centroid(key),
        }
    }

    fn geo_add(&self, zoom: Zoom, aggregate: &ClusterAggregate) -> StoreResult<()> {
        self.geo_indexes
            .write()
            .entry(zoom)
            .or_insert_with(|| GeoIndex::new(zoom))
            .insert(aggregate.clone());
        self.record_operation();
        Ok(())
    }

    fn aggregate(&self, zoom: Zoom, quadkey: &QuadKey) -> StoreResult<Option<ClusterAggregate>> {
        Ok(self
            .geo_indexes
            .read()
            .get(&zoom)
            .and_then(|index| index.get(quadkey).cloned()))
    }

    fn aggregates_with_prefix(
        &self,
        zoom: Zoom,
        prefix: &QuadKey,
    ) -> StoreResult<Vec<ClusterAggregate>> {
        Ok(self
            .geo_indexes
            .read()
            .get(&zoom)
            .map(|index| index.with_prefix(prefix))
            .unwrap_or_default())
    }

    fn aggregates_within_radius(
        &self,
        zoom: Zoom,
        center: &Point,
        radius_meters: f64,
        limit: usize,
    ) -> StoreResult<Vec<(ClusterAggregate, f64)>> {
        Ok(self
            .geo_indexes
            .read()
            .get(&zoom)
            .map(|index| index.within_radius(center, radius_meters, limit))
            .unwrap_or_default())
    }

    fn aggregates_in_rect(&self, zoom: Zoom, rect: &Rect) -> StoreResult<Vec<ClusterAggregate>> {
        Ok(self
            .geo_indexes
            .read()
            .get(&zoom)
            .map(|index| index.within_rect(rect))
            .unwrap_or_default())
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let membership_count = self.buckets.iter().map(|entry| entry.value().len()).sum();
        let bucket_count = self
            .buckets
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .count();
        let aggregate_count = self.geo_indexes.read().values().map(GeoIndex::len).sum();

        Ok(StoreStats {
            point_count: self.points.len(),
            bucket_count,
            membership_count,
            aggregate_count,
            operations_count: self.operations.load(Ordering::Relaxed),
        })
    }
}

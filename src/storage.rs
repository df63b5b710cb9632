//! Backing store abstraction for the cluster index.
//!
//! The builder never touches storage directly; it goes through the
//! [`ClusterStore`] primitives so a different backend (an external key-value
//! server, for instance) can be plugged in without changing the pipeline.
//! Every primitive takes `&self` and must be safe to call from many threads.

use crate::error::StoreResult;
use geo::{Point, Rect};
use quadcluster_types::{BucketKey, ClusterAggregate, GeoPoint, PointId, QuadKey, Zoom};
use serde::{Deserialize, Serialize};

pub mod memory;
#[cfg(feature = "snapshot")]
pub mod snapshot;

pub use memory::MemoryStore;
#[cfg(feature = "snapshot")]
pub use snapshot::{IndexSnapshot, SnapshotFile};

/// Server-side reductions a store can execute atomically over one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Mean longitude / latitude of the members plus their count.
    Centroid,
}

/// Handle to a reducer registered with a store. Obtained once at startup via
/// [`ClusterStore::load_reducer`] and passed to the aggregator explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReducerHandle {
    id: u64,
    reducer: Reducer,
}

impl ReducerHandle {
    pub fn new(id: u64, reducer: Reducer) -> Self {
        Self { id, reducer }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn reducer(&self) -> Reducer {
        self.reducer
    }
}

/// Result of reducing one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReducedBucket {
    pub longitude: f64,
    pub latitude: f64,
    pub size: u64,
}

impl ReducedBucket {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn into_aggregate(self, quadkey: QuadKey) -> ClusterAggregate {
        ClusterAggregate::new(quadkey, self.longitude, self.latitude, self.size)
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored point records
    pub point_count: usize,
    /// Number of non-empty buckets
    pub bucket_count: usize,
    /// Sum of all bucket sizes
    pub membership_count: usize,
    /// Aggregates across all zoom levels
    pub aggregate_count: usize,
    /// Number of mutating operations performed
    pub operations_count: u64,
}

/// Primitives the cluster index builder needs from a backing store.
pub trait ClusterStore: Send + Sync {
    /// Store (or replace) a point record.
    fn put_point(&self, point: &GeoPoint) -> StoreResult<()>;

    fn point(&self, id: PointId) -> StoreResult<Option<GeoPoint>>;

    fn point_count(&self) -> StoreResult<usize>;

    /// Stored points inside `rect` (inclusive), ordered by id.
    fn points_within(&self, rect: &Rect) -> StoreResult<Vec<GeoPoint>>;

    /// Add `id` to the bucket at `key`, creating the bucket on first insert.
    /// Idempotent and atomic per key; returns whether `id` was new.
    fn add_member(&self, key: &BucketKey, id: PointId) -> StoreResult<bool>;

    /// Members of a bucket, ordered by id. Unknown buckets are empty.
    fn members(&self, key: &BucketKey) -> StoreResult<Vec<PointId>>;

    /// Every bucket key that holds at least one member.
    fn bucket_keys(&self) -> StoreResult<Vec<BucketKey>>;

    /// Register a reducer and return the handle used to evaluate it.
    fn load_reducer(&self, reducer: Reducer) -> StoreResult<ReducerHandle>;

    /// Run a registered reducer over one bucket as a single atomic read.
    /// An unknown bucket reduces to an empty result.
    fn eval_reducer(&self, handle: &ReducerHandle, key: &BucketKey) -> StoreResult<ReducedBucket>;

    /// Insert or replace an aggregate in the geo index of `zoom`.
    fn geo_add(&self, zoom: Zoom, aggregate: &ClusterAggregate) -> StoreResult<()>;

    fn aggregate(&self, zoom: Zoom, quadkey: &QuadKey) -> StoreResult<Option<ClusterAggregate>>;

    /// Aggregates of `zoom` whose quadkey starts with `prefix`.
    fn aggregates_with_prefix(
        &self,
        zoom: Zoom,
        prefix: &QuadKey,
    ) -> StoreResult<Vec<ClusterAggregate>>;

    fn aggregates_within_radius(
        &self,
        zoom: Zoom,
        center: &Point,
        radius_meters: f64,
        limit: usize,
    ) -> StoreResult<Vec<(ClusterAggregate, f64)>>;

    fn aggregates_in_rect(&self, zoom: Zoom, rect: &Rect) -> StoreResult<Vec<ClusterAggregate>>;

    fn stats(&self) -> StoreResult<StoreStats>;
}

//! Reduction of buckets into per-zoom cluster aggregates.
//!
//! Keys are processed deepest zoom first. Within a zoom the buckets are
//! independent and are reduced in parallel on the rayon pool; each reduction
//! is a single atomic read of the bucket on the store side.

use crate::compute::centroid::CentroidAccumulator;
use crate::config::AggregationStrategy;
use crate::error::{ClusterError, Phase, Result};
use crate::storage::{ClusterStore, ReducerHandle};
use quadcluster_types::{BucketKey, ClusterAggregate, QuadKey, Zoom};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Sort keys into processing order: longest quadkey first, then
/// lexicographic.
pub fn sort_for_processing(keys: &mut [BucketKey]) {
    keys.sort_by(|a, b| {
        b.quadkey
            .len()
            .cmp(&a.quadkey.len())
            .then_with(|| a.quadkey.cmp(&b.quadkey))
    });
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Reducer registered with the store at startup
    pub reducer: ReducerHandle,
    pub strategy: AggregationStrategy,
    /// Log progress every this many buckets
    pub progress_interval: usize,
}

impl AggregatorConfig {
    pub fn new(reducer: ReducerHandle) -> Self {
        Self {
            reducer,
            strategy: AggregationStrategy::default(),
            progress_interval: 500,
        }
    }

    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }
}

/// Outcome of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    /// Aggregates written per zoom
    pub per_zoom: BTreeMap<Zoom, usize>,
    /// Buckets reduced by the store
    pub reduced: usize,
    /// Buckets combined from their children's aggregates
    pub combined: usize,
    pub elapsed: Duration,
}

impl AggregationReport {
    pub fn total(&self) -> usize {
        self.per_zoom.values().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Reduced,
    Combined,
}

pub struct Aggregator<'a, S: ClusterStore + ?Sized> {
    store: &'a S,
    config: AggregatorConfig,
}

impl<'a, S> Aggregator<'a, S>
where
    S: ClusterStore + ?Sized,
{
    pub fn new(store: &'a S, config: AggregatorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Reduce every key and write the result into the geo index of its zoom.
    ///
    /// With [`AggregationStrategy::BottomUp`] a bucket whose children were
    /// aggregated in the same run is combined from them instead of being
    /// reduced again. That is only exact when `keys` holds every non-empty
    /// bucket in the store, so callers pass the full key set in that mode.
    pub fn run<I>(&self, keys: I) -> Result<AggregationReport>
    where
        I: IntoIterator<Item = BucketKey>,
    {
        let started = Instant::now();
        let mut keys: Vec<BucketKey> = keys.into_iter().collect();
        sort_for_processing(&mut keys);
        keys.dedup();

        let total = keys.len();
        let processed = AtomicUsize::new(0);
        let interval = self.config.progress_interval.max(1);
        log::info!(
            "aggregation: {} buckets, strategy {:?}",
            total,
            self.config.strategy
        );

        let mut report = AggregationReport::default();
        let mut previous: FxHashMap<QuadKey, ClusterAggregate> = FxHashMap::default();
        let mut previous_zoom: Option<Zoom> = None;

        for level in keys.chunk_by(|a, b| a.zoom == b.zoom) {
            let zoom = level[0].zoom;
            let children = match self.config.strategy {
                AggregationStrategy::BottomUp if previous_zoom == zoom.checked_add(1) => {
                    Some(&previous)
                }
                _ => None,
            };

            let results: Vec<(ClusterAggregate, Origin)> = level
                .par_iter()
                .map(|key| -> Result<(ClusterAggregate, Origin)> {
                    let (aggregate, origin) = self.aggregate_one(key, children)?;
                    self.store
                        .geo_add(zoom, &aggregate)
                        .map_err(|e| e.in_phase(Phase::Aggregation))?;

                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % interval == 0 || done == total {
                        log::debug!("aggregation: processed {} of {} buckets", done, total);
                    }
                    Ok((aggregate, origin))
                })
                .collect::<Result<_>>()?;

            let combined = results
                .iter()
                .filter(|(_, origin)| *origin == Origin::Combined)
                .count();
            report.combined += combined;
            report.reduced += results.len() - combined;
            report.per_zoom.insert(zoom, results.len());
            log::debug!("aggregation: zoom {} done, {} aggregates", zoom, results.len());

            if self.config.strategy == AggregationStrategy::BottomUp {
                previous = results
                    .into_iter()
                    .map(|(aggregate, _)| (aggregate.quadkey.clone(), aggregate))
                    .collect();
                previous_zoom = Some(zoom);
            }
        }

        report.elapsed = started.elapsed();
        log::info!(
            "aggregation: done in {:?}: {} aggregates ({} reduced, {} combined)",
            report.elapsed,
            report.total(),
            report.reduced,
            report.combined
        );
        Ok(report)
    }

    fn aggregate_one(
        &self,
        key: &BucketKey,
        children: Option<&FxHashMap<QuadKey, ClusterAggregate>>,
    ) -> Result<(ClusterAggregate, Origin)> {
        if let Some(children) = children {
            let mut acc = CentroidAccumulator::new();
            for child in key.quadkey.children() {
                if let Some(aggregate) = children.get(&child) {
                    acc.add_aggregate(aggregate);
                }
            }
            if let Some(aggregate) = acc.finish(key.quadkey.clone()) {
                return Ok((aggregate, Origin::Combined));
            }
        }

        let reduced = self
            .store
            .eval_reducer(&self.config.reducer, key)
            .map_err(|e| e.in_phase(Phase::Aggregation))?;
        if reduced.is_empty() {
            log::error!("aggregation: bucket {} has no members", key);
            return Err(ClusterError::InvariantViolation {
                key: key.to_string(),
            });
        }
        Ok((reduced.into_aggregate(key.quadkey.clone()), Origin::Reduced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::partition;
    use crate::storage::{MemoryStore, Reducer};
    use quadcluster_types::GeoPoint;

    fn key(zoom: Zoom, quadkey: &str) -> BucketKey {
        BucketKey::new(zoom, QuadKey::parse(quadkey).unwrap())
    }

    fn aggregator(store: &MemoryStore, strategy: AggregationStrategy) -> Aggregator<'_, MemoryStore> {
        let handle = store.load_reducer(Reducer::Centroid).unwrap();
        Aggregator::new(store, AggregatorConfig::new(handle).with_strategy(strategy))
    }

    #[test]
    fn test_processing_order() {
        let mut keys = vec![key(0, "1"), key(2, "301"), key(1, "30"), key(2, "123"), key(0, "0")];
        sort_for_processing(&mut keys);
        let order: Vec<&str> = keys.iter().map(|k| k.quadkey.as_str()).collect();
        assert_eq!(order, vec!["123", "301", "30", "0", "1"]);
    }

    #[test]
    fn test_centroid_of_three_points() {
        let store = MemoryStore::new();
        let bucket = key(1, "30");
        for (id, lon, lat) in [(1, 0.0, 0.0), (2, 2.0, 0.0), (3, 1.0, 3.0)] {
            store.put_point(&GeoPoint::new(id, lon, lat)).unwrap();
            store.add_member(&bucket, id).unwrap();
        }

        let report = aggregator(&store, AggregationStrategy::FullReduction)
            .run(vec![bucket.clone()])
            .unwrap();
        assert_eq!(report.total(), 1);
        assert_eq!(report.reduced, 1);

        let aggregate = store.aggregate(1, &bucket.quadkey).unwrap().unwrap();
        assert!((aggregate.longitude - 1.0).abs() < 1e-12);
        assert!((aggregate.latitude - 1.0).abs() < 1e-12);
        assert_eq!(aggregate.size, 3);
    }

    #[test]
    fn test_empty_bucket_is_invariant_violation() {
        let store = MemoryStore::new();
        let err = aggregator(&store, AggregationStrategy::FullReduction)
            .run(vec![key(2, "012")])
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvariantViolation { .. }));
    }

    #[test]
    fn test_unknown_reducer_is_store_failure() {
        let store = MemoryStore::new();
        let bucket = key(0, "3");
        store.put_point(&GeoPoint::new(1, 10.0, 10.0)).unwrap();
        store.add_member(&bucket, 1).unwrap();

        let config = AggregatorConfig::new(ReducerHandle::new(999, Reducer::Centroid));
        let err = Aggregator::new(&store, config).run(vec![bucket]).unwrap_err();
        assert!(matches!(
            err,
            ClusterError::StoreIo {
                phase: Phase::Aggregation,
                ..
            }
        ));
    }

    #[test]
    fn test_strategies_agree() {
        let points: Vec<GeoPoint> = (0..300u64)
            .map(|i| {
                let lon = ((i * 37) % 360) as f64 - 179.5;
                let lat = ((i * 53) % 170) as f64 - 84.5;
                GeoPoint::new(i, lon, lat)
            })
            .collect();
        let config = ClusterConfig::default().with_zoom_range(1, 6).with_workers(3);

        let full = MemoryStore::new();
        let bottom_up = MemoryStore::new();
        for store in [&full, &bottom_up] {
            for point in &points {
                store.put_point(point).unwrap();
            }
        }

        let observed = partition::assign(&full, &points, &config).unwrap().observed;
        let full_report = aggregator(&full, AggregationStrategy::FullReduction)
            .run(observed)
            .unwrap();

        partition::assign(&bottom_up, &points, &config).unwrap();
        let keys = bottom_up.bucket_keys().unwrap();
        let bottom_report = aggregator(&bottom_up, AggregationStrategy::BottomUp)
            .run(keys)
            .unwrap();

        assert_eq!(full_report.per_zoom, bottom_report.per_zoom);
        assert_eq!(full_report.combined, 0);
        assert_eq!(bottom_report.reduced, *bottom_report.per_zoom.get(&5).unwrap());

        let expected = full.aggregates_by_zoom();
        let actual = bottom_up.aggregates_by_zoom();
        assert_eq!(expected.len(), actual.len());
        for (zoom, aggregates) in &expected {
            let others = &actual[zoom];
            assert_eq!(aggregates.len(), others.len());
            for (a, b) in aggregates.iter().zip(others) {
                assert_eq!(a.quadkey, b.quadkey);
                assert_eq!(a.size, b.size);
                assert!((a.longitude - b.longitude).abs() < 1e-9);
                assert!((a.latitude - b.latitude).abs() < 1e-9);
            }
        }
    }
}

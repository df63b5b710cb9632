//! Driver for a full build run.
//!
//! A run has three phases separated by full barriers:
//!
//! 1. **load**: read the source once and copy every point into the store;
//! 2. **assignment**: the worker pool records bucket memberships;
//! 3. **aggregation**: every bucket is reduced into its zoom's geo index.
//!
//! Any store failure aborts the run with [`ClusterError::StoreIo`] naming the
//! phase and key. Rerunning from scratch is always safe because membership
//! inserts are idempotent and aggregates are overwritten.

use crate::aggregate::{AggregationReport, Aggregator, AggregatorConfig};
use crate::config::{AggregationStrategy, ClusterConfig};
use crate::error::{Phase, Result};
use crate::partition::{self, AssignmentReport};
use crate::query::ClusterQuery;
use crate::source::PointSource;
use crate::storage::{ClusterStore, MemoryStore, Reducer, ReducerHandle};
use quadcluster_types::{BucketKey, GeoPoint, Zoom};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary of a completed build run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub points: usize,
    pub events: u64,
    pub new_memberships: u64,
    /// Distinct buckets touched by the assignment phase
    pub buckets: usize,
    /// Aggregates written per zoom
    pub aggregates: BTreeMap<Zoom, usize>,
    pub load_time: Duration,
    pub assignment_time: Duration,
    pub aggregation_time: Duration,
}

impl BuildReport {
    pub fn total_aggregates(&self) -> usize {
        self.aggregates.values().sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.load_time + self.assignment_time + self.aggregation_time
    }
}

/// Builds the cluster index into a backing store.
///
/// # Examples
///
/// ```
/// use quadcluster::{ClusterConfig, ClusterIndexBuilder, VecSource};
/// use quadcluster_types::GeoPoint;
///
/// let builder = ClusterIndexBuilder::in_memory(ClusterConfig::default().with_zoom_range(2, 6))?;
/// let mut source = VecSource::new(vec![
///     GeoPoint::new(1, 37.61776, 55.75577),
///     GeoPoint::new(2, 37.62, 55.75),
/// ]);
/// let report = builder.build(&mut source)?;
/// assert_eq!(report.points, 2);
///
/// let cluster = builder.query().cluster("32031")?;
/// assert_eq!(cluster.size, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ClusterIndexBuilder<S: ClusterStore + ?Sized = MemoryStore> {
    store: Arc<S>,
    config: ClusterConfig,
    reducer: ReducerHandle,
}

impl ClusterIndexBuilder<MemoryStore> {
    /// Builder over a fresh [`MemoryStore`].
    pub fn in_memory(config: ClusterConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::new()), config)
    }
}

impl<S> ClusterIndexBuilder<S>
where
    S: ClusterStore + ?Sized,
{
    /// Validate `config` and register the centroid reducer with `store`.
    pub fn new(store: Arc<S>, config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let reducer = store
            .load_reducer(Reducer::Centroid)
            .map_err(|e| e.in_phase(Phase::Load))?;
        log::info!(
            "cluster builder ready: zooms {}..{}, {} workers, strategy {:?}",
            config.min_zoom,
            config.max_zoom,
            config.workers,
            config.strategy
        );
        Ok(Self {
            store,
            config,
            reducer,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn reducer(&self) -> &ReducerHandle {
        &self.reducer
    }

    pub fn query(&self) -> ClusterQuery<'_, S> {
        ClusterQuery::new(self.store.as_ref(), &self.config)
    }

    /// Read the source and copy every point into the store.
    pub fn load<P>(&self, source: &mut P) -> Result<Vec<GeoPoint>>
    where
        P: PointSource + ?Sized,
    {
        let mut points = Vec::with_capacity(source.len_hint().unwrap_or(0));
        for point in source.points() {
            let point = point?;
            self.store
                .put_point(&point)
                .map_err(|e| e.in_phase(Phase::Load))?;
            points.push(point);
            if points.len() % self.config.progress_interval == 0 {
                log::debug!("load: {} points stored", points.len());
            }
        }
        log::info!("load: {} points stored", points.len());
        Ok(points)
    }

    pub fn assign(&self, points: &[GeoPoint]) -> Result<AssignmentReport> {
        partition::assign(self.store.as_ref(), points, &self.config)
    }

    /// Aggregate the given bucket keys.
    pub fn aggregate<I>(&self, keys: I) -> Result<AggregationReport>
    where
        I: IntoIterator<Item = BucketKey>,
    {
        let config = AggregatorConfig::new(self.reducer.clone())
            .with_strategy(self.config.strategy)
            .with_progress_interval(self.config.progress_interval);
        Aggregator::new(self.store.as_ref(), config).run(keys)
    }

    /// Run all three phases.
    ///
    /// Full reduction aggregates only the buckets this run touched. Bottom-up
    /// aggregation needs complete child sets and therefore covers every bucket
    /// in the store.
    pub fn build<P>(&self, source: &mut P) -> Result<BuildReport>
    where
        P: PointSource + ?Sized,
    {
        let started = Instant::now();
        let points = self.load(source)?;
        let load_time = started.elapsed();

        let assignment = self.assign(&points)?;
        let buckets = assignment.observed.len();

        let aggregation = match self.config.strategy {
            AggregationStrategy::FullReduction => self.aggregate(assignment.observed)?,
            AggregationStrategy::BottomUp => {
                let keys = self
                    .store
                    .bucket_keys()
                    .map_err(|e| e.in_phase(Phase::Aggregation))?;
                self.aggregate(keys)?
            }
        };

        let report = BuildReport {
            points: points.len(),
            events: assignment.events,
            new_memberships: assignment.new_memberships,
            buckets,
            aggregates: aggregation.per_zoom,
            load_time,
            assignment_time: assignment.elapsed,
            aggregation_time: aggregation.elapsed,
        };
        log::info!(
            "build finished in {:?}: {} points, {} buckets, {} aggregates",
            report.elapsed(),
            report.points,
            report.buckets,
            report.total_aggregates()
        );
        Ok(report)
    }
}

//! Concurrent assignment of points to their per-zoom buckets.
//!
//! ```text
//!  dispatcher ──round robin──▶ worker 0 ──▶ ┐
//!             ──────────────▶ worker 1 ──▶ ├─ merge ──▶ consumer ──▶ store.add_member
//!             ──────────────▶ worker N ──▶ ┘
//! ```
//!
//! Every queue is bounded, so a slow consumer throttles the workers and the
//! workers throttle the dispatcher. The consumer is the only writer of
//! bucket membership. If it fails, it drops the merged queue and every
//! upstream stage unwinds on its next send.

mod merge;
mod worker;

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Phase, Result};
use crate::storage::ClusterStore;
use crossbeam::channel::{Receiver, bounded};
use quadcluster_types::{BucketKey, GeoPoint, PointId, QuadKey, Zoom};
use rustc_hash::FxHashSet;
use std::thread;
use std::time::{Duration, Instant};
use worker::WorkerSettings;

/// "Point `point_id` belongs to the bucket (`zoom`, `quadkey`)."
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MembershipEvent {
    pub zoom: Zoom,
    pub quadkey: QuadKey,
    pub point_id: PointId,
}

/// Outcome of one assignment run.
#[derive(Debug, Clone, Default)]
pub struct AssignmentReport {
    /// Points handed to the worker pool
    pub points: usize,
    /// Membership events applied by the consumer
    pub events: u64,
    /// Events that added a member that was not already present
    pub new_memberships: u64,
    /// Every bucket key the run touched
    pub observed: FxHashSet<BucketKey>,
    pub elapsed: Duration,
}

impl AssignmentReport {
    /// Observed keys in processing order: deepest zoom first, then
    /// lexicographic by quadkey.
    pub fn sorted_keys(&self) -> Vec<BucketKey> {
        let mut keys: Vec<BucketKey> = self.observed.iter().cloned().collect();
        crate::aggregate::sort_for_processing(&mut keys);
        keys
    }
}

struct ConsumerTally {
    events: u64,
    new_memberships: u64,
    observed: FxHashSet<BucketKey>,
}

/// Assign every point to one bucket per zoom in `[min_zoom, max_zoom)` and
/// record the memberships in `store`.
///
/// Points are shared with the workers by reference. Membership inserts are
/// idempotent, so re-running over the same points leaves the store unchanged.
pub fn assign<S>(store: &S, points: &[GeoPoint], config: &ClusterConfig) -> Result<AssignmentReport>
where
    S: ClusterStore + ?Sized,
{
    config.validate()?;

    let started = Instant::now();
    let workers = config.workers;
    let settings = WorkerSettings {
        bounds: config.bounds,
        min_zoom: config.min_zoom,
        max_zoom: config.max_zoom,
    };
    let expected_events = (points.len() as u64).saturating_mul(config.zoom_levels() as u64);

    log::info!(
        "assignment: {} points, {} workers, zooms {}..{}",
        points.len(),
        workers,
        config.min_zoom,
        config.max_zoom
    );

    let (tally, emitted) = thread::scope(|scope| -> Result<(ConsumerTally, u64)> {
        let mut inputs = Vec::with_capacity(workers);
        let mut outputs = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers {
            let (in_tx, in_rx) = bounded::<&GeoPoint>(config.queue_capacity);
            let (out_tx, out_rx) = bounded(config.queue_capacity);
            handles.push(scope.spawn(move || worker::run_worker(id, in_rx, out_tx, settings)));
            inputs.push(in_tx);
            outputs.push(out_rx);
        }
        log::debug!("assignment: {} workers started", workers);

        let merged = merge::merge(scope, outputs, config.merged_capacity());
        let interval = config.progress_interval as u64;
        let consumer = scope.spawn(move || consume(store, merged, expected_events, interval));

        let mut dispatched = 0usize;
        for (index, point) in points.iter().enumerate() {
            let slot = index % workers;
            if inputs[slot].send(point).is_err() {
                log::warn!(
                    "assignment: worker {} stopped accepting points after {} dispatched",
                    slot,
                    dispatched
                );
                break;
            }
            dispatched += 1;
        }
        drop(inputs);
        log::debug!("assignment: dispatched {} points, input queues closed", dispatched);

        let tally = consumer.join().map_err(|_| ClusterError::WorkerPanicked {
            phase: Phase::Assignment,
            worker: workers,
        })??;

        let mut emitted = 0u64;
        for (id, handle) in handles.into_iter().enumerate() {
            emitted += handle.join().map_err(|_| ClusterError::WorkerPanicked {
                phase: Phase::Assignment,
                worker: id,
            })?;
        }
        Ok((tally, emitted))
    })?;

    debug_assert_eq!(emitted, tally.events);

    let report = AssignmentReport {
        points: points.len(),
        events: tally.events,
        new_memberships: tally.new_memberships,
        observed: tally.observed,
        elapsed: started.elapsed(),
    };
    log::info!(
        "assignment: done in {:?}: {} events, {} new memberships, {} buckets",
        report.elapsed,
        report.events,
        report.new_memberships,
        report.observed.len()
    );
    Ok(report)
}

fn consume<S>(
    store: &S,
    events: Receiver<MembershipEvent>,
    expected: u64,
    interval: u64,
) -> Result<ConsumerTally>
where
    S: ClusterStore + ?Sized,
{
    let mut tally = ConsumerTally {
        events: 0,
        new_memberships: 0,
        observed: FxHashSet::default(),
    };
    let mut last_percent = 0u64;

    for event in events.iter() {
        let key = BucketKey::new(event.zoom, event.quadkey);
        match store.add_member(&key, event.point_id) {
            Ok(true) => tally.new_memberships += 1,
            Ok(false) => {}
            Err(err) => {
                log::error!("assignment: consumer stopping: {}", err);
                return Err(err.in_phase(Phase::Assignment));
            }
        }
        tally.observed.insert(key);
        tally.events += 1;

        let percent = if expected == 0 { 100 } else { tally.events * 100 / expected };
        if (interval > 0 && tally.events % interval == 0) || percent > last_percent {
            log::debug!(
                "assignment: processed {} of {} events ({}%)",
                tally.events,
                expected,
                percent
            );
            last_percent = percent;
        }
    }

    Ok(tally)
}

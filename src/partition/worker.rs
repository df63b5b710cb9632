//! Partition workers.
//!
//! Each worker owns one bounded input queue of points and one bounded output
//! queue of membership events. A point walks the encoder once from the root
//! to `max_zoom - 1`, emitting an event for every zoom from `min_zoom` on.

use crate::compute::quadkey::BucketPath;
use crate::partition::MembershipEvent;
use crossbeam::channel::{Receiver, Sender};
use quadcluster_types::{Bounds, GeoPoint, Zoom};

#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerSettings {
    pub bounds: Bounds,
    pub min_zoom: Zoom,
    pub max_zoom: Zoom,
}

/// Drain `input` until it closes, returning the number of events emitted.
/// Stops early when the output queue has been disconnected downstream.
pub(crate) fn run_worker(
    id: usize,
    input: Receiver<&GeoPoint>,
    output: Sender<MembershipEvent>,
    settings: WorkerSettings,
) -> u64 {
    log::debug!("assignment: worker {} waiting for points", id);

    let mut emitted = 0u64;
    let mut points = 0usize;
    for point in input.iter() {
        points += 1;
        let path = BucketPath::new(point, settings.bounds, settings.min_zoom, settings.max_zoom);
        for bucket in path {
            let event = MembershipEvent {
                zoom: bucket.zoom,
                quadkey: bucket.quadkey,
                point_id: point.id,
            };
            if output.send(event).is_err() {
                log::debug!(
                    "assignment: worker {} output closed after {} events, stopping",
                    id,
                    emitted
                );
                return emitted;
            }
            emitted += 1;
        }
    }

    log::debug!(
        "assignment: worker {} finished: {} points, {} events",
        id,
        points,
        emitted
    );
    emitted
}

//! Fan-in of the per-worker output queues.
//!
//! One reader thread per input forwards into a shared bounded queue. A
//! completion thread waits on a wait group that every reader holds, and only
//! then drops the last sender, closing the shared queue once every input has
//! been drained.

use crossbeam::channel::{Receiver, bounded};
use crossbeam::sync::WaitGroup;
use std::thread::Scope;

pub(crate) fn merge<'scope, 'env, T>(
    scope: &'scope Scope<'scope, 'env>,
    inputs: Vec<Receiver<T>>,
    capacity: usize,
) -> Receiver<T>
where
    T: Send + 'scope,
{
    let (tx, rx) = bounded(capacity);
    let wg = WaitGroup::new();

    for (index, input) in inputs.into_iter().enumerate() {
        let tx = tx.clone();
        let wg = wg.clone();
        scope.spawn(move || {
            let mut forwarded = 0u64;
            for item in input.iter() {
                if tx.send(item).is_err() {
                    log::debug!("merge: reader {} lost its consumer", index);
                    break;
                }
                forwarded += 1;
            }
            log::trace!("merge: reader {} done after {} items", index, forwarded);
            drop(wg);
        });
        log::debug!("merge: started reader {}", index);
    }

    scope.spawn(move || {
        wg.wait();
        drop(tx);
        log::debug!("merge: all readers finished, output closed");
    });

    rx
}

//! Background thread that closes connections left idle for too long.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, trace};

use crate::connection::Connector;
use crate::pool::Shared;

/// Scanner main loop. Sweeps once per `max_idle_secs` until the shutdown
/// channel is signalled or disconnected.
pub(crate) fn run<C: Connector>(shared: Arc<Shared<C>>, shutdown: Receiver<()>) {
    let interval = shared.config.max_idle_time();
    debug!("Scanner: starting with a {:?} interval", interval);

    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let evicted = sweep(&shared);
                if evicted > 0 {
                    debug!("Scanner: evicted {} idle connections", evicted);
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Scanner: stopped");
}

/// Evict expired connections from the front of the idle set, never taking
/// the live count below `min_size`. Returns the number evicted.
///
/// The idle set is ordered by return time, so the sweep stops at the first
/// connection that has not expired.
pub(crate) fn sweep<C: Connector>(shared: &Shared<C>) -> usize {
    let max_idle_time = shared.config.max_idle_time();

    let evicted: Vec<_> = {
        let mut state = shared.state.lock();
        let mut evicted = Vec::new();

        while shared.live.load(Ordering::SeqCst) > shared.config.min_size {
            let expired = state
                .idle
                .front()
                .is_some_and(|res| res.is_idle_timeout(max_idle_time));
            if !expired {
                break;
            }

            if let Some(res) = state.idle.pop_front() {
                shared.live.fetch_sub(1, Ordering::SeqCst);
                evicted.push(res);
            }
        }

        evicted
    };

    let count = evicted.len();
    for res in evicted {
        trace!(
            "Scanner: closing connection {} idle for {:?}",
            res.id(),
            res.idle_for()
        );
        shared.destroy(res);
    }

    count
}

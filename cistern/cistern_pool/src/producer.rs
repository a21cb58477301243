//! Background thread that opens connections when consumers drain the pool.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::connection::Connector;
use crate::pool::Shared;
use crate::resource::Resource;

/// Producer main loop. Returns once the pool is shut down.
///
/// The thread parks on `need_create` until a consumer raises demand with the
/// idle set empty. Each cycle consumes the demand, opens at most one
/// connection if the pool is below `max_size`, then wakes every waiting
/// consumer so they can re-check the idle set. At capacity it goes straight
/// back to waiting.
pub(crate) fn run<C: Connector>(shared: Arc<Shared<C>>) {
    debug!("Producer: starting");

    loop {
        {
            let mut state = shared.state.lock();
            while !state.shut_down && !(state.demand && state.idle.is_empty()) {
                shared.need_create.wait(&mut state);
            }
            if state.shut_down {
                break;
            }
            state.demand = false;

            let live = shared.live.load(Ordering::SeqCst);
            if live >= shared.config.max_size {
                // Waiters are woken by the next release or discard
                drop(state);
                trace!("Producer: pool at capacity ({} live), not growing", live);
                continue;
            }
        }

        // Only this thread grows the live count, so the capacity check above
        // still holds once the connect returns.
        match shared.connector.connect(&shared.config) {
            Ok(conn) => {
                let mut res = Resource::new(conn);
                let mut state = shared.state.lock();
                if state.shut_down {
                    drop(state);
                    shared.destroy(res);
                    break;
                }

                res.refresh_idle();
                let id = res.id();
                state.idle.push_back(res);
                let live = shared.live.fetch_add(1, Ordering::SeqCst) + 1;
                drop(state);

                shared.created.fetch_add(1, Ordering::Relaxed);
                debug!("Producer: opened connection {} ({} live)", id, live);
            }
            Err(e) => warn!("Producer: failed to open connection: {}", e),
        }

        shared.available.notify_all();
    }

    debug!("Producer: stopped");
}

//! The background half of ARP resolution: a thread per router that fires
//! [`Router::arp_tick`] once per second until told to stop.

use crate::router::Router;
use crate::sink::FrameSink;
use crossbeam::channel::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::error;

/// Handle to a running ARP worker. The worker observes shutdown between
/// ticks; nothing is transmitted at teardown.
pub struct ArpWorker {
    shutdown: Sender<()>,
    thread: JoinHandle<()>,
}

impl ArpWorker {
    /// Spawns the once-per-second retry/expiry loop for `router`.
    pub fn spawn<S>(router: Arc<Router<S>>) -> ArpWorker
    where
        S: FrameSink + Send + Sync + 'static,
    {
        ArpWorker::spawn_with_period(router, Duration::from_secs(1))
    }

    /// `spawn` with a custom tick period, so tests do not wait wall-clock
    /// seconds for worker activity.
    pub fn spawn_with_period<S>(router: Arc<Router<S>>, period: Duration) -> ArpWorker
    where
        S: FrameSink + Send + Sync + 'static,
    {
        let (shutdown_sender, shutdown_receiver) = channel::bounded::<()>(1);
        let thread = thread::spawn(move || {
            let ticker = channel::tick(period);
            loop {
                crossbeam::select! {
                    recv(ticker) -> _ => {
                        if let Err(err) = router.arp_tick() {
                            // Only invariant violations come back here; the
                            // embedder decides process policy, we stop ticking.
                            error!(error = %err, "ARP worker stopping");
                            return;
                        }
                    }
                    recv(shutdown_receiver) -> _ => return,
                }
            }
        });
        ArpWorker {
            shutdown: shutdown_sender,
            thread,
        }
    }

    /// Signals the worker and waits for it to finish its current tick.
    pub fn shutdown(self) {
        // The worker may already have stopped on its own; either way the
        // join below observes it gone.
        let _ = self.shutdown.send(());
        let _ = self.thread.join();
    }
}

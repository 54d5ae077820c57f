//! Operator requested stops.
//!
//! A stop is cooperative: the scheduler checks it before starting each match and the session
//! driver checks it before each poll. A plain stop lets running matches finish; an abort also
//! cancels them between two engine steps.

use std::{
    io::BufRead,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use tracing::{info, warn};

const RUNNING: u8 = 0;
const STOP: u8 = 1;
const ABORT: u8 = 2;

/// Cheap to clone; all clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    state: Arc<AtomicU8>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish in-flight matches, start no new one.
    pub fn request_stop(&self) {
        let _ = self
            .state
            .compare_exchange(RUNNING, STOP, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Also cancel in-flight matches at their next poll.
    pub fn request_abort(&self) {
        self.state.store(ABORT, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    pub fn is_abort_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) == ABORT
    }

    /// Request a stop when the operator presses Enter. A second Enter aborts.
    pub fn watch_stdin(&self) {
        let signal = self.clone();
        let spawned = std::thread::Builder::new()
            .name("stop-watcher".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    if line.is_err() {
                        break;
                    }
                    if signal.is_stop_requested() {
                        warn!("abort requested by operator");
                        signal.request_abort();
                        break;
                    }
                    info!("stop requested by operator, finishing running matches");
                    signal.request_stop();
                }
            });
        if let Err(e) = spawned {
            warn!("could not watch stdin for stop requests: {e}");
        }
    }
}

//! Suspension points of the monitor loop.
//!
//! The loop only ever waits through a [`Pacer`], so a stop request can cut a
//! poll wait or a flash sequence short, and tests can run without sleeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const STOP_CHECK_SLICE_MS: u64 = 50;

pub trait Pacer {
    /// Waits for `duration`. Returns `false` if a stop was requested, in which
    /// case the caller abandons whatever sequence it was running.
    fn pause(&mut self, duration: Duration) -> bool;

    fn stop_requested(&self) -> bool;
}

/// Shared stop flag, set from the signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn as_atomic(&self) -> &Arc<AtomicBool> {
        &self.0
    }
}

/// Real-time pacer that sleeps in short slices and wakes early on stop.
#[derive(Debug, Clone)]
pub struct SleepPacer {
    stop: StopFlag,
    slice: Duration,
}

impl SleepPacer {
    pub fn new(stop: StopFlag) -> Self {
        Self {
            stop,
            slice: Duration::from_millis(STOP_CHECK_SLICE_MS),
        }
    }
}

impl Pacer for SleepPacer {
    fn pause(&mut self, duration: Duration) -> bool {
        // None: too far out to represent, wait for a stop instead
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.stop.is_set() {
                return false;
            }
            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => return true,
                Some(deadline) => deadline - now,
                None => self.slice,
            };
            thread::sleep(self.slice.min(remaining));
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.is_set()
    }
}

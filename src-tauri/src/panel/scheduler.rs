//! Detection scheduling
//!
//! A fixed-interval timer task that starts one detection tick per period.
//! Ticks run as their own tasks so cancelling the timer never interrupts an
//! inference mid-flight. A shared busy flag makes overlapping ticks skip
//! instead of queueing.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Set while a detection tick is outstanding
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` if a tick already holds it
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self.0.clone()))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the busy flag when dropped
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the running detection timer
#[derive(Debug)]
pub struct DetectionLoop {
    handle: JoinHandle<()>,
}

impl DetectionLoop {
    /// Start the timer; the first tick fires one period from now
    pub fn spawn<F, Fut>(period: Duration, busy: BusyFlag, tick: F) -> Self
    where
        F: Fn(BusyGuard) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                match busy.try_acquire() {
                    Some(guard) => {
                        tokio::spawn(tick(guard));
                    }
                    None => tracing::debug!("Previous detection still running, skipping tick"),
                }
            }
        });

        Self { handle }
    }

    /// Stop the timer; a tick already started runs to completion
    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

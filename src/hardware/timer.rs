//! Thread-driven periodic timer.
//!
//! [`ThreadTimer`] stands in for a hardware timer edge (e.g. a PWM output looped back
//! into an edge-triggered input) on hosts without one. A dedicated OS thread sleeps
//! until each deadline and invokes the callback directly, so the callback never waits
//! behind async tasks.
//!
//! # Latency
//!
//! Deadlines are absolute (`start + n * period`), so jitter does not accumulate. Each
//! edge still fires late by the OS wake-up latency, typically tens of microseconds and
//! occasionally milliseconds on a loaded, non-realtime kernel. A hardware edge has
//! none of that jitter. The thread runs at normal priority. If a callback overruns by
//! more than a period, the missed edges are skipped rather than replayed, as a
//! hardware edge would be.

use crate::hardware::capabilities::{PeriodicTimer, TimerCallback};
use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

struct Armed {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Periodic timer backed by a dedicated thread.
pub struct ThreadTimer {
    thread_name: String,
    armed: Mutex<Option<Armed>>,
    edges: Arc<AtomicU64>,
    missed: Arc<AtomicU64>,
}

impl ThreadTimer {
    /// Create a disarmed timer whose thread will carry `thread_name`.
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            armed: Mutex::new(None),
            edges: Arc::new(AtomicU64::new(0)),
            missed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Callback invocations so far.
    pub fn edges(&self) -> u64 {
        self.edges.load(Ordering::SeqCst)
    }

    /// Edges skipped because a callback overran.
    pub fn missed_edges(&self) -> u64 {
        self.missed.load(Ordering::SeqCst)
    }

    /// Whether the timer thread is running.
    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new("sample-trigger")
    }
}

impl PeriodicTimer for ThreadTimer {
    fn arm(&self, period: Duration, callback: TimerCallback) -> Result<()> {
        if period.is_zero() {
            bail!("Timer period must be non-zero");
        }

        let mut armed = self.armed.lock();
        if armed.is_some() {
            bail!("Timer '{}' is already armed", self.thread_name);
        }

        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let running = Arc::clone(&running);
            let edges = Arc::clone(&self.edges);
            let missed = Arc::clone(&self.missed);
            thread::Builder::new()
                .name(self.thread_name.clone())
                .spawn(move || run_edges(period, callback, running, edges, missed))?
        };

        *armed = Some(Armed { running, handle });
        debug!(thread = %self.thread_name, ?period, "Timer armed");
        Ok(())
    }

    fn disarm(&self) -> Result<()> {
        let Some(armed) = self.armed.lock().take() else {
            return Ok(());
        };

        armed.running.store(false, Ordering::SeqCst);
        armed.handle.thread().unpark();
        armed
            .handle
            .join()
            .map_err(|_| anyhow!("Timer thread '{}' panicked", self.thread_name))?;

        debug!(
            thread = %self.thread_name,
            edges = self.edges(),
            missed = self.missed_edges(),
            "Timer disarmed"
        );
        Ok(())
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        if let Err(e) = self.disarm() {
            error!("Error disarming timer on drop: {}", e);
        }
    }
}

fn run_edges(
    period: Duration,
    callback: TimerCallback,
    running: Arc<AtomicBool>,
    edges: Arc<AtomicU64>,
    missed: Arc<AtomicU64>,
) {
    let mut next = Instant::now() + period;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now < next {
            // disarm() unparks, so shutdown does not wait out the period
            thread::park_timeout(next - now);
            continue;
        }

        if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
            error!("Timer callback panicked; timer keeps running");
        }
        edges.fetch_add(1, Ordering::SeqCst);

        next += period;
        let now = Instant::now();
        let mut skipped = 0u64;
        while next <= now {
            next += period;
            skipped += 1;
        }
        if skipped > 0 {
            missed.fetch_add(skipped, Ordering::SeqCst);
            warn!(skipped, "Timer callback overran its period");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_until_disarmed() {
        let timer = ThreadTimer::new("test-timer");
        let count = Arc::new(AtomicU64::new(0));
        let callback: TimerCallback = {
            let count = Arc::clone(&count);
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        timer.arm(Duration::from_millis(2), callback).unwrap();
        assert!(timer.is_armed());
        thread::sleep(Duration::from_millis(100));
        timer.disarm().unwrap();

        let fired = count.load(Ordering::SeqCst);
        assert!(fired > 0);
        assert_eq!(fired, timer.edges());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), fired, "fired after disarm");
    }

    #[test]
    fn double_arm_is_rejected_and_disarm_is_idempotent() {
        let timer = ThreadTimer::default();
        let callback: TimerCallback = Arc::new(|| {});
        timer.arm(Duration::from_millis(5), Arc::clone(&callback)).unwrap();
        assert!(timer.arm(Duration::from_millis(5), callback).is_err());
        timer.disarm().unwrap();
        timer.disarm().unwrap();
        assert!(!timer.is_armed());
    }

    #[test]
    fn zero_period_is_rejected() {
        let timer = ThreadTimer::default();
        assert!(timer.arm(Duration::ZERO, Arc::new(|| {})).is_err());
    }

    #[test]
    fn panicking_callback_does_not_stop_the_timer() {
        let timer = ThreadTimer::new("panicky");
        let count = Arc::new(AtomicU64::new(0));
        let callback: TimerCallback = {
            let count = Arc::clone(&count);
            Arc::new(move || {
                if count.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first edge fails");
                }
            })
        };

        timer.arm(Duration::from_millis(2), callback).unwrap();
        thread::sleep(Duration::from_millis(50));
        timer.disarm().unwrap();
        assert!(count.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn disarm_does_not_wait_for_a_long_period() {
        let timer = ThreadTimer::default();
        timer.arm(Duration::from_secs(30), Arc::new(|| {})).unwrap();
        let started = Instant::now();
        timer.disarm().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

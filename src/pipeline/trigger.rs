//! Sample trigger: the timer edge handler.
//!
//! Every edge allocates the next tick, reads the wall clock, snapshots the cache and
//! appends the row to the buffer. The handler runs on the timer's thread, so it only
//! does bounded in-memory work: the cache lock is released before the buffer lock is
//! taken, and neither is ever held during I/O.
//!
//! A failed capture is logged with its tick and the row is dropped. The tick is
//! still consumed, so a gap in the log marks exactly which edge was lost.

use crate::data::buffer::SampleBuffer;
use crate::data::cache::ReadingCache;
use crate::data::reading::SampleRow;
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::TimerCallback;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Source of wall-clock timestamps.
pub trait WallClock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> AppResult<f64>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_secs(&self) -> AppResult<f64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .map_err(|e| DaqError::Clock(e.to_string()))
    }
}

/// Counters for the trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerStats {
    /// Edges handled (ticks allocated)
    pub fired: u64,
    /// Rows appended to the buffer
    pub produced: u64,
    /// Rows lost to capture errors
    pub dropped: u64,
}

/// Snapshots the cache into the buffer on each edge.
pub struct SampleTrigger {
    cache: Arc<ReadingCache>,
    buffer: Arc<SampleBuffer>,
    clock: Arc<dyn WallClock>,
    next_tick: AtomicU64,
    produced: AtomicU64,
    dropped: AtomicU64,
}

impl SampleTrigger {
    /// Create a trigger using the system clock. The first tick is 0.
    pub fn new(cache: Arc<ReadingCache>, buffer: Arc<SampleBuffer>) -> Self {
        Self {
            cache,
            buffer,
            clock: Arc::new(SystemClock),
            next_tick: AtomicU64::new(0),
            produced: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle one edge. Returns the tick of the appended row, or `None` if it was dropped.
    pub fn fire(&self) -> Option<u64> {
        let tick = self.next_tick.fetch_add(1, Ordering::SeqCst);
        match self.capture(tick) {
            Ok(row) => {
                self.buffer.append(row);
                self.produced.fetch_add(1, Ordering::SeqCst);
                Some(tick)
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                error!(tick, error = %e, "Sample capture failed; row dropped");
                None
            }
        }
    }

    fn capture(&self, tick: u64) -> AppResult<SampleRow> {
        let timestamp = self.clock.now_secs()?;
        let values = self.cache.snapshot().flatten();
        Ok(SampleRow {
            tick,
            timestamp,
            values,
        })
    }

    /// Callback to hand to a [`PeriodicTimer`](crate::hardware::PeriodicTimer).
    pub fn callback(self: &Arc<Self>) -> TimerCallback {
        let trigger = Arc::clone(self);
        Arc::new(move || {
            trigger.fire();
        })
    }

    /// Counters so far.
    pub fn stats(&self) -> TriggerStats {
        TriggerStats {
            fired: self.next_tick.load(Ordering::SeqCst),
            produced: self.produced.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reading::{Reading, SourceLayout};
    use std::collections::HashSet;
    use tracing_test::traced_test;

    /// Fails on the listed ticks, counting calls from 0.
    struct FlakyClock {
        calls: AtomicU64,
        fail_on: HashSet<u64>,
    }

    impl WallClock for FlakyClock {
        fn now_secs(&self) -> AppResult<f64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                return Err(DaqError::Clock("clock went backwards".into()));
            }
            Ok(1_700_000_000.0 + call as f64 * 0.01)
        }
    }

    fn setup() -> (Arc<ReadingCache>, Arc<SampleBuffer>) {
        let cache = Arc::new(ReadingCache::new(vec![
            SourceLayout::environment(),
            SourceLayout::inertial(),
        ]));
        (cache, Arc::new(SampleBuffer::new()))
    }

    #[test]
    fn ticks_start_at_zero_without_gaps() {
        let (cache, buffer) = setup();
        let trigger = SampleTrigger::new(cache, Arc::clone(&buffer));
        for expected in 0..5 {
            assert_eq!(trigger.fire(), Some(expected));
        }

        let ticks: Vec<u64> = buffer.drain().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            trigger.stats(),
            TriggerStats {
                fired: 5,
                produced: 5,
                dropped: 0,
            }
        );
    }

    #[test]
    fn row_carries_snapshot_with_unavailable_fields() {
        let (cache, buffer) = setup();
        let env = cache.source_id("env").unwrap();
        cache.update(env, Reading::from_values(&[1005.0, 21.0]));

        let trigger = SampleTrigger::new(cache, Arc::clone(&buffer));
        trigger.fire();

        let rows = buffer.drain();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values.len(), 11);
        assert_eq!(rows[0].values[..2], [Some(1005.0), Some(21.0)]);
        assert!(rows[0].values[2..].iter().all(Option::is_none));
        assert!(rows[0].timestamp > 0.0);
    }

    #[test]
    #[traced_test]
    fn failed_capture_drops_row_but_consumes_tick() {
        let (cache, buffer) = setup();
        let clock = Arc::new(FlakyClock {
            calls: AtomicU64::new(0),
            fail_on: HashSet::from([1]),
        });
        let trigger = SampleTrigger::new(cache, Arc::clone(&buffer)).with_clock(clock);

        assert_eq!(trigger.fire(), Some(0));
        assert_eq!(trigger.fire(), None);
        assert_eq!(trigger.fire(), Some(2));

        let ticks: Vec<u64> = buffer.drain().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![0, 2]);
        assert_eq!(trigger.stats().dropped, 1);
        assert!(logs_contain("tick=1"));
        assert!(logs_contain("row dropped"));
    }

    #[test]
    fn callback_fires_the_trigger() {
        let (cache, buffer) = setup();
        let trigger = Arc::new(SampleTrigger::new(cache, Arc::clone(&buffer)));
        let callback = trigger.callback();
        callback();
        callback();
        assert_eq!(buffer.len(), 2);
    }
}

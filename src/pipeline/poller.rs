//! Per-source polling task.
//!
//! Each [`PollerTask`] owns one sensor source and republishes its readings into the
//! shared [`ReadingCache`] at a fixed interval. A read that fails or has no data leaves
//! the cached value untouched, and a reading with absent fields only updates the fields
//! it carries, so the trigger keeps sampling the last good value of every field.
//! Reads happen outside the cache lock; only the finished reading is copied in.

use crate::data::cache::{ReadingCache, SourceId};
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::SensorSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// What one poll did to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The source's partition was replaced
    Updated,
    /// The device had nothing new; cache retained
    NoData,
    /// The read failed or returned a malformed reading; cache retained
    Failed(String),
}

/// Counters for one poller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Reads attempted
    pub reads: u64,
    /// Readings written into the cache
    pub updates: u64,
    /// Reads that returned no data
    pub no_data: u64,
    /// Reads that failed
    pub failures: u64,
}

/// Loop that reads one source into the cache.
pub struct PollerTask {
    source: Arc<dyn SensorSource>,
    name: String,
    id: SourceId,
    width: usize,
    cache: Arc<ReadingCache>,
    interval: Duration,
    running: Arc<AtomicBool>,
    stats: PollerStats,
    failing: bool,
}

impl PollerTask {
    /// Bind `source` to its cache partition.
    ///
    /// Fails if the cache has no partition named after the source.
    pub fn new(
        source: Arc<dyn SensorSource>,
        cache: Arc<ReadingCache>,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> AppResult<Self> {
        let layout = source.layout();
        let id = cache.source_id(&layout.name).ok_or_else(|| {
            DaqError::Configuration(format!("No cache partition for source '{}'", layout.name))
        })?;
        let width = cache.layout(id).width();

        Ok(Self {
            source,
            name: layout.name,
            id,
            width,
            cache,
            interval,
            running,
            stats: PollerStats::default(),
            failing: false,
        })
    }

    /// Source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters so far.
    pub fn stats(&self) -> &PollerStats {
        &self.stats
    }

    /// Read once and update the cache on success.
    pub async fn poll_once(&mut self) -> PollOutcome {
        self.stats.reads += 1;

        match self.source.read().await {
            Ok(Some(reading)) if reading.width() == self.width => {
                self.cache.update(self.id, reading);
                self.stats.updates += 1;
                if self.failing {
                    self.failing = false;
                    info!(source = %self.name, "Sensor reads recovered");
                }
                PollOutcome::Updated
            }
            Ok(Some(reading)) => self.record_failure(format!(
                "reading has {} fields, expected {}",
                reading.width(),
                self.width
            )),
            Ok(None) => {
                self.stats.no_data += 1;
                trace!(source = %self.name, "No data");
                PollOutcome::NoData
            }
            Err(e) => self.record_failure(e.to_string()),
        }
    }

    fn record_failure(&mut self, error: String) -> PollOutcome {
        self.stats.failures += 1;
        if self.failing {
            debug!(source = %self.name, %error, "Read failed again");
        } else {
            self.failing = true;
            warn!(source = %self.name, %error, "Read failed; keeping last value");
        }
        PollOutcome::Failed(error)
    }

    /// Poll until the run flag clears. The flag is checked once per interval.
    pub async fn run(mut self) -> PollerStats {
        debug!(source = %self.name, interval = ?self.interval, "Poller started");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.poll_once().await;
        }

        debug!(
            source = %self.name,
            reads = self.stats.reads,
            updates = self.stats.updates,
            failures = self.stats.failures,
            "Poller stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reading::{Reading, SourceLayout};
    use crate::hardware::mock::ScriptedSource;

    fn setup() -> (Arc<ScriptedSource>, Arc<ReadingCache>, PollerTask) {
        let source = Arc::new(ScriptedSource::new(SourceLayout::environment()));
        let cache = Arc::new(ReadingCache::new(vec![
            SourceLayout::environment(),
            SourceLayout::inertial(),
        ]));
        let poller = PollerTask::new(
            source.clone(),
            Arc::clone(&cache),
            Duration::from_millis(1),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();
        (source, cache, poller)
    }

    #[tokio::test]
    async fn no_data_keeps_partition_unavailable() {
        let (_source, cache, mut poller) = setup();
        assert_eq!(poller.poll_once().await, PollOutcome::NoData);
        assert!(!cache.snapshot().get("env").unwrap().is_available());
    }

    #[tokio::test]
    async fn failed_read_retains_previous_value() {
        let (source, cache, mut poller) = setup();
        source.set(Reading::from_values(&[1005.0, 21.0]));
        assert_eq!(poller.poll_once().await, PollOutcome::Updated);
        let before = cache.snapshot();

        source.fail("i2c timeout");
        assert!(matches!(poller.poll_once().await, PollOutcome::Failed(_)));
        assert_eq!(cache.snapshot(), before);

        source.clear();
        assert_eq!(poller.poll_once().await, PollOutcome::NoData);
        assert_eq!(cache.snapshot(), before);

        assert_eq!(
            poller.stats(),
            &PollerStats {
                reads: 3,
                updates: 1,
                no_data: 1,
                failures: 1,
            }
        );
    }

    #[tokio::test]
    async fn partial_reading_never_clears_a_known_field() {
        let (source, cache, mut poller) = setup();
        source.set(Reading::from_values(&[1005.0, 21.0]));
        poller.poll_once().await;

        source.set(Reading::new(vec![Some(1006.0), None]));
        assert_eq!(poller.poll_once().await, PollOutcome::Updated);

        let env = cache.snapshot().get("env").unwrap();
        assert_eq!(env.reading, Some(Reading::from_values(&[1006.0, 21.0])));
        assert_eq!(env.updates, 2);
    }

    #[tokio::test]
    async fn malformed_reading_is_rejected() {
        let (source, cache, mut poller) = setup();
        source.set(Reading::from_values(&[1005.0]));
        assert!(matches!(poller.poll_once().await, PollOutcome::Failed(_)));
        assert!(!cache.snapshot().get("env").unwrap().is_available());
    }

    #[tokio::test]
    async fn unknown_source_is_a_configuration_error() {
        let cache = Arc::new(ReadingCache::new(vec![SourceLayout::inertial()]));
        let source = Arc::new(ScriptedSource::new(SourceLayout::environment()));
        let result = PollerTask::new(
            source,
            cache,
            Duration::from_millis(1),
            Arc::new(AtomicBool::new(true)),
        );
        assert!(matches!(result, Err(DaqError::Configuration(_))));
    }

    #[tokio::test]
    async fn run_stops_when_flag_clears() {
        let source = Arc::new(ScriptedSource::new(SourceLayout::environment()));
        source.set(Reading::from_values(&[1005.0, 21.0]));
        let cache = Arc::new(ReadingCache::new(vec![SourceLayout::environment()]));
        let running = Arc::new(AtomicBool::new(true));
        let poller = PollerTask::new(
            source.clone(),
            Arc::clone(&cache),
            Duration::from_millis(2),
            Arc::clone(&running),
        )
        .unwrap();

        let handle = tokio::spawn(poller.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        running.store(false, Ordering::SeqCst);

        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(stats.updates > 0);
        assert_eq!(stats.reads, source.read_count());
        assert!(cache.snapshot().get("env").unwrap().is_available());
    }
}

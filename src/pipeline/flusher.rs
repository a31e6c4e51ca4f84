//! Background flusher: buffer → persistent log.
//!
//! ```text
//! Timer edge (100 Hz) → SampleBuffer
//!                           ↓
//!                      Flusher (1 Hz, background)
//!                           ↓
//!                      sensor_log_*.csv
//! ```
//!
//! Each cycle drains the buffer and writes the batch on the blocking pool, so the
//! trigger never waits on disk. A failed write loses that batch: rows are not
//! re-queued, and the loss is logged and counted. Once the run flag clears the
//! flusher performs one final drain before closing the log, so every row appended
//! before the trigger was disarmed reaches the file.

use crate::data::buffer::SampleBuffer;
use crate::data::storage::SampleLog;
use crate::error::AppResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Counters for the flusher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlusherStats {
    /// Non-empty batches written
    pub batches: u64,
    /// Rows durably appended
    pub rows_written: u64,
    /// Rows drained but lost to write failures
    pub rows_lost: u64,
    /// Failed batch writes
    pub write_failures: u64,
}

/// Periodic drain-and-append task.
pub struct Flusher {
    buffer: Arc<SampleBuffer>,
    log: Option<Box<dyn SampleLog>>,
    interval: Duration,
    running: Arc<AtomicBool>,
    stats: FlusherStats,
}

impl Flusher {
    /// Create a flusher writing into an already opened log.
    pub fn new(
        buffer: Arc<SampleBuffer>,
        log: Box<dyn SampleLog>,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            buffer,
            log: Some(log),
            interval,
            running,
            stats: FlusherStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> &FlusherStats {
        &self.stats
    }

    /// Drain the buffer and append the batch. Returns the number of rows written.
    pub async fn flush_once(&mut self) -> usize {
        let rows = self.buffer.drain();
        if rows.is_empty() {
            return 0;
        }
        let count = rows.len();

        let Some(mut log) = self.log.take() else {
            self.record_loss(count, "sample log unavailable");
            return 0;
        };

        let written = tokio::task::spawn_blocking(move || {
            let result = log.append(&rows);
            (log, result)
        })
        .await;

        match written {
            Ok((log, Ok(()))) => {
                self.log = Some(log);
                self.stats.batches += 1;
                self.stats.rows_written += count as u64;
                debug!(rows = count, "Flushed batch");
                count
            }
            Ok((log, Err(e))) => {
                self.log = Some(log);
                self.record_loss(count, &e.to_string());
                0
            }
            Err(e) => {
                // The log went down with the panicking writer
                self.record_loss(count, &format!("writer task failed: {e}"));
                0
            }
        }
    }

    fn record_loss(&mut self, rows: usize, reason: &str) {
        self.stats.write_failures += 1;
        self.stats.rows_lost += rows as u64;
        error!(rows, error = %reason, "Flush failed; batch lost");
    }

    async fn close(&mut self) -> AppResult<()> {
        let Some(mut log) = self.log.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || log.close())
            .await
            .unwrap_or_else(|e| {
                Err(crate::error::DaqError::TaskJoin {
                    task: "log-close".to_string(),
                    reason: e.to_string(),
                })
            })
    }

    /// Flush every interval until the run flag clears, then drain once more and close
    /// the log.
    pub async fn run(mut self) -> FlusherStats {
        debug!(interval = ?self.interval, "Flusher started");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.flush_once().await;
        }

        let final_rows = self.flush_once().await;
        if let Err(e) = self.close().await {
            error!(error = %e, "Failed to close sample log");
        }

        info!(
            final_rows,
            batches = self.stats.batches,
            rows_written = self.stats.rows_written,
            rows_lost = self.stats.rows_lost,
            "Flusher stopped"
        );
        self.stats
    }
}

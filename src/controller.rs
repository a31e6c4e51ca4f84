//! Acquisition controller.
//!
//! Owns the reading cache, the sample buffer and every task of a run, and enforces the
//! lifecycle `Constructed → Running → Stopped`. A controller runs once.
//!
//! # Startup
//!
//! Everything that can fail is acquired before any task is spawned: sensors are
//! initialized, the heartbeat output is driven low and the log is created with its
//! header. Only then are the pollers, flusher and heartbeat spawned and the timer armed.
//! If arming fails the spawned tasks are torn down again.
//!
//! # Shutdown
//!
//! The timer is disarmed first so no row is produced afterwards, then the run flag is
//! cleared and the flusher (which performs a final drain), the pollers and the heartbeat
//! are joined in that order, each bounded by the configured join timeout.
//!
//! # Example
//! ```no_run
//! # async fn demo() -> sensor_daq::error::AppResult<()> {
//! use sensor_daq::config::Settings;
//! use sensor_daq::controller::{Controller, Hardware};
//! use sensor_daq::hardware::{mock::MockRig, ThreadTimer};
//! use std::sync::Arc;
//!
//! let settings = Settings::default();
//! let rig = MockRig::new();
//! let hardware = Hardware::standard(
//!     &settings,
//!     rig.env.clone(),
//!     rig.imu.clone(),
//!     Arc::new(ThreadTimer::default()),
//!     rig.heartbeat.clone(),
//! );
//! let path = settings.log_file_path(chrono::Local::now());
//! let mut controller = Controller::new(settings, path, hardware)?;
//!
//! controller.start().await?;
//! tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//! let summary = controller.stop().await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

use crate::config::Settings;
use crate::data::{header_columns, CsvLog, ReadingCache, SampleBuffer};
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::{DigitalOutput, PeriodicTimer, SensorSource};
use crate::pipeline::{
    Flusher, FlusherStats, Heartbeat, PollerStats, PollerTask, SampleTrigger, Supervisor,
    TaskReport, TriggerStats,
};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Lifecycle state of a [`Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Built, nothing acquired
    Constructed,
    /// Tasks running and timer armed
    Running,
    /// Torn down; terminal
    Stopped,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Constructed => "constructed",
            ControllerState::Running => "running",
            ControllerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A sensor source and how often it is polled.
#[derive(Clone)]
pub struct PolledSource {
    /// The device
    pub source: Arc<dyn SensorSource>,
    /// Poll interval
    pub interval: Duration,
}

/// The collaborators a controller drives.
#[derive(Clone)]
pub struct Hardware {
    /// Sources in log column order
    pub sources: Vec<PolledSource>,
    /// Sample trigger clock
    pub timer: Arc<dyn PeriodicTimer>,
    /// Liveness output
    pub heartbeat: Arc<dyn DigitalOutput>,
}

impl Hardware {
    /// Hardware with no sources yet.
    pub fn new(timer: Arc<dyn PeriodicTimer>, heartbeat: Arc<dyn DigitalOutput>) -> Self {
        Self {
            sources: Vec::new(),
            timer,
            heartbeat,
        }
    }

    /// Append a source; its fields follow those of earlier sources in each row.
    pub fn with_source(mut self, source: Arc<dyn SensorSource>, interval: Duration) -> Self {
        self.sources.push(PolledSource { source, interval });
        self
    }

    /// The standard environment + inertial pair, polled at the configured intervals.
    pub fn standard(
        settings: &Settings,
        env: Arc<dyn SensorSource>,
        imu: Arc<dyn SensorSource>,
        timer: Arc<dyn PeriodicTimer>,
        heartbeat: Arc<dyn DigitalOutput>,
    ) -> Self {
        Self::new(timer, heartbeat)
            .with_source(
                env,
                Duration::from_millis(settings.sampling.env_poll_interval_ms),
            )
            .with_source(
                imu,
                Duration::from_millis(settings.sampling.imu_poll_interval_ms),
            )
    }
}

/// Counters gathered when a run stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Trigger counters
    pub trigger: TriggerStats,
    /// Poller counters by source, for pollers that joined
    pub pollers: Vec<(String, PollerStats)>,
    /// Flusher counters, if the flusher joined
    pub flusher: Option<FlusherStats>,
    /// Heartbeat toggles, if the heartbeat joined
    pub heartbeat_toggles: Option<u64>,
}

impl RunSummary {
    fn new(trigger: TriggerStats, report: TaskReport) -> Self {
        Self {
            trigger,
            pollers: report.pollers,
            flusher: report.flusher,
            heartbeat_toggles: report.heartbeat_toggles,
        }
    }

    fn log(&self) {
        info!(
            fired = self.trigger.fired,
            produced = self.trigger.produced,
            dropped = self.trigger.dropped,
            "Trigger summary"
        );
        for (source, stats) in &self.pollers {
            info!(
                source = %source,
                reads = stats.reads,
                updates = stats.updates,
                no_data = stats.no_data,
                failures = stats.failures,
                "Poller summary"
            );
        }
        if let Some(flusher) = &self.flusher {
            info!(
                batches = flusher.batches,
                rows_written = flusher.rows_written,
                rows_lost = flusher.rows_lost,
                "Flusher summary"
            );
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "trigger: {} fired, {} produced, {} dropped",
            self.trigger.fired, self.trigger.produced, self.trigger.dropped
        )?;
        for (source, stats) in &self.pollers {
            writeln!(
                f,
                "poller {source}: {} reads, {} updates, {} no data, {} failures",
                stats.reads, stats.updates, stats.no_data, stats.failures
            )?;
        }
        match &self.flusher {
            Some(flusher) => writeln!(
                f,
                "flusher: {} batches, {} rows written, {} rows lost",
                flusher.batches, flusher.rows_written, flusher.rows_lost
            )?,
            None => writeln!(f, "flusher: did not report")?,
        }
        match self.heartbeat_toggles {
            Some(toggles) => write!(f, "heartbeat: {toggles} toggles"),
            None => write!(f, "heartbeat: did not report"),
        }
    }
}

/// Owns one acquisition run.
pub struct Controller {
    settings: Settings,
    log_path: PathBuf,
    hardware: Hardware,
    cache: Arc<ReadingCache>,
    buffer: Arc<SampleBuffer>,
    trigger: Arc<SampleTrigger>,
    running: Arc<AtomicBool>,
    supervisor: Supervisor,
    state: ControllerState,
    summary: Option<RunSummary>,
}

impl Controller {
    /// Build a controller. The cache is partitioned by the hardware's sources in order.
    ///
    /// Fails on invalid settings, no sources, or two sources with the same name.
    pub fn new(
        settings: Settings,
        log_path: impl Into<PathBuf>,
        hardware: Hardware,
    ) -> AppResult<Self> {
        settings.validate()?;

        if hardware.sources.is_empty() {
            return Err(DaqError::Configuration(
                "At least one sensor source is required".to_string(),
            ));
        }

        let layouts: Vec<_> = hardware.sources.iter().map(|s| s.source.layout()).collect();
        let mut seen = HashSet::new();
        for layout in &layouts {
            if !seen.insert(layout.name.clone()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate sensor source '{}'",
                    layout.name
                )));
            }
        }

        let cache = Arc::new(ReadingCache::new(layouts));
        let buffer = Arc::new(SampleBuffer::new());
        let trigger = Arc::new(SampleTrigger::new(Arc::clone(&cache), Arc::clone(&buffer)));

        Ok(Self {
            settings,
            log_path: log_path.into(),
            hardware,
            cache,
            buffer,
            trigger,
            running: Arc::new(AtomicBool::new(false)),
            supervisor: Supervisor::new(),
            state: ControllerState::Constructed,
            summary: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// The shared reading cache.
    pub fn cache(&self) -> &Arc<ReadingCache> {
        &self.cache
    }

    /// The shared sample buffer.
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    /// Where the log is written.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log header: `tick`, `timestamp`, then every source's fields in order.
    pub fn header(&self) -> Vec<String> {
        header_columns(self.cache.layouts())
    }

    /// Summary of the finished run, once stopped.
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Acquire resources, spawn the tasks and arm the trigger.
    ///
    /// Valid only from `Constructed`. On failure nothing is left running and the
    /// controller is `Stopped`.
    pub async fn start(&mut self) -> AppResult<()> {
        if self.state != ControllerState::Constructed {
            return Err(DaqError::InvalidState {
                operation: "start",
                state: self.state.to_string(),
            });
        }

        match self.launch().await {
            Ok(()) => {
                self.state = ControllerState::Running;
                info!(
                    log = %self.log_path.display(),
                    frequency_hz = self.settings.sampling.frequency_hz,
                    sources = self.hardware.sources.len(),
                    "Acquisition started"
                );
                Ok(())
            }
            Err(e) => {
                self.state = ControllerState::Stopped;
                error!(error = %e, "Acquisition failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&mut self) -> AppResult<()> {
        let sources = self.hardware.sources.clone();

        for polled in &sources {
            let name = polled.source.layout().name;
            polled
                .source
                .initialize()
                .await
                .map_err(|e| DaqError::sensor(name, e))?;
        }

        self.hardware
            .heartbeat
            .set_level(false)
            .map_err(|e| DaqError::Output(e.to_string()))?;

        let pollers = sources
            .iter()
            .map(|polled| {
                PollerTask::new(
                    Arc::clone(&polled.source),
                    Arc::clone(&self.cache),
                    polled.interval,
                    Arc::clone(&self.running),
                )
            })
            .collect::<AppResult<Vec<_>>>()?;

        let path = self.log_path.clone();
        let header = self.header();
        let marker = self.settings.storage.missing_marker.clone();
        let log = tokio::task::spawn_blocking(move || CsvLog::create(path, &header, marker))
            .await
            .map_err(|e| DaqError::TaskJoin {
                task: "log-create".to_string(),
                reason: e.to_string(),
            })??;

        self.running.store(true, Ordering::SeqCst);

        for poller in pollers {
            let name = poller.name().to_string();
            self.supervisor.add_poller(name, tokio::spawn(poller.run()));
        }
        let flusher = Flusher::new(
            Arc::clone(&self.buffer),
            Box::new(log),
            self.settings.flush_interval(),
            Arc::clone(&self.running),
        );
        self.supervisor.set_flusher(tokio::spawn(flusher.run()));
        let heartbeat = Heartbeat::new(
            Arc::clone(&self.hardware.heartbeat),
            self.settings.heartbeat_interval(),
            Arc::clone(&self.running),
        );
        self.supervisor.set_heartbeat(tokio::spawn(heartbeat.run()));

        let armed = self
            .hardware
            .timer
            .arm(self.settings.sample_period(), self.trigger.callback());
        if let Err(e) = armed {
            self.running.store(false, Ordering::SeqCst);
            let (report, errors) = self.supervisor.shutdown(self.settings.join_timeout()).await;
            for err in &errors {
                warn!(error = %err, "Teardown after failed start");
            }
            self.summary = Some(RunSummary::new(self.trigger.stats(), report));
            return Err(DaqError::Timer(e.to_string()));
        }

        Ok(())
    }

    /// Disarm the trigger, stop every task and close the log.
    ///
    /// Rows buffered when this is called are written before it returns. Calling it again,
    /// or on a controller that never started, returns `Ok`. Tasks that fail or outlive the
    /// join timeout are reported together as [`DaqError::ShutdownFailed`]; the summary is
    /// still available from [`summary`](Self::summary).
    pub async fn stop(&mut self) -> AppResult<RunSummary> {
        match self.state {
            ControllerState::Running => {}
            ControllerState::Constructed => {
                self.state = ControllerState::Stopped;
                return Ok(self.summary.get_or_insert_with(RunSummary::default).clone());
            }
            ControllerState::Stopped => {
                return Ok(self.summary.clone().unwrap_or_default());
            }
        }
        self.state = ControllerState::Stopped;
        info!("Stopping acquisition");

        let mut errors = Vec::new();
        let timer = Arc::clone(&self.hardware.timer);
        match tokio::task::spawn_blocking(move || timer.disarm()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(DaqError::Timer(e.to_string())),
            Err(e) => errors.push(DaqError::TaskJoin {
                task: "timer-disarm".to_string(),
                reason: e.to_string(),
            }),
        }

        self.running.store(false, Ordering::SeqCst);
        let (report, join_errors) = self.supervisor.shutdown(self.settings.join_timeout()).await;
        errors.extend(join_errors);

        let summary = RunSummary::new(self.trigger.stats(), report);
        summary.log();
        self.summary = Some(summary.clone());

        if errors.is_empty() {
            info!("Acquisition stopped");
            Ok(summary)
        } else {
            error!(failures = errors.len(), "Acquisition stopped with errors");
            Err(DaqError::ShutdownFailed(errors))
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.state == ControllerState::Running {
            warn!("Controller dropped while running; disarming");
            self.running.store(false, Ordering::SeqCst);
            if let Err(e) = self.hardware.timer.disarm() {
                warn!(error = %e, "Failed to disarm timer on drop");
            }
        }
    }
}

//! Configuration System using Figment
//!
//! Configuration is layered from:
//! 1. Built-in defaults (a 10 s run at 100 Hz, 200 Hz polling, 1 s flush)
//! 2. A TOML file (`config/default.toml` unless a path is given)
//! 3. Environment variables prefixed with `SENSOR_DAQ_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use sensor_daq::config::Settings;
//!
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Sampling at {} Hz", settings.sampling.frequency_hz);
//! # Ok::<(), sensor_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Trigger and polling rates
    pub sampling: SamplingConfig,
    /// Persistent log settings
    pub storage: StorageConfig,
    /// Teardown settings
    pub shutdown: ShutdownConfig,
    /// Run length for the CLI
    pub run: RunConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingConfig {
    /// Trigger frequency in Hz (one sample row per edge)
    pub frequency_hz: f64,
    /// Poll interval of the environment sensor (pressure/temperature)
    pub env_poll_interval_ms: u64,
    /// Poll interval of the inertial sensor (accel/gyro/euler)
    pub imu_poll_interval_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Output directory for log files
    pub output_dir: PathBuf,
    /// Log file name prefix; a local timestamp and `.csv` are appended
    pub file_prefix: String,
    /// Text written for a field that has no value
    #[serde(default)]
    pub missing_marker: String,
    /// How often buffered rows are written out
    pub flush_interval_ms: u64,
}

/// Shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShutdownConfig {
    /// Upper bound on joining any single task during `stop()`
    pub join_timeout_ms: u64,
}

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Fixed run duration in seconds before an orderly shutdown
    pub duration_secs: u64,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationConfig {
                name: "sensor-daq".to_string(),
                log_level: "info".to_string(),
                log_format: default_log_format(),
            },
            sampling: SamplingConfig {
                frequency_hz: 100.0,
                env_poll_interval_ms: 5,
                imu_poll_interval_ms: 5,
            },
            storage: StorageConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "sensor_log".to_string(),
                missing_marker: String::new(),
                flush_interval_ms: 1000,
            },
            shutdown: ShutdownConfig {
                join_timeout_ms: 2000,
            },
            run: RunConfig { duration_secs: 10 },
        }
    }
}

impl Settings {
    /// Load configuration from `config/default.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `SENSOR_DAQ_`.
    /// Example: `SENSOR_DAQ_SAMPLING__FREQUENCY_HZ=50`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file leaves the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path.as_ref()).extract().map_err(DaqError::from)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SENSOR_DAQ_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let frequency = self.sampling.frequency_hz;
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Invalid frequency_hz {frequency}. Must be positive"
            )));
        }
        match Duration::try_from_secs_f64(1.0 / frequency) {
            Ok(period) if !period.is_zero() => {}
            _ => {
                return Err(DaqError::Configuration(format!(
                    "frequency_hz {frequency} is out of range: the sample period must be \
                     between 1 ns and {} s",
                    Duration::MAX.as_secs()
                )))
            }
        }

        if self.sampling.env_poll_interval_ms == 0 || self.sampling.imu_poll_interval_ms == 0 {
            return Err(DaqError::Configuration(
                "Poll intervals must be at least 1 ms".to_string(),
            ));
        }

        if self.storage.flush_interval_ms == 0 {
            return Err(DaqError::Configuration(
                "flush_interval_ms must be at least 1 ms".to_string(),
            ));
        }

        if self.flush_interval() <= self.sample_period() {
            return Err(DaqError::Configuration(format!(
                "flush_interval_ms {} must be coarser than the sample period ({:?})",
                self.storage.flush_interval_ms,
                self.sample_period()
            )));
        }

        if self.shutdown.join_timeout_ms == 0 {
            return Err(DaqError::Configuration(
                "join_timeout_ms must be at least 1 ms".to_string(),
            ));
        }

        // Tasks notice the cleared run flag only on their next tick
        let slowest_task = self
            .flush_interval()
            .max(Duration::from_millis(self.sampling.env_poll_interval_ms))
            .max(Duration::from_millis(self.sampling.imu_poll_interval_ms));
        if self.join_timeout() <= slowest_task {
            return Err(DaqError::Configuration(format!(
                "join_timeout_ms {} must exceed the longest task interval ({:?})",
                self.shutdown.join_timeout_ms, slowest_task
            )));
        }

        if self.storage.file_prefix.trim().is_empty() {
            return Err(DaqError::Configuration(
                "file_prefix must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Period between trigger edges. Saturates at `Duration::MAX` for a frequency that
    /// `validate()` would reject.
    pub fn sample_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.sampling.frequency_hz).unwrap_or(Duration::MAX)
    }

    /// Interval between flushes of the sample buffer.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.storage.flush_interval_ms)
    }

    /// The heartbeat output toggles twice per flush interval.
    pub fn heartbeat_interval(&self) -> Duration {
        self.flush_interval() / 2
    }

    /// Upper bound on joining a single task.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.join_timeout_ms)
    }

    /// Fixed run duration.
    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run.duration_secs)
    }

    /// Path of a new log file, stamped with the local time of `now`.
    pub fn log_file_path(&self, now: chrono::DateTime<chrono::Local>) -> PathBuf {
        self.storage.output_dir.join(format!(
            "{}_{}.csv",
            self.storage.file_prefix,
            now.format("%Y%m%d%H%M%S")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.sample_period(), Duration::from_millis(10));
        assert_eq!(settings.heartbeat_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.sampling.frequency_hz, 100.0);
        assert_eq!(settings.storage.file_prefix, "sensor_log");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
                [sampling]
                frequency_hz = 50.0

                [storage]
                missing_marker = "None"
            "#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.sampling.frequency_hz, 50.0);
        assert_eq!(settings.sampling.env_poll_interval_ms, 5);
        assert_eq!(settings.storage.missing_marker, "None");
        assert_eq!(settings.storage.flush_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "verbose".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_flush_must_be_coarser_than_sampling() {
        let mut settings = Settings::default();
        settings.sampling.frequency_hz = 10.0;
        settings.storage.flush_interval_ms = 100;
        assert!(settings.validate().is_err());

        settings.storage.flush_interval_ms = 500;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut settings = Settings::default();
        settings.sampling.imu_poll_interval_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.sampling.frequency_hz = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.shutdown.join_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_out_of_range_frequency_is_a_configuration_error() {
        for frequency_hz in [1e-20, 1e12, f64::INFINITY, f64::NAN] {
            let mut settings = Settings::default();
            settings.sampling.frequency_hz = frequency_hz;
            assert!(
                matches!(settings.validate(), Err(DaqError::Configuration(_))),
                "frequency_hz {frequency_hz} was accepted"
            );
        }

        let mut settings = Settings::default();
        settings.sampling.frequency_hz = 1e-20;
        assert_eq!(settings.sample_period(), Duration::MAX);
    }

    #[test]
    fn test_join_timeout_must_cover_flush_interval() {
        let mut settings = Settings::default();
        settings.shutdown.join_timeout_ms = 1000;
        assert!(settings.validate().is_err());

        settings.shutdown.join_timeout_ms = 1500;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_log_file_path_is_timestamped() {
        let settings = Settings::default();
        let now = chrono::Local
            .with_ymd_and_hms(2024, 5, 17, 9, 3, 7)
            .single()
            .unwrap();
        let path = settings.log_file_path(now);
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "sensor_log_20240517090307.csv"
        );
    }
}

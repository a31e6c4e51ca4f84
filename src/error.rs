//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole pipeline.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur, from configuration problems to
//! collaborator (sensor, timer, output pin) failures and lifecycle misuse.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while layering defaults, the TOML file and
//!   the environment.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but is
//!   logically wrong (e.g. a flush interval finer than the sample period).
//! - **`Io`** / **`Csv`**: Persistent log failures.
//! - **`Sensor`**, **`Timer`**, **`Output`**: Failures reported by hardware collaborators.
//!   Collaborators speak `anyhow::Result`; the controller converts at its boundary.
//! - **`Clock`**: The wall clock could not be read while capturing a sample.
//! - **`InvalidState`**: A lifecycle operation was called from the wrong state.
//! - **`TaskJoin`** / **`JoinTimeout`** / **`ShutdownFailed`**: Teardown problems.
//!
//! Background tasks never propagate these errors to each other: they log and continue.
//! Only startup failures and teardown reports reach the caller.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sensor '{source_name}' error: {message}")]
    Sensor {
        source_name: String,
        message: String,
    },

    #[error("Timer error: {0}")]
    Timer(String),

    #[error("Output pin error: {0}")]
    Output(String),

    #[error("Clock error: {0}")]
    Clock(String),

    #[error("Cannot {operation} while controller is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Task '{task}' failed: {reason}")]
    TaskJoin { task: String, reason: String },

    #[error("Task '{0}' did not finish within the join timeout")]
    JoinTimeout(String),

    #[error("Shutdown failed with errors: {}", join_errors(.0))]
    ShutdownFailed(Vec<DaqError>),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl DaqError {
    /// Wraps a collaborator failure reported by a sensor source.
    pub fn sensor(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        DaqError::Sensor {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }
}

fn join_errors(errors: &[DaqError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

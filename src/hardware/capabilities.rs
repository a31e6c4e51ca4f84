//! Hardware Capabilities
//!
//! The pipeline depends on three small collaborator capabilities and nothing else:
//!
//! - [`SensorSource`]: "read the latest values of one sensor"
//! - [`PeriodicTimer`]: "invoke a callback on every periodic edge"
//! - [`DigitalOutput`]: "set an output level"
//!
//! Bus addressing, register decoding and calibration belong to the implementations.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! Sensor reads are async (uses #[async_trait]) because they run inside polling tasks.
//! The timer and output capabilities are synchronous: the timer's callback runs on the
//! timer's own thread, not on the async runtime.

use crate::data::reading::{Reading, SourceLayout};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Capability: Sensor Readout
///
/// A sensor that delivers one field group per read (pressure + temperature,
/// acceleration + angular rate + orientation, ...).
///
/// # Contract
/// - `layout()` is fixed for the lifetime of the source
/// - `read()` returns `Ok(Some(reading))` with exactly `layout().width()` fields,
///   `Ok(None)` when the device has no data yet, or `Err` on a transient failure
/// - Individual fields inside a reading may be `None`
/// - `initialize()` acquires the bus/device; failure there is fatal at startup
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Name and field names of this source.
    fn layout(&self) -> SourceLayout;

    /// Acquire the device before polling starts.
    ///
    /// # Default Implementation
    /// Nothing to acquire.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Read the latest values.
    async fn read(&self) -> Result<Option<Reading>>;
}

/// Callback invoked on every timer edge.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Capability: Periodic Edge Source
///
/// A timer (hardware PWM loopback, RTOS timer, dedicated thread) that invokes a
/// callback at a fixed period, outside the async runtime.
///
/// # Contract
/// - `arm()` starts invoking `callback`; arming an armed timer is an error
/// - `disarm()` returns only after the last in-flight invocation has finished, so no
///   callback runs after it returns
/// - `disarm()` on a disarmed timer is a no-op
pub trait PeriodicTimer: Send + Sync {
    /// Start invoking `callback` every `period`.
    fn arm(&self, period: Duration, callback: TimerCallback) -> Result<()>;

    /// Stop invoking the callback.
    fn disarm(&self) -> Result<()>;
}

/// Capability: Digital Output
///
/// A binary output line (status LED, GPIO pin).
pub trait DigitalOutput: Send + Sync {
    /// Drive the output high (`true`) or low (`false`).
    fn set_level(&self, high: bool) -> Result<()>;
}

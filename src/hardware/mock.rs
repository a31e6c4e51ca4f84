//! Mock Hardware Implementations
//!
//! Provides simulated collaborators for running the pipeline without physical hardware.
//! All mock sensors use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockEnvironmentSensor` - Simulated barometer/thermometer (`env`)
//! - `MockImu` - Simulated 9-axis inertial unit (`imu`)
//! - `ScriptedSource` - Source whose next answer is set by the caller (tests)
//! - `MockTimer` - Timer fired by hand (tests)
//! - `MockPin` - Digital output that records its level
//!
//! # Performance Characteristics
//!
//! - MockEnvironmentSensor: ~1ms per read, 1013.25 hPa / 21 °C with small noise
//! - MockImu: ~2ms per read, gravity on Z, gyro noise, slowly drifting heading

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::data::reading::{Reading, SourceLayout};
use crate::hardware::capabilities::{DigitalOutput, PeriodicTimer, SensorSource, TimerCallback};

// =============================================================================
// MockEnvironmentSensor - Simulated pressure/temperature sensor
// =============================================================================

/// Mock pressure/temperature sensor
///
/// # Example
///
/// ```rust,ignore
/// let env = MockEnvironmentSensor::new().with_failure_rate(0.01);
/// let reading = env.read().await?;
/// ```
pub struct MockEnvironmentSensor {
    base_pressure_hpa: f64,
    base_temperature_c: f64,
    read_latency: Duration,
    failure_rate: f64,
    reads: AtomicU64,
}

impl MockEnvironmentSensor {
    /// Create sensor at sea-level pressure and room temperature
    pub fn new() -> Self {
        Self {
            base_pressure_hpa: 1013.25,
            base_temperature_c: 21.0,
            read_latency: Duration::from_millis(1),
            failure_rate: 0.0,
            reads: AtomicU64::new(0),
        }
    }

    /// Fraction of reads (0.0-1.0) that fail with a simulated bus error
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// Number of reads attempted
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockEnvironmentSensor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorSource for MockEnvironmentSensor {
    fn layout(&self) -> SourceLayout {
        SourceLayout::environment()
    }

    async fn read(&self) -> Result<Option<Reading>> {
        sleep(self.read_latency).await;
        let n = self.reads.fetch_add(1, Ordering::SeqCst);

        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < self.failure_rate {
            bail!("simulated I2C NACK on read {}", n);
        }
        let pressure = self.base_pressure_hpa + rng.gen_range(-0.05..0.05);
        let temperature = self.base_temperature_c + rng.gen_range(-0.02..0.02);
        Ok(Some(Reading::from_values(&[pressure, temperature])))
    }
}

// =============================================================================
// MockImu - Simulated inertial measurement unit
// =============================================================================

/// Mock 9-axis IMU: acceleration (m/s²), angular rate (°/s), Euler angles (°)
///
/// Returns no data for its first `warmup_reads` reads, and no Euler angles until
/// fusion has "settled" shortly after, like a real fusion chip after power-on.
pub struct MockImu {
    read_latency: Duration,
    warmup_reads: u64,
    failure_rate: f64,
    reads: AtomicU64,
}

impl MockImu {
    /// Create IMU with a short warm-up
    pub fn new() -> Self {
        Self {
            read_latency: Duration::from_millis(2),
            warmup_reads: 3,
            failure_rate: 0.0,
            reads: AtomicU64::new(0),
        }
    }

    /// Fraction of reads (0.0-1.0) that fail with a simulated bus error
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// Number of reads that return no data after start-up
    pub fn with_warmup_reads(mut self, warmup_reads: u64) -> Self {
        self.warmup_reads = warmup_reads;
        self
    }

    /// Number of reads attempted
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockImu {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorSource for MockImu {
    fn layout(&self) -> SourceLayout {
        SourceLayout::inertial()
    }

    async fn read(&self) -> Result<Option<Reading>> {
        sleep(self.read_latency).await;
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if n < self.warmup_reads {
            return Ok(None);
        }

        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < self.failure_rate {
            bail!("simulated I2C timeout on read {}", n);
        }

        let accel = [
            rng.gen_range(-0.05..0.05),
            rng.gen_range(-0.05..0.05),
            9.81 + rng.gen_range(-0.05..0.05),
        ];
        let gyro = [
            rng.gen_range(-0.2..0.2),
            rng.gen_range(-0.2..0.2),
            rng.gen_range(-0.2..0.2),
        ];
        let euler = (n > self.warmup_reads).then(|| {
            let heading = (n as f64 * 0.01) % 360.0;
            [heading, rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)]
        });

        Ok(Some(Reading::from_vectors(&[Some(accel), Some(gyro), euler])))
    }
}

// =============================================================================
// ScriptedSource - Caller-controlled source
// =============================================================================

#[derive(Clone)]
enum Behavior {
    Respond(Option<Reading>),
    Fail(String),
    Hang,
}

/// Source whose answers are set by the caller
///
/// Answers `Ok(None)` until [`set`](Self::set) is called, then keeps returning the
/// last value set. [`fail`](Self::fail) switches to returning errors and
/// [`hang`](Self::hang) to a read that never completes.
pub struct ScriptedSource {
    layout: SourceLayout,
    behavior: Mutex<Behavior>,
    fail_initialize: AtomicBool,
    reads: AtomicU64,
}

impl ScriptedSource {
    /// Create a source with the given layout and no data
    pub fn new(layout: SourceLayout) -> Self {
        Self {
            layout,
            behavior: Mutex::new(Behavior::Respond(None)),
            fail_initialize: AtomicBool::new(false),
            reads: AtomicU64::new(0),
        }
    }

    /// Answer every following read with `reading`
    pub fn set(&self, reading: Reading) {
        *self.behavior.lock() = Behavior::Respond(Some(reading));
    }

    /// Answer every following read with "no data"
    pub fn clear(&self) {
        *self.behavior.lock() = Behavior::Respond(None);
    }

    /// Fail every following read with `message`
    pub fn fail(&self, message: impl Into<String>) {
        *self.behavior.lock() = Behavior::Fail(message.into());
    }

    /// Never complete any following read
    pub fn hang(&self) {
        *self.behavior.lock() = Behavior::Hang;
    }

    /// Make `initialize()` fail, as when the device is absent from the bus
    pub fn fail_initialize(&self) {
        self.fail_initialize.store(true, Ordering::SeqCst);
    }

    /// Number of reads started
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SensorSource for ScriptedSource {
    fn layout(&self) -> SourceLayout {
        self.layout.clone()
    }

    async fn initialize(&self) -> Result<()> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            bail!("device '{}' not found on bus", self.layout.name);
        }
        Ok(())
    }

    async fn read(&self) -> Result<Option<Reading>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();
        match behavior {
            Behavior::Respond(reading) => Ok(reading),
            Behavior::Fail(message) => Err(anyhow!(message)),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// MockTimer - Hand-fired timer
// =============================================================================

/// Timer whose edges are produced by calling [`fire`](Self::fire)
///
/// Like [`ThreadTimer`](crate::hardware::ThreadTimer), `disarm()` returns only after an
/// edge that is already running has finished.
#[derive(Default)]
pub struct MockTimer {
    callback: Mutex<Option<TimerCallback>>,
    firing: Mutex<()>,
    period: Mutex<Option<Duration>>,
    fail_arm: AtomicBool,
}

impl MockTimer {
    /// Create a disarmed timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke the armed callback once. Returns `false` when disarmed.
    pub fn fire(&self) -> bool {
        let _firing = self.firing.lock();
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Whether a callback is installed
    pub fn is_armed(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Period passed to the last `arm()`
    pub fn period(&self) -> Option<Duration> {
        *self.period.lock()
    }

    /// Make the next `arm()` fail, as when the timer resource is unavailable
    pub fn fail_arm(&self) {
        self.fail_arm.store(true, Ordering::SeqCst);
    }
}

impl PeriodicTimer for MockTimer {
    fn arm(&self, period: Duration, callback: TimerCallback) -> Result<()> {
        if self.fail_arm.load(Ordering::SeqCst) {
            bail!("timer resource unavailable");
        }
        let mut slot = self.callback.lock();
        if slot.is_some() {
            bail!("MockTimer already armed");
        }
        *slot = Some(callback);
        *self.period.lock() = Some(period);
        Ok(())
    }

    fn disarm(&self) -> Result<()> {
        self.callback.lock().take();
        // Wait out an edge that cloned the callback before it was taken
        drop(self.firing.lock());
        Ok(())
    }
}

// =============================================================================
// MockPin - Recording digital output
// =============================================================================

/// Digital output that records its current level and number of writes
#[derive(Default)]
pub struct MockPin {
    level: AtomicBool,
    writes: AtomicU64,
    fail: AtomicBool,
}

impl MockPin {
    /// Create a pin driven low
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level
    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Number of successful `set_level` calls
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following `set_level` fail
    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl DigitalOutput for MockPin {
    fn set_level(&self, high: bool) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("GPIO line unavailable");
        }
        self.level.store(high, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared handles to a complete set of simulated hardware.
pub struct MockRig {
    /// Environment sensor
    pub env: Arc<MockEnvironmentSensor>,
    /// Inertial sensor
    pub imu: Arc<MockImu>,
    /// Heartbeat output
    pub heartbeat: Arc<MockPin>,
}

impl MockRig {
    /// Simulated sensors and heartbeat pin with default behaviour
    pub fn new() -> Self {
        Self {
            env: Arc::new(MockEnvironmentSensor::new()),
            imu: Arc::new(MockImu::new()),
            heartbeat: Arc::new(MockPin::new()),
        }
    }
}

impl Default for MockRig {
    fn default() -> Self {
        Self::new()
    }
}

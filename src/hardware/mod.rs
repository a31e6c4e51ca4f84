//! Hardware collaborators
//!
//! Capability traits the pipeline depends on, a thread-driven timer, and mock
//! implementations for running without physical devices.

pub mod capabilities;
pub mod mock;
pub mod timer;

pub use capabilities::{DigitalOutput, PeriodicTimer, SensorSource, TimerCallback};
pub use timer::ThreadTimer;

//! # Sensor DAQ Core Library
//!
//! This crate is the core of the `sensor_daq` acquisition program. It samples two
//! independently polled sensors (an environment sensor and an inertial unit) on a
//! fixed-rate hardware clock, buffers the samples in memory and periodically appends
//! them to a CSV log, while a heartbeat output signals liveness.
//!
//! ## Data Flow
//!
//! ```text
//! PollerTask (env) ─┐
//!                   ├─→ ReadingCache ─(timer edge)→ SampleTrigger ─→ SampleBuffer
//! PollerTask (imu) ─┘                                                    │
//!                                                   Flusher (1 Hz) ←─────┘
//!                                                      │
//!                                                      ↓
//!                                               sensor_log_*.csv
//! ```
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (`figment`): defaults, TOML file, environment.
//! - **`controller`**: The `Controller` that owns a run and enforces start/stop ordering.
//! - **`data`**: Readings, the shared cache and buffer, and the persistent log.
//! - **`error`**: The `DaqError` enum for centralized error handling.
//! - **`hardware`**: Capability traits for sensors, the timer and digital outputs, plus
//!   a thread-driven timer and mock devices.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`pipeline`**: The pollers, trigger, flusher, heartbeat and their supervisor.

pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod pipeline;

//! CLI Entry Point for sensor-daq
//!
//! Provides command-line interface for:
//! - Running a timed acquisition on the simulated hardware
//! - Validating a configuration file and printing the log schema
//!
//! # Usage
//!
//! Run for the configured duration (Ctrl-C stops early):
//! ```bash
//! sensor_daq run --config config/default.toml --duration 10
//! ```
//!
//! Check a configuration:
//! ```bash
//! sensor_daq check-config --config config/default.toml
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use sensor_daq::config::{Settings, DEFAULT_CONFIG_PATH};
use sensor_daq::controller::{Controller, Hardware};
use sensor_daq::data::{header_columns, SourceLayout};
use sensor_daq::hardware::mock::MockRig;
use sensor_daq::hardware::ThreadTimer;
use sensor_daq::logging;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sensor_daq")]
#[command(about = "Dual-sensor sampling and logging pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire samples into a new CSV log
    Run {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Run length in seconds (overrides run.duration_secs)
        #[arg(long)]
        duration: Option<u64>,

        /// Trigger frequency in Hz (overrides sampling.frequency_hz)
        #[arg(long)]
        frequency: Option<f64>,

        /// Directory for the log file (overrides storage.output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Validate the configuration and print the log schema
    CheckConfig {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration,
            frequency,
            output_dir,
        } => {
            let mut settings = Settings::load_from(&config)?;
            if let Some(duration) = duration {
                settings.run.duration_secs = duration;
            }
            if let Some(frequency) = frequency {
                settings.sampling.frequency_hz = frequency;
            }
            if let Some(output_dir) = output_dir {
                settings.storage.output_dir = output_dir;
            }
            run(settings).await
        }
        Commands::CheckConfig { config } => check_config(config),
    }
}

async fn run(settings: Settings) -> Result<()> {
    settings.validate()?;
    logging::init_from_config(&settings).map_err(|e| anyhow!(e))?;

    let rig = MockRig::new();
    let hardware = Hardware::standard(
        &settings,
        rig.env.clone(),
        rig.imu.clone(),
        Arc::new(ThreadTimer::default()),
        rig.heartbeat.clone(),
    );
    let log_path = settings.log_file_path(chrono::Local::now());
    let duration = settings.run_duration();
    let mut controller = Controller::new(settings, log_path, hardware)?;

    controller.start().await?;
    info!(?duration, "Running; press Ctrl-C to stop early");

    wait_for_shutdown(duration, tokio::signal::ctrl_c()).await;

    let result = controller.stop().await;
    if let Some(summary) = controller.summary() {
        println!("Log: {}", controller.log_path().display());
        println!("{summary}");
    }
    result?;
    Ok(())
}

/// Sleep for `duration`, or until `interrupt` resolves. If the interrupt cannot be
/// listened for, the full duration still elapses.
async fn wait_for_shutdown<F>(duration: Duration, interrupt: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    let interrupt = async {
        match interrupt.await {
            Ok(()) => info!("Interrupted"),
            Err(e) => {
                warn!(error = %e, "Could not listen for Ctrl-C; running for the full duration");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = interrupt => {}
    }
}

fn check_config(path: PathBuf) -> Result<()> {
    let settings = Settings::load_from(&path)?;
    settings.validate()?;

    println!("Configuration OK: {}", path.display());
    println!(
        "Sampling at {} Hz, flushing every {:?}",
        settings.sampling.frequency_hz,
        settings.flush_interval()
    );
    println!(
        "Log file: {}",
        settings.log_file_path(chrono::Local::now()).display()
    );
    let columns = header_columns(&[SourceLayout::environment(), SourceLayout::inertial()]);
    println!("Columns: {}", columns.join(","));
    println!();
    println!("Effective configuration:");
    print!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

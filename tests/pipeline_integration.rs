//! End-to-end tests of the sampling pipeline: poll → cache → trigger → buffer → log.

use sensor_daq::config::Settings;
use sensor_daq::controller::{Controller, Hardware};
use sensor_daq::data::{Reading, SourceLayout};
use sensor_daq::hardware::mock::{MockPin, MockRig, MockTimer, ScriptedSource};
use sensor_daq::hardware::ThreadTimer;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn test_settings() -> Settings {
    let toml_str = r#"
        [application]
        name = "sensor-daq-test"
        log_level = "debug"
        log_format = "compact"

        [sampling]
        frequency_hz = 100.0
        env_poll_interval_ms = 1
        imu_poll_interval_ms = 1

        [storage]
        output_dir = "."
        file_prefix = "sensor_log"
        missing_marker = ""
        flush_interval_ms = 100

        [shutdown]
        join_timeout_ms = 1000

        [run]
        duration_secs = 1
    "#;
    toml::from_str(toml_str).expect("Failed to parse test config")
}

struct ScriptedRig {
    env: Arc<ScriptedSource>,
    imu: Arc<ScriptedSource>,
    timer: Arc<MockTimer>,
    pin: Arc<MockPin>,
}

impl ScriptedRig {
    fn new() -> Self {
        Self {
            env: Arc::new(ScriptedSource::new(SourceLayout::environment())),
            imu: Arc::new(ScriptedSource::new(SourceLayout::inertial())),
            timer: Arc::new(MockTimer::new()),
            pin: Arc::new(MockPin::new()),
        }
    }

    fn hardware(&self, settings: &Settings) -> Hardware {
        Hardware::standard(
            settings,
            self.env.clone(),
            self.imu.clone(),
            self.timer.clone(),
            self.pin.clone(),
        )
    }
}

/// Wait until the cached `env` temperature equals `temperature`.
async fn wait_for_temperature(controller: &Controller, temperature: f64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = controller.cache().snapshot();
        let current = snapshot
            .get("env")
            .and_then(|p| p.reading)
            .and_then(|r| r.get(1));
        if current == Some(temperature) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "poller never published temperature {temperature}"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

fn read_log(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("log readable");
    let header = reader
        .headers()
        .expect("header present")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.expect("valid record").iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_rows_follow_cache_updates() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings();
    let rig = ScriptedRig::new();
    let path = dir.path().join("scenario.csv");
    let mut controller =
        Controller::new(settings.clone(), &path, rig.hardware(&settings)).unwrap();

    rig.env.set(Reading::from_values(&[1005.0, 21.0]));
    controller.start().await.unwrap();
    wait_for_temperature(&controller, 21.0).await;

    assert!(rig.timer.fire());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(rig.timer.fire());

    rig.env.set(Reading::from_values(&[1005.0, 21.5]));
    wait_for_temperature(&controller, 21.5).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(rig.timer.fire());

    let summary = controller.stop().await.unwrap();
    assert_eq!(summary.trigger.fired, 3);

    let (header, rows) = read_log(&path);
    assert_eq!(header.len(), 13);
    assert_eq!(rows.len(), 3);

    let expected = [("0", "21.0"), ("1", "21.0"), ("2", "21.5")];
    for (row, (tick, temperature)) in rows.iter().zip(expected) {
        assert_eq!(row[0], tick);
        assert_eq!(row[2], "1005.0");
        assert_eq!(row[3], temperature);
        // The IMU never produced data
        assert!(row[4..].iter().all(String::is_empty));
    }

    let timestamps: Vec<f64> = rows.iter().map(|r| r[1].parse().unwrap()).collect();
    assert!(timestamps[0] > 0.0);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rows_buffered_at_stop_reach_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings();
    settings.storage.flush_interval_ms = 500;
    let rig = ScriptedRig::new();
    let path = dir.path().join("final_flush.csv");
    let mut controller =
        Controller::new(settings.clone(), &path, rig.hardware(&settings)).unwrap();

    controller.start().await.unwrap();
    // Let the flusher's immediate first cycle pass
    tokio::time::sleep(Duration::from_millis(50)).await;

    const M: usize = 25;
    for _ in 0..M {
        rig.timer.fire();
    }
    assert_eq!(controller.buffer().len(), M);

    let summary = controller.stop().await.unwrap();
    assert!(controller.buffer().is_empty());
    assert_eq!(summary.flusher.unwrap().rows_written, M as u64);

    let (_, rows) = read_log(&path);
    let ticks: Vec<u64> = rows.iter().map(|r| r[0].parse().unwrap()).collect();
    assert_eq!(ticks, (0..M as u64).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_reads_keep_last_value_in_log() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings();
    let rig = ScriptedRig::new();
    let path = dir.path().join("stale.csv");
    let mut controller =
        Controller::new(settings.clone(), &path, rig.hardware(&settings)).unwrap();

    rig.env.set(Reading::from_values(&[1005.0, 21.0]));
    controller.start().await.unwrap();
    wait_for_temperature(&controller, 21.0).await;

    rig.env.fail("i2c timeout");
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.timer.fire();

    let summary = controller.stop().await.unwrap();
    let env_stats = &summary
        .pollers
        .iter()
        .find(|(name, _)| name == "env")
        .unwrap()
        .1;
    assert!(env_stats.failures > 0);

    let (_, rows) = read_log(&path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][2], "1005.0");
    assert_eq!(rows[0][3], "21.0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thread_timer_run_produces_contiguous_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings();
    let rig = MockRig::new();
    let hardware = Hardware::standard(
        &settings,
        rig.env.clone(),
        rig.imu.clone(),
        Arc::new(ThreadTimer::default()),
        rig.heartbeat.clone(),
    );
    let path = dir.path().join("timed.csv");
    let mut controller = Controller::new(settings, &path, hardware).unwrap();

    controller.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let summary = controller.stop().await.unwrap();

    let (header, rows) = read_log(&path);
    assert_eq!(header[0], "tick");
    assert!(rows.len() >= 5, "only {} rows in 300 ms at 100 Hz", rows.len());
    assert_eq!(rows.len() as u64, summary.trigger.produced);
    assert_eq!(summary.trigger.dropped, 0);

    let ticks: Vec<u64> = rows.iter().map(|r| r[0].parse().unwrap()).collect();
    assert_eq!(ticks, (0..ticks.len() as u64).collect::<Vec<_>>());

    // Both mock sensors report within the first few milliseconds
    let last = rows.last().unwrap();
    assert!(!last[2].is_empty());
    assert!(!last[4].is_empty());
    assert!(!rig.heartbeat.level());
}

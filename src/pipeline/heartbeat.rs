//! Heartbeat indicator: toggles a digital output while the pipeline runs.

use crate::hardware::capabilities::DigitalOutput;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Blinks an output at a fixed interval and leaves it low on exit.
pub struct Heartbeat {
    pin: Arc<dyn DigitalOutput>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl Heartbeat {
    /// Create a heartbeat toggling `pin` every `interval`.
    pub fn new(pin: Arc<dyn DigitalOutput>, interval: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            pin,
            interval,
            running,
        }
    }

    /// Toggle until the run flag clears. Returns the number of successful toggles.
    pub async fn run(self) -> u64 {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut level = false;
        let mut toggles = 0u64;
        let mut warned = false;

        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            level = !level;
            match self.pin.set_level(level) {
                Ok(()) => toggles += 1,
                Err(e) if !warned => {
                    warned = true;
                    warn!(error = %e, "Heartbeat output failed");
                }
                Err(_) => {}
            }
        }

        if let Err(e) = self.pin.set_level(false) {
            warn!(error = %e, "Could not drive heartbeat output low");
        }
        debug!(toggles, "Heartbeat stopped");
        toggles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockPin;

    #[tokio::test]
    async fn toggles_while_running_and_ends_low() {
        let pin = Arc::new(MockPin::new());
        let running = Arc::new(AtomicBool::new(true));
        let heartbeat = Heartbeat::new(pin.clone(), Duration::from_millis(2), Arc::clone(&running));

        let handle = tokio::spawn(heartbeat.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        running.store(false, Ordering::SeqCst);

        let toggles = handle.await.unwrap();
        assert!(toggles >= 2);
        assert!(!pin.level());
        assert_eq!(pin.writes(), toggles + 1);
    }

    #[tokio::test]
    async fn output_failures_do_not_stop_the_task() {
        let pin = Arc::new(MockPin::new());
        pin.fail_writes();
        let running = Arc::new(AtomicBool::new(true));
        let heartbeat = Heartbeat::new(pin.clone(), Duration::from_millis(2), Arc::clone(&running));

        let handle = tokio::spawn(heartbeat.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        running.store(false, Ordering::SeqCst);

        assert_eq!(handle.await.unwrap(), 0);
    }
}

//! Pipeline tasks
//!
//! - [`poller`]: one task per sensor source, refreshing the reading cache
//! - [`trigger`]: the timer edge handler that turns cache snapshots into rows
//! - [`flusher`]: drains the buffer into the persistent log
//! - [`heartbeat`]: liveness output
//! - [`supervisor`]: join handles and ordered teardown

pub mod flusher;
pub mod heartbeat;
pub mod poller;
pub mod supervisor;
pub mod trigger;

pub use flusher::{Flusher, FlusherStats};
pub use heartbeat::Heartbeat;
pub use poller::{PollOutcome, PollerStats, PollerTask};
pub use supervisor::{Supervisor, TaskReport};
pub use trigger::{SampleTrigger, SystemClock, TriggerStats, WallClock};

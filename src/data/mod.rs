//! Sample data types, the shared cache and buffer, and the persistent log.
pub mod buffer;
pub mod cache;
pub mod reading;
pub mod storage;

pub use buffer::SampleBuffer;
pub use cache::{ReadingCache, Snapshot, SourceId};
pub use reading::{header_columns, Reading, SampleRow, SourceLayout};
pub use storage::{CsvLog, SampleLog};

//! FIFO of sample rows between the trigger (producer) and the flusher (consumer).
//!
//! `drain` swaps the backing vector for an empty one while holding the lock, so the
//! flusher performs its file I/O on rows it owns and the trigger never waits on it.

use crate::data::reading::SampleRow;
use parking_lot::Mutex;

/// Lock-protected queue of [`SampleRow`]s.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    rows: Mutex<Vec<SampleRow>>,
}

impl SampleBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row at the tail.
    pub fn append(&self, row: SampleRow) {
        self.rows.lock().push(row);
    }

    /// Take every buffered row, oldest first, leaving the buffer empty.
    pub fn drain(&self) -> Vec<SampleRow> {
        std::mem::take(&mut *self.rows.lock())
    }

    /// Number of rows waiting to be flushed.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Whether no rows are waiting.
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

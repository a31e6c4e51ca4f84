//! Persistent sample log.
//!
//! [`SampleLog`] is the append-only sink the flusher writes batches into. [`CsvLog`]
//! is the on-disk implementation: the header is written and flushed when the file is
//! created, then each batch is appended through the held handle and flushed as a unit.
use crate::{data::reading::SampleRow, error::AppResult};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Append-only row store.
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait SampleLog: Send {
    /// Append a batch of rows in the given order.
    fn append(&mut self, rows: &[SampleRow]) -> AppResult<()>;

    /// Flush and release the underlying resource. Further appends are ignored.
    fn close(&mut self) -> AppResult<()>;
}

/// A writer for CSV sample logs.
pub struct CsvLog {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    missing_marker: String,
    rows_written: u64,
}

impl CsvLog {
    /// Create the file (truncating any existing one) and write the header row.
    pub fn create(
        path: impl AsRef<Path>,
        header: &[String],
        missing_marker: impl Into<String>,
    ) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(header)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), columns = header.len(), "Sample log created");

        Ok(Self {
            path,
            writer: Some(writer),
            missing_marker: missing_marker.into(),
            rows_written: 0,
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended since creation.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl SampleLog for CsvLog {
    fn append(&mut self, rows: &[SampleRow]) -> AppResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            tracing::warn!(rows = rows.len(), "Append to closed sample log ignored");
            return Ok(());
        };
        for row in rows {
            writer.write_record(row.to_record(&self.missing_marker))?;
        }
        writer.flush()?;
        self.rows_written += rows.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> AppResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            tracing::info!(
                path = %self.path.display(),
                rows = self.rows_written,
                "Sample log closed"
            );
        }
        Ok(())
    }
}

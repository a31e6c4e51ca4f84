//! Value types flowing through the pipeline.
//!
//! A [`Reading`] is one source's field group (e.g. pressure + temperature, or three
//! 3-axis vectors flattened). Every field is an `Option<f64>`: `None` means the sensor
//! had no value for that field and is written to the log as the missing marker.
//!
//! A [`SourceLayout`] names a source and its ordered fields. The cache, the trigger and
//! the log header are all derived from the same list of layouts, which keeps row
//! columns and header columns aligned.

use serde::{Deserialize, Serialize};

/// Name and ordered field names of one sensor source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLayout {
    /// Source name (e.g. `"env"`, `"imu"`)
    pub name: String,
    /// Column names of this source's fields, in reading order
    pub fields: Vec<String>,
}

impl SourceLayout {
    /// Create a layout from a name and its field names.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Pressure/temperature source, columns `pressure_hPa, temp_C`.
    pub fn environment() -> Self {
        Self::new("env", ["pressure_hPa", "temp_C"])
    }

    /// Inertial source: acceleration, angular rate and Euler angles, 3 axes each.
    pub fn inertial() -> Self {
        Self::new(
            "imu",
            [
                "accel_x", "accel_y", "accel_z", "gyro_x", "gyro_y", "gyro_z", "euler_x",
                "euler_y", "euler_z",
            ],
        )
    }

    /// Number of fields in a reading from this source.
    pub fn width(&self) -> usize {
        self.fields.len()
    }
}

/// Log header for a set of sources: `tick, timestamp`, then every source's fields.
pub fn header_columns(layouts: &[SourceLayout]) -> Vec<String> {
    let mut columns = vec!["tick".to_string(), "timestamp".to_string()];
    columns.extend(layouts.iter().flat_map(|l| l.fields.iter().cloned()));
    columns
}

/// One source's field group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    values: Vec<Option<f64>>,
}

impl Reading {
    /// Build a reading from per-field values.
    pub fn new(values: impl Into<Vec<Option<f64>>>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Build a reading in which every field is present.
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            values: values.iter().copied().map(Some).collect(),
        }
    }

    /// Build a reading from optional 3-axis vectors, as returned by an IMU driver that may
    /// have no value for a whole vector.
    pub fn from_vectors(vectors: &[Option<[f64; 3]>]) -> Self {
        let values = vectors
            .iter()
            .flat_map(|v| match v {
                Some([x, y, z]) => [Some(*x), Some(*y), Some(*z)],
                None => [None, None, None],
            })
            .collect();
        Self { values }
    }

    /// Per-field values.
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Number of fields.
    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Value of field `index`, `None` when absent or out of range.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }
}

/// A buffered sample: tick, wall-clock seconds and every cache field at capture time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Trigger sequence number, starting at 0
    pub tick: u64,
    /// Wall-clock seconds since the Unix epoch
    pub timestamp: f64,
    /// Cache fields in header order; `None` is written as the missing marker
    pub values: Vec<Option<f64>>,
}

impl SampleRow {
    /// Render the row as CSV fields. Floats keep their decimal point (`1005.0`).
    pub fn to_record(&self, missing_marker: &str) -> Vec<String> {
        let mut record = Vec::with_capacity(self.values.len() + 2);
        record.push(self.tick.to_string());
        record.push(format!("{:?}", self.timestamp));
        record.extend(self.values.iter().map(|v| match v {
            Some(value) => format!("{value:?}"),
            None => missing_marker.to_string(),
        }));
        record
    }
}

//! Latest-value cache shared between the pollers and the sample trigger.
//!
//! Every source owns a fixed slice of one flat field array, allocated when the cache is
//! built. The lock is private to [`ReadingCache`]: callers can only
//! [`update`](ReadingCache::update) one source or take a
//! [`snapshot`](ReadingCache::snapshot) of all of them. Inside the lock both operations
//! copy plain `Option<f64>` values into storage that already exists, so neither
//! allocates nor waits on I/O.
//!
//! Fields are merged, not replaced: a reading that lacks a field keeps that field's last
//! good value. A field reads as `None` only until its source first delivers it.

use crate::data::reading::{Reading, SourceLayout};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;

/// Index of a source partition, resolved once from its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PartitionState {
    available: bool,
    updates: u64,
}

#[derive(Debug)]
struct CacheState {
    fields: Vec<Option<f64>>,
    partitions: Vec<PartitionState>,
}

/// State of one source at snapshot time.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionSnapshot {
    /// Source name
    pub source: String,
    /// Latest merged reading, `None` until the first successful poll
    pub reading: Option<Reading>,
    /// Number of updates applied so far
    pub updates: u64,
}

impl PartitionSnapshot {
    /// Whether the source has ever delivered a reading.
    pub fn is_available(&self) -> bool {
        self.reading.is_some()
    }
}

/// Consistent copy of every partition.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    layouts: Arc<[SourceLayout]>,
    ranges: Arc<[Range<usize>]>,
    states: Vec<PartitionState>,
    fields: Vec<Option<f64>>,
}

impl Snapshot {
    fn partition(&self, index: usize) -> PartitionSnapshot {
        let state = self.states[index];
        let range = self.ranges[index].clone();
        PartitionSnapshot {
            source: self.layouts[index].name.clone(),
            reading: state
                .available
                .then(|| Reading::new(self.fields[range].to_vec())),
            updates: state.updates,
        }
    }

    /// All partitions in registration order.
    pub fn partitions(&self) -> Vec<PartitionSnapshot> {
        (0..self.layouts.len()).map(|i| self.partition(i)).collect()
    }

    /// Partition for a source name.
    pub fn get(&self, source: &str) -> Option<PartitionSnapshot> {
        self.layouts
            .iter()
            .position(|l| l.name == source)
            .map(|i| self.partition(i))
    }

    /// Every field of every source, in header order. Consumes the snapshot.
    ///
    /// Fields a source has never delivered are `None`.
    pub fn flatten(self) -> Vec<Option<f64>> {
        self.fields
    }
}

/// Shared store of the latest reading per source.
#[derive(Debug)]
pub struct ReadingCache {
    layouts: Arc<[SourceLayout]>,
    ranges: Arc<[Range<usize>]>,
    width: usize,
    state: Mutex<CacheState>,
}

impl ReadingCache {
    /// Create an empty cache with one partition per layout.
    pub fn new(layouts: Vec<SourceLayout>) -> Self {
        let mut offset = 0;
        let ranges: Arc<[Range<usize>]> = layouts
            .iter()
            .map(|layout| {
                let range = offset..offset + layout.width();
                offset = range.end;
                range
            })
            .collect();
        let state = CacheState {
            fields: vec![None; offset],
            partitions: vec![PartitionState::default(); layouts.len()],
        };
        Self {
            layouts: layouts.into(),
            ranges,
            width: offset,
            state: Mutex::new(state),
        }
    }

    /// Layouts of the registered sources.
    pub fn layouts(&self) -> &[SourceLayout] {
        &self.layouts
    }

    /// Resolve a source name to its partition.
    pub fn source_id(&self, source: &str) -> Option<SourceId> {
        self.layouts
            .iter()
            .position(|l| l.name == source)
            .map(SourceId)
    }

    /// Layout of a resolved source.
    pub fn layout(&self, id: SourceId) -> &SourceLayout {
        &self.layouts[id.0]
    }

    /// Merge a reading into its source's field group.
    ///
    /// Present fields overwrite the cached value; absent fields keep it. The reading must
    /// have the layout's width; pollers check this before calling.
    pub fn update(&self, id: SourceId, reading: Reading) {
        debug_assert_eq!(reading.width(), self.layouts[id.0].width());
        let range = self.ranges[id.0].clone();

        let mut state = self.state.lock();
        for (slot, value) in state.fields[range].iter_mut().zip(reading.values()) {
            if value.is_some() {
                *slot = *value;
            }
        }
        let partition = &mut state.partitions[id.0];
        partition.available = true;
        partition.updates += 1;
    }

    /// Copy every partition under one lock acquisition.
    pub fn snapshot(&self) -> Snapshot {
        let mut fields = vec![None; self.width];
        let mut states = Vec::with_capacity(self.layouts.len());
        {
            let state = self.state.lock();
            fields.copy_from_slice(&state.fields);
            states.extend_from_slice(&state.partitions);
        }
        Snapshot {
            layouts: Arc::clone(&self.layouts),
            ranges: Arc::clone(&self.ranges),
            states,
            fields,
        }
    }
}

/*
# Sample Table Module

 Immutable per-track index of sample offsets, sizes, presentation timestamps and flags, with
 O(log n) lookup of the nearest sync sample before or after a time.

 Tables for progressive containers are built once from the box tables; fragmented containers
 grow a `SampleTableBuilder` fragment by fragment and publish snapshots.
*/

pub mod builder;
pub use builder::SampleTableBuilder;

use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::output::SampleFlags;
use serde::Serialize;

/// Sample index of one track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleTable {
    offsets: Vec<u64>,
    sizes: Vec<u32>,
    timestamps_us: Vec<i64>,
    flags: Vec<SampleFlags>,
    /// Strictly ascending indices of sync samples; empty when every sample is a sync sample.
    sync_sample_indices: Vec<usize>,
    has_only_sync_samples: bool,
    maximum_size: u32,
    duration_us: i64,
}

impl SampleTable {
    /// Build a table from parallel per-sample arrays.
    ///
    /// The last sample always gets `SampleFlags::LAST_SAMPLE`, whatever its parsed flags were.
    pub fn new(
        offsets: Vec<u64>,
        sizes: Vec<u32>,
        timestamps_us: Vec<i64>,
        mut flags: Vec<SampleFlags>,
        duration_us: i64,
    ) -> MediaParserResult<Self> {
        let count = offsets.len();
        if sizes.len() != count || timestamps_us.len() != count || flags.len() != count {
            return Err(MediaParserError::contract(format!(
                "sample table arrays differ in length: offsets={}, sizes={}, timestamps={}, flags={}",
                count,
                sizes.len(),
                timestamps_us.len(),
                flags.len()
            )));
        }
        if let Some(last) = flags.last_mut() {
            last.insert(SampleFlags::LAST_SAMPLE);
        }
        let sync_sample_indices: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_keyframe())
            .map(|(i, _)| i)
            .collect();
        let has_only_sync_samples = count > 0 && sync_sample_indices.len() == count;
        let maximum_size = sizes.iter().copied().max().unwrap_or(0);
        Ok(Self {
            offsets,
            sizes,
            timestamps_us,
            flags,
            sync_sample_indices: if has_only_sync_samples {
                Vec::new()
            } else {
                sync_sample_indices
            },
            has_only_sync_samples,
            maximum_size,
            duration_us,
        })
    }

    pub fn empty() -> Self {
        Self {
            offsets: Vec::new(),
            sizes: Vec::new(),
            timestamps_us: Vec::new(),
            flags: Vec::new(),
            sync_sample_indices: Vec::new(),
            has_only_sync_samples: false,
            maximum_size: 0,
            duration_us: 0,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn timestamps_us(&self) -> &[i64] {
        &self.timestamps_us
    }

    pub fn flags(&self) -> &[SampleFlags] {
        &self.flags
    }

    pub fn sync_sample_indices(&self) -> &[usize] {
        &self.sync_sample_indices
    }

    pub fn has_only_sync_samples(&self) -> bool {
        self.has_only_sync_samples
    }

    pub fn maximum_size(&self) -> u32 {
        self.maximum_size
    }

    pub fn duration_us(&self) -> i64 {
        self.duration_us
    }

    pub fn is_sync_sample(&self, index: usize) -> bool {
        self.flags.get(index).map_or(false, |f| f.is_keyframe())
    }

    /// Index of the sync sample with the greatest timestamp `<= time_us`.
    ///
    /// Among adjacent sync samples sharing that timestamp the smallest index wins. `None` when
    /// no sync sample is at or before `time_us`.
    pub fn index_of_earlier_or_equal_sync_sample(&self, time_us: i64) -> Option<usize> {
        if self.has_only_sync_samples {
            let found = floor_search(self.timestamps_us.len(), |i| self.timestamps_us[i], time_us)?;
            return Some(self.widen_backward(found, |i| i, time_us));
        }
        let ts = |k: usize| self.timestamps_us[self.sync_sample_indices[k]];
        let found = floor_search(self.sync_sample_indices.len(), ts, time_us)?;
        let k = self.widen_backward(found, |k| self.sync_sample_indices[k], time_us);
        Some(self.sync_sample_indices[k])
    }

    /// Index of the sync sample with the smallest timestamp `>= time_us`.
    ///
    /// Among adjacent sync samples sharing that timestamp the largest index wins. `None` when
    /// no sync sample is at or after `time_us`.
    pub fn index_of_later_or_equal_sync_sample(&self, time_us: i64) -> Option<usize> {
        if self.has_only_sync_samples {
            let found =
                ceiling_search(self.timestamps_us.len(), |i| self.timestamps_us[i], time_us)?;
            return Some(self.widen_forward(found, self.timestamps_us.len(), |i| i, time_us));
        }
        let ts = |k: usize| self.timestamps_us[self.sync_sample_indices[k]];
        let found = ceiling_search(self.sync_sample_indices.len(), ts, time_us)?;
        let k = self.widen_forward(
            found,
            self.sync_sample_indices.len(),
            |k| self.sync_sample_indices[k],
            time_us,
        );
        Some(self.sync_sample_indices[k])
    }

    /// Step back over neighbours whose timestamp equals `time_us` exactly.
    fn widen_backward(&self, mut k: usize, sample: impl Fn(usize) -> usize, time_us: i64) -> usize {
        if self.timestamps_us[sample(k)] != time_us {
            return k;
        }
        while k > 0 && self.timestamps_us[sample(k - 1)] == time_us {
            k -= 1;
        }
        k
    }

    /// Step forward over neighbours whose timestamp equals `time_us` exactly.
    fn widen_forward(
        &self,
        mut k: usize,
        len: usize,
        sample: impl Fn(usize) -> usize,
        time_us: i64,
    ) -> usize {
        if self.timestamps_us[sample(k)] != time_us {
            return k;
        }
        while k + 1 < len && self.timestamps_us[sample(k + 1)] == time_us {
            k += 1;
        }
        k
    }
}

/// Binary search over `len` candidates for the last one whose key is `<= target`.
fn floor_search(len: usize, key: impl Fn(usize) -> i64, target: i64) -> Option<usize> {
    let (mut low, mut high) = (0usize, len);
    let mut best = None;
    while low < high {
        let mid = low + (high - low) / 2;
        if key(mid) <= target {
            best = Some(mid);
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    best
}

/// Binary search over `len` candidates for the first one whose key is `>= target`.
fn ceiling_search(len: usize, key: impl Fn(usize) -> i64, target: i64) -> Option<usize> {
    let (mut low, mut high) = (0usize, len);
    let mut best = None;
    while low < high {
        let mid = low + (high - low) / 2;
        if key(mid) >= target {
            best = Some(mid);
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    best
}

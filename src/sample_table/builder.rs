use super::SampleTable;
use crate::errors::MediaParserResult;
use crate::extractor::output::SampleFlags;

/// Append-only sample arrays for tracks whose index grows fragment by fragment
#[derive(Debug, Clone, Default)]
pub struct SampleTableBuilder {
    offsets: Vec<u64>,
    sizes: Vec<u32>,
    timestamps_us: Vec<i64>,
    flags: Vec<SampleFlags>,
    duration_us: i64,
}

impl SampleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, offset: u64, size: u32, timestamp_us: i64, flags: SampleFlags) {
        self.offsets.push(offset);
        self.sizes.push(size);
        self.timestamps_us.push(timestamp_us);
        self.flags.push(flags);
    }

    /// Reserve room for `additional` more samples.
    pub fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
        self.sizes.reserve(additional);
        self.timestamps_us.reserve(additional);
        self.flags.reserve(additional);
    }

    pub fn set_duration_us(&mut self, duration_us: i64) {
        self.duration_us = duration_us;
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn timestamps_us(&self) -> &[i64] {
        &self.timestamps_us
    }

    /// Immutable table of everything appended so far. The builder keeps growing.
    pub fn snapshot(&self) -> MediaParserResult<SampleTable> {
        SampleTable::new(
            self.offsets.clone(),
            self.sizes.clone(),
            self.timestamps_us.clone(),
            self.flags.clone(),
            self.duration_us,
        )
    }

    pub fn build(self) -> MediaParserResult<SampleTable> {
        SampleTable::new(
            self.offsets,
            self.sizes,
            self.timestamps_us,
            self.flags,
            self.duration_us,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Sample = (u64, u32, i64, bool);

    fn append_all(builder: &mut SampleTableBuilder, samples: &[Sample]) {
        builder.reserve(samples.len());
        for &(offset, size, ts, sync) in samples {
            let flags = if sync {
                SampleFlags::KEYFRAME
            } else {
                SampleFlags::NONE
            };
            builder.push(offset, size, ts, flags);
        }
    }

    #[test]
    fn test_snapshot_does_not_consume() {
        let mut b = SampleTableBuilder::new();
        append_all(&mut b, &[(0, 10, 0, true), (10, 20, 33, false)]);
        let first = b.snapshot().unwrap();
        append_all(&mut b, &[(30, 5, 66, true)]);
        let second = b.snapshot().unwrap();
        assert_eq!(first.sample_count(), 2);
        assert_eq!(second.sample_count(), 3);
        // the former last sample loses its forced flag once more samples follow
        assert!(!second.flags()[1].contains(SampleFlags::LAST_SAMPLE));
        assert_eq!(second.maximum_size(), 20);
    }

    proptest! {
        #[test]
        fn prop_fragment_appends_match_single_append(
            samples in prop::collection::vec((0u64..1_000_000, 1u32..10_000, 0i64..10_000_000, any::<bool>()), 1..80),
            cuts in prop::collection::vec(0usize..80, 0..6),
        ) {
            let mut whole = SampleTableBuilder::new();
            append_all(&mut whole, &samples);
            whole.set_duration_us(42);

            let mut boundaries: Vec<usize> = cuts.into_iter().map(|c| c % (samples.len() + 1)).collect();
            boundaries.push(0);
            boundaries.push(samples.len());
            boundaries.sort_unstable();
            let mut fragmented = SampleTableBuilder::new();
            for window in boundaries.windows(2) {
                append_all(&mut fragmented, &samples[window[0]..window[1]]);
            }
            fragmented.set_duration_us(42);

            prop_assert_eq!(whole.build().unwrap(), fragmented.build().unwrap());
        }
    }
}

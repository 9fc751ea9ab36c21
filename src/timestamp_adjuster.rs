/*
# Timestamp Adjuster

 Maps wrapping fixed-width presentation timestamps (33-bit MPEG ticks at 90 kHz by default) onto
 an unbounded microsecond timeline anchored at the first sample time of the session.

 One adjuster exists per extraction session and is owned by the reader that needs it.
*/

use log::trace;

/// Tick rate of MPEG presentation timestamps.
pub const MPEG_TICKS_PER_SECOND: i64 = 90_000;
/// Width of MPEG presentation timestamps.
pub const MPEG_PTS_BITS: u32 = 33;

const MICROS_PER_SECOND: i128 = 1_000_000;

/// Wraparound-correcting timestamp mapper
#[derive(Debug, Clone)]
pub struct TimestampAdjuster {
    first_sample_timestamp_us: i64,
    timestamp_offset_us: Option<i64>,
    last_unadjusted_timestamp_us: Option<i64>,
    wrap_period: i64,
    ticks_per_second: i64,
}

impl TimestampAdjuster {
    /// Adjuster for 33-bit, 90 kHz timestamps whose first adjusted sample lands on
    /// `first_sample_timestamp_us`.
    pub fn new(first_sample_timestamp_us: i64) -> Self {
        Self::with_clock(
            first_sample_timestamp_us,
            MPEG_PTS_BITS,
            MPEG_TICKS_PER_SECOND,
        )
    }

    /// Adjuster for a `wrap_bits`-wide counter ticking `ticks_per_second` times a second.
    pub fn with_clock(first_sample_timestamp_us: i64, wrap_bits: u32, ticks_per_second: i64) -> Self {
        Self {
            first_sample_timestamp_us,
            timestamp_offset_us: None,
            last_unadjusted_timestamp_us: None,
            wrap_period: 1i64 << wrap_bits,
            ticks_per_second,
        }
    }

    pub fn first_sample_timestamp_us(&self) -> i64 {
        self.first_sample_timestamp_us
    }

    /// Offset added to unadjusted timestamps, once the first sample has been seen.
    pub fn timestamp_offset_us(&self) -> Option<i64> {
        self.timestamp_offset_us
    }

    /// Forget wrap state and offset, anchoring the next sample at `first_sample_timestamp_us`.
    pub fn reset(&mut self, first_sample_timestamp_us: i64) {
        self.first_sample_timestamp_us = first_sample_timestamp_us;
        self.timestamp_offset_us = None;
        self.last_unadjusted_timestamp_us = None;
    }

    /// Adjust a raw wrapping timestamp in ticks.
    ///
    /// The raw value is unwrapped to whichever candidate (one wrap below or at the current
    /// wrap count) lies nearest to the previously observed timestamp.
    pub fn adjust_ts_timestamp(&mut self, pts: i64) -> i64 {
        let mut pts = pts;
        if let Some(last_us) = self.last_unadjusted_timestamp_us {
            let last_pts = self.us_to_non_wrapped_pts(last_us);
            let closest_wrap_count = (last_pts + self.wrap_period / 2) / self.wrap_period;
            let wrap_below = pts + self.wrap_period * (closest_wrap_count - 1);
            let wrap_above = pts + self.wrap_period * closest_wrap_count;
            pts = if (wrap_below - last_pts).abs() < (wrap_above - last_pts).abs() {
                wrap_below
            } else {
                wrap_above
            };
            trace!(
                "unwrapped pts to {} (last {}, wrap count {})",
                pts,
                last_pts,
                closest_wrap_count
            );
        }
        let time_us = self.pts_to_us(pts);
        self.adjust_sample_timestamp(time_us)
    }

    /// Adjust an already unwrapped timestamp in microseconds.
    ///
    /// The first call fixes the offset so that this sample maps to the first sample time.
    pub fn adjust_sample_timestamp(&mut self, time_us: i64) -> i64 {
        let offset = *self
            .timestamp_offset_us
            .get_or_insert(self.first_sample_timestamp_us - time_us);
        self.last_unadjusted_timestamp_us = Some(time_us);
        time_us + offset
    }

    /// Ticks to microseconds, truncating toward zero.
    pub fn pts_to_us(&self, pts: i64) -> i64 {
        (i128::from(pts) * MICROS_PER_SECOND / i128::from(self.ticks_per_second)) as i64
    }

    /// Microseconds to ticks without wrapping, truncating toward zero.
    pub fn us_to_non_wrapped_pts(&self, us: i64) -> i64 {
        (i128::from(us) * i128::from(self.ticks_per_second) / MICROS_PER_SECOND) as i64
    }

    /// Microseconds to ticks modulo the wrap period. Negative times keep their sign.
    pub fn us_to_wrapped_pts(&self, us: i64) -> i64 {
        self.us_to_non_wrapped_pts(us) % self.wrap_period
    }
}

/// 90 kHz ticks to microseconds.
pub fn pts_to_us(pts: i64) -> i64 {
    (i128::from(pts) * MICROS_PER_SECOND / i128::from(MPEG_TICKS_PER_SECOND)) as i64
}

/// Microseconds to 90 kHz ticks.
pub fn us_to_non_wrapped_pts(us: i64) -> i64 {
    (i128::from(us) * i128::from(MPEG_TICKS_PER_SECOND) / MICROS_PER_SECOND) as i64
}

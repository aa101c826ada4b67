//! Rational numbers for time bases and frame rates.

use std::fmt;
use std::time::Duration;

#[cfg(feature = "ffmpeg")]
use crate::libav::rescale_ticks;

/// A fraction `num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Placeholder for values the encoder should treat as unset.
    pub const UNSET: Rational = Rational::new(0, 0);

    const NANOSECOND: Rational = Rational::new(1, 1_000_000_000);

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// True when both terms are positive.
    pub fn is_positive(self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn as_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    pub fn invert(self) -> Self {
        Self::new(self.den, self.num)
    }

    /// Convert `ts` from time base `from` to time base `to`.
    ///
    /// Rounds to the nearest tick, ties away from zero. A degenerate base
    /// (zero term) returns `ts` unchanged. With the `ffmpeg` feature the
    /// conversion is libavutil's `av_rescale_q_rnd`.
    pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
        if from.den == 0 || to.num == 0 {
            return ts;
        }
        rescale_ticks(ts, from, to)
    }

    /// Express `duration` as a tick count in this time base.
    pub fn ticks(self, duration: Duration) -> i64 {
        if !self.is_positive() {
            return 0;
        }
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self::rescale(nanos, Self::NANOSECOND, self)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Saturates at the `i64` range.
#[cfg(not(feature = "ffmpeg"))]
fn rescale_ticks(ts: i64, from: Rational, to: Rational) -> i64 {
    let numerator = ts as i128 * from.num as i128 * to.den as i128;
    let denominator = from.den as i128 * to.num as i128;
    let value = div_round(numerator, denominator);
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(not(feature = "ffmpeg"))]
fn div_round(n: i128, d: i128) -> i128 {
    let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };
    let half = d / 2;
    if n >= 0 {
        (n + half) / d
    } else {
        -((-n + half) / d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MICROS: Rational = Rational::new(1, 1_000_000);
    const MPEG_TS: Rational = Rational::new(1, 90_000);
    const MILLIS: Rational = Rational::new(1, 1_000);

    #[test]
    fn test_rescale_exact() {
        assert_eq!(Rational::rescale(1_000_000, MICROS, MPEG_TS), 90_000);
        assert_eq!(Rational::rescale(16_667, MICROS, MILLIS), 17);
        assert_eq!(Rational::rescale(0, MICROS, MPEG_TS), 0);
    }

    #[test]
    fn test_rescale_rounds_half_away_from_zero() {
        assert_eq!(Rational::rescale(1_500, MICROS, MILLIS), 2);
        assert_eq!(Rational::rescale(-1_500, MICROS, MILLIS), -2);
        assert_eq!(Rational::rescale(1_499, MICROS, MILLIS), 1);
        assert_eq!(Rational::rescale(-1_499, MICROS, MILLIS), -1);
    }

    #[test]
    fn test_round_trip_within_one_coarse_tick() {
        for ts in [0i64, 1, 7, 33_333, 16_666_667, 123_456_789, -98_765] {
            let there = Rational::rescale(ts, MICROS, MPEG_TS);
            let back = Rational::rescale(there, MPEG_TS, MICROS);
            // one 1/90000 tick is at most 12 microsecond ticks
            assert!((back - ts).abs() <= 12, "ts={ts} back={back}");
        }
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_rescale_saturates() {
        assert_eq!(Rational::rescale(i64::MAX, MILLIS, MICROS), i64::MAX);
        assert_eq!(Rational::rescale(i64::MIN, MILLIS, MICROS), i64::MIN);
    }

    #[test]
    fn test_degenerate_base_is_identity() {
        assert_eq!(Rational::rescale(42, Rational::UNSET, MICROS), 42);
    }

    #[test]
    fn test_ticks_from_duration() {
        assert_eq!(MICROS.ticks(Duration::from_millis(16)), 16_000);
        assert_eq!(MPEG_TS.ticks(Duration::from_secs(2)), 180_000);
        assert_eq!(Rational::UNSET.ticks(Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_helpers() {
        let fps = Rational::new(60, 1);
        assert!(fps.is_positive());
        assert!(!Rational::UNSET.is_positive());
        assert_eq!(fps.invert(), Rational::new(1, 60));
        assert_eq!(fps.as_f64(), 60.0);
        assert_eq!(MICROS.to_string(), "1/1000000");
    }
}

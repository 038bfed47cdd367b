//! Exact media time and frame-grid utilities.
//!
//! Source-clip time is kept as signed integer nanoseconds. Seconds coming
//! from user text are converted once with rounding; everything downstream is
//! integer arithmetic, so a beat time never drifts from repeated addition.
//! - `MediaTime`: a point or span on a timeline
//! - `TimeRange`: half-open `[start, end)` range
//! - `FrameRate`: rational output frame rate used for the frame grid

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A signed time value in nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    /// Create from raw nanoseconds.
    pub const fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }

    /// Convert seconds to the nearest nanosecond, saturating at the i64 range.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    /// Convert seconds to the nearest nanosecond, or `None` if `secs` is not
    /// finite or does not fit.
    pub fn try_from_secs_f64(secs: f64) -> Option<Self> {
        nanos_from_f64(secs * NANOS_PER_SEC as f64).map(Self)
    }

    /// Create from a whole number of milliseconds.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 1_000_000)
    }

    /// Raw nanoseconds.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Seconds as floating point (for display and external tools only).
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Duration of `beats` beats at `bpm`, computed with one rounding step.
    ///
    /// `beats` may be negative (extrapolating backwards from an anchor).
    /// `None` if the result does not fit or `bpm` is unusable.
    pub fn try_from_beats(beats: i64, bpm: f64) -> Option<Self> {
        nanos_from_f64(beats as f64 * 60.0 * NANOS_PER_SEC as f64 / bpm).map(Self)
    }

    pub fn checked_add(self, rhs: MediaTime) -> Option<MediaTime> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: MediaTime) -> Option<MediaTime> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

fn nanos_from_f64(nanos: f64) -> Option<i64> {
    let nanos = nanos.round();
    // i64::MAX is not exactly representable; its f64 neighbour is 2^63.
    (nanos.is_finite() && nanos >= i64::MIN as f64 && nanos < i64::MAX as f64)
        .then_some(nanos as i64)
}

/// Saturating; use `checked_add` where overflow must be reported.
impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

/// Saturating; use `checked_sub` where overflow must be reported.
impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: MediaTime,
    pub end: MediaTime,
}

impl TimeRange {
    pub fn new(start: MediaTime, end: MediaTime) -> Self {
        Self { start, end }
    }

    /// Length of the range (negative if `end < start`).
    pub fn duration(&self) -> MediaTime {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Rational frame rate, e.g. `30/1` or `30000/1001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// Create a frame rate; a zero numerator or denominator is raised to 1.
    pub fn new(num: u32, den: u32) -> Self {
        Self {
            num: num.max(1),
            den: den.max(1),
        }
    }

    /// Whole-number rate such as 24, 30, or 60.
    pub fn fps(fps: u32) -> Self {
        Self::new(fps, 1)
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Nearest whole frame for a time value (half rounds away from zero),
    /// saturating at the i64 range.
    pub fn frames_for(&self, time: MediaTime) -> i64 {
        let scaled = time.as_nanos() as i128 * self.num as i128;
        let divisor = NANOS_PER_SEC as i128 * self.den as i128;
        div_round(scaled, divisor).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Exact start time of frame `frames`, rounded to the nearest nanosecond
    /// and saturating at the i64 range.
    pub fn time_for(&self, frames: i64) -> MediaTime {
        let scaled = frames as i128 * NANOS_PER_SEC as i128 * self.den as i128;
        let nanos = div_round(scaled, self.num as i128).clamp(i64::MIN as i128, i64::MAX as i128);
        MediaTime::from_nanos(nanos as i64)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::fps(30)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn div_round(value: i128, divisor: i128) -> i128 {
    let half = divisor / 2;
    if value >= 0 {
        (value + half) / divisor
    } else {
        (value - half) / divisor
    }
}

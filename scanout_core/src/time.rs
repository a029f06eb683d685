// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time for vblank timestamps and trace events.
//!
//! [`HostTime`] is a point on `CLOCK_MONOTONIC` in nanoseconds. The loop reads
//! it through [`now`]; backends that receive kernel timestamps (vblank events,
//! page-flip completions) convert them with [`HostTime::from_timespec`] so every
//! timestamp in a trace lives on the same clock.
//!
//! [`TickSpan`] is the difference of two [`HostTime`]s. [`Timebase`] is kept for
//! trace consumers that need to label the tick unit explicitly.

use core::fmt;
use core::ops::{Add, Sub};
use std::time::Duration;

use rustix::time::{ClockId, Timespec, clock_gettime};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Returns the current `CLOCK_MONOTONIC` time.
#[must_use]
pub fn now() -> HostTime {
    HostTime::from_timespec(clock_gettime(ClockId::Monotonic))
}

/// Converts a [`Duration`] into a relative [`Timespec`] for `poll`-style
/// timeouts, saturating on overflow.
#[must_use]
pub fn duration_to_timespec(duration: Duration) -> Timespec {
    Timespec {
        tv_sec: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        tv_nsec: i64::from(duration.subsec_nanos()),
    }
}

/// A point in time, in nanoseconds on the monotonic clock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Builds a host time from a kernel timestamp. Negative fields clamp to
    /// zero and out-of-range values saturate.
    #[must_use]
    pub fn from_timespec(timespec: Timespec) -> Self {
        let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
        let nanos = u64::try_from(timespec.tv_nsec)
            .unwrap_or(0)
            .min(999_999_999);
        let wide = u128::from(seconds)
            .saturating_mul(NANOS_PER_SECOND)
            .saturating_add(u128::from(nanos));
        Self(u64::try_from(wide).unwrap_or(u64::MAX))
    }

    /// Returns the span between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> TickSpan {
        TickSpan(self.0.saturating_sub(earlier.0))
    }

    /// Checked addition of a span.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, span: TickSpan) -> Option<Self> {
        match self.0.checked_add(span.0) {
            Some(t) => Some(Self(t)),
            None => None,
        }
    }
}

impl Add<TickSpan> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: TickSpan) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for HostTime {
    type Output = TickSpan;

    #[inline]
    fn sub(self, rhs: Self) -> TickSpan {
        TickSpan(self.0 - rhs.0)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// A span between two [`HostTime`]s, in the same nanosecond ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TickSpan(pub u64);

impl TickSpan {
    /// A zero-length span.
    pub const ZERO: Self = Self(0);

    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Converts a standard duration, saturating at `u64::MAX` ticks.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Converts to a standard duration.
    #[inline]
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Returns the span in fractional seconds.
    #[expect(
        clippy::cast_precision_loss,
        reason = "frame-rate reporting tolerates sub-nanosecond rounding"
    )]
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Saturating addition.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Debug for TickSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TickSpan({})", self.0)
    }
}

/// Rational conversion factor from ticks to nanoseconds.
///
/// Monotonic host ticks are nanoseconds, so [`Timebase::NANOS`] is the only
/// value the loop produces. Trace files carry it so offline tools do not have
/// to assume the unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator of the ticks-to-nanoseconds ratio.
    pub numer: u32,
    /// Denominator of the ticks-to-nanoseconds ratio.
    pub denom: u32,
}

impl Timebase {
    /// A timebase where ticks are already nanoseconds (1:1).
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// Converts a tick count to nanoseconds.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn ticks_to_nanos(self, ticks: u64) -> u64 {
        let wide = ticks as u128 * self.numer as u128 / self.denom as u128;
        wide as u64
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timebase({}/{})", self.numer, self.denom)
    }
}

// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time.
//!
//! [`HostTime`] is a point on `CLOCK_MONOTONIC` expressed in nanoseconds. It is
//! the unit used for vsync deadlines handed to callbacks and for everything the
//! tracing hooks report. Durations are plain [`core::time::Duration`] values.

use core::fmt;
use core::ops::{Add, Sub};
use core::time::Duration;

use rustix::time::{ClockId, Timespec, clock_gettime};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// A point in time on the monotonic clock, in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Returns the time elapsed between `earlier` and `self`, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Checked addition of a duration.
    ///
    /// Returns `None` if the result does not fit in `u64` nanoseconds.
    #[inline]
    #[must_use]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        let nanos = u64::try_from(duration.as_nanos()).ok()?;
        self.0.checked_add(nanos).map(Self)
    }

    /// Saturating addition of a duration.
    #[inline]
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        self.checked_add(duration).unwrap_or(Self(u64::MAX))
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        self.saturating_add(rhs)
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// Returns the current monotonic host time in nanoseconds.
#[must_use]
pub fn now() -> HostTime {
    timespec_to_host_time(clock_gettime(ClockId::Monotonic))
}

fn timespec_to_host_time(timespec: Timespec) -> HostTime {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);

    let wide = u128::from(seconds)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u128::from(nanos));
    HostTime(u64::try_from(wide).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use rustix::time::Timespec;

    use super::{HostTime, now, timespec_to_host_time};

    #[test]
    fn now_is_monotonic_non_decreasing() {
        let first = now();
        let second = now();
        assert!(second >= first, "monotonic clock should not go backwards");
    }

    #[test]
    fn timespec_conversion_combines_seconds_and_nanos() {
        let t = timespec_to_host_time(Timespec {
            tv_sec: 2,
            tv_nsec: 500,
        });
        assert_eq!(t, HostTime(2_000_000_500));
    }

    #[test]
    fn negative_timespec_clamps_to_zero() {
        let t = timespec_to_host_time(Timespec {
            tv_sec: -1,
            tv_nsec: -1,
        });
        assert_eq!(t, HostTime(0));
    }

    #[test]
    fn saturating_arithmetic() {
        let t = HostTime(100);
        assert_eq!(
            t.saturating_duration_since(HostTime(300)),
            Duration::ZERO,
            "earlier-than-argument saturates at zero"
        );
        assert_eq!(t + Duration::from_nanos(50), HostTime(150));
        assert_eq!(HostTime(u64::MAX - 1) + Duration::from_nanos(5), HostTime(u64::MAX));
        assert_eq!(HostTime(u64::MAX).checked_add(Duration::from_nanos(1)), None);
        assert_eq!(HostTime(250) - HostTime(100), Duration::from_nanos(150));
    }
}

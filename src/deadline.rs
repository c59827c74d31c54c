// Copyright (c) 2020 kprotty
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::time::Duration;

const MILLIS_PER_SEC: u32 = 1_000;
const NANOS_PER_MILLI: u32 = 1_000_000;
const NANOS_PER_SEC: u32 = 1_000_000_000;

/// An absolute point in time, as seconds and nanoseconds of some clock.
///
/// Backends whose timed wait takes an absolute deadline build one of these
/// from a clock reading and a relative timeout. `nanos` is always below one
/// second.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Deadline {
    secs: u64,
    nanos: u32,
}

impl Deadline {
    /// Returns the deadline `timeout_ms` milliseconds after `now`,
    /// where `now` is a reading of the clock the deadline is measured against.
    ///
    /// ```
    /// use std::time::Duration;
    /// use syncprim::Deadline;
    ///
    /// let now = Duration::new(10, 900_000_000);
    /// let deadline = Deadline::after(now, 150);
    /// assert_eq!((deadline.secs(), deadline.subsec_nanos()), (11, 50_000_000));
    /// ```
    pub fn after(now: Duration, timeout_ms: u32) -> Self {
        let mut secs = u64::from(timeout_ms / MILLIS_PER_SEC) + now.as_secs();
        let mut nanos = (timeout_ms % MILLIS_PER_SEC) * NANOS_PER_MILLI + now.subsec_nanos();

        // Both terms are below a second so one carry is always enough.
        if nanos >= NANOS_PER_SEC {
            nanos -= NANOS_PER_SEC;
            secs += 1;
        }

        debug_assert!(nanos < NANOS_PER_SEC);
        Self { secs, nanos }
    }

    #[inline]
    pub fn secs(&self) -> u64 {
        self.secs
    }

    #[inline]
    pub fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// The deadline as a duration since the clock's epoch.
    pub fn as_duration(&self) -> Duration {
        Duration::new(self.secs, self.nanos)
    }

    /// Converts to the native `timespec`, saturating seconds that don't fit `time_t`.
    #[cfg(unix)]
    pub fn to_timespec(&self) -> libc::timespec {
        use core::convert::TryFrom;

        // Some targets pad `timespec` with private fields.
        let mut ts: libc::timespec = unsafe { core::mem::zeroed() };
        ts.tv_sec = libc::time_t::try_from(self.secs).unwrap_or(libc::time_t::MAX);
        ts.tv_nsec = self.nanos as _;
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_into_seconds() {
        let deadline = Deadline::after(Duration::new(10, 900_000_000), 150);
        assert_eq!(deadline.secs(), 11);
        assert_eq!(deadline.subsec_nanos(), 50_000_000);
    }

    #[test]
    fn no_carry_below_one_second() {
        let deadline = Deadline::after(Duration::new(10, 100_000_000), 150);
        assert_eq!(deadline.secs(), 10);
        assert_eq!(deadline.subsec_nanos(), 250_000_000);
    }

    #[test]
    fn carry_at_exact_second_boundary() {
        let deadline = Deadline::after(Duration::new(3, 999_000_000), 1);
        assert_eq!(deadline.secs(), 4);
        assert_eq!(deadline.subsec_nanos(), 0);
    }

    #[test]
    fn whole_seconds_pass_through() {
        let deadline = Deadline::after(Duration::new(7, 999_999_999), 2_999);
        assert_eq!(deadline.secs(), 10);
        assert_eq!(deadline.subsec_nanos(), 998_999_999);
    }

    #[test]
    fn zero_timeout_is_now() {
        let now = Duration::new(42, 123_456_789);
        assert_eq!(Deadline::after(now, 0).as_duration(), now);
    }

    #[test]
    fn max_timeout_stays_normalized() {
        let deadline = Deadline::after(Duration::new(0, 999_999_999), u32::MAX);
        assert_eq!(deadline.secs(), u64::from(u32::MAX / 1000) + 1);
        assert_eq!(deadline.subsec_nanos(), 294_999_999);
        assert_eq!(
            deadline.as_duration(),
            Duration::new(0, 999_999_999) + Duration::from_millis(u64::from(u32::MAX)),
        );
    }

    #[cfg(unix)]
    #[test]
    fn converts_to_timespec() {
        let ts = Deadline::after(Duration::new(1, 0), 2_500).to_timespec();
        assert_eq!(ts.tv_sec, 3);
        assert_eq!(ts.tv_nsec, 500_000_000);
    }
}

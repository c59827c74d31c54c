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

use crate::{
    backend::{imp, RawCond},
    Error, MutexGuard,
};
use std::{
    convert::TryFrom,
    fmt,
    time::{Duration, Instant},
};

/// A Condition Variable
///
/// Condition variables represent the ability to block a thread such that it
/// consumes no CPU time while waiting for an event to occur. Condition
/// variables are typically associated with a boolean predicate (a condition)
/// and a mutex. The predicate is always verified inside of the mutex before
/// determining that thread must block.
///
/// # Spurious wakeups
///
/// A wait may return without any matching `notify_*` call. This is inherited
/// from the native primitives and is not hidden: always re-check the predicate
/// in a loop, or use [`wait_while`](Condvar::wait_while).
///
/// # Backends
///
/// - POSIX: a heap-allocated `pthread_cond_t`. Timed waits are turned into an
///   absolute [`Deadline`](crate::Deadline). The first wait binds the condvar
///   to that wait's mutex for the rest of its life: a later wait with any other
///   mutex panics, even if no thread is still waiting on the first one.
/// - Windows: a `CONDITION_VARIABLE` used with critical sections. Timed waits
///   pass the relative timeout through.
/// - `single-thread`: every wait returns immediately, since nothing else could
///   ever notify.
///
/// # Examples
///
/// ```
/// # #[cfg(not(feature = "single-thread"))]
/// # fn main() -> Result<(), syncprim::Error> {
/// use syncprim::{try_mutex, Condvar, Thread};
/// use std::sync::Arc;
///
/// let pair = Arc::new((try_mutex(false)?, Condvar::new()));
/// let pair2 = pair.clone();
///
/// let thread = Thread::spawn(move || {
///     let (lock, cvar) = &*pair2;
///     *lock.lock() = true;
///     cvar.notify_one();
/// })?;
///
/// let (lock, cvar) = &*pair;
/// let mut started = lock.lock();
/// while !*started {
///     cvar.wait(&mut started);
/// }
/// drop(started);
/// thread.join()?;
/// # Ok(())
/// # }
/// # #[cfg(feature = "single-thread")]
/// # fn main() {}
/// ```
pub struct Condvar {
    inner: imp::Condvar,
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Condvar { .. }")
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn native_mutex<'a, T: ?Sized>(guard: &'a MutexGuard<'_, T>) -> &'a imp::Mutex {
    unsafe { MutexGuard::mutex(guard).raw() }.native()
}

/// Rounds up so that waiting for the returned amount never ends before `timeout`.
fn ceil_millis(timeout: Duration) -> Option<u32> {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u32::try_from(millis).ok()
}

impl Condvar {
    /// Creates a new condition variable which is ready to be waited on and
    /// notified. Any native allocation happens on first wait.
    pub const fn new() -> Self {
        Self {
            inner: <imp::Condvar as RawCond>::INIT,
        }
    }

    /// Creates a new condition variable, allocating the native object up
    /// front and reporting if the OS can't provide one.
    pub fn try_new() -> Result<Self, Error> {
        imp::Condvar::new().map(|inner| Self { inner })
    }

    /// Blocks the current thread until this condition variable receives a
    /// notification.
    ///
    /// This function will atomically unlock the mutex specified (represented by
    /// `mutex_guard`) and block the current thread. This means that any calls
    /// to `notify_*()` which happen logically after the mutex is unlocked are
    /// candidates to wake this thread up. When this function call returns, the
    /// lock specified will have been re-acquired.
    #[inline]
    pub fn wait<T: ?Sized>(&self, mutex_guard: &mut MutexGuard<'_, T>) {
        unsafe { self.inner.wait(native_mutex(mutex_guard)) }
    }

    /// Blocks the current thread for as long as `condition` returns `true`.
    ///
    /// The predicate is checked with the mutex held before every wait, which
    /// absorbs spurious wakeups.
    pub fn wait_while<T, F>(&self, mutex_guard: &mut MutexGuard<'_, T>, mut condition: F)
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **mutex_guard) {
            self.wait(mutex_guard);
        }
    }

    /// Waits on this condition variable for a notification, timing out after
    /// `timeout_ms` milliseconds.
    ///
    /// The returned `WaitTimeoutResult` tells whether the wait returned
    /// because the timeout elapsed. Like `wait`, the lock is re-acquired when
    /// this function returns, regardless of whether the timeout elapsed or not.
    #[inline]
    pub fn wait_timeout_ms<T: ?Sized>(
        &self,
        mutex_guard: &mut MutexGuard<'_, T>,
        timeout_ms: u32,
    ) -> WaitTimeoutResult {
        let timed_out = unsafe { self.inner.wait_timeout(native_mutex(mutex_guard), timeout_ms) };
        WaitTimeoutResult(timed_out)
    }

    /// Waits on this condition variable for a notification, timing out after a
    /// specified duration.
    ///
    /// The timeout is rounded up to whole milliseconds. Timeouts longer than
    /// `u32::MAX` milliseconds wait for that long and then report a wakeup
    /// rather than a timeout, which callers treat like any spurious wakeup.
    pub fn wait_for<T: ?Sized>(
        &self,
        mutex_guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
    ) -> WaitTimeoutResult {
        match ceil_millis(timeout) {
            Some(timeout_ms) => self.wait_timeout_ms(mutex_guard, timeout_ms),
            None => {
                let _ = self.wait_timeout_ms(mutex_guard, u32::MAX);
                WaitTimeoutResult(false)
            }
        }
    }

    /// Waits on this condition variable for a notification, timing out after
    /// the specified time instant.
    ///
    /// An instant already in the past times out without releasing the lock.
    pub fn wait_until<T: ?Sized>(
        &self,
        mutex_guard: &mut MutexGuard<'_, T>,
        timeout: Instant,
    ) -> WaitTimeoutResult {
        match timeout.checked_duration_since(Instant::now()) {
            Some(until_deadline) => self.wait_for(mutex_guard, until_deadline),
            None => WaitTimeoutResult(true),
        }
    }

    /// Wakes up one blocked thread on this condvar, if any.
    ///
    /// The mutex need not be held, but changing the predicate without it can
    /// lose the wakeup.
    #[inline]
    pub fn notify_one(&self) {
        self.inner.notify_one()
    }

    /// Wakes up all blocked threads on this condvar.
    #[inline]
    pub fn notify_all(&self) {
        self.inner.notify_all()
    }
}

/// A type indicating whether a timed wait on a condition variable returned
/// due to a time out or not.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct WaitTimeoutResult(bool);

impl WaitTimeoutResult {
    /// Returns whether the wait was known to have timed out.
    #[inline]
    pub fn timed_out(self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_timeouts_up() {
        assert_eq!(ceil_millis(Duration::from_millis(0)), Some(0));
        assert_eq!(ceil_millis(Duration::from_nanos(1)), Some(1));
        assert_eq!(ceil_millis(Duration::from_micros(1_500)), Some(2));
        assert_eq!(ceil_millis(Duration::from_millis(7)), Some(7));
        assert_eq!(
            ceil_millis(Duration::from_millis(u64::from(u32::MAX))),
            Some(u32::MAX)
        );
        assert_eq!(ceil_millis(Duration::from_secs(u64::MAX)), None);
    }

    #[test]
    fn notify_without_waiters() {
        let c = Condvar::new();
        c.notify_one();
        c.notify_all();

        let c = Condvar::try_new().unwrap();
        c.notify_one();
        c.notify_all();
    }

    #[test]
    fn past_instant_times_out() {
        let m = crate::try_mutex(()).unwrap();
        let c = Condvar::new();

        let mut g = m.lock();
        let past = Instant::now();
        std::thread::sleep(Duration::from_millis(1));
        assert!(c.wait_until(&mut g, past).timed_out());
    }

    #[cfg(syncprim_backend = "none")]
    #[test]
    fn single_thread_waits_are_inert() {
        let m = crate::Mutex::new(0);
        let c = Condvar::new();

        let mut g = m.lock();
        c.wait(&mut g);
        assert!(c.wait_timeout_ms(&mut g, u32::MAX).timed_out());
        assert!(c.wait_for(&mut g, Duration::from_secs(60)).timed_out());
        c.wait_while(&mut g, |count| {
            *count += 1;
            *count < 3
        });
        assert_eq!(*g, 3);
    }

    #[cfg(syncprim_backend = "posix")]
    #[test]
    #[should_panic(expected = "two mutexes")]
    fn first_mutex_stays_bound_after_waits_end() {
        let first = crate::try_mutex(()).unwrap();
        let second = crate::try_mutex(()).unwrap();
        let c = Condvar::new();

        let mut g = first.lock();
        let _ = c.wait_timeout_ms(&mut g, 1);
        drop(g);

        let mut g = second.lock();
        let _ = c.wait_timeout_ms(&mut g, 1);
    }

    #[cfg(syncprim_backend = "none")]
    #[test]
    fn single_thread_pair_in_statics() {
        use crate::{const_mutex, Mutex};

        static COUNTER: Mutex<u32> = const_mutex(0);
        static COND: Condvar = Condvar::new();

        let mut g = COUNTER.lock();
        *g += 1;
        COND.notify_all();
        assert!(COND.wait_timeout_ms(&mut g, 10).timed_out());
        drop(g);
        assert_eq!(*COUNTER.lock(), 1);
    }

    #[cfg(not(syncprim_backend = "none"))]
    mod threaded {
        use crate::{try_mutex, Condvar, Mutex, Thread};
        use std::{
            sync::{mpsc::channel, Arc},
            time::{Duration, Instant},
        };

        #[test]
        fn smoke() {
            let c = Condvar::new();
            c.notify_one();
            c.notify_all();
        }

        #[test]
        fn notify_one() {
            let m = Arc::new(try_mutex(false).unwrap());
            let m2 = m.clone();
            let c = Arc::new(Condvar::new());
            let c2 = c.clone();

            let mut g = m.lock();
            let t = Thread::spawn(move || {
                *m2.lock() = true;
                c2.notify_one();
            })
            .unwrap();
            while !*g {
                c.wait(&mut g);
            }
            drop(g);
            t.join().unwrap();
        }

        #[test]
        fn notify_all() {
            const N: usize = 10;

            let data = Arc::new((try_mutex(0).unwrap(), Condvar::new()));
            let (tx, rx) = channel();
            let threads: Vec<_> = (0..N)
                .map(|_| {
                    let data = data.clone();
                    let tx = tx.clone();
                    Thread::spawn(move || {
                        let (lock, cond) = &*data;
                        let mut cnt = lock.lock();
                        *cnt += 1;
                        if *cnt == N {
                            tx.send(()).unwrap();
                        }
                        while *cnt != 0 {
                            cond.wait(&mut cnt);
                        }
                        tx.send(()).unwrap();
                    })
                    .unwrap()
                })
                .collect();
            drop(tx);

            let (lock, cond) = &*data;
            rx.recv().unwrap();
            let mut cnt = lock.lock();
            *cnt = 0;
            cond.notify_all();
            drop(cnt);

            for _ in 0..N {
                rx.recv().unwrap();
            }
            for t in threads {
                t.join().unwrap();
            }
        }

        #[test]
        fn broadcast_flag_seen_by_every_waiter() {
            const WAITERS: usize = 6;

            let state = Arc::new((try_mutex((false, 0usize)).unwrap(), Condvar::new()));
            let waiters: Vec<_> = (0..WAITERS)
                .map(|_| {
                    let state = state.clone();
                    Thread::spawn(move || {
                        let (lock, cond) = &*state;
                        let mut guard = lock.lock();
                        guard.1 += 1;
                        cond.notify_all();
                        while !guard.0 {
                            cond.wait(&mut guard);
                        }
                        guard.0
                    })
                    .unwrap()
                })
                .collect();

            let (lock, cond) = &*state;
            let mut guard = lock.lock();
            cond.wait_while(&mut guard, |(_, arrived)| *arrived < WAITERS);
            guard.0 = true;
            cond.notify_all();
            drop(guard);

            for waiter in waiters {
                assert!(waiter.join().unwrap());
            }
        }

        #[test]
        fn wait_timeout_ms_elapses() {
            let m = try_mutex(()).unwrap();
            let c = Condvar::new();

            // Windows may round a wait down by up to one timer tick.
            let floor = Duration::from_millis(if cfg!(windows) { 49 } else { 50 });

            let mut g = m.lock();
            loop {
                let start = Instant::now();
                let result = c.wait_timeout_ms(&mut g, 50);
                let elapsed = start.elapsed();

                if result.timed_out() {
                    assert!(elapsed >= floor, "timed out after {:?}", elapsed);
                    break;
                }
            }
        }

        #[test]
        fn wait_timeout_ms_never_hangs() {
            let m = try_mutex(()).unwrap();
            let c = Condvar::new();

            let mut g = m.lock();
            let start = Instant::now();
            while !c.wait_timeout_ms(&mut g, 10).timed_out() {
                assert!(start.elapsed() < Duration::from_secs(10));
            }
        }

        #[test]
        fn wait_timeout_ms_notified() {
            let m = Arc::new(try_mutex(false).unwrap());
            let m2 = m.clone();
            let c = Arc::new(Condvar::new());
            let c2 = c.clone();

            let mut g = m.lock();
            let t = Thread::spawn(move || {
                *m2.lock() = true;
                c2.notify_one();
            })
            .unwrap();

            while !*g {
                let result = c.wait_timeout_ms(&mut g, 10_000);
                assert!(!result.timed_out() || *g);
            }
            drop(g);
            t.join().unwrap();
        }

        #[test]
        fn wait_for() {
            let m = Arc::new(try_mutex(false).unwrap());
            let m2 = m.clone();
            let c = Arc::new(Condvar::new());
            let c2 = c.clone();

            let mut g = m.lock();
            let _ = c.wait_for(&mut g, Duration::from_millis(1));

            let t = Thread::spawn(move || {
                *m2.lock() = true;
                c2.notify_one();
            })
            .unwrap();
            while !*g {
                let timeout_res = c.wait_for(&mut g, Duration::from_secs(u64::MAX));
                assert!(!timeout_res.timed_out());
            }
            drop(g);
            t.join().unwrap();
        }

        #[test]
        fn wait_until() {
            let m = Arc::new(try_mutex(false).unwrap());
            let m2 = m.clone();
            let c = Arc::new(Condvar::new());
            let c2 = c.clone();

            let mut g = m.lock();
            let _ = c.wait_until(&mut g, Instant::now() + Duration::from_millis(1));

            let t = Thread::spawn(move || {
                *m2.lock() = true;
                c2.notify_one();
            })
            .unwrap();
            while !*g {
                let timeout_res = c.wait_until(
                    &mut g,
                    Instant::now() + Duration::from_millis(u64::from(u32::MAX)),
                );
                assert!(!timeout_res.timed_out());
            }
            drop(g);
            t.join().unwrap();
        }

        #[test]
        fn lazily_created_pair_in_statics() {
            static LOCK: Mutex<usize> = crate::const_mutex(0);
            static COND: Condvar = Condvar::new();

            let t = Thread::spawn(|| {
                *LOCK.lock() += 1;
                COND.notify_all();
            })
            .unwrap();

            let mut g = LOCK.lock();
            COND.wait_while(&mut g, |count| *count == 0);
            assert_eq!(*g, 1);
            drop(g);
            t.join().unwrap();
        }
    }
}

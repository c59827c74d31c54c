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

//! Inert primitives for builds where only one thread of control exists.
//!
//! They stay `Sync` so that statics and `Sync`-bounded call sites compile the
//! same as on the threaded backends. The lock keeps an atomic flag, which
//! keeps guards exclusive even if a `std::thread` does end up sharing one.

use super::{BackendKind, RawCond, RawLock};
use crate::Error;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) const KIND: BackendKind = BackendKind::SingleThread;

pub(crate) struct Mutex {
    /// Only tracked so a second guard can't alias the first.
    locked: AtomicBool,
}

unsafe impl RawLock for Mutex {
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };

    fn new() -> Result<Self, Error> {
        Ok(Self::INIT)
    }

    #[inline]
    fn lock(&self) {
        if self.locked.swap(true, Ordering::Acquire) {
            panic!("deadlock: mutex is already held by the only thread");
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

pub(crate) struct Condvar;

unsafe impl RawCond for Condvar {
    type Lock = Mutex;

    const INIT: Self = Self;

    fn new() -> Result<Self, Error> {
        Ok(Self::INIT)
    }

    // Nothing else could ever notify, so waiting returns straight away as a
    // spurious wakeup.
    #[inline]
    unsafe fn wait(&self, _lock: &Mutex) {}

    #[inline]
    unsafe fn wait_timeout(&self, _lock: &Mutex, _timeout_ms: u32) -> bool {
        true
    }

    #[inline]
    fn notify_one(&self) {}

    #[inline]
    fn notify_all(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_inert_but_tracked() {
        let mutex = Mutex::new().unwrap();
        mutex.lock();
        assert!(!mutex.try_lock());
        unsafe { mutex.unlock() };
        assert!(mutex.try_lock());
        unsafe { mutex.unlock() };
    }

    #[test]
    #[should_panic(expected = "deadlock")]
    fn relock_panics() {
        let mutex = Mutex::INIT;
        mutex.lock();
        mutex.lock();
    }

    #[test]
    fn shareable_as_statics() {
        fn assert_sync<T: Sync>(_: &T) {}

        static MUTEX: Mutex = Mutex::INIT;
        static COND: Condvar = Condvar::INIT;
        assert_sync(&MUTEX);
        assert_sync(&COND);

        MUTEX.lock();
        assert!(unsafe { COND.wait_timeout(&MUTEX, 1) });
        unsafe { MUTEX.unlock() };
        assert!(MUTEX.try_lock());
        unsafe { MUTEX.unlock() };
    }

    #[test]
    fn waits_return_immediately() {
        let mutex = Mutex::INIT;
        let cond = Condvar::INIT;

        mutex.lock();
        unsafe {
            cond.wait(&mutex);
            assert!(cond.wait_timeout(&mutex, u32::MAX));
        }
        cond.notify_one();
        cond.notify_all();
        unsafe { mutex.unlock() };
    }
}

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
    backend::{imp, RawLock},
    Error,
};
use std::fmt;

/// The native lock behind [`Mutex`].
///
/// On the threaded backends this wraps a `pthread_mutex_t` or a
/// `CRITICAL_SECTION` living on the heap so that moving a `RawMutex` never
/// moves the OS object. [`RawMutex::INIT`](lock_api::RawMutex::INIT) allocates
/// it on first lock; [`RawMutex::new`] allocates it immediately and reports
/// failure. The native object is released when the `RawMutex` is dropped.
///
/// With the `single-thread` feature this is a flag that only catches a thread
/// locking the mutex twice.
pub struct RawMutex {
    inner: imp::Mutex,
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("RawMutex { .. }")
    }
}

impl RawMutex {
    /// Creates an unlocked mutex, failing if the OS can't allocate one.
    pub fn new() -> Result<Self, Error> {
        imp::Mutex::new().map(|inner| Self { inner })
    }

    pub(crate) fn native(&self) -> &imp::Mutex {
        &self.inner
    }
}

unsafe impl lock_api::RawMutex for RawMutex {
    const INIT: Self = Self {
        inner: <imp::Mutex as RawLock>::INIT,
    };

    // Native mutexes must be unlocked by the thread which locked them.
    type GuardMarker = lock_api::GuardNoSend;

    #[inline]
    fn lock(&self) {
        self.inner.lock()
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.inner.unlock()
    }
}

/// A mutual exclusion primitive protecting a value of type `T`.
///
/// Locking returns a [`MutexGuard`]; dropping the guard unlocks. The native
/// lock is destroyed when the `Mutex` is dropped, which the borrow checker
/// only allows once no guard remains.
///
/// # Examples
///
/// ```
/// # #[cfg(not(feature = "single-thread"))]
/// # fn main() -> Result<(), syncprim::Error> {
/// use syncprim::{try_mutex, Thread};
/// use std::sync::Arc;
///
/// let counter = Arc::new(try_mutex(0usize)?);
/// let threads = (0..4)
///     .map(|_| {
///         let counter = counter.clone();
///         Thread::spawn(move || {
///             for _ in 0..1000 {
///                 *counter.lock() += 1;
///             }
///         })
///     })
///     .collect::<Result<Vec<_>, _>>()?;
///
/// for thread in threads {
///     thread.join()?;
/// }
/// assert_eq!(*counter.lock(), 4000);
/// # Ok(())
/// # }
/// # #[cfg(feature = "single-thread")]
/// # fn main() {}
/// ```
pub type Mutex<T> = lock_api::Mutex<RawMutex, T>;

pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawMutex, T>;

pub type MappedMutexGuard<'a, T> = lock_api::MappedMutexGuard<'a, RawMutex, T>;

/// Creates a mutex in a `const` context. The native lock is allocated on first use.
pub const fn const_mutex<T>(value: T) -> Mutex<T> {
    Mutex::const_new(<RawMutex as lock_api::RawMutex>::INIT, value)
}

/// Creates a mutex whose native lock is allocated up front.
pub fn try_mutex<T>(value: T) -> Result<Mutex<T>, Error> {
    RawMutex::new().map(|raw| Mutex::from_raw(raw, value))
}

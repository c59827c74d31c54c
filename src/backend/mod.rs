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

//! Contracts every native backend implements, and the one backend chosen at build time.
//!
//! `build.rs` sets `syncprim_backend` to exactly one of `critical_section`,
//! `posix` or `none`. The public types in this crate only ever talk to
//! [`imp`] through the traits below, which keeps every call statically
//! dispatched to the selected module.

use crate::Error;

/// An exclusive lock over a native primitive.
///
/// # Safety
///
/// Implementations must guarantee that at most one caller holds the lock
/// between a successful [`lock`](RawLock::lock)/[`try_lock`](RawLock::try_lock)
/// and the matching [`unlock`](RawLock::unlock), unless the backend only ever
/// runs a single thread of control.
pub(crate) unsafe trait RawLock: Sized {
    /// A lock whose native object is created on first use.
    const INIT: Self;

    /// Creates the native object eagerly, reporting allocation failure.
    fn new() -> Result<Self, Error>;

    fn lock(&self);

    fn try_lock(&self) -> bool;

    /// # Safety
    ///
    /// The caller must currently hold the lock.
    unsafe fn unlock(&self);
}

/// A condition variable which waits with a [`RawLock`] held.
///
/// # Safety
///
/// Waits must release `lock` and begin waiting atomically with respect to
/// `notify_one`/`notify_all`, and must hold `lock` again when they return.
pub(crate) unsafe trait RawCond: Sized {
    type Lock: RawLock;

    const INIT: Self;

    fn new() -> Result<Self, Error>;

    /// # Safety
    ///
    /// The caller must hold `lock`.
    unsafe fn wait(&self, lock: &Self::Lock);

    /// Returns `true` if the wait timed out.
    ///
    /// # Safety
    ///
    /// The caller must hold `lock`.
    unsafe fn wait_timeout(&self, lock: &Self::Lock, timeout_ms: u32) -> bool;

    fn notify_one(&self);

    fn notify_all(&self);
}

/// A native thread of execution started by the backend.
///
/// Dropping the handle without [`join`](RawThread::join)ing detaches the thread.
#[cfg(not(syncprim_backend = "none"))]
pub(crate) trait RawThread: Sized + Send + Sync {
    /// Starts running `main` on a new thread immediately.
    fn spawn(main: Box<dyn FnOnce() + Send + 'static>) -> Result<Self, Error>;

    /// Blocks until `main` has returned and the thread has exited.
    fn join(self);
}

/// The threading backend compiled into this build.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BackendKind {
    /// Windows critical sections and condition variables.
    CriticalSection,
    /// POSIX threads.
    Posix,
    /// No threads: every primitive is an inert stub.
    SingleThread,
}

impl BackendKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::CriticalSection => "critical_section",
            Self::Posix => "posix",
            Self::SingleThread => "none",
        }
    }

    /// Whether primitives provide real exclusion and threads can be created.
    pub const fn is_threaded(self) -> bool {
        !matches!(self, Self::SingleThread)
    }
}

/// The backend selected by the `single-thread` feature and the target platform.
pub const BACKEND: BackendKind = imp::KIND;

#[cfg(not(syncprim_backend = "none"))]
mod lazy_box;

#[cfg(syncprim_backend = "critical_section")]
#[path = "windows.rs"]
pub(crate) mod imp;

#[cfg(syncprim_backend = "posix")]
#[path = "posix.rs"]
pub(crate) mod imp;

#[cfg(syncprim_backend = "none")]
#[path = "none.rs"]
pub(crate) mod imp;

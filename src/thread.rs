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
    backend::{imp, RawThread, BACKEND},
    Error,
};
use std::{
    cell::UnsafeCell,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

/// Where the entry function leaves its result for the joiner.
struct Packet<T> {
    result: UnsafeCell<Option<std::thread::Result<T>>>,
}

// Written once by the spawned thread before it exits, read once by the
// joiner after the native join returns.
unsafe impl<T: Send> Sync for Packet<T> {}

/// An owned handle to a native OS thread.
///
/// The thread starts running as soon as [`create`](Thread::create) returns.
/// [`join`](Thread::join) consumes the handle, so a thread can't be joined
/// twice. Dropping a `Thread` without joining detaches it; its native
/// resources are released when it exits.
///
/// Not available with the `single-thread` feature.
pub struct Thread<T> {
    native: imp::Thread,
    packet: Arc<Packet<T>>,
}

impl<T> fmt::Debug for Thread<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("backend", &BACKEND.name())
            .finish()
    }
}

impl<T: Send + 'static> Thread<T> {
    /// Starts a new thread running `entry(arg)`.
    ///
    /// Fails with [`Error::Resource`] when the OS can't create another thread.
    pub fn create<F, A>(entry: F, arg: A) -> Result<Self, Error>
    where
        F: FnOnce(A) -> T + Send + 'static,
        A: Send + 'static,
    {
        let packet = Arc::new(Packet {
            result: UnsafeCell::new(None),
        });

        let their_packet = packet.clone();
        let main = move || {
            // Unwinding out of the native start routine is undefined, so the
            // panic is caught here and reported to the joiner instead.
            let result = panic::catch_unwind(AssertUnwindSafe(move || entry(arg)));
            unsafe { *their_packet.result.get() = Some(result) };
        };

        let native = imp::Thread::spawn(Box::new(main))?;
        tracing::trace!(backend = BACKEND.name(), "spawned thread");

        Ok(Self { native, packet })
    }

    /// Starts a new thread running `entry()`.
    pub fn spawn<F>(entry: F) -> Result<Self, Error>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::create(|entry: F| entry(), entry)
    }
}

impl<T> Thread<T> {
    /// Waits for the thread to finish and returns what its entry function
    /// returned. Everything the thread wrote is visible once this returns.
    ///
    /// Returns [`Error::Panicked`] if the entry function panicked.
    pub fn join(self) -> Result<T, Error> {
        let Self { native, packet } = self;
        native.join();
        tracing::trace!(backend = BACKEND.name(), "joined thread");

        match unsafe { (*packet.result.get()).take() } {
            Some(Ok(value)) => Ok(value),
            Some(Err(_)) | None => Err(Error::Panicked),
        }
    }
}

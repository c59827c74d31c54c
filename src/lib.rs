//! Portable mutexes, condition variables and threads.
//!
//! One API over three build-time backends:
//! - `posix`: `pthread_mutex_t`, `pthread_cond_t` and `pthread_t`.
//! - `critical_section`: Windows `CRITICAL_SECTION`, `CONDITION_VARIABLE` and thread handles.
//! - `none` (the `single-thread` feature): inert stubs, and no [`Thread`] at all.
//!
//! Which one is compiled in is reported by [`BACKEND`].

#![warn(
    rust_2018_idioms,
    unreachable_pub,
    // missing_docs
    // missing_debug_implementations
)]

mod backend;
mod condvar;
mod deadline;
mod error;
mod mutex;
#[cfg(not(syncprim_backend = "none"))]
mod thread;

pub use self::{
    backend::{BackendKind, BACKEND},
    condvar::{Condvar, WaitTimeoutResult},
    deadline::Deadline,
    error::Error,
    mutex::{const_mutex, try_mutex, MappedMutexGuard, Mutex, MutexGuard, RawMutex},
};

#[cfg(not(syncprim_backend = "none"))]
pub use self::thread::Thread;

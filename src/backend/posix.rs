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

use super::{
    lazy_box::{LazyBox, LazyInit},
    BackendKind, RawCond, RawLock, RawThread,
};
use crate::{Deadline, Error};
use std::{
    cell::UnsafeCell,
    io, mem,
    mem::MaybeUninit,
    ptr,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

pub(crate) const KIND: BackendKind = BackendKind::Posix;

// Error-checking mutexes turn relocking and foreign unlocks into error codes
// which the debug assertions below then report.
#[cfg(debug_assertions)]
const MUTEX_TYPE: libc::c_int = libc::PTHREAD_MUTEX_ERRORCHECK;
#[cfg(not(debug_assertions))]
const MUTEX_TYPE: libc::c_int = libc::PTHREAD_MUTEX_NORMAL;

// Timed waits are measured against this clock. Where the condvar can be
// configured for it, prefer one that never jumps when the system time is set.
#[cfg(any(target_os = "linux", target_os = "android"))]
const CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;

fn check(what: &'static str, code: libc::c_int) -> Result<(), Error> {
    match code {
        0 => Ok(()),
        code => Err(Error::resource(what, code)),
    }
}

fn clock_now() -> Duration {
    let mut now = MaybeUninit::<libc::timespec>::uninit();
    let rc = unsafe { libc::clock_gettime(CLOCK, now.as_mut_ptr()) };
    assert_eq!(rc, 0, "clock_gettime: {}", io::Error::last_os_error());

    let now = unsafe { now.assume_init() };
    Duration::new(now.tv_sec as u64, now.tv_nsec as u32)
}

struct PthreadMutex(UnsafeCell<libc::pthread_mutex_t>);

unsafe impl Send for PthreadMutex {}
unsafe impl Sync for PthreadMutex {}

struct MutexAttr(MaybeUninit<libc::pthread_mutexattr_t>);

impl Drop for MutexAttr {
    fn drop(&mut self) {
        let rc = unsafe { libc::pthread_mutexattr_destroy(self.0.as_mut_ptr()) };
        debug_assert_eq!(rc, 0);
    }
}

impl LazyInit for PthreadMutex {
    const WHAT: &'static str = "mutex";

    fn init() -> Result<Box<Self>, Error> {
        let mutex = Box::new(Self(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER)));
        unsafe {
            let mut attr = MaybeUninit::uninit();
            check(Self::WHAT, libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
            let mut attr = MutexAttr(attr);
            check(
                Self::WHAT,
                libc::pthread_mutexattr_settype(attr.0.as_mut_ptr(), MUTEX_TYPE),
            )?;
            check(
                Self::WHAT,
                libc::pthread_mutex_init(mutex.0.get(), attr.0.as_ptr()),
            )?;
        }
        Ok(mutex)
    }

    fn destroy(boxed: Box<Self>) {
        // A mutex that is still locked (a leaked guard, say) may not be
        // destroyed, and freeing its memory is unsound on some platforms.
        match unsafe { libc::pthread_mutex_destroy(boxed.0.get()) } {
            0 => drop(boxed),
            _ => mem::forget(boxed),
        }
    }
}

pub(crate) struct Mutex {
    inner: LazyBox<PthreadMutex>,
}

impl Mutex {
    #[inline]
    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get().0.get()
    }
}

unsafe impl RawLock for Mutex {
    const INIT: Self = Self {
        inner: LazyBox::new(),
    };

    fn new() -> Result<Self, Error> {
        PthreadMutex::init().map(|mutex| Self {
            inner: LazyBox::from_box(mutex),
        })
    }

    #[inline]
    fn lock(&self) {
        let rc = unsafe { libc::pthread_mutex_lock(self.raw()) };
        assert_eq!(rc, 0, "pthread_mutex_lock: {}", io::Error::from_raw_os_error(rc));
    }

    #[inline]
    fn try_lock(&self) -> bool {
        unsafe { libc::pthread_mutex_trylock(self.raw()) == 0 }
    }

    #[inline]
    unsafe fn unlock(&self) {
        let rc = libc::pthread_mutex_unlock(self.raw());
        debug_assert_eq!(rc, 0, "pthread_mutex_unlock: {}", io::Error::from_raw_os_error(rc));
    }
}

struct PthreadCond(UnsafeCell<libc::pthread_cond_t>);

unsafe impl Send for PthreadCond {}
unsafe impl Sync for PthreadCond {}

struct CondAttr(MaybeUninit<libc::pthread_condattr_t>);

impl Drop for CondAttr {
    fn drop(&mut self) {
        let rc = unsafe { libc::pthread_condattr_destroy(self.0.as_mut_ptr()) };
        debug_assert_eq!(rc, 0);
    }
}

impl LazyInit for PthreadCond {
    const WHAT: &'static str = "condition variable";

    fn init() -> Result<Box<Self>, Error> {
        let cond = Box::new(Self(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER)));
        unsafe {
            let mut attr = MaybeUninit::uninit();
            check(Self::WHAT, libc::pthread_condattr_init(attr.as_mut_ptr()))?;
            let mut attr = CondAttr(attr);
            #[cfg(any(target_os = "linux", target_os = "android"))]
            check(
                Self::WHAT,
                libc::pthread_condattr_setclock(attr.0.as_mut_ptr(), CLOCK),
            )?;
            check(
                Self::WHAT,
                libc::pthread_cond_init(cond.0.get(), attr.0.as_ptr()),
            )?;
        }
        Ok(cond)
    }

    fn destroy(boxed: Box<Self>) {
        match unsafe { libc::pthread_cond_destroy(boxed.0.get()) } {
            0 => drop(boxed),
            _ => mem::forget(boxed),
        }
    }
}

pub(crate) struct Condvar {
    inner: LazyBox<PthreadCond>,
    /// Address of the first mutex waited with. POSIX leaves waiting on one
    /// condvar with different mutexes undefined.
    mutex: AtomicUsize,
}

impl Condvar {
    #[inline]
    fn raw(&self) -> *mut libc::pthread_cond_t {
        self.inner.get().0.get()
    }

    fn verify(&self, mutex: *mut libc::pthread_mutex_t) {
        let addr = mutex as usize;
        match self
            .mutex
            .compare_exchange(0, addr, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => {}
            Err(current) if current == addr => {}
            Err(_) => panic!("attempted to use a condition variable with two mutexes"),
        }
    }
}

unsafe impl RawCond for Condvar {
    type Lock = Mutex;

    const INIT: Self = Self {
        inner: LazyBox::new(),
        mutex: AtomicUsize::new(0),
    };

    fn new() -> Result<Self, Error> {
        PthreadCond::init().map(|cond| Self {
            inner: LazyBox::from_box(cond),
            mutex: AtomicUsize::new(0),
        })
    }

    unsafe fn wait(&self, lock: &Mutex) {
        let mutex = lock.raw();
        self.verify(mutex);

        let rc = libc::pthread_cond_wait(self.raw(), mutex);
        debug_assert_eq!(rc, 0, "pthread_cond_wait: {}", io::Error::from_raw_os_error(rc));
    }

    unsafe fn wait_timeout(&self, lock: &Mutex, timeout_ms: u32) -> bool {
        let mutex = lock.raw();
        self.verify(mutex);

        let deadline = Deadline::after(clock_now(), timeout_ms).to_timespec();
        match libc::pthread_cond_timedwait(self.raw(), mutex, &deadline) {
            0 => false,
            libc::ETIMEDOUT => true,
            rc => unreachable!(
                "pthread_cond_timedwait: {}",
                io::Error::from_raw_os_error(rc)
            ),
        }
    }

    #[inline]
    fn notify_one(&self) {
        // Nothing can be waiting on a condvar which was never initialized.
        if let Some(cond) = self.inner.get_initialized() {
            let rc = unsafe { libc::pthread_cond_signal(cond.0.get()) };
            debug_assert_eq!(rc, 0);
        }
    }

    #[inline]
    fn notify_all(&self) {
        if let Some(cond) = self.inner.get_initialized() {
            let rc = unsafe { libc::pthread_cond_broadcast(cond.0.get()) };
            debug_assert_eq!(rc, 0);
        }
    }
}

pub(crate) struct Thread {
    id: libc::pthread_t,
}

unsafe impl Send for Thread {}
unsafe impl Sync for Thread {}

type ThreadMain = Box<dyn FnOnce() + Send + 'static>;

extern "C" fn thread_start(main: *mut libc::c_void) -> *mut libc::c_void {
    unsafe {
        let main = Box::from_raw(main.cast::<ThreadMain>());
        main();
    }
    ptr::null_mut()
}

impl RawThread for Thread {
    fn spawn(main: ThreadMain) -> Result<Self, Error> {
        let main = Box::into_raw(Box::new(main));
        let mut id = MaybeUninit::<libc::pthread_t>::uninit();

        let rc = unsafe {
            libc::pthread_create(id.as_mut_ptr(), ptr::null(), thread_start, main.cast())
        };
        if rc != 0 {
            // The thread never started so `main` is still ours to free.
            drop(unsafe { Box::from_raw(main) });
            return Err(Error::resource("thread", rc));
        }

        Ok(Self {
            id: unsafe { id.assume_init() },
        })
    }

    fn join(self) {
        let id = self.id;
        mem::forget(self);

        let rc = unsafe { libc::pthread_join(id, ptr::null_mut()) };
        assert_eq!(rc, 0, "failed to join thread: {}", io::Error::from_raw_os_error(rc));
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        let rc = unsafe { libc::pthread_detach(self.id) };
        debug_assert_eq!(rc, 0);
    }
}

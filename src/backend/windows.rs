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
use crate::Error;
use std::{cell::UnsafeCell, io, mem, ptr};

pub(crate) const KIND: BackendKind = BackendKind::CriticalSection;

struct CriticalSection {
    cs: UnsafeCell<winapi::CRITICAL_SECTION>,
    /// Critical sections are re-entrant while `MutexGuard`s must be unique.
    /// Only read or written by the thread inside the critical section.
    held: UnsafeCell<bool>,
}

unsafe impl Send for CriticalSection {}
unsafe impl Sync for CriticalSection {}

impl CriticalSection {
    /// Records ownership after entering. Returns false (and leaves again) if
    /// the caller already owned it.
    unsafe fn acquired(&self) -> bool {
        if *self.held.get() {
            winapi::LeaveCriticalSection(self.cs.get());
            return false;
        }
        *self.held.get() = true;
        true
    }
}

impl LazyInit for CriticalSection {
    const WHAT: &'static str = "mutex";

    fn init() -> Result<Box<Self>, Error> {
        let section = Box::new(Self {
            cs: UnsafeCell::new(unsafe { mem::zeroed() }),
            held: UnsafeCell::new(false),
        });
        unsafe { winapi::InitializeCriticalSection(section.cs.get()) };
        Ok(section)
    }

    fn destroy(boxed: Box<Self>) {
        unsafe { winapi::DeleteCriticalSection(boxed.cs.get()) };
        drop(boxed)
    }
}

pub(crate) struct Mutex {
    inner: LazyBox<CriticalSection>,
}

unsafe impl RawLock for Mutex {
    const INIT: Self = Self {
        inner: LazyBox::new(),
    };

    fn new() -> Result<Self, Error> {
        CriticalSection::init().map(|section| Self {
            inner: LazyBox::from_box(section),
        })
    }

    #[inline]
    fn lock(&self) {
        let section = self.inner.get();
        unsafe {
            winapi::EnterCriticalSection(section.cs.get());
            if !section.acquired() {
                panic!("cannot recursively acquire mutex");
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        let section = self.inner.get();
        unsafe {
            winapi::TryEnterCriticalSection(section.cs.get()) != winapi::FALSE
                && section.acquired()
        }
    }

    #[inline]
    unsafe fn unlock(&self) {
        let section = self.inner.get();
        *section.held.get() = false;
        winapi::LeaveCriticalSection(section.cs.get());
    }
}

pub(crate) struct Condvar {
    inner: UnsafeCell<winapi::CONDITION_VARIABLE>,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Condvar {
    /// Sleeps on the condvar, keeping `held` in step with the critical
    /// section which the OS releases for the duration of the sleep.
    unsafe fn sleep(&self, lock: &Mutex, timeout_ms: winapi::DWORD) -> Result<(), winapi::DWORD> {
        let section = lock.inner.get();
        *section.held.get() = false;

        let slept = winapi::SleepConditionVariableCS(self.inner.get(), section.cs.get(), timeout_ms);
        let result = match slept {
            winapi::FALSE => Err(winapi::GetLastError()),
            _ => Ok(()),
        };

        *section.held.get() = true;
        result
    }
}

unsafe impl RawCond for Condvar {
    type Lock = Mutex;

    const INIT: Self = Self {
        inner: UnsafeCell::new(winapi::CONDITION_VARIABLE_INIT),
    };

    fn new() -> Result<Self, Error> {
        Ok(Self::INIT)
    }

    unsafe fn wait(&self, lock: &Mutex) {
        let result = self.sleep(lock, winapi::INFINITE);
        debug_assert_eq!(result, Ok(()), "SleepConditionVariableCS failed");
    }

    unsafe fn wait_timeout(&self, lock: &Mutex, timeout_ms: u32) -> bool {
        // INFINITE is u32::MAX, which would turn the longest timeout into no timeout.
        let timeout_ms = timeout_ms.min(winapi::INFINITE - 1);
        match self.sleep(lock, timeout_ms) {
            Ok(()) => false,
            Err(winapi::ERROR_TIMEOUT) => true,
            Err(code) => unreachable!(
                "SleepConditionVariableCS: {}",
                io::Error::from_raw_os_error(code as i32)
            ),
        }
    }

    #[inline]
    fn notify_one(&self) {
        unsafe { winapi::WakeConditionVariable(self.inner.get()) }
    }

    #[inline]
    fn notify_all(&self) {
        unsafe { winapi::WakeAllConditionVariable(self.inner.get()) }
    }
}

pub(crate) struct Thread {
    handle: winapi::HANDLE,
}

unsafe impl Send for Thread {}
unsafe impl Sync for Thread {}

type ThreadMain = Box<dyn FnOnce() + Send + 'static>;

extern "system" fn thread_start(main: winapi::PVOID) -> winapi::DWORD {
    unsafe {
        let main = Box::from_raw(main.cast::<ThreadMain>());
        main();
    }
    0
}

impl RawThread for Thread {
    fn spawn(main: ThreadMain) -> Result<Self, Error> {
        let main = Box::into_raw(Box::new(main));

        let handle = unsafe {
            winapi::CreateThread(
                ptr::null_mut(),
                0,
                thread_start,
                main.cast(),
                0,
                ptr::null_mut(),
            )
        };
        if handle.is_null() {
            let code = unsafe { winapi::GetLastError() };
            drop(unsafe { Box::from_raw(main) });
            return Err(Error::resource("thread", code as i32));
        }

        Ok(Self { handle })
    }

    fn join(self) {
        let handle = self.handle;
        mem::forget(self);

        unsafe {
            let status = winapi::WaitForSingleObject(handle, winapi::INFINITE);
            assert_eq!(
                status,
                winapi::WAIT_OBJECT_0,
                "failed to join thread: {}",
                io::Error::last_os_error()
            );
            winapi::CloseHandle(handle);
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        unsafe { winapi::CloseHandle(self.handle) };
    }
}

#[allow(non_camel_case_types, non_snake_case, dead_code)]
mod winapi {
    pub(super) type DWORD = u32;
    pub(super) type BOOL = i32;
    pub(super) type PVOID = *mut core::ffi::c_void;
    pub(super) type HANDLE = PVOID;

    pub(super) const FALSE: BOOL = 0;
    pub(super) const INFINITE: DWORD = 0xFFFF_FFFF;
    pub(super) const WAIT_OBJECT_0: DWORD = 0;
    pub(super) const ERROR_TIMEOUT: DWORD = 1460;

    #[repr(C)]
    pub(super) struct CRITICAL_SECTION {
        DebugInfo: PVOID,
        LockCount: i32,
        RecursionCount: i32,
        OwningThread: HANDLE,
        LockSemaphore: HANDLE,
        SpinCount: usize,
    }

    #[repr(C)]
    pub(super) struct CONDITION_VARIABLE {
        Ptr: PVOID,
    }

    pub(super) const CONDITION_VARIABLE_INIT: CONDITION_VARIABLE = CONDITION_VARIABLE {
        Ptr: core::ptr::null_mut(),
    };

    pub(super) type ThreadStart = extern "system" fn(PVOID) -> DWORD;

    #[link(name = "kernel32")]
    extern "system" {
        pub(super) fn InitializeCriticalSection(cs: *mut CRITICAL_SECTION);
        pub(super) fn DeleteCriticalSection(cs: *mut CRITICAL_SECTION);
        pub(super) fn EnterCriticalSection(cs: *mut CRITICAL_SECTION);
        pub(super) fn TryEnterCriticalSection(cs: *mut CRITICAL_SECTION) -> BOOL;
        pub(super) fn LeaveCriticalSection(cs: *mut CRITICAL_SECTION);

        pub(super) fn SleepConditionVariableCS(
            cv: *mut CONDITION_VARIABLE,
            cs: *mut CRITICAL_SECTION,
            dwMilliseconds: DWORD,
        ) -> BOOL;
        pub(super) fn WakeConditionVariable(cv: *mut CONDITION_VARIABLE);
        pub(super) fn WakeAllConditionVariable(cv: *mut CONDITION_VARIABLE);

        pub(super) fn CreateThread(
            lpThreadAttributes: PVOID,
            dwStackSize: usize,
            lpStartAddress: ThreadStart,
            lpParameter: PVOID,
            dwCreationFlags: DWORD,
            lpThreadId: *mut DWORD,
        ) -> HANDLE;
        pub(super) fn WaitForSingleObject(hHandle: HANDLE, dwMilliseconds: DWORD) -> DWORD;
        pub(super) fn CloseHandle(hObject: HANDLE) -> BOOL;
        pub(super) fn GetLastError() -> DWORD;
    }
}

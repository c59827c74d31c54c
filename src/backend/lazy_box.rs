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

//! Heap storage for native objects which must never move once initialized.
//!
//! `pthread_mutex_t` and `CRITICAL_SECTION` may not be relocated after their
//! init call, yet the Rust types wrapping them can be moved freely and must
//! be constructible in a `const` context. The native object therefore lives
//! behind a pointer which is filled on first use.

use crate::Error;
use std::{
    marker::PhantomData,
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

pub(crate) trait LazyInit: Sized {
    const WHAT: &'static str;

    fn init() -> Result<Box<Self>, Error>;

    /// Releases the native object. Backends may leak `boxed` if the OS
    /// reports that it is still in use.
    fn destroy(boxed: Box<Self>) {
        drop(boxed)
    }
}

pub(crate) struct LazyBox<T: LazyInit> {
    ptr: AtomicPtr<T>,
    _marker: PhantomData<T>,
}

impl<T: LazyInit> LazyBox<T> {
    pub(crate) const fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_box(boxed: Box<T>) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(boxed)),
            _marker: PhantomData,
        }
    }

    /// Returns the native object, creating it if this is the first use.
    #[inline]
    pub(crate) fn get(&self) -> &T {
        let ptr = self.ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            self.initialize()
        } else {
            unsafe { &*ptr }
        }
    }

    /// Returns the native object only if something already created it.
    #[cfg_attr(not(syncprim_backend = "posix"), allow(dead_code))]
    #[inline]
    pub(crate) fn get_initialized(&self) -> Option<&T> {
        unsafe { self.ptr.load(Ordering::Acquire).as_ref() }
    }

    #[cold]
    fn initialize(&self) -> &T {
        let new = match T::init() {
            Ok(boxed) => Box::into_raw(boxed),
            Err(err) => panic!("failed to lazily initialize {}: {}", T::WHAT, err),
        };

        match self
            .ptr
            .compare_exchange(ptr::null_mut(), new, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::trace!(what = T::WHAT, "lazily initialized native object");
                unsafe { &*new }
            }
            Err(existing) => {
                T::destroy(unsafe { Box::from_raw(new) });
                unsafe { &*existing }
            }
        }
    }
}

impl<T: LazyInit> Drop for LazyBox<T> {
    fn drop(&mut self) {
        let ptr = *self.ptr.get_mut();
        if !ptr.is_null() {
            T::destroy(unsafe { Box::from_raw(ptr) });
        }
    }
}

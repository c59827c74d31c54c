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

use std::io;

/// Failures reported by the primitives in this crate.
///
/// Timing out is not an error: see [`WaitTimeoutResult`](crate::WaitTimeoutResult).
/// Misuse such as unlocking a mutex that isn't held is not reported through
/// this type either; it panics where it can be detected cheaply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OS could not allocate a primitive or a thread.
    #[error("failed to create {what}")]
    Resource {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// The thread's entry function panicked instead of returning a result.
    #[error("thread panicked before producing a result")]
    Panicked,
}

impl Error {
    pub(crate) fn resource(what: &'static str, code: i32) -> Self {
        let source = io::Error::from_raw_os_error(code);
        tracing::debug!(what, error = %source, "native allocation failed");
        Self::Resource { what, source }
    }

    /// Returns true if this error came from the OS running out of resources.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }
}

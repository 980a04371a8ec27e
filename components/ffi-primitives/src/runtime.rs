// Copyright 2025 The Rivet Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The runtime entry points every core library exports.
//!
//! Each symbol is exported as `<prefix><name>`, where the prefix is chosen per
//! library (for example `rivet_demo_`). Field order is the order in which the
//! host resolves them.

use crate::core_vtable;
use crate::types::{CallStatus, ContinuationCallback, ForeignBytes, RustBuffer};

core_vtable! {
    /// Buffer management, contract discovery and task polling.
    pub struct RuntimeVtable {
        fn rustbuffer_alloc(size: u64, status: *mut CallStatus) -> RustBuffer,
        fn rustbuffer_from_bytes(bytes: ForeignBytes, status: *mut CallStatus) -> RustBuffer,
        fn rustbuffer_free(buffer: RustBuffer, status: *mut CallStatus),
        fn rustbuffer_reserve(buffer: RustBuffer, additional: u64, status: *mut CallStatus) -> RustBuffer,
        fn contract_version(status: *mut CallStatus) -> u32,
        /// Installs the process-wide continuation. Called once per runtime.
        fn future_continuation_callback_set(callback: ContinuationCallback, status: *mut CallStatus),
        /// Returns [`POLL_READY`](crate::POLL_READY) or [`POLL_PENDING`](crate::POLL_PENDING).
        fn future_poll(handle: u64, callback_data: u64, status: *mut CallStatus) -> i8,
        fn future_cancel(handle: u64, status: *mut CallStatus),
        fn future_complete_buffer(handle: u64, status: *mut CallStatus) -> RustBuffer,
        fn future_complete_u64(handle: u64, status: *mut CallStatus) -> u64,
        fn future_complete_void(handle: u64, status: *mut CallStatus),
        fn future_free(handle: u64, status: *mut CallStatus),
    }
}

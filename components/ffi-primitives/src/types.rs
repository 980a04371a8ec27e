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

//! `#[repr(C)]` types exchanged across the host/core boundary.

use std::any::Any;
use std::ffi::c_void;

/// Version of the runtime contract implemented by this crate. A host refuses
/// to drive a core reporting any other value.
pub const CONTRACT_VERSION: u32 = 1;

// ============================================================================
// Buffers
// ============================================================================

/// A byte region allocated and owned by the core.
///
/// The host never frees `data` itself; it hands the buffer back to the core
/// through the runtime's `rustbuffer_free` entry point. A zeroed buffer
/// (null `data`, zero `len`) is the empty buffer.
#[repr(C)]
#[derive(Debug)]
pub struct RustBuffer {
    pub capacity: u64,
    pub len: u64,
    pub data: *mut u8,
}

impl RustBuffer {
    pub const fn empty() -> Self {
        Self {
            capacity: 0,
            len: 0,
            data: std::ptr::null_mut(),
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when no allocation backs this buffer.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// View the written bytes.
    ///
    /// # Safety
    /// `data` must point to at least `len` initialized bytes that stay alive
    /// for the returned lifetime.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.data.is_null() || self.len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.data, self.len as usize)
        }
    }
}

impl Default for RustBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

/// A host-owned byte region lent to the core for the duration of one call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignBytes {
    pub len: i32,
    pub data: *const u8,
}

impl ForeignBytes {
    /// Lend `bytes` to the core. Returns `None` when the slice is too long
    /// for the 32-bit length field.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let len = i32::try_from(bytes.len()).ok()?;
        Some(Self {
            len,
            data: bytes.as_ptr(),
        })
    }

    /// # Safety
    /// `data` must point to `len` readable bytes for the returned lifetime.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.data.is_null() || self.len <= 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.data, self.len as usize)
        }
    }
}

// ============================================================================
// Call status
// ============================================================================

/// Out-parameter written by every core entry point.
///
/// The caller zero-initializes it; the core writes a non-zero `code` on
/// failure and, for domain errors and panics, an `error_buf` payload that the
/// caller must free.
#[repr(C)]
#[derive(Debug, Default)]
pub struct CallStatus {
    pub code: i8,
    pub error_buf: RustBuffer,
}

impl CallStatus {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Known values of [`CallStatus::code`].
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatusCode {
    Success = 0,
    /// `error_buf` holds a wire-encoded domain error.
    Error = 1,
    /// `error_buf` holds raw UTF-8 panic text, or is empty if producing the
    /// text itself failed.
    UnexpectedError = 2,
    Cancelled = 3,
}

impl CallStatusCode {
    pub fn from_raw(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Error),
            2 => Some(Self::UnexpectedError),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i8 {
        self as i8
    }
}

// ============================================================================
// Async polling
// ============================================================================

/// `future_poll` result: the task reached a terminal state, call `complete`.
pub const POLL_READY: i8 = 0;
/// Continuation argument: the task may have progressed, poll again.
pub const POLL_MAYBE_READY: i8 = 1;
/// `future_poll` result: the continuation will be invoked exactly once later.
pub const POLL_PENDING: i8 = -1;

/// Host function the core invokes when a pending task can make progress.
/// `data` is the opaque value the host passed to `future_poll`.
pub type ContinuationCallback = extern "C" fn(data: u64, poll_result: i8);

// ============================================================================
// Callbacks (core -> host)
// ============================================================================

/// Method index reserved for releasing a callback handle.
pub const CALLBACK_METHOD_FREE: u32 = 0;

/// Result codes returned by a [`CallbackDispatchFn`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackResultCode {
    Success = 0,
    /// The out buffer holds a wire-encoded domain error.
    Error = 1,
    /// The out buffer holds raw UTF-8 failure text.
    UnexpectedError = 2,
    Cancelled = 3,
}

impl CallbackResultCode {
    pub fn from_raw(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Error),
            2 => Some(Self::UnexpectedError),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Per-contract dispatch function the host installs in the core.
///
/// The host writes its result into `out`, in a buffer allocated through the
/// core's allocator; ownership of that buffer passes to the core.
pub type CallbackDispatchFn = extern "C" fn(
    handle: u64,
    method: u32,
    args_data: *const u8,
    args_len: i32,
    out: *mut RustBuffer,
) -> i32;

// ============================================================================
// Per-operation entry point shapes
// ============================================================================

/// Releases the core object behind `pointer`.
pub type ObjectFreeFn = unsafe extern "C" fn(pointer: *mut c_void, status: *mut CallStatus);

/// Produces a new reference to the core object behind `pointer`.
pub type ObjectCloneFn =
    unsafe extern "C" fn(pointer: *mut c_void, status: *mut CallStatus) -> *mut c_void;

/// Returns the checksum of one exported operation's signature.
pub type ChecksumFn = unsafe extern "C" fn() -> u16;

/// Installs the host's dispatch function for one callback contract.
pub type CallbackInitFn =
    unsafe extern "C" fn(dispatch: CallbackDispatchFn, status: *mut CallStatus);

// ============================================================================
// Helpers
// ============================================================================

/// Extract a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

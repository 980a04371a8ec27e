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

//! Scaffolding for core entry points.
//!
//! Entry point bodies run inside `catch_unwind` so a panic never unwinds into
//! the host. Outcomes are reported through the caller's [`CallStatus`]:
//!
//! - success: status untouched, value returned
//! - domain error: code 1, wire-encoded error in `error_buf`
//! - panic: code 2, panic text in `error_buf` (empty if building it failed)

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rivet_ffi_primitives::wire::{encode, WireFormat};
use rivet_ffi_primitives::{panic_message, CallStatus, CallStatusCode, RustBuffer};

use crate::buffer::buffer_from_vec;

/// Value returned from an entry point whose call did not succeed.
pub trait FfiDefault {
    fn ffi_default() -> Self;
}

macro_rules! impl_ffi_default {
    ($($ty:ty => $value:expr),* $(,)?) => {
        $(
            impl FfiDefault for $ty {
                fn ffi_default() -> Self {
                    $value
                }
            }
        )*
    };
}

impl_ffi_default! {
    () => (),
    bool => false,
    i8 => 0,
    u8 => 0,
    i16 => 0,
    u16 => 0,
    i32 => 0,
    u32 => 0,
    i64 => 0,
    u64 => 0,
    f32 => 0.0,
    f64 => 0.0,
    RustBuffer => RustBuffer::empty(),
    *mut c_void => std::ptr::null_mut(),
    *const c_void => std::ptr::null(),
}

/// Run an infallible entry point body.
pub fn rust_call<R, F>(status: *mut CallStatus, body: F) -> R
where
    R: FfiDefault,
    F: FnOnce() -> R,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(payload) => {
            write_panic(status, &panic_message(payload.as_ref()));
            R::ffi_default()
        }
    }
}

/// Run an entry point body that may fail with a wire-encodable domain error.
pub fn rust_call_with_error<R, E, F>(status: *mut CallStatus, body: F) -> R
where
    R: FfiDefault,
    E: WireFormat,
    F: FnOnce() -> Result<R, E>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            match encode(&error) {
                Ok(bytes) => write_status(status, CallStatusCode::Error, bytes),
                Err(err) => write_panic(status, &format!("failed to encode error: {err}")),
            }
            R::ffi_default()
        }
        Err(payload) => {
            write_panic(status, &panic_message(payload.as_ref()));
            R::ffi_default()
        }
    }
}

/// Report a panic. If building the message buffer itself panics, the status
/// carries code 2 with an empty buffer.
pub fn write_panic(status: *mut CallStatus, message: &str) {
    log::error!("Panic in core entry point: {message}");
    let bytes = catch_unwind(|| message.as_bytes().to_vec()).unwrap_or_default();
    write_status(status, CallStatusCode::UnexpectedError, bytes);
}

/// Report that the operation was cancelled.
pub fn write_cancelled(status: *mut CallStatus) {
    write_status(status, CallStatusCode::Cancelled, Vec::new());
}

pub(crate) fn write_status(status: *mut CallStatus, code: CallStatusCode, payload: Vec<u8>) {
    let Some(status) = (unsafe { status.as_mut() }) else {
        log::error!("Core entry point called without a status out-parameter (code {code:?} lost)");
        return;
    };
    status.code = code.as_raw();
    status.error_buf = if payload.is_empty() {
        RustBuffer::empty()
    } else {
        buffer_from_vec(payload)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::buffer_into_vec;
    use rivet_ffi_primitives::wire::{DecodeError, EncodeError, WireReader, WireWriter};

    struct Rejected(u32);

    impl WireFormat for Rejected {
        fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
            writer.put_i32(1);
            writer.put_u32(self.0);
            Ok(())
        }

        fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
            reader.get_i32()?;
            Ok(Rejected(reader.get_u32()?))
        }
    }

    #[test]
    fn test_success_leaves_status_untouched() {
        let mut status = CallStatus::new();
        let value = rust_call(&mut status, || 5u64);
        assert_eq!(value, 5);
        assert_eq!(status.code, 0);
        assert!(status.error_buf.is_null());
    }

    #[test]
    fn test_domain_error_is_encoded() {
        let mut status = CallStatus::new();
        let value: u32 = rust_call_with_error(&mut status, || Err(Rejected(9)));
        assert_eq!(value, 0);
        assert_eq!(status.code, CallStatusCode::Error.as_raw());
        let payload = unsafe { buffer_into_vec(std::mem::take(&mut status.error_buf)) };
        assert_eq!(payload, vec![0, 0, 0, 1, 0, 0, 0, 9]);
    }

    #[test]
    fn test_panic_becomes_unexpected_error() {
        let mut status = CallStatus::new();
        let value: RustBuffer = rust_call(&mut status, || panic!("core exploded"));
        assert!(value.is_null());
        assert_eq!(status.code, CallStatusCode::UnexpectedError.as_raw());
        let payload = unsafe { buffer_into_vec(std::mem::take(&mut status.error_buf)) };
        assert_eq!(payload, b"core exploded");
    }

    #[test]
    fn test_null_status_is_tolerated() {
        let value: u8 = rust_call(std::ptr::null_mut(), || panic!("nowhere to report"));
        assert_eq!(value, 0);
    }
}

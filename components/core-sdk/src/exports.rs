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

//! Runtime entry points.
//!
//! The functions here are unprefixed. A core library exports them under its
//! own prefix with [`export_runtime!`](crate::export_runtime), or hands
//! [`runtime_symbols`] to an in-process host.

use std::ffi::c_void;

use rivet_ffi_primitives::{
    CallStatus, ContinuationCallback, ForeignBytes, RustBuffer, CONTRACT_VERSION,
};

use crate::buffer::{buffer_from_vec, buffer_into_vec, buffer_reserve};
use crate::call::rust_call;
use crate::future;

pub extern "C" fn rustbuffer_alloc(size: u64, status: *mut CallStatus) -> RustBuffer {
    rust_call(status, || match usize::try_from(size) {
        Ok(size) => buffer_from_vec(Vec::with_capacity(size)),
        Err(_) => panic!("buffer size {size} exceeds the address space"),
    })
}

pub extern "C" fn rustbuffer_from_bytes(bytes: ForeignBytes, status: *mut CallStatus) -> RustBuffer {
    rust_call(status, || buffer_from_vec(unsafe { bytes.as_slice() }.to_vec()))
}

pub extern "C" fn rustbuffer_free(buffer: RustBuffer, status: *mut CallStatus) {
    rust_call(status, || drop(unsafe { buffer_into_vec(buffer) }))
}

pub extern "C" fn rustbuffer_reserve(
    buffer: RustBuffer,
    additional: u64,
    status: *mut CallStatus,
) -> RustBuffer {
    rust_call(status, || match usize::try_from(additional) {
        Ok(additional) => unsafe { buffer_reserve(buffer, additional) },
        Err(_) => panic!("cannot reserve {additional} bytes"),
    })
}

pub extern "C" fn contract_version(status: *mut CallStatus) -> u32 {
    rust_call(status, || CONTRACT_VERSION)
}

pub extern "C" fn future_continuation_callback_set(
    callback: ContinuationCallback,
    status: *mut CallStatus,
) {
    rust_call(status, || future::set_continuation(callback))
}

pub extern "C" fn future_poll(handle: u64, callback_data: u64, status: *mut CallStatus) -> i8 {
    rust_call(status, || future::poll(handle, callback_data))
}

pub extern "C" fn future_cancel(handle: u64, status: *mut CallStatus) {
    rust_call(status, || future::cancel(handle))
}

pub extern "C" fn future_complete_buffer(handle: u64, status: *mut CallStatus) -> RustBuffer {
    rust_call(status, || future::complete_buffer(handle, status))
}

pub extern "C" fn future_complete_u64(handle: u64, status: *mut CallStatus) -> u64 {
    rust_call(status, || future::complete_u64(handle, status))
}

pub extern "C" fn future_complete_void(handle: u64, status: *mut CallStatus) {
    rust_call(status, || future::complete_void(handle, status))
}

pub extern "C" fn future_free(handle: u64, status: *mut CallStatus) {
    rust_call(status, || future::free(handle))
}

/// Unprefixed runtime symbol names with their addresses, in the order the
/// host resolves them.
pub fn runtime_symbols() -> Vec<(&'static str, *const c_void)> {
    vec![
        ("rustbuffer_alloc", rustbuffer_alloc as *const c_void),
        ("rustbuffer_from_bytes", rustbuffer_from_bytes as *const c_void),
        ("rustbuffer_free", rustbuffer_free as *const c_void),
        ("rustbuffer_reserve", rustbuffer_reserve as *const c_void),
        ("contract_version", contract_version as *const c_void),
        (
            "future_continuation_callback_set",
            future_continuation_callback_set as *const c_void,
        ),
        ("future_poll", future_poll as *const c_void),
        ("future_cancel", future_cancel as *const c_void),
        ("future_complete_buffer", future_complete_buffer as *const c_void),
        ("future_complete_u64", future_complete_u64 as *const c_void),
        ("future_complete_void", future_complete_void as *const c_void),
        ("future_free", future_free as *const c_void),
    ]
}

/// Export the runtime entry points as `<prefix><name>` C symbols.
///
/// # Example
///
/// ```ignore
/// rivet_core_sdk::export_runtime!("rivet_demo_");
/// ```
#[macro_export]
macro_rules! export_runtime {
    ($prefix:literal) => {
        const _: () = {
            use $crate::primitives::{CallStatus, ContinuationCallback, ForeignBytes, RustBuffer};

            #[export_name = concat!($prefix, "rustbuffer_alloc")]
            extern "C" fn rustbuffer_alloc(size: u64, status: *mut CallStatus) -> RustBuffer {
                $crate::exports::rustbuffer_alloc(size, status)
            }

            #[export_name = concat!($prefix, "rustbuffer_from_bytes")]
            extern "C" fn rustbuffer_from_bytes(
                bytes: ForeignBytes,
                status: *mut CallStatus,
            ) -> RustBuffer {
                $crate::exports::rustbuffer_from_bytes(bytes, status)
            }

            #[export_name = concat!($prefix, "rustbuffer_free")]
            extern "C" fn rustbuffer_free(buffer: RustBuffer, status: *mut CallStatus) {
                $crate::exports::rustbuffer_free(buffer, status)
            }

            #[export_name = concat!($prefix, "rustbuffer_reserve")]
            extern "C" fn rustbuffer_reserve(
                buffer: RustBuffer,
                additional: u64,
                status: *mut CallStatus,
            ) -> RustBuffer {
                $crate::exports::rustbuffer_reserve(buffer, additional, status)
            }

            #[export_name = concat!($prefix, "contract_version")]
            extern "C" fn contract_version(status: *mut CallStatus) -> u32 {
                $crate::exports::contract_version(status)
            }

            #[export_name = concat!($prefix, "future_continuation_callback_set")]
            extern "C" fn future_continuation_callback_set(
                callback: ContinuationCallback,
                status: *mut CallStatus,
            ) {
                $crate::exports::future_continuation_callback_set(callback, status)
            }

            #[export_name = concat!($prefix, "future_poll")]
            extern "C" fn future_poll(handle: u64, callback_data: u64, status: *mut CallStatus) -> i8 {
                $crate::exports::future_poll(handle, callback_data, status)
            }

            #[export_name = concat!($prefix, "future_cancel")]
            extern "C" fn future_cancel(handle: u64, status: *mut CallStatus) {
                $crate::exports::future_cancel(handle, status)
            }

            #[export_name = concat!($prefix, "future_complete_buffer")]
            extern "C" fn future_complete_buffer(handle: u64, status: *mut CallStatus) -> RustBuffer {
                $crate::exports::future_complete_buffer(handle, status)
            }

            #[export_name = concat!($prefix, "future_complete_u64")]
            extern "C" fn future_complete_u64(handle: u64, status: *mut CallStatus) -> u64 {
                $crate::exports::future_complete_u64(handle, status)
            }

            #[export_name = concat!($prefix, "future_complete_void")]
            extern "C" fn future_complete_void(handle: u64, status: *mut CallStatus) {
                $crate::exports::future_complete_void(handle, status)
            }

            #[export_name = concat!($prefix, "future_free")]
            extern "C" fn future_free(handle: u64, status: *mut CallStatus) {
                $crate::exports::future_free(handle, status)
            }
        };
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_ffi_primitives::RuntimeVtable;

    crate::export_runtime!("rivet_sdk_test_");

    extern "C" {
        #[link_name = "rivet_sdk_test_contract_version"]
        fn exported_contract_version(status: *mut CallStatus) -> u32;
    }

    #[test]
    fn test_symbols_cover_runtime_vtable() {
        let names: Vec<&str> = runtime_symbols().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, RuntimeVtable::SYMBOLS);
    }

    #[test]
    fn test_symbols_resolve_into_vtable() {
        let symbols = runtime_symbols();
        let vtable = unsafe {
            RuntimeVtable::resolve(|name| {
                symbols
                    .iter()
                    .find(|(candidate, _)| *candidate == name)
                    .map(|(_, address)| *address)
            })
        }
        .unwrap();

        let mut status = CallStatus::new();
        let bytes = [1u8, 2, 3];
        let lent = ForeignBytes::from_slice(&bytes).unwrap();
        let buffer = unsafe { (vtable.rustbuffer_from_bytes)(lent, &mut status) };
        assert_eq!(unsafe { buffer.as_slice() }, &bytes);
        let buffer = unsafe { (vtable.rustbuffer_reserve)(buffer, 10, &mut status) };
        assert!(buffer.capacity >= 13);
        unsafe { (vtable.rustbuffer_free)(buffer, &mut status) };
        assert_eq!(status.code, 0);
    }

    #[test]
    fn test_exported_symbol_is_linkable() {
        let mut status = CallStatus::new();
        assert_eq!(
            unsafe { exported_contract_version(&mut status) },
            CONTRACT_VERSION
        );
    }
}

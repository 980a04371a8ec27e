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

//! A small core library built as a `cdylib`.
//!
//! The host SDK's loading tests open it with `libloading` and drive it through
//! the same symbols a generated core exports:
//!
//! - runtime entry points under [`PREFIX`]
//! - `fn_greet`: a fallible synchronous operation
//! - `fn_add_async`: a task that is pending once before completing
//! - `fn_greet_via` and `callback_init_greeter`: a call back into the host
//! - a checksum function for `fn_greet`

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rivet_core_sdk::primitives::wire::{decode, encode};
use rivet_core_sdk::primitives::{wire_enum, CallbackDispatchFn};
use rivet_core_sdk::{
    buffer_from_vec, buffer_into_vec, init_callback_contract, rust_call, rust_call_with_error,
    spawn, CallStatus, ForeignCallback, ForeignCallbackError, RustBuffer, TaskResult, TaskValue,
};

pub const PREFIX: &str = "rivet_demo_";
pub const GREET_CHECKSUM_SYMBOL: &str = "uniffi_rivet_demo_checksum_fn_greet";
pub const GREET_CHECKSUM: u16 = 0x5151;
pub const GREETER_CONTRACT: &str = "greeter";

rivet_core_sdk::export_runtime!("rivet_demo_");

wire_enum! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GreetError {
        EmptyName = 1,
        Rejected { reason: String } = 2,
    }
}

#[export_name = "uniffi_rivet_demo_checksum_fn_greet"]
pub extern "C" fn checksum_fn_greet() -> u16 {
    GREET_CHECKSUM
}

/// `String` in, `"hello, <name>"` out.
#[export_name = "rivet_demo_fn_greet"]
pub extern "C" fn fn_greet(name: RustBuffer, status: *mut CallStatus) -> RustBuffer {
    rust_call_with_error(status, || {
        let bytes = unsafe { buffer_into_vec(name) };
        let name: String = match decode(&bytes) {
            Ok(name) => name,
            Err(err) => panic!("malformed name: {err}"),
        };
        if name.is_empty() {
            return Err(GreetError::EmptyName);
        }
        match encode(&format!("hello, {name}")) {
            Ok(bytes) => Ok(buffer_from_vec(bytes)),
            Err(err) => panic!("failed to encode greeting: {err}"),
        }
    })
}

/// Pending on its first poll, then ready with the sum.
struct YieldOnce {
    yielded: bool,
    sum: u64,
}

impl Future for YieldOnce {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TaskResult> {
        if self.yielded {
            return Poll::Ready(Ok(TaskValue::U64(self.sum)));
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[export_name = "rivet_demo_fn_add_async"]
pub extern "C" fn fn_add_async(a: u64, b: u64, status: *mut CallStatus) -> u64 {
    rust_call(status, || {
        spawn(YieldOnce {
            yielded: false,
            sum: a.wrapping_add(b),
        })
    })
}

#[export_name = "rivet_demo_callback_init_greeter"]
pub extern "C" fn callback_init_greeter(dispatch: CallbackDispatchFn, status: *mut CallStatus) {
    rust_call(status, || init_callback_contract(GREETER_CONTRACT, dispatch))
}

/// Ask the host greeter `greeter` (method 1) to greet `name`, returning its
/// encoded reply. Takes ownership of the handle.
#[export_name = "rivet_demo_fn_greet_via"]
pub extern "C" fn fn_greet_via(
    greeter: u64,
    name: RustBuffer,
    status: *mut CallStatus,
) -> RustBuffer {
    rust_call_with_error(status, || {
        let args = unsafe { buffer_into_vec(name) };
        let Some(greeter) = ForeignCallback::for_contract(GREETER_CONTRACT, greeter) else {
            panic!("greeter contract was never initialized");
        };
        match greeter.invoke(1, &args) {
            Ok(bytes) => Ok(buffer_from_vec(bytes)),
            Err(ForeignCallbackError::Error(bytes)) => match decode::<GreetError>(&bytes) {
                Ok(error) => Err(error),
                Err(err) => panic!("undecodable greeter error: {err}"),
            },
            Err(other) => panic!("greeter failed: {other}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greet_in_process() {
        let mut status = CallStatus::new();
        let name = buffer_from_vec(encode(&"rivet".to_string()).unwrap());
        let greeting = fn_greet(name, &mut status);
        assert_eq!(status.code, 0);

        let bytes = unsafe { buffer_into_vec(greeting) };
        assert_eq!(decode::<String>(&bytes).unwrap(), "hello, rivet");
    }

    #[test]
    fn test_empty_name_is_domain_error() {
        let mut status = CallStatus::new();
        let name = buffer_from_vec(encode(&String::new()).unwrap());
        fn_greet(name, &mut status);
        assert_eq!(status.code, 1);

        let error = unsafe { buffer_into_vec(status.error_buf) };
        assert_eq!(decode::<GreetError>(&error).unwrap(), GreetError::EmptyName);
    }
}

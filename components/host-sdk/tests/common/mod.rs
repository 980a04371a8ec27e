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

//! An in-process core for the integration tests, built on `rivet-core-sdk`.
//!
//! Runtime entry points are registered under [`PREFIX`]; the operations
//! below stand in for what a generated core would export.

#![allow(dead_code)]

use std::ffi::c_void;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use rivet_core_sdk::primitives::wire::{decode, encode};
use rivet_core_sdk::primitives::{wire_enum, wire_record, CallbackDispatchFn};
use rivet_core_sdk::{
    buffer_from_vec, buffer_into_vec, init_callback_contract, rust_call, rust_call_with_error,
    runtime_symbols, spawn, spawn_lowered, CallStatus, ForeignCallback, ForeignCallbackError,
    RustBuffer, TaskResult, TaskValue,
};
use rivet_host_sdk::{ContractSpec, Fault, Runtime, SymbolTable};

pub const PREFIX: &str = "rivet_test_";
pub const LOOKUP_CHECKSUM_SYMBOL: &str = "uniffi_rivet_test_checksum_fn_room_lookup";
pub const LOOKUP_CHECKSUM: u16 = 4242;
pub const LISTENER_CONTRACT: &str = "listener";

wire_record! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Filter {
        pub limit: u32,
        pub kinds: Vec<String>,
    }
}

wire_record! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LookupArgs {
        pub room: String,
        pub since: Option<i64>,
        pub filter: Filter,
    }
}

wire_record! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RoomInfo {
        pub name: String,
        pub members: u32,
    }
}

wire_enum! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RoomError {
        Unauthorized = 1,
        NotFound { message: String } = 2,
        Invalid { field: String, reason: String } = 3,
    }
}

// ============================================================================
// Synchronous operations
// ============================================================================

/// `LookupArgs` in, `RoomInfo` out; only the "lobby" room exists.
pub type LookupFn = unsafe extern "C" fn(RustBuffer, *mut CallStatus) -> RustBuffer;

extern "C" fn fn_room_lookup(args: RustBuffer, status: *mut CallStatus) -> RustBuffer {
    rust_call_with_error(status, || {
        let bytes = unsafe { buffer_into_vec(args) };
        let args: LookupArgs = match decode(&bytes) {
            Ok(args) => args,
            Err(err) => panic!("malformed lookup arguments: {err}"),
        };
        if args.room != "lobby" {
            return Err(RoomError::NotFound {
                message: "not found".to_string(),
            });
        }
        let info = RoomInfo {
            name: args.room,
            members: args.filter.limit,
        };
        match encode(&info) {
            Ok(bytes) => Ok(buffer_from_vec(bytes)),
            Err(err) => panic!("failed to encode room: {err}"),
        }
    })
}

pub type StatusOnlyFn = unsafe extern "C" fn(*mut CallStatus) -> u32;

extern "C" fn fn_explode(status: *mut CallStatus) -> u32 {
    rust_call(status, || -> u32 { panic!("room index corrupted") })
}

/// Reports a fault without a message, as a core does when reporting the
/// first fault failed.
extern "C" fn fn_double_fault(status: *mut CallStatus) -> u32 {
    unsafe {
        (*status).code = 2;
        (*status).error_buf = RustBuffer::empty();
    }
    0
}

extern "C" fn fn_bogus_status(status: *mut CallStatus) -> u32 {
    unsafe { (*status).code = 9 };
    0
}

/// Reports a domain error whose discriminant no `RoomError` variant has.
extern "C" fn fn_corrupted_error(status: *mut CallStatus) -> u32 {
    unsafe {
        (*status).code = 1;
        (*status).error_buf = buffer_from_vec(vec![0, 0, 0, 9]);
    }
    0
}

/// A `RoomInfo` followed by bytes no reader expects.
extern "C" fn fn_trailing_bytes(status: *mut CallStatus) -> RustBuffer {
    rust_call(status, || {
        let mut bytes = encode(&RoomInfo {
            name: "lobby".to_string(),
            members: 1,
        })
        .unwrap_or_default();
        bytes.push(0xff);
        buffer_from_vec(bytes)
    })
}

pub type BufferOnlyFn = unsafe extern "C" fn(*mut CallStatus) -> RustBuffer;

extern "C" fn checksum_fn_room_lookup() -> u16 {
    LOOKUP_CHECKSUM
}

// ============================================================================
// Callbacks
// ============================================================================

extern "C" fn callback_init_listener(dispatch: CallbackDispatchFn, status: *mut CallStatus) {
    rust_call(status, || init_callback_contract(LISTENER_CONTRACT, dispatch))
}

/// Takes ownership of `listener`, invokes `method` with `args` once, then
/// releases the handle.
pub type NotifyFn = unsafe extern "C" fn(u64, u32, RustBuffer, *mut CallStatus) -> RustBuffer;

extern "C" fn fn_notify(
    listener: u64,
    method: u32,
    args: RustBuffer,
    status: *mut CallStatus,
) -> RustBuffer {
    rust_call_with_error(status, || {
        let args = unsafe { buffer_into_vec(args) };
        let Some(listener) = ForeignCallback::for_contract(LISTENER_CONTRACT, listener) else {
            panic!("listener contract was never initialized");
        };
        match listener.invoke(method, &args) {
            Ok(bytes) => Ok(buffer_from_vec(bytes)),
            Err(ForeignCallbackError::Error(bytes)) => match decode::<RoomError>(&bytes) {
                Ok(error) => Err(error),
                Err(err) => panic!("undecodable listener error: {err}"),
            },
            Err(other) => panic!("listener failed: {other}"),
        }
    })
}

// ============================================================================
// Async operations
// ============================================================================

pub type StartFn = unsafe extern "C" fn(u64, *mut CallStatus) -> u64;

/// Completes on its first poll with `value`.
extern "C" fn fn_ready_value(value: u64, status: *mut CallStatus) -> u64 {
    rust_call(status, || spawn(async move { TaskResult::Ok(TaskValue::U64(value)) }))
}

/// Pending `remaining` times, waking itself during each poll.
struct Countdown {
    remaining: u64,
    total: u64,
}

impl Future for Countdown {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TaskResult> {
        if self.remaining == 0 {
            return Poll::Ready(Ok(TaskValue::U64(self.total)));
        }
        self.remaining -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

extern "C" fn fn_countdown(polls: u64, status: *mut CallStatus) -> u64 {
    rust_call(status, || {
        spawn(Countdown {
            remaining: polls,
            total: polls,
        })
    })
}

/// Pending until a separate thread wakes it after `millis`.
struct Delayed {
    millis: u64,
    started: bool,
    done: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Future for Delayed {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TaskResult> {
        use std::sync::atomic::Ordering;

        if self.done.load(Ordering::Acquire) {
            return Poll::Ready(Ok(TaskValue::Void));
        }
        if !self.started {
            self.started = true;
            let waker = cx.waker().clone();
            let done = self.done.clone();
            let millis = self.millis;
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(millis));
                done.store(true, Ordering::Release);
                waker.wake();
            });
        }
        Poll::Pending
    }
}

extern "C" fn fn_delayed(millis: u64, status: *mut CallStatus) -> u64 {
    rust_call(status, || {
        spawn(Delayed {
            millis,
            started: false,
            done: Default::default(),
        })
    })
}

/// Never completes on its own.
extern "C" fn fn_stalled(_unused: u64, status: *mut CallStatus) -> u64 {
    rust_call(status, || spawn(std::future::pending::<TaskResult>()))
}

/// Resolves to the room name, or `NotFound` for anything but "lobby".
extern "C" fn fn_room_name_async(room_id: u64, status: *mut CallStatus) -> u64 {
    rust_call(status, || {
        spawn_lowered(async move {
            if room_id == 1 {
                Ok("lobby".to_string())
            } else {
                Err(RoomError::NotFound {
                    message: "not found".to_string(),
                })
            }
        })
    })
}

// ============================================================================
// Runtime construction
// ============================================================================

/// Every symbol the test core exports.
pub fn symbol_table() -> SymbolTable {
    let mut table = SymbolTable::new();
    table.extend_prefixed(PREFIX, runtime_symbols());

    let operations: [(&str, *const c_void); 14] = [
        ("fn_room_lookup", fn_room_lookup as *const c_void),
        ("fn_explode", fn_explode as *const c_void),
        ("fn_double_fault", fn_double_fault as *const c_void),
        ("fn_bogus_status", fn_bogus_status as *const c_void),
        ("fn_corrupted_error", fn_corrupted_error as *const c_void),
        ("fn_trailing_bytes", fn_trailing_bytes as *const c_void),
        ("callback_init_listener", callback_init_listener as *const c_void),
        ("fn_notify", fn_notify as *const c_void),
        ("fn_ready_value", fn_ready_value as *const c_void),
        ("fn_countdown", fn_countdown as *const c_void),
        ("fn_delayed", fn_delayed as *const c_void),
        ("fn_stalled", fn_stalled as *const c_void),
        ("fn_room_name_async", fn_room_name_async as *const c_void),
        (LOOKUP_CHECKSUM_SYMBOL, checksum_fn_room_lookup as *const c_void),
    ];
    for (name, address) in operations {
        if name.starts_with("uniffi_") {
            table.insert(name, address);
        } else {
            table.insert(format!("{PREFIX}{name}"), address);
        }
    }
    table
}

pub fn contract() -> ContractSpec {
    ContractSpec::new(rivet_core_sdk::primitives::CONTRACT_VERSION)
        .with_checksum(LOOKUP_CHECKSUM_SYMBOL, LOOKUP_CHECKSUM)
}

pub fn try_runtime(table: SymbolTable, contract: &ContractSpec) -> Result<Runtime, Fault> {
    Runtime::new(Box::new(table), PREFIX, contract)
}

pub fn runtime() -> Runtime {
    try_runtime(symbol_table(), &contract()).unwrap()
}

/// Resolve a test operation by its unprefixed name.
///
/// # Safety
/// `F` must match the operation's signature.
pub unsafe fn operation<F: Copy>(runtime: &Runtime, name: &str) -> F {
    runtime.symbol(&format!("{PREFIX}{name}")).unwrap()
}

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

//! Callback dispatch: host objects the core calls into.
//!
//! Each callback interface is a [`CallbackContract`]. The host registers a
//! contract once per process with [`register_callback_contract`], which
//! installs [`dispatch_callback`] in the core. Instances are passed to the
//! core as handles from the contract's [`HandleTable`].
//!
//! Method 0 is reserved: the core is done with the handle and the table
//! drops its reference.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};

use rivet_ffi_primitives::wire::{encode, DecodeError, EncodeError, WireFormat, WireReader, WireWriter};
use rivet_ffi_primitives::{
    panic_message, CallbackInitFn, CallbackResultCode, RustBuffer, CALLBACK_METHOD_FREE,
};

use crate::buffer::CoreBuffer;
use crate::call::rust_call;
use crate::error::Fault;
use crate::handle_table::HandleTable;
use crate::runtime::Runtime;

/// A callback interface the core can invoke.
///
/// # Example
///
/// ```ignore
/// struct RoomListenerContract;
///
/// impl CallbackContract for RoomListenerContract {
///     type Target = dyn RoomListener;
///     const NAME: &'static str = "room_listener";
///
///     fn slot() -> &'static CallbackSlot<dyn RoomListener> {
///         static SLOT: CallbackSlot<dyn RoomListener> = CallbackSlot::new();
///         &SLOT
///     }
///
///     fn invoke(
///         target: &dyn RoomListener,
///         method: u32,
///         args: &mut WireReader<'_>,
///         out: &mut WireWriter,
///     ) -> Result<(), CallbackFailure> {
///         match method {
///             1 => out.write(&target.on_update(args.read()?)),
///             _ => Err(CallbackFailure::unknown_method::<Self>(method)),
///         }
///     }
/// }
/// ```
pub trait CallbackContract: 'static {
    type Target: ?Sized + Send + Sync + 'static;

    /// Contract name; the core exports `<prefix>callback_init_<NAME>`.
    const NAME: &'static str;

    /// Process-wide state for this contract.
    fn slot() -> &'static CallbackSlot<Self::Target>;

    /// Decode `args`, call `method` on `target`, and encode the result into
    /// `out`. Any bytes left in `args` afterwards are a protocol violation.
    fn invoke(
        target: &Self::Target,
        method: u32,
        args: &mut WireReader<'_>,
        out: &mut WireWriter,
    ) -> Result<(), CallbackFailure>;
}

/// Per-contract process-wide state: the handle table and the runtime whose
/// allocator result buffers come from.
pub struct CallbackSlot<T: ?Sized> {
    table: OnceLock<HandleTable<T>>,
    runtime: OnceLock<Runtime>,
    /// Serializes registration of this contract only.
    registration: Mutex<()>,
}

impl<T: ?Sized> CallbackSlot<T> {
    pub const fn new() -> Self {
        Self {
            table: OnceLock::new(),
            runtime: OnceLock::new(),
            registration: Mutex::new(()),
        }
    }

    pub fn table(&self) -> &HandleTable<T> {
        self.table.get_or_init(HandleTable::new)
    }

    pub fn is_registered(&self) -> bool {
        self.runtime.get().is_some()
    }
}

impl<T: ?Sized> Default for CallbackSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// How a callback method failed.
#[derive(Debug)]
pub enum CallbackFailure {
    /// Wire-encoded domain error, reported with the `error` code.
    Error(Vec<u8>),
    /// Reported with the `unexpected_error` code.
    Unexpected(String),
    Cancelled,
    /// The core sent something the contract does not allow. Logged and
    /// reported as `unexpected_error`.
    Protocol(Fault),
}

impl CallbackFailure {
    pub fn error<E: WireFormat>(error: &E) -> Self {
        match encode(error) {
            Ok(bytes) => CallbackFailure::Error(bytes),
            Err(err) => CallbackFailure::Protocol(Fault::Encode(err)),
        }
    }

    pub fn unknown_method<C: CallbackContract>(method: u32) -> Self {
        CallbackFailure::Protocol(Fault::UnknownCallbackMethod {
            contract: C::NAME,
            method,
        })
    }
}

impl From<Fault> for CallbackFailure {
    fn from(fault: Fault) -> Self {
        CallbackFailure::Protocol(fault)
    }
}

impl From<DecodeError> for CallbackFailure {
    fn from(err: DecodeError) -> Self {
        CallbackFailure::Protocol(Fault::Decode(err))
    }
}

impl From<EncodeError> for CallbackFailure {
    fn from(err: EncodeError) -> Self {
        CallbackFailure::Protocol(Fault::Encode(err))
    }
}

/// Install the dispatch function for `C` in the core. Later calls are no-ops.
///
/// Only registrations of the same contract wait on each other.
pub fn register_callback_contract<C: CallbackContract>(runtime: &Runtime) -> Result<(), Fault> {
    let slot = C::slot();
    let _registration = slot
        .registration
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(existing) = slot.runtime.get() {
        if !existing.same_core(runtime) {
            log::warn!(
                "Callback contract '{}' is already registered with another core",
                C::NAME
            );
        }
        return Ok(());
    }

    let symbol = format!("{}callback_init_{}", runtime.prefix(), C::NAME);
    // SAFETY: `callback_init_<contract>` entry points take a dispatch function.
    let init: CallbackInitFn = unsafe { runtime.symbol(&symbol)? };
    rust_call(runtime, |status| unsafe { init(dispatch_callback::<C>, status) })?;

    let _ = slot.runtime.set(runtime.clone());
    log::debug!("Registered callback contract '{}'", C::NAME);
    Ok(())
}

/// Hand `instance` to the core, returning its handle.
pub fn lower_callback<C: CallbackContract>(instance: Arc<C::Target>) -> u64 {
    C::slot().table().insert(instance)
}

/// The dispatch entry point installed for contract `C`.
pub extern "C" fn dispatch_callback<C: CallbackContract>(
    handle: u64,
    method: u32,
    args_data: *const u8,
    args_len: i32,
    out: *mut RustBuffer,
) -> i32 {
    if method == CALLBACK_METHOD_FREE {
        if C::slot().table().remove(handle).is_none() {
            log::debug!("Callback handle {handle} of '{}' already released", C::NAME);
        }
        return CallbackResultCode::Success.as_raw();
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        invoke::<C>(handle, method, args_data, args_len)
    }));
    let (code, payload) = match outcome {
        Ok(Ok(bytes)) => (CallbackResultCode::Success, bytes),
        Ok(Err(CallbackFailure::Error(bytes))) => (CallbackResultCode::Error, bytes),
        Ok(Err(CallbackFailure::Unexpected(message))) => {
            (CallbackResultCode::UnexpectedError, message.into_bytes())
        }
        Ok(Err(CallbackFailure::Cancelled)) => (CallbackResultCode::Cancelled, Vec::new()),
        Ok(Err(CallbackFailure::Protocol(fault))) => {
            log::error!(
                "Protocol violation dispatching '{}' method {method} on handle {handle}: {fault}",
                C::NAME
            );
            (CallbackResultCode::UnexpectedError, fault.to_string().into_bytes())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!(
                "Callback '{}' method {method} panicked: {message}",
                C::NAME
            );
            (CallbackResultCode::UnexpectedError, message.into_bytes())
        }
    };

    match write_out::<C>(out, &payload) {
        Ok(()) => code.as_raw(),
        Err(fault) => {
            log::error!("Failed to return result of '{}' method {method}: {fault}", C::NAME);
            CallbackResultCode::UnexpectedError.as_raw()
        }
    }
}

fn invoke<C: CallbackContract>(
    handle: u64,
    method: u32,
    args_data: *const u8,
    args_len: i32,
) -> Result<Vec<u8>, CallbackFailure> {
    let target = C::slot().table().get(handle)?;
    let args: &[u8] = match usize::try_from(args_len) {
        Err(_) => return Err(DecodeError::NegativeLength(args_len).into()),
        Ok(0) => &[],
        Ok(_) if args_data.is_null() => {
            return Err(DecodeError::UnexpectedEof {
                needed: args_len as usize,
                remaining: 0,
            }
            .into())
        }
        // SAFETY: the core lends `args_len` bytes for the duration of the call.
        Ok(len) => unsafe { std::slice::from_raw_parts(args_data, len) },
    };

    let mut reader = WireReader::new(args);
    let mut writer = WireWriter::new();
    C::invoke(&target, method, &mut reader, &mut writer)?;
    reader.finish()?;
    Ok(writer.into_bytes())
}

fn write_out<C: CallbackContract>(out: *mut RustBuffer, payload: &[u8]) -> Result<(), Fault> {
    let Some(out) = (unsafe { out.as_mut() }) else {
        log::error!("Core dispatched '{}' without an out buffer", C::NAME);
        return Ok(());
    };
    if payload.is_empty() {
        *out = RustBuffer::empty();
        return Ok(());
    }
    let runtime = C::slot()
        .runtime
        .get()
        .ok_or(Fault::CallbackNotRegistered(C::NAME))?;
    *out = CoreBuffer::from_bytes(runtime, payload)?.into_raw();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Counter: Send + Sync {
        fn add(&self, amount: u32) -> Result<u32, String>;
    }

    struct Fixed(u32);

    impl Counter for Fixed {
        fn add(&self, amount: u32) -> Result<u32, String> {
            match amount {
                0 => Err("zero".to_string()),
                13 => panic!("unlucky"),
                n => Ok(self.0 + n),
            }
        }
    }

    struct CounterContract;

    impl CallbackContract for CounterContract {
        type Target = dyn Counter;
        const NAME: &'static str = "counter";

        fn slot() -> &'static CallbackSlot<dyn Counter> {
            static SLOT: CallbackSlot<dyn Counter> = CallbackSlot::new();
            &SLOT
        }

        fn invoke(
            target: &dyn Counter,
            method: u32,
            args: &mut WireReader<'_>,
            out: &mut WireWriter,
        ) -> Result<(), CallbackFailure> {
            match method {
                1 => match target.add(args.get_u32()?) {
                    Ok(total) => {
                        out.put_u32(total);
                        Ok(())
                    }
                    Err(message) => Err(CallbackFailure::error(&message)),
                },
                _ => Err(CallbackFailure::unknown_method::<Self>(method)),
            }
        }
    }

    fn dispatch(handle: u64, method: u32, args: &[u8]) -> i32 {
        let mut out = RustBuffer::empty();
        dispatch_callback::<CounterContract>(
            handle,
            method,
            args.as_ptr(),
            args.len() as i32,
            &mut out,
        )
    }

    // Without a registered runtime only empty results can be written back, so
    // these cases exercise the result codes; payload round trips are covered
    // by the integration tests.
    #[test]
    fn test_dispatch_codes_without_payloads() {
        let handle = lower_callback::<CounterContract>(Arc::new(Fixed(1)));

        assert_eq!(
            dispatch(handle, 1, &[0, 0, 0, 13]),
            CallbackResultCode::UnexpectedError.as_raw()
        );
        assert_eq!(
            dispatch(handle, 7, &[]),
            CallbackResultCode::UnexpectedError.as_raw()
        );
        assert_eq!(
            dispatch(handle + 1000, 1, &[0, 0, 0, 1]),
            CallbackResultCode::UnexpectedError.as_raw()
        );

        assert_eq!(dispatch(handle, CALLBACK_METHOD_FREE, &[]), 0);
        assert!(!CounterContract::slot().table().contains(handle));
        assert_eq!(dispatch(handle, CALLBACK_METHOD_FREE, &[]), 0);
    }

    #[test]
    fn test_trailing_arguments_are_rejected() {
        let handle = lower_callback::<CounterContract>(Arc::new(Fixed(2)));
        let mut out = RustBuffer::empty();
        let args = [0u8, 0, 0, 1, 0xff];
        let code = dispatch_callback::<CounterContract>(
            handle,
            1,
            args.as_ptr(),
            args.len() as i32,
            &mut out,
        );
        assert_eq!(code, CallbackResultCode::UnexpectedError.as_raw());
        assert!(out.is_null());
    }
}

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

//! Core-side proxies for objects implemented by the host.
//!
//! The host installs one dispatch function per callback contract through the
//! core's `callback_init_<contract>` entry point. A [`ForeignCallback`] pairs
//! that function with a host handle; dropping it releases the handle.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use rivet_ffi_primitives::{
    CallbackDispatchFn, CallbackResultCode, RustBuffer, CALLBACK_METHOD_FREE,
};
use thiserror::Error;

use crate::buffer::buffer_into_vec;

fn contracts() -> &'static Mutex<HashMap<String, CallbackDispatchFn>> {
    static CONTRACTS: OnceLock<Mutex<HashMap<String, CallbackDispatchFn>>> = OnceLock::new();
    CONTRACTS.get_or_init(Default::default)
}

/// Record the host's dispatch function for `contract`. Intended to be called
/// from the core's `callback_init_<contract>` entry point.
pub fn init_callback_contract(contract: &str, dispatch: CallbackDispatchFn) {
    let mut contracts = contracts()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if contracts.insert(contract.to_string(), dispatch).is_some() {
        log::warn!("Callback contract '{contract}' was initialized more than once");
    } else {
        log::debug!("Callback contract '{contract}' initialized");
    }
}

/// The dispatch function installed for `contract`, if any.
pub fn contract_dispatch(contract: &str) -> Option<CallbackDispatchFn> {
    contracts()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(contract)
        .copied()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForeignCallbackError {
    /// The host returned a wire-encoded domain error.
    #[error("callback returned a domain error ({} bytes)", .0.len())]
    Error(Vec<u8>),

    #[error("callback failed unexpectedly: {0}")]
    Unexpected(String),

    #[error("callback was cancelled")]
    Cancelled,

    #[error("callback returned unknown result code {0}")]
    UnknownCode(i32),

    #[error("method index {0} is reserved")]
    ReservedMethod(u32),

    #[error("callback arguments are too large ({0} bytes)")]
    ArgumentsTooLarge(usize),
}

/// A host-implemented object, addressed by its handle.
#[derive(Debug)]
pub struct ForeignCallback {
    dispatch: CallbackDispatchFn,
    handle: u64,
}

impl ForeignCallback {
    pub fn new(dispatch: CallbackDispatchFn, handle: u64) -> Self {
        Self { dispatch, handle }
    }

    /// Wrap `handle` using the dispatch function registered for `contract`.
    pub fn for_contract(contract: &str, handle: u64) -> Option<Self> {
        contract_dispatch(contract).map(|dispatch| Self::new(dispatch, handle))
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Invoke `method` with wire-encoded `args`; returns the host's
    /// wire-encoded result.
    pub fn invoke(&self, method: u32, args: &[u8]) -> Result<Vec<u8>, ForeignCallbackError> {
        if method == CALLBACK_METHOD_FREE {
            return Err(ForeignCallbackError::ReservedMethod(method));
        }
        let args_len = i32::try_from(args.len())
            .map_err(|_| ForeignCallbackError::ArgumentsTooLarge(args.len()))?;

        let mut out = RustBuffer::empty();
        let code = (self.dispatch)(self.handle, method, args.as_ptr(), args_len, &mut out);
        let payload = unsafe { buffer_into_vec(out) };

        match CallbackResultCode::from_raw(code) {
            Some(CallbackResultCode::Success) => Ok(payload),
            Some(CallbackResultCode::Error) => Err(ForeignCallbackError::Error(payload)),
            Some(CallbackResultCode::UnexpectedError) => Err(ForeignCallbackError::Unexpected(
                String::from_utf8_lossy(&payload).into_owned(),
            )),
            Some(CallbackResultCode::Cancelled) => Err(ForeignCallbackError::Cancelled),
            None => Err(ForeignCallbackError::UnknownCode(code)),
        }
    }
}

impl Drop for ForeignCallback {
    fn drop(&mut self) {
        let mut out = RustBuffer::empty();
        let code = (self.dispatch)(
            self.handle,
            CALLBACK_METHOD_FREE,
            std::ptr::null(),
            0,
            &mut out,
        );
        drop(unsafe { buffer_into_vec(out) });
        if code != CallbackResultCode::Success.as_raw() {
            log::warn!(
                "Releasing callback handle {} returned code {code}",
                self.handle
            );
        }
    }
}

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

//! Boundary call wrapper.
//!
//! Every call into the core goes through [`rust_call`] or
//! [`rust_call_with_error`]: a zeroed [`CallStatus`] is handed to the entry
//! point and interpreted afterwards. Error payloads are always freed through
//! the core, whichever way the status is classified.

use rivet_ffi_primitives::wire::WireFormat;
use rivet_ffi_primitives::{CallStatus, CallStatusCode};

use crate::buffer::CoreBuffer;
use crate::error::{CallError, Fault};
use crate::runtime::Runtime;

/// Call an entry point whose operation declares no error type.
pub fn rust_call<R, F>(runtime: &Runtime, call: F) -> Result<R, Fault>
where
    F: FnOnce(&mut CallStatus) -> R,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    check_infallible_status(runtime, status)?;
    Ok(value)
}

/// Call an entry point whose operation can fail with `E`.
pub fn rust_call_with_error<R, E, F>(runtime: &Runtime, call: F) -> Result<R, CallError<E>>
where
    E: WireFormat,
    F: FnOnce(&mut CallStatus) -> R,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    check_call_status(runtime, status)?;
    Ok(value)
}

/// Classify a status written by the core, taking ownership of its payload.
pub fn check_call_status<E: WireFormat>(
    runtime: &Runtime,
    status: CallStatus,
) -> Result<(), CallError<E>> {
    let CallStatus { code, error_buf } = status;
    // SAFETY: a status payload is a core-allocated buffer owned by the caller.
    let payload = unsafe { CoreBuffer::from_raw(runtime, error_buf) };

    match CallStatusCode::from_raw(code) {
        Some(CallStatusCode::Success) => Ok(()),
        Some(CallStatusCode::Error) => Err(CallError::Domain(payload.lift::<E>()?)),
        Some(CallStatusCode::UnexpectedError) => Err(panic_fault(payload).into()),
        Some(CallStatusCode::Cancelled) => Err(CallError::Cancelled),
        None => Err(Fault::UnknownStatus(code).into()),
    }
}

fn check_infallible_status(runtime: &Runtime, status: CallStatus) -> Result<(), Fault> {
    let CallStatus { code, error_buf } = status;
    // SAFETY: as in `check_call_status`.
    let payload = unsafe { CoreBuffer::from_raw(runtime, error_buf) };

    match CallStatusCode::from_raw(code) {
        Some(CallStatusCode::Success) => Ok(()),
        Some(CallStatusCode::Error) => Err(Fault::UnexpectedDomainError),
        Some(CallStatusCode::UnexpectedError) => Err(panic_fault(payload)),
        // Cancellation is only reported when completing an async task.
        Some(CallStatusCode::Cancelled) | None => Err(Fault::UnknownStatus(code)),
    }
}

fn panic_fault(payload: CoreBuffer) -> Fault {
    if payload.is_empty() {
        Fault::DoubleFault
    } else {
        Fault::NativePanic(payload.lift_string_lossy())
    }
}

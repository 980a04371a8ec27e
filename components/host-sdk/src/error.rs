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

//! Error types for boundary calls.
//!
//! - [`Fault`]: failures of the boundary itself: core panics, protocol
//!   violations, misuse of released objects, contract mismatches
//! - [`CallError`]: what a fallible core operation returns: its own domain
//!   error, a cancellation, or a [`Fault`]
//!
//! Loading and configuration use `anyhow::Result`, following the same split
//! as the rest of the workspace: structured errors at API boundaries, `anyhow`
//! for setup code.

use rivet_ffi_primitives::wire::{DecodeError, EncodeError};
use thiserror::Error;

/// A failure of the boundary rather than of the operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The core panicked; the message is the core's panic text.
    #[error("native core panicked: {0}")]
    NativePanic(String),

    /// The core panicked and could not even produce a message.
    #[error("native core panicked and no message was available")]
    DoubleFault,

    /// The core wrote a status code outside the known set.
    #[error("unknown call status code {0}")]
    UnknownStatus(i8),

    /// A domain error was reported by an operation declared infallible.
    #[error("domain error reported by an infallible operation")]
    UnexpectedDomainError,

    #[error("failed to decode buffer: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to encode value: {0}")]
    Encode(#[from] EncodeError),

    /// A callback handle with no registered instance.
    #[error("unknown callback handle {0}")]
    UnknownHandle(u64),

    #[error("callback contract '{contract}' has no method {method}")]
    UnknownCallbackMethod { contract: &'static str, method: u32 },

    /// A dispatch arrived for a contract that was never registered.
    #[error("callback contract '{0}' is not registered")]
    CallbackNotRegistered(&'static str),

    /// A borrow was attempted after the object was released.
    #[error("{0} object has already been destroyed")]
    ObjectDestroyed(&'static str),

    #[error("{0} object call counter overflowed")]
    CallCounterOverflow(&'static str),

    #[error("core library does not export '{0}'")]
    MissingSymbol(String),

    #[error("contract version mismatch: host expects {expected}, core reports {found}")]
    ContractVersionMismatch { expected: u32, found: u32 },

    #[error("checksum mismatch for '{symbol}': host expects {expected}, core reports {found}")]
    ChecksumMismatch {
        symbol: String,
        expected: u16,
        found: u16,
    },

    /// The host dropped a pending poll's wake channel without an answer.
    #[error("wake channel closed before the continuation fired")]
    WakeChannelClosed,
}

impl Fault {
    /// True when the fault means host and core disagree on the protocol.
    /// These are unrecoverable: the process should not keep using the core.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Fault::UnknownStatus(_)
                | Fault::UnexpectedDomainError
                | Fault::Decode(_)
                | Fault::UnknownHandle(_)
                | Fault::UnknownCallbackMethod { .. }
                | Fault::MissingSymbol(_)
                | Fault::ContractVersionMismatch { .. }
                | Fault::ChecksumMismatch { .. }
        )
    }
}

/// Outcome of a fallible core operation.
#[derive(Error, Debug)]
pub enum CallError<E> {
    /// The operation failed with its declared error type.
    #[error("{0}")]
    Domain(E),

    #[error("call was cancelled")]
    Cancelled,

    #[error(transparent)]
    Fault(#[from] Fault),
}

impl<E> CallError<E> {
    pub fn domain(self) -> Option<E> {
        match self {
            CallError::Domain(error) => Some(error),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            CallError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallError::Cancelled)
    }
}

pub type Result<T, E = Fault> = std::result::Result<T, E>;

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

//! Core-side runtime for libraries driven by a rivet host.
//!
//! A core library implements its operations as `extern "C"` functions that
//! wrap their bodies in [`call::rust_call`] or [`call::rust_call_with_error`],
//! spawns async operations with [`future::spawn`], and exports the runtime
//! entry points under its symbol prefix with [`export_runtime!`].
//!
//! # Modules
//!
//! - [`buffer`]: The allocator behind every [`RustBuffer`]
//! - [`call`]: Panic-catching scaffolding that fills in [`CallStatus`]
//! - [`future`]: Task store polled by the host
//! - [`callback`]: Proxies for host-implemented callback objects
//! - [`exports`]: The runtime entry points and their export macro

pub mod buffer;
pub mod call;
pub mod callback;
pub mod exports;
pub mod future;

pub use rivet_ffi_primitives::{self as primitives, CallStatus, ForeignBytes, RustBuffer};

pub use buffer::{buffer_from_vec, buffer_into_vec};
pub use call::{rust_call, rust_call_with_error, FfiDefault};
pub use callback::{init_callback_contract, ForeignCallback, ForeignCallbackError};
pub use exports::runtime_symbols;
pub use future::{is_live, spawn, spawn_lowered, TaskError, TaskResult, TaskValue};

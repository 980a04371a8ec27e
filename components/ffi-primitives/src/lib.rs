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

//! `rivet-ffi-primitives`: C ABI types, the runtime vtable and the wire codec.
//!
//! Both sides of a rivet boundary link this crate: the host SDK to call into a
//! native core, and the core SDK to implement the runtime entry points the host
//! expects.
//!
//! # Types
//!
//! - [`RustBuffer`] / [`ForeignBytes`]: Core-owned and host-lent byte regions
//! - [`CallStatus`] / [`CallStatusCode`]: Out-parameter of every boundary call
//! - [`ContinuationCallback`] / [`CallbackDispatchFn`]: Host functions the core calls back
//! - [`RuntimeVtable`]: The runtime entry points every core exports
//!
//! # Wire format
//!
//! - [`wire::WireWriter`] / [`wire::WireReader`]: Big-endian cursor encoding
//! - [`wire::WireFormat`]: Per-type encode/decode
//!
//! # Macros
//!
//! - [`core_vtable!`]: Generate a vtable of entry points resolved by symbol name
//! - [`wire_record!`]: Declare a struct with field-order wire encoding
//! - [`wire_enum!`]: Declare an enum with 1-based discriminant wire encoding

pub mod macros;
pub mod runtime;
pub mod types;
pub mod wire;

pub use runtime::RuntimeVtable;
pub use types::*;

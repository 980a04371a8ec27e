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

//! Host-side runtime for calling into a rivet core library.
//!
//! This crate provides:
//! - [`Runtime`]: load a core (or wrap an in-process one) and verify its contract
//! - [`rust_call`] / [`rust_call_with_error`]: the boundary call wrapper
//! - [`CoreBuffer`]: ownership of core-allocated buffers
//! - [`FfiObject`]: the lifetime governor for core objects
//! - [`HandleTable`] and [`CallbackContract`]: host objects the core calls back into
//! - [`call_async`]: drive core tasks from host futures

pub mod async_bridge;
pub mod buffer;
pub mod call;
pub mod callbacks;
pub mod config;
pub mod contract;
pub mod error;
pub mod handle_table;
pub mod object;
pub mod runtime;
pub mod symbols;

pub use async_bridge::{
    call_async, call_async_lift, call_blocking, poll_to_completion, Completion, PollReport,
};
pub use buffer::{lower, CoreBuffer};
pub use call::{check_call_status, rust_call, rust_call_with_error};
pub use callbacks::{
    dispatch_callback, lower_callback, register_callback_contract, CallbackContract,
    CallbackFailure, CallbackSlot,
};
pub use config::BridgeConfig;
pub use contract::ContractSpec;
pub use error::{CallError, Fault};
pub use handle_table::HandleTable;
pub use object::{FfiObject, ObjectGuard};
pub use runtime::Runtime;
pub use symbols::{SymbolSource, SymbolTable};

pub use rivet_ffi_primitives as primitives;

/// Initialize the global tracing subscriber with an env filter and fmt layer.
///
/// Also bridges the `log` crate into `tracing`, so the bridge's own `log`
/// records reach the subscriber. `default_level` is used when `RUST_LOG` is
/// not set. Returns `false` if a subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true),
        )
        .try_init()
        .is_ok();

    // Bridge log crate → tracing
    let _ = tracing_log::LogTracer::init();

    if installed {
        tracing::debug!("Tracing initialized (default level '{default_level}')");
    }
    installed
}

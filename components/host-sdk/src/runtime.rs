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

//! A loaded core library with its contract verified.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use libloading::Library;
use rivet_ffi_primitives::{CallbackInitFn, RuntimeVtable};

use crate::async_bridge;
use crate::config::BridgeConfig;
use crate::contract::{self, ContractSpec};
use crate::error::Fault;
use crate::symbols::SymbolSource;

/// Handle to a core library. Cheap to clone; the library stays loaded while
/// any clone, buffer or object from it is alive.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    prefix: String,
    vtable: RuntimeVtable,
    /// Keep the library loaded.
    symbols: Box<dyn SymbolSource>,
}

impl Runtime {
    /// Load the configured shared library and verify its contract.
    pub fn load(config: &BridgeConfig) -> anyhow::Result<Self> {
        config.validate()?;

        log::info!("Loading core library {}", config.library_path.display());
        // SAFETY: loading a library runs its initializers; the configured
        // library is trusted to be a rivet core.
        let library = unsafe { Library::new(&config.library_path) }.map_err(|e| {
            anyhow::anyhow!(
                "Failed to load core library {}: {}",
                config.library_path.display(),
                e
            )
        })?;

        let runtime = Self::new(Box::new(library), &config.symbol_prefix, &config.contract())
            .with_context(|| {
                format!(
                    "Core library {} failed contract verification",
                    config.library_path.display()
                )
            })?;

        for contract in &config.callback_contracts {
            let name = format!("{}callback_init_{}", runtime.prefix(), contract);
            // SAFETY: only the address is checked here.
            unsafe { runtime.symbol::<CallbackInitFn>(&name) }
                .with_context(|| format!("Callback contract '{contract}' is not exported"))?;
        }

        log::info!(
            "Loaded core library {} (contract version {})",
            config.library_path.display(),
            config.contract_version
        );
        Ok(runtime)
    }

    /// Resolve the runtime entry points under `prefix`, verify `contract`,
    /// and install the host's continuation.
    pub fn new(
        symbols: Box<dyn SymbolSource>,
        prefix: impl Into<String>,
        contract: &ContractSpec,
    ) -> Result<Self, Fault> {
        let prefix = prefix.into();
        // SAFETY: symbols under the runtime prefix follow the runtime vtable
        // signatures; the contract check below rejects mismatched cores.
        let vtable =
            unsafe { RuntimeVtable::resolve(|name| symbols.resolve(&format!("{prefix}{name}"))) }
                .map_err(|name| Fault::MissingSymbol(format!("{prefix}{name}")))?;

        let runtime = Self {
            inner: Arc::new(RuntimeInner {
                prefix,
                vtable,
                symbols,
            }),
        };

        contract::verify(&runtime, contract)?;
        async_bridge::install_continuation(&runtime)?;

        log::debug!("Core runtime ready (prefix '{}')", runtime.prefix());
        Ok(runtime)
    }

    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn vtable(&self) -> &RuntimeVtable {
        &self.inner.vtable
    }

    /// Resolve a per-operation entry point by its full symbol name.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the symbol's signature.
    pub unsafe fn symbol<F: Copy>(&self, name: &str) -> Result<F, Fault> {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*const c_void>()
        );
        let address = self
            .inner
            .symbols
            .resolve(name)
            .filter(|address| !address.is_null())
            .ok_or_else(|| Fault::MissingSymbol(name.to_string()))?;
        Ok(std::mem::transmute_copy::<*const c_void, F>(&address))
    }

    /// True when both handles refer to the same loaded core.
    pub fn same_core(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("prefix", &self.inner.prefix)
            .field("vtable", &self.inner.vtable)
            .finish()
    }
}

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

//! Where core entry points come from.

use std::collections::HashMap;
use std::ffi::c_void;

use libloading::Library;

/// Resolves a full symbol name to the address of a core entry point.
pub trait SymbolSource: Send + Sync {
    fn resolve(&self, name: &str) -> Option<*const c_void>;
}

impl SymbolSource for Library {
    fn resolve(&self, name: &str) -> Option<*const c_void> {
        // SAFETY: the symbol is only read as an address here; callers
        // transmute it to the signature the contract declares.
        unsafe {
            self.get::<*const c_void>(name.as_bytes())
                .ok()
                .map(|symbol| *symbol)
        }
    }
}

/// Symbols registered by hand, for cores linked into the host process.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, address: *const c_void) {
        self.symbols.insert(name.into(), address as usize);
    }

    /// Add every `(name, address)` pair with `prefix` prepended to the name.
    pub fn extend_prefixed<'a, I>(&mut self, prefix: &str, symbols: I)
    where
        I: IntoIterator<Item = (&'a str, *const c_void)>,
    {
        for (name, address) in symbols {
            self.insert(format!("{prefix}{name}"), address);
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for SymbolTable {
    fn resolve(&self, name: &str) -> Option<*const c_void> {
        self.symbols
            .get(name)
            .map(|address| *address as *const c_void)
    }
}

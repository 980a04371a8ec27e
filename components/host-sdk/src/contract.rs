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

//! Contract verification performed before a [`Runtime`] is handed out.

use std::collections::BTreeMap;

use rivet_ffi_primitives::ChecksumFn;

use crate::call::rust_call;
use crate::error::Fault;
use crate::runtime::Runtime;

/// What the host was generated against: the runtime contract version and
/// the checksum of every operation it will call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractSpec {
    pub version: u32,
    /// Full checksum symbol name to expected value.
    pub checksums: BTreeMap<String, u16>,
}

impl ContractSpec {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            checksums: BTreeMap::new(),
        }
    }

    pub fn with_checksum(mut self, symbol: impl Into<String>, checksum: u16) -> Self {
        self.checksums.insert(symbol.into(), checksum);
        self
    }
}

pub(crate) fn verify(runtime: &Runtime, contract: &ContractSpec) -> Result<(), Fault> {
    let vtable = runtime.vtable();
    let found = rust_call(runtime, |status| unsafe { (vtable.contract_version)(status) })?;
    if found != contract.version {
        return Err(Fault::ContractVersionMismatch {
            expected: contract.version,
            found,
        });
    }

    for (symbol, expected) in &contract.checksums {
        let checksum: ChecksumFn = unsafe { runtime.symbol(symbol)? };
        let found = rust_call(runtime, |_| unsafe { checksum() })?;
        if found != *expected {
            return Err(Fault::ChecksumMismatch {
                symbol: symbol.clone(),
                expected: *expected,
                found,
            });
        }
    }

    log::debug!(
        "Verified contract version {} with {} checksums",
        contract.version,
        contract.checksums.len()
    );
    Ok(())
}

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

//! Bridge configuration: which core library to load and which contract it
//! must honor.
//!
//! ```yaml
//! library_path: ./target/release/libmatrix_core.so
//! symbol_prefix: ffi_matrix_core_
//! contract_version: 1
//! checksums:
//!   uniffi_matrix_core_checksum_method_room_send: 37241
//! callback_contracts:
//!   - room_listener
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::contract::ContractSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Shared library implementing the core.
    pub library_path: PathBuf,

    /// Prefix of the runtime entry point symbols.
    pub symbol_prefix: String,

    pub contract_version: u32,

    /// Full symbol name of each checksum function, with its expected value.
    #[serde(default)]
    pub checksums: BTreeMap<String, u16>,

    /// Callback contracts the host will register. Each one's
    /// `<prefix>callback_init_<name>` symbol must exist at load time.
    #[serde(default)]
    pub callback_contracts: Vec<String>,
}

impl BridgeConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path_ref.display(), e)
        })?;

        // Try YAML first, then JSON
        match serde_yaml::from_str::<BridgeConfig>(&content) {
            Ok(config) => Ok(config),
            Err(yaml_err) => match serde_json::from_str::<BridgeConfig>(&content) {
                Ok(config) => Ok(config),
                Err(json_err) => Err(anyhow::anyhow!(
                    "Failed to parse config file '{}':\n  YAML error: {}\n  JSON error: {}",
                    path_ref.display(),
                    yaml_err,
                    json_err
                )),
            },
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol_prefix.is_empty() {
            anyhow::bail!("symbol_prefix must not be empty");
        }
        if self.library_path.as_os_str().is_empty() {
            anyhow::bail!("library_path must not be empty");
        }
        if let Some(symbol) = self.checksums.keys().find(|s| s.trim().is_empty()) {
            anyhow::bail!("Invalid checksum symbol name: '{symbol}'");
        }

        let mut contracts = std::collections::HashSet::new();
        for contract in &self.callback_contracts {
            if contract.is_empty() {
                anyhow::bail!("Callback contract names must not be empty");
            }
            if !contracts.insert(contract) {
                anyhow::bail!("Duplicate callback contract: '{contract}'");
            }
        }
        Ok(())
    }

    /// The contract the loaded core is checked against.
    pub fn contract(&self) -> ContractSpec {
        ContractSpec {
            version: self.contract_version,
            checksums: self.checksums.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample() -> BridgeConfig {
        BridgeConfig {
            library_path: PathBuf::from("/opt/rivet/libdemo.so"),
            symbol_prefix: "ffi_demo_".to_string(),
            contract_version: 1,
            checksums: BTreeMap::from([("uniffi_demo_checksum_method_ping".to_string(), 4242)]),
            callback_contracts: vec!["listener".to_string()],
        }
    }

    #[test]
    fn test_load_yaml_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
library_path: /opt/rivet/libdemo.so
symbol_prefix: ffi_demo_
contract_version: 1
checksums:
  uniffi_demo_checksum_method_ping: 4242
callback_contracts:
  - listener
"#
        )
        .unwrap();

        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config, sample());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_json_config_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"library_path": "/opt/rivet/libdemo.so", "symbol_prefix": "ffi_demo_", "contract_version": 3}}"#
        )
        .unwrap();

        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.contract_version, 3);
        assert!(config.checksums.is_empty());
        assert!(config.callback_contracts.is_empty());
    }

    #[test]
    fn test_unparseable_config_reports_both_formats() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "symbol_prefix: [unterminated").unwrap();

        let err = BridgeConfig::load_from_file(file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("YAML error"));
        assert!(message.contains("JSON error"));
    }

    #[test]
    fn test_save_and_reload() {
        let file = NamedTempFile::new().unwrap();
        sample().save_to_file(file.path()).unwrap();
        assert_eq!(BridgeConfig::load_from_file(file.path()).unwrap(), sample());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = sample();
        config.symbol_prefix.clear();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.callback_contracts.push("listener".to_string());
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Duplicate callback contract"));

        let mut config = sample();
        config.checksums.insert(" ".to_string(), 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_contract_from_config() {
        let contract = sample().contract();
        assert_eq!(contract.version, 1);
        assert_eq!(contract.checksums.len(), 1);
    }
}

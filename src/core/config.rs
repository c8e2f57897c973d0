// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
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

//! Emulator configuration
//!
//! Settings load from a TOML file and can be overridden by `DCRX_*`
//! environment variables (the CLI loads `.env` via dotenvy before parsing).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{EmulatorError, Result};

/// Default nanoseconds per scheduler time slice (1 ms)
pub const DEFAULT_TIMESLICE_LENGTH: u32 = 1_000_000;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the boot ROM image (2 MiB)
    pub bios_path: Option<String>,
    /// Path to the flash image (128 KiB)
    pub flash_path: Option<String>,
    /// Allow dcload guests to open/close local files and exit the process
    pub allow_unsafe: bool,
    /// Scheduler time slice in nanoseconds
    pub timeslice_ns: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bios_path: None,
            flash_path: None,
            allow_unsafe: false,
            timeslice_ns: DEFAULT_TIMESLICE_LENGTH,
        }
    }
}

impl Config {
    /// Load a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Ok(Self::default()),
        };
        let config: Config =
            toml::from_str(&text).map_err(|e| EmulatorError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Apply `DCRX_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("DCRX_BIOS") {
            self.bios_path = Some(path);
        }
        if let Ok(path) = std::env::var("DCRX_FLASH") {
            self.flash_path = Some(path);
        }
        if let Ok(value) = std::env::var("DCRX_ALLOW_UNSAFE") {
            self.allow_unsafe = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Ok(value) = std::env::var("DCRX_TIMESLICE_NS") {
            if let Ok(ns) = value.parse() {
                self.timeslice_ns = ns;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.bios_path.is_none());
        assert!(!config.allow_unsafe);
        assert_eq!(config.timeslice_ns, DEFAULT_TIMESLICE_LENGTH);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            bios_path = "dc_boot.bin"
            allow_unsafe = true
            timeslice_ns = 500000
            "#,
        )
        .unwrap();
        assert_eq!(config.bios_path.as_deref(), Some("dc_boot.bin"));
        assert!(config.allow_unsafe);
        assert_eq!(config.timeslice_ns, 500_000);
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/dcrx.toml")).unwrap();
        assert_eq!(config.timeslice_ns, DEFAULT_TIMESLICE_LENGTH);
    }
}

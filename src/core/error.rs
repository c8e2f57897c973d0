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

//! Crate-wide error type
//!
//! The core distinguishes two classes of failure. Locally-recoverable
//! conditions (unmapped addresses, misaligned MMIO accesses, malformed tile
//! lists, scene buffer exhaustion) are logged at the point of occurrence and
//! execution continues; they only appear here so call sites that *want* to
//! surface them have a typed value to return. Fatal conditions (unsupported
//! guest opcodes, corrupt save states) propagate as `Err` and stop the run
//! loop.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// All error conditions the emulation core can report
#[derive(Error, Debug)]
pub enum EmulatorError {
    /// Address resolves to no registered memory region or MMIO bank
    #[error("Address 0x{address:08X} is not mapped")]
    BadAddress {
        /// The offending physical address
        address: u32,
    },

    /// Misaligned access to a non-RAM page
    #[error("Misaligned {size}-byte access at 0x{address:08X}")]
    BadAlign {
        /// The offending address
        address: u32,
        /// Access width in bytes
        size: u32,
    },

    /// Guest executed an undefined opcode (delivered as an architectural
    /// exception on the affected CPU; this variant exists for callers that
    /// inspect the decode result directly)
    #[error("Undefined instruction 0x{opcode:08X} at 0x{pc:08X}")]
    Undefined {
        /// Program counter of the faulting instruction
        pc: u32,
        /// The undecodable instruction word
        opcode: u32,
    },

    /// Guest executed a recognised but unsupported opcode. Fatal.
    #[error("Halted on unimplemented instruction at 0x{pc:08X}, opcode = 0x{opcode:08X}")]
    Unimplemented {
        /// Program counter of the faulting instruction
        pc: u32,
        /// The unsupported instruction word
        opcode: u32,
    },

    /// Malformed tile accelerator input stream
    #[error("Malformed tile accelerator stream at VRAM offset 0x{offset:08X}")]
    TaError {
        /// VRAM offset of the bad entry
        offset: u32,
    },

    /// Polygon buffer exhausted during scene assembly
    #[error("Scene polygon buffer exhausted ({max} polygons)")]
    SceneOverflow {
        /// Capacity that was exceeded
        max: usize,
    },

    /// Save state data is unusable; the emulator keeps its previous state
    #[error("Save state is corrupted: {0}")]
    SaveStateCorrupt(String),

    /// Save state was produced by an incompatible version
    #[error("Save state version {got} not supported (expected {expected})")]
    SaveStateVersion {
        /// Version found in the file
        got: u32,
        /// Version this build writes
        expected: u32,
    },

    /// BIOS image could not be located
    #[error("Bios file not found: {0}")]
    BiosNotFound(String),

    /// BIOS image has the wrong size
    #[error("Invalid BIOS size: expected {expected} bytes, got {got}")]
    InvalidBiosSize {
        /// Required image size
        expected: usize,
        /// Actual file size
        got: usize,
    },

    /// Configuration file is not valid TOML or has bad values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying host I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmulatorError::BadAddress { address: 0x1234_5678 };
        assert_eq!(err.to_string(), "Address 0x12345678 is not mapped");

        let err = EmulatorError::Unimplemented {
            pc: 0x0000_0100,
            opcode: 0xE800_0000,
        };
        assert!(err.to_string().contains("00000100"));
        assert!(err.to_string().contains("E8000000"));
    }

    #[test]
    fn test_io_error_conversion() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(EmulatorError::Io(_))));
    }
}

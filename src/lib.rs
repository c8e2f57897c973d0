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

//! dcrx: a Sega Dreamcast emulation core
//!
//! This crate provides the coordinated virtual machine at the heart of a
//! Dreamcast emulator: the ARM7TDMI audio co-processor interpreter, the
//! shared memory bus fabric, the cooperative module scheduler, the one-shot
//! event queue, the system ASIC (interrupt multiplexing and DMA), and the
//! PVR2 scene assembler.
//!
//! # Architecture
//!
//! The emulator is organized into the following modules:
//!
//! - [`core`]: Core emulation components (Bus, ARM7, ASIC, PVR2, AICA, System)
//!
//! # Example
//!
//! ```no_run
//! use dcrx::core::system::Dreamcast;
//!
//! let mut dc = Dreamcast::new();
//! // dc.load_bios("path/to/dc_boot.bin")?;
//! // dc.run();
//! # Ok::<(), dcrx::core::error::EmulatorError>(())
//! ```
//!
//! # Getting Started
//!
//! 1. Create a [`core::system::Dreamcast`] instance
//! 2. Load a BIOS image (or install the BIOS-emulation syscall hooks)
//! 3. Run the emulation loop
//!
//! # Modules
//!
//! - [`core::arm`]: ARM7TDMI CPU emulation (AICA co-processor)
//! - [`core::memory`]: Memory bus, MMIO registry and VRAM helpers
//! - [`core::event`]: One-shot timer queue shared by every subsystem
//! - [`core::asic`]: Interrupt multiplexer and DMA engines
//! - [`core::gpu`]: PVR2 front end and scene assembly
//! - [`core::system`]: System integration and main loop
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`] which is an
//! alias for `Result<T, EmulatorError>`.

pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};

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

//! Core emulation components
//!
//! Modules are layered leaves-first: the event queue and memory bus know
//! nothing about the devices above them; the ASIC, PVR2 and AICA talk to the
//! bus and the queue; [`system`] owns the lot and provides the run loop.

pub mod aica;
pub mod arm;
pub mod asic;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod event;
pub mod gpu;
pub mod maple;
pub mod memory;
pub mod sh4;
pub(crate) mod stateio;
pub mod syscall;
pub mod system;

// Re-export commonly used types
pub use arm::Arm7;
pub use error::{EmulatorError, Result};
pub use memory::Bus;
pub use system::Dreamcast;

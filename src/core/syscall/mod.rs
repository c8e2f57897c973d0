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

//! Guest-callable host hooks
//!
//! A hook is installed by writing a sentinel instruction word
//! (`0xFFFFFF00 | hook_id`) at a vector address in guest RAM; the SH4
//! interpreter recognises the sentinel and calls [`invoke`] with the hook
//! id. Hooks are how the BIOS-emulation and dcload syscalls intercept guest
//! execution without any guest code present.

use crate::core::system::Dreamcast;

pub mod bios;
pub mod dcload;

/// Maximum number of installable hooks
pub const MAX_HOOKS: usize = 256;

/// Sentinel instruction base recognised by the SH4 interpreter
pub const SYSCALL_SENTINEL: u32 = 0xFFFF_FF00;

/// Host-side handlers a hook can dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookHandler {
    /// BIOS-emulation syscalls (GD-ROM, sysinfo, menu)
    Bios,
    /// dcload console syscalls
    Dcload,
}

#[derive(Debug, Clone, Copy)]
struct Hook {
    handler: HookHandler,
    vector: u32,
}

/// Hook table plus the state owned by the standard hook packs
pub struct SyscallState {
    hooks: [Option<Hook>; MAX_HOOKS],
    /// BIOS-emulation state (GD-ROM command queue)
    pub bios: bios::BiosState,
    /// dcload state (fd table, safety gate)
    pub dcload: dcload::DcloadState,
}

impl SyscallState {
    /// Empty table, no hooks installed
    pub fn new() -> Self {
        Self {
            hooks: [None; MAX_HOOKS],
            bios: bios::BiosState::new(),
            dcload: dcload::DcloadState::new(),
        }
    }
}

impl Default for SyscallState {
    fn default() -> Self {
        Self::new()
    }
}

/// Define a hook without an indirect vector
pub fn add_hook(dc: &mut Dreamcast, hook_id: u32, handler: HookHandler) {
    let hook_id = (hook_id & 0xFF) as usize;
    if dc.syscall.hooks[hook_id].is_some() {
        log::warn!("Overwriting existing hook {:02X}", hook_id);
    }
    dc.syscall.hooks[hook_id] = Some(Hook { handler, vector: 0 });
}

/// Define a hook that indirects through a vector address in guest RAM; the
/// sentinel word is patched in immediately
pub fn add_hook_vector(dc: &mut Dreamcast, hook_id: u32, vector_addr: u32, handler: HookHandler) {
    let id = hook_id & 0xFF;
    if dc.syscall.hooks[id as usize].is_some() {
        log::warn!("Overwriting existing hook {:02X}", id);
    }
    dc.syscall.hooks[id as usize] = Some(Hook { handler, vector: vector_addr });
    dc.write32(vector_addr, SYSCALL_SENTINEL + id);
}

/// Invoke a hook from the SH4 (called on sentinel execution)
pub fn invoke(dc: &mut Dreamcast, hook_id: u32) {
    let hook_id = (hook_id & 0xFF) as usize;
    match dc.syscall.hooks[hook_id] {
        None => log::warn!("Invoked non-existent hook {:02X}", hook_id),
        Some(hook) => match hook.handler {
            HookHandler::Bios => bios::syscall(dc, hook_id as u32),
            HookHandler::Dcload => dcload::syscall(dc, hook_id as u32),
        },
    }
}

/// Re-patch every live vector (after a system reset wipes RAM)
pub fn repatch_vectors(dc: &mut Dreamcast) {
    for id in 0..MAX_HOOKS {
        if let Some(hook) = dc.syscall.hooks[id] {
            if hook.vector != 0 {
                dc.write32(hook.vector, SYSCALL_SENTINEL + id as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::Dreamcast;

    #[test]
    fn test_hook_vector_patched() {
        let mut dc = Dreamcast::new();
        add_hook_vector(&mut dc, 0xB0, 0x8C00_00B0, HookHandler::Bios);
        assert_eq!(dc.read32(0x8C00_00B0), 0xFFFF_FFB0);
    }

    #[test]
    fn test_repatch_after_ram_clear() {
        let mut dc = Dreamcast::new();
        add_hook_vector(&mut dc, 0xF0, 0x8C00_4008, HookHandler::Dcload);
        dc.write32(0x8C00_4008, 0);
        repatch_vectors(&mut dc);
        assert_eq!(dc.read32(0x8C00_4008), 0xFFFF_FFF0);
    }

    #[test]
    fn test_unknown_hook_is_harmless() {
        let mut dc = Dreamcast::new();
        invoke(&mut dc, 0x42);
    }
}

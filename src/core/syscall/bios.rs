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

//! "Fake" BIOS functions, for operation without the real boot ROM
//!
//! Guest code reaches the BIOS services through the vectors at
//! 0x8C0000B0..0x8C0000E0. The GD-ROM service keeps a 16-entry command
//! queue; commands are accepted by *send*, executed during *mainloop*, and
//! their status collected by *check*. Only the command plumbing lives here;
//! actual disc access is a collaborator concern.

use serde::{Deserialize, Serialize};

use super::HookHandler;
use crate::core::system::Dreamcast;

/// GD-ROM command queue depth
pub const COMMAND_QUEUE_LENGTH: usize = 16;

// GD-ROM command codes
const GD_CMD_INIT: u32 = 24;

// Command status values
const GD_CMD_STATUS_NONE: u32 = 0;
const GD_CMD_STATUS_ACTIVE: u32 = 1;
const GD_CMD_STATUS_DONE: u32 = 2;
const GD_CMD_STATUS_ABORT: u32 = 3;
const GD_CMD_STATUS_ERROR: u32 = 4;

const GD_ERROR_SYSTEM: u32 = 1;

/// One queued GD-ROM command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GdromCommand {
    status: u32,
    cmd_code: u32,
    data_addr: u32,
    result: [u32; 4],
}

/// BIOS-emulation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiosState {
    queue: Vec<GdromCommand>,
    gdrom_status: u32,
    gdrom_disk_type: u32,
}

impl BiosState {
    /// Empty command queue
    pub fn new() -> Self {
        Self {
            queue: vec![GdromCommand::default(); COMMAND_QUEUE_LENGTH],
            gdrom_status: 0,
            gdrom_disk_type: 0,
        }
    }

    fn enqueue(&mut self, cmd: u32, data_addr: u32) -> i32 {
        for (i, slot) in self.queue.iter_mut().enumerate() {
            if slot.status != GD_CMD_STATUS_ACTIVE {
                slot.status = GD_CMD_STATUS_ACTIVE;
                slot.cmd_code = cmd;
                slot.data_addr = data_addr;
                slot.result = [0; 4];
                return i as i32;
            }
        }
        -1
    }

    fn run_command(cmd: &mut GdromCommand) {
        log::debug!("BIOS GD command {}", cmd.cmd_code);
        match cmd.cmd_code {
            GD_CMD_INIT => {
                cmd.status = GD_CMD_STATUS_DONE;
            }
            _ => {
                cmd.status = GD_CMD_STATUS_ERROR;
                cmd.result[0] = GD_ERROR_SYSTEM;
            }
        }
    }

    fn run_queue(&mut self) {
        for cmd in &mut self.queue {
            if cmd.status == GD_CMD_STATUS_ACTIVE {
                Self::run_command(cmd);
            }
        }
    }
}

impl Default for BiosState {
    fn default() -> Self {
        Self::new()
    }
}

/// BIOS syscall dispatcher. Syscall list courtesy of Marcus Comstedt.
pub fn syscall(dc: &mut Dreamcast, syscall_id: u32) {
    match syscall_id {
        0xB0 => { /* sysinfo */ }
        0xB4 => { /* font */ }
        0xB8 => { /* flash */ }
        0xBC => {
            // Misc / GD-ROM
            match dc.sh4.r[6] {
                0 => gdrom_syscall(dc),
                0xFFFF_FFFF => { /* misc */ }
                _ => {}
            }
        }
        0xE0 => {
            // Menu
            match dc.sh4.r[7] {
                0 => log::warn!("Entering main program"),
                1 => {
                    log::warn!("Program aborted to DC menu");
                    dc.stop();
                }
                _ => {}
            }
        }
        _ => {}
    }
}

fn gdrom_syscall(dc: &mut Dreamcast) {
    match dc.sh4.r[7] {
        0 => {
            // Send command
            let data_addr = dc.sh4.r[5];
            let code = dc.sh4.r[4];
            dc.sh4.r[0] = dc.syscall.bios.enqueue(code, data_addr) as u32;
        }
        1 => {
            // Check command
            let id = dc.sh4.r[4] as usize;
            if id >= COMMAND_QUEUE_LENGTH
                || dc.syscall.bios.queue[id].status == GD_CMD_STATUS_NONE
            {
                dc.sh4.r[0] = GD_CMD_STATUS_NONE;
            } else {
                let cmd = dc.syscall.bios.queue[id].clone();
                dc.sh4.r[0] = cmd.status;
                if cmd.status == GD_CMD_STATUS_ERROR && dc.sh4.r[5] != 0 {
                    let dest = dc.sh4.r[5];
                    let mut bytes = Vec::with_capacity(16);
                    for word in cmd.result {
                        bytes.extend_from_slice(&word.to_le_bytes());
                    }
                    dc.bus.copy_to(dest, &bytes);
                }
            }
        }
        2 => dc.syscall.bios.run_queue(), // Mainloop
        3 => dc.syscall.bios = BiosState::new(), // Init
        4 => {
            // Drive status
            if dc.sh4.r[4] != 0 {
                let dest = dc.sh4.r[4];
                let status = dc.syscall.bios.gdrom_status;
                let disk_type = dc.syscall.bios.gdrom_disk_type;
                let mut bytes = Vec::with_capacity(8);
                bytes.extend_from_slice(&status.to_le_bytes());
                bytes.extend_from_slice(&disk_type.to_le_bytes());
                dc.bus.copy_to(dest, &bytes);
            }
            dc.sh4.r[0] = 0;
        }
        8 => {
            // Abort command
            let id = dc.sh4.r[4] as usize;
            if id >= COMMAND_QUEUE_LENGTH
                || dc.syscall.bios.queue[id].status != GD_CMD_STATUS_ACTIVE
            {
                dc.sh4.r[0] = -1i32 as u32;
            } else {
                dc.syscall.bios.queue[id].status = GD_CMD_STATUS_ABORT;
                dc.sh4.r[0] = 0;
            }
        }
        9 => { /* reset */ }
        10 => dc.sh4.r[0] = 0, // Set mode
        _ => {}
    }
}

/// Install the BIOS-emulation hooks at the conventional vectors
pub fn install(dc: &mut Dreamcast) {
    dc.syscall.bios = BiosState::new();
    super::add_hook_vector(dc, 0xB0, 0x8C00_00B0, HookHandler::Bios);
    super::add_hook_vector(dc, 0xB4, 0x8C00_00B4, HookHandler::Bios);
    super::add_hook_vector(dc, 0xB8, 0x8C00_00B8, HookHandler::Bios);
    super::add_hook_vector(dc, 0xBC, 0x8C00_00BC, HookHandler::Bios);
    super::add_hook_vector(dc, 0xE0, 0x8C00_00E0, HookHandler::Bios);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::syscall;

    #[test]
    fn test_install_patches_vectors() {
        let mut dc = Dreamcast::new();
        install(&mut dc);
        for vector in [0x8C00_00B0u32, 0x8C00_00B4, 0x8C00_00B8, 0x8C00_00BC, 0x8C00_00E0] {
            let word = dc.read32(vector);
            assert_eq!(word & 0xFFFF_FF00, syscall::SYSCALL_SENTINEL);
        }
    }

    #[test]
    fn test_gdrom_init_command_lifecycle() {
        let mut dc = Dreamcast::new();
        install(&mut dc);

        // Send GD_CMD_INIT
        dc.sh4.r[4] = GD_CMD_INIT;
        dc.sh4.r[5] = 0;
        dc.sh4.r[6] = 0;
        dc.sh4.r[7] = 0;
        syscall::invoke(&mut dc, 0xBC);
        let id = dc.sh4.r[0];
        assert_eq!(id, 0);

        // Mainloop executes it
        dc.sh4.r[7] = 2;
        syscall::invoke(&mut dc, 0xBC);

        // Check reports done
        dc.sh4.r[4] = id;
        dc.sh4.r[5] = 0;
        dc.sh4.r[7] = 1;
        syscall::invoke(&mut dc, 0xBC);
        assert_eq!(dc.sh4.r[0], GD_CMD_STATUS_DONE);
    }

    #[test]
    fn test_unknown_gdrom_command_errors() {
        let mut dc = Dreamcast::new();
        install(&mut dc);

        dc.sh4.r[4] = 99;
        dc.sh4.r[5] = 0;
        dc.sh4.r[6] = 0;
        dc.sh4.r[7] = 0;
        syscall::invoke(&mut dc, 0xBC);
        let id = dc.sh4.r[0];

        dc.sh4.r[7] = 2;
        syscall::invoke(&mut dc, 0xBC);

        // Check with an error buffer provided copies the result block out
        dc.sh4.r[4] = id;
        dc.sh4.r[5] = 0x8C10_0000;
        dc.sh4.r[7] = 1;
        syscall::invoke(&mut dc, 0xBC);
        assert_eq!(dc.sh4.r[0], GD_CMD_STATUS_ERROR);
        assert_eq!(dc.read32(0x8C10_0000), GD_ERROR_SYSTEM);
    }
}

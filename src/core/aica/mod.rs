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

//! AICA sound system shell
//!
//! Hosts the ARM7 core and the three AICA register banks (channels 0-31,
//! channels 32-63, global control). The control bank's reset register gates
//! ARM execution: bit 0 clear means the ARM runs, set forces it into reset.
//! Behavioral audio synthesis is a collaborator interface and not modelled
//! here; channel writes land in the banks' backing pages.
//!
//! The ARM sees a narrow 24-bit map: sound RAM below 2 MiB, the AICA banks
//! at 0x00800000, and an 8 KiB scratch page at 0x00803000. Byte and
//! half-word MMIO accesses are defined as the low bits of the 32-bit access
//! at the same address.

use crate::core::arm::{Arm7, ArmMemory, CPSR_F};
use crate::core::memory::{
    Bus, MmioRegionId, PortDef, PortFlags, MEM_REGION_AUDIO, MEM_REGION_AUDIO_SCRATCH,
};
use crate::core::system::Dreamcast;

/// AICA output sample rate in Hz
pub const AICA_SAMPLE_RATE: u32 = 44100;
/// ARM core clock in MHz
pub const ARM_BASE_RATE: u32 = 33;
/// ARM cycles per output sample
pub const CYCLES_PER_SAMPLE: u32 = ARM_BASE_RATE * 1_000_000 / AICA_SAMPLE_RATE;
/// Nanoseconds per output sample
pub const SAMPLE_PERIOD_NS: u32 = 1_000_000_000 / AICA_SAMPLE_RATE;

/// AICA reset register (bit 0 clear = ARM running)
pub(crate) const AICA_RESET: u32 = 0xC00;
/// Free-running IRQ timer register
pub(crate) const AICA_TIMER: u32 = 0x890;
/// Timer control register (bit 6 = run enable)
pub(crate) const AICA_TCR: u32 = 0x894;

const MRW: PortFlags = PortFlags::RW;

/// Channels 0-31 bank. Channel registers are 128 bytes apart; only the
/// bank anchor is declared, the rest of the page is plain backing store.
pub(crate) const AICA0_PORTS: &[PortDef] = &[PortDef::long(0x000, "AICACH0", MRW, None)];

/// Channels 32-63 bank
pub(crate) const AICA1_PORTS: &[PortDef] = &[PortDef::long(0x000, "AICACH32", MRW, None)];

/// Global control bank
pub(crate) const AICA2_PORTS: &[PortDef] = &[
    PortDef::long(0x040, "CDDA_VOL_L", MRW, Some(0)),
    PortDef::long(0x044, "CDDA_VOL_R", MRW, Some(0)),
    PortDef::long(0x800, "VOL_MASTER", MRW, None),
    PortDef::long(0x890, "AICA_TIMER", MRW, Some(0)),
    PortDef::long(0x894, "AICA_TCR", MRW, Some(0)),
    PortDef::long(0x89C, "AICA_UNK1", MRW, Some(0)),
    PortDef::long(0x8A4, "AICA_UNK2", MRW, Some(0)),
    PortDef::byte(0x8A8, "AICA_UNK3", MRW, Some(0)),
    PortDef::byte(0x8AC, "AICA_UNK4", MRW, Some(0)),
    PortDef::byte(0x8B0, "AICA_UNK5", MRW, Some(0)),
    PortDef::long(0xC00, "AICA_RESET", MRW, Some(1)),
    PortDef::long(0xD04, "AICA_UNK6", MRW, Some(0)),
];

/// AICA-internal interrupt sources delivered to the ARM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AicaEvent {
    /// The 8-bit IRQ timer wrapped
    Timer,
}

/// AICA module state: the hosted ARM core
#[derive(Debug, Clone)]
pub struct Aica {
    /// The ARM7 co-processor
    pub arm: Arm7,
}

impl Aica {
    /// Create the shell with the ARM in reset
    pub fn new() -> Self {
        Self { arm: Arm7::new() }
    }

    /// Reset the hosted core
    pub fn reset(&mut self) {
        self.arm.reset();
    }
}

impl Default for Aica {
    fn default() -> Self {
        Self::new()
    }
}

/// The ARM's view of the machine: sound RAM, the AICA banks, scratch RAM
pub(crate) struct ArmBus<'a> {
    pub bus: &'a mut Bus,
}

impl ArmBus<'_> {
    fn aica_bank(addr: u32) -> Option<MmioRegionId> {
        match addr & 0xFFFF_F000 {
            0x0080_0000 => Some(MmioRegionId::Aica0),
            0x0080_1000 => Some(MmioRegionId::Aica1),
            0x0080_2000 => Some(MmioRegionId::Aica2),
            _ => None,
        }
    }
}

impl ArmMemory for ArmBus<'_> {
    fn read_long(&mut self, addr: u32) -> u32 {
        if addr < 0x0020_0000 {
            // Main sound ram
            if let Some(ram) = self.bus.region_mem(MEM_REGION_AUDIO) {
                let off = (addr as usize) & !0x3;
                return u32::from_le_bytes(ram[off..off + 4].try_into().unwrap());
            }
        } else if let Some(bank) = Self::aica_bank(addr) {
            return self.bus.io_read32(bank, addr & 0xFFF);
        } else if (0x0080_3000..0x0080_5000).contains(&addr) {
            if let Some(scratch) = self.bus.region_mem(MEM_REGION_AUDIO_SCRATCH) {
                let off = ((addr - 0x0080_3000) as usize) & !0x3;
                return u32::from_le_bytes(scratch[off..off + 4].try_into().unwrap());
            }
        }
        log::error!("ARM attempted long read of undefined page: {:08X}", addr);
        0
    }

    fn write_long(&mut self, addr: u32, value: u32) {
        if addr < 0x0020_0000 {
            if let Some(ram) = self.bus.region_mem_mut(MEM_REGION_AUDIO) {
                let off = (addr as usize) & !0x3;
                ram[off..off + 4].copy_from_slice(&value.to_le_bytes());
                return;
            }
        } else if let Some(bank) = Self::aica_bank(addr) {
            // ARM-side control writes store directly; reset gating is
            // sampled at the next slice boundary
            self.bus.io_write32(bank, addr & 0xFFF, value);
            return;
        } else if (0x0080_3000..0x0080_5000).contains(&addr) {
            if let Some(scratch) = self.bus.region_mem_mut(MEM_REGION_AUDIO_SCRATCH) {
                let off = ((addr - 0x0080_3000) as usize) & !0x3;
                scratch[off..off + 4].copy_from_slice(&value.to_le_bytes());
                return;
            }
        }
        log::error!("ARM attempted long write to undefined address: {:08X}", addr);
    }

    fn read_byte(&mut self, addr: u32) -> u32 {
        if addr < 0x0020_0000 {
            if let Some(ram) = self.bus.region_mem(MEM_REGION_AUDIO) {
                return u32::from(ram[addr as usize]);
            }
        } else if (0x0080_3000..0x0080_5000).contains(&addr) {
            if let Some(scratch) = self.bus.region_mem(MEM_REGION_AUDIO_SCRATCH) {
                return u32::from(scratch[(addr - 0x0080_3000) as usize]);
            }
        }
        self.read_long(addr) & 0xFF
    }

    fn write_byte(&mut self, addr: u32, value: u32) {
        if addr < 0x0020_0000 {
            if let Some(ram) = self.bus.region_mem_mut(MEM_REGION_AUDIO) {
                ram[addr as usize] = value as u8;
                return;
            }
        } else if (0x0080_3000..0x0080_5000).contains(&addr) {
            if let Some(scratch) = self.bus.region_mem_mut(MEM_REGION_AUDIO_SCRATCH) {
                scratch[(addr - 0x0080_3000) as usize] = value as u8;
                return;
            }
        }
        self.write_long(addr, value & 0xFF);
    }
}

/// Deliver an AICA-internal interrupt to the ARM core (FIQ line)
pub fn aica_event(dc: &mut Dreamcast, event: AicaEvent) {
    match event {
        AicaEvent::Timer => {
            dc.aica.arm.int_pending |= CPSR_F;
            log::trace!("AICA timer interrupt posted to ARM");
        }
    }
}

/// Run the ARM for a number of samples, ticking the AICA timer once per
/// sample. Returns the samples actually executed (fewer on breakpoint or
/// stop).
fn arm_run_slice(dc: &mut Dreamcast, num_samples: u32) -> u32 {
    for i in 0..num_samples {
        let mut mem = ArmBus { bus: &mut dc.bus };
        match dc.aica.arm.run_cycles(CYCLES_PER_SAMPLE, &mut mem) {
            Ok(_) => {}
            Err(err) => {
                log::error!("{}", err);
                dc.stop();
                return i;
            }
        }
        if dc.aica.arm.hit_breakpoint {
            dc.stop();
            return i;
        }

        let tcr = dc.bus.io_read32(MmioRegionId::Aica2, AICA_TCR);
        if tcr & 0x40 != 0 {
            let val = (dc.bus.io_read32(MmioRegionId::Aica2, AICA_TIMER) as u8).wrapping_add(1);
            if val == 0 {
                aica_event(dc, AicaEvent::Timer);
            }
            dc.bus
                .io_write32(MmioRegionId::Aica2, AICA_TIMER, u32::from(val));
        }
        if !dc.is_running() {
            return i + 1;
        }
    }
    num_samples
}

/// Run one AICA time slice. The reset bit gates ARM execution; a held-reset
/// ARM consumes nothing and returns the slice untouched.
pub(crate) fn run_slice(dc: &mut Dreamcast, nanosecs: u32) -> u32 {
    let reset = dc.bus.io_read32(MmioRegionId::Aica2, AICA_RESET);
    if reset & 1 != 0 {
        return nanosecs;
    }
    let samples = nanosecs / SAMPLE_PERIOD_NS;
    let done = arm_run_slice(dc, samples);
    if done < samples {
        done * SAMPLE_PERIOD_NS
    } else {
        nanosecs
    }
}

/// Channel bank 0-31 writes: stored for the synthesis collaborator
pub(crate) fn mmio_aica0_write(dc: &mut Dreamcast, offset: u32, val: u32) {
    dc.bus.io_write32(MmioRegionId::Aica0, offset, val);
}

/// Channel bank 32-63 writes
pub(crate) fn mmio_aica1_write(dc: &mut Dreamcast, offset: u32, val: u32) {
    dc.bus.io_write32(MmioRegionId::Aica1, offset, val);
}

/// Control bank writes. A falling edge on the reset bit releases the ARM
/// and executes a core reset first.
pub(crate) fn mmio_aica2_write(dc: &mut Dreamcast, offset: u32, val: u32) {
    match offset {
        AICA_RESET => {
            let prev = dc.bus.io_read32(MmioRegionId::Aica2, AICA_RESET);
            if prev & 1 == 1 && val & 1 == 0 {
                log::debug!("ARM enabled");
                dc.aica.arm.reset();
            } else if prev & 1 == 0 && val & 1 == 1 {
                log::debug!("ARM disabled");
            }
            dc.bus.io_write32(MmioRegionId::Aica2, AICA_RESET, val);
        }
        _ => dc.bus.io_write32(MmioRegionId::Aica2, offset, val),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::Dreamcast;

    const AICA2_BASE: u32 = 0x0070_2000;
    const AUDIO_RAM: u32 = 0x0080_0000;

    #[test]
    fn test_arm_gated_by_reset_bit() {
        let mut dc = Dreamcast::new();
        // Reset bit is set out of the box: slice returns unused
        assert_eq!(dc.read32(AICA2_BASE + AICA_RESET) & 1, 1);
        let consumed = run_slice(&mut dc, 1_000_000);
        assert_eq!(consumed, 1_000_000);
        assert_eq!(dc.aica.arm.icount, 0);
    }

    #[test]
    fn test_arm_runs_when_released() {
        let mut dc = Dreamcast::new();
        // Program: a two-instruction loop at 0
        dc.write32(AUDIO_RAM, 0xE3A0_0001); // MOV r0, #1
        dc.write32(AUDIO_RAM + 4, 0xEAFF_FFFD); // B 0

        dc.start();
        dc.write32(AICA2_BASE + AICA_RESET, 0);
        let consumed = run_slice(&mut dc, SAMPLE_PERIOD_NS * 4);
        assert_eq!(consumed, SAMPLE_PERIOD_NS * 4);
        assert_eq!(dc.aica.arm.icount as u32, CYCLES_PER_SAMPLE * 4);
        assert_eq!(dc.aica.arm.r[0], 1);
    }

    #[test]
    fn test_reset_edge_resets_core() {
        let mut dc = Dreamcast::new();
        dc.aica.arm.r[15] = 0x1234;
        dc.write32(AICA2_BASE + AICA_RESET, 0);
        assert_eq!(dc.aica.arm.r[15], 0);
    }

    #[test]
    fn test_timer_wrap_posts_fiq() {
        let mut dc = Dreamcast::new();
        dc.write32(AUDIO_RAM, 0xEAFF_FFFE); // B . (spin)
        dc.start();
        dc.write32(AICA2_BASE + AICA_TCR, 0x40);
        dc.write32(AICA2_BASE + AICA_TIMER, 0xFF);
        dc.write32(AICA2_BASE + AICA_RESET, 0);

        run_slice(&mut dc, SAMPLE_PERIOD_NS);
        assert_ne!(dc.aica.arm.int_pending & CPSR_F, 0);
        assert_eq!(dc.read32(AICA2_BASE + AICA_TIMER), 0);
    }

    #[test]
    fn test_arm_memory_map() {
        let mut dc = Dreamcast::new();
        let mut mem = ArmBus { bus: &mut dc.bus };

        // Sound RAM round trip including byte fidelity
        mem.write_long(0x100, 0xDEAD_BEEF);
        assert_eq!(mem.read_long(0x100), 0xDEAD_BEEF);
        mem.write_byte(0x101, 0x42);
        assert_eq!(mem.read_long(0x100), 0xDEAD_42EF);

        // Scratch RAM
        mem.write_long(0x0080_3010, 0x1111_2222);
        assert_eq!(mem.read_long(0x0080_3010), 0x1111_2222);

        // AICA control bank seen at the ARM-side base
        assert_eq!(mem.read_long(0x0080_2000 + AICA_RESET) & 1, 1);

        // Undefined pages read zero
        assert_eq!(mem.read_long(0x0100_0000), 0);
    }

    #[test]
    fn test_sound_ram_shared_with_sh4() {
        // The SH4 sees sound RAM at 0x00800000; the ARM sees it at 0
        let mut dc = Dreamcast::new();
        dc.write32(AUDIO_RAM + 0x200, 0xFACE_F00D);
        let mut mem = ArmBus { bus: &mut dc.bus };
        assert_eq!(mem.read_long(0x200), 0xFACE_F00D);
    }
}

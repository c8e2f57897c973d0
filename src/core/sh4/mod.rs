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

//! SH4 contract surface
//!
//! The SH4 interpreter itself is an external collaborator; the core only
//! depends on the state it shares with the rest of the machine: the guest
//! register file (read by the syscall hooks), the slice-cycle clock the
//! event queue runs on, the interrupt lines the ASIC drives, and a minimal
//! DMAC channel surface consumed by the PVR DMA engine.

use serde::{Deserialize, Serialize};

use crate::core::event::NOT_SCHEDULED;
use crate::core::memory::Bus;

/// External interrupt lines into the SH4 interrupt controller. The ASIC's
/// three outputs are wired to IRQ 13 (line A), IRQ 11 (line B) and IRQ 9
/// (line C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// IRQ 9 (ASIC line C)
    Irq9,
    /// IRQ 11 (ASIC line B)
    Irq11,
    /// IRQ 13 (ASIC line A)
    Irq13,
}

impl Interrupt {
    #[inline]
    fn bit(self) -> u32 {
        match self {
            Interrupt::Irq9 => 1 << 9,
            Interrupt::Irq11 => 1 << 11,
            Interrupt::Irq13 => 1 << 13,
        }
    }
}

/// Event-pending type bit: an interrupt line is asserted
pub const PENDING_IRQ: u32 = 0x01;
/// Event-pending type bit: a queue event is due this slice
pub const PENDING_EVENT: u32 = 0x02;

/// One SH4 DMAC channel, reduced to what the ASIC-side engines consume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmacChannel {
    /// Source address register
    pub sar: u32,
    /// Destination address register
    pub dar: u32,
    /// Transfer count in bytes remaining
    pub count: u32,
    /// Channel enabled
    pub enabled: bool,
}

/// Shared SH4-side machine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sh4 {
    /// General registers r0-r15 of the active bank (syscall ABI surface)
    pub r: [u32; 16],
    /// Current program counter
    pub pc: u32,
    /// Next program counter (branch-delay bookkeeping)
    pub new_pc: u32,
    /// Nanoseconds into the current time slice
    pub slice_cycle: u32,
    /// Time of the next attention point (queue event or asserted IRQ)
    pub event_pending: u32,
    /// [`PENDING_IRQ`] / [`PENDING_EVENT`] bits
    pub event_types: u32,
    /// Currently asserted interrupt lines
    asserted: u32,
    /// DMAC channels (channel 2 feeds the PVR DMA)
    pub dmac: [DmacChannel; 4],
}

impl Sh4 {
    /// Boot-time program counter
    pub const BOOT_PC: u32 = 0xA000_0000;

    /// Create the surface in reset state
    pub fn new() -> Self {
        Self {
            r: [0; 16],
            pc: Self::BOOT_PC,
            new_pc: Self::BOOT_PC + 2,
            slice_cycle: 0,
            event_pending: NOT_SCHEDULED,
            event_types: 0,
            asserted: 0,
            dmac: Default::default(),
        }
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Assert an external interrupt line
    pub fn raise_interrupt(&mut self, irq: Interrupt) {
        self.asserted |= irq.bit();
        self.event_types |= PENDING_IRQ;
        self.event_pending = 0;
        log::trace!("SH4 interrupt raised: {:?}", irq);
    }

    /// De-assert an external interrupt line
    pub fn clear_interrupt(&mut self, irq: Interrupt) {
        self.asserted &= !irq.bit();
        if self.asserted == 0 {
            self.event_types &= !PENDING_IRQ;
        }
        log::trace!("SH4 interrupt cleared: {:?}", irq);
    }

    /// True if the given line is currently asserted
    pub fn interrupt_asserted(&self, irq: Interrupt) -> bool {
        self.asserted & irq.bit() != 0
    }

    /// True if any line is asserted
    pub fn any_interrupt_asserted(&self) -> bool {
        self.asserted != 0
    }

    /// Refresh the pending-event cell from the queue's next due time
    pub fn set_next_event(&mut self, next: u32) {
        if next == NOT_SCHEDULED {
            if self.event_types & PENDING_IRQ == 0 {
                self.event_pending = NOT_SCHEDULED;
            }
            self.event_types &= !PENDING_EVENT;
        } else {
            if self.event_types & PENDING_IRQ == 0 {
                self.event_pending = next;
            }
            self.event_types |= PENDING_EVENT;
        }
    }

    /// Pull up to `count` bytes from a DMAC channel, advancing its source
    /// address and decrementing its remaining count. Disabled or exhausted
    /// channels yield a short (possibly empty) buffer.
    pub fn dmac_get_buffer(&mut self, channel: usize, count: u32, bus: &Bus) -> Vec<u8> {
        let ch = &mut self.dmac[channel];
        if !ch.enabled {
            log::warn!("DMAC channel {} fetch while disabled", channel);
            return Vec::new();
        }
        let len = count.min(ch.count) as usize;
        let mut buf = vec![0u8; len];
        bus.copy_from(ch.sar, &mut buf);
        ch.sar = ch.sar.wrapping_add(len as u32);
        ch.count -= len as u32;
        buf
    }
}

impl Default for Sh4 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_lines() {
        let mut sh4 = Sh4::new();
        assert!(!sh4.interrupt_asserted(Interrupt::Irq13));
        sh4.raise_interrupt(Interrupt::Irq13);
        assert!(sh4.interrupt_asserted(Interrupt::Irq13));
        assert!(sh4.any_interrupt_asserted());
        assert_eq!(sh4.event_types & PENDING_IRQ, PENDING_IRQ);

        sh4.raise_interrupt(Interrupt::Irq9);
        sh4.clear_interrupt(Interrupt::Irq13);
        // Irq9 still holds the pending-irq type bit
        assert_eq!(sh4.event_types & PENDING_IRQ, PENDING_IRQ);
        sh4.clear_interrupt(Interrupt::Irq9);
        assert_eq!(sh4.event_types & PENDING_IRQ, 0);
    }

    #[test]
    fn test_set_next_event() {
        let mut sh4 = Sh4::new();
        sh4.set_next_event(12345);
        assert_eq!(sh4.event_pending, 12345);
        assert_eq!(sh4.event_types, PENDING_EVENT);
        sh4.set_next_event(NOT_SCHEDULED);
        assert_eq!(sh4.event_pending, NOT_SCHEDULED);
        assert_eq!(sh4.event_types, 0);
    }

    #[test]
    fn test_dmac_fetch() {
        use crate::core::memory::MEM_REGION_MAIN;
        let mut bus = Bus::new();
        bus.create_ram_region(0x0C00_0000, 16 * 1024 * 1024, MEM_REGION_MAIN);
        bus.write32(0x0C00_0100, 0xAABB_CCDD);

        let mut sh4 = Sh4::new();
        sh4.dmac[2] = DmacChannel { sar: 0x0C00_0100, dar: 0, count: 64, enabled: true };
        let buf = sh4.dmac_get_buffer(2, 4, &bus);
        assert_eq!(buf, vec![0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(sh4.dmac[2].sar, 0x0C00_0104);
        assert_eq!(sh4.dmac[2].count, 60);
    }
}

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

//! System ASIC: event multiplexing and DMA
//!
//! The ASIC collects up to 96 numbered events into three 32-bit pending
//! registers (PIRQ0..2) and routes them through three per-bank mask sets
//! onto the SH4's IRQ 13/11/9 lines. Activity in the upper banks is made
//! visible in PIRQ0 through two synthetic cascade events (bits 30 and 31).
//! Guest writes of 1 bits to a PIRQ register *clear* those events.
//!
//! The same chip owns the external DMA engines (four G2 channels, one IDE
//! channel, one PVR channel) and the G2 FIFO status line, whose bits follow
//! a fixed ~420 ns choreography after every G2-bus write.

use serde::{Deserialize, Serialize};

use crate::core::maple;
use crate::core::memory::{MmioRegionId, PortDef, PortFlags};
use crate::core::sh4::Interrupt;
use crate::core::system::Dreamcast;

/// ASIC event numbers (events 32..63 additionally raise cascade 1, events
/// 64..95 raise cascade 2)
pub mod events {
    /// Render-complete
    pub const PVR_RENDER_DONE: usize = 2;
    /// Programmable scanline event 1
    pub const SCANLINE1: usize = 3;
    /// Programmable scanline event 2
    pub const SCANLINE2: usize = 4;
    /// Raster position (hpos) event
    pub const RETRACE: usize = 5;
    /// TA opaque list complete
    pub const PVR_OPAQUE_DONE: usize = 7;
    /// TA opaque modifier list complete
    pub const PVR_OPAQUEMOD_DONE: usize = 8;
    /// TA translucent list complete
    pub const PVR_TRANS_DONE: usize = 9;
    /// TA translucent modifier list complete
    pub const PVR_TRANSMOD_DONE: usize = 10;
    /// Maple DMA complete
    pub const MAPLE_DMA: usize = 12;
    /// Maple error
    pub const MAPLE_ERR: usize = 13;
    /// IDE DMA complete
    pub const IDE_DMA: usize = 14;
    /// G2 DMA channel 0 complete
    pub const G2_DMA0: usize = 15;
    /// G2 DMA channel 1 complete
    pub const G2_DMA1: usize = 16;
    /// G2 DMA channel 2 complete
    pub const G2_DMA2: usize = 17;
    /// G2 DMA channel 3 complete
    pub const G2_DMA3: usize = 18;
    /// PVR DMA complete
    pub const PVR_DMA: usize = 19;
    /// TA punch-through list complete
    pub const PVR_PUNCHOUT_DONE: usize = 21;
    /// Cascade: some event pending in PIRQ1
    pub const CASCADE1: usize = 30;
    /// Cascade: some event pending in PIRQ2
    pub const CASCADE2: usize = 31;
    /// GD-ROM device interrupt
    pub const IDE: usize = 32;
    /// AICA interrupt
    pub const AICA: usize = 33;
    /// Malformed TA input stream
    pub const TA_ERROR: usize = 65;
    /// TA object buffer exhausted
    pub const PVR_PRIM_ALLOC_FAIL: usize = 66;
    /// TA tile matrix exhausted
    pub const PVR_MATRIX_ALLOC_FAIL: usize = 67;
    /// TA bad input parameter
    pub const PVR_BAD_INPUT: usize = 68;
}

// ASIC register offsets (0x005F6000 bank)
pub(crate) const PVRDMADEST: u32 = 0x800;
pub(crate) const PVRDMACNT: u32 = 0x804;
pub(crate) const PVRDMACTL: u32 = 0x808;
pub(crate) const G2STATUS: u32 = 0x88C;
pub(crate) const SYSRESET: u32 = 0x8A0;
pub(crate) const PIRQ0: u32 = 0x900;
pub(crate) const PIRQ1: u32 = 0x904;
pub(crate) const PIRQ2: u32 = 0x908;
pub(crate) const IRQA0: u32 = 0x910;
pub(crate) const IRQB0: u32 = 0x920;
pub(crate) const IRQC0: u32 = 0x930;
pub(crate) const MAPLE_DMA_ADDR: u32 = 0xC04;
pub(crate) const MAPLE_STATE: u32 = 0xC18;

// EXTDMA register offsets (0x005F7000 bank)
pub(crate) const IDEDMASH4: u32 = 0x404;
pub(crate) const IDEDMASIZ: u32 = 0x408;
pub(crate) const IDEDMADIR: u32 = 0x40C;
pub(crate) const IDEDMACTL1: u32 = 0x414;
pub(crate) const IDEDMACTL2: u32 = 0x418;
pub(crate) const IDEACTIVATE: u32 = 0x4E4;
pub(crate) const IDEDMATXSIZ: u32 = 0x4F8;
pub(crate) const G2DMA0EXT: u32 = 0x800;
pub(crate) const G2DMA0SH4: u32 = 0x804;
pub(crate) const G2DMA0SIZ: u32 = 0x808;
pub(crate) const G2DMA0DIR: u32 = 0x80C;
pub(crate) const G2DMA0CTL1: u32 = 0x814;
pub(crate) const G2DMA0CTL2: u32 = 0x818;
pub(crate) const PVRDMA2CTL1: u32 = 0xC14;
pub(crate) const PVRDMA2CTL2: u32 = 0xC18;

const MRW: PortFlags = PortFlags::RW;

/// System ASIC register bank
pub(crate) const ASIC_PORTS: &[PortDef] = &[
    PortDef::long(0x800, "PVRDMADEST", MRW, Some(0)),
    PortDef::long(0x804, "PVRDMACNT", MRW, Some(0)),
    PortDef::long(0x808, "PVRDMACTL", MRW, Some(0)),
    PortDef::long(0x884, "PVRDMARGN", MRW, Some(0)),
    PortDef::long(0x88C, "G2STATUS", PortFlags::from_bits_truncate(PortFlags::READ.bits() | PortFlags::NOTRACE.bits()), Some(0)),
    PortDef::long(0x89C, "ASICUNKB", MRW, Some(0xB)),
    PortDef::long(0x8A0, "SYSRESET", MRW, Some(0)),
    PortDef::long(0x900, "PIRQ0", PortFlags::from_bits_truncate(PortFlags::RW.bits() | PortFlags::NOTRACE.bits()), Some(0)),
    PortDef::long(0x904, "PIRQ1", MRW, Some(0)),
    PortDef::long(0x908, "PIRQ2", MRW, Some(0)),
    PortDef::long(0x910, "IRQA0", MRW, Some(0)),
    PortDef::long(0x914, "IRQA1", MRW, Some(0)),
    PortDef::long(0x918, "IRQA2", MRW, Some(0)),
    PortDef::long(0x920, "IRQB0", MRW, Some(0)),
    PortDef::long(0x924, "IRQB1", MRW, Some(0)),
    PortDef::long(0x928, "IRQB2", MRW, Some(0)),
    PortDef::long(0x930, "IRQC0", MRW, Some(0)),
    PortDef::long(0x934, "IRQC1", MRW, Some(0)),
    PortDef::long(0x938, "IRQC2", MRW, Some(0)),
    PortDef::long(0xC04, "MAPLE_DMA", MRW, None),
    PortDef::long(0xC10, "MAPLE_RESET2", MRW, None),
    PortDef::long(0xC14, "MAPLE_ENABLE", MRW, None),
    PortDef::long(0xC18, "MAPLE_STATE", MRW, Some(0)),
    PortDef::long(0xC80, "MAPLE_SPEED", MRW, None),
    PortDef::long(0xC8C, "MAPLE_RESET1", MRW, None),
    PortDef::long(0xCF4, "MAPLE_SRC", MRW, Some(0)),
    PortDef::long(0xCF8, "MAPLE_DEST1", MRW, Some(0)),
    PortDef::long(0xCFC, "MAPLE_DEST2", MRW, Some(0)),
];

/// External DMA / IDE register bank
pub(crate) const EXTDMA_PORTS: &[PortDef] = &[
    PortDef::byte(0x018, "IDEALTSTATUS", MRW, Some(0)),
    PortDef::byte(0x01C, "IDEUNK1", MRW, Some(0)),
    PortDef::word(0x080, "IDEDATA", MRW, Some(0)),
    PortDef::byte(0x084, "IDEFEAT", MRW, Some(0)),
    PortDef::byte(0x088, "IDECOUNT", MRW, Some(0)),
    PortDef::byte(0x08C, "IDELBA0", MRW, Some(0)),
    PortDef::byte(0x090, "IDELBA1", MRW, Some(0)),
    PortDef::byte(0x094, "IDELBA2", MRW, Some(0)),
    PortDef::byte(0x098, "IDEDEV", MRW, Some(0)),
    PortDef::byte(0x09C, "IDECMD", MRW, Some(0)),
    PortDef::long(0x404, "IDEDMASH4", MRW, Some(0)),
    PortDef::long(0x408, "IDEDMASIZ", MRW, Some(0)),
    PortDef::long(0x40C, "IDEDMADIR", MRW, Some(0)),
    PortDef::long(0x414, "IDEDMACTL1", MRW, Some(0)),
    PortDef::long(0x418, "IDEDMACTL2", MRW, Some(0)),
    PortDef::long(0x4B8, "IDEDMACFG", MRW, Some(0)),
    PortDef::long(0x4E4, "IDEACTIVATE", MRW, Some(0)),
    PortDef::long(0x4F8, "IDEDMATXSIZ", MRW, Some(0)),
    PortDef::long(0x800, "G2DMA0EXT", MRW, Some(0)),
    PortDef::long(0x804, "G2DMA0SH4", MRW, Some(0)),
    PortDef::long(0x808, "G2DMA0SIZ", MRW, Some(0)),
    PortDef::long(0x80C, "G2DMA0DIR", MRW, Some(0)),
    PortDef::long(0x810, "G2DMA0MOD", MRW, Some(0)),
    PortDef::long(0x814, "G2DMA0CTL1", MRW, Some(0)),
    PortDef::long(0x818, "G2DMA0CTL2", MRW, Some(0)),
    PortDef::long(0x81C, "G2DMA0STOP", MRW, Some(0)),
    PortDef::long(0x820, "G2DMA1EXT", MRW, Some(0)),
    PortDef::long(0x824, "G2DMA1SH4", MRW, Some(0)),
    PortDef::long(0x828, "G2DMA1SIZ", MRW, Some(0)),
    PortDef::long(0x82C, "G2DMA1DIR", MRW, Some(0)),
    PortDef::long(0x830, "G2DMA1MOD", MRW, Some(0)),
    PortDef::long(0x834, "G2DMA1CTL1", MRW, Some(0)),
    PortDef::long(0x838, "G2DMA1CTL2", MRW, Some(0)),
    PortDef::long(0x83C, "G2DMA1STOP", MRW, Some(0)),
    PortDef::long(0x840, "G2DMA2EXT", MRW, Some(0)),
    PortDef::long(0x844, "G2DMA2SH4", MRW, Some(0)),
    PortDef::long(0x848, "G2DMA2SIZ", MRW, Some(0)),
    PortDef::long(0x84C, "G2DMA2DIR", MRW, Some(0)),
    PortDef::long(0x850, "G2DMA2MOD", MRW, Some(0)),
    PortDef::long(0x854, "G2DMA2CTL1", MRW, Some(0)),
    PortDef::long(0x858, "G2DMA2CTL2", MRW, Some(0)),
    PortDef::long(0x85C, "G2DMA2STOP", MRW, Some(0)),
    PortDef::long(0x860, "G2DMA3EXT", MRW, Some(0)),
    PortDef::long(0x864, "G2DMA3SH4", MRW, Some(0)),
    PortDef::long(0x868, "G2DMA3SIZ", MRW, Some(0)),
    PortDef::long(0x86C, "G2DMA3DIR", MRW, Some(0)),
    PortDef::long(0x870, "G2DMA3MOD", MRW, Some(0)),
    PortDef::long(0x874, "G2DMA3CTL1", MRW, Some(0)),
    PortDef::long(0x878, "G2DMA3CTL2", MRW, Some(0)),
    PortDef::long(0x87C, "G2DMA3STOP", MRW, Some(0)),
    PortDef::long(0x890, "SPUDMAWAIT", MRW, Some(0)),
    PortDef::long(0x8BC, "SPUDMACFG", MRW, Some(0)),
    PortDef::long(0xC00, "PVRDMA2EXT", MRW, Some(0)),
    PortDef::long(0xC04, "PVRDMA2SH4", MRW, Some(0)),
    PortDef::long(0xC08, "PVRDMA2SIZ", MRW, Some(0)),
    PortDef::long(0xC0C, "PVRDMA2DIR", MRW, Some(0)),
    PortDef::long(0xC10, "PVRDMA2MOD", MRW, Some(0)),
    PortDef::long(0xC14, "PVRDMA2CTL1", MRW, Some(0)),
    PortDef::long(0xC18, "PVRDMA2CTL2", MRW, Some(0)),
    PortDef::long(0xC80, "PVRDMA2CFG", MRW, Some(0)),
];

// G2 FIFO status bit choreography after a write (nanoseconds)
const G2_BIT5_TICKS: i64 = 60;
const G2_BIT4_TICKS: i64 = 160;
const G2_BIT0_ON_TICKS: i64 = 120;
const G2_BIT0_OFF_TICKS: i64 = 420;

/// The phased countdown timers behind the G2 FIFO status register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct G2State {
    bit5_off_timer: i64,
    bit4_on_timer: i64,
    bit4_off_timer: i64,
    bit0_on_timer: i64,
    bit0_off_timer: i64,
}

impl G2State {
    fn new() -> Self {
        Self {
            bit5_off_timer: -1,
            bit4_on_timer: -1,
            bit4_off_timer: -1,
            bit0_on_timer: -1,
            bit0_off_timer: -1,
        }
    }
}

/// ASIC module state (everything else lives in the register banks)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asic {
    /// G2 FIFO timing state
    pub g2: G2State,
    /// IDE interface enable latch (IDEACTIVATE)
    pub ide_enabled: bool,
}

impl Asic {
    /// Create the ASIC in reset state
    pub fn new() -> Self {
        Self { g2: G2State::new(), ide_enabled: false }
    }

    /// Reset: idle all FIFO timers, disable the IDE interface
    pub fn reset(&mut self) {
        self.g2 = G2State::new();
        self.ide_enabled = false;
    }
}

impl Default for Asic {
    fn default() -> Self {
        Self::new()
    }
}

/// Raise an ASIC event: set its pending bit, propagate cascades, and raise
/// any SH4 line whose mask now intersects the pending set.
pub fn asic_event(dc: &mut Dreamcast, event: usize) {
    let offset = ((event & 0x60) >> 3) as u32;
    let result = dc.bus.io_read32(MmioRegionId::Asic, PIRQ0 + offset) | (1 << (event & 0x1F));
    dc.bus.io_write32(MmioRegionId::Asic, PIRQ0 + offset, result);

    if result & dc.bus.io_read32(MmioRegionId::Asic, IRQA0 + offset) != 0 {
        dc.sh4.raise_interrupt(Interrupt::Irq13);
    }
    if result & dc.bus.io_read32(MmioRegionId::Asic, IRQB0 + offset) != 0 {
        dc.sh4.raise_interrupt(Interrupt::Irq11);
    }
    if result & dc.bus.io_read32(MmioRegionId::Asic, IRQC0 + offset) != 0 {
        dc.sh4.raise_interrupt(Interrupt::Irq9);
    }

    if event >= 64 {
        asic_event(dc, events::CASCADE2);
    } else if event >= 32 {
        asic_event(dc, events::CASCADE1);
    }
}

/// Clear an ASIC event from the device side (the IDE controller uses this),
/// dropping cascade bits when a high bank empties.
pub fn asic_clear_event(dc: &mut Dreamcast, event: usize) {
    let offset = ((event & 0x60) >> 3) as u32;
    let result = dc.bus.io_read32(MmioRegionId::Asic, PIRQ0 + offset) & !(1 << (event & 0x1F));
    dc.bus.io_write32(MmioRegionId::Asic, PIRQ0 + offset, result);
    if result == 0 {
        if event >= 64 {
            let pirq0 = dc.bus.io_read32(MmioRegionId::Asic, PIRQ0);
            dc.bus.io_write32(MmioRegionId::Asic, PIRQ0, pirq0 & 0x7FFF_FFFF);
        } else if event >= 32 {
            let pirq0 = dc.bus.io_read32(MmioRegionId::Asic, PIRQ0);
            dc.bus.io_write32(MmioRegionId::Asic, PIRQ0, pirq0 & 0xBFFF_FFFF);
        }
    }
    check_cleared_events(dc);
}

/// Rescan all banks against all masks and lower any SH4 line whose union of
/// pending-and-masked events is now empty
fn check_cleared_events(dc: &mut Dreamcast) {
    let mut set_a = 0u32;
    let mut set_b = 0u32;
    let mut set_c = 0u32;
    for i in 0..3 {
        let bits = dc.bus.io_read32(MmioRegionId::Asic, PIRQ0 + i * 4);
        set_a |= bits & dc.bus.io_read32(MmioRegionId::Asic, IRQA0 + i * 4);
        set_b |= bits & dc.bus.io_read32(MmioRegionId::Asic, IRQB0 + i * 4);
        set_c |= bits & dc.bus.io_read32(MmioRegionId::Asic, IRQC0 + i * 4);
    }
    if set_a == 0 {
        dc.sh4.clear_interrupt(Interrupt::Irq13);
    }
    if set_b == 0 {
        dc.sh4.clear_interrupt(Interrupt::Irq11);
    }
    if set_c == 0 {
        dc.sh4.clear_interrupt(Interrupt::Irq9);
    }
}

/// Advance the G2 FIFO timers by one slice
pub fn run_slice(dc: &mut Dreamcast, nanosecs: u32) -> u32 {
    g2_update_fifo_status(dc, nanosecs);
    let ns = i64::from(nanosecs);
    let g2 = &mut dc.asic.g2;
    for timer in [
        &mut g2.bit5_off_timer,
        &mut g2.bit4_on_timer,
        &mut g2.bit4_off_timer,
        &mut g2.bit0_on_timer,
        &mut g2.bit0_off_timer,
    ] {
        if *timer <= ns {
            *timer = -1;
        } else {
            *timer -= ns;
        }
    }
    nanosecs
}

/// Start the FIFO status choreography for one G2-bus write. Additional
/// writes while the FIFO is draining extend the time the bits stay high
/// without moving the initial transitions.
pub fn g2_write_word(dc: &mut Dreamcast) {
    let now = i64::from(dc.sh4.slice_cycle);
    let g2 = &mut dc.asic.g2;

    if g2.bit5_off_timer < now {
        g2.bit5_off_timer = now + G2_BIT5_TICKS;
    } else {
        g2.bit5_off_timer += G2_BIT5_TICKS;
    }

    if g2.bit4_on_timer < now {
        g2.bit4_on_timer = now + G2_BIT5_TICKS;
    }

    if g2.bit4_off_timer < now {
        g2.bit4_off_timer = g2.bit4_on_timer + G2_BIT4_TICKS;
    } else {
        g2.bit4_off_timer += G2_BIT4_TICKS;
    }

    if g2.bit0_on_timer < now {
        g2.bit0_on_timer = now + G2_BIT0_ON_TICKS;
    }

    if g2.bit0_off_timer < now {
        g2.bit0_off_timer = g2.bit0_on_timer + G2_BIT0_OFF_TICKS;
    } else {
        g2.bit0_off_timer += G2_BIT0_OFF_TICKS;
    }

    let status = dc.bus.io_read32(MmioRegionId::Asic, G2STATUS) | 0x20;
    dc.bus.io_write32(MmioRegionId::Asic, G2STATUS, status);
}

/// Fold expired timers into the status register as of time `nanos`
fn g2_update_fifo_status(dc: &mut Dreamcast, nanos: u32) -> u32 {
    let nanos = i64::from(nanos);
    let mut val = dc.bus.io_read32(MmioRegionId::Asic, G2STATUS);
    let g2 = &mut dc.asic.g2;
    if g2.bit5_off_timer >= 0 && g2.bit5_off_timer <= nanos {
        val &= !0x20;
        g2.bit5_off_timer = -1;
    }
    if g2.bit4_on_timer >= 0 && g2.bit4_on_timer <= nanos {
        val |= 0x10;
        g2.bit4_on_timer = -1;
    }
    if g2.bit4_off_timer >= 0 && g2.bit4_off_timer <= nanos {
        val &= !0x10;
        g2.bit4_off_timer = -1;
    }
    if g2.bit0_on_timer >= 0 && g2.bit0_on_timer <= nanos {
        val |= 0x01;
        g2.bit0_on_timer = -1;
    }
    if g2.bit0_off_timer >= 0 && g2.bit0_off_timer <= nanos {
        val &= !0x01;
        g2.bit0_off_timer = -1;
    }
    dc.bus.io_write32(MmioRegionId::Asic, G2STATUS, val);
    val
}

/// Run a G2 DMA channel if both control registers are armed. Both sides of
/// the copy use the standard bus primitives; the 29-bit length field bounds
/// the transfer.
fn g2_dma_transfer(dc: &mut Dreamcast, channel: usize) {
    let offset = (channel as u32) << 5;
    if dc.bus.io_read32(MmioRegionId::Extdma, G2DMA0CTL1 + offset) != 1 {
        return;
    }
    if dc.bus.io_read32(MmioRegionId::Extdma, G2DMA0CTL2 + offset) == 1 {
        let extaddr = dc.bus.io_read32(MmioRegionId::Extdma, G2DMA0EXT + offset);
        let sh4addr = dc.bus.io_read32(MmioRegionId::Extdma, G2DMA0SH4 + offset);
        let length = dc.bus.io_read32(MmioRegionId::Extdma, G2DMA0SIZ + offset) & 0x1FFF_FFFF;
        let dir = dc.bus.io_read32(MmioRegionId::Extdma, G2DMA0DIR + offset);
        let mut buf = vec![0u8; length as usize];
        if dir == 0 {
            // SH4 to device
            dc.bus.copy_from(sh4addr, &mut buf);
            dc.bus.copy_to(extaddr, &buf);
        } else {
            // Device to SH4
            dc.bus.copy_from(extaddr, &mut buf);
            dc.bus.copy_to(sh4addr, &buf);
        }
        log::debug!(
            "G2 DMA{}: {} bytes {} 0x{:08X} / 0x{:08X}",
            channel,
            length,
            if dir == 0 { "to device" } else { "to SH4" },
            extaddr,
            sh4addr
        );
        dc.bus.io_write32(MmioRegionId::Extdma, G2DMA0CTL2 + offset, 0);
        asic_event(dc, events::G2_DMA0 + channel);
    } else {
        dc.bus.io_write32(MmioRegionId::Extdma, G2DMA0CTL2 + offset, 0);
    }
}

/// Run the IDE DMA channel if both control registers are armed. Data comes
/// from the GD-ROM device capability.
fn ide_dma_transfer(dc: &mut Dreamcast) {
    if dc.bus.io_read32(MmioRegionId::Extdma, IDEDMACTL2) != 1 {
        return;
    }
    if dc.bus.io_read32(MmioRegionId::Extdma, IDEDMACTL1) == 1 {
        dc.bus.io_write32(MmioRegionId::Extdma, IDEDMATXSIZ, 0);

        let addr = dc.bus.io_read32(MmioRegionId::Extdma, IDEDMASH4);
        let length = dc.bus.io_read32(MmioRegionId::Extdma, IDEDMASIZ);
        let _dir = dc.bus.io_read32(MmioRegionId::Extdma, IDEDMADIR);

        let data = dc.gdrom.read_data_dma(length);
        dc.bus.copy_to(addr, &data);
        dc.bus.io_write32(MmioRegionId::Extdma, IDEDMATXSIZ, data.len() as u32);
        dc.bus.io_write32(MmioRegionId::Extdma, IDEDMACTL2, 0);
        asic_event(dc, events::IDE_DMA);
    } else {
        dc.bus.io_write32(MmioRegionId::Extdma, IDEDMACTL2, 0);
    }
}

/// Run the PVR DMA channel: pull the byte count from SH4 DMAC channel 2 and
/// push it through the PVR DMA window.
fn pvr_dma_transfer(dc: &mut Dreamcast) {
    let destaddr = dc.bus.io_read32(MmioRegionId::Asic, PVRDMADEST) & 0x1FFF_FFE0;
    let count = dc.bus.io_read32(MmioRegionId::Asic, PVRDMACNT);
    let data = dc.sh4.dmac_get_buffer(2, count, &dc.bus);
    if data.len() as u32 != count {
        log::warn!(
            "PVR received {:08X} bytes from DMA, expected {:08X}",
            data.len(),
            count
        );
    }

    crate::core::gpu::pvr2_dma_write(dc, destaddr, &data);

    dc.bus.io_write32(MmioRegionId::Asic, PVRDMACTL, 0);
    dc.bus.io_write32(MmioRegionId::Asic, PVRDMACNT, 0);
    if destaddr & 0x0100_0000 != 0 {
        // Write to texture RAM advances the destination
        dc.bus
            .io_write32(MmioRegionId::Asic, PVRDMADEST, destaddr + data.len() as u32);
    }
    asic_event(dc, events::PVR_DMA);
}

/// Behavioral write dispatch for the ASIC bank
pub(crate) fn mmio_asic_write(dc: &mut Dreamcast, offset: u32, val: u32) {
    match offset {
        PIRQ1 => { /* Treat this as read-only for the moment */ }
        PIRQ0 => {
            // Top two bits (the cascades) are not guest-clearable
            let val = val & 0x3FFF_FFFF;
            let cur = dc.bus.io_read32(MmioRegionId::Asic, PIRQ0);
            dc.bus.io_write32(MmioRegionId::Asic, PIRQ0, cur & !val);
            check_cleared_events(dc);
        }
        PIRQ2 => {
            let cur = dc.bus.io_read32(MmioRegionId::Asic, PIRQ2);
            let result = cur & !val;
            dc.bus.io_write32(MmioRegionId::Asic, PIRQ2, result);
            if result == 0 {
                // All clear: drop the cascade bit
                let pirq0 = dc.bus.io_read32(MmioRegionId::Asic, PIRQ0);
                dc.bus.io_write32(MmioRegionId::Asic, PIRQ0, pirq0 & 0x7FFF_FFFF);
            }
            check_cleared_events(dc);
        }
        SYSRESET => {
            if val == 0x7611 {
                dc.soft_reset();
                dc.sh4.new_pc = dc.sh4.pc;
            } else {
                log::warn!("Unknown value {:08X} written to SYSRESET port", val);
            }
        }
        MAPLE_STATE => {
            dc.bus.io_write32(MmioRegionId::Asic, MAPLE_STATE, val);
            if val & 1 != 0 {
                let maple_addr = dc.bus.io_read32(MmioRegionId::Asic, MAPLE_DMA_ADDR) & 0x1FFF_FFE0;
                maple::handle_buffer(dc, maple_addr);
                dc.bus.io_write32(MmioRegionId::Asic, MAPLE_STATE, 0);
            }
        }
        PVRDMADEST => {
            dc.bus
                .io_write32(MmioRegionId::Asic, offset, (val & 0x03FF_FFE0) | 0x1000_0000);
        }
        PVRDMACNT => {
            dc.bus.io_write32(MmioRegionId::Asic, offset, val & 0x00FF_FFE0);
        }
        PVRDMACTL => {
            let val = val & 0x01;
            dc.bus.io_write32(MmioRegionId::Asic, offset, val);
            if val == 1 {
                pvr_dma_transfer(dc);
            }
        }
        _ => dc.bus.io_write32(MmioRegionId::Asic, offset, val),
    }
}

/// Behavioral read dispatch for the ASIC bank
pub(crate) fn mmio_asic_read(dc: &mut Dreamcast, offset: u32) -> u32 {
    match offset {
        G2STATUS => {
            let now = dc.sh4.slice_cycle;
            g2_update_fifo_status(dc, now)
        }
        _ => dc.bus.io_read32(MmioRegionId::Asic, offset),
    }
}

#[inline]
fn is_ide_register(offset: u32) -> bool {
    offset < 0x100
}

/// Behavioral write dispatch for the EXTDMA bank
pub(crate) fn mmio_extdma_write(dc: &mut Dreamcast, offset: u32, val: u32) {
    if !dc.asic.ide_enabled && is_ide_register(offset) {
        return; // interface disabled
    }

    match offset {
        IDEDMASH4 => dc
            .bus
            .io_write32(MmioRegionId::Extdma, offset, val & 0x1FFF_FFE0),
        IDEDMASIZ => dc
            .bus
            .io_write32(MmioRegionId::Extdma, offset, val & 0x01FF_FFFE),
        IDEDMACTL1 | IDEDMACTL2 => {
            dc.bus.io_write32(MmioRegionId::Extdma, offset, val & 0x01);
            ide_dma_transfer(dc);
        }
        IDEACTIVATE => {
            if val == 0x001F_FFFF {
                dc.asic.ide_enabled = true;
            } else if val == 0x0000_42FE {
                dc.asic.ide_enabled = false;
            }
        }
        _ if (G2DMA0EXT..0x880).contains(&offset) => {
            let channel = ((offset - G2DMA0EXT) >> 5) as usize;
            let reg = offset & 0x1F | G2DMA0EXT;
            dc.bus.io_write32(MmioRegionId::Extdma, offset, val);
            if reg == G2DMA0CTL1 || reg == G2DMA0CTL2 {
                g2_dma_transfer(dc, channel);
            }
        }
        PVRDMA2CTL1 | PVRDMA2CTL2 => {
            if val != 0 {
                log::error!("Write to unimplemented DMA control register {:08X}", offset);
            }
        }
        _ => dc.bus.io_write32(MmioRegionId::Extdma, offset, val),
    }
}

/// Behavioral read dispatch for the EXTDMA bank
pub(crate) fn mmio_extdma_read(dc: &mut Dreamcast, offset: u32) -> u32 {
    if !dc.asic.ide_enabled && is_ide_register(offset) {
        return 0xFFFF_FFFF; // interface disabled
    }
    dc.bus.io_read32(MmioRegionId::Extdma, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::Dreamcast;

    const ASIC_BASE: u32 = 0x005F_6000;
    const EXTDMA_BASE: u32 = 0x005F_7000;

    #[test]
    fn test_event_raise_and_clear() {
        // Mask event 2 onto line A, raise it, clear it via a PIRQ0 write
        let mut dc = Dreamcast::new();
        dc.write32(ASIC_BASE + IRQA0, 0x0000_0004);
        asic_event(&mut dc, events::PVR_RENDER_DONE);
        assert_eq!(dc.read32(ASIC_BASE + PIRQ0), 0x0000_0004);
        assert!(dc.sh4.interrupt_asserted(Interrupt::Irq13));

        dc.write32(ASIC_BASE + PIRQ0, 0x0000_0004);
        assert_eq!(dc.read32(ASIC_BASE + PIRQ0), 0);
        assert!(!dc.sh4.interrupt_asserted(Interrupt::Irq13));
    }

    #[test]
    fn test_cascade_events() {
        let mut dc = Dreamcast::new();
        asic_event(&mut dc, 40);
        assert_eq!(dc.read32(ASIC_BASE + PIRQ1), 1 << 8);
        assert_ne!(dc.read32(ASIC_BASE + PIRQ0) & (1 << 30), 0);

        asic_event(&mut dc, 70);
        assert_eq!(dc.read32(ASIC_BASE + PIRQ2), 1 << 6);
        let pirq0 = dc.read32(ASIC_BASE + PIRQ0);
        assert_ne!(pirq0 & (1 << 31), 0);
        assert_ne!(pirq0 & (1 << 30), 0);
    }

    #[test]
    fn test_cascade_law() {
        // PIRQ0 bit 30 tracks PIRQ1 != 0, bit 31 tracks PIRQ2 != 0
        let mut dc = Dreamcast::new();
        for event in [33usize, 40, 64, 70, 2, 95] {
            asic_event(&mut dc, event);
        }
        asic_clear_event(&mut dc, 33);
        asic_clear_event(&mut dc, 40);
        let pirq0 = dc.read32(ASIC_BASE + PIRQ0);
        let pirq1 = dc.read32(ASIC_BASE + PIRQ1);
        let pirq2 = dc.read32(ASIC_BASE + PIRQ2);
        assert_eq!(pirq0 & (1 << 30) != 0, pirq1 != 0);
        assert_eq!(pirq0 & (1 << 31) != 0, pirq2 != 0);

        asic_clear_event(&mut dc, 64);
        asic_clear_event(&mut dc, 70);
        let pirq0 = dc.read32(ASIC_BASE + PIRQ0);
        let pirq2 = dc.read32(ASIC_BASE + PIRQ2);
        assert_eq!(pirq0 & (1 << 31) != 0, pirq2 != 0);
    }

    #[test]
    fn test_pirq0_write_cannot_clear_cascades() {
        let mut dc = Dreamcast::new();
        asic_event(&mut dc, 40);
        dc.write32(ASIC_BASE + PIRQ0, 0xFFFF_FFFF);
        // The cascade bit survives a direct clear attempt
        assert_ne!(dc.read32(ASIC_BASE + PIRQ0) & (1 << 30), 0);
    }

    #[test]
    fn test_g2_dma_transfer() {
        // Copy 256 bytes from system RAM to audio RAM via channel 0
        let mut dc = Dreamcast::new();
        for i in 0..64u32 {
            dc.write32(0x0C00_8000 + i * 4, 0x0101_0101u32.wrapping_mul(i + 1));
        }
        dc.write32(EXTDMA_BASE + G2DMA0EXT, 0x0080_0000);
        dc.write32(EXTDMA_BASE + G2DMA0SH4, 0x0C00_8000);
        dc.write32(EXTDMA_BASE + G2DMA0SIZ, 256);
        dc.write32(EXTDMA_BASE + G2DMA0DIR, 0);
        dc.write32(EXTDMA_BASE + G2DMA0CTL1, 1);
        dc.write32(EXTDMA_BASE + G2DMA0CTL2, 1);

        for i in 0..64u32 {
            assert_eq!(
                dc.read32(0x0080_0000 + i * 4),
                0x0101_0101u32.wrapping_mul(i + 1)
            );
        }
        // Trigger register clears and the completion event is pending
        assert_eq!(dc.read32(EXTDMA_BASE + G2DMA0CTL2), 0);
        assert_ne!(
            dc.read32(ASIC_BASE + PIRQ0) & (1 << events::G2_DMA0),
            0
        );
    }

    #[test]
    fn test_g2_fifo_choreography() {
        let mut dc = Dreamcast::new();
        dc.sh4.slice_cycle = 0;
        g2_write_word(&mut dc);
        // Bit 5 high immediately after the write
        assert_eq!(mmio_asic_read(&mut dc, G2STATUS) & 0x31, 0x20 & 0x31);

        // After 60ns bit 5 drops and bit 4 rises
        dc.sh4.slice_cycle = 60;
        let status = mmio_asic_read(&mut dc, G2STATUS);
        assert_eq!(status & 0x20, 0);
        assert_ne!(status & 0x10, 0);

        // After 120ns bit 0 rises; bit 4 drops at 60+160
        dc.sh4.slice_cycle = 130;
        let status = mmio_asic_read(&mut dc, G2STATUS);
        assert_ne!(status & 0x01, 0);
        assert_ne!(status & 0x10, 0);

        dc.sh4.slice_cycle = 250;
        let status = mmio_asic_read(&mut dc, G2STATUS);
        assert_eq!(status & 0x10, 0);
        assert_ne!(status & 0x01, 0);

        // Everything idle again past the bit-0 off time
        dc.sh4.slice_cycle = 600;
        let status = mmio_asic_read(&mut dc, G2STATUS);
        assert_eq!(status & 0x31, 0);
    }

    #[test]
    fn test_ide_registers_gated() {
        let mut dc = Dreamcast::new();
        // Disabled: reads float high, writes are dropped
        assert_eq!(mmio_extdma_read(&mut dc, 0x084), 0xFFFF_FFFF);
        mmio_extdma_write(&mut dc, 0x084, 0x12);

        dc.write32(EXTDMA_BASE + IDEACTIVATE, 0x001F_FFFF);
        assert!(dc.asic.ide_enabled);
        mmio_extdma_write(&mut dc, 0x084, 0x12);
        assert_eq!(mmio_extdma_read(&mut dc, 0x084) & 0xFF, 0x12);

        dc.write32(EXTDMA_BASE + IDEACTIVATE, 0x0000_42FE);
        assert!(!dc.asic.ide_enabled);
    }
}

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

//! MMIO region registry
//!
//! Each register bank is one 4 KiB page declared as a static table of typed
//! ports (offset, width, access flags, reset default, symbolic id). The
//! region owns a scratch backing page holding the current register values
//! plus a parallel snapshot page used for change detection in debug UIs.
//! Behavioral read/write hooks live with the owning module; the registry
//! only provides default storage, the port index, and reset replay.

use bitflags::bitflags;

use super::region::PAGE_SIZE;

bitflags! {
    /// Port access flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortFlags: u8 {
        /// Guest reads are legal
        const READ = 0b001;
        /// Guest writes are legal
        const WRITE = 0b010;
        /// Suppress access tracing for this port (high-traffic registers)
        const NOTRACE = 0b100;
    }
}

impl PortFlags {
    /// Plain readable/writable register
    pub const RW: PortFlags =
        PortFlags::from_bits_truncate(PortFlags::READ.bits() | PortFlags::WRITE.bits());
    /// Read-only register
    pub const R: PortFlags = PortFlags::READ;
    /// Write-only register
    pub const W: PortFlags = PortFlags::WRITE;
}

/// Static declaration of one register port
#[derive(Debug, Clone, Copy)]
pub struct PortDef {
    /// Byte offset within the 4 KiB bank
    pub offset: u16,
    /// Access width in bytes (1, 2 or 4)
    pub width: u8,
    /// Access flags
    pub flags: PortFlags,
    /// Reset default, or `None` for undefined-at-reset ports
    pub default: Option<u32>,
    /// Symbolic register name
    pub id: &'static str,
}

impl PortDef {
    /// Declare a 32-bit port
    pub const fn long(offset: u16, id: &'static str, flags: PortFlags, default: Option<u32>) -> Self {
        Self { offset, width: 4, flags, default, id }
    }

    /// Declare a 16-bit port
    pub const fn word(offset: u16, id: &'static str, flags: PortFlags, default: Option<u32>) -> Self {
        Self { offset, width: 2, flags, default, id }
    }

    /// Declare an 8-bit port
    pub const fn byte(offset: u16, id: &'static str, flags: PortFlags, default: Option<u32>) -> Self {
        Self { offset, width: 1, flags, default, id }
    }
}

/// Identity of a register bank, used to route behavioral dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioRegionId {
    /// System ASIC event/DMA registers (0x005F6000)
    Asic,
    /// External DMA / IDE registers (0x005F7000)
    Extdma,
    /// PVR2 core registers (0x005F8000)
    Pvr2,
    /// PVR2 CLUT palettes (0x005F9000)
    Pvr2Pal,
    /// PVR2 TA command port (0x10000000)
    Pvr2Ta,
    /// AICA channels 0-31 (0x00700000)
    Aica0,
    /// AICA channels 32-63 (0x00701000)
    Aica1,
    /// AICA control registers (0x00702000)
    Aica2,
}

/// A registered 4 KiB register bank
pub struct MmioRegion {
    /// Routing identity
    pub id: MmioRegionId,
    /// Base physical address
    pub base: u32,
    /// Human-readable bank name
    pub name: &'static str,
    /// The declared port table
    pub ports: &'static [PortDef],
    /// Current register values (the scratch page)
    mem: Vec<u8>,
    /// Snapshot taken at registration, for change detection
    save_mem: Vec<u8>,
    /// offset>>2 to port-table index, or -1
    index: Vec<i16>,
    /// Trace enable for the whole bank
    pub trace: bool,
}

impl MmioRegion {
    /// Build a region from its static port table and install the defaults
    pub fn new(id: MmioRegionId, base: u32, name: &'static str, ports: &'static [PortDef]) -> Self {
        let mut mem = vec![0u8; PAGE_SIZE as usize];
        let mut index = vec![-1i16; (PAGE_SIZE as usize) / 4];
        for (n, port) in ports.iter().enumerate() {
            index[(port.offset >> 2) as usize] = n as i16;
            if let Some(def) = port.default {
                let off = port.offset as usize;
                mem[off..off + 4].copy_from_slice(&def.to_le_bytes());
            }
        }
        let save_mem = mem.clone();
        Self { id, base, name, ports, mem, save_mem, index, trace: true }
    }

    /// Look up the port covering `offset`, if one is declared
    #[inline]
    pub fn port(&self, offset: u32) -> Option<&PortDef> {
        let slot = self.index[((offset & 0xFFF) >> 2) as usize];
        if slot < 0 {
            None
        } else {
            Some(&self.ports[slot as usize])
        }
    }

    /// Read a 32-bit value from the scratch page
    #[inline]
    pub fn read_32(&self, offset: u32) -> u32 {
        let off = (offset & 0xFFC) as usize;
        u32::from_le_bytes(self.mem[off..off + 4].try_into().unwrap())
    }

    /// Write a 32-bit value to the scratch page
    #[inline]
    pub fn write_32(&mut self, offset: u32, value: u32) {
        let off = (offset & 0xFFC) as usize;
        self.mem[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a 16-bit value from the scratch page
    #[inline]
    pub fn read_16(&self, offset: u32) -> u16 {
        let off = (offset & 0xFFE) as usize;
        u16::from_le_bytes(self.mem[off..off + 2].try_into().unwrap())
    }

    /// Write a 16-bit value to the scratch page
    #[inline]
    pub fn write_16(&mut self, offset: u32, value: u16) {
        let off = (offset & 0xFFE) as usize;
        self.mem[off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a byte from the scratch page
    #[inline]
    pub fn read_8(&self, offset: u32) -> u8 {
        self.mem[(offset & 0xFFF) as usize]
    }

    /// Write a byte to the scratch page
    #[inline]
    pub fn write_8(&mut self, offset: u32, value: u8) {
        self.mem[(offset & 0xFFF) as usize] = value;
    }

    /// The whole scratch page (save states)
    pub fn mem(&self) -> &[u8] {
        &self.mem
    }

    /// Replace the scratch page contents (save-state load)
    ///
    /// # Panics
    ///
    /// Panics if `data` is not exactly one page.
    pub fn restore_mem(&mut self, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE as usize);
        self.mem.copy_from_slice(data);
    }

    /// Refresh the change-detection snapshot
    pub fn snapshot(&mut self) {
        self.save_mem.copy_from_slice(&self.mem);
    }

    /// Offsets of ports whose value changed since the last snapshot
    pub fn changed_ports(&self) -> Vec<u32> {
        self.ports
            .iter()
            .filter(|p| {
                let off = p.offset as usize;
                self.mem[off..off + 4] != self.save_mem[off..off + 4]
            })
            .map(|p| p.offset as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PORTS: &[PortDef] = &[
        PortDef::long(0x000, "CTRL", PortFlags::RW, Some(0)),
        PortDef::long(0x004, "STAT", PortFlags::R, Some(0xB)),
        PortDef::long(0x900, "PEND", PortFlags::RW, Some(0)),
        PortDef::byte(0x084, "FEAT", PortFlags::RW, Some(0)),
        PortDef::long(0xC00, "RESET", PortFlags::RW, Some(1)),
        PortDef::long(0xC04, "ADDR", PortFlags::RW, None),
    ];

    fn test_region() -> MmioRegion {
        MmioRegion::new(MmioRegionId::Asic, 0x005F_6000, "Test Bank", TEST_PORTS)
    }

    #[test]
    fn test_defaults_installed() {
        let r = test_region();
        assert_eq!(r.read_32(0x000), 0);
        assert_eq!(r.read_32(0x004), 0xB);
        assert_eq!(r.read_32(0xC00), 1);
        // Undefined default reads as zero-initialized scratch
        assert_eq!(r.read_32(0xC04), 0);
    }

    #[test]
    fn test_port_index() {
        let r = test_region();
        assert_eq!(r.port(0x900).unwrap().id, "PEND");
        assert_eq!(r.port(0x084).unwrap().id, "FEAT");
        assert!(r.port(0x008).is_none());
    }

    #[test]
    fn test_scratch_round_trip() {
        let mut r = test_region();
        r.write_32(0x900, 0xDEAD_BEEF);
        assert_eq!(r.read_32(0x900), 0xDEAD_BEEF);
        r.write_16(0x084, 0x1234);
        assert_eq!(r.read_16(0x084), 0x1234);
        assert_eq!(r.read_8(0x084), 0x34);
    }

    #[test]
    fn test_change_detection() {
        let mut r = test_region();
        assert!(r.changed_ports().is_empty());
        r.write_32(0x900, 7);
        assert_eq!(r.changed_ports(), vec![0x900]);
        r.snapshot();
        assert!(r.changed_ports().is_empty());
    }
}

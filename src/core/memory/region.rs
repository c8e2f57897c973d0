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

//! Memory region records and page table entries
//!
//! A region is an owned contiguous byte buffer with a base address, size, a
//! symbolic name (used for save-state rebinding) and flags. Regions are
//! registered at init time; the bus page table is filled in for every page
//! they cover. A region may be installed repeatedly at several bases (the
//! 16 MiB system RAM is mirrored into four slots).

use bitflags::bitflags;

/// Pages are fixed at 4 KiB
pub const PAGE_BITS: u32 = 12;
/// Page size in bytes
pub const PAGE_SIZE: u32 = 1 << PAGE_BITS;
/// The physical address space is 29 bits (top 3 bits are the SH4 region
/// selector and are masked off before lookup)
pub const PHYS_MASK: u32 = 0x1FFF_FFFF;
/// Number of entries in the page table
pub const PAGE_TABLE_ENTRIES: usize = ((PHYS_MASK as usize) + 1) >> PAGE_BITS;

/// Well-known region names, used for save-state rebinding and cross-module
/// lookups (the ARM memory map finds sound RAM by name, the scene assembler
/// finds VRAM by name).
pub const MEM_REGION_MAIN: &str = "System RAM";
pub const MEM_REGION_VIDEO: &str = "Video RAM";
pub const MEM_REGION_AUDIO: &str = "Audio RAM";
pub const MEM_REGION_AUDIO_SCRATCH: &str = "Audio Scratch RAM";
pub const MEM_REGION_BIOS: &str = "Bios ROM";
pub const MEM_REGION_FLASH: &str = "Flash RAM";

bitflags! {
    /// Memory region attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionFlags: u32 {
        /// Region is present in the page map
        const MAPPED = 0b100;
        /// Writes are accepted (clear for ROM)
        const WRITABLE = 0b010;
        /// Accesses are traced at debug level
        const TRACE = 0b001;
    }
}

impl RegionFlags {
    /// Conventional flag set for a ROM region
    pub const ROM: RegionFlags = RegionFlags::MAPPED;
    /// Conventional flag set for a RAM region
    pub const RAM: RegionFlags =
        RegionFlags::from_bits_truncate(RegionFlags::MAPPED.bits() | RegionFlags::WRITABLE.bits());
}

/// An owned RAM or ROM buffer mapped into the physical address space
pub struct MemRegion {
    /// Symbolic name (stable across save states)
    pub name: &'static str,
    /// First base address the region was installed at
    pub base: u32,
    /// Size in bytes (multiple of the page size)
    pub size: u32,
    /// Attribute flags
    pub flags: RegionFlags,
    /// Backing storage
    pub mem: Vec<u8>,
}

impl MemRegion {
    /// Allocate a zero-filled region record
    ///
    /// # Panics
    ///
    /// Panics if `base` or `size` is not page aligned (registration bug, not
    /// a guest-reachable condition).
    pub fn new(name: &'static str, base: u32, size: u32, flags: RegionFlags) -> Self {
        assert_eq!(base & (PAGE_SIZE - 1), 0, "region base must be page aligned");
        assert_eq!(size & (PAGE_SIZE - 1), 0, "region size must be page aligned");
        Self {
            name,
            base,
            size,
            flags,
            mem: vec![0u8; size as usize],
        }
    }

    /// True if guest writes are accepted
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags.contains(RegionFlags::WRITABLE)
    }
}

/// One entry of the bus page table
///
/// A page index resolves in O(1) to either a direct RAM/ROM page or an MMIO
/// region. `Ram.page` is the page number *within* the region, so mirrored
/// installs of the same region work without address arithmetic at access
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry {
    /// No region covers this page
    Unmapped,
    /// Direct RAM/ROM page: `region` indexes the bus region table
    Ram {
        /// Index into the bus region table
        region: u16,
        /// Page number within the region
        page: u32,
    },
    /// MMIO page: index into the bus I/O region table
    Mmio(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_allocation() {
        let r = MemRegion::new(MEM_REGION_AUDIO, 0x0080_0000, 2 * 1024 * 1024, RegionFlags::RAM);
        assert_eq!(r.mem.len(), 2 * 1024 * 1024);
        assert!(r.is_writable());
        assert!(r.mem.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rom_region_not_writable() {
        let r = MemRegion::new(MEM_REGION_BIOS, 0, 2 * 1024 * 1024, RegionFlags::ROM);
        assert!(!r.is_writable());
    }

    #[test]
    #[should_panic]
    fn test_unaligned_base_rejected() {
        MemRegion::new("bogus", 0x100, PAGE_SIZE, RegionFlags::RAM);
    }

    #[test]
    fn test_page_table_entry_count() {
        // 29-bit space in 4 KiB pages
        assert_eq!(PAGE_TABLE_ENTRIES, 0x20000);
    }
}

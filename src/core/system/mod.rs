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

//! System integration: the central switchboard
//!
//! [`Dreamcast`] owns every module and pulls them together into a coherent
//! machine. The run loop advances the modules in registration order (leaves
//! first) by a shared time slice; any module may return a shorter slice to
//! surface a breakpoint or stop request. Behavioral MMIO dispatch lives
//! here too: the bus resolves an address to a register bank, and the
//! matching module function receives the whole machine so cross-module
//! effects (DMA, interrupts, resets) need no shared-pointer webs.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::core::aica::{self, Aica};
use crate::core::arm::Arm7;
use crate::core::asic::{self, events, Asic};
use crate::core::config::DEFAULT_TIMESLICE_LENGTH;
use crate::core::error::{EmulatorError, Result};
use crate::core::event::{EventQueue, NOT_SCHEDULED};
use crate::core::gpu::{self, DisplayDriver, NullDisplay, Pvr2};
use crate::core::maple::MapleBus;
use crate::core::memory::{
    Bus, MmioRegion, MmioRegionId, PageEntry, MEM_REGION_AUDIO, MEM_REGION_AUDIO_SCRATCH,
    MEM_REGION_BIOS, MEM_REGION_FLASH, MEM_REGION_MAIN, MEM_REGION_VIDEO,
};
use crate::core::sh4::Sh4;
use crate::core::stateio;
use crate::core::syscall::{self, SyscallState};

/// Save-state file magic
pub const SAVE_MAGIC: &[u8; 16] = b"DCRX-SAVE-STATE\0";
/// Save-state format version
pub const SAVE_VERSION: u32 = 1;

/// Upper bound on modules in a save state
const MAX_MODULES: usize = 32;

/// GD-ROM drive data source. The real drive is an external collaborator;
/// the default yields no data.
pub trait GdromDevice {
    /// Produce up to `length` bytes for an IDE DMA transfer
    fn read_data_dma(&mut self, _length: u32) -> Vec<u8> {
        Vec::new()
    }
}

/// Driveless default
pub struct NullGdrom;

impl GdromDevice for NullGdrom {}

/// Current state of the virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Stopped,
    Running,
    Stopping,
}

/// Identifies one registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleId {
    /// The event queue
    EventQueue,
    /// The memory framework
    Mem,
    /// SH4 contract surface (event dispatch driver)
    Sh4,
    /// System ASIC
    Asic,
    /// PVR2 video
    Pvr2,
    /// AICA sound (hosts the ARM)
    Aica,
    /// Maple bus
    Maple,
    /// IDE/GD-ROM interface
    Ide,
}

impl ModuleId {
    /// Stable module name used in save states
    pub fn name(self) -> &'static str {
        match self {
            ModuleId::EventQueue => "EVENTQ",
            ModuleId::Mem => "MEM",
            ModuleId::Sh4 => "SH4",
            ModuleId::Asic => "ASIC",
            ModuleId::Pvr2 => "PVR2",
            ModuleId::Aica => "AICA",
            ModuleId::Maple => "Maple",
            ModuleId::Ide => "IDE",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            ModuleId::EventQueue,
            ModuleId::Mem,
            ModuleId::Sh4,
            ModuleId::Asic,
            ModuleId::Pvr2,
            ModuleId::Aica,
            ModuleId::Maple,
            ModuleId::Ide,
        ]
        .into_iter()
        .find(|id| id.name() == name)
    }
}

/// The Dreamcast virtual machine
///
/// # Example
///
/// ```
/// use dcrx::core::system::Dreamcast;
///
/// let mut dc = Dreamcast::new();
/// dc.write32(0x0C00_0000, 0x1234_5678);
/// assert_eq!(dc.read32(0x8C00_0000), 0x1234_5678);
/// dc.run_for(0, 2_000_000);
/// ```
pub struct Dreamcast {
    /// Memory bus (pure storage)
    pub bus: Bus,
    /// Event queue
    pub events: EventQueue,
    /// SH4 shared state
    pub sh4: Sh4,
    /// System ASIC
    pub asic: Asic,
    /// PVR2 video
    pub pvr2: Pvr2,
    /// AICA sound shell
    pub aica: Aica,
    /// Maple bus
    pub maple: MapleBus,
    /// Syscall hook table and handler state
    pub syscall: SyscallState,
    /// GD-ROM data source
    pub gdrom: Box<dyn GdromDevice>,
    /// Display back end
    pub display: Box<dyn DisplayDriver>,

    modules: Vec<ModuleId>,
    state: RunState,
    timeslice_length: u32,
}

impl Dreamcast {
    /// Construct and wire the whole machine: standard memory map, register
    /// banks, module registration in dependency order, then a full reset.
    pub fn new() -> Self {
        let mut bus = Bus::new();

        // Standard memory map
        bus.create_repeating_ram_region(
            0x0C00_0000,
            16 * 1024 * 1024,
            MEM_REGION_MAIN,
            0x0100_0000,
            0x0F00_0000,
        );
        bus.create_ram_region(0x0080_0000, 2 * 1024 * 1024, MEM_REGION_AUDIO);
        bus.create_ram_region(0x0070_3000, 8 * 1024, MEM_REGION_AUDIO_SCRATCH);
        bus.create_ram_region(0x0500_0000, 8 * 1024 * 1024, MEM_REGION_VIDEO);
        bus.create_rom_region(0x0000_0000, 2 * 1024 * 1024, MEM_REGION_BIOS);
        bus.create_ram_region(0x0020_0000, 128 * 1024, MEM_REGION_FLASH);

        // Register banks
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Asic,
            0x005F_6000,
            "System ASIC",
            asic::ASIC_PORTS,
        ));
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Extdma,
            0x005F_7000,
            "ASIC External DMA",
            asic::EXTDMA_PORTS,
        ));
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Pvr2,
            0x005F_8000,
            "Power VR/2",
            gpu::PVR2_PORTS,
        ));
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Pvr2Pal,
            0x005F_9000,
            "Power VR/2 CLUT Palettes",
            gpu::PVR2PAL_PORTS,
        ));
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Pvr2Ta,
            0x1000_0000,
            "Power VR/2 TA Command port",
            gpu::PVR2TA_PORTS,
        ));
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Aica0,
            0x0070_0000,
            "AICA Sound System 0-31",
            aica::AICA0_PORTS,
        ));
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Aica1,
            0x0070_1000,
            "AICA Sound System 32-63",
            aica::AICA1_PORTS,
        ));
        bus.register_io_region(MmioRegion::new(
            MmioRegionId::Aica2,
            0x0070_2000,
            "AICA Sound System Control",
            aica::AICA2_PORTS,
        ));
        // Channel banks are written constantly; keep them out of the trace
        bus.io_region_mut(MmioRegionId::Aica0).trace = false;
        bus.io_region_mut(MmioRegionId::Aica1).trace = false;

        let mut dc = Self {
            bus,
            events: EventQueue::new(),
            sh4: Sh4::new(),
            asic: Asic::new(),
            pvr2: Pvr2::new(),
            aica: Aica::new(),
            maple: MapleBus::new(),
            syscall: SyscallState::new(),
            gdrom: Box::new(NullGdrom),
            display: Box::new(NullDisplay),
            modules: vec![
                ModuleId::EventQueue,
                ModuleId::Mem,
                ModuleId::Sh4,
                ModuleId::Asic,
                ModuleId::Pvr2,
                ModuleId::Aica,
                ModuleId::Maple,
                ModuleId::Ide,
            ],
            state: RunState::Stopped,
            timeslice_length: DEFAULT_TIMESLICE_LENGTH,
        };
        dc.reset();
        dc
    }

    /// Load the boot ROM image
    pub fn load_bios(&mut self, path: &str) -> Result<()> {
        self.bus.load_rom(path, 0x0000_0000)
    }

    /// Load the flash image (missing file leaves flash zeroed)
    pub fn load_flash(&mut self, path: &str) {
        self.bus.load_block(path, 0x0020_0000);
    }

    /// Replace the display back end
    pub fn set_display_driver(&mut self, driver: Box<dyn DisplayDriver>) {
        self.display = driver;
    }

    /// Replace the GD-ROM data source
    pub fn set_gdrom_device(&mut self, device: Box<dyn GdromDevice>) {
        self.gdrom = device;
    }

    /// Override the scheduler time slice
    pub fn set_timeslice(&mut self, nanosecs: u32) {
        self.timeslice_length = nanosecs.max(1);
    }

    // ----- run control ---------------------------------------------------

    /// True while the run loop is active
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Mark the machine running (the run loop does this itself; tests and
    /// embedders driving slices by hand call it directly)
    pub fn start(&mut self) {
        self.state = RunState::Running;
    }

    /// Request a stop; the run loop exits after the current slice
    pub fn stop(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Stopping;
        }
    }

    /// Reset every module into its initial boot state and re-patch any
    /// installed syscall vectors
    pub fn reset(&mut self) {
        for module in self.modules.clone() {
            self.module_reset(module);
        }
        syscall::repatch_vectors(self);
    }

    /// Soft reset triggered from the guest side (ASIC SYSRESET)
    pub(crate) fn soft_reset(&mut self) {
        log::info!("System soft reset");
        self.reset();
    }

    /// Run until stopped
    pub fn run(&mut self) {
        self.state = RunState::Running;
        while self.state == RunState::Running {
            self.run_time_slice();
        }
        self.state = RunState::Stopped;
    }

    /// Run for the given virtual duration
    pub fn run_for(&mut self, seconds: u32, nanosecs: u32) {
        self.state = RunState::Running;
        let mut seconds = seconds;
        let mut nanos: u64 = 0;
        if nanosecs != 0 {
            nanos = u64::from(1_000_000_000 - nanosecs);
            seconds += 1;
        }
        while self.state == RunState::Running && seconds != 0 {
            let ran = self.run_time_slice();
            nanos += u64::from(ran);
            if nanos >= 1_000_000_000 {
                nanos -= 1_000_000_000;
                seconds -= 1;
            }
        }
        self.state = RunState::Stopped;
    }

    /// Advance every module by one time slice. Each module may shorten the
    /// slice for those after it; the consumed length is returned.
    pub fn run_time_slice(&mut self) -> u32 {
        let mut time_to_run = self.timeslice_length;
        for module in self.modules.clone() {
            time_to_run = self.module_run_slice(module, time_to_run);
        }
        time_to_run
    }

    fn module_reset(&mut self, module: ModuleId) {
        match module {
            ModuleId::EventQueue => self.events.reset(),
            ModuleId::Mem => {
                // Replay every declared register default through the
                // behavioral write hooks
                for (id, offset, value) in self.bus.collect_mmio_defaults() {
                    self.mmio_write32(id, offset, value);
                }
            }
            ModuleId::Sh4 => self.sh4.reset(),
            ModuleId::Asic => self.asic.reset(),
            ModuleId::Pvr2 => gpu::reset(self),
            ModuleId::Aica => self.aica.reset(),
            ModuleId::Maple | ModuleId::Ide => {}
        }
    }

    fn module_run_slice(&mut self, module: ModuleId, nanosecs: u32) -> u32 {
        match module {
            ModuleId::EventQueue => self.events.run_slice(nanosecs),
            ModuleId::Sh4 => self.sh4_run_slice(nanosecs),
            ModuleId::Asic => asic::run_slice(self, nanosecs),
            ModuleId::Pvr2 => gpu::run_slice(self, nanosecs),
            ModuleId::Aica => aica::run_slice(self, nanosecs),
            ModuleId::Mem | ModuleId::Maple | ModuleId::Ide => nanosecs,
        }
    }

    /// Drive the slice clock forward, firing due events in order. With the
    /// interpreter external, this stands in for the SH4's execution of the
    /// slice as far as virtual time is concerned.
    fn sh4_run_slice(&mut self, nanosecs: u32) -> u32 {
        self.sh4.slice_cycle = 0;
        let mut dispatched = 0;
        loop {
            let next = self.events.next_time();
            if next == NOT_SCHEDULED || next > nanosecs {
                break;
            }
            if next > self.sh4.slice_cycle {
                self.sh4.slice_cycle = next;
            }
            // Re-read the queue head after every handler; handlers
            // commonly re-schedule the id that just fired
            while let Some(id) = self.events.pop_due(self.sh4.slice_cycle) {
                self.dispatch_event(id);
                dispatched += 1;
                if dispatched > 10_000 {
                    log::error!("Event storm within one slice, abandoning dispatch");
                    self.sh4.slice_cycle = nanosecs;
                    self.sync_event_pending();
                    return nanosecs;
                }
            }
        }
        self.sh4.slice_cycle = nanosecs;
        self.sync_event_pending();
        nanosecs
    }

    // ----- event queue plumbing ------------------------------------------

    /// Schedule an event `nanos` nanoseconds from the current slice cycle
    pub fn event_schedule(&mut self, id: usize, nanos: u32) {
        self.events.schedule(id, nanos, self.sh4.slice_cycle);
        self.sync_event_pending();
    }

    /// Schedule an event seconds away
    pub fn event_schedule_long(&mut self, id: usize, seconds: u32, nanos: u32) {
        self.events
            .schedule_long(id, seconds, nanos, self.sh4.slice_cycle);
        self.sync_event_pending();
    }

    /// Cancel a pending event
    pub fn event_cancel(&mut self, id: usize) {
        self.events.cancel(id);
        self.sync_event_pending();
    }

    fn sync_event_pending(&mut self) {
        self.sh4.set_next_event(self.events.next_time());
    }

    /// Route a fired event to its owner. Events 0..96 are ASIC events; the
    /// scanline/hpos ids are intercepted by the PVR2 module, which raises
    /// the ASIC event itself and re-arms.
    fn dispatch_event(&mut self, id: usize) {
        match id {
            events::SCANLINE1 | events::SCANLINE2 => gpu::scanline_callback(self, id),
            events::RETRACE => gpu::hpos_callback(self, id),
            0..=95 => asic::asic_event(self, id),
            _ => log::debug!("Event {} fired with no handler", id),
        }
    }

    /// Invoke a syscall hook (the SH4 interpreter calls this on executing
    /// a sentinel instruction word)
    pub fn syscall_invoke(&mut self, hook_id: u32) {
        syscall::invoke(self, hook_id);
    }

    // ----- guest memory access (with MMIO dispatch) ----------------------

    /// 32-bit guest read with behavioral MMIO dispatch
    pub fn read32(&mut self, addr: u32) -> u32 {
        match self.bus.page(addr) {
            PageEntry::Mmio(idx) => {
                let id = self.bus_io_id(idx);
                self.mmio_read32(id, addr & 0xFFF)
            }
            _ => self.bus.read32(addr),
        }
    }

    /// 16-bit guest read
    pub fn read16(&mut self, addr: u32) -> u16 {
        match self.bus.page(addr) {
            PageEntry::Mmio(idx) => {
                let id = self.bus_io_id(idx);
                let value = self.mmio_read32(id, addr & 0xFFC);
                (value >> ((addr & 0x2) * 8)) as u16
            }
            _ => self.bus.read16(addr),
        }
    }

    /// 8-bit guest read
    pub fn read8(&mut self, addr: u32) -> u8 {
        match self.bus.page(addr) {
            PageEntry::Mmio(idx) => {
                let id = self.bus_io_id(idx);
                let value = self.mmio_read32(id, addr & 0xFFC);
                (value >> ((addr & 0x3) * 8)) as u8
            }
            _ => self.bus.read8(addr),
        }
    }

    /// 32-bit guest write with behavioral MMIO dispatch
    pub fn write32(&mut self, addr: u32, value: u32) {
        match self.bus.page(addr) {
            PageEntry::Mmio(idx) => {
                let id = self.bus_io_id(idx);
                self.mmio_write32(id, addr & 0xFFF, value);
            }
            _ => self.bus.write32(addr, value),
        }
    }

    /// 16-bit guest write. Register banks take the value through the
    /// 32-bit hook at the port's word address.
    pub fn write16(&mut self, addr: u32, value: u16) {
        match self.bus.page(addr) {
            PageEntry::Mmio(idx) => {
                let id = self.bus_io_id(idx);
                self.mmio_write32(id, addr & 0xFFC, u32::from(value));
            }
            _ => self.bus.write16(addr, value),
        }
    }

    /// 8-bit guest write
    pub fn write8(&mut self, addr: u32, value: u8) {
        match self.bus.page(addr) {
            PageEntry::Mmio(idx) => {
                let id = self.bus_io_id(idx);
                self.mmio_write32(id, addr & 0xFFC, u32::from(value));
            }
            _ => self.bus.write8(addr, value),
        }
    }

    fn bus_io_id(&self, idx: u16) -> MmioRegionId {
        self.bus.io_id(idx)
    }

    /// Trace one register access, honouring the bank and per-port gates
    fn trace_mmio(&self, id: MmioRegionId, offset: u32, value: u32, write: bool) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let region = self.bus.io_region(id);
        if !region.trace {
            return;
        }
        let port = region.port(offset);
        if port.is_some_and(|p| p.flags.contains(crate::core::memory::PortFlags::NOTRACE)) {
            return;
        }
        let name = port.map_or("<unknown>", |p| p.id);
        if write {
            log::trace!("{}: 0x{:08X} => {}", region.name, value, name);
        } else {
            log::trace!("{}: 0x{:08X} <= {}", region.name, value, name);
        }
    }

    fn mmio_write32(&mut self, id: MmioRegionId, offset: u32, value: u32) {
        self.trace_mmio(id, offset, value, true);
        match id {
            MmioRegionId::Asic => asic::mmio_asic_write(self, offset, value),
            MmioRegionId::Extdma => asic::mmio_extdma_write(self, offset, value),
            MmioRegionId::Pvr2 => gpu::mmio_pvr2_write(self, offset, value),
            MmioRegionId::Pvr2Pal => gpu::mmio_pvr2pal_write(self, offset, value),
            MmioRegionId::Pvr2Ta => gpu::mmio_pvr2ta_write(self, offset, value),
            MmioRegionId::Aica0 => aica::mmio_aica0_write(self, offset, value),
            MmioRegionId::Aica1 => aica::mmio_aica1_write(self, offset, value),
            MmioRegionId::Aica2 => aica::mmio_aica2_write(self, offset, value),
        }
    }

    fn mmio_read32(&mut self, id: MmioRegionId, offset: u32) -> u32 {
        let value = match id {
            MmioRegionId::Asic => asic::mmio_asic_read(self, offset),
            MmioRegionId::Extdma => asic::mmio_extdma_read(self, offset),
            MmioRegionId::Pvr2 => gpu::mmio_pvr2_read(self, offset),
            MmioRegionId::Pvr2Ta => gpu::mmio_pvr2ta_read(self, offset),
            MmioRegionId::Pvr2Pal
            | MmioRegionId::Aica0
            | MmioRegionId::Aica1
            | MmioRegionId::Aica2 => self.bus.io_read32(id, offset),
        };
        self.trace_mmio(id, offset, value, false);
        value
    }

    // ----- save states ---------------------------------------------------

    fn module_save(&self, module: ModuleId) -> Result<Option<Vec<u8>>> {
        let config = bincode::config::standard();
        let encode = |e: bincode::error::EncodeError| {
            EmulatorError::SaveStateCorrupt(format!("encode failed: {e}"))
        };
        Ok(match module {
            ModuleId::EventQueue => {
                Some(bincode::serde::encode_to_vec(&self.events, config).map_err(encode)?)
            }
            ModuleId::Mem => {
                let mut buf = Vec::new();
                self.bus.save_state(&mut buf)?;
                Some(buf)
            }
            ModuleId::Sh4 => {
                Some(bincode::serde::encode_to_vec(&self.sh4, config).map_err(encode)?)
            }
            ModuleId::Asic => {
                Some(bincode::serde::encode_to_vec(&self.asic, config).map_err(encode)?)
            }
            ModuleId::Pvr2 => {
                Some(bincode::serde::encode_to_vec(&self.pvr2, config).map_err(encode)?)
            }
            ModuleId::Aica => {
                Some(bincode::serde::encode_to_vec(&self.aica.arm, config).map_err(encode)?)
            }
            ModuleId::Maple | ModuleId::Ide => None,
        })
    }

    fn module_load(&mut self, module: ModuleId, data: &[u8]) -> Result<()> {
        let config = bincode::config::standard();
        let decode = |module: ModuleId| {
            move |e: bincode::error::DecodeError| {
                EmulatorError::SaveStateCorrupt(format!("{} failed: {e}", module.name()))
            }
        };
        match module {
            ModuleId::EventQueue => {
                let (events, _): (EventQueue, _) =
                    bincode::serde::decode_from_slice(data, config).map_err(decode(module))?;
                self.events = events;
            }
            ModuleId::Mem => self.bus.load_state(&mut &data[..])?,
            ModuleId::Sh4 => {
                let (sh4, _): (Sh4, _) =
                    bincode::serde::decode_from_slice(data, config).map_err(decode(module))?;
                self.sh4 = sh4;
            }
            ModuleId::Asic => {
                let (asic, _): (Asic, _) =
                    bincode::serde::decode_from_slice(data, config).map_err(decode(module))?;
                self.asic = asic;
            }
            ModuleId::Pvr2 => {
                let (pvr2, _): (Pvr2, _) =
                    bincode::serde::decode_from_slice(data, config).map_err(decode(module))?;
                self.pvr2 = pvr2;
            }
            ModuleId::Aica => {
                let (arm, _): (Arm7, _) =
                    bincode::serde::decode_from_slice(data, config).map_err(decode(module))?;
                self.aica.arm = arm;
            }
            ModuleId::Maple | ModuleId::Ide => {}
        }
        Ok(())
    }

    /// Write a save state: fixed header, then one `BLCK` per module that
    /// carries state
    pub fn save_state(&mut self, w: &mut dyn Write) -> Result<()> {
        let mut blocks = Vec::new();
        for module in &self.modules {
            if let Some(data) = self.module_save(*module)? {
                blocks.push((*module, data));
            }
        }

        w.write_all(SAVE_MAGIC)?;
        stateio::write_u32(w, SAVE_VERSION)?;
        stateio::write_u32(w, blocks.len() as u32)?;
        for (module, data) in blocks {
            w.write_all(b"BLCK")?;
            stateio::write_string(w, module.name())?;
            stateio::write_block(w, &data)?;
        }
        Ok(())
    }

    /// Load a save state written by [`Dreamcast::save_state`]. The whole
    /// stream is parsed and validated before any module state is replaced;
    /// modules without a block in the file are reset.
    pub fn load_state(&mut self, r: &mut dyn Read) -> Result<()> {
        let mut magic = [0u8; 16];
        r.read_exact(&mut magic)?;
        if &magic != SAVE_MAGIC {
            return Err(EmulatorError::SaveStateCorrupt(
                "not a dcrx save state file".to_string(),
            ));
        }
        let version = stateio::read_u32(r)?;
        if version != SAVE_VERSION {
            return Err(EmulatorError::SaveStateVersion {
                got: version,
                expected: SAVE_VERSION,
            });
        }
        let count = stateio::read_u32(r)? as usize;
        if count > MAX_MODULES {
            return Err(EmulatorError::SaveStateCorrupt(
                "bad module count".to_string(),
            ));
        }

        // Parse every block up front so a truncated file fails before any
        // state is touched
        let mut blocks = Vec::with_capacity(count);
        for i in 0..count {
            let mut marker = [0u8; 4];
            r.read_exact(&mut marker)?;
            if &marker != b"BLCK" {
                return Err(EmulatorError::SaveStateCorrupt(format!(
                    "missing block header {i}"
                )));
            }
            let name = stateio::read_string(r)?;
            let module = ModuleId::from_name(&name).ok_or_else(|| {
                EmulatorError::SaveStateCorrupt(format!("unrecognized section {name}"))
            })?;
            let data = stateio::read_block(r, 64 * 1024 * 1024)?;
            blocks.push((module, data));
        }

        let mut have_read = Vec::new();
        for (module, data) in &blocks {
            self.module_load(*module, data)?;
            have_read.push(*module);
        }

        // Modules with no saved state drop back to their reset state
        for module in self.modules.clone() {
            if !have_read.contains(&module) {
                self.module_reset(module);
            }
        }

        log::info!("Save state loaded ({} modules)", have_read.len());
        Ok(())
    }

    /// Save state to a file
    pub fn save_state_file(&mut self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        self.save_state(&mut file)?;
        log::info!("Save state written to {}", path.display());
        Ok(())
    }

    /// Load state from a file
    pub fn load_state_file(&mut self, path: &Path) -> Result<()> {
        let mut file = File::open(path)?;
        self.load_state(&mut file)
    }
}

impl Default for Dreamcast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asic::events;

    #[test]
    fn test_construction_maps_everything() {
        let mut dc = Dreamcast::new();
        // RAM, VRAM, audio RAM reachable
        dc.write32(0x0C00_0000, 1);
        dc.write32(0x0500_0000, 2);
        dc.write32(0x0080_0000, 3);
        assert_eq!(dc.read32(0x0C00_0000), 1);
        // Register defaults visible through the dispatch path
        assert_eq!(dc.read32(0x005F_8000), 0x17FD_11DB); // PVRID
        assert_eq!(dc.read32(0x0070_2C00) & 1, 1); // AICA_RESET
    }

    #[test]
    fn test_reset_idempotence() {
        // Resetting twice must equal resetting once
        let mut dc = Dreamcast::new();
        dc.write32(0x005F_6910, 0xFF); // IRQA0 mask
        dc.reset();
        let mut once = Vec::new();
        dc.save_state(&mut once).unwrap();

        dc.reset();
        let mut twice = Vec::new();
        dc.save_state(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_run_for_terminates() {
        let mut dc = Dreamcast::new();
        dc.run_for(0, 5_000_000);
        // 5 slices of 1 ms
        assert!(!dc.is_running());
    }

    #[test]
    fn test_event_fires_during_slice() {
        let mut dc = Dreamcast::new();
        dc.event_schedule(events::MAPLE_ERR, 500_000);
        dc.start();
        dc.run_time_slice();
        assert_ne!(
            dc.read32(0x005F_6000 + 0x900) & (1 << events::MAPLE_ERR),
            0
        );
    }

    #[test]
    fn test_event_beyond_slice_waits() {
        let mut dc = Dreamcast::new();
        dc.event_schedule(events::MAPLE_ERR, 2_500_000);
        dc.start();
        dc.run_time_slice();
        assert_eq!(dc.read32(0x005F_6000 + 0x900) & (1 << events::MAPLE_ERR), 0);
        dc.run_time_slice();
        dc.run_time_slice();
        assert_ne!(dc.read32(0x005F_6000 + 0x900) & (1 << events::MAPLE_ERR), 0);
    }

    #[test]
    fn test_stop_exits_run_loop() {
        let mut dc = Dreamcast::new();
        dc.event_schedule(events::MAPLE_ERR, 100);
        dc.start();
        dc.stop();
        assert!(!dc.is_running());
    }

    #[test]
    fn test_save_state_round_trip() {
        let mut dc = Dreamcast::new();
        dc.write32(0x0C12_3400, 0xFEED_F00D);
        dc.sh4.r[4] = 0x42;
        dc.aica.arm.r[3] = 0x77;
        asic::asic_event(&mut dc, 40);
        dc.event_schedule(7, 123_456);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.dcrx");
        dc.save_state_file(&path).unwrap();

        let mut other = Dreamcast::new();
        other.load_state_file(&path).unwrap();
        assert_eq!(other.read32(0x0C12_3400), 0xFEED_F00D);
        assert_eq!(other.sh4.r[4], 0x42);
        assert_eq!(other.aica.arm.r[3], 0x77);
        assert_ne!(other.read32(0x005F_6000 + 0x904), 0);
        assert!(other.events.is_scheduled(7));
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let mut dc = Dreamcast::new();
        let data = vec![0u8; 64];
        assert!(matches!(
            dc.load_state(&mut data.as_slice()),
            Err(EmulatorError::SaveStateCorrupt(_))
        ));
    }

    #[test]
    fn test_load_rejects_bad_version() {
        let mut dc = Dreamcast::new();
        let mut data = Vec::new();
        dc.save_state(&mut data).unwrap();
        data[16] = 0xEE; // corrupt the version field
        assert!(matches!(
            dc.load_state(&mut data.as_slice()),
            Err(EmulatorError::SaveStateVersion { .. })
        ));
    }

    #[test]
    fn test_load_rejects_truncated() {
        let mut dc = Dreamcast::new();
        let mut data = Vec::new();
        dc.save_state(&mut data).unwrap();
        data.truncate(data.len() / 2);
        assert!(dc.load_state(&mut data.as_slice()).is_err());
    }

    #[test]
    fn test_sysreset_register() {
        let mut dc = Dreamcast::new();
        dc.write32(0x005F_6910, 0x0000_00FF); // IRQA0 mask
        dc.sh4.pc = 0x8C01_0000;
        dc.write32(0x005F_6000 + 0x8A0, 0x7611);
        // Reset replayed the mask default and resynchronised new_pc
        assert_eq!(dc.read32(0x005F_6910), 0);
        assert_eq!(dc.sh4.new_pc, dc.sh4.pc);
        // A junk value is ignored
        dc.write32(0x005F_6910, 0x0000_00FF);
        dc.write32(0x005F_6000 + 0x8A0, 0x1234);
        assert_eq!(dc.read32(0x005F_6910), 0x0000_00FF);
    }

    #[test]
    fn test_unmapped_access_through_dispatch() {
        let mut dc = Dreamcast::new();
        assert_eq!(dc.read32(0x1800_0000), 0);
        dc.write32(0x1800_0000, 0xFFFF_FFFF);
        assert_eq!(dc.read32(0x1800_0000), 0);
    }
}

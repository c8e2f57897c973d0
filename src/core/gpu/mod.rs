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

//! PVR2 (video chip) front end
//!
//! Owns the PVR2 register bank (every register carries its exact
//! writable-bit mask), the raster beam state machine driving the scanline
//! and hpos events, the shell tile accelerator, and the scene assembler in
//! [`scene`]. Writing the render-start register parses the current VRAM
//! scene and hands it to the display driver; the back end that turns a
//! scene into pixels is an external collaborator behind [`DisplayDriver`].

use serde::{Deserialize, Serialize};

use crate::core::asic::{self, events};
use crate::core::memory::{vram, MmioRegionId, PortDef, PortFlags};
use crate::core::system::Dreamcast;

pub mod scene;

pub use scene::{ParseReport, Polygon, RenderRegs, Scene, SortMode, ShadowMode, Vertex};

/// Base of the 32-bit VRAM window in the SH4 map
pub const PVR2_RAM_BASE: u32 = 0x0500_0000;
/// Base of the interleaved (64-bit) VRAM window
pub const PVR2_RAM_BASE_INT: u32 = 0x0400_0000;
/// VRAM size
pub const PVR2_RAM_SIZE: u32 = 8 * 1024 * 1024;

/// Pixel clock in kHz
const PVR2_DOT_CLOCK: u32 = 27_068;

// Register offsets within the PVR2 bank (0x005F8000)
pub(crate) const PVRID: u32 = 0x000;
pub(crate) const PVRVER: u32 = 0x004;
pub(crate) const PVRRESET: u32 = 0x008;
pub(crate) const RENDER_START: u32 = 0x014;
pub(crate) const RENDER_POLYBASE: u32 = 0x020;
pub(crate) const RENDER_TILEBASE: u32 = 0x02C;
pub(crate) const RENDER_TSPCFG: u32 = 0x030;
pub(crate) const DISP_BORDER: u32 = 0x040;
pub(crate) const DISP_MODE: u32 = 0x044;
pub(crate) const RENDER_MODE: u32 = 0x048;
pub(crate) const RENDER_SIZE: u32 = 0x04C;
pub(crate) const DISP_ADDR1: u32 = 0x050;
pub(crate) const DISP_ADDR2: u32 = 0x054;
pub(crate) const DISP_TOTAL: u32 = 0x05C;
pub(crate) const RENDER_ADDR1: u32 = 0x060;
pub(crate) const RENDER_ADDR2: u32 = 0x064;
pub(crate) const RENDER_HCLIP: u32 = 0x068;
pub(crate) const RENDER_VCLIP: u32 = 0x06C;
pub(crate) const RENDER_SHADOW: u32 = 0x074;
pub(crate) const DISP_SYNCTIME: u32 = 0x078;
pub(crate) const RENDER_OBJCFG: u32 = 0x07C;
pub(crate) const RENDER_TSPCLIP: u32 = 0x084;
pub(crate) const RENDER_FARCLIP: u32 = 0x088;
pub(crate) const RENDER_BGPLANE: u32 = 0x08C;
pub(crate) const RENDER_ISPCFG: u32 = 0x098;
pub(crate) const VRAM_CFG1: u32 = 0x0A0;
pub(crate) const VRAM_CFG2: u32 = 0x0A4;
pub(crate) const VRAM_CFG3: u32 = 0x0A8;
pub(crate) const RENDER_FOGTBLCOL: u32 = 0x0B0;
pub(crate) const RENDER_FOGVRTCOL: u32 = 0x0B4;
pub(crate) const RENDER_FOGCOEFF: u32 = 0x0B8;
pub(crate) const RENDER_CLAMPHI: u32 = 0x0BC;
pub(crate) const RENDER_CLAMPLO: u32 = 0x0C0;
pub(crate) const GUNPOS: u32 = 0x0C4;
pub(crate) const DISP_HPOSIRQ: u32 = 0x0C8;
pub(crate) const DISP_VPOSIRQ: u32 = 0x0CC;
pub(crate) const DISP_SYNCCFG: u32 = 0x0D0;
pub(crate) const DISP_HBORDER: u32 = 0x0D4;
pub(crate) const DISP_SIZE: u32 = 0x0D8;
pub(crate) const DISP_VBORDER: u32 = 0x0DC;
pub(crate) const RENDER_TEXSIZE: u32 = 0x0E4;
pub(crate) const DISP_CFG2: u32 = 0x0E8;
pub(crate) const DISP_HPOS: u32 = 0x0EC;
pub(crate) const DISP_VPOS: u32 = 0x0F0;
pub(crate) const SCALERCFG: u32 = 0x0F4;
pub(crate) const RENDER_PALETTE: u32 = 0x108;
pub(crate) const DISP_SYNCSTAT: u32 = 0x10C;
pub(crate) const TA_TILEBASE: u32 = 0x124;
pub(crate) const TA_POLYBASE: u32 = 0x128;
pub(crate) const TA_LISTEND: u32 = 0x12C;
pub(crate) const TA_POLYEND: u32 = 0x130;
pub(crate) const TA_LISTPOS: u32 = 0x134;
pub(crate) const TA_POLYPOS: u32 = 0x138;
pub(crate) const TA_TILESIZE: u32 = 0x13C;
pub(crate) const TA_TILECFG: u32 = 0x140;
pub(crate) const TA_INIT: u32 = 0x144;
pub(crate) const YUV_ADDR: u32 = 0x148;
pub(crate) const YUV_CFG: u32 = 0x14C;
pub(crate) const YUV_COUNT: u32 = 0x150;
pub(crate) const TA_REINIT: u32 = 0x160;
pub(crate) const TA_LISTBASE: u32 = 0x164;

const MRW: PortFlags = PortFlags::RW;
const MR: PortFlags = PortFlags::READ;
const MW: PortFlags = PortFlags::WRITE;

/// PVR2 core register bank
pub(crate) const PVR2_PORTS: &[PortDef] = &[
    PortDef::long(0x000, "PVRID", MR, Some(0x17FD_11DB)),
    PortDef::long(0x004, "PVRVER", MR, Some(0x0000_0011)),
    PortDef::long(0x008, "PVRRESET", MRW, Some(0)),
    PortDef::long(0x014, "RENDER_START", MW, Some(0)),
    PortDef::long(0x018, "PVRUNK1", MRW, Some(0)),
    PortDef::long(0x020, "RENDER_POLYBASE", MRW, Some(0)),
    PortDef::long(0x02C, "RENDER_TILEBASE", MRW, Some(0)),
    PortDef::long(0x030, "RENDER_TSPCFG", MRW, Some(0)),
    PortDef::long(0x040, "DISP_BORDER", MRW, Some(0)),
    PortDef::long(0x044, "DISP_MODE", MRW, Some(0)),
    PortDef::long(0x048, "RENDER_MODE", MRW, Some(0)),
    PortDef::long(0x04C, "RENDER_SIZE", MRW, Some(0)),
    PortDef::long(0x050, "DISP_ADDR1", MRW, Some(0)),
    PortDef::long(0x054, "DISP_ADDR2", MRW, Some(0)),
    PortDef::long(0x05C, "DISP_TOTAL", MRW, Some(0)),
    PortDef::long(0x060, "RENDER_ADDR1", MRW, Some(0)),
    PortDef::long(0x064, "RENDER_ADDR2", MRW, Some(0)),
    PortDef::long(0x068, "RENDER_HCLIP", MRW, Some(0)),
    PortDef::long(0x06C, "RENDER_VCLIP", MRW, Some(0)),
    PortDef::long(0x074, "RENDER_SHADOW", MRW, Some(0)),
    PortDef::long(0x078, "DISP_SYNCTIME", MRW, Some(0)),
    PortDef::long(0x07C, "RENDER_OBJCFG", MRW, Some(0)),
    PortDef::long(0x084, "RENDER_TSPCLIP", MRW, Some(0)),
    PortDef::long(0x088, "RENDER_FARCLIP", MRW, Some(0)),
    PortDef::long(0x08C, "RENDER_BGPLANE", MRW, Some(0)),
    PortDef::long(0x098, "RENDER_ISPCFG", MRW, Some(0)),
    PortDef::long(0x0A0, "VRAM_CFG1", MRW, Some(0)),
    PortDef::long(0x0A4, "VRAM_CFG2", MRW, Some(0)),
    PortDef::long(0x0A8, "VRAM_CFG3", MRW, Some(0)),
    PortDef::long(0x0B0, "RENDER_FOGTBLCOL", MRW, Some(0)),
    PortDef::long(0x0B4, "RENDER_FOGVRTCOL", MRW, Some(0)),
    PortDef::long(0x0B8, "RENDER_FOGCOEFF", MRW, Some(0)),
    PortDef::long(0x0BC, "RENDER_CLAMPHI", MRW, Some(0)),
    PortDef::long(0x0C0, "RENDER_CLAMPLO", MRW, Some(0)),
    PortDef::long(0x0C4, "GUNPOS", MR, Some(0)),
    PortDef::long(0x0C8, "DISP_HPOSIRQ", MRW, Some(0)),
    PortDef::long(0x0CC, "DISP_VPOSIRQ", MRW, Some(0)),
    PortDef::long(0x0D0, "DISP_SYNCCFG", MRW, Some(0)),
    PortDef::long(0x0D4, "DISP_HBORDER", MRW, Some(0)),
    PortDef::long(0x0D8, "DISP_SIZE", MRW, Some(0)),
    PortDef::long(0x0DC, "DISP_VBORDER", MRW, Some(0)),
    PortDef::long(0x0E0, "DISP_SYNC2", MRW, Some(0)),
    PortDef::long(0x0E4, "RENDER_TEXSIZE", MRW, Some(0)),
    PortDef::long(0x0E8, "DISP_CFG2", MRW, Some(0)),
    PortDef::long(0x0EC, "DISP_HPOS", MRW, Some(0)),
    PortDef::long(0x0F0, "DISP_VPOS", MRW, Some(0)),
    PortDef::long(0x0F4, "SCALERCFG", MRW, Some(0)),
    PortDef::long(0x108, "RENDER_PALETTE", MRW, Some(0)),
    PortDef::long(0x10C, "DISP_SYNCSTAT", MR, Some(0)),
    PortDef::long(0x124, "TA_TILEBASE", MRW, Some(0)),
    PortDef::long(0x128, "TA_POLYBASE", MRW, Some(0)),
    PortDef::long(0x12C, "TA_LISTEND", MRW, Some(0)),
    PortDef::long(0x130, "TA_POLYEND", MRW, Some(0)),
    PortDef::long(0x134, "TA_LISTPOS", MR, Some(0)),
    PortDef::long(0x138, "TA_POLYPOS", MR, Some(0)),
    PortDef::long(0x13C, "TA_TILESIZE", MRW, Some(0)),
    PortDef::long(0x140, "TA_TILECFG", MRW, Some(0)),
    PortDef::long(0x144, "TA_INIT", MW, Some(0)),
    PortDef::long(0x148, "YUV_ADDR", MRW, Some(0)),
    PortDef::long(0x14C, "YUV_CFG", MRW, Some(0)),
    PortDef::long(0x150, "YUV_COUNT", MR, Some(0)),
    PortDef::long(0x160, "TA_REINIT", MW, Some(0)),
    PortDef::long(0x164, "TA_LISTBASE", MRW, Some(0)),
];

/// CLUT palette bank: 1024 plain colour words
pub(crate) const PVR2PAL_PORTS: &[PortDef] = &[PortDef::long(0x000, "PAL0_0", MRW, Some(0))];

/// TA command port window
pub(crate) const PVR2TA_PORTS: &[PortDef] = &[PortDef::long(0x000, "TACMD", MRW, Some(0))];

// Display mode register bits
const DISPMODE_ENABLE: u32 = 0x0000_0001;
const DISPMODE_COLFMT: u32 = 0x0000_000C;
// Sync config register bits
const DISPCFG_VO: u32 = 0x0000_0100;

// Display size register fields (32-bit word units)
const DISPSIZE_MODULO: u32 = 0x3FF0_0000;
const DISPSIZE_LPF: u32 = 0x000F_FC00;
const DISPSIZE_PPL: u32 = 0x0000_03FF;

const HPOS_PER_FRAME: u32 = 0;
const HPOS_PER_LINECOUNT: u32 = 1;

/// Display output colour formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourFormat {
    /// 15-bit colour with alpha
    Argb1555,
    /// 16-bit colour
    Rgb565,
    /// Packed 24-bit colour
    Rgb888,
    /// 32-bit colour with alpha
    Argb8888,
}

const OUTPUT_COLOUR_FORMATS: [ColourFormat; 4] = [
    ColourFormat::Argb1555,
    ColourFormat::Rgb565,
    ColourFormat::Rgb888,
    ColourFormat::Argb8888,
];

impl ColourFormat {
    /// Bytes per pixel of the format
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ColourFormat::Argb1555 | ColourFormat::Rgb565 => 2,
            ColourFormat::Rgb888 => 3,
            ColourFormat::Argb8888 => 4,
        }
    }
}

/// A frame held in VRAM, handed to the display driver
pub struct FrameBuffer<'a> {
    /// Width in pixels
    pub width: u32,
    /// Height in lines
    pub height: u32,
    /// Bytes per line including padding
    pub rowstride: u32,
    /// Pixel format
    pub colour_format: ColourFormat,
    /// Source address in the SH4 map
    pub address: u32,
    /// The pixel data
    pub data: &'a [u8],
}

/// Host-side display back end. The core only depends on this contract; the
/// default implementation discards everything.
pub trait DisplayDriver {
    /// Display a blanked frame in the given border colour
    fn display_blank(&mut self, _colour: u32) {}
    /// Display a raw frame from VRAM
    fn display_frame_buffer(&mut self, _frame: &FrameBuffer<'_>) {}
    /// Render a parsed scene (called on render start)
    fn render_scene(&mut self, _scene: &Scene) {}
}

/// Discards all output
pub struct NullDisplay;

impl DisplayDriver for NullDisplay {}

/// PVR2 module state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pvr2 {
    frame_count: u32,
    line_count: u32,
    line_remainder: u32,
    /// Nanoseconds already accounted for within the current time slice
    cycles_run: u32,
    irq_hpos_line: u32,
    irq_hpos_line_count: u32,
    irq_hpos_mode: u32,
    irq_hpos_time_ns: u32,
    irq_vpos1: u32,
    irq_vpos2: u32,
    /// true = odd field
    odd_even_field: bool,
    /// Set when the palette bank has been written since the last render
    pub palette_changed: bool,
    dot_clock: u32,
    total_lines: u32,
    line_size: u32,
    line_time_ns: u32,
    vsync_lines: u32,
    hsync_width_ns: u32,
    front_porch_ns: u32,
    back_porch_ns: u32,
    retrace_start_line: u32,
    retrace_end_line: u32,
    interlaced: bool,
    /// VRAM address of the running TA block's length word
    ta_length_addr: Option<u32>,
    /// Last list-start command type seen by the TA
    ta_last_poly_type: u32,
    /// The assembled scene (rebuilt on every render start)
    #[serde(skip)]
    pub scene: Scene,
}

impl Pvr2 {
    /// Create the module in pre-reset state
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            line_count: 0,
            line_remainder: 0,
            cycles_run: 0,
            irq_hpos_line: 0,
            irq_hpos_line_count: 0,
            irq_hpos_mode: HPOS_PER_FRAME,
            irq_hpos_time_ns: 0,
            irq_vpos1: 0,
            irq_vpos2: 0,
            odd_even_field: false,
            palette_changed: false,
            dot_clock: PVR2_DOT_CLOCK,
            total_lines: 1,
            line_size: 1,
            line_time_ns: 0,
            vsync_lines: 0,
            hsync_width_ns: 0,
            front_porch_ns: 0,
            back_porch_ns: 4000,
            retrace_start_line: 0,
            retrace_end_line: 0x2A,
            interlaced: false,
            ta_length_addr: None,
            ta_last_poly_type: 0,
            scene: Scene::new(),
        }
    }

    /// Frames displayed since boot
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
}

impl Default for Pvr2 {
    fn default() -> Self {
        Self::new()
    }
}

/// Module reset: reprogram the CRTC defaults and reinitialize the TA
pub(crate) fn reset(dc: &mut Dreamcast) {
    dc.pvr2.line_count = 0;
    dc.pvr2.line_remainder = 0;
    dc.pvr2.cycles_run = 0;
    dc.pvr2.irq_vpos1 = 0;
    dc.pvr2.irq_vpos2 = 0;
    dc.pvr2.dot_clock = PVR2_DOT_CLOCK;
    dc.pvr2.back_porch_ns = 4000;
    dc.pvr2.palette_changed = false;
    mmio_pvr2_write(dc, DISP_TOTAL, 0x0270_035F);
    mmio_pvr2_write(dc, DISP_SYNCTIME, 0x07D6_A53F);
    mmio_pvr2_write(dc, YUV_ADDR, 0);
    mmio_pvr2_write(dc, YUV_CFG, 0);
    ta_init(dc);
}

/// Advance the raster to `nanosecs` within the current time slice, counting
/// lines and firing the frame flip when the beam crosses the retrace point
fn update_raster_posn(dc: &mut Dreamcast, nanosecs: u32) {
    let old_line_count = dc.pvr2.line_count;
    if dc.pvr2.line_time_ns == 0 {
        return;
    }
    dc.pvr2.line_remainder += nanosecs.saturating_sub(dc.pvr2.cycles_run);
    dc.pvr2.cycles_run = nanosecs;
    while dc.pvr2.line_remainder >= dc.pvr2.line_time_ns {
        dc.pvr2.line_count += 1;
        dc.pvr2.line_remainder -= dc.pvr2.line_time_ns;
    }

    if dc.pvr2.line_count >= dc.pvr2.total_lines {
        dc.pvr2.line_count -= dc.pvr2.total_lines;
        if dc.pvr2.interlaced {
            dc.pvr2.odd_even_field = !dc.pvr2.odd_even_field;
        }
    }
    if dc.pvr2.line_count >= dc.pvr2.retrace_end_line
        && (old_line_count < dc.pvr2.retrace_end_line || old_line_count > dc.pvr2.line_count)
    {
        dc.pvr2.frame_count += 1;
        display_frame(dc);
    }
}

/// Per-slice hook: advance the beam and reset the intra-slice clock
pub(crate) fn run_slice(dc: &mut Dreamcast, nanosecs: u32) -> u32 {
    update_raster_posn(dc, nanosecs);
    dc.pvr2.cycles_run = 0;
    nanosecs
}

/// Schedule a "scanline" event. The line doubles up in interlaced mode (2n
/// in even fields, 2n+1 in odd); the raster position must be current before
/// calling.
fn schedule_scanline_event(dc: &mut Dreamcast, event_id: usize, line: u32, minimum_lines: u32, hpos_ns: u32) {
    let mut field = dc.pvr2.odd_even_field;
    if line <= dc.pvr2.line_count && dc.pvr2.interlaced {
        field = !field;
    }
    let hpos_ns = hpos_ns.min(dc.pvr2.line_time_ns);

    let mut line = line << 1;
    if field {
        line += 1;
    }

    if line < dc.pvr2.total_lines {
        let mut lines = if line <= dc.pvr2.line_count {
            dc.pvr2.total_lines - dc.pvr2.line_count + line
        } else {
            line - dc.pvr2.line_count
        };
        if lines <= minimum_lines {
            lines += dc.pvr2.total_lines;
        }
        let time = lines * dc.pvr2.line_time_ns - dc.pvr2.line_remainder + hpos_ns;
        dc.event_schedule(event_id, time);
    } else {
        dc.event_cancel(event_id);
    }
}

/// Event handler for the hpos event: raise the ASIC event, advance to the
/// next programmed line, and re-arm
pub(crate) fn hpos_callback(dc: &mut Dreamcast, event_id: usize) {
    asic::asic_event(dc, event_id);
    let now = dc.sh4.slice_cycle;
    update_raster_posn(dc, now);
    if dc.pvr2.irq_hpos_mode == HPOS_PER_LINECOUNT {
        dc.pvr2.irq_hpos_line += dc.pvr2.irq_hpos_line_count;
        while dc.pvr2.irq_hpos_line > (dc.pvr2.total_lines >> 1) {
            dc.pvr2.irq_hpos_line -= dc.pvr2.total_lines >> 1;
        }
    }
    let line = dc.pvr2.irq_hpos_line;
    let hpos = dc.pvr2.irq_hpos_time_ns;
    schedule_scanline_event(dc, event_id, line, 1, hpos);
}

/// Event handler for the two scanline events: raise the ASIC event and
/// re-arm for the next field
pub(crate) fn scanline_callback(dc: &mut Dreamcast, event_id: usize) {
    asic::asic_event(dc, event_id);
    let now = dc.sh4.slice_cycle;
    update_raster_posn(dc, now);
    let line = if event_id == events::SCANLINE1 {
        dc.pvr2.irq_vpos1
    } else {
        dc.pvr2.irq_vpos2
    };
    schedule_scanline_event(dc, event_id, line, 1, 0);
}

/// Compute the sync-status register from the current beam position.
/// Reads (LSB to MSB): scan line, odd/even field, display active,
/// horizontal sync off, vertical sync off.
fn get_sync_status(dc: &mut Dreamcast) -> u32 {
    let now = dc.sh4.slice_cycle;
    update_raster_posn(dc, now);
    let p = &dc.pvr2;
    let mut result = p.line_count;

    if p.odd_even_field {
        result |= 0x0400;
    }
    if (p.line_count & 0x01 != 0) == p.odd_even_field {
        if p.line_remainder > p.hsync_width_ns {
            result |= 0x1000; /* !HSYNC */
        }
        if p.line_count >= p.vsync_lines {
            if p.line_remainder > p.front_porch_ns {
                result |= 0x2800; /* Display active */
            } else {
                result |= 0x2000; /* Front porch */
            }
        }
    } else if p.line_count >= p.vsync_lines {
        if p.line_remainder < p.line_time_ns.saturating_sub(p.back_porch_ns) {
            result |= 0x3800; /* Display active */
        } else {
            result |= 0x3000;
        }
    } else {
        result |= 0x1000; /* Back porch */
    }
    result
}

/// Display the next frame: copy the current VRAM contents out through the
/// display driver, honouring blanking and the interlace field selection
pub(crate) fn display_frame(dc: &mut Dreamcast) {
    let dispmode = dc.bus.io_read32(MmioRegionId::Pvr2, DISP_MODE);
    let synccfg = dc.bus.io_read32(MmioRegionId::Pvr2, DISP_SYNCCFG);
    let enabled = dispmode & DISPMODE_ENABLE != 0 && synccfg & DISPCFG_VO != 0;

    if !enabled {
        dc.display.display_blank(0);
        return;
    }
    if dc.bus.io_read32(MmioRegionId::Pvr2, DISP_CFG2) & 0x08 != 0 {
        let colour = dc.bus.io_read32(MmioRegionId::Pvr2, DISP_BORDER);
        dc.display.display_blank(colour);
        return;
    }

    let dispsize = dc.bus.io_read32(MmioRegionId::Pvr2, DISP_SIZE);
    let vid_stride = ((dispsize & DISPSIZE_MODULO) >> 20).wrapping_sub(1);
    let vid_ppl = (dispsize & DISPSIZE_PPL) + 1;

    let colour_format = OUTPUT_COLOUR_FORMATS[((dispmode & DISPMODE_COLFMT) >> 2) as usize];
    let width = vid_ppl * 4 / colour_format.bytes_per_pixel();
    let mut height = ((dispsize & DISPSIZE_LPF) >> 10) + 1;
    let mut rowstride = (vid_ppl + vid_stride) << 2;

    // Determine the field to display, and deinterlace if possible
    let address = if dc.pvr2.interlaced {
        if vid_ppl == vid_stride {
            // Both fields are contiguous: fold them into one tall frame
            height <<= 1;
            rowstride = vid_ppl << 2;
            dc.bus.io_read32(MmioRegionId::Pvr2, DISP_ADDR1)
        } else {
            let mut oddfield = dc.pvr2.odd_even_field;
            if dc.pvr2.line_count >= dc.pvr2.retrace_start_line {
                oddfield = !oddfield;
            }
            if oddfield {
                dc.bus.io_read32(MmioRegionId::Pvr2, DISP_ADDR1)
            } else {
                dc.bus.io_read32(MmioRegionId::Pvr2, DISP_ADDR2)
            }
        }
    } else {
        dc.bus.io_read32(MmioRegionId::Pvr2, DISP_ADDR1)
    };
    let address = (address & 0x00FF_FFFF) + PVR2_RAM_BASE;

    let size = (rowstride * height) as usize;
    let Dreamcast { bus, display, .. } = dc;
    let offset = (address - PVR2_RAM_BASE) as usize;
    if let Some(vram_mem) = bus.region_mem(crate::core::memory::MEM_REGION_VIDEO) {
        let end = (offset + size).min(vram_mem.len());
        let frame = FrameBuffer {
            width,
            height,
            rowstride,
            colour_format,
            address,
            data: &vram_mem[offset.min(vram_mem.len())..end],
        };
        display.display_frame_buffer(&frame);
    }
}

/// Parse the VRAM scene and hand it to the renderer (render-start write)
fn render_scene(dc: &mut Dreamcast) {
    let regs = RenderRegs {
        tile_base: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_TILEBASE),
        poly_base: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_POLYBASE),
        hclip: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_HCLIP),
        vclip: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_VCLIP),
        far_clip: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_FARCLIP),
        shadow: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_SHADOW),
        obj_cfg: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_OBJCFG),
        isp_cfg: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_ISPCFG),
        bg_plane: dc.bus.io_read32(MmioRegionId::Pvr2, RENDER_BGPLANE),
    };

    let report = scene::scene_read(&mut dc.pvr2.scene, &dc.bus, &regs);
    {
        let Dreamcast { pvr2, display, .. } = dc;
        display.render_scene(&pvr2.scene);
    }

    if report.ta_error {
        asic::asic_event(dc, events::TA_ERROR);
    }
    if report.overflow {
        asic::asic_event(dc, events::PVR_PRIM_ALLOC_FAIL);
    }
    asic::asic_event(dc, events::PVR_RENDER_DONE);
}

// ----- Tile accelerator (shell implementation) ---------------------------

/// (Re)initialize the tile accelerator for the next scene: the write
/// positions snap back to their base registers
pub(crate) fn ta_init(dc: &mut Dreamcast) {
    let tile_base = dc.bus.io_read32(MmioRegionId::Pvr2, TA_TILEBASE);
    let poly_base = dc.bus.io_read32(MmioRegionId::Pvr2, TA_POLYBASE);
    dc.bus.io_write32(MmioRegionId::Pvr2, TA_LISTPOS, tile_base);
    dc.bus.io_write32(MmioRegionId::Pvr2, TA_POLYPOS, poly_base);
    dc.pvr2.ta_last_poly_type = 0;
    dc.pvr2.ta_length_addr = None;
}

/// Accept a block of TA data. The data lands verbatim in the object buffer
/// (prefixed by a running length word); the command stream is watched only
/// closely enough to fire the correct end-of-list events.
pub fn ta_write(dc: &mut Dreamcast, buf: &[u8]) {
    let mut obj_addr = dc.bus.io_read32(MmioRegionId::Pvr2, TA_POLYPOS);
    match dc.pvr2.ta_length_addr {
        None => {
            dc.pvr2.ta_length_addr = Some(obj_addr);
            obj_addr += 4;
            dc.bus
                .write32(PVR2_RAM_BASE + (obj_addr - 4), buf.len() as u32);
        }
        Some(length_addr) => {
            let total = dc.bus.read32(PVR2_RAM_BASE + length_addr) + buf.len() as u32;
            dc.bus.write32(PVR2_RAM_BASE + length_addr, total);
        }
    }
    dc.bus.copy_to(PVR2_RAM_BASE + obj_addr, buf);
    dc.bus
        .io_write32(MmioRegionId::Pvr2, TA_POLYPOS, obj_addr + buf.len() as u32);

    for chunk in buf.chunks_exact(32) {
        let command = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
        let cmd_type = (command >> 24) & 0xFF;
        match cmd_type {
            0x00 => {
                // End of list
                match dc.pvr2.ta_last_poly_type {
                    0x80 => asic::asic_event(dc, events::PVR_OPAQUE_DONE),
                    0x81 => asic::asic_event(dc, events::PVR_OPAQUEMOD_DONE),
                    0x82 => asic::asic_event(dc, events::PVR_TRANS_DONE),
                    0x83 => asic::asic_event(dc, events::PVR_TRANSMOD_DONE),
                    0x84 => asic::asic_event(dc, events::PVR_PUNCHOUT_DONE),
                    _ => {}
                }
                dc.pvr2.ta_last_poly_type = 0;
            }
            0x80..=0x84 => dc.pvr2.ta_last_poly_type = cmd_type,
            _ => {}
        }
    }
}

/// Route a PVR DMA block by destination window: TA command stream, YUV
/// converter, or the interleaved texture path
pub(crate) fn pvr2_dma_write(dc: &mut Dreamcast, destaddr: u32, data: &[u8]) {
    match destaddr & 0x1380_0000 {
        0x1000_0000 => ta_write(dc, data),
        0x1080_0000 => yuv_write(dc, data),
        _ if destaddr & 0x1100_0000 == 0x1100_0000 => {
            vram::vram64_write(&mut dc.bus, destaddr & 0x00FF_FFFF, data);
        }
        _ => log::warn!("PVR DMA write to unhandled window 0x{:08X}", destaddr),
    }
}

/// YUV converter input (conversion itself is a renderer concern; the
/// converter state tracks progress only)
fn yuv_write(dc: &mut Dreamcast, data: &[u8]) {
    let count = dc.bus.io_read32(MmioRegionId::Pvr2, YUV_COUNT);
    dc.bus
        .io_write32(MmioRegionId::Pvr2, YUV_COUNT, count + (data.len() as u32 / 384));
    log::debug!("YUV data block of {} bytes accepted", data.len());
}

// ----- MMIO dispatch -----------------------------------------------------

/// Behavioral write dispatch. Every register is masked individually; it is
/// easier to do at write time than at every read.
pub(crate) fn mmio_pvr2_write(dc: &mut Dreamcast, offset: u32, val: u32) {
    if (0x200..0x600).contains(&offset) {
        // Fog table
        dc.bus.io_write32(MmioRegionId::Pvr2, offset, val);
        return;
    }

    match offset {
        PVRID | PVRVER | GUNPOS | DISP_SYNCSTAT | TA_POLYPOS | TA_LISTPOS | YUV_COUNT => {
            // Read-only registers
        }
        PVRRESET => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0000_0007),
        RENDER_START => {
            // Don't really care what value is written
            render_scene(dc);
        }
        RENDER_POLYBASE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00F0_0000),
        RENDER_TSPCFG => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0001_0101),
        DISP_BORDER => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x01FF_FFFF),
        DISP_MODE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FF7F),
        RENDER_MODE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FF0F),
        RENDER_SIZE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0000_01FF),
        DISP_ADDR1 => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FFFC);
            let now = dc.sh4.slice_cycle;
            update_raster_posn(dc, now);
        }
        DISP_ADDR2 => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FFFC);
            let now = dc.sh4.slice_cycle;
            update_raster_posn(dc, now);
        }
        DISP_SIZE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x3FFF_FFFF),
        RENDER_ADDR1 | RENDER_ADDR2 => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x01FF_FFFC)
        }
        RENDER_HCLIP => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x07FF_07FF),
        RENDER_VCLIP => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x03FF_03FF),
        DISP_HPOSIRQ => {
            let val = val & 0x03FF_33FF;
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val);
            dc.pvr2.irq_hpos_line = val & 0x03FF;
            dc.pvr2.irq_hpos_time_ns = 2_000_000 * ((val >> 16) & 0x03FF) / dc.pvr2.dot_clock;
            dc.pvr2.irq_hpos_mode = (val >> 12) & 0x03;
            match dc.pvr2.irq_hpos_mode {
                0 | 3 => dc.pvr2.irq_hpos_mode = HPOS_PER_FRAME, // Reserved mode treated as once-per-frame
                mode => {
                    if mode == 2 {
                        // Once per line behaves as per-line-count of one
                        dc.pvr2.irq_hpos_line = 1;
                    }
                    dc.pvr2.irq_hpos_line_count = dc.pvr2.irq_hpos_line;
                    dc.pvr2.irq_hpos_line =
                        (dc.pvr2.line_count >> 1) + dc.pvr2.irq_hpos_line_count;
                    while dc.pvr2.irq_hpos_line > (dc.pvr2.total_lines >> 1) {
                        dc.pvr2.irq_hpos_line -= dc.pvr2.total_lines >> 1;
                    }
                    dc.pvr2.irq_hpos_mode = HPOS_PER_LINECOUNT;
                }
            }
            let line = dc.pvr2.irq_hpos_line;
            let hpos = dc.pvr2.irq_hpos_time_ns;
            schedule_scanline_event(dc, events::RETRACE, line, 0, hpos);
        }
        DISP_VPOSIRQ => {
            let val = val & 0x03FF_03FF;
            dc.pvr2.irq_vpos1 = val >> 16;
            dc.pvr2.irq_vpos2 = val & 0x03FF;
            let now = dc.sh4.slice_cycle;
            update_raster_posn(dc, now);
            let (v1, v2) = (dc.pvr2.irq_vpos1, dc.pvr2.irq_vpos2);
            schedule_scanline_event(dc, events::SCANLINE1, v1, 0, 0);
            schedule_scanline_event(dc, events::SCANLINE2, v2, 0, 0);
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val);
        }
        RENDER_SHADOW => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0000_01FF),
        RENDER_OBJCFG => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x003F_FFFF),
        RENDER_TSPCLIP => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x7FFF_FFFF),
        RENDER_FARCLIP => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0xFFFF_FFF0),
        RENDER_BGPLANE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x1FFF_FFFF),
        RENDER_ISPCFG => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FFF9),
        VRAM_CFG1 => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0000_00FF),
        VRAM_CFG2 => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x003F_FFFF),
        VRAM_CFG3 => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x1FFF_FFFF),
        RENDER_FOGTBLCOL | RENDER_FOGVRTCOL => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FFFF)
        }
        RENDER_FOGCOEFF => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0000_FFFF),
        RENDER_CLAMPHI | RENDER_CLAMPLO => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val),
        RENDER_TEXSIZE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0003_1F1F),
        RENDER_PALETTE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0000_0003),

        /* CRTC registers */
        DISP_HBORDER | DISP_VBORDER => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x03FF_03FF)
        }
        DISP_TOTAL => {
            let val = val & 0x03FF_03FF;
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val);
            let now = dc.sh4.slice_cycle;
            update_raster_posn(dc, now);
            dc.pvr2.total_lines = (val >> 16) + 1;
            dc.pvr2.line_size = (val & 0x03FF) + 1;
            dc.pvr2.line_time_ns = 1_000_000 * dc.pvr2.line_size / dc.pvr2.dot_clock;
            dc.pvr2.retrace_end_line = 0x2A;
            dc.pvr2.retrace_start_line = dc.pvr2.total_lines - 6;
            let (v1, v2) = (dc.pvr2.irq_vpos1, dc.pvr2.irq_vpos2);
            schedule_scanline_event(dc, events::SCANLINE1, v1, 0, 0);
            schedule_scanline_event(dc, events::SCANLINE2, v2, 0, 0);
            let (line, hpos) = (dc.pvr2.irq_hpos_line, dc.pvr2.irq_hpos_time_ns);
            schedule_scanline_event(dc, events::RETRACE, line, 0, hpos);
        }
        DISP_SYNCCFG => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0000_03FF);
            dc.pvr2.interlaced = val & 0x0010 != 0;
        }
        DISP_SYNCTIME => {
            dc.pvr2.vsync_lines = (val >> 8) & 0x0F;
            dc.pvr2.hsync_width_ns = ((val & 0x7F) + 1) * 2_000_000 / dc.pvr2.dot_clock;
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0xFFFF_FF7F);
        }
        DISP_CFG2 => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x003F_01FF),
        DISP_HPOS => {
            let val = val & 0x03FF;
            dc.pvr2.front_porch_ns = (val + 1) * 1_000_000 / dc.pvr2.dot_clock;
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val);
        }
        DISP_VPOS => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x03FF_03FF),

        /* Tile accelerator registers */
        TA_TILEBASE | TA_LISTEND | TA_LISTBASE => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FFE0)
        }
        RENDER_TILEBASE | TA_POLYBASE | TA_POLYEND => {
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x00FF_FFFC)
        }
        TA_TILESIZE => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x000F_003F),
        TA_TILECFG => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0013_3333),
        TA_INIT => {
            if val & 0x8000_0000 != 0 {
                ta_init(dc);
            }
        }
        TA_REINIT => {}

        SCALERCFG => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0007_FFFF),

        YUV_ADDR => {
            let val = val & 0x00FF_FFF8;
            dc.bus.io_write32(MmioRegionId::Pvr2, offset, val);
            dc.bus.io_write32(MmioRegionId::Pvr2, YUV_COUNT, 0);
        }
        YUV_CFG => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val & 0x0101_3F3F),

        _ => dc.bus.io_write32(MmioRegionId::Pvr2, offset, val),
    }
}

/// Behavioral read dispatch: only the sync-status register is computed
pub(crate) fn mmio_pvr2_read(dc: &mut Dreamcast, offset: u32) -> u32 {
    match offset {
        DISP_SYNCSTAT => get_sync_status(dc),
        _ => dc.bus.io_read32(MmioRegionId::Pvr2, offset),
    }
}

/// Palette writes flag the texture cache
pub(crate) fn mmio_pvr2pal_write(dc: &mut Dreamcast, offset: u32, val: u32) {
    dc.bus.io_write32(MmioRegionId::Pvr2Pal, offset, val);
    dc.pvr2.palette_changed = true;
}

/// TA command port: every word is TA stream data
pub(crate) fn mmio_pvr2ta_write(dc: &mut Dreamcast, _offset: u32, val: u32) {
    ta_write(dc, &val.to_le_bytes());
}

/// TA command port reads float high
pub(crate) fn mmio_pvr2ta_read(_dc: &mut Dreamcast, _offset: u32) -> u32 {
    0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::Dreamcast;

    const PVR2_BASE: u32 = 0x005F_8000;

    /// Build a one-triangle scene in VRAM: a tile segment list at 0x1000
    /// (tile 0,0, end-of-list) whose opaque list points at a single
    /// triangle entry, and the triangle's context+vertexes at 0x3000.
    fn build_triangle_scene(dc: &mut Dreamcast) {
        let vram32 = PVR2_RAM_BASE;

        // Polygon context at heap offset 0x3000: untextured, gouraud
        dc.write32(vram32 + 0x3000, 0x0080_0000); // poly1
        dc.write32(vram32 + 0x3004, 0x0010_0000); // poly2: alpha enabled
        dc.write32(vram32 + 0x3008, 0); // texture word
        // Three vertexes, 3 words each (x, y, z) + colour
        for (i, (x, y)) in [(8.0f32, 8.0f32), (24.0, 8.0), (16.0, 24.0)].iter().enumerate() {
            let base = vram32 + 0x300C + (i as u32) * 16;
            dc.write32(base, x.to_bits());
            dc.write32(base + 4, y.to_bits());
            dc.write32(base + 8, 0.5f32.to_bits());
            dc.write32(base + 12, 0xFFFF_0000); // BGRA
        }

        // Tile list at 0x2000: one triangle entry then end-of-list.
        // vertex_length field = 1 (3+1 words per vertex)
        dc.write32(vram32 + 0x2000, 0x8000_0000 | (1 << 21) | (0x3000 >> 2));
        dc.write32(vram32 + 0x2004, 0xF000_0000);

        // Segment list at 0x1000: tile (0,0), end flag, opaque -> 0x2000
        dc.write32(vram32 + 0x1000, SEGMENT_END_CONTROL);
        dc.write32(vram32 + 0x1004, 0x2000); // opaque
        dc.write32(vram32 + 0x1008, scene::NO_POINTER);
        dc.write32(vram32 + 0x100C, scene::NO_POINTER);
        dc.write32(vram32 + 0x1010, scene::NO_POINTER);
        dc.write32(vram32 + 0x1014, scene::NO_POINTER);

        dc.write32(PVR2_BASE + RENDER_TILEBASE, 0x1000);
        dc.write32(PVR2_BASE + RENDER_POLYBASE, 0); // heap at VRAM offset 0
        dc.write32(PVR2_BASE + RENDER_HCLIP, 31 << 16);
        dc.write32(PVR2_BASE + RENDER_VCLIP, 31 << 16);
        dc.write32(PVR2_BASE + RENDER_FARCLIP, 0.2f32.to_bits() & 0xFFFF_FFF0);
    }

    const SEGMENT_END_CONTROL: u32 = scene::SEGMENT_END;

    #[test]
    fn test_render_start_parses_triangle() {
        let mut dc = Dreamcast::new();
        build_triangle_scene(&mut dc);
        dc.write32(PVR2_BASE + RENDER_START, 1);

        let scene = &dc.pvr2.scene;
        // Background polygon plus the triangle
        assert_eq!(scene.poly_count(), 2);
        assert_eq!(scene.vertex_count(), 3);
        let tri = &scene.polys[0];
        assert_eq!(tri.context, 0x3000);
        assert_eq!(tri.vertex_count, 3);
        assert_eq!(tri.vertex_index, 0);
        assert_eq!(scene.vertexes[0].x, 8.0);
        assert_eq!(scene.vertexes[2].y, 24.0);
        // Base colour 0xFFFF0000 decoded BGRA -> RGBA: opaque red
        assert_eq!(scene.vertexes[0].rgba, [1.0, 0.0, 0.0, 1.0]);

        // Buffer dimensions derive from the highest tile coordinate
        assert_eq!(scene.buffer_width, 32);
        assert_eq!(scene.buffer_height, 32);

        // Render-done pending in PIRQ0
        assert_ne!(
            dc.read32(0x005F_6000 + 0x900) & (1 << events::PVR_RENDER_DONE),
            0
        );
    }

    #[test]
    fn test_scene_determinism() {
        let mut dc = Dreamcast::new();
        build_triangle_scene(&mut dc);
        dc.write32(PVR2_BASE + RENDER_START, 1);
        let verts1 = dc.pvr2.scene.vertexes.clone();
        let polys1: Vec<u32> = dc.pvr2.scene.polys.iter().map(|p| p.context).collect();

        dc.write32(PVR2_BASE + RENDER_START, 1);
        let verts2 = dc.pvr2.scene.vertexes.clone();
        let polys2: Vec<u32> = dc.pvr2.scene.polys.iter().map(|p| p.context).collect();
        assert_eq!(verts1, verts2);
        assert_eq!(polys1, polys2);
    }

    #[test]
    fn test_shared_polygon_counted_once() {
        // The same polygon referenced from two tiles produces one record
        let mut dc = Dreamcast::new();
        build_triangle_scene(&mut dc);
        let vram32 = PVR2_RAM_BASE;
        // Rewrite the segment list with two tiles pointing at the same list
        dc.write32(vram32 + 0x1000, (1 << 2) as u32); // tile (1,0), not end
        dc.write32(vram32 + 0x1004, 0x2000);
        dc.write32(vram32 + 0x1018, SEGMENT_END_CONTROL | (1 << 8)); // tile (0,1), end
        dc.write32(vram32 + 0x101C, 0x2000);
        for i in 0..4 {
            dc.write32(vram32 + 0x1020 + i * 4, scene::NO_POINTER);
        }
        dc.write32(PVR2_BASE + RENDER_START, 1);

        assert_eq!(dc.pvr2.scene.poly_count(), 2); // triangle + background
        assert_eq!(dc.pvr2.scene.vertex_count(), 3);
        assert_eq!(dc.pvr2.scene.buffer_width, 64);
        assert_eq!(dc.pvr2.scene.buffer_height, 64);
    }

    #[test]
    fn test_sort_and_shadow_modes() {
        let mut dc = Dreamcast::new();
        build_triangle_scene(&mut dc);

        dc.write32(PVR2_BASE + RENDER_OBJCFG, 0x0020_0000);
        dc.write32(PVR2_BASE + RENDER_SHADOW, 0x100);
        dc.write32(PVR2_BASE + RENDER_START, 1);
        assert_eq!(dc.pvr2.scene.sort_mode, SortMode::ByFlag);
        assert_eq!(dc.pvr2.scene.shadow_mode, ShadowMode::Cheap);

        dc.write32(PVR2_BASE + RENDER_OBJCFG, 0);
        dc.write32(PVR2_BASE + RENDER_ISPCFG, 1);
        dc.write32(PVR2_BASE + RENDER_SHADOW, 0);
        dc.write32(PVR2_BASE + RENDER_START, 1);
        assert_eq!(dc.pvr2.scene.sort_mode, SortMode::Never);
        assert_eq!(dc.pvr2.scene.shadow_mode, ShadowMode::Full);

        dc.write32(PVR2_BASE + RENDER_ISPCFG, 0);
        dc.write32(PVR2_BASE + RENDER_START, 1);
        assert_eq!(dc.pvr2.scene.sort_mode, SortMode::Always);
    }

    #[test]
    fn test_clip_bounds() {
        let mut dc = Dreamcast::new();
        build_triangle_scene(&mut dc);
        dc.write32(PVR2_BASE + RENDER_HCLIP, (300 << 16) | 20);
        dc.write32(PVR2_BASE + RENDER_VCLIP, (200 << 16) | 10);
        dc.write32(PVR2_BASE + RENDER_START, 1);
        let bounds = dc.pvr2.scene.bounds;
        assert_eq!(bounds[0], 20.0);
        assert_eq!(bounds[1], 301.0);
        assert_eq!(bounds[2], 10.0);
        assert_eq!(bounds[3], 201.0);
        // z bounds extended from the vertex z values
        assert!(bounds[5] >= 0.5);
    }

    #[test]
    fn test_malformed_list_raises_ta_error() {
        let mut dc = Dreamcast::new();
        build_triangle_scene(&mut dc);
        // Break the tile list: continuation pointing at itself
        let vram32 = PVR2_RAM_BASE;
        dc.write32(vram32 + 0x2000, 0xE000_0000 | 0x2000);
        dc.write32(PVR2_BASE + RENDER_START, 1);
        // Event 65 lands in the PIRQ2 bank
        assert_ne!(
            dc.read32(0x005F_6000 + 0x908) & (1 << (events::TA_ERROR & 0x1F)),
            0
        );
    }

    #[test]
    fn test_register_write_masks() {
        // MMIO round-trip under each register's writable-bit mask
        let mut dc = Dreamcast::new();
        dc.write32(PVR2_BASE + RENDER_HCLIP, 0xFFFF_FFFF);
        assert_eq!(dc.read32(PVR2_BASE + RENDER_HCLIP), 0x07FF_07FF);
        dc.write32(PVR2_BASE + RENDER_VCLIP, 0xFFFF_FFFF);
        assert_eq!(dc.read32(PVR2_BASE + RENDER_VCLIP), 0x03FF_03FF);
        dc.write32(PVR2_BASE + RENDER_FARCLIP, 0xFFFF_FFFF);
        assert_eq!(dc.read32(PVR2_BASE + RENDER_FARCLIP), 0xFFFF_FFF0);
        dc.write32(PVR2_BASE + RENDER_POLYBASE, 0xFFFF_FFFF);
        assert_eq!(dc.read32(PVR2_BASE + RENDER_POLYBASE), 0x00F0_0000);
        // Read-only ID register is untouched by writes
        dc.write32(PVR2_BASE + PVRID, 0);
        assert_eq!(dc.read32(PVR2_BASE + PVRID), 0x17FD_11DB);
    }

    #[test]
    fn test_ta_init_and_write() {
        let mut dc = Dreamcast::new();
        dc.write32(PVR2_BASE + TA_POLYBASE, 0x0000_8000);
        dc.write32(PVR2_BASE + TA_TILEBASE, 0x0004_0000);
        dc.write32(PVR2_BASE + TA_INIT, 0x8000_0000);
        assert_eq!(dc.read32(PVR2_BASE + TA_POLYPOS), 0x0000_8000);
        assert_eq!(dc.read32(PVR2_BASE + TA_LISTPOS), 0x0004_0000);

        // An opaque list start followed by end-of-list raises the event
        let mut block = [0u8; 32];
        block[3] = 0x80; // opaque poly command
        ta_write(&mut dc, &block);
        let block = [0u8; 32]; // end of list
        ta_write(&mut dc, &block);
        assert_ne!(
            dc.read32(0x005F_6000 + 0x900) & (1 << events::PVR_OPAQUE_DONE),
            0
        );
    }

    #[test]
    fn test_raster_timing_programmed() {
        let mut dc = Dreamcast::new();
        // 525 total lines, 858 pixels per line
        dc.write32(PVR2_BASE + DISP_TOTAL, (524 << 16) | 857);
        assert_eq!(dc.pvr2.total_lines, 525);
        assert_eq!(dc.pvr2.line_size, 858);
        // 858 px at 27.068 MHz is ~31.7 us
        assert!((31_000..33_000).contains(&dc.pvr2.line_time_ns));
    }
}

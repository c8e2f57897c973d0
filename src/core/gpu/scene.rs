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

//! Scene assembly: tile-segment list to renderable polygon/vertex arrays
//!
//! The render registers point at two structures in VRAM: the tile segment
//! list (six words per 32x32 tile) and the polygon/tile-pointer heap.
//! Extraction runs two passes. Pass 1 walks every tile's pointer chains to
//! discover the polygons and their vertex counts (a polygon appears in every
//! tile it touches, so counts are only final once all tiles are seen). Pass
//! 2 expands the raw vertex data into the flat vertex array. Both passes
//! resolve polygons through a VRAM-offset-to-polygon map so each context is
//! represented exactly once.
//!
//! Malformed lists never crash the walk: illegal tags and runaway chains are
//! reported and the list is abandoned; polygon-buffer exhaustion drops the
//! remainder of the scene.

use crate::core::memory::Bus;

/// End-of-segment-list flag in the segment control word
pub const SEGMENT_END: u32 = 0x8000_0000;
/// Per-segment translucent autosort flag
pub const SEGMENT_SORT_TRANS: u32 = 0x2000_0000;
/// A segment list pointer with this bit set points at nothing
pub const NO_POINTER: u32 = 0x8000_0000;

/// Tile X coordinate from a segment control word
#[inline]
pub fn segment_x(control: u32) -> u32 {
    (control >> 2) & 0x3F
}

/// Tile Y coordinate from a segment control word
#[inline]
pub fn segment_y(control: u32) -> u32 {
    (control >> 8) & 0x3F
}

// Polygon context word 1 tests
#[inline]
fn poly1_textured(poly1: u32) -> bool {
    poly1 & 0x0200_0000 != 0
}

#[inline]
fn poly1_specular(poly1: u32) -> bool {
    poly1 & 0x0100_0000 != 0
}

#[inline]
fn poly1_gouraud_shaded(poly1: u32) -> bool {
    poly1 & 0x0080_0000 != 0
}

#[inline]
fn poly1_uv16(poly1: u32) -> bool {
    poly1 & 0x0040_0000 != 0
}

// Polygon context word 2 tests
#[inline]
fn poly2_alpha_enable(poly2: u32) -> bool {
    poly2 & 0x0010_0000 != 0
}

#[inline]
fn poly2_tex_blend(poly2: u32) -> u32 {
    (poly2 >> 6) & 0x03
}

/// Upper bound on scene polygons: the smallest polygon is 48 bytes in the
/// 4 MiB object buffer, plus the background, doubled again to leave room
/// for split polygons.
pub const MAX_POLYGONS: usize = 87_382 * 2;

/// Size of the VRAM-offset-to-polygon lookup (word offsets, 20 bits)
const BUF_POLY_MAP_ENTRIES: usize = 0x10_0000;

/// Hard cap on tile-list entries walked per list, against cyclic chains
const MAX_LIST_ENTRIES: usize = 0x1_0000;

/// Hard cap on tile segments walked per parse
const MAX_SEGMENTS: usize = 0x1_0000;

/// Translucency sort policy for the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Never sort
    Never,
    /// Sorting controlled by the per-segment flag
    #[default]
    ByFlag,
    /// Always sort
    Always,
}

/// Modifier-volume shadow treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowMode {
    /// No shadow processing
    None,
    /// Intensity-only (cheap) shadows
    Cheap,
    /// Full two-parameter shadows
    #[default]
    Full,
}

/// One expanded vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Screen-space position
    pub x: f32,
    /// Screen-space position
    pub y: f32,
    /// Inverse depth
    pub z: f32,
    /// Homogeneous w (reserved for the renderer)
    pub w: f32,
    /// Texture coordinate
    pub u: f32,
    /// Texture coordinate
    pub v: f32,
    /// Base colour, RGBA 0..1
    pub rgba: [f32; 4],
    /// Specular offset colour, RGBA 0..1
    pub offset_rgba: [f32; 4],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
            u: 0.0,
            v: 0.0,
            rgba: [0.0; 4],
            offset_rgba: [0.0; 4],
        }
    }
}

/// One polygon record. `context` is the byte offset of the raw 3/5-word
/// context in VRAM; index fields of -1 mean "not assigned".
#[derive(Debug, Clone, Copy)]
pub struct Polygon {
    /// VRAM byte offset of the polygon context
    pub context: u32,
    /// Number of vertexes (3 or 4, or up to 8 for single-polygon entries)
    pub vertex_count: u32,
    /// Index of the first vertex in the scene vertex array
    pub vertex_index: i32,
    /// Index of the first modified-volume vertex, for shadow pairs
    pub mod_vertex_index: i32,
    /// Next polygon of the same strip/array, for single-draw flattening
    pub next: i32,
    /// Chain for internally split polygons
    pub sub_next: i32,
}

/// Outcome flags from a parse
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseReport {
    /// A malformed tile list was encountered
    pub ta_error: bool,
    /// The polygon buffer filled up and polygons were dropped
    pub overflow: bool,
}

/// The assembled scene. Reset at the start of every parse, filled in two
/// passes, then consumed read-only by the display driver.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Flat vertex array (capacity grows, never shrinks)
    pub vertexes: Vec<Vertex>,
    /// Polygon records
    pub polys: Vec<Polygon>,
    /// Index of the background polygon in `polys`, if present
    pub bkgnd_poly: i32,
    /// Clip/z bounds: x1, x2, y1, y2, z-near, z-far
    pub bounds: [f32; 6],
    /// Render buffer width in pixels, from the highest tile coordinate
    pub buffer_width: u32,
    /// Render buffer height in pixels
    pub buffer_height: u32,
    /// Translucency sort policy
    pub sort_mode: SortMode,
    /// Shadow treatment
    pub shadow_mode: ShadowMode,
    /// VRAM byte offset of the tile segment list (not owned)
    pub segment_list: u32,
    /// VRAM byte offset of the polygon heap
    pub poly_base: u32,
    /// Total vertexes discovered in pass 1 (modified vertexes count twice)
    vertex_count: u32,
    /// Pass-2 allocation cursor
    vertex_index: u32,
    /// Word-offset to polygon-index lookup, -1 when unclaimed
    buf_to_poly: Vec<i32>,
}

impl Scene {
    /// Allocate the scene buffers
    pub fn new() -> Self {
        Self {
            vertexes: Vec::new(),
            polys: Vec::with_capacity(64),
            bkgnd_poly: -1,
            bounds: [0.0; 6],
            buffer_width: 0,
            buffer_height: 0,
            sort_mode: SortMode::ByFlag,
            shadow_mode: ShadowMode::Full,
            segment_list: 0,
            poly_base: 0,
            vertex_count: 0,
            vertex_index: 0,
            buf_to_poly: vec![-1; BUF_POLY_MAP_ENTRIES],
        }
    }

    /// Clear the scene structures in preparation for fresh data
    pub fn reset(&mut self) {
        self.polys.clear();
        self.vertexes.clear();
        self.bkgnd_poly = -1;
        self.vertex_count = 0;
        self.vertex_index = 0;
        self.buf_to_poly.fill(-1);
    }

    /// Number of polygons in the scene (background included)
    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    /// Number of expanded vertexes
    pub fn vertex_count(&self) -> usize {
        self.vertexes.len()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a 16-bit float to single precision. The hardware policy is not
/// IEEE: any exponent-31 pattern (infinities *and* NaNs) becomes a signed
/// infinity.
pub fn half_to_float(half: u16) -> f32 {
    let sign = (u32::from(half) & 0x8000) << 16;
    let exp = (half >> 10) & 0x1F;
    if exp == 0x1F {
        return f32::from_bits(sign | 0x7F80_0000);
    }
    let e = (i32::from(exp) - 15 + 127) as u32;
    f32::from_bits(sign | (e << 23) | ((u32::from(half) & 0x03FF) << 13))
}

#[inline]
fn bgra_byte(b: u32) -> f32 {
    (b & 0xFF) as f32 / 255.0
}

/// Unpack a BGRA colour word to RGBA floats
fn bgra_to_rgba(bgra: u32, force_alpha: bool) -> [f32; 4] {
    [
        bgra_byte(bgra >> 16),
        bgra_byte(bgra >> 8),
        bgra_byte(bgra),
        if force_alpha { 1.0 } else { bgra_byte(bgra >> 24) },
    ]
}

#[inline]
fn vram_u32(vram: &[u8], offset: u32) -> u32 {
    let off = (offset as usize) & (vram.len() - 1) & !0x3;
    u32::from_le_bytes(vram[off..off + 4].try_into().unwrap())
}

#[inline]
fn vram_f32(vram: &[u8], offset: u32) -> f32 {
    f32::from_bits(vram_u32(vram, offset))
}

/// One decoded tile-list entry
struct ListEntry {
    poly_addr: u32,
    vertex_length: u32,
    context_length: u32,
    is_modified: bool,
}

enum EntryKind {
    /// `strip_count` triangles of 3 vertexes
    Triangles(u32),
    /// `strip_count` quads of 4 vertexes
    Quads(u32),
    /// One polygon of the given vertex count
    Single(u32),
}

impl ListEntry {
    fn decode(entry: u32, full_shadow: bool) -> (ListEntry, Option<EntryKind>) {
        let is_modified = entry & 0x0100_0000 != 0 && full_shadow;
        let mut vertex_length = (entry >> 21) & 0x07;
        let context_length = if is_modified {
            vertex_length <<= 1;
            5
        } else {
            3
        };
        vertex_length += 3;

        let kind = if entry & 0xE000_0000 == 0x8000_0000 {
            Some(EntryKind::Triangles(((entry >> 25) & 0x0F) + 1))
        } else if entry & 0xE000_0000 == 0xA000_0000 {
            Some(EntryKind::Quads(((entry >> 25) & 0x0F) + 1))
        } else {
            // Single polygon; the low 6 mask bits give the vertex count
            let mut last = -1i32;
            for i in (0..6).rev() {
                if entry & (0x4000_0000 >> i) != 0 {
                    last = i;
                    break;
                }
            }
            if last >= 0 {
                Some(EntryKind::Single(last as u32 + 3))
            } else {
                None
            }
        };

        (
            ListEntry {
                poly_addr: entry & 0x000F_FFFF,
                vertex_length,
                context_length,
                is_modified,
            },
            kind,
        )
    }
}

impl Scene {
    /// Claim or grow the polygon record for a context at `poly_addr` (a
    /// word offset into the polygon heap). The same polygon appears in many
    /// tiles; later sightings may raise the vertex count.
    fn add_polygon(&mut self, poly_addr: u32, vertex_count: u32, is_modified: bool, report: &mut ParseReport) -> i32 {
        let vert_mul = if is_modified { 2 } else { 1 };
        let slot = (poly_addr as usize) & (BUF_POLY_MAP_ENTRIES - 1);

        let existing = self.buf_to_poly[slot];
        if existing >= 0 {
            let known = self.polys[existing as usize].vertex_count;
            if vertex_count > known {
                self.vertex_count += (vertex_count - known) * vert_mul;
                self.polys[existing as usize].vertex_count = vertex_count;
            }
            return existing;
        }

        if self.polys.len() >= MAX_POLYGONS {
            if !report.overflow {
                log::warn!("Scene polygon buffer exhausted, dropping polygons");
            }
            report.overflow = true;
            return -1;
        }

        let idx = self.polys.len() as i32;
        self.polys.push(Polygon {
            context: self.poly_base + (poly_addr << 2),
            vertex_count,
            vertex_index: -1,
            mod_vertex_index: -1,
            next: -1,
            sub_next: -1,
        });
        self.buf_to_poly[slot] = idx;
        self.vertex_count += vertex_count * vert_mul;
        idx
    }

    /// Pass 1 over one tile list: discover polygons and vertex counts,
    /// chaining strip-array members for single-draw flattening
    fn extract_polygons(&mut self, vram: &[u8], tile_entry: u32, report: &mut ParseReport) {
        let mut addr = tile_entry;
        for _ in 0..MAX_LIST_ENTRIES {
            let entry = vram_u32(vram, addr);
            addr = addr.wrapping_add(4);
            match entry >> 28 {
                0x0F => return,
                0x0E => addr = entry & 0x007F_FFFF,
                _ => {
                    let (le, kind) = ListEntry::decode(entry, self.shadow_mode == ShadowMode::Full);
                    match kind {
                        Some(EntryKind::Triangles(strip_count)) => {
                            let polygon_length = 3 * le.vertex_length + le.context_length;
                            let mut poly_addr = le.poly_addr;
                            let mut last_poly = -1i32;
                            for _ in 0..strip_count {
                                let poly = self.add_polygon(poly_addr, 3, le.is_modified, report);
                                if poly < 0 {
                                    return;
                                }
                                poly_addr += polygon_length;
                                if last_poly >= 0 && self.polys[last_poly as usize].next < 0 {
                                    self.polys[last_poly as usize].next = poly;
                                }
                                last_poly = poly;
                            }
                        }
                        Some(EntryKind::Quads(strip_count)) => {
                            let polygon_length = 4 * le.vertex_length + le.context_length;
                            let mut poly_addr = le.poly_addr;
                            let mut last_poly = -1i32;
                            for _ in 0..strip_count {
                                let poly = self.add_polygon(poly_addr, 4, le.is_modified, report);
                                if poly < 0 {
                                    return;
                                }
                                poly_addr += polygon_length;
                                if last_poly >= 0 && self.polys[last_poly as usize].next < 0 {
                                    self.polys[last_poly as usize].next = poly;
                                }
                                last_poly = poly;
                            }
                        }
                        Some(EntryKind::Single(vertex_count)) => {
                            if self.add_polygon(le.poly_addr, vertex_count, le.is_modified, report) < 0 {
                                return;
                            }
                        }
                        None => {}
                    }
                }
            }
        }
        log::warn!("Tile list at 0x{:08X} does not terminate", tile_entry);
        report.ta_error = true;
    }

    /// Decode one renderable vertex (not a shadow-volume vertex).
    /// `modify_offset` skips to the modified tex/colour data when decoding
    /// the second volume of a shadow pair.
    fn decode_render_vertex(&mut self, vram: &[u8], poly1: u32, poly2: u32, addr: u32, modify_offset: u32) -> Vertex {
        let mut vert = Vertex::default();
        let mut off = addr;
        let mut force_alpha = !poly2_alpha_enable(poly2);

        vert.x = vram_f32(vram, off);
        vert.y = vram_f32(vram, off + 4);
        let z = vram_f32(vram, off + 8);
        if z > self.bounds[5] {
            self.bounds[5] = z;
        } else if z < self.bounds[4] && z != 0.0 {
            self.bounds[4] = z;
        }
        vert.z = z;
        off += 12 + modify_offset * 4;

        if poly1_textured(poly1) {
            if poly1_uv16(poly1) {
                let uv = vram_u32(vram, off);
                vert.u = half_to_float((uv >> 16) as u16);
                vert.v = half_to_float(uv as u16);
                off += 4;
            } else {
                vert.u = vram_f32(vram, off);
                vert.v = vram_f32(vram, off + 4);
                off += 8;
            }
            if poly2_tex_blend(poly2) == 1 {
                force_alpha = true;
            }
        }

        vert.rgba = bgra_to_rgba(vram_u32(vram, off), force_alpha);
        if poly1_specular(poly1) {
            vert.offset_rgba = bgra_to_rgba(vram_u32(vram, off + 4), force_alpha);
        }
        vert
    }

    /// Compute z, texture and colour for a result point by barycentric
    /// interpolation from three input points. The result's x,y must already
    /// be set.
    fn compute_vertex(&mut self, result: &mut Vertex, input: &[Vertex; 3], is_solid_shaded: bool) {
        let sx = input[2].x - input[1].x;
        let sy = input[2].y - input[1].y;
        let tx = input[0].x - input[1].x;
        let ty = input[0].y - input[1].y;

        let detxy = sy * tx - ty * sx;
        if detxy == 0.0 {
            result.z = input[2].z;
            result.u = input[2].u;
            result.v = input[2].v;
            result.rgba = input[2].rgba;
            result.offset_rgba = input[2].offset_rgba;
            return;
        }
        let t = ((result.x - input[1].x) * sy - (result.y - input[1].y) * sx) / detxy;
        let s = ((result.y - input[1].y) * tx - (result.x - input[1].x) * ty) / detxy;

        let rz = input[1].z + t * (input[0].z - input[1].z) + s * (input[2].z - input[1].z);
        if rz > self.bounds[5] {
            self.bounds[5] = rz;
        } else if rz < self.bounds[4] {
            self.bounds[4] = rz;
        }
        result.z = rz;
        result.u = input[1].u + t * (input[0].u - input[1].u) + s * (input[2].u - input[1].u);
        result.v = input[1].v + t * (input[0].v - input[1].v) + s * (input[2].v - input[1].v);

        if is_solid_shaded {
            result.rgba = input[2].rgba;
            result.offset_rgba = input[2].offset_rgba;
        } else {
            for i in 0..4 {
                let tc = input[0].rgba[i] - input[1].rgba[i];
                let sc = input[2].rgba[i] - input[1].rgba[i];
                result.rgba[i] = (input[1].rgba[i] + t * tc + s * sc).clamp(0.0, 1.0);
                let tc = input[0].offset_rgba[i] - input[1].offset_rgba[i];
                let sc = input[2].offset_rgba[i] - input[1].offset_rgba[i];
                result.offset_rgba[i] =
                    (input[1].offset_rgba[i] + t * tc + s * sc).clamp(0.0, 1.0);
            }
        }
    }

    /// Pass 2 expansion for a triangle/polygon entry
    fn add_vertexes(&mut self, vram: &[u8], poly_addr: u32, vertex_length: u32, is_modified: bool) {
        let slot = (poly_addr as usize) & (BUF_POLY_MAP_ENTRIES - 1);
        let poly_idx = self.buf_to_poly[slot];
        if poly_idx < 0 {
            return;
        }
        let (context, vertex_count, assigned) = {
            let poly = &self.polys[poly_idx as usize];
            (poly.context, poly.vertex_count, poly.vertex_index)
        };
        if assigned != -1 {
            return;
        }

        let poly1 = vram_u32(vram, context);
        let poly2 = vram_u32(vram, context + 4);
        let context_words = if is_modified { 5 } else { 3 };
        let mut ptr = context + context_words * 4;

        let first = self.vertex_index;
        self.polys[poly_idx as usize].vertex_index = first as i32;
        for i in 0..vertex_count {
            let vert = self.decode_render_vertex(vram, poly1, poly2, ptr, 0);
            self.store_vertex(first + i, vert);
            ptr += vertex_length * 4;
        }
        self.vertex_index += vertex_count;

        if is_modified {
            let mod_offset = (vertex_length - 3) >> 1;
            let poly2m = vram_u32(vram, context + 12);
            let mut ptr = context + 5 * 4;
            let first = self.vertex_index;
            self.polys[poly_idx as usize].mod_vertex_index = first as i32;
            for i in 0..vertex_count {
                let vert = self.decode_render_vertex(vram, poly1, poly2m, ptr, mod_offset);
                self.store_vertex(first + i, vert);
                ptr += vertex_length * 4;
            }
            self.vertex_index += vertex_count;
        }
    }

    /// Pass 2 expansion for a quad (sprite) entry: decode the four corner
    /// positions, derive the implicit fourth vertex attributes, and emit in
    /// triangle-strip order (last two vertexes swapped)
    fn add_quad_vertexes(&mut self, vram: &[u8], poly_addr: u32, vertex_length: u32, is_modified: bool) {
        let slot = (poly_addr as usize) & (BUF_POLY_MAP_ENTRIES - 1);
        let poly_idx = self.buf_to_poly[slot];
        if poly_idx < 0 {
            return;
        }
        if self.polys[poly_idx as usize].vertex_index != -1 {
            return;
        }
        let context = self.polys[poly_idx as usize].context;

        let poly1 = vram_u32(vram, context);
        let poly2 = vram_u32(vram, context + 4);
        let context_words = if is_modified { 5 } else { 3 };

        let mut quad = [Vertex::default(); 4];
        let mut ptr = context + context_words * 4;
        for v in quad.iter_mut() {
            *v = self.decode_render_vertex(vram, poly1, poly2, ptr, 0);
            ptr += vertex_length * 4;
        }
        let base = [quad[0], quad[1], quad[2]];
        let mut fourth = quad[3];
        self.compute_vertex(&mut fourth, &base, !poly1_gouraud_shaded(poly1));
        quad[3] = fourth;

        let first = self.vertex_index;
        self.polys[poly_idx as usize].vertex_index = first as i32;
        // Quad arrangement to tri-strip arrangement
        self.store_vertex(first, quad[0]);
        self.store_vertex(first + 1, quad[1]);
        self.store_vertex(first + 2, quad[3]);
        self.store_vertex(first + 3, quad[2]);
        self.vertex_index += 4;

        if is_modified {
            let mod_offset = (vertex_length - 3) >> 1;
            let poly2m = vram_u32(vram, context + 12);
            let mut ptr = context + 5 * 4;
            let mut quad = [Vertex::default(); 4];
            for v in quad.iter_mut() {
                *v = self.decode_render_vertex(vram, poly1, poly2m, ptr, mod_offset);
                ptr += vertex_length * 4;
            }
            let base = [quad[0], quad[1], quad[2]];
            let mut fourth = quad[3];
            self.compute_vertex(&mut fourth, &base, !poly1_gouraud_shaded(poly1));
            quad[3] = fourth;

            let first = self.vertex_index;
            self.polys[poly_idx as usize].mod_vertex_index = first as i32;
            self.store_vertex(first, quad[0]);
            self.store_vertex(first + 1, quad[1]);
            self.store_vertex(first + 2, quad[3]);
            self.store_vertex(first + 3, quad[2]);
            self.vertex_index += 4;
        }
    }

    #[inline]
    fn store_vertex(&mut self, index: u32, vert: Vertex) {
        let index = index as usize;
        if index < self.vertexes.len() {
            self.vertexes[index] = vert;
        }
    }

    /// Pass 2 over one tile list
    fn extract_vertexes(&mut self, vram: &[u8], tile_entry: u32) {
        let mut addr = tile_entry;
        for _ in 0..MAX_LIST_ENTRIES {
            let entry = vram_u32(vram, addr);
            addr = addr.wrapping_add(4);
            match entry >> 28 {
                0x0F => return,
                0x0E => addr = entry & 0x007F_FFFF,
                _ => {
                    let (le, kind) = ListEntry::decode(entry, self.shadow_mode == ShadowMode::Full);
                    match kind {
                        Some(EntryKind::Triangles(strip_count)) => {
                            let polygon_length = 3 * le.vertex_length + le.context_length;
                            let mut poly_addr = le.poly_addr;
                            for _ in 0..strip_count {
                                self.add_vertexes(vram, poly_addr, le.vertex_length, le.is_modified);
                                poly_addr += polygon_length;
                            }
                        }
                        Some(EntryKind::Quads(strip_count)) => {
                            let polygon_length = 4 * le.vertex_length + le.context_length;
                            let mut poly_addr = le.poly_addr;
                            for _ in 0..strip_count {
                                self.add_quad_vertexes(vram, poly_addr, le.vertex_length, le.is_modified);
                                poly_addr += polygon_length;
                            }
                        }
                        Some(EntryKind::Single(_)) => {
                            self.add_vertexes(vram, le.poly_addr, le.vertex_length, le.is_modified);
                        }
                        None => {}
                    }
                }
            }
        }
    }

    /// Append the background polygon record. The background context is
    /// located from the background-plane register relative to the polygon
    /// heap; it stays a context-only record (never expanded into the vertex
    /// array) and the renderer reads the raw context.
    fn add_background(&mut self, bgplane: u32) {
        if self.polys.len() >= MAX_POLYGONS {
            return;
        }
        let context = self.poly_base + ((bgplane & 0x00FF_FFF8) >> 1);
        self.bkgnd_poly = self.polys.len() as i32;
        self.polys.push(Polygon {
            context,
            vertex_count: 4,
            vertex_index: -1,
            mod_vertex_index: -1,
            next: -1,
            sub_next: -1,
        });
    }
}

/// Registers consumed by a scene parse
#[derive(Debug, Clone, Copy)]
pub struct RenderRegs {
    /// RENDER_TILEBASE: byte offset of the tile segment list
    pub tile_base: u32,
    /// RENDER_POLYBASE: byte offset of the polygon heap
    pub poly_base: u32,
    /// RENDER_HCLIP
    pub hclip: u32,
    /// RENDER_VCLIP
    pub vclip: u32,
    /// RENDER_FARCLIP as raw bits
    pub far_clip: u32,
    /// RENDER_SHADOW
    pub shadow: u32,
    /// RENDER_OBJCFG
    pub obj_cfg: u32,
    /// RENDER_ISPCFG
    pub isp_cfg: u32,
    /// RENDER_BGPLANE
    pub bg_plane: u32,
}

/// Extract the current scene from VRAM into `scene`.
///
/// Pass 1 extracts the polygon list (finding final vertex counts), pass 2
/// extracts the vertex data. A single pass is not possible since a
/// polygon's size is only certain once every tile containing it has been
/// seen.
pub fn scene_read(scene: &mut Scene, bus: &Bus, regs: &RenderRegs) -> ParseReport {
    let mut report = ParseReport::default();
    let Some(vram) = bus.region_mem(crate::core::memory::MEM_REGION_VIDEO) else {
        log::error!("No VRAM region, scene parse skipped");
        report.ta_error = true;
        return report;
    };

    scene.reset();
    scene.segment_list = regs.tile_base;
    scene.poly_base = regs.poly_base;

    scene.bounds[0] = (regs.hclip & 0x03FF) as f32;
    scene.bounds[1] = ((regs.hclip >> 16) & 0x03FF) as f32 + 1.0;
    scene.bounds[2] = (regs.vclip & 0x03FF) as f32;
    scene.bounds[3] = ((regs.vclip >> 16) & 0x03FF) as f32 + 1.0;
    scene.bounds[4] = f32::from_bits(regs.far_clip);
    scene.bounds[5] = scene.bounds[4];

    scene.shadow_mode = if regs.shadow & 0x100 != 0 {
        ShadowMode::Cheap
    } else {
        ShadowMode::Full
    };
    scene.sort_mode = if regs.obj_cfg & 0x0020_0000 == 0 {
        if regs.isp_cfg & 1 != 0 {
            SortMode::Never
        } else {
            SortMode::Always
        }
    } else {
        SortMode::ByFlag
    };

    // Pass 1: extract polygon list
    let mut max_tile_x = 0;
    let mut max_tile_y = 0;
    let mut segment = regs.tile_base;
    for count in 0..MAX_SEGMENTS {
        let control = vram_u32(vram, segment);
        segment = segment.wrapping_add(4);
        max_tile_x = max_tile_x.max(segment_x(control));
        max_tile_y = max_tile_y.max(segment_y(control));
        for _ in 0..5 {
            let ptr = vram_u32(vram, segment);
            if ptr & NO_POINTER == 0 {
                scene.extract_polygons(vram, ptr, &mut report);
            }
            segment = segment.wrapping_add(4);
        }
        if control & SEGMENT_END != 0 {
            break;
        }
        if count + 1 == MAX_SEGMENTS {
            log::warn!("Segment list at 0x{:08X} does not terminate", regs.tile_base);
            report.ta_error = true;
        }
    }

    scene.buffer_width = (max_tile_x + 1) << 5;
    scene.buffer_height = (max_tile_y + 1) << 5;

    scene.add_background(regs.bg_plane);

    if scene.vertex_count > 0 {
        // Pass 2: extract vertex data
        scene.vertexes.clear();
        scene
            .vertexes
            .resize(scene.vertex_count as usize, Vertex::default());
        scene.vertex_index = 0;
        let mut segment = regs.tile_base;
        for _ in 0..MAX_SEGMENTS {
            let control = vram_u32(vram, segment);
            segment = segment.wrapping_add(4);
            for _ in 0..5 {
                let ptr = vram_u32(vram, segment);
                if ptr & NO_POINTER == 0 {
                    scene.extract_vertexes(vram, ptr);
                }
                segment = segment.wrapping_add(4);
            }
            if control & SEGMENT_END != 0 {
                break;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_to_float_basics() {
        assert_eq!(half_to_float(0x3C00), 1.0);
        assert_eq!(half_to_float(0xC000), -2.0);
        assert_eq!(half_to_float(0x3800), 0.5);
    }

    #[test]
    fn test_half_to_float_nan_is_signed_infinity() {
        // Exponent-31 patterns with a nonzero mantissa are NaN in IEEE but
        // become signed infinities here
        let pos_nan = half_to_float(0x7C01);
        let neg_nan = half_to_float(0xFC01);
        assert!(pos_nan.is_infinite() && pos_nan.is_sign_positive());
        assert!(neg_nan.is_infinite() && neg_nan.is_sign_negative());
        assert_eq!(half_to_float(0x7C00), f32::INFINITY);
    }

    #[test]
    fn test_bgra_conversion() {
        let rgba = bgra_to_rgba(0x80FF_0000, false);
        assert_eq!(rgba[0], 1.0); // R from bits 16-23
        assert_eq!(rgba[1], 0.0);
        assert_eq!(rgba[2], 0.0);
        assert!((rgba[3] - 128.0 / 255.0).abs() < 1e-6);

        let forced = bgra_to_rgba(0x0000_00FF, true);
        assert_eq!(forced[2], 1.0); // B from bits 0-7
        assert_eq!(forced[3], 1.0);
    }

    #[test]
    fn test_segment_coordinates() {
        let control = (5 << 2) | (9 << 8);
        assert_eq!(segment_x(control), 5);
        assert_eq!(segment_y(control), 9);
    }

    #[test]
    fn test_compute_vertex_interpolates() {
        let mut scene = Scene::new();
        let mut input = [Vertex::default(); 3];
        input[0].x = 0.0;
        input[0].y = 0.0;
        input[0].z = 1.0;
        input[1].x = 10.0;
        input[1].y = 0.0;
        input[1].z = 1.0;
        input[2].x = 10.0;
        input[2].y = 10.0;
        input[2].z = 1.0;
        input[0].u = 0.0;
        input[1].u = 1.0;
        input[2].u = 1.0;
        input[0].v = 0.0;
        input[1].v = 0.0;
        input[2].v = 1.0;

        // The implicit corner of the parallelogram
        let mut result = Vertex { x: 0.0, y: 10.0, ..Default::default() };
        let base = input;
        scene.compute_vertex(&mut result, &base, false);
        assert!((result.z - 1.0).abs() < 1e-5);
        assert!((result.u - 0.0).abs() < 1e-5);
        assert!((result.v - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_triangle_copies_vertex2() {
        let mut scene = Scene::new();
        let mut input = [Vertex::default(); 3];
        for v in input.iter_mut() {
            v.x = 1.0;
            v.y = 1.0;
        }
        input[2].z = 7.0;
        input[2].u = 0.25;
        let mut result = Vertex { x: 5.0, y: 5.0, ..Default::default() };
        scene.compute_vertex(&mut result, &input, false);
        assert_eq!(result.z, 7.0);
        assert_eq!(result.u, 0.25);
    }
}

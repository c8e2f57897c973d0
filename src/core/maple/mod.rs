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

//! Maple bus DMA
//!
//! The maple controller processes a descriptor list in system RAM: each
//! packet is a 3-word header (transfer control, output buffer address,
//! command word) followed by the command payload. Responses are written to
//! the output buffer and the DMA-complete event is raised once the packet
//! flagged "last" has been handled.
//!
//! Input devices are a capability record: a port with no device attached
//! answers every frame with NO_RESPONSE, which is all a device-less core
//! needs to satisfy boot code polling the bus.

use crate::core::asic::{self, events};
use crate::core::system::Dreamcast;

/// Response written when nothing answers on a port
pub const NO_RESPONSE: u32 = 0xFFFF_FFFF;

/// Safety cap on packets per DMA buffer
const MAX_PACKETS: usize = 64;

/// A device attached to a maple port
pub trait MapleDevice {
    /// Handle one maple frame. `cmd` is the command code, `recv_addr` and
    /// `send_addr` the bus addresses from the frame header, `payload` the
    /// trailing data words. Returns the full response frame (header word
    /// first), or `None` for no response.
    fn handle_frame(
        &mut self,
        cmd: u32,
        recv_addr: u32,
        send_addr: u32,
        payload: &[u32],
    ) -> Option<Vec<u32>>;
}

/// The maple bus: one optional primary device per port A-D
#[derive(Default)]
pub struct MapleBus {
    devices: [Option<Box<dyn MapleDevice>>; 4],
}

impl MapleBus {
    /// Create a bus with no devices attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device to a port (0-3), replacing any existing one
    pub fn attach(&mut self, port: usize, device: Box<dyn MapleDevice>) {
        self.devices[port] = Some(device);
    }

    /// Detach the device on a port
    pub fn detach(&mut self, port: usize) {
        self.devices[port] = None;
    }
}

/// Process the maple DMA descriptor list at `address`
pub(crate) fn handle_buffer(dc: &mut Dreamcast, address: u32) {
    if dc.bus.mem_get_region(address).is_none() {
        log::error!("Invalid or unmapped buffer passed to maple (0x{:08X})", address);
        return;
    }

    let mut addr = address;
    for _ in 0..MAX_PACKETS {
        let control = dc.bus.read32(addr);
        let last = control & 0x8000_0000 != 0;
        let port = ((control >> 16) & 0x03) as usize;
        let length = control & 0xFF;
        let return_addr = dc.bus.read32(addr + 4);
        let cmd_word = dc.bus.read32(addr + 8);
        let cmd = cmd_word & 0xFF;
        let recv_addr = (cmd_word >> 8) & 0xFF;
        let send_addr = (cmd_word >> 16) & 0xFF;

        if return_addr == 0 || dc.bus.mem_get_region(return_addr).is_none() {
            log::error!("Maple packet with bad return buffer 0x{:08X}", return_addr);
            asic::asic_event(dc, events::MAPLE_ERR);
            return;
        }

        // Frame sanity: the length echoed in the command word and the
        // port encoded in the addresses must agree with the header
        if (cmd_word >> 24) & 0xFF != length || send_addr >> 6 != port as u32 {
            log::warn!("Malformed maple frame at 0x{:08X}, skipping", addr);
            dc.bus.write32(return_addr, NO_RESPONSE);
        } else {
            let mut payload = Vec::with_capacity(length as usize);
            for i in 0..length {
                payload.push(dc.bus.read32(addr + 12 + i * 4));
            }
            let response = dc.maple.devices[port]
                .as_mut()
                .and_then(|dev| dev.handle_frame(cmd, recv_addr, send_addr, &payload));
            match response {
                Some(words) => {
                    for (i, word) in words.iter().enumerate() {
                        dc.bus.write32(return_addr + (i as u32) * 4, *word);
                    }
                }
                None => dc.bus.write32(return_addr, NO_RESPONSE),
            }
        }

        addr += 12 + length * 4;
        if last {
            break;
        }
    }

    asic::asic_event(dc, events::MAPLE_DMA);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::Dreamcast;

    const ASIC_BASE: u32 = 0x005F_6000;

    fn write_packet(dc: &mut Dreamcast, addr: u32, port: u32, last: bool, return_addr: u32) {
        let mut control = port << 16;
        if last {
            control |= 0x8000_0000;
        }
        dc.write32(addr, control);
        dc.write32(addr + 4, return_addr);
        // DEVINFO request to the port's primary peripheral
        dc.write32(addr + 8, 0x0000_0001 | ((port << 6) << 16) | ((port << 6 | 0x20) << 8));
    }

    #[test]
    fn test_empty_bus_answers_no_response() {
        let mut dc = Dreamcast::new();
        write_packet(&mut dc, 0x0C01_0000, 0, true, 0x0C02_0000);
        dc.write32(0x0C02_0000, 0);

        handle_buffer(&mut dc, 0x0C01_0000);
        assert_eq!(dc.read32(0x0C02_0000), NO_RESPONSE);
        // DMA-complete event raised
        assert_ne!(
            dc.read32(ASIC_BASE + 0x900) & (1 << crate::core::asic::events::MAPLE_DMA),
            0
        );
    }

    #[test]
    fn test_multiple_packets_until_last() {
        let mut dc = Dreamcast::new();
        write_packet(&mut dc, 0x0C01_0000, 0, false, 0x0C02_0000);
        write_packet(&mut dc, 0x0C01_000C, 1, true, 0x0C02_0100);
        write_packet(&mut dc, 0x0C01_0018, 2, true, 0x0C02_0200); // never reached

        handle_buffer(&mut dc, 0x0C01_0000);
        assert_eq!(dc.read32(0x0C02_0000), NO_RESPONSE);
        assert_eq!(dc.read32(0x0C02_0100), NO_RESPONSE);
        assert_eq!(dc.read32(0x0C02_0200), 0);
    }

    struct StubPad;

    impl MapleDevice for StubPad {
        fn handle_frame(&mut self, cmd: u32, _recv: u32, _send: u32, _payload: &[u32]) -> Option<Vec<u32>> {
            // Answer DEVINFO with a device-status frame
            if cmd == 1 {
                Some(vec![0x0000_0005, 0x0100_0000])
            } else {
                None
            }
        }
    }

    #[test]
    fn test_attached_device_responds() {
        let mut dc = Dreamcast::new();
        dc.maple.attach(0, Box::new(StubPad));
        write_packet(&mut dc, 0x0C01_0000, 0, true, 0x0C02_0000);

        handle_buffer(&mut dc, 0x0C01_0000);
        assert_eq!(dc.read32(0x0C02_0000), 0x0000_0005);
        assert_eq!(dc.read32(0x0C02_0004), 0x0100_0000);
    }

    #[test]
    fn test_maple_state_register_kicks_dma() {
        let mut dc = Dreamcast::new();
        write_packet(&mut dc, 0x0C01_0000, 0, true, 0x0C02_0000);
        dc.write32(ASIC_BASE + 0xC04, 0x0C01_0000); // MAPLE_DMA address
        dc.write32(ASIC_BASE + 0xC18, 1); // MAPLE_STATE: go
        assert_eq!(dc.read32(0x0C02_0000), NO_RESPONSE);
        // State register self-clears
        assert_eq!(dc.read32(ASIC_BASE + 0xC18), 0);
    }
}

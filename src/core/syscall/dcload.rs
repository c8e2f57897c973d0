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

//! dcload console syscall implementation
//!
//! Homebrew built against dc-load expects a console host behind a syscall
//! vector: the magic word 0xDEADBEEF at 0x8C004004 and the handler vector at
//! 0x8C004008. A 16-entry table maps emulator fds to host fds, with
//! {0,1,2} pre-wired to the host's stdio. Unless "allow unsafe" is enabled,
//! only read/write/lseek on granted fds are honoured; open, close and exit
//! are denied so guest code cannot touch the local filesystem.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use super::HookHandler;
use crate::core::system::Dreamcast;

// dcload syscall numbers
const SYS_READ: u32 = 0;
const SYS_WRITE: u32 = 1;
const SYS_OPEN: u32 = 2;
const SYS_CLOSE: u32 = 3;
const SYS_LSEEK: u32 = 9;
const SYS_EXIT: u32 = 15;

/// Magic word checked by dcload clients
pub const SYS_MAGIC: u32 = 0xDEAD_BEEF;
/// Address of the magic word
pub const SYS_MAGIC_ADDR: u32 = 0x8C00_4004;
/// Address of the syscall vector
pub const SYSCALL_ADDR: u32 = 0x8C00_4008;

/// Open fd table depth
pub const MAX_OPEN_FDS: usize = 16;

/// A host file behind an emulator fd
pub enum HostFd {
    /// Slot free
    Closed,
    /// Host standard input
    Stdin,
    /// Host standard output
    Stdout,
    /// Host standard error
    Stderr,
    /// A host file (only reachable with allow-unsafe)
    File(File),
}

impl HostFd {
    fn is_open(&self) -> bool {
        !matches!(self, HostFd::Closed)
    }
}

/// dcload host state
pub struct DcloadState {
    /// Emulator-fd to host-fd mapping
    fds: Vec<HostFd>,
    /// Gate for open/close/exit and local filesystem access
    pub allow_unsafe: bool,
}

impl DcloadState {
    /// Fresh table with stdio pre-wired
    pub fn new() -> Self {
        let mut fds: Vec<HostFd> = (0..MAX_OPEN_FDS).map(|_| HostFd::Closed).collect();
        fds[0] = HostFd::Stdin;
        fds[1] = HostFd::Stdout;
        fds[2] = HostFd::Stderr;
        Self { fds, allow_unsafe: false }
    }

    fn alloc_fd(&self) -> Option<usize> {
        self.fds.iter().position(|fd| !fd.is_open())
    }

    fn get(&mut self, fd: u32) -> Option<&mut HostFd> {
        let fd = fd as usize;
        if fd >= MAX_OPEN_FDS || !self.fds[fd].is_open() {
            None
        } else {
            Some(&mut self.fds[fd])
        }
    }
}

impl Default for DcloadState {
    fn default() -> Self {
        Self::new()
    }
}

fn read_guest_string(dc: &Dreamcast, addr: u32) -> String {
    let mut bytes = Vec::new();
    let mut addr = addr;
    loop {
        let b = dc.bus.read8(addr);
        if b == 0 || bytes.len() > 4096 {
            break;
        }
        bytes.push(b);
        addr = addr.wrapping_add(1);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The dcload syscall dispatcher: syscall number in r4, arguments in
/// r5-r7, result in r0
pub fn syscall(dc: &mut Dreamcast, _hook_id: u32) {
    let result: i64 = match dc.sh4.r[4] {
        SYS_READ => {
            let fd = dc.sh4.r[5];
            let buf_addr = dc.sh4.r[6];
            let length = dc.sh4.r[7] as usize;
            match dc.syscall.dcload.get(fd) {
                None => -1,
                Some(host) => {
                    let mut buf = vec![0u8; length];
                    let n = match host {
                        HostFd::Stdin => std::io::stdin().read(&mut buf).map(|n| n as i64),
                        HostFd::File(f) => f.read(&mut buf).map(|n| n as i64),
                        _ => Ok(-1),
                    };
                    match n {
                        Ok(n) if n >= 0 => {
                            dc.bus.copy_to(buf_addr, &buf[..n as usize]);
                            n
                        }
                        _ => -1,
                    }
                }
            }
        }
        SYS_WRITE => {
            let fd = dc.sh4.r[5];
            let buf_addr = dc.sh4.r[6];
            let length = dc.sh4.r[7] as usize;
            let mut buf = vec![0u8; length];
            dc.bus.copy_from(buf_addr, &mut buf);
            match dc.syscall.dcload.get(fd) {
                None => -1,
                Some(host) => {
                    let n = match host {
                        HostFd::Stdout => std::io::stdout().write(&buf).map(|n| n as i64),
                        HostFd::Stderr => std::io::stderr().write(&buf).map(|n| n as i64),
                        HostFd::File(f) => f.write(&buf).map(|n| n as i64),
                        HostFd::Stdin => Ok(-1),
                        HostFd::Closed => Ok(-1),
                    };
                    n.unwrap_or(-1)
                }
            }
        }
        SYS_LSEEK => {
            let fd = dc.sh4.r[5];
            let offset = dc.sh4.r[6] as i32;
            let whence = dc.sh4.r[7];
            match dc.syscall.dcload.get(fd) {
                Some(HostFd::File(f)) => {
                    let pos = match whence {
                        0 => SeekFrom::Start(offset as u64),
                        1 => SeekFrom::Current(i64::from(offset)),
                        _ => SeekFrom::End(i64::from(offset)),
                    };
                    f.seek(pos).map(|p| p as i64).unwrap_or(-1)
                }
                _ => -1,
            }
        }

        /* Secure access only */
        SYS_OPEN => {
            if dc.syscall.dcload.allow_unsafe {
                match dc.syscall.dcload.alloc_fd() {
                    None => -1,
                    Some(fd) => {
                        let path = read_guest_string(dc, dc.sh4.r[5]);
                        let flags = dc.sh4.r[6];
                        let file = if flags & 0x3 == 0 {
                            File::open(&path)
                        } else {
                            File::options()
                                .read(flags & 0x3 == 2)
                                .write(true)
                                .create(true)
                                .open(&path)
                        };
                        match file {
                            Ok(f) => {
                                dc.syscall.dcload.fds[fd] = HostFd::File(f);
                                fd as i64
                            }
                            Err(_) => -1,
                        }
                    }
                }
            } else {
                log::error!("Denying access to local filesystem");
                -1
            }
        }
        SYS_CLOSE => {
            if dc.syscall.dcload.allow_unsafe {
                let fd = dc.sh4.r[5] as usize;
                if fd >= MAX_OPEN_FDS || !dc.syscall.dcload.fds[fd].is_open() {
                    -1
                } else {
                    // The pre-wired stdio slots close in the table only
                    dc.syscall.dcload.fds[fd] = HostFd::Closed;
                    0
                }
            } else {
                -1
            }
        }
        SYS_EXIT => {
            if dc.syscall.dcload.allow_unsafe {
                std::process::exit(dc.sh4.r[5] as i32);
            }
            dc.stop();
            -1
        }
        _ => -1,
    };

    dc.sh4.r[0] = result as u32;
}

/// Install the dcload hook and magic word
pub fn install(dc: &mut Dreamcast) {
    dc.syscall.dcload = DcloadState::new();
    super::add_hook_vector(dc, 0xF0, SYSCALL_ADDR, HookHandler::Dcload);
    dc.write32(SYS_MAGIC_ADDR, SYS_MAGIC);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::syscall;

    #[test]
    fn test_install_writes_magic() {
        let mut dc = Dreamcast::new();
        install(&mut dc);
        assert_eq!(dc.read32(SYS_MAGIC_ADDR), SYS_MAGIC);
        assert_eq!(dc.read32(SYSCALL_ADDR), 0xFFFF_FFF0);
    }

    #[test]
    fn test_open_denied_when_locked_down() {
        let mut dc = Dreamcast::new();
        install(&mut dc);
        dc.sh4.r[4] = SYS_OPEN;
        dc.sh4.r[5] = 0x8C01_0000;
        syscall::invoke(&mut dc, 0xF0);
        assert_eq!(dc.sh4.r[0], -1i32 as u32);
    }

    #[test]
    fn test_bad_fd_rejected() {
        let mut dc = Dreamcast::new();
        install(&mut dc);
        dc.sh4.r[4] = SYS_READ;
        dc.sh4.r[5] = 12; // unopened slot
        dc.sh4.r[6] = 0x8C01_0000;
        dc.sh4.r[7] = 16;
        syscall::invoke(&mut dc, 0xF0);
        assert_eq!(dc.sh4.r[0], -1i32 as u32);
    }

    #[test]
    fn test_lseek_on_stdio_fails() {
        let mut dc = Dreamcast::new();
        install(&mut dc);
        dc.sh4.r[4] = SYS_LSEEK;
        dc.sh4.r[5] = 1;
        dc.sh4.r[6] = 0;
        dc.sh4.r[7] = 0;
        syscall::invoke(&mut dc, 0xF0);
        assert_eq!(dc.sh4.r[0], -1i32 as u32);
    }

    #[test]
    fn test_file_round_trip_with_allow_unsafe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"dcload test data").unwrap();
        let path_str = path.to_str().unwrap();

        let mut dc = Dreamcast::new();
        install(&mut dc);
        dc.syscall.dcload.allow_unsafe = true;

        // Write the path into guest RAM
        let mut bytes = path_str.as_bytes().to_vec();
        bytes.push(0);
        dc.bus.copy_to(0x8C01_0000, &bytes);

        dc.sh4.r[4] = SYS_OPEN;
        dc.sh4.r[5] = 0x8C01_0000;
        dc.sh4.r[6] = 0; // read-only
        syscall::invoke(&mut dc, 0xF0);
        let fd = dc.sh4.r[0];
        assert!((fd as i32) >= 3);

        dc.sh4.r[4] = SYS_READ;
        dc.sh4.r[5] = fd;
        dc.sh4.r[6] = 0x8C02_0000;
        dc.sh4.r[7] = 6;
        syscall::invoke(&mut dc, 0xF0);
        assert_eq!(dc.sh4.r[0], 6);
        let mut readback = [0u8; 6];
        dc.bus.copy_from(0x8C02_0000, &mut readback);
        assert_eq!(&readback, b"dcload");

        dc.sh4.r[4] = SYS_CLOSE;
        dc.sh4.r[5] = fd;
        syscall::invoke(&mut dc, 0xF0);
        assert_eq!(dc.sh4.r[0], 0);
    }
}

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

//! Save-state primitive readers/writers
//!
//! Little-endian scalar and length-prefixed string framing shared by the
//! memory bus and the system save-state header. Strings are capped at 64
//! bytes on read; anything longer marks a corrupt stream.

use std::io::{Read, Write};

use crate::core::error::{EmulatorError, Result};

/// Longest module/region name accepted in a save state
pub const MAX_NAME_LEN: u32 = 64;

/// Write a little-endian u32
pub fn write_u32(w: &mut dyn Write, value: u32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Read a little-endian u32
pub fn read_u32(r: &mut dyn Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a length-prefixed UTF-8 string
pub fn write_string(w: &mut dyn Write, s: &str) -> Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Read a length-prefixed UTF-8 string
///
/// # Errors
///
/// Returns [`EmulatorError::SaveStateCorrupt`] for an empty, oversized or
/// non-UTF-8 name.
pub fn read_string(r: &mut dyn Read) -> Result<String> {
    let len = read_u32(r)?;
    if len == 0 || len > MAX_NAME_LEN {
        return Err(EmulatorError::SaveStateCorrupt(format!(
            "bad string length {}",
            len
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| EmulatorError::SaveStateCorrupt("non UTF-8 name".to_string()))
}

/// Write a length-prefixed opaque byte block
pub fn write_block(w: &mut dyn Write, data: &[u8]) -> Result<()> {
    write_u32(w, data.len() as u32)?;
    w.write_all(data)?;
    Ok(())
}

/// Read a length-prefixed opaque byte block, bounded by `max`
pub fn read_block(r: &mut dyn Read, max: u32) -> Result<Vec<u8>> {
    let len = read_u32(r)?;
    if len > max {
        return Err(EmulatorError::SaveStateCorrupt(format!(
            "block length {} exceeds limit {}",
            len, max
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        assert_eq!(read_u32(&mut buf.as_slice()).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "System RAM").unwrap();
        assert_eq!(read_string(&mut buf.as_slice()).unwrap(), "System RAM");
    }

    #[test]
    fn test_bad_string_length_rejected() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 1000).unwrap();
        buf.extend_from_slice(&[0u8; 1000]);
        assert!(read_string(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_truncated_stream_fails() {
        let buf = vec![1u8, 2];
        assert!(read_u32(&mut buf.as_slice()).is_err());
    }
}

// This file is part of fabricd, an application to configure programmable logic and manage its memory map.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// fabricd is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// fabricd is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Decoder for the tagged header of a `.bit` configuration file.
//!
//! The layout is a short opaque preamble followed by a sequence of tagged fields:
//!
//! ```text
//! u16 len0, [len0 bytes]       opaque leading field
//! u16                          fixed field (usually 1)
//! 'a' u16 len, text\0          "<design>;...;Version=<version>"
//! 'b' u16 len, text\0          part
//! 'c' u16 len, text\0          date
//! 'd' u16 len, text\0          time
//! 'e' u32 len, [len bytes]     configuration payload, must end the file
//! ```
//!
//! All integers are big-endian. The scanner is strict: truncated input, an unknown tag or a
//! payload which does not end exactly at the end of the file is rejected.

use crate::error::FabricdError;
use log::trace;

const TAG_DESIGN: u8 = 0x61;
const TAG_PART: u8 = 0x62;
const TAG_DATE: u8 = 0x63;
const TAG_TIME: u8 = 0x64;
const TAG_PAYLOAD: u8 = 0x65;

/// Header fields of a `.bit` file plus a borrowed view of its payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerHeader<'a> {
    pub design: String,
    pub version: String,
    pub part: String,
    pub date: String,
    pub time: String,
    /// Payload length in bytes, as recorded in the file.
    pub length: u32,
    pub payload: &'a [u8],
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], FabricdError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                FabricdError::Format(format!(
                    "truncated header: {what} needs {n} bytes at offset {:#x} but the file is {:#x} bytes long",
                    self.offset,
                    self.data.len()
                ))
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8, FabricdError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16_be(&mut self, what: &str) -> Result<u16, FabricdError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32_be(&mut self, what: &str) -> Result<u32, FabricdError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn text_field(&mut self, tag: u8) -> Result<String, FabricdError> {
        let len = self.u16_be("field length")? as usize;
        let raw = self.take(len, "field text")?;
        if !raw.is_ascii() {
            return Err(FabricdError::Format(format!(
                "field {tag:#x} contains non-ASCII text"
            )));
        }
        // the last byte is the NUL terminator
        let text = &raw[..raw.len().saturating_sub(1)];
        Ok(String::from_utf8_lossy(text).into_owned())
    }
}

/// Decode the tagged header of an in-memory `.bit` file.
///
/// # Returns: `Result<ContainerHeader, FabricdError>`
/// * `Ok(ContainerHeader)` - All fields found before the payload tag, and the payload itself
/// * `Err(FabricdError::Format)` - Truncated input, unknown field tag, or a payload length which
///   does not reach exactly to the end of `bit_data`
pub fn parse_bit_header(bit_data: &[u8]) -> Result<ContainerHeader<'_>, FabricdError> {
    let mut cursor = Cursor {
        data: bit_data,
        offset: 0,
    };
    let mut header = ContainerHeader::default();

    let leading = cursor.u16_be("leading field length")? as usize;
    cursor.take(leading, "leading field")?;
    cursor.take(2, "fixed field")?;

    loop {
        let tag = cursor.u8("field tag")?;
        match tag {
            TAG_DESIGN => {
                let text = cursor.text_field(tag)?;
                let mut segments = text.split(';');
                header.design = segments.next().unwrap_or_default().to_string();
                header.version = text.rsplit(';').next().unwrap_or_default().to_string();
            }
            TAG_PART => header.part = cursor.text_field(tag)?,
            TAG_DATE => header.date = cursor.text_field(tag)?,
            TAG_TIME => header.time = cursor.text_field(tag)?,
            TAG_PAYLOAD => {
                let length = cursor.u32_be("payload length")?;
                let expected_end = cursor.offset as u64 + u64::from(length);
                if expected_end != bit_data.len() as u64 {
                    return Err(FabricdError::Format(format!(
                        "invalid payload length {length:#x}: payload at offset {:#x} would end at \
                         {expected_end:#x} but the file is {:#x} bytes long",
                        cursor.offset,
                        bit_data.len()
                    )));
                }
                header.length = length;
                header.payload = &bit_data[cursor.offset..];
                trace!(
                    "Decoded bit header: design '{}', part '{}', {length} payload bytes",
                    header.design, header.part
                );
                return Ok(header);
            }
            _ => {
                return Err(FabricdError::Format(format!(
                    "unknown field {tag:#x} at offset {:#x}",
                    cursor.offset - 1
                )));
            }
        }
    }
}

/// Byte-swap every 32-bit word of `payload`.
///
/// A `.bit` payload is a stream of big-endian configuration words while the FPGA manager
/// expects the `.bin` form, so each word is reversed in place order. Applying this twice yields
/// the original bytes.
///
/// # Returns: `Result<Vec<u8>, FabricdError>`
/// * `Ok(Vec<u8>)` - The swapped payload
/// * `Err(FabricdError::Format)` - `payload.len()` is not a multiple of 4
pub fn swap_words(payload: &[u8]) -> Result<Vec<u8>, FabricdError> {
    if payload.len() % 4 != 0 {
        return Err(FabricdError::Format(format!(
            "payload length {} is not a multiple of 4 bytes",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(4)
        .flat_map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]).to_be_bytes())
        .collect())
}

/// Convert an in-memory `.bit` file into `.bin` data for the FPGA manager.
pub fn bit_to_bin(bit_data: &[u8]) -> Result<Vec<u8>, FabricdError> {
    let header = parse_bit_header(bit_data)?;
    swap_words(header.payload)
}

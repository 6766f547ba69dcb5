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

//! Section table reader for `.xclbin` ("axlf") packaged containers.
//!
//! Only the fixed header and the section table are interpreted here. Section contents are
//! handed out as opaque byte slices keyed by section kind; decoding a section is up to its
//! consumer (e.g. [`crate::metadata::topology`] for `MEM_TOPOLOGY`). When a kind appears more
//! than once, the last section of that kind is the one handed out.

use crate::error::FabricdError;
use log::{trace, warn};
use std::collections::BTreeMap;

pub const AXLF_MAGIC: &[u8; 8] = b"xclbin2\0";

const UNIQUE_ID_OFFSET: usize = 296;
const LENGTH_OFFSET: usize = 304;
const NUM_SECTIONS_OFFSET: usize = 448;
const SECTIONS_OFFSET: usize = 456;
const SECTION_HEADER_SIZE: usize = 40;

/// The subset of section kinds this crate looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum SectionKind {
    Bitstream = 0,
    EmbeddedMetadata = 2,
    MemTopology = 6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub kind: u32,
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// A parsed `.xclbin` container borrowing its backing bytes.
#[derive(Debug)]
pub struct Xclbin<'a> {
    pub unique_id: u64,
    pub headers: Vec<SectionHeader>,
    sections: BTreeMap<u32, &'a [u8]>,
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn le_u64(data: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(b)
}

/// Read a fixed-size NUL padded name.
pub(crate) fn c_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

impl<'a> Xclbin<'a> {
    /// Parse the header and section table of `data`.
    ///
    /// # Returns: `Result<Xclbin, FabricdError>`
    /// * `Ok(Xclbin)` - Every section lies within `data`
    /// * `Err(FabricdError::Format)` - Bad magic, truncated header or a section out of bounds
    pub fn parse(data: &'a [u8]) -> Result<Self, FabricdError> {
        if data.len() < SECTIONS_OFFSET || &data[..8] != AXLF_MAGIC {
            return Err(FabricdError::Format(
                "not an xclbin container: missing 'xclbin2' magic or truncated header".into(),
            ));
        }
        let length = le_u64(data, LENGTH_OFFSET);
        if length != data.len() as u64 {
            warn!(
                "xclbin header claims {length} bytes but {} are present",
                data.len()
            );
        }
        let count = le_u32(data, NUM_SECTIONS_OFFSET) as usize;
        let table_end = count
            .checked_mul(SECTION_HEADER_SIZE)
            .and_then(|n| n.checked_add(SECTIONS_OFFSET))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                FabricdError::Format(format!(
                    "xclbin section table for {count} sections does not fit in {} bytes",
                    data.len()
                ))
            })?;

        let mut headers = Vec::with_capacity(count);
        let mut sections = BTreeMap::new();
        for at in (SECTIONS_OFFSET..table_end).step_by(SECTION_HEADER_SIZE) {
            let header = SectionHeader {
                kind: le_u32(data, at),
                name: c_string(&data[at + 4..at + 20]),
                offset: le_u64(data, at + 24),
                size: le_u64(data, at + 32),
            };
            let end = header
                .offset
                .checked_add(header.size)
                .filter(|end| *end <= data.len() as u64)
                .ok_or_else(|| {
                    FabricdError::Format(format!(
                        "xclbin section '{}' (kind {}) at {:#x}+{:#x} lies outside the file",
                        header.name, header.kind, header.offset, header.size
                    ))
                })?;
            trace!(
                "xclbin section '{}' kind {} at {:#x}+{:#x}",
                header.name, header.kind, header.offset, header.size
            );
            sections.insert(header.kind, &data[header.offset as usize..end as usize]);
            headers.push(header);
        }

        Ok(Xclbin {
            unique_id: le_u64(data, UNIQUE_ID_OFFSET),
            headers,
            sections,
        })
    }

    /// The last section of the given kind, if present.
    pub fn section(&self, kind: SectionKind) -> Option<&'a [u8]> {
        self.sections.get(&(kind as u32)).copied()
    }
}

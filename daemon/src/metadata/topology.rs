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

//! The `MEM_TOPOLOGY` section of packaged metadata, in both its binary form (as found inside an
//! `.xclbin`) and the JSON form accepted by the packaging tool.

use crate::bitstream::xclbin::c_string;
use crate::error::FabricdError;
use crate::metadata::region::{MemoryRegion, MemoryRegistry};
use serde::{Deserialize, Serialize};

const ENTRIES_OFFSET: usize = 8;
const ENTRY_SIZE: usize = 40;

const MEM_TYPES: [&str; 12] = [
    "MEM_DDR3",
    "MEM_DDR4",
    "MEM_DRAM",
    "MEM_STREAMING",
    "MEM_PREALLOCATED_GLOB",
    "MEM_ARE",
    "MEM_HBM",
    "MEM_BRAM",
    "MEM_URAM",
    "MEM_STREAMING_CONNECTION",
    "MEM_HOST",
    "MEM_PS_KERNEL",
];

pub fn mem_type_name(code: u8) -> String {
    MEM_TYPES
        .get(code as usize)
        .map_or_else(|| format!("MEM_UNKNOWN_{code}"), |name| name.to_string())
}

/// Decode a binary `MEM_TOPOLOGY` section into packaged-side regions keyed by their tag.
///
/// Each region's `xrt_index` is its position in the section.
pub fn parse_mem_topology(section: &[u8]) -> Result<MemoryRegistry, FabricdError> {
    if section.len() < 4 {
        return Err(FabricdError::Format(
            "MEM_TOPOLOGY section is shorter than its count field".into(),
        ));
    }
    let count = i32::from_le_bytes([section[0], section[1], section[2], section[3]]);
    let count = usize::try_from(count).map_err(|_| {
        FabricdError::Format(format!("MEM_TOPOLOGY has a negative entry count {count}"))
    })?;
    let needed = count
        .checked_mul(ENTRY_SIZE)
        .and_then(|n| n.checked_add(ENTRIES_OFFSET))
        .unwrap_or(usize::MAX);
    if count > 0 && needed > section.len() {
        return Err(FabricdError::Format(format!(
            "MEM_TOPOLOGY declares {count} entries but the section is only {} bytes",
            section.len()
        )));
    }

    let mut registry = MemoryRegistry::new();
    for index in 0..count {
        let entry = &section[ENTRIES_OFFSET + index * ENTRY_SIZE..][..ENTRY_SIZE];
        let mut size_kb = [0u8; 8];
        size_kb.copy_from_slice(&entry[8..16]);
        let mut base = [0u8; 8];
        base.copy_from_slice(&entry[16..24]);
        registry.insert(MemoryRegion {
            tag: c_string(&entry[24..40]),
            base_address: Some(u64::from_le_bytes(base)),
            size_bytes: Some(u64::from_le_bytes(size_kb).saturating_mul(1024)),
            mem_type: Some(mem_type_name(entry[0])),
            used: Some(entry[1] != 0),
            xrt_index: Some(index),
            ..Default::default()
        });
    }
    Ok(registry)
}

/// One `m_mem_data` entry of the JSON topology document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemData {
    pub m_type: String,
    pub m_used: u8,
    #[serde(rename = "m_sizeKB")]
    pub m_size_kb: u64,
    pub m_tag: String,
    pub m_base_address: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemTopology {
    pub m_count: usize,
    pub m_mem_data: Vec<MemData>,
}

/// `{"mem_topology": {...}}`, the document passed to the packaging tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDocument {
    pub mem_topology: MemTopology,
}

impl TopologyDocument {
    pub fn to_json(&self) -> Result<String, FabricdError> {
        serde_json::to_string(self).map_err(|e| FabricdError::Json {
            what: "memory topology".into(),
            e,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use googletest::prelude::*;

    /// Encode `(type, size_kb, base, tag)` entries as a binary section.
    pub(crate) fn build_mem_topology(entries: &[(u8, u64, u64, &str)]) -> Vec<u8> {
        let mut data = vec![0u8; ENTRIES_OFFSET];
        data[..4].copy_from_slice(&(entries.len() as i32).to_le_bytes());
        for (mem_type, size_kb, base, tag) in entries {
            let mut entry = [0u8; ENTRY_SIZE];
            entry[0] = *mem_type;
            entry[1] = 1;
            entry[8..16].copy_from_slice(&size_kb.to_le_bytes());
            entry[16..24].copy_from_slice(&base.to_le_bytes());
            entry[24..24 + tag.len()].copy_from_slice(tag.as_bytes());
            data.extend_from_slice(&entry);
        }
        data
    }

    #[gtest]
    fn decodes_entries_in_order() {
        let section = build_mem_topology(&[(1, 256 * 1024, 0, "PSDDR"), (7, 64, 0xA000_0000, "bram")]);
        let registry = parse_mem_topology(&section).unwrap();
        let ps = registry.get("PSDDR").unwrap();
        expect_that!(ps.base_address, some(eq(0)));
        expect_that!(ps.size_bytes, some(eq(256 * 1024 * 1024)));
        expect_that!(ps.mem_type.as_deref(), some(eq("MEM_DDR4")));
        expect_that!(ps.xrt_index, some(eq(0)));
        let bram = registry.get("bram").unwrap();
        expect_that!(bram.base_address, some(eq(0xA000_0000)));
        expect_that!(bram.mem_type.as_deref(), some(eq("MEM_BRAM")));
        expect_that!(bram.xrt_index, some(eq(1)));
    }

    #[gtest]
    fn rejects_truncated_section() {
        let mut section = build_mem_topology(&[(1, 4, 0, "a")]);
        section.truncate(20);
        expect_that!(
            parse_mem_topology(&section),
            err(displays_as(contains_substring("declares 1 entries")))
        );
    }

    #[gtest]
    fn json_uses_tool_field_names() {
        let doc = TopologyDocument {
            mem_topology: MemTopology {
                m_count: 1,
                m_mem_data: vec![MemData {
                    m_type: "MEM_DDR4".into(),
                    m_used: 1,
                    m_size_kb: 4,
                    m_tag: "PSDDR".into(),
                    m_base_address: 0,
                }],
            },
        };
        let json = doc.to_json().unwrap();
        expect_that!(json, contains_substring("\"m_sizeKB\":4"));
        expect_that!(json, contains_substring("\"mem_topology\""));
    }
}

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

//! Hardware description input.
//!
//! The hardware description (`.hwh`) is produced by the vendor tools and parsed outside this
//! crate. What the loader needs from it is captured by [`HardwareDescription`]; any parser that
//! can produce one plugs in through [`DescriptionParser`].

use crate::error::FabricdError;
use crate::metadata::region::{MemoryRegion, MemoryRegistry};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One IP block of the design and its configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IpBlock {
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DescribedMemory {
    pub phys_addr: u64,
    pub addr_range: u64,
}

/// The parts of a hardware description the loader consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareDescription {
    /// Name of the processing-system IP. Absent for designs with no CPU-side interconnect.
    pub ps_name: Option<String>,
    /// Family of the processing system, e.g. `zynq_ultra_ps_e`.
    pub family_ps: Option<String>,
    pub ip: BTreeMap<String, IpBlock>,
    /// Tag-keyed memory regions, in document order.
    pub memories: MemoryRegistry,
}

impl HardwareDescription {
    /// Parameters of the processing-system IP, if the design has one.
    ///
    /// # Returns: `Result<Option<&BTreeMap<String, String>>, FabricdError>`
    /// * `Ok(None)` - The design names no processing system
    /// * `Ok(Some(..))` - Parameters of the named IP
    /// * `Err(FabricdError::RuntimeConfig)` - The named IP is not part of the design
    pub fn ps_parameters(&self) -> Result<Option<&BTreeMap<String, String>>, FabricdError> {
        let Some(name) = self.ps_name.as_ref() else {
            return Ok(None);
        };
        self.ip
            .get(name)
            .map(|ip| Some(&ip.parameters))
            .ok_or_else(|| {
                FabricdError::RuntimeConfig(format!(
                    "Processing system '{name}' is not in the design's IP"
                ))
            })
    }
}

/// A parser able to turn the text of a hardware description file into a
/// [`HardwareDescription`].
pub trait DescriptionParser {
    /// Extension of the sibling file this parser reads, without the leading dot.
    fn extension(&self) -> &str;

    fn parse(&self, text: &str) -> Result<HardwareDescription, FabricdError>;
}

#[derive(Debug, Deserialize)]
struct JsonDescription {
    ps_name: Option<String>,
    family_ps: Option<String>,
    #[serde(default)]
    ip_dict: BTreeMap<String, IpBlock>,
    /// Kept as a JSON map so region order follows the document.
    #[serde(default)]
    mem_dict: serde_json::Map<String, serde_json::Value>,
}

/// Reads a hardware description which has been exported to JSON next to the container as
/// `<stem>.hwh.json`.
#[derive(Debug, Default)]
pub struct JsonDescriptionParser;

impl DescriptionParser for JsonDescriptionParser {
    fn extension(&self) -> &str {
        "hwh.json"
    }

    fn parse(&self, text: &str) -> Result<HardwareDescription, FabricdError> {
        let json: JsonDescription = serde_json::from_str(text).map_err(|e| FabricdError::Json {
            what: "hardware description".into(),
            e,
        })?;
        let memories = json
            .mem_dict
            .into_iter()
            .map(|(tag, value)| {
                let mem: DescribedMemory =
                    serde_json::from_value(value).map_err(|e| FabricdError::Json {
                        what: format!("memory '{tag}' of the hardware description"),
                        e,
                    })?;
                Ok(MemoryRegion {
                    tag,
                    phys_addr: Some(mem.phys_addr),
                    addr_range: Some(mem.addr_range),
                    ..Default::default()
                })
            })
            .collect::<Result<MemoryRegistry, FabricdError>>()?;
        Ok(HardwareDescription {
            ps_name: json.ps_name,
            family_ps: json.family_ps,
            ip: json.ip_dict,
            memories,
        })
    }
}

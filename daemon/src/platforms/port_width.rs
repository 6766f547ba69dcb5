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

//! AXI port data-width fixup.
//!
//! The processing system boots with whatever AXI port widths the boot firmware configured, but
//! a full bitstream may have been built for different ones. The design's PS parameters
//! (`C_MAXIGP<n>_DATA_WIDTH`, `C_SAXIGP<n>_DATA_WIDTH`) are translated into register writes
//! that bring the interconnect in line with the loaded design. See Xilinx answer record 66295
//! for the meaning of the register values.
//!
//! Only the Zynq UltraScale+ family (`zynq_ultra_ps_e`) supports width changes. Other
//! families get an empty plan.

use crate::error::FabricdError;
use crate::metadata::description::HardwareDescription;
use crate::mmio::bitfield::{BitRange, RegisterAccess, write_field};
use log::{info, warn};

/// One register field driven by a design parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidthField {
    pub parameter: &'static str,
    pub register: &'static str,
    pub address: u64,
    pub range: BitRange,
}

/// A family of fields sharing one width encoding.
#[derive(Debug)]
pub struct WidthTable {
    pub fields: &'static [WidthField],
    /// `(width in bits, encoded field value)`
    pub encoding: &'static [(&'static str, u32)],
}

/// A single planned register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldWrite {
    pub register: &'static str,
    pub address: u64,
    pub range: BitRange,
    pub value: u32,
}

pub const ZYNQ_US_FAMILY: &str = "zynq_ultra_ps_e";

const fn field(
    parameter: &'static str,
    register: &'static str,
    address: u64,
    high: u8,
    low: u8,
) -> WidthField {
    WidthField {
        parameter,
        register,
        address,
        range: BitRange::new(high, low),
    }
}

pub static ZU_FPD_SLCR: WidthTable = WidthTable {
    fields: &[
        field("C_MAXIGP0_DATA_WIDTH", "FPD_SLCR.AXI_FS.DW_SS0_SEL", 0xFD61_5000, 9, 8),
        field("C_MAXIGP1_DATA_WIDTH", "FPD_SLCR.AXI_FS.DW_SS1_SEL", 0xFD61_5000, 11, 10),
        field("C_MAXIGP2_DATA_WIDTH", "LPD_SLCR.AXI_FS.DW_SS2_SEL", 0xFF41_9000, 9, 8),
    ],
    encoding: &[("32", 0), ("64", 1), ("128", 2)],
};

pub static ZU_AFIFM: WidthTable = WidthTable {
    fields: &[
        field("C_SAXIGP0_DATA_WIDTH", "AFIFM0.AFIFM_RDCTRL.FABRIC_WIDTH", 0xFD36_0000, 1, 0),
        field("C_SAXIGP0_DATA_WIDTH", "AFIFM0.AFIFM_WRCTRL.FABRIC_WIDTH", 0xFD36_0014, 1, 0),
        field("C_SAXIGP1_DATA_WIDTH", "AFIFM1.AFIFM_RDCTRL.FABRIC_WIDTH", 0xFD37_0000, 1, 0),
        field("C_SAXIGP1_DATA_WIDTH", "AFIFM1.AFIFM_WRCTRL.FABRIC_WIDTH", 0xFD37_0014, 1, 0),
        field("C_SAXIGP2_DATA_WIDTH", "AFIFM2.AFIFM_RDCTRL.FABRIC_WIDTH", 0xFD38_0000, 1, 0),
        field("C_SAXIGP2_DATA_WIDTH", "AFIFM2.AFIFM_WRCTRL.FABRIC_WIDTH", 0xFD38_0014, 1, 0),
        field("C_SAXIGP3_DATA_WIDTH", "AFIFM3.AFIFM_RDCTRL.FABRIC_WIDTH", 0xFD39_0000, 1, 0),
        field("C_SAXIGP3_DATA_WIDTH", "AFIFM3.AFIFM_WRCTRL.FABRIC_WIDTH", 0xFD39_0014, 1, 0),
        field("C_SAXIGP4_DATA_WIDTH", "AFIFM4.AFIFM_RDCTRL.FABRIC_WIDTH", 0xFD3A_0000, 1, 0),
        field("C_SAXIGP4_DATA_WIDTH", "AFIFM4.AFIFM_WRCTRL.FABRIC_WIDTH", 0xFD3A_0014, 1, 0),
        field("C_SAXIGP5_DATA_WIDTH", "AFIFM5.AFIFM_RDCTRL.FABRIC_WIDTH", 0xFD3B_0000, 1, 0),
        field("C_SAXIGP5_DATA_WIDTH", "AFIFM5.AFIFM_WRCTRL.FABRIC_WIDTH", 0xFD3B_0014, 1, 0),
        field("C_SAXIGP6_DATA_WIDTH", "AFIFM6.AFIFM_RDCTRL.FABRIC_WIDTH", 0xFF9B_0000, 1, 0),
        field("C_SAXIGP6_DATA_WIDTH", "AFIFM6.AFIFM_WRCTRL.FABRIC_WIDTH", 0xFF9B_0014, 1, 0),
    ],
    encoding: &[("32", 2), ("64", 1), ("128", 0)],
};

static ZU_TABLES: [&WidthTable; 2] = [&ZU_FPD_SLCR, &ZU_AFIFM];

/// Width tables for a PS family. Unknown families have none.
pub fn tables_for(family: &str) -> &'static [&'static WidthTable] {
    match family {
        ZYNQ_US_FAMILY => &ZU_TABLES,
        _ => &[],
    }
}

/// Translate the PS parameters of `description` into register writes.
///
/// Nothing is written here, so an unencodable width fails before any register changes.
///
/// # Returns: `Result<Vec<FieldWrite>, FabricdError>`
/// * `Ok(Vec<FieldWrite>)` - Writes in table order; empty when the design has no PS or the
///   family does not support width changes
/// * `Err(FabricdError::RuntimeConfig)` - A documented width has no encoding, or the named PS
///   is missing from the design
pub fn plan(description: &HardwareDescription) -> Result<Vec<FieldWrite>, FabricdError> {
    let Some(parameters) = description.ps_parameters()? else {
        return Ok(Vec::new());
    };
    let family = description.family_ps.as_deref().unwrap_or_default();
    let tables = tables_for(family);
    if tables.is_empty() {
        warn!("Setting port widths is not supported for PS family '{family}'");
        return Ok(Vec::new());
    }

    let mut writes = Vec::new();
    for table in tables {
        for field in table.fields {
            let Some(width) = parameters.get(field.parameter) else {
                continue;
            };
            let value = table
                .encoding
                .iter()
                .find(|(w, _)| *w == width.as_str())
                .map(|(_, v)| *v)
                .ok_or_else(|| {
                    FabricdError::RuntimeConfig(format!(
                        "{} = '{width}' cannot be encoded into {}",
                        field.parameter, field.register
                    ))
                })?;
            writes.push(FieldWrite {
                register: field.register,
                address: field.address,
                range: field.range,
                value,
            });
        }
    }
    Ok(writes)
}

pub fn apply(access: &dyn RegisterAccess, writes: &[FieldWrite]) -> Result<(), FabricdError> {
    for write in writes {
        info!(
            "Setting {} ({:#x}{}) to {}",
            write.register, write.address, write.range, write.value
        );
        write_field(access, write.address, write.range, write.value)?;
    }
    Ok(())
}

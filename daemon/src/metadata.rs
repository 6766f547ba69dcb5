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

//! Memory-map metadata of a loaded design.
//!
//! A design may come with a hardware description (tag keyed), packaged metadata (address
//! keyed) or both. [`Metadata`] is the reconciled result together with the raw streams the
//! download needs later.

pub mod description;
pub mod reconcile;
pub mod region;
pub mod synth;
pub mod topology;

use crate::bitstream::xclbin::{SectionKind, Xclbin};
use crate::error::FabricdError;
use crate::metadata::description::HardwareDescription;
use crate::metadata::region::MemoryRegistry;
use crate::metadata::topology::parse_mem_topology;

/// Everything known about a design before it is downloaded.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// The canonical registry for the design.
    pub registry: MemoryRegistry,
    /// Present when the design shipped a hardware description.
    pub description: Option<HardwareDescription>,
    /// Configuration payload, already word swapped.
    pub bin_data: Option<Vec<u8>>,
    /// Packaged metadata to hand to the allocator, possibly synthesized.
    pub xclbin_data: Option<Vec<u8>>,
    pub dtbo_data: Option<Vec<u8>>,
}

/// Decode the memory topology of packaged metadata. A container without a topology section
/// describes no memories.
pub fn packaged_registry(xclbin_data: &[u8]) -> Result<MemoryRegistry, FabricdError> {
    let xclbin = Xclbin::parse(xclbin_data)?;
    match xclbin.section(SectionKind::MemTopology) {
        Some(section) => parse_mem_topology(section),
        None => Ok(MemoryRegistry::new()),
    }
}

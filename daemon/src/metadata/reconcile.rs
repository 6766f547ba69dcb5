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

//! Address-keyed join of hardware-description regions and packaged-metadata regions.

use crate::metadata::region::{MemoryRegion, MemoryRegistry};
use log::{trace, warn};
use std::collections::HashMap;

/// Merge the packaged regions into the description regions.
///
/// Every description region whose `phys_addr` equals the `base_address` of a packaged region
/// is enriched with that region's fields, and each packaged region is consumed by at most one
/// match. Packaged regions left unmatched are appended under their own tag, replacing any
/// region of the same tag.
///
/// If two packaged regions share a base address only the last one is kept and the earlier one
/// is dropped from the result.
pub fn unify(described: &MemoryRegistry, packaged: &MemoryRegistry) -> MemoryRegistry {
    let mut by_address: HashMap<u64, &MemoryRegion> = HashMap::new();
    let mut unaddressed: Vec<&MemoryRegion> = Vec::new();
    for region in packaged.iter() {
        match region.base_address {
            Some(address) => {
                if let Some(previous) = by_address.insert(address, region) {
                    warn!(
                        "packaged regions '{}' and '{}' share address {address:#x}; dropping '{}'",
                        previous.tag, region.tag, previous.tag
                    );
                }
            }
            None => unaddressed.push(region),
        }
    }

    let mut unified = MemoryRegistry::new();
    for region in described.iter() {
        let mut merged = region.clone();
        if let Some(source) = region.phys_addr.and_then(|a| by_address.remove(&a)) {
            trace!("'{}' matched packaged region '{}'", region.tag, source.tag);
            merged.enrich_from(source);
        }
        unified.insert(merged);
    }

    let mut leftovers: Vec<&MemoryRegion> = by_address.into_values().collect();
    leftovers.extend(unaddressed);
    leftovers.sort_by_key(|r| r.xrt_index);
    for region in leftovers {
        trace!("promoting unmatched packaged region '{}'", region.tag);
        unified.insert(region.clone());
    }
    unified
}

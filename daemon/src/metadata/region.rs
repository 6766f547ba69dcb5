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

//! Memory regions and the tag-ordered registry that holds them.

/// One memory region of a loaded design.
///
/// A region coming from the hardware description carries `phys_addr`/`addr_range`; one coming
/// from packaged metadata carries `base_address`/`size_bytes` and an `xrt_index`. After
/// reconciliation a matched region carries both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegion {
    pub tag: String,
    pub phys_addr: Option<u64>,
    pub addr_range: Option<u64>,
    pub base_address: Option<u64>,
    pub size_bytes: Option<u64>,
    pub mem_type: Option<String>,
    pub used: Option<bool>,
    /// Position in the flattened packaged-metadata topology.
    pub xrt_index: Option<usize>,
}

impl MemoryRegion {
    /// The address used to identify this region: the packaged base address when known, the
    /// description's physical address otherwise.
    pub fn physical_address(&self) -> Option<u64> {
        self.base_address.or(self.phys_addr)
    }

    /// Copy every packaged-metadata field that `source` carries onto `self`.
    pub fn enrich_from(&mut self, source: &MemoryRegion) {
        if source.base_address.is_some() {
            self.base_address = source.base_address;
        }
        if source.size_bytes.is_some() {
            self.size_bytes = source.size_bytes;
        }
        if source.mem_type.is_some() {
            self.mem_type.clone_from(&source.mem_type);
        }
        if source.used.is_some() {
            self.used = source.used;
        }
        if source.xrt_index.is_some() {
            self.xrt_index = source.xrt_index;
        }
        if self.addr_range.is_none() {
            self.addr_range = source.addr_range;
        }
    }
}

/// Insertion-ordered collection of [`MemoryRegion`]s with unique tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegistry {
    regions: Vec<MemoryRegion>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `region`, replacing any region with the same tag in place.
    pub fn insert(&mut self, region: MemoryRegion) {
        match self.regions.iter_mut().find(|r| r.tag == region.tag) {
            Some(existing) => *existing = region,
            None => self.regions.push(region),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.tag == tag)
    }

    /// Tag of the region identified by `address`.
    ///
    /// When several regions share an address the last one inserted wins.
    pub fn tag_for_address(&self, address: u64) -> Option<&str> {
        self.regions
            .iter()
            .rev()
            .find(|r| r.physical_address() == Some(address))
            .map(|r| r.tag.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MemoryRegion> {
        self.regions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl FromIterator<MemoryRegion> for MemoryRegistry {
    fn from_iter<I: IntoIterator<Item = MemoryRegion>>(iter: I) -> Self {
        let mut registry = MemoryRegistry::new();
        for region in iter {
            registry.insert(region);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    fn region(tag: &str, base: u64) -> MemoryRegion {
        MemoryRegion {
            tag: tag.into(),
            base_address: Some(base),
            ..Default::default()
        }
    }

    #[gtest]
    fn insert_replaces_same_tag_in_place() {
        let mut registry: MemoryRegistry =
            [region("a", 0x0), region("b", 0x1000)].into_iter().collect();
        registry.insert(region("a", 0x2000));
        let tags: Vec<&str> = registry.iter().map(|r| r.tag.as_str()).collect();
        expect_that!(tags, elements_are![eq(&"a"), eq(&"b")]);
        expect_that!(
            registry.get("a").and_then(|r| r.base_address),
            some(eq(0x2000))
        );
    }

    #[gtest]
    fn address_index_prefers_base_address() {
        let mut registry = MemoryRegistry::new();
        registry.insert(MemoryRegion {
            tag: "hp0".into(),
            phys_addr: Some(0x4000),
            ..Default::default()
        });
        registry.insert(region("ddr", 0x0));
        expect_that!(registry.tag_for_address(0x4000), some(eq("hp0")));
        expect_that!(registry.tag_for_address(0x0), some(eq("ddr")));
        expect_that!(registry.tag_for_address(0x8000), none());
    }
}

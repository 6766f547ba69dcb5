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

//! Read-modify-write of a bit range within a 32-bit memory-mapped register.

use crate::error::FabricdError;
use log::trace;

/// Word access to physical registers.
pub trait RegisterAccess {
    fn read32(&self, address: u64) -> Result<u32, FabricdError>;
    fn write32(&self, address: u64, value: u32) -> Result<(), FabricdError>;
}

/// Inclusive bit range `[high:low]` of a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    pub high: u8,
    pub low: u8,
}

impl BitRange {
    /// `low <= high <= 31`
    pub const fn new(high: u8, low: u8) -> Self {
        debug_assert!(low <= high && high < 32);
        BitRange { high, low }
    }

    pub const fn width(&self) -> u32 {
        (self.high - self.low + 1) as u32
    }

    /// Mask of the range, in register position.
    pub const fn mask(&self) -> u32 {
        (u32::MAX >> (32 - self.width())) << self.low
    }

    pub const fn extract(&self, register: u32) -> u32 {
        (register & self.mask()) >> self.low
    }

    /// `register` with the range replaced by `value`. Bits of `value` beyond the range width
    /// are discarded.
    pub const fn insert(&self, register: u32, value: u32) -> u32 {
        (register & !self.mask()) | ((value << self.low) & self.mask())
    }
}

impl std::fmt::Display for BitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.high, self.low)
    }
}

/// Set bits `range` of the register at `address` to `value`, leaving other bits untouched.
///
/// The caller is responsible for `value` fitting the range.
pub fn write_field(
    access: &dyn RegisterAccess,
    address: u64,
    range: BitRange,
    value: u32,
) -> Result<(), FabricdError> {
    let current = access.read32(address)?;
    let updated = range.insert(current, value);
    trace!("{address:#x}{range}: {current:#010x} -> {updated:#010x}");
    access.write32(address, updated)
}

pub fn read_field(
    access: &dyn RegisterAccess,
    address: u64,
    range: BitRange,
) -> Result<u32, FabricdError> {
    Ok(range.extract(access.read32(address)?))
}

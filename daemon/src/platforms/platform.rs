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

//! Abstraction over the kernel's FPGA manager.
//!
//! The loader never talks to the configuration engine directly. It writes a flags value and a
//! firmware name into the manager's sysfs files and observes the outcome through the `state`
//! file, so the whole interface is three small operations plus a state read. [`Fpga`] keeps
//! that interface substitutable in tests.

use crate::error::FabricdError;
use std::path::Path;

/// Flags value requesting a full reconfiguration.
pub const FLAGS_FULL: u32 = 0;
/// Flags value requesting a partial reconfiguration.
pub const FLAGS_PARTIAL: u32 = 1;

/// Trait for managing an FPGA device
pub trait Fpga {
    /// Get the device handle for this FPGA device (e.g. "fpga0").
    fn device_handle(&self) -> &str;

    /// Get the current state of the FPGA device.
    ///
    /// # Returns: `Result<String, FabricdError>`
    /// * `Ok(String)` - Current state of the FPGA
    /// * `Err(FabricdError::IORead)` - Failed to read state file
    fn state(&self) -> Result<String, FabricdError>;

    /// Get the current programming flags for the FPGA device.
    ///
    /// # Returns: `Result<u32, FabricdError>`
    /// * `Ok(u32)` - Current flags value
    /// * `Err(FabricdError::IORead)` - Failed to read flags file
    /// * `Err(FabricdError::Format)` - Failed to parse flags value
    fn flags(&self) -> Result<u32, FabricdError>;

    /// Set the programming flags for the FPGA device.
    ///
    /// # Returns: `Result<(), FabricdError>`
    /// * `Ok(())` - Flags set successfully
    /// * `Err(FabricdError::IOWrite)` - Failed to write flags file
    fn set_flags(&self, flags: u32) -> Result<(), FabricdError>;

    /// Hand a staged payload to the kernel by writing its file name, relative to the firmware
    /// search path, into the trigger file.
    ///
    /// # Returns: `Result<(), FabricdError>`
    /// * `Ok(())` - The trigger file accepted the name
    /// * `Err(FabricdError::IOWrite)` - The kernel rejected the write
    fn load_firmware(&self, bitstream_path_rel: &Path) -> Result<(), FabricdError>;
}

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

//! FPGA manager access through sysfs.
//!
//! ```text
//! /sys/class/fpga_manager/fpga0
//! ├── firmware   write a file name (relative to the firmware search path) to program
//! ├── flags      0 for full, 1 for partial reconfiguration
//! ├── name
//! ├── state      "operating" once programming succeeded
//! └── ...
//! ```

use crate::error::FabricdError;
use crate::platforms::platform::Fpga;
use crate::system_io::{fs_read, fs_write};
use log::{info, trace, warn};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct SysfsFpga {
    device_handle: String,
    device_dir: PathBuf,
}

impl SysfsFpga {
    /// `fpga_managers_dir` is usually `/sys/class/fpga_manager/`. Existence of the device is
    /// not checked until a method is called.
    pub fn new(fpga_managers_dir: &Path, device_handle: &str) -> SysfsFpga {
        SysfsFpga {
            device_handle: device_handle.to_owned(),
            device_dir: fpga_managers_dir.join(device_handle),
        }
    }
}

impl Fpga for SysfsFpga {
    fn device_handle(&self) -> &str {
        &self.device_handle
    }

    fn state(&self) -> Result<String, FabricdError> {
        let state_path = self.device_dir.join("state");
        trace!("reading {state_path:?}");
        fs_read(&state_path).map(|s| s.trim_end_matches('\n').to_string())
    }

    /// Flags read back from sysfs are hexadecimal, optionally `0x` prefixed.
    fn flags(&self) -> Result<u32, FabricdError> {
        let contents = fs_read(&self.device_dir.join("flags"))?;
        let trimmed = contents.trim().trim_start_matches("0x");
        u32::from_str_radix(trimmed, 16).map_err(|_| {
            FabricdError::Format(format!(
                "{}'s flags '{}' are not a hexadecimal number",
                self.device_handle,
                contents.trim()
            ))
        })
    }

    fn set_flags(&self, flags: u32) -> Result<(), FabricdError> {
        let flag_path = self.device_dir.join("flags");
        trace!("Writing '{flags}' to '{flag_path:?}'");
        fs_write(&flag_path, false, flags.to_string())
    }

    fn load_firmware(&self, bitstream_path_rel: &Path) -> Result<(), FabricdError> {
        let control_path = self.device_dir.join("firmware");
        fs_write(&control_path, false, bitstream_path_rel.to_string_lossy())?;
        match self.state() {
            Ok(state) if state == "operating" => {
                info!("{}'s state is 'operating'", self.device_handle)
            }
            Ok(state) => warn!(
                "{}'s state is '{state}' after writing {bitstream_path_rel:?}",
                self.device_handle
            ),
            Err(e) => warn!("Could not read {}'s state: {e}", self.device_handle),
        }
        Ok(())
    }
}

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

//! Paths and tunables used by the loader.
//!
//! Hardcoded defaults can be overridden by the `[system_paths]` section of a vendor config
//! (`/usr/lib/fabricd/config.toml`) and a user config (`/etc/fabricd/config.toml`). User config
//! overrides vendor config and vendor config overrides the hardcoded defaults. The merged result
//! is handed to the rest of the crate as a [`LoaderConfig`] value.

use crate::error::FabricdError;
use crate::system_io::fs_read;
use log::{trace, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// The driver-decided location of fpga_manager objects. Typically `/sys/class/fpga_manager/`.
pub static FPGA_MANAGERS_DIR: &str = "/sys/class/fpga_manager/";

/// Where staged `.bin` payloads are written, so that the kernel firmware loader can find them
/// by file name alone.
pub static FIRMWARE_DIR: &str = "/lib/firmware/";

/// The privileged raw-memory device.
pub static DEV_MEM: &str = "/dev/mem";

/// The external packaging tool used to synthesize packaged metadata.
pub static PACKAGING_TOOL: &str = "xclbinutil";

pub static DEFAULT_DEVICE_HANDLE: &str = "fpga0";

pub static VENDOR_CONFIG: &str = "/usr/lib/fabricd/config.toml";
pub static USER_CONFIG: &str = "/etc/fabricd/config.toml";

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub fpga_managers_dir: PathBuf,
    pub firmware_dir: PathBuf,
    pub dev_mem: PathBuf,
    pub packaging_tool: PathBuf,
    /// Parent of the per-invocation scratch directories used by the synthesizer.
    pub scratch_dir: PathBuf,
    pub device_handle: String,
    /// How many times a failed packaging tool run is retried. Zero means never.
    pub tool_retries: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            fpga_managers_dir: PathBuf::from(FPGA_MANAGERS_DIR),
            firmware_dir: PathBuf::from(FIRMWARE_DIR),
            dev_mem: PathBuf::from(DEV_MEM),
            packaging_tool: PathBuf::from(PACKAGING_TOOL),
            scratch_dir: std::env::temp_dir(),
            device_handle: DEFAULT_DEVICE_HANDLE.to_string(),
            tool_retries: 0,
        }
    }
}

impl LoaderConfig {
    /// `<fpga_managers_dir>/<device_handle>`
    pub fn device_dir(&self) -> PathBuf {
        self.fpga_managers_dir.join(&self.device_handle)
    }
}

#[derive(Debug, Deserialize)]
struct TomlConfig {
    system_paths: Option<SystemPaths>,
}

/// The `[system_paths]` section. Every field is optional so that files can be layered.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct SystemPaths {
    pub fpga_managers_dir: Option<String>,
    pub firmware_dir: Option<String>,
    pub dev_mem: Option<String>,
    pub packaging_tool: Option<String>,
    pub scratch_dir: Option<String>,
    pub device_handle: Option<String>,
    pub tool_retries: Option<u32>,
}

impl SystemPaths {
    pub fn merge(self, fallback: SystemPaths) -> SystemPaths {
        SystemPaths {
            fpga_managers_dir: self.fpga_managers_dir.or(fallback.fpga_managers_dir),
            firmware_dir: self.firmware_dir.or(fallback.firmware_dir),
            dev_mem: self.dev_mem.or(fallback.dev_mem),
            packaging_tool: self.packaging_tool.or(fallback.packaging_tool),
            scratch_dir: self.scratch_dir.or(fallback.scratch_dir),
            device_handle: self.device_handle.or(fallback.device_handle),
            tool_retries: self.tool_retries.or(fallback.tool_retries),
        }
    }
}

impl From<SystemPaths> for LoaderConfig {
    fn from(value: SystemPaths) -> Self {
        trace!("Creating LoaderConfig from {value:?}");
        let defaults = LoaderConfig::default();
        LoaderConfig {
            fpga_managers_dir: value
                .fpga_managers_dir
                .map_or(defaults.fpga_managers_dir, PathBuf::from),
            firmware_dir: value
                .firmware_dir
                .map_or(defaults.firmware_dir, PathBuf::from),
            dev_mem: value.dev_mem.map_or(defaults.dev_mem, PathBuf::from),
            packaging_tool: value
                .packaging_tool
                .map_or(defaults.packaging_tool, PathBuf::from),
            scratch_dir: value.scratch_dir.map_or(defaults.scratch_dir, PathBuf::from),
            device_handle: value.device_handle.unwrap_or(defaults.device_handle),
            tool_retries: value.tool_retries.unwrap_or(defaults.tool_retries),
        }
    }
}

pub fn system_paths_from_str(toml_string: &str, file: &Path) -> Result<SystemPaths, FabricdError> {
    let config: TomlConfig = toml::from_str(toml_string).map_err(|e| FabricdError::TomlDe {
        file: file.into(),
        e,
    })?;
    config.system_paths.ok_or_else(|| {
        FabricdError::Internal(format!(
            "config file {file:?} did not contain a `[system_paths]` section."
        ))
    })
}

pub fn system_paths_from_file(file_path: &Path) -> Result<SystemPaths, FabricdError> {
    if !file_path.is_file() {
        return Err(FabricdError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    system_paths_from_str(&fs_read(file_path)?, file_path)
}

fn init_loader_config() -> LoaderConfig {
    let vendor_config = system_paths_from_file(Path::new(VENDOR_CONFIG)).unwrap_or_else(|e| {
        warn!("Using hardcoded paths for vendor config because loading config failed: {e}");
        SystemPaths::default()
    });
    let user_config = system_paths_from_file(Path::new(USER_CONFIG)).unwrap_or_else(|e| {
        warn!("Using hardcoded paths for user config because loading config failed: {e}");
        SystemPaths::default()
    });
    trace!("Merging user_config: {user_config:?} with vendor_config {vendor_config:?}");
    let config = LoaderConfig::from(user_config.merge(vendor_config));
    trace!("Resulting config: {config:?}");
    config
}

static CONFIG: OnceLock<LoaderConfig> = OnceLock::new();

/// The process-wide configuration, loaded from disk on first use.
pub fn loader_config() -> &'static LoaderConfig {
    CONFIG.get_or_init(init_loader_config)
}

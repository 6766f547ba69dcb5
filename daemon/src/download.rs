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

//! Download orchestration.
//!
//! A download walks through
//!
//! ```text
//! Idle -> Staged -> Triggered -> WidthFixed -> Bound
//!   \________\__________\___________\________-> Failed
//! ```
//!
//! 1. **Staged**: the word-swapped payload is written to `<firmware_dir>/<stem>.bin` unless the
//!    bitstream already names a staged file.
//! 2. **Triggered**: for a full reconfiguration the allocator is shut down first. The flags
//!    file receives `0` (full) or `1` (partial), then the firmware file receives the staged name.
//! 3. **WidthFixed**: AXI port widths are aligned with the design's PS configuration.
//! 4. **Bound**: packaged metadata is handed to the allocator and the reconciled registry
//!    becomes the session's canonical registry.
//!
//! The registry and bitstream of the session are only replaced once every step succeeded.

use crate::bitstream::handler::BitstreamHandler;
use crate::config::LoaderConfig;
use crate::error::FabricdError;
use crate::metadata::Metadata;
use crate::metadata::description::DescriptionParser;
use crate::metadata::region::{MemoryRegion, MemoryRegistry};
use crate::metadata::synth::MetadataSynthesizer;
use crate::mmio::bitfield::RegisterAccess;
use crate::mmio::mapper::MemoryMapper;
use crate::platforms::platform::{FLAGS_FULL, FLAGS_PARTIAL, Fpga};
use crate::platforms::port_width;
use crate::platforms::sysfs_fpga::SysfsFpga;
use crate::system_io::{fs_remove_file, fs_write_bytes};
use log::{debug, error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadState {
    #[default]
    Idle,
    Staged,
    Triggered,
    WidthFixed,
    Bound,
    Failed,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadState::Idle => "idle",
            DownloadState::Staged => "staged",
            DownloadState::Triggered => "triggered",
            DownloadState::WidthFixed => "width_fixed",
            DownloadState::Bound => "bound",
            DownloadState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// A container scheduled for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstream {
    pub path: PathBuf,
    pub partial: bool,
    /// Name of the staged payload, relative to the firmware directory.
    pub binfile_name: Option<String>,
}

impl Bitstream {
    pub fn new(path: &Path, partial: bool) -> Self {
        Bitstream {
            path: path.to_path_buf(),
            partial,
            binfile_name: None,
        }
    }

    /// File stem of the container, used to name staged files.
    pub fn stem(&self) -> Result<String, FabricdError> {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                FabricdError::Argument(format!("{:?} has no usable file name", self.path))
            })
    }
}

/// The downstream memory allocation subsystem.
pub trait Allocator {
    /// Make the packaged metadata of the design named `stem` available for allocation.
    fn load_packaged_metadata(&mut self, stem: &str, data: &[u8]) -> Result<(), FabricdError>;

    /// Release every binding made for the current design.
    fn shutdown(&mut self) -> Result<(), FabricdError>;
}

/// Publishes packaged metadata as `<firmware_dir>/<stem>.xclbin` for the memory runtime.
#[derive(Debug)]
pub struct FirmwareMetadataStore {
    firmware_dir: PathBuf,
    published: Option<PathBuf>,
}

impl FirmwareMetadataStore {
    pub fn new(firmware_dir: &Path) -> Self {
        FirmwareMetadataStore {
            firmware_dir: firmware_dir.to_path_buf(),
            published: None,
        }
    }
}

impl Allocator for FirmwareMetadataStore {
    fn load_packaged_metadata(&mut self, stem: &str, data: &[u8]) -> Result<(), FabricdError> {
        let path = self.firmware_dir.join(format!("{stem}.xclbin"));
        fs_write_bytes(&path, true, data)?;
        info!("Published {} bytes of packaged metadata to {path:?}", data.len());
        self.published = Some(path);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), FabricdError> {
        if let Some(path) = self.published.take() {
            debug!("Withdrawing {path:?}");
            fs_remove_file(&path)?;
        }
        Ok(())
    }
}

type SessionFpga = Box<dyn Fpga + Send>;
type SessionRegisters = Box<dyn RegisterAccess + Send>;
type SessionAllocator = Box<dyn Allocator + Send>;

/// The single download session of the process.
pub struct DownloadSession {
    firmware_dir: PathBuf,
    fpga: SessionFpga,
    registers: SessionRegisters,
    allocator: SessionAllocator,
    state: DownloadState,
    bitstream: Option<Bitstream>,
    registry: Option<MemoryRegistry>,
}

impl DownloadSession {
    pub fn new(
        firmware_dir: &Path,
        fpga: SessionFpga,
        registers: SessionRegisters,
        allocator: SessionAllocator,
    ) -> Self {
        DownloadSession {
            firmware_dir: firmware_dir.to_path_buf(),
            fpga,
            registers,
            allocator,
            state: DownloadState::Idle,
            bitstream: None,
            registry: None,
        }
    }

    /// A session over the FPGA manager, `/dev/mem` and firmware directory named by `config`.
    pub fn from_config(config: &LoaderConfig) -> Self {
        DownloadSession::new(
            &config.firmware_dir,
            Box::new(SysfsFpga::new(
                &config.fpga_managers_dir,
                &config.device_handle,
            )),
            Box::new(MemoryMapper::new(&config.dev_mem)),
            Box::new(FirmwareMetadataStore::new(&config.firmware_dir)),
        )
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn fpga(&self) -> &dyn Fpga {
        self.fpga.as_ref()
    }

    /// The last successfully downloaded bitstream.
    pub fn bitstream(&self) -> Option<&Bitstream> {
        self.bitstream.as_ref()
    }

    /// The canonical registry of the last successful download.
    pub fn registry(&self) -> Option<&MemoryRegistry> {
        self.registry.as_ref()
    }

    /// The CPU-side memory region, identified by base address zero.
    ///
    /// # Returns: `Result<&MemoryRegion, FabricdError>`
    /// * `Ok(&MemoryRegion)` - The PS memory region
    /// * `Err(FabricdError::RuntimeConfig)` - Nothing downloaded yet, or the design has no PS
    ///   memory
    pub fn default_memory(&self) -> Result<&MemoryRegion, FabricdError> {
        let registry = self
            .registry
            .as_ref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| FabricdError::RuntimeConfig("Overlay is not downloaded".into()))?;
        registry
            .iter()
            .find(|r| r.base_address == Some(0))
            .ok_or_else(|| {
                FabricdError::RuntimeConfig("Design does not contain PS memory".into())
            })
    }

    /// Download `bitstream` using `metadata` as gathered by
    /// [`BitstreamHandler::get_parser`]. Without metadata the session's registry becomes
    /// empty and nothing is handed to the allocator.
    ///
    /// On failure the state is [`DownloadState::Failed`] and the previous registry stays in
    /// place.
    pub fn download(
        &mut self,
        mut bitstream: Bitstream,
        metadata: Option<Metadata>,
    ) -> Result<(), FabricdError> {
        info!(
            "Downloading {:?} ({} reconfiguration)",
            bitstream.path,
            if bitstream.partial { "partial" } else { "full" }
        );
        match self.run(&mut bitstream, metadata.unwrap_or_default()) {
            Ok(registry) => {
                info!(
                    "{:?} bound with {} memory regions",
                    bitstream.path,
                    registry.len()
                );
                self.registry = Some(registry);
                self.bitstream = Some(bitstream);
                self.state = DownloadState::Bound;
                Ok(())
            }
            Err(e) => {
                error!("Download of {:?} failed in state {}: {e}", bitstream.path, self.state);
                self.state = DownloadState::Failed;
                Err(e)
            }
        }
    }

    /// Gather the metadata of `bitstream` and download it.
    ///
    /// Failing to read the container or to synthesize its metadata fails the download like
    /// any later step: the state becomes [`DownloadState::Failed`] and the previous registry
    /// stays in place.
    pub fn download_path(
        &mut self,
        bitstream: Bitstream,
        parser: &dyn DescriptionParser,
        synthesizer: &MetadataSynthesizer,
        tool_retries: u32,
    ) -> Result<(), FabricdError> {
        let metadata = BitstreamHandler::new(&bitstream.path)
            .and_then(|handler| handler.get_parser(parser, synthesizer, tool_retries));
        match metadata {
            Ok(metadata) => {
                if metadata.is_none() {
                    info!(
                        "{:?} has no metadata, downloading without a memory map",
                        bitstream.path
                    );
                }
                self.download(bitstream, metadata)
            }
            Err(e) => {
                error!("Unable to gather metadata for {:?}: {e}", bitstream.path);
                self.state = DownloadState::Failed;
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        bitstream: &mut Bitstream,
        metadata: Metadata,
    ) -> Result<MemoryRegistry, FabricdError> {
        self.state = DownloadState::Idle;
        let stem = bitstream.stem()?;

        let binfile_name = match &bitstream.binfile_name {
            Some(name) => name.clone(),
            None => {
                let bin_data = match metadata.bin_data {
                    Some(data) => data,
                    None => BitstreamHandler::new(&bitstream.path)?
                        .get_bin_data()?
                        .ok_or_else(|| {
                            FabricdError::Format(format!(
                                "{:?} carries no configuration payload",
                                bitstream.path
                            ))
                        })?,
                };
                let name = format!("{stem}.bin");
                fs_write_bytes(&self.firmware_dir.join(&name), true, &bin_data)?;
                bitstream.binfile_name = Some(name.clone());
                name
            }
        };
        self.state = DownloadState::Staged;

        let flags = if bitstream.partial {
            FLAGS_PARTIAL
        } else {
            self.allocator.shutdown()?;
            FLAGS_FULL
        };
        self.fpga.set_flags(flags)?;
        self.fpga.load_firmware(Path::new(&binfile_name))?;
        self.state = DownloadState::Triggered;

        match &metadata.description {
            Some(description) => {
                let writes = port_width::plan(description)?;
                port_width::apply(self.registers.as_ref(), &writes)?;
            }
            None => debug!("No hardware description, port widths left unchanged"),
        }
        self.state = DownloadState::WidthFixed;

        match &metadata.xclbin_data {
            Some(data) => self.allocator.load_packaged_metadata(&stem, data)?,
            None => warn!("No packaged metadata for {stem}, memory allocation is unavailable"),
        }
        Ok(metadata.registry)
    }
}

/// Gather the metadata of the container at `path`.
///
/// # Returns: `Result<Metadata, FabricdError>`
/// * `Ok(Metadata)` - Reconciled metadata
/// * `Err(FabricdError::RuntimeConfig)` - The container has no metadata at all
pub fn get_bitfile_metadata(
    path: &Path,
    parser: &dyn DescriptionParser,
    synthesizer: &MetadataSynthesizer,
    tool_retries: u32,
) -> Result<Metadata, FabricdError> {
    BitstreamHandler::new(path)?
        .get_parser(parser, synthesizer, tool_retries)?
        .ok_or_else(|| {
            FabricdError::RuntimeConfig(format!("Unable to find metadata for {path:?}"))
        })
}

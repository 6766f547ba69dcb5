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

//! Container variants and the streams that can be extracted from them.
//!
//! | extension | configuration payload        | packaged metadata       |
//! |-----------|------------------------------|-------------------------|
//! | `.bit`    | header decoded, words swapped | sibling `.xclbin`      |
//! | `.bin`    | file contents verbatim       | sibling `.xclbin`       |
//! | `.xclbin` | `BITSTREAM` section, as `.bit` | the container itself  |
//!
//! The hardware description and the device-tree overlay are always looked up as siblings
//! sharing the container's stem.

use crate::bitstream::header::bit_to_bin;
use crate::bitstream::xclbin::{SectionKind, Xclbin};
use crate::error::FabricdError;
use crate::metadata::description::DescriptionParser;
use crate::metadata::reconcile::unify;
use crate::metadata::synth::MetadataSynthesizer;
use crate::metadata::{Metadata, packaged_registry};
use crate::system_io::{fs_read, fs_read_bytes};
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVariant {
    /// `.bit`: tagged header followed by the configuration payload.
    Bit,
    /// `.bin`: payload already in the form the FPGA manager expects.
    Bin,
    /// `.xclbin`: section based packaged container.
    Xclbin,
}

impl ContainerVariant {
    /// Select a variant from the file extension.
    ///
    /// # Returns: `Result<ContainerVariant, FabricdError>`
    /// * `Ok(ContainerVariant)` - One of the supported variants
    /// * `Err(FabricdError::Format)` - Missing or unknown extension
    pub fn from_path(path: &Path) -> Result<Self, FabricdError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bit") => Ok(ContainerVariant::Bit),
            Some("bin") => Ok(ContainerVariant::Bin),
            Some("xclbin") => Ok(ContainerVariant::Xclbin),
            _ => Err(FabricdError::Format(format!(
                "unknown format for {path:?}, expected .bit, .bin or .xclbin"
            ))),
        }
    }
}

impl fmt::Display for ContainerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerVariant::Bit => "bit",
            ContainerVariant::Bin => "bin",
            ContainerVariant::Xclbin => "xclbin",
        };
        write!(f, "{name}")
    }
}

/// Access to the streams of one container file.
///
/// Packaged containers are read and their section table validated on construction; the
/// other variants touch the file system only when a stream is requested.
#[derive(Debug)]
pub struct BitstreamHandler {
    path: PathBuf,
    variant: ContainerVariant,
    /// Contents of a packaged container and its `BITSTREAM` section, if any.
    packaged: Option<(Vec<u8>, Option<Vec<u8>>)>,
}

impl BitstreamHandler {
    pub fn new(path: &Path) -> Result<Self, FabricdError> {
        let variant = ContainerVariant::from_path(path)?;
        let packaged = match variant {
            ContainerVariant::Xclbin => {
                let data = fs_read_bytes(path)?;
                let bitstream = Xclbin::parse(&data)?
                    .section(SectionKind::Bitstream)
                    .map(<[u8]>::to_vec);
                Some((data, bitstream))
            }
            _ => None,
        };
        debug!("Opened {path:?} as a {variant} container");
        Ok(BitstreamHandler {
            path: path.to_path_buf(),
            variant,
            packaged,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn variant(&self) -> ContainerVariant {
        self.variant
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        self.path.with_extension(extension)
    }

    fn read_sibling(&self, extension: &str) -> Result<Option<Vec<u8>>, FabricdError> {
        let path = self.sibling(extension);
        if path.exists() {
            fs_read_bytes(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// The configuration payload in the word order the FPGA manager expects.
    ///
    /// `Ok(None)` for a packaged container without a `BITSTREAM` section.
    pub fn get_bin_data(&self) -> Result<Option<Vec<u8>>, FabricdError> {
        match (&self.variant, &self.packaged) {
            (ContainerVariant::Bit, _) => bit_to_bin(&fs_read_bytes(&self.path)?).map(Some),
            (ContainerVariant::Bin, _) => fs_read_bytes(&self.path).map(Some),
            (ContainerVariant::Xclbin, Some((_, Some(section)))) => bit_to_bin(section).map(Some),
            (ContainerVariant::Xclbin, _) => Ok(None),
        }
    }

    pub fn get_packaged_metadata(&self) -> Result<Option<Vec<u8>>, FabricdError> {
        match &self.packaged {
            Some((data, _)) => Ok(Some(data.clone())),
            None => self.read_sibling("xclbin"),
        }
    }

    /// Text of the sibling hardware description `parser` understands, if there is one.
    pub fn get_description(
        &self,
        parser: &dyn DescriptionParser,
    ) -> Result<Option<String>, FabricdError> {
        let path = self.sibling(parser.extension());
        if path.exists() {
            fs_read(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn get_dtbo(&self) -> Result<Option<Vec<u8>>, FabricdError> {
        self.read_sibling("dtbo")
    }

    /// Gather and reconcile all metadata of the container.
    ///
    /// * description and packaged metadata: the description's regions enriched from the
    ///   packaged topology
    /// * packaged metadata only: the packaged topology as is
    /// * description only: packaged metadata is synthesized first, then as above
    ///
    /// # Returns: `Result<Option<Metadata>, FabricdError>`
    /// * `Ok(Some(Metadata))` - Reconciled registry plus the raw streams
    /// * `Ok(None)` - The container has no usable metadata
    /// * `Err(FabricdError)` - A stream could not be read or decoded, or synthesis failed
    pub fn get_parser(
        &self,
        parser: &dyn DescriptionParser,
        synthesizer: &MetadataSynthesizer,
        tool_retries: u32,
    ) -> Result<Option<Metadata>, FabricdError> {
        let description_text = self.get_description(parser)?;
        let mut xclbin_data = self.get_packaged_metadata()?;

        let (registry, description) = match description_text {
            Some(text) => {
                let mut description = parser.parse(&text)?;
                let xclbin = match xclbin_data.take() {
                    Some(data) => data,
                    None => {
                        info!("No packaged metadata for {:?}, synthesizing", self.path);
                        synthesizer
                            .synthesize_with_retries(&mut description.memories, tool_retries)?
                    }
                };
                let packaged = packaged_registry(&xclbin)?;
                let registry = unify(&description.memories, &packaged);
                xclbin_data = Some(xclbin);
                (registry, Some(description))
            }
            None => match &xclbin_data {
                Some(data) => (packaged_registry(data)?, None),
                None => return Ok(None),
            },
        };

        Ok(Some(Metadata {
            registry,
            description,
            bin_data: self.get_bin_data()?,
            xclbin_data,
            dtbo_data: self.get_dtbo()?,
        }))
    }
}

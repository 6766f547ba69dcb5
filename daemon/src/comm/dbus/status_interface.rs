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

use crate::comm::dbus::{format_header, format_regions, session_guard, validate_container_path};
use fabricd::bitstream::header::parse_bit_header;
use fabricd::error::FabricdError;
use fabricd::system_io::fs_read_bytes;
use log::info;
use zbus::{fdo, interface};

pub struct StatusInterface {}

#[interface(name = "com.canonical.fabricd.status")]
impl StatusInterface {
    async fn get_download_state(&self) -> Result<String, fdo::Error> {
        info!("get_download_state called");
        let session = session_guard().await;
        let bitstream = session
            .bitstream()
            .map(|b| b.path.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("{}:{bitstream}", session.state()))
    }

    async fn get_memory_regions(&self) -> Result<String, fdo::Error> {
        info!("get_memory_regions called");
        let session = session_guard().await;
        match session.registry() {
            Some(registry) => Ok(format_regions(registry)),
            None => Err(FabricdError::RuntimeConfig("Overlay is not downloaded".into()).into()),
        }
    }

    async fn get_default_memory(&self) -> Result<String, fdo::Error> {
        info!("get_default_memory called");
        let session = session_guard().await;
        Ok(session.default_memory()?.tag.clone())
    }

    async fn get_bitstream_header(&self, bitstream_path_str: &str) -> Result<String, fdo::Error> {
        info!("get_bitstream_header called with path: {bitstream_path_str}");
        let path = validate_container_path(bitstream_path_str)?;
        let data = fs_read_bytes(&path)?;
        Ok(format_header(&parse_bit_header(&data)?))
    }

    async fn get_fpga_state(&self) -> Result<String, fdo::Error> {
        info!("get_fpga_state called");
        let session = session_guard().await;
        Ok(session.fpga().state()?)
    }
}

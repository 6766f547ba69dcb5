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

use crate::comm::dbus::{session_guard, validate_container_path};
use fabricd::config::loader_config;
use fabricd::download::Bitstream;
use fabricd::metadata::description::JsonDescriptionParser;
use fabricd::metadata::synth::{MetadataSynthesizer, Xclbinutil};
use log::{info, trace};
use zbus::{fdo, interface};

pub struct ControlInterface {}

#[interface(name = "com.canonical.fabricd.control")]
impl ControlInterface {
    /// Download the container at `bitstream_path_str` and bind its memory map.
    ///
    /// Requests are served one at a time; a request arriving during a download waits for it.
    async fn download_bitstream(
        &self,
        bitstream_path_str: &str,
        partial: bool,
    ) -> Result<String, fdo::Error> {
        info!("download_bitstream called with path: {bitstream_path_str} and partial: {partial}");
        let path = validate_container_path(bitstream_path_str)?;
        let mut session = session_guard().await;
        trace!("Got session lock.");

        let config = loader_config();
        let tool = Xclbinutil {
            program: config.packaging_tool.clone(),
        };
        let synthesizer = MetadataSynthesizer::new(&tool, config);
        session.download_path(
            Bitstream::new(&path, partial),
            &JsonDescriptionParser,
            &synthesizer,
            config.tool_retries,
        )?;

        let regions = session.registry().map_or(0, |r| r.len());
        Ok(format!(
            "{bitstream_path_str} downloaded to {} with {regions} memory regions",
            session.fpga().device_handle()
        ))
    }
}

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

pub mod control_interface;
pub mod status_interface;

use fabricd::bitstream::header::ContainerHeader;
use fabricd::config::loader_config;
use fabricd::download::DownloadSession;
use fabricd::error::FabricdError;
use fabricd::metadata::region::MemoryRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};

/// The process-wide download session. Holding the guard serializes downloads and keeps status
/// reads from observing a download half way.
static SESSION: OnceCell<Arc<Mutex<DownloadSession>>> = OnceCell::const_new();

pub(crate) async fn session_guard() -> MutexGuard<'static, DownloadSession> {
    let session = SESSION
        .get_or_init(|| async {
            Arc::new(Mutex::new(DownloadSession::from_config(loader_config())))
        })
        .await;
    session.lock().await
}

/// Helper function to check that `path_str` names an existing regular file.
pub(crate) fn validate_container_path(path_str: &str) -> Result<PathBuf, FabricdError> {
    let path = Path::new(path_str);
    if path_str.is_empty() || !path.is_file() {
        return Err(FabricdError::Argument(format!(
            "{path_str} is not a valid path to a bitstream file."
        )));
    }
    Ok(path.to_path_buf())
}

/// One `tag:base:size` line per region, addresses and sizes in hex. Unknown values print as
/// `-`.
pub(crate) fn format_regions(registry: &MemoryRegistry) -> String {
    let hex = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:#x}"));
    registry
        .iter()
        .map(|r| {
            format!(
                "{}:{}:{}\n",
                r.tag,
                hex(r.physical_address()),
                hex(r.size_bytes.or(r.addr_range))
            )
        })
        .collect()
}

pub(crate) fn format_header(header: &ContainerHeader<'_>) -> String {
    format!(
        "design: {}\nversion: {}\npart: {}\ndate: {}\ntime: {}\nlength: {}\n",
        header.design, header.version, header.part, header.date, header.time, header.length
    )
}

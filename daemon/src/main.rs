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

//! fabricd - System service which downloads designs to programmable logic.
//!
//! The daemon exposes the [`fabricd`] library over the system D-Bus:
//! - `control` serves downloads, one at a time
//! - `status` reports the download state, the memory map of the loaded design, container
//!   headers and the FPGA manager state
//!
//! # DBus Service
//!
//! - **Service Name**: `com.canonical.fabricd`
//! - **Status Interface**: `/com/canonical/fabricd/status` - Read-only operations
//! - **Control Interface**: `/com/canonical/fabricd/control` - Write operations
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`
//!
//! # Configuration
//!
//! System paths are read from `/etc/fabricd/config.toml`, falling back to
//! `/usr/lib/fabricd/config.toml` and then to built-in defaults. See [`fabricd::config`].

use fabricd::config::loader_config;
use log::info;
use std::error::Error;
use std::future::pending;
use zbus::connection;

mod comm;

use crate::comm::dbus::{control_interface::ControlInterface, status_interface::StatusInterface};

/// Main entry point for the fabricd daemon.
///
/// # Returns: `Result<(), Box<dyn Error>>`
/// * `Ok(())` - Never returns under normal operation (runs until terminated)
/// * `Err(Box<dyn Error>)` - Initialization error (DBus connection failed, etc.)
///
/// # Examples
///
/// ```bash
/// # Run with default logging (info level)
/// fabricd
///
/// # Run with debug logging
/// RUST_LOG=debug fabricd
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = loader_config();
    info!(
        "Using {:?} in {:?}, staging firmware in {:?}",
        config.device_handle, config.fpga_managers_dir, config.firmware_dir
    );

    let status_interface = StatusInterface {};
    let control_interface = ControlInterface {};

    let _conn = connection::Builder::system()?
        .name("com.canonical.fabricd")?
        .serve_at("/com/canonical/fabricd/status", status_interface)?
        .serve_at("/com/canonical/fabricd/control", control_interface)?
        .build()
        .await?;

    info!("Started com.canonical.fabricd dbus service");
    pending::<()>().await;

    Ok(())
}

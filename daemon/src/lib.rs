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

//! fabricd - configure programmable logic and manage the memory map of the loaded design.
//!
//! The library holds everything the daemon does behind its D-Bus interfaces, so that the
//! download pipeline can be driven directly:
//!
//! - [`bitstream`] decodes `.bit`, `.bin` and `.xclbin` containers
//! - [`metadata`] reconciles the hardware description with packaged metadata, synthesizing the
//!   latter through the packaging tool when a design ships only a description
//! - [`mmio`] maps physical memory and edits register bit fields
//! - [`platforms`] covers the FPGA manager and AXI port-width fixup
//! - [`download`] sequences a download and owns the canonical memory registry

pub mod bitstream;
pub mod config;
pub mod download;
pub mod error;
pub mod metadata;
pub mod mmio;
pub mod platforms;
pub mod system_io;

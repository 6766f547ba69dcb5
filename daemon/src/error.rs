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

use log::error;
use std::path::PathBuf;
use zbus::fdo;

#[derive(Debug, thiserror::Error)]
pub enum FabricdError {
    #[error("FabricdError::Format: Malformed container content: {0}")]
    Format(String),
    #[error("FabricdError::Permission: {0}")]
    Permission(String),
    #[error("FabricdError::Tool: {tool} failed: {output}")]
    Tool { tool: String, output: String },
    #[error("FabricdError::RuntimeConfig: {0}")]
    RuntimeConfig(String),
    #[error("FabricdError::Argument: {0}")]
    Argument(String),
    #[error("FabricdError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("FabricdError::IOWrite: An IO error occurred when writing to {file:?}: {e}")]
    IOWrite { file: PathBuf, e: std::io::Error },
    #[error("FabricdError::IOCreate: An IO error occurred when creating {file:?}: {e}")]
    IOCreate { file: PathBuf, e: std::io::Error },
    #[error("FabricdError::IODelete: An IO error occurred when deleting {file:?}: {e}")]
    IODelete { file: PathBuf, e: std::io::Error },
    #[error(
        "FabricdError::Mmap: Failed to map {length:#x} bytes at physical address {address:#x}: {e}"
    )]
    Mmap {
        address: u64,
        length: usize,
        e: std::io::Error,
    },
    #[error("FabricdError::Json: Failed to (de)serialize {what}: {e}")]
    Json { what: String, e: serde_json::Error },
    #[error("FabricdError::TomlDe: Failed to parse config {file:?}: {e}")]
    TomlDe {
        file: PathBuf,
        e: toml::de::Error,
    },
    #[error("FabricdError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl From<FabricdError> for fdo::Error {
    fn from(err: FabricdError) -> Self {
        error!("{err}");
        match err {
            FabricdError::Argument(..) => fdo::Error::InvalidArgs(err.to_string()),
            FabricdError::Permission(..) => fdo::Error::AccessDenied(err.to_string()),
            FabricdError::IORead { .. } => fdo::Error::IOError(err.to_string()),
            FabricdError::IOWrite { .. } => fdo::Error::IOError(err.to_string()),
            FabricdError::IOCreate { .. } => fdo::Error::IOError(err.to_string()),
            FabricdError::IODelete { .. } => fdo::Error::IOError(err.to_string()),
            _ => fdo::Error::Failed(err.to_string()),
        }
    }
}

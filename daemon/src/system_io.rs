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

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around `std::fs` which log at trace level and convert failures into the
//! path-carrying [`FabricdError`] I/O variants, so that an error reported over D-Bus always
//! names the file that caused it.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use fabricd::system_io::{fs_read, fs_write};
//! # use std::path::Path;
//! # fn example() -> Result<(), fabricd::error::FabricdError> {
//! let state = fs_read(Path::new("/sys/class/fpga_manager/fpga0/state"))?;
//! fs_write(Path::new("/sys/class/fpga_manager/fpga0/flags"), false, "0")?;
//! # Ok(())
//! # }
//! ```

use crate::error::FabricdError;
use log::trace;
use std::fs::{OpenOptions, create_dir_all, remove_dir_all, remove_file};
use std::io::{Read, Write};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, FabricdError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(FabricdError::IORead)` - If the file cannot be read
pub fn fs_read(file_path: &Path) -> Result<String, FabricdError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(FabricdError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Read the contents of a file as raw bytes.
///
/// Used for container files and sibling metadata, none of which are guaranteed to be UTF-8.
///
/// # Returns: `Result<Vec<u8>, FabricdError>`
/// * `Ok(Vec<u8>)` - The complete contents of the file
/// * `Err(FabricdError::IORead)` - If the file cannot be read
pub fn fs_read_bytes(file_path: &Path) -> Result<Vec<u8>, FabricdError> {
    trace!("Attempting to read bytes from {file_path:?}");
    let mut buf = Vec::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_end(&mut buf));

    match result {
        Ok(n) => {
            trace!("Read {n} bytes");
            Ok(buf)
        }
        Err(e) => Err(FabricdError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Write a string value to a file.
///
/// # Arguments
///
/// * `file_path` - Path to the file to write
/// * `create` - If `true`, create the file if it doesn't exist; if `false`, file must already exist
/// * `value` - The string value to write
///
/// # Returns: `Result<(), FabricdError>`
/// * `Ok(())` - Write succeeded
/// * `Err(FabricdError::IOWrite)` - If the write fails
pub fn fs_write(file_path: &Path, create: bool, value: impl AsRef<str>) -> Result<(), FabricdError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    let result = OpenOptions::new()
        .create(create)
        .read(false)
        .write(true)
        .truncate(create)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()));
    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(FabricdError::IOWrite {
            file: file_path.into(),
            e,
        }),
    }
}

/// Write binary data to a file, truncating any existing content.
///
/// # Returns: `Result<(), FabricdError>`
/// * `Ok(())` - Write succeeded
/// * `Err(FabricdError::IOWrite)` - If the write fails
pub fn fs_write_bytes(file_path: &Path, create: bool, data: &[u8]) -> Result<(), FabricdError> {
    trace!("Attempting to write {} bytes to {file_path:?}", data.len());
    let result = OpenOptions::new()
        .create(create)
        .write(true)
        .truncate(true)
        .open(file_path)
        .and_then(|mut f| f.write_all(data));

    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(FabricdError::IOWrite {
            file: file_path.into(),
            e,
        }),
    }
}

/// Recursively create directories up to the specified path.
///
/// # Returns: `Result<(), FabricdError>`
/// * `Ok(())` - Directory created (or already existed)
/// * `Err(FabricdError::IOCreate)` - If directory creation fails
pub fn fs_create_dir(path: &Path) -> Result<(), FabricdError> {
    trace!("Attempting to Create '{path:?}'");
    match create_dir_all(path) {
        Ok(_) => {
            trace!("Directory created at {path:?}.");
            Ok(())
        }
        Err(e) => Err(FabricdError::IOCreate {
            file: path.into(),
            e,
        }),
    }
}

/// Remove a directory and everything below it.
///
/// # Returns: `Result<(), FabricdError>`
/// * `Ok(())` - Directory removed
/// * `Err(FabricdError::IODelete)` - If removal fails
pub fn fs_remove_dir_all(path: &Path) -> Result<(), FabricdError> {
    trace!("Attempting to delete '{path:?}'");
    match remove_dir_all(path) {
        Ok(_) => {
            trace!("Deleted {path:?}");
            Ok(())
        }
        Err(e) => Err(FabricdError::IODelete {
            file: path.into(),
            e,
        }),
    }
}

/// Remove a single file.
///
/// # Returns: `Result<(), FabricdError>`
/// * `Ok(())` - File removed
/// * `Err(FabricdError::IODelete)` - If removal fails
pub fn fs_remove_file(path: &Path) -> Result<(), FabricdError> {
    trace!("Attempting to delete '{path:?}'");
    remove_file(path).map_err(|e| FabricdError::IODelete {
        file: path.into(),
        e,
    })
}

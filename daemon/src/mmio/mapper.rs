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

//! Page-aligned mappings of physical memory through the raw-memory device.
//!
//! Requires root. Each call to [`MemoryMapper::map`] creates an independent mapping which is
//! released exactly once, when the returned [`MemoryWindow`] is dropped or
//! [`unmap`](MemoryWindow::unmap)ped.

use crate::error::FabricdError;
use crate::mmio::bitfield::RegisterAccess;
use log::trace;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Where a requested physical range sits relative to the pages that must be mapped for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    pub requested_address: u64,
    pub requested_length: usize,
    pub page_aligned_base: u64,
    pub byte_offset_into_page: usize,
}

impl WindowLayout {
    /// `page_size` must be a power of two.
    pub fn new(address: u64, length: usize, page_size: u64) -> Self {
        let page_aligned_base = address & !(page_size - 1);
        WindowLayout {
            requested_address: address,
            requested_length: length,
            page_aligned_base,
            byte_offset_into_page: (address - page_aligned_base) as usize,
        }
    }

    /// Number of bytes that have to be mapped starting at `page_aligned_base`.
    pub fn mapped_length(&self) -> usize {
        self.requested_length + self.byte_offset_into_page
    }

    /// Number of whole 32-bit words addressable through the window.
    pub fn word_count(&self) -> usize {
        self.requested_length >> 2
    }
}

pub fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}

fn is_privileged() -> bool {
    // SAFETY: geteuid cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Word-addressable view of a mapped physical range. Word 0 is `requested_address`.
#[derive(Debug)]
pub struct MemoryWindow {
    layout: WindowLayout,
    map_base: *mut libc::c_void,
}

impl MemoryWindow {
    pub fn layout(&self) -> &WindowLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.layout.word_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn word_ptr(&self, index: usize) -> Result<*mut u32, FabricdError> {
        if index >= self.len() {
            return Err(FabricdError::Argument(format!(
                "word {index} is outside the {}-word window at {:#x}",
                self.len(),
                self.layout.requested_address
            )));
        }
        // SAFETY: offset + 4 * index + 4 <= mapped_length, checked above.
        Ok(unsafe {
            (self.map_base as *mut u8)
                .add(self.layout.byte_offset_into_page + index * 4)
                .cast::<u32>()
        })
    }

    pub fn read(&self, index: usize) -> Result<u32, FabricdError> {
        let ptr = self.word_ptr(index)?;
        // SAFETY: ptr lies inside the live mapping.
        Ok(unsafe { ptr.read_volatile() })
    }

    pub fn write(&self, index: usize, value: u32) -> Result<(), FabricdError> {
        let ptr = self.word_ptr(index)?;
        // SAFETY: ptr lies inside the live mapping, which is PROT_WRITE.
        unsafe { ptr.write_volatile(value) };
        Ok(())
    }

    /// Release the mapping now rather than at end of scope.
    pub fn unmap(self) {
        drop(self)
    }
}

impl Drop for MemoryWindow {
    fn drop(&mut self) {
        trace!(
            "Unmapping {:#x} bytes at {:#x}",
            self.layout.mapped_length(),
            self.layout.page_aligned_base
        );
        // SAFETY: map_base/mapped_length are exactly what mmap returned and was given.
        unsafe {
            libc::munmap(self.map_base, self.layout.mapped_length());
        }
    }
}

/// Maps windows of physical memory through a raw-memory device such as `/dev/mem`.
#[derive(Debug, Clone)]
pub struct MemoryMapper {
    device: PathBuf,
    page_size: u64,
}

impl MemoryMapper {
    pub fn new(device: &Path) -> Self {
        MemoryMapper {
            device: device.to_path_buf(),
            page_size: page_size(),
        }
    }

    /// Map `length` bytes of physical memory starting at `address`.
    ///
    /// # Returns: `Result<MemoryWindow, FabricdError>`
    /// * `Ok(MemoryWindow)` - A fresh mapping; never shared with earlier calls
    /// * `Err(FabricdError::Permission)` - Not running as root; checked before opening anything
    /// * `Err(FabricdError::IORead)` - The device could not be opened
    /// * `Err(FabricdError::Mmap)` - The kernel refused the mapping
    pub fn map(&self, address: u64, length: usize) -> Result<MemoryWindow, FabricdError> {
        if !is_privileged() {
            return Err(FabricdError::Permission(format!(
                "root permissions are required to map {:?}",
                self.device
            )));
        }
        let layout = WindowLayout::new(address, length, self.page_size);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&self.device)
            .map_err(|e| FabricdError::IORead {
                file: self.device.clone(),
                e,
            })?;

        trace!(
            "Mapping {:#x} bytes of {:?} at {:#x} for {:#x}",
            layout.mapped_length(),
            self.device,
            layout.page_aligned_base,
            address
        );
        // SAFETY: a fresh shared mapping of an open descriptor; the result is checked below.
        let map_base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                layout.mapped_length(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                layout.page_aligned_base as libc::off_t,
            )
        };
        // the mapping outlives the descriptor
        drop(file);
        if map_base == libc::MAP_FAILED {
            return Err(FabricdError::Mmap {
                address,
                length,
                e: std::io::Error::last_os_error(),
            });
        }
        Ok(MemoryWindow { layout, map_base })
    }
}

impl RegisterAccess for MemoryMapper {
    fn read32(&self, address: u64) -> Result<u32, FabricdError> {
        self.map(address, 4)?.read(0)
    }

    fn write32(&self, address: u64, value: u32) -> Result<(), FabricdError> {
        self.map(address, 4)?.write(0, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    fn unaligned_request_keeps_element_zero_at_address() {
        let layout = WindowLayout::new(0x1003, 8, 4096);
        expect_that!(layout.page_aligned_base, eq(0x1000));
        expect_that!(layout.byte_offset_into_page, eq(3));
        expect_that!(layout.mapped_length(), eq(11));
        expect_that!(layout.word_count(), eq(2));
        expect_that!(
            layout.page_aligned_base + layout.byte_offset_into_page as u64,
            eq(0x1003)
        );
    }

    #[gtest]
    #[rstest]
    #[case::aligned(0xFD61_5000, 4096)]
    #[case::last_byte_of_page(0xFD61_5FFF, 4096)]
    #[case::mid_page(0xFF41_9004, 4096)]
    #[case::large_pages(0x8000_1234, 65536)]
    fn window_invariant_holds(#[case] address: u64, #[case] page: u64) {
        let layout = WindowLayout::new(address, 4, page);
        expect_that!(layout.page_aligned_base % page, eq(0));
        expect_that!(layout.page_aligned_base, le(address));
        expect_that!(address, lt(layout.page_aligned_base + page));
        expect_that!(
            layout.page_aligned_base + layout.byte_offset_into_page as u64,
            eq(address)
        );
    }

    #[gtest]
    fn unprivileged_map_is_refused_before_opening() {
        if is_privileged() {
            return;
        }
        let mapper = MemoryMapper::new(Path::new("/nonexistent/mem"));
        expect_that!(
            mapper.map(0x1000, 4),
            err(displays_as(contains_substring("FabricdError::Permission")))
        );
    }
}

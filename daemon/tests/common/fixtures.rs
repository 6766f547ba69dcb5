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

#![allow(dead_code)]

use fabricd::config::LoaderConfig;
use fabricd::download::Allocator;
use fabricd::error::FabricdError;
use fabricd::metadata::synth::{OUTPUT_FILE, PackagingTool, TOPOLOGY_FILE};
use fabricd::metadata::topology::TopologyDocument;
use fabricd::mmio::bitfield::RegisterAccess;
use fabricd::platforms::platform::Fpga;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Ordered record of everything the fakes were asked to do.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

static DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let n = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("fabricd-it-{}-{name}-{n}", std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn test_config(root: &Path) -> LoaderConfig {
    let firmware_dir = root.join("firmware");
    let scratch = root.join("scratch");
    fs::create_dir_all(&firmware_dir).unwrap();
    fs::create_dir_all(&scratch).unwrap();
    LoaderConfig {
        fpga_managers_dir: root.join("fpga_manager"),
        firmware_dir,
        scratch_dir: scratch,
        ..Default::default()
    }
}

fn text_field(tag: u8, value: &str) -> Vec<u8> {
    let mut field = vec![tag];
    field.extend_from_slice(&((value.len() + 1) as u16).to_be_bytes());
    field.extend_from_slice(value.as_bytes());
    field.push(0);
    field
}

/// A `.bit` file carrying `payload`.
pub fn build_bit(payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0x00, 0x09];
    data.extend_from_slice(&[0x0F, 0xF0, 0x0F, 0xF0, 0x0F, 0xF0, 0x0F, 0xF0, 0x00]);
    data.extend_from_slice(&[0x00, 0x01]);
    data.extend(text_field(0x61, "base_wrapper;UserID=0XFFFFFFFF;Version=2023.2"));
    data.extend(text_field(0x62, "xczu7ev-ffvc1156-2-e"));
    data.extend(text_field(0x63, "2025/03/14"));
    data.extend(text_field(0x64, "09:26:53"));
    data.push(0x65);
    data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    data.extend_from_slice(payload);
    data
}

/// Binary `MEM_TOPOLOGY` section from `(size_kb, base, tag)` entries, all DDR4 and used.
pub fn build_mem_topology(entries: &[(u64, u64, &str)]) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    data[..4].copy_from_slice(&(entries.len() as i32).to_le_bytes());
    for (size_kb, base, tag) in entries {
        let mut entry = [0u8; 40];
        entry[0] = 1;
        entry[1] = 1;
        entry[8..16].copy_from_slice(&size_kb.to_le_bytes());
        entry[16..24].copy_from_slice(&base.to_le_bytes());
        entry[24..24 + tag.len()].copy_from_slice(tag.as_bytes());
        data.extend_from_slice(&entry);
    }
    data
}

/// An `.xclbin` container from `(kind, contents)` sections.
pub fn build_xclbin(sections: &[(u32, &[u8])]) -> Vec<u8> {
    let table_end = 456 + sections.len() * 40;
    let mut data = vec![0u8; table_end];
    data[..8].copy_from_slice(b"xclbin2\0");
    data[448..452].copy_from_slice(&(sections.len() as u32).to_le_bytes());
    for (i, (kind, contents)) in sections.iter().enumerate() {
        let at = 456 + i * 40;
        let offset = data.len() as u64;
        data[at..at + 4].copy_from_slice(&kind.to_le_bytes());
        data[at + 24..at + 32].copy_from_slice(&offset.to_le_bytes());
        data[at + 32..at + 40].copy_from_slice(&(contents.len() as u64).to_le_bytes());
        data.extend_from_slice(contents);
    }
    let total = data.len() as u64;
    data[304..312].copy_from_slice(&total.to_le_bytes());
    data
}

/// Packaging tool which turns the topology document it is given into a real container, after
/// failing a configurable number of times.
#[derive(Default)]
pub struct FakeTool {
    pub failures: AtomicU32,
    pub calls: Mutex<Vec<Vec<String>>>,
    pub documents: Mutex<Vec<TopologyDocument>>,
    pub workdirs: Mutex<Vec<PathBuf>>,
}

impl FakeTool {
    pub fn failing(times: u32) -> Self {
        FakeTool {
            failures: AtomicU32::new(times),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PackagingTool for FakeTool {
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<(), FabricdError> {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(|a| a.to_string()).collect());
        self.workdirs.lock().unwrap().push(workdir.to_path_buf());
        if self.failures.load(Ordering::Relaxed) > 0 {
            self.failures.fetch_sub(1, Ordering::Relaxed);
            return Err(FabricdError::Tool {
                tool: "xclbinutil".into(),
                output: "ERROR: transient failure".into(),
            });
        }

        let json = fs::read_to_string(workdir.join(TOPOLOGY_FILE)).unwrap();
        let document: TopologyDocument = serde_json::from_str(&json).unwrap();
        let entries: Vec<(u64, u64, &str)> = document
            .mem_topology
            .m_mem_data
            .iter()
            .map(|m| (m.m_size_kb, m.m_base_address, m.m_tag.as_str()))
            .collect();
        let xclbin = build_xclbin(&[(6, &build_mem_topology(&entries))]);
        fs::write(workdir.join(OUTPUT_FILE), xclbin).unwrap();
        self.documents.lock().unwrap().push(document);
        Ok(())
    }
}

pub struct FakeFpga {
    pub journal: Journal,
    pub reject_firmware: bool,
}

impl Fpga for FakeFpga {
    fn device_handle(&self) -> &str {
        "fpga0"
    }

    fn state(&self) -> Result<String, FabricdError> {
        Ok("operating".into())
    }

    fn flags(&self) -> Result<u32, FabricdError> {
        Ok(0)
    }

    fn set_flags(&self, flags: u32) -> Result<(), FabricdError> {
        self.journal.lock().unwrap().push(format!("flags:{flags}"));
        Ok(())
    }

    fn load_firmware(&self, bitstream_path_rel: &Path) -> Result<(), FabricdError> {
        if self.reject_firmware {
            return Err(FabricdError::IOWrite {
                file: PathBuf::from("fpga0/firmware"),
                e: std::io::Error::other("Invalid argument"),
            });
        }
        self.journal
            .lock()
            .unwrap()
            .push(format!("firmware:{}", bitstream_path_rel.display()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegisters {
    pub journal: Journal,
    pub values: Arc<Mutex<HashMap<u64, u32>>>,
}

impl RegisterAccess for FakeRegisters {
    fn read32(&self, address: u64) -> Result<u32, FabricdError> {
        Ok(*self.values.lock().unwrap().get(&address).unwrap_or(&0))
    }

    fn write32(&self, address: u64, value: u32) -> Result<(), FabricdError> {
        self.values.lock().unwrap().insert(address, value);
        self.journal
            .lock()
            .unwrap()
            .push(format!("write:{address:#x}:{value:#x}"));
        Ok(())
    }
}

pub struct FakeAllocator {
    pub journal: Journal,
}

impl Allocator for FakeAllocator {
    fn load_packaged_metadata(&mut self, stem: &str, data: &[u8]) -> Result<(), FabricdError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("load:{stem}:{}", data.len()));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), FabricdError> {
        self.journal.lock().unwrap().push("shutdown".into());
        Ok(())
    }
}

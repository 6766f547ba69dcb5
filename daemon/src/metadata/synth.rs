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

//! Synthesis of minimal packaged metadata for designs which only ship a hardware description.
//!
//! A topology document with one CPU-side DDR entry followed by one entry per described region
//! is written to a scratch directory together with a blank platform description, and the
//! external packaging tool turns the pair into an `.xclbin`.

use crate::config::LoaderConfig;
use crate::error::FabricdError;
use crate::metadata::region::MemoryRegistry;
use crate::metadata::topology::{MemData, MemTopology, TopologyDocument};
use crate::system_io::{fs_create_dir, fs_read_bytes, fs_remove_dir_all, fs_write};
use log::{info, trace, warn};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

pub const METADATA_FILE: &str = "metadata.xml";
pub const TOPOLOGY_FILE: &str = "mem.json";
pub const OUTPUT_FILE: &str = "t.xclbin";

pub const BLANK_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project name="binary_container_1">
  <platform vendor="xilinx" boardid="zcu111" name="name" featureRomTime="0">
    <version major="0" minor="1"/>
    <description/>
    <board name="xilinx.com:zcu111:1.4"
            vendor="xilinx.com" fpga="xczu28dr-ffvg1517-2-e">
      <interfaces/>
      <memories>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
        <memory name="ddr4_0" type="ddr4" size="4GB"/>
      </memories>
      <images>
        <image name="zcu111_board.jpeg" type="HDPI"/>
        <image name="" type="MDPI"/>
        <image name="" type="LDPI"/>
      </images>
      <id>
        <vendor/>
        <device/>
        <subsystem/>
      </id>
    </board>
    <build_flow/>
    <host architecture="unknown"/>
    <device name="fpga0" fpgaDevice="zynquplusRFSOC:xczu28dr:ffvg1517:-2:e"
            addrWidth="0">
      <core name="OCL_REGION_0" target="bitstream" type="clc_region"
            clockFreq="0MHz" numComputeUnits="60">
        <kernelClocks>
          <clock port="KERNEL_CLK" frequency="333.250000MHz"/>
          <clock port="DATA_CLK" frequency="99.999001MHz"/>
        </kernelClocks>
      </core>
    </device>
  </platform>
</project>
"#;

/// Size of the CPU-side DDR entry, in KiB.
const PS_DDR_SIZE_KB: u64 = 256 * 1024;
const PS_DDR_TAG: &str = "PSDDR";
const MEM_TYPE: &str = "MEM_DDR4";

/// The external packaging tool, injected so that tests can substitute it.
pub trait PackagingTool {
    /// Run the tool with `args` inside `workdir`.
    ///
    /// # Returns: `Result<(), FabricdError>`
    /// * `Ok(())` - The tool exited successfully
    /// * `Err(FabricdError::Tool)` - Non-zero exit, carrying the combined output
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<(), FabricdError>;
}

/// Runs `xclbinutil` (or whatever binary the config names) as a subprocess.
#[derive(Debug)]
pub struct Xclbinutil {
    pub program: PathBuf,
}

impl PackagingTool for Xclbinutil {
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<(), FabricdError> {
        let tool = self.program.to_string_lossy().into_owned();
        trace!("Running {tool} {args:?} in {workdir:?}");
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(workdir)
            .output()
            .map_err(|e| FabricdError::Tool {
                tool: tool.clone(),
                output: format!("failed to start: {e}"),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            Err(FabricdError::Tool {
                tool,
                output: format!("{} ({})", combined.trim_end(), output.status),
            })
        }
    }
}

/// Build the topology document for `described`, assigning each described region its index in
/// the document.
pub fn topology_for(described: &mut MemoryRegistry) -> TopologyDocument {
    let mut entries = vec![MemData {
        m_type: MEM_TYPE.into(),
        m_used: 1,
        m_size_kb: PS_DDR_SIZE_KB,
        m_tag: PS_DDR_TAG.into(),
        m_base_address: 0,
    }];
    for region in described.iter_mut() {
        let index = entries.len();
        region.xrt_index = Some(index);
        entries.push(MemData {
            m_type: MEM_TYPE.into(),
            m_used: 1,
            m_size_kb: region.addr_range.unwrap_or(0) / 1024,
            m_tag: format!("MIG{index}"),
            m_base_address: region.phys_addr.unwrap_or(0),
        });
    }
    TopologyDocument {
        mem_topology: MemTopology {
            m_count: entries.len(),
            m_mem_data: entries,
        },
    }
}

static SCRATCH_COUNTER: AtomicU32 = AtomicU32::new(0);

fn scratch_path(parent: &Path) -> PathBuf {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    parent.join(format!("fabricd-xclbin-{}-{n}", std::process::id()))
}

pub struct MetadataSynthesizer<'a> {
    tool: &'a dyn PackagingTool,
    scratch_parent: PathBuf,
}

impl<'a> MetadataSynthesizer<'a> {
    pub fn new(tool: &'a dyn PackagingTool, config: &LoaderConfig) -> Self {
        MetadataSynthesizer {
            tool,
            scratch_parent: config.scratch_dir.clone(),
        }
    }

    /// Produce packaged-metadata bytes covering the regions in `described`.
    ///
    /// `described` gains the `xrt_index` each region was given in the synthesized topology.
    /// The scratch directory is removed whether or not the tool succeeded.
    pub fn synthesize(&self, described: &mut MemoryRegistry) -> Result<Vec<u8>, FabricdError> {
        let document = topology_for(described);
        let workdir = scratch_path(&self.scratch_parent);
        fs_create_dir(&workdir)?;
        let result = self.package(&workdir, &document);
        if let Err(e) = fs_remove_dir_all(&workdir) {
            warn!("Failed to clean up scratch directory: {e}");
        }
        result
    }

    /// As [`synthesize`](Self::synthesize), retrying up to `retries` more times on a
    /// [`FabricdError::Tool`] failure. Other errors are returned immediately.
    pub fn synthesize_with_retries(
        &self,
        described: &mut MemoryRegistry,
        retries: u32,
    ) -> Result<Vec<u8>, FabricdError> {
        let mut attempt = 0;
        loop {
            match self.synthesize(described) {
                Err(e @ FabricdError::Tool { .. }) if attempt < retries => {
                    attempt += 1;
                    warn!("Packaging attempt {attempt} of {} failed: {e}", retries + 1);
                }
                result => return result,
            }
        }
    }

    fn package(&self, workdir: &Path, document: &TopologyDocument) -> Result<Vec<u8>, FabricdError> {
        fs_write(&workdir.join(METADATA_FILE), true, BLANK_METADATA)?;
        fs_write(&workdir.join(TOPOLOGY_FILE), true, document.to_json()?)?;
        let metadata_arg = format!("--add-section=EMBEDDED_METADATA:RAW:{METADATA_FILE}");
        let topology_arg = format!("--add-section=MEM_TOPOLOGY:JSON:{TOPOLOGY_FILE}");
        self.tool.run(
            workdir,
            &[
                &metadata_arg,
                &topology_arg,
                "--output",
                OUTPUT_FILE,
                "--skip-bank-grouping",
            ],
        )?;
        let data = fs_read_bytes(&workdir.join(OUTPUT_FILE))?;
        info!(
            "Synthesized {} bytes of packaged metadata for {} regions",
            data.len(),
            document.mem_topology.m_count
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::region::MemoryRegion;
    use googletest::prelude::*;

    #[gtest]
    fn blank_metadata_lists_eight_ddr_banks() {
        expect_that!(BLANK_METADATA.matches("<memory name=\"ddr4_0\"").count(), eq(8));
        expect_that!(BLANK_METADATA, starts_with("<?xml version=\"1.0\""));
    }

    fn described() -> MemoryRegistry {
        [
            MemoryRegion {
                tag: "bram".into(),
                phys_addr: Some(0xA000_0000),
                addr_range: Some(0x2000),
                ..Default::default()
            },
            MemoryRegion {
                tag: "hp0".into(),
                phys_addr: Some(0x4000_0000),
                addr_range: Some(0x10_0000),
                ..Default::default()
            },
        ]
        .into_iter()
        .collect()
    }

    #[gtest]
    fn topology_starts_with_ps_ddr() {
        let mut regions = described();
        let document = topology_for(&mut regions);
        let data = &document.mem_topology.m_mem_data;
        expect_that!(document.mem_topology.m_count, eq(3));
        expect_that!(data[0].m_tag, eq("PSDDR"));
        expect_that!(data[0].m_base_address, eq(0));
        expect_that!(data[0].m_size_kb, eq(256 * 1024));
        expect_that!(data[1].m_tag, eq("MIG1"));
        expect_that!(data[1].m_size_kb, eq(8));
        expect_that!(data[1].m_base_address, eq(0xA000_0000));
        expect_that!(data[2].m_tag, eq("MIG2"));
        expect_that!(
            regions.get("hp0").and_then(|r| r.xrt_index),
            some(eq(2))
        );
    }
}

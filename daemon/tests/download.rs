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

mod common {
    pub mod fixtures;
}

use common::fixtures::*;
use fabricd::config::LoaderConfig;
use fabricd::download::{Bitstream, DownloadSession, DownloadState, get_bitfile_metadata};
use fabricd::metadata::Metadata;
use fabricd::metadata::description::JsonDescriptionParser;
use fabricd::metadata::synth::MetadataSynthesizer;
use googletest::prelude::*;
use rstest::*;
use std::fs;
use std::path::{Path, PathBuf};

const PAYLOAD: [u8; 8] = [0x11, 0x22, 0x33, 0x44, 0xAA, 0xBB, 0xCC, 0xDD];

fn description_json(maxigp0_width: &str) -> String {
    format!(
        r#"{{
            "ps_name": "zynq_ultra_ps_e_0",
            "family_ps": "zynq_ultra_ps_e",
            "ip_dict": {{
                "zynq_ultra_ps_e_0": {{"parameters": {{
                    "C_MAXIGP0_DATA_WIDTH": "{maxigp0_width}",
                    "C_SAXIGP2_DATA_WIDTH": "64"
                }}}}
            }},
            "mem_dict": {{
                "axi_bram_ctrl_0": {{"phys_addr": 2684354560, "addr_range": 8192}}
            }}
        }}"#
    )
}

/// Write `<stem>.bit` and its description under `dir`.
fn write_design(dir: &Path, stem: &str, maxigp0_width: &str) -> PathBuf {
    let path = dir.join(format!("{stem}.bit"));
    fs::write(&path, build_bit(&PAYLOAD)).unwrap();
    fs::write(dir.join(format!("{stem}.hwh.json")), description_json(maxigp0_width)).unwrap();
    path
}

struct Rig {
    config: LoaderConfig,
    journal: Journal,
    session: DownloadSession,
}

fn rig(name: &str, reject_firmware: bool) -> Rig {
    let root = scratch_dir(name);
    let config = test_config(&root);
    let journal = journal();
    let session = DownloadSession::new(
        &config.firmware_dir,
        Box::new(FakeFpga {
            journal: journal.clone(),
            reject_firmware,
        }),
        Box::new(FakeRegisters {
            journal: journal.clone(),
            ..Default::default()
        }),
        Box::new(FakeAllocator {
            journal: journal.clone(),
        }),
    );
    Rig {
        config,
        journal,
        session,
    }
}

fn metadata_for(path: &Path, config: &LoaderConfig, tool: &FakeTool) -> Metadata {
    let synthesizer = MetadataSynthesizer::new(tool, config);
    get_bitfile_metadata(path, &JsonDescriptionParser, &synthesizer, 0).unwrap()
}

#[gtest]
fn full_download_runs_every_step_in_order() {
    let mut rig = rig("full", false);
    let path = write_design(&rig.config.firmware_dir, "top", "128");
    let tool = FakeTool::default();
    let metadata = metadata_for(&path, &rig.config, &tool);

    rig.session
        .download(Bitstream::new(&path, false), Some(metadata))
        .unwrap();

    expect_that!(rig.session.state(), eq(DownloadState::Bound));
    expect_that!(rig.session.registry().map(|r| r.len()), some(eq(2)));
    let journal = entries(&rig.journal);
    expect_that!(journal.len(), eq(7));
    expect_that!(
        journal[..6].to_vec(),
        elements_are![
            eq("shutdown"),
            eq("flags:0"),
            eq("firmware:top.bin"),
            eq("write:0xfd615000:0x200"),
            eq("write:0xfd380000:0x1"),
            eq("write:0xfd380014:0x1")
        ]
    );
    expect_that!(journal[6].as_str(), starts_with("load:top:"));

    let staged = fs::read(rig.config.firmware_dir.join("top.bin")).unwrap();
    expect_that!(staged, eq(&vec![0x44u8, 0x33, 0x22, 0x11, 0xDD, 0xCC, 0xBB, 0xAA]));
    expect_that!(
        rig.session.bitstream().and_then(|b| b.binfile_name.as_deref()),
        some(eq("top.bin"))
    );
}

#[gtest]
fn reconciled_registry_is_bound() {
    let mut rig = rig("registry", false);
    let path = write_design(&rig.config.firmware_dir, "top", "64");
    let tool = FakeTool::default();
    let metadata = metadata_for(&path, &rig.config, &tool);
    rig.session
        .download(Bitstream::new(&path, false), Some(metadata))
        .unwrap();

    let registry = rig.session.registry().unwrap();
    let bram = registry.get("axi_bram_ctrl_0").unwrap();
    expect_that!(bram.base_address, some(eq(0xA000_0000)));
    expect_that!(bram.size_bytes, some(eq(8192)));
    expect_that!(bram.xrt_index, some(eq(1)));
    expect_that!(registry.get("MIG1"), none());

    let ps = rig.session.default_memory().unwrap();
    expect_that!(ps.tag, eq("PSDDR"));
    expect_that!(ps.xrt_index, some(eq(0)));
}

#[gtest]
fn partial_download_keeps_existing_bindings() {
    let mut rig = rig("partial", false);
    let path = write_design(&rig.config.firmware_dir, "rm0", "32");
    let tool = FakeTool::default();
    let metadata = metadata_for(&path, &rig.config, &tool);
    rig.session
        .download(Bitstream::new(&path, true), Some(metadata))
        .unwrap();

    let journal = entries(&rig.journal);
    expect_that!(journal, not(contains(eq("shutdown"))));
    expect_that!(journal[0].as_str(), eq("flags:1"));
    expect_that!(journal[1].as_str(), eq("firmware:rm0.bin"));
}

#[gtest]
fn already_staged_bitstream_is_not_rewritten() {
    let mut rig = rig("staged", false);
    let path = rig.config.firmware_dir.join("pre.bin");
    fs::write(&path, PAYLOAD).unwrap();
    let bitstream = Bitstream {
        binfile_name: Some("elsewhere.bin".into()),
        ..Bitstream::new(&path, true)
    };
    rig.session.download(bitstream, None).unwrap();

    expect_that!(entries(&rig.journal), elements_are![eq("flags:1"), eq("firmware:elsewhere.bin")]);
    expect_that!(fs::read(&path).unwrap(), eq(&PAYLOAD.to_vec()));
    expect_that!(fs::read_dir(&rig.config.firmware_dir).unwrap().count(), eq(1));
}

#[gtest]
fn download_without_metadata_binds_an_empty_registry() {
    let mut rig = rig("bare", false);
    let path = rig.config.firmware_dir.join("bare.bin");
    fs::write(&path, PAYLOAD).unwrap();
    rig.session
        .download(Bitstream::new(&path, false), None)
        .unwrap();

    expect_that!(rig.session.state(), eq(DownloadState::Bound));
    expect_that!(rig.session.registry().map(|r| r.is_empty()), some(eq(true)));
    expect_that!(
        entries(&rig.journal),
        elements_are![eq("shutdown"), eq("flags:0"), eq("firmware:bare.bin")]
    );
    expect_that!(
        rig.session.default_memory(),
        err(displays_as(contains_substring("not downloaded")))
    );
}

#[gtest]
fn unencodable_width_fails_before_any_register_write() {
    let mut rig = rig("badwidth", false);
    let good = write_design(&rig.config.firmware_dir, "good", "64");
    let bad = write_design(&rig.config.firmware_dir, "bad", "256");
    let tool = FakeTool::default();

    let metadata = metadata_for(&good, &rig.config, &tool);
    rig.session
        .download(Bitstream::new(&good, false), Some(metadata))
        .unwrap();
    let before = rig.session.registry().cloned();
    rig.journal.lock().unwrap().clear();

    let metadata = metadata_for(&bad, &rig.config, &tool);
    let result = rig.session.download(Bitstream::new(&bad, false), Some(metadata));

    expect_that!(
        result,
        err(displays_as(contains_substring("C_MAXIGP0_DATA_WIDTH = '256'")))
    );
    expect_that!(rig.session.state(), eq(DownloadState::Failed));
    expect_that!(rig.session.registry().cloned(), eq(&before));
    expect_that!(
        rig.session.bitstream().map(|b| b.path.clone()),
        some(eq(&good))
    );
    let journal = entries(&rig.journal);
    expect_that!(journal.iter().any(|e| e.starts_with("write:")), eq(false));
    expect_that!(journal.iter().any(|e| e.starts_with("load:")), eq(false));
}

#[gtest]
fn rejected_trigger_leaves_session_failed() {
    let mut rig = rig("reject", true);
    let path = write_design(&rig.config.firmware_dir, "top", "64");
    let tool = FakeTool::default();
    let metadata = metadata_for(&path, &rig.config, &tool);

    let result = rig.session.download(Bitstream::new(&path, false), Some(metadata));
    expect_that!(result, err(displays_as(contains_substring("FabricdError::IOWrite"))));
    expect_that!(rig.session.state(), eq(DownloadState::Failed));
    expect_that!(rig.session.registry(), none());
}

#[gtest]
#[rstest]
#[case::bin("plain.bin")]
#[case::bit("plain.bit")]
fn container_without_metadata_has_no_bitfile_metadata(#[case] name: &str) {
    let dir = scratch_dir("nometa");
    let path = dir.join(name);
    fs::write(&path, build_bit(&PAYLOAD)).unwrap();
    let config = test_config(&dir);
    let tool = FakeTool::default();
    let synthesizer = MetadataSynthesizer::new(&tool, &config);

    expect_that!(
        get_bitfile_metadata(&path, &JsonDescriptionParser, &synthesizer, 0),
        err(displays_as(contains_substring("Unable to find metadata")))
    );
    expect_that!(tool.call_count(), eq(0));
}

/// Bind a good design, then fail to gather the metadata of the container made by `path`.
fn failed_gather_keeps_previous_binding(
    name: &str,
    path: impl Fn(&Path) -> PathBuf,
    tool: FakeTool,
) {
    let mut rig = rig(name, false);
    let good = write_design(&rig.config.firmware_dir, "good", "64");
    let synthesizer_tool = FakeTool::default();
    let synthesizer = MetadataSynthesizer::new(&synthesizer_tool, &rig.config);
    rig.session
        .download_path(Bitstream::new(&good, false), &JsonDescriptionParser, &synthesizer, 0)
        .unwrap();
    let before = rig.session.registry().cloned();
    rig.journal.lock().unwrap().clear();

    let path = path(&rig.config.firmware_dir);
    let synthesizer = MetadataSynthesizer::new(&tool, &rig.config);
    let result = rig.session.download_path(
        Bitstream::new(&path, false),
        &JsonDescriptionParser,
        &synthesizer,
        0,
    );

    expect_that!(result, err(anything()));
    expect_that!(rig.session.state(), eq(DownloadState::Failed));
    expect_that!(rig.session.registry().cloned(), eq(&before));
    expect_that!(
        rig.session.bitstream().map(|b| b.path.clone()),
        some(eq(&good))
    );
    expect_that!(entries(&rig.journal), is_empty());
}

#[gtest]
fn malformed_container_leaves_session_failed() {
    failed_gather_keeps_previous_binding(
        "malformed",
        |dir| {
            let path = dir.join("broken.xclbin");
            let mut data = build_xclbin(&[(6, &build_mem_topology(&[(4, 0, "a")]))]);
            data.truncate(500);
            fs::write(&path, data).unwrap();
            path
        },
        FakeTool::default(),
    );
}

#[gtest]
fn packaging_tool_failure_leaves_session_failed() {
    failed_gather_keeps_previous_binding(
        "toolfail",
        |dir| write_design(dir, "synth", "64"),
        FakeTool::failing(1),
    );
}

#[gtest]
fn download_path_binds_the_gathered_metadata() {
    let mut rig = rig("bypath", false);
    let path = write_design(&rig.config.firmware_dir, "top", "64");
    let tool = FakeTool::default();
    let synthesizer = MetadataSynthesizer::new(&tool, &rig.config);

    rig.session
        .download_path(Bitstream::new(&path, false), &JsonDescriptionParser, &synthesizer, 0)
        .unwrap();

    expect_that!(rig.session.state(), eq(DownloadState::Bound));
    expect_that!(tool.call_count(), eq(1));
    expect_that!(
        rig.session
            .registry()
            .and_then(|r| r.get("axi_bram_ctrl_0"))
            .and_then(|r| r.xrt_index),
        some(eq(1))
    );
}

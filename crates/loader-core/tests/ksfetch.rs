// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Kickstart retrieval from local, block, NFS and HTTP locations.
// Author: Lukas Bower

mod common;

use std::fs;
use std::path::PathBuf;

use common::{Harness, ScriptUi};
use loader_core::data::LoaderData;
use loader_core::error::KickstartError;
use loader_core::ksfetch::{get_kickstart_file, KsFetchEnv};
use loader_core::LoaderFlags;

const KS: &str = "url --url=http://mirror/os\n";

fn fetch(h: &mut Harness, spec: &str, flags: LoaderFlags, data: &mut LoaderData) -> Result<PathBuf, KickstartError> {
    let mut env = KsFetchEnv {
        ui: &mut h.ui,
        mounts: &h.mounts,
        probe: &h.probe,
        network: &mut h.network,
        fetcher: &h.fetcher,
    };
    get_kickstart_file(spec, &mut env, &h.root.paths, flags, data)
}

#[test]
fn bare_ks_reads_root_file() {
    let mut h = Harness::new(ScriptUi::headless());
    let local = h.root.paths.root.join("ks.cfg");
    fs::write(&local, KS).expect("ks");

    let mut data = LoaderData::default();
    let path = fetch(&mut h, "ks", LoaderFlags::empty(), &mut data).expect("kickstart");
    assert_eq!(path, local);
    assert_eq!(data.ks_file.as_deref(), Some(local.to_str().expect("utf8")));
    assert_eq!(h.network.interface_calls, 0);
}

#[test]
fn partition_copy_is_released() {
    let mut h = Harness::new(ScriptUi::headless());
    let tree = h.root.media("usbkey");
    fs::create_dir_all(tree.join("configs")).expect("configs");
    fs::write(tree.join("configs/ks.cfg"), KS).expect("ks");
    h.root.device("sdb1", &tree);

    let mut data = LoaderData::default();
    let path = fetch(&mut h, "hd:sdb1:/configs/ks.cfg", LoaderFlags::empty(), &mut data).expect("kickstart");
    assert_eq!(path, h.root.paths.ks_file);
    assert_eq!(fs::read_to_string(&path).expect("read"), KS);
    assert!(!h.mounts.is_mounted(&h.root.paths.ks_mount));
}

#[test]
fn bios_disk_location_resolves_through_edd() {
    let mut h = Harness::new(ScriptUi::headless());
    let tree = h.root.media("bios");
    fs::write(tree.join("ks.cfg"), KS).expect("ks");
    h.root.device("sda2", &tree);
    h.probe.bios.insert("80".to_owned(), "sda".to_owned());

    let mut data = LoaderData::default();
    let path = fetch(&mut h, "bd:80p2:/ks.cfg", LoaderFlags::empty(), &mut data).expect("kickstart");
    assert_eq!(fs::read_to_string(path).expect("read"), KS);
}

#[test]
fn nfs_location_brings_network_up_first() {
    let mut h = Harness::new(ScriptUi::headless());
    let export = h.root.nfs_export("10.0.0.5", "/ks");
    fs::write(export.join("host.cfg"), KS).expect("ks");

    let mut data = LoaderData::default();
    let path = fetch(&mut h, "nfs:10.0.0.5:/ks/host.cfg", LoaderFlags::empty(), &mut data).expect("kickstart");
    assert_eq!(fs::read_to_string(path).expect("read"), KS);
    assert_eq!(h.network.interface_calls, 1);
    assert_eq!(h.network.configure_calls, 1);
    assert!(h.mounts.history.borrow().iter().any(|entry| entry.starts_with("mount 10.0.0.5:/ks ")));
}

#[test]
fn http_location_downloads_to_ks_file() {
    let mut h = Harness::new(ScriptUi::headless());
    h.fetcher
        .files
        .insert("http://srv/ks.cfg".to_owned(), KS.as_bytes().to_vec());

    let mut data = LoaderData::default();
    let path = fetch(&mut h, "ks=http://srv/ks.cfg", LoaderFlags::empty(), &mut data).expect("kickstart");
    assert_eq!(path, h.root.paths.ks_file);
    assert_eq!(fs::read_to_string(path).expect("read"), KS);
    assert_eq!(h.fetcher.requests.borrow().as_slice(), ["http://srv/ks.cfg"]);
}

#[test]
fn missing_remote_file_is_unavailable() {
    let mut h = Harness::new(ScriptUi::headless());
    let mut data = LoaderData::default();
    let err = fetch(&mut h, "http://srv/none.cfg", LoaderFlags::empty(), &mut data).expect_err("404");
    assert!(matches!(err, KickstartError::Unavailable { .. }), "{err}");
    assert!(data.ks_file.is_none());
}

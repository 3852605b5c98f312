// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Session preparation and the post-acquisition steps.
// Author: Lukas Bower

mod common;

use std::fs;

use common::{Harness, ScriptUi};
use loader_core::data::{LoaderData, MethodData, UrlSource};
use loader_core::{finish_session, prepare_session, LoaderFlags};

#[test]
fn driver_image_and_kickstart_override_are_applied() {
    let mut h = Harness::new(ScriptUi::headless());
    let paths = h.root.paths.clone();
    fs::write(&paths.dd_image, b"driver disk").expect("dd.img");
    let ks = h.root.media("ks").join("override.cfg");
    fs::write(&ks, "url --url=http://mirror/os\nlang fr_FR.UTF-8\n").expect("ks");

    let mut data = LoaderData::default();
    let flags = prepare_session(&mut h.services(), &paths, LoaderFlags::empty(), &mut data, Some(&ks));

    assert!(flags.contains(LoaderFlags::KICKSTART));
    assert_eq!(h.drivers.images, vec![paths.dd_image.clone()]);
    assert_eq!(data.ks_file.as_deref(), ks.to_str());
    assert_eq!(
        data.method,
        Some(MethodData::Url(UrlSource {
            url: Some("http://mirror/os".to_owned()),
            proxy: None,
        }))
    );
    assert_eq!(data.lang.as_deref(), Some("fr_FR.UTF-8"));
    assert!(data.lang_set);
}

#[test]
fn ks_token_is_retrieved_before_parsing() {
    let mut h = Harness::new(ScriptUi::headless());
    let paths = h.root.paths.clone();
    fs::write(paths.root.join("ks.cfg"), "cdrom\n").expect("ks");

    let mut data = LoaderData {
        ks_file: Some("ks".to_owned()),
        ..LoaderData::default()
    };
    let flags = prepare_session(&mut h.services(), &paths, LoaderFlags::empty(), &mut data, None);

    assert!(flags.contains(LoaderFlags::KICKSTART));
    assert_eq!(data.method, Some(MethodData::Cdrom { device: None }));
    assert!(h.drivers.images.is_empty());
}

#[test]
fn unreachable_kickstart_leaves_wizard_unfilled() {
    let mut h = Harness::new(ScriptUi::headless());
    let paths = h.root.paths.clone();
    let mut data = LoaderData {
        ks_file: Some("http://srv/missing.cfg".to_owned()),
        ..LoaderData::default()
    };
    let flags = prepare_session(&mut h.services(), &paths, LoaderFlags::empty(), &mut data, None);

    assert!(!flags.contains(LoaderFlags::KICKSTART));
    assert!(data.ks_file.is_none());
    assert!(data.method.is_none());
}

#[test]
fn runtime_directories_replace_ramdisk_copies() {
    let mut h = Harness::new(ScriptUi::headless());
    let paths = h.root.paths.clone();
    for dir in ["usr/bin", "lib"] {
        fs::create_dir_all(paths.runtime.join(dir)).expect("runtime dir");
    }
    fs::create_dir_all(paths.root.join("lib")).expect("ramdisk lib");
    fs::write(paths.root.join("lib/libc.so"), b"").expect("lib file");

    let ctx = h.context(LoaderFlags::empty());
    let mut data = LoaderData::default();
    finish_session(&mut h.services(), &ctx, &mut data);

    assert_eq!(fs::read_link(paths.root.join("usr")).expect("usr link"), paths.runtime.join("usr"));
    assert_eq!(fs::read_link(paths.root.join("lib")).expect("lib link"), paths.runtime.join("lib"));
    assert!(paths.root.join("lib_old/libc.so").is_file());
    assert!(!paths.root.join("lib64").exists());
}

#[test]
fn testing_mode_leaves_the_ramdisk_alone() {
    let mut h = Harness::new(ScriptUi::headless());
    let paths = h.root.paths.clone();
    fs::create_dir_all(paths.runtime.join("usr")).expect("runtime usr");

    let ctx = h.context(LoaderFlags::TESTING);
    finish_session(&mut h.services(), &ctx, &mut LoaderData::default());
    assert!(!paths.root.join("usr").exists());
}

#[test]
fn updates_url_is_unpacked() {
    let mut h = Harness::new(ScriptUi::headless());
    let paths = h.root.paths.clone();
    let tree = h.root.media("updates");
    fs::write(tree.join("fixes.py"), b"print()").expect("update file");
    h.fetcher.files.insert(
        "http://srv/updates.img".to_owned(),
        tree.display().to_string().into_bytes(),
    );

    let ctx = h.context(LoaderFlags::UPDATES);
    let mut data = LoaderData {
        updates_src: Some("http://srv/updates.img".to_owned()),
        ..LoaderData::default()
    };
    finish_session(&mut h.services(), &ctx, &mut data);

    assert_eq!(data.updates_src.as_deref(), Some("http://srv/updates.img"));
    assert!(paths.updates.join("fixes.py").is_file());
    assert!(!h.mounts.is_mounted(&paths.update_disk));
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: End-to-end acquisition scenarios against a temporary root.
// Author: Lukas Bower

mod common;

use common::{Answer, Harness, ScriptUi, TreeMount, OTHER_STAMP, STAMP};
use loader_core::cmdline::{parse_cmdline_flags, KernelArgs};
use loader_core::data::{DiskSource, LoaderData, Location, MethodData, NfsSource};
use loader_core::extra_args::ExtraArgs;
use loader_core::handoff::installer_args;
use loader_core::kickstart::{apply_kickstart, read_commands, KickstartEnv};
use loader_core::methods::harddrive::mount_hard_drive;
use loader_core::methods::nfs::mount_nfs_image;
use loader_core::ui::PartitionChoice;
use loader_core::{run_loader_main, LoaderFlags, Status};

fn nfs_method(host: &str, dir: &str) -> Option<MethodData> {
    Some(MethodData::Nfs(NfsSource {
        host: Some(host.to_owned()),
        directory: Some(dir.to_owned()),
        options: None,
    }))
}

#[test]
fn repo_on_command_line_skips_method_menu() {
    let mut h = Harness::new(ScriptUi::new([]));
    let export = h.root.nfs_export("server", "/path");
    h.root.install_tree(&export, Some(STAMP));

    let mut data = LoaderData::default();
    let args = KernelArgs::parse("initrd=initrd.img repo=nfs:server:/path").expect("cmdline");
    let flags = parse_cmdline_flags(&args, LoaderFlags::empty(), &h.root.paths, &mut data);
    assert_eq!(data.method, nfs_method("server", "/path"));

    let ctx = h.context(flags);
    let location = run_loader_main(&mut h.services(), &ctx, &mut data).expect("source");

    assert_eq!(
        location,
        Location::NfsTree {
            mountpoint: h.root.paths.source.clone()
        }
    );
    assert!(location.to_string().starts_with("nfs:/"));
    assert!(!h.ui.saw("Installation Method"));
    assert!(h.mounts.is_mounted(&h.root.paths.source));
    assert!(h.mounts.is_mounted(&h.root.paths.runtime));
}

#[test]
fn unresolved_biospart_falls_back_to_partition_selection() {
    let mut h = Harness::new(ScriptUi::new([Answer::Partition(PartitionChoice::Back)]));
    h.probe.partitions = vec!["sda1".to_owned()];
    let commands = read_commands("harddrive --biospart=80p1 --dir=/isos\n").expect("kickstart");

    let mut data = LoaderData::default();
    {
        let mut env = KickstartEnv {
            ui: &mut h.ui,
            probe: &h.probe,
            locale: &mut h.locale,
        };
        apply_kickstart(&commands, &mut env, LoaderFlags::empty(), &mut data);
    }
    assert_eq!(
        data.method,
        Some(MethodData::Disk(DiskSource {
            partition: None,
            directory: Some("/isos".to_owned()),
        }))
    );

    let ctx = h.context(LoaderFlags::KICKSTART);
    let found = mount_hard_drive(&mut h.services(), &ctx, &mut data).expect("mounter");
    assert_eq!(found, None);
    assert!(data.method.is_none());
    assert!(h.ui.saw("Select Partition"));
}

#[test]
fn stamp_mismatch_returns_to_nfs_parameters() {
    let mut h = Harness::new(ScriptUi::new([Answer::Entries(vec!["server", "/good"])]));
    let stale = h.root.nfs_export("server", "/stale");
    h.root.install_tree(&stale, Some(OTHER_STAMP));
    let good = h.root.nfs_export("server", "/good");
    h.root.install_tree(&good, Some(STAMP));

    let mut data = LoaderData {
        method: nfs_method("server", "/stale"),
        ..LoaderData::default()
    };
    let ctx = h.context(LoaderFlags::empty());
    let found = mount_nfs_image(&mut h.services(), &ctx, &mut data).expect("mounter");

    assert_eq!(
        found,
        Some(Location::NfsTree {
            mountpoint: h.root.paths.source.clone()
        })
    );
    assert!(h
        .ui
        .messages
        .iter()
        .any(|text| text.contains("does not seem to match your boot media")));
    assert!(h.ui.saw("NFS Setup"));
    assert_eq!(h.network.interface_calls, 1, "interface screen must not be revisited");

    let history = h.mounts.history.borrow();
    let source = h.root.paths.source.display().to_string();
    let first_unmount = history
        .iter()
        .position(|entry| *entry == format!("umount {source}"))
        .expect("stale export released");
    let remount = history
        .iter()
        .rposition(|entry| entry.starts_with("mount server:/good"))
        .expect("good export mounted");
    assert!(first_unmount < remount);
}

#[test]
fn unreachable_server_goes_back_to_addressing() {
    let mut h = Harness::new(ScriptUi::new([]));
    h.mounts = TreeMount::new(h.root.nfs_root()).unreachable("server");
    h.network.configure_results = [Status::Ok, Status::Back].into();
    h.network.interface_results = [Status::Ok, Status::Back].into();

    let mut data = LoaderData {
        method: nfs_method("server", "/path"),
        ..LoaderData::default()
    };
    let ctx = h.context(LoaderFlags::empty());
    let found = mount_nfs_image(&mut h.services(), &ctx, &mut data).expect("mounter");

    assert_eq!(found, None);
    assert!(h
        .ui
        .messages
        .iter()
        .any(|text| text == "That directory could not be mounted from the server."));
    assert_eq!(h.network.configure_calls, 2);
    assert_eq!(
        h.network.ipinfo_on_entry,
        vec![false, false],
        "addressing must be dropped after the network failure"
    );
    assert!(!data.ipinfo_set);
    assert_eq!(data.method, nfs_method("server", "/path"));
    assert!(!h.ui.saw("NFS Setup"));
    assert!(!h.mounts.is_mounted(&h.root.paths.source));
}

#[test]
fn nfs_iso_is_checked_before_hand_off() {
    let mut h = Harness::new(ScriptUi::new([Answer::Confirm(true)]));
    let iso = h.root.media("nfs-iso");
    h.root.install_tree(&iso, Some(STAMP));
    let export = h.root.nfs_export("server", "/isos");
    h.root.image(&export.join("f7.iso"), &iso);

    let mut data = LoaderData {
        method: nfs_method("server", "/isos"),
        ..LoaderData::default()
    };
    let ctx = h.context(LoaderFlags::MEDIACHECK);
    let found = mount_nfs_image(&mut h.services(), &ctx, &mut data).expect("mounter");

    let source = h.root.paths.source.clone();
    assert_eq!(found, Some(Location::NfsIso { mountpoint: source.clone() }));
    assert_eq!(*h.media.checked.borrow(), vec![(source.join("f7.iso"), true)]);
    assert!(h.mounts.is_mounted(&h.root.paths.source2));
}

#[test]
fn no_disks_declined_aborts_hard_drive_method() {
    let mut h = Harness::new(ScriptUi::new([Answer::Confirm(false)]));
    let mut data = LoaderData::default();
    let ctx = h.context(LoaderFlags::empty());

    let found = mount_hard_drive(&mut h.services(), &ctx, &mut data).expect("mounter");
    assert_eq!(found, None);
    assert!(h.ui.saw("Hard Drives"));
    assert!(h.drivers.media_requests.is_empty());
}

#[test]
fn extra_arguments_are_capped_in_order() {
    let line: Vec<String> = (0..200).map(|idx| format!("resolution={idx}")).collect();
    let args = KernelArgs::parse(&line.join(" ")).expect("cmdline");
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = loader_core::LoaderPaths::rooted(dir.path());
    let mut data = LoaderData::default();
    parse_cmdline_flags(&args, LoaderFlags::empty(), &paths, &mut data);

    assert_eq!(data.extra_args.len(), ExtraArgs::limit());
    assert_eq!(data.extra_args.dropped(), 200 - ExtraArgs::limit());
    let expected: Vec<String> = (0..ExtraArgs::limit())
        .map(|idx| format!("--resolution={idx}"))
        .collect();
    assert_eq!(data.extra_args.as_slice(), expected.as_slice());

    let handed = installer_args(LoaderFlags::empty(), &data, "nfs:/mnt/source/.", None);
    assert_eq!(handed[2], "--resolution");
    assert_eq!(handed[3], "0");
    assert_eq!(handed[2 + 2 * 126], "--resolution");
    assert_eq!(handed[3 + 2 * 126], "126");
}

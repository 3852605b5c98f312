// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Wizard paths around the early install-disc probe.
// Author: Lukas Bower

mod common;

use common::{Answer, Harness, ScriptUi, OTHER_STAMP, STAMP};
use loader_core::data::{LoaderData, Location};
use loader_core::{run_loader_main, LoaderError, LoaderFlags};

fn disc(h: &Harness, stamp: &str) {
    let tree = h.root.media("disc");
    h.root.install_tree(&tree, Some(stamp));
    h.root.device("sr0", &tree);
}

#[test]
fn matching_disc_skips_the_wizard() {
    let mut h = Harness::new(ScriptUi::new([]));
    h.probe.cdroms = vec!["sr0".to_owned()];
    disc(&h, STAMP);

    let mut data = LoaderData::default();
    let ctx = h.context(LoaderFlags::empty());
    let location = run_loader_main(&mut h.services(), &ctx, &mut data).expect("source");

    assert_eq!(
        location,
        Location::Cdrom {
            device: "sr0".to_owned(),
            mountpoint: h.root.paths.source.clone(),
        }
    );
    assert!(h.ui.titles.is_empty(), "no prompts expected, saw {:?}", h.ui.titles);
    assert_eq!(h.network.interface_calls, 0);
    assert!(h.mounts.is_mounted(&h.root.paths.runtime));
}

#[test]
fn display_request_keeps_networking_with_a_disc() {
    let mut h = Harness::new(ScriptUi::new([]));
    h.probe.cdroms = vec!["sr0".to_owned()];
    disc(&h, STAMP);

    let mut data = LoaderData {
        display: Some("10.0.0.1:1".to_owned()),
        ..LoaderData::default()
    };
    let ctx = h.context(LoaderFlags::empty());
    let location = run_loader_main(&mut h.services(), &ctx, &mut data).expect("source");

    assert!(matches!(location, Location::Cdrom { .. }));
    assert!(!h.ui.saw("Installation Method"));
    assert_eq!(h.network.interface_calls, 1);
    assert_eq!(h.network.configure_calls, 1);
    assert_eq!(data.ipv4.as_deref(), Some("dhcp"));
    assert_eq!(data.ipv6.as_deref(), Some("dhcpv6"));
}

#[test]
fn foreign_disc_asks_for_the_right_one() {
    let mut h = Harness::new(ScriptUi::new([Answer::Menu(Some(0)), Answer::Confirm(false)]));
    h.probe.cdroms = vec!["sr0".to_owned()];
    disc(&h, OTHER_STAMP);

    let mut data = LoaderData::default();
    let ctx = h.context(LoaderFlags::empty());
    let err = run_loader_main(&mut h.services(), &ctx, &mut data).expect_err("no usable disc");

    assert!(matches!(err, LoaderError::NonInteractive(_)), "{err}");
    assert!(h.ui.saw("Installation Method"));
    assert!(h.ui.saw("Missing CD"));
    assert!(!h.mounts.is_mounted(&h.root.paths.source));
    assert!(!h.mounts.is_mounted(&h.root.paths.runtime));
}

#[test]
fn askmethod_shows_the_menu_despite_a_disc() {
    let mut h = Harness::new(ScriptUi::new([Answer::Menu(Some(0))]));
    h.probe.cdroms = vec!["sr0".to_owned()];
    disc(&h, STAMP);

    let mut data = LoaderData::default();
    let ctx = h.context(LoaderFlags::ASKMETHOD);
    let location = run_loader_main(&mut h.services(), &ctx, &mut data).expect("source");

    assert!(h.ui.saw("Installation Method"));
    assert_eq!(location.to_string(), format!("cdrom://sr0:{}", h.root.paths.source.display()));
}

#[test]
fn headless_without_a_method_is_fatal() {
    let mut h = Harness::new(ScriptUi::headless());
    let mut data = LoaderData::default();
    let ctx = h.context(LoaderFlags::empty());
    let err = run_loader_main(&mut h.services(), &ctx, &mut data).expect_err("nothing to do");
    assert!(matches!(err, LoaderError::NonInteractive(_)));
}

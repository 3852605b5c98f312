// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Find and mount a disc holding the install tree.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Optical install source.

use log::{debug, info, warn};

use crate::data::{DeviceClass, LoaderData, Location, MethodData};
use crate::error::{LoaderError, StageError};
use crate::fsm::{next_cd, CdEvent, CdStage, Direction};
use crate::loader::{LoaderContext, Services};
use crate::mediacheck::query_media_check;
use crate::mount::{mount_first, FsType};
use crate::stage2::{copy_updates_img, mount_stage2, UPDATES_IMAGE};

/// Probe every optical drive, or only `device` when given, for a disc whose
/// runtime matches the boot media. The first match stays mounted.
pub fn find_install_cd(
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    device: Option<&str>,
    offer_media_check: bool,
) -> Option<Location> {
    let paths = &ctx.config.paths;
    let drives = svc
        .probe
        .devices(DeviceClass::Cdrom)
        .into_iter()
        .filter(|drive| device.map_or(true, |wanted| drive.name == wanted.trim_start_matches("/dev/")));
    for drive in drives {
        let node = paths.device_node(&drive.name);
        debug!("trying to mount {} as cdrom", drive.name);
        let disc = match mount_first(svc.mounts, &node, &paths.source, &[FsType::Iso9660]) {
            Ok(disc) => disc,
            Err(err) => {
                debug!("{}: {err}", drive.name);
                continue;
            }
        };
        let stage2 = ctx.product.stage2_image(disc.target());
        if !stage2.is_file() {
            debug!("{} holds no {} tree", drive.name, ctx.product.name);
            continue;
        }
        copy_updates_img(svc.mounts, paths, &ctx.product.base_dir(disc.target()).join(UPDATES_IMAGE));
        match mount_stage2(svc.mounts, &ctx.product, &stage2, &paths.runtime) {
            Ok(_) => {
                if offer_media_check {
                    query_media_check(svc.ui, ctx.flags, svc.media, &node);
                }
                let kept = disc.keep();
                info!("using {} disc in {}", ctx.product.name, drive.name);
                return Some(Location::Cdrom {
                    device: drive.name,
                    mountpoint: kept.target,
                });
            }
            Err(StageError::Mismatch(_)) => warn!("disc in {} does not match the boot media", drive.name),
            Err(err) => warn!("{}: {err}", drive.name),
        }
    }
    None
}

/// Resolve an optical install source, asking for the disc until it appears
/// or the user backs out.
pub fn mount_cdrom(
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    data: &mut LoaderData,
) -> Result<Option<Location>, LoaderError> {
    let pinned = match data.method.as_ref() {
        Some(MethodData::Cdrom { device }) => device.clone(),
        _ => None,
    };
    let mut stage = CdStage::Probe;
    let mut dir = Direction::Forward;
    let mut location = None;
    loop {
        let event = match stage {
            CdStage::Probe => match find_install_cd(svc, ctx, pinned.as_deref(), true) {
                Some(found) => {
                    location = Some(found);
                    CdEvent::Found
                }
                None => CdEvent::NotFound,
            },
            CdStage::Insert => {
                if !svc.ui.is_interactive() {
                    return Err(LoaderError::NonInteractive(format!(
                        "no {} disc was found",
                        ctx.product.name
                    )));
                }
                let text = format!(
                    "The {0} CD was not found in any of your CDROM drives. Please insert \
                     the {0} CD and press \"OK\" to retry.",
                    ctx.product.name
                );
                if svc.ui.confirm("Missing CD", &text, "OK", "Back") {
                    CdEvent::Inserted
                } else {
                    CdEvent::Back
                }
            }
            CdStage::Done => return Ok(location),
            CdStage::Abort => return Ok(None),
        };
        let transition = next_cd(stage, event, dir);
        stage = transition.state;
        dir = transition.dir;
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Stage the runtime from ISO images stored on a hard drive partition.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Hard drive install source.
//!
//! The partition is mounted at a scratch mountpoint only long enough to find
//! a usable ISO image, loop-mount it and copy the runtime into RAM. Both
//! mounts are gone again before the mounter returns, so the partition is
//! free for the installer to use.

use log::{debug, error, info, warn};

use crate::data::{DeviceClass, DiskSource, LoaderData, Location, MethodData, Status};
use crate::error::LoaderError;
use crate::flags::LoaderFlags;
use crate::fsm::{next_hd, Direction, HdEvent, HdStage};
use crate::loader::{LoaderContext, Services};
use crate::mediacheck::query_media_check;
use crate::methods::apply_reset;
use crate::mount::{mount_first, FsType, HD_FILESYSTEMS};
use crate::stage2::{copy_updates_img, load_hd_images, valid_iso_images, UPDATES_IMAGE};
use crate::ui::PartitionChoice;

fn strip_dev(partition: &str) -> &str {
    partition.strip_prefix("/dev/").unwrap_or(partition)
}

/// Mount `partition`, find ISO images under `directory` and stage the
/// runtime from the first usable one.
pub fn setup_iso_images(
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    partition: &str,
    directory: &str,
) -> Option<Location> {
    let paths = &ctx.config.paths;
    let device = strip_dev(partition).to_owned();
    info!("mounting device {device} for hard drive install");
    if ctx.flags.contains(LoaderFlags::TESTING) {
        return Some(Location::HardDrive {
            device,
            fstype: HD_FILESYSTEMS[0].to_string(),
            directory: directory.to_owned(),
        });
    }

    let node = paths.device_node(&device);
    let volume = match mount_first(svc.mounts, &node, &paths.hd_image, HD_FILESYSTEMS) {
        Ok(volume) => volume.scratch(),
        Err(err) => {
            error!("{err}");
            return None;
        }
    };
    let fstype = volume.fstype();
    let search = volume.target().join(directory.trim_start_matches('/'));
    let Some(iso) = valid_iso_images(svc.mounts, &ctx.product, &search, &paths.loop_image) else {
        debug!("no usable images under {}", search.display());
        return None;
    };
    info!("path to valid iso is {}", iso.display());
    copy_updates_img(svc.mounts, paths, &search.join(UPDATES_IMAGE));

    let image = match mount_first(svc.mounts, &iso, &paths.loop_image, &[FsType::Iso9660]) {
        Ok(image) => image.scratch(),
        Err(err) => {
            error!("{err}");
            return None;
        }
    };
    let staged = load_hd_images(
        svc.mounts,
        &ctx.product,
        paths,
        &ctx.config.memory,
        svc.probe.total_memory_kb(),
        image.target(),
    );
    if let Ok(runtime) = &staged {
        debug!("runtime mounted at {}", runtime.target.display());
        // The image is only reachable while the partition is mounted.
        query_media_check(svc.ui, ctx.flags, svc.media, &iso);
    }
    // The runtime now lives in RAM; neither the image nor the partition stays mounted.
    for guard in [image, volume] {
        if let Err(err) = guard.release() {
            warn!("{err}");
        }
    }
    match staged {
        Ok(_) => Some(Location::HardDrive {
            device,
            fstype: fstype.to_string(),
            directory: directory.to_owned(),
        }),
        Err(err) => {
            error!("{err}");
            svc.ui.message(
                "Error",
                "An error occured reading the install from the ISO images. Please check \
                 your ISO images and try again.",
            );
            None
        }
    }
}

fn non_interactive(what: &str) -> LoaderError {
    LoaderError::NonInteractive(format!("hard drive install needs {what}"))
}

/// Resolve a hard drive install source.
pub fn mount_hard_drive(
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    data: &mut LoaderData,
) -> Result<Option<Location>, LoaderError> {
    let pinned = match data.method.as_ref() {
        Some(MethodData::Disk(disk)) => Some(disk.clone()),
        _ => None,
    };
    let DiskSource {
        mut partition,
        mut directory,
    } = pinned.clone().unwrap_or_default();
    let mut partitions = Vec::new();
    let mut stage = HdStage::Pinned;
    let mut dir = Direction::Forward;
    let mut location = None;

    loop {
        let event = match stage {
            HdStage::Pinned => match pinned.as_ref() {
                None => HdEvent::Skipped,
                Some(DiskSource {
                    partition: Some(part),
                    directory: Some(path),
                }) => {
                    info!("partition is {part}, dir is {path}");
                    match setup_iso_images(svc, ctx, part, path) {
                        Some(found) => {
                            location = Some(found);
                            HdEvent::Mounted
                        }
                        None if !svc.ui.is_interactive() => {
                            return Err(non_interactive(&format!("usable images on {part}")));
                        }
                        None => {
                            warn!("unable to find {} installation images on hd", ctx.product.name);
                            HdEvent::MountFailed
                        }
                    }
                }
                Some(_) => {
                    warn!("missing partition or directory specification");
                    if !svc.ui.is_interactive() {
                        return Err(non_interactive("both a partition and a directory"));
                    }
                    HdEvent::Incomplete
                }
            },
            HdStage::Enumerate => {
                partitions = svc.probe.partitions();
                if partitions.is_empty() {
                    HdEvent::Empty
                } else {
                    HdEvent::Found
                }
            }
            HdStage::NoDisks => {
                if !svc.ui.is_interactive() {
                    return Err(non_interactive("a hard drive"));
                }
                let add = svc.ui.confirm(
                    "Hard Drives",
                    "You don't seem to have any hard drives on your system! Would you \
                     like to configure additional devices?",
                    "Yes",
                    "Back",
                );
                if add
                    && svc
                        .drivers
                        .load_driver_from_media(svc.ui, DeviceClass::Disk, data, false, false)
                        != Status::Back
                {
                    HdEvent::Loaded
                } else {
                    HdEvent::Back
                }
            }
            HdStage::Select => {
                if !svc.ui.is_interactive() {
                    return Err(non_interactive("a partition selection"));
                }
                let text = format!(
                    "What partition and directory on that partition hold the CD (iso9660) \
                     images for {}? If you don't see the disk drive you're using listed here, \
                     press F2 to configure additional devices.",
                    ctx.product.name
                );
                match svc.ui.partition_select(
                    &text,
                    &partitions,
                    partition.as_deref(),
                    directory.as_deref(),
                ) {
                    PartitionChoice::Selected {
                        partition: part,
                        directory: path,
                    } => {
                        info!("partition {part} selected");
                        partition = Some(part);
                        directory = Some(path);
                        HdEvent::Selected
                    }
                    PartitionChoice::Back => HdEvent::Back,
                    PartitionChoice::MoreDevices => HdEvent::MoreDevices,
                }
            }
            HdStage::DriverDisk => {
                match svc
                    .drivers
                    .load_driver_from_media(svc.ui, DeviceClass::Disk, data, false, false)
                {
                    Status::Ok => HdEvent::Loaded,
                    _ => HdEvent::Back,
                }
            }
            HdStage::Mount => {
                let part = partition.clone().unwrap_or_default();
                let path = directory.clone().unwrap_or_default();
                match setup_iso_images(svc, ctx, &part, &path) {
                    Some(found) => {
                        location = Some(found);
                        HdEvent::Mounted
                    }
                    None => {
                        svc.ui.message(
                            "Error",
                            &format!(
                                "Device {part} does not appear to contain {} CDROM images.",
                                ctx.product.name
                            ),
                        );
                        HdEvent::MountFailed
                    }
                }
            }
            HdStage::Done => return Ok(location),
            HdStage::Abort => return Ok(None),
        };
        let transition = next_hd(stage, event, dir);
        apply_reset(transition.reset, data);
        stage = transition.state;
        dir = transition.dir;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_prefix_is_optional() {
        assert_eq!(strip_dev("/dev/sda1"), "sda1");
        assert_eq!(strip_dev("sda1"), "sda1");
    }
}

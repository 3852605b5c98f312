// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load installer updates from an update disk or a remote image.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Installer updates.
//!
//! `updates` walks the user through device, partition and load; a failed
//! mount returns to the partition choice. `updates=<url>` downloads an image
//! and asks for a new location whenever the download fails.

use std::fs;

use log::{error, info, warn};

use crate::config::LoaderPaths;
use crate::data::{DeviceClass, Status};
use crate::fetch::{is_remote, Fetcher};
use crate::mount::{mount_first, MountOps, UPDATE_FILESYSTEMS};
use crate::probe::DeviceProbe;
use crate::stage2::{copy_directory, unpack_image};
use crate::ui::{EntryField, Ui};

/// Update disk stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStage {
    /// Pick the device holding the update disk.
    Device,
    /// Pick a partition on it.
    Partition,
    /// Mount and copy.
    Load,
    /// Finished, loaded or not.
    Done,
}

/// Outcome of an update disk stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateEvent {
    /// The stage completed.
    Next,
    /// The user backed out.
    Back,
    /// Mounting the chosen partition failed.
    MountFailed,
}

/// Update disk transition function.
#[must_use]
pub fn next_update(stage: UpdateStage, event: UpdateEvent) -> UpdateStage {
    match (stage, event) {
        (UpdateStage::Device, UpdateEvent::Next) => UpdateStage::Partition,
        (UpdateStage::Partition, UpdateEvent::Next) => UpdateStage::Load,
        (UpdateStage::Partition, _) => UpdateStage::Device,
        (UpdateStage::Load, UpdateEvent::MountFailed) => UpdateStage::Partition,
        (UpdateStage::Load, _) | (UpdateStage::Device, _) | (UpdateStage::Done, _) => UpdateStage::Done,
    }
}

/// Interactively load an update disk into the updates directory.
pub fn load_updates_from_disk(
    ui: &mut dyn Ui,
    mounts: &dyn MountOps,
    probe: &dyn DeviceProbe,
    paths: &LoaderPaths,
) -> Status {
    let devices: Vec<String> = probe
        .devices(DeviceClass::Disk)
        .into_iter()
        .chain(probe.devices(DeviceClass::Cdrom))
        .map(|dev| dev.name)
        .collect();
    if devices.is_empty() {
        ui.message("Error", "No devices were found which could hold an update disk.");
        return Status::Error;
    }

    let mut stage = UpdateStage::Device;
    let mut device = devices[0].clone();
    let mut partition = device.clone();
    let mut status = Status::Back;
    let mut failed = false;
    while stage != UpdateStage::Done {
        let event = match stage {
            UpdateStage::Device => {
                let picked = if devices.len() == 1 {
                    Some(0)
                } else {
                    let current = devices.iter().position(|d| *d == device).unwrap_or(0);
                    ui.menu(
                        "Update Disk Source",
                        "You have multiple devices which could serve as sources for an \
                         update disk.  Which would you like to use?",
                        &devices,
                        current,
                    )
                };
                match picked {
                    Some(idx)
                        if ui.confirm(
                            "Updates Disk",
                            &format!(
                                "Insert your updates disk into /dev/{} and press \"OK\" to continue.",
                                devices[idx]
                            ),
                            "OK",
                            "Back",
                        ) =>
                    {
                        device = devices[idx].clone();
                        failed = false;
                        UpdateEvent::Next
                    }
                    _ => UpdateEvent::Back,
                }
            }
            UpdateStage::Partition => {
                let parts: Vec<String> = probe
                    .partitions()
                    .into_iter()
                    .filter(|part| part.starts_with(&device) && *part != device)
                    .collect();
                match parts.as_slice() {
                    // Nothing else to pick on this device after a failed mount.
                    [] | [_] if failed => UpdateEvent::Back,
                    [] => {
                        partition = device.clone();
                        UpdateEvent::Next
                    }
                    [only] => {
                        partition = only.clone();
                        UpdateEvent::Next
                    }
                    _ => match ui.menu(
                        "Update Disk Source",
                        "There are multiple partitions on this device which could contain \
                         the update disk image.  Which would you like to use?",
                        &parts,
                        0,
                    ) {
                        Some(idx) => {
                            partition = parts[idx].clone();
                            UpdateEvent::Next
                        }
                        None => UpdateEvent::Back,
                    },
                }
            }
            UpdateStage::Load => {
                let node = paths.device_node(&partition);
                match mount_first(mounts, &node, &paths.update_disk, UPDATE_FILESYSTEMS) {
                    Ok(guard) => {
                        let guard = guard.scratch();
                        ui.status("Reading anaconda updates...");
                        match copy_directory(guard.target(), &paths.updates) {
                            Ok(files) => {
                                info!("loaded {files} update files from {partition}");
                                status = Status::Ok;
                            }
                            Err(err) => {
                                error!("copying updates from {partition}: {err}");
                                status = Status::Error;
                            }
                        }
                        if let Err(err) = guard.release() {
                            warn!("{err}");
                        }
                        UpdateEvent::Next
                    }
                    Err(err) => {
                        error!("{err}");
                        ui.message("Error", "Failed to mount updates disk");
                        failed = true;
                        UpdateEvent::MountFailed
                    }
                }
            }
            UpdateStage::Done => UpdateEvent::Next,
        };
        if stage == UpdateStage::Device && event == UpdateEvent::Back {
            status = Status::Back;
        }
        stage = next_update(stage, event);
    }
    status
}

/// Download an updates image from `url` and unpack it, re-prompting for a
/// new location on failure. Returns the location that finally worked.
pub fn load_updates_from_url(
    ui: &mut dyn Ui,
    mounts: &dyn MountOps,
    fetcher: &dyn Fetcher,
    paths: &LoaderPaths,
    url: &str,
) -> Option<String> {
    let image = paths.ramfs.join("updates-disk.img");
    let mut location = url.to_owned();
    loop {
        let fetched = if is_remote(&location) {
            if let Err(err) = fs::create_dir_all(&paths.ramfs) {
                warn!("cannot create {}: {err}", paths.ramfs.display());
            }
            fetcher
                .fetch(&location, None, &[], &image)
                .map(|_| image.clone())
                .map_err(|err| err.to_string())
        } else {
            Err(format!("{location} is not an http or ftp location"))
        };
        let unpacked = fetched.and_then(|path| {
            unpack_image(mounts, &path, &paths.update_disk, &paths.updates)
                .map_err(|err| err.to_string())
        });
        match unpacked {
            Ok(true) => {
                info!("updates loaded from {location}");
                return Some(location);
            }
            Ok(false) => error!("updates image from {location} vanished"),
            Err(err) => error!("updates from {location}: {err}"),
        }
        if !ui.is_interactive() {
            return None;
        }
        let mut fields = [EntryField::new("Updates location:", Some(&location))];
        if !ui.entries(
            "Error",
            &format!("Unable to download the updates image from {location}.  Please enter a new location."),
            &mut fields,
        ) {
            return None;
        }
        match fields[0].filled() {
            Some(next) => location = next,
            None => return None,
        }
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Driver resolution: device presence checks, driver disks and manual driver selection.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Driver resolution service.
//!
//! The wizard only needs three answers from this module: is there a device
//! of a class, can the user supply a driver disk for it, and which driver
//! does the user want loaded by hand. After any of the interactive calls the
//! caller re-checks device presence instead of trusting the return value.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, error, info, warn};

use crate::config::LoaderPaths;
use crate::data::{DeviceClass, LoaderData, Status};
use crate::fetch::{is_remote, Fetcher};
use crate::modules::{same_module, ModuleLoader};
use crate::mount::{mount_first, MountOps, DRIVER_DISK_FILESYSTEMS, STAGE2_FILESYSTEMS};
use crate::probe::DeviceProbe;
use crate::stage2::copy_directory;
use crate::ui::{EntryField, Ui};

/// Descriptor files identifying a driver disk, newest first.
const DESCRIPTORS: &[&str] = &["rhdd3", "rhdd"];

/// Module description from a `module-info` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module name.
    pub name: String,
    /// Device class served by the module.
    pub class: DeviceClass,
    /// Human-readable description.
    pub description: String,
}

fn class_from_type(kind: &str) -> DeviceClass {
    match kind {
        "eth" | "tr" | "net" => DeviceClass::Network,
        "scsi" | "ide" | "disk" | "block" => DeviceClass::Disk,
        "cdrom" => DeviceClass::Cdrom,
        _ => DeviceClass::Any,
    }
}

/// Parse `module-info` text.
///
/// ```text
/// Version 0
/// e1000
///         eth
///         "Intel PRO/1000 Ethernet"
/// ```
#[must_use]
pub fn parse_module_info(text: &str) -> Vec<ModuleInfo> {
    let mut modules = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    let flush = |entry: Option<(String, Vec<String>)>, out: &mut Vec<ModuleInfo>| {
        if let Some((name, body)) = entry {
            let class = body
                .first()
                .map_or(DeviceClass::Any, |kind| class_from_type(kind));
            let description = body
                .get(1)
                .map(|line| line.trim_matches('"').to_owned())
                .unwrap_or_else(|| name.clone());
            out.push(ModuleInfo {
                name,
                class,
                description,
            });
        }
    };

    for line in text.lines() {
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with("Version") {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some((_, body)) = current.as_mut() {
                body.push(line.trim().to_owned());
            }
        } else {
            flush(current.take(), &mut modules);
            current = Some((line.trim().to_owned(), Vec::new()));
        }
    }
    flush(current, &mut modules);
    modules
}

/// Driver operations the wizard and mounters depend on.
pub trait DriverService {
    /// True when at least one device of `class` is present.
    fn have_device_of_type(&self, class: DeviceClass) -> bool;

    /// Interactive driver disk load. `Back` propagates to the caller's
    /// state machine. A manual pick offered after the disk honours
    /// `data.module_blacklist`.
    fn load_driver_from_media(
        &mut self,
        ui: &mut dyn Ui,
        class: DeviceClass,
        data: &mut LoaderData,
        use_cancel: bool,
        ask_existence: bool,
    ) -> Status;

    /// Interactive manual driver pick. Callers re-probe afterwards.
    fn choose_manual_driver(&mut self, ui: &mut dyn Ui, class: DeviceClass, data: &mut LoaderData) -> Status;

    /// Load a driver disk image file.
    fn load_driver_image(&mut self, ui: &mut dyn Ui, image: &Path) -> Status;

    /// Modules loaded so far.
    fn loaded_drivers(&self) -> Vec<String>;
}

/// [`DriverService`] backed by the real probe, mount and module loader.
pub struct SysDrivers {
    paths: LoaderPaths,
    catalog: Vec<ModuleInfo>,
    probe: Box<dyn DeviceProbe>,
    mounts: Rc<dyn MountOps>,
    modules: Box<dyn ModuleLoader>,
    disks_loaded: usize,
}

impl SysDrivers {
    /// Service using `catalog` for the manual driver menu.
    pub fn new(
        paths: LoaderPaths,
        catalog: Vec<ModuleInfo>,
        probe: Box<dyn DeviceProbe>,
        mounts: Rc<dyn MountOps>,
        modules: Box<dyn ModuleLoader>,
    ) -> Self {
        Self {
            paths,
            catalog,
            probe,
            mounts,
            modules,
            disks_loaded: 0,
        }
    }

    /// Mutable access to the module loader.
    pub fn modules_mut(&mut self) -> &mut dyn ModuleLoader {
        self.modules.as_mut()
    }

    /// Number of driver disks loaded so far.
    #[must_use]
    pub fn disks_loaded(&self) -> usize {
        self.disks_loaded
    }

    fn source_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self
            .probe
            .devices(DeviceClass::Cdrom)
            .into_iter()
            .chain(self.probe.devices(DeviceClass::Disk))
            .map(|device| device.name)
            .collect();
        devices.dedup();
        devices
    }

    /// Copy a mounted driver disk and insert the modules it carries.
    fn load_disk_tree(&mut self, root: &Path) -> Result<usize, String> {
        let valid = DESCRIPTORS.iter().any(|name| {
            fs::read_to_string(root.join(name))
                .map(|text| !text.trim().is_empty())
                .unwrap_or(false)
        });
        if !valid || !root.join("modinfo").is_file() {
            return Err("Driver disk is invalid for this release.".to_owned());
        }

        self.disks_loaded += 1;
        let copy = self
            .paths
            .driver_copies
            .join(format!("DD-{}", self.disks_loaded));
        copy_directory(root, &copy).map_err(|err| format!("Failed to copy driver disk: {err}"))?;

        let info = fs::read_to_string(copy.join("modinfo")).unwrap_or_default();
        let mut inserted = 0;
        for module in parse_module_info(&info) {
            let object = module_object(&copy, &module.name);
            let Some(object) = object else {
                debug!("driver disk lists {} without an object file", module.name);
                continue;
            };
            match self.modules.insert_file(&object) {
                Ok(()) => inserted += 1,
                Err(err) => warn!("{err}"),
            }
            self.catalog.push(module);
        }
        info!("driver disk {} provided {inserted} modules", copy.display());
        Ok(inserted)
    }

    fn after_load(&self, ui: &mut dyn Ui, class: DeviceClass) -> DiskOutcome {
        if class == DeviceClass::Any || self.have_device_of_type(class) {
            return DiskOutcome::Done;
        }
        let choice = ui.choose(
            "Error",
            "No devices of the appropriate type were found on this driver disk.  \
             Would you like to manually select the driver, continue anyway, or \
             load another driver disk?",
            &["Manually choose", "Continue", "Load another disk"],
        );
        match choice {
            0 => DiskOutcome::Manual,
            2 => DiskOutcome::Another,
            _ => DiskOutcome::Done,
        }
    }
}

enum DiskOutcome {
    Done,
    Manual,
    Another,
}

fn module_object(root: &Path, name: &str) -> Option<PathBuf> {
    ["modules", "."]
        .iter()
        .flat_map(|dir| ["ko", "o"].map(|ext| root.join(dir).join(format!("{name}.{ext}"))))
        .find(|candidate| candidate.is_file())
}

impl DriverService for SysDrivers {
    fn have_device_of_type(&self, class: DeviceClass) -> bool {
        !self.probe.devices(class).is_empty()
    }

    fn load_driver_from_media(
        &mut self,
        ui: &mut dyn Ui,
        class: DeviceClass,
        data: &mut LoaderData,
        use_cancel: bool,
        ask_existence: bool,
    ) -> Status {
        let back = if use_cancel { "Cancel" } else { "Back" };
        if ask_existence
            && !ui.confirm("Driver disk", "Do you have a driver disk?", "Yes", "No")
        {
            return Status::Back;
        }

        loop {
            let devices = self.source_devices();
            let device = match devices.as_slice() {
                [] => {
                    ui.message(
                        "Error",
                        "No devices which could hold a driver disk were found.",
                    );
                    return Status::Error;
                }
                [only] => only.clone(),
                many => {
                    let picked = ui.menu(
                        "Driver Disk Source",
                        "You have multiple devices which could serve as sources \
                         for a driver disk.  Which would you like to use?",
                        many,
                        0,
                    );
                    let Some(device) = picked.and_then(|idx| many.get(idx)) else {
                        return Status::Back;
                    };
                    device.clone()
                }
            };

            let prompt = format!(
                "Insert your driver disk into /dev/{device} and press \"OK\" to continue."
            );
            if ui.choose("Insert Driver Disk", &prompt, &["OK", back]) != 0 {
                if devices.len() == 1 {
                    return Status::Back;
                }
                continue;
            }

            ui.status("Reading driver disk...");
            let node = self.paths.device_node(&device);
            let target = self.paths.drivers.clone();
            let mounts = Rc::clone(&self.mounts);
            let loaded = match mount_first(mounts.as_ref(), &node, &target, DRIVER_DISK_FILESYSTEMS) {
                Ok(guard) => {
                    let guard = guard.scratch();
                    let result = self.load_disk_tree(&target);
                    if let Err(err) = guard.release() {
                        warn!("{err}");
                    }
                    result
                }
                Err(err) => {
                    error!("{err}");
                    Err("Failed to mount driver disk.".to_owned())
                }
            };
            if let Err(text) = loaded {
                ui.message("Error", &text);
                continue;
            }

            match self.after_load(ui, class) {
                DiskOutcome::Done => return Status::Ok,
                DiskOutcome::Another => continue,
                DiskOutcome::Manual => return self.choose_manual_driver(ui, class, data),
            }
        }
    }

    fn choose_manual_driver(&mut self, ui: &mut dyn Ui, class: DeviceClass, data: &mut LoaderData) -> Status {
        let mut choices: Vec<&ModuleInfo> = self
            .catalog
            .iter()
            .filter(|module| class == DeviceClass::Any || module.class == class)
            .filter(|module| {
                !data
                    .module_blacklist
                    .iter()
                    .any(|entry| same_module(entry, &module.name))
            })
            .collect();
        choices.sort_by(|a, b| a.description.cmp(&b.description));
        if choices.is_empty() {
            ui.message("Error", "No drivers are available for this kind of device.");
            return Status::Back;
        }
        let items: Vec<String> = choices
            .iter()
            .map(|module| format!("{} ({})", module.description, module.name))
            .collect();
        let names: Vec<String> = choices.iter().map(|module| module.name.clone()).collect();

        loop {
            let picked = ui.menu(
                "Select Device Driver to Load",
                "Please select the driver below which you wish to load.",
                &items,
                0,
            );
            let Some(name) = picked.and_then(|idx| names.get(idx)) else {
                return Status::Back;
            };
            let mut fields = [EntryField::new("Parameters:", None)];
            let text = format!(
                "Please specify any parameters which you'd like to use for the {name} \
                 module separated by spaces.  If you don't know what parameters to \
                 supply, skip this screen by pressing the \"OK\" button."
            );
            if !ui.entries("Specify Module Parameters", &text, &mut fields) {
                continue;
            }
            let params: Vec<String> = fields[0]
                .value
                .split_whitespace()
                .map(str::to_owned)
                .collect();
            return match self.modules.load(name, &params) {
                Ok(()) => Status::Ok,
                Err(err) => {
                    ui.message("Error", &format!("Failed to insert {name} module: {err}"));
                    Status::Error
                }
            };
        }
    }

    fn load_driver_image(&mut self, ui: &mut dyn Ui, image: &Path) -> Status {
        let target = self.paths.drivers.clone();
        let fstypes: Vec<_> = DRIVER_DISK_FILESYSTEMS
            .iter()
            .chain(STAGE2_FILESYSTEMS)
            .copied()
            .collect();
        let mounts = Rc::clone(&self.mounts);
        let guard = match mount_first(mounts.as_ref(), image, &target, &fstypes) {
            Ok(guard) => guard.scratch(),
            Err(err) => {
                error!("{err}");
                ui.message("Error", "Failed to load driver disk from file.");
                return Status::Error;
            }
        };
        let result = self.load_disk_tree(&target);
        if let Err(err) = guard.release() {
            warn!("{err}");
        }
        match result {
            Ok(_) => Status::Ok,
            Err(text) => {
                ui.message("Error", &text);
                Status::Error
            }
        }
    }

    fn loaded_drivers(&self) -> Vec<String> {
        self.modules.loaded().to_vec()
    }
}

/// Prompt for driver disks until the user has no more.
pub fn load_driver_disks(drivers: &mut dyn DriverService, ui: &mut dyn Ui, data: &mut LoaderData) -> usize {
    let mut loaded = 0;
    if drivers.load_driver_from_media(ui, DeviceClass::Any, data, true, true) != Status::Ok {
        return loaded;
    }
    loaded += 1;
    while ui.confirm(
        "More Driver Disks?",
        "Do you wish to load any more driver disks?",
        "Yes",
        "No",
    ) {
        if drivers.load_driver_from_media(ui, DeviceClass::Any, data, true, false) == Status::Ok {
            loaded += 1;
        }
    }
    loaded
}

/// Load a driver disk named by `dd=`: a local image path, optionally
/// prefixed with `path:`, or a remote URL fetched into `ramfs` first.
pub fn load_driver_source(
    drivers: &mut dyn DriverService,
    ui: &mut dyn Ui,
    fetcher: &dyn Fetcher,
    paths: &LoaderPaths,
    source: &str,
) -> Status {
    let image = if is_remote(source) {
        let dest = paths.ramfs.join("dd.img");
        if let Err(err) = fs::create_dir_all(&paths.ramfs) {
            warn!("cannot create {}: {err}", paths.ramfs.display());
        }
        if let Err(err) = fetcher.fetch(source, None, &[], &dest) {
            error!("{err}");
            ui.message("Error", &format!("Unable to retrieve driver disk from {source}."));
            return Status::Error;
        }
        dest
    } else {
        PathBuf::from(source.strip_prefix("path:").unwrap_or(source))
    };
    drivers.load_driver_image(ui, &image)
}

/// Device menu shown under `noprobe`: list loaded drivers and let the user
/// add more until they choose "Done".
pub fn manual_device_check(drivers: &mut dyn DriverService, ui: &mut dyn Ui, data: &mut LoaderData) {
    loop {
        let loaded = drivers.loaded_drivers();
        let text = if loaded.is_empty() {
            "No device drivers have been loaded for your system.  Would you like to load any now?"
                .to_owned()
        } else {
            format!(
                "The following devices have been found on your system.\n\n{}",
                loaded.join("\n")
            )
        };
        if ui.choose("Devices", &text, &["Done", "Add Device"]) != 1 {
            break;
        }
        drivers.choose_manual_driver(ui, DeviceClass::Any, data);
    }
}

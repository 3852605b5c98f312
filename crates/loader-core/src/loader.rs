// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Top-level loader wizard and the session steps around it.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Top-level loader wizard.
//!
//! [`run_loader_main`] walks language, keyboard, method, driver and network
//! steps through the [`crate::fsm::next`] table until a mounter resolves the
//! install source. [`prepare_session`] and [`finish_session`] run the steps
//! that surround it: driver disks and kickstart before, updates and runtime
//! relinking after.

use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::config::{LoaderConfig, LoaderPaths};
use crate::data::{DeviceClass, LoaderData, Location, MethodKind, Status};
use crate::driver::{load_driver_disks, load_driver_source, manual_device_check, DriverService};
use crate::error::LoaderError;
use crate::fetch::Fetcher;
use crate::flags::LoaderFlags;
use crate::fsm::{next, Direction, Event, Reset, Step};
use crate::kickstart::{apply_kickstart, load_commands, KickstartEnv};
use crate::ksfetch::{get_kickstart_file, KsFetchEnv};
use crate::locale::LocaleService;
use crate::mediacheck::MediaVerifier;
use crate::methods::cdrom::find_install_cd;
use crate::methods::{available_methods, method_for, InstallMethod};
use crate::mount::MountOps;
use crate::network::NetworkService;
use crate::probe::DeviceProbe;
use crate::product::ProductInfo;
use crate::stage2::{migrate_runtime_directory, RUNTIME_DIRECTORIES};
use crate::ui::Ui;
use crate::updates::{load_updates_from_disk, load_updates_from_url};

/// Modules every install needs before hardware probing.
pub const EARLY_MODULES: &str = "cramfs:vfat:nfs:loop:floppy:edd:pcspkr:squashfs:ext4:ext3:ext2:iscsi_tcp";

/// Collaborators shared by every step and mounter.
pub struct Services<'a> {
    /// Prompt surface.
    pub ui: &'a mut dyn Ui,
    /// Mount primitive.
    pub mounts: &'a dyn MountOps,
    /// Device enumeration.
    pub probe: &'a dyn DeviceProbe,
    /// Driver loading.
    pub drivers: &'a mut dyn DriverService,
    /// Network bring-up.
    pub network: &'a mut dyn NetworkService,
    /// Language and keymap.
    pub locale: &'a mut dyn LocaleService,
    /// HTTP and FTP retrieval.
    pub fetcher: &'a dyn Fetcher,
    /// Media checksum verification.
    pub media: &'a dyn MediaVerifier,
}

/// Immutable per-run context: boot flags, configuration and build stamp.
#[derive(Debug, Clone)]
pub struct LoaderContext {
    /// Flags frozen after command line and kickstart parsing.
    pub flags: LoaderFlags,
    /// Paths, memory thresholds and installer settings.
    pub config: LoaderConfig,
    /// Build stamp of the running boot media.
    pub product: ProductInfo,
}

impl LoaderContext {
    /// Bundle the frozen run settings.
    #[must_use]
    pub fn new(flags: LoaderFlags, config: LoaderConfig, product: ProductInfo) -> Self {
        Self {
            flags,
            config,
            product,
        }
    }

    /// Configured filesystem locations.
    #[must_use]
    pub fn paths(&self) -> &LoaderPaths {
        &self.config.paths
    }
}

/// True when a VNC session or remote display was requested; such installs
/// need networking even when the source is local.
#[must_use]
pub fn graphical_override(data: &LoaderData) -> bool {
    data.extra_args.requests_vnc() || data.display.is_some()
}

/// Refuse to run on machines below the configured memory floor.
pub fn check_memory(probe: &dyn DeviceProbe, ctx: &LoaderContext) -> Result<(), LoaderError> {
    let Some(total) = probe.total_memory_kb() else {
        warn!("cannot determine installed memory");
        return Ok(());
    };
    let required = ctx.config.memory.min_ram_kb;
    if total < required {
        return Err(LoaderError::InsufficientMemory {
            product: ctx.product.name.clone(),
            available_kb: total,
            required_kb: required,
        });
    }
    debug!("{total} KB of memory available");
    Ok(())
}

/// Load driver disks and the kickstart file before the wizard starts.
///
/// `ks_override` is a kickstart path given to the loader directly; it is
/// read as-is instead of being retrieved. Returns the flags with kickstart
/// switches applied.
pub fn prepare_session(
    svc: &mut Services<'_>,
    paths: &LoaderPaths,
    mut flags: LoaderFlags,
    data: &mut LoaderData,
    ks_override: Option<&Path>,
) -> LoaderFlags {
    if flags.contains(LoaderFlags::MODDISK) {
        let loaded = load_driver_disks(svc.drivers, svc.ui, data);
        info!("{loaded} driver disks loaded");
    }
    if paths.dd_image.is_file() {
        info!("found {}, loading drivers", paths.dd_image.display());
        let source = format!("path:{}", paths.dd_image.display());
        load_driver_source(svc.drivers, svc.ui, svc.fetcher, paths, &source);
    }
    if let Some(source) = data.dd_src.clone() {
        load_driver_source(svc.drivers, svc.ui, svc.fetcher, paths, &source);
    }

    let ks_path: Option<PathBuf> = match (ks_override, data.ks_file.clone()) {
        (Some(path), _) => {
            data.ks_file = Some(path.display().to_string());
            Some(path.to_path_buf())
        }
        (None, Some(spec)) => {
            info!("getting kickstart file");
            let mut env = KsFetchEnv {
                ui: &mut *svc.ui,
                mounts: svc.mounts,
                probe: svc.probe,
                network: &mut *svc.network,
                fetcher: svc.fetcher,
            };
            match get_kickstart_file(&spec, &mut env, paths, flags, data) {
                Ok(path) => Some(path),
                Err(err) => {
                    error!("{err}");
                    data.ks_file = None;
                    None
                }
            }
        }
        (None, None) => None,
    };
    if let Some(path) = ks_path {
        match load_commands(&path) {
            Ok(commands) => {
                let mut env = KickstartEnv {
                    ui: &mut *svc.ui,
                    probe: svc.probe,
                    locale: &mut *svc.locale,
                };
                flags = apply_kickstart(&commands, &mut env, flags, data);
            }
            Err(err) => error!("{err}"),
        }
    }
    flags
}

fn method_menu(svc: &mut Services<'_>, ctx: &LoaderContext, current: Option<&InstallMethod>) -> Option<&'static InstallMethod> {
    let methods = available_methods();
    let names: Vec<String> = methods.iter().map(|method| method.name.to_owned()).collect();
    let default = current
        .and_then(|cur| methods.iter().position(|method| method.kind == cur.kind))
        .unwrap_or(0);
    let (title, text) = if ctx.flags.contains(LoaderFlags::RESCUE) {
        ("Rescue Method", "What type of media contains the rescue image?")
    } else {
        (
            "Installation Method",
            "What type of media contains the packages to be installed?",
        )
    };
    svc.ui
        .menu(title, text, &names, default)
        .and_then(|idx| methods.get(idx).copied())
}

// The console may close mid-run, so this is asked at every prompt.
fn can_prompt(flags: LoaderFlags, ui: &dyn Ui) -> bool {
    flags.interactive() && ui.is_interactive()
}

/// Drive the wizard until an install source is resolved.
pub fn run_loader_main(
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    data: &mut LoaderData,
) -> Result<Location, LoaderError> {
    let flags = ctx.flags;
    let mut method: Option<&'static InstallMethod> = data.method_kind().and_then(method_for);
    // A pinned method disables the disc shortcut.
    let ask_method = flags.contains(LoaderFlags::ASKMETHOD) || method.is_some();

    let mut found_cd = None;
    if !ask_method && !flags.contains(LoaderFlags::KICKSTART) {
        found_cd = find_install_cd(svc, ctx, None, !flags.contains(LoaderFlags::RESCUE));
        if let Some(location) = found_cd.as_ref() {
            if !flags.contains(LoaderFlags::RESCUE) && !graphical_override(data) {
                info!("install disc found, skipping the wizard");
                return Ok(location.clone());
            }
        }
        if found_cd.is_some() {
            method = method_for(MethodKind::Cdrom);
        }
    }

    let mut needed: Option<DeviceClass> = None;
    let mut needs_network = false;
    let mut step = Step::Lang;
    let mut dir = Direction::Forward;
    loop {
        let event = match step {
            Step::Lang => {
                match data.lang.clone().filter(|_| data.lang_set) {
                    Some(lang) => {
                        if !svc.locale.set_language(&lang, data) {
                            warn!("language {lang} is not available");
                        }
                    }
                    None if can_prompt(flags, &*svc.ui) => {
                        svc.locale.choose_language(svc.ui, data);
                    }
                    None => {}
                }
                Event::Done
            }
            Step::Kbd => match data.kbd.clone().filter(|_| data.kbd_set) {
                Some(kbd) => {
                    if svc.locale.load_keymap(&kbd) {
                        Event::Skipped
                    } else {
                        warn!("requested keymap {kbd} is not valid, asking");
                        data.kbd = None;
                        data.kbd_set = false;
                        Event::Retry
                    }
                }
                None if can_prompt(flags, &*svc.ui) => Event::from(svc.locale.choose_keyboard(svc.ui, data)),
                None => Event::Skipped,
            },
            Step::Method => {
                if let Some(location) = found_cd.as_ref() {
                    if flags.contains(LoaderFlags::RESCUE) {
                        return Ok(location.clone());
                    }
                }
                if found_cd.is_some() {
                    Event::MediaFound
                } else {
                    needed = None;
                    let pinned = data.method_kind().and_then(method_for);
                    let picked = match pinned {
                        Some(pinned) => {
                            method = Some(pinned);
                            if dir.is_back() {
                                Event::Back
                            } else {
                                Event::Done
                            }
                        }
                        None if !can_prompt(flags, &*svc.ui) => {
                            return Err(LoaderError::NonInteractive(
                                "no usable install method was specified".to_owned(),
                            ));
                        }
                        None => match method_menu(svc, ctx, method) {
                            Some(choice) => {
                                method = Some(choice);
                                Event::Done
                            }
                            None => Event::Back,
                        },
                    };
                    if picked == Event::Done {
                        needed = method.map(|m| m.class);
                    }
                    picked
                }
            }
            Step::Driver => match needed {
                None => Event::Done,
                Some(class) if svc.drivers.have_device_of_type(class) => {
                    needed = None;
                    Event::Done
                }
                Some(class) if !can_prompt(flags, &*svc.ui) => {
                    return Err(LoaderError::NonInteractive(format!(
                        "no {} device driver is loaded",
                        class.as_str()
                    )));
                }
                Some(class) => match svc.ui.choose(
                    "No driver found",
                    "Unable to find any devices of the type needed for this installation \
                     type.  Would you like to manually select your driver or use a driver disk?",
                    &["Select driver", "Use a driver disk", "Back"],
                ) {
                    0 => {
                        svc.drivers.choose_manual_driver(svc.ui, class, data);
                        Event::Retry
                    }
                    1 => Event::UseDriverDisk,
                    _ => Event::Back,
                },
            },
            Step::DriverDisk => {
                let class = needed.unwrap_or(DeviceClass::Any);
                match svc.drivers.load_driver_from_media(svc.ui, class, data, false, false) {
                    Status::Back => Event::Back,
                    _ => Event::Done,
                }
            }
            Step::Network => {
                let kind_needs = method.is_some_and(|m| m.class == DeviceClass::Network);
                if !kind_needs && !graphical_override(data) && !flags.contains(LoaderFlags::ASKNETWORK) {
                    needs_network = false;
                    Event::NotNeeded
                } else if !svc.drivers.have_device_of_type(DeviceClass::Network) {
                    needs_network = true;
                    needed = Some(DeviceClass::Network);
                    Event::NeedDriver
                } else {
                    needs_network = true;
                    info!("need to set up networking");
                    Event::Done
                }
            }
            Step::Iface => {
                info!("going to pick interface");
                if data.ks_file.is_some() {
                    data.is_kickstart = true;
                }
                let preset = flags.contains(LoaderFlags::HAVE_CMSCONF);
                data.ipinfo_set = preset;
                data.ipv6info_set = preset;
                Event::from(svc.network.choose_interface(svc.ui, flags, data))
            }
            Step::Ip => {
                if !needs_network || dir.is_back() {
                    Event::NotNeeded
                } else {
                    info!("going to do network configuration");
                    if flags.contains(LoaderFlags::HAVE_CMSCONF) {
                        data.ipinfo_set = true;
                        data.ipv6info_set = true;
                    }
                    let status = svc.network.configure(svc.ui, flags, data);
                    if matches!(status, Status::Ok | Status::Noop) {
                        if flags.contains(LoaderFlags::NOIPV4) {
                            data.ipinfo_set = false;
                        } else {
                            data.ipv4.get_or_insert_with(|| "dhcp".to_owned());
                            data.ipinfo_set = true;
                        }
                        if flags.contains(LoaderFlags::NOIPV6) {
                            data.ipv6info_set = false;
                        } else {
                            data.ipv6.get_or_insert_with(|| "dhcpv6".to_owned());
                            data.ipv6info_set = true;
                        }
                    }
                    Event::from(status)
                }
            }
            Step::Url => {
                info!("starting to resolve the install source");
                if let Some(location) = found_cd.take() {
                    return Ok(location);
                }
                let Some(current) = method else {
                    return Err(LoaderError::NonInteractive("no install method selected".to_owned()));
                };
                match (current.mount)(svc, ctx, data)? {
                    Some(location) => {
                        info!("got url {location}");
                        return Ok(location);
                    }
                    None if !can_prompt(flags, &*svc.ui) => {
                        return Err(LoaderError::NonInteractive(format!(
                            "{} source could not be resolved",
                            current.name
                        )));
                    }
                    None => Event::Failed,
                }
            }
            Step::Done => {
                return Err(LoaderError::NonInteractive("wizard finished without a source".to_owned()));
            }
        };
        let transition = next(step, event, dir);
        match transition.reset {
            Reset::IpInfo => data.reset_ip_info(),
            Reset::Method => data.clear_method(),
            Reset::None => {}
        }
        debug!("{step:?} --{event:?}--> {:?}", transition.state);
        step = transition.state;
        dir = transition.dir;
    }
}

/// Steps between source resolution and hand-off: the `noprobe` device
/// menu, updates, and relinking the live root onto the mounted runtime.
pub fn finish_session(svc: &mut Services<'_>, ctx: &LoaderContext, data: &mut LoaderData) {
    let flags = ctx.flags;
    let paths = ctx.paths();
    if flags.contains(LoaderFlags::NOPROBE) && data.ks_file.is_none() && svc.ui.is_interactive() {
        manual_device_check(svc.drivers, svc.ui, data);
    }

    if let Some(src) = data.updates_src.clone() {
        data.updates_src = load_updates_from_url(svc.ui, svc.mounts, svc.fetcher, paths, &src);
    } else if flags.contains(LoaderFlags::UPDATES) {
        let status = load_updates_from_disk(svc.ui, svc.mounts, svc.probe, paths);
        debug!("updates disk: {status:?}");
    }

    if flags.contains(LoaderFlags::TESTING) {
        return;
    }
    for name in RUNTIME_DIRECTORIES {
        match migrate_runtime_directory(&paths.runtime, &paths.root, name) {
            Ok(true) => debug!("/{name} now comes from the runtime image"),
            Ok(false) => {}
            Err(err) => error!("cannot relink /{name}: {err}"),
        }
    }
}

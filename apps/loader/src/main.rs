// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Entry point for the installer second-stage loader.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Entry point for the installer second-stage loader.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, warn};

use loader::logging::{apply_level, init_logging};
use loader::shell::{already_ran, exec_shell, mark_running, spawn_debug_shell, SHELL_TTY};
use loader::ConsoleUi;
use loader_core::cmdline::{parse_cmdline_flags, KernelArgs};
use loader_core::config::DEFAULT_CONFIG_PATH;
use loader_core::driver::{parse_module_info, SysDrivers};
use loader_core::fetch::NetFetcher;
use loader_core::handoff::{banner, build_handoff, process_env};
use loader_core::loader::{check_memory, graphical_override, EARLY_MODULES};
use loader_core::locale::{parse_lang_table, LocaleService, SysLocale};
use loader_core::mediacheck::CheckIsoMd5;
use loader_core::modules::{bus_probe, load_module_set, Modprobe};
use loader_core::mount::{MountOps, SysMount};
use loader_core::network::SysNetwork;
use loader_core::probe::SysfsProbe;
use loader_core::{
    finish_session, prepare_session, run_loader_main, HeadlessUi, LoaderConfig, LoaderContext,
    LoaderData, LoaderFlags, LoaderPaths, ProductInfo, Services, Ui,
};

/// Installer loader command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Second-stage installer loader", long_about = None)]
struct Cli {
    /// Read the kernel command line from this file instead of the configured one.
    #[arg(long)]
    cmdline: Option<PathBuf>,

    /// Use this kickstart file as-is instead of retrieving one.
    #[arg(long)]
    ksfile: Option<PathBuf>,

    /// Test mode: no mounts, no module loading and print instead of exec.
    #[arg(long)]
    test: bool,

    /// Offer a media check for the install source.
    #[arg(long)]
    mediacheck: bool,

    /// Paravirtualised console device passed through to the installer.
    #[arg(long)]
    virtpconsole: Option<String>,

    /// Loader configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Relocate every loader path below this directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<LoaderConfig> {
    let mut config = LoaderConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(root) = cli.root.as_deref() {
        config.paths = LoaderPaths::rooted(root);
    }
    Ok(config)
}

fn base_flags(cli: &Cli) -> LoaderFlags {
    let mut flags = LoaderFlags::empty();
    flags.set(LoaderFlags::TESTING, cli.test);
    flags.set(LoaderFlags::MEDIACHECK, cli.mediacheck);
    flags.set(LoaderFlags::VIRTPCONSOLE, cli.virtpconsole.is_some());
    flags
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let paths = config.paths.clone();
    init_logging(cli.verbose, (!cli.test).then_some(paths.log_file.as_path()));
    info!("loader starting");

    if !cli.test {
        if already_ran(&paths.run_marker) {
            println!("loader has already been run.  Starting shell.");
            return Err(exec_shell(&config.installer.shell)).context("starting shell");
        }
        if let Err(err) = mark_running(&paths.run_marker) {
            warn!("cannot create {}: {err}", paths.run_marker.display());
        }
    }

    let cmdline_path = cli.cmdline.clone().unwrap_or_else(|| paths.cmdline.clone());
    let cmdline = fs::read_to_string(&cmdline_path)
        .with_context(|| format!("reading {}", cmdline_path.display()))?;
    let args = KernelArgs::parse(&cmdline).context("parsing kernel command line")?;
    let mut data = LoaderData::default();
    let mut flags = parse_cmdline_flags(&args, base_flags(&cli), &paths, &mut data);
    if flags.intersects(LoaderFlags::SERIAL | LoaderFlags::VIRTPCONSOLE) && !graphical_override(&data) {
        flags.insert(LoaderFlags::TEXT);
    }
    apply_level(data.log_level.as_deref());

    let module_info = fs::read_to_string(&paths.module_info)
        .with_context(|| format!("failed to read {}", paths.module_info.display()))?;
    let catalog = parse_module_info(&module_info);
    let product = ProductInfo::load(&paths.buildstamp);
    let mut ctx = LoaderContext::new(flags, config, product);

    let probe = SysfsProbe::new(paths.clone());
    check_memory(&probe, &ctx)?;

    let dry_run = flags.contains(LoaderFlags::TESTING);
    let mounts: Rc<dyn MountOps> = Rc::new(SysMount);
    let mut drivers = SysDrivers::new(
        paths.clone(),
        catalog,
        Box::new(SysfsProbe::new(paths.clone())),
        Rc::clone(&mounts),
        Box::new(Modprobe::new(data.module_blacklist.clone(), dry_run)),
    );
    let mut early = EARLY_MODULES.to_owned();
    if !flags.contains(LoaderFlags::NOIPV6) {
        early.push_str(":ipv6");
    }
    load_module_set(drivers.modules_mut(), &early);

    let languages = fs::read_to_string(&paths.lang_table)
        .map(|text| parse_lang_table(&text))
        .unwrap_or_else(|err| {
            warn!("cannot read {}: {err}", paths.lang_table.display());
            Vec::new()
        });
    let mut locale = SysLocale::new(languages, paths.keymaps.clone(), dry_run);
    if let Some(lang) = data.lang.clone().filter(|_| data.lang_set) {
        locale.set_language(&lang, &mut data);
    }
    if !flags.contains(LoaderFlags::NOPROBE) {
        let loaded = bus_probe(drivers.modules_mut(), &probe.modaliases());
        info!("{loaded} drivers loaded for detected hardware");
    }

    let mut network = SysNetwork::new(paths.clone(), Box::new(SysfsProbe::new(paths.clone())), dry_run);
    let mut ui: Box<dyn Ui> = if flags.interactive() {
        Box::new(ConsoleUi::new(io::stdin().lock(), io::stdout()))
    } else {
        Box::new(HeadlessUi::new())
    };
    let fetcher = NetFetcher;
    let media = CheckIsoMd5;

    let mut svc = Services {
        ui: ui.as_mut(),
        mounts: mounts.as_ref(),
        probe: &probe,
        drivers: &mut drivers,
        network: &mut network,
        locale: &mut locale,
        fetcher: &fetcher,
        media: &media,
    };
    ctx.flags = prepare_session(&mut svc, &paths, ctx.flags, &mut data, cli.ksfile.as_deref());
    let _shell = spawn_debug_shell(ctx.flags, &ctx.config.installer.shell, Path::new(SHELL_TTY));

    let location = run_loader_main(&mut svc, &ctx, &mut data)?;
    info!("install source is {location}");
    finish_session(&mut svc, &ctx, &mut data);

    load_module_set(drivers.modules_mut(), &ctx.config.installer.late_modules);

    let handoff = build_handoff(&ctx, &data, &location, cli.virtpconsole.as_deref(), process_env)?;
    println!("{}", banner(&ctx));
    if ctx.flags.contains(LoaderFlags::TESTING) {
        println!("{handoff}");
        return Ok(());
    }
    Err(anyhow!(handoff.exec())).context("starting the installer")
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Kernel module loading through modprobe and insmod.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Kernel module loading.

use std::path::Path;
use std::process::Command;

use log::{debug, info, warn};

use crate::error::ModuleError;

/// Loads kernel modules.
pub trait ModuleLoader {
    /// Load `module` by name with optional parameters.
    fn load(&mut self, module: &str, params: &[String]) -> Result<(), ModuleError>;

    /// Insert a module object file, e.g. from a driver disk.
    fn insert_file(&mut self, path: &Path) -> Result<(), ModuleError>;

    /// Load whatever driver claims a device `modalias`.
    fn load_alias(&mut self, alias: &str) -> Result<(), ModuleError>;

    /// Names loaded so far, in load order.
    fn loaded(&self) -> &[String];
}

/// True when `a` and `b` name the same module; `-` and `_` are interchangeable.
#[must_use]
pub fn same_module(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .all(|(x, y)| x == y || matches!((x, y), (b'-', b'_') | (b'_', b'-')))
}

/// [`ModuleLoader`] shelling out to `modprobe` and `insmod`.
#[derive(Debug, Default)]
pub struct Modprobe {
    blacklist: Vec<String>,
    loaded: Vec<String>,
    dry_run: bool,
}

impl Modprobe {
    /// Loader honouring `blacklist`; `dry_run` logs instead of loading.
    #[must_use]
    pub fn new(blacklist: Vec<String>, dry_run: bool) -> Self {
        Self {
            blacklist,
            loaded: Vec::new(),
            dry_run,
        }
    }

    fn is_blacklisted(&self, module: &str) -> bool {
        self.blacklist.iter().any(|entry| same_module(entry, module))
    }

    fn run(&self, program: &'static str, args: &[&str], module: &str) -> Result<(), ModuleError> {
        if self.dry_run {
            info!("would run {program} {}", args.join(" "));
            return Ok(());
        }
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|err| ModuleError::Command {
                program,
                module: module.to_owned(),
                detail: err.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ModuleError::Command {
                program,
                module: module.to_owned(),
                detail: status.to_string(),
            })
        }
    }
}

impl ModuleLoader for Modprobe {
    fn load(&mut self, module: &str, params: &[String]) -> Result<(), ModuleError> {
        if self.is_blacklisted(module) {
            return Err(ModuleError::Blacklisted(module.to_owned()));
        }
        if self.loaded.iter().any(|name| name == module) {
            return Ok(());
        }
        let mut args = vec!["-q", module];
        args.extend(params.iter().map(String::as_str));
        self.run("modprobe", &args, module)?;
        debug!("loaded module {module}");
        self.loaded.push(module.to_owned());
        Ok(())
    }

    fn insert_file(&mut self, path: &Path) -> Result<(), ModuleError> {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.is_blacklisted(&name) {
            return Err(ModuleError::Blacklisted(name));
        }
        let display = path.display().to_string();
        self.run("insmod", &[display.as_str()], &name)?;
        self.loaded.push(name);
        Ok(())
    }

    fn load_alias(&mut self, alias: &str) -> Result<(), ModuleError> {
        self.run("modprobe", &["-q", "-b", alias], alias)
    }

    fn loaded(&self) -> &[String] {
        &self.loaded
    }
}

/// Load a colon separated module list such as `nfs:loop:isofs`; returns the
/// number of modules that loaded.
pub fn load_module_set(loader: &mut dyn ModuleLoader, set: &str) -> usize {
    set.split(':')
        .filter(|name| !name.is_empty())
        .filter(|name| match loader.load(name, &[]) {
            Ok(()) => true,
            Err(err) => {
                warn!("{err}");
                false
            }
        })
        .count()
}

/// Load drivers for every device alias the kernel reports.
pub fn bus_probe(loader: &mut dyn ModuleLoader, aliases: &[String]) -> usize {
    let mut loaded = 0;
    for alias in aliases {
        match loader.load_alias(alias) {
            Ok(()) => loaded += 1,
            Err(err) => debug!("no driver for {alias}: {err}"),
        }
    }
    info!("bus probe matched {loaded} of {} device aliases", aliases.len());
    loaded
}

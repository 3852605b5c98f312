// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Assemble the installer command line and environment and exec it.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Installer hand-off.
//!
//! Nothing here mutates loader state: [`build_handoff`] turns the resolved
//! [`Location`] and the collected settings into a [`Handoff`], which the
//! binary either prints (test mode) or execs.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::data::{LoaderData, Location};
use crate::error::LoaderError;
use crate::flags::LoaderFlags;
use crate::loader::LoaderContext;

/// Environment variables that get the updates and product overlays.
pub const OVERLAY_VARIABLES: [&str; 3] = ["PYTHONPATH", "LD_LIBRARY_PATH", "PATH"];

/// Fully assembled installer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    /// Resolved installer executable.
    pub program: PathBuf,
    /// Arguments after the program name.
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl Handoff {
    /// Replace the current process with the installer. Only returns on
    /// failure.
    pub fn exec(&self) -> LoaderError {
        info!("exec {}", self.program.display());
        let err = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .exec();
        LoaderError::io("exec", &self.program, err)
    }
}

impl fmt::Display for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Search `search_path` (colon separated) for an executable `name`.
#[must_use]
pub fn find_installer(name: &str, search_path: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| is_executable(candidate))
}

/// The value passed with `-m`. FTP locations may carry credentials, so they
/// go through a private file and the installer gets `@<file>` instead.
pub fn method_argument(location: &Location, method_file: &Path) -> Result<String, LoaderError> {
    let url = location.to_string();
    if !location.needs_method_file() {
        return Ok(url);
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(method_file)
        .map_err(|err| LoaderError::io("create", method_file, err))?;
    file.write_all(format!("{url}\r").as_bytes())
        .map_err(|err| LoaderError::io("write", method_file, err))?;
    Ok(format!("@{}", method_file.display()))
}

/// Installer arguments in the order the installer expects them.
#[must_use]
pub fn installer_args(
    flags: LoaderFlags,
    data: &LoaderData,
    method: &str,
    virtpconsole: Option<&str>,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-m".into(), method.into()];
    for extra in data.extra_args.as_slice() {
        match extra.split_once('=') {
            Some((key, value)) => {
                args.push(key.into());
                args.push(value.into());
            }
            None => args.push(extra.clone()),
        }
    }
    if flags.contains(LoaderFlags::NOIPV4) {
        args.push("--noipv4".into());
    }
    if flags.contains(LoaderFlags::NOIPV6) {
        args.push("--noipv6".into());
    }

    if flags.contains(LoaderFlags::RESCUE) {
        args.push("--rescue".into());
        if flags.contains(LoaderFlags::SERIAL) {
            args.push("--serial".into());
        }
        return args;
    }

    if flags.contains(LoaderFlags::SERIAL) {
        args.push("--serial".into());
    }
    if flags.contains(LoaderFlags::TEXT) {
        args.push("-T".into());
    } else if flags.contains(LoaderFlags::GRAPHICAL) {
        args.push("--graphical".into());
    }
    if flags.contains(LoaderFlags::CMDLINE) {
        args.push("-C".into());
    }
    if flags.contains(LoaderFlags::EXPERT) {
        args.push("--expert".into());
    }
    args.push(
        if flags.contains(LoaderFlags::SELINUX) {
            "--selinux"
        } else {
            "--noselinux"
        }
        .into(),
    );
    if flags.contains(LoaderFlags::KICKSTART) {
        if let Some(ks) = data.ks_file.as_deref() {
            args.push("--kickstart".into());
            args.push(ks.into());
        }
    }
    if let Some(console) = virtpconsole {
        args.push("--virtpconsole".into());
        args.push(console.into());
    }
    if let Some(src) = data.updates_src.as_deref().filter(|_| flags.contains(LoaderFlags::UPDATES)) {
        args.push("--updates".into());
        args.push(src.into());
    }
    if let Some(url) = data.dogtail_url.as_deref() {
        args.push("--dogtail".into());
        args.push(url.into());
    }
    if !flags.contains(LoaderFlags::NOPASS) {
        if let Some(lang) = data.lang.as_deref().filter(|_| data.lang_set) {
            args.push("--lang".into());
            args.push(lang.into());
        }
        if let Some(kbd) = data.kbd.as_deref().filter(|_| data.kbd_set) {
            args.push("--keymap".into());
            args.push(kbd.into());
        }
    }
    if let Some(level) = data.log_level.as_deref() {
        args.push("--loglevel".into());
        args.push(level.into());
    }
    args
}

/// Directories prepended to every overlay variable, highest priority first.
#[must_use]
pub fn overlay_dirs(ctx: &LoaderContext, location: &Location) -> Vec<PathBuf> {
    let paths = ctx.paths();
    let mut dirs = Vec::new();
    if location.is_nfs_tree() && !ctx.flags.contains(LoaderFlags::STAGE2) {
        if let Some(mountpoint) = location.mountpoint() {
            dirs.push(mountpoint.join("RHupdates"));
        }
    }
    dirs.push(paths.product.clone());
    dirs.push(paths.updates.clone());
    dirs
}

/// `dirs` joined in order, followed by `current` when it is non-empty.
#[must_use]
pub fn prepend_path(dirs: &[PathBuf], current: Option<&str>) -> String {
    let mut parts: Vec<String> = dirs.iter().map(|dir| dir.display().to_string()).collect();
    if let Some(current) = current.filter(|value| !value.is_empty()) {
        parts.push(current.to_owned());
    }
    parts.join(":")
}

/// Build the installer invocation. `current_env` supplies the inherited
/// value of a variable.
pub fn build_handoff(
    ctx: &LoaderContext,
    data: &LoaderData,
    location: &Location,
    virtpconsole: Option<&str>,
    current_env: impl Fn(&str) -> Option<String>,
) -> Result<Handoff, LoaderError> {
    let paths = ctx.paths();
    if let Err(err) = fs::create_dir_all(&paths.updates) {
        debug!("cannot create {}: {err}", paths.updates.display());
    }

    let dirs = overlay_dirs(ctx, location);
    let mut vars: Vec<(String, String)> = OVERLAY_VARIABLES
        .iter()
        .map(|var| ((*var).to_owned(), prepend_path(&dirs, current_env(var).as_deref())))
        .collect();
    vars.push(("ANACONDAVERSION".to_owned(), ctx.config.installer.version.clone()));

    let search = vars
        .iter()
        .find(|(key, _)| key == "PATH")
        .map(|(_, value)| value.clone())
        .unwrap_or_default();
    let program = find_installer(&ctx.config.installer.program, &search)
        .ok_or_else(|| LoaderError::MissingExecutable(ctx.config.installer.program.clone()))?;

    let method = method_argument(location, &paths.method_file)?;
    let args = installer_args(ctx.flags, data, &method, virtpconsole);
    Ok(Handoff {
        program,
        args,
        env: vars,
    })
}

/// Inherited environment lookup for [`build_handoff`].
#[must_use]
pub fn process_env(name: &str) -> Option<String> {
    env::var_os(name).map(|value: OsString| value.to_string_lossy().into_owned())
}

/// Banner printed just before the exec.
#[must_use]
pub fn banner(ctx: &LoaderContext) -> String {
    if ctx.flags.contains(LoaderFlags::RESCUE) {
        format!(
            "Running {} {}, the {} rescue mode - please wait...",
            ctx.config.installer.program, ctx.config.installer.version, ctx.product.name
        )
    } else {
        format!(
            "Running {} {}, the {} system installer - please wait...",
            ctx.config.installer.program, ctx.config.installer.version, ctx.product.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_args_split_at_equals() {
        let mut data = LoaderData::default();
        data.extra_args.push("--vnc");
        data.extra_args.push("--vncpassword=secret");
        let args = installer_args(LoaderFlags::empty(), &data, "cdrom://hdc:/mnt/source", None);
        assert_eq!(
            &args[..5],
            ["-m", "cdrom://hdc:/mnt/source", "--vnc", "--vncpassword", "secret"]
        );
        assert_eq!(args.last().map(String::as_str), Some("--noselinux"));
    }

    #[test]
    fn rescue_stops_after_serial() {
        let data = LoaderData {
            log_level: Some("debug".into()),
            ..LoaderData::default()
        };
        let args = installer_args(
            LoaderFlags::RESCUE | LoaderFlags::SERIAL | LoaderFlags::EXPERT,
            &data,
            "nfs:/mnt/source/.",
            None,
        );
        assert_eq!(args, ["-m", "nfs:/mnt/source/.", "--rescue", "--serial"]);
    }

    #[test]
    fn nopass_withholds_language_and_keymap() {
        let data = LoaderData {
            lang: Some("de_DE.UTF-8".into()),
            lang_set: true,
            kbd: Some("de".into()),
            kbd_set: true,
            ..LoaderData::default()
        };
        let passed = installer_args(LoaderFlags::empty(), &data, "x", None);
        assert!(passed.windows(2).any(|w| w == ["--lang", "de_DE.UTF-8"]));
        assert!(passed.windows(2).any(|w| w == ["--keymap", "de"]));
        let withheld = installer_args(LoaderFlags::NOPASS, &data, "x", None);
        assert!(!withheld.iter().any(|arg| arg == "--lang" || arg == "--keymap"));
    }

    #[test]
    fn path_overlay_keeps_inherited_tail() {
        let dirs = [PathBuf::from("/tmp/product"), PathBuf::from("/tmp/updates")];
        assert_eq!(prepend_path(&dirs, Some("/usr/bin")), "/tmp/product:/tmp/updates:/usr/bin");
        assert_eq!(prepend_path(&dirs, Some("")), "/tmp/product:/tmp/updates");
        assert_eq!(prepend_path(&dirs, None), "/tmp/product:/tmp/updates");
    }
}

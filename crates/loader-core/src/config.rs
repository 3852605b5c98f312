// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load the loader's TOML configuration.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Loader configuration.
//!
//! Every mountpoint and scratch file the loader touches is named here so the
//! whole tree can be relocated under a temporary root.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/loader.toml";

/// Top-level loader configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Filesystem locations.
    pub paths: LoaderPaths,
    /// Memory thresholds.
    pub memory: MemoryConfig,
    /// Installer hand-off settings.
    pub installer: InstallerConfig,
}

impl LoaderConfig {
    /// Parse configuration text.
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(path, &text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Mountpoints, scratch files and system files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderPaths {
    /// Install source mountpoint.
    pub source: PathBuf,
    /// Loop mountpoint for ISO images found on NFS.
    pub source2: PathBuf,
    /// Stage2 runtime mountpoint.
    pub runtime: PathBuf,
    /// Scratch mountpoint for hard drive partitions.
    pub hd_image: PathBuf,
    /// Scratch loop mountpoint for ISO images.
    pub loop_image: PathBuf,
    /// RAM-backed directory for copied stage2 images.
    pub ramfs: PathBuf,
    /// Scratch mountpoint for driver disks.
    pub drivers: PathBuf,
    /// Directory receiving per-disk driver copies (`DD-N`).
    pub driver_copies: PathBuf,
    /// Unpacked installer updates.
    pub updates: PathBuf,
    /// Scratch mountpoint for update disks and images.
    pub update_disk: PathBuf,
    /// Unpacked product image.
    pub product: PathBuf,
    /// Network settings shared with the installer.
    pub netinfo: PathBuf,
    /// File used to pass `ftp:` locations.
    pub method_file: PathBuf,
    /// Scratch mountpoint for kickstart retrieval.
    pub ks_mount: PathBuf,
    /// Destination of retrieved kickstart files.
    pub ks_file: PathBuf,
    /// VNC password file.
    pub vnc_password: PathBuf,
    /// Build stamp of the running boot media.
    pub buildstamp: PathBuf,
    /// Kernel memory report.
    pub meminfo: PathBuf,
    /// Kernel command line.
    pub cmdline: PathBuf,
    /// Kernel partition table.
    pub partitions: PathBuf,
    /// Device node directory.
    pub dev: PathBuf,
    /// Sysfs root.
    pub sys: PathBuf,
    /// Module descriptions.
    pub module_info: PathBuf,
    /// Language table.
    pub lang_table: PathBuf,
    /// Keymap directory.
    pub keymaps: PathBuf,
    /// Marker written on first run.
    pub run_marker: PathBuf,
    /// Driver disk image loaded automatically when present.
    pub dd_image: PathBuf,
    /// Loader log file.
    pub log_file: PathBuf,
    /// Kernel host name control file.
    pub hostname: PathBuf,
    /// Resolver configuration.
    pub resolv_conf: PathBuf,
    /// Root under which runtime directories are migrated.
    pub root: PathBuf,
}

impl Default for LoaderPaths {
    fn default() -> Self {
        Self::rooted(Path::new("/"))
    }
}

impl LoaderPaths {
    /// Build the standard layout below `root`.
    #[must_use]
    pub fn rooted(root: &Path) -> Self {
        let at = |rel: &str| root.join(rel);
        Self {
            source: at("mnt/source"),
            source2: at("mnt/source2"),
            runtime: at("mnt/runtime"),
            hd_image: at("tmp/hdimage"),
            loop_image: at("tmp/loopimage"),
            ramfs: at("tmp/ramfs"),
            drivers: at("tmp/drivers"),
            driver_copies: at("tmp"),
            updates: at("tmp/updates"),
            update_disk: at("tmp/update-disk"),
            product: at("tmp/product"),
            netinfo: at("tmp/netinfo"),
            method_file: at("tmp/method"),
            ks_mount: at("tmp/ks"),
            ks_file: at("tmp/ks.cfg"),
            vnc_password: at("tmp/vncpassword.dat"),
            buildstamp: at(".buildstamp"),
            meminfo: at("proc/meminfo"),
            cmdline: at("proc/cmdline"),
            partitions: at("proc/partitions"),
            dev: at("dev"),
            sys: at("sys"),
            module_info: at("lib/modules/module-info"),
            lang_table: at("etc/lang-table"),
            keymaps: at("lib/kbd/keymaps"),
            run_marker: at("var/run/loader.run"),
            dd_image: at("dd.img"),
            log_file: at("tmp/loader.log"),
            hostname: at("proc/sys/kernel/hostname"),
            resolv_conf: at("etc/resolv.conf"),
            root: root.to_path_buf(),
        }
    }

    /// Device node for a kernel device name such as `sda1`.
    #[must_use]
    pub fn device_node(&self, name: &str) -> PathBuf {
        self.dev.join(name.trim_start_matches("/dev/"))
    }
}

/// Memory thresholds in kilobytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Below this the loader refuses to continue.
    pub min_ram_kb: u64,
    /// Below this the hard drive path prefers the small stage2 image.
    pub small_stage2_below_kb: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_ram_kb: 65_536,
            small_stage2_below_kb: 128_000,
        }
    }
}

/// Installer hand-off settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Installer executable searched on `PATH`.
    pub program: String,
    /// Version exported as `ANACONDAVERSION`.
    pub version: String,
    /// Shell used for the debug console.
    pub shell: PathBuf,
    /// Modules loaded before hand-off.
    pub late_modules: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: "anaconda".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            shell: PathBuf::from("/bin/sh"),
            late_modules: "md:raid0:raid1:raid5:raid6:raid456:raid10:linear:fat:msdos:jbd:\
                           xfs:dm-mod:dm-zero:dm-mirror:dm-snapshot:dm-multipath:dm-crypt"
                .to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = LoaderConfig::from_toml(Path::new("loader.toml"), "").expect("parse");
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.paths.source, PathBuf::from("/mnt/source"));
    }

    #[test]
    fn partial_sections_override_fields() {
        let text = "[paths]\nsource = \"/media/src\"\n[memory]\nmin_ram_kb = 1024\n";
        let config = LoaderConfig::from_toml(Path::new("loader.toml"), text).expect("parse");
        assert_eq!(config.paths.source, PathBuf::from("/media/src"));
        assert_eq!(config.paths.runtime, PathBuf::from("/mnt/runtime"));
        assert_eq!(config.memory.min_ram_kb, 1024);
        assert_eq!(config.memory.small_stage2_below_kb, 128_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = LoaderConfig::from_toml(Path::new("loader.toml"), "[paths]\nbogus = \"x\"\n")
            .expect_err("unknown key");
        assert!(err.to_string().contains("loader.toml"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config =
            LoaderConfig::load_or_default(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config.installer.program, "anaconda");
    }

    #[test]
    fn device_node_strips_dev_prefix() {
        let paths = LoaderPaths::rooted(Path::new("/sandbox"));
        assert_eq!(paths.device_node("/dev/sda1"), PathBuf::from("/sandbox/dev/sda1"));
        assert_eq!(paths.device_node("sr0"), PathBuf::from("/sandbox/dev/sr0"));
    }
}

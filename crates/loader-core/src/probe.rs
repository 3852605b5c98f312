// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Enumerate block devices, network interfaces and memory from procfs and sysfs.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Device enumeration.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::config::LoaderPaths;
use crate::data::DeviceClass;

/// One device reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Kernel name such as `sr0`, `sda` or `eth0`.
    pub name: String,
    /// Vendor and model, when known.
    pub description: String,
    /// Hardware address of network interfaces.
    pub hwaddr: Option<String>,
}

impl DeviceInfo {
    /// Device with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            hwaddr: None,
        }
    }
}

/// Hardware queries used by the state machines.
pub trait DeviceProbe {
    /// Devices of `class` currently visible to the kernel.
    fn devices(&self, class: DeviceClass) -> Vec<DeviceInfo>;

    /// Partitions that may hold a filesystem.
    fn partitions(&self) -> Vec<String>;

    /// Disk name for a BIOS drive number such as `80`.
    fn bios_disk(&self, bios_num: &str) -> Option<String>;

    /// Installed memory in kilobytes.
    fn total_memory_kb(&self) -> Option<u64>;
}

/// Name of partition `number` on `disk`; disks ending in a digit use a `p`.
#[must_use]
pub fn partition_name(disk: &str, number: &str) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{disk}p{number}")
    } else {
        format!("{disk}{number}")
    }
}

/// Parse `MemTotal` from `/proc/meminfo` text.
#[must_use]
pub fn parse_meminfo(text: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let rest = line.strip_prefix("MemTotal:")?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// [`DeviceProbe`] reading `/proc` and `/sys`.
#[derive(Debug, Clone)]
pub struct SysfsProbe {
    paths: LoaderPaths,
}

impl SysfsProbe {
    /// Probe rooted at the configured `/proc` and `/sys` locations.
    #[must_use]
    pub fn new(paths: LoaderPaths) -> Self {
        Self { paths }
    }

    fn read_attr(path: &Path) -> Option<String> {
        fs::read_to_string(path)
            .ok()
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
    }

    fn block_root(&self) -> PathBuf {
        self.paths.sys.join("block")
    }

    fn block_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.block_root())
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    fn describe(&self, name: &str) -> String {
        let device = self.block_root().join(name).join("device");
        let vendor = Self::read_attr(&device.join("vendor"));
        let model = Self::read_attr(&device.join("model"));
        match (vendor, model) {
            (Some(v), Some(m)) => format!("{v} {m}"),
            (None, Some(m)) => m,
            (Some(v), None) => v,
            (None, None) => name.to_owned(),
        }
    }

    fn is_cdrom(&self, name: &str) -> bool {
        let scsi_type = Self::read_attr(&self.block_root().join(name).join("device/type"));
        name.starts_with("sr") || scsi_type.as_deref() == Some("5")
    }

    fn is_disk(&self, name: &str) -> bool {
        const VIRTUAL: &[&str] = &["loop", "ram", "fd", "zram", "dm-", "md"];
        !VIRTUAL.iter().any(|prefix| name.starts_with(prefix)) && !self.is_cdrom(name)
    }

    fn block_class(&self, pick: impl Fn(&str) -> bool) -> Vec<DeviceInfo> {
        self.block_devices()
            .into_iter()
            .filter(|name| pick(name))
            .map(|name| DeviceInfo {
                description: self.describe(&name),
                name,
                hwaddr: None,
            })
            .collect()
    }

    fn interfaces(&self) -> Vec<DeviceInfo> {
        let net = self.paths.sys.join("class/net");
        let mut found: Vec<DeviceInfo> = fs::read_dir(&net)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != "lo")
            .map(|name| {
                let driver = fs::read_link(net.join(&name).join("device/driver"))
                    .ok()
                    .and_then(|link| link.file_name().map(|n| n.to_string_lossy().into_owned()));
                DeviceInfo {
                    description: driver.unwrap_or_else(|| name.clone()),
                    hwaddr: Self::read_attr(&net.join(&name).join("address")),
                    name,
                }
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Every `modalias` under `/sys/devices`, sorted and deduplicated.
    #[must_use]
    pub fn modaliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = WalkDir::new(self.paths.sys.join("devices"))
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == "modalias")
            .filter_map(|entry| Self::read_attr(entry.path()))
            .collect();
        aliases.sort();
        aliases.dedup();
        aliases
    }

    fn mbr_signature(&self, disk: &str) -> Option<u32> {
        let mut file = fs::File::open(self.paths.device_node(disk)).ok()?;
        file.seek(SeekFrom::Start(440)).ok()?;
        let mut raw = [0u8; 4];
        file.read_exact(&mut raw).ok()?;
        Some(u32::from_le_bytes(raw))
    }
}

impl DeviceProbe for SysfsProbe {
    fn devices(&self, class: DeviceClass) -> Vec<DeviceInfo> {
        match class {
            DeviceClass::Cdrom => self.block_class(|name| self.is_cdrom(name)),
            DeviceClass::Disk => self.block_class(|name| self.is_disk(name)),
            DeviceClass::Network => self.interfaces(),
            DeviceClass::Any => {
                let mut all = self.block_class(|name| self.is_cdrom(name) || self.is_disk(name));
                all.extend(self.interfaces());
                all
            }
        }
    }

    fn partitions(&self) -> Vec<String> {
        let Ok(text) = fs::read_to_string(&self.paths.partitions) else {
            return Vec::new();
        };
        let class_block = self.paths.sys.join("class/block");
        text.lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                match fields.as_slice() {
                    [_, _, blocks, name] => Some((blocks.parse::<u64>().ok()?, *name)),
                    _ => None,
                }
            })
            // Extended partitions report a single block.
            .filter(|(blocks, _)| *blocks > 1)
            .map(|(_, name)| name)
            .filter(|name| {
                if class_block.is_dir() {
                    class_block.join(name).join("partition").exists()
                } else {
                    self.is_disk(name) && name.ends_with(|c: char| c.is_ascii_digit())
                }
            })
            .map(str::to_owned)
            .collect()
    }

    fn bios_disk(&self, bios_num: &str) -> Option<String> {
        let edd = self
            .paths
            .sys
            .join("firmware/edd")
            .join(format!("int13_dev{}", bios_num.to_ascii_lowercase()));
        let wanted = Self::read_attr(&edd.join("mbr_signature"))?;
        let wanted = u32::from_str_radix(wanted.trim_start_matches("0x"), 16).ok()?;
        let found = self
            .block_class(|name| self.is_disk(name))
            .into_iter()
            .find(|disk| self.mbr_signature(&disk.name) == Some(wanted))
            .map(|disk| disk.name);
        debug!("bios disk {bios_num} resolved to {found:?}");
        found
    }

    fn total_memory_kb(&self) -> Option<u64> {
        parse_meminfo(&fs::read_to_string(&self.paths.meminfo).ok()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, SysfsProbe) {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = LoaderPaths::rooted(dir.path());
        (dir, SysfsProbe::new(paths))
    }

    #[test]
    fn meminfo_total() {
        let text = "MemTotal:        2048000 kB\nMemFree:          100 kB\n";
        assert_eq!(parse_meminfo(text), Some(2_048_000));
        assert_eq!(parse_meminfo("MemFree: 1 kB\n"), None);
    }

    #[test]
    fn nvme_partitions_take_p() {
        assert_eq!(partition_name("sda", "1"), "sda1");
        assert_eq!(partition_name("nvme0n1", "2"), "nvme0n1p2");
    }

    #[test]
    fn classifies_block_devices() {
        let (dir, probe) = sandbox();
        for name in ["sda", "sr0", "loop0"] {
            fs::create_dir_all(dir.path().join("sys/block").join(name).join("device"))
                .expect("mkdir");
        }
        fs::write(dir.path().join("sys/block/sda/device/model"), "QEMU HARDDISK\n").expect("write");
        let disks = probe.devices(DeviceClass::Disk);
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].description, "QEMU HARDDISK");
        assert_eq!(probe.devices(DeviceClass::Cdrom)[0].name, "sr0");
    }

    #[test]
    fn partitions_skip_whole_disks_and_extended() {
        let (dir, probe) = sandbox();
        fs::create_dir_all(dir.path().join("proc")).expect("mkdir");
        fs::write(
            dir.path().join("proc/partitions"),
            "major minor  #blocks  name\n\n 8 0 8388608 sda\n 8 1 102400 sda1\n 8 2 1 sda2\n 8 5 4096 sda5\n",
        )
        .expect("write");
        assert_eq!(probe.partitions(), vec!["sda1", "sda5"]);
    }

    #[test]
    fn unknown_bios_disk_is_unresolved() {
        let (_dir, probe) = sandbox();
        assert_eq!(probe.bios_disk("80"), None);
    }
}

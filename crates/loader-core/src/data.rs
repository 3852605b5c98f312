// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Session state threaded through every loader stage.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Session state threaded through every loader stage.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::extra_args::ExtraArgs;

/// Outcome reported by collaborator calls and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The step completed with fresh input.
    Ok,
    /// The user asked to go back.
    Back,
    /// Nothing to do; previously cached data still applies.
    Noop,
    /// The step failed; handled like `Back` but logged as an error.
    Error,
}

/// Hardware class a method needs a driver for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Optical drives.
    Cdrom,
    /// Block devices holding partitions.
    Disk,
    /// Network interfaces.
    Network,
    /// Any class; used by the manual device menu.
    Any,
}

impl DeviceClass {
    /// Short name used in logs and module-info files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cdrom => "cdrom",
            Self::Disk => "disk",
            Self::Network => "network",
            Self::Any => "any",
        }
    }
}

/// Install method discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Local CD or DVD.
    Cdrom,
    /// ISO images on a hard drive partition.
    Disk,
    /// NFS export.
    Nfs,
    /// HTTP or FTP server.
    Url,
}

/// NFS source parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NfsSource {
    /// Server host name or address.
    pub host: Option<String>,
    /// Exported directory.
    pub directory: Option<String>,
    /// Extra mount options.
    pub options: Option<String>,
}

/// Hard drive source parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskSource {
    /// Partition device name, with or without a `/dev/` prefix.
    pub partition: Option<String>,
    /// Directory on the partition holding the ISO images.
    pub directory: Option<String>,
}

/// HTTP or FTP source parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlSource {
    /// Base URL of the install tree.
    pub url: Option<String>,
    /// Optional proxy URL.
    pub proxy: Option<String>,
}

/// Method selection with its method-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodData {
    /// Optical media, optionally pinned to one drive.
    Cdrom {
        /// Drive name such as `sr0`.
        device: Option<String>,
    },
    /// Hard drive ISO images.
    Disk(DiskSource),
    /// NFS export.
    Nfs(NfsSource),
    /// HTTP or FTP tree.
    Url(UrlSource),
}

impl MethodData {
    /// Discriminant of this payload.
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        match self {
            Self::Cdrom { .. } => MethodKind::Cdrom,
            Self::Disk(_) => MethodKind::Disk,
            Self::Nfs(_) => MethodKind::Nfs,
            Self::Url(_) => MethodKind::Url,
        }
    }
}

/// Mutable loader session state.
///
/// Filled from the command line, then kickstart, then interactive prompts.
/// Fields that a backward transition must re-ask are reset explicitly by the
/// state machines (`clear_method`, `reset_ip_info`).
#[derive(Debug, Clone, Default)]
pub struct LoaderData {
    /// Selected method, if pinned by the command line or kickstart.
    pub method: Option<MethodData>,
    /// Network device chosen for installation.
    pub net_dev: Option<String>,
    /// True when `net_dev` was supplied up front.
    pub net_dev_set: bool,
    /// MAC address of the PXE boot interface.
    pub boot_if: Option<String>,
    /// DHCP vendor class identifier.
    pub net_cls: Option<String>,
    /// IPv4 configuration is complete.
    pub ipinfo_set: bool,
    /// IPv6 configuration is complete.
    pub ipv6info_set: bool,
    /// IPv4 address or `dhcp`.
    pub ipv4: Option<String>,
    /// IPv6 address, `dhcp`, `auto` or `dhcpv6`.
    pub ipv6: Option<String>,
    /// IPv4 netmask.
    pub netmask: Option<String>,
    /// Default gateway.
    pub gateway: Option<String>,
    /// Comma separated name servers.
    pub dns: Option<String>,
    /// Host name to set once networking is up.
    pub hostname: Option<String>,
    /// Options for ethtool on the install interface.
    pub ethtool: Option<String>,
    /// Wireless ESSID.
    pub essid: Option<String>,
    /// Wireless WEP key.
    pub wepkey: Option<String>,
    /// Interface MTU.
    pub mtu: Option<u32>,
    /// DHCP timeout in seconds.
    pub dhcp_timeout: Option<u32>,
    /// Link checks before giving up on carrier.
    pub link_checks: Option<u32>,
    /// Seconds to wait after link comes up.
    pub post_link_sleep: Option<u32>,
    /// Raw `ks` argument or the path of the fetched kickstart file.
    pub ks_file: Option<String>,
    /// Kickstart data is driving the network screens.
    pub is_kickstart: bool,
    /// Selected language.
    pub lang: Option<String>,
    /// Language was supplied up front.
    pub lang_set: bool,
    /// Selected keymap.
    pub kbd: Option<String>,
    /// Keymap was supplied up front.
    pub kbd_set: bool,
    /// Remote updates image location.
    pub updates_src: Option<String>,
    /// Dogtail script URL.
    pub dogtail_url: Option<String>,
    /// Driver disk source from `dd=`.
    pub dd_src: Option<String>,
    /// Installer log level name.
    pub log_level: Option<String>,
    /// X display from `display=`.
    pub display: Option<String>,
    /// Modules that must never be loaded.
    pub module_blacklist: Vec<String>,
    /// Arguments forwarded verbatim to the installer.
    pub extra_args: ExtraArgs,
}

impl LoaderData {
    /// Discard a pinned method so the user is asked again.
    pub fn clear_method(&mut self) {
        self.method = None;
    }

    /// Forget IP configuration so the network screens prompt again.
    pub fn reset_ip_info(&mut self) {
        self.ipinfo_set = false;
        self.ipv6info_set = false;
    }

    /// Kind of the pinned method, if any.
    #[must_use]
    pub fn method_kind(&self) -> Option<MethodKind> {
        self.method.as_ref().map(MethodData::kind)
    }
}

/// Canonical location of a resolved install source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Disc mounted from a local drive.
    Cdrom {
        /// Drive name.
        device: String,
        /// Mountpoint of the disc.
        mountpoint: PathBuf,
    },
    /// ISO images on a hard drive partition.
    HardDrive {
        /// Partition name without `/dev/`.
        device: String,
        /// Filesystem of the partition.
        fstype: String,
        /// Directory holding the images.
        directory: String,
    },
    /// Exploded tree on an NFS export.
    NfsTree {
        /// Mountpoint of the export.
        mountpoint: PathBuf,
    },
    /// ISO images on an NFS export.
    NfsIso {
        /// Mountpoint of the export.
        mountpoint: PathBuf,
    },
    /// HTTP or FTP tree.
    Url(String),
}

impl Location {
    /// True for `ftp:` locations, which are passed to the installer via a file.
    #[must_use]
    pub fn needs_method_file(&self) -> bool {
        matches!(self, Self::Url(url) if url.starts_with("ftp:"))
    }

    /// True for locations that expose an `RHupdates` directory.
    #[must_use]
    pub fn is_nfs_tree(&self) -> bool {
        matches!(self, Self::NfsTree { .. })
    }

    /// Mountpoint backing the location, if any.
    #[must_use]
    pub fn mountpoint(&self) -> Option<&Path> {
        match self {
            Self::Cdrom { mountpoint, .. }
            | Self::NfsTree { mountpoint }
            | Self::NfsIso { mountpoint } => Some(mountpoint),
            Self::HardDrive { .. } | Self::Url(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cdrom { device, mountpoint } => {
                write!(f, "cdrom://{device}:{}", mountpoint.display())
            }
            Self::HardDrive {
                device,
                fstype,
                directory,
            } => {
                let dir = directory.trim_start_matches('/');
                let dir = if dir.is_empty() { "." } else { dir };
                write!(f, "hd://{device}:{fstype}/{dir}")
            }
            Self::NfsTree { mountpoint } => write!(f, "nfs:/{}/.", mountpoint.display()),
            Self::NfsIso { mountpoint } => write!(f, "nfsiso:{}", mountpoint.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Retrieve the kickstart file named by ks= from disk, disc, NFS or a URL.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Kickstart file retrieval.
//!
//! Supported locations:
//!
//! * `file:/path` (also the meaning of a bare `ks`, as `file:/ks.cfg`)
//! * `hd:<partition>:/path` and `bd:<biosdisk>p<part>:/path`
//! * `cdrom:/path`
//! * `nfs:[opts:]host:/path`
//! * `http://`, `https://` and `ftp://` URLs

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::cmdline::parse_method_string;
use crate::config::LoaderPaths;
use crate::data::{DeviceClass, LoaderData, MethodData, Status};
use crate::error::KickstartError;
use crate::fetch::{is_remote, Fetcher};
use crate::flags::LoaderFlags;
use crate::kickstart::resolve_biospart;
use crate::methods::nfs::nfs_spec;
use crate::mount::{mount_first, mount_guarded, FsType, MountOps, UPDATE_FILESYSTEMS};
use crate::network::NetworkService;
use crate::probe::DeviceProbe;
use crate::ui::Ui;

const DEFAULT_KS_PATH: &str = "file:/ks.cfg";

/// Collaborators used to reach the kickstart file.
pub struct KsFetchEnv<'a> {
    /// Prompt surface used by network bring-up.
    pub ui: &'a mut dyn Ui,
    /// Mount primitive.
    pub mounts: &'a dyn MountOps,
    /// Device enumeration.
    pub probe: &'a dyn DeviceProbe,
    /// Network bring-up for remote locations.
    pub network: &'a mut dyn NetworkService,
    /// HTTP and FTP retrieval.
    pub fetcher: &'a dyn Fetcher,
}

fn unavailable(location: &str, reason: impl Into<String>) -> KickstartError {
    KickstartError::Unavailable {
        location: location.to_owned(),
        reason: reason.into(),
    }
}

/// Normalise a `ks` token or `--ksfile` value to a location.
#[must_use]
pub fn ks_location(spec: &str) -> String {
    let spec = spec.trim();
    if spec.eq_ignore_ascii_case("ks") || spec.is_empty() {
        return DEFAULT_KS_PATH.to_owned();
    }
    let spec = spec
        .get(..3)
        .filter(|head| head.eq_ignore_ascii_case("ks="))
        .map_or(spec, |_| &spec[3..]);
    if spec.starts_with('/') {
        format!("file:{spec}")
    } else {
        spec.to_owned()
    }
}

/// `X-RHN-Provisioning-MAC-N` headers for every interface with an address.
#[must_use]
pub fn mac_headers(probe: &dyn DeviceProbe) -> Vec<(String, String)> {
    probe
        .devices(DeviceClass::Network)
        .into_iter()
        .filter_map(|dev| dev.hwaddr.map(|mac| (dev.name, mac)))
        .enumerate()
        .map(|(idx, (name, mac))| {
            (
                format!("X-RHN-Provisioning-MAC-{idx}"),
                format!("{name} {mac}"),
            )
        })
        .collect()
}

fn copy_out(mounted: &Path, rel: &str, dest: &Path, location: &str) -> Result<(), KickstartError> {
    let source = mounted.join(rel.trim_start_matches('/'));
    if !source.is_file() {
        return Err(unavailable(location, format!("{rel} does not exist")));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| unavailable(location, err.to_string()))?;
    }
    fs::copy(&source, dest).map_err(|err| unavailable(location, err.to_string()))?;
    Ok(())
}

fn from_block_device(
    env: &KsFetchEnv<'_>,
    paths: &LoaderPaths,
    device: &str,
    rel: &str,
    location: &str,
) -> Result<PathBuf, KickstartError> {
    let node = paths.device_node(device);
    let guard = mount_first(env.mounts, &node, &paths.ks_mount, UPDATE_FILESYSTEMS)
        .map_err(|err| unavailable(location, err.to_string()))?
        .scratch();
    copy_out(guard.target(), rel, &paths.ks_file, location)?;
    if let Err(err) = guard.release() {
        warn!("{err}");
    }
    Ok(paths.ks_file.clone())
}

fn from_cdrom(env: &KsFetchEnv<'_>, paths: &LoaderPaths, rel: &str, location: &str) -> Result<PathBuf, KickstartError> {
    for drive in env.probe.devices(DeviceClass::Cdrom) {
        let node = paths.device_node(&drive.name);
        let guard = match mount_first(env.mounts, &node, &paths.ks_mount, &[FsType::Iso9660]) {
            Ok(guard) => guard.scratch(),
            Err(err) => {
                debug!("{}: {err}", drive.name);
                continue;
            }
        };
        let copied = copy_out(guard.target(), rel, &paths.ks_file, location);
        if let Err(err) = guard.release() {
            warn!("{err}");
        }
        if copied.is_ok() {
            return Ok(paths.ks_file.clone());
        }
    }
    Err(unavailable(location, "no disc holds the kickstart file"))
}

fn network_up(env: &mut KsFetchEnv<'_>, flags: LoaderFlags, data: &mut LoaderData, location: &str) -> Result<(), KickstartError> {
    if matches!(
        env.network.choose_interface(env.ui, flags, data),
        Status::Back | Status::Error
    ) {
        return Err(unavailable(location, "no network interface was selected"));
    }
    if matches!(
        env.network.configure(env.ui, flags, data),
        Status::Back | Status::Error
    ) {
        return Err(unavailable(location, "networking could not be configured"));
    }
    Ok(())
}

fn from_nfs(env: &KsFetchEnv<'_>, paths: &LoaderPaths, rest: &str, location: &str) -> Result<PathBuf, KickstartError> {
    let Some(MethodData::Nfs(nfs)) = parse_method_string(&format!("nfs:{rest}")) else {
        return Err(unavailable(location, "malformed nfs location"));
    };
    let (Some(host), Some(path)) = (nfs.host, nfs.directory) else {
        return Err(unavailable(location, "nfs location needs host and path"));
    };
    let path = Path::new(&path);
    let (Some(dir), Some(file)) = (path.parent(), path.file_name()) else {
        return Err(unavailable(location, "nfs location names no file"));
    };
    let spec = nfs_spec(
        &host,
        env.network.resolve(&host),
        &dir.to_string_lossy(),
        nfs.options.as_deref(),
        &paths.ks_mount,
    );
    let guard = mount_guarded(env.mounts, &spec)
        .map_err(|err| unavailable(location, err.to_string()))?
        .scratch();
    copy_out(guard.target(), &file.to_string_lossy(), &paths.ks_file, location)?;
    if let Err(err) = guard.release() {
        warn!("{err}");
    }
    Ok(paths.ks_file.clone())
}

fn retrieve(
    location: &str,
    env: &mut KsFetchEnv<'_>,
    paths: &LoaderPaths,
    flags: LoaderFlags,
    data: &mut LoaderData,
) -> Result<PathBuf, KickstartError> {
    if let Some(path) = location.strip_prefix("file:") {
        let local = paths.root.join(path.trim_start_matches('/'));
        return if local.is_file() {
            Ok(local)
        } else {
            Err(unavailable(location, "file does not exist"))
        };
    }
    if let Some(rest) = location.strip_prefix("hd:") {
        let (device, rel) = rest
            .split_once(':')
            .ok_or_else(|| unavailable(location, "expected hd:<partition>:/path"))?;
        return from_block_device(env, paths, device, rel, location);
    }
    if let Some(rest) = location.strip_prefix("bd:") {
        let (biospart, rel) = rest
            .split_once(':')
            .ok_or_else(|| unavailable(location, "expected bd:<biosdisk>p<part>:/path"))?;
        let device = resolve_biospart(env.probe, biospart)
            .ok_or_else(|| unavailable(location, format!("cannot resolve BIOS disk {biospart}")))?;
        return from_block_device(env, paths, &device, rel, location);
    }
    if let Some(rel) = location.strip_prefix("cdrom:") {
        return from_cdrom(env, paths, rel, location);
    }
    if let Some(rest) = location.strip_prefix("nfs:") {
        network_up(env, flags, data, location)?;
        return from_nfs(env, paths, rest, location);
    }
    if !is_remote(location) {
        return Err(unavailable(location, "unknown kickstart location type"));
    }
    network_up(env, flags, data, location)?;
    let headers = if flags.contains(LoaderFlags::KICKSTART_SEND_MAC) {
        mac_headers(env.probe)
    } else {
        Vec::new()
    };
    env.fetcher
        .fetch(location, None, &headers, &paths.ks_file)
        .map_err(|err| unavailable(location, err.to_string()))?;
    Ok(paths.ks_file.clone())
}

/// Retrieve the kickstart file named by `spec` and return its local path.
pub fn get_kickstart_file(
    spec: &str,
    env: &mut KsFetchEnv<'_>,
    paths: &LoaderPaths,
    flags: LoaderFlags,
    data: &mut LoaderData,
) -> Result<PathBuf, KickstartError> {
    let location = ks_location(spec);
    info!("retrieving kickstart file from {location}");
    let path = retrieve(&location, env, paths, flags, data)?;
    data.ks_file = Some(path.display().to_string());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_forms() {
        assert_eq!(ks_location("ks"), "file:/ks.cfg");
        assert_eq!(ks_location("ks=http://srv/ks.cfg"), "http://srv/ks.cfg");
        assert_eq!(ks_location("/tmp/my.ks"), "file:/tmp/my.ks");
        assert_eq!(ks_location("KS=hd:sda1:/ks.cfg"), "hd:sda1:/ks.cfg");
    }
}

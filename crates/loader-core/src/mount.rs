// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Mount primitive and scoped mount ownership for the loader.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Mount primitive and scoped mount ownership.
//!
//! A [`MountGuard`] owns exactly one mount at one target. Dropping or
//! releasing the guard unmounts it; [`MountGuard::keep`] hands the mount off
//! to the caller for good. Scratch guards also remove their mountpoint
//! directory, so a failed attempt leaves the tree as it found it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use sys_mount::{Mount, MountFlags, UnmountFlags};

use crate::error::MountError;

/// Filesystem types the loader mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsType {
    /// ext2.
    Ext2,
    /// ext3.
    Ext3,
    /// ext4.
    Ext4,
    /// FAT with long names.
    Vfat,
    /// Optical media and ISO images.
    Iso9660,
    /// NFS share.
    Nfs,
    /// Compressed stage2 image.
    Squashfs,
    /// Legacy compressed stage2 image.
    Cramfs,
}

impl FsType {
    /// Kernel filesystem name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Vfat => "vfat",
            Self::Iso9660 => "iso9660",
            Self::Nfs => "nfs",
            Self::Squashfs => "squashfs",
            Self::Cramfs => "cramfs",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hard drive partitions are tried as ext2 first, then FAT.
pub const HD_FILESYSTEMS: &[FsType] = &[FsType::Ext2, FsType::Vfat];
/// Removable media for driver disks.
pub const DRIVER_DISK_FILESYSTEMS: &[FsType] = &[FsType::Vfat, FsType::Ext2, FsType::Iso9660];
/// Update disks and images.
pub const UPDATE_FILESYSTEMS: &[FsType] = &[FsType::Ext2, FsType::Vfat, FsType::Iso9660];
/// Stage2 runtime images.
pub const STAGE2_FILESYSTEMS: &[FsType] = &[FsType::Squashfs, FsType::Cramfs];

/// One mount request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Device node, image file or `host:/dir` share.
    pub source: PathBuf,
    /// Mountpoint.
    pub target: PathBuf,
    /// Filesystem type.
    pub fstype: FsType,
    /// Mount read-only.
    pub read_only: bool,
    /// Filesystem specific option string.
    pub data: Option<String>,
}

impl MountSpec {
    /// Read-only mount of `source` on `target`.
    pub fn read_only(source: impl Into<PathBuf>, target: impl Into<PathBuf>, fstype: FsType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            fstype,
            read_only: true,
            data: None,
        }
    }

    /// Attach a filesystem specific option string.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Kernel mount interface.
pub trait MountOps {
    /// Mount `spec`; image files are attached to a loop device.
    fn mount(&self, spec: &MountSpec) -> Result<(), MountError>;

    /// Unmount whatever is mounted at `target`.
    fn unmount(&self, target: &Path) -> Result<(), MountError>;
}

/// [`MountOps`] backed by `mount(2)` via `sys-mount`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysMount;

impl MountOps for SysMount {
    fn mount(&self, spec: &MountSpec) -> Result<(), MountError> {
        let flags = if spec.read_only {
            MountFlags::RDONLY
        } else {
            MountFlags::empty()
        };
        Mount::new(
            &spec.source,
            &spec.target,
            spec.fstype.as_str(),
            flags,
            spec.data.as_deref(),
        )
        .map(drop)
        .map_err(|source| MountError::Failed {
            device: spec.source.display().to_string(),
            target: spec.target.clone(),
            fstype: spec.fstype.to_string(),
            source,
        })
    }

    fn unmount(&self, target: &Path) -> Result<(), MountError> {
        sys_mount::unmount(target, UnmountFlags::empty()).map_err(|source| MountError::Unmount {
            target: target.to_path_buf(),
            source,
        })
    }
}

/// A mount that outlives the guard that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedSource {
    /// Mountpoint.
    pub target: PathBuf,
    /// Filesystem that succeeded.
    pub fstype: FsType,
}

/// Scoped ownership of one mount.
pub struct MountGuard<'a> {
    ops: &'a dyn MountOps,
    target: PathBuf,
    fstype: FsType,
    mounted: bool,
    scratch: bool,
}

impl fmt::Debug for MountGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountGuard")
            .field("target", &self.target)
            .field("fstype", &self.fstype)
            .field("mounted", &self.mounted)
            .field("scratch", &self.scratch)
            .finish()
    }
}

impl MountGuard<'_> {
    /// Mountpoint.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Filesystem that succeeded.
    #[must_use]
    pub fn fstype(&self) -> FsType {
        self.fstype
    }

    /// Remove the mountpoint directory when the mount is released.
    #[must_use]
    pub fn scratch(mut self) -> Self {
        self.scratch = true;
        self
    }

    /// Unmount now, reporting failures.
    pub fn release(mut self) -> Result<(), MountError> {
        self.teardown()
    }

    /// Keep the mount in place after the guard is gone.
    #[must_use]
    pub fn keep(mut self) -> MountedSource {
        self.mounted = false;
        self.scratch = false;
        MountedSource {
            target: self.target.clone(),
            fstype: self.fstype,
        }
    }

    fn teardown(&mut self) -> Result<(), MountError> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;
        debug!("unmounting {}", self.target.display());
        self.ops.unmount(&self.target)?;
        if self.scratch {
            if let Err(err) = fs::remove_dir(&self.target) {
                debug!("leaving mountpoint {}: {err}", self.target.display());
            }
        }
        Ok(())
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            warn!("{err}");
        }
    }
}

fn prepare_mountpoint(target: &Path) -> Result<(), MountError> {
    fs::create_dir_all(target).map_err(|source| MountError::Mountpoint {
        target: target.to_path_buf(),
        source,
    })
}

/// Mount one spec and wrap it in a guard.
pub fn mount_guarded<'a>(ops: &'a dyn MountOps, spec: &MountSpec) -> Result<MountGuard<'a>, MountError> {
    prepare_mountpoint(&spec.target)?;
    ops.mount(spec)?;
    debug!(
        "mounted {} on {} as {}",
        spec.source.display(),
        spec.target.display(),
        spec.fstype
    );
    Ok(MountGuard {
        ops,
        target: spec.target.clone(),
        fstype: spec.fstype,
        mounted: true,
        scratch: false,
    })
}

/// Try each filesystem type in order and stop at the first that mounts.
pub fn mount_first<'a>(
    ops: &'a dyn MountOps,
    source: &Path,
    target: &Path,
    fstypes: &[FsType],
) -> Result<MountGuard<'a>, MountError> {
    for fstype in fstypes {
        let spec = MountSpec::read_only(source, target, *fstype);
        match mount_guarded(ops, &spec) {
            Ok(guard) => return Ok(guard),
            Err(err @ MountError::Mountpoint { .. }) => return Err(err),
            Err(err) => debug!("{err}"),
        }
    }
    Err(MountError::NoMatchingFilesystem {
        device: source.display().to_string(),
        tried: fstypes
            .iter()
            .map(|fstype| fstype.as_str())
            .collect::<Vec<_>>()
            .join(","),
    })
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Stage the second-stage runtime image and its companion images.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Second-stage runtime staging.
//!
//! Every helper here either finishes with the runtime mounted and verified
//! or leaves no mount behind. Copies into the RAM-backed directory are
//! removed again when the copied image turns out to be unusable.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{LoaderPaths, MemoryConfig};
use crate::error::StageError;
use crate::mount::{mount_first, FsType, MountOps, MountedSource, STAGE2_FILESYSTEMS, UPDATE_FILESYSTEMS};
use crate::product::{compare_stamp, ProductInfo, StampCheck};

/// Full runtime image name.
pub const STAGE2_IMAGE: &str = "stage2.img";
/// Reduced runtime image used on low-memory machines.
pub const SMALL_STAGE2_IMAGE: &str = "hdstg2.img";
/// Updates image shipped inside install trees.
pub const UPDATES_IMAGE: &str = "updates.img";
/// Product image shipped inside install trees.
pub const PRODUCT_IMAGE: &str = "product.img";

/// Directories relinked from the runtime image into the live root.
pub const RUNTIME_DIRECTORIES: &[&str] = &["usr", "lib", "lib64"];

/// Loop-mount `image` at `runtime` and verify its stamp.
///
/// On any outcome other than an identical stamp the image is unmounted and
/// [`StageError::Mismatch`] is returned.
pub fn mount_stage2(
    mounts: &dyn MountOps,
    product: &ProductInfo,
    image: &Path,
    runtime: &Path,
) -> Result<MountedSource, StageError> {
    if !image.is_file() {
        return Err(StageError::Missing(image.to_path_buf()));
    }
    let guard = mount_first(mounts, image, runtime, STAGE2_FILESYSTEMS)?;
    match compare_stamp(product, runtime) {
        StampCheck::Match => {
            info!("runtime {} mounted as {}", image.display(), guard.fstype());
            Ok(guard.keep())
        }
        check => {
            warn!("runtime {} rejected: stamp {check:?}", image.display());
            if let Err(err) = guard.release() {
                warn!("{err}");
            }
            Err(StageError::Mismatch(image.to_path_buf()))
        }
    }
}

/// First `*.iso` in `dir`, by name, whose product tree holds a runtime image.
///
/// Each candidate is loop-mounted at `scratch` and released again before the
/// next one is tried.
pub fn valid_iso_images(
    mounts: &dyn MountOps,
    product: &ProductInfo,
    dir: &Path,
    scratch: &Path,
) -> Option<PathBuf> {
    let candidates = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("iso"))
        });

    for iso in candidates {
        let guard = match mount_first(mounts, &iso, scratch, &[FsType::Iso9660]) {
            Ok(guard) => guard.scratch(),
            Err(err) => {
                debug!("skipping {}: {err}", iso.display());
                continue;
            }
        };
        let base = product.base_dir(scratch);
        let usable = base.join(STAGE2_IMAGE).is_file() || base.join(SMALL_STAGE2_IMAGE).is_file();
        if let Err(err) = guard.release() {
            warn!("{err}");
        }
        if usable {
            info!("using install images from {}", iso.display());
            return Some(iso);
        }
        debug!("{} holds no runtime image", iso.display());
    }
    None
}

/// Copy the tree under `from` into `to`, recreating symlinks; returns the
/// number of regular files copied.
pub fn copy_directory(from: &Path, to: &Path) -> io::Result<u64> {
    let mut copied = 0;
    fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest = to.join(relative);
        let kind = entry.file_type();
        if kind.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if kind.is_symlink() {
            let link = fs::read_link(entry.path())?;
            match symlink(&link, &dest) {
                Err(err) if err.kind() != io::ErrorKind::AlreadyExists => return Err(err),
                _ => {}
            }
        } else {
            fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Loop-mount `image` at `scratch` and copy its contents into `dest`.
///
/// Returns `Ok(false)` when `image` does not exist.
pub fn unpack_image(
    mounts: &dyn MountOps,
    image: &Path,
    scratch: &Path,
    dest: &Path,
) -> Result<bool, StageError> {
    if !image.is_file() {
        return Ok(false);
    }
    let guard = mount_first(mounts, image, scratch, UPDATE_FILESYSTEMS)?.scratch();
    let copied = copy_directory(guard.target(), dest).map_err(|source| StageError::Io {
        path: image.to_path_buf(),
        source,
    })?;
    guard.release()?;
    info!("unpacked {copied} files from {} into {}", image.display(), dest.display());
    Ok(true)
}

/// Unpack an `updates.img` into the updates directory, logging failures.
pub fn copy_updates_img(mounts: &dyn MountOps, paths: &LoaderPaths, image: &Path) -> bool {
    match unpack_image(mounts, image, &paths.update_disk, &paths.updates) {
        Ok(found) => found,
        Err(err) => {
            error!("updates image {}: {err}", image.display());
            false
        }
    }
}

/// Unpack a `product.img` into the product directory, logging failures.
pub fn copy_product_img(mounts: &dyn MountOps, paths: &LoaderPaths, image: &Path) -> bool {
    match unpack_image(mounts, image, &paths.update_disk, &paths.product) {
        Ok(found) => found,
        Err(err) => {
            error!("product image {}: {err}", image.display());
            false
        }
    }
}

/// Runtime image names to try, preferred first.
#[must_use]
pub fn stage2_candidates(memory: &MemoryConfig, total_kb: Option<u64>) -> [&'static str; 2] {
    match total_kb {
        Some(kb) if kb < memory.small_stage2_below_kb => [SMALL_STAGE2_IMAGE, STAGE2_IMAGE],
        _ => [STAGE2_IMAGE, SMALL_STAGE2_IMAGE],
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), StageError> {
    let result = to
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::copy(from, to).map(drop));
    result.map_err(|source| {
        if let Err(err) = fs::remove_file(to) {
            debug!("no partial copy to remove at {}: {err}", to.display());
        }
        StageError::Io {
            path: from.to_path_buf(),
            source,
        }
    })
}

/// Stage the runtime from the install tree mounted at `prefix`.
///
/// Copies `updates.img` and `product.img` from the tree, copies the runtime
/// image into RAM and loop-mounts the copy at the runtime mountpoint.
pub fn load_hd_images(
    mounts: &dyn MountOps,
    product: &ProductInfo,
    paths: &LoaderPaths,
    memory: &MemoryConfig,
    total_kb: Option<u64>,
    prefix: &Path,
) -> Result<MountedSource, StageError> {
    let base = product.base_dir(prefix);
    let Some(name) = stage2_candidates(memory, total_kb)
        .into_iter()
        .find(|name| base.join(name).is_file())
    else {
        return Err(StageError::Missing(base.join(STAGE2_IMAGE)));
    };

    copy_updates_img(mounts, paths, &base.join(UPDATES_IMAGE));
    copy_product_img(mounts, paths, &base.join(PRODUCT_IMAGE));

    let staged = paths.ramfs.join(name);
    info!("copying {} into {}", base.join(name).display(), staged.display());
    copy_file(&base.join(name), &staged)?;

    mount_stage2(mounts, product, &staged, &paths.runtime).map_err(|err| {
        if let Err(rm) = fs::remove_file(&staged) {
            warn!("cannot remove {}: {rm}", staged.display());
        }
        err
    })
}

/// Replace `root/name` with a symlink into the mounted runtime.
///
/// An existing directory is renamed to `<name>_old`; an existing symlink is
/// replaced. Returns false when the runtime carries no such directory.
pub fn migrate_runtime_directory(runtime: &Path, root: &Path, name: &str) -> io::Result<bool> {
    let staged = runtime.join(name);
    if !staged.is_dir() {
        return Ok(false);
    }
    let live = root.join(name);
    match fs::symlink_metadata(&live) {
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(&live)?,
        Ok(_) => fs::rename(&live, root.join(format!("{name}_old")))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    symlink(&staged, &live)?;
    debug!("{} now points at {}", live.display(), staged.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::MountError;
    use crate::mount::MountSpec;
    use crate::product::STAMP_FILE;

    const STAMP: &str = "200701011200.x86_64\nFedora\n7\nFedora\n";

    /// Image files hold the path of the directory they expose when mounted.
    #[derive(Default)]
    struct TreeMount {
        mounted: RefCell<Vec<PathBuf>>,
    }

    impl MountOps for TreeMount {
        fn mount(&self, spec: &MountSpec) -> Result<(), MountError> {
            let tree = PathBuf::from(fs::read_to_string(&spec.source).unwrap_or_default());
            if !tree.is_dir() {
                return Err(MountError::Failed {
                    device: spec.source.display().to_string(),
                    target: spec.target.clone(),
                    fstype: spec.fstype.to_string(),
                    source: io::Error::from_raw_os_error(libc::EINVAL),
                });
            }
            copy_directory(&tree, &spec.target).map_err(|source| MountError::Mountpoint {
                target: spec.target.clone(),
                source,
            })?;
            self.mounted.borrow_mut().push(spec.target.clone());
            Ok(())
        }

        fn unmount(&self, target: &Path) -> Result<(), MountError> {
            let map = |source| MountError::Unmount {
                target: target.to_path_buf(),
                source,
            };
            fs::remove_dir_all(target).map_err(map)?;
            fs::create_dir(target).map_err(map)?;
            self.mounted.borrow_mut().retain(|path| path != target);
            Ok(())
        }
    }

    fn image(dir: &Path, name: &str, stamp: Option<&str>) -> PathBuf {
        let path = dir.join(name);
        let tree = dir.join(format!("{name}.tree"));
        fs::create_dir_all(&tree).expect("mkdir tree");
        fs::write(&path, tree.display().to_string()).expect("write image");
        if let Some(stamp) = stamp {
            fs::write(tree.join(STAMP_FILE), stamp).expect("write stamp");
        }
        path
    }

    #[test]
    fn matching_runtime_stays_mounted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mounts = TreeMount::default();
        let img = image(dir.path(), "stage2.img", Some(STAMP));
        let runtime = dir.path().join("runtime");
        let product = ProductInfo::parse(STAMP);
        let kept = mount_stage2(&mounts, &product, &img, &runtime).expect("mounted");
        assert_eq!(kept.target, runtime);
        assert_eq!(mounts.mounted.borrow().len(), 1);
    }

    #[test]
    fn mismatched_runtime_is_released() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mounts = TreeMount::default();
        let img = image(dir.path(), "stage2.img", Some("199901010000.i386\n"));
        let product = ProductInfo::parse(STAMP);
        let err = mount_stage2(&mounts, &product, &img, &dir.path().join("runtime"))
            .expect_err("mismatch");
        assert!(matches!(err, StageError::Mismatch(_)));
        assert!(mounts.mounted.borrow().is_empty());
    }

    #[test]
    fn low_memory_prefers_small_image() {
        let memory = MemoryConfig::default();
        assert_eq!(stage2_candidates(&memory, Some(96_000))[0], SMALL_STAGE2_IMAGE);
        assert_eq!(stage2_candidates(&memory, Some(512_000))[0], STAGE2_IMAGE);
        assert_eq!(stage2_candidates(&memory, None)[0], STAGE2_IMAGE);
    }

    #[test]
    fn iso_scan_skips_images_without_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let isos = dir.path().join("isos");
        fs::create_dir_all(&isos).expect("mkdir");
        image(&isos, "a-disc2.iso", None);
        let good = image(&isos, "b-disc1.iso", None);
        let base = isos.join("b-disc1.iso.tree/Fedora/base");
        fs::create_dir_all(&base).expect("mkdir");
        fs::write(base.join(STAGE2_IMAGE), b"img").expect("write");

        let mounts = TreeMount::default();
        let product = ProductInfo::parse(STAMP);
        let found = valid_iso_images(&mounts, &product, &isos, &dir.path().join("loop"));
        assert_eq!(found, Some(good));
        assert!(mounts.mounted.borrow().is_empty());
    }

    #[test]
    fn hd_images_are_copied_to_ram_and_mounted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = LoaderPaths::rooted(dir.path());
        let tree = dir.path().join("tree");
        let base = tree.join("Fedora/base");
        fs::create_dir_all(&base).expect("mkdir");
        image(&base, SMALL_STAGE2_IMAGE, Some(STAMP));
        let updates = image(&base, UPDATES_IMAGE, None);
        fs::write(PathBuf::from(format!("{}.tree/fix.py", updates.display())), b"pass")
            .expect("write");

        let mounts = TreeMount::default();
        let product = ProductInfo::parse(STAMP);
        let kept = load_hd_images(
            &mounts,
            &product,
            &paths,
            &MemoryConfig::default(),
            Some(1_000_000),
            &tree,
        )
        .expect("staged");
        assert_eq!(kept.target, paths.runtime);
        assert!(paths.ramfs.join(SMALL_STAGE2_IMAGE).is_file());
        assert!(paths.updates.join("fix.py").is_file());
        assert!(!paths.update_disk.exists());
    }

    #[test]
    fn rejected_copy_is_removed_from_ram() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = LoaderPaths::rooted(dir.path());
        let tree = dir.path().join("tree");
        let base = tree.join("Fedora/base");
        fs::create_dir_all(&base).expect("mkdir");
        image(&base, STAGE2_IMAGE, Some("199901010000.i386\n"));

        let mounts = TreeMount::default();
        let err = load_hd_images(
            &mounts,
            &ProductInfo::parse(STAMP),
            &paths,
            &MemoryConfig::default(),
            None,
            &tree,
        )
        .expect_err("mismatch");
        assert!(matches!(err, StageError::Mismatch(_)));
        assert!(!paths.ramfs.join(STAGE2_IMAGE).exists());
    }

    #[test]
    fn migrated_directory_becomes_symlink() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = dir.path().join("runtime");
        let root = dir.path().join("root");
        fs::create_dir_all(runtime.join("usr")).expect("mkdir");
        fs::create_dir_all(root.join("usr")).expect("mkdir");
        assert!(migrate_runtime_directory(&runtime, &root, "usr").expect("migrate"));
        assert!(fs::symlink_metadata(root.join("usr"))
            .expect("meta")
            .file_type()
            .is_symlink());
        assert!(root.join("usr_old").is_dir());
        assert!(!migrate_runtime_directory(&runtime, &root, "lib").expect("absent"));
    }
}

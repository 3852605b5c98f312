// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Read the boot media build stamp and compare install trees against it.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Build stamp handling.
//!
//! The stamp file holds four lines: a stamp of the form
//! `<timestamp>.<arch>`, the product name, the product version and the
//! directory holding the product's images inside an install tree.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Stamp file name inside an install tree or runtime image.
pub const STAMP_FILE: &str = ".buildstamp";

const DEFAULT_PRODUCT: &str = "anaconda";
const UNKNOWN_ARCH: &str = "unknown architecture";

/// Product identity of the running boot media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    /// Raw stamp line, absent when the boot media carries no stamp.
    pub stamp: Option<String>,
    /// Product name.
    pub name: String,
    /// Product version.
    pub version: String,
    /// Directory inside install trees holding `base/`.
    pub path: String,
    /// Architecture suffix of the stamp.
    pub arch: String,
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            stamp: None,
            name: DEFAULT_PRODUCT.to_owned(),
            version: String::new(),
            path: DEFAULT_PRODUCT.to_owned(),
            arch: UNKNOWN_ARCH.to_owned(),
        }
    }
}

impl ProductInfo {
    /// Parse stamp file contents.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut lines = text.lines().map(str::trim_end);
        let stamp = lines.next().filter(|line| !line.is_empty());
        let Some(stamp) = stamp else {
            return Self::default();
        };
        let arch = stamp
            .split_once('.')
            .map(|(_, arch)| arch.trim().to_owned())
            .filter(|arch| !arch.is_empty())
            .unwrap_or_else(|| UNKNOWN_ARCH.to_owned());
        let name = lines.next().unwrap_or(DEFAULT_PRODUCT).to_owned();
        let version = lines.next().unwrap_or_default().to_owned();
        let path = lines
            .next()
            .filter(|line| !line.is_empty())
            .unwrap_or(DEFAULT_PRODUCT)
            .to_owned();
        Self {
            stamp: Some(stamp.to_owned()),
            name,
            version,
            path,
            arch,
        }
    }

    /// Load the running media's stamp; a missing file yields defaults.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) => {
                debug!("no build stamp at {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// `<root>/<product path>/base`.
    #[must_use]
    pub fn base_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.path).join("base")
    }

    /// Location of the stage2 image inside an install tree.
    #[must_use]
    pub fn stage2_image(&self, root: &Path) -> PathBuf {
        self.base_dir(root).join("stage2.img")
    }
}

/// Result of comparing a mounted tree's stamp with the boot media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampCheck {
    /// Stamps are identical.
    Match,
    /// Both stamps exist and differ.
    Mismatch,
    /// One of the stamps is missing.
    Absent,
}

impl StampCheck {
    /// Only an identical stamp is accepted; absence counts as a mismatch.
    #[must_use]
    pub fn accepted(self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Compare the stamp under `mounted_root` with the running media.
#[must_use]
pub fn compare_stamp(running: &ProductInfo, mounted_root: &Path) -> StampCheck {
    let Some(expected) = running.stamp.as_deref() else {
        warn!("boot media has no build stamp; cannot verify {}", mounted_root.display());
        return StampCheck::Absent;
    };
    let candidate = mounted_root.join(STAMP_FILE);
    let text = match fs::read_to_string(&candidate) {
        Ok(text) => text,
        Err(err) => {
            debug!("no stamp at {}: {err}", candidate.display());
            return StampCheck::Absent;
        }
    };
    match text.lines().next().map(str::trim_end) {
        Some(found) if found == expected => StampCheck::Match,
        Some(found) => {
            debug!("stamp {found} does not match {expected}");
            StampCheck::Mismatch
        }
        None => StampCheck::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAMP: &str = "200701011200.x86_64\nFedora\n7\nFedora\n";

    #[test]
    fn parses_all_fields() {
        let info = ProductInfo::parse(STAMP);
        assert_eq!(info.stamp.as_deref(), Some("200701011200.x86_64"));
        assert_eq!(info.arch, "x86_64");
        assert_eq!(info.name, "Fedora");
        assert_eq!(info.version, "7");
        assert_eq!(info.path, "Fedora");
    }

    #[test]
    fn empty_stamp_falls_back_to_defaults() {
        let info = ProductInfo::parse("");
        assert_eq!(info, ProductInfo::default());
        assert_eq!(info.name, "anaconda");
    }

    #[test]
    fn three_outcomes_are_distinct() {
        let running = ProductInfo::parse(STAMP);
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(compare_stamp(&running, dir.path()), StampCheck::Absent);

        fs::write(dir.path().join(STAMP_FILE), "199901010000.i386\nOther\n").expect("write");
        assert_eq!(compare_stamp(&running, dir.path()), StampCheck::Mismatch);

        fs::write(dir.path().join(STAMP_FILE), STAMP).expect("write");
        assert_eq!(compare_stamp(&running, dir.path()), StampCheck::Match);
        assert!(!StampCheck::Absent.accepted());
    }

    #[test]
    fn stage2_lives_under_product_base() {
        let info = ProductInfo::parse(STAMP);
        assert_eq!(
            info.stage2_image(Path::new("/mnt/source")),
            PathBuf::from("/mnt/source/Fedora/base/stage2.img")
        );
    }
}

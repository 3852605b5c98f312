// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Offer an embedded-checksum verification of discovered install media.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Media integrity checks.

use std::path::Path;
use std::process::Command;

use log::{info, warn};

use crate::flags::LoaderFlags;
use crate::ui::Ui;

/// Outcome of verifying one image or disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The embedded checksum matched.
    Passed,
    /// The embedded checksum did not match.
    Failed,
    /// The media carries no checksum or the check could not run.
    Unavailable,
}

/// Verifies the checksum embedded in an ISO image or disc.
pub trait MediaVerifier {
    /// Check `media`, a device node or image file.
    fn verify(&self, media: &Path) -> Verdict;
}

/// [`MediaVerifier`] running `checkisomd5`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckIsoMd5;

impl MediaVerifier for CheckIsoMd5 {
    fn verify(&self, media: &Path) -> Verdict {
        match Command::new("checkisomd5").arg("--verbose").arg(media).status() {
            Ok(status) => match status.code() {
                Some(0) => Verdict::Passed,
                Some(1) => Verdict::Failed,
                _ => Verdict::Unavailable,
            },
            Err(err) => {
                warn!("checkisomd5 {}: {err}", media.display());
                Verdict::Unavailable
            }
        }
    }
}

/// Ask whether to verify `media` and report the verdict. Does nothing
/// unless `mediacheck` was requested.
pub fn query_media_check(
    ui: &mut dyn Ui,
    flags: LoaderFlags,
    verifier: &dyn MediaVerifier,
    media: &Path,
) -> Option<Verdict> {
    if !flags.contains(LoaderFlags::MEDIACHECK) || !ui.is_interactive() {
        return None;
    }
    let name = media.display().to_string();
    if !ui.confirm(
        "Media Check",
        &format!(
            "Would you like to check the integrity of {name} before installing?  \
             Choose \"Test\" to check it now or \"Skip\" to continue."
        ),
        "Test",
        "Skip",
    ) {
        return None;
    }
    ui.status(&format!("Checking {name}..."));
    let verdict = verifier.verify(media);
    info!("media check of {name}: {verdict:?}");
    let text = match verdict {
        Verdict::Passed => format!("The media check of {name} is complete, and the result is: PASS."),
        Verdict::Failed => format!(
            "The media check of {name} is complete, and the result is: FAIL.  \
             It is not recommended that you use this media for installation."
        ),
        Verdict::Unavailable => {
            format!("Unable to read the embedded checksum of {name}; the media was not checked.")
        }
    };
    ui.message("Media Check Result", &text);
    Some(verdict)
}

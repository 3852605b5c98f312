// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Debug shell on a spare virtual terminal and the run marker.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Debug shell and the run marker that guards against re-entry.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use log::{info, warn};
use loader_core::LoaderFlags;

/// Terminal the debug shell is attached to.
pub const SHELL_TTY: &str = "/dev/tty2";

/// True when the run marker from an earlier start is present.
#[must_use]
pub fn already_ran(marker: &Path) -> bool {
    marker.exists()
}

/// Create the run marker so a restarted loader drops to a shell instead.
pub fn mark_running(marker: &Path) -> io::Result<()> {
    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().write(true).create(true).truncate(true).open(marker)?;
    Ok(())
}

/// Replace the process with an interactive shell. Only returns on failure.
pub fn exec_shell(shell: &Path) -> io::Error {
    Command::new(shell).exec()
}

/// Whether a debug shell may be spawned under `flags`.
#[must_use]
pub fn shell_allowed(flags: LoaderFlags) -> bool {
    !flags.intersects(LoaderFlags::SERIAL | LoaderFlags::NOSHELL | LoaderFlags::TESTING)
}

/// Start `shell` on `tty` in the background.
pub fn spawn_debug_shell(flags: LoaderFlags, shell: &Path, tty: &Path) -> Option<Child> {
    if !shell_allowed(flags) {
        return None;
    }
    let open = || OpenOptions::new().read(true).write(true).open(tty);
    let stdio = (open(), open(), open());
    let (Ok(stdin), Ok(stdout), Ok(stderr)) = stdio else {
        warn!("cannot open {} for the debug shell", tty.display());
        return None;
    };
    match Command::new(shell)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .env("TERM", "linux")
        .spawn()
    {
        Ok(child) => {
            info!("debug shell started on {} as pid {}", tty.display(), child.id());
            Some(child)
        }
        Err(err) => {
            warn!("cannot start {}: {err}", shell.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_and_noshell_suppress_the_shell() {
        assert!(shell_allowed(LoaderFlags::GRAPHICAL));
        assert!(!shell_allowed(LoaderFlags::SERIAL));
        assert!(!shell_allowed(LoaderFlags::NOSHELL | LoaderFlags::TEXT));
    }

    #[test]
    fn marker_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("var/run/loader.run");
        assert!(!already_ran(&marker));
        mark_running(&marker).expect("mark");
        assert!(already_ran(&marker));
    }
}

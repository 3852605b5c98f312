// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bounded buffer of arguments forwarded to the installer.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Bounded buffer of arguments forwarded to the installer.

use log::warn;

/// Slots in the extra-argument table, including the terminator slot.
pub const EXTRA_ARGS_CAPACITY: usize = 128;

/// Append-only list of installer arguments collected from the command line.
///
/// One slot is reserved for the terminator the installer's argument table
/// has always carried, so at most `EXTRA_ARGS_CAPACITY - 1` arguments are
/// stored. Later pushes are dropped and a single warning is logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraArgs {
    args: Vec<String>,
    dropped: usize,
}

impl ExtraArgs {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of arguments kept.
    #[must_use]
    pub const fn limit() -> usize {
        EXTRA_ARGS_CAPACITY - 1
    }

    /// Append an argument; returns false when the buffer is full.
    pub fn push(&mut self, arg: impl Into<String>) -> bool {
        if self.args.len() >= Self::limit() {
            if self.dropped == 0 {
                warn!(
                    "Too many command line arguments (max allowed is {}), rest will be dropped.",
                    EXTRA_ARGS_CAPACITY
                );
            }
            self.dropped += 1;
            return false;
        }
        self.args.push(arg.into());
        true
    }

    /// Stored arguments in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    /// Number of stored arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// True when nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Number of arguments discarded after the buffer filled.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// True when a VNC option was forwarded.
    #[must_use]
    pub fn requests_vnc(&self) -> bool {
        self.args
            .iter()
            .any(|arg| arg.get(..5).is_some_and(|head| head.eq_ignore_ascii_case("--vnc")))
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error types shared by the loader core.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Error types shared by the loader core.
//!
//! Recoverable conditions never leave the component that hit them: mounters
//! and driver checks convert these errors into a [`crate::Status`] or a
//! state-machine event before returning. Only [`LoaderError`] crosses the
//! top-level state machine, and every variant of it is fatal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal loader failures surfaced to the process entry point.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The machine has less memory than the installer needs.
    #[error("not enough memory to install {product}: {available_kb} KB available, {required_kb} KB required")]
    InsufficientMemory {
        /// Product name shown to the user.
        product: String,
        /// Memory reported by the kernel.
        available_kb: u64,
        /// Configured lower bound.
        required_kb: u64,
    },
    /// A binary the loader depends on is missing.
    #[error("required executable {0} was not found")]
    MissingExecutable(String),
    /// Interactive input was required while running without a UI.
    #[error("cannot continue non-interactively: {0}")]
    NonInteractive(String),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// I/O failure on a path the loader cannot continue without.
    #[error("{action} {path}: {source}")]
    Io {
        /// What the loader was doing.
        action: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl LoaderError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Failures reported by the mount primitive.
#[derive(Debug, Error)]
pub enum MountError {
    /// The kernel rejected the mount request.
    #[error("failed to mount {device} on {target} as {fstype}: {source}")]
    Failed {
        /// Device, image or share being mounted.
        device: String,
        /// Mountpoint.
        target: PathBuf,
        /// Filesystem type requested.
        fstype: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The share could not be reached over the network.
    #[error("network failure while mounting {device}: {reason}")]
    Network {
        /// Share being mounted.
        device: String,
        /// Human-readable reason.
        reason: String,
    },
    /// No candidate filesystem type mounted the device.
    #[error("no filesystem among [{tried}] could mount {device}")]
    NoMatchingFilesystem {
        /// Device being mounted.
        device: String,
        /// Comma separated list of attempted types.
        tried: String,
    },
    /// The mountpoint could not be prepared.
    #[error("cannot prepare mountpoint {target}: {source}")]
    Mountpoint {
        /// Mountpoint.
        target: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Unmount failed.
    #[error("failed to unmount {target}: {source}")]
    Unmount {
        /// Mountpoint.
        target: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl MountError {
    /// Return true when the failure points at the network rather than the
    /// share parameters.
    #[must_use]
    pub fn is_network(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Failed { source, .. } => is_network_errno(source),
            _ => false,
        }
    }
}

pub(crate) fn is_network_errno(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ETIMEDOUT)
            | Some(libc::EHOSTUNREACH)
            | Some(libc::ENETUNREACH)
            | Some(libc::ECONNREFUSED)
            | Some(libc::EHOSTDOWN)
            | Some(libc::ENETDOWN)
    ) || matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::ConnectionRefused
    )
}

/// Failures while staging the second-stage runtime.
#[derive(Debug, Error)]
pub enum StageError {
    /// No runtime image exists at the expected location.
    #[error("no runtime image at {0}")]
    Missing(PathBuf),
    /// The image could not be mounted.
    #[error(transparent)]
    Mount(#[from] MountError),
    /// The image belongs to different boot media.
    #[error("runtime image {0} does not match the boot media")]
    Mismatch(PathBuf),
    /// Copying the image or its companions failed.
    #[error("failed to copy {path}: {source}")]
    Io {
        /// Path being copied.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Failures while retrieving a file over HTTP or FTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed or uses an unsupported scheme.
    #[error("unsupported or malformed url {0}")]
    InvalidUrl(String),
    /// The server could not be reached.
    #[error("cannot reach {url}: {reason}")]
    Connect {
        /// URL being fetched.
        url: String,
        /// Human-readable reason.
        reason: String,
    },
    /// The server answered with an error.
    #[error("{url} returned {status}")]
    Status {
        /// URL being fetched.
        url: String,
        /// Status code or FTP reply line.
        status: String,
    },
    /// Writing the downloaded file failed.
    #[error("failed writing {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// Return true when the failure points at the network rather than the URL.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

/// Failures while loading the loader configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Configuration path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid TOML for the schema.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Configuration path.
        path: PathBuf,
        /// TOML decoder error.
        #[source]
        source: toml::de::Error,
    },
}

/// Failures while reading or applying kickstart directives.
#[derive(Debug, Error)]
pub enum KickstartError {
    /// A method or network directive carried options it does not accept.
    #[error("Bad argument to {command} kickstart method command: {message}")]
    BadOption {
        /// Directive name.
        command: String,
        /// Parser message.
        message: String,
    },
    /// A directive line could not be split into words.
    #[error("line {line}: {message}")]
    Syntax {
        /// One-based line number.
        line: usize,
        /// Tokenizer message.
        message: String,
    },
    /// The kickstart location could not be retrieved.
    #[error("cannot retrieve kickstart file from {location}: {reason}")]
    Unavailable {
        /// `ks=` location.
        location: String,
        /// Human-readable reason.
        reason: String,
    },
    /// The kickstart file could not be read.
    #[error("failed to read kickstart file {path}: {source}")]
    Read {
        /// Kickstart path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Failures raised while loading kernel modules.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module is on the blacklist.
    #[error("module {0} is blacklisted")]
    Blacklisted(String),
    /// The helper binary exited unsuccessfully.
    #[error("{program} {module} failed: {detail}")]
    Command {
        /// Helper binary.
        program: &'static str,
        /// Module name or path.
        module: String,
        /// Exit status or spawn error.
        detail: String,
    },
}

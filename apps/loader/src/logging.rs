// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: env_logger setup for the loader binary.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Logging setup.

use std::fs::OpenOptions;
use std::path::Path;

use env_logger::{Env, Target};
use log::LevelFilter;

/// Map an installer `loglevel=` name to a filter.
#[must_use]
pub fn level_for(name: &str) -> Option<LevelFilter> {
    match name.to_ascii_lowercase().as_str() {
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warning" | "warn" => Some(LevelFilter::Warn),
        "error" | "critical" => Some(LevelFilter::Error),
        _ => None,
    }
}

/// Install the global logger. Records go to `log_file` when it can be
/// opened, otherwise to stderr. `RUST_LOG` overrides the default level.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    if let Some(path) = log_file {
        if let Ok(file) = OpenOptions::new().create(true).append(true).open(path) {
            builder.target(Target::Pipe(Box::new(file)));
        }
    }
    let _ = builder.try_init();
}

/// Lower the global level once `loglevel=` has been parsed.
pub fn apply_level(name: Option<&str>) {
    if let Some(level) = name.and_then(level_for) {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installer_level_names() {
        assert_eq!(level_for("DEBUG"), Some(LevelFilter::Debug));
        assert_eq!(level_for("warning"), Some(LevelFilter::Warn));
        assert_eq!(level_for("critical"), Some(LevelFilter::Error));
        assert_eq!(level_for("loud"), None);
    }
}

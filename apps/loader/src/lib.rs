// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Console front end and process plumbing for the installer loader binary.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Console front end and process plumbing for the installer loader binary.

pub mod console;
pub mod logging;
pub mod shell;

pub use console::ConsoleUi;

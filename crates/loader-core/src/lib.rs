// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Install-source acquisition core for the installer second-stage loader.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Install-source acquisition core for the installer second-stage loader.
//!
//! The loader runs inside the initial ramdisk. It works out where the
//! installer runtime lives (disc, hard drive ISO images, NFS or an HTTP/FTP
//! tree), loads whatever drivers are missing to reach it, stages the
//! runtime image under the runtime mountpoint and finally hands off to the
//! installer with a normalised source location.
//!
//! Every host interaction sits behind a trait ([`Ui`], [`mount::MountOps`],
//! [`probe::DeviceProbe`], [`driver::DriverService`],
//! [`network::NetworkService`], [`locale::LocaleService`],
//! [`fetch::Fetcher`], [`mediacheck::MediaVerifier`]) so the state machines
//! can be driven against a temporary directory in tests.

pub mod cmdline;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod extra_args;
pub mod fetch;
pub mod flags;
pub mod fsm;
pub mod handoff;
pub mod kickstart;
pub mod ksfetch;
pub mod loader;
pub mod locale;
pub mod mediacheck;
pub mod methods;
pub mod modules;
pub mod mount;
pub mod network;
pub mod probe;
pub mod product;
pub mod stage2;
pub mod ui;
pub mod updates;

pub use config::{LoaderConfig, LoaderPaths};
pub use data::{DeviceClass, LoaderData, Location, MethodData, MethodKind, Status};
pub use error::LoaderError;
pub use flags::LoaderFlags;
pub use handoff::{build_handoff, Handoff};
pub use loader::{finish_session, prepare_session, run_loader_main, LoaderContext, Services};
pub use product::ProductInfo;
pub use ui::{HeadlessUi, Ui};

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fetch the runtime image from an HTTP or FTP install tree.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! HTTP and FTP install source.

use std::fs;
use std::path::Path;

use log::{debug, error, info, warn};

use super::nfs::{mismatch_message, no_tree_message, server_prompt};
use super::{prompt_params, run_network_mounter, NetworkSource};
use crate::config::LoaderPaths;
use crate::data::{LoaderData, Location, MethodData, MethodKind, Status, UrlSource};
use crate::error::{FetchError, LoaderError, StageError};
use crate::fetch::{is_remote, Fetcher};
use crate::flags::LoaderFlags;
use crate::fsm::NetEvent;
use crate::loader::{LoaderContext, Services};
use crate::mount::MountOps;
use crate::product::ProductInfo;
use crate::stage2::{copy_product_img, copy_updates_img, mount_stage2, PRODUCT_IMAGE, STAGE2_IMAGE, UPDATES_IMAGE};
use crate::ui::{EntryField, Ui};

/// Ask for the tree URL and an optional proxy.
pub fn prompt_url(ui: &mut dyn Ui, product: &ProductInfo, draft: &mut MethodData) -> Status {
    let current = match draft {
        MethodData::Url(url) => url.clone(),
        _ => UrlSource::default(),
    };
    let mut fields = [
        EntryField::new("URL:", current.url.as_deref()),
        EntryField::new("Proxy (optional):", current.proxy.as_deref()),
    ];
    if !ui.entries("URL Setup", &server_prompt("FTP or HTTP", product), &mut fields) {
        return Status::Back;
    }
    *draft = MethodData::Url(UrlSource {
        url: fields[0].filled(),
        proxy: fields[1].filled(),
    });
    Status::Ok
}

/// `base/<product path>/base/<name>` with exactly one slash at the join.
#[must_use]
pub fn tree_file_url(base: &str, product: &ProductInfo, name: &str) -> String {
    format!("{}/{}/base/{name}", base.trim_end_matches('/'), product.path)
}

fn fetch_optional(fetcher: &dyn Fetcher, url: &str, proxy: Option<&str>, dest: &Path) -> bool {
    match fetcher.fetch(url, proxy, &[], dest) {
        Ok(bytes) => {
            debug!("fetched {bytes} bytes from {url}");
            true
        }
        Err(err) => {
            debug!("no {url}: {err}");
            false
        }
    }
}

type CompanionCopy = fn(&dyn MountOps, &LoaderPaths, &Path) -> bool;

struct UrlMounter {
    draft: MethodData,
}

fn url_target(draft: &MethodData) -> Option<(&str, Option<&str>)> {
    match draft {
        MethodData::Url(UrlSource {
            url: Some(url),
            proxy,
        }) if is_remote(url) => Some((url, proxy.as_deref())),
        _ => None,
    }
}

impl UrlMounter {
    fn target(&self) -> Option<(&str, Option<&str>)> {
        url_target(&self.draft)
    }
}

impl NetworkSource for UrlMounter {
    fn label(&self) -> &'static str {
        "url"
    }

    fn params(
        &mut self,
        svc: &mut Services<'_>,
        ctx: &LoaderContext,
        data: &mut LoaderData,
    ) -> Result<NetEvent, LoaderError> {
        if let Some(MethodData::Url(pinned)) = data.method.as_ref() {
            info!("url is {:?}", pinned.url);
            self.draft = MethodData::Url(pinned.clone());
            if self.target().is_some() {
                return Ok(NetEvent::Status(Status::Ok));
            }
            warn!("missing or unsupported url specification");
            if !svc.ui.is_interactive() {
                return Err(LoaderError::NonInteractive(
                    "url method needs an http, https or ftp location".to_owned(),
                ));
            }
            return Ok(NetEvent::Incomplete);
        }
        if !svc.ui.is_interactive() {
            return Err(LoaderError::NonInteractive("no install URL was specified".to_owned()));
        }
        Ok(NetEvent::Status(prompt_params(
            MethodKind::Url,
            svc,
            &ctx.product,
            &mut self.draft,
            |draft| url_target(draft).is_some(),
            "You must enter an http://, https:// or ftp:// location.",
        )))
    }

    fn mount(
        &mut self,
        svc: &mut Services<'_>,
        ctx: &LoaderContext,
        _data: &mut LoaderData,
    ) -> Result<Location, NetEvent> {
        let paths = &ctx.config.paths;
        let Some((url, proxy)) = self.target() else {
            return Err(NetEvent::Incomplete);
        };
        let url = url.trim_end_matches('/').to_owned();
        let proxy = proxy.map(str::to_owned);
        info!("loading install tree from {url}");
        if ctx.flags.contains(LoaderFlags::TESTING) {
            return Ok(Location::Url(url));
        }
        if let Err(err) = fs::create_dir_all(&paths.ramfs) {
            error!("cannot create {}: {err}", paths.ramfs.display());
            return Err(NetEvent::MountFailure);
        }

        let companions: [(&str, CompanionCopy); 2] =
            [(UPDATES_IMAGE, copy_updates_img), (PRODUCT_IMAGE, copy_product_img)];
        for (name, copy) in companions {
            let dest = paths.ramfs.join(name);
            if fetch_optional(svc.fetcher, &tree_file_url(&url, &ctx.product, name), proxy.as_deref(), &dest) {
                copy(svc.mounts, paths, &dest);
                if let Err(err) = fs::remove_file(&dest) {
                    debug!("{}: {err}", dest.display());
                }
            }
        }

        let image = paths.ramfs.join(STAGE2_IMAGE);
        svc.ui.status(&format!("Retrieving {STAGE2_IMAGE}..."));
        match svc.fetcher.fetch(
            &tree_file_url(&url, &ctx.product, STAGE2_IMAGE),
            proxy.as_deref(),
            &[],
            &image,
        ) {
            Ok(bytes) => info!("retrieved {bytes} bytes of runtime image"),
            Err(err) => {
                error!("{err}");
                let event = match err {
                    FetchError::Connect { .. } => NetEvent::NetworkFailure,
                    FetchError::Status { .. } => NetEvent::NoTree,
                    FetchError::InvalidUrl(_) | FetchError::Io { .. } => NetEvent::MountFailure,
                };
                let text = if event == NetEvent::NoTree {
                    no_tree_message(&ctx.product)
                } else {
                    format!("Unable to retrieve {STAGE2_IMAGE} from {url}.")
                };
                svc.ui.message("Error", &text);
                return Err(event);
            }
        }

        match mount_stage2(svc.mounts, &ctx.product, &image, &paths.runtime) {
            Ok(_) => Ok(Location::Url(url)),
            Err(err) => {
                if let Err(rm) = fs::remove_file(&image) {
                    warn!("cannot remove {}: {rm}", image.display());
                }
                if matches!(err, StageError::Mismatch(_)) {
                    svc.ui.message("Error", &mismatch_message(&ctx.product));
                    Err(NetEvent::Mismatch)
                } else {
                    error!("{err}");
                    svc.ui.message("Error", &format!("Unable to mount {STAGE2_IMAGE} from {url}."));
                    Err(NetEvent::MountFailure)
                }
            }
        }
    }
}

/// Resolve an HTTP or FTP install source.
pub fn mount_url_image(
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    data: &mut LoaderData,
) -> Result<Option<Location>, LoaderError> {
    let mut mounter = UrlMounter {
        draft: MethodData::Url(UrlSource::default()),
    };
    run_network_mounter(&mut mounter, svc, ctx, data)
}

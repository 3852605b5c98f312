// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Mount an NFS export holding an install tree or ISO images.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! NFS install source.
//!
//! The export is mounted read-only at the source mountpoint. A tree whose
//! runtime image carries the boot media's stamp resolves to `nfs:`; failing
//! that, the first ISO image holding a runtime is loop-mounted at the
//! secondary mountpoint and resolves to `nfsiso:`.

use std::net::IpAddr;
use std::path::Path;

use log::{debug, error, info, warn};

use super::{prompt_params, run_network_mounter, NetworkSource};
use crate::data::{LoaderData, Location, MethodData, MethodKind, NfsSource, Status};
use crate::error::{LoaderError, StageError};
use crate::flags::LoaderFlags;
use crate::fsm::NetEvent;
use crate::loader::{LoaderContext, Services};
use crate::mediacheck::query_media_check;
use crate::mount::{mount_first, mount_guarded, FsType, MountSpec};
use crate::product::ProductInfo;
use crate::stage2::{copy_updates_img, mount_stage2, valid_iso_images, UPDATES_IMAGE};
use crate::ui::{EntryField, Ui};

const NFS_DEFAULT_OPTIONS: &str = "nolock";

/// Mount request for `host:dir` at `target`.
///
/// The kernel client needs the server address in the option string; `addr`
/// is added when the caller resolved one.
pub(crate) fn nfs_spec(
    host: &str,
    addr: Option<IpAddr>,
    dir: &str,
    options: Option<&str>,
    target: &Path,
) -> MountSpec {
    let mut data = NFS_DEFAULT_OPTIONS.to_owned();
    if let Some(extra) = options.map(str::trim).filter(|opts| !opts.is_empty()) {
        data.push(',');
        data.push_str(extra);
    }
    if let Some(addr) = addr {
        data.push_str(&format!(",addr={addr}"));
    }
    MountSpec::read_only(format!("{host}:{dir}"), target, FsType::Nfs).with_data(data)
}

pub(crate) fn server_prompt(protocol: &str, product: &ProductInfo) -> String {
    format!(
        "Please enter the following information:\n\n    \
         o the name or IP number of your {protocol} server\n    \
         o the directory on that server containing\n      \
         {} for your architecture\n",
        product.name
    )
}

/// Ask for the NFS server and directory.
pub fn prompt_nfs(ui: &mut dyn Ui, product: &ProductInfo, draft: &mut MethodData) -> Status {
    let current = match draft {
        MethodData::Nfs(nfs) => nfs.clone(),
        _ => NfsSource::default(),
    };
    let mut fields = [
        EntryField::new("NFS server name:", current.host.as_deref()),
        EntryField::new(format!("{} directory:", product.name), current.directory.as_deref()),
    ];
    if !ui.entries("NFS Setup", &server_prompt("NFS", product), &mut fields) {
        return Status::Back;
    }
    *draft = MethodData::Nfs(NfsSource {
        host: fields[0].filled(),
        directory: fields[1].filled(),
        options: current.options,
    });
    Status::Ok
}

pub(crate) fn mismatch_message(product: &ProductInfo) -> String {
    format!(
        "The {} installation tree in that directory does not seem to match your boot media.",
        product.name
    )
}

pub(crate) fn no_tree_message(product: &ProductInfo) -> String {
    format!(
        "That directory does not seem to contain a {} installation tree.",
        product.name
    )
}

struct NfsMounter {
    draft: MethodData,
}

fn nfs_target(draft: &MethodData) -> Option<(&str, &str, Option<&str>)> {
    match draft {
        MethodData::Nfs(NfsSource {
            host: Some(host),
            directory: Some(dir),
            options,
        }) => Some((host, dir, options.as_deref())),
        _ => None,
    }
}

impl NfsMounter {
    fn target(&self) -> Option<(&str, &str, Option<&str>)> {
        nfs_target(&self.draft)
    }
}

impl NetworkSource for NfsMounter {
    fn label(&self) -> &'static str {
        "nfs"
    }

    fn params(
        &mut self,
        svc: &mut Services<'_>,
        ctx: &LoaderContext,
        data: &mut LoaderData,
    ) -> Result<NetEvent, LoaderError> {
        if let Some(MethodData::Nfs(pinned)) = data.method.as_ref() {
            info!("host is {:?}, dir is {:?}", pinned.host, pinned.directory);
            self.draft = MethodData::Nfs(pinned.clone());
            if self.target().is_some() {
                return Ok(NetEvent::Status(Status::Ok));
            }
            warn!("missing host or directory specification");
            if !svc.ui.is_interactive() {
                return Err(LoaderError::NonInteractive(
                    "nfs method needs both a server and a directory".to_owned(),
                ));
            }
            return Ok(NetEvent::Incomplete);
        }
        if !svc.ui.is_interactive() {
            return Err(LoaderError::NonInteractive(
                "no NFS server was specified".to_owned(),
            ));
        }
        Ok(NetEvent::Status(prompt_params(
            MethodKind::Nfs,
            svc,
            &ctx.product,
            &mut self.draft,
            |draft| nfs_target(draft).is_some(),
            "You must enter both a server and a directory.",
        )))
    }

    fn mount(
        &mut self,
        svc: &mut Services<'_>,
        ctx: &LoaderContext,
        _data: &mut LoaderData,
    ) -> Result<Location, NetEvent> {
        let paths = &ctx.config.paths;
        let Some((host, dir, options)) = self.target() else {
            return Err(NetEvent::Incomplete);
        };
        info!("mounting nfs path {host}:{dir}");
        if ctx.flags.contains(LoaderFlags::TESTING) {
            return Ok(Location::NfsTree {
                mountpoint: paths.source.clone(),
            });
        }

        let spec = nfs_spec(host, svc.network.resolve(host), dir, options, &paths.source);
        let export = match mount_guarded(svc.mounts, &spec) {
            Ok(guard) => guard,
            Err(err) => {
                error!("{err}");
                svc.ui.message("Error", "That directory could not be mounted from the server.");
                return Err(if err.is_network() {
                    NetEvent::NetworkFailure
                } else {
                    NetEvent::MountFailure
                });
            }
        };
        info!("mounted {host}:{dir} on {}", paths.source.display());

        let mut found_invalid = false;
        let stage2 = ctx.product.stage2_image(export.target());
        match mount_stage2(svc.mounts, &ctx.product, &stage2, &paths.runtime) {
            Ok(runtime) => {
                debug!("runtime mounted at {}", runtime.target.display());
                let kept = export.keep();
                return Ok(Location::NfsTree {
                    mountpoint: kept.target,
                });
            }
            Err(StageError::Mismatch(_)) => found_invalid = true,
            Err(StageError::Missing(path)) => debug!("no tree runtime at {}", path.display()),
            Err(err) => warn!("{err}"),
        }

        if let Some(iso) = valid_iso_images(svc.mounts, &ctx.product, export.target(), &paths.source2) {
            info!("path to valid iso is {}", iso.display());
            copy_updates_img(svc.mounts, paths, &export.target().join(UPDATES_IMAGE));
            match mount_first(svc.mounts, &iso, &paths.source2, &[FsType::Iso9660]) {
                Ok(image) => {
                    let stage2 = ctx.product.stage2_image(image.target());
                    match mount_stage2(svc.mounts, &ctx.product, &stage2, &paths.runtime) {
                        Ok(_) => {
                            query_media_check(svc.ui, ctx.flags, svc.media, &iso);
                            let _ = image.keep();
                            let kept = export.keep();
                            return Ok(Location::NfsIso {
                                mountpoint: kept.target,
                            });
                        }
                        Err(StageError::Mismatch(_)) => found_invalid = true,
                        Err(err) => warn!("{err}"),
                    }
                }
                Err(err) => error!("failed to mount iso {} loopback: {err}", iso.display()),
            }
        }

        if let Err(err) = export.release() {
            warn!("{err}");
        }
        if found_invalid {
            svc.ui.message("Error", &mismatch_message(&ctx.product));
            Err(NetEvent::Mismatch)
        } else {
            svc.ui.message("Error", &no_tree_message(&ctx.product));
            Err(NetEvent::NoTree)
        }
    }
}

/// Resolve an NFS install source.
pub fn mount_nfs_image(
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    data: &mut LoaderData,
) -> Result<Option<Location>, LoaderError> {
    let mut mounter = NfsMounter {
        draft: MethodData::Nfs(NfsSource::default()),
    };
    run_network_mounter(&mut mounter, svc, ctx, data)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn spec_carries_nolock_and_address() {
        let spec = nfs_spec(
            "server",
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
            "/export/os",
            Some("vers=3"),
            Path::new("/mnt/source"),
        );
        assert_eq!(spec.source, Path::new("server:/export/os"));
        assert_eq!(spec.fstype, FsType::Nfs);
        assert!(spec.read_only);
        assert_eq!(spec.data.as_deref(), Some("nolock,vers=3,addr=10.0.0.5"));
    }

    #[test]
    fn spec_without_options() {
        let spec = nfs_spec("server", None, "/os", Some("  "), Path::new("/mnt/source"));
        assert_eq!(spec.data.as_deref(), Some("nolock"));
    }
}

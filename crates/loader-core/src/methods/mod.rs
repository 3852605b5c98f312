// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Install method table and the shared driver for network mounters.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Install methods.
//!
//! Each method pairs a parameter prompt with a mounter. Mounters run their
//! own transition table from [`crate::fsm`] and return the resolved
//! [`Location`], `Ok(None)` when the user backed out, or a fatal
//! [`LoaderError`] when bad data meets a loader that cannot prompt.

pub mod cdrom;
pub mod harddrive;
pub mod nfs;
pub mod url;

use log::{debug, info};

use crate::data::{DeviceClass, LoaderData, Location, MethodData, MethodKind, Status};
use crate::error::LoaderError;
use crate::fsm::{next_net, Direction, NetEvent, NetStage, Reset};
use crate::loader::{LoaderContext, Services};
use crate::product::ProductInfo;
use crate::ui::Ui;

/// Parameter prompt: fills the draft payload from user input.
pub type PromptFn = fn(&mut dyn Ui, &ProductInfo, &mut MethodData) -> Status;

/// Mounter: resolves the install source for one method.
pub type MountFn =
    fn(&mut Services<'_>, &LoaderContext, &mut LoaderData) -> Result<Option<Location>, LoaderError>;

/// One entry of the install method menu.
#[derive(Clone, Copy)]
pub struct InstallMethod {
    /// Menu label.
    pub name: &'static str,
    /// Method discriminant.
    pub kind: MethodKind,
    /// Hardware the method needs a driver for.
    pub class: DeviceClass,
    /// Parameter prompt, for methods that take typed parameters.
    pub prompt: Option<PromptFn>,
    /// Mounter.
    pub mount: MountFn,
}

impl std::fmt::Debug for InstallMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallMethod")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("class", &self.class)
            .finish()
    }
}

/// Every install method, in menu order.
pub static INSTALL_METHODS: [InstallMethod; 4] = [
    InstallMethod {
        name: "Local CDROM",
        kind: MethodKind::Cdrom,
        class: DeviceClass::Cdrom,
        prompt: None,
        mount: cdrom::mount_cdrom,
    },
    InstallMethod {
        name: "Hard drive",
        kind: MethodKind::Disk,
        class: DeviceClass::Disk,
        prompt: None,
        mount: harddrive::mount_hard_drive,
    },
    InstallMethod {
        name: "NFS image",
        kind: MethodKind::Nfs,
        class: DeviceClass::Network,
        prompt: Some(nfs::prompt_nfs),
        mount: nfs::mount_nfs_image,
    },
    InstallMethod {
        name: "FTP/HTTP",
        kind: MethodKind::Url,
        class: DeviceClass::Network,
        prompt: Some(url::prompt_url),
        mount: url::mount_url_image,
    },
];

/// True when `kind` can be offered on the architecture the loader was built for.
#[must_use]
pub fn method_supported(kind: MethodKind) -> bool {
    // Mainframes have neither optical drives nor local install disks.
    !(cfg!(target_arch = "s390x") && matches!(kind, MethodKind::Cdrom | MethodKind::Disk))
}

/// Methods offered in the menu, in table order.
#[must_use]
pub fn available_methods() -> Vec<&'static InstallMethod> {
    INSTALL_METHODS
        .iter()
        .filter(|method| method_supported(method.kind))
        .collect()
}

/// Table entry for `kind`, if supported.
#[must_use]
pub fn method_for(kind: MethodKind) -> Option<&'static InstallMethod> {
    available_methods().into_iter().find(|method| method.kind == kind)
}

/// Run the table prompt for `kind` until `complete` accepts the draft or
/// the user backs out.
pub(crate) fn prompt_params(
    kind: MethodKind,
    svc: &mut Services<'_>,
    product: &ProductInfo,
    draft: &mut MethodData,
    complete: impl Fn(&MethodData) -> bool,
    incomplete: &str,
) -> Status {
    let Some(prompt) = method_for(kind).and_then(|method| method.prompt) else {
        return Status::Error;
    };
    loop {
        match prompt(svc.ui, product, draft) {
            Status::Ok if !complete(&*draft) => svc.ui.message("Error", incomplete),
            status => return status,
        }
    }
}

pub(crate) fn apply_reset(reset: Reset, data: &mut LoaderData) {
    match reset {
        Reset::None => {}
        Reset::IpInfo => data.reset_ip_info(),
        Reset::Method => {
            debug!("discarding pinned method {:?}", data.method_kind());
            data.clear_method();
        }
    }
}

/// Method-specific half of a network mounter.
pub(crate) trait NetworkSource {
    /// Label used in logs and fatal errors.
    fn label(&self) -> &'static str;

    /// Settle the server parameters, from pinned data or a prompt.
    fn params(
        &mut self,
        svc: &mut Services<'_>,
        ctx: &LoaderContext,
        data: &mut LoaderData,
    ) -> Result<NetEvent, LoaderError>;

    /// Mount or fetch the source; the error is the event to report.
    fn mount(
        &mut self,
        svc: &mut Services<'_>,
        ctx: &LoaderContext,
        data: &mut LoaderData,
    ) -> Result<Location, NetEvent>;
}

/// Drive the shared `IFACE -> IP -> PARAMS -> MOUNT` table for `source`.
pub(crate) fn run_network_mounter(
    source: &mut dyn NetworkSource,
    svc: &mut Services<'_>,
    ctx: &LoaderContext,
    data: &mut LoaderData,
) -> Result<Option<Location>, LoaderError> {
    let mut stage = NetStage::Iface;
    let mut dir = Direction::Forward;
    let mut location = None;
    while !stage.is_terminal() {
        let event = match stage {
            NetStage::Iface => {
                debug!("{}: choosing interface", source.label());
                NetEvent::Status(svc.network.choose_interface(svc.ui, ctx.flags, data))
            }
            NetStage::Ip => {
                debug!("{}: configuring addressing", source.label());
                NetEvent::Status(svc.network.configure(svc.ui, ctx.flags, data))
            }
            NetStage::Params => source.params(svc, ctx, data)?,
            NetStage::Mount => match source.mount(svc, ctx, data) {
                Ok(found) => {
                    location = Some(found);
                    NetEvent::Mounted
                }
                Err(event) if !svc.ui.is_interactive() => {
                    return Err(LoaderError::NonInteractive(format!(
                        "{} source could not be used ({event:?})",
                        source.label()
                    )));
                }
                Err(event) => event,
            },
            NetStage::Done | NetStage::Abort => break,
        };
        let transition = next_net(stage, event, dir);
        apply_reset(transition.reset, data);
        stage = transition.state;
        dir = transition.dir;
    }
    if stage == NetStage::Done {
        if let Some(found) = location.as_ref() {
            info!("{} source resolved to {found}", source.label());
        }
        Ok(location)
    } else {
        info!("{} mounter aborted", source.label());
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_is_menu_order() {
        let kinds: Vec<MethodKind> = INSTALL_METHODS.iter().map(|method| method.kind).collect();
        assert_eq!(
            kinds,
            vec![MethodKind::Cdrom, MethodKind::Disk, MethodKind::Nfs, MethodKind::Url]
        );
    }

    #[test]
    fn network_methods_need_network_drivers() {
        for method in &INSTALL_METHODS {
            let network = matches!(method.kind, MethodKind::Nfs | MethodKind::Url);
            assert_eq!(method.class == DeviceClass::Network, network, "{}", method.name);
            assert_eq!(method.prompt.is_some(), network, "{}", method.name);
        }
    }

    #[test]
    fn method_reset_clears_pin() {
        let mut data = LoaderData {
            method: Some(MethodData::Cdrom { device: None }),
            ..LoaderData::default()
        };
        apply_reset(Reset::None, &mut data);
        assert!(data.method.is_some());
        apply_reset(Reset::Method, &mut data);
        assert!(data.method.is_none());
    }
}

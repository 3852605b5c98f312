// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Pre-fill loader session data from kickstart directives.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Kickstart pre-fill.
//!
//! Only the directives that answer loader questions are interpreted here:
//! `nfs`, `harddrive`, `url`, `cdrom`, `lang`, `keyboard` and `network`.
//! Everything else belongs to the installer and is skipped. Reading stops
//! at the first `%` section.
//!
//! A directive with bad options is reported and skipped; it never aborts
//! the remaining directives.

use std::fs;
use std::path::Path;

use clap::Parser;
use log::{debug, error, info, warn};

use crate::cmdline::tokenize;
use crate::data::{DiskSource, LoaderData, MethodData, NfsSource, UrlSource};
use crate::error::KickstartError;
use crate::flags::LoaderFlags;
use crate::locale::LocaleService;
use crate::probe::{partition_name, DeviceProbe};
use crate::ui::Ui;

/// One command line of a kickstart file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KsCommand {
    /// One-based line number.
    pub line: usize,
    /// Directive name.
    pub name: String,
    /// Remaining words.
    pub args: Vec<String>,
}

/// `nfs` directive.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "nfs", no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct NfsDirective {
    /// Server host.
    #[arg(long)]
    pub server: Option<String>,
    /// Exported directory.
    #[arg(long)]
    pub dir: Option<String>,
    /// Extra mount options.
    #[arg(long)]
    pub opts: Option<String>,
}

/// `harddrive` directive.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "harddrive",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct HarddriveDirective {
    /// Partition name.
    #[arg(long, conflicts_with = "biospart")]
    pub partition: Option<String>,
    /// BIOS disk and partition such as `80p1`.
    #[arg(long)]
    pub biospart: Option<String>,
    /// Directory holding the images.
    #[arg(long)]
    pub dir: Option<String>,
}

/// `url` directive.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "url", no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct UrlDirective {
    /// Tree URL.
    #[arg(long)]
    pub url: String,
    /// Proxy URL.
    #[arg(long)]
    pub proxy: Option<String>,
}

/// `lang` and `keyboard` directives.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "value", no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct ValueDirective {
    /// Language or keymap.
    pub value: String,
}

/// `network` directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "network", no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct NetworkDirective {
    /// `dhcp`, `bootp`, `static` or `query`.
    #[arg(long)]
    pub bootproto: Option<String>,
    /// Interface name, MAC address or `link`.
    #[arg(long)]
    pub device: Option<String>,
    /// Static address.
    #[arg(long)]
    pub ip: Option<String>,
    /// Static netmask.
    #[arg(long)]
    pub netmask: Option<String>,
    /// Default gateway.
    #[arg(long)]
    pub gateway: Option<String>,
    /// Comma separated name servers.
    #[arg(long)]
    pub nameserver: Option<String>,
    /// Host name.
    #[arg(long)]
    pub hostname: Option<String>,
    /// ethtool options.
    #[arg(long)]
    pub ethtool: Option<String>,
    /// Wireless ESSID.
    #[arg(long)]
    pub essid: Option<String>,
    /// Wireless WEP key.
    #[arg(long)]
    pub wepkey: Option<String>,
    /// Interface MTU.
    #[arg(long)]
    pub mtu: Option<u32>,
    /// DHCP vendor class.
    #[arg(long)]
    pub dhcpclass: Option<String>,
    /// Accepted for compatibility; the installer handles it.
    #[arg(long)]
    pub onboot: Option<String>,
    /// Disable IPv4.
    #[arg(long)]
    pub noipv4: bool,
    /// Disable IPv6.
    #[arg(long)]
    pub noipv6: bool,
}

/// Directives the loader interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// NFS source.
    Nfs(NfsDirective),
    /// Hard drive source.
    Harddrive(HarddriveDirective),
    /// HTTP or FTP source.
    Url(UrlDirective),
    /// Optical source.
    Cdrom,
    /// Installation language.
    Lang(String),
    /// Keymap.
    Keyboard(String),
    /// Network settings.
    Network(NetworkDirective),
}

/// Split kickstart text into commands, stopping at the first `%` section.
pub fn read_commands(text: &str) -> Result<Vec<KsCommand>, KickstartError> {
    let mut commands = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with('%') {
            break;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = tokenize(line).map_err(|err| KickstartError::Syntax {
            line: idx + 1,
            message: err.to_string(),
        })?;
        if words.is_empty() {
            continue;
        }
        let name = words.remove(0);
        commands.push(KsCommand {
            line: idx + 1,
            name,
            args: words,
        });
    }
    Ok(commands)
}

/// Read and split a kickstart file.
pub fn load_commands(path: &Path) -> Result<Vec<KsCommand>, KickstartError> {
    let text = fs::read_to_string(path).map_err(|source| KickstartError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    read_commands(&text)
}

fn parse_args<T: Parser>(command: &KsCommand) -> Result<T, KickstartError> {
    T::try_parse_from(&command.args).map_err(|err| KickstartError::BadOption {
        command: command.name.clone(),
        message: err
            .to_string()
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches("error: ")
            .to_owned(),
    })
}

/// Interpret one command; `Ok(None)` for commands the loader ignores.
pub fn parse_directive(command: &KsCommand) -> Result<Option<Directive>, KickstartError> {
    let directive = match command.name.as_str() {
        "nfs" => Directive::Nfs(parse_args(command)?),
        "harddrive" => Directive::Harddrive(parse_args(command)?),
        "url" => Directive::Url(parse_args(command)?),
        "cdrom" => Directive::Cdrom,
        "lang" => Directive::Lang(parse_args::<ValueDirective>(command)?.value),
        "keyboard" => Directive::Keyboard(parse_args::<ValueDirective>(command)?.value),
        "network" => Directive::Network(parse_args(command)?),
        _ => return Ok(None),
    };
    Ok(Some(directive))
}

/// Collaborators consulted while applying directives.
pub struct KickstartEnv<'a> {
    /// Prompt surface for error dialogs.
    pub ui: &'a mut dyn Ui,
    /// Resolves BIOS disk numbers.
    pub probe: &'a dyn DeviceProbe,
    /// Applies language and keymap.
    pub locale: &'a mut dyn LocaleService,
}

fn report(env: &mut KickstartEnv<'_>, flags: LoaderFlags, err: &KickstartError) {
    error!("{err}");
    if flags.interactive() && env.ui.is_interactive() {
        env.ui.message("Kickstart Error", &err.to_string());
    }
}

/// Resolve `80p1` style BIOS partitions to a device name.
#[must_use]
pub fn resolve_biospart(probe: &dyn DeviceProbe, biospart: &str) -> Option<String> {
    let (disk, part) = biospart.split_once('p')?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    probe
        .bios_disk(disk)
        .map(|dev| partition_name(&dev, part))
}

fn set_harddrive(env: &KickstartEnv<'_>, directive: HarddriveDirective, data: &mut LoaderData) {
    let partition = match (directive.partition, directive.biospart) {
        (Some(partition), _) => Some(partition),
        (None, Some(biospart)) => {
            let resolved = resolve_biospart(env.probe, &biospart);
            if resolved.is_none() {
                error!("unable to locate BIOS partition {biospart}");
            }
            resolved
        }
        (None, None) => None,
    };
    if partition.is_none() || directive.dir.is_none() {
        warn!("harddrive directive is incomplete; the partition will be asked for");
    }
    data.method = Some(MethodData::Disk(DiskSource {
        partition,
        directory: directive.dir,
    }));
}

fn set_network(directive: NetworkDirective, mut flags: LoaderFlags, data: &mut LoaderData) -> LoaderFlags {
    if let Some(device) = directive.device {
        data.net_dev = Some(device);
        data.net_dev_set = true;
    }
    match directive.bootproto.as_deref().unwrap_or("dhcp") {
        "static" => {
            data.ipv4 = directive.ip;
            data.netmask = directive.netmask;
            data.ipinfo_set = data.ipv4.is_some() && data.netmask.is_some();
        }
        "query" => {
            data.ipv4 = None;
            data.ipinfo_set = false;
        }
        other => {
            if other != "dhcp" && other != "bootp" {
                warn!("unknown bootproto {other}, using dhcp");
            }
            data.ipv4 = Some("dhcp".to_owned());
            data.ipinfo_set = true;
        }
    }
    if directive.gateway.is_some() {
        data.gateway = directive.gateway;
    }
    if directive.nameserver.is_some() {
        data.dns = directive.nameserver;
    }
    if directive.hostname.is_some() {
        data.hostname = directive.hostname;
    }
    if directive.ethtool.is_some() {
        data.ethtool = directive.ethtool;
    }
    if directive.essid.is_some() {
        data.essid = directive.essid;
    }
    if directive.wepkey.is_some() {
        data.wepkey = directive.wepkey;
    }
    if directive.mtu.is_some() {
        data.mtu = directive.mtu;
    }
    if directive.dhcpclass.is_some() {
        data.net_cls = directive.dhcpclass;
    }
    if directive.noipv4 {
        flags.insert(LoaderFlags::NOIPV4);
    }
    if directive.noipv6 {
        flags.insert(LoaderFlags::NOIPV6);
    }
    flags
}

/// Apply every directive the loader understands; returns the updated flags.
pub fn apply_kickstart(
    commands: &[KsCommand],
    env: &mut KickstartEnv<'_>,
    mut flags: LoaderFlags,
    data: &mut LoaderData,
) -> LoaderFlags {
    data.is_kickstart = true;
    flags.insert(LoaderFlags::KICKSTART);
    for command in commands {
        let directive = match parse_directive(command) {
            Ok(Some(directive)) => directive,
            Ok(None) => {
                debug!("kickstart line {}: {} left to the installer", command.line, command.name);
                continue;
            }
            Err(err) => {
                report(env, flags, &err);
                continue;
            }
        };
        match directive {
            Directive::Nfs(nfs) => {
                if nfs.server.is_none() || nfs.dir.is_none() {
                    warn!("nfs directive needs --server and --dir");
                }
                data.method = Some(MethodData::Nfs(NfsSource {
                    host: nfs.server,
                    directory: nfs.dir,
                    options: nfs.opts,
                }));
            }
            Directive::Harddrive(hd) => set_harddrive(env, hd, data),
            Directive::Url(url) => {
                data.method = Some(MethodData::Url(UrlSource {
                    url: Some(url.url),
                    proxy: url.proxy,
                }));
            }
            Directive::Cdrom => data.method = Some(MethodData::Cdrom { device: None }),
            Directive::Lang(lang) => {
                if env.locale.set_language(&lang, data) {
                    data.lang_set = true;
                }
            }
            Directive::Keyboard(kbd) => {
                if env.locale.load_keymap(&kbd) {
                    data.kbd = Some(kbd);
                    data.kbd_set = true;
                } else {
                    warn!("kickstart keymap {kbd} is not valid");
                }
            }
            Directive::Network(net) => flags = set_network(net, flags, data),
        }
    }
    info!("kickstart pre-filled method {:?}", data.method_kind());
    flags
}

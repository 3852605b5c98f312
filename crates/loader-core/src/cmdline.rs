// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Parse the kernel command line into loader flags and session data.
// Author: Lukas Bower
//
// Tokens are split like a shell would split them (quotes and backslash
// escapes group words), then matched case-insensitively against the
// options the loader understands. Options meant for the installer are
// collected into the bounded extra-argument buffer with a `--` prefix.
//
// Example cmdline:
//
//   initrd=initrd.img repo=nfs:server:/export/os ks=http://ks/host.cfg vnc
#![forbid(unsafe_code)]

//! Kernel command line parsing.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::LoaderPaths;
use crate::data::{DiskSource, LoaderData, MethodData, NfsSource, UrlSource};
use crate::flags::LoaderFlags;

/// Tokenizer failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CmdlineError {
    /// A quoted word was never closed.
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
    /// The line ended inside an escape sequence.
    #[error("dangling backslash")]
    DanglingEscape,
}

/// Split a command line into words, honouring quotes and backslashes.
pub fn tokenize(line: &str) -> Result<Vec<String>, CmdlineError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(q), '\\') => match chars.next() {
                Some(next) if next == q || next == '\\' => current.push(next),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => return Err(CmdlineError::DanglingEscape),
            },
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(ch);
                in_word = true;
            }
            (None, '\\') => {
                current.push(chars.next().ok_or(CmdlineError::DanglingEscape)?);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(CmdlineError::UnterminatedQuote(q));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Read-only view of the kernel command line.
#[derive(Debug, Clone, Default)]
pub struct KernelArgs {
    tokens: Vec<String>,
}

impl KernelArgs {
    /// Tokenize a raw command line.
    pub fn parse(cmdline: &str) -> Result<Self, CmdlineError> {
        Ok(Self {
            tokens: tokenize(cmdline)?,
        })
    }

    /// Words in command-line order.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Value of the last `key=value` token, matched case-insensitively.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tokens.iter().rev().find_map(|token| {
            let (k, v) = token.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }

    /// True if `key` appears bare or as `key=value`.
    #[must_use]
    pub fn has_flag(&self, key: &str) -> bool {
        self.tokens.iter().any(|token| {
            let name = token.split_once('=').map_or(token.as_str(), |(k, _)| k);
            name.eq_ignore_ascii_case(key)
        })
    }
}

fn strip_prefix_ci<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    let head = token.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &token[prefix.len()..])
}

fn has_prefix_ci(token: &str, prefix: &str) -> bool {
    strip_prefix_ci(token, prefix).is_some()
}

fn parse_number(key: &str, value: &str) -> Option<u32> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(err) => {
            warn!("ignoring {key}={value}: {err}");
            None
        }
    }
}

/// Installer options forwarded as `--<token>` when matched exactly.
const PASSTHROUGH_EXACT: &[&str] = &[
    "lowres", "nomount", "headless", "usefbx", "mpath", "nompath", "dmraid", "nodmraid",
];

/// Installer options forwarded as `--<token>` when matched by prefix.
const PASSTHROUGH_PREFIX: &[&str] = &["resolution=", "vnc", "xdriver=", "syslog="];

fn passthrough(token: &str, flags: &mut LoaderFlags, data: &mut LoaderData) -> bool {
    if has_prefix_ci(token, "vesa") {
        warn!("\"vesa\" command line argument is deprecated.  use \"xdriver=vesa\".");
        data.extra_args.push("--xdriver=vesa");
        return true;
    }
    let exact = PASSTHROUGH_EXACT
        .iter()
        .any(|name| token.eq_ignore_ascii_case(name));
    let prefixed = PASSTHROUGH_PREFIX
        .iter()
        .any(|prefix| has_prefix_ci(token, prefix));
    if !(exact || prefixed) {
        return false;
    }
    if has_prefix_ci(token, "vnc") {
        info!("vnc forced graphical mode from cmdline");
        flags.insert(LoaderFlags::GRAPHICAL);
    }
    data.extra_args.push(format!("--{token}"));
    true
}

/// Parse `ip=` in either the plain or the pxelinux
/// `client:server:gateway:netmask` form.
fn parse_ip(value: &str, flags: &mut LoaderFlags, data: &mut LoaderData) {
    let mut parts = value.split(':');
    let client = parts.next().unwrap_or_default();
    data.ipv4 = Some(client.to_owned());
    data.ipinfo_set = false;
    if value.contains(':') {
        let _boot_server = parts.next();
        if let Some(gateway) = parts.next().filter(|gw| !gw.is_empty()) {
            data.gateway = Some(gateway.to_owned());
        }
        if let Some(netmask) = parts.next().filter(|nm| !nm.is_empty()) {
            data.netmask = Some(netmask.to_owned());
        }
    }
    if has_prefix_ci(client, "dhcp") {
        flags.insert(LoaderFlags::IP_PARAM);
    }
}

fn parse_ipv6(value: &str, flags: &mut LoaderFlags, data: &mut LoaderData) {
    data.ipv6 = if value.eq_ignore_ascii_case("dhcp") {
        Some("dhcp".to_owned())
    } else if value.eq_ignore_ascii_case("auto") {
        Some("auto".to_owned())
    } else {
        warn!("ignoring unsupported ipv6={value}");
        None
    };
    if data.ipv6.is_some() {
        data.ipv6info_set = true;
        flags.insert(LoaderFlags::IPV6_PARAM);
    }
}

fn parse_boot_if(value: &str) -> Option<String> {
    // Hardware type prefix, e.g. `01-`.
    let mac = value.get(3..)?;
    Some(mac.replace('-', ":"))
}

fn split_nonempty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_owned())
}

/// Parse a `repo=`, `method=` or `stage2=` value.
#[must_use]
pub fn parse_method_string(value: &str) -> Option<MethodData> {
    if let Some(rest) = strip_prefix_ci(value, "cdrom") {
        let device = rest.strip_prefix(':').and_then(split_nonempty);
        return Some(MethodData::Cdrom { device });
    }
    if let Some(rest) = strip_prefix_ci(value, "hd:") {
        let rest = rest.trim_start_matches("//");
        let (partition, directory) = match rest.split_once(':') {
            Some((part, dir)) => (part, dir),
            None => match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            },
        };
        return Some(MethodData::Disk(DiskSource {
            partition: split_nonempty(partition),
            directory: split_nonempty(directory),
        }));
    }
    if has_prefix_ci(value, "http://")
        || has_prefix_ci(value, "https://")
        || has_prefix_ci(value, "ftp://")
    {
        return Some(MethodData::Url(UrlSource {
            url: Some(value.to_owned()),
            proxy: None,
        }));
    }
    let rest = strip_prefix_ci(value, "nfsiso:").or_else(|| strip_prefix_ci(value, "nfs:"))?;
    let parts: Vec<&str> = rest.splitn(3, ':').collect();
    let (options, host, directory) = match parts.as_slice() {
        [opts, host, dir] => (split_nonempty(opts), *host, *dir),
        [host, dir] => (None, *host, *dir),
        [host] => (None, *host, ""),
        _ => return None,
    };
    Some(MethodData::Nfs(NfsSource {
        host: split_nonempty(host),
        directory: split_nonempty(directory),
        options,
    }))
}

fn set_method(value: &str, data: &mut LoaderData) {
    match parse_method_string(value) {
        Some(method) => {
            debug!("method from command line: {method:?}");
            data.method = Some(method);
        }
        None => warn!("unknown install method {value}"),
    }
}

fn set_log_level(value: &str, data: &mut LoaderData) {
    const LEVELS: &[&str] = &["debug", "info", "warning", "error", "critical"];
    match LEVELS.iter().find(|level| value.eq_ignore_ascii_case(level)) {
        Some(level) => data.log_level = Some((*level).to_owned()),
        None => warn!("ignoring unknown loglevel={value}"),
    }
}

/// Apply every token of the kernel command line to `data`.
///
/// `base` carries flags already decided by the loader's own options; the
/// returned set adds the command-line switches. `vncpassword=` is written to
/// the password file instead of being forwarded, except in testing mode.
pub fn parse_cmdline_flags(
    args: &KernelArgs,
    base: LoaderFlags,
    paths: &LoaderPaths,
    data: &mut LoaderData,
) -> LoaderFlags {
    let mut flags = base | LoaderFlags::GRAPHICAL;

    for token in args.tokens() {
        let t = token.as_str();
        let simple = [
            ("askmethod", LoaderFlags::ASKMETHOD),
            ("asknetwork", LoaderFlags::ASKNETWORK),
            ("noshell", LoaderFlags::NOSHELL),
            ("mediacheck", LoaderFlags::MEDIACHECK),
            ("allowwireless", LoaderFlags::ALLOW_WIRELESS),
            ("telnet", LoaderFlags::TELNETD),
            ("noprobe", LoaderFlags::NOPROBE),
            ("rescue", LoaderFlags::RESCUE),
            ("nopass", LoaderFlags::NOPASS),
            ("serial", LoaderFlags::SERIAL),
            ("noipv4", LoaderFlags::NOIPV4),
            ("noipv6", LoaderFlags::NOIPV6),
            ("kssendmac", LoaderFlags::KICKSTART_SEND_MAC),
            ("dd", LoaderFlags::MODDISK),
            ("driverdisk", LoaderFlags::MODDISK),
        ];
        if let Some((_, flag)) = simple.iter().find(|(name, _)| t.eq_ignore_ascii_case(name)) {
            flags.insert(*flag);
            continue;
        }

        if t.eq_ignore_ascii_case("expert") {
            info!("expert got used, ignoring");
            flags.insert(LoaderFlags::EXPERT);
        } else if t.eq_ignore_ascii_case("text") {
            info!("text mode forced from cmdline");
            flags.insert(LoaderFlags::TEXT);
            flags.remove(LoaderFlags::GRAPHICAL);
        } else if t.eq_ignore_ascii_case("graphical") {
            info!("graphical mode forced from cmdline");
            flags.insert(LoaderFlags::GRAPHICAL);
        } else if t.eq_ignore_ascii_case("cmdline") {
            info!("cmdline mode forced from cmdline");
            flags.insert(LoaderFlags::CMDLINE);
        } else if let Some(v) = strip_prefix_ci(t, "updates=") {
            data.updates_src = Some(v.to_owned());
        } else if has_prefix_ci(t, "updates") {
            flags.insert(LoaderFlags::UPDATES);
        } else if let Some(v) = strip_prefix_ci(t, "dogtail=") {
            data.dogtail_url = Some(v.to_owned());
        } else if let Some(v) =
            strip_prefix_ci(t, "dd=").or_else(|| strip_prefix_ci(t, "driverdisk="))
        {
            data.dd_src = Some(v.to_owned());
        } else if t.eq_ignore_ascii_case("nousbstorage") {
            data.module_blacklist.push("usb-storage".to_owned());
        } else if t.eq_ignore_ascii_case("nousb") {
            for module in ["ehci-hcd", "ohci-hcd", "uhci-hcd"] {
                data.module_blacklist.push(module.to_owned());
            }
        } else if t.eq_ignore_ascii_case("nofirewire") {
            data.module_blacklist.push("firewire-ohci".to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "loglevel=") {
            set_log_level(v, data);
        } else if let Some(v) = strip_prefix_ci(t, "ksdevice=") {
            data.net_dev = Some(v.to_owned());
            data.net_dev_set = true;
        } else if let Some(v) = t.strip_prefix("BOOTIF=") {
            data.boot_if = parse_boot_if(v);
        } else if let Some(v) = strip_prefix_ci(t, "dhcpclass=") {
            data.net_cls = Some(v.to_owned());
        } else if t.eq_ignore_ascii_case("ks") || has_prefix_ci(t, "ks=") {
            data.ks_file = Some(t.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "display=") {
            data.display = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "lang=").filter(|v| !v.is_empty()) {
            data.lang = Some(v.to_owned());
            data.lang_set = true;
        } else if let Some(v) = strip_prefix_ci(t, "keymap=").filter(|v| !v.is_empty()) {
            data.kbd = Some(v.to_owned());
            data.kbd_set = true;
        } else if let Some(v) =
            strip_prefix_ci(t, "repo=").or_else(|| strip_prefix_ci(t, "method="))
        {
            if !flags.contains(LoaderFlags::STAGE2) {
                set_method(v, data);
            }
        } else if let Some(v) = strip_prefix_ci(t, "stage2=") {
            flags.insert(LoaderFlags::STAGE2);
            set_method(v, data);
        } else if let Some(v) = strip_prefix_ci(t, "hostname=") {
            data.hostname = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "ip=") {
            parse_ip(v, &mut flags, data);
        } else if let Some(v) = strip_prefix_ci(t, "ipv6=") {
            parse_ipv6(v, &mut flags, data);
        } else if let Some(v) = strip_prefix_ci(t, "netmask=") {
            data.netmask = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "gateway=") {
            data.gateway = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "dns=") {
            data.dns = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "ethtool=") {
            data.ethtool = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "essid=") {
            data.essid = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "mtu=") {
            data.mtu = parse_number("mtu", v);
        } else if let Some(v) = strip_prefix_ci(t, "wepkey=") {
            data.wepkey = Some(v.to_owned());
        } else if let Some(v) = strip_prefix_ci(t, "linksleep=") {
            data.link_checks = parse_number("linksleep", v);
        } else if let Some(v) = strip_prefix_ci(t, "nicdelay=") {
            data.post_link_sleep = parse_number("nicdelay", v);
        } else if let Some(v) = strip_prefix_ci(t, "dhcptimeout=") {
            data.dhcp_timeout = parse_number("dhcptimeout", v);
        } else if has_prefix_ci(t, "selinux=0") {
            flags.remove(LoaderFlags::SELINUX);
        } else if has_prefix_ci(t, "selinux") {
            flags.insert(LoaderFlags::SELINUX);
        } else if let Some(v) = strip_prefix_ci(t, "vncpassword=") {
            if !flags.contains(LoaderFlags::TESTING) {
                if let Err(err) = fs::write(&paths.vnc_password, format!("{v}\n")) {
                    warn!("failed to write {}: {err}", paths.vnc_password.display());
                }
            }
        } else if !passthrough(t, &mut flags, data) {
            debug!("ignoring kernel argument {t}");
        }
    }

    flags
}

/// Read network settings left in `/tmp/netinfo` by an earlier boot stage.
///
/// Returns true when both an address and a netmask were provided, in which
/// case the network screens treat the configuration as preset.
pub fn read_net_info(path: &Path, data: &mut LoaderData) -> bool {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return false,
    };

    data.ipv4 = None;
    data.netmask = None;
    data.gateway = None;
    data.dns = None;

    for line in text.lines() {
        let Some(word) = line.split_whitespace().next() else {
            continue;
        };
        let Some((name, value)) = word.split_once('=') else {
            continue;
        };
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        if value.is_empty() {
            continue;
        }
        match name {
            "IPADDR" => data.ipv4 = Some(value.to_owned()),
            "NETMASK" => data.netmask = Some(value.to_owned()),
            "GATEWAY" => data.gateway = Some(value.to_owned()),
            "DNS" => data.dns = Some(value.to_owned()),
            "MTU" => data.mtu = parse_number("MTU", value),
            "HOSTNAME" => data.hostname = Some(value.to_owned()),
            "DEVICE" if !data.net_dev_set => data.net_dev = Some(value.to_owned()),
            _ => {}
        }
    }

    data.ipv4.is_some() && data.netmask.is_some()
}

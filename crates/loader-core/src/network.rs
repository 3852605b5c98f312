// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Network interface selection, address configuration and netinfo persistence.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Network bring-up for network installs.
//!
//! Interface choice and address configuration are separate steps so the
//! wizard can walk back from addressing to the interface menu. A step that
//! finds its answer already supplied (command line, kickstart or an earlier
//! pass) reports [`Status::Noop`] without prompting.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, error, info, warn};

use crate::config::LoaderPaths;
use crate::data::{DeviceClass, LoaderData, Status};
use crate::flags::LoaderFlags;
use crate::probe::{DeviceInfo, DeviceProbe};
use crate::ui::{EntryField, Ui};

/// Network operations used by the wizard and the network mounters.
pub trait NetworkService {
    /// Pick the install interface into `data.net_dev`.
    fn choose_interface(&mut self, ui: &mut dyn Ui, flags: LoaderFlags, data: &mut LoaderData) -> Status;

    /// Configure addressing on `data.net_dev`.
    fn configure(&mut self, ui: &mut dyn Ui, flags: LoaderFlags, data: &mut LoaderData) -> Status;

    /// Resolve a server name to an address.
    fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// Prefix length of a dotted netmask.
#[must_use]
pub fn netmask_prefix(netmask: &str) -> Option<u32> {
    let mask = u32::from(netmask.parse::<Ipv4Addr>().ok()?);
    // Contiguous masks only.
    (mask.leading_ones() + mask.trailing_zeros() == 32).then(|| mask.leading_ones())
}

fn is_dhcp(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.eq_ignore_ascii_case("dhcp"))
}

/// Persist network settings for the installer in shell variable form.
pub fn write_net_info(path: &Path, data: &LoaderData) -> io::Result<()> {
    let mut out = String::new();
    let mut var = |key: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            let _ = writeln!(out, "{key}={value}");
        }
    };
    var("DEVICE", data.net_dev.as_deref());
    var("ONBOOT", Some("yes"));
    if is_dhcp(data.ipv4.as_deref()) {
        var("BOOTPROTO", Some("dhcp"));
    } else {
        var("BOOTPROTO", Some("static"));
        var("IPADDR", data.ipv4.as_deref());
        var("NETMASK", data.netmask.as_deref());
    }
    var("GATEWAY", data.gateway.as_deref());
    var("DNS", data.dns.as_deref());
    var("HOSTNAME", data.hostname.as_deref());
    let mtu = data.mtu.map(|mtu| mtu.to_string());
    var("MTU", mtu.as_deref());
    var("ETHTOOL_OPTS", data.ethtool.as_deref());
    var("ESSID", data.essid.as_deref());
    var("KEY", data.wepkey.as_deref());
    var("DHCPCLASS", data.net_cls.as_deref());
    match data.ipv6.as_deref() {
        Some("auto") => var("IPV6_AUTOCONF", Some("yes")),
        Some("dhcp" | "dhcpv6") => var("DHCPV6C", Some("yes")),
        Some(addr) => var("IPV6ADDR", Some(addr)),
        None => {}
    }
    fs::write(path, out)
}

/// Set the kernel host name.
pub fn set_hostname(control: &Path, hostname: &str) -> io::Result<()> {
    fs::write(control, hostname)
}

/// [`NetworkService`] using `ip` and `dhclient`.
pub struct SysNetwork {
    paths: LoaderPaths,
    probe: Box<dyn DeviceProbe>,
    dry_run: bool,
    configured: Option<String>,
}

impl SysNetwork {
    /// Service probing interfaces through `probe`.
    pub fn new(paths: LoaderPaths, probe: Box<dyn DeviceProbe>, dry_run: bool) -> Self {
        Self {
            paths,
            probe,
            dry_run,
            configured: None,
        }
    }

    fn is_wireless(&self, name: &str) -> bool {
        self.paths.sys.join("class/net").join(name).join("wireless").exists()
    }

    fn has_link(&self, name: &str) -> bool {
        let carrier: PathBuf = self.paths.sys.join("class/net").join(name).join("carrier");
        fs::read_to_string(carrier).map(|c| c.trim() == "1").unwrap_or(false)
    }

    fn run(&self, program: &str, args: &[&str]) -> bool {
        if self.dry_run {
            info!("would run {program} {}", args.join(" "));
            return true;
        }
        match Command::new(program).args(args).status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                error!("{program} {} exited with {status}", args.join(" "));
                false
            }
            Err(err) => {
                error!("{program}: {err}");
                false
            }
        }
    }

    fn apply(&self, flags: LoaderFlags, data: &LoaderData) -> bool {
        let Some(dev) = data.net_dev.as_deref() else {
            return false;
        };
        let mut ok = self.run("ip", &["link", "set", "dev", dev, "up"]);
        if let Some(mtu) = data.mtu {
            let mtu = mtu.to_string();
            ok &= self.run("ip", &["link", "set", "dev", dev, "mtu", &mtu]);
        }
        if let Some(opts) = data.ethtool.as_deref() {
            let mut args = vec!["-s", dev];
            args.extend(opts.split_whitespace());
            ok &= self.run("ethtool", &args);
        }
        if !flags.contains(LoaderFlags::NOIPV4) {
            if is_dhcp(data.ipv4.as_deref()) {
                let mut args = vec!["-1"];
                if let Some(class) = data.net_cls.as_deref() {
                    args.extend(["-V", class]);
                }
                args.push(dev);
                ok &= self.run("dhclient", &args);
            } else if let Some(ip) = data.ipv4.as_deref() {
                let prefix = data
                    .netmask
                    .as_deref()
                    .and_then(netmask_prefix)
                    .unwrap_or(24);
                let cidr = format!("{ip}/{prefix}");
                ok &= self.run("ip", &["addr", "add", &cidr, "dev", dev]);
                if let Some(gw) = data.gateway.as_deref() {
                    ok &= self.run("ip", &["route", "add", "default", "via", gw, "dev", dev]);
                }
            }
        }
        if !flags.contains(LoaderFlags::NOIPV6) {
            match data.ipv6.as_deref() {
                Some("dhcp" | "dhcpv6") => ok &= self.run("dhclient", &["-6", "-1", dev]),
                Some("auto") | None => {}
                Some(addr) => ok &= self.run("ip", &["-6", "addr", "add", addr, "dev", dev]),
            }
        }
        if let Some(dns) = data.dns.as_deref() {
            let resolv: String = dns
                .split(',')
                .filter(|server| !server.trim().is_empty())
                .map(|server| format!("nameserver {}\n", server.trim()))
                .collect();
            if !self.dry_run {
                if let Err(err) = fs::write(&self.paths.resolv_conf, resolv) {
                    warn!("cannot write {}: {err}", self.paths.resolv_conf.display());
                }
            }
        }
        ok
    }

    fn prompt(&self, ui: &mut dyn Ui, flags: LoaderFlags, data: &mut LoaderData) -> Status {
        let dev = data.net_dev.clone().unwrap_or_default();
        let ipv4_default = data.ipv4.clone().or_else(|| Some("dhcp".to_owned()));
        let mut fields = vec![
            EntryField::new("IPv4 address (or 'dhcp'):", ipv4_default.as_deref()),
            EntryField::new("Netmask:", data.netmask.as_deref()),
            EntryField::new("Gateway:", data.gateway.as_deref()),
            EntryField::new("Name server:", data.dns.as_deref()),
        ];
        if !flags.contains(LoaderFlags::NOIPV6) {
            fields.push(EntryField::new(
                "IPv6 address (or 'dhcp'/'auto'):",
                data.ipv6.as_deref(),
            ));
        }
        let text = format!("Please enter the IP configuration for this machine ({dev}).");
        loop {
            if !ui.entries("Configure TCP/IP", &text, &mut fields) {
                return Status::Back;
            }
            let ipv4 = fields[0].filled();
            let valid = match ipv4.as_deref() {
                None => flags.contains(LoaderFlags::NOIPV4),
                Some(v) if v.eq_ignore_ascii_case("dhcp") => true,
                Some(v) => {
                    v.parse::<Ipv4Addr>().is_ok()
                        && fields[1].filled().as_deref().and_then(netmask_prefix).is_some()
                }
            };
            if !valid {
                ui.message("Invalid IP Information", "You entered an invalid IP address.");
                continue;
            }
            data.ipv4 = ipv4;
            data.netmask = fields[1].filled();
            data.gateway = fields[2].filled();
            data.dns = fields[3].filled();
            data.ipv6 = fields.get(4).and_then(EntryField::filled);
            return Status::Ok;
        }
    }
}

impl NetworkService for SysNetwork {
    fn choose_interface(&mut self, ui: &mut dyn Ui, flags: LoaderFlags, data: &mut LoaderData) -> Status {
        let devices: Vec<DeviceInfo> = self
            .probe
            .devices(DeviceClass::Network)
            .into_iter()
            .filter(|dev| flags.contains(LoaderFlags::ALLOW_WIRELESS) || !self.is_wireless(&dev.name))
            .collect();
        if devices.is_empty() {
            ui.message("Error", "No network devices were found.");
            return Status::Error;
        }

        if data.net_dev_set {
            let wanted = data.net_dev.clone().unwrap_or_default();
            let pick = if wanted.eq_ignore_ascii_case("link") {
                devices.iter().find(|dev| self.has_link(&dev.name))
            } else if wanted.eq_ignore_ascii_case("bootif") {
                None
            } else {
                devices.iter().find(|dev| {
                    dev.name == wanted
                        || dev
                            .hwaddr
                            .as_deref()
                            .is_some_and(|mac| mac.eq_ignore_ascii_case(&wanted))
                })
            };
            if let Some(dev) = pick {
                data.net_dev = Some(dev.name.clone());
                return Status::Noop;
            }
        }
        if let Some(mac) = data.boot_if.as_deref() {
            if let Some(dev) = devices
                .iter()
                .find(|dev| dev.hwaddr.as_deref().is_some_and(|hw| hw.eq_ignore_ascii_case(mac)))
            {
                debug!("BOOTIF selected {}", dev.name);
                data.net_dev = Some(dev.name.clone());
                return Status::Noop;
            }
        }
        if let [only] = devices.as_slice() {
            data.net_dev = Some(only.name.clone());
            return Status::Noop;
        }

        let items: Vec<String> = devices
            .iter()
            .map(|dev| format!("{} - {}", dev.name, dev.description))
            .collect();
        let default = data
            .net_dev
            .as_deref()
            .and_then(|current| devices.iter().position(|dev| dev.name == current))
            .unwrap_or(0);
        match ui.menu(
            "Networking Device",
            "You have multiple network devices on this system. Which would you like to install through?",
            &items,
            default,
        ) {
            Some(idx) => {
                data.net_dev = Some(devices[idx].name.clone());
                Status::Ok
            }
            None => Status::Back,
        }
    }

    fn configure(&mut self, ui: &mut dyn Ui, flags: LoaderFlags, data: &mut LoaderData) -> Status {
        // Boot-supplied addressing skips the form only until the first attempt.
        let fresh = self.configured.is_none();
        let ipv4_preset = data.ipinfo_set
            || flags.contains(LoaderFlags::NOIPV4)
            || (fresh
                && (flags.contains(LoaderFlags::IP_PARAM)
                    || (data.is_kickstart && data.ipv4.is_some())));
        let ipv6_preset = data.ipv6info_set
            || flags.contains(LoaderFlags::NOIPV6)
            || (fresh && flags.contains(LoaderFlags::IPV6_PARAM));
        let preset = ipv4_preset && ipv6_preset;
        if preset && data.ipinfo_set && !fresh && self.configured == data.net_dev {
            return Status::Noop;
        }
        let status = if preset || !ui.is_interactive() {
            Status::Noop
        } else {
            match self.prompt(ui, flags, data) {
                Status::Ok => Status::Ok,
                other => return other,
            }
        };
        ui.status(&format!(
            "Sending request for IP information for {}...",
            data.net_dev.as_deref().unwrap_or("network")
        ));
        self.configured = data.net_dev.clone();
        if !self.apply(flags, data) {
            ui.message("Network Error", "There was an error configuring your network interface.");
            data.reset_ip_info();
            return Status::Error;
        }
        data.ipinfo_set = !flags.contains(LoaderFlags::NOIPV4);
        data.ipv6info_set = !flags.contains(LoaderFlags::NOIPV6) && data.ipv6.is_some();
        if let Err(err) = write_net_info(&self.paths.netinfo, data) {
            warn!("cannot write {}: {err}", self.paths.netinfo.display());
        }
        if let Some(hostname) = data.hostname.as_deref().filter(|_| !self.dry_run) {
            if let Err(err) = set_hostname(&self.paths.hostname, hostname) {
                error!("error setting hostname to {hostname}: {err}");
            }
        }
        status
    }

    fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(addr) = host.parse() {
            return Some(addr);
        }
        (host, 0)
            .to_socket_addrs()
            .ok()?
            .map(|sock| sock.ip())
            .find(IpAddr::is_ipv4)
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Boot-time feature flags for the loader.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Boot-time feature flags.
//!
//! Flags are assembled once from the loader's own options, the kernel
//! command line and the kickstart file, then frozen inside
//! [`crate::LoaderContext`]. Anything that must change while the state
//! machine runs lives on [`crate::LoaderData`] instead.

use bitflags::bitflags;

bitflags! {
    /// Feature switches derived from the command line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LoaderFlags: u64 {
        /// Test mode: no mounts or exec, relaxed file locations.
        const TESTING = 1 << 0;
        /// Expert mode passthrough.
        const EXPERT = 1 << 1;
        /// Force the text UI in the installer.
        const TEXT = 1 << 2;
        /// Prefer the graphical installer.
        const GRAPHICAL = 1 << 3;
        /// Non-interactive command-line mode.
        const CMDLINE = 1 << 4;
        /// Rescue mode.
        const RESCUE = 1 << 5;
        /// Serial console in use.
        const SERIAL = 1 << 6;
        /// Skip automatic hardware probing.
        const NOPROBE = 1 << 7;
        /// Always show the install method menu.
        const ASKMETHOD = 1 << 8;
        /// Always configure networking.
        const ASKNETWORK = 1 << 9;
        /// Do not spawn a debug shell.
        const NOSHELL = 1 << 10;
        /// Offer a media check on discovered images.
        const MEDIACHECK = 1 << 11;
        /// Allow wireless interfaces in the interface menu.
        const ALLOW_WIRELESS = 1 << 12;
        /// Start a telnet daemon.
        const TELNETD = 1 << 13;
        /// Ask for an updates disk.
        const UPDATES = 1 << 14;
        /// Ask for a driver disk before probing.
        const MODDISK = 1 << 15;
        /// Do not pass language and keymap to the installer.
        const NOPASS = 1 << 16;
        /// Disable IPv4 configuration.
        const NOIPV4 = 1 << 17;
        /// Disable IPv6 configuration.
        const NOIPV6 = 1 << 18;
        /// Send interface MAC addresses with kickstart HTTP requests.
        const KICKSTART_SEND_MAC = 1 << 19;
        /// Enable SELinux in the installer.
        const SELINUX = 1 << 20;
        /// The source came from `stage2=`.
        const STAGE2 = 1 << 21;
        /// A kickstart file was loaded.
        const KICKSTART = 1 << 22;
        /// A paravirtualized console was named on the loader command line.
        const VIRTPCONSOLE = 1 << 23;
        /// Network settings were read from /tmp/netinfo.
        const HAVE_CMSCONF = 1 << 24;
        /// `ip=` was given on the command line.
        const IP_PARAM = 1 << 25;
        /// `ipv6=` was given on the command line.
        const IPV6_PARAM = 1 << 26;
    }
}

impl LoaderFlags {
    /// True when the loader may prompt the user.
    #[must_use]
    pub fn interactive(self) -> bool {
        !self.contains(Self::CMDLINE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmdline_mode_is_not_interactive() {
        assert!(LoaderFlags::default().interactive());
        assert!(!(LoaderFlags::CMDLINE | LoaderFlags::TEXT).interactive());
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Transition tables for the loader wizard and the per-method mounters.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Transition tables.
//!
//! Every state machine in the loader is a pure function
//! `(state, event, direction) -> transition`. Step bodies perform their side
//! effects, report an event, and the drivers in [`crate::loader`] and
//! [`crate::methods`] apply the [`Reset`] the table asks for before moving on.
//! All matches are exhaustive, so each table is total by construction.

use crate::data::Status;

/// Wizard direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Continue to the next screen.
    Forward,
    /// Return to the previous screen.
    Backward,
}

impl Direction {
    /// True for [`Direction::Backward`].
    #[must_use]
    pub fn is_back(self) -> bool {
        matches!(self, Self::Backward)
    }
}

/// Session field the caller must clear before entering the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reset {
    /// Nothing to clear.
    None,
    /// Forget IPv4 and IPv6 configuration.
    IpInfo,
    /// Forget the pinned install method.
    Method,
}

/// Top-level wizard steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Language selection.
    Lang,
    /// Keyboard selection.
    Kbd,
    /// Install method selection.
    Method,
    /// Make sure a driver for the method's device class is loaded.
    Driver,
    /// Load a driver disk for the missing class.
    DriverDisk,
    /// Decide whether networking is needed.
    Network,
    /// Pick a network interface.
    Iface,
    /// Configure IP addressing.
    Ip,
    /// Mount the source and resolve its location.
    Url,
    /// Location resolved.
    Done,
}

impl Step {
    /// Every step, in wizard order.
    pub const ALL: [Step; 10] = [
        Step::Lang,
        Step::Kbd,
        Step::Method,
        Step::Driver,
        Step::DriverDisk,
        Step::Network,
        Step::Iface,
        Step::Ip,
        Step::Url,
        Step::Done,
    ];
}

/// Outcome of a wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The step completed.
    Done,
    /// Nothing to do; cached data applies.
    Skipped,
    /// The user backed out.
    Back,
    /// The step failed.
    Failed,
    /// Run the same step again.
    Retry,
    /// No driver is present; the user wants a driver disk.
    UseDriverDisk,
    /// Networking needs a driver first.
    NeedDriver,
    /// The step does not apply to the current method.
    NotNeeded,
    /// A usable disc was found while an override keeps the wizard running.
    MediaFound,
}

impl Event {
    /// Every event.
    pub const ALL: [Event; 9] = [
        Event::Done,
        Event::Skipped,
        Event::Back,
        Event::Failed,
        Event::Retry,
        Event::UseDriverDisk,
        Event::NeedDriver,
        Event::NotNeeded,
        Event::MediaFound,
    ];
}

impl From<Status> for Event {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => Self::Done,
            Status::Noop => Self::Skipped,
            Status::Back => Self::Back,
            Status::Error => Self::Failed,
        }
    }
}

/// Result of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition<S> {
    /// Next state.
    pub state: S,
    /// Direction to enter it with.
    pub dir: Direction,
    /// Field to clear before entering it.
    pub reset: Reset,
}

impl<S> Transition<S> {
    fn to(state: S, dir: Direction) -> Self {
        Self {
            state,
            dir,
            reset: Reset::None,
        }
    }

    fn fwd(state: S) -> Self {
        Self::to(state, Direction::Forward)
    }

    fn back(state: S) -> Self {
        Self::to(state, Direction::Backward)
    }

    fn clearing(mut self, reset: Reset) -> Self {
        self.reset = reset;
        self
    }
}

fn backing_out(event: Event, dir: Direction) -> bool {
    matches!(event, Event::Back | Event::Failed) || (event == Event::Skipped && dir.is_back())
}

/// Top-level wizard transition function.
#[must_use]
pub fn next(step: Step, event: Event, dir: Direction) -> Transition<Step> {
    use Transition as T;
    match step {
        Step::Lang => T::fwd(Step::Kbd),
        Step::Kbd => match event {
            Event::Retry => T::to(Step::Kbd, dir),
            _ if backing_out(event, dir) => T::back(Step::Lang),
            _ => T::fwd(Step::Method),
        },
        Step::Method => match event {
            Event::Retry => T::to(Step::Method, dir),
            Event::MediaFound => T::fwd(Step::Network),
            _ if backing_out(event, dir) => T::back(Step::Kbd),
            _ => T::fwd(Step::Driver),
        },
        Step::Driver => match event {
            Event::Retry => T::to(Step::Driver, dir),
            Event::UseDriverDisk => T::fwd(Step::DriverDisk),
            Event::Back | Event::Failed => T::back(Step::Method),
            _ => T::fwd(Step::Network),
        },
        Step::DriverDisk => match event {
            Event::Back | Event::Failed => T::back(Step::Driver),
            _ => T::to(Step::Driver, dir),
        },
        Step::Network => match event {
            Event::NeedDriver => T::fwd(Step::Driver),
            Event::NotNeeded | Event::Skipped if dir.is_back() => T::back(Step::Method),
            Event::NotNeeded | Event::Skipped => T::fwd(Step::Url),
            Event::Back | Event::Failed => T::back(Step::Method),
            _ => T::fwd(Step::Iface),
        },
        Step::Iface => match event {
            _ if backing_out(event, dir) => T::back(Step::Method),
            _ => T::fwd(Step::Ip),
        },
        Step::Ip => match event {
            Event::NotNeeded => T::to(Step::Method, dir),
            _ if backing_out(event, dir) => T::back(Step::Iface),
            _ => T::fwd(Step::Url),
        },
        Step::Url => match event {
            Event::Done | Event::MediaFound => T::fwd(Step::Done),
            Event::Retry => T::to(Step::Url, dir),
            _ => T::back(Step::Ip).clearing(Reset::IpInfo),
        },
        Step::Done => T::to(Step::Done, dir),
    }
}

/// Stages shared by the NFS and URL mounters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetStage {
    /// Bring up an interface.
    Iface,
    /// Configure addressing.
    Ip,
    /// Gather server parameters.
    Params,
    /// Mount or fetch the source.
    Mount,
    /// Source resolved.
    Done,
    /// The user backed out of the mounter.
    Abort,
}

impl NetStage {
    /// Every stage.
    pub const ALL: [NetStage; 6] = [
        NetStage::Iface,
        NetStage::Ip,
        NetStage::Params,
        NetStage::Mount,
        NetStage::Done,
        NetStage::Abort,
    ];

    /// True for `Done` and `Abort`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Abort)
    }
}

/// Outcome of a network mounter stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetEvent {
    /// A collaborator returned this status.
    Status(Status),
    /// Pinned parameters lack a required field.
    Incomplete,
    /// The source was mounted and validated.
    Mounted,
    /// The server could not be reached.
    NetworkFailure,
    /// The share could not be mounted or fetched.
    MountFailure,
    /// The tree's stamp differs from the boot media.
    Mismatch,
    /// No install tree or images were found.
    NoTree,
}

impl NetEvent {
    /// Every event.
    pub const ALL: [NetEvent; 10] = [
        NetEvent::Status(Status::Ok),
        NetEvent::Status(Status::Back),
        NetEvent::Status(Status::Noop),
        NetEvent::Status(Status::Error),
        NetEvent::Incomplete,
        NetEvent::Mounted,
        NetEvent::NetworkFailure,
        NetEvent::MountFailure,
        NetEvent::Mismatch,
        NetEvent::NoTree,
    ];
}

fn net_backing_out(event: NetEvent, dir: Direction) -> bool {
    matches!(
        event,
        NetEvent::Status(Status::Back) | NetEvent::Status(Status::Error)
    ) || (event == NetEvent::Status(Status::Noop) && dir.is_back())
}

/// NFS and URL mounter transition function.
#[must_use]
pub fn next_net(stage: NetStage, event: NetEvent, dir: Direction) -> Transition<NetStage> {
    use Transition as T;
    match stage {
        NetStage::Iface if net_backing_out(event, dir) => T::back(NetStage::Abort),
        NetStage::Iface => T::fwd(NetStage::Ip),
        NetStage::Ip if net_backing_out(event, dir) => T::back(NetStage::Iface),
        NetStage::Ip => T::fwd(NetStage::Params),
        NetStage::Params => match event {
            NetEvent::Status(Status::Back | Status::Error) => T::back(NetStage::Ip),
            NetEvent::Incomplete => T::fwd(NetStage::Params).clearing(Reset::Method),
            _ => T::fwd(NetStage::Mount),
        },
        NetStage::Mount => match event {
            NetEvent::Mounted => T::fwd(NetStage::Done),
            NetEvent::NetworkFailure => T::back(NetStage::Ip).clearing(Reset::IpInfo),
            NetEvent::MountFailure | NetEvent::Mismatch | NetEvent::NoTree => {
                T::back(NetStage::Params).clearing(Reset::Method)
            }
            _ => T::back(NetStage::Params),
        },
        NetStage::Done | NetStage::Abort => T::to(stage, dir),
    }
}

/// Hard drive mounter stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HdStage {
    /// Try a partition pinned by the command line or kickstart.
    Pinned,
    /// List candidate partitions.
    Enumerate,
    /// No partitions: offer to add devices.
    NoDisks,
    /// Let the user pick a partition and directory.
    Select,
    /// Load a driver disk requested from the selection screen.
    DriverDisk,
    /// Mount the chosen partition and stage its images.
    Mount,
    /// Source resolved.
    Done,
    /// The user backed out of the mounter.
    Abort,
}

impl HdStage {
    /// Every stage.
    pub const ALL: [HdStage; 8] = [
        HdStage::Pinned,
        HdStage::Enumerate,
        HdStage::NoDisks,
        HdStage::Select,
        HdStage::DriverDisk,
        HdStage::Mount,
        HdStage::Done,
        HdStage::Abort,
    ];

    /// True for `Done` and `Abort`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Abort)
    }
}

/// Outcome of a hard drive mounter stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HdEvent {
    /// Nothing pinned; continue interactively.
    Skipped,
    /// Pinned data lacks a partition or directory.
    Incomplete,
    /// Partitions are available.
    Found,
    /// No partitions exist.
    Empty,
    /// A driver disk was loaded.
    Loaded,
    /// The user declined or backed out.
    Back,
    /// The user picked a partition.
    Selected,
    /// The user asked for a driver disk.
    MoreDevices,
    /// Images were mounted and validated.
    Mounted,
    /// The partition held no usable images.
    MountFailed,
}

impl HdEvent {
    /// Every event.
    pub const ALL: [HdEvent; 10] = [
        HdEvent::Skipped,
        HdEvent::Incomplete,
        HdEvent::Found,
        HdEvent::Empty,
        HdEvent::Loaded,
        HdEvent::Back,
        HdEvent::Selected,
        HdEvent::MoreDevices,
        HdEvent::Mounted,
        HdEvent::MountFailed,
    ];
}

/// Hard drive mounter transition function.
#[must_use]
pub fn next_hd(stage: HdStage, event: HdEvent, dir: Direction) -> Transition<HdStage> {
    use Transition as T;
    match stage {
        HdStage::Pinned => match event {
            HdEvent::Mounted => T::fwd(HdStage::Done),
            HdEvent::Incomplete | HdEvent::MountFailed => {
                T::fwd(HdStage::Enumerate).clearing(Reset::Method)
            }
            _ => T::fwd(HdStage::Enumerate),
        },
        HdStage::Enumerate => match event {
            HdEvent::Empty => T::fwd(HdStage::NoDisks),
            _ => T::fwd(HdStage::Select),
        },
        HdStage::NoDisks => match event {
            HdEvent::Loaded => T::fwd(HdStage::Enumerate),
            _ => T::back(HdStage::Abort),
        },
        HdStage::Select => match event {
            HdEvent::Back => T::back(HdStage::Abort),
            HdEvent::MoreDevices => T::fwd(HdStage::DriverDisk),
            _ => T::fwd(HdStage::Mount),
        },
        HdStage::DriverDisk => T::fwd(HdStage::Enumerate),
        HdStage::Mount => match event {
            HdEvent::Mounted => T::fwd(HdStage::Done),
            _ => T::back(HdStage::Enumerate),
        },
        HdStage::Done | HdStage::Abort => T::to(stage, dir),
    }
}

/// CD mounter stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CdStage {
    /// Look for a disc holding the install tree.
    Probe,
    /// Ask the user to insert a disc.
    Insert,
    /// Disc found.
    Done,
    /// The user backed out.
    Abort,
}

impl CdStage {
    /// Every stage.
    pub const ALL: [CdStage; 4] = [CdStage::Probe, CdStage::Insert, CdStage::Done, CdStage::Abort];
}

/// Outcome of a CD mounter stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CdEvent {
    /// A matching disc was mounted.
    Found,
    /// No drive held a matching disc.
    NotFound,
    /// The user confirmed a new disc is in the drive.
    Inserted,
    /// The user backed out.
    Back,
}

impl CdEvent {
    /// Every event.
    pub const ALL: [CdEvent; 4] = [CdEvent::Found, CdEvent::NotFound, CdEvent::Inserted, CdEvent::Back];
}

/// CD mounter transition function.
#[must_use]
pub fn next_cd(stage: CdStage, event: CdEvent, dir: Direction) -> Transition<CdStage> {
    use Transition as T;
    match (stage, event) {
        (CdStage::Done | CdStage::Abort, _) => T::to(stage, dir),
        (_, CdEvent::Found) => T::fwd(CdStage::Done),
        (_, CdEvent::Back) => T::back(CdStage::Abort),
        (CdStage::Probe, _) => T::fwd(CdStage::Insert),
        (CdStage::Insert, _) => T::fwd(CdStage::Probe),
    }
}

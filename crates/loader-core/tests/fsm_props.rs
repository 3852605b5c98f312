// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Property checks over the wizard and mounter transition tables.
// Author: Lukas Bower

use loader_core::fsm::{
    next, next_cd, next_hd, next_net, CdEvent, CdStage, Direction, Event, HdEvent, HdStage, NetEvent,
    NetStage, Reset, Step,
};
use proptest::prelude::*;
use proptest::sample::select;

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Forward), Just(Direction::Backward)]
}

fn order(step: Step) -> usize {
    Step::ALL.iter().position(|s| *s == step).unwrap_or(usize::MAX)
}

proptest! {
    #[test]
    fn only_url_step_finishes(step in select(Step::ALL.to_vec()), event in select(Event::ALL.to_vec()), dir in direction()) {
        let t = next(step, event, dir);
        if t.state == Step::Done && step != Step::Done {
            prop_assert_eq!(step, Step::Url);
            prop_assert_eq!(t.dir, Direction::Forward);
        }
    }

    #[test]
    fn backing_out_moves_to_an_earlier_step(
        step in select(Step::ALL[1..9].to_vec()),
        event in select(vec![Event::Back, Event::Failed]),
        dir in direction(),
    ) {
        let t = next(step, event, dir);
        prop_assert!(order(t.state) < order(step), "{:?} -> {:?}", step, t.state);
        prop_assert_eq!(t.dir, Direction::Backward);
    }

    #[test]
    fn url_failure_always_drops_addressing(event in select(Event::ALL.to_vec()), dir in direction()) {
        let t = next(Step::Url, event, dir);
        if !matches!(event, Event::Done | Event::MediaFound | Event::Retry) {
            prop_assert_eq!(t.state, Step::Ip);
            prop_assert_eq!(t.reset, Reset::IpInfo);
        }
    }

    #[test]
    fn net_mount_never_revisits_interface(event in select(NetEvent::ALL.to_vec()), dir in direction()) {
        let t = next_net(NetStage::Mount, event, dir);
        prop_assert_ne!(t.state, NetStage::Iface);
        prop_assert_ne!(t.state, NetStage::Abort);
    }

    #[test]
    fn net_terminals_absorb(
        stage in select(vec![NetStage::Done, NetStage::Abort]),
        event in select(NetEvent::ALL.to_vec()),
        dir in direction(),
    ) {
        let t = next_net(stage, event, dir);
        prop_assert_eq!(t.state, stage);
        prop_assert!(t.state.is_terminal());
    }

    #[test]
    fn hd_done_requires_a_mount(stage in select(HdStage::ALL.to_vec()), event in select(HdEvent::ALL.to_vec()), dir in direction()) {
        let t = next_hd(stage, event, dir);
        if t.state == HdStage::Done && stage != HdStage::Done {
            prop_assert_eq!(event, HdEvent::Mounted);
        }
        if t.reset == Reset::Method {
            prop_assert_eq!(stage, HdStage::Pinned);
        }
    }

    #[test]
    fn cd_found_always_finishes(stage in select(vec![CdStage::Probe, CdStage::Insert]), dir in direction()) {
        prop_assert_eq!(next_cd(stage, CdEvent::Found, dir).state, CdStage::Done);
        prop_assert_eq!(next_cd(stage, CdEvent::Back, dir).state, CdStage::Abort);
    }

    #[test]
    fn cd_table_is_total(stage in select(CdStage::ALL.to_vec()), event in select(CdEvent::ALL.to_vec()), dir in direction()) {
        let t = next_cd(stage, event, dir);
        prop_assert!(CdStage::ALL.contains(&t.state));
    }
}

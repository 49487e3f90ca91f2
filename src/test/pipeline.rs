use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::common::{POP0, POP1, POP2, Recorder, Seen, abc_sfs, deterministic_config, ms, params, pinned_action, sfc, triangle};
use crate::SimError;
use crate::config::SimConfig;
use crate::interface::{Coordinator, FlowSimulator, PassOutcome, SimContext, SimulatorAction};
use crate::metrics::DropReason;
use crate::net::{Network, NodeId, NodeKind};
use crate::params::SimulatorParams;
use crate::sfc::{Flow, FlowState, ServiceFunction};

fn started(params: SimulatorParams, action: SimulatorAction) -> FlowSimulator {
    let mut sim = FlowSimulator::new(params);
    sim.apply_action(action).expect("valid action");
    sim
}

fn drops(sim: &FlowSimulator) -> Vec<(DropReason, u64)> {
    sim.metrics().drop_reasons.iter().map(|(r, c)| (*r, *c)).collect()
}

/// Logs the ttl of every flow handed to `pass_flow`.
#[derive(Clone, Default)]
struct TtlWatcher {
    passed: Arc<Mutex<Vec<f64>>>,
}

impl Coordinator for TtlWatcher {
    fn pass_flow(&mut self, flow: &mut Flow, _ctx: &mut SimContext<'_>) -> crate::Result<PassOutcome> {
        self.passed.lock().expect("log lock").push(flow.ttl);
        Ok(PassOutcome::Fallback)
    }
}

#[test]
fn flow_with_zero_ttl_is_dropped_on_arrival() {
    let config = SimConfig {
        ttl_choices: vec![0.0],
        ..deterministic_config(10.0, 5.0)
    };
    let p = params(triangle(10.0, 100.0), &["a"], config, 1);
    let watcher = TtlWatcher::default();
    let mut sim =
        started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0])).with_coordinator(watcher.clone());
    sim.run_until(ms(25.0)).expect("run");

    assert_eq!(sim.metrics().generated_flows, 3);
    assert_eq!(drops(&sim), vec![(DropReason::Ttl, 3)]);
    assert_eq!(sim.metrics().processed_flows, 0);
    // expired flows never reach the algorithm
    assert!(watcher.passed.lock().expect("log lock").is_empty());
}

#[test]
fn live_flows_still_reach_pass_flow() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 5.0), 1);
    let watcher = TtlWatcher::default();
    let mut sim =
        started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0])).with_coordinator(watcher.clone());
    sim.run_until(ms(100.0)).expect("run");

    // ingress arrival, after `a`, then at egress pop2
    assert_eq!(*watcher.passed.lock().expect("log lock"), vec![1000.0, 999.0, 989.0]);
    assert_eq!(sim.metrics().processed_flows, 1);
}

#[test]
fn ttl_expires_in_flight() {
    let config = SimConfig {
        ttl_choices: vec![15.0],
        ..deterministic_config(1000.0, 5.0)
    };
    let p = params(triangle(10.0, 100.0), &["a"], config, 1);
    let rec = Recorder::default();
    let mut sim = started(p, pinned_action(&[(POP1, "a")], &[("a", POP1)], &[POP0])).with_coordinator(rec.clone());
    sim.run_until(ms(100.0)).expect("run");

    // pop0 -> pop1 (10) + a (1) + pop1 -> pop2 (10) > 15
    assert_eq!(drops(&sim), vec![(DropReason::Ttl, 1)]);
    let seen = rec.seen();
    assert!(matches!(seen.last(), Some(Seen::Drop(_, DropReason::Ttl))));
}

#[test]
fn missing_schedule_rule_drops_with_no_rule() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(10.0, 5.0), 1);
    let mut placement = crate::sfc::Placement::new();
    placement.place(POP0, "a");
    let mut sim = started(p, SimulatorAction::new(placement, crate::sfc::Schedule::new()));
    sim.run_until(ms(0.0)).expect("run");

    assert_eq!(drops(&sim), vec![(DropReason::NoRule, 1)]);
}

#[test]
fn unplaced_destination_drops_with_no_placement() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 5.0), 1);
    let mut sim = started(p, pinned_action(&[], &[("a", POP1)], &[POP0]));
    sim.run_until(ms(9.0)).expect("run");
    assert!(drops(&sim).is_empty());

    sim.run_until(ms(10.0)).expect("run");
    assert_eq!(drops(&sim), vec![(DropReason::NoPlacement, 1)]);
    let dropped = sim.metrics().stats();
    assert_eq!(dropped.avg_end2end_delay_of_dropped, 10.0);
}

#[test]
fn unreachable_destination_drops_with_no_path() {
    let mut net = triangle(10.0, 100.0);
    let island = net.add_node("pop3", NodeKind::Normal, 10.0);
    let p = params(net, &["a"], deterministic_config(1000.0, 5.0), 1);
    let mut sim = started(p, pinned_action(&[(island, "a")], &[("a", island)], &[POP0]));
    sim.run_until(ms(1.0)).expect("run");

    assert_eq!(drops(&sim), vec![(DropReason::NoPath, 1)]);
}

#[test]
fn node_load_is_held_for_flow_duration() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 50.0), 1);
    let mut sim = started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0]));

    sim.run_until(ms(0.5)).expect("run");
    let pop0 = sim.params().network.node(POP0).expect("pop0");
    assert_eq!(pop0.remaining_cap, 9.0);
    assert_eq!(pop0.available_sf["a"].load, 1.0);
    sim.check_invariants().expect("invariants while processing");

    // processing ends at 1 ms, the load is released 50 ms later
    sim.run_until(ms(50.5)).expect("run");
    assert_eq!(sim.params().network.node(POP0).expect("pop0").remaining_cap, 9.0);
    sim.run_until(ms(51.0)).expect("run");
    let pop0 = sim.params().network.node(POP0).expect("pop0");
    assert_eq!(pop0.remaining_cap, 10.0);
    assert_eq!(pop0.available_sf["a"].load, 0.0);
    assert_eq!(sim.metrics().processed_flows, 1);
    sim.check_invariants().expect("invariants after release");
}

#[test]
fn node_without_capacity_drops_after_one_retry() {
    let p = params(triangle(0.5, 100.0), &["a"], deterministic_config(1000.0, 5.0), 1);
    let mut sim = started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0]));
    sim.run_until(ms(0.0)).expect("run");

    assert_eq!(drops(&sim), vec![(DropReason::Capacity, 1)]);
    assert_eq!(sim.params().network.node(POP0).expect("pop0").remaining_cap, 0.5);
    sim.check_invariants().expect("invariants");
}

#[test]
fn startup_delay_postpones_processing() {
    let mut sfs = abc_sfs();
    sfs.insert("a".to_string(), ServiceFunction::new("a", 1.0, 0.0).with_startup_delay(5.0));
    let p = SimulatorParams::new(triangle(10.0, 100.0), sfs, sfc(&["a"]), deterministic_config(1000.0, 5.0), 1)
        .expect("params");
    let rec = Recorder::default();
    let mut sim = started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0])).with_coordinator(rec.clone());
    sim.run_until(ms(100.0)).expect("run");

    // warmup 5 + processing 1 + pop0 -> pop2 10
    let departed: Vec<f64> = rec
        .seen()
        .into_iter()
        .filter_map(|s| match s {
            Seen::Depart(_, e2e, _, _) => Some(e2e),
            _ => None,
        })
        .collect();
    assert_eq!(departed, vec![16.0]);
}

/// Installs per-flow rules at creation: forward pop0 -> pop1, process `a` at pop1.
struct OverlayRoute;

impl Coordinator for OverlayRoute {
    fn init_flow(&mut self, flow: &mut Flow, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        let mut action = ctx.derive_action();
        action.set_forwarding(POP0, flow.flow_id.clone(), POP1);
        action.set_processing(POP1, flow.flow_id.clone(), vec!["a".to_string()]);
        ctx.apply(action)
    }
}

#[test]
fn rule_overlays_take_precedence_over_schedule() {
    let p = params(triangle(10.0, 5.0), &["a"], deterministic_config(1000.0, 50.0), 1);
    // the schedule alone would process `a` locally at pop0
    let action = pinned_action(&[(POP0, "a"), (POP1, "a")], &[("a", POP0)], &[POP0, POP1]);
    let mut sim = started(p, action).with_coordinator(OverlayRoute);

    sim.run_until(ms(5.0)).expect("run");
    let net = &sim.params().network;
    let l01 = net.link_between(POP0, POP1).expect("link");
    let l02 = net.link_between(POP0, POP2).expect("link");
    assert_eq!(net.link(l01).expect("link").remaining_cap, 4.0);
    assert_eq!(net.link(l02).expect("link").remaining_cap, 5.0);

    sim.run_until(ms(30.0)).expect("run");
    assert_eq!(sim.metrics().processed_flows, 1);
    let stats = sim.metrics().stats();
    assert_eq!(stats.avg_path_delay_of_processed, 20.0);
    assert_eq!(stats.avg_end2end_delay, 21.0);
    assert!(sim.params().flow_forwarding_rules.values().all(|r| r.is_empty()));
    assert!(sim.params().flow_processing_rules.values().all(|r| r.is_empty()));

    // overlay forwarding holds the link for path delay + duration
    sim.run_until(ms(59.0)).expect("run");
    assert_eq!(sim.params().network.link(l01).expect("link").remaining_cap, 4.0);
    sim.run_until(ms(60.0)).expect("run");
    assert_eq!(sim.params().network.link(l01).expect("link").remaining_cap, 5.0);
    sim.check_invariants().expect("invariants");
}

#[test]
fn blocked_overlay_link_drops_with_capacity() {
    let p = params(triangle(10.0, 0.5), &["a"], deterministic_config(1000.0, 5.0), 1);
    let action = pinned_action(&[(POP1, "a")], &[("a", POP1)], &[POP0]);
    let mut sim = started(p, action).with_coordinator(OverlayRoute);
    sim.run_until(ms(1.0)).expect("run");

    assert_eq!(drops(&sim), vec![(DropReason::Capacity, 1)]);
    for link in sim.params().network.links() {
        assert_eq!(link.remaining_cap, 0.5);
    }
}

/// Sends every flow along pop0 -> pop1 -> pop2 without touching the schedule.
struct PlannedPath;

impl Coordinator for PlannedPath {
    fn init_flow(&mut self, flow: &mut Flow, _ctx: &mut SimContext<'_>) -> crate::Result<()> {
        flow.path = VecDeque::from([POP0, POP1, POP2]);
        Ok(())
    }
}

#[test]
fn planned_path_is_followed_hop_by_hop() {
    let p = params(triangle(10.0, 100.0), &[], deterministic_config(1000.0, 50.0), 1);
    let mut sim = started(p, SimulatorAction::default()).with_coordinator(PlannedPath);

    sim.run_until(ms(15.0)).expect("run");
    let net = &sim.params().network;
    let cap = |a: NodeId, b: NodeId| {
        net.link(net.link_between(a, b).expect("link"))
            .expect("link")
            .remaining_cap
    };
    assert_eq!(cap(POP0, POP1), 99.0);
    assert_eq!(cap(POP1, POP2), 99.0);
    assert_eq!(cap(POP0, POP2), 100.0);

    sim.run_until(ms(100.0)).expect("run");
    assert_eq!(sim.metrics().processed_flows, 1);
    assert_eq!(sim.metrics().crossed_links, 2);
    assert_eq!(sim.metrics().stats().avg_path_delay_of_processed, 20.0);
    assert!(sim.params().network.links().iter().all(|l| l.remaining_cap == 100.0));
}

#[test]
fn refused_path_hop_is_not_skipped() {
    let mut net = triangle(10.0, 100.0);
    let l01 = net.link_between(POP0, POP1).expect("link");
    let link = net.link_mut(l01).expect("link");
    link.cap = 0.0;
    link.remaining_cap = 0.0;
    let p = params(net, &[], deterministic_config(1000.0, 50.0), 1);
    let rec = Recorder::default();
    let mut sim = started(p, SimulatorAction::default()).with_coordinator(PlannedPathVia(rec.clone()));
    sim.run_until(ms(100.0)).expect("run");

    assert_eq!(drops(&sim), vec![(DropReason::Capacity, 1)]);
    assert_eq!(sim.metrics().processed_flows, 0);
    assert_eq!(sim.metrics().crossed_links, 0);
    assert!(
        sim.params()
            .network
            .links()
            .iter()
            .all(|l| l.remaining_cap == l.cap)
    );
    assert!(matches!(rec.seen().last(), Some(Seen::Drop(_, DropReason::Capacity))));
}

/// Same plan as [`PlannedPath`], also recording lifecycle callbacks.
struct PlannedPathVia(Recorder);

impl Coordinator for PlannedPathVia {
    fn init_flow(&mut self, flow: &mut Flow, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        flow.path = VecDeque::from([POP0, POP1, POP2]);
        self.0.init_flow(flow, ctx)
    }

    fn depart_flow(&mut self, flow: &Flow, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        self.0.depart_flow(flow, ctx)
    }

    fn drop_flow(&mut self, flow: &Flow, reason: DropReason, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        self.0.drop_flow(flow, reason, ctx)
    }
}

/// Forwards pop0 -> pop2 (not adjacent) and processes `a` there.
struct DetourRoute;

impl Coordinator for DetourRoute {
    fn init_flow(&mut self, flow: &mut Flow, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        let mut action = ctx.derive_action();
        action.set_forwarding(POP0, flow.flow_id.clone(), POP2);
        action.set_processing(POP2, flow.flow_id.clone(), vec!["a".to_string()]);
        ctx.apply(action)
    }
}

#[test]
fn overlay_forwarding_routes_around_blocked_link() {
    // pop0 -5- pop1 -5- pop2 is shorter but pop0 -> pop1 is blocked;
    // pop0 -10- pop3 -10- pop2 has room
    let mut net = Network::new();
    let pop0 = net.add_node("pop0", NodeKind::Ingress, 10.0);
    let pop1 = net.add_node("pop1", NodeKind::Normal, 10.0);
    let pop2 = net.add_node("pop2", NodeKind::Egress, 10.0);
    let pop3 = net.add_node("pop3", NodeKind::Normal, 10.0);
    net.connect_bidirectional(pop0, pop1, 5.0, 0.0, 0.0);
    net.connect_bidirectional(pop1, pop2, 5.0, 100.0, 100.0);
    net.connect_bidirectional(pop0, pop3, 10.0, 100.0, 100.0);
    net.connect_bidirectional(pop3, pop2, 10.0, 100.0, 100.0);
    let p = params(net, &["a"], deterministic_config(1000.0, 50.0), 1);
    let action = pinned_action(&[(POP2, "a")], &[("a", POP2)], &[POP0]);
    let mut sim = started(p, action).with_coordinator(DetourRoute);

    sim.run_until(ms(5.0)).expect("run");
    let net = &sim.params().network;
    let remaining = |a: NodeId, b: NodeId| {
        net.link(net.link_between(a, b).expect("link"))
            .expect("link")
            .remaining_cap
    };
    assert_eq!(remaining(pop0, pop3), 99.0);
    assert_eq!(remaining(pop3, pop2), 99.0);
    assert_eq!(remaining(pop1, pop2), 100.0);

    sim.run_until(ms(100.0)).expect("run");
    assert!(drops(&sim).is_empty());
    assert_eq!(sim.metrics().processed_flows, 1);
    assert_eq!(sim.metrics().crossed_links, 2);
    assert_eq!(sim.metrics().stats().avg_path_delay_of_processed, 20.0);
    sim.check_invariants().expect("invariants");
}

/// Claims to have installed rules but never does.
struct EmptyPromise;

impl Coordinator for EmptyPromise {
    fn pass_flow(&mut self, _flow: &mut Flow, _ctx: &mut SimContext<'_>) -> crate::Result<PassOutcome> {
        Ok(PassOutcome::RulesInstalled)
    }
}

#[test]
fn rules_installed_without_rule_drops_flow() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 5.0), 1);
    let mut sim = started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0])).with_coordinator(EmptyPromise);
    sim.run_until(ms(0.0)).expect("run");

    assert_eq!(drops(&sim), vec![(DropReason::AlgorithmDecision, 1)]);
}

struct MarkDropped;

impl Coordinator for MarkDropped {
    fn pass_flow(&mut self, flow: &mut Flow, _ctx: &mut SimContext<'_>) -> crate::Result<PassOutcome> {
        flow.state = FlowState::Drop;
        Ok(PassOutcome::Fallback)
    }
}

#[test]
fn drop_state_set_by_algorithm_drops_flow() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 5.0), 1);
    let mut sim = started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0])).with_coordinator(MarkDropped);
    sim.run_until(ms(0.0)).expect("run");

    assert_eq!(drops(&sim), vec![(DropReason::AlgorithmDecision, 1)]);
}

struct Failing;

impl Coordinator for Failing {
    fn pass_flow(&mut self, _flow: &mut Flow, _ctx: &mut SimContext<'_>) -> crate::Result<PassOutcome> {
        Err(SimError::Algorithm("no route for you".to_string()))
    }
}

#[test]
fn callback_error_drops_flow_but_keeps_running() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(10.0, 5.0), 1);
    let mut sim = started(p, pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0])).with_coordinator(Failing);
    sim.run_until(ms(35.0)).expect("algorithm errors are not fatal");

    assert_eq!(drops(&sim), vec![(DropReason::AlgorithmError, 4)]);
    assert!(sim.world().error().is_none());
}

#[test]
fn flows_without_egress_depart_after_last_sf() {
    let mut p = params(triangle(10.0, 100.0), &["a", "b"], deterministic_config(1000.0, 5.0), 1);
    p.egress_nodes.clear();
    let rec = Recorder::default();
    let action = pinned_action(&[(POP0, "a"), (POP1, "b")], &[("a", POP0), ("b", POP1)], &[POP0, POP1]);
    let mut sim = started(p, action).with_coordinator(rec.clone());
    sim.run_until(ms(100.0)).expect("run");

    let seen = rec.seen();
    assert!(matches!(&seen[0], Seen::Init(_, t) if *t == 0.0));
    match &seen[1] {
        Seen::Depart(_, e2e, path, proc) => {
            assert_eq!((*e2e, *path, *proc), (12.0, 10.0, 2.0));
        }
        other => panic!("unexpected {other:?}"),
    }
}

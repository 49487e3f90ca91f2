use std::sync::{Arc, Mutex};

use super::common::{POP0, POP1, POP2, deterministic_config, ms, params, pinned_action, triangle};
use crate::SimError;
use crate::config::SimConfig;
use crate::interface::{Coordinator, FlowSimulator, Periodic, SimContext};
use crate::net::{NodeId, NodeKind};
use crate::sfc::{Flow, Schedule};

#[derive(Clone, Default)]
struct Ticks {
    at: Arc<Mutex<Vec<(String, f64)>>>,
}

impl Coordinator for Ticks {
    fn periodic(&self) -> Vec<Periodic> {
        vec![
            Periodic::new("fast", 10.0),
            Periodic::new("slow", 25.0),
            Periodic::new("broken", 0.0),
        ]
    }

    fn on_periodic(&mut self, label: &str, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        self.at
            .lock()
            .expect("lock")
            .push((label.to_string(), ctx.now().as_millis_f64()));
        Ok(())
    }
}

#[test]
fn periodic_callbacks_fire_every_interval_after_start() {
    let p = params(triangle(10.0, 100.0), &["a"], SimConfig { inter_arrival_mean: None, ..SimConfig::default() }, 1);
    let ticks = Ticks::default();
    let mut sim = FlowSimulator::new(p).with_coordinator(ticks.clone());
    sim.run_until(ms(50.0)).expect("run");

    let fired = ticks.at.lock().expect("lock").clone();
    let fast: Vec<f64> = fired.iter().filter(|(l, _)| l == "fast").map(|(_, t)| *t).collect();
    let slow: Vec<f64> = fired.iter().filter(|(l, _)| l == "slow").map(|(_, t)| *t).collect();
    assert_eq!(fast, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    assert_eq!(slow, vec![25.0, 50.0]);
    assert!(fired.iter().all(|(l, _)| l != "broken"));
}

/// Pushes an action that references a node outside the topology.
struct Rogue;

impl Coordinator for Rogue {
    fn periodic(&self) -> Vec<Periodic> {
        vec![Periodic::new("rogue", 5.0)]
    }

    fn on_periodic(&mut self, _label: &str, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        let mut action = ctx.derive_action();
        action.placement.place(NodeId(42), "a");
        ctx.apply(action)
    }
}

#[test]
fn invalid_action_from_callback_aborts_run() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1.0, 1.0), 1);
    let mut sim = FlowSimulator::new(p)
        .with_coordinator(Rogue);
    sim.apply_action(pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0]))
        .expect("valid action");

    let err = sim.run_until(ms(100.0)).expect_err("protocol error");
    assert!(matches!(err, SimError::Protocol { at, .. } if at == ms(5.0)));
    assert_eq!(sim.now(), ms(5.0));
    // stays aborted
    assert!(matches!(sim.run_until(ms(200.0)), Err(SimError::Protocol { .. })));
    assert!(matches!(sim.step(), Err(SimError::Protocol { .. })));
}

#[test]
fn invalid_schedule_is_rejected_and_aborts() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(10.0, 1.0), 1);
    let mut sim = FlowSimulator::new(p);
    let mut schedule = Schedule::new();
    schedule.set(POP0, "sfc_1", "a", POP1, 0.5);
    schedule.set(POP0, "sfc_1", "a", POP2, 0.2);
    let mut action = pinned_action(&[(POP1, "a")], &[], &[]);
    action.scheduling = schedule;

    let err = sim.apply_action(action).expect_err("probabilities sum to 0.7");
    assert!(matches!(err, SimError::Protocol { .. }));
    assert!(sim.params().placement.is_empty());
    assert!(sim.run_until(ms(10.0)).is_err());
}

#[test]
fn unknown_sf_in_placement_is_rejected() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(10.0, 1.0), 1);
    let mut sim = FlowSimulator::new(p);
    let action = pinned_action(&[(POP0, "zz")], &[], &[]);
    assert!(matches!(sim.apply_action(action), Err(SimError::Protocol { .. })));
}

#[test]
fn applying_the_same_action_twice_is_idempotent() {
    let p = params(triangle(10.0, 100.0), &["a", "b"], deterministic_config(5.0, 20.0), 3);
    let mut sim = FlowSimulator::new(p);
    let action = pinned_action(
        &[(POP0, "a"), (POP1, "b"), (POP2, "b")],
        &[("a", POP0), ("b", POP1)],
        &[POP0, POP1, POP2],
    );
    sim.apply_action(action.clone()).expect("first apply");
    sim.run_until(ms(42.0)).expect("run");

    let before = sim.state();
    sim.apply_action(action.clone()).expect("second apply");
    let after = sim.state();
    assert_eq!(sim.derive_action(), action);
    for (a, b) in before.nodes.iter().zip(&after.nodes) {
        assert_eq!(a.available_sf, b.available_sf);
        assert_eq!(a.remaining_cap, b.remaining_cap);
    }
    sim.check_invariants().expect("invariants");
}

#[test]
fn placed_sfs_join_with_startup_time_of_apply() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 1.0), 1);
    let mut sim = FlowSimulator::new(p);
    sim.apply_action(pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0]))
        .expect("apply");
    sim.run_until(ms(30.0)).expect("run");

    let mut action = sim.derive_action();
    action.placement.place(POP1, "b");
    sim.apply_action(action).expect("apply");
    let pop1 = sim.params().network.node(POP1).expect("pop1");
    assert_eq!(pop1.available_sf["b"].startup_time, ms(30.0));
    let pop0 = sim.params().network.node(POP0).expect("pop0");
    assert_eq!(pop0.available_sf["a"].startup_time, crate::sim::SimTime::ZERO);
}

#[test]
fn removed_idle_sf_is_evicted_without_timeout() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 1.0), 1);
    let mut sim = FlowSimulator::new(p);
    sim.apply_action(pinned_action(&[(POP0, "a"), (POP1, "a")], &[("a", POP0)], &[POP0]))
        .expect("apply");
    sim.run_until(ms(30.0)).expect("run");

    let mut action = sim.derive_action();
    action.placement.remove(POP1, "a");
    sim.apply_action(action).expect("apply");
    assert!(sim.params().network.node(POP1).expect("pop1").available_sf.is_empty());
    assert!(sim.params().network.node(POP0).expect("pop0").available_sf.contains_key("a"));
}

#[test]
fn state_reports_requested_or_predicted_traffic() {
    let config = deterministic_config(10.0, 1.0);
    let p = params(triangle(10.0, 100.0), &["a"], config.clone(), 1);
    let mut sim = FlowSimulator::new(p);
    sim.apply_action(pinned_action(&[(POP0, "a")], &[("a", POP0)], &[POP0]))
        .expect("apply");
    sim.run_until(ms(45.0)).expect("run");
    // flows at 0, 10, 20, 30, 40 with dr 1
    assert_eq!(sim.state().traffic[&POP0]["sfc_1"], 5.0);

    let predicted = SimConfig { prediction: true, ..config };
    let p = params(triangle(10.0, 100.0), &["a"], predicted, 1);
    let sim = FlowSimulator::new(p);
    assert_eq!(sim.state().traffic[&POP0]["sfc_1"], 0.1);
}

#[test]
fn network_copy_is_detached() {
    let p = params(triangle(10.0, 100.0), &["a"], SimConfig::default(), 1);
    let sim = FlowSimulator::new(p);
    let mut copy = sim.network_copy();
    copy.add_node("pop9", NodeKind::Normal, 1.0);
    copy.node_mut(POP0).expect("pop0").remaining_cap = 0.0;
    assert_eq!(sim.params().network.node_count(), 3);
    assert_eq!(sim.params().network.node(POP0).expect("pop0").remaining_cap, 10.0);
}

/// Records every hop the engine reports after forwarding.
#[derive(Clone, Default)]
struct Hops {
    seen: Arc<Mutex<Vec<(NodeId, f64)>>>,
}

impl Coordinator for Hops {
    fn post_forwarding(&mut self, node: NodeId, flow: &mut Flow, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        assert_eq!(flow.current_node_id, node);
        self.seen
            .lock()
            .expect("lock")
            .push((node, ctx.now().as_millis_f64()));
        Ok(())
    }
}

#[test]
fn post_forwarding_sees_each_arrival() {
    let p = params(triangle(10.0, 100.0), &["a"], deterministic_config(1000.0, 1.0), 1);
    let hops = Hops::default();
    let mut sim = FlowSimulator::new(p).with_coordinator(hops.clone());
    sim.apply_action(pinned_action(&[(POP1, "a")], &[("a", POP1)], &[POP0]))
        .expect("apply");
    sim.run_until(ms(100.0)).expect("run");

    let seen = hops.seen.lock().expect("lock").clone();
    assert_eq!(seen, vec![(POP1, 10.0), (POP2, 21.0)]);
    assert_eq!(sim.metrics().processed_flows, 1);
}

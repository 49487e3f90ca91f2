use crate::config::SimConfig;
use crate::interface::{Coordinator, SimContext, SimulatorAction};
use crate::metrics::DropReason;
use crate::net::{Network, NodeId, NodeKind};
use crate::params::SimulatorParams;
use crate::sfc::{Flow, Placement, Schedule, ServiceFunction, SfList, SfcList};
use crate::sim::SimTime;
use std::sync::{Arc, Mutex};

pub const POP0: NodeId = NodeId(0);
pub const POP1: NodeId = NodeId(1);
pub const POP2: NodeId = NodeId(2);

/// pop0 (Ingress) - pop1 (Normal) - pop2 (Egress), fully connected, 10 ms per link.
pub fn triangle(node_cap: f64, link_cap: f64) -> Network {
    let mut net = Network::new();
    let a = net.add_node("pop0", NodeKind::Ingress, node_cap);
    let b = net.add_node("pop1", NodeKind::Normal, node_cap);
    let c = net.add_node("pop2", NodeKind::Egress, node_cap);
    net.connect_bidirectional(a, b, 10.0, link_cap, link_cap);
    net.connect_bidirectional(b, c, 10.0, link_cap, link_cap);
    net.connect_bidirectional(c, a, 10.0, link_cap, link_cap);
    net
}

/// SFs `a`, `b`, `c` with a fixed 1 ms processing delay.
pub fn abc_sfs() -> SfList {
    ["a", "b", "c"]
        .into_iter()
        .map(|id| (id.to_string(), ServiceFunction::new(id, 1.0, 0.0)))
        .collect()
}

pub fn sfc(chain: &[&str]) -> SfcList {
    SfcList::from([(
        "sfc_1".to_string(),
        chain.iter().map(|s| s.to_string()).collect(),
    )])
}

/// Deterministic arrivals every `gap` ms, dr 1, fixed flow duration.
pub fn deterministic_config(gap: f64, duration: f64) -> SimConfig {
    SimConfig {
        inter_arrival_mean: Some(crate::config::InterArrivalMean::Scalar(gap)),
        deterministic_arrival: true,
        deterministic_size: true,
        flow_duration: Some(duration),
        ..SimConfig::default()
    }
}

pub fn params(net: Network, chain: &[&str], config: SimConfig, seed: u64) -> SimulatorParams {
    SimulatorParams::new(net, abc_sfs(), sfc(chain), config, seed).expect("valid params")
}

/// Places each `(node, sf)` and schedules every SF of `sfc_1` at every node to `route(sf)`.
pub fn pinned_action(placed: &[(NodeId, &str)], route: &[(&str, NodeId)], nodes: &[NodeId]) -> SimulatorAction {
    let mut placement = Placement::new();
    for (node, sf) in placed {
        placement.place(*node, *sf);
    }
    let mut schedule = Schedule::new();
    for src in nodes {
        for (sf, dst) in route {
            schedule.set(*src, "sfc_1", *sf, *dst, 1.0);
        }
    }
    SimulatorAction::new(placement, schedule)
}

pub fn ms(v: f64) -> SimTime {
    SimTime::from_millis_f64(v)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Init(String, f64),
    Depart(String, f64, f64, f64),
    Drop(String, DropReason),
}

/// Records lifecycle callbacks; does not interfere with the pipeline.
#[derive(Clone, Default)]
pub struct Recorder {
    pub log: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<Seen> {
        self.log.lock().expect("log lock").clone()
    }
}

impl Coordinator for Recorder {
    fn init_flow(&mut self, flow: &mut Flow, ctx: &mut SimContext<'_>) -> crate::Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .push(Seen::Init(flow.flow_id.clone(), ctx.now().as_millis_f64()));
        Ok(())
    }

    fn depart_flow(&mut self, flow: &Flow, _ctx: &mut SimContext<'_>) -> crate::Result<()> {
        self.log.lock().expect("log lock").push(Seen::Depart(
            flow.flow_id.clone(),
            flow.end2end_delay,
            flow.path_delay,
            flow.processing_delay,
        ));
        Ok(())
    }

    fn drop_flow(&mut self, flow: &Flow, reason: DropReason, _ctx: &mut SimContext<'_>) -> crate::Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .push(Seen::Drop(flow.flow_id.clone(), reason));
        Ok(())
    }
}

/// Fresh directory under the system temp dir; callers remove it when done.
pub fn unique_temp_dir(prefix: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

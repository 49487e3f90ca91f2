//! 决策器
//!
//! 聚合模式按调度表做加权轮询（WRR）；逐流模式把流挂起在一次性信号上，
//! 等待外部智能体给出目的节点。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::flow_world::{FlowWorld, PendingDecision, flow_world};
use super::forwarder;
use super::pass::{depart, drop_flow};
use super::processor;
use crate::error::SimError;
use crate::metrics::DropReason;
use crate::net::NodeId;
use crate::sfc::Flow;
use crate::sim::{Event, SignalValue, SimTime, Simulator, Waiter, World};

/// 外部智能体对一个流的决策；None 表示丢弃
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowDecision {
    pub destination: Option<NodeId>,
}

impl FlowDecision {
    pub fn to(node: NodeId) -> Self {
        Self {
            destination: Some(node),
        }
    }

    pub fn discard() -> Self {
        Self { destination: None }
    }
}

/// 选择 `p - 已选比例` 最大的目的节点；概率为 0 的跳过，平局取第一个。
///
/// 长期来看每个目的节点被选中的比例收敛到其概率。
pub fn weighted_round_robin(
    weights: &BTreeMap<NodeId, f64>,
    counts: Option<&BTreeMap<NodeId, u64>>,
) -> Option<NodeId> {
    let total: u64 = counts.map_or(0, |c| c.values().sum());
    let mut best: Option<(NodeId, f64)> = None;
    for (dst, p) in weights {
        if *p <= 0.0 {
            continue;
        }
        let seen = counts.and_then(|c| c.get(dst)).copied().unwrap_or(0);
        let ratio = if total == 0 { 0.0 } else { seen as f64 / total as f64 };
        let deficit = p - ratio;
        if best.is_none_or(|(_, b)| deficit > b) {
            best = Some((*dst, deficit));
        }
    }
    best.map(|(dst, _)| dst)
}

/// 聚合模式：按调度表决定目的节点
pub(crate) fn schedule_decision(sim: &mut Simulator, w: &mut FlowWorld, mut flow: Flow) {
    let node = flow.current_node_id;
    if flow.forward_to_eg {
        return match flow.egress_node_id {
            Some(eg) => forwarder::jump(sim, w, flow, eg),
            None => depart(sim, w, flow),
        };
    }
    if let Some(target) = flow.target_node_id {
        return if target == node {
            processor::process(sim, w, flow)
        } else {
            forwarder::jump(sim, w, flow, target)
        };
    }

    let counts = w.metrics.decision_counts(node, &flow.sfc, &flow.current_sf);
    let chosen = w
        .params
        .schedule
        .weights(node, &flow.sfc, &flow.current_sf)
        .and_then(|weights| weighted_round_robin(weights, counts));
    let Some(dst) = chosen else {
        warn!(
            flow_id = %flow.flow_id,
            node = %w.params.network.name(node),
            sfc = %flow.sfc,
            sf = %flow.current_sf,
            "调度表中没有可用规则"
        );
        return drop_flow(sim, w, flow, DropReason::NoRule);
    };
    w.metrics.count_decision(node, &flow.sfc, &flow.current_sf, dst);
    flow.target_node_id = Some(dst);
    if dst == node {
        processor::process(sim, w, flow)
    } else {
        forwarder::jump(sim, w, flow, dst)
    }
}

/// 逐流模式：挂起流等待外部决策。同一时刻只接受一个决策请求，其余随机退避。
pub(crate) fn request_decision(sim: &mut Simulator, w: &mut FlowWorld, flow: Flow) {
    let now = sim.now();
    if w.last_decision_at == Some(now) || !w.decisions.is_empty() {
        let max = w.params.config.max_decision_backoff;
        let backoff = SimTime::from_millis_f64(w.params.sample_backoff(max)).max(SimTime(1));
        debug!(flow_id = %flow.flow_id, backoff = ?backoff, "同一时刻已有决策请求，退避");
        sim.schedule_in(backoff, RequestDecision { flow });
        return;
    }
    w.last_decision_at = Some(now);
    let signal = sim.signal();
    w.decisions.push_back(PendingDecision {
        signal,
        flow: flow.clone(),
    });
    debug!(flow_id = %flow.flow_id, node = ?flow.current_node_id, signal = ?signal, "等待外部决策");
    sim.wait(signal, Box::new(AwaitDecision { flow }));
}

/// 事件：退避结束后重新请求决策
#[derive(Debug)]
pub(crate) struct RequestDecision {
    flow: Flow,
}

impl Event for RequestDecision {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let RequestDecision { flow } = *self;
        let w = flow_world(world);
        request_decision(sim, w, flow);
    }
}

/// 挂起在决策信号上的流
pub(crate) struct AwaitDecision {
    flow: Flow,
}

impl Waiter for AwaitDecision {
    fn wake(self: Box<Self>, value: SignalValue, sim: &mut Simulator, world: &mut dyn World) {
        let AwaitDecision { flow } = *self;
        let w = flow_world(world);
        let Ok(decision) = value.downcast::<FlowDecision>() else {
            w.fail(SimError::protocol(sim.now(), "decision signal carried an unexpected value"));
            return;
        };
        let node = flow.current_node_id;
        match decision.destination {
            None => drop_flow(sim, w, flow, DropReason::AlgorithmDecision),
            Some(dst) if dst.0 >= w.params.network.node_count() => {
                warn!(flow_id = %flow.flow_id, dst = ?dst, "决策指向未知节点");
                drop_flow(sim, w, flow, DropReason::NoPath)
            }
            Some(dst) if dst == node => {
                if !flow.forward_to_eg {
                    processor::process(sim, w, flow)
                } else {
                    match flow.egress_node_id {
                        Some(eg) if eg != node => forwarder::jump(sim, w, flow, eg),
                        _ => depart(sim, w, flow),
                    }
                }
            }
            Some(dst) => forwarder::jump(sim, w, flow, dst),
        }
    }
}

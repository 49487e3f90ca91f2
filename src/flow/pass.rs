//! 流在节点上的处理流水线
//!
//! 每次流到达一个节点都会经过 `pass_flow`：
//! ttl 检查 -> 算法回调 -> 丢弃/出口检查 -> 逐流规则覆盖 -> 决策器。

use tracing::{debug, info, trace, warn};

use super::decision;
use super::flow_world::{FlowWorld, flow_world};
use super::forwarder;
use super::processor;
use crate::config::DecisionMode;
use crate::interface::PassOutcome;
use crate::metrics::DropReason;
use crate::sfc::Flow;
use crate::sim::{Event, Simulator, World};

/// 事件：把流交给当前节点处理
#[derive(Debug)]
pub(crate) struct PassFlow {
    pub(crate) flow: Flow,
}

impl Event for PassFlow {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let PassFlow { flow } = *self;
        let w = flow_world(world);
        pass_flow(sim, w, flow);
    }
}

#[tracing::instrument(level = "trace", skip_all, fields(flow_id = %flow.flow_id, node = ?flow.current_node_id))]
pub(crate) fn pass_flow(sim: &mut Simulator, w: &mut FlowWorld, mut flow: Flow) {
    if w.halted() {
        return;
    }
    let now = sim.now();
    let node = flow.current_node_id;
    trace!(sf = %flow.current_sf, ttl = flow.ttl, "流到达节点");
    if flow.ttl <= 0.0 {
        return drop_flow(sim, w, flow, DropReason::Ttl);
    }

    let outcome = match w.with_coordinator(now, |c, ctx| c.pass_flow(&mut flow, ctx)) {
        None => PassOutcome::Fallback,
        Some(Ok(outcome)) => outcome,
        Some(Err(e)) => {
            warn!(flow_id = %flow.flow_id, error = %e, "算法回调出错");
            return drop_flow(sim, w, flow, DropReason::AlgorithmError);
        }
    };
    if w.halted() {
        return;
    }

    if flow.is_dropped() {
        return drop_flow(sim, w, flow, DropReason::AlgorithmDecision);
    }
    if flow.at_egress() {
        return depart(sim, w, flow);
    }

    if !flow.forward_to_eg && has_processing_rule(w, &flow) {
        return processor::process(sim, w, flow);
    }
    let forward = w
        .params
        .flow_forwarding_rules
        .get(&node)
        .and_then(|rules| rules.get(&flow.flow_id))
        .copied();
    if let Some(next) = forward {
        return forwarder::forward_along(sim, w, flow, next);
    }
    while flow.path.front() == Some(&node) {
        flow.path.pop_front();
    }
    // 下一跳在转发被接受后才出队，被拒绝时重试的仍是同一跳
    if let Some(next) = flow.path.front().copied() {
        return forwarder::forward_along(sim, w, flow, next);
    }
    if outcome == PassOutcome::RulesInstalled {
        debug!(flow_id = %flow.flow_id, "算法声明已安装规则，但没有适用的规则");
        return drop_flow(sim, w, flow, DropReason::AlgorithmDecision);
    }

    match w.params.config.decision_mode {
        DecisionMode::Aggregate => decision::schedule_decision(sim, w, flow),
        DecisionMode::PerFlow => decision::request_decision(sim, w, flow),
    }
}

fn has_processing_rule(w: &FlowWorld, flow: &Flow) -> bool {
    w.params
        .flow_processing_rules
        .get(&flow.current_node_id)
        .and_then(|rules| rules.get(&flow.flow_id))
        .is_some_and(|sfs| sfs.contains(&flow.current_sf))
}

/// 流成功离开网络
pub(crate) fn depart(sim: &mut Simulator, w: &mut FlowWorld, flow: Flow) {
    let egress = flow.egress_node_id.unwrap_or(flow.current_node_id);
    let ingress2egress = w
        .params
        .network
        .path_delay(flow.ingress_node_id, egress)
        .unwrap_or(0.0);
    w.metrics.processed_flow(&flow, ingress2egress);
    w.live_flows = w.live_flows.saturating_sub(1);
    w.params.clear_flow_rules(&flow.flow_id);
    info!(
        flow_id = %flow.flow_id,
        sfc = %flow.sfc,
        end2end_delay = flow.end2end_delay,
        path_delay = flow.path_delay,
        now = ?sim.now(),
        "🏁 流处理完成并离开网络"
    );

    if let Some(Err(e)) = w.with_coordinator(sim.now(), |c, ctx| c.depart_flow(&flow, ctx)) {
        warn!(flow_id = %flow.flow_id, error = %e, "depart_flow 回调出错");
    }
}

/// 丢弃流
pub(crate) fn drop_flow(sim: &mut Simulator, w: &mut FlowWorld, flow: Flow, reason: DropReason) {
    w.metrics.dropped_flow(&flow, reason);
    w.live_flows = w.live_flows.saturating_sub(1);
    w.params.clear_flow_rules(&flow.flow_id);
    match reason {
        DropReason::Ttl | DropReason::AlgorithmDecision | DropReason::Capacity => debug!(
            flow_id = %flow.flow_id,
            node = ?flow.current_node_id,
            sf = %flow.current_sf,
            %reason,
            now = ?sim.now(),
            "🗑️ 丢弃流"
        ),
        _ => warn!(
            flow_id = %flow.flow_id,
            node = ?flow.current_node_id,
            sf = %flow.current_sf,
            %reason,
            now = ?sim.now(),
            "🗑️ 丢弃流"
        ),
    }

    if let Some(Err(e)) = w.with_coordinator(sim.now(), |c, ctx| c.drop_flow(&flow, reason, ctx)) {
        warn!(flow_id = %flow.flow_id, error = %e, "drop_flow 回调出错");
    }
}

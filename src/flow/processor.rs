//! SF 处理
//!
//! 准入检查 -> 启动等待 + 处理时延 -> 前进到下一个 SF；
//! 流在 SF 上占用的负载在处理完成后再保持 `duration` 毫秒才释放。

use tracing::{debug, trace};

use super::flow_world::{FlowWorld, flow_world};
use super::pass::{PassFlow, drop_flow, pass_flow};
use crate::error::SimError;
use crate::metrics::DropReason;
use crate::net::NodeId;
use crate::sfc::{Flow, SfId};
use crate::sim::{Event, SimTime, Simulator, World};

/// 准入比较的容差
const CAP_EPS: f64 = 1e-9;

/// 在流的当前节点上处理当前 SF
pub(crate) fn process(sim: &mut Simulator, w: &mut FlowWorld, mut flow: Flow) {
    let now = sim.now();
    let node = flow.current_node_id;
    let sf = flow.current_sf.clone();
    let dr = flow.dr;

    let available = w
        .params
        .network
        .node(node)
        .is_some_and(|n| n.available_sf.contains_key(&sf));
    if !w.params.placement.contains(node, &sf) || !available {
        return drop_flow(sim, w, flow, DropReason::NoPlacement);
    }

    let sfs = &w.params.sf_list;
    let Some(n) = w.params.network.node_mut(node) else {
        return drop_flow(sim, w, flow, DropReason::NoPlacement);
    };
    let demanded = n.demanded_total(sfs, &sf, dr);
    if demanded > n.cap + CAP_EPS {
        debug!(
            flow_id = %flow.flow_id,
            node = %n.name,
            sf = %sf,
            demanded,
            cap = n.cap,
            "节点容量不足，拒绝处理"
        );
        return reject(sim, w, flow, node);
    }
    let warmup = n.warmup_left(sfs, &sf, now);
    if let Some(inst) = n.available_sf.get_mut(&sf) {
        inst.load += dr;
        inst.last_active = now;
    }
    n.remaining_cap = n.cap - demanded;

    w.add_active(node, &sf, dr);
    w.metrics.record_node_usage(node, demanded);
    w.metrics.add_processed_traffic(node, &sf, dr);
    flow.processing_index += 1;
    flow.rejected_at = None;
    flow.retried = false;

    let delay = w.params.sample_processing_delay(&sf);
    let done_at = now + warmup + SimTime::from_millis_f64(delay);
    let release_at = done_at + SimTime::from_millis_f64(flow.duration);
    trace!(
        flow_id = %flow.flow_id,
        sf = %sf,
        warmup = ?warmup,
        delay,
        done_at = ?done_at,
        "开始处理"
    );
    sim.schedule(
        done_at,
        ProcessingDone {
            flow,
            warmup: warmup.as_millis_f64(),
            delay,
        },
    );
    sim.schedule(release_at, ReleaseSf { node, sf, dr });
}

/// 容量不足：第一次交还给流水线（算法可据 `rejected_at` 改路），第二次丢弃
pub(crate) fn reject(sim: &mut Simulator, w: &mut FlowWorld, mut flow: Flow, node: NodeId) {
    flow.rejected_at = Some(node);
    if flow.retried {
        return drop_flow(sim, w, flow, DropReason::Capacity);
    }
    flow.retried = true;
    sim.schedule_now(PassFlow { flow });
}

/// 事件：SF 处理结束
#[derive(Debug)]
pub(crate) struct ProcessingDone {
    flow: Flow,
    warmup: f64,
    delay: f64,
}

impl Event for ProcessingDone {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let ProcessingDone {
            mut flow,
            warmup,
            delay,
        } = *self;
        let w = flow_world(world);
        if warmup > 0.0 {
            flow.spend(warmup);
        }
        flow.spend(delay);
        flow.processing_delay += delay;
        w.metrics.add_processing_delay(delay);
        flow.advance_position();
        trace!(flow_id = %flow.flow_id, next_sf = %flow.current_sf, "处理完成");
        pass_flow(sim, w, flow);
    }
}

/// 事件：流离开 SF，释放其负载
#[derive(Debug)]
pub(crate) struct ReleaseSf {
    node: NodeId,
    sf: SfId,
    dr: f64,
}

impl Event for ReleaseSf {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let ReleaseSf { node, sf, dr } = *self;
        let w = flow_world(world);
        let now = sim.now();
        match release(w, now, node, &sf, dr) {
            Ok(()) => w.remove_active(node, &sf, dr),
            Err(reason) => w.fail(SimError::protocol(now, reason)),
        }
    }
}

fn release(w: &mut FlowWorld, now: SimTime, node: NodeId, sf: &str, dr: f64) -> Result<(), String> {
    let evict_now = w.params.config.vnf_timeout.is_none() && !w.params.placement.contains(node, sf);
    let sfs = &w.params.sf_list;
    let n = w
        .params
        .network
        .node_mut(node)
        .ok_or_else(|| format!("release on unknown node {node:?}"))?;
    let inst = n
        .available_sf
        .get_mut(sf)
        .ok_or_else(|| format!("release of SF `{sf}` not available at node {}", n.name))?;
    inst.load -= dr;
    if inst.load < -CAP_EPS {
        return Err(format!("SF `{sf}` load at node {} dropped below zero", n.name));
    }
    if inst.load < CAP_EPS {
        inst.load = 0.0;
    }
    inst.last_active = now;
    if inst.load == 0.0 && evict_now {
        n.available_sf.remove(sf);
        debug!(node = %n.name, sf, "SF 已空闲且不在放置中，移除");
    }
    n.recompute_remaining(sfs);
    Ok(())
}

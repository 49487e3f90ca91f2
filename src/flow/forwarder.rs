//! 转发
//!
//! 两种方式：
//! - 调度表决策：沿最短路径一次跳到目的节点，只计时延，不占用链路容量；
//! - 规则/路径覆盖：逐条占用沿途链路 `path_delay + duration` 毫秒，容量不足视为拒绝；
//!   目的地不相邻时按当前剩余容量选路，绕开容量不足的链路。

use tracing::{debug, trace, warn};

use super::flow_world::{FlowWorld, flow_world};
use super::pass::{drop_flow, pass_flow};
use super::processor;
use crate::error::SimError;
use crate::metrics::DropReason;
use crate::net::{LinkId, NodeId};
use crate::sfc::Flow;
use crate::sim::{Event, SimTime, Simulator, World};

const CAP_EPS: f64 = 1e-9;

/// 沿最短路径跳到 `dst`
pub(crate) fn jump(sim: &mut Simulator, w: &mut FlowWorld, flow: Flow, dst: NodeId) {
    let from = flow.current_node_id;
    let net = &w.params.network;
    let (Some(path), Some(delay)) = (net.shortest_path(from, dst), net.path_delay(from, dst)) else {
        return drop_flow(sim, w, flow, DropReason::NoPath);
    };
    let hops = path.len().saturating_sub(1) as u64;
    trace!(flow_id = %flow.flow_id, from = ?from, to = ?dst, delay, hops, "跳转");
    sim.schedule_in(
        SimTime::from_millis_f64(delay),
        ArriveAt {
            flow,
            to: dst,
            delay,
            hops,
        },
    );
}

/// 按规则或计划路径把流送往 `next`，占用沿途链路
pub(crate) fn forward_along(sim: &mut Simulator, w: &mut FlowWorld, mut flow: Flow, next: NodeId) {
    let node = flow.current_node_id;
    if next == node {
        return if flow.forward_to_eg {
            drop_flow(sim, w, flow, DropReason::NoRule)
        } else {
            processor::process(sim, w, flow)
        };
    }

    let net = &w.params.network;
    if net.link_between(node, next).is_none() && net.shortest_path(node, next).is_none() {
        warn!(flow_id = %flow.flow_id, from = ?node, to = ?next, "规则指向不可达节点");
        return drop_flow(sim, w, flow, DropReason::NoPath);
    }
    // 相邻节点只走直连链路；否则绕开剩余容量不足的链路
    let path = if net.link_between(node, next).is_some() {
        Some(vec![node, next])
    } else {
        net.shortest_path_with_capacity(node, next, flow.dr)
    };
    let links = path.and_then(|p| net.links_along(&p)).filter(|links| {
        links
            .iter()
            .all(|id| net.link(*id).is_some_and(|l| l.can_carry(flow.dr)))
    });
    let Some(links) = links else {
        debug!(flow_id = %flow.flow_id, from = ?node, to = ?next, dr = flow.dr, "链路容量不足");
        return processor::reject(sim, w, flow, node);
    };
    let delay: f64 = links
        .iter()
        .filter_map(|id| net.link(*id))
        .map(|l| l.delay)
        .sum();

    for id in &links {
        if let Some(link) = w.params.network.link_mut(*id) {
            link.remaining_cap -= flow.dr;
        }
    }
    if flow.path.front() == Some(&next) {
        flow.path.pop_front();
    }
    let hops = links.len() as u64;
    sim.schedule_in(
        SimTime::from_millis_f64(delay + flow.duration),
        ReleaseLinks { links, dr: flow.dr },
    );
    trace!(flow_id = %flow.flow_id, from = ?node, to = ?next, delay, hops, "逐跳转发");
    sim.schedule_in(
        SimTime::from_millis_f64(delay),
        ArriveAt {
            flow,
            to: next,
            delay,
            hops,
        },
    );
}

/// 事件：流到达转发目的节点
#[derive(Debug)]
pub(crate) struct ArriveAt {
    flow: Flow,
    to: NodeId,
    delay: f64,
    hops: u64,
}

impl Event for ArriveAt {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let ArriveAt {
            mut flow,
            to,
            delay,
            hops,
        } = *self;
        let w = flow_world(world);
        flow.current_node_id = to;
        flow.path_delay += delay;
        flow.crossed_links += hops;
        flow.spend(delay);
        w.metrics.add_crossed_links(hops, delay);

        if let Some(Err(e)) = w.with_coordinator(sim.now(), |c, ctx| c.post_forwarding(to, &mut flow, ctx)) {
            warn!(flow_id = %flow.flow_id, error = %e, "post_forwarding 回调出错");
            return drop_flow(sim, w, flow, DropReason::AlgorithmError);
        }
        pass_flow(sim, w, flow);
    }
}

/// 事件：流离开链路，归还容量
#[derive(Debug)]
pub(crate) struct ReleaseLinks {
    links: Vec<LinkId>,
    dr: f64,
}

impl Event for ReleaseLinks {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let ReleaseLinks { links, dr } = *self;
        let w = flow_world(world);
        for id in links {
            let Some(link) = w.params.network.link_mut(id) else {
                continue;
            };
            link.remaining_cap += dr;
            if link.remaining_cap > link.cap + CAP_EPS {
                let reason = format!(
                    "link {:?}->{:?} released above capacity ({} > {})",
                    link.from, link.to, link.remaining_cap, link.cap
                );
                w.fail(SimError::protocol(sim.now(), reason));
                return;
            }
            link.remaining_cap = link.remaining_cap.min(link.cap);
        }
    }
}

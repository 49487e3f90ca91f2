//! 回调上下文
//!
//! 算法在回调中通过 `SimContext` 读取引擎状态；所有修改都走 `apply`，
//! 与控制器提交的 `SimulatorAction` 使用同一套合并与校验逻辑。

use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::flow::FlowWorld;
use crate::metrics::{Metrics, NetworkStats};
use crate::net::{Network, NodeId, SfInstance};
use crate::params::SimulatorParams;
use crate::sfc::{Placement, SCHEDULE_TOLERANCE, Schedule, SfId};
use crate::sim::SimTime;

use super::action::SimulatorAction;
use super::state::SimulatorState;

pub struct SimContext<'a> {
    now: SimTime,
    world: &'a mut FlowWorld,
}

impl<'a> SimContext<'a> {
    pub(crate) fn new(now: SimTime, world: &'a mut FlowWorld) -> Self {
        Self { now, world }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn params(&self) -> &SimulatorParams {
        &self.world.params
    }

    pub fn network(&self) -> &Network {
        &self.world.params.network
    }

    /// 拓扑的深拷贝，可自由修改而不影响引擎
    pub fn network_copy(&self) -> Network {
        self.world.params.network.clone()
    }

    pub fn placement(&self) -> &Placement {
        &self.world.params.placement
    }

    pub fn schedule(&self) -> &Schedule {
        &self.world.params.schedule
    }

    pub fn metrics(&self) -> &Metrics {
        &self.world.metrics
    }

    pub fn stats(&self) -> NetworkStats {
        self.world.metrics.stats()
    }

    pub fn state(&self) -> SimulatorState {
        SimulatorState::capture(&self.world.params, &self.world.metrics, self.now)
    }

    /// 当前生效的放置、调度与规则
    pub fn derive_action(&self) -> SimulatorAction {
        derive_action(&self.world.params)
    }

    /// 合并一个 action。协议错误会同时终止仿真。
    pub fn apply(&mut self, action: SimulatorAction) -> Result<()> {
        match merge_action(&mut self.world.params, self.now, action) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let SimError::Protocol { at, reason } = &e {
                    self.world.fail(SimError::protocol(*at, reason.clone()));
                }
                Err(e)
            }
        }
    }

    /// 移除空闲超过 `vnf_timeout` 且已不在放置中的 SF 实例
    pub fn evict_idle_sfs(&mut self) -> Vec<(NodeId, SfId)> {
        let evicted = evict_idle_sfs(&mut self.world.params, self.now);
        if !evicted.is_empty() {
            let sfs = &self.world.params.sf_list;
            self.world.params.network.recompute_all(sfs);
        }
        evicted
    }
}

pub(crate) fn derive_action(params: &SimulatorParams) -> SimulatorAction {
    SimulatorAction {
        placement: params.placement.clone(),
        scheduling: params.schedule.clone(),
        flow_processing_rules: params.flow_processing_rules.clone(),
        flow_forwarding_rules: params.flow_forwarding_rules.clone(),
    }
}

/// 校验并合并 action：
/// 新放置的 SF 以 `startup_time = now` 加入节点；不再放置的空闲实例按 `vnf_timeout` 回收；
/// 调度表与逐流规则整体替换。
pub(crate) fn merge_action(params: &mut SimulatorParams, now: SimTime, action: SimulatorAction) -> Result<()> {
    let SimulatorAction {
        placement,
        scheduling,
        flow_processing_rules,
        flow_forwarding_rules,
    } = action;

    scheduling
        .validate(SCHEDULE_TOLERANCE)
        .map_err(|reason| SimError::protocol(now, reason))?;

    let node_count = params.network.node_count();
    let known = |id: NodeId| id.0 < node_count;
    for (node, sf) in placement.iter() {
        if !known(node) {
            return Err(SimError::protocol(now, format!("placement on unknown node {node:?}")));
        }
        if !params.sf_list.contains_key(sf) {
            return Err(SimError::protocol(now, format!("placement of unknown SF `{sf}`")));
        }
    }
    for (src, per_sfc) in &scheduling.0 {
        let dsts = per_sfc.values().flat_map(|m| m.values()).flat_map(|w| w.keys());
        if let Some(bad) = std::iter::once(src).chain(dsts).find(|n| !known(**n)) {
            return Err(SimError::protocol(now, format!("schedule references unknown node {bad:?}")));
        }
    }
    if let Some(bad) = flow_processing_rules.keys().find(|n| !known(**n)) {
        return Err(SimError::protocol(now, format!("processing rule on unknown node {bad:?}")));
    }
    for (node, rules) in &flow_forwarding_rules {
        if let Some(bad) = std::iter::once(node).chain(rules.values()).find(|n| !known(**n)) {
            return Err(SimError::protocol(now, format!("forwarding rule references unknown node {bad:?}")));
        }
    }

    let mut added = 0usize;
    for node in params.network.nodes_mut() {
        for sf in placement.sfs_at(node.id) {
            if !node.available_sf.contains_key(sf) {
                node.available_sf.insert(sf.clone(), SfInstance::new(now));
                added += 1;
            }
        }
    }
    params.placement = placement;
    let evicted = evict_idle_sfs(params, now);
    params.network.recompute_all(&params.sf_list);

    params.schedule = scheduling;
    params.flow_processing_rules = flow_processing_rules;
    params.flow_forwarding_rules = flow_forwarding_rules;
    debug!(now = ?now, added, evicted = evicted.len(), "合并 action");
    Ok(())
}

/// 回收不在放置中、负载为 0 且空闲时间不少于 `vnf_timeout` 的 SF 实例。
///
/// 未配置 `vnf_timeout` 时，空闲实例立即回收。调用方负责重新计算剩余容量。
pub(crate) fn evict_idle_sfs(params: &mut SimulatorParams, now: SimTime) -> Vec<(NodeId, SfId)> {
    let timeout = SimTime::from_millis_f64(params.config.vnf_timeout.unwrap_or(0.0));
    let placement = &params.placement;
    let mut evicted = Vec::new();
    for node in params.network.nodes_mut() {
        let id = node.id;
        node.available_sf.retain(|sf, inst| {
            let keep = placement.contains(id, sf)
                || inst.load > 0.0
                || now.saturating_sub(inst.last_active) < timeout;
            if !keep {
                evicted.push((id, sf.clone()));
            }
            keep
        });
    }
    for (node, sf) in &evicted {
        warn_if_stale(params, *node, sf);
    }
    evicted
}

fn warn_if_stale(params: &SimulatorParams, node: NodeId, sf: &str) {
    if params
        .flow_processing_rules
        .get(&node)
        .is_some_and(|rules| rules.values().any(|sfs| sfs.iter().any(|s| s == sf)))
    {
        warn!(node = %params.network.name(node), sf, "回收的 SF 仍被处理规则引用");
    }
}

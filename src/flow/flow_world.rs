//! 流级仿真世界
//!
//! 持有参数、统计、协调算法以及引擎内部的记账（活跃负载、待决策请求、致命错误）。

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};

use tracing::error;

use crate::error::{Result, SimError};
use crate::interface::{Coordinator, Periodic, SimContext};
use crate::metrics::Metrics;
use crate::net::NodeId;
use crate::params::SimulatorParams;
use crate::sfc::{Flow, SfId};
use crate::sim::{SignalId, SimTime, Simulator, World};

const LOAD_TOLERANCE: f64 = 1e-6;

/// 等待外部决策的流
#[derive(Debug, Clone)]
pub(crate) struct PendingDecision {
    pub(crate) signal: SignalId,
    pub(crate) flow: Flow,
}

pub struct FlowWorld {
    pub params: SimulatorParams,
    pub metrics: Metrics,
    coordinator: Option<Box<dyn Coordinator>>,
    pub(crate) decisions: VecDeque<PendingDecision>,
    pub(crate) last_decision_at: Option<SimTime>,
    /// (节点, SF) -> 当前活跃流的数据速率之和
    pub(crate) active: BTreeMap<(NodeId, SfId), f64>,
    pub(crate) live_flows: u64,
    last_tick: SimTime,
    fatal: Option<SimError>,
    aborted: bool,
}

impl FlowWorld {
    pub fn new(params: SimulatorParams) -> Self {
        Self {
            params,
            metrics: Metrics::default(),
            coordinator: None,
            decisions: VecDeque::new(),
            last_decision_at: None,
            active: BTreeMap::new(),
            live_flows: 0,
            last_tick: SimTime::ZERO,
            fatal: None,
            aborted: false,
        }
    }

    pub fn set_coordinator(&mut self, coordinator: Box<dyn Coordinator>) {
        self.coordinator = Some(coordinator);
    }

    pub(crate) fn periodic_specs(&self) -> Vec<Periodic> {
        self.coordinator
            .as_ref()
            .map(|c| c.periodic())
            .unwrap_or_default()
    }

    /// 取出协调算法执行回调，完成后放回。没有算法时返回 None。
    pub(crate) fn with_coordinator<R>(
        &mut self,
        now: SimTime,
        f: impl FnOnce(&mut dyn Coordinator, &mut SimContext<'_>) -> Result<R>,
    ) -> Option<Result<R>> {
        let mut coordinator = self.coordinator.take()?;
        let out = {
            let mut ctx = SimContext::new(now, self);
            f(coordinator.as_mut(), &mut ctx)
        };
        self.coordinator = Some(coordinator);
        Some(out)
    }

    /// 记录致命错误；仿真循环随即停止。只保留第一个错误。
    pub(crate) fn fail(&mut self, err: SimError) {
        error!(error = %err, "❌ 协议错误，终止仿真");
        if !self.aborted {
            self.fatal = Some(err);
        }
        self.aborted = true;
    }

    pub fn error(&self) -> Option<&SimError> {
        self.fatal.as_ref()
    }

    /// 取走等待中的错误；仿真保持停止状态
    pub(crate) fn take_error(&mut self) -> Option<SimError> {
        self.fatal.take()
    }

    /// 等待决策的流（逐流模式）
    pub fn pending_decision(&self) -> Option<&Flow> {
        self.decisions.front().map(|d| &d.flow)
    }

    pub(crate) fn take_decision(&mut self) -> Option<PendingDecision> {
        self.decisions.pop_front()
    }

    pub(crate) fn add_active(&mut self, node: NodeId, sf: &str, dr: f64) {
        *self.active.entry((node, sf.to_string())).or_default() += dr;
    }

    pub(crate) fn remove_active(&mut self, node: NodeId, sf: &str, dr: f64) {
        let key = (node, sf.to_string());
        if let Some(sum) = self.active.get_mut(&key) {
            *sum -= dr;
            if *sum <= LOAD_TOLERANCE {
                self.active.remove(&key);
            }
        }
    }

    /// 检查容量与负载记账：
    /// 节点和链路的剩余容量在 [0, cap]，剩余容量等于 cap 减去资源函数之和，
    /// 每个 SF 实例的负载等于其上活跃流的数据速率之和，流守恒成立。
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let sfs = &self.params.sf_list;
        for node in self.params.network.nodes() {
            if node.remaining_cap < -LOAD_TOLERANCE || node.remaining_cap > node.cap + LOAD_TOLERANCE {
                return Err(format!(
                    "node {} remaining capacity {} outside [0, {}]",
                    node.name, node.remaining_cap, node.cap
                ));
            }
            let used: f64 = node
                .available_sf
                .iter()
                .map(|(sf, inst)| sfs.get(sf).map_or(inst.load, |d| d.resources(inst.load)))
                .sum();
            if (node.cap - used - node.remaining_cap).abs() > LOAD_TOLERANCE {
                return Err(format!(
                    "node {} remaining capacity {} does not match cap {} - used {}",
                    node.name, node.remaining_cap, node.cap, used
                ));
            }
            for (sf, inst) in &node.available_sf {
                let active = self.active.get(&(node.id, sf.clone())).copied().unwrap_or(0.0);
                if (inst.load - active).abs() > LOAD_TOLERANCE {
                    return Err(format!(
                        "SF {sf} at node {} has load {} but active flows sum to {active}",
                        node.name, inst.load
                    ));
                }
            }
        }
        for link in self.params.network.links() {
            if link.remaining_cap < -LOAD_TOLERANCE || link.remaining_cap > link.cap + LOAD_TOLERANCE {
                return Err(format!(
                    "link {:?}->{:?} remaining capacity {} outside [0, {}]",
                    link.from, link.to, link.remaining_cap, link.cap
                ));
            }
        }
        let m = &self.metrics;
        if m.generated_flows != m.processed_flows + m.dropped_flows + self.live_flows {
            return Err(format!(
                "flow conservation broken: generated {} != processed {} + dropped {} + live {}",
                m.generated_flows, m.processed_flows, m.dropped_flows, self.live_flows
            ));
        }
        Ok(())
    }
}

impl World for FlowWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, sim: &mut Simulator) {
        if sim.now() < self.last_tick {
            self.fail(SimError::protocol(sim.now(), "clock moved backward"));
        }
        self.last_tick = sim.now();
    }

    fn halted(&self) -> bool {
        self.aborted
    }
}

/// 事件内部取得 `FlowWorld`
pub(crate) fn flow_world(world: &mut dyn World) -> &mut FlowWorld {
    world
        .as_any_mut()
        .downcast_mut::<FlowWorld>()
        .expect("world must be FlowWorld")
}

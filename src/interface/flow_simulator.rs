//! 仿真门面
//!
//! 把事件引擎和 `FlowWorld` 组合在一起，控制器和测试都通过它驱动仿真。

use tracing::debug;

use super::action::SimulatorAction;
use super::context::{derive_action, merge_action};
use super::coordinator::Coordinator;
use super::state::SimulatorState;
use crate::error::{Result, SimError};
use crate::flow::{self, FlowDecision, FlowWorld};
use crate::metrics::Metrics;
use crate::net::Network;
use crate::params::SimulatorParams;
use crate::sfc::Flow;
use crate::sim::{SimTime, Simulator, World};

pub struct FlowSimulator {
    sim: Simulator,
    world: FlowWorld,
    started: bool,
}

impl FlowSimulator {
    pub fn new(params: SimulatorParams) -> Self {
        Self {
            sim: Simulator::default(),
            world: FlowWorld::new(params),
            started: false,
        }
    }

    pub fn with_coordinator(mut self, coordinator: impl Coordinator + 'static) -> Self {
        self.world.set_coordinator(Box::new(coordinator));
        self
    }

    /// 必须在 `start` 之前设置，周期回调在启动时注册
    pub fn set_coordinator(&mut self, coordinator: Box<dyn Coordinator>) {
        self.world.set_coordinator(coordinator);
    }

    /// 调度生成器、trace 和周期回调。重复调用无效果。
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        flow::start(&mut self.sim, &mut self.world);
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn now(&self) -> SimTime {
        self.sim.now()
    }

    pub fn executed_events(&self) -> u64 {
        self.sim.executed_events()
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.sim.peek_time()
    }

    /// 运行到绝对时间 `until`（包含该时刻的事件）
    pub fn run_until(&mut self, until: SimTime) -> Result<()> {
        self.ensure_running()?;
        self.start();
        self.sim.run_until(until, &mut self.world);
        debug!(now = ?self.sim.now(), events = self.sim.executed_events(), "运行到指定时间");
        self.ensure_running()
    }

    /// 执行一个事件；队列为空时返回 false
    pub fn step(&mut self) -> Result<bool> {
        self.ensure_running()?;
        self.start();
        let stepped = self.sim.step(&mut self.world);
        self.ensure_running()?;
        Ok(stepped)
    }

    /// 合并一个 action（控制器在每轮开始时调用）
    pub fn apply_action(&mut self, action: SimulatorAction) -> Result<()> {
        self.ensure_running()?;
        let now = self.sim.now();
        if let Err(e) = merge_action(&mut self.world.params, now, action) {
            if let SimError::Protocol { at, reason } = &e {
                self.world.fail(SimError::protocol(*at, reason.clone()));
                self.world.take_error();
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn derive_action(&self) -> SimulatorAction {
        derive_action(&self.world.params)
    }

    pub fn state(&self) -> SimulatorState {
        SimulatorState::capture(&self.world.params, &self.world.metrics, self.sim.now())
    }

    pub fn network_copy(&self) -> Network {
        self.world.params.network.clone()
    }

    pub fn params(&self) -> &SimulatorParams {
        &self.world.params
    }

    pub fn params_mut(&mut self) -> &mut SimulatorParams {
        &mut self.world.params
    }

    pub fn metrics(&self) -> &Metrics {
        &self.world.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.world.metrics
    }

    pub fn world(&self) -> &FlowWorld {
        &self.world
    }

    /// 等待外部决策的流
    pub fn pending_decision(&self) -> Option<&Flow> {
        self.world.pending_decision()
    }

    /// 以 `decision` 恢复等待中的流
    pub(crate) fn resolve_decision(&mut self, flow_id: &str, decision: FlowDecision) -> Result<()> {
        match self.world.pending_decision() {
            Some(flow) if flow.flow_id == flow_id => {}
            _ => return Err(SimError::UnknownFlow(flow_id.to_string())),
        }
        let Some(pending) = self.world.take_decision() else {
            return Err(SimError::UnknownFlow(flow_id.to_string()));
        };
        self.sim.succeed(pending.signal, Box::new(decision));
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.world
            .check_invariants()
            .map_err(|reason| SimError::protocol(self.sim.now(), reason))
    }

    fn ensure_running(&mut self) -> Result<()> {
        if let Some(e) = self.world.take_error() {
            return Err(e);
        }
        if self.world.halted() {
            return Err(SimError::protocol(self.sim.now(), "simulation aborted by an earlier protocol error"));
        }
        Ok(())
    }
}

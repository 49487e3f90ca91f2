//! 外部控制器
//!
//! - `DurationController`：每次 `apply` 合并一个 action，然后运行一轮（`run_duration` 毫秒）；
//! - `FlowController`：逐流决策，每次 `apply` 恢复一个等待中的流并运行到下一个决策点。

use tracing::{info, warn};

use super::action::SimulatorAction;
use super::coordinator::Coordinator;
use super::flow_simulator::FlowSimulator;
use super::state::{DecisionState, SimulatorState};
use crate::config::DecisionMode;
use crate::error::{Result, SimError};
use crate::flow::FlowDecision;
use crate::io::ResultWriter;
use crate::params::SimulatorParams;
use crate::sim::SimTime;

pub struct DurationController {
    sim: FlowSimulator,
    writer: Option<ResultWriter>,
    initialized: bool,
}

impl DurationController {
    pub fn new(mut params: SimulatorParams) -> Self {
        if params.config.decision_mode == DecisionMode::PerFlow {
            warn!("DurationController 不支持逐流决策，改用调度表");
            params.config.decision_mode = DecisionMode::Aggregate;
        }
        Self {
            sim: FlowSimulator::new(params),
            writer: None,
            initialized: false,
        }
    }

    pub fn with_coordinator(mut self, coordinator: impl Coordinator + 'static) -> Self {
        self.sim.set_coordinator(Box::new(coordinator));
        self
    }

    pub fn with_writer(mut self, writer: ResultWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn simulator(&self) -> &FlowSimulator {
        &self.sim
    }

    pub fn simulator_mut(&mut self) -> &mut FlowSimulator {
        &mut self.sim
    }

    /// 启动仿真并返回 t=0 的状态
    pub fn init(&mut self) -> Result<SimulatorState> {
        self.sim.start();
        self.initialized = true;
        info!(
            run_duration = self.sim.params().config.run_duration,
            seed = self.sim.params().seed,
            "初始化仿真"
        );
        Ok(self.sim.state())
    }

    /// 合并 `action`，重置每轮统计，运行到 `run_duration × 轮次`，返回新状态
    pub fn apply(&mut self, action: SimulatorAction) -> Result<SimulatorState> {
        if !self.initialized {
            return Err(SimError::NotInitialized);
        }
        self.sim.apply_action(action)?;
        self.sim.metrics_mut().reset_run();
        let run = self.sim.metrics().run_index;
        let until = SimTime::from_millis_f64(self.sim.params().config.run_duration * run as f64);
        self.sim.run_until(until)?;
        let runtime_ms = self.sim.metrics().run_runtime_ms();

        if let Some(writer) = self.writer.as_mut() {
            writer.write_state(self.sim.now(), self.sim.params(), self.sim.metrics())?;
            writer.write_runtime(run, runtime_ms)?;
        }
        let stats = self.sim.metrics().stats();
        info!(
            run,
            now = ?self.sim.now(),
            generated = stats.run_generated_flows,
            processed = stats.run_processed_flows,
            dropped = stats.run_dropped_flows,
            runtime_ms,
            total_runtime_ms = self.sim.metrics().runtime_ms(),
            "✅ 本轮结束"
        );
        Ok(self.sim.state())
    }

    /// 立即把当前状态写入结果文件
    pub fn write_state(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_state(self.sim.now(), self.sim.params(), self.sim.metrics()),
            None => Ok(()),
        }
    }
}

pub struct FlowController {
    sim: FlowSimulator,
    horizon: SimTime,
    initialized: bool,
}

impl FlowController {
    /// 逐流模式运行到 `horizon_ms`
    pub fn new(mut params: SimulatorParams, horizon_ms: f64) -> Self {
        params.config.decision_mode = DecisionMode::PerFlow;
        Self {
            sim: FlowSimulator::new(params),
            horizon: SimTime::from_millis_f64(horizon_ms),
            initialized: false,
        }
    }

    pub fn with_coordinator(mut self, coordinator: impl Coordinator + 'static) -> Self {
        self.sim.set_coordinator(Box::new(coordinator));
        self
    }

    pub fn simulator(&self) -> &FlowSimulator {
        &self.sim
    }

    /// 启动并运行到第一个决策点
    pub fn init(&mut self) -> Result<DecisionState> {
        self.sim.start();
        self.sim.metrics_mut().reset_run();
        self.initialized = true;
        self.advance()
    }

    /// 对等待中的流 `flow_id` 给出决策，运行到下一个决策点
    pub fn apply(&mut self, flow_id: &str, decision: FlowDecision) -> Result<DecisionState> {
        if !self.initialized {
            return Err(SimError::NotInitialized);
        }
        self.sim.resolve_decision(flow_id, decision)?;
        self.advance()
    }

    /// 在两次决策之间修改放置/调度
    pub fn apply_action(&mut self, action: SimulatorAction) -> Result<()> {
        self.sim.apply_action(action)
    }

    fn advance(&mut self) -> Result<DecisionState> {
        loop {
            if let Some(flow) = self.sim.pending_decision() {
                return Ok(DecisionState {
                    flow: Some(flow.clone()),
                    state: self.sim.state(),
                    done: false,
                });
            }
            match self.sim.peek_time() {
                Some(at) if at <= self.horizon => {
                    self.sim.step()?;
                }
                _ => {
                    self.sim.run_until(self.horizon)?;
                    info!(now = ?self.sim.now(), "逐流仿真结束");
                    return Ok(DecisionState {
                        flow: None,
                        state: self.sim.state(),
                        done: true,
                    });
                }
            }
        }
    }
}

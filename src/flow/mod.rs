//! 流级仿真引擎
//!
//! 流的生命周期由一组事件驱动：生成、逐节点 pass、处理、转发、释放资源、
//! 周期回调与 trace。所有事件共享一个 `FlowWorld`。

mod decision;
mod flow_world;
mod forwarder;
mod generator;
mod pass;
mod periodic;
mod processor;
mod trace_driver;

pub use decision::{FlowDecision, weighted_round_robin};
pub use flow_world::FlowWorld;

pub(crate) use flow_world::PendingDecision;

use tracing::{info, warn};

use crate::sim::{SimTime, Simulator};

/// 调度初始事件：trace 记录、各入口生成器与算法注册的周期回调。
pub(crate) fn start(sim: &mut Simulator, w: &mut FlowWorld) {
    if let Some(first) = w.params.trace.first() {
        let at = SimTime::from_millis_f64(first.time);
        sim.schedule(at, trace_driver::ApplyTraceRecord { index: 0 });
    }
    for ingress in w.params.ingress_nodes.clone() {
        generator::start_generator(sim, w, ingress);
    }
    for spec in w.periodic_specs() {
        if !(spec.interval > 0.0) {
            warn!(label = %spec.label, interval = spec.interval, "周期回调间隔必须为正，忽略");
            continue;
        }
        let interval = SimTime::from_millis_f64(spec.interval);
        sim.schedule(
            interval,
            periodic::PeriodicTick {
                label: spec.label,
                interval,
            },
        );
    }
    info!(
        ingress = w.params.ingress_nodes.len(),
        generators = w.params.active_generators.len(),
        trace_records = w.params.trace.len(),
        "🚀 仿真启动"
    );
}

//! 流生成器
//!
//! 每个入口一个生成循环：抽样到达间隔与流属性，创建流并交给流水线，然后等待下一次到达。
//! 平均到达间隔为 None 时循环停止，由 trace 重新启动。

use tracing::{debug, trace, warn};

use super::flow_world::{FlowWorld, flow_world};
use super::pass::{PassFlow, drop_flow};
use crate::metrics::DropReason;
use crate::net::NodeId;
use crate::params::SimulatorParams;
use crate::sfc::Flow;
use crate::sim::{Event, SimTime, Simulator, World};

/// 事件：入口生成下一个流
#[derive(Debug)]
pub(crate) struct GenerateFlow {
    pub(crate) ingress: NodeId,
}

impl Event for GenerateFlow {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let GenerateFlow { ingress } = *self;
        let w = flow_world(world);
        let now = sim.now();

        let Some(mean) = w.params.inter_arr_mean.get(&ingress).copied().flatten() else {
            w.params.active_generators.remove(&ingress);
            debug!(ingress = %w.params.network.name(ingress), now = ?now, "入口静默，生成器停止");
            return;
        };
        let gap = w.params.sample_inter_arrival(mean);
        let Some(mut flow) = create_flow(&mut w.params, ingress, now) else {
            w.params.active_generators.remove(&ingress);
            warn!(ingress = %w.params.network.name(ingress), "无法创建流，生成器停止");
            return;
        };
        w.metrics.generated_flow(&flow);
        w.live_flows += 1;
        trace!(
            flow_id = %flow.flow_id,
            sfc = %flow.sfc,
            dr = flow.dr,
            duration = flow.duration,
            egress = ?flow.egress_node_id,
            "生成流"
        );

        match w.with_coordinator(now, |c, ctx| c.init_flow(&mut flow, ctx)) {
            Some(Err(e)) => {
                warn!(flow_id = %flow.flow_id, error = %e, "init_flow 回调出错");
                drop_flow(sim, w, flow, DropReason::AlgorithmError);
            }
            _ => sim.schedule_now(PassFlow { flow }),
        }
        sim.schedule_in(SimTime::from_millis_f64(gap), GenerateFlow { ingress });
    }
}

/// 启动入口的生成循环（已在运行或入口静默时不做任何事）
pub(crate) fn start_generator(sim: &mut Simulator, w: &mut FlowWorld, ingress: NodeId) {
    let active = w.params.inter_arr_mean.get(&ingress).copied().flatten().is_some();
    if active && w.params.active_generators.insert(ingress) {
        debug!(ingress = %w.params.network.name(ingress), now = ?sim.now(), "启动生成器");
        sim.schedule_now(GenerateFlow { ingress });
    }
}

fn create_flow(params: &mut SimulatorParams, ingress: NodeId, now: SimTime) -> Option<Flow> {
    let dr = params.sample_dr();
    let size = params.sample_size();
    let sfc = params.choose_sfc()?;
    let chain = params.sfc_list.get(&sfc)?.clone();
    let egress = params.choose_egress();
    let ttl = params.sample_ttl();
    let flow_id = params.new_flow_id(ingress);
    let duration = params.flow_duration(size, dr);
    Some(Flow::new(
        flow_id, sfc, chain, dr, size, duration, ttl, ingress, egress, now,
    ))
}

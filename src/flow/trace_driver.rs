//! 到达率 trace
//!
//! 每条记录在其时间点改写一个或全部入口的平均到达间隔；
//! 从静默变为活跃的入口会重新启动生成器。

use tracing::info;

use super::flow_world::flow_world;
use super::generator::start_generator;
use crate::net::NodeId;
use crate::sim::{Event, SimTime, Simulator, World};

/// 事件：应用第 `index` 条 trace 记录
#[derive(Debug)]
pub(crate) struct ApplyTraceRecord {
    pub(crate) index: usize,
}

impl Event for ApplyTraceRecord {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let index = self.index;
        let w = flow_world(world);
        let Some(record) = w.params.trace.get(index).cloned() else {
            return;
        };
        let targets: Vec<NodeId> = match &record.node {
            Some(name) => w.params.network.node_by_name(name).into_iter().collect(),
            None => w.params.ingress_nodes.clone(),
        };
        for ingress in targets {
            w.params.inter_arr_mean.insert(ingress, record.inter_arrival_mean);
            start_generator(sim, w, ingress);
        }
        info!(
            index,
            node = record.node.as_deref().unwrap_or("*"),
            inter_arrival_mean = ?record.inter_arrival_mean,
            now = ?sim.now(),
            "📈 到达率变化"
        );

        if let Some(next) = w.params.trace.get(index + 1) {
            sim.schedule(SimTime::from_millis_f64(next.time), ApplyTraceRecord { index: index + 1 });
        }
    }
}

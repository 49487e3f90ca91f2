//! 引擎 -> 算法：只读状态投影

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::{Metrics, NetworkStats};
use crate::net::{Link, Node, NodeId};
use crate::params::SimulatorParams;
use crate::sfc::{Flow, Placement, SfList, SfcId, SfcList};
use crate::sim::SimTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorState {
    pub time: SimTime,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub placement: Placement,
    pub sfcs: SfcList,
    pub service_functions: SfList,
    /// 入口 -> SFC -> 请求的数据速率；开启 prediction 时为下一轮的预期值
    pub traffic: BTreeMap<NodeId, BTreeMap<SfcId, f64>>,
    pub network_stats: NetworkStats,
}

impl SimulatorState {
    pub(crate) fn capture(params: &SimulatorParams, metrics: &Metrics, now: SimTime) -> Self {
        let traffic = if params.config.prediction {
            params.expected_traffic()
        } else {
            metrics.run.requested_traffic.clone()
        };
        Self {
            time: now,
            nodes: params.network.nodes().to_vec(),
            links: params.network.links().to_vec(),
            placement: params.placement.clone(),
            sfcs: params.sfc_list.clone(),
            service_functions: params.sf_list.clone(),
            traffic,
            network_stats: metrics.stats(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }
}

/// 逐流控制器返回给外部智能体的状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionState {
    /// 等待决策的流；仿真已到达终点时为 None
    pub flow: Option<Flow>,
    pub state: SimulatorState,
    pub done: bool,
}

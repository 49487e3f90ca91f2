//! 算法 -> 引擎：放置、调度与逐流规则

use serde::{Deserialize, Serialize};

use crate::net::NodeId;
use crate::params::SimulatorParams;
use crate::sfc::{ForwardingRules, Placement, ProcessingRules, Schedule, SfId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorAction {
    pub placement: Placement,
    pub scheduling: Schedule,
    #[serde(default)]
    pub flow_processing_rules: ProcessingRules,
    #[serde(default)]
    pub flow_forwarding_rules: ForwardingRules,
}

impl SimulatorAction {
    pub fn new(placement: Placement, scheduling: Schedule) -> Self {
        Self {
            placement,
            scheduling,
            ..Self::default()
        }
    }

    /// 在 `node` 上为 `flow_id` 处理 `sfs`
    pub fn set_processing(&mut self, node: NodeId, flow_id: impl Into<String>, sfs: Vec<SfId>) {
        self.flow_processing_rules
            .entry(node)
            .or_default()
            .insert(flow_id.into(), sfs);
    }

    /// 在 `node` 上把 `flow_id` 转发到 `next`
    pub fn set_forwarding(&mut self, node: NodeId, flow_id: impl Into<String>, next: NodeId) {
        self.flow_forwarding_rules
            .entry(node)
            .or_default()
            .insert(flow_id.into(), next);
    }

    /// 删除 `flow_id` 在所有节点上的规则
    pub fn clear_flow(&mut self, flow_id: &str) {
        for rules in self.flow_processing_rules.values_mut() {
            rules.remove(flow_id);
        }
        for rules in self.flow_forwarding_rules.values_mut() {
            rules.remove(flow_id);
        }
        self.flow_processing_rules.retain(|_, r| !r.is_empty());
        self.flow_forwarding_rules.retain(|_, r| !r.is_empty());
    }

    /// 每个节点放置所有 SF，每个节点上的每个 SF 都在本地处理
    pub fn full_placement_local_schedule(params: &SimulatorParams) -> Self {
        let mut placement = Placement::new();
        let mut scheduling = Schedule::new();
        for node in params.network.nodes() {
            for sf in params.sf_list.keys() {
                placement.place(node.id, sf.clone());
            }
            for (sfc, chain) in &params.sfc_list {
                for sf in chain {
                    scheduling.set(node.id, sfc.clone(), sf.clone(), node.id, 1.0);
                }
            }
        }
        Self::new(placement, scheduling)
    }
}

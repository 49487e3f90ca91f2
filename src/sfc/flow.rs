//! 流（flow）
//!
//! 流在入口节点生成，沿 SFC 依次处理，最终在出口离开或被丢弃。
//! 节点一律以 `NodeId` 引用；算法自定义的字段放在 `attributes` 里。

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::{EGRESS_SF, SfId, SfcId};
use crate::net::NodeId;
use crate::sim::SimTime;

/// 算法可见的流状态标签
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Normal,
    /// 算法要求丢弃该流
    Drop,
    /// 算法自定义标签
    Tag(String),
}

/// 一个在网络中传输的流
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub flow_id: String,
    pub sfc: SfcId,
    /// SFC 的 SF 序列（创建时拷贝，便于算法读取）
    pub chain: Vec<SfId>,
    /// 数据速率（Mbit/s）
    pub dr: f64,
    /// 大小（Mbit）
    pub size: f64,
    /// 持续时间（ms）：一次处理占用 SF 负载的时长
    pub duration: f64,
    pub creation_time: SimTime,
    /// 剩余存活时间（ms），与时钟同单位
    pub ttl: f64,
    pub ingress_node_id: NodeId,
    pub egress_node_id: Option<NodeId>,
    pub current_node_id: NodeId,
    /// 在 SFC 中的位置
    pub current_position: usize,
    /// 当前需要的 SF；处理完整条链后为 `EG`
    pub current_sf: SfId,
    /// 已被接纳处理的次数
    pub processing_index: usize,
    pub end2end_delay: f64,
    pub path_delay: f64,
    pub processing_delay: f64,
    pub crossed_links: u64,
    /// 算法规划的剩余跳
    pub path: VecDeque<NodeId>,
    pub state: FlowState,
    pub forward_to_eg: bool,
    /// 聚合调度为当前 SF 选出的目的节点
    pub target_node_id: Option<NodeId>,
    /// 最近一次准入失败所在节点（处理或转发容量不足）
    pub rejected_at: Option<NodeId>,
    /// 算法自有的键值
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(skip)]
    pub(crate) retried: bool,
}

impl Flow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow_id: impl Into<String>,
        sfc: impl Into<SfcId>,
        chain: Vec<SfId>,
        dr: f64,
        size: f64,
        duration: f64,
        ttl: f64,
        ingress: NodeId,
        egress: Option<NodeId>,
        creation_time: SimTime,
    ) -> Self {
        let current_sf = chain
            .first()
            .cloned()
            .unwrap_or_else(|| EGRESS_SF.to_string());
        let forward_to_eg = chain.is_empty();
        Self {
            flow_id: flow_id.into(),
            sfc: sfc.into(),
            chain,
            dr,
            size,
            duration,
            creation_time,
            ttl,
            ingress_node_id: ingress,
            egress_node_id: egress,
            current_node_id: ingress,
            current_position: 0,
            current_sf,
            processing_index: 0,
            end2end_delay: 0.0,
            path_delay: 0.0,
            processing_delay: 0.0,
            crossed_links: 0,
            path: VecDeque::new(),
            state: FlowState::Normal,
            forward_to_eg,
            target_node_id: None,
            rejected_at: None,
            attributes: BTreeMap::new(),
            retried: false,
        }
    }

    /// 前进到 SFC 的下一个 SF；越过最后一个后改为前往出口。
    pub fn advance_position(&mut self) {
        self.current_position += 1;
        self.target_node_id = None;
        match self.chain.get(self.current_position) {
            Some(sf) => self.current_sf = sf.clone(),
            None => {
                self.current_sf = EGRESS_SF.to_string();
                self.forward_to_eg = true;
            }
        }
    }

    /// 流是否已到达可离开的位置
    pub fn at_egress(&self) -> bool {
        self.forward_to_eg
            && self
                .egress_node_id
                .is_none_or(|eg| eg == self.current_node_id)
    }

    /// 扣减 ttl 与时延记账；返回扣减后的 ttl
    pub(crate) fn spend(&mut self, delay_ms: f64) -> f64 {
        self.end2end_delay += delay_ms;
        self.ttl -= delay_ms;
        self.ttl
    }

    pub fn is_dropped(&self) -> bool {
        self.state == FlowState::Drop
    }

    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }
}

//! 统计信息
//!
//! 两个作用域：累计（自仿真初始化起）与每轮（每次控制器 `apply` 时重置）。
//! 计数器只增不减，唯一例外是 `reset_run`。

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::net::NodeId;
use crate::sfc::{Flow, SfId, SfcId};

/// 丢弃原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// ttl 耗尽
    Ttl,
    /// 算法把状态置为 drop，或没有安装任何规则
    AlgorithmDecision,
    /// 调度表中没有 (node, sfc) 规则，或下一跳为空
    NoRule,
    /// 目的节点上没有放置所需 SF
    NoPlacement,
    /// 目的节点不可达
    NoPath,
    /// 节点或链路容量不足且未被重新路由
    Capacity,
    /// 算法回调返回错误
    AlgorithmError,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Ttl => "ttl",
            DropReason::AlgorithmDecision => "algorithm_decision",
            DropReason::NoRule => "no_rule",
            DropReason::NoPlacement => "no_placement",
            DropReason::NoPath => "no_path",
            DropReason::Capacity => "capacity",
            DropReason::AlgorithmError => "algorithm_error",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (源节点, SFC, SF) -> 目的节点 -> 本轮选择次数（加权轮询用）
pub type DecisionCounts = BTreeMap<NodeId, BTreeMap<SfcId, BTreeMap<SfId, BTreeMap<NodeId, u64>>>>;

/// 每轮统计
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub generated_flows: u64,
    pub processed_flows: u64,
    pub dropped_flows: u64,
    pub total_processing_delay: f64,
    pub processing_count: u64,
    pub total_path_delay: f64,
    pub finished_flows: u64,
    pub total_end2end_delay: f64,
    pub max_end2end_delay: f64,
    /// 入口 -> SFC -> 本轮请求的数据速率之和
    pub requested_traffic: BTreeMap<NodeId, BTreeMap<SfcId, f64>>,
    /// 节点 -> SF -> 本轮被接纳处理的数据速率之和
    pub processed_traffic: BTreeMap<NodeId, BTreeMap<SfId, f64>>,
    pub decision_counts: DecisionCounts,
    /// 节点 -> 本轮最大已用容量
    pub max_node_usage: BTreeMap<NodeId, f64>,
}

#[derive(Debug, Clone)]
pub struct Metrics {
    pub generated_flows: u64,
    pub processed_flows: u64,
    pub dropped_flows: u64,
    pub drop_reasons: BTreeMap<DropReason, u64>,
    pub total_processing_delay: f64,
    pub processing_count: u64,
    /// 已结束（处理完或丢弃）流的路径时延之和
    pub total_path_delay: f64,
    pub total_path_delay_of_processed: f64,
    pub total_crossed_link_delay: f64,
    pub crossed_links: u64,
    pub total_end2end_delay_of_processed: f64,
    pub total_end2end_delay_of_dropped: f64,
    pub total_sfc_length_of_processed: u64,
    pub total_ingress2egress_delay_of_processed: f64,
    pub max_node_usage: BTreeMap<NodeId, f64>,
    pub run: RunMetrics,
    pub run_index: u64,
    started: Instant,
    run_started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            generated_flows: 0,
            processed_flows: 0,
            dropped_flows: 0,
            drop_reasons: BTreeMap::new(),
            total_processing_delay: 0.0,
            processing_count: 0,
            total_path_delay: 0.0,
            total_path_delay_of_processed: 0.0,
            total_crossed_link_delay: 0.0,
            crossed_links: 0,
            total_end2end_delay_of_processed: 0.0,
            total_end2end_delay_of_dropped: 0.0,
            total_sfc_length_of_processed: 0,
            total_ingress2egress_delay_of_processed: 0.0,
            max_node_usage: BTreeMap::new(),
            run: RunMetrics::default(),
            run_index: 0,
            started: now,
            run_started: now,
        }
    }
}

impl Metrics {
    /// 仍在网络中的流
    pub fn in_network_flows(&self) -> u64 {
        self.generated_flows - self.processed_flows - self.dropped_flows
    }

    pub fn generated_flow(&mut self, flow: &Flow) {
        self.generated_flows += 1;
        self.run.generated_flows += 1;
        *self
            .run
            .requested_traffic
            .entry(flow.ingress_node_id)
            .or_default()
            .entry(flow.sfc.clone())
            .or_default() += flow.dr;
    }

    /// 流成功离开；`ingress2egress` 为入口到出口的最短路径时延
    pub fn processed_flow(&mut self, flow: &Flow, ingress2egress: f64) {
        self.processed_flows += 1;
        self.total_end2end_delay_of_processed += flow.end2end_delay;
        self.total_path_delay += flow.path_delay;
        self.total_path_delay_of_processed += flow.path_delay;
        self.total_sfc_length_of_processed += flow.chain.len() as u64;
        self.total_ingress2egress_delay_of_processed += ingress2egress;

        self.run.processed_flows += 1;
        self.run.finished_flows += 1;
        self.run.total_path_delay += flow.path_delay;
        self.run.total_end2end_delay += flow.end2end_delay;
        self.run.max_end2end_delay = self.run.max_end2end_delay.max(flow.end2end_delay);
    }

    pub fn dropped_flow(&mut self, flow: &Flow, reason: DropReason) {
        self.dropped_flows += 1;
        *self.drop_reasons.entry(reason).or_default() += 1;
        self.total_end2end_delay_of_dropped += flow.end2end_delay;
        self.total_path_delay += flow.path_delay;

        self.run.dropped_flows += 1;
        self.run.finished_flows += 1;
        self.run.total_path_delay += flow.path_delay;
    }

    pub fn add_processing_delay(&mut self, delay: f64) {
        self.total_processing_delay += delay;
        self.processing_count += 1;
        self.run.total_processing_delay += delay;
        self.run.processing_count += 1;
    }

    /// 流跨越了 `links` 条链路、共 `delay` 毫秒
    pub fn add_crossed_links(&mut self, links: u64, delay: f64) {
        self.crossed_links += links;
        self.total_crossed_link_delay += delay;
    }

    pub fn add_processed_traffic(&mut self, node: NodeId, sf: &str, dr: f64) {
        *self
            .run
            .processed_traffic
            .entry(node)
            .or_default()
            .entry(sf.to_string())
            .or_default() += dr;
    }

    pub fn record_node_usage(&mut self, node: NodeId, used: f64) {
        let cum = self.max_node_usage.entry(node).or_insert(0.0);
        *cum = cum.max(used);
        let run = self.run.max_node_usage.entry(node).or_insert(0.0);
        *run = run.max(used);
    }

    pub fn decision_counts(&self, node: NodeId, sfc: &str, sf: &str) -> Option<&BTreeMap<NodeId, u64>> {
        self.run.decision_counts.get(&node)?.get(sfc)?.get(sf)
    }

    pub fn count_decision(&mut self, node: NodeId, sfc: &str, sf: &str, dst: NodeId) {
        *self
            .run
            .decision_counts
            .entry(node)
            .or_default()
            .entry(sfc.to_string())
            .or_default()
            .entry(sf.to_string())
            .or_default()
            .entry(dst)
            .or_default() += 1;
    }

    /// 开始新的一轮：清零每轮统计并重新计时
    pub fn reset_run(&mut self) {
        self.run = RunMetrics::default();
        self.run_index += 1;
        self.run_started = Instant::now();
    }

    /// 自创建以来的墙钟耗时（毫秒）
    pub fn runtime_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// 本轮开始以来的墙钟耗时（毫秒）
    pub fn run_runtime_ms(&self) -> f64 {
        self.run_started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn drop_count(&self, reason: DropReason) -> u64 {
        self.drop_reasons.get(&reason).copied().unwrap_or(0)
    }

    /// 当前统计快照
    pub fn stats(&self) -> NetworkStats {
        let finished = self.processed_flows + self.dropped_flows;
        NetworkStats {
            total_flows: self.generated_flows,
            successful_flows: self.processed_flows,
            dropped_flows: self.dropped_flows,
            in_network_flows: self.in_network_flows(),
            avg_end2end_delay: ratio(self.total_end2end_delay_of_processed, self.processed_flows),
            avg_end2end_delay_of_dropped: ratio(self.total_end2end_delay_of_dropped, self.dropped_flows),
            avg_sf_processing_delay: ratio(self.total_processing_delay, self.processing_count),
            avg_sfc_length: ratio(self.total_sfc_length_of_processed as f64, self.processed_flows),
            avg_crossed_link_delay: ratio(self.total_crossed_link_delay, self.crossed_links),
            avg_path_delay: ratio(self.total_path_delay, finished),
            avg_path_delay_of_processed: ratio(self.total_path_delay_of_processed, self.processed_flows),
            avg_ingress2egress_delay_of_processed: ratio(
                self.total_ingress2egress_delay_of_processed,
                self.processed_flows,
            ),
            run_generated_flows: self.run.generated_flows,
            run_processed_flows: self.run.processed_flows,
            run_dropped_flows: self.run.dropped_flows,
            run_avg_end2end_delay: ratio(self.run.total_end2end_delay, self.run.processed_flows),
            run_max_end2end_delay: self.run.max_end2end_delay,
            run_avg_path_delay: ratio(self.run.total_path_delay, self.run.finished_flows),
            run_avg_sf_processing_delay: ratio(self.run.total_processing_delay, self.run.processing_count),
            run_total_processed_traffic: self
                .run
                .processed_traffic
                .values()
                .flat_map(|m| m.values())
                .sum(),
            drop_reasons: self
                .drop_reasons
                .iter()
                .map(|(r, c)| (r.as_str().to_string(), *c))
                .collect(),
            run_index: self.run_index,
        }
    }
}

fn ratio(total: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

/// 网络统计快照（随 `SimulatorState` 交给算法）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_flows: u64,
    pub successful_flows: u64,
    pub dropped_flows: u64,
    pub in_network_flows: u64,
    pub avg_end2end_delay: f64,
    pub avg_end2end_delay_of_dropped: f64,
    pub avg_sf_processing_delay: f64,
    pub avg_sfc_length: f64,
    pub avg_crossed_link_delay: f64,
    pub avg_path_delay: f64,
    pub avg_path_delay_of_processed: f64,
    pub avg_ingress2egress_delay_of_processed: f64,
    pub run_generated_flows: u64,
    pub run_processed_flows: u64,
    pub run_dropped_flows: u64,
    pub run_avg_end2end_delay: f64,
    pub run_max_end2end_delay: f64,
    pub run_avg_path_delay: f64,
    pub run_avg_sf_processing_delay: f64,
    pub run_total_processed_traffic: f64,
    pub drop_reasons: BTreeMap<String, u64>,
    pub run_index: u64,
}

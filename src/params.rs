//! 仿真参数
//!
//! 拓扑、入口/出口节点、SFC 与 SF、配置、带种子的随机数发生器，以及引擎持有的
//! 放置、调度表和逐流规则覆盖。同一种子下所有随机抽样都来自同一个 `Pcg64`，结果可复现。

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal, Pareto};
use rand_pcg::Pcg64;
use tracing::{debug, warn};

use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::net::{Network, NodeId, NodeKind};
use crate::sfc::{ForwardingRules, Placement, ProcessingRules, Schedule, SfList, SfcId, SfcList};
use crate::trace::{TraceRecord, validate_trace};

const FLOW_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const FLOW_ID_SUFFIX_LEN: usize = 6;
/// 拒绝抽样的上限；超过后使用均值兜底
const MAX_REDRAWS: usize = 10_000;

pub struct SimulatorParams {
    pub network: Network,
    pub ingress_nodes: Vec<NodeId>,
    pub egress_nodes: Vec<NodeId>,
    pub sfc_list: SfcList,
    pub sf_list: SfList,
    pub config: SimConfig,
    pub seed: u64,
    rng: Pcg64,
    /// 每个入口当前的平均到达间隔；None 表示静默
    pub inter_arr_mean: BTreeMap<NodeId, Option<f64>>,
    pub placement: Placement,
    pub schedule: Schedule,
    pub flow_processing_rules: ProcessingRules,
    pub flow_forwarding_rules: ForwardingRules,
    pub trace: Vec<TraceRecord>,
    /// 生成器正在运行的入口
    pub(crate) active_generators: BTreeSet<NodeId>,
}

impl SimulatorParams {
    /// 校验输入并预计算最短路径。
    pub fn new(
        mut network: Network,
        sf_list: SfList,
        sfc_list: SfcList,
        config: SimConfig,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        for (sfc, chain) in &sfc_list {
            if let Some(sf) = chain.iter().find(|sf| !sf_list.contains_key(*sf)) {
                return Err(SimError::InvalidInput(format!(
                    "SFC `{sfc}` references unknown SF `{sf}`"
                )));
            }
        }
        if sfc_list.is_empty() {
            return Err(SimError::InvalidInput("no SFC defined".to_string()));
        }
        for sf in sf_list.values() {
            sf.resource_function
                .validate(network.nodes().iter().map(|n| n.cap).fold(1.0, f64::max))
                .map_err(|reason| {
                    SimError::InvalidInput(format!(
                        "resource function `{}` of SF `{}`: {reason}",
                        sf.resource_function_id, sf.id
                    ))
                })?;
        }
        if let Some(node) = network.nodes().iter().find(|n| !(n.cap >= 0.0)) {
            return Err(SimError::InvalidInput(format!(
                "node {} has invalid capacity {}",
                node.name, node.cap
            )));
        }
        if let Some(link) = network.links().iter().find(|l| !(l.cap >= 0.0 && l.delay >= 0.0)) {
            return Err(SimError::InvalidInput(format!(
                "link {:?}->{:?} has invalid delay/capacity",
                link.from, link.to
            )));
        }

        network.ensure_routes();
        let ingress_nodes = network.nodes_of_kind(NodeKind::Ingress);
        let egress_nodes = network.nodes_of_kind(NodeKind::Egress);
        if ingress_nodes.is_empty() {
            warn!("拓扑中没有入口节点，不会生成任何流");
        }
        let inter_arr_mean = ingress_nodes
            .iter()
            .map(|n| (*n, config.inter_arrival_mean_for(network.name(*n))))
            .collect();
        debug!(
            ingress = ingress_nodes.len(),
            egress = egress_nodes.len(),
            sfcs = sfc_list.len(),
            sfs = sf_list.len(),
            seed,
            "仿真参数就绪"
        );

        Ok(Self {
            network,
            ingress_nodes,
            egress_nodes,
            sfc_list,
            sf_list,
            config,
            seed,
            rng: Pcg64::seed_from_u64(seed),
            inter_arr_mean,
            placement: Placement::new(),
            schedule: Schedule::new(),
            flow_processing_rules: ProcessingRules::new(),
            flow_forwarding_rules: ForwardingRules::new(),
            trace: Vec::new(),
            active_generators: BTreeSet::new(),
        })
    }

    /// 附加一个到达率 trace（按时间排序）
    pub fn with_trace(mut self, trace: Vec<TraceRecord>) -> Result<Self> {
        validate_trace(&trace)?;
        for rec in &trace {
            if let Some(name) = &rec.node {
                let known = self
                    .network
                    .node_by_name(name)
                    .is_some_and(|id| self.ingress_nodes.contains(&id));
                if !known {
                    return Err(SimError::InvalidInput(format!(
                        "trace references unknown ingress `{name}`"
                    )));
                }
            }
        }
        self.trace = trace;
        Ok(self)
    }

    /// 到达间隔：确定性时为均值，否则 ~ Exp(1/mean)
    pub fn sample_inter_arrival(&mut self, mean: f64) -> f64 {
        if self.config.deterministic_arrival {
            return mean;
        }
        match Exp::new(1.0 / mean) {
            Ok(exp) => exp.sample(&mut self.rng),
            Err(_) => mean,
        }
    }

    /// 数据速率 ~ Normal(μ, σ)，拒绝非正值
    pub fn sample_dr(&mut self) -> f64 {
        let (mean, stdev) = (self.config.flow_dr_mean, self.config.flow_dr_stdev);
        let Ok(normal) = Normal::new(mean, stdev) else {
            return mean;
        };
        for _ in 0..MAX_REDRAWS {
            let dr = normal.sample(&mut self.rng);
            if dr > 0.0 {
                return dr;
            }
        }
        mean
    }

    /// 流大小：确定性时为 shape，否则 1 + Lomax(shape)，即 Pareto(1, shape)
    pub fn sample_size(&mut self) -> f64 {
        let shape = self.config.flow_size_shape;
        if self.config.deterministic_size {
            return shape;
        }
        match Pareto::new(1.0, shape) {
            Ok(p) => p.sample(&mut self.rng),
            Err(_) => shape,
        }
    }

    /// SF 处理时延 ~ |Normal(mean, stdev)|
    pub fn sample_processing_delay(&mut self, sf: &str) -> f64 {
        let Some(def) = self.sf_list.get(sf) else {
            return 0.0;
        };
        match Normal::new(def.processing_delay_mean, def.processing_delay_stdev) {
            Ok(n) => n.sample(&mut self.rng).abs(),
            Err(_) => def.processing_delay_mean.abs(),
        }
    }

    pub fn sample_ttl(&mut self) -> f64 {
        *self
            .config
            .ttl_choices
            .choose(&mut self.rng)
            .unwrap_or(&f64::INFINITY)
    }

    /// 在 [0, max) 内均匀抽样
    pub fn sample_backoff(&mut self, max: f64) -> f64 {
        if max > 0.0 {
            self.rng.gen_range(0.0..max)
        } else {
            0.0
        }
    }

    pub fn choose_sfc(&mut self) -> Option<SfcId> {
        let keys: Vec<&SfcId> = self.sfc_list.keys().collect();
        keys.choose(&mut self.rng).map(|s| (*s).clone())
    }

    pub fn choose_egress(&mut self) -> Option<NodeId> {
        self.egress_nodes.choose(&mut self.rng).copied()
    }

    /// `<node>-<6 个大写字母/数字>`
    pub fn new_flow_id(&mut self, node: NodeId) -> String {
        let suffix: String = (0..FLOW_ID_SUFFIX_LEN)
            .map(|_| FLOW_ID_ALPHABET[self.rng.gen_range(0..FLOW_ID_ALPHABET.len())] as char)
            .collect();
        format!("{}-{}", self.network.name(node), suffix)
    }

    /// 流持续时间（ms）：配置固定值，或 size / dr × 1000
    pub fn flow_duration(&self, size: f64, dr: f64) -> f64 {
        match self.config.flow_duration {
            Some(d) => d,
            None => size / dr * 1000.0,
        }
    }

    /// 删除某个流在所有节点上的规则覆盖
    pub fn clear_flow_rules(&mut self, flow_id: &str) {
        for rules in self.flow_processing_rules.values_mut() {
            rules.remove(flow_id);
        }
        for rules in self.flow_forwarding_rules.values_mut() {
            rules.remove(flow_id);
        }
    }

    /// 预期到达率（dr_mean / inter_arrival_mean），按 SFC 平均分摊
    pub fn expected_traffic(&self) -> BTreeMap<NodeId, BTreeMap<SfcId, f64>> {
        let n_sfc = self.sfc_list.len().max(1) as f64;
        self.inter_arr_mean
            .iter()
            .map(|(node, mean)| {
                let rate = mean.map_or(0.0, |m| self.config.flow_dr_mean / m);
                let per_sfc = self
                    .sfc_list
                    .keys()
                    .map(|sfc| (sfc.clone(), rate / n_sfc))
                    .collect();
                (*node, per_sfc)
            })
            .collect()
    }
}

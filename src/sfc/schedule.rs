//! 调度表：源节点 -> SFC -> SF -> { 目的节点 -> 概率 }

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{SfId, SfcId};
use crate::net::NodeId;

/// 调度表中概率向量之和允许的误差
pub const SCHEDULE_TOLERANCE: f64 = 1e-6;

type Weights = BTreeMap<NodeId, f64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule(pub BTreeMap<NodeId, BTreeMap<SfcId, BTreeMap<SfId, Weights>>>);

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, src: NodeId, sfc: impl Into<SfcId>, sf: impl Into<SfId>, dst: NodeId, p: f64) {
        self.0
            .entry(src)
            .or_default()
            .entry(sfc.into())
            .or_default()
            .entry(sf.into())
            .or_default()
            .insert(dst, p);
    }

    /// `(src, sfc, sf)` 的概率向量
    pub fn weights(&self, src: NodeId, sfc: &str, sf: &str) -> Option<&Weights> {
        self.0.get(&src)?.get(sfc)?.get(sf)
    }

    /// 源节点是否为该 SFC 配置了任何规则
    pub fn has_rule(&self, src: NodeId, sfc: &str) -> bool {
        self.0.get(&src).is_some_and(|m| m.contains_key(sfc))
    }

    /// 把每个概率向量归一化为和 1。已归一化（和与 1 的差在机器精度内）的向量保持不变；
    /// 全零向量无法归一化，原样保留。
    pub fn normalize(&mut self) {
        for weights in self.vectors_mut() {
            normalize_weights(weights);
        }
    }

    /// 检查所有概率非负、有限，且和为 1（误差 `tolerance`）。
    pub fn validate(&self, tolerance: f64) -> Result<(), String> {
        for (src, sfcs) in &self.0 {
            for (sfc, sfs) in sfcs {
                for (sf, weights) in sfs {
                    if let Some((dst, p)) = weights.iter().find(|(_, p)| !p.is_finite() || **p < 0.0) {
                        return Err(format!(
                            "invalid probability {p} for {src:?}/{sfc}/{sf} -> {dst:?}"
                        ));
                    }
                    let sum: f64 = weights.values().sum();
                    if (sum - 1.0).abs() > tolerance {
                        return Err(format!(
                            "probabilities for {src:?}/{sfc}/{sf} sum to {sum}, expected 1"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn vectors_mut(&mut self) -> impl Iterator<Item = &mut Weights> + '_ {
        self.0
            .values_mut()
            .flat_map(|sfcs| sfcs.values_mut())
            .flat_map(|sfs| sfs.values_mut())
    }
}

/// 单个概率向量的归一化
pub(crate) fn normalize_weights(weights: &mut Weights) {
    let sum: f64 = weights.values().sum();
    if sum <= 0.0 || !sum.is_finite() || (sum - 1.0).abs() <= f64::EPSILON {
        return;
    }
    for p in weights.values_mut() {
        *p /= sum;
    }
}

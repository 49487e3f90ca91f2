//! 节点类型
//!
//! 定义 PoP 节点：总容量、剩余容量以及节点上可用的 SF 实例。

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::NodeId;
use crate::sfc::{SfId, SfList};
use crate::sim::SimTime;

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodeKind {
    Ingress,
    #[default]
    Normal,
    Egress,
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Ingress" => Ok(NodeKind::Ingress),
            "Normal" | "" => Ok(NodeKind::Normal),
            "Egress" => Ok(NodeKind::Egress),
            other => Err(format!("unknown NodeType `{other}`")),
        }
    }
}

/// 节点上的一个 SF 实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SfInstance {
    /// 当前聚合负载（Mbit/s）
    pub load: f64,
    /// 最近一次负载变化的时间
    pub last_active: SimTime,
    /// 实例被放置（开始启动）的时间
    pub startup_time: SimTime,
}

impl SfInstance {
    pub fn new(now: SimTime) -> Self {
        Self {
            load: 0.0,
            last_active: now,
            startup_time: now,
        }
    }
}

/// PoP 节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub cap: f64,
    pub remaining_cap: f64,
    pub available_sf: BTreeMap<SfId, SfInstance>,
}

impl Node {
    /// 创建新节点
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind, cap: f64) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            cap,
            remaining_cap: cap,
            available_sf: BTreeMap::new(),
        }
    }

    /// 已用容量
    pub fn used_cap(&self) -> f64 {
        self.cap - self.remaining_cap
    }

    /// `Σ f_sf(load_sf + extra·[sf == target])`：若给 `target` 追加 `extra` 负载，节点需要的总容量。
    ///
    /// 目录中缺失的 SF 按恒等资源函数计算。
    pub fn demanded_total(&self, sfs: &SfList, target: &str, extra: f64) -> f64 {
        let mut total: f64 = self
            .available_sf
            .iter()
            .map(|(sf, inst)| {
                let load = if sf == target { inst.load + extra } else { inst.load };
                resources(sfs, sf, load)
            })
            .sum();
        if !self.available_sf.contains_key(target) {
            total += resources(sfs, target, extra);
        }
        total
    }

    /// 按当前负载重新计算剩余容量
    pub fn recompute_remaining(&mut self, sfs: &SfList) {
        let used: f64 = self
            .available_sf
            .iter()
            .map(|(sf, inst)| resources(sfs, sf, inst.load))
            .sum();
        self.remaining_cap = self.cap - used;
    }

    /// SF 实例是否已完成启动
    pub fn is_warm(&self, sfs: &SfList, sf: &str, now: SimTime) -> bool {
        self.warmup_left(sfs, sf, now) == SimTime::ZERO
    }

    /// 距离 SF 实例就绪还需等待的时间
    pub fn warmup_left(&self, sfs: &SfList, sf: &str, now: SimTime) -> SimTime {
        let (Some(inst), Some(def)) = (self.available_sf.get(sf), sfs.get(sf)) else {
            return SimTime::ZERO;
        };
        let ready = inst
            .startup_time
            .saturating_add(SimTime::from_millis_f64(def.startup_delay));
        ready.saturating_sub(now)
    }
}

fn resources(sfs: &SfList, sf: &str, load: f64) -> f64 {
    match sfs.get(sf) {
        Some(def) => def.resources(load),
        None => load,
    }
}

//! 链路类型
//!
//! 定义有向链路：时延（ms）、容量与剩余容量（Mbit/s）。双向链路由两条有向链路表示。

use serde::{Deserialize, Serialize};

use super::id::{LinkId, NodeId};

/// 有向网络链路
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub from: NodeId,
    pub to: NodeId,
    /// 传播时延（ms）
    pub delay: f64,
    pub cap: f64,
    pub remaining_cap: f64,
}

impl Link {
    /// 创建新链路
    pub fn new(id: LinkId, from: NodeId, to: NodeId, delay: f64, cap: f64) -> Self {
        Self {
            id,
            from,
            to,
            delay,
            cap,
            remaining_cap: cap,
        }
    }

    pub fn used_cap(&self) -> f64 {
        self.cap - self.remaining_cap
    }

    /// 能否再承载 `dr`；容量为 0 的链路视为阻断
    pub fn can_carry(&self, dr: f64) -> bool {
        self.cap > 0.0 && self.remaining_cap + 1e-9 >= dr
    }
}

//! 算法拦截接口
//!
//! 协调算法实现 `Coordinator`，按需覆盖回调；未覆盖的回调是显式的空操作。
//! 回调通过 `SimContext` 读取状态并以 `SimulatorAction` 提交修改。

use crate::error::Result;
use crate::metrics::DropReason;
use crate::net::NodeId;
use crate::sfc::Flow;

use super::context::SimContext;

/// `pass_flow` 回调的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassOutcome {
    /// 没有规则覆盖时回退到决策器（调度表或外部决策）
    #[default]
    Fallback,
    /// 算法声明已为该流安装规则；若找不到适用规则且状态不是 drop，流被丢弃
    RulesInstalled,
}

/// 周期回调：从 t=0 起每 `interval` 毫秒触发一次（首次在 t=interval）
#[derive(Debug, Clone, PartialEq)]
pub struct Periodic {
    pub label: String,
    pub interval: f64,
}

impl Periodic {
    pub fn new(label: impl Into<String>, interval: f64) -> Self {
        Self {
            label: label.into(),
            interval,
        }
    }
}

pub trait Coordinator {
    /// 流刚创建、首次 pass 之前
    fn init_flow(&mut self, _flow: &mut Flow, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    /// 流每次到达一个节点
    fn pass_flow(&mut self, _flow: &mut Flow, _ctx: &mut SimContext<'_>) -> Result<PassOutcome> {
        Ok(PassOutcome::Fallback)
    }

    /// 引擎完成一次转发、流已到达 `node`
    fn post_forwarding(&mut self, _node: NodeId, _flow: &mut Flow, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    fn depart_flow(&mut self, _flow: &Flow, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    fn drop_flow(&mut self, _flow: &Flow, _reason: DropReason, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    /// 需要注册的周期回调；在仿真启动时读取一次
    fn periodic(&self) -> Vec<Periodic> {
        Vec::new()
    }

    fn on_periodic(&mut self, _label: &str, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }
}

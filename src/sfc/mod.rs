//! SFC 模型
//!
//! 服务功能（SF）、资源函数、服务功能链（SFC）、流以及放置/调度表。

use std::collections::BTreeMap;

use crate::net::NodeId;

mod flow;
mod placement;
mod resource_function;
mod schedule;
mod service_function;

pub use flow::{Flow, FlowState};
pub use placement::Placement;
pub use resource_function::ResourceFunction;
pub use schedule::{Schedule, SCHEDULE_TOLERANCE};
pub use service_function::{ServiceFunction, SfList, SfcList};

/// 服务功能标识
pub type SfId = String;
/// 服务功能链标识
pub type SfcId = String;

/// 处理规则覆盖：节点 -> flow_id -> 在该节点上要处理的 SF 列表
pub type ProcessingRules = BTreeMap<NodeId, BTreeMap<String, Vec<SfId>>>;
/// 转发规则覆盖：节点 -> flow_id -> 下一跳节点
pub type ForwardingRules = BTreeMap<NodeId, BTreeMap<String, NodeId>>;

/// 保留的伪 SF：表示流已处理完毕、正在前往出口。
pub const EGRESS_SF: &str = "EG";

//! 网络模型模块
//!
//! 此模块包含 PoP 网络的核心组件：节点、链路、拓扑与最短路径路由。

// 子模块声明
mod id;
mod link;
mod network;
mod node;
mod routing;

// 重新导出公共接口
pub use id::{LinkId, NodeId};
pub use link::Link;
pub use network::Network;
pub use node::{Node, NodeKind, SfInstance};
pub use routing::RoutingTable;

//! 网络拓扑管理
//!
//! 定义 PoP 拓扑：节点、有向链路、预计算的最短路径，以及容量记账。
//! `Clone` 即为算法可随意修改的独立拓扑快照。

use std::collections::HashMap;

use super::id::{LinkId, NodeId};
use super::link::Link;
use super::node::{Node, NodeKind};
use super::routing::{RoutingTable, dijkstra, rebuild_path};
use crate::sfc::SfList;
use tracing::{debug, trace};

/// 网络拓扑
#[derive(Debug, Default, Clone)]
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    edges: HashMap<(NodeId, NodeId), LinkId>,
    names: HashMap<String, NodeId>,
    routing: RoutingTable,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点；名字重复时返回已有节点
    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind, cap: f64) -> NodeId {
        let name = name.into();
        if let Some(id) = self.names.get(&name) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        trace!(node = ?id, name = %name, ?kind, cap, "添加节点");
        self.names.insert(name.clone(), id);
        self.nodes.push(Node::new(id, name, kind, cap));
        self.routing.mark_dirty();
        id
    }

    /// 连接两个节点（创建单向链路）
    pub fn connect(&mut self, from: NodeId, to: NodeId, delay: f64, cap: f64) -> LinkId {
        if let Some(existing) = self.edges.get(&(from, to)) {
            let link = &mut self.links[existing.0];
            link.delay = delay;
            link.cap = cap;
            link.remaining_cap = cap;
            self.routing.mark_dirty();
            return *existing;
        }
        let id = LinkId(self.links.len());
        self.links.push(Link::new(id, from, to, delay, cap));
        self.edges.insert((from, to), id);
        self.routing.mark_dirty();
        id
    }

    /// 连接两个节点（两个方向各一条链路）
    pub fn connect_bidirectional(
        &mut self,
        a: NodeId,
        b: NodeId,
        delay: f64,
        fwd_cap: f64,
        bkwd_cap: f64,
    ) -> (LinkId, LinkId) {
        (
            self.connect(a, b, delay, fwd_cap),
            self.connect(b, a, delay, bkwd_cap),
        )
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> + '_ {
        self.nodes.iter_mut()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// 节点名（越界时返回 "?"）
    pub fn name(&self, id: NodeId) -> &str {
        self.nodes.get(id.0).map(|n| n.name.as_str()).unwrap_or("?")
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id.0)
    }

    pub fn link_between(&self, from: NodeId, to: NodeId) -> Option<LinkId> {
        self.edges.get(&(from, to)).copied()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.kind == kind)
            .map(|n| n.id)
            .collect()
    }

    /// 预计算所有点对的最短路径（幂等）
    pub fn ensure_routes(&mut self) {
        if !self.routing.is_built() {
            debug!(nodes = self.nodes.len(), links = self.links.len(), "计算所有点对最短路径");
        }
        self.routing.ensure_built(self.nodes.len(), &self.links);
    }

    /// 预计算的路由表；调用前需 `ensure_routes`
    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// 预计算的最短路径时延；同一节点为 0
    pub fn path_delay(&self, from: NodeId, to: NodeId) -> Option<f64> {
        if from == to {
            return Some(0.0);
        }
        self.routing.delay(from, to)
    }

    /// 预计算的最短路径（含两端）
    pub fn shortest_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        self.routing.path(from, to)
    }

    /// 只经过剩余容量不少于 `dr` 的链路的最短路径（按当前剩余容量即时计算）
    pub fn shortest_path_with_capacity(&self, from: NodeId, to: NodeId, dr: f64) -> Option<Vec<NodeId>> {
        let (_, pred) = dijkstra(self.nodes.len(), &self.links, from, |l| l.can_carry(dr));
        rebuild_path(&pred, from, to)
    }

    /// 沿节点序列的链路；任意一段不存在时为 None
    pub fn links_along(&self, path: &[NodeId]) -> Option<Vec<LinkId>> {
        path.windows(2)
            .map(|w| self.link_between(w[0], w[1]))
            .collect()
    }

    /// 所有节点按当前负载重新计算剩余容量
    pub fn recompute_all(&mut self, sfs: &SfList) {
        for node in &mut self.nodes {
            node.recompute_remaining(sfs);
        }
    }

    /// 节点平均负载（used / cap；cap 为 0 的节点不计）
    pub fn avg_node_load(&self) -> f64 {
        mean(
            self.nodes
                .iter()
                .filter(|n| n.cap > 0.0)
                .map(|n| n.used_cap() / n.cap),
        )
    }

    /// 链路平均负载（used / cap；cap 为 0 的链路不计）
    pub fn avg_link_load(&self) -> f64 {
        mean(
            self.links
                .iter()
                .filter(|l| l.cap > 0.0)
                .map(|l| l.used_cap() / l.cap),
        )
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

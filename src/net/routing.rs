//! 最短路径路由
//!
//! 为每个 (from, dst) 预计算按时延最短的路径：权重为时延之和，时延相同时
//! 优先容量更大的路径（比较 Σ 1/cap），再按节点下标决胜，保证结果确定。
//! 拓扑在运行期间不变，因此路由表只在标记为 dirty 后重建。

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::id::NodeId;
use super::link::Link;

/// 容量为 0 的链路在决胜项中的代价
const BLOCKED_INV_CAP: f64 = 1e12;

/// 路径代价：先比时延，再比 Σ 1/cap
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PathCost {
    pub delay: f64,
    pub inv_cap: f64,
}

impl PathCost {
    const ZERO: PathCost = PathCost {
        delay: 0.0,
        inv_cap: 0.0,
    };

    fn extend(self, link: &Link) -> PathCost {
        let inv = if link.cap > 0.0 {
            1.0 / link.cap
        } else {
            BLOCKED_INV_CAP
        };
        PathCost {
            delay: self.delay + link.delay,
            inv_cap: self.inv_cap + inv,
        }
    }
}

impl Eq for PathCost {}

impl Ord for PathCost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.delay
            .total_cmp(&other.delay)
            .then(self.inv_cap.total_cmp(&other.inv_cap))
    }
}

impl PartialOrd for PathCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 单源 Dijkstra。只走 `usable` 返回 true 的链路。
///
/// 返回 (到各点的代价, 各点在最短路径树上的前驱)。
pub(crate) fn dijkstra<F>(
    node_count: usize,
    links: &[Link],
    src: NodeId,
    usable: F,
) -> (Vec<Option<PathCost>>, Vec<Option<NodeId>>)
where
    F: Fn(&Link) -> bool,
{
    let mut out: Vec<Vec<&Link>> = vec![Vec::new(); node_count];
    for link in links.iter().filter(|l| usable(*l)) {
        out[link.from.0].push(link);
    }
    for adj in &mut out {
        adj.sort_by_key(|l| (l.to, l.id));
    }

    let mut cost: Vec<Option<PathCost>> = vec![None; node_count];
    let mut pred: Vec<Option<NodeId>> = vec![None; node_count];
    let mut done = vec![false; node_count];
    let mut heap = BinaryHeap::new();

    if src.0 >= node_count {
        return (cost, pred);
    }
    cost[src.0] = Some(PathCost::ZERO);
    heap.push(Reverse((PathCost::ZERO, src.0)));

    while let Some(Reverse((c, v))) = heap.pop() {
        if done[v] {
            continue;
        }
        done[v] = true;
        for link in &out[v] {
            let w = link.to.0;
            if done[w] {
                continue;
            }
            let cand = c.extend(link);
            if cost[w].is_none_or(|cur| cand < cur) {
                cost[w] = Some(cand);
                pred[w] = Some(NodeId(v));
                heap.push(Reverse((cand, w)));
            }
        }
    }
    (cost, pred)
}

/// 由前驱数组还原 src -> dst 的节点序列（含两端）
pub(crate) fn rebuild_path(pred: &[Option<NodeId>], src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
    let mut path = vec![dst];
    let mut cur = dst;
    while cur != src {
        cur = pred.get(cur.0).copied().flatten()?;
        path.push(cur);
        if path.len() > pred.len() + 1 {
            return None;
        }
    }
    path.reverse();
    Some(path)
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    dirty: bool,
    /// cost[from][dst]
    cost: Vec<Vec<Option<PathCost>>>,
    /// pred[from][dst]：以 from 为根的最短路径树上 dst 的前驱
    pred: Vec<Vec<Option<NodeId>>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            dirty: true,
            cost: Vec::new(),
            pred: Vec::new(),
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_built(&self) -> bool {
        !self.dirty
    }

    /// 确保路由表基于当前拓扑是最新的。
    pub fn ensure_built(&mut self, node_count: usize, links: &[Link]) {
        if !self.dirty {
            return;
        }
        self.cost.clear();
        self.pred.clear();
        for src in 0..node_count {
            let (cost, pred) = dijkstra(node_count, links, NodeId(src), |_| true);
            self.cost.push(cost);
            self.pred.push(pred);
        }
        self.dirty = false;
    }

    /// from -> dst 的最短路径时延（ms），不可达时为 None
    pub fn delay(&self, from: NodeId, dst: NodeId) -> Option<f64> {
        self.cost.get(from.0)?.get(dst.0).copied().flatten().map(|c| c.delay)
    }

    /// from -> dst 的最短路径节点序列（含两端）
    pub fn path(&self, from: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        rebuild_path(self.pred.get(from.0)?, from, dst)
    }

    /// from -> dst 最短路径上的下一跳；from == dst 时为 None
    pub fn next_hop(&self, from: NodeId, dst: NodeId) -> Option<NodeId> {
        self.path(from, dst).and_then(|p| p.get(1).copied())
    }
}

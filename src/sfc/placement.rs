//! 放置：节点 -> 该节点上的 SF 集合

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::SfId;
use crate::net::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placement(pub BTreeMap<NodeId, BTreeSet<SfId>>);

impl Placement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&mut self, node: NodeId, sf: impl Into<SfId>) {
        self.0.entry(node).or_default().insert(sf.into());
    }

    pub fn remove(&mut self, node: NodeId, sf: &str) -> bool {
        let Some(set) = self.0.get_mut(&node) else {
            return false;
        };
        let removed = set.remove(sf);
        if set.is_empty() {
            self.0.remove(&node);
        }
        removed
    }

    pub fn contains(&self, node: NodeId, sf: &str) -> bool {
        self.0.get(&node).is_some_and(|s| s.contains(sf))
    }

    /// 节点上的 SF（无则为空迭代）
    pub fn sfs_at(&self, node: NodeId) -> impl Iterator<Item = &SfId> + '_ {
        self.0.get(&node).into_iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SfId)> + '_ {
        self.0
            .iter()
            .flat_map(|(n, sfs)| sfs.iter().map(move |sf| (*n, sf)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|s| s.is_empty())
    }
}

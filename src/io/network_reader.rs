//! GraphML network reader.
//!
//! Undirected GraphML graphs (Topology Zoo style) are read as two directed links per edge.
//! Node ids become `pop<id>`; capacities fall back to caller-supplied defaults.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::net::{Network, NodeId, NodeKind};

const SPEED_OF_LIGHT: f64 = 299_792_458.0;
const PROPAGATION_FACTOR: f64 = 0.77;
const EARTH_RADIUS_M: f64 = 6_371_000.0;
const DEFAULT_LINK_DELAY: f64 = 3.0;

/// Capacities used when a node or edge does not carry `NodeCap` / `LinkFwdCap` / `LinkBkwdCap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkDefaults {
    pub node_cap: f64,
    pub link_cap: f64,
}

impl Default for NetworkDefaults {
    fn default() -> Self {
        Self {
            node_cap: 10.0,
            link_cap: 1000.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphMl {
    #[serde(rename = "key", default)]
    keys: Vec<Key>,
    graph: Graph,
}

#[derive(Debug, Deserialize)]
struct Key {
    id: String,
    #[serde(rename = "attr.name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Graph {
    #[serde(rename = "node", default)]
    nodes: Vec<XmlNode>,
    #[serde(rename = "edge", default)]
    edges: Vec<XmlEdge>,
}

#[derive(Debug, Deserialize)]
struct XmlNode {
    id: String,
    #[serde(rename = "data", default)]
    data: Vec<Data>,
}

#[derive(Debug, Deserialize)]
struct XmlEdge {
    source: String,
    target: String,
    #[serde(rename = "data", default)]
    data: Vec<Data>,
}

#[derive(Debug, Deserialize)]
struct Data {
    key: String,
    #[serde(rename = "$value", default)]
    value: String,
}

/// Reads a GraphML file.
pub fn read_network(path: &Path, defaults: NetworkDefaults) -> Result<Network> {
    let raw = std::fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    let network = parse_graphml(&raw, defaults).map_err(|reason| SimError::GraphMl {
        path: path.to_path_buf(),
        reason,
    })?;
    info!(
        path = %path.display(),
        nodes = network.node_count(),
        links = network.links().len(),
        "📡 读取网络拓扑"
    );
    Ok(network)
}

/// Parses GraphML text into a [`Network`].
pub fn parse_graphml(raw: &str, defaults: NetworkDefaults) -> std::result::Result<Network, String> {
    let doc: GraphMl = serde_xml_rs::from_str(raw).map_err(|e| e.to_string())?;
    let key_names: HashMap<&str, &str> = doc
        .keys
        .iter()
        .map(|k| (k.id.as_str(), k.name.as_str()))
        .collect();
    let collect_attrs = |data: &[Data]| -> HashMap<String, String> {
        data.iter()
            .filter_map(|d| {
                let name = key_names.get(d.key.as_str())?;
                Some((name.to_string(), d.value.trim().to_string()))
            })
            .collect()
    };

    // Graph ids -> integer ids, sorted so node ids are stable across runs.
    let mut parsed: BTreeMap<usize, HashMap<String, String>> = BTreeMap::new();
    for node in &doc.graph.nodes {
        let id = parse_node_id(&node.id)?;
        if parsed.insert(id, collect_attrs(&node.data)).is_some() {
            return Err(format!("duplicate node id `{}`", node.id));
        }
    }

    let mut network = Network::new();
    let mut ids: HashMap<usize, NodeId> = HashMap::new();
    let mut coords: HashMap<usize, (f64, f64)> = HashMap::new();
    for (raw_id, attrs) in &parsed {
        let cap = match attrs.get("NodeCap") {
            Some(v) => parse_number(v, "NodeCap")?,
            None => defaults.node_cap,
        };
        let kind = match attrs.get("NodeType") {
            Some(v) => v.parse::<NodeKind>()?,
            None => NodeKind::Normal,
        };
        let id = network.add_node(format!("pop{raw_id}"), kind, cap);
        ids.insert(*raw_id, id);
        if let (Some(lat), Some(lon)) = (attrs.get("Latitude"), attrs.get("Longitude")) {
            coords.insert(*raw_id, (parse_number(lat, "Latitude")?, parse_number(lon, "Longitude")?));
        }
    }

    for edge in &doc.graph.edges {
        let (src, dst) = (parse_node_id(&edge.source)?, parse_node_id(&edge.target)?);
        let (Some(a), Some(b)) = (ids.get(&src).copied(), ids.get(&dst).copied()) else {
            return Err(format!("edge {}-{} references an unknown node", edge.source, edge.target));
        };
        if a == b {
            debug!(node = src, "忽略自环");
            continue;
        }
        let attrs = collect_attrs(&edge.data);
        let delay = match attrs.get("LinkDelay") {
            Some(v) => parse_number(v, "LinkDelay")?,
            None => match (coords.get(&src), coords.get(&dst)) {
                (Some(p), Some(q)) => propagation_delay(*p, *q),
                _ => DEFAULT_LINK_DELAY,
            },
        };
        let fwd = match attrs.get("LinkFwdCap") {
            Some(v) => parse_number(v, "LinkFwdCap")?,
            None => defaults.link_cap,
        };
        let bkwd = match attrs.get("LinkBkwdCap") {
            Some(v) => parse_number(v, "LinkBkwdCap")?,
            None => defaults.link_cap,
        };
        network.connect_bidirectional(a, b, delay, fwd, bkwd);
    }
    network.ensure_routes();
    Ok(network)
}

/// Accepts `"3"` as well as yEd-style `"n3"`.
fn parse_node_id(raw: &str) -> std::result::Result<usize, String> {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('n')
        .unwrap_or(trimmed)
        .parse::<usize>()
        .map_err(|_| format!("node id `{raw}` is not an integer"))
}

fn parse_number(raw: &str, attr: &str) -> std::result::Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("{attr} value `{raw}` is not a number"))
}

/// Great-circle distance between two `(lat, lon)` points divided by the propagation speed,
/// rounded to whole milliseconds.
pub(crate) fn propagation_delay((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let distance = 2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin();
    (distance / (PROPAGATION_FACTOR * SPEED_OF_LIGHT) * 1000.0).round()
}

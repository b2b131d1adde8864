//! The graph data model (§3, §4.1): an immutable description of nodes,
//! edges, and the start node, validated once at construction.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::FailurePolicy;
use crate::error::GraphInvalid;
use crate::value::MergeStrategy;

use super::node_fn::BoxedNodeFn;
use super::predicate::Predicate;

/// An opaque, non-empty string, unique within a `Graph`.
pub type NodeId = String;

/// Per-node tunables (§3). `failure_policy` and `merge_strategy` are
/// additions layered on top of the explicitly named options —
/// absent means "use the engine-wide default."
#[derive(Clone)]
pub struct NodeConfig {
    pub timeout: Option<Duration>,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub metadata: Map<String, Value>,
    pub failure_policy: Option<FailurePolicy>,
    pub merge_strategy: Option<MergeStrategy>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            retry_count: 0,
            retry_delay: Duration::from_secs(1),
            metadata: Map::new(),
            failure_policy: None,
            merge_strategy: None,
        }
    }
}

/// One vertex: an id, an executable body, and its config.
#[derive(Clone)]
pub struct Node {
    pub id: NodeId,
    pub f: BoxedNodeFn,
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, f: BoxedNodeFn) -> Self {
        Self {
            id: id.into(),
            f,
            config: NodeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }
}

/// A directed edge, optionally conditional (§3). Self-edges, cycles, and
/// multiple edges between the same endpoints are all permitted.
#[derive(Clone)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub condition: Option<Predicate>,
}

impl Edge {
    pub fn unconditional(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    pub fn conditional(source: impl Into<NodeId>, target: impl Into<NodeId>, condition: Predicate) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: Some(condition),
        }
    }
}

/// An immutable, validated computation graph (§3, §4.1).
///
/// Construction order of `edges` is preserved and used for tie-breaking
/// (§4.3, §4.6 step 6b): `outgoing` returns edges in the order they were
/// passed to `GraphBuilder::add_edge`.
pub struct Graph {
    pub id: String,
    nodes: HashMap<NodeId, Node>,
    edges: Vec<Edge>,
    outgoing_index: HashMap<NodeId, Vec<usize>>,
    pub start: NodeId,
}

impl Graph {
    pub fn builder(id: impl Into<String>, start: impl Into<NodeId>) -> GraphBuilder {
        GraphBuilder {
            id: id.into(),
            start: start.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Outgoing edges of `node`, in construction order.
    pub fn outgoing(&self, node: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing_index
            .get(node)
            .into_iter()
            .flat_map(|indices| indices.iter().map(|&i| &self.edges[i]))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }
}

/// Accumulates nodes and edges, then validates into an immutable `Graph`
/// (§4.1): duplicate ids, dangling edges, a missing start, or an empty node
/// set all fail with `GraphInvalid`. No acyclicity check — cycles are a
/// first-class, supported feature of this engine.
pub struct GraphBuilder {
    id: String,
    start: NodeId,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn build(self) -> Result<Graph, GraphInvalid> {
        if self.nodes.is_empty() {
            return Err(GraphInvalid::EmptyGraph);
        }

        let mut nodes = HashMap::with_capacity(self.nodes.len());
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in self.nodes {
            if !seen.insert(node.id.clone()) {
                return Err(GraphInvalid::DuplicateNodeId(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }

        if !nodes.contains_key(&self.start) {
            return Err(GraphInvalid::UnknownStart(self.start));
        }

        for edge in &self.edges {
            if !nodes.contains_key(&edge.source) {
                return Err(GraphInvalid::DanglingEdge(edge.source.clone()));
            }
            if !nodes.contains_key(&edge.target) {
                return Err(GraphInvalid::DanglingEdge(edge.target.clone()));
            }
        }

        let mut outgoing_index: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (i, edge) in self.edges.iter().enumerate() {
            outgoing_index.entry(edge.source.clone()).or_default().push(i);
        }

        Ok(Graph {
            id: self.id,
            nodes,
            edges: self.edges,
            outgoing_index,
            start: self.start,
        })
    }
}

//! Graph data model: nodes, directed (possibly conditional) edges, and a
//! start node, validated once at construction (§3, §4.1).

pub mod model;
pub mod node_fn;
pub mod predicate;

pub use model::{Edge, Graph, GraphBuilder, Node, NodeConfig, NodeId};
pub use node_fn::{AsyncFnNode, BlockingFnNode, BoxedNodeFn, NodeContext, NodeFn};
pub use predicate::Predicate;

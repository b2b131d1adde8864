//! Engine error taxonomy.
//!
//! `GraphInvalid` is raised synchronously at construction and never during
//! execution. `Timeout` and `UserError` are transient node errors, subject to
//! retry; `InvalidOutput` and `MergeConflict` are contract violations and are
//! never retried. Both groups become a terminal `NodeFailure` once the
//! failure policy ladder (`FailurePolicy`) has been applied. `IterationCapExceeded`
//! and `Cancelled` are run-level outcomes, not per-node errors.

use std::time::Duration;

use thiserror::Error;

use crate::graph::NodeId;

/// Why a graph failed validation at construction time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphInvalid {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    #[error("edge references unknown node: {0}")]
    DanglingEdge(NodeId),

    #[error("start node is not present in the graph: {0}")]
    UnknownStart(NodeId),

    #[error("graph has no nodes")]
    EmptyGraph,
}

/// The underlying cause of a single node invocation attempt failing.
#[derive(Debug, Error, Clone)]
pub enum NodeErrorCause {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("user function raised: {0}")]
    UserError(String),

    #[error("user function returned a non-mapping value: {0}")]
    InvalidOutput(String),
}

/// A terminal failure for one node's execution within a superstep, after the
/// retry ladder in §4.5 has been exhausted (or immediately, for contract
/// violations, which are never retried).
#[derive(Debug, Error, Clone)]
#[error("node {node} failed at superstep {superstep} after {attempts} attempt(s): {cause}")]
pub struct NodeFailure {
    pub node: NodeId,
    pub superstep: u64,
    pub attempts: u32,
    pub cause: NodeErrorCause,
}

/// A state-store write that failed under the `REJECT` merge strategy.
#[derive(Debug, Error, Clone)]
#[error("merge conflict on key {key:?}: value already present and strategy is REJECT")]
pub struct MergeConflict {
    pub key: String,
}

/// The top-level, run-terminating error surfaced by `Engine::run`.
///
/// Note that most node-level failures do *not* reach this type: under the
/// default `ISOLATE` policy they are recorded in `ExecutionResult::per_node_stats`
/// and the run continues. This type is reserved for `GraphInvalid` (construction),
/// `IterationCapExceeded`/`Cancelled` (run-level), and `PROPAGATE`d node failures
/// (fatal by policy).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("graph invalid: {0}")]
    GraphInvalid(#[from] GraphInvalid),

    #[error("node failure propagated to fatal: {0}")]
    Fatal(#[from] NodeFailure),

    #[error("merge conflict: {0}")]
    MergeConflict(#[from] MergeConflict),

    #[error("run exceeded iteration cap")]
    IterationCapExceeded,

    #[error("run cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_invalid_display_contains_node_id() {
        let err = GraphInvalid::DanglingEdge("missing".to_string());
        let s = err.to_string();
        assert!(s.contains("missing"));
    }

    #[test]
    fn node_failure_display_contains_counts() {
        let failure = NodeFailure {
            node: "n1".to_string(),
            superstep: 3,
            attempts: 2,
            cause: NodeErrorCause::UserError("boom".to_string()),
        };
        let s = failure.to_string();
        assert!(s.contains("n1"));
        assert!(s.contains("superstep 3"));
        assert!(s.contains("2 attempt"));
        assert!(s.contains("boom"));
    }

    #[test]
    fn engine_error_from_graph_invalid() {
        let err: EngineError = GraphInvalid::EmptyGraph.into();
        assert!(matches!(err, EngineError::GraphInvalid(GraphInvalid::EmptyGraph)));
    }
}

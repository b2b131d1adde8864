//! The result envelope (§3): final state plus an execution trace.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::graph::NodeId;

/// Why the scheduler stopped. Exactly one of these applies to any given run
/// (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminatedBy {
    Quiescence,
    IterationCap,
    FatalError,
}

/// Per-node execution tally, accumulated across the whole run.
#[derive(Debug, Clone, Default)]
pub struct NodeStats {
    pub runs: u64,
    pub failures: u64,
    pub total_duration: Duration,
}

/// The engine's output (§3, §6): `final_state` is returned even on fatal
/// failure, reflecting whatever was committed before termination.
///
/// `fatal_cause` is populated only when `terminated_by == FatalError`: either
/// the stringified cause of a `PROPAGATE`d node failure, or the literal
/// `"cancelled"` sentinel described in §4.6's cancellation paragraph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub final_state: Value,
    pub supersteps_executed: u64,
    pub per_node_stats: HashMap<NodeId, NodeStats>,
    pub terminated_by: TerminatedBy,
    pub fatal_cause: Option<String>,
}

//! Diagnostic logging, feature-gated on `tracing` with an `eprintln!`
//! fallback when it is disabled. None of this is part of the observable
//! `ExecutionResult` or the event bus (§4.7) — it exists purely so a
//! developer running without an observer still sees what the scheduler did.

use crate::graph::NodeId;

pub fn log_workflow_start() {
    #[cfg(feature = "tracing")]
    tracing::info!("workflow started");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[INFO] workflow started");
}

pub fn log_workflow_end(superstep: u64, terminated_by: &str) {
    #[cfg(feature = "tracing")]
    tracing::info!(superstep, terminated_by, "workflow ended");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[INFO] workflow ended after {superstep} superstep(s): {terminated_by}");
}

pub fn log_superstep_start(superstep: u64, active: usize) {
    #[cfg(feature = "tracing")]
    tracing::debug!(superstep, active, "superstep starting");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[DEBUG] superstep {superstep} starting with {active} active node(s)");
}

pub fn log_node_retry(node: &NodeId, attempt: u32, cause: &str) {
    #[cfg(feature = "tracing")]
    tracing::warn!(node = node.as_str(), attempt, cause, "node attempt failed, retrying");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[WARN] node {node} attempt {attempt} failed, retrying: {cause}");
}

pub fn log_node_failure(node: &NodeId, attempts: u32, cause: &str) {
    #[cfg(feature = "tracing")]
    tracing::error!(node = node.as_str(), attempts, cause, "node failed permanently");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[ERROR] node {node} failed after {attempts} attempt(s): {cause}");
}

pub fn log_observer_panic(message: &str) {
    #[cfg(feature = "tracing")]
    tracing::warn!(message, "observer panicked");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[WARN] observer panicked: {message}");
}

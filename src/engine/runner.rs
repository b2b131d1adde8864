//! Node runner (§4.5): invokes one user function with a timeout and
//! bounded, exponentially-backed-off retries, surfacing a typed outcome.
//!
//! Backoff shape — `retry_delay * 2^i`, capped — is grounded in the same
//! calculation used by Pregel-style executors elsewhere in this codebase's
//! lineage (exponential backoff with a hard ceiling and no jitter here,
//! since §4.5 specifies the multiplier exactly rather than leaving it to
//! implementor discretion).

use std::time::{Duration, Instant};

use crate::error::{NodeErrorCause, NodeFailure};
use crate::graph::{Node, NodeContext, NodeId};
use crate::value::is_mapping;

/// The outcome of running one node once, for one superstep: either its
/// output mapping, or a terminal failure after the retry ladder ran out.
pub enum RunOutcome {
    Success { output: serde_json::Value, duration: Duration },
    Failure { failure: NodeFailure, duration: Duration },
}

/// Runs `node` against `inputs`, per the algorithm in §4.5. `on_attempt_failed`
/// is invoked after every failed attempt that will be retried, so the caller
/// can emit a soft `NodeError`-style diagnostic without the runner owning an
/// event bus reference.
pub async fn run_node(
    node: &Node,
    inputs: serde_json::Value,
    context: NodeContext,
    retry_backoff_cap: Duration,
    on_attempt_failed: impl Fn(u32, &NodeErrorCause),
) -> RunOutcome {
    let started = Instant::now();
    let max_attempts = node.config.retry_count + 1;
    let mut last_cause = NodeErrorCause::UserError("node never ran".to_string());

    for attempt in 0..max_attempts {
        let call = node.f.call(inputs.clone(), context.clone());
        let outcome = match node.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    last_cause = NodeErrorCause::Timeout(timeout);
                    report_and_maybe_retry(&node.id, attempt, max_attempts, &last_cause, &on_attempt_failed);
                    if attempt + 1 < max_attempts {
                        sleep_backoff(node.config.retry_delay, attempt, retry_backoff_cap).await;
                        continue;
                    }
                    break;
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(value) if is_mapping(&value) => {
                return RunOutcome::Success { output: value, duration: started.elapsed() };
            }
            Ok(non_mapping) => {
                // InvalidOutput is a contract violation: not retried (§4.5 step 2c).
                let failure = NodeFailure {
                    node: node.id.clone(),
                    superstep: context.superstep,
                    attempts: attempt + 1,
                    cause: NodeErrorCause::InvalidOutput(non_mapping.to_string()),
                };
                return RunOutcome::Failure { failure, duration: started.elapsed() };
            }
            Err(message) => {
                last_cause = NodeErrorCause::UserError(message);
                report_and_maybe_retry(&node.id, attempt, max_attempts, &last_cause, &on_attempt_failed);
                if attempt + 1 < max_attempts {
                    sleep_backoff(node.config.retry_delay, attempt, retry_backoff_cap).await;
                    continue;
                }
            }
        }
    }

    let failure = NodeFailure {
        node: node.id.clone(),
        superstep: context.superstep,
        attempts: max_attempts,
        cause: last_cause,
    };
    RunOutcome::Failure { failure, duration: started.elapsed() }
}

fn report_and_maybe_retry(
    node_id: &NodeId,
    attempt: u32,
    max_attempts: u32,
    cause: &NodeErrorCause,
    on_attempt_failed: &impl Fn(u32, &NodeErrorCause),
) {
    if attempt + 1 < max_attempts {
        on_attempt_failed(attempt, cause);
        crate::logging::log_node_retry(node_id, attempt, &cause.to_string());
    } else {
        crate::logging::log_node_failure(node_id, attempt + 1, &cause.to_string());
    }
}

/// `retry_delay * 2^i`, capped at `cap` (§4.5 step 3).
async fn sleep_backoff(retry_delay: Duration, attempt: u32, cap: Duration) {
    let scaled = retry_delay.saturating_mul(1u32 << attempt.min(31));
    let capped = scaled.min(cap);
    tokio::time::sleep(capped).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AsyncFnNode;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn ctx() -> NodeContext {
        NodeContext { superstep: 0, node_id: "n".to_string(), state: json!({}) }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_with_no_retries() {
        let node = Node::new("n", Arc::new(AsyncFnNode::new(|inputs, _ctx| async move { Ok(inputs) })));
        let outcome = run_node(&node, json!({"a": 1}), ctx(), Duration::from_secs(60), |_, _| {}).await;
        match outcome {
            RunOutcome::Success { output, .. } => assert_eq!(output, json!({"a": 1})),
            RunOutcome::Failure { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn retries_until_success_counts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut node = Node::new(
            "n",
            Arc::new(AsyncFnNode::new(move |_inputs, _ctx| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("boom".to_string())
                    } else {
                        Ok(json!({"ok": true}))
                    }
                }
            })),
        );
        node.config.retry_count = 2;
        node.config.retry_delay = Duration::from_millis(1);
        let outcome = run_node(&node, json!({}), ctx(), Duration::from_secs(60), |_, _| {}).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match outcome {
            RunOutcome::Success { output, .. } => assert_eq!(output, json!({"ok": true})),
            RunOutcome::Failure { .. } => panic!("expected success after retries"),
        }
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_attempt_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut node = Node::new(
            "n",
            Arc::new(AsyncFnNode::new(move |_inputs, _ctx| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<serde_json::Value, _>("always fails".to_string())
                }
            })),
        );
        node.config.retry_count = 1;
        node.config.retry_delay = Duration::from_millis(1);
        let outcome = run_node(&node, json!({}), ctx(), Duration::from_secs(60), |_, _| {}).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match outcome {
            RunOutcome::Failure { failure, .. } => assert_eq!(failure.attempts, 2),
            RunOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn non_mapping_output_is_invalid_and_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut node = Node::new(
            "n",
            Arc::new(AsyncFnNode::new(move |_inputs, _ctx| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(42))
                }
            })),
        );
        node.config.retry_count = 3;
        let outcome = run_node(&node, json!({}), ctx(), Duration::from_secs(60), |_, _| {}).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "invalid output must not be retried");
        match outcome {
            RunOutcome::Failure { failure, .. } => {
                assert!(matches!(failure.cause, NodeErrorCause::InvalidOutput(_)));
                assert_eq!(failure.attempts, 1);
            }
            RunOutcome::Success { .. } => panic!("expected InvalidOutput failure"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_before_completion() {
        let mut node = Node::new(
            "slow",
            Arc::new(AsyncFnNode::new(|_inputs, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!({}))
            })),
        );
        node.config.timeout = Some(Duration::from_secs(1));
        node.config.retry_count = 0;
        let outcome = run_node(&node, json!({}), ctx(), Duration::from_secs(60), |_, _| {}).await;
        match outcome {
            RunOutcome::Failure { failure, .. } => {
                assert!(matches!(failure.cause, NodeErrorCause::Timeout(_)));
                assert_eq!(failure.attempts, 1);
            }
            RunOutcome::Success { .. } => panic!("expected Timeout failure"),
        }
    }
}

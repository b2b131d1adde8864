//! The Pregel loop (§4.6): the scheduler that ties the graph model, state
//! store, message bus, node runner, and edge evaluator together into one
//! barrier-synchronized execution.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{EngineConfig, FailurePolicy};
use crate::error::{MergeConflict, NodeErrorCause, NodeFailure};
use crate::event::{dispatch, Event, NoopObserver, Observer};
use crate::graph::{Graph, NodeContext, NodeId};
use crate::result::{ExecutionResult, NodeStats, TerminatedBy};
use crate::value::is_mapping;

use super::message_bus::MessageBus;
use super::runner::{run_node, RunOutcome};
use super::state_store::StateStore;

/// One node's outcome for a superstep, carried back from its spawned task
/// to the dispatching loop (§4.6 step 5: "await all active node runs").
enum Dispatched {
    Success { node: NodeId, output: Value, duration: std::time::Duration },
    Failure { node: NodeId, failure: NodeFailure, duration: std::time::Duration },
}

/// Owns a validated `Graph` and an `EngineConfig`; `run` executes one
/// workflow from a seed state to completion (§6: "Engine construction").
///
/// Multiple `Engine`s may run concurrently in the same process: each owns
/// its own state store, message bus, and event bus, with no process-global
/// singletons (§9, "Global/process-wide state").
pub struct Engine {
    graph: Arc<Graph>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(graph: Graph, config: EngineConfig) -> Self {
        Self { graph: Arc::new(graph), config }
    }

    fn observer(&self) -> Arc<dyn Observer> {
        self.config.observer.clone().unwrap_or_else(|| Arc::new(NoopObserver))
    }

    /// Execute the graph from `initial_state` to quiescence, the iteration
    /// cap, or a fatal error (§4.6). Never panics on user-code misbehavior:
    /// node panics surface as spawn-join errors, treated as `UserError`.
    pub async fn run(&self, initial_state: Value) -> ExecutionResult {
        let observer = self.observer();
        let state_store = StateStore::new(initial_state.clone());
        for (key, strategy) in &self.config.per_key_strategies {
            state_store.register_key_strategy(key.clone(), *strategy);
        }

        let seed_message = if is_mapping(&initial_state) { initial_state } else { Value::Object(Map::new()) };
        let mut bus = MessageBus::seed(self.graph.start.clone(), seed_message);

        let mut stats: HashMap<NodeId, NodeStats> = HashMap::new();
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size.max(1)));

        dispatch(observer.as_ref(), Event::WorkflowStart);
        crate::logging::log_workflow_start();

        let mut superstep: u64 = 0;
        let terminated_by;
        let mut fatal_cause: Option<String> = None;

        loop {
            let active = bus.active_nodes();

            if active.is_empty() {
                // Quiescence is only observable by running one more barrier
                // than the last node actually executed in (§4.6 step 1: the
                // active set is computed, found empty, *then* the run
                // terminates) — so the iteration that detects it counts
                // towards `supersteps_executed` (§8 scenario 1: three node
                // supersteps plus the quiescence-detecting one = 4). This is
                // distinct from a cancellation observed before any work ever
                // ran, which must not be counted (see the cancellation
                // branch below).
                superstep += 1;
                terminated_by = TerminatedBy::Quiescence;
                break;
            }

            if superstep >= self.config.max_iterations {
                terminated_by = TerminatedBy::IterationCap;
                break;
            }

            if self.config.cancellation_signal.is_cancelled() {
                terminated_by = TerminatedBy::FatalError;
                fatal_cause = Some("cancelled".to_string());
                break;
            }

            crate::logging::log_superstep_start(superstep, active.len());
            dispatch(observer.as_ref(), Event::SuperstepStart { superstep, active: active.clone() });

            let mut join_set: JoinSet<Dispatched> = JoinSet::new();
            for node_id in &active {
                if self.config.cancellation_signal.is_cancelled() {
                    break;
                }
                let node = self
                    .graph
                    .node(node_id)
                    .expect("active node id comes from the graph")
                    .clone();
                let inputs = bus.fold(node_id);
                let context = NodeContext {
                    superstep,
                    node_id: node_id.clone(),
                    state: state_store.snapshot(),
                };
                let retry_cap = self.config.retry_backoff_cap;
                let observer = Arc::clone(&observer);
                let permit = Arc::clone(&semaphore);
                let node_id_owned = node_id.clone();

                join_set.spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                    dispatch(observer.as_ref(), Event::NodeStart { superstep, node: node_id_owned.clone() });
                    let outcome = run_node(&node, inputs, context, retry_cap, |attempt, cause| {
                        dispatch(
                            observer.as_ref(),
                            Event::NodeError {
                                superstep,
                                node: node_id_owned.clone(),
                                attempt,
                                cause: cause.to_string(),
                                duration: std::time::Duration::ZERO,
                            },
                        );
                    })
                    .await;
                    match outcome {
                        RunOutcome::Success { output, duration } => {
                            dispatch(
                                observer.as_ref(),
                                Event::NodeEnd { superstep, node: node_id_owned.clone(), duration },
                            );
                            Dispatched::Success { node: node_id_owned, output, duration }
                        }
                        RunOutcome::Failure { failure, duration } => {
                            dispatch(
                                observer.as_ref(),
                                Event::NodeError {
                                    superstep,
                                    node: node_id_owned.clone(),
                                    attempt: failure.attempts,
                                    cause: failure.cause.to_string(),
                                    duration,
                                },
                            );
                            Dispatched::Failure { node: node_id_owned, failure, duration }
                        }
                    }
                });
            }

            let mut outcomes = Vec::with_capacity(active.len());
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(dispatched) => outcomes.push(dispatched),
                    Err(join_err) => {
                        // A node task panicked; surface it the same as a
                        // `UserError` that exhausted its retries (§4.5 step 2e).
                        outcomes.push(Dispatched::Failure {
                            node: "<unknown>".to_string(),
                            failure: NodeFailure {
                                node: "<unknown>".to_string(),
                                superstep,
                                attempts: 1,
                                cause: NodeErrorCause::UserError(format!("node task panicked: {join_err}")),
                            },
                            duration: std::time::Duration::ZERO,
                        });
                    }
                }
            }

            let mut fatal: Option<String> = None;
            for outcome in outcomes {
                match outcome {
                    Dispatched::Success { node, output, duration } => {
                        let entry = stats.entry(node.clone()).or_default();
                        entry.runs += 1;
                        entry.total_duration += duration;

                        if let Some(cause) =
                            self.commit_and_route(&node, output, &state_store, &mut bus, observer.as_ref(), superstep)
                        {
                            fatal = Some(cause);
                            break;
                        }
                    }
                    Dispatched::Failure { node, failure, duration } => {
                        let entry = stats.entry(node.clone()).or_default();
                        entry.runs += 1;
                        entry.failures += 1;
                        entry.total_duration += duration;

                        if let Some(cause) = self.handle_failure(&node, failure, &state_store, &mut bus, observer.as_ref(), superstep) {
                            fatal = Some(cause);
                            break;
                        }
                    }
                }
            }

            dispatch(observer.as_ref(), Event::SuperstepEnd { superstep });

            if let Some(cause) = fatal {
                terminated_by = TerminatedBy::FatalError;
                fatal_cause = Some(cause);
                break;
            }

            bus.swap();
            superstep += 1;
        }

        crate::logging::log_workflow_end(superstep, terminated_by_label(terminated_by));
        dispatch(observer.as_ref(), Event::WorkflowEnd);

        ExecutionResult {
            final_state: state_store.snapshot(),
            supersteps_executed: superstep,
            per_node_stats: stats,
            terminated_by,
            fatal_cause,
        }
    }

    /// Write a successful node's output through the state store, then
    /// evaluate its outgoing edges to enqueue next-superstep messages
    /// (§4.6 step 6). Returns `Some(fatal_cause)` if a merge conflict was
    /// escalated to a fatal error by the failure policy ladder (§7.4).
    fn commit_and_route(
        &self,
        node: &NodeId,
        output: Value,
        state_store: &StateStore,
        bus: &mut MessageBus,
        observer: &dyn Observer,
        superstep: u64,
    ) -> Option<String> {
        let strategy = self
            .graph
            .node(node)
            .and_then(|n| n.config.merge_strategy)
            .unwrap_or(self.config.default_merge_strategy);

        if let Value::Object(updates) = output.clone() {
            if let Err(MergeConflict { key }) = state_store.apply(updates, strategy) {
                // Contract violation, not retried (§7.4): runs the same
                // policy ladder as a terminal node failure, but there is no
                // attempt count to report, so we synthesize one attempt.
                let failure = NodeFailure {
                    node: node.clone(),
                    superstep,
                    attempts: 1,
                    cause: NodeErrorCause::InvalidOutput(format!("merge conflict on key {key:?}")),
                };
                return self.handle_failure(node, failure, state_store, bus, observer, superstep);
            }
        }

        let state_snapshot = state_store.snapshot();
        for edge in self.graph.outgoing(node) {
            match crate::graph::predicate::evaluate(edge.condition.as_ref(), &output, &state_snapshot) {
                Ok(true) => bus.enqueue_next(edge.target.clone(), output.clone()),
                Ok(false) => {}
                Err(cause) => {
                    dispatch(
                        observer,
                        Event::EdgeEvaluationError {
                            superstep,
                            source: edge.source.clone(),
                            target: edge.target.clone(),
                            cause,
                        },
                    );
                }
            }
        }
        None
    }

    /// Apply the failure policy ladder (§7.3, §7.4) to a terminal node
    /// failure. Returns `Some(fatal_cause)` if the run must terminate.
    fn handle_failure(
        &self,
        node: &NodeId,
        failure: NodeFailure,
        state_store: &StateStore,
        bus: &mut MessageBus,
        observer: &dyn Observer,
        superstep: u64,
    ) -> Option<String> {
        let policy = self
            .graph
            .node(node)
            .and_then(|n| n.config.failure_policy.clone())
            .unwrap_or_else(|| self.config.failure_policy.clone());

        match policy {
            FailurePolicy::Propagate => Some(failure.to_string()),
            FailurePolicy::Isolate => {
                // No state write, no downstream messages (§7.3).
                None
            }
            FailurePolicy::Substitute(fallback) => {
                self.commit_and_route(node, fallback, state_store, bus, observer, superstep)
            }
        }
    }
}

fn terminated_by_label(terminated_by: TerminatedBy) -> &'static str {
    match terminated_by {
        TerminatedBy::Quiescence => "quiescence",
        TerminatedBy::IterationCap => "iteration_cap",
        TerminatedBy::FatalError => "fatal_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::{AsyncFnNode, BoxedNodeFn, Edge, Graph, Node, NodeConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn node_fn(f: impl Fn(Value) -> Value + Send + Sync + 'static) -> BoxedNodeFn {
        Arc::new(AsyncFnNode::new(move |inputs: Value, _ctx: NodeContext| {
            let out = f(inputs);
            async move { Ok(out) }
        }))
    }

    fn num(v: &Value, key: &str) -> i64 {
        v.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    #[tokio::test]
    async fn linear_chain_runs_four_supersteps() {
        let graph = Graph::builder("linear", "a")
            .add_node(Node::new("a", node_fn(|inputs| json!({"v": num(&inputs, "v") + 1}))))
            .add_node(Node::new("b", node_fn(|inputs| json!({"v": num(&inputs, "v") * 2}))))
            .add_node(Node::new("c", node_fn(|inputs| json!({"out": num(&inputs, "v")}))))
            .add_edge(Edge::unconditional("a", "b"))
            .add_edge(Edge::unconditional("b", "c"))
            .build()
            .unwrap();

        let engine = Engine::new(graph, EngineConfig::default());
        let result = engine.run(json!({"v": 1})).await;

        assert_eq!(result.final_state.get("v"), Some(&json!(4)));
        assert_eq!(result.final_state.get("out"), Some(&json!(4)));
        assert_eq!(result.supersteps_executed, 4);
        assert_eq!(result.terminated_by, TerminatedBy::Quiescence);
    }

    #[tokio::test]
    async fn fan_out_fan_in_aggregates_once() {
        let graph = Graph::builder("fanout", "start")
            .add_node(Node::new("start", node_fn(|_inputs| json!({"d": 10}))))
            .add_node(Node::new("dbl", node_fn(|inputs| json!({"a": num(&inputs, "d") * 2}))))
            .add_node(Node::new("tpl", node_fn(|inputs| json!({"b": num(&inputs, "d") * 3}))))
            .add_node(Node::new("agg", node_fn(|inputs| json!({"sum": num(&inputs, "a") + num(&inputs, "b")}))))
            .add_edge(Edge::unconditional("start", "dbl"))
            .add_edge(Edge::unconditional("start", "tpl"))
            .add_edge(Edge::unconditional("dbl", "agg"))
            .add_edge(Edge::unconditional("tpl", "agg"))
            .build()
            .unwrap();

        let engine = Engine::new(graph, EngineConfig::default());
        let result = engine.run(json!({})).await;

        assert_eq!(result.final_state.get("sum"), Some(&json!(50)));
        assert_eq!(result.per_node_stats.get("agg").map(|s| s.runs), Some(1));
    }

    #[tokio::test]
    async fn retry_succeeds_on_final_attempt_and_feeds_downstream() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let flaky = Arc::new(AsyncFnNode::new(move |_inputs: Value, _ctx: NodeContext| {
            let calls = Arc::clone(&calls_clone);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err("boom".to_string())
                } else {
                    Ok(json!({"ok": true}))
                }
            }
        }));
        let mut config = NodeConfig::default();
        config.retry_count = 1;
        config.retry_delay = std::time::Duration::from_millis(1);

        let graph = Graph::builder("retry", "flaky")
            .add_node(Node::new("flaky", flaky).with_config(config))
            .add_node(Node::new("down", node_fn(|inputs| inputs)))
            .add_edge(Edge::unconditional("flaky", "down"))
            .build()
            .unwrap();

        let engine = Engine::new(graph, EngineConfig::default());
        let result = engine.run(json!({})).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.terminated_by, TerminatedBy::Quiescence);
        assert_eq!(result.final_state.get("ok"), Some(&json!(true)));
    }

    /// §8 scenario 4, second half: a node that always raises, with
    /// `retry_count=1` and the default `ISOLATE` policy, is invoked exactly
    /// twice and leaves downstream's inbox empty — it never runs.
    #[tokio::test]
    async fn retry_exhaustion_under_isolate_suppresses_downstream() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let always_fails = Arc::new(AsyncFnNode::new(move |_inputs: Value, _ctx: NodeContext| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Value, _>("boom".to_string())
            }
        }));
        let mut config = NodeConfig::default();
        config.retry_count = 1;
        config.retry_delay = std::time::Duration::from_millis(1);

        let graph = Graph::builder("retry-exhausted", "flaky")
            .add_node(Node::new("flaky", always_fails).with_config(config))
            .add_node(Node::new("down", node_fn(|inputs| inputs)))
            .add_edge(Edge::unconditional("flaky", "down"))
            .build()
            .unwrap();

        let engine = Engine::new(graph, EngineConfig::default());
        let result = engine.run(json!({})).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.terminated_by, TerminatedBy::Quiescence);
        assert!(!result.per_node_stats.contains_key("down"));
        assert_eq!(result.final_state.get("ok"), None);
    }

    #[tokio::test]
    async fn iteration_cap_stops_a_self_loop() {
        let graph = Graph::builder("loop", "spin")
            .add_node(Node::new("spin", node_fn(|inputs| json!({"n": num(&inputs, "n") + 1}))))
            .add_edge(Edge::unconditional("spin", "spin"))
            .build()
            .unwrap();

        let config = EngineConfig::builder().max_iterations(10).build();
        let engine = Engine::new(graph, config);
        let result = engine.run(json!({"n": 0})).await;

        assert_eq!(result.terminated_by, TerminatedBy::IterationCap);
        assert_eq!(result.per_node_stats.get("spin").map(|s| s.runs), Some(10));
    }

    #[tokio::test]
    async fn propagate_policy_terminates_with_fatal_error() {
        let always_fails = Arc::new(AsyncFnNode::new(|_inputs: Value, _ctx: NodeContext| async move {
            Err::<Value, _>("always fails".to_string())
        }));
        let graph = Graph::builder("fatal", "bad").add_node(Node::new("bad", always_fails)).build().unwrap();

        let config = EngineConfig::builder().failure_policy(FailurePolicy::Propagate).build();
        let engine = Engine::new(graph, config);
        let result = engine.run(json!({})).await;

        assert_eq!(result.terminated_by, TerminatedBy::FatalError);
        assert!(result.fatal_cause.is_some());
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_superstep() {
        use crate::config::CancellationToken;

        let graph = Graph::builder("loop", "spin")
            .add_node(Node::new("spin", node_fn(|inputs| json!({"n": num(&inputs, "n") + 1}))))
            .add_edge(Edge::unconditional("spin", "spin"))
            .build()
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let config = EngineConfig::builder().cancellation_signal(token).build();
        let engine = Engine::new(graph, config);
        let result = engine.run(json!({"n": 0})).await;

        assert_eq!(result.terminated_by, TerminatedBy::FatalError);
        assert_eq!(result.fatal_cause.as_deref(), Some("cancelled"));
        assert_eq!(result.supersteps_executed, 0);
    }
}

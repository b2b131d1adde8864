//! Engine-wide configuration (§6). This is in-process configuration handed
//! to `Engine::builder`, not a config-file loader — file/CLI configuration
//! is an external-collaborator concern per the scope notes in §1.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::event::Observer;
use crate::value::MergeStrategy;

/// The policy ladder applied to a terminal node failure or contract
/// violation (§7.3, §7.4).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FailurePolicy {
    /// Convert to a fatal error and terminate the run.
    Propagate,
    /// Record the failure in the result and continue; the node's output is
    /// treated as empty and no downstream messages are emitted. Default.
    #[default]
    Isolate,
    /// Replace the failed node's output with a caller-supplied fallback
    /// mapping; the run continues as if the node had produced `fallback`.
    Substitute(serde_json::Value),
}

/// Cooperative cancellation handle (§4.6, §5). Cloning shares the same
/// underlying flag; `cancel()` is idempotent.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tunables recognized by the engine (§6's options table).
pub struct EngineConfig {
    pub max_iterations: u64,
    pub worker_pool_size: usize,
    pub default_merge_strategy: MergeStrategy,
    pub per_key_strategies: HashMap<String, MergeStrategy>,
    pub retry_backoff_cap: Duration,
    pub observer: Option<Arc<dyn Observer>>,
    pub cancellation_signal: CancellationToken,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            worker_pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            default_merge_strategy: MergeStrategy::Merge,
            per_key_strategies: HashMap::new(),
            retry_backoff_cap: Duration::from_secs(60),
            observer: None,
            cancellation_signal: CancellationToken::new(),
            failure_policy: FailurePolicy::Isolate,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn strategy_for(&self, key: &str) -> MergeStrategy {
        self.per_key_strategies
            .get(key)
            .copied()
            .unwrap_or(self.default_merge_strategy)
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfigOverrides,
}

#[derive(Default)]
struct EngineConfigOverrides {
    max_iterations: Option<u64>,
    worker_pool_size: Option<usize>,
    default_merge_strategy: Option<MergeStrategy>,
    per_key_strategies: HashMap<String, MergeStrategy>,
    retry_backoff_cap: Option<Duration>,
    observer: Option<Arc<dyn Observer>>,
    cancellation_signal: Option<CancellationToken>,
    failure_policy: Option<FailurePolicy>,
}

impl EngineConfigBuilder {
    pub fn max_iterations(mut self, n: u64) -> Self {
        self.inner.max_iterations = Some(n);
        self
    }

    pub fn worker_pool_size(mut self, n: usize) -> Self {
        self.inner.worker_pool_size = Some(n);
        self
    }

    pub fn default_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.inner.default_merge_strategy = Some(strategy);
        self
    }

    pub fn per_key_strategy(mut self, key: impl Into<String>, strategy: MergeStrategy) -> Self {
        self.inner.per_key_strategies.insert(key.into(), strategy);
        self
    }

    pub fn retry_backoff_cap(mut self, cap: Duration) -> Self {
        self.inner.retry_backoff_cap = Some(cap);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.inner.observer = Some(observer);
        self
    }

    pub fn cancellation_signal(mut self, token: CancellationToken) -> Self {
        self.inner.cancellation_signal = Some(token);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.inner.failure_policy = Some(policy);
        self
    }

    pub fn build(self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            max_iterations: self.inner.max_iterations.unwrap_or(defaults.max_iterations),
            worker_pool_size: self.inner.worker_pool_size.unwrap_or(defaults.worker_pool_size),
            default_merge_strategy: self
                .inner
                .default_merge_strategy
                .unwrap_or(defaults.default_merge_strategy),
            per_key_strategies: self.inner.per_key_strategies,
            retry_backoff_cap: self.inner.retry_backoff_cap.unwrap_or(defaults.retry_backoff_cap),
            observer: self.inner.observer,
            cancellation_signal: self.inner.cancellation_signal.unwrap_or(defaults.cancellation_signal),
            failure_policy: self.inner.failure_policy.unwrap_or(defaults.failure_policy),
        }
    }
}

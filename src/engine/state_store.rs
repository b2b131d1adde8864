//! State store (§4.2): a thread-safe key/value map with per-key merge
//! strategies. All operations are internally serialized via a single mutex —
//! critical sections are short (no awaiting inside the lock), so a
//! `std::sync::Mutex` is adequate and avoids handing out a lock guard across
//! an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::MergeConflict;
use crate::value::{merge_values, MergeStrategy};

pub struct StateStore {
    inner: Mutex<HashMap<String, Value>>,
    key_strategies: Mutex<HashMap<String, MergeStrategy>>,
}

impl StateStore {
    /// Seed the store from the caller's initial state (§3: "seeded from the
    /// caller's initial state").
    pub fn new(initial_state: Value) -> Self {
        let map = match initial_state {
            Value::Object(map) => map.into_iter().collect(),
            other if other.is_null() => HashMap::new(),
            other => {
                let mut m = HashMap::new();
                m.insert("value".to_string(), other);
                m
            }
        };
        Self {
            inner: Mutex::new(map),
            key_strategies: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().expect("state store mutex poisoned").get(key).cloned()
    }

    /// `OVERWRITE`, unconditionally.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner
            .lock()
            .expect("state store mutex poisoned")
            .insert(key.into(), value);
    }

    pub fn register_key_strategy(&self, key: impl Into<String>, strategy: MergeStrategy) {
        self.key_strategies
            .lock()
            .expect("state store mutex poisoned")
            .insert(key.into(), strategy);
    }

    fn strategy_for(&self, key: &str, default: MergeStrategy) -> MergeStrategy {
        self.key_strategies
            .lock()
            .expect("state store mutex poisoned")
            .get(key)
            .copied()
            .unwrap_or(default)
    }

    /// Apply every key in `updates` under `strategy` (or its per-key
    /// override, §4.2/§4.3). Fails with `MergeConflict` only when the
    /// effective strategy is `REJECT` and the key already exists; in that
    /// case, keys already applied earlier in the same call remain applied
    /// (matching the per-key, not per-call, nature of `REJECT`).
    pub fn apply(&self, updates: Map<String, Value>, strategy: MergeStrategy) -> Result<(), MergeConflict> {
        let mut guard = self.inner.lock().expect("state store mutex poisoned");
        for (key, incoming) in updates {
            let effective = self.strategy_for(&key, strategy);
            let existing = guard.get(&key).cloned();
            if effective == MergeStrategy::Reject && existing.is_some() {
                return Err(MergeConflict { key });
            }
            let merged = merge_values(existing, incoming, effective);
            guard.insert(key, merged);
        }
        Ok(())
    }

    /// An immutable snapshot: subsequent writes are not observed through it
    /// (§3, §4.2) because it is a deep clone of the backing map at the
    /// instant of the call.
    pub fn snapshot(&self) -> Value {
        let guard = self.inner.lock().expect("state store mutex poisoned");
        Value::Object(guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

//! Conditional-edge predicates (§4.4, §6).
//!
//! A predicate is a pure function over a source node's output and the
//! current state snapshot. Absent ⇒ the edge always fires. A predicate that
//! panics is caught at the evaluation boundary and treated as "does not
//! fire" plus a soft `EdgeEvaluationError` event — never a node failure.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

/// `(outputs, state) -> bool`. The engine never enforces purity; it only
/// documents the expectation (§4.4).
pub type Predicate = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Evaluate `condition` (or "fires" if absent) against `output`/`state`,
/// catching panics per §4.4. Returns `Ok(fires)` or `Err(message)` for the
/// soft-warning path.
pub fn evaluate(condition: Option<&Predicate>, output: &Value, state: &Value) -> Result<bool, String> {
    match condition {
        None => Ok(true),
        Some(predicate) => {
            let predicate = predicate.clone();
            let output = output.clone();
            let state = state.clone();
            catch_unwind(AssertUnwindSafe(move || predicate(&output, &state))).map_err(|payload| {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "edge predicate panicked".to_string());
                msg
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_condition_always_fires() {
        assert_eq!(evaluate(None, &json!({}), &json!({})), Ok(true));
    }

    #[test]
    fn condition_reads_output() {
        let cond: Predicate = Arc::new(|out: &Value, _state: &Value| {
            out.get("cont").and_then(Value::as_bool).unwrap_or(false)
        });
        assert_eq!(evaluate(Some(&cond), &json!({"cont": true}), &json!({})), Ok(true));
        assert_eq!(evaluate(Some(&cond), &json!({"cont": false}), &json!({})), Ok(false));
    }

    #[test]
    fn panicking_condition_is_soft_failed() {
        let cond: Predicate = Arc::new(|_out: &Value, _state: &Value| panic!("boom"));
        let result = evaluate(Some(&cond), &json!({}), &json!({}));
        assert!(result.is_err());
    }
}

//! `Count`: lets a wrapped recognition match at most `target` times per task.
//!
//! Param format:
//! ```json
//! { "target": 3, "recognition": { "type": "TemplateMatch", "param": { ... } } }
//! ```
//! `target` defaults to unbounded, `recognition` to `DirectHit`.
//!
//! Counters are keyed by node name and shared by every gate built on the
//! same `CountStore`. When a gate sees a task id different from the one it
//! saw last, it clears every counter in the store. Two tasks running at the
//! same time with the same node names would therefore reset each other;
//! the host runs one task at a time, so this is accepted.

use anyhow::{anyhow, Context as _, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::host::{parse_param, AnalyzeArg, AnalyzeResult, Context, CustomRecognition, TaskId};

/// Source of per-instance pipeline entry names.
static NEXT_GATE_ID: AtomicU64 = AtomicU64::new(1);

/// Counter for one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountRecord {
    pub count: u64,
}

/// Gate state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountState {
    /// No counter yet (behaves like `Counting` at 0)
    Unseen,
    /// Still below target, the wrapped recognition is consulted
    Counting,
    /// Target reached, always no-match
    Exhausted,
}

impl CountState {
    pub fn of(record: Option<CountRecord>, target: u64) -> Self {
        match record {
            None => CountState::Unseen,
            Some(r) if r.count < target => CountState::Counting,
            Some(_) => CountState::Exhausted,
        }
    }
}

impl std::fmt::Display for CountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountState::Unseen => write!(f, "Unseen"),
            CountState::Counting => write!(f, "Counting"),
            CountState::Exhausted => write!(f, "Exhausted"),
        }
    }
}

/// Match counters shared by all `Count` gates and the `ResetCount` action.
/// In memory only.
#[derive(Debug, Default)]
pub struct CountStore {
    records: Mutex<HashMap<String, CountRecord>>,
}

impl CountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, CountRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the counter of `name`, creating it at 0.
    pub fn get_or_init(&self, name: &str) -> CountRecord {
        *self
            .records()
            .entry(name.to_string())
            .or_insert(CountRecord { count: 0 })
    }

    /// Adds one match to `name` and returns the new count.
    pub fn increment(&self, name: &str) -> u64 {
        let mut records = self.records();
        let record = records.entry(name.to_string()).or_insert(CountRecord { count: 0 });
        record.count = record.count.saturating_add(1);
        record.count
    }

    /// Clears one counter. Returns false if there was none.
    pub fn reset(&self, name: &str) -> bool {
        let removed = self.records().remove(name).is_some();
        if removed {
            crate::debug(&format!("Reset Count counter: {}", name));
        } else {
            crate::log(&format!("Warning: no Count counter to reset: {}", name));
        }
        removed
    }

    /// Clears every counter.
    pub fn reset_all(&self) {
        self.records().clear();
        crate::debug("Reset all Count counters");
    }
}

fn direct_hit() -> Value {
    json!({ "type": "DirectHit" })
}

#[derive(Debug, Deserialize)]
struct CountParams {
    #[serde(default)]
    target: Option<Value>,
    #[serde(default = "direct_hit")]
    recognition: Value,
}

/// The match-count gate.
pub struct CountGate {
    store: Arc<CountStore>,
    /// Pipeline entry the wrapped recognition is installed under
    identifier: String,
    last_task: Mutex<Option<TaskId>>,
}

impl CountGate {
    pub fn new(store: Arc<CountStore>) -> Self {
        let identifier = format!("count_{:016}", NEXT_GATE_ID.fetch_add(1, Ordering::Relaxed));
        crate::debug(&format!("Count gate created: {}", identifier));
        Self {
            store,
            identifier,
            last_task: Mutex::new(None),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Clears the whole store when the task id changed since this gate's
    /// previous invocation.
    fn observe_task(&self, task_id: TaskId) {
        let mut last = self.last_task.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != Some(task_id) {
            crate::debug(&format!(
                "Task changed {:?} -> {}, resetting counters",
                *last, task_id
            ));
            self.store.reset_all();
            *last = Some(task_id);
        }
    }

    fn try_analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Result<Option<AnalyzeResult>> {
        let params: CountParams =
            serde_json::from_value(parse_param(&arg.custom_recognition_param)?)
                .context("Invalid Count param")?;
        let target = match &params.target {
            None => u64::MAX,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| anyhow!("Invalid target value: {}", value))?,
        };

        self.observe_task(arg.task_id);

        let node = &arg.node_name;
        let record = self.store.get_or_init(node);
        let state = CountState::of(Some(record), target);
        if state == CountState::Exhausted {
            crate::debug(&format!("Count {}: {} ({}/{})", node, state, record.count, target));
            return Ok(None);
        }

        let mut wrapped = serde_json::Map::new();
        wrapped.insert(
            self.identifier.clone(),
            json!({ "recognition": params.recognition }),
        );
        ctx.override_pipeline(&Value::Object(wrapped))
            .context("Failed to install wrapped recognition")?;
        let detail = ctx
            .run_recognition(&self.identifier, &arg.image, None)
            .context("Wrapped recognition failed")?;

        match detail.and_then(|d| d.box_) {
            Some(rect) => {
                let count = self.store.increment(node);
                crate::debug(&format!("Count matched: {}, count now {}", node, count));
                Ok(Some(AnalyzeResult::new(rect, format!("Count({})", node))))
            }
            None => Ok(None),
        }
    }
}

impl CustomRecognition for CountGate {
    fn analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Option<AnalyzeResult> {
        match self.try_analyze(ctx, arg) {
            Ok(result) => result,
            Err(e) => {
                crate::log(&format!("Error: Count failed: {:#}", e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Rect;
    use crate::testing::{analyze_arg_for, MockHost};

    const HIT: Rect = Rect::new(5, 5, 10, 10);

    fn gate() -> (CountGate, Arc<CountStore>) {
        let store = Arc::new(CountStore::new());
        (CountGate::new(store.clone()), store)
    }

    fn matching_host() -> MockHost {
        MockHost::new().with_hits(&[("count_*", HIT)])
    }

    #[test]
    fn test_target_limits_matches_per_task() {
        let (gate, store) = gate();
        let host = matching_host();
        let arg = analyze_arg_for(1, "Battle", r#"{"target": 2}"#);

        let first = gate.analyze(&host, &arg).unwrap();
        assert_eq!(first.box_, HIT);
        assert_eq!(first.detail, "Count(Battle)");
        assert_eq!(store.get_or_init("Battle").count, 1);

        assert!(gate.analyze(&host, &arg).is_some());
        assert_eq!(store.get_or_init("Battle").count, 2);

        // Exhausted: no match although the wrapped recognition would hit
        assert!(gate.analyze(&host, &arg).is_none());
        assert_eq!(store.get_or_init("Battle").count, 2);

        // A new task starts over
        let next_task = analyze_arg_for(2, "Battle", r#"{"target": 2}"#);
        assert!(gate.analyze(&host, &next_task).is_some());
        assert_eq!(store.get_or_init("Battle").count, 1);
    }

    #[test]
    fn test_miss_does_not_count() {
        let (gate, store) = gate();
        let arg = analyze_arg_for(1, "Battle", r#"{"target": 1}"#);

        assert!(gate.analyze(&MockHost::new(), &arg).is_none());
        assert_eq!(store.get_or_init("Battle").count, 0);
        assert!(gate.analyze(&matching_host(), &arg).is_some());
    }

    #[test]
    fn test_target_zero_never_matches() {
        let (gate, _) = gate();
        let host = matching_host();
        assert!(gate.analyze(&host, &analyze_arg_for(1, "N", r#"{"target": 0}"#)).is_none());
        assert!(host.recognitions_run().is_empty());
    }

    #[test]
    fn test_empty_params_are_unbounded() {
        let (gate, _) = gate();
        let host = matching_host();
        for param in ["", "{}"] {
            for _ in 0..5 {
                assert!(gate.analyze(&host, &analyze_arg_for(1, "N", param)).is_some());
            }
        }
    }

    #[test]
    fn test_invalid_target_is_no_match() {
        let (gate, store) = gate();
        let host = matching_host();
        for param in [r#"{"target": -1}"#, r#"{"target": "3"}"#, r#"{"target": 1.5}"#] {
            assert!(gate.analyze(&host, &analyze_arg_for(1, "N", param)).is_none(), "{}", param);
        }
        assert!(host.recognitions_run().is_empty());
        assert!(host.overrides().is_empty());
        assert_eq!(store.get_or_init("N").count, 0);
    }

    #[test]
    fn test_wrapped_recognition_is_installed_under_identifier() {
        let (gate, _) = gate();
        let host = matching_host();
        let param = r#"{"recognition": {"type": "OCR", "param": {"expected": "OK"}}}"#;

        gate.analyze(&host, &analyze_arg_for(1, "N", param));

        let overrides = host.overrides();
        assert_eq!(overrides.len(), 1);
        assert_eq!(
            overrides[0][gate.identifier()]["recognition"]["type"],
            Value::from("OCR")
        );
        assert_eq!(host.recognitions_run(), vec![gate.identifier().to_string()]);
    }

    #[test]
    fn test_default_recognition_is_direct_hit() {
        let (gate, _) = gate();
        let host = matching_host();
        gate.analyze(&host, &analyze_arg_for(1, "N", "{}"));
        assert_eq!(
            host.overrides()[0][gate.identifier()]["recognition"],
            json!({"type": "DirectHit"})
        );
    }

    #[test]
    fn test_gates_share_store() {
        let store = Arc::new(CountStore::new());
        let a = CountGate::new(store.clone());
        let b = CountGate::new(store.clone());
        assert_ne!(a.identifier(), b.identifier());

        let host = matching_host();
        a.analyze(&host, &analyze_arg_for(7, "First", r#"{"target": 5}"#));
        a.analyze(&host, &analyze_arg_for(7, "First", r#"{"target": 5}"#));
        assert_eq!(store.get_or_init("First").count, 2);

        // b has not seen task 7 yet, so its first call clears the store
        b.analyze(&host, &analyze_arg_for(7, "Second", r#"{"target": 5}"#));
        assert_eq!(store.get_or_init("First").count, 0);
        assert_eq!(store.get_or_init("Second").count, 1);

        // Same task again: no further reset
        b.analyze(&host, &analyze_arg_for(7, "Second", r#"{"target": 5}"#));
        assert_eq!(store.get_or_init("Second").count, 2);
    }

    #[test]
    fn test_store_reset_by_name_and_all() {
        let store = CountStore::new();
        store.increment("A");
        store.increment("B");

        assert!(store.reset("A"));
        assert!(!store.reset("A"));
        assert_eq!(store.get_or_init("A").count, 0);
        assert_eq!(store.get_or_init("B").count, 1);

        store.reset_all();
        assert_eq!(store.get_or_init("B").count, 0);
    }

    #[test]
    fn test_count_state() {
        let record = CountRecord { count: 2 };
        assert_eq!(CountState::of(None, 2), CountState::Unseen);
        assert_eq!(CountState::of(Some(CountRecord { count: 1 }), 2), CountState::Counting);
        assert_eq!(CountState::of(Some(record), 2), CountState::Exhausted);
        assert_eq!(CountState::Exhausted.to_string(), "Exhausted");
    }
}

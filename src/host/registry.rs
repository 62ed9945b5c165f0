//! Callback traits and the name-keyed registry the host dispatches through.

use anyhow::{Context as _, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::context::Context;
use super::types::{AnalyzeArg, AnalyzeResult, RunArg, RunResult};

/// A recognition the host can invoke by name from a pipeline node.
///
/// Returns `None` for "no match". Implementations never surface errors to
/// the host.
pub trait CustomRecognition: Send + Sync {
    fn analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Option<AnalyzeResult>;
}

/// An action the host can invoke by name from a pipeline node.
pub trait CustomAction: Send + Sync {
    fn run(&self, ctx: &dyn Context, arg: &RunArg) -> RunResult;
}

/// Registered callbacks, keyed by the name pipelines refer to them by.
#[derive(Default)]
pub struct Registry {
    recognitions: HashMap<String, Arc<dyn CustomRecognition>>,
    actions: HashMap<String, Arc<dyn CustomAction>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_recognition(&mut self, name: &str, recognition: Arc<dyn CustomRecognition>) {
        self.recognitions.insert(name.to_string(), recognition);
    }

    pub fn register_action(&mut self, name: &str, action: Arc<dyn CustomAction>) {
        self.actions.insert(name.to_string(), action);
    }

    pub fn recognition_names(&self) -> Vec<&str> {
        self.recognitions.keys().map(String::as_str).collect()
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    /// Dispatches a recognition call. Unknown names are a no-match.
    pub fn analyze(
        &self,
        name: &str,
        ctx: &dyn Context,
        arg: &AnalyzeArg,
    ) -> Option<AnalyzeResult> {
        match self.recognitions.get(name) {
            Some(recognition) => recognition.analyze(ctx, arg),
            None => {
                crate::log(&format!("Error: unknown custom recognition: {}", name));
                None
            }
        }
    }

    /// Dispatches an action call. Unknown names fail.
    pub fn run(&self, name: &str, ctx: &dyn Context, arg: &RunArg) -> RunResult {
        match self.actions.get(name) {
            Some(action) => action.run(ctx, arg),
            None => {
                crate::log(&format!("Error: unknown custom action: {}", name));
                RunResult::FAILURE
            }
        }
    }
}

/// Parses a callback's serialized parameter object.
///
/// A blank string is read as an empty object.
pub fn parse_param(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).with_context(|| format!("Invalid callback param: {}", raw))
}

/// True for `{}`, `null` and `[]`: a param that carries nothing.
pub fn is_empty_param(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

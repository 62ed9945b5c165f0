//! `MultiRecognition`: several named recognitions combined into one.
//!
//! Param format:
//! ```json
//! {
//!     "nodes": ["NodeA", "NodeB"],
//!     "logic": { "type": "AND" | "OR" | "CUSTOM", "expression": "$0 AND NOT {Popup}" },
//!     "return": "UNION($0, $1)"   // or a fixed [x, y, w, h]
//! }
//! ```
//! `nodes` run in order and are referenced as `$0`, `$1`, ...; `{Name}`
//! refers to a node that ran earlier in the same task. `AND` and `OR` only
//! look at the listed nodes.

use anyhow::{Context as _, Result};
use serde::Deserialize;

use super::expr::{parse_logic, parse_roi, Bindings};
use super::history::{ExternalCache, NodeHistory, TaskHistory};
use super::roi;
use crate::host::{parse_param, AnalyzeArg, AnalyzeResult, Context, CustomRecognition, Rect};

/// How the in-pass results decide success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicKind {
    /// Every node produced a region
    #[default]
    And,
    /// At least one node produced a region
    Or,
    /// `expression` decides
    Custom,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LogicSpec {
    #[serde(rename = "type", default)]
    pub kind: LogicKind,
    #[serde(default)]
    pub expression: String,
}

/// Region reported on success.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReturnSpec {
    Fixed(Rect),
    Expression(String),
}

#[derive(Clone, Debug, Deserialize)]
struct MultiParams {
    #[serde(default)]
    nodes: Vec<String>,
    #[serde(default)]
    logic: LogicSpec,
    #[serde(rename = "return", default)]
    ret: Option<ReturnSpec>,
}

/// The composing recognition. Holds no state between invocations.
#[derive(Debug, Default)]
pub struct MultiRecognition;

impl MultiRecognition {
    pub fn new() -> Self {
        Self
    }

    fn try_analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Result<Option<AnalyzeResult>> {
        let params: MultiParams =
            serde_json::from_value(parse_param(&arg.custom_recognition_param)?)
                .context("Invalid MultiRecognition param")?;

        if params.nodes.is_empty() {
            crate::log("Error: MultiRecognition needs a non-empty nodes array");
            return Ok(None);
        }
        let ret = match params.ret {
            Some(ReturnSpec::Expression(ref s)) if s.trim().is_empty() => None,
            other => other,
        };
        let Some(ret) = ret else {
            crate::log("Error: MultiRecognition needs a return value");
            return Ok(None);
        };

        let screen = roi::full_screen(arg.image.width(), arg.image.height());
        let mut regions = Vec::with_capacity(params.nodes.len());
        for (i, name) in params.nodes.iter().enumerate() {
            let detail = ctx
                .run_recognition(name, &arg.image, None)
                .with_context(|| format!("Recognition {} failed", name))?;
            let region = detail
                .and_then(|d| d.box_)
                .map(|r| roi::normalize(r, screen));
            crate::debug(&format!("{}(${}): {:?}", name, i, region));
            regions.push(region);
        }

        let mut pass = Pass {
            regions: &regions,
            externals: ExternalCache::new(TaskHistory::new(ctx, arg.task_id), screen),
        };

        if !pass.check_logic(&params.logic) {
            crate::debug("Logic condition not met");
            return Ok(None);
        }

        match pass.resolve_return(&ret, screen) {
            Some(rect) => {
                crate::debug(&format!("MultiRecognition matched, roi: {}", rect));
                Ok(Some(AnalyzeResult::new(rect, "MultiRecognition")))
            }
            None => {
                crate::debug("ROI calculation failed");
                Ok(None)
            }
        }
    }
}

impl CustomRecognition for MultiRecognition {
    fn analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Option<AnalyzeResult> {
        match self.try_analyze(ctx, arg) {
            Ok(result) => result,
            Err(e) => {
                crate::log(&format!("Error: MultiRecognition failed: {:#}", e));
                None
            }
        }
    }
}

/// Results of one invocation: the in-pass regions plus a lazily filled
/// cache of external ones. Dropped when the invocation ends.
struct Pass<'a, H> {
    regions: &'a [Option<Rect>],
    externals: ExternalCache<H>,
}

impl<H: NodeHistory> Bindings for Pass<'_, H> {
    fn node(&self, index: usize) -> Option<Option<Rect>> {
        self.regions.get(index).copied()
    }

    fn external(&mut self, name: &str) -> Option<Rect> {
        self.externals.get(name)
    }
}

impl<H: NodeHistory> Pass<'_, H> {
    fn check_logic(&mut self, logic: &LogicSpec) -> bool {
        match logic.kind {
            LogicKind::And => self.regions.iter().all(Option::is_some),
            LogicKind::Or => self.regions.iter().any(Option::is_some),
            LogicKind::Custom => {
                if logic.expression.trim().is_empty() {
                    crate::log("Error: CUSTOM logic needs an expression");
                    return false;
                }
                let result = parse_logic(&logic.expression).and_then(|expr| {
                    crate::debug(&format!("Logic expression: {} -> {}", logic.expression, expr));
                    expr.check_nodes(self.regions.len())?;
                    expr.eval(self)
                });
                match result {
                    Ok(value) => {
                        crate::debug(&format!("Logic expression {} = {}", logic.expression, value));
                        value
                    }
                    Err(e) => {
                        crate::log(&format!(
                            "Error: logic expression {} failed: {}",
                            logic.expression, e
                        ));
                        false
                    }
                }
            }
        }
    }

    /// Computes the returned region and clips it to the screen.
    fn resolve_return(&mut self, ret: &ReturnSpec, screen: Rect) -> Option<Rect> {
        let candidate = match ret {
            ReturnSpec::Fixed(rect) => {
                crate::debug(&format!("Fixed return roi: {}", rect));
                *rect
            }
            ReturnSpec::Expression(src) => match parse_roi(src).and_then(|expr| expr.eval(self)) {
                Ok(rect) => {
                    crate::debug(&format!("ROI expression: {} -> {}", src, rect));
                    rect
                }
                Err(e) => {
                    crate::log(&format!("Error: ROI expression {} failed: {}", src, e));
                    return None;
                }
            },
        };

        let Some(clipped) = roi::clip(candidate, screen) else {
            crate::log(&format!("Warning: ROI {} lies entirely off screen", candidate));
            return None;
        };
        if clipped != candidate {
            crate::debug(&format!("ROI clipped: {} -> {}", candidate, clipped));
        }
        Some(clipped)
    }
}

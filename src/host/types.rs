//! Data exchanged with the automation host.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host-issued identifier of one top-level task run.
pub type TaskId = i64;

/// Axis-aligned rectangle in host screen coordinates.
///
/// Serialized as `[x, y, width, height]`, the way the host and pipeline
/// files write regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const ZERO: Rect = Rect::new(0, 0, 0, 0);

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True for the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        *self == Rect::ZERO
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }
}

impl From<[i32; 4]> for Rect {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Rect::new(x, y, width, height)
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{},{}]", self.x, self.y, self.width, self.height)
    }
}

/// Best hit of a recognition (box plus OCR text where applicable).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoResult {
    #[serde(rename = "box")]
    pub box_: Option<Rect>,
    pub text: Option<String>,
    pub score: Option<f64>,
}

/// Outcome of one recognition run by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoDetail {
    pub reco_id: i64,
    pub name: String,
    pub algorithm: String,
    /// Matched region, `None` when the recognition did not hit
    #[serde(rename = "box")]
    pub box_: Option<Rect>,
    pub best_result: Option<RecoResult>,
    #[serde(default)]
    pub detail: Value,
}

impl RecoDetail {
    /// Convenience constructor for a hit at `rect`.
    pub fn hit(name: &str, rect: Rect) -> Self {
        Self {
            name: name.to_string(),
            box_: Some(rect),
            best_result: Some(RecoResult {
                box_: Some(rect),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// True if the recognition produced a region.
    pub fn is_hit(&self) -> bool {
        self.box_.is_some()
    }
}

/// One executed node in a task's history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDetail {
    pub node_id: i64,
    pub name: String,
    pub recognition: Option<RecoDetail>,
    pub completed: bool,
}

/// A task run with its executed nodes, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub task_id: TaskId,
    pub entry: String,
    pub nodes: Vec<NodeDetail>,
    pub status: String,
}

/// Arguments handed to a custom recognition.
#[derive(Clone, Debug)]
pub struct AnalyzeArg {
    pub task_id: TaskId,
    pub node_name: String,
    pub custom_recognition_name: String,
    /// Serialized JSON parameter object from the pipeline
    pub custom_recognition_param: String,
    pub image: RgbImage,
    pub roi: Rect,
}

/// A successful custom recognition.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzeResult {
    pub box_: Rect,
    pub detail: String,
}

impl AnalyzeResult {
    pub fn new(box_: Rect, detail: impl Into<String>) -> Self {
        Self {
            box_,
            detail: detail.into(),
        }
    }
}

/// Arguments handed to a custom action.
#[derive(Clone, Debug, Default)]
pub struct RunArg {
    pub task_id: TaskId,
    pub node_name: String,
    pub custom_action_name: String,
    /// Serialized JSON parameter object from the pipeline
    pub custom_action_param: String,
    pub reco_detail: Option<RecoDetail>,
    pub box_: Option<Rect>,
}

/// Result of a custom action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
}

impl RunResult {
    pub const SUCCESS: RunResult = RunResult { success: true };
    pub const FAILURE: RunResult = RunResult { success: false };
}

//! The calls a callback may make back into the host.

use anyhow::Result;
use image::RgbImage;
use serde_json::Value;

use super::types::{RecoDetail, TaskDetail, TaskId};

/// Host services available while a callback runs.
///
/// Every call is a blocking round-trip into the host. Implementations report
/// a recognition that simply did not match as `Ok(None)`; `Err` is reserved
/// for faults at the host boundary.
pub trait Context {
    /// Runs the pipeline node `entry` as a recognition against `image`,
    /// optionally patching node parameters for this call only.
    fn run_recognition(
        &self,
        entry: &str,
        image: &RgbImage,
        overrides: Option<&Value>,
    ) -> Result<Option<RecoDetail>>;

    /// Patches node parameters for the rest of the task.
    fn override_pipeline(&self, overrides: &Value) -> Result<()>;

    /// Runs `entry` as a nested task and waits for it to finish.
    fn run_task(&self, entry: &str) -> Result<Option<TaskDetail>>;

    /// Fetches the executed-node history of a task.
    fn task_detail(&self, task_id: TaskId) -> Result<Option<TaskDetail>>;

    /// Returns the current (overridden) definition of a pipeline node.
    fn node_data(&self, name: &str) -> Result<Option<Value>>;

    /// Returns the controller's most recent screen capture.
    fn cached_image(&self) -> Result<RgbImage>;
}

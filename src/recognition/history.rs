//! Lookup of nodes that already ran earlier in the current task.

use std::cell::OnceCell;
use std::collections::HashMap;

use super::roi;
use crate::host::{Context, Rect, TaskDetail, TaskId};

/// Recognition outcome of an executed node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeResult {
    pub region: Option<Rect>,
}

impl NodeResult {
    pub fn success(&self) -> bool {
        self.region.is_some()
    }
}

/// Most-recent-wins lookup of executed nodes by name.
pub trait NodeHistory {
    /// Latest execution of `name`, `None` if it has not run in this task.
    fn lookup(&self, name: &str) -> Option<NodeResult>;
}

/// `NodeHistory` backed by the host's task detail, fetched on first lookup
/// and reused afterwards.
pub struct TaskHistory<'a> {
    ctx: &'a dyn Context,
    task_id: TaskId,
    detail: OnceCell<Option<TaskDetail>>,
}

impl<'a> TaskHistory<'a> {
    pub fn new(ctx: &'a dyn Context, task_id: TaskId) -> Self {
        Self {
            ctx,
            task_id,
            detail: OnceCell::new(),
        }
    }

    fn detail(&self) -> Option<&TaskDetail> {
        self.detail
            .get_or_init(|| match self.ctx.task_detail(self.task_id) {
                Ok(detail) => detail,
                Err(e) => {
                    crate::log(&format!(
                        "Warning: failed to fetch detail of task {}: {:#}",
                        self.task_id, e
                    ));
                    None
                }
            })
            .as_ref()
    }
}

impl NodeHistory for TaskHistory<'_> {
    fn lookup(&self, name: &str) -> Option<NodeResult> {
        self.detail()?
            .nodes
            .iter()
            .rev()
            .find(|node| node.name == name)
            .map(|node| NodeResult {
                region: node.recognition.as_ref().and_then(|reco| reco.box_),
            })
    }
}

/// Per-invocation cache of external node regions.
///
/// Each name is looked up at most once; a name missing from the history is
/// remembered as absent. Regions are normalized to the screen like in-pass
/// results.
pub struct ExternalCache<H> {
    history: H,
    screen: Rect,
    entries: HashMap<String, Option<Rect>>,
}

impl<H: NodeHistory> ExternalCache<H> {
    pub fn new(history: H, screen: Rect) -> Self {
        Self {
            history,
            screen,
            entries: HashMap::new(),
        }
    }

    /// Region of `name`, `None` if it found nothing or never ran.
    pub fn get(&mut self, name: &str) -> Option<Rect> {
        if let Some(region) = self.entries.get(name) {
            return *region;
        }

        let region = match self.history.lookup(name) {
            Some(result) => {
                let region = result.region.map(|r| roi::normalize(r, self.screen));
                crate::debug(&format!(
                    "Cached external node {}: success={}, roi={:?}",
                    name,
                    result.success(),
                    region
                ));
                region
            }
            None => {
                crate::log(&format!("Warning: external node {} not found", name));
                None
            }
        };
        self.entries.insert(name.to_string(), region);
        region
    }
}

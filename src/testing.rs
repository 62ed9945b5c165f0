//! Scripted host used by unit tests.

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::host::{AnalyzeArg, Context, NodeDetail, RecoDetail, Rect, TaskDetail, TaskId};

type Recognizer = Box<dyn Fn(&str, Option<&Value>) -> Option<RecoDetail> + Send + Sync>;

/// In-memory `Context` that answers recognitions from a script and records
/// every call made into it.
pub struct MockHost {
    recognizer: Recognizer,
    history: Vec<NodeDetail>,
    node_data: HashMap<String, Value>,
    image: RgbImage,
    failing: bool,
    failing_tasks: Vec<String>,
    overrides: Mutex<Vec<Value>>,
    tasks_run: Mutex<Vec<String>>,
    recognitions_run: Mutex<Vec<String>>,
    task_detail_calls: Mutex<usize>,
}

impl MockHost {
    /// A host on which nothing matches.
    pub fn new() -> Self {
        Self {
            recognizer: Box::new(|_, _| None),
            history: Vec::new(),
            node_data: HashMap::new(),
            image: RgbImage::new(16, 9),
            failing: false,
            failing_tasks: Vec::new(),
            overrides: Mutex::new(Vec::new()),
            tasks_run: Mutex::new(Vec::new()),
            recognitions_run: Mutex::new(Vec::new()),
            task_detail_calls: Mutex::new(0),
        }
    }

    /// Nodes in `hits` match at the given rectangle; everything else misses.
    /// A name ending in `*` matches every entry with that prefix.
    pub fn with_hits(self, hits: &[(&str, Rect)]) -> Self {
        let hits: Vec<(String, Rect)> = hits.iter().map(|(n, r)| (n.to_string(), *r)).collect();
        self.with_recognizer(move |entry, _| {
            hits.iter()
                .find(|(name, _)| match name.strip_suffix('*') {
                    Some(prefix) => entry.starts_with(prefix),
                    None => entry == name.as_str(),
                })
                .map(|(_, rect)| RecoDetail::hit(entry, *rect))
        })
    }

    pub fn with_recognizer<F>(mut self, recognizer: F) -> Self
    where
        F: Fn(&str, Option<&Value>) -> Option<RecoDetail> + Send + Sync + 'static,
    {
        self.recognizer = Box::new(recognizer);
        self
    }

    /// Executed nodes of the current task, oldest first.
    pub fn with_history(mut self, nodes: Vec<NodeDetail>) -> Self {
        self.history = nodes;
        self
    }

    pub fn with_node_data(mut self, name: &str, data: Value) -> Self {
        self.node_data.insert(name.to_string(), data);
        self
    }

    pub fn with_image(mut self, image: RgbImage) -> Self {
        self.image = image;
        self
    }

    /// Every recognition call fails with a host fault.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// `run_task(name)` is recorded, then fails with a host fault.
    pub fn with_failing_task(mut self, name: &str) -> Self {
        self.failing_tasks.push(name.to_string());
        self
    }

    pub fn overrides(&self) -> Vec<Value> {
        self.overrides.lock().unwrap().clone()
    }

    pub fn tasks_run(&self) -> Vec<String> {
        self.tasks_run.lock().unwrap().clone()
    }

    pub fn recognitions_run(&self) -> Vec<String> {
        self.recognitions_run.lock().unwrap().clone()
    }

    pub fn task_detail_calls(&self) -> usize {
        *self.task_detail_calls.lock().unwrap()
    }
}

impl Context for MockHost {
    fn run_recognition(
        &self,
        entry: &str,
        _image: &RgbImage,
        overrides: Option<&Value>,
    ) -> Result<Option<RecoDetail>> {
        self.recognitions_run.lock().unwrap().push(entry.to_string());
        if self.failing {
            return Err(anyhow!("host disconnected"));
        }
        Ok((self.recognizer)(entry, overrides))
    }

    fn override_pipeline(&self, overrides: &Value) -> Result<()> {
        self.overrides.lock().unwrap().push(overrides.clone());
        Ok(())
    }

    fn run_task(&self, entry: &str) -> Result<Option<TaskDetail>> {
        self.tasks_run.lock().unwrap().push(entry.to_string());
        if self.failing_tasks.iter().any(|name| name == entry) {
            return Err(anyhow!("task {} crashed", entry));
        }
        Ok(Some(TaskDetail {
            entry: entry.to_string(),
            status: "Succeeded".to_string(),
            ..Default::default()
        }))
    }

    fn task_detail(&self, task_id: TaskId) -> Result<Option<TaskDetail>> {
        *self.task_detail_calls.lock().unwrap() += 1;
        Ok(Some(TaskDetail {
            task_id,
            entry: "Main".to_string(),
            nodes: self.history.clone(),
            status: "Running".to_string(),
        }))
    }

    fn node_data(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.node_data.get(name).cloned())
    }

    fn cached_image(&self) -> Result<RgbImage> {
        Ok(self.image.clone())
    }
}

/// An executed history node, matched at `rect` or missed.
pub fn executed(name: &str, rect: Option<Rect>) -> NodeDetail {
    NodeDetail {
        name: name.to_string(),
        recognition: Some(RecoDetail {
            name: name.to_string(),
            box_: rect,
            ..Default::default()
        }),
        completed: true,
        ..Default::default()
    }
}

/// Recognition args for task 1 on a 16x9 frame (a 1280x720 screen once
/// normalized).
pub fn analyze_arg(param: &str) -> AnalyzeArg {
    analyze_arg_for(1, "TestNode", param)
}

pub fn analyze_arg_for(task_id: TaskId, node_name: &str, param: &str) -> AnalyzeArg {
    AnalyzeArg {
        task_id,
        node_name: node_name.to_string(),
        custom_recognition_name: String::new(),
        custom_recognition_param: param.to_string(),
        image: RgbImage::new(16, 9),
        roi: Rect::ZERO,
    }
}

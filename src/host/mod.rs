//! Boundary with the automation host.
//!
//! This module provides:
//! - Data types the host passes in and expects back
//! - The `Context` trait for calls back into the host
//! - Callback traits and the registry the host dispatches through

pub mod context;
pub mod registry;
pub mod types;

pub use context::Context;
pub use registry::{is_empty_param, parse_param, CustomAction, CustomRecognition, Registry};
pub use types::{
    AnalyzeArg, AnalyzeResult, NodeDetail, RecoDetail, RecoResult, Rect, RunArg, RunResult,
    TaskDetail, TaskId,
};

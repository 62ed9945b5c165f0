//! Custom actions.
//!
//! This module provides:
//! - Node and screen utilities: screenshots, overrides, counter reset,
//!   random pauses (`general`)
//! - Login patching for a role (`login`)
//! - Task-list and per-role task drivers (`run_task`)

pub mod general;
pub mod login;
pub mod run_task;

pub use general::{DisableNode, NodeOverride, RandomSleep, ResetCount, Screenshot};
pub use login::OverrideLoginInfo;
pub use run_task::{ForRolesToRunTask, RunTaskList, TaskStep};

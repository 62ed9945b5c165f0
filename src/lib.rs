//! Pipeline Agent
//!
//! Custom recognition and action callbacks for a game-automation host.
//! The host owns capture, template matching and pipeline execution; this
//! crate supplies the callbacks it dispatches to by name:
//!
//! - `MultiRecognition`: composes several named recognitions with a logic
//!   expression and derives a region from an ROI expression
//! - `Count`: turns a repeatable recognition into an "at most N times" gate
//! - `ForRolesToRunTask`: runs a task list once per configured game role
//! - a handful of one-off recognitions and pipeline actions

pub mod account;
pub mod action;
pub mod config;
pub mod host;
pub mod paths;
pub mod recognition;

#[cfg(test)]
pub(crate) mod testing;

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use crate::account::CsvAccountDirectory;
use crate::action::{
    DisableNode, ForRolesToRunTask, NodeOverride, OverrideLoginInfo, RandomSleep, ResetCount,
    RunTaskList, Screenshot,
};
use crate::config::AgentConfig;
use crate::host::Registry;
use crate::recognition::{
    BreakthroughBoard, CountGate, CountStore, DuelBetPick, GetNextBreakthrough,
    InitBreakthroughStatus, IsLastBreakthrough, MultiRecognition,
};

/// Logs a message to both console and the daily log file with timestamp.
pub fn log(msg: &str) {
    let now = Local::now();
    let line = format!("[{}] {}\n", now.format("%H:%M:%S%.3f"), msg);
    print!("{}", line);
    append_to_log_file(&now, &line);
}

/// Logs a debug trace. Always written to the log file, echoed to the
/// console only when `debug` is enabled in the agent config.
pub fn debug(msg: &str) {
    let now = Local::now();
    let line = format!("[{}] DEBUG {}\n", now.format("%H:%M:%S%.3f"), msg);
    if config::get_config().debug {
        print!("{}", line);
    }
    append_to_log_file(&now, &line);
}

fn append_to_log_file(now: &chrono::DateTime<Local>, line: &str) {
    let log_dir = paths::get_log_dir();
    if std::fs::create_dir_all(&log_dir).is_err() {
        return;
    }
    let log_path = log_dir.join(format!("{}.log", now.format("%Y-%m-%d")));
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Builds the registry of every callback this agent exposes to the host.
///
/// Shared state (match counters, the breakthrough board) is created here
/// once and handed to every callback that needs it.
pub fn register_all(config: &AgentConfig) -> Registry {
    let mut registry = Registry::new();

    let counts = Arc::new(CountStore::new());
    let board = Arc::new(BreakthroughBoard::new());
    let accounts = Arc::new(CsvAccountDirectory::new(paths::resolve(&config.account_csv)));

    registry.register_recognition("MultiRecognition", Arc::new(MultiRecognition::new()));
    registry.register_recognition("Count", Arc::new(CountGate::new(counts.clone())));
    registry.register_recognition("DuiYiJingCai", Arc::new(DuelBetPick::new()));
    registry.register_recognition(
        "InitTuPoStatus",
        Arc::new(InitBreakthroughStatus::new(board.clone())),
    );
    registry.register_recognition("IsLastTuPo", Arc::new(IsLastBreakthrough::new(board.clone())));
    registry.register_recognition("GetNextTuPo", Arc::new(GetNextBreakthrough::new(board)));

    registry.register_action(
        "Screenshot",
        Arc::new(Screenshot::new(config.role_info_node.clone())),
    );
    registry.register_action("DisableNode", Arc::new(DisableNode));
    registry.register_action("NodeOverride", Arc::new(NodeOverride));
    registry.register_action("ResetCount", Arc::new(ResetCount::new(counts)));
    registry.register_action("RandomSleep", Arc::new(RandomSleep));
    registry.register_action(
        "OverrideLoginInfo",
        Arc::new(OverrideLoginInfo::new(
            config.login_nodes.clone(),
            config.template_dir.clone(),
        )),
    );
    registry.register_action("RunTaskList", Arc::new(RunTaskList));
    registry.register_action(
        "ForRolesToRunTask",
        Arc::new(ForRolesToRunTask::new(
            accounts,
            config.role_info_node.clone(),
            config.shutdown_task.clone(),
        )),
    );

    log(&format!(
        "Registered {} recognitions and {} actions",
        registry.recognition_names().len(),
        registry.action_names().len()
    ));

    registry
}

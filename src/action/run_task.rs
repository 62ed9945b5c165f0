//! Actions that drive other tasks: a plain task list, and the same list
//! once per game role.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::general::finish;
use crate::account::AccountDirectory;
use crate::host::{parse_param, Context, CustomAction, RunArg, RunResult};

/// One task to run, followed by a pause of `wait` seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStep {
    pub taskname: String,
    #[serde(default)]
    pub wait: f64,
}

/// Runs every step in order. A step the host fails to run is logged and
/// the remaining steps still run. Returns the number of failed steps.
fn run_steps(ctx: &dyn Context, steps: &[TaskStep]) -> usize {
    let mut failed = 0;
    for step in steps {
        match ctx.run_task(&step.taskname) {
            Ok(detail) => crate::debug(&format!(
                "Task {} finished: {}",
                step.taskname,
                detail.map(|d| d.status).unwrap_or_else(|| "no detail".to_string())
            )),
            Err(e) => {
                failed += 1;
                crate::log(&format!("Error: task {} failed: {:#}", step.taskname, e));
            }
        }
        std::thread::sleep(Duration::try_from_secs_f64(step.wait).unwrap_or_default());
    }
    failed
}

#[derive(Debug, Deserialize)]
struct TaskListParams {
    tasks: Vec<TaskStep>,
}

/// `RunTaskList`: `{ "tasks": [{ "taskname": "...", "wait": 1 }] }`
pub struct RunTaskList;

impl RunTaskList {
    fn try_run(ctx: &dyn Context, arg: &RunArg) -> Result<()> {
        let params: TaskListParams =
            serde_json::from_value(parse_param(&arg.custom_action_param)?)
                .context("Invalid RunTaskList param")?;
        crate::log(&format!("RunTaskList: {} tasks", params.tasks.len()));
        let failed = run_steps(ctx, &params.tasks);
        if failed > 0 {
            crate::log(&format!(
                "Warning: {} of {} tasks failed",
                failed,
                params.tasks.len()
            ));
        }
        Ok(())
    }
}

impl CustomAction for RunTaskList {
    fn run(&self, ctx: &dyn Context, arg: &RunArg) -> RunResult {
        finish("RunTaskList", Self::try_run(ctx, arg))
    }
}

#[derive(Debug, Deserialize)]
struct RoleRotationParams {
    #[serde(default)]
    rolenames: Value,
    tasks: Vec<TaskStep>,
}

/// Reads the role list, which pipelines write as a JSON array, a string
/// holding an array (single or double quoted), or a comma-separated string.
fn parse_rolenames(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') {
                let parsed = serde_json::from_str::<Vec<String>>(trimmed)
                    .or_else(|_| serde_json::from_str::<Vec<String>>(&trimmed.replace('\'', "\"")));
                match parsed {
                    Ok(names) => return names,
                    Err(e) => crate::debug(&format!(
                        "rolenames is not a list ({}), reading it as comma-separated",
                        e
                    )),
                }
            }
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        }
        other => {
            crate::log(&format!("Warning: unsupported rolenames: {}", other));
            Vec::new()
        }
    }
}

/// `ForRolesToRunTask`: runs `tasks` once for every role in `rolenames`,
/// then the shutdown task.
///
/// Param format: `{ "rolenames": ["A", "B"] | "ALL" | "A,B", "tasks": [...] }`.
/// Before each role's tasks the role-info node is overridden with that
/// role's account, platform, server and name.
pub struct ForRolesToRunTask {
    accounts: Arc<dyn AccountDirectory>,
    role_info_node: String,
    shutdown_task: String,
}

impl ForRolesToRunTask {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        role_info_node: String,
        shutdown_task: String,
    ) -> Self {
        Self {
            accounts,
            role_info_node,
            shutdown_task,
        }
    }

    fn try_run(&self, ctx: &dyn Context, arg: &RunArg) -> Result<()> {
        let params: RoleRotationParams =
            serde_json::from_value(parse_param(&arg.custom_action_param)?)
                .context("Invalid ForRolesToRunTask param")?;

        self.rotate(ctx, &params);

        ctx.run_task(&self.shutdown_task)
            .context(format!("Failed to run task {}", self.shutdown_task))?;
        Ok(())
    }

    /// Runs the steps for every role. Nothing here aborts the rotation: an
    /// unknown role, a failed override or a failed step is logged and the
    /// rotation moves on.
    fn rotate(&self, ctx: &dyn Context, params: &RoleRotationParams) {
        let mut rolenames = parse_rolenames(&params.rolenames);
        if rolenames.first().is_some_and(|name| name == "ALL") {
            rolenames = self.accounts.all_rolenames();
        }
        let total = rolenames.len();
        crate::log(&format!(
            "ForRolesToRunTask: {} roles, {} tasks",
            total,
            params.tasks.len()
        ));

        for (index, rolename) in rolenames.iter().enumerate() {
            crate::log(&format!("Current role {} ({}/{})", rolename, index + 1, total));
            let Some(info) = self.accounts.find_role(rolename) else {
                crate::log(&format!("Warning: role {} not found, skipping", rolename));
                continue;
            };

            let mut overrides = serde_json::Map::new();
            overrides.insert(
                self.role_info_node.clone(),
                json!({
                    "custom_action_param": {
                        "account": info.account,
                        "platform": info.platform,
                        "servername": info.servername,
                        "rolename": rolename,
                    }
                }),
            );
            if let Err(e) = ctx.override_pipeline(&Value::Object(overrides)) {
                crate::log(&format!(
                    "Error: failed to switch to role {}, skipping: {:#}",
                    rolename, e
                ));
                continue;
            }

            let failed = run_steps(ctx, &params.tasks);
            if failed > 0 {
                crate::log(&format!(
                    "Warning: role {}: {} of {} tasks failed",
                    rolename,
                    failed,
                    params.tasks.len()
                ));
            }
        }
    }
}

impl CustomAction for ForRolesToRunTask {
    fn run(&self, ctx: &dyn Context, arg: &RunArg) -> RunResult {
        finish("ForRolesToRunTask", self.try_run(ctx, arg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::RoleInfo;
    use crate::testing::MockHost;

    struct FixedAccounts;

    impl AccountDirectory for FixedAccounts {
        fn find_role(&self, rolename: &str) -> Option<RoleInfo> {
            ["Alice", "Bob"].contains(&rolename).then(|| RoleInfo {
                account: format!("{}@example.com", rolename.to_lowercase()),
                platform: "android".to_string(),
                servername: "S1".to_string(),
            })
        }

        fn all_rolenames(&self) -> Vec<String> {
            vec!["Alice".to_string(), "Bob".to_string()]
        }
    }

    fn rotation() -> ForRolesToRunTask {
        ForRolesToRunTask::new(
            Arc::new(FixedAccounts),
            "RoleInfo".to_string(),
            "Shutdown".to_string(),
        )
    }

    fn run_arg(param: Value) -> RunArg {
        RunArg {
            custom_action_param: param.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_run_task_list() {
        let host = MockHost::new();
        let param = json!({
            "tasks": [{ "taskname": "A", "wait": 0 }, { "taskname": "B", "wait": 0 }],
        });

        assert_eq!(RunTaskList.run(&host, &run_arg(param)), RunResult::SUCCESS);
        assert_eq!(host.tasks_run(), vec!["A", "B"]);
        assert_eq!(RunTaskList.run(&host, &run_arg(json!({}))), RunResult::FAILURE);
    }

    #[test]
    fn test_rotation_skips_unknown_roles() {
        let host = MockHost::new();
        let param = json!({
            "rolenames": ["Alice", "Nobody", "Bob"],
            "tasks": [{ "taskname": "Daily", "wait": 0 }],
        });

        assert_eq!(rotation().run(&host, &run_arg(param)), RunResult::SUCCESS);

        assert_eq!(host.tasks_run(), vec!["Daily", "Daily", "Shutdown"]);
        let overrides = host.overrides();
        assert_eq!(overrides.len(), 2);
        let alice = &overrides[0]["RoleInfo"]["custom_action_param"];
        assert_eq!(alice["account"], "alice@example.com");
        assert_eq!(alice["rolename"], "Alice");
        assert_eq!(overrides[1]["RoleInfo"]["custom_action_param"]["rolename"], "Bob");
    }

    #[test]
    fn test_failed_step_does_not_stop_rotation() {
        let host = MockHost::new().with_failing_task("T1");
        let param = json!({
            "rolenames": ["Alice", "Bob"],
            "tasks": [{ "taskname": "T1", "wait": 0 }, { "taskname": "T2", "wait": 0 }],
        });

        assert_eq!(rotation().run(&host, &run_arg(param)), RunResult::SUCCESS);
        assert_eq!(host.tasks_run(), vec!["T1", "T2", "T1", "T2", "Shutdown"]);
        assert_eq!(host.overrides().len(), 2);
    }

    #[test]
    fn test_task_list_continues_after_failure() {
        let host = MockHost::new().with_failing_task("A");
        let param = json!({
            "tasks": [{ "taskname": "A", "wait": 0 }, { "taskname": "B", "wait": 0 }],
        });

        assert_eq!(RunTaskList.run(&host, &run_arg(param)), RunResult::SUCCESS);
        assert_eq!(host.tasks_run(), vec!["A", "B"]);
    }

    #[test]
    fn test_rotation_all_roles() {
        let host = MockHost::new();
        let param = json!({ "rolenames": "['ALL']", "tasks": [] });

        assert_eq!(rotation().run(&host, &run_arg(param)), RunResult::SUCCESS);
        assert_eq!(host.overrides().len(), 2);
        assert_eq!(host.tasks_run(), vec!["Shutdown"]);
    }

    #[test]
    fn test_parse_rolenames() {
        assert_eq!(parse_rolenames(&json!(["A", "B"])), vec!["A", "B"]);
        assert_eq!(parse_rolenames(&json!(r#"["A", "B"]"#)), vec!["A", "B"]);
        assert_eq!(parse_rolenames(&json!("['A', 'B']")), vec!["A", "B"]);
        assert_eq!(parse_rolenames(&json!("A, B,")), vec!["A", "B"]);
        assert_eq!(parse_rolenames(&json!("ALL")), vec!["ALL"]);
        assert!(parse_rolenames(&Value::Null).is_empty());
    }
}

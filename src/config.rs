//! Agent configuration.
//!
//! Loaded once from `config/agent.json` under the base directory. Every
//! field has a default, so a partial or missing file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Global configuration instance, initialized on first use.
static CONFIG: OnceLock<AgentConfig> = OnceLock::new();

/// Pipeline nodes patched by `OverrideLoginInfo`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoginNodes {
    /// Checks whether the logged-in account is already the wanted one
    pub current_account: String,
    /// Finds the wanted account in the account list
    pub select_account: String,
    /// Platform button, matched by template
    pub platform_button: String,
    /// Checks whether the selected server is already the wanted one
    pub current_server: String,
    /// Server icon, matched by template
    pub select_server: String,
}

impl Default for LoginNodes {
    fn default() -> Self {
        Self {
            current_account: "TASK-A-3-0识别到当前账号就是要登录的账号".to_string(),
            select_account: "TASK-A-4找到匹配的账号了并点击".to_string(),
            platform_button: "TASK-A-6检测平台按钮并点击".to_string(),
            current_server: "TASK-A-7-0识别到当前区服就是要登录的区服".to_string(),
            select_server: "TASK-A-9查找区服图标并点击选择该角色".to_string(),
        }
    }
}

/// Complete agent configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Echo debug traces to the console
    pub debug: bool,
    /// Directory for daily log files
    pub log_dir: String,
    /// CSV file with account, platform, servername and rolename columns
    pub account_csv: String,
    /// Node whose action param carries the identity of the current role
    pub role_info_node: String,
    /// Task run after every role has been processed
    pub shutdown_task: String,
    /// Login nodes patched with the current role's identity
    pub login_nodes: LoginNodes,
    /// Template folder holding platform and server icons
    pub template_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_dir: "debug/custom".to_string(),
            account_csv: "user_data/account_info.csv".to_string(),
            role_info_node: "重写账号角色信息".to_string(),
            shutdown_task: "TASK-关闭游戏".to_string(),
            login_nodes: LoginNodes::default(),
            template_dir: "平台区服".to_string(),
        }
    }
}

/// Reads configuration from `path`.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_config(path: &Path) -> Result<Option<AgentConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(config))
}

/// Returns the global configuration, loading it on first use.
///
/// Load problems are logged only after the config is in place, since the
/// logger itself reads the config.
pub fn get_config() -> &'static AgentConfig {
    if let Some(config) = CONFIG.get() {
        return config;
    }

    let path = crate::paths::get_config_path();
    let (loaded, note) = match load_config(&path) {
        Ok(Some(config)) => (config, format!("Config loaded from {}", path.display())),
        Ok(None) => (
            AgentConfig::default(),
            format!("{} not found. Using default config.", path.display()),
        ),
        Err(e) => (
            AgentConfig::default(),
            format!("Warning: {:#}. Using default config.", e),
        ),
    };

    let config = CONFIG.get_or_init(|| loaded);
    crate::log(&note);
    config
}

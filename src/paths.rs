use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::get_config;

static BASE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the agent's base directory: the working directory the host
/// launched the agent in (the project root).
pub fn get_base_dir() -> &'static PathBuf {
    BASE_DIR.get_or_init(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Resolves a configured path against the base directory.
/// Absolute paths are returned unchanged.
pub fn resolve(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_base_dir().join(path)
    }
}

/// Returns the agent config file: `<base_dir>/config/agent.json`
pub fn get_config_path() -> PathBuf {
    get_base_dir().join("config").join("agent.json")
}

/// Returns the log directory: `<base_dir>/<log_dir>/`
///
/// Unit tests log under the system temp directory instead.
pub fn get_log_dir() -> PathBuf {
    if cfg!(test) {
        return std::env::temp_dir().join("pipeline-agent-test-logs");
    }
    resolve(&get_config().log_dir)
}

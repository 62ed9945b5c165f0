//! General-purpose pipeline actions.

use anyhow::{anyhow, Context as _, Result};
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;

use crate::host::{is_empty_param, parse_param, Context, CustomAction, RunArg, RunResult};
use crate::paths;
use crate::recognition::CountStore;

/// Logs a failed action and reports it to the host.
pub(crate) fn finish(name: &str, result: Result<()>) -> RunResult {
    match result {
        Ok(()) => RunResult::SUCCESS,
        Err(e) => {
            crate::log(&format!("Error: {} failed: {:#}", name, e));
            RunResult::FAILURE
        }
    }
}

fn default_format() -> String {
    "jpeg".to_string()
}

fn default_quality() -> u8 {
    70
}

#[derive(Debug, Deserialize)]
struct ScreenshotParams {
    save_dir: String,
    #[serde(default = "default_format")]
    format: String,
    /// JPEG quality, 1 to 95
    #[serde(default = "default_quality")]
    quality: u8,
    #[serde(default)]
    gray: bool,
}

/// `Screenshot`: saves the host's current frame to `save_dir`, named after
/// the time and the role being played.
///
/// Param format:
/// `{ "save_dir": "...", "format": "jpeg" | "png", "quality": 70, "gray": false }`
pub struct Screenshot {
    role_info_node: String,
}

impl Screenshot {
    pub fn new(role_info_node: String) -> Self {
        Self { role_info_node }
    }

    fn try_run(&self, ctx: &dyn Context, arg: &RunArg) -> Result<()> {
        let params: ScreenshotParams =
            serde_json::from_value(parse_param(&arg.custom_action_param)?)
                .context("Invalid Screenshot param")?;

        let frame = ctx.cached_image().context("Failed to get cached image")?;
        let (width, height) = frame.dimensions();
        if height == 0 {
            return Err(anyhow!("Cached image is empty"));
        }
        let ratio = width as f64 / height as f64;
        let target = 16.0 / 9.0;
        if (ratio - target).abs() / target > 0.01 {
            crate::log(&format!(
                "Warning: screen is not 16:9, current resolution {}x{}",
                width, height
            ));
        }

        let image = if params.gray {
            DynamicImage::ImageLuma8(DynamicImage::ImageRgb8(frame).to_luma8())
        } else {
            DynamicImage::ImageRgb8(frame)
        };

        let save_dir = paths::resolve(&params.save_dir);
        std::fs::create_dir_all(&save_dir)
            .context(format!("Failed to create directory: {}", save_dir.display()))?;

        let jpeg = params.format.eq_ignore_ascii_case("jpeg");
        let rolename = self.current_rolename(ctx);
        let filename = format!(
            "{}-{}.{}",
            Local::now().format("%Y.%m.%d-%H.%M.%S"),
            rolename,
            if jpeg { "jpg" } else { "png" }
        );
        let path = save_dir.join(filename);

        if jpeg {
            let file = File::create(&path)
                .context(format!("Failed to create file: {}", path.display()))?;
            let encoder =
                JpegEncoder::new_with_quality(BufWriter::new(file), params.quality.clamp(1, 95));
            image
                .write_with_encoder(encoder)
                .context("Failed to encode JPEG")?;
        } else {
            image
                .save_with_format(&path, ImageFormat::Png)
                .context("Failed to encode PNG")?;
        }

        crate::log(&format!("Screenshot saved to {}", path.display()));
        Ok(())
    }

    /// Role name pushed into the role-info node, `unknown` if there is none.
    fn current_rolename(&self, ctx: &dyn Context) -> String {
        let data = match ctx.node_data(&self.role_info_node) {
            Ok(data) => data,
            Err(e) => {
                crate::log(&format!("Warning: failed to read {}: {:#}", self.role_info_node, e));
                None
            }
        };
        data.as_ref()
            .and_then(rolename_from_node)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Finds `custom_action_param.rolename` in a node definition. The param may
/// sit under `action.param` or at the top level, as an object or as a JSON
/// string.
fn rolename_from_node(data: &Value) -> Option<String> {
    let param = data
        .pointer("/action/param/custom_action_param")
        .or_else(|| data.get("custom_action_param"))?;
    let param = match param {
        Value::String(raw) => serde_json::from_str(raw).ok()?,
        other => other.clone(),
    };
    param
        .get("rolename")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

impl CustomAction for Screenshot {
    fn run(&self, ctx: &dyn Context, arg: &RunArg) -> RunResult {
        finish("Screenshot", self.try_run(ctx, arg))
    }
}

#[derive(Debug, Deserialize)]
struct NodeNameParam {
    node_name: Option<String>,
}

/// `DisableNode`: `{ "node_name": "..." }` turns that node off.
pub struct DisableNode;

impl DisableNode {
    fn try_run(ctx: &dyn Context, arg: &RunArg) -> Result<()> {
        let param: NodeNameParam = serde_json::from_value(parse_param(&arg.custom_action_param)?)
            .context("Invalid DisableNode param")?;
        let node_name = param
            .node_name
            .ok_or_else(|| anyhow!("DisableNode requires node_name"))?;

        let mut overrides = serde_json::Map::new();
        overrides.insert(node_name.clone(), json!({ "enabled": false }));
        ctx.override_pipeline(&Value::Object(overrides))?;
        crate::debug(&format!("Disabled node {}", node_name));
        Ok(())
    }
}

impl CustomAction for DisableNode {
    fn run(&self, ctx: &dyn Context, arg: &RunArg) -> RunResult {
        finish("DisableNode", Self::try_run(ctx, arg))
    }
}

/// `NodeOverride`: the param object is applied as a pipeline override.
pub struct NodeOverride;

impl NodeOverride {
    fn try_run(ctx: &dyn Context, arg: &RunArg) -> Result<()> {
        let overrides = parse_param(&arg.custom_action_param)?;
        if is_empty_param(&overrides) {
            crate::log("Warning: NodeOverride called without overrides");
            return Ok(());
        }
        crate::debug(&format!("NodeOverride: {}", overrides));
        ctx.override_pipeline(&overrides)
    }
}

impl CustomAction for NodeOverride {
    fn run(&self, ctx: &dyn Context, arg: &RunArg) -> RunResult {
        finish("NodeOverride", Self::try_run(ctx, arg))
    }
}

/// `ResetCount`: `{ "node_name": "..." }` resets that node's counter; with
/// no name every counter is reset.
pub struct ResetCount {
    store: Arc<CountStore>,
}

impl ResetCount {
    pub fn new(store: Arc<CountStore>) -> Self {
        Self { store }
    }

    fn try_run(&self, arg: &RunArg) -> Result<()> {
        let param: NodeNameParam = serde_json::from_value(parse_param(&arg.custom_action_param)?)
            .context("Invalid ResetCount param")?;
        match param.node_name.as_deref() {
            Some(name) if !name.is_empty() => {
                self.store.reset(name);
                crate::log(&format!("ResetCount: reset counter of {}", name));
            }
            _ => {
                self.store.reset_all();
                crate::log("ResetCount: reset all counters");
            }
        }
        Ok(())
    }
}

impl CustomAction for ResetCount {
    fn run(&self, _ctx: &dyn Context, arg: &RunArg) -> RunResult {
        finish("ResetCount", self.try_run(arg))
    }
}

/// `RandomSleep`: pauses for a human-looking random time, usually about two
/// seconds with an occasional long break.
pub struct RandomSleep;

impl RandomSleep {
    /// Draws from N(2, 0.5) seconds. Short draws become long breaks.
    pub fn draw_seconds<R: Rng>(rng: &mut R) -> f64 {
        // Box-Muller
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        remap_short_pause(2.0 + 0.5 * z)
    }
}

fn remap_short_pause(seconds: f64) -> f64 {
    if seconds < 0.5 {
        30.0
    } else if seconds < 0.8 {
        20.0
    } else if seconds < 1.0 {
        10.0
    } else {
        seconds
    }
}

impl CustomAction for RandomSleep {
    fn run(&self, _ctx: &dyn Context, _arg: &RunArg) -> RunResult {
        let seconds = Self::draw_seconds(&mut rand::thread_rng());
        crate::debug(&format!("RandomSleep: {:.2}s", seconds));
        std::thread::sleep(Duration::from_secs_f64(seconds));
        RunResult::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHost;
    use image::RgbImage;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn run_arg(param: &str) -> RunArg {
        RunArg {
            custom_action_param: param.to_string(),
            ..Default::default()
        }
    }

    fn saved_files(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_screenshot_named_after_role() {
        let dir = TempDir::new().unwrap();
        let host = MockHost::new()
            .with_image(RgbImage::new(32, 18))
            .with_node_data(
                "RoleInfo",
                json!({
                    "action": { "param": { "custom_action_param": { "rolename": "Alice" } } }
                }),
            );
        let param = json!({ "save_dir": dir.path().join("shots") }).to_string();

        let result = Screenshot::new("RoleInfo".to_string()).run(&host, &run_arg(&param));

        assert_eq!(result, RunResult::SUCCESS);
        let files: Vec<String> = std::fs::read_dir(dir.path().join("shots"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("-Alice.jpg"), "got {}", files[0]);
    }

    #[test]
    fn test_screenshot_gray_png_unknown_role() {
        let dir = TempDir::new().unwrap();
        let host = MockHost::new().with_image(RgbImage::new(30, 20));
        let param = json!({ "save_dir": dir.path(), "format": "png", "gray": true }).to_string();

        let result = Screenshot::new("RoleInfo".to_string()).run(&host, &run_arg(&param));

        assert_eq!(result, RunResult::SUCCESS);
        let files = saved_files(&dir);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("-unknown.png"));
        let saved = image::open(dir.path().join(&files[0])).unwrap();
        assert_eq!(saved.color(), image::ColorType::L8);
    }

    #[test]
    fn test_screenshot_requires_save_dir() {
        let result = Screenshot::new("RoleInfo".to_string()).run(&MockHost::new(), &run_arg("{}"));
        assert_eq!(result, RunResult::FAILURE);
    }

    #[test]
    fn test_rolename_from_string_param() {
        let data = json!({ "custom_action_param": r#"{"rolename": "Bob"}"# });
        assert_eq!(rolename_from_node(&data).as_deref(), Some("Bob"));
        assert_eq!(rolename_from_node(&json!({})), None);
    }

    #[test]
    fn test_disable_node() {
        let host = MockHost::new();
        let result = DisableNode.run(&host, &run_arg(r#"{"node_name": "Fight"}"#));

        assert_eq!(result, RunResult::SUCCESS);
        assert_eq!(host.overrides(), vec![json!({ "Fight": { "enabled": false } })]);
        assert_eq!(DisableNode.run(&host, &run_arg("{}")), RunResult::FAILURE);
    }

    #[test]
    fn test_node_override() {
        let host = MockHost::new();
        let param = r#"{"A": {"next": ["B"]}, "C": {"enabled": true}}"#;

        assert_eq!(NodeOverride.run(&host, &run_arg(param)), RunResult::SUCCESS);
        assert_eq!(NodeOverride.run(&host, &run_arg("{}")), RunResult::SUCCESS);
        assert_eq!(host.overrides().len(), 1);
        assert_eq!(host.overrides()[0]["A"]["next"][0], "B");
    }

    #[test]
    fn test_reset_count() {
        let store = Arc::new(CountStore::new());
        store.increment("A");
        store.increment("B");
        let action = ResetCount::new(store.clone());
        let host = MockHost::new();

        action.run(&host, &run_arg(r#"{"node_name": "A"}"#));
        assert_eq!(store.increment("A"), 1);
        assert_eq!(store.increment("B"), 2);

        action.run(&host, &run_arg(""));
        assert_eq!(store.increment("B"), 1);
    }

    #[test]
    fn test_random_sleep_duration() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let seconds = RandomSleep::draw_seconds(&mut rng);
            assert!(seconds >= 1.0, "got {}", seconds);
        }
        assert_eq!(remap_short_pause(0.3), 30.0);
        assert_eq!(remap_short_pause(0.6), 20.0);
        assert_eq!(remap_short_pause(0.9), 10.0);
        assert_eq!(remap_short_pause(2.4), 2.4);
    }
}

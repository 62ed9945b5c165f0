//! `OverrideLoginInfo`: points the login pipeline at one role.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::general::finish;
use crate::config::LoginNodes;
use crate::host::{parse_param, Context, CustomAction, RunArg, RunResult};

/// Account, platform and server a role is played on.
#[derive(Debug, Clone, Deserialize)]
struct LoginParams {
    account: String,
    platform: String,
    servername: String,
}

/// Param format: `{ "account": "...", "platform": "...", "servername": "..." }`
pub struct OverrideLoginInfo {
    nodes: LoginNodes,
    template_dir: String,
}

impl OverrideLoginInfo {
    pub fn new(nodes: LoginNodes, template_dir: String) -> Self {
        Self {
            nodes,
            template_dir,
        }
    }

    fn template(&self, name: &str) -> String {
        format!("{}/{}.png", self.template_dir, name)
    }

    fn try_run(&self, ctx: &dyn Context, arg: &RunArg) -> Result<()> {
        let params: LoginParams = serde_json::from_value(parse_param(&arg.custom_action_param)?)
            .context("Invalid OverrideLoginInfo param")?;

        let patches = [
            (&self.nodes.current_account, json!({ "expected": params.account })),
            (&self.nodes.select_account, json!({ "expected": params.account })),
            (&self.nodes.platform_button, json!({ "template": self.template(&params.platform) })),
            (&self.nodes.current_server, json!({ "expected": params.servername })),
            (&self.nodes.select_server, json!({ "template": self.template(&params.servername) })),
        ];
        for (node, patch) in patches {
            let mut overrides = serde_json::Map::new();
            overrides.insert(node.clone(), patch);
            ctx.override_pipeline(&Value::Object(overrides))
                .context(format!("Failed to override {}", node))?;
        }

        crate::log(&format!(
            "Login overridden: account {}, platform {}, server {}",
            params.account, params.platform, params.servername
        ));
        Ok(())
    }
}

impl CustomAction for OverrideLoginInfo {
    fn run(&self, ctx: &dyn Context, arg: &RunArg) -> RunResult {
        finish("OverrideLoginInfo", self.try_run(ctx, arg))
    }
}

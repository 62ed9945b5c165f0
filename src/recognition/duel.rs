//! `DuiYiJingCai`: picks a side in the duel betting screen.
//!
//! Param format: `{ "zhengya": true }`. With `zhengya` (the default) the
//! side with more bets is picked, ties going to red; otherwise the side
//! with fewer bets, ties going to blue.

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::host::{
    parse_param, AnalyzeArg, AnalyzeResult, Context, CustomRecognition, RecoDetail, Rect,
};

/// OCR node reading the red side's bet count.
pub const RED_COUNT_NODE: &str = "J-OCR红方押注人数";
/// OCR node reading the blue side's bet count.
pub const BLUE_COUNT_NODE: &str = "J-OCR蓝方押注人数";

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct DuelParams {
    #[serde(rename = "zhengya", default = "default_true")]
    follow_majority: bool,
}

/// Bet count and its on-screen box for one side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Side {
    count: i64,
    box_: Option<Rect>,
}

impl Side {
    /// Unreadable counts read as 0 with no box.
    fn read(detail: Option<RecoDetail>) -> Self {
        let Some(best) = detail.and_then(|d| d.best_result) else {
            return Side::default();
        };
        match best.text.as_deref().map(str::trim).map(str::parse::<i64>) {
            Some(Ok(count)) => Side {
                count,
                box_: best.box_,
            },
            _ => Side::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DuelBetPick;

impl DuelBetPick {
    pub fn new() -> Self {
        Self
    }

    fn try_analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Result<Option<AnalyzeResult>> {
        let params: DuelParams = serde_json::from_value(parse_param(&arg.custom_recognition_param)?)
            .context("Invalid DuiYiJingCai param")?;

        let red = Side::read(ctx.run_recognition(RED_COUNT_NODE, &arg.image, None)?);
        let blue = Side::read(ctx.run_recognition(BLUE_COUNT_NODE, &arg.image, None)?);
        crate::debug(&format!("Bets red={} blue={}", red.count, blue.count));

        let picked = if params.follow_majority {
            if red.count >= blue.count { red } else { blue }
        } else if red.count < blue.count {
            red
        } else {
            blue
        };

        Ok(picked
            .box_
            .map(|rect| AnalyzeResult::new(rect, picked.count.to_string())))
    }
}

impl CustomRecognition for DuelBetPick {
    fn analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Option<AnalyzeResult> {
        match self.try_analyze(ctx, arg) {
            Ok(result) => result,
            Err(e) => {
                crate::log(&format!("Error: DuiYiJingCai failed: {:#}", e));
                None
            }
        }
    }
}

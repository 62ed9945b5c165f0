//! Breakthrough board: a 3x3 grid of opponents, each won, lost or open.
//!
//! `InitTuPoStatus` scans the grid and records the status of every cell,
//! `IsLastTuPo` matches once at least eight cells are won, and
//! `GetNextTuPo` points at the first cell not yet won. The three share one
//! `BreakthroughBoard`.

use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};

use crate::host::{AnalyzeArg, AnalyzeResult, Context, CustomRecognition, Rect};

/// Matches the "won" marker of the top-left cell.
pub const WON_NODE: &str = "RCO-检测突破成功";
/// Matches the "lost" marker of the top-left cell.
pub const LOST_NODE: &str = "RCO-检测突破失败";

/// Distance between neighbouring cells.
const CELL_STEP_X: i32 = 332;
const CELL_STEP_Y: i32 = 135;
/// Clickable area of the top-left cell.
const FIRST_CELL: Rect = Rect::new(307, 170, 123, 74);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CellStatus {
    #[default]
    Open,
    Won,
    Lost,
}

/// Shared status of the nine cells, row-major.
#[derive(Debug, Default)]
pub struct BreakthroughBoard {
    cells: Mutex<[CellStatus; 9]>,
}

impl BreakthroughBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> [CellStatus; 9] {
        *self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, col: usize, row: usize, status: CellStatus) {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells[col + 3 * row] = status;
    }

    pub fn won_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|s| **s == CellStatus::Won)
            .count()
    }

    /// First cell not yet won, as `(col, row)`.
    pub fn next_open(&self) -> Option<(usize, usize)> {
        self.snapshot()
            .iter()
            .position(|s| *s != CellStatus::Won)
            .map(|index| (index % 3, index / 3))
    }

    /// Recognition result pointing at the next cell to challenge.
    fn next_target(&self) -> Option<AnalyzeResult> {
        let (col, row) = self.next_open()?;
        let rect = Rect::new(
            FIRST_CELL.x + CELL_STEP_X * col as i32,
            FIRST_CELL.y + CELL_STEP_Y * row as i32,
            FIRST_CELL.width,
            FIRST_CELL.height,
        );
        Some(AnalyzeResult::new(rect, format!("({}, {})", col, row)))
    }
}

/// Runs `node` shifted onto cell `(col, row)`.
fn cell_matches(
    ctx: &dyn Context,
    arg: &AnalyzeArg,
    node: &str,
    col: usize,
    row: usize,
) -> Result<bool> {
    let mut shift = serde_json::Map::new();
    shift.insert(
        node.to_string(),
        json!({ "roi_offset": [CELL_STEP_X * col as i32, CELL_STEP_Y * row as i32, 0, 0] }),
    );
    let detail = ctx.run_recognition(node, &arg.image, Some(&serde_json::Value::Object(shift)))?;
    Ok(detail.is_some_and(|d| d.is_hit()))
}

/// `InitTuPoStatus`: scans all nine cells. Always matches with an empty box.
pub struct InitBreakthroughStatus {
    board: Arc<BreakthroughBoard>,
}

impl InitBreakthroughStatus {
    pub fn new(board: Arc<BreakthroughBoard>) -> Self {
        Self { board }
    }

    fn scan(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Result<()> {
        for col in 0..3 {
            for row in 0..3 {
                let status = if cell_matches(ctx, arg, WON_NODE, col, row)? {
                    CellStatus::Won
                } else if cell_matches(ctx, arg, LOST_NODE, col, row)? {
                    CellStatus::Lost
                } else {
                    CellStatus::Open
                };
                self.board.set(col, row, status);
            }
        }
        crate::debug(&format!("Breakthrough board: {:?}", self.board.snapshot()));
        Ok(())
    }
}

impl CustomRecognition for InitBreakthroughStatus {
    fn analyze(&self, ctx: &dyn Context, arg: &AnalyzeArg) -> Option<AnalyzeResult> {
        match self.scan(ctx, arg) {
            Ok(()) => Some(AnalyzeResult::new(Rect::ZERO, "")),
            Err(e) => {
                crate::log(&format!("Error: InitTuPoStatus failed: {:#}", e));
                None
            }
        }
    }
}

/// `IsLastTuPo`: matches the last open cell once eight are won.
pub struct IsLastBreakthrough {
    board: Arc<BreakthroughBoard>,
}

impl IsLastBreakthrough {
    pub fn new(board: Arc<BreakthroughBoard>) -> Self {
        Self { board }
    }
}

impl CustomRecognition for IsLastBreakthrough {
    fn analyze(&self, _ctx: &dyn Context, _arg: &AnalyzeArg) -> Option<AnalyzeResult> {
        if self.board.won_count() >= 8 {
            self.board.next_target()
        } else {
            None
        }
    }
}

/// `GetNextTuPo`: matches the first cell not yet won.
pub struct GetNextBreakthrough {
    board: Arc<BreakthroughBoard>,
}

impl GetNextBreakthrough {
    pub fn new(board: Arc<BreakthroughBoard>) -> Self {
        Self { board }
    }
}

impl CustomRecognition for GetNextBreakthrough {
    fn analyze(&self, _ctx: &dyn Context, _arg: &AnalyzeArg) -> Option<AnalyzeResult> {
        self.board.next_target()
    }
}

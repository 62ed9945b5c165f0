//! Custom recognitions.
//!
//! This module provides:
//! - `MultiRecognition`, composing named recognitions (`composer`, built on
//!   `expr`, `history` and `roi`)
//! - `Count`, the "at most N matches" gate (`count`)
//! - One-off game screens: duel betting (`duel`) and the breakthrough
//!   board (`breakthrough`)

pub mod breakthrough;
pub mod composer;
pub mod count;
pub mod duel;
pub mod expr;
pub mod history;
pub mod roi;

pub use breakthrough::{
    BreakthroughBoard, CellStatus, GetNextBreakthrough, InitBreakthroughStatus, IsLastBreakthrough,
};
pub use composer::{LogicKind, LogicSpec, MultiRecognition, ReturnSpec};
pub use count::{CountGate, CountRecord, CountState, CountStore};
pub use duel::DuelBetPick;

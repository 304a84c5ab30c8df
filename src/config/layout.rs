//! Static screen layout of the game page.
//!
//! Coordinates were measured on a 720x1280 browser viewport and are used as
//! is; per-device geometry is treated as calibrated, not computed.

use serde::{Deserialize, Serialize};

use crate::parser::Decision;

/// A screen-pixel coordinate, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Position {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for [i32; 2] {
    fn from(p: Position) -> Self {
        [p.x, p.y]
    }
}

/// One step of the between-episode page reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStep {
    /// Press BACK, closing a soft keyboard if one popped up.
    Back,
    Tap(Position),
}

/// Browser toolbar control that reloads the game page.
pub const REFRESH_BUTTON: Position = Position::new(380, 130);

/// Tap targets for one game page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Option cards a, b, c from left to right.
    pub cards: [Position; 3],
    /// The "next round" button.
    pub advance: Position,
    pub reset: Vec<ResetStep>,
}

impl Layout {
    /// Layout used when the model plays.
    pub fn play() -> Self {
        let y = 905;
        Self {
            cards: [Position::new(135, y), Position::new(360, y), Position::new(585, y)],
            advance: Position::new(360, 1070),
            reset: vec![ResetStep::Back, ResetStep::Tap(REFRESH_BUTTON)],
        }
    }

    /// Layout used for random data collection. The cards are tapped a little
    /// higher so the soft keyboard is never triggered.
    pub fn collect() -> Self {
        let y = 860;
        Self {
            cards: [Position::new(135, y), Position::new(360, y), Position::new(585, y)],
            advance: Position::new(360, 1040),
            reset: vec![ResetStep::Tap(REFRESH_BUTTON)],
        }
    }

    /// Tap target for a decision.
    pub fn card(&self, decision: Decision) -> Position {
        self.cards[decision.index()]
    }
}

use serde::{Deserialize, Serialize};

use crate::game::GamePhase;
use crate::matrix::Matrix;
use crate::tetromino::Tetromino;
use crate::types::{Cell, PieceKind, Vec2};

/// Immutable copy of everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub tick: u64,
    pub phase: GamePhase,
    pub game_over: bool,
    /// Blocks have reached the top rows of the visible field.
    pub danger: bool,
    pub seed: i64,
    pub rng_state: u32,
    pub matrix: Matrix,
    pub active: Option<Tetromino>,
    pub ghost: Option<Vec2>,
    pub hold: Option<PieceKind>,
    pub can_hold: bool,
    pub next: Vec<PieceKind>,
    pub gravity_counter: u32,
    pub lock_counter: u32,
    pub lock_resets: u32,
    pub pieces_locked: u64,
    pub lines_cleared: u64,
}

impl GameSnapshot {
    pub fn playable(&self) -> bool {
        !self.game_over
    }

    /// Combined cell of the visible field, `row` counted from the top of the
    /// visible region.
    pub fn visible_cell(&self, x: i32, row: i32) -> Option<Cell> {
        self.matrix.cell(x, self.matrix.visible_top() + row)
    }

    pub fn visible_height(&self) -> i32 {
        self.matrix.height() - self.matrix.visible_top()
    }
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            tick: 0,
            phase: GamePhase::NoActivePiece,
            game_over: false,
            danger: false,
            seed: 0,
            rng_state: 0,
            matrix: Matrix::default(),
            active: None,
            ghost: None,
            hold: None,
            can_hold: true,
            next: Vec::new(),
            gravity_counter: 0,
            lock_counter: 0,
            lock_resets: 0,
            pieces_locked: 0,
            lines_cleared: 0,
        }
    }
}

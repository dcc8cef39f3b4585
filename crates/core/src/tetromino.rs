//! Active falling piece

use serde::{Deserialize, Serialize};

use crate::matrix::Matrix;
use crate::pieces::{self, Mask, RotationOutcome, RotationSystem};
use crate::types::{PieceKind, Rotation, RotationDirection, Vec2};

/// A piece in play
///
/// `position` is the top-left corner of the piece's bounding box; the mask is
/// always derived from kind and rotation, so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tetromino {
    kind: PieceKind,
    rotation: Rotation,
    position: Vec2,
}

impl Tetromino {
    /// Place a new piece at the spawn cell in rotation 0
    ///
    /// Returns None when the spawn placement collides (block-out).
    pub fn spawn(kind: PieceKind, spawn_cell: Vec2, matrix: &Matrix) -> Option<Self> {
        let piece = Self {
            kind,
            rotation: Rotation::North,
            position: spawn_cell + pieces::spawn_offset(kind),
        };
        (!matrix.collides(&piece.mask(), piece.position)).then_some(piece)
    }

    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn mask(&self) -> Mask {
        pieces::mask(self.kind, self.rotation)
    }

    /// Absolute matrix cells occupied by the piece.
    pub fn cells(&self) -> [Vec2; 4] {
        self.mask().map(|c| self.position + c)
    }

    /// Translate by `delta` if the destination is free; all-or-nothing.
    pub fn try_move(&mut self, delta: Vec2, matrix: &Matrix) -> bool {
        let target = self.position + delta;
        if matrix.collides(&self.mask(), target) {
            return false;
        }
        self.position = target;
        true
    }

    /// Rotate with kicks; on success the piece takes the outcome's state.
    pub fn rotate(
        &mut self,
        direction: RotationDirection,
        matrix: &Matrix,
        rotation_system: &RotationSystem,
    ) -> Option<RotationOutcome> {
        let outcome = rotation_system.attempt_rotation(self, direction, matrix)?;
        self.rotation = outcome.rotation;
        self.position = outcome.position;
        Some(outcome)
    }

    /// Landing position of a straight drop from here.
    pub fn ghost_position(&self, matrix: &Matrix) -> Vec2 {
        let mask = self.mask();
        let mut at = self.position;
        if matrix.collides(&mask, at) {
            return at;
        }
        while !matrix.collides(&mask, at + Vec2::new(0, 1)) {
            at.y += 1;
        }
        at
    }

    /// Would one more row down collide?
    pub fn is_on_floor(&self, matrix: &Matrix) -> bool {
        matrix.collides(&self.mask(), self.position + Vec2::new(0, 1))
    }
}

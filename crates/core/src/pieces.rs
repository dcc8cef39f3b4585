//! Pieces module - Tetromino shapes and SRS rotation system
//!
//! Shapes are "true rotations" of each piece inside its bounding box (3x3 for
//! J, L, S, T, Z and O, 5x5 for I). Kicks use the offset formulation of SRS:
//! every rotation state owns a list of offsets, and the translation tried on
//! attempt `n` is `offset[from][n] - offset[to][n]`.
//!
//! Offsets are written y-up (the way SRS tables are published); the matrix is
//! y-down, so every kick has its vertical component negated before use.
//!
//! Reference: https://tetris.wiki/SRS

use crate::matrix::Matrix;
use crate::tetromino::Tetromino;
use crate::types::{I180Kicks, PieceKind, Rotation, RotationDirection, Vec2};

/// Shape of a piece - 4 occupied cells relative to the box origin
pub type Mask = [Vec2; 4];

const fn v(x: i32, y: i32) -> Vec2 {
    Vec2::new(x, y)
}

/// Get the mask for a piece kind and rotation
pub fn mask(kind: PieceKind, rotation: Rotation) -> Mask {
    let r = rotation.index();
    match kind {
        PieceKind::I => I_MASKS[r],
        PieceKind::O => O_MASK,
        PieceKind::T => T_MASKS[r],
        PieceKind::S => S_MASKS[r],
        PieceKind::Z => Z_MASKS[r],
        PieceKind::J => J_MASKS[r],
        PieceKind::L => L_MASKS[r],
    }
}

/// Offset from the nominal spawn cell to the piece's box origin.
pub fn spawn_offset(kind: PieceKind) -> Vec2 {
    match kind {
        PieceKind::I => v(-2, -1),
        _ => v(-1, -1),
    }
}

const I_MASKS: [Mask; 4] = [
    [v(1, 2), v(2, 2), v(3, 2), v(4, 2)],
    [v(2, 1), v(2, 2), v(2, 3), v(2, 4)],
    [v(0, 2), v(1, 2), v(2, 2), v(3, 2)],
    [v(2, 0), v(2, 1), v(2, 2), v(2, 3)],
];

const O_MASK: Mask = [v(1, 0), v(2, 0), v(1, 1), v(2, 1)];

const T_MASKS: [Mask; 4] = [
    [v(1, 0), v(0, 1), v(1, 1), v(2, 1)],
    [v(1, 0), v(1, 1), v(2, 1), v(1, 2)],
    [v(0, 1), v(1, 1), v(2, 1), v(1, 2)],
    [v(1, 0), v(0, 1), v(1, 1), v(1, 2)],
];

const S_MASKS: [Mask; 4] = [
    [v(1, 0), v(2, 0), v(0, 1), v(1, 1)],
    [v(1, 0), v(1, 1), v(2, 1), v(2, 2)],
    [v(1, 1), v(2, 1), v(0, 2), v(1, 2)],
    [v(0, 0), v(0, 1), v(1, 1), v(1, 2)],
];

const Z_MASKS: [Mask; 4] = [
    [v(0, 0), v(1, 0), v(1, 1), v(2, 1)],
    [v(2, 0), v(1, 1), v(2, 1), v(1, 2)],
    [v(0, 1), v(1, 1), v(1, 2), v(2, 2)],
    [v(1, 0), v(0, 1), v(1, 1), v(0, 2)],
];

const J_MASKS: [Mask; 4] = [
    [v(0, 0), v(0, 1), v(1, 1), v(2, 1)],
    [v(1, 0), v(2, 0), v(1, 1), v(1, 2)],
    [v(0, 1), v(1, 1), v(2, 1), v(2, 2)],
    [v(1, 0), v(1, 1), v(0, 2), v(1, 2)],
];

const L_MASKS: [Mask; 4] = [
    [v(2, 0), v(0, 1), v(1, 1), v(2, 1)],
    [v(1, 0), v(1, 1), v(1, 2), v(2, 2)],
    [v(0, 1), v(1, 1), v(2, 1), v(0, 2)],
    [v(0, 0), v(1, 0), v(1, 1), v(1, 2)],
];

/// Number of kick attempts for quarter turns.
pub const QUARTER_TURN_ATTEMPTS: usize = 5;

/// Number of kick attempts for half turns.
pub const HALF_TURN_ATTEMPTS: usize = 12;

type QuarterTable = [[Vec2; QUARTER_TURN_ATTEMPTS]; 4];
type HalfTable = [[Vec2; HALF_TURN_ATTEMPTS]; 4];

/// JLSTZ offsets (shared by J, L, S, T, Z)
const JLSTZ_OFFSETS: QuarterTable = [
    [v(0, 0), v(0, 0), v(0, 0), v(0, 0), v(0, 0)],
    [v(0, 0), v(1, 0), v(1, -1), v(0, 2), v(1, 2)],
    [v(0, 0), v(0, 0), v(0, 0), v(0, 0), v(0, 0)],
    [v(0, 0), v(-1, 0), v(-1, -1), v(0, 2), v(-1, 2)],
];

const I_OFFSETS: QuarterTable = [
    [v(0, 0), v(-1, 0), v(2, 0), v(-1, 0), v(2, 0)],
    [v(-1, 0), v(0, 0), v(0, 0), v(0, 1), v(0, -2)],
    [v(-1, 1), v(1, 1), v(-2, 1), v(1, 0), v(-2, 0)],
    [v(0, 1), v(0, 1), v(0, 1), v(0, -1), v(0, 2)],
];

/// O never needs to move: its mask is identical in every state.
const O_OFFSETS: [[Vec2; 1]; 4] = [[v(0, 0)]; 4];

const JLSTZ_180_OFFSETS: HalfTable = [
    [
        v(0, 0),
        v(0, 1),
        v(1, 1),
        v(-1, 1),
        v(1, 0),
        v(-1, 0),
        v(0, -1),
        v(1, -1),
        v(-1, -1),
        v(0, 2),
        v(1, 2),
        v(-1, 2),
    ],
    [
        v(0, 0),
        v(1, 0),
        v(1, 2),
        v(1, 1),
        v(0, 2),
        v(0, 1),
        v(-1, 0),
        v(-1, 2),
        v(-1, 1),
        v(2, 0),
        v(2, 1),
        v(-2, 0),
    ],
    [v(0, 0); HALF_TURN_ATTEMPTS],
    [v(0, 0); HALF_TURN_ATTEMPTS],
];

// I-piece 180° offsets as shipped: horizontal states wobble sideways first,
// vertical states wobble up and down first. The author of the data suspected
// the two axes are swapped; both readings are kept and selected by
// `I180Kicks`. States 2 and L hold the constant box correction.
const I_180_LEGACY_OFFSETS: HalfTable = [
    [
        v(0, 0),
        v(1, 0),
        v(-1, 0),
        v(2, 0),
        v(-2, 0),
        v(0, 1),
        v(1, 1),
        v(-1, 1),
        v(0, -1),
        v(1, -1),
        v(-1, -1),
        v(0, 2),
    ],
    [
        v(-1, 0),
        v(-1, 1),
        v(-1, -1),
        v(-1, 2),
        v(-1, -2),
        v(0, 0),
        v(0, 1),
        v(-2, 1),
        v(0, -1),
        v(-2, -1),
        v(-2, 0),
        v(1, 0),
    ],
    [v(-1, 1); HALF_TURN_ATTEMPTS],
    [v(0, 1); HALF_TURN_ATTEMPTS],
];

const I_180_AXIS_SWAPPED_OFFSETS: HalfTable = [
    [
        v(0, 0),
        v(0, 1),
        v(0, -1),
        v(0, 2),
        v(0, -2),
        v(1, 0),
        v(1, 1),
        v(-1, 1),
        v(1, -1),
        v(-1, -1),
        v(-1, 0),
        v(2, 0),
    ],
    [
        v(-1, 0),
        v(0, 0),
        v(-2, 0),
        v(1, 0),
        v(-3, 0),
        v(-1, 1),
        v(0, 1),
        v(-2, 1),
        v(-1, -1),
        v(0, -1),
        v(-2, -1),
        v(-1, 2),
    ],
    [v(-1, 1); HALF_TURN_ATTEMPTS],
    [v(0, 1); HALF_TURN_ATTEMPTS],
];

/// Offset list of one rotation state.
pub fn offsets(
    kind: PieceKind,
    direction: RotationDirection,
    state: Rotation,
    i_180: I180Kicks,
) -> &'static [Vec2] {
    let s = state.index();
    match (direction, kind) {
        (_, PieceKind::O) => &O_OFFSETS[s],
        (RotationDirection::Half, PieceKind::I) => match i_180 {
            I180Kicks::Legacy => &I_180_LEGACY_OFFSETS[s],
            I180Kicks::AxisSwapped => &I_180_AXIS_SWAPPED_OFFSETS[s],
        },
        (RotationDirection::Half, _) => &JLSTZ_180_OFFSETS[s],
        (_, PieceKind::I) => &I_OFFSETS[s],
        _ => &JLSTZ_OFFSETS[s],
    }
}

/// Successful rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOutcome {
    pub rotation: Rotation,
    pub position: Vec2,
    /// Index of the kick attempt that fit.
    pub attempt: usize,
    /// Translation applied (grid coordinates).
    pub kick: Vec2,
}

/// SRS kick resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSystem {
    allow_180: bool,
    i_180: I180Kicks,
}

impl RotationSystem {
    pub fn new(allow_180: bool, i_180: I180Kicks) -> Self {
        Self { allow_180, i_180 }
    }

    pub fn allows(&self, direction: RotationDirection) -> bool {
        direction != RotationDirection::Half || self.allow_180
    }

    /// How many placements are tried for this kind of turn.
    pub fn attempt_count(&self, direction: RotationDirection, kind: PieceKind) -> usize {
        offsets(kind, direction, Rotation::North, self.i_180).len()
    }

    /// Grid translation tried on `attempt`, or None past the end of the table.
    pub fn kick(
        &self,
        direction: RotationDirection,
        kind: PieceKind,
        from: Rotation,
        to: Rotation,
        attempt: usize,
    ) -> Option<Vec2> {
        let from_offsets = offsets(kind, direction, from, self.i_180);
        let to_offsets = offsets(kind, direction, to, self.i_180);
        let offset = *from_offsets.get(attempt)? - *to_offsets.get(attempt)?;
        Some(offset.flip_y())
    }

    /// Find the first kicked placement of the turned piece that fits
    ///
    /// Returns None when every attempt collides; the piece is not touched
    /// either way.
    pub fn attempt_rotation(
        &self,
        piece: &Tetromino,
        direction: RotationDirection,
        matrix: &Matrix,
    ) -> Option<RotationOutcome> {
        if !self.allows(direction) {
            return None;
        }

        let from = piece.rotation();
        let to = from.rotated(direction);
        let rotated = mask(piece.kind(), to);

        (0..self.attempt_count(direction, piece.kind())).find_map(|attempt| {
            let kick = self.kick(direction, piece.kind(), from, to, attempt)?;
            let position = piece.position() + kick;
            (!matrix.collides(&rotated, position)).then_some(RotationOutcome {
                rotation: to,
                position,
                attempt,
                kick,
            })
        })
    }
}

impl Default for RotationSystem {
    fn default() -> Self {
        Self::new(true, I180Kicks::Legacy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotate_cw(mask: Mask, size: i32) -> Mask {
        mask.map(|c| v(size - 1 - c.y, c.x))
    }

    fn sorted(mut mask: Mask) -> Mask {
        mask.sort_by_key(|c| (c.y, c.x));
        mask
    }

    #[test]
    fn test_masks_are_true_rotations() {
        for kind in [
            PieceKind::T,
            PieceKind::S,
            PieceKind::Z,
            PieceKind::J,
            PieceKind::L,
            PieceKind::I,
        ] {
            let size = if kind == PieceKind::I { 5 } else { 3 };
            for r in 0..4 {
                let from = mask(kind, Rotation::from_index(r));
                let to = mask(kind, Rotation::from_index(r + 1));
                assert_eq!(
                    sorted(rotate_cw(from, size)),
                    sorted(to),
                    "{kind:?} {r} -> {}",
                    r + 1
                );
            }
        }
    }

    #[test]
    fn test_attempt_counts() {
        let srs = RotationSystem::default();
        assert_eq!(srs.attempt_count(RotationDirection::Clockwise, PieceKind::T), 5);
        assert_eq!(srs.attempt_count(RotationDirection::CounterClockwise, PieceKind::I), 5);
        assert_eq!(srs.attempt_count(RotationDirection::Half, PieceKind::S), 12);
        assert_eq!(srs.attempt_count(RotationDirection::Half, PieceKind::I), 12);
        assert_eq!(srs.attempt_count(RotationDirection::Clockwise, PieceKind::O), 1);
    }

    #[test]
    fn test_jlstz_kicks_match_published_srs() {
        let srs = RotationSystem::default();
        // Published 0->R tests in y-up notation: (0,0) (-1,0) (-1,+1) (0,-2) (-1,-2)
        let published = [v(0, 0), v(-1, 0), v(-1, 1), v(0, -2), v(-1, -2)];
        for (attempt, expected) in published.iter().enumerate() {
            let kick = srs
                .kick(
                    RotationDirection::Clockwise,
                    PieceKind::T,
                    Rotation::North,
                    Rotation::East,
                    attempt,
                )
                .unwrap();
            assert_eq!(kick, expected.flip_y());
        }
    }

    #[test]
    fn test_i_quarter_kicks_include_box_correction() {
        let srs = RotationSystem::default();
        // 0->R relative to the first placement: (-2,0) (+1,0) (-2,-1) (+1,+2) in y-up notation.
        let first = srs
            .kick(
                RotationDirection::Clockwise,
                PieceKind::I,
                Rotation::North,
                Rotation::East,
                0,
            )
            .unwrap();
        assert_eq!(first, v(1, 0));
        let relative: Vec<Vec2> = (1..5)
            .map(|a| {
                srs.kick(
                    RotationDirection::Clockwise,
                    PieceKind::I,
                    Rotation::North,
                    Rotation::East,
                    a,
                )
                .unwrap()
                    - first
            })
            .collect();
        assert_eq!(
            relative,
            vec![v(-2, 0), v(1, 0), v(-2, 1), v(1, -2)],
        );
    }

    #[test]
    fn test_kick_past_table_end_is_none() {
        let srs = RotationSystem::default();
        assert!(srs
            .kick(
                RotationDirection::Clockwise,
                PieceKind::O,
                Rotation::North,
                Rotation::East,
                1
            )
            .is_none());
    }

    #[test]
    fn test_half_turn_disabled() {
        let srs = RotationSystem::new(false, I180Kicks::Legacy);
        let matrix = Matrix::default();
        let piece = Tetromino::spawn(PieceKind::T, v(4, 18), &matrix).unwrap();
        assert!(srs
            .attempt_rotation(&piece, RotationDirection::Half, &matrix)
            .is_none());
    }
}

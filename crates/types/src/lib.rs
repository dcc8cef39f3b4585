//! Core types module - shared data structures and constants
//!
//! This module defines the fundamental types used throughout the engine.
//! Everything here is plain data: the simulation (`four-core`), the input
//! pipeline (`four-input`) and the runtime (`four-engine`) all speak in these
//! terms, and none of them reach for ambient/global settings.
//!
//! # Coordinates
//!
//! Grid coordinates are `(x, y)` with `x` growing to the right and `y` growing
//! **downward**. The default matrix is 10 columns by 40 rows; the bottom 20
//! rows are the visible field and the rows above are the spawn buffer.
//!
//! # Timing defaults
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `DEFAULT_TICKS_PER_SECOND` | 256 | Logic loop rate |
//! | `DEFAULT_POLLS_PER_SECOND` | 1000 | Input polling rate |
//! | `DEFAULT_DAS_MS` | 167 | Delay before auto-repeat starts |
//! | `DEFAULT_ARR_MS` | 33 | Interval between auto-repeats |
//! | `DEFAULT_LOCK_DELAY_TICKS` | 128 | Grounded ticks before a piece locks |
//! | `DEFAULT_LOCK_RESET_LIMIT` | 15 | Lock-delay resets per piece |
//!
//! # Examples
//!
//! ```
//! use four_types::{PieceKind, Rotation, RotationDirection, Vec2};
//!
//! let kind = PieceKind::from_str("t").unwrap();
//! assert_eq!(kind, PieceKind::T);
//! assert_eq!(kind.code(), 3);
//!
//! let rotation = Rotation::North.rotated(RotationDirection::Clockwise);
//! assert_eq!(rotation, Rotation::East);
//!
//! assert_eq!(Vec2::new(1, 2) + Vec2::new(3, -1), Vec2::new(4, 1));
//! ```

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

pub mod config;

pub use config::{
    Config, ConfigError, DirectionPriority, GameConfig, HandlingConfig, I180Kicks, TimingConfig,
};

/// Default matrix width in cells.
pub const DEFAULT_MATRIX_WIDTH: i32 = 10;

/// Default matrix height in cells, spawn buffer included.
pub const DEFAULT_MATRIX_HEIGHT: i32 = 40;

/// Default number of visible rows at the bottom of the matrix.
pub const DEFAULT_VISIBLE_HEIGHT: i32 = 20;

/// Default number of upcoming pieces kept in the queue.
pub const DEFAULT_PREVIEW_COUNT: usize = 5;

/// Logic ticks per second.
pub const DEFAULT_TICKS_PER_SECOND: u32 = 256;

/// Input polls per second.
pub const DEFAULT_POLLS_PER_SECOND: u32 = 1000;

/// Delayed auto shift in milliseconds.
pub const DEFAULT_DAS_MS: u32 = 167;

/// Auto repeat rate in milliseconds (0 = instant).
pub const DEFAULT_ARR_MS: u32 = 33;

/// Soft drop factor (0 = instant drop to the floor).
pub const DEFAULT_SOFT_DROP_FACTOR: u32 = 20;

/// Gravity: logic ticks per row (one row per second at 256 Hz).
pub const DEFAULT_GRAVITY_TICKS: u32 = 256;

/// Lock delay in logic ticks (500ms at 256 Hz).
pub const DEFAULT_LOCK_DELAY_TICKS: u32 = 128;

/// Maximum number of lock-delay resets per piece.
pub const DEFAULT_LOCK_RESET_LIMIT: u32 = 15;

/// Hard-drop suppression window after an automatic lock.
pub const DEFAULT_HARD_DROP_GUARD_MS: u32 = 100;

/// Cell value stored in the matrix.
///
/// `0` is empty, `1..=7` is a locked or active piece code, negative values
/// are ghost markers (`-code`).
pub type Cell = i8;

/// Empty cell value.
pub const EMPTY: Cell = 0;

/// Integer 2D point/offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Same offset with the vertical component negated.
    ///
    /// Kick tables are written y-up; the grid is y-down.
    pub const fn flip_y(self) -> Self {
        Self {
            x: self.x,
            y: -self.y,
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

impl Mul<i32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: i32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// The seven tetromino piece kinds
///
/// The declaration order is the order of a freshly created bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    /// All kinds in bag order.
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    /// Parse piece kind from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "i" => Some(PieceKind::I),
            "o" => Some(PieceKind::O),
            "t" => Some(PieceKind::T),
            "s" => Some(PieceKind::S),
            "z" => Some(PieceKind::Z),
            "j" => Some(PieceKind::J),
            "l" => Some(PieceKind::L),
            _ => None,
        }
    }

    /// Convert to lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            PieceKind::I => "i",
            PieceKind::O => "o",
            PieceKind::T => "t",
            PieceKind::S => "s",
            PieceKind::Z => "z",
            PieceKind::J => "j",
            PieceKind::L => "l",
        }
    }

    /// Cell code written into the matrix (1..=7).
    pub fn code(&self) -> Cell {
        match self {
            PieceKind::I => 1,
            PieceKind::O => 2,
            PieceKind::T => 3,
            PieceKind::S => 4,
            PieceKind::Z => 5,
            PieceKind::J => 6,
            PieceKind::L => 7,
        }
    }

    /// Inverse of [`PieceKind::code`]; ghost markers map to their piece.
    pub fn from_code(code: Cell) -> Option<Self> {
        match code.unsigned_abs() {
            1 => Some(PieceKind::I),
            2 => Some(PieceKind::O),
            3 => Some(PieceKind::T),
            4 => Some(PieceKind::S),
            5 => Some(PieceKind::Z),
            6 => Some(PieceKind::J),
            7 => Some(PieceKind::L),
            _ => None,
        }
    }
}

/// Rotation states (North = spawn orientation, SRS states 0..=3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    North,
    East,
    South,
    West,
}

impl Rotation {
    /// SRS state index: 0 = spawn, 1 = right, 2 = reverse, 3 = left.
    pub fn index(&self) -> usize {
        match self {
            Rotation::North => 0,
            Rotation::East => 1,
            Rotation::South => 2,
            Rotation::West => 3,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 4 {
            0 => Rotation::North,
            1 => Rotation::East,
            2 => Rotation::South,
            _ => Rotation::West,
        }
    }

    /// Rotate clockwise
    pub fn rotate_cw(&self) -> Self {
        Self::from_index(self.index() + 1)
    }

    /// Rotate counter-clockwise
    pub fn rotate_ccw(&self) -> Self {
        Self::from_index(self.index() + 3)
    }

    pub fn rotate_180(&self) -> Self {
        Self::from_index(self.index() + 2)
    }

    pub fn rotated(&self, direction: RotationDirection) -> Self {
        match direction {
            RotationDirection::Clockwise => self.rotate_cw(),
            RotationDirection::CounterClockwise => self.rotate_ccw(),
            RotationDirection::Half => self.rotate_180(),
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Rotation::North => "north",
            Rotation::East => "east",
            Rotation::South => "south",
            Rotation::West => "west",
        }
    }
}

/// Requested turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationDirection {
    Clockwise,
    CounterClockwise,
    Half,
}

/// Horizontal movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Unit step in grid coordinates.
    pub fn offset(&self) -> Vec2 {
        match self {
            Direction::Left => Vec2::new(-1, 0),
            Direction::Right => Vec2::new(1, 0),
        }
    }
}

/// Discrete game actions produced by the handling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    MoveLeft,
    MoveRight,
    RotateCw,
    RotateCcw,
    Rotate180,
    Hold,
    HardDrop,
    SoftDropStart,
    SoftDropStop,
    Restart,
}

impl Action {
    pub fn moving(direction: Direction) -> Self {
        match direction {
            Direction::Left => Action::MoveLeft,
            Direction::Right => Action::MoveRight,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::MoveLeft => "moveLeft",
            Action::MoveRight => "moveRight",
            Action::RotateCw => "rotateCw",
            Action::RotateCcw => "rotateCcw",
            Action::Rotate180 => "rotate180",
            Action::Hold => "hold",
            Action::HardDrop => "hardDrop",
            Action::SoftDropStart => "softDropStart",
            Action::SoftDropStop => "softDropStop",
            Action::Restart => "restart",
        }
    }
}

/// An action stamped with the poll tick that emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimedAction {
    pub action: Action,
    pub poll: u64,
}

impl TimedAction {
    pub fn new(action: Action, poll: u64) -> Self {
        Self { action, poll }
    }
}

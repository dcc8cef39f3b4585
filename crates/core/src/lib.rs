//! Core game logic - pure, deterministic, and testable
//!
//! This crate contains the rules and the simulation. It does no I/O and keeps
//! no clocks of its own: time advances only through [`Game::tick`], so the same
//! seed and the same action stream always produce the same game.
//!
//! # Module Structure
//!
//! - [`rng`]: Park-Miller generator, bit-exact across platforms
//! - [`queue`]: 7-bag piece queue with a preview window
//! - [`matrix`]: playfield with locked, active and ghost layers
//! - [`pieces`]: piece masks and SRS kick tables (90° and 180°)
//! - [`tetromino`]: the active piece and its movement primitives
//! - [`game`]: per-tick state machine (spawn, gravity, lock delay, hold)
//! - [`snapshot`]: serializable copy of the state for renderers
//!
//! # Example
//!
//! ```
//! use four_core::{Game, GamePhase};
//! use four_core::types::{Action, GameConfig};
//!
//! let mut game = Game::new(GameConfig::default());
//! game.tick([]);
//! assert_eq!(game.phase(), GamePhase::PieceFalling);
//!
//! game.tick([Action::MoveLeft, Action::HardDrop]);
//! assert_eq!(game.pieces_locked(), 1);
//! ```

pub mod game;
pub mod matrix;
pub mod pieces;
pub mod queue;
pub mod rng;
pub mod snapshot;
pub mod tetromino;

pub use four_types as types;

pub use game::{Game, GameEvent, GamePhase, TopOutReason};
pub use matrix::{Grid, Layer, LineClear, Matrix};
pub use pieces::{RotationOutcome, RotationSystem};
pub use queue::{PieceQueue, QueueError};
pub use rng::Rng;
pub use snapshot::GameSnapshot;
pub use tetromino::Tetromino;

//! Input handling (engine-facing).
//!
//! Independent of any UI framework apart from `crossterm`'s key codes. Raw key
//! levels go in as [`KeySnapshot`]s; [`HandlingEngine`] turns them into
//! time-stamped actions with DAS/ARR auto-shift. [`map`] adapts terminal key
//! events, including terminals without key-release events.

pub mod handling;
pub mod keys;
pub mod map;

pub use four_types as types;

pub use handling::{ControlEdges, DirectionTimer, HandlingEngine, PollActions};
pub use keys::{BindingsError, Control, KeyBindings, KeySnapshot};
pub use map::{normalize, should_quit, KeyTracker};

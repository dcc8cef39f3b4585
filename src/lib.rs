//! Four (workspace facade crate).
//!
//! Re-exports the workspace crates under short names so integration tests,
//! benches and the `four` binary can use `four::{core,engine,input,types}`.

pub use four_core as core;
pub use four_engine as engine;
pub use four_input as input;
pub use four_types as types;

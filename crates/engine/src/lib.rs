//! Runtime for the engine: fixed-rate loops and the session that owns them.
//!
//! [`Session::start`] spawns a logic thread (game ticks) and a poll thread
//! (DAS/ARR handling), each driven by a [`TickScheduler`] and wrapped in
//! [`supervise`] so a single fault restarts the loop instead of ending the
//! game.
//!
//! ```no_run
//! use four_engine::Session;
//! use four_input::KeyBindings;
//! use four_types::Config;
//!
//! let mut session = Session::start(Config::default(), KeyBindings::default())?;
//! let snapshot = session.snapshot();
//! println!("tick {}", snapshot.tick);
//! for event in session.drain_events() {
//!     println!("{event:?}");
//! }
//! session.join()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod metrics;
pub mod scheduler;
pub mod session;
pub mod supervisor;

pub use metrics::LoopMetrics;
pub use scheduler::{plan_ticks, TickPlan, TickScheduler};
pub use session::{Session, LOGIC_THREAD_NAME, POLL_THREAD_NAME};
pub use supervisor::{supervise, LoopError};

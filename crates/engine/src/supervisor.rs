//! Restart policy for loop threads
//!
//! A loop body that returns an error or panics is logged and entered again.
//! Two faults closer together than the minimum restart interval end the
//! session instead.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("{name} loop faulted twice within {interval:?}; last fault: {last}")]
    RestartStorm {
        name: &'static str,
        interval: Duration,
        last: String,
    },
    #[error("failed to spawn {name} loop thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} loop thread panicked outside its supervisor")]
    Join { name: &'static str },
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Run `body` until it returns `Ok`, restarting it after faults
///
/// `body` receives the attempt number (0 for the first run) so it can rebuild
/// its per-run state. On a restart storm the shared `exited` flag is raised so
/// the sibling loop stops too.
pub fn supervise<F>(
    name: &'static str,
    exited: &AtomicBool,
    min_restart_interval: Duration,
    mut body: F,
) -> Result<(), LoopError>
where
    F: FnMut(u32) -> anyhow::Result<()>,
{
    let mut attempt = 0u32;
    let mut last_fault: Option<Instant> = None;

    loop {
        let fault = match panic::catch_unwind(AssertUnwindSafe(|| body(attempt))) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        error!(loop_name = name, attempt, fault = %fault, "loop_fault");

        let now = Instant::now();
        if let Some(previous) = last_fault {
            if now.saturating_duration_since(previous) < min_restart_interval {
                exited.store(true, Ordering::Release);
                error!(loop_name = name, "loop_restart_storm");
                return Err(LoopError::RestartStorm {
                    name,
                    interval: min_restart_interval,
                    last: fault,
                });
            }
        }
        last_fault = Some(now);

        if exited.load(Ordering::Acquire) {
            return Ok(());
        }
        attempt += 1;
        info!(loop_name = name, attempt, "loop_restarting");
    }
}

//! Two-thread session runtime
//!
//! The poll thread owns the [`HandlingEngine`] and runs at the poll rate. The
//! logic thread owns the [`Game`] and runs at the tick rate. Actions flow from
//! poll to logic over an mpsc channel; snapshots and metrics come back over
//! watch channels. Neither thread shares mutable state with the other apart
//! from the exit flag and the auto-lock counter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use four_core::{Game, GameEvent, GameSnapshot};
use four_input::{HandlingEngine, KeyBindings, KeySnapshot};
use four_types::{Action, Config, TimedAction};

use crate::metrics::LoopMetrics;
use crate::scheduler::TickScheduler;
use crate::supervisor::{supervise, LoopError};

pub const LOGIC_THREAD_NAME: &str = "four-logic";
pub const POLL_THREAD_NAME: &str = "four-poll";

/// State shared by both loops
#[derive(Debug, Default)]
struct Shared {
    exited: AtomicBool,
    /// Bumped by the logic loop on every automatic lock.
    auto_locks: AtomicU64,
}

impl Shared {
    fn exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}

struct LogicLoop {
    config: Config,
    shared: Arc<Shared>,
    actions_rx: mpsc::UnboundedReceiver<TimedAction>,
    events_tx: mpsc::UnboundedSender<GameEvent>,
    snapshot_tx: watch::Sender<GameSnapshot>,
    metrics_tx: watch::Sender<LoopMetrics>,
}

impl LogicLoop {
    fn run(self) -> Result<(), LoopError> {
        let LogicLoop {
            config,
            shared,
            mut actions_rx,
            events_tx,
            snapshot_tx,
            metrics_tx,
        } = self;

        let mut game = Game::new(config.game.clone());
        let mut metrics = LoopMetrics::default();
        let mut batch: Vec<Action> = Vec::new();
        info!(seed = config.game.seed, "logic_loop_started");

        supervise(
            "logic",
            &shared.exited,
            config.timing.min_restart_interval(),
            |attempt| {
                if attempt > 0 {
                    metrics.record_restart();
                }
                let mut scheduler = TickScheduler::new(
                    "logic",
                    config.timing.tick_interval(),
                    config.timing.max_ticks_per_iteration,
                );

                while !shared.exited() {
                    let started = Instant::now();
                    let plan = scheduler.advance(started);
                    if plan.dropped_backlog > Duration::ZERO {
                        metrics.record_clamp(plan.dropped_backlog);
                    }

                    for _ in 0..plan.ticks {
                        batch.clear();
                        while let Ok(timed) = actions_rx.try_recv() {
                            batch.push(timed.action);
                        }
                        metrics.record_actions(batch.len());
                        game.tick(batch.drain(..));

                        for event in game.take_events() {
                            if matches!(event, GameEvent::Locked { auto: true, .. }) {
                                shared.auto_locks.fetch_add(1, Ordering::AcqRel);
                            }
                            // The session may have stopped draining; that is not a fault.
                            let _ = events_tx.send(event);
                        }
                    }

                    if plan.ticks > 0 {
                        metrics.record_ticks(plan.ticks);
                        snapshot_tx.send_replace(game.snapshot());
                    }
                    metrics.record_iteration(started.elapsed());
                    metrics_tx.send_replace(metrics);

                    thread::sleep(scheduler.time_until_next_tick());
                }
                Ok(())
            },
        )?;

        info!(
            ticks = metrics.ticks,
            pieces = game.pieces_locked(),
            "logic_loop_stopped"
        );
        Ok(())
    }
}

struct PollLoop {
    config: Config,
    bindings: KeyBindings,
    shared: Arc<Shared>,
    keys_rx: mpsc::UnboundedReceiver<KeySnapshot>,
    actions_tx: mpsc::UnboundedSender<TimedAction>,
    metrics_tx: watch::Sender<LoopMetrics>,
}

impl PollLoop {
    fn run(self) -> Result<(), LoopError> {
        let PollLoop {
            config,
            bindings,
            shared,
            mut keys_rx,
            actions_tx,
            metrics_tx,
        } = self;

        let interval = config.timing.poll_interval();
        let mut handling = HandlingEngine::new(config.handling.clone(), interval, bindings);
        let mut metrics = LoopMetrics::default();
        let mut seen_auto_locks = 0u64;
        info!(
            das_ticks = handling.das_ticks(),
            arr_ticks = handling.arr_ticks(),
            "poll_loop_started"
        );

        supervise(
            "poll",
            &shared.exited,
            config.timing.min_restart_interval(),
            |attempt| {
                if attempt > 0 {
                    metrics.record_restart();
                    handling.reset();
                }
                let mut scheduler = TickScheduler::new(
                    "poll",
                    interval,
                    config.timing.max_polls_per_iteration,
                );

                while !shared.exited() {
                    let started = Instant::now();
                    let plan = scheduler.advance(started);
                    if plan.dropped_backlog > Duration::ZERO {
                        metrics.record_clamp(plan.dropped_backlog);
                    }

                    if plan.ticks > 0 {
                        let mut refresh: Option<KeySnapshot> = None;
                        while let Ok(snapshot) = keys_rx.try_recv() {
                            match refresh.as_mut() {
                                Some(merged) => merged.merge(snapshot),
                                None => refresh = Some(snapshot),
                            }
                        }

                        let auto_locks = shared.auto_locks.load(Ordering::Acquire);
                        if auto_locks != seen_auto_locks {
                            seen_auto_locks = auto_locks;
                            handling.note_auto_lock();
                        }

                        for i in 0..plan.ticks {
                            let fresh = if i == 0 { refresh.as_ref() } else { None };
                            let actions = handling.poll(fresh, interval);
                            metrics.record_actions(actions.len());
                            for action in actions {
                                if actions_tx.send(action).is_err() {
                                    debug!("logic_loop_gone");
                                    return Ok(());
                                }
                            }
                        }
                        metrics.record_ticks(plan.ticks);
                    }
                    metrics.record_iteration(started.elapsed());
                    metrics_tx.send_replace(metrics);

                    thread::sleep(scheduler.time_until_next_tick());
                }
                Ok(())
            },
        )?;

        info!(polls = handling.poll_count(), "poll_loop_stopped");
        Ok(())
    }
}

fn spawn_loop<F>(name: &'static str, body: F) -> Result<JoinHandle<Result<(), LoopError>>, LoopError>
where
    F: FnOnce() -> Result<(), LoopError> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| LoopError::Spawn { name, source })
}

fn join_loop(
    name: &'static str,
    handle: Option<JoinHandle<Result<(), LoopError>>>,
) -> Result<(), LoopError> {
    match handle {
        Some(handle) => handle.join().map_err(|_| LoopError::Join { name })?,
        None => Ok(()),
    }
}

/// A running game: one logic thread plus one input polling thread
///
/// Dropping a session stops both threads.
pub struct Session {
    shared: Arc<Shared>,
    keys_tx: mpsc::UnboundedSender<KeySnapshot>,
    events_rx: mpsc::UnboundedReceiver<GameEvent>,
    snapshot_rx: watch::Receiver<GameSnapshot>,
    logic_metrics_rx: watch::Receiver<LoopMetrics>,
    poll_metrics_rx: watch::Receiver<LoopMetrics>,
    logic: Option<JoinHandle<Result<(), LoopError>>>,
    poll: Option<JoinHandle<Result<(), LoopError>>>,
}

impl Session {
    /// Validate `config` and start both loops.
    pub fn start(config: Config, bindings: KeyBindings) -> Result<Self> {
        config.validate().context("invalid session config")?;

        let shared = Arc::new(Shared::default());
        let (keys_tx, keys_rx) = mpsc::unbounded_channel();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Game::new(config.game.clone()).snapshot());
        let (logic_metrics_tx, logic_metrics_rx) = watch::channel(LoopMetrics::default());
        let (poll_metrics_tx, poll_metrics_rx) = watch::channel(LoopMetrics::default());

        let logic = LogicLoop {
            config: config.clone(),
            shared: Arc::clone(&shared),
            actions_rx,
            events_tx,
            snapshot_tx,
            metrics_tx: logic_metrics_tx,
        };
        let logic = spawn_loop(LOGIC_THREAD_NAME, move || logic.run())?;

        let poll = PollLoop {
            config,
            bindings,
            shared: Arc::clone(&shared),
            keys_rx,
            actions_tx,
            metrics_tx: poll_metrics_tx,
        };
        let poll = match spawn_loop(POLL_THREAD_NAME, move || poll.run()) {
            Ok(handle) => handle,
            Err(err) => {
                shared.exited.store(true, Ordering::Release);
                let _ = logic.join();
                return Err(err.into());
            }
        };

        Ok(Self {
            shared,
            keys_tx,
            events_rx,
            snapshot_rx,
            logic_metrics_rx,
            poll_metrics_rx,
            logic: Some(logic),
            poll: Some(poll),
        })
    }

    /// Hand a key-level change to the poll thread; false once it has stopped.
    pub fn send_keys(&self, snapshot: KeySnapshot) -> bool {
        self.keys_tx.send(snapshot).is_ok()
    }

    /// Latest state published by the logic thread.
    pub fn snapshot(&self) -> GameSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn logic_metrics(&self) -> LoopMetrics {
        *self.logic_metrics_rx.borrow()
    }

    pub fn poll_metrics(&self) -> LoopMetrics {
        *self.poll_metrics_rx.borrow()
    }

    /// Events emitted since the previous call, oldest first.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn is_running(&self) -> bool {
        !self.shared.exited()
    }

    /// Ask both loops to stop after their current iteration.
    pub fn request_exit(&self) {
        self.shared.exited.store(true, Ordering::Release);
    }

    /// Stop both loops and wait for them, reporting the first failure.
    pub fn join(mut self) -> Result<()> {
        self.request_exit();
        let logic = join_loop("logic", self.logic.take());
        let poll = join_loop("poll", self.poll.take());
        logic.context("logic loop failed")?;
        poll.context("poll loop failed")?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.request_exit();
        let _ = join_loop("logic", self.logic.take());
        let _ = join_loop("poll", self.poll.take());
    }
}

//! Game module - the per-tick simulation
//!
//! [`Game`] owns the matrix, the piece queue and the active piece. The logic
//! loop calls [`Game::tick`] once per fixed tick with whatever actions arrived
//! since the previous tick; everything else is driven by tick counters.

use std::collections::VecDeque;
use std::mem;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::matrix::{Layer, LineClear, Matrix};
use crate::pieces::RotationSystem;
use crate::queue::PieceQueue;
use crate::snapshot::GameSnapshot;
use crate::tetromino::Tetromino;
use crate::types::{Action, Direction, GameConfig, PieceKind, Rotation, RotationDirection, Vec2};

const DOWN: Vec2 = Vec2::new(0, 1);

/// Rows below the top of the visible field checked for the danger flag.
const DANGER_ROW_OFFSET: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    NoActivePiece,
    PieceFalling,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopOutReason {
    /// A piece could not be placed at the spawn cell.
    BlockOut,
    /// A piece locked with a cell above the visible field.
    LockOut,
}

/// Things that happened during a tick, for audio/visual collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Spawned {
        kind: PieceKind,
        from_hold: bool,
    },
    Held {
        held: PieceKind,
        released: Option<PieceKind>,
    },
    Rotated {
        kind: PieceKind,
        rotation: Rotation,
        attempt: usize,
    },
    Locked {
        kind: PieceKind,
        cells: [Vec2; 4],
        auto: bool,
    },
    LinesCleared {
        clear: LineClear,
    },
    ToppedOut {
        reason: TopOutReason,
    },
    Restarted {
        seed: i64,
    },
}

/// Complete game state
#[derive(Debug, Clone)]
pub struct Game {
    config: GameConfig,
    matrix: Matrix,
    queue: PieceQueue,
    rotation_system: RotationSystem,
    phase: GamePhase,
    active: Option<Tetromino>,
    hold: Option<PieceKind>,
    can_hold: bool,
    soft_dropping: bool,
    pending: VecDeque<Action>,
    events: Vec<GameEvent>,
    tick: u64,
    gravity_counter: u32,
    lock_counter: u32,
    lock_resets: u32,
    /// Deepest row the active piece's box has reached.
    lowest_row: i32,
    pieces_locked: u64,
    lines_cleared: u64,
}

impl Game {
    /// Create a game from a validated configuration
    pub fn new(config: GameConfig) -> Self {
        Self {
            matrix: Matrix::new(config.width, config.height, config.visible_height),
            queue: PieceQueue::new(config.seed, config.preview_count),
            rotation_system: RotationSystem::new(config.allow_180, config.i_180_kicks),
            phase: GamePhase::NoActivePiece,
            active: None,
            hold: None,
            can_hold: true,
            soft_dropping: false,
            pending: VecDeque::new(),
            events: Vec::new(),
            tick: 0,
            gravity_counter: 0,
            lock_counter: 0,
            lock_resets: 0,
            lowest_row: 0,
            pieces_locked: 0,
            lines_cleared: 0,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn game_over(&self) -> bool {
        self.phase == GamePhase::GameOver
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Mutable access to the locked grid for fixtures.
    pub fn matrix_mut(&mut self) -> &mut Matrix {
        &mut self.matrix
    }

    pub fn active(&self) -> Option<&Tetromino> {
        self.active.as_ref()
    }

    pub fn hold_piece(&self) -> Option<PieceKind> {
        self.hold
    }

    pub fn can_hold(&self) -> bool {
        self.can_hold
    }

    pub fn queue(&self) -> &PieceQueue {
        &self.queue
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn lock_counter(&self) -> u32 {
        self.lock_counter
    }

    pub fn lock_resets(&self) -> u32 {
        self.lock_resets
    }

    pub fn is_soft_dropping(&self) -> bool {
        self.soft_dropping
    }

    /// Actions received but not applied yet.
    pub fn pending_actions(&self) -> usize {
        self.pending.len()
    }

    pub fn pieces_locked(&self) -> u64 {
        self.pieces_locked
    }

    pub fn lines_cleared(&self) -> u64 {
        self.lines_cleared
    }

    /// Blocks present in the top rows of the visible field.
    pub fn danger(&self) -> bool {
        !self
            .matrix
            .is_row_empty(self.matrix.visible_top() + DANGER_ROW_OFFSET)
    }

    /// Advance the simulation by one logic tick
    ///
    /// `actions` are appended to the pending FIFO and applied in order while a
    /// piece is falling. Actions left over after a lock stay queued for the
    /// next tick, where they apply to the next piece.
    pub fn tick<I>(&mut self, actions: I)
    where
        I: IntoIterator<Item = Action>,
    {
        self.pending.extend(actions);
        self.tick += 1;

        if self.phase == GamePhase::GameOver {
            // Only a restart gets out of a finished game.
            match self.pending.iter().position(|&a| a == Action::Restart) {
                Some(idx) => {
                    self.pending.drain(..idx);
                }
                None => {
                    self.pending.clear();
                    return;
                }
            }
        }

        if self.phase == GamePhase::NoActivePiece {
            self.spawn_next();
        }

        while self.phase == GamePhase::PieceFalling || self.pending.front() == Some(&Action::Restart)
        {
            let Some(action) = self.pending.pop_front() else {
                break;
            };
            self.apply(action);
        }

        if self.phase == GamePhase::PieceFalling {
            self.step_gravity();
        }
        if self.phase == GamePhase::PieceFalling {
            self.step_lock_delay();
        }

        self.refresh_overlays();
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::MoveLeft => {
                self.shift(Direction::Left.offset());
            }
            Action::MoveRight => {
                self.shift(Direction::Right.offset());
            }
            Action::RotateCw => self.rotate(RotationDirection::Clockwise),
            Action::RotateCcw => self.rotate(RotationDirection::CounterClockwise),
            Action::Rotate180 => self.rotate(RotationDirection::Half),
            Action::Hold => self.hold(),
            Action::HardDrop => self.hard_drop(),
            Action::SoftDropStart => {
                self.soft_dropping = true;
                self.gravity_counter = 0;
                self.shift(DOWN);
            }
            Action::SoftDropStop => {
                self.soft_dropping = false;
                self.gravity_counter = 0;
            }
            Action::Restart => self.restart(),
        }
    }

    /// Return to the initial state with the same seed and no pending input.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    fn restart(&mut self) {
        let pending = mem::take(&mut self.pending);
        let mut events = mem::take(&mut self.events);
        let tick = self.tick;
        self.reset();
        self.tick = tick;
        self.pending = pending;

        events.push(GameEvent::Restarted {
            seed: self.config.seed,
        });
        self.events = events;
        debug!(seed = self.config.seed, "game_restarted");

        self.spawn_next();
    }

    fn spawn_next(&mut self) {
        let kind = self.queue.pop_next();
        self.spawn(kind, false);
    }

    fn spawn(&mut self, kind: PieceKind, from_hold: bool) {
        match Tetromino::spawn(kind, self.config.spawn, &self.matrix) {
            Some(piece) => {
                self.active = Some(piece);
                self.phase = GamePhase::PieceFalling;
                self.gravity_counter = 0;
                self.lock_counter = 0;
                self.lock_resets = 0;
                self.lowest_row = piece.position().y;
                if !from_hold {
                    self.can_hold = true;
                }
                self.events.push(GameEvent::Spawned { kind, from_hold });
                debug!(kind = kind.as_str(), from_hold, tick = self.tick, "piece_spawned");
            }
            None => self.top_out(TopOutReason::BlockOut),
        }
    }

    fn top_out(&mut self, reason: TopOutReason) {
        self.active = None;
        self.phase = GamePhase::GameOver;
        self.events.push(GameEvent::ToppedOut { reason });
        debug!(?reason, tick = self.tick, "game_over");
    }

    /// Move the active piece; true if it moved.
    fn shift(&mut self, delta: Vec2) -> bool {
        let Some(piece) = self.active.as_mut() else {
            return false;
        };
        if !piece.try_move(delta, &self.matrix) {
            return false;
        }
        let y = piece.position().y;
        self.after_manipulation(y, delta.x != 0);
        true
    }

    fn rotate(&mut self, direction: RotationDirection) {
        let Some(piece) = self.active.as_mut() else {
            return;
        };
        let Some(outcome) = piece.rotate(direction, &self.matrix, &self.rotation_system) else {
            return;
        };
        let kind = piece.kind();
        self.events.push(GameEvent::Rotated {
            kind,
            rotation: outcome.rotation,
            attempt: outcome.attempt,
        });
        self.after_manipulation(outcome.position.y, true);
    }

    /// Lock-delay bookkeeping after a successful move or rotation.
    fn after_manipulation(&mut self, y: i32, counts_as_reset: bool) {
        if y > self.lowest_row {
            self.lowest_row = y;
            self.lock_resets = 0;
        }
        if counts_as_reset
            && self.lock_counter > 0
            && self.lock_resets < self.config.max_lock_resets
        {
            self.lock_counter = 0;
            self.lock_resets += 1;
        }
    }

    fn hold(&mut self) {
        if !self.config.hold_enabled || !self.can_hold {
            return;
        }
        let Some(piece) = self.active.take() else {
            return;
        };

        let released = self.hold.replace(piece.kind());
        self.can_hold = false;
        self.events.push(GameEvent::Held {
            held: piece.kind(),
            released,
        });
        debug!(held = piece.kind().as_str(), "piece_held");

        let next = match released {
            Some(kind) => kind,
            None => self.queue.pop_next(),
        };
        self.spawn(next, true);
    }

    fn hard_drop(&mut self) {
        let Some(piece) = self.active.as_mut() else {
            return;
        };
        let ghost = piece.ghost_position(&self.matrix);
        piece.try_move(ghost - piece.position(), &self.matrix);
        self.lock(false);
    }

    fn step_gravity(&mut self) {
        let Some(piece) = self.active else {
            return;
        };

        if self.soft_dropping && self.config.soft_drop_factor == 0 {
            let ghost = piece.ghost_position(&self.matrix);
            if ghost != piece.position() {
                self.shift(ghost - piece.position());
            }
            return;
        }

        if piece.is_on_floor(&self.matrix) {
            self.gravity_counter = 0;
            return;
        }

        let interval = if self.soft_dropping {
            (self.config.gravity_ticks / self.config.soft_drop_factor).max(1)
        } else {
            self.config.gravity_ticks.max(1)
        };

        self.gravity_counter += 1;
        if self.gravity_counter >= interval {
            self.gravity_counter = 0;
            self.shift(DOWN);
        }
    }

    fn step_lock_delay(&mut self) {
        let Some(piece) = self.active else {
            return;
        };
        if !piece.is_on_floor(&self.matrix) {
            self.lock_counter = 0;
            return;
        }
        self.lock_counter += 1;
        if self.lock_counter >= self.config.lock_delay_ticks {
            self.lock(true);
        }
    }

    fn lock(&mut self, auto: bool) {
        let Some(piece) = self.active.take() else {
            return;
        };
        let cells = piece.cells();
        self.matrix
            .insert(&piece.mask(), piece.position(), piece.kind(), Layer::Locked);
        self.pieces_locked += 1;
        self.gravity_counter = 0;
        self.lock_counter = 0;
        self.lock_resets = 0;
        self.events.push(GameEvent::Locked {
            kind: piece.kind(),
            cells,
            auto,
        });
        debug!(
            kind = piece.kind().as_str(),
            x = piece.position().x,
            y = piece.position().y,
            auto,
            "piece_locked"
        );

        let visible_top = self.matrix.visible_top();
        if self.config.lock_out && cells.iter().any(|c| c.y < visible_top) {
            self.top_out(TopOutReason::LockOut);
            return;
        }

        let clear = self.matrix.clear_full_rows();
        if !clear.is_empty() {
            self.lines_cleared += clear.count() as u64;
            debug!(rows = ?clear.rows, "lines_cleared");
            self.events.push(GameEvent::LinesCleared { clear });
        }

        self.phase = GamePhase::NoActivePiece;
    }

    fn refresh_overlays(&mut self) {
        self.matrix.clear_layer(Layer::Active);
        self.matrix.clear_layer(Layer::Ghost);
        if let Some(piece) = self.active {
            let mask = piece.mask();
            let ghost = piece.ghost_position(&self.matrix);
            self.matrix.insert(&mask, ghost, piece.kind(), Layer::Ghost);
            self.matrix
                .insert(&mask, piece.position(), piece.kind(), Layer::Active);
        }
    }

    /// Drain the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            tick: self.tick,
            phase: self.phase,
            game_over: self.game_over(),
            danger: self.danger(),
            seed: self.queue.seed(),
            rng_state: self.queue.rng_state(),
            matrix: self.matrix.clone(),
            active: self.active,
            ghost: self.active.map(|p| p.ghost_position(&self.matrix)),
            hold: self.hold,
            can_hold: self.can_hold,
            next: self.queue.preview().collect(),
            gravity_counter: self.gravity_counter,
            lock_counter: self.lock_counter,
            lock_resets: self.lock_resets,
            pieces_locked: self.pieces_locked,
            lines_cleared: self.lines_cleared,
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new(GameConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EMPTY;

    fn started(config: GameConfig) -> Game {
        let mut game = Game::new(config);
        game.tick([]);
        game
    }

    #[test]
    fn test_first_tick_spawns() {
        let mut game = Game::default();
        assert_eq!(game.phase(), GamePhase::NoActivePiece);
        game.tick([]);
        assert_eq!(game.phase(), GamePhase::PieceFalling);
        let events = game.take_events();
        assert!(matches!(
            events.as_slice(),
            [GameEvent::Spawned {
                from_hold: false,
                ..
            }]
        ));
        assert!(game.take_events().is_empty());
    }

    #[test]
    fn test_gravity_moves_one_row_per_interval() {
        let config = GameConfig {
            gravity_ticks: 4,
            ..GameConfig::default()
        };
        // The spawn tick already counts towards the first row.
        let mut game = started(config);
        let y0 = game.active().unwrap().position().y;
        game.tick([]);
        game.tick([]);
        assert_eq!(game.active().unwrap().position().y, y0);
        game.tick([]);
        assert_eq!(game.active().unwrap().position().y, y0 + 1);
    }

    #[test]
    fn test_soft_drop_speeds_up_gravity() {
        let config = GameConfig {
            gravity_ticks: 20,
            soft_drop_factor: 10,
            ..GameConfig::default()
        };
        let mut game = started(config);
        let y0 = game.active().unwrap().position().y;
        // Immediate row, then one row every 2 ticks.
        game.tick([Action::SoftDropStart]);
        assert_eq!(game.active().unwrap().position().y, y0 + 1);
        game.tick([]);
        assert_eq!(game.active().unwrap().position().y, y0 + 2);
        game.tick([Action::SoftDropStop]);
        game.tick([]);
        assert_eq!(game.active().unwrap().position().y, y0 + 2);
    }

    #[test]
    fn test_zero_soft_drop_factor_is_sonic_drop() {
        let config = GameConfig {
            soft_drop_factor: 0,
            ..GameConfig::default()
        };
        let mut game = started(config);
        game.tick([Action::SoftDropStart]);
        let piece = game.active().copied().unwrap();
        assert!(piece.is_on_floor(game.matrix()));
        assert_eq!(game.phase(), GamePhase::PieceFalling);
    }

    #[test]
    fn test_lock_delay_auto_locks() {
        let config = GameConfig {
            lock_delay_ticks: 3,
            soft_drop_factor: 0,
            ..GameConfig::default()
        };
        let mut game = started(config);
        // The landing tick already counts one.
        game.tick([Action::SoftDropStart]);
        assert_eq!(game.lock_counter(), 1);
        game.tick([]);
        assert_eq!(game.phase(), GamePhase::PieceFalling);
        game.tick([]);
        assert_eq!(game.phase(), GamePhase::NoActivePiece);
        assert_eq!(game.pieces_locked(), 1);
        assert!(game
            .take_events()
            .iter()
            .any(|e| matches!(e, GameEvent::Locked { auto: true, .. })));
    }

    #[test]
    fn test_lock_resets_are_capped() {
        let config = GameConfig {
            lock_delay_ticks: 4,
            max_lock_resets: 2,
            soft_drop_factor: 0,
            ..GameConfig::default()
        };
        let mut game = started(config);
        game.tick([Action::SoftDropStart]);
        game.tick([Action::SoftDropStop]);
        assert_eq!(game.lock_counter(), 2);

        // Two resets are honoured, the third move does not reset.
        game.tick([Action::MoveLeft]);
        assert_eq!(game.lock_counter(), 1);
        game.tick([Action::MoveRight]);
        assert_eq!(game.lock_counter(), 1);
        assert_eq!(game.lock_resets(), 2);
        game.tick([Action::MoveLeft]);
        assert_eq!(game.lock_counter(), 2);
        game.tick([]);
        game.tick([]);
        assert_eq!(game.phase(), GamePhase::NoActivePiece);
    }

    #[test]
    fn test_hard_drop_locks_and_defers_remaining_actions() {
        let mut game = started(GameConfig::default());
        game.take_events();
        game.tick([Action::HardDrop, Action::MoveLeft]);
        assert_eq!(game.phase(), GamePhase::NoActivePiece);
        assert_eq!(game.pending_actions(), 1);
        assert!(game.active().is_none());

        game.tick([]);
        assert_eq!(game.pending_actions(), 0);
        assert_eq!(game.phase(), GamePhase::PieceFalling);
    }

    #[test]
    fn test_hold_swaps_and_blocks_second_hold() {
        let mut game = started(GameConfig::default());
        let first = game.active().unwrap().kind();
        let second = game.queue().peek(0).unwrap();

        game.tick([Action::Hold]);
        assert_eq!(game.hold_piece(), Some(first));
        assert_eq!(game.active().unwrap().kind(), second);
        assert!(!game.can_hold());

        game.tick([Action::Hold]);
        assert_eq!(game.hold_piece(), Some(first));
        assert_eq!(game.active().unwrap().kind(), second);

        // A lock and a regular spawn re-enable hold; the swap returns the held kind.
        game.tick([Action::HardDrop]);
        game.tick([Action::Hold]);
        assert_eq!(game.active().unwrap().kind(), first);
        assert!(!game.can_hold());
    }

    #[test]
    fn test_hold_disabled() {
        let config = GameConfig {
            hold_enabled: false,
            ..GameConfig::default()
        };
        let mut game = started(config);
        game.tick([Action::Hold]);
        assert_eq!(game.hold_piece(), None);
    }

    #[test]
    fn test_block_out_ends_game() {
        let mut game = Game::default();
        for y in 17..20 {
            for x in 0..10 {
                game.matrix_mut().set_locked(x, y, 1);
            }
        }
        game.tick([]);
        assert!(game.game_over());
        assert!(game.take_events().contains(&GameEvent::ToppedOut {
            reason: TopOutReason::BlockOut
        }));

        // Terminal: further input is ignored.
        game.tick([Action::MoveLeft, Action::HardDrop]);
        assert!(game.game_over());
        assert_eq!(game.pending_actions(), 0);
    }

    #[test]
    fn test_lock_out_above_visible_field() {
        let mut game = Game::default();
        // Floor at row 20 so every piece rests above the visible field.
        for x in 0..9 {
            game.matrix_mut().set_locked(x, 20, 1);
        }
        game.tick([Action::HardDrop]);
        assert!(game.game_over());
        assert!(game.take_events().contains(&GameEvent::ToppedOut {
            reason: TopOutReason::LockOut
        }));
    }

    #[test]
    fn test_lock_out_disabled_keeps_playing() {
        let config = GameConfig {
            lock_out: false,
            ..GameConfig::default()
        };
        let mut game = Game::new(config);
        for x in 0..9 {
            game.matrix_mut().set_locked(x, 20, 1);
        }
        game.tick([Action::HardDrop]);
        assert_eq!(game.phase(), GamePhase::NoActivePiece);
    }

    #[test]
    fn test_line_clear_event() {
        let mut game = Game::default();
        // Leave x = 0..4 open on the bottom row; the first piece of seed 1 is an I.
        for x in 4..10 {
            game.matrix_mut().set_locked(x, 39, 2);
        }
        game.tick([]);
        assert_eq!(game.active().unwrap().kind(), PieceKind::I);
        game.tick([
            Action::MoveLeft,
            Action::MoveLeft,
            Action::MoveLeft,
            Action::HardDrop,
        ]);
        assert_eq!(game.lines_cleared(), 1);
        assert!(game.matrix().is_row_empty(39));
        let events = game.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::LinesCleared { clear } if clear.rows == vec![39]
        )));
    }

    #[test]
    fn test_restart_replays_same_sequence() {
        let mut game = started(GameConfig::default());
        let first = game.active().unwrap().kind();
        game.tick([Action::HardDrop]);
        game.tick([Action::HardDrop]);
        assert_eq!(game.pieces_locked(), 2);

        game.tick([Action::Restart]);
        assert_eq!(game.pieces_locked(), 0);
        assert_eq!(game.active().unwrap().kind(), first);
        assert!(game.matrix().is_row_empty(39));
        assert!(game
            .take_events()
            .iter()
            .any(|e| matches!(e, GameEvent::Restarted { seed: 1 })));
    }

    #[test]
    fn test_restart_after_game_over() {
        let mut game = Game::default();
        for y in 17..20 {
            for x in 0..10 {
                game.matrix_mut().set_locked(x, y, 1);
            }
        }
        game.tick([]);
        assert!(game.game_over());
        game.tick([Action::Restart]);
        assert_eq!(game.phase(), GamePhase::PieceFalling);
    }

    #[test]
    fn test_overlays_follow_active_piece() {
        let mut game = started(GameConfig::default());
        let piece = *game.active().unwrap();
        for cell in piece.cells() {
            assert_eq!(game.matrix().cell(cell.x, cell.y), Some(piece.kind().code()));
        }
        let ghost = piece.ghost_position(game.matrix());
        let ghost_cell = ghost + piece.mask()[0];
        assert_eq!(
            game.matrix().cell(ghost_cell.x, ghost_cell.y),
            Some(-piece.kind().code())
        );
        assert_eq!(game.matrix().locked().get(ghost_cell.x, ghost_cell.y), Some(EMPTY));
    }

    #[test]
    fn test_danger_flag() {
        let mut game = Game::default();
        assert!(!game.danger());
        game.matrix_mut().set_locked(0, 22, 1);
        assert!(game.danger());
        assert!(game.snapshot().danger);
    }

    #[test]
    fn test_snapshot_contents() {
        let game = started(GameConfig::default());
        let snapshot = game.snapshot();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.phase, GamePhase::PieceFalling);
        assert_eq!(snapshot.next.len(), 5);
        assert_eq!(snapshot.seed, 1);
        assert_eq!(snapshot.active, game.active().copied());
        assert!(snapshot.ghost.is_some());
    }
}

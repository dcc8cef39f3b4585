//! DAS/ARR handling engine
//!
//! Runs once per poll tick. Key levels come in as [`KeySnapshot`]s, discrete
//! [`TimedAction`]s come out. All timing is counted in poll ticks: elapsed
//! time plus the carried remainder is divided by the poll interval, so a late
//! poll catches up without drifting.
//!
//! Holding a direction for `D` ms moves once on press, then once more for every
//! full ARR period after DAS: `1 + (D - DAS) / ARR` moves when `D > DAS`.

use std::collections::HashMap;
use std::time::Duration;

use arrayvec::ArrayVec;
use crossterm::event::KeyCode;
use tracing::debug;

use crate::keys::{Control, KeyBindings, KeySnapshot};
use crate::types::{Action, Direction, DirectionPriority, HandlingConfig, TimedAction};

/// Upper bound on actions emitted by a single poll.
pub const MAX_ACTIONS_PER_POLL: usize = 16;

pub type PollActions = ArrayVec<TimedAction, MAX_ACTIONS_PER_POLL>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct KeyState {
    current: bool,
    previous: bool,
}

/// Level and edges of one control for the current poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlEdges {
    pub down: bool,
    pub toggled: bool,
    pub released: bool,
}

/// Per-direction auto-shift counters, in poll ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionTimer {
    pub das: u32,
    pub das_remainder_us: u64,
    pub arr: u32,
    pub arr_remainder_us: u64,
    /// The press tap has been emitted.
    pub done_tap: bool,
}

impl DirectionTimer {
    fn clear_counters(&mut self) {
        self.das = 0;
        self.das_remainder_us = 0;
        self.arr = 0;
        self.arr_remainder_us = 0;
    }

    fn charged(&self, das_ticks: u32) -> bool {
        self.das >= das_ticks
    }

    fn advance(&mut self, elapsed_us: u64, interval_us: u64, das_ticks: u32) {
        if !self.charged(das_ticks) {
            let total = elapsed_us + self.das_remainder_us;
            let steps = u32::try_from(total / interval_us).unwrap_or(u32::MAX);
            self.das_remainder_us = total % interval_us;

            let das = self.das.saturating_add(steps);
            if das >= das_ticks {
                // Charged: ARR starts counting from the next poll.
                self.das = das_ticks;
                self.das_remainder_us = 0;
            } else {
                self.das = das;
            }
        } else {
            let total = elapsed_us + self.arr_remainder_us;
            let steps = u32::try_from(total / interval_us).unwrap_or(u32::MAX);
            self.arr = self.arr.saturating_add(steps);
            self.arr_remainder_us = total % interval_us;
        }
    }
}

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Left => 0,
        Direction::Right => 1,
    }
}

fn ticks_for(ms: u32, interval_us: u64) -> u32 {
    let ticks = (u64::from(ms) * 1000).div_ceil(interval_us);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

/// Input state machine owned by the polling loop
#[derive(Debug, Clone)]
pub struct HandlingEngine {
    config: HandlingConfig,
    bindings: KeyBindings,
    interval_us: u64,
    das_ticks: u32,
    arr_ticks: u32,
    keys: HashMap<KeyCode, KeyState>,
    timers: [DirectionTimer; 2],
    /// Direction that wins while both are held (priority "recent").
    token: Option<Direction>,
    guard_us: u64,
    poll: u64,
}

impl HandlingEngine {
    pub fn new(config: HandlingConfig, poll_interval: Duration, bindings: KeyBindings) -> Self {
        let interval_us = u64::try_from(poll_interval.as_micros())
            .unwrap_or(u64::MAX)
            .max(1);
        Self {
            das_ticks: ticks_for(config.das_ms, interval_us),
            arr_ticks: ticks_for(config.arr_ms, interval_us),
            config,
            bindings,
            interval_us,
            keys: HashMap::new(),
            timers: [DirectionTimer::default(); 2],
            token: None,
            guard_us: 0,
            poll: 0,
        }
    }

    pub fn config(&self) -> &HandlingConfig {
        &self.config
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// DAS threshold in poll ticks.
    pub fn das_ticks(&self) -> u32 {
        self.das_ticks
    }

    /// ARR threshold in poll ticks (0 repeats every poll).
    pub fn arr_ticks(&self) -> u32 {
        self.arr_ticks
    }

    /// Number of polls run so far.
    pub fn poll_count(&self) -> u64 {
        self.poll
    }

    pub fn timer(&self, direction: Direction) -> DirectionTimer {
        self.timers[slot(direction)]
    }

    pub fn priority_token(&self) -> Option<Direction> {
        self.token
    }

    pub fn is_guarded(&self) -> bool {
        self.guard_us > 0
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.get(&key).is_some_and(|s| s.current)
    }

    /// The game locked a piece on its own; suppress hard drop for a moment.
    pub fn note_auto_lock(&mut self) {
        if self.config.prevent_accidental_hard_drop {
            self.guard_us = u64::from(self.config.hard_drop_guard_ms) * 1000;
        }
    }

    /// Zero every counter, the priority token and the guard. Key levels are kept.
    pub fn reset(&mut self) {
        self.timers = [DirectionTimer::default(); 2];
        self.token = None;
        self.guard_us = 0;
    }

    /// Run one poll tick
    ///
    /// `refresh` is None when the input source reported nothing since the last
    /// poll, which leaves every key as it was.
    pub fn poll(&mut self, refresh: Option<&KeySnapshot>, elapsed: Duration) -> PollActions {
        let poll = self.poll;
        self.poll += 1;
        let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        for state in self.keys.values_mut() {
            state.previous = state.current;
        }
        if let Some(snapshot) = refresh {
            self.apply_snapshot(snapshot);
        }

        let guarded = self.guard_us > 0;
        self.guard_us = self.guard_us.saturating_sub(elapsed_us);

        let mut actions = PollActions::new();
        let mut emit = |action: Action| {
            let _ = actions.try_push(TimedAction::new(action, poll));
        };

        let restart = self.edges(Control::Restart);
        if restart.toggled {
            emit(Action::Restart);
        }
        if self.edges(Control::Hold).toggled {
            emit(Action::Hold);
        }
        if self.edges(Control::RotateCcw).toggled {
            emit(Action::RotateCcw);
        }
        if self.edges(Control::RotateCw).toggled {
            emit(Action::RotateCw);
        }
        if self.edges(Control::Rotate180).toggled {
            emit(Action::Rotate180);
        }

        if let Some(direction) = self.step_directions(elapsed_us) {
            emit(Action::moving(direction));
        }

        let soft_drop = self.edges(Control::SoftDrop);
        if soft_drop.released {
            emit(Action::SoftDropStop);
        }
        // A restart clears soft drop in the game; a key still down starts it again.
        if soft_drop.toggled || (restart.toggled && soft_drop.down) {
            emit(Action::SoftDropStart);
        }

        if self.edges(Control::HardDrop).toggled {
            if guarded {
                debug!(poll, "hard_drop_suppressed");
            } else {
                emit(Action::HardDrop);
            }
        }

        if restart.toggled {
            self.reset();
        }

        actions
    }

    fn apply_snapshot(&mut self, snapshot: &KeySnapshot) {
        if snapshot.releases_all() {
            for state in self.keys.values_mut() {
                state.current = false;
            }
        }
        for (key, pressed) in snapshot.iter() {
            if self.bindings.is_bound(key) {
                self.keys.entry(key).or_default().current = pressed;
            }
        }
    }

    /// Combined edges of every key bound to `control`.
    pub fn edges(&self, control: Control) -> ControlEdges {
        let (current, previous) = self
            .bindings
            .keys(control)
            .iter()
            .filter_map(|key| self.keys.get(key))
            .fold((false, false), |(c, p), s| (c || s.current, p || s.previous));
        ControlEdges {
            down: current,
            toggled: current && !previous,
            released: previous && !current,
        }
    }

    /// Update auto-shift state; returns the direction that moves this poll.
    fn step_directions(&mut self, elapsed_us: u64) -> Option<Direction> {
        let left = self.edges(Control::MoveLeft);
        let right = self.edges(Control::MoveRight);
        let edge = |direction: Direction| match direction {
            Direction::Left => left,
            Direction::Right => right,
        };

        for direction in [Direction::Left, Direction::Right] {
            if edge(direction).released {
                self.timers[slot(direction)] = DirectionTimer::default();
            }
        }

        if self.config.das_cancel {
            for direction in [Direction::Left, Direction::Right] {
                if edge(direction).toggled && !edge(direction.opposite()).toggled {
                    self.timers[slot(direction.opposite())].clear_counters();
                }
            }
        }

        match (left.toggled, right.toggled) {
            (true, false) => self.token = Some(Direction::Left),
            (false, true) => self.token = Some(Direction::Right),
            _ => {}
        }
        // The token outlives a full release; only a lone held direction takes it.
        match (left.down, right.down) {
            (true, false) => self.token = Some(Direction::Left),
            (false, true) => self.token = Some(Direction::Right),
            _ => {}
        }

        for direction in [Direction::Left, Direction::Right] {
            let e = edge(direction);
            if e.down && !e.toggled {
                self.timers[slot(direction)].advance(elapsed_us, self.interval_us, self.das_ticks);
            }
        }

        let winner = match (left.down, right.down) {
            (true, false) => Direction::Left,
            (false, true) => Direction::Right,
            (false, false) => return None,
            (true, true) => match self.config.direction_priority {
                DirectionPriority::Recent => self.token?,
                DirectionPriority::Neither => return None,
            },
        };

        let timer = &mut self.timers[slot(winner)];
        if !timer.done_tap {
            timer.done_tap = true;
            return Some(winner);
        }
        if !timer.charged(self.das_ticks) {
            return None;
        }
        if self.arr_ticks == 0 {
            return Some(winner);
        }
        if timer.arr >= self.arr_ticks {
            timer.arr = 0;
            timer.arr_remainder_us = 0;
            return Some(winner);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn engine(config: HandlingConfig) -> HandlingEngine {
        HandlingEngine::new(config, MS, KeyBindings::default())
    }

    fn handling(das_ms: u32, arr_ms: u32) -> HandlingConfig {
        HandlingConfig {
            das_ms,
            arr_ms,
            ..HandlingConfig::default()
        }
    }

    fn count(actions: &PollActions, action: Action) -> usize {
        actions.iter().filter(|a| a.action == action).count()
    }

    /// Press `key` and keep it down for `duration` more polls.
    fn hold(engine: &mut HandlingEngine, key: KeyCode, duration: u32, action: Action) -> usize {
        let mut moves = count(
            &engine.poll(Some(&KeySnapshot::new().press(key)), MS),
            action,
        );
        for _ in 0..duration {
            moves += count(&engine.poll(None, MS), action);
        }
        moves
    }

    #[test]
    fn test_thresholds_in_poll_ticks() {
        let e = engine(handling(167, 33));
        assert_eq!(e.das_ticks(), 167);
        assert_eq!(e.arr_ticks(), 33);

        // 256 Hz polling: 3906 us per poll.
        let e = HandlingEngine::new(
            handling(167, 33),
            Duration::from_micros(3906),
            KeyBindings::default(),
        );
        assert_eq!(e.das_ticks(), 43);
        assert_eq!(e.arr_ticks(), 9);
    }

    #[test]
    fn test_das_arr_move_count_formula() {
        for duration in [0, 1, 100, 166, 167, 168, 199, 200, 201, 232, 233, 500, 1000] {
            let mut e = engine(handling(167, 33));
            let moves = hold(&mut e, KeyCode::Left, duration, Action::MoveLeft);
            let expected = if duration <= 167 {
                1
            } else {
                1 + (duration as usize - 167) / 33
            };
            assert_eq!(moves, expected, "held for {duration} ms");
        }
    }

    #[test]
    fn test_zero_arr_repeats_every_charged_poll() {
        let mut e = engine(handling(167, 0));
        let moves = hold(&mut e, KeyCode::Right, 170, Action::MoveRight);
        // Tap, then polls 167, 168, 169 and 170.
        assert_eq!(moves, 5);
    }

    #[test]
    fn test_remainder_carries_between_polls() {
        let mut e = engine(handling(10, 5));
        e.poll(Some(&KeySnapshot::new().press(KeyCode::Left)), MS);
        // Half-interval polls: two of them make one tick.
        for _ in 0..20 {
            e.poll(None, Duration::from_micros(500));
        }
        assert_eq!(e.timer(Direction::Left).das, 10);
        assert_eq!(e.timer(Direction::Left).das_remainder_us, 0);
    }

    #[test]
    fn test_das_clamps_at_threshold() {
        let mut e = engine(handling(10, 5));
        assert_eq!(hold(&mut e, KeyCode::Left, 0, Action::MoveLeft), 1);
        let actions = e.poll(None, Duration::from_millis(14));
        assert!(actions.is_empty());
        let timer = e.timer(Direction::Left);
        assert_eq!(timer.das, 10);
        assert_eq!(timer.arr, 0);
        assert_eq!(timer.arr_remainder_us, 0);

        // The overshoot is dropped: the first repeat needs a full ARR period.
        for _ in 0..4 {
            assert!(e.poll(None, MS).is_empty());
        }
        assert_eq!(count(&e.poll(None, MS), Action::MoveLeft), 1);
    }

    #[test]
    fn test_arr_fire_drops_remainder() {
        let mut e = engine(handling(0, 2));
        assert_eq!(hold(&mut e, KeyCode::Left, 0, Action::MoveLeft), 1);

        let actions = e.poll(None, Duration::from_micros(2900));
        assert_eq!(count(&actions, Action::MoveLeft), 1);
        assert_eq!(e.timer(Direction::Left).arr, 0);
        assert_eq!(e.timer(Direction::Left).arr_remainder_us, 0);

        // 1.5 ms is one tick short of the next repeat without a carried 0.9 ms.
        assert!(e.poll(None, Duration::from_micros(1500)).is_empty());
        assert_eq!(e.timer(Direction::Left).arr, 1);
        assert_eq!(count(&e.poll(None, MS), Action::MoveLeft), 1);
    }

    #[test]
    fn test_release_resets_counters() {
        let mut e = engine(handling(167, 33));
        hold(&mut e, KeyCode::Left, 300, Action::MoveLeft);
        assert!(e.timer(Direction::Left).done_tap);

        let actions = e.poll(Some(&KeySnapshot::new().release(KeyCode::Left)), MS);
        assert!(actions.is_empty());
        assert_eq!(e.timer(Direction::Left), DirectionTimer::default());

        // A fresh press taps again and has to recharge.
        assert_eq!(hold(&mut e, KeyCode::Left, 100, Action::MoveLeft), 1);
    }

    #[test]
    fn test_priority_recent() {
        let mut e = engine(handling(167, 33));
        hold(&mut e, KeyCode::Left, 10, Action::MoveLeft);

        let actions = e.poll(Some(&KeySnapshot::new().press(KeyCode::Right)), MS);
        assert_eq!(count(&actions, Action::MoveRight), 1);
        assert_eq!(e.priority_token(), Some(Direction::Right));

        let mut left = 0;
        let mut right = 0;
        for _ in 0..500 {
            let actions = e.poll(None, MS);
            left += count(&actions, Action::MoveLeft);
            right += count(&actions, Action::MoveRight);
        }
        assert_eq!(left, 0);
        assert!(right > 1);

        // Releasing the winner hands movement back to the held direction.
        e.poll(Some(&KeySnapshot::new().release(KeyCode::Right)), MS);
        assert_eq!(e.priority_token(), Some(Direction::Left));
        let mut left = 0;
        for _ in 0..100 {
            left += count(&e.poll(None, MS), Action::MoveLeft);
        }
        assert!(left > 0);
    }

    #[test]
    fn test_priority_token_survives_full_release() {
        let mut e = engine(handling(167, 33));
        hold(&mut e, KeyCode::Left, 5, Action::MoveLeft);
        e.poll(Some(&KeySnapshot::new().release(KeyCode::Left)), MS);
        assert_eq!(e.priority_token(), Some(Direction::Left));

        // Both land in one refresh: the remembered direction wins.
        let both = KeySnapshot::new()
            .press(KeyCode::Left)
            .press(KeyCode::Right);
        let mut left = count(&e.poll(Some(&both), MS), Action::MoveLeft);
        let mut right = 0;
        for _ in 0..500 {
            let actions = e.poll(None, MS);
            left += count(&actions, Action::MoveLeft);
            right += count(&actions, Action::MoveRight);
        }
        assert!(left > 1);
        assert_eq!(right, 0);
    }

    #[test]
    fn test_priority_neither() {
        let config = HandlingConfig {
            direction_priority: DirectionPriority::Neither,
            ..handling(167, 33)
        };
        let mut e = engine(config);
        let both = KeySnapshot::new()
            .press(KeyCode::Left)
            .press(KeyCode::Right);
        let mut moves = e.poll(Some(&both), MS).len();
        for _ in 0..400 {
            moves += e.poll(None, MS).len();
        }
        assert_eq!(moves, 0);
        assert!(!e.timer(Direction::Left).done_tap);

        // The survivor taps once released from the tie.
        let actions = e.poll(Some(&KeySnapshot::new().release(KeyCode::Right)), MS);
        assert_eq!(count(&actions, Action::MoveLeft), 1);
    }

    #[test]
    fn test_das_cancel_clears_opposite_charge() {
        let config = HandlingConfig {
            das_cancel: true,
            ..handling(167, 33)
        };
        let mut e = engine(config);
        hold(&mut e, KeyCode::Left, 100, Action::MoveLeft);
        assert_eq!(e.timer(Direction::Left).das, 100);

        // Zeroed by the press, then advanced by the same poll.
        e.poll(Some(&KeySnapshot::new().press(KeyCode::Right)), MS);
        assert_eq!(e.timer(Direction::Left).das, 1);
        assert!(e.timer(Direction::Left).done_tap);

        let mut plain = engine(handling(167, 33));
        hold(&mut plain, KeyCode::Left, 100, Action::MoveLeft);
        plain.poll(Some(&KeySnapshot::new().press(KeyCode::Right)), MS);
        assert_eq!(plain.timer(Direction::Left).das, 101);
    }

    #[test]
    fn test_edge_triggered_actions() {
        let mut e = engine(HandlingConfig::default());
        let press = KeySnapshot::new()
            .press(KeyCode::Char('c'))
            .press(KeyCode::Char('z'))
            .press(KeyCode::Up)
            .press(KeyCode::Char('a'))
            .press(KeyCode::Left)
            .press(KeyCode::Down)
            .press(KeyCode::Char(' '))
            .press(KeyCode::Char('r'));
        let actions: Vec<Action> = e.poll(Some(&press), MS).iter().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![
                Action::Restart,
                Action::Hold,
                Action::RotateCcw,
                Action::RotateCw,
                Action::Rotate180,
                Action::MoveLeft,
                Action::SoftDropStart,
                Action::HardDrop,
            ]
        );

        // Held: nothing re-fires on toggle-only controls.
        let held = e.poll(None, MS);
        assert!(held.iter().all(|a| a.action == Action::MoveLeft));

        let release = KeySnapshot::release_all();
        let actions: Vec<Action> = e
            .poll(Some(&release), MS)
            .iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(actions, vec![Action::SoftDropStop]);
    }

    #[test]
    fn test_actions_carry_poll_index() {
        let mut e = engine(HandlingConfig::default());
        e.poll(None, MS);
        e.poll(None, MS);
        let actions = e.poll(Some(&KeySnapshot::new().press(KeyCode::Up)), MS);
        assert_eq!(actions.as_slice(), &[TimedAction::new(Action::RotateCw, 2)]);
    }

    #[test]
    fn test_missing_refresh_keeps_levels() {
        let mut e = engine(HandlingConfig::default());
        e.poll(Some(&KeySnapshot::new().press(KeyCode::Down)), MS);
        for _ in 0..10 {
            assert!(e.poll(None, MS).is_empty());
            assert!(e.is_key_down(KeyCode::Down));
        }
        // An empty refresh is not a release.
        assert!(e.poll(Some(&KeySnapshot::new()), MS).is_empty());
        assert!(e.is_key_down(KeyCode::Down));
    }

    #[test]
    fn test_unbound_keys_never_trigger() {
        let mut e = HandlingEngine::new(HandlingConfig::default(), MS, KeyBindings::empty());
        let actions = e.poll(Some(&KeySnapshot::new().press(KeyCode::Left)), MS);
        assert!(actions.is_empty());
        assert!(!e.is_key_down(KeyCode::Left));
    }

    #[test]
    fn test_hard_drop_guard() {
        let config = HandlingConfig {
            prevent_accidental_hard_drop: true,
            hard_drop_guard_ms: 5,
            ..HandlingConfig::default()
        };
        let mut e = engine(config);
        let space = KeyCode::Char(' ');

        e.note_auto_lock();
        assert!(e.is_guarded());
        let actions = e.poll(Some(&KeySnapshot::new().press(space)), MS);
        assert_eq!(count(&actions, Action::HardDrop), 0);
        e.poll(Some(&KeySnapshot::new().release(space)), MS);

        for _ in 0..5 {
            e.poll(None, MS);
        }
        assert!(!e.is_guarded());
        let actions = e.poll(Some(&KeySnapshot::new().press(space)), MS);
        assert_eq!(count(&actions, Action::HardDrop), 1);
    }

    #[test]
    fn test_guard_needs_flag() {
        let mut e = engine(HandlingConfig::default());
        e.note_auto_lock();
        assert!(!e.is_guarded());
    }

    #[test]
    fn test_restart_restarts_held_soft_drop() {
        let mut e = engine(HandlingConfig::default());
        let actions = e.poll(Some(&KeySnapshot::new().press(KeyCode::Down)), MS);
        assert_eq!(count(&actions, Action::SoftDropStart), 1);
        assert!(e.poll(None, MS).is_empty());

        let actions: Vec<Action> = e
            .poll(Some(&KeySnapshot::new().press(KeyCode::Char('r'))), MS)
            .iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(actions, vec![Action::Restart, Action::SoftDropStart]);
    }

    #[test]
    fn test_reset_keeps_key_levels() {
        let mut e = engine(handling(167, 33));
        hold(&mut e, KeyCode::Left, 200, Action::MoveLeft);
        e.reset();
        assert_eq!(e.timer(Direction::Left), DirectionTimer::default());
        assert!(e.is_key_down(KeyCode::Left));
        // Still held after the reset: a new tap, then a full recharge.
        assert_eq!(count(&e.poll(None, MS), Action::MoveLeft), 1);
    }
}

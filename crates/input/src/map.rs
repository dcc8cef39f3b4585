//! Terminal key events to key-level snapshots.
//!
//! Terminals with the kitty keyboard protocol report press, repeat and release
//! events. Others only report presses (plus OS auto-repeat), so a key counts as
//! released once it has been silent for the release timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::keys::KeySnapshot;

// Short enough that a single tap does not turn into a held key and start DAS.
pub const DEFAULT_KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(150);

/// Fold letter case so `Z` and `z` drive the same binding.
pub fn normalize(code: KeyCode) -> KeyCode {
    match code {
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    }
}

/// Check if key should quit the game.
pub fn should_quit(key: KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && (matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc)
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)))
}

/// Tracks which keys the terminal considers down
#[derive(Debug, Clone)]
pub struct KeyTracker {
    held: HashMap<KeyCode, Instant>,
    release_events: bool,
    release_timeout: Duration,
}

impl KeyTracker {
    /// `release_events`: the terminal reports key releases.
    pub fn new(release_events: bool) -> Self {
        Self {
            held: HashMap::new(),
            release_events,
            release_timeout: DEFAULT_KEY_RELEASE_TIMEOUT,
        }
    }

    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    pub fn release_timeout(&self) -> Duration {
        self.release_timeout
    }

    pub fn is_held(&self, code: KeyCode) -> bool {
        self.held.contains_key(&normalize(code))
    }

    /// Translate one terminal event; None when no key level changed.
    pub fn on_key_event(&mut self, event: KeyEvent, now: Instant) -> Option<KeySnapshot> {
        let code = normalize(event.code);
        match event.kind {
            KeyEventKind::Press | KeyEventKind::Repeat => {
                self.held.insert(code, now).is_none().then(|| KeySnapshot::new().press(code))
            }
            KeyEventKind::Release => self
                .held
                .remove(&code)
                .map(|_| KeySnapshot::new().release(code)),
        }
    }

    /// Release keys that went quiet (only without release events).
    pub fn expire(&mut self, now: Instant) -> Option<KeySnapshot> {
        if self.release_events {
            return None;
        }
        let timeout = self.release_timeout;
        let mut snapshot = KeySnapshot::new();
        self.held.retain(|&code, &mut last| {
            let alive = now.saturating_duration_since(last) <= timeout;
            if !alive {
                snapshot.set(code, false);
            }
            alive
        });
        (!snapshot.is_empty()).then_some(snapshot)
    }

    /// Forget every key (focus lost and similar).
    pub fn release_all(&mut self) -> KeySnapshot {
        self.held.clear();
        KeySnapshot::release_all()
    }
}

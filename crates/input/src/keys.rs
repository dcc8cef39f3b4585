//! Controls, key bindings and key-level snapshots.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crossterm::event::KeyCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical inputs of the game; each is driven by one or more physical keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    MoveLeft,
    MoveRight,
    SoftDrop,
    HardDrop,
    RotateCw,
    RotateCcw,
    Rotate180,
    Hold,
    Restart,
}

impl Control {
    pub const ALL: [Control; 9] = [
        Control::MoveLeft,
        Control::MoveRight,
        Control::SoftDrop,
        Control::HardDrop,
        Control::RotateCw,
        Control::RotateCcw,
        Control::Rotate180,
        Control::Hold,
        Control::Restart,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Error)]
pub enum BindingsError {
    #[error("failed to read key bindings {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse key bindings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Control -> physical keys
///
/// A key may drive several controls; a control with no keys never fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyBindings {
    map: BTreeMap<Control, Vec<KeyCode>>,
}

impl KeyBindings {
    /// No control bound.
    pub fn empty() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub fn keys(&self, control: Control) -> &[KeyCode] {
        self.map.get(&control).map_or(&[], Vec::as_slice)
    }

    pub fn bind(&mut self, control: Control, key: KeyCode) {
        let keys = self.map.entry(control).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn unbind(&mut self, control: Control) {
        self.map.remove(&control);
    }

    pub fn with(mut self, control: Control, key: KeyCode) -> Self {
        self.bind(control, key);
        self
    }

    /// Is `key` bound to any control?
    pub fn is_bound(&self, key: KeyCode) -> bool {
        self.map.values().any(|keys| keys.contains(&key))
    }

    pub fn from_json_str(s: &str) -> Result<Self, BindingsError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BindingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| BindingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::empty()
            .with(Control::MoveLeft, KeyCode::Left)
            .with(Control::MoveRight, KeyCode::Right)
            .with(Control::SoftDrop, KeyCode::Down)
            .with(Control::HardDrop, KeyCode::Char(' '))
            .with(Control::RotateCw, KeyCode::Up)
            .with(Control::RotateCw, KeyCode::Char('x'))
            .with(Control::RotateCcw, KeyCode::Char('z'))
            .with(Control::Rotate180, KeyCode::Char('a'))
            .with(Control::Hold, KeyCode::Char('c'))
            .with(Control::Hold, KeyCode::Modifier(crossterm::event::ModifierKeyCode::LeftShift))
            .with(Control::Restart, KeyCode::Char('r'))
    }
}

/// Key levels reported by the input source since the previous poll
///
/// Keys not mentioned keep their level. `release_all` releases every key
/// before the listed entries are applied; an empty snapshot changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    states: HashMap<KeyCode, bool>,
    release_all: bool,
}

impl KeySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit "every key is up" signal.
    pub fn release_all() -> Self {
        Self {
            states: HashMap::new(),
            release_all: true,
        }
    }

    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        self.states.insert(key, pressed);
    }

    pub fn press(mut self, key: KeyCode) -> Self {
        self.set(key, true);
        self
    }

    pub fn release(mut self, key: KeyCode) -> Self {
        self.set(key, false);
        self
    }

    pub fn releases_all(&self) -> bool {
        self.release_all
    }

    pub fn get(&self, key: KeyCode) -> Option<bool> {
        self.states.get(&key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyCode, bool)> + '_ {
        self.states.iter().map(|(&k, &v)| (k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && !self.release_all
    }

    /// Fold a later snapshot into this one; the later one wins.
    pub fn merge(&mut self, later: KeySnapshot) {
        if later.release_all {
            self.states.clear();
            self.release_all = true;
        }
        self.states.extend(later.states);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.keys(Control::MoveLeft), &[KeyCode::Left]);
        assert_eq!(
            bindings.keys(Control::RotateCw),
            &[KeyCode::Up, KeyCode::Char('x')]
        );
        assert!(bindings.is_bound(KeyCode::Char(' ')));
        assert!(!bindings.is_bound(KeyCode::Char('q')));
    }

    #[test]
    fn test_bind_is_idempotent() {
        let mut bindings = KeyBindings::empty();
        bindings.bind(Control::Hold, KeyCode::Tab);
        bindings.bind(Control::Hold, KeyCode::Tab);
        assert_eq!(bindings.keys(Control::Hold), &[KeyCode::Tab]);
        bindings.unbind(Control::Hold);
        assert!(bindings.keys(Control::Hold).is_empty());
    }

    #[test]
    fn test_bindings_json() {
        let bindings =
            KeyBindings::from_json_str(r#"{"move_left":[{"Char":"h"}],"hard_drop":["Enter"]}"#)
                .unwrap();
        assert_eq!(bindings.keys(Control::MoveLeft), &[KeyCode::Char('h')]);
        assert_eq!(bindings.keys(Control::HardDrop), &[KeyCode::Enter]);
        assert!(bindings.keys(Control::MoveRight).is_empty());

        let text = serde_json::to_string(&KeyBindings::default()).unwrap();
        assert_eq!(KeyBindings::from_json_str(&text).unwrap(), KeyBindings::default());
    }

    #[test]
    fn test_snapshot_merge_later_wins() {
        let mut merged = KeySnapshot::new().press(KeyCode::Left).press(KeyCode::Up);
        merged.merge(KeySnapshot::new().release(KeyCode::Left));
        assert_eq!(merged.get(KeyCode::Left), Some(false));
        assert_eq!(merged.get(KeyCode::Up), Some(true));

        merged.merge(KeySnapshot::release_all().press(KeyCode::Right));
        assert!(merged.releases_all());
        assert_eq!(merged.get(KeyCode::Up), None);
        assert_eq!(merged.get(KeyCode::Right), Some(true));
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(KeySnapshot::new().is_empty());
        assert!(!KeySnapshot::release_all().is_empty());
    }
}

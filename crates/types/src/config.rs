//! Engine configuration
//!
//! A [`Config`] is built once, validated, and handed by value to each component
//! at construction. Nothing in the engine reads settings from global state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Vec2, DEFAULT_ARR_MS, DEFAULT_DAS_MS, DEFAULT_GRAVITY_TICKS, DEFAULT_HARD_DROP_GUARD_MS,
    DEFAULT_LOCK_DELAY_TICKS, DEFAULT_LOCK_RESET_LIMIT, DEFAULT_MATRIX_HEIGHT,
    DEFAULT_MATRIX_WIDTH, DEFAULT_POLLS_PER_SECOND, DEFAULT_PREVIEW_COUNT,
    DEFAULT_SOFT_DROP_FACTOR, DEFAULT_TICKS_PER_SECOND, DEFAULT_VISIBLE_HEIGHT,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("matrix must be at least 4x4 with a visible region inside it (got {width}x{height}, visible {visible_height})")]
    InvalidDimensions {
        width: i32,
        height: i32,
        visible_height: i32,
    },
    #[error("spawn cell ({x}, {y}) lies outside the matrix")]
    SpawnOutOfBounds { x: i32, y: i32 },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which direction wins while left and right are both held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPriority {
    /// The direction that most recently became the sole new press wins.
    #[default]
    Recent,
    /// Neither direction fires while both are held.
    Neither,
}

/// I-piece 180° kick data selection
///
/// `Legacy` is the table as originally shipped. Its horizontal and vertical
/// wobble appear to be swapped; `AxisSwapped` is the alternative reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum I180Kicks {
    #[default]
    Legacy,
    AxisSwapped,
}

/// Rules of the simulated game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub width: i32,
    pub height: i32,
    /// Rows at the bottom of the matrix that make up the visible field.
    pub visible_height: i32,
    pub preview_count: usize,
    pub seed: i64,
    /// Nominal spawn cell; pieces are offset from it by their box origin.
    pub spawn: Vec2,
    pub hold_enabled: bool,
    pub allow_180: bool,
    pub i_180_kicks: I180Kicks,
    /// Locking with any cell above the visible field ends the game.
    pub lock_out: bool,
    pub gravity_ticks: u32,
    /// Soft drop divides the gravity interval by this factor; 0 drops instantly.
    pub soft_drop_factor: u32,
    pub lock_delay_ticks: u32,
    pub max_lock_resets: u32,
}

impl GameConfig {
    /// First visible row (rows above it form the spawn buffer).
    pub fn visible_top(&self) -> i32 {
        self.height - self.visible_height
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < 4
            || self.height < 4
            || self.visible_height <= 0
            || self.visible_height > self.height
        {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
                visible_height: self.visible_height,
            });
        }
        if self.spawn.x < 0 || self.spawn.x >= self.width || self.spawn.y < 1 || self.spawn.y >= self.height {
            return Err(ConfigError::SpawnOutOfBounds {
                x: self.spawn.x,
                y: self.spawn.y,
            });
        }
        if self.preview_count == 0 {
            return Err(ConfigError::Zero {
                field: "preview_count",
            });
        }
        if self.gravity_ticks == 0 {
            return Err(ConfigError::Zero {
                field: "gravity_ticks",
            });
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_MATRIX_WIDTH,
            height: DEFAULT_MATRIX_HEIGHT,
            visible_height: DEFAULT_VISIBLE_HEIGHT,
            preview_count: DEFAULT_PREVIEW_COUNT,
            seed: 1,
            spawn: Vec2::new(4, DEFAULT_MATRIX_HEIGHT - DEFAULT_VISIBLE_HEIGHT - 2),
            hold_enabled: true,
            allow_180: true,
            i_180_kicks: I180Kicks::Legacy,
            lock_out: true,
            gravity_ticks: DEFAULT_GRAVITY_TICKS,
            soft_drop_factor: DEFAULT_SOFT_DROP_FACTOR,
            lock_delay_ticks: DEFAULT_LOCK_DELAY_TICKS,
            max_lock_resets: DEFAULT_LOCK_RESET_LIMIT,
        }
    }
}

/// Handling constants for the input pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlingConfig {
    pub das_ms: u32,
    /// 0 repeats on every poll once DAS is charged.
    pub arr_ms: u32,
    pub direction_priority: DirectionPriority,
    /// A fresh press zeroes the opposite direction's DAS charge.
    pub das_cancel: bool,
    pub prevent_accidental_hard_drop: bool,
    pub hard_drop_guard_ms: u32,
}

impl Default for HandlingConfig {
    fn default() -> Self {
        Self {
            das_ms: DEFAULT_DAS_MS,
            arr_ms: DEFAULT_ARR_MS,
            direction_priority: DirectionPriority::Recent,
            das_cancel: false,
            prevent_accidental_hard_drop: false,
            hard_drop_guard_ms: DEFAULT_HARD_DROP_GUARD_MS,
        }
    }
}

/// Loop rates and supervision limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub ticks_per_second: u32,
    pub polls_per_second: u32,
    pub max_ticks_per_iteration: u32,
    pub max_polls_per_iteration: u32,
    /// Two loop faults closer together than this end the session.
    pub min_restart_interval_ms: u64,
}

impl TimingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.ticks_per_second.max(1)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.polls_per_second.max(1)))
    }

    pub fn min_restart_interval(&self) -> Duration {
        Duration::from_millis(self.min_restart_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second == 0 {
            return Err(ConfigError::Zero {
                field: "ticks_per_second",
            });
        }
        if self.polls_per_second == 0 {
            return Err(ConfigError::Zero {
                field: "polls_per_second",
            });
        }
        if self.max_ticks_per_iteration == 0 || self.max_polls_per_iteration == 0 {
            return Err(ConfigError::Zero {
                field: "max_ticks_per_iteration",
            });
        }
        Ok(())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            polls_per_second: DEFAULT_POLLS_PER_SECOND,
            max_ticks_per_iteration: 32,
            max_polls_per_iteration: 128,
            min_restart_interval_ms: 1000,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub game: GameConfig,
    pub handling: HandlingConfig,
    pub timing: TimingConfig,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Load from environment variables.
    ///
    /// `FOUR_CONFIG` names a JSON file used as the base; `FOUR_SEED`,
    /// `FOUR_DAS_MS`, `FOUR_ARR_MS` and `FOUR_SDF` override single fields.
    pub fn from_env() -> Result<Self, ConfigError> {
        use std::env;

        let mut config = match env::var("FOUR_CONFIG")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };

        if let Some(seed) = env::var("FOUR_SEED").ok().and_then(|s| s.parse().ok()) {
            config.game.seed = seed;
        }
        if let Some(das) = env::var("FOUR_DAS_MS").ok().and_then(|s| s.parse().ok()) {
            config.handling.das_ms = das;
        }
        if let Some(arr) = env::var("FOUR_ARR_MS").ok().and_then(|s| s.parse().ok()) {
            config.handling.arr_ms = arr;
        }
        if let Some(sdf) = env::var("FOUR_SDF").ok().and_then(|s| s.parse().ok()) {
            config.game.soft_drop_factor = sdf;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game.validate()?;
        self.timing.validate()
    }
}

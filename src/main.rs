//! Terminal runner (default binary).
//!
//! Reads keys with crossterm, feeds key levels to a [`Session`] and draws the
//! latest snapshot as plain text. Quit with `q`, `Esc` or `Ctrl-C`.
//!
//! Environment:
//! - `FOUR_CONFIG`, `FOUR_SEED`, `FOUR_DAS_MS`, `FOUR_ARR_MS`, `FOUR_SDF`: see `Config::from_env`
//! - `FOUR_BINDINGS`: JSON key bindings file
//! - `FOUR_LOG_PATH`: log file (logging is off without it); `FOUR_LOG`: filter

use std::fs::File;
use std::io::{self, Stdout, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{cursor, style::Print, terminal, QueueableCommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use four::core::{GamePhase, GameSnapshot};
use four::engine::Session;
use four::input::{should_quit, KeyBindings, KeyTracker};
use four::types::{Config, PieceKind};

const FRAME: Duration = Duration::from_millis(16);

/// Spawn buffer rows drawn above the visible field.
const BUFFER_ROWS: i32 = 3;

fn init_logging() -> Result<()> {
    let Some(path) = std::env::var("FOUR_LOG_PATH")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        return Ok(());
    };

    let file = File::create(&path).with_context(|| format!("failed to open log file {path}"))?;
    let filter = EnvFilter::try_from_env("FOUR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .init();
    Ok(())
}

fn load_bindings() -> Result<KeyBindings> {
    match std::env::var("FOUR_BINDINGS")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        Some(path) => KeyBindings::from_path(&path)
            .with_context(|| format!("failed to load key bindings from {path}")),
        None => Ok(KeyBindings::default()),
    }
}

struct Terminal {
    stdout: Stdout,
    enhanced: bool,
}

impl Terminal {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.queue(terminal::EnterAlternateScreen)?;
        stdout.queue(cursor::Hide)?;
        stdout.queue(EnableFocusChange)?;

        // Release events and bare modifier keys need the kitty keyboard protocol.
        let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            stdout.queue(PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                    | KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES,
            ))?;
        }
        stdout.flush()?;
        Ok(Self { stdout, enhanced })
    }

    fn exit(&mut self) -> Result<()> {
        if self.enhanced {
            self.stdout.queue(PopKeyboardEnhancementFlags)?;
        }
        self.stdout.queue(DisableFocusChange)?;
        self.stdout.queue(cursor::Show)?;
        self.stdout.queue(terminal::LeaveAlternateScreen)?;
        self.stdout.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    fn line(&mut self, row: u16, text: &str) -> Result<()> {
        self.stdout.queue(cursor::MoveTo(0, row))?;
        self.stdout.queue(Print(text))?;
        self.stdout
            .queue(terminal::Clear(terminal::ClearType::UntilNewLine))?;
        Ok(())
    }

    fn draw(&mut self, snapshot: &GameSnapshot) -> Result<()> {
        let buffer = BUFFER_ROWS.min(snapshot.matrix.visible_top());
        let mut row = 0u16;

        for y in -buffer..snapshot.visible_height() {
            let mut text = field_row(snapshot, y);
            if let Some(side) = side_panel(snapshot, y) {
                text.push_str("  ");
                text.push_str(&side);
            }
            self.line(row, &text)?;
            row += 1;
        }

        let floor = format!("<!{}!>", "=".repeat(snapshot.matrix.width() as usize * 2));
        self.line(row, &floor)?;
        row += 1;

        let status = match snapshot.phase {
            GamePhase::GameOver => "GAME OVER  (r: restart, q: quit)",
            _ if snapshot.danger => "DANGER",
            _ => "",
        };
        self.line(row, status)?;
        self.stdout.flush()?;
        Ok(())
    }
}

/// One row of the field; negative `y` reaches into the spawn buffer.
fn field_row(snapshot: &GameSnapshot, y: i32) -> String {
    let width = snapshot.matrix.width();
    let (wall_l, wall_r, empty) = if y < 0 { ("  ", "  ", "  ") } else { ("<!", "!>", " .") };
    let mut text = String::with_capacity(width as usize * 2 + 32);
    text.push_str(wall_l);
    for x in 0..width {
        text.push_str(match snapshot.visible_cell(x, y) {
            Some(cell) if cell > 0 => "[]",
            Some(cell) if cell < 0 => "::",
            _ => empty,
        });
    }
    text.push_str(wall_r);
    text
}

fn piece_name(kind: Option<PieceKind>) -> &'static str {
    kind.map_or("-", |kind| kind.as_str())
}

fn side_panel(snapshot: &GameSnapshot, row: i32) -> Option<String> {
    match row {
        0 => Some(format!(
            "hold: {}{}",
            piece_name(snapshot.hold),
            if snapshot.can_hold { "" } else { " (used)" }
        )),
        2 => Some("next:".to_string()),
        3..=7 => snapshot
            .next
            .get((row - 3) as usize)
            .map(|&kind| format!("  {}", piece_name(Some(kind)))),
        9 => Some(format!("lines:  {}", snapshot.lines_cleared)),
        10 => Some(format!("pieces: {}", snapshot.pieces_locked)),
        11 => Some(format!("seed:   {}", snapshot.seed)),
        _ => None,
    }
}

fn run(term: &mut Terminal, session: &mut Session) -> Result<()> {
    let mut tracker = KeyTracker::new(term.enhanced);

    while session.is_running() {
        if event::poll(FRAME)? {
            loop {
                let now = Instant::now();
                match event::read()? {
                    Event::Key(key) => {
                        if should_quit(key) {
                            return Ok(());
                        }
                        if let Some(snapshot) = tracker.on_key_event(key, now) {
                            session.send_keys(snapshot);
                        }
                    }
                    Event::FocusLost => {
                        session.send_keys(tracker.release_all());
                    }
                    Event::Resize(..) => {
                        term.stdout
                            .queue(terminal::Clear(terminal::ClearType::All))?;
                    }
                    _ => {}
                }
                if !event::poll(Duration::ZERO)? {
                    break;
                }
            }
        }

        if let Some(snapshot) = tracker.expire(Instant::now()) {
            session.send_keys(snapshot);
        }
        for event in session.drain_events() {
            debug!(?event, "game_event");
        }
        term.draw(&session.snapshot())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;
    let config = Config::from_env().context("failed to load config")?;
    let bindings = load_bindings()?;
    info!(seed = config.game.seed, "starting");

    let mut session = Session::start(config, bindings)?;
    let mut term = Terminal::enter()?;

    let result = run(&mut term, &mut session);

    // Always try to restore terminal state.
    let _ = term.exit();
    let joined = session.join();
    result.and(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use four::core::Game;
    use four::types::GameConfig;

    #[test]
    fn test_fresh_piece_is_drawn_in_the_buffer() {
        let mut game = Game::new(GameConfig::default());
        game.tick([]);
        let snapshot = game.snapshot();

        let buffer: Vec<String> = (-BUFFER_ROWS..0).map(|y| field_row(&snapshot, y)).collect();
        assert!(buffer.iter().any(|row| row.contains("[]")), "{buffer:?}");
        assert!(buffer.iter().all(|row| !row.contains("<!")));
    }

    #[test]
    fn test_visible_row_has_walls() {
        let snapshot = GameSnapshot::default();
        let row = field_row(&snapshot, 0);
        assert_eq!(row, format!("<!{}!>", " .".repeat(10)));
    }
}

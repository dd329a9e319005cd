// Engine Module - Display state machine: grid, mode, transport and playback
//
// Exactly one thread owns the engine. Background activity (auto-scan, config
// watching) reaches it through channels drained by that thread, and the
// animation timer is polled from the same loop via `tick`.
use std::collections::VecDeque;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::animation::{AnimationPlayer, AnimationScript};
use crate::grid::{Grid, NUM_COLS, NUM_ROWS};
use crate::protocol;
use crate::results;
use crate::templates::TemplateStore;
use crate::transport::Transport;
use crate::types::{BoardError, Mode, Severity, StatusMessage};

const STATUS_HISTORY: usize = 100;

pub const DEFAULT_RACE_TITLE: &str = "Sommerregatta 2025";
pub const SELF_TEST_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub race_title: String,
    pub status_duration: Duration,
    pub frame_status_duration: Duration,
    pub max_fps: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            race_title: DEFAULT_RACE_TITLE.to_string(),
            status_duration: Duration::from_millis(3000),
            frame_status_duration: Duration::from_millis(500),
            max_fps: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

// Latest status line plus a bounded history for the event log
#[derive(Debug, Default)]
pub struct StatusBoard {
    current: Option<StatusMessage>,
    history: VecDeque<StatusMessage>,
}

impl StatusBoard {
    fn post(&mut self, msg: StatusMessage) {
        match msg.severity {
            Severity::Info => info!("{}", msg.text),
            Severity::Warn => warn!("{}", msg.text),
            Severity::Error => error!("{}", msg.text),
        }
        self.history.push_back(msg.clone());
        if self.history.len() > STATUS_HISTORY {
            self.history.pop_front();
        }
        self.current = Some(msg);
    }

    // Status line only, no history entry (frame counters)
    fn flash(&mut self, msg: StatusMessage) {
        debug!("{}", msg.text);
        self.current = Some(msg);
    }

    pub fn current(&self, now: Instant) -> Option<&StatusMessage> {
        self.current.as_ref().filter(|msg| !msg.is_expired(now))
    }

    pub fn latest(&self) -> Option<&StatusMessage> {
        self.current.as_ref()
    }

    pub fn history(&self) -> impl DoubleEndedIterator<Item = &StatusMessage> {
        self.history.iter()
    }
}

type CellListener = Box<dyn FnMut(usize, usize, char) + Send>;

pub struct DisplayEngine {
    grid: Grid,
    mode: Mode,
    cursor: (usize, usize),
    transport: Option<Box<dyn Transport>>,
    player: AnimationPlayer,
    status: StatusBoard,
    settings: EngineSettings,
    cell_listener: Option<CellListener>,
}

impl DisplayEngine {
    pub fn new(settings: EngineSettings, transport: Option<Box<dyn Transport>>) -> Self {
        DisplayEngine {
            grid: Grid::new(),
            mode: Mode::Manual,
            cursor: (0, 0),
            transport,
            player: AnimationPlayer::new(),
            status: StatusBoard::default(),
            settings,
            cell_listener: None,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    pub fn player(&self) -> &AnimationPlayer {
        &self.player
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: EngineSettings) {
        if self.player.fps() > settings.max_fps {
            self.player.set_fps(settings.max_fps);
        }
        self.settings = settings;
    }

    pub fn transport_name(&self) -> Option<String> {
        self.transport.as_ref().map(|t| t.name())
    }

    /// Called with (row, col, new char) for every cell whose character changes
    pub fn set_cell_listener(&mut self, listener: impl FnMut(usize, usize, char) + Send + 'static) {
        self.cell_listener = Some(Box::new(listener));
    }

    pub fn report(&mut self, text: impl Into<String>, severity: Severity) {
        let msg = StatusMessage::new(text, severity, self.settings.status_duration);
        self.status.post(msg);
    }

    fn notify_changes(&mut self, before: &Grid) {
        let Some(listener) = self.cell_listener.as_mut() else {
            return;
        };
        for row in 0..NUM_ROWS {
            for col in 0..NUM_COLS {
                let old = before.cell(row, col).map(|c| c.ch);
                let new = self.grid.cell(row, col).map(|c| c.ch);
                if let Some(ch) = new.filter(|ch| Some(*ch) != old) {
                    listener(row, col, ch);
                }
            }
        }
    }

    // Applies a grid mutation and notifies the listener of what changed
    fn mutate(&mut self, f: impl FnOnce(&mut Grid)) {
        let before = self.grid.clone();
        f(&mut self.grid);
        self.notify_changes(&before);
    }

    fn require_manual(&mut self) -> Result<(), BoardError> {
        if self.mode.allows_manual_edit() {
            Ok(())
        } else {
            let err = BoardError::ReadOnly { mode: self.mode };
            self.report(err.to_string(), Severity::Warn);
            Err(err)
        }
    }

    // ---- Manual editing ----

    /// Store a character and advance the cursor, wrapping to the next row.
    /// The cursor stays on the last cell once the grid is full.
    pub fn edit_cell(&mut self, row: usize, col: usize, ch: char) -> Result<char, BoardError> {
        self.require_manual()?;
        let before = self.grid.clone();
        let stored = self.grid.set(row, col, ch)?;
        self.notify_changes(&before);

        let (next_row, next_col) = if col + 1 >= NUM_COLS { (row + 1, 0) } else { (row, col + 1) };
        if next_row < NUM_ROWS {
            self.cursor = (next_row, next_col);
        } else {
            self.cursor = (row, col);
        }
        Ok(stored)
    }

    /// Type at the cursor position
    pub fn type_char(&mut self, ch: char) -> Result<char, BoardError> {
        let (row, col) = self.cursor;
        self.edit_cell(row, col, ch)
    }

    pub fn move_cursor(&mut self, direction: Direction) {
        let (row, col) = self.cursor;
        self.cursor = match direction {
            Direction::Left => (row, col.saturating_sub(1)),
            Direction::Right => (row, (col + 1).min(NUM_COLS - 1)),
            Direction::Up => (row.saturating_sub(1), col),
            Direction::Down => ((row + 1).min(NUM_ROWS - 1), col),
        };
    }

    pub fn set_cursor(&mut self, row: usize, col: usize) {
        self.cursor = (row.min(NUM_ROWS - 1), col.min(NUM_COLS - 1));
    }

    /// Blank the cursor cell and step back, wrapping to the end of the previous row
    pub fn backspace(&mut self) -> Result<(), BoardError> {
        self.require_manual()?;
        let (row, col) = self.cursor;
        self.mutate(|grid| {
            let _ = grid.set(row, col, ' ');
        });
        if col > 0 {
            self.cursor = (row, col - 1);
        } else if row > 0 {
            self.cursor = (row - 1, NUM_COLS - 1);
        }
        Ok(())
    }

    pub fn shift_line_left(&mut self, row: usize) -> Result<(), BoardError> {
        self.shift_right_of_cursor_left(row, 0)
    }

    pub fn shift_right_of_cursor_left(&mut self, row: usize, col: usize) -> Result<(), BoardError> {
        self.require_manual()?;
        let before = self.grid.clone();
        self.grid.shift_left_from(row, col)?;
        self.notify_changes(&before);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), BoardError> {
        self.require_manual()?;
        self.mutate(Grid::clear);
        self.cursor = (0, 0);
        Ok(())
    }

    // ---- Mode transitions ----

    pub fn set_manual_mode(&mut self) {
        self.player.stop();
        self.mode = Mode::Manual;
        info!("Mode: {}", self.mode);
    }

    pub fn set_race_mode(&mut self) {
        self.player.stop();
        self.mode = Mode::RaceResults;
        info!("Mode: {}", self.mode);
    }

    /// Load a results file into the grid, switch to race mode and send.
    /// On failure the grid and mode are left unchanged.
    pub fn load_race_results(&mut self, path: &Path) -> Result<(), BoardError> {
        let lines = match results::read_results(path, &self.settings.race_title) {
            Ok(lines) => lines,
            Err(e) => {
                self.report(format!("Error reading file: {}", e), Severity::Error);
                return Err(e);
            }
        };

        self.mutate(|grid| grid.restore(&lines));
        self.set_race_mode();
        self.report(format!("Race results loaded from {}", path.display()), Severity::Info);
        // A send failure is already on the status board; the load itself succeeded
        let _ = self.send();
        Ok(())
    }

    /// Parse and start an animation. An empty script leaves everything unchanged.
    pub fn load_animation(&mut self, text: &str) -> Result<usize, BoardError> {
        let script = AnimationScript::parse(text);
        if script.frames.is_empty() {
            self.report("No frames found", Severity::Warn);
            return Err(BoardError::NoFrames);
        }

        let count = script.frames.len();
        let mut script = script;
        script.fps = script.fps.min(self.settings.max_fps.max(1));
        self.report(
            format!("Animation started ({} frames, {}, {} FPS)", count, script.mode, script.fps),
            Severity::Info,
        );

        let now = Instant::now();
        self.mode = Mode::Animation;
        self.player.start(script, now);
        self.tick(now);
        Ok(count)
    }

    pub fn load_animation_file(&mut self, path: &Path) -> Result<usize, BoardError> {
        match std::fs::read_to_string(path) {
            Ok(text) => self.load_animation(&text),
            Err(e) => {
                self.report(format!("Error loading animation: {}", e), Severity::Error);
                Err(e.into())
            }
        }
    }

    pub fn stop_animation(&mut self) {
        self.set_manual_mode();
        self.report("Animation stopped", Severity::Info);
    }

    /// Live FPS change, clamped to 1..=max_fps. Applies from the next frame on.
    pub fn set_animation_fps(&mut self, fps: u32) -> u32 {
        let fps = fps.clamp(1, self.settings.max_fps.max(1));
        self.player.set_fps(fps);
        fps
    }

    /// Run a due animation step; call regularly from the owning loop
    pub fn tick(&mut self, now: Instant) {
        if !self.player.is_due(now) {
            return;
        }
        let Some(step) = self.player.step(now) else {
            return;
        };

        self.display_frame(&step.frame);
        let counter = StatusMessage::new(
            format!("Frame {}/{}", step.number, step.total),
            Severity::Info,
            self.settings.frame_status_duration,
        );
        self.status.flash(counter);
        if step.finished {
            self.report("Animation finished", Severity::Info);
        }
    }

    /// Write a whole frame into the grid regardless of mode, then send
    pub fn display_frame<S: AsRef<str>>(&mut self, lines: &[S]) {
        self.mutate(|grid| grid.restore(lines));
        let _ = self.send_grid(false);
    }

    // ---- Templates ----

    pub fn save_template(&mut self, store: &mut TemplateStore, name: &str) -> Result<(), BoardError> {
        match store.save(name, self.grid.snapshot()) {
            Ok(()) => {
                self.report(format!("Template '{}' saved", name), Severity::Info);
                Ok(())
            }
            Err(e) => {
                self.report(format!("Error saving template: {}", e), Severity::Error);
                Err(e)
            }
        }
    }

    /// Replace the grid with a stored template and send it
    pub fn apply_template(&mut self, store: &TemplateStore, name: &str) -> Result<(), BoardError> {
        self.require_manual()?;
        let Some(lines) = store.get(name) else {
            let err = BoardError::TemplateNotFound { name: name.to_string() };
            self.report(err.to_string(), Severity::Warn);
            return Err(err);
        };
        self.mutate(|grid| {
            grid.clear();
            grid.restore(lines);
        });
        self.report(format!("Template '{}' loaded", name), Severity::Info);
        self.send()
    }

    // ---- Wire ----

    /// Encode the grid and write it to the board
    pub fn send(&mut self) -> Result<(), BoardError> {
        self.send_grid(true)
    }

    fn send_grid(&mut self, announce: bool) -> Result<(), BoardError> {
        let Some(transport) = self.transport.as_mut() else {
            if self.mode == Mode::Manual {
                self.report("Test mode: data would be sent", Severity::Info);
            }
            return Ok(());
        };

        let msg = protocol::encode_frame(&self.grid);
        match transport.write_message(&msg) {
            Ok(()) => {
                if announce {
                    self.report("Data sent", Severity::Info);
                }
                Ok(())
            }
            Err(e) => {
                self.report(format!("Send error: {}", e), Severity::Error);
                Err(e)
            }
        }
    }

    pub fn send_brightness(&mut self) -> Result<(), BoardError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };
        match transport.write_message(&protocol::encode_brightness()) {
            Ok(()) => {
                self.report("Brightness set", Severity::Info);
                Ok(())
            }
            Err(e) => {
                self.report(format!("Brightness error: {}", e), Severity::Error);
                Err(e)
            }
        }
    }

    /// Startup self-test: all '0', pause, all '1', pause, blank. Blocks the
    /// calling thread for two pauses, then restores the previous mode.
    pub fn run_initialization_test(&mut self, pause: Duration) {
        let previous = self.mode;
        self.mode = Mode::Initialization;
        info!("Running display self-test");

        self.mutate(|grid| grid.fill('0'));
        let _ = self.send_grid(false);
        thread::sleep(pause);

        self.mutate(|grid| grid.fill('1'));
        let _ = self.send_grid(false);
        thread::sleep(pause);

        self.mutate(Grid::clear);
        let _ = self.send_grid(false);

        self.mode = previous;
        self.report("Self-test finished", Severity::Info);
    }
}

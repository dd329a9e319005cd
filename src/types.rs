// Shared types module - Modes, errors and status messages used across modules

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

// Operating mode of the display board - exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,         // Direct per-cell editing
    RaceResults,    // Grid shows a loaded results file, read-only
    Animation,      // Grid driven by the animation player, read-only
    Initialization, // Startup self-test, restores the previous mode on exit
}

impl Mode {
    /// Only manual mode accepts direct cell edits
    pub fn allows_manual_edit(&self) -> bool {
        matches!(self, Mode::Manual)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Manual => "manual",
            Mode::RaceResults => "race results",
            Mode::Animation => "animation",
            Mode::Initialization => "initialization",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error types for the display core
#[derive(thiserror::Error, Debug)]
pub enum BoardError {
    #[error("Display is read-only in {mode} mode")]
    ReadOnly { mode: Mode },

    #[error("Cell ({row}, {col}) is outside the display")]
    InvalidPosition { row: usize, col: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Could not decode {} with any supported encoding", .path.display())]
    Decode { path: PathBuf },

    #[error("{} contains no lines", .path.display())]
    EmptyFile { path: PathBuf },

    #[error("No frames found in animation")]
    NoFrames,

    #[error("Template '{name}' not found")]
    TemplateNotFound { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template file error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

// A transient status line entry, shown until its duration runs out
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub severity: Severity,
    pub duration: Duration,
    pub created: Instant,
    pub stamp: String, // wall clock HH:MM:SS for the event log
}

impl StatusMessage {
    pub fn new(text: impl Into<String>, severity: Severity, duration: Duration) -> Self {
        StatusMessage {
            text: text.into(),
            severity,
            duration,
            created: Instant::now(),
            stamp: wall_clock_stamp(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= self.duration
    }
}

// Local time if the offset is known, UTC otherwise
fn wall_clock_stamp() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(time::macros::format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

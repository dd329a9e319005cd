// Config Module - Configuration management and command-line argument parsing
use anyhow::{Context, Result};
use clap::Parser;
use notify::{Config as NotifyConfig, Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::autoscan::ScanTiming;
use crate::engine::{EngineSettings, DEFAULT_RACE_TITLE};
use crate::protocol::BAUD_RATE;

// Global storage for custom config path
static CUSTOM_CONFIG_PATH: OnceLock<Option<String>> = OnceLock::new();

const CONFIG_DIR_NAME: &str = "regatta-board";
const DEFAULT_TEMPLATES_FILE: &str = "led_templates.json";
const DEFAULT_LOG_FILE: &str = "regatta-board.log";

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Race results and animations on an 8x30 serial LED display board",
    long_about = "Drives an 8x30 character LED board over a serial link (38400 8-N-1).\n\
                  Edit the board in the terminal, load race-result text files, play frame\n\
                  animations, keep named templates and auto-load new result files from a directory."
)]
pub struct Args {
    /// Serial port of the display board (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long)]
    pub port: Option<String>,

    /// List available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Config name (in ~/.config/regatta-board) or path to a config file
    #[arg(long)]
    pub cfg: Option<String>,

    /// Directory to auto-scan for new result files (*.txt)
    #[arg(short, long)]
    pub watch: Option<String>,

    /// Race results file to show at startup
    #[arg(short, long)]
    pub results: Option<PathBuf>,

    /// Animation script to play at startup
    #[arg(short, long)]
    pub animation: Option<PathBuf>,

    /// Template file (JSON)
    #[arg(long)]
    pub templates: Option<String>,

    /// Title that replaces the first line of every results file
    #[arg(long)]
    pub title: Option<String>,

    /// Skip the startup self-test
    #[arg(long)]
    pub no_self_test: bool,

    /// Run without the terminal editor (auto-scan / playback only)
    #[arg(long)]
    pub headless: bool,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log filter (e.g. "info", "debug", "regatta_board=trace")
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub port: String,
    pub baud_rate: u32,
    pub race_title: String,
    pub templates_file: String,
    pub watch_dir: String,
    pub self_test: bool,
    pub self_test_step_secs: u64,
    pub scan_interval_ms: u64,
    pub scan_settle_ms: u64,
    pub status_duration_ms: u64,
    pub frame_status_ms: u64,
    pub max_animation_fps: u32,

    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            port: String::new(),
            baud_rate: BAUD_RATE,
            race_title: DEFAULT_RACE_TITLE.to_string(),
            templates_file: String::new(),
            watch_dir: String::new(),
            self_test: true,
            self_test_step_secs: 5,
            scan_interval_ms: 1000,
            scan_settle_ms: 500,
            status_duration_ms: 3000,
            frame_status_ms: 500,
            max_animation_fps: 10,
            config_path: None,
        }
    }
}

// TOML string literal with proper escaping
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

impl BoardConfig {
    /// Apply command-line overrides, returns true if anything was provided
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        let mut args_provided = false;

        if let Some(port) = &args.port {
            self.port = port.clone();
            args_provided = true;
        }

        if let Some(watch) = &args.watch {
            self.watch_dir = watch.clone();
            args_provided = true;
        }

        if let Some(templates) = &args.templates {
            self.templates_file = templates.clone();
            args_provided = true;
        }

        if let Some(title) = &args.title {
            self.race_title = title.clone();
            args_provided = true;
        }

        if args.no_self_test {
            self.self_test = false;
            args_provided = true;
        }

        args_provided
    }

    /// Set the global config path (called once at startup)
    pub fn set_config_path(cfg: Option<String>) {
        let _ = CUSTOM_CONFIG_PATH.set(cfg);
    }

    fn get_config_path_arg() -> Option<&'static str> {
        CUSTOM_CONFIG_PATH.get().and_then(|opt| opt.as_deref())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let config_dir = PathBuf::from(home).join(".config").join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        Ok(config_dir)
    }

    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        // Priority: explicit arg > global > default
        let cfg = cfg_arg.or_else(|| Self::get_config_path_arg());

        let Some(cfg) = cfg else {
            return Ok(Self::config_dir()?.join("config.conf"));
        };

        let path = PathBuf::from(cfg);
        if path.is_absolute() || cfg.contains('/') || cfg.contains('\\') {
            return Ok(path);
        }

        // Otherwise treat as config name in config directory
        let filename = if cfg.ends_with(".conf") {
            cfg.to_string()
        } else {
            format!("{}.conf", cfg)
        };
        Ok(Self::config_dir()?.join(filename))
    }

    pub fn load_with_path(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        Self::load_from(&path)
    }

    /// Load a specific config file, used by hot reload
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut parsed: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        parsed.config_path = Some(path.to_path_buf());
        parsed.sanitize();
        Ok(parsed)
    }

    /// Trim strings and clamp numbers into workable ranges
    pub fn sanitize(&mut self) {
        self.port = self.port.trim().to_string();
        self.templates_file = self.templates_file.trim().to_string();
        self.watch_dir = self.watch_dir.trim().to_string();

        self.baud_rate = self.baud_rate.clamp(1200, 921_600);
        self.self_test_step_secs = self.self_test_step_secs.min(60);
        self.scan_interval_ms = self.scan_interval_ms.clamp(100, 60_000);
        self.scan_settle_ms = self.scan_settle_ms.min(10_000);
        self.status_duration_ms = self.status_duration_ms.clamp(100, 60_000);
        self.frame_status_ms = self.frame_status_ms.clamp(50, 10_000);
        self.max_animation_fps = self.max_animation_fps.clamp(1, 60);
    }

    pub fn save(&self) -> Result<()> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::config_path(None)?,
        };

        let mut sanitized = self.clone();
        sanitized.sanitize();

        // Build TOML with comments manually for better documentation
        let contents = format!(
            r#"# Regatta Board Configuration File
# Changes are picked up while the program is running

# Serial port of the display board, empty = test mode (nothing is sent)
port = {}

# Serial speed, the board expects 38400 (8 data bits, no parity, 1 stop bit)
baud_rate = {}

# Title written over the first line of every race results file
race_title = {}

# Template file (JSON), empty = led_templates.json next to this config
templates_file = {}

# Directory auto-scanned for new *.txt result files, empty = pick at runtime
watch_dir = {}

# Run the 0/1 self-test pattern at startup when a port is open
self_test = {}

# Seconds each self-test pattern stays on the board
self_test_step_secs = {}

# Auto-scan poll interval in milliseconds
scan_interval_ms = {}

# Wait before loading a new file so the writer can finish (milliseconds)
scan_settle_ms = {}

# How long status messages stay visible (milliseconds)
status_duration_ms = {}

# How long the animation frame counter stays visible (milliseconds)
frame_status_ms = {}

# Upper limit for animation speed (frames per second)
max_animation_fps = {}
"#,
            quoted(&sanitized.port),
            sanitized.baud_rate,
            quoted(&sanitized.race_title),
            quoted(&sanitized.templates_file),
            quoted(&sanitized.watch_dir),
            sanitized.self_test,
            sanitized.self_test_step_secs,
            sanitized.scan_interval_ms,
            sanitized.scan_settle_ms,
            sanitized.status_duration_ms,
            sanitized.frame_status_ms,
            sanitized.max_animation_fps,
        );

        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Configured template file, or the default next to the config file
    pub fn templates_path(&self) -> Result<PathBuf> {
        if !self.templates_file.is_empty() {
            return Ok(PathBuf::from(&self.templates_file));
        }
        self.sibling_path(DEFAULT_TEMPLATES_FILE)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        self.sibling_path(DEFAULT_LOG_FILE)
    }

    fn sibling_path(&self, name: &str) -> Result<PathBuf> {
        match self.config_path.as_ref().and_then(|p| p.parent()) {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.join(name)),
            _ => Ok(Self::config_dir()?.join(name)),
        }
    }

    pub fn watch_dir(&self) -> Option<PathBuf> {
        if self.watch_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.watch_dir))
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            race_title: self.race_title.clone(),
            status_duration: Duration::from_millis(self.status_duration_ms),
            frame_status_duration: Duration::from_millis(self.frame_status_ms),
            max_fps: self.max_animation_fps,
        }
    }

    pub fn scan_timing(&self) -> ScanTiming {
        ScanTiming {
            interval: Duration::from_millis(self.scan_interval_ms),
            settle: Duration::from_millis(self.scan_settle_ms),
        }
    }

    pub fn self_test_pause(&self) -> Duration {
        Duration::from_secs(self.self_test_step_secs)
    }
}

/// Watch the config file and signal `changed` on every modification
pub fn spawn_config_watcher(config_path: PathBuf, changed: Sender<()>) -> Result<()> {
    std::thread::spawn(move || {
        let (tx, rx) = mpsc::channel();
        let mut watcher = match RecommendedWatcher::new(tx, NotifyConfig::default()) {
            Ok(w) => w,
            Err(e) => {
                warn!("Config watcher unavailable: {}", e);
                return;
            }
        };

        if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
            warn!("Could not watch {}: {}", config_path.display(), e);
            return;
        }
        info!("Watching config file {}", config_path.display());

        for res in rx {
            if let Ok(NotifyEvent { kind, .. }) = res {
                if matches!(kind, notify::EventKind::Modify(_)) && changed.send(()).is_err() {
                    break;
                }
            }
        }
    });

    Ok(())
}

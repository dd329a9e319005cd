// App Module - Owns the display engine and everything that feeds it
//
// Both front ends (terminal editor and headless) drive the board through this
// type from a single thread; background threads only talk to it via channels.
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;
use tracing::{info, warn};

use crate::autoscan::{AutoScanWatcher, ScanEvent, ScanState};
use crate::config::{spawn_config_watcher, BoardConfig};
use crate::engine::DisplayEngine;
use crate::templates::TemplateStore;
use crate::transport::{SerialTransport, Transport};
use crate::types::{BoardError, Severity};

/// Open the configured serial port, or None for test mode
pub fn open_transport(config: &BoardConfig) -> (Option<Box<dyn Transport>>, Option<String>) {
    if config.port.is_empty() {
        return (None, Some("No serial port configured - test mode".to_string()));
    }
    match SerialTransport::open(&config.port, config.baud_rate) {
        Ok(transport) => (Some(Box::new(transport)), None),
        Err(e) => (None, Some(format!("{} - test mode", e))),
    }
}

pub struct App {
    pub engine: DisplayEngine,
    pub templates: TemplateStore,
    config: BoardConfig,
    watch_dir: Option<PathBuf>,
    scanner: Option<AutoScanWatcher>,
    scan_tx: Sender<ScanEvent>,
    scan_rx: Receiver<ScanEvent>,
    config_rx: Option<Receiver<()>>,
}

impl App {
    pub fn new(config: BoardConfig, transport: Option<Box<dyn Transport>>) -> Result<Self> {
        let templates = TemplateStore::load(config.templates_path()?);
        let engine = DisplayEngine::new(config.engine_settings(), transport);
        let (scan_tx, scan_rx) = mpsc::channel();

        Ok(App {
            engine,
            templates,
            watch_dir: config.watch_dir(),
            config,
            scanner: None,
            scan_tx,
            scan_rx,
            config_rx: None,
        })
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Reload settings whenever the config file changes on disk
    pub fn watch_config_changes(&mut self) -> Result<()> {
        let Some(path) = self.config.config_path.clone() else {
            return Ok(());
        };
        let (tx, rx) = mpsc::channel();
        spawn_config_watcher(path, tx)?;
        self.config_rx = Some(rx);
        Ok(())
    }

    pub fn watch_dir(&self) -> Option<&Path> {
        self.watch_dir.as_deref()
    }

    pub fn select_watch_dir(&mut self, dir: PathBuf) -> Result<(), BoardError> {
        if !dir.is_dir() {
            let err = BoardError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            ));
            self.engine.report(err.to_string(), Severity::Error);
            return Err(err);
        }
        self.engine.report(format!("Watching directory: {}", dir.display()), Severity::Info);
        self.watch_dir = Some(dir);
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.as_ref().map_or(false, AutoScanWatcher::is_active)
    }

    /// Start polling the selected directory from scratch; restarts an already running scan
    pub fn start_auto_scan(&mut self) -> bool {
        self.spawn_scanner(ScanState::new())
    }

    fn spawn_scanner(&mut self, state: ScanState) -> bool {
        let Some(dir) = self.watch_dir.clone() else {
            self.engine.report("Please select a directory first", Severity::Error);
            return false;
        };
        self.stop_scanner();
        self.scanner = Some(AutoScanWatcher::start(
            dir.clone(),
            self.config.scan_timing(),
            self.scan_tx.clone(),
            state,
        ));
        self.engine.report(format!("Auto-scan active: {}", dir.display()), Severity::Info);
        true
    }

    pub fn stop_auto_scan(&mut self) {
        self.stop_scanner();
        self.engine.report("Auto-scan stopped", Severity::Info);
    }

    fn stop_scanner(&mut self) {
        if let Some(scanner) = self.scanner.take() {
            scanner.stop();
        }
    }

    pub fn handle_scan_event(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Reload(path) => {
                if self.engine.load_race_results(&path).is_ok() {
                    self.engine.report("New data loaded", Severity::Info);
                }
            }
            ScanEvent::Error(message) => self.engine.report(message, Severity::Warn),
        }
    }

    /// Apply everything queued by background threads and run due animation steps
    pub fn pump(&mut self, now: Instant) {
        while let Ok(event) = self.scan_rx.try_recv() {
            self.handle_scan_event(event);
        }

        let config_changed = self
            .config_rx
            .as_ref()
            .map_or(false, |rx| rx.try_iter().count() > 0);
        if config_changed {
            self.reload_config();
        }

        self.engine.tick(now);
    }

    fn reload_config(&mut self) {
        let Some(path) = self.config.config_path.clone() else {
            return;
        };
        let new_config = match BoardConfig::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config change: {:#}", e);
                return;
            }
        };
        if new_config == self.config {
            return;
        }
        info!("Config reloaded from {}", path.display());
        self.apply_config(new_config);
    }

    /// Apply a new configuration without restarting
    pub fn apply_config(&mut self, new_config: BoardConfig) {
        self.engine.set_settings(new_config.engine_settings());

        if new_config.port != self.config.port {
            self.engine
                .report("Serial port change applies after restart", Severity::Warn);
        }

        if new_config.templates_file != self.config.templates_file {
            match new_config.templates_path() {
                Ok(path) => self.templates = TemplateStore::load(path),
                Err(e) => warn!("Keeping template file: {:#}", e),
            }
        }

        let dir_changed = new_config.watch_dir != self.config.watch_dir;
        let timing_changed = new_config.scan_timing() != self.config.scan_timing();
        let scanning = self.is_scanning();
        self.config = new_config;

        let new_dir = self.config.watch_dir();
        if dir_changed && new_dir.is_none() {
            self.watch_dir = None;
            if scanning {
                self.stop_scanner();
                self.engine
                    .report("Watch directory removed from config, auto-scan stopped", Severity::Warn);
            }
        } else if dir_changed && new_dir != self.watch_dir {
            self.watch_dir = new_dir;
            if scanning {
                // Different directory, so every file in it is new
                self.start_auto_scan();
            }
        } else if (dir_changed || timing_changed) && scanning {
            // Same directory: keep the debounce state so loaded files stay loaded
            let state = self.scanner.as_ref().map(AutoScanWatcher::state).unwrap_or_default();
            self.spawn_scanner(state);
        }
        self.engine.report("Configuration updated", Severity::Info);
    }

    // ---- Template commands ----

    pub fn save_template(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let _ = self.engine.save_template(&mut self.templates, name);
    }

    pub fn load_template(&mut self, name: &str) {
        let name = name.trim();
        if self.templates.is_empty() {
            self.engine.report("No templates available", Severity::Info);
            return;
        }
        if name.is_empty() {
            return;
        }
        let _ = self.engine.apply_template(&self.templates, name);
    }

    pub fn first_template_name(&self) -> Option<String> {
        self.templates.names().next().map(str::to_string)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop_scanner();
    }
}

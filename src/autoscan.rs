// Auto-scan Module - Polls a directory for new race-result files
//
// The watcher thread never touches the display. It only sends reload requests
// over a channel; the thread that owns the display engine applies them.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

pub const SCAN_EXTENSION: &str = "txt";

// A newer file must beat the last seen timestamp by more than this
pub const DEBOUNCE_GUARD: Duration = Duration::from_millis(100);

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Reload(PathBuf),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    pub interval: Duration, // pause between polls
    pub settle: Duration,   // wait for the writer to finish before reloading
}

impl Default for ScanTiming {
    fn default() -> Self {
        ScanTiming {
            interval: DEFAULT_INTERVAL,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Every `*.txt` file in `dir` with its modification time
pub fn list_candidates(dir: &Path) -> std::io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SCAN_EXTENSION) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            candidates.push((path, metadata.modified()?));
        }
    }
    Ok(candidates)
}

// Debounce state: remembers the newest timestamp already handed out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    last_seen: Option<SystemTime>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the newest candidate and return it if it is fresh enough to reload
    pub fn observe(&mut self, candidates: &[(PathBuf, SystemTime)]) -> Option<PathBuf> {
        let (path, modified) = candidates.iter().max_by_key(|(_, modified)| *modified)?;
        let fresh = match self.last_seen {
            None => true,
            Some(last) => modified
                .duration_since(last)
                .map_or(false, |ahead| ahead > DEBOUNCE_GUARD),
        };
        if !fresh {
            return None;
        }
        self.last_seen = Some(*modified);
        Some(path.clone())
    }
}

pub struct AutoScanWatcher {
    active: Arc<AtomicBool>,
    state: Arc<Mutex<ScanState>>,
}

impl AutoScanWatcher {
    /// Spawn the polling thread continuing from `state`; a fresh `ScanState` loads the
    /// newest file on the first poll. Runs until `stop` (or drop) clears the active flag.
    pub fn start(dir: PathBuf, timing: ScanTiming, events: Sender<ScanEvent>, state: ScanState) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let state = Arc::new(Mutex::new(state));
        let active_thread = active.clone();
        let state_thread = state.clone();

        info!("Auto-scan started on {}", dir.display());
        thread::spawn(move || {
            while active_thread.load(Ordering::Relaxed) {
                match list_candidates(&dir) {
                    Ok(candidates) => {
                        let fresh = state_thread
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .observe(&candidates);
                        if let Some(path) = fresh {
                            debug!("New results file {}", path.display());
                            thread::sleep(timing.settle);
                            let _ = events.send(ScanEvent::Reload(path));
                        }
                    }
                    Err(e) => {
                        warn!("Scan of {} failed: {}", dir.display(), e);
                        let _ = events.send(ScanEvent::Error(format!("Scan error: {}", e)));
                    }
                }
                thread::sleep(timing.interval);
            }
            info!("Auto-scan stopped on {}", dir.display());
        });

        AutoScanWatcher { active, state }
    }

    /// Debounce state as of the last poll
    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Observed by the thread at the top of its next poll
    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }
}

impl Drop for AutoScanWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

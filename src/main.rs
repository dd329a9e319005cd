// Regatta Board - Race results and animations on a serial 8x30 LED character display
// Terminal editor by default, headless auto-scan / playback with --headless
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod animation;
mod app;
mod autoscan;
mod charset;
mod config;
mod engine;
mod grid;
mod protocol;
mod results;
mod templates;
mod transport;
mod types;
mod ui;

use app::App;
use config::{Args, BoardConfig};
use types::Severity;

const HEADLESS_TICK: Duration = Duration::from_millis(10);

fn init_logging(args: &Args, config: &BoardConfig) -> Result<()> {
    let log_path = match &args.log_file {
        Some(path) => path.clone(),
        None => config.log_path()?,
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_new(&args.log_level)
        .with_context(|| format!("Invalid log filter '{}'", args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = transport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<BoardConfig> {
    let cfg_arg = args.cfg.as_deref();
    let config_path = BoardConfig::config_path(cfg_arg)?;
    let config_file_exists = config_path.exists();

    let mut config = if config_file_exists {
        match BoardConfig::load_with_path(cfg_arg) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config file: {:#}", e);
                eprintln!("Config file: {}", config_path.display());
                eprintln!("Please fix the config file or delete it to regenerate with defaults.");
                return Err(e);
            }
        }
    } else {
        let mut default_config = BoardConfig::default();
        default_config.config_path = Some(config_path.clone());
        default_config
    };

    // Persist only on first run or when the command line changed something
    let args_provided = config.merge_with_args(args);
    if !config_file_exists || args_provided {
        config.save()?;
    }
    Ok(config)
}

// Startup content requested on the command line
fn load_startup_content(app: &mut App, args: &Args) {
    if let Some(results) = &args.results {
        let _ = app.engine.load_race_results(results);
    }
    if let Some(animation) = &args.animation {
        let _ = app.engine.load_animation_file(animation);
    }
    if app.watch_dir().is_some() {
        app.start_auto_scan();
    }
}

fn run_headless(app: &mut App) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    println!("Running headless, press Ctrl+C to stop");
    let mut last_shown = None;
    while running.load(Ordering::SeqCst) {
        app.pump(Instant::now());

        // Echo new status lines so headless runs are observable
        if let Some(latest) = app.engine.status().history().last() {
            let key = (latest.created, latest.text.clone());
            if last_shown.as_ref() != Some(&key) {
                println!("[{}] {}", latest.stamp, latest.text);
                last_shown = Some(key);
            }
        }
        thread::sleep(HEADLESS_TICK);
    }
    info!("Headless run stopped");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_ports {
        return list_ports();
    }

    // Set global config path immediately (before any config loads)
    BoardConfig::set_config_path(args.cfg.clone());

    let config = load_config(&args)?;
    init_logging(&args, &config)?;

    if let Some(path) = &config.config_path {
        println!("Using config file: {}", path.display());
        info!("Using config file {}", path.display());
    }

    let (transport, transport_warning) = app::open_transport(&config);
    let has_transport = transport.is_some();
    let self_test = config.self_test && has_transport;
    let self_test_pause = config.self_test_pause();

    let mut app = App::new(config, transport)?;
    if let Some(warning) = transport_warning {
        warn!("{}", warning);
        app.engine.report(warning, Severity::Warn);
    }

    if let Err(e) = app.watch_config_changes() {
        warn!("Config hot reload disabled: {:#}", e);
    }

    if self_test {
        println!("Running display self-test...");
        app.engine.run_initialization_test(self_test_pause);
    }

    load_startup_content(&mut app, &args);

    if args.headless {
        run_headless(&mut app)
    } else {
        ui::run_editor(&mut app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_content_loads_results() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("lauf.txt");
        std::fs::write(&results, "Lauf 3\nBahn 1 Kiel\n").unwrap();

        let mut config = BoardConfig::default();
        config.templates_file = dir.path().join("t.json").to_string_lossy().to_string();
        let mut app = App::new(config, None).unwrap();

        let args = Args::parse_from(["regatta-board", "--results", results.to_str().unwrap()]);
        load_startup_content(&mut app, &args);
        assert_eq!(app.engine.mode(), types::Mode::RaceResults);
        assert!(!app.is_scanning());
    }
}

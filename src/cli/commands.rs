//! Command handlers for CLI operations
//!
//! This module contains the implementation of all CLI commands.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use crate::catalog::Catalog;
use crate::cli::output::{device_lines, ScanReport};
use crate::cli::{Args, Commands};
use crate::core::config::{get_config_path, init_config, Config};
use crate::core::error::ScanError;
use crate::core::extractor;
use crate::core::scanner::Scanner;
use crate::device::replay::load_script;
use crate::device::{select_last, DeviceEnumerator, ReplayBackend, Symbology};
use crate::testdb::{print_available_scenarios, RunnerConfig, ScenarioLibrary, ScenarioRunner};

/// How often the scan loop checks for Ctrl+C
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Options of the `scan` command
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub replay: PathBuf,
    pub symbology: Option<Symbology>,
    pub tool: bool,
    pub interval_ms: Option<u64>,
    pub json: bool,
}

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
    let mut config = config.clone();
    if let Some(ref catalog) = args.catalog {
        config.catalog.path = Some(catalog.clone());
    }

    match &args.command {
        Some(Commands::Devices) => list_devices(&config)?,
        Some(Commands::Scan {
            replay,
            symbology,
            tool,
            interval_ms,
            json,
        }) => {
            let options = ScanOptions {
                replay: replay.clone(),
                symbology: *symbology,
                tool: *tool,
                interval_ms: *interval_ms,
                json: *json,
            };
            run_scan(&config, &options, shutdown_flag)?;
        }
        Some(Commands::Extract { text, json }) => extract_text(&config, text, *json)?,
        Some(Commands::Config { path, reset }) => handle_config_command(*path, *reset)?,
        Some(Commands::GenerateConfig { output }) => generate_config_file(output.clone())?,
        Some(Commands::ShowConfig) => show_config(&config),
        Some(Commands::Test {
            list,
            scenario,
            quick,
            fail_fast,
            report,
            quiet,
        }) => {
            if *list {
                print_available_scenarios();
            } else {
                let runner_config = RunnerConfig {
                    verbose: !*quiet,
                    fail_fast: *fail_fast,
                    json_report: report.as_ref().map(|p| p.to_string_lossy().into_owned()),
                };
                run_scenarios(runner_config, scenario, *quick)?;
            }
        }
        None => {
            info!("No command given. Run 'material-scan --help' to see what is available.");
            list_devices(&config)?;
        }
    }

    Ok(())
}

/// Symbology a scan expects, from the flags and the config
pub fn expected_symbology(options: &ScanOptions, config: &Config) -> Symbology {
    match options.symbology {
        Some(symbology) => symbology,
        None if options.tool => Symbology::QrCode,
        None => config.scanner.default_symbology,
    }
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    let catalog = Catalog::load_or_sample(config.catalog.path.as_deref())?;
    if config.catalog.path.is_none() {
        debug!("No catalog configured, using the built-in sample catalog");
    }
    Ok(catalog)
}

/// Run one scan session over a replayed camera feed
pub fn run_scan(config: &Config, options: &ScanOptions, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
    let script = load_script(&options.replay)
        .with_context(|| format!("Failed to load replay script '{}'", options.replay.display()))?;
    let catalog = load_catalog(config)?;

    let interval = options
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.scanner.frame_interval());
    let backend = Arc::new(
        ReplayBackend::new(config.devices.cameras.clone(), script).with_frame_interval(interval),
    );
    info!(
        "Replaying {} frame(s) from {}",
        backend.script_len(),
        options.replay.display()
    );

    let expected = expected_symbology(options, config);
    let scanner = Scanner::new(backend);
    let (tx, rx) = mpsc::channel::<std::result::Result<ScanReport, ScanError>>();

    let handle = if options.tool {
        scanner.scan_with(expected, extractor::extract_tool_code, move |outcome| {
            let _ = tx.send(outcome.map(|code| ScanReport::tool(code, &catalog)));
        })
    } else {
        scanner.scan(expected, move |outcome| {
            let _ = tx.send(outcome.map(|id| ScanReport::label(id, &catalog)));
        })
    };

    if handle.is_active() {
        info!(
            "Scanning for a {} code on {}. Press Ctrl+C to cancel.",
            expected,
            handle
                .device()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "(no device)".to_string())
        );
    }

    let outcome = loop {
        match rx.recv_timeout(CANCEL_POLL) {
            Ok(outcome) => break Some(outcome),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if shutdown_flag.load(Ordering::SeqCst) {
                    handle.cancel();
                    break None;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break None,
        }
    };

    debug!(
        "Scan session {} processed {} frame(s)",
        handle.session_id(),
        handle.frames_processed()
    );

    match outcome {
        Some(Ok(report)) => {
            report.print(options.json)?;
            Ok(())
        }
        Some(Err(err)) => {
            if err.is_retryable() {
                warn!("{}. Point the camera at the right code and scan again.", err);
            }
            Err(err.into())
        }
        None => {
            info!("Scan cancelled");
            Ok(())
        }
    }
}

/// List configured capture devices
pub fn list_devices(config: &Config) -> Result<()> {
    let backend = ReplayBackend::new(config.devices.cameras.clone(), Vec::new());
    let enumerator = DeviceEnumerator::new(&backend);

    let devices = match enumerator.list_devices() {
        Ok(devices) => devices,
        Err(ScanError::NoDeviceAvailable) => {
            info!("No capture devices configured.");
            info!("Add [[devices.cameras]] entries to the config file.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!("Found {} device(s):", devices.len());
    let selected = select_last(devices.clone());
    for line in device_lines(&devices, selected.as_ref()) {
        println!("{}", line);
    }

    Ok(())
}

/// Run the field extractor on text given on the command line
pub fn extract_text(config: &Config, text: &str, json: bool) -> Result<()> {
    let catalog = load_catalog(config)?;
    ScanReport::label(extractor::extract(text), &catalog).print(json)?;
    Ok(())
}

/// Run built-in scan scenarios
pub fn run_scenarios(runner_config: RunnerConfig, names: &[String], quick: bool) -> Result<()> {
    let known = ScenarioLibrary::names();
    for name in names.iter().filter(|n| !known.contains(n)) {
        warn!("Unknown scenario '{}' (see 'material-scan test --list')", name);
    }

    let mut runner = ScenarioRunner::with_config(runner_config);
    let summary = if !names.is_empty() {
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        runner.run_by_names(&names)
    } else if quick {
        runner.run_quick()
    } else {
        runner.run_all()
    };

    println!("Scenarios: {}/{} passed", summary.passed, summary.total);

    if summary.total == 0 {
        bail!("No scenarios matched");
    }
    if !summary.all_passed() {
        bail!("{} scenario(s) failed", summary.failed);
    }
    Ok(())
}

/// Handle the config command
pub fn handle_config_command(show_path: bool, reset: bool) -> Result<()> {
    if reset {
        // Delete existing config and create a fresh one
        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                std::fs::remove_file(&config_path)?;
                info!("Removed existing config file");
            }
        }
        let path = init_config()?;
        info!("Created fresh config file at: {}", path.display());
        return Ok(());
    }

    if show_path {
        let path = Config::get_active_config_path();
        println!("{}", path.display());
        if path.exists() {
            info!("Config file exists at: {}", path.display());
        } else {
            info!("Config file would be created at: {}", path.display());
        }
        return Ok(());
    }

    let path = init_config()?;
    info!("Config file: {}", path.display());
    info!("Edit this file to configure cameras, the catalog and logging.");
    info!("Run 'material-scan show-config' to verify your settings.");
    Ok(())
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => {
            write_default_config(&path)?;
            path
        }
        None => init_config()?,
    };

    info!("Configuration file: {}", output_path.display());
    info!("Edit this file to customize the scanner settings.");
    Ok(())
}

fn write_default_config(path: &Path) -> Result<()> {
    std::fs::write(path, Config::generate_default_config())
        .with_context(|| format!("Failed to write config file '{}'", path.display()))
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[scanner]");
    info!(
        "  default_symbology = \"{}\"",
        config.scanner.default_symbology
    );
    info!("  frame_interval_ms = {}", config.scanner.frame_interval_ms);
    info!("");
    info!("[devices]");
    if config.devices.cameras.is_empty() {
        info!("  (no cameras)");
    }
    for camera in &config.devices.cameras {
        info!("  {} = \"{}\"", camera.id, camera.label);
    }
    info!("");
    info!("[catalog]");
    match config.catalog.path {
        Some(ref path) => info!("  path = \"{}\"", path.display()),
        None => info!("  path = (built-in sample)"),
    }
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}

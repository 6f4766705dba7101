//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::device::Symbology;

/// Read supplier labels and tool tags and look them up in the material catalog
#[derive(Parser, Debug)]
#[command(name = "material-scan")]
#[command(author = "Vihaan Reddy M")]
#[command(version)]
#[command(
    about = "Read supplier labels (DataMatrix) and tool tags (QR) and look them up in the material catalog",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog file (overrides config)
    #[arg(long, global = true, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List capture devices and show which one a scan binds
    Devices,

    /// Run a scan session against a replayed camera feed
    ///
    /// The replay file holds one decode attempt per line:
    ///   miss                      no code in the frame
    ///   error <detail>            decoder or camera failure
    ///   <symbology> <text>        decoded code, e.g. "datamatrix 0107..."
    ///
    /// The scan ends on the first decoded code or error. Press Ctrl+C to
    /// cancel a scan that is still sampling.
    Scan {
        /// Replay script to feed the session
        #[arg(short, long, value_name = "FILE")]
        replay: PathBuf,

        /// Expected symbology (defaults to QR with --tool, else the config value)
        #[arg(short, long)]
        symbology: Option<Symbology>,

        /// Scan a tool tag: keep the full code text instead of parsing a label
        #[arg(long)]
        tool: bool,

        /// Delay between replayed frames in milliseconds (overrides config)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract supplier code and lot from label text without scanning
    Extract {
        /// Decoded label text
        text: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the configuration file or show where it lives
    ///
    /// The config file is stored at:
    /// - Linux: ~/.config/material_scan/config.toml
    /// - macOS: ~/Library/Application Support/material_scan/config.toml
    /// - Windows: %APPDATA%\material_scan\config.toml
    Config {
        /// Show the config file path only
        #[arg(long)]
        path: bool,

        /// Reset config to defaults (creates a fresh config file)
        #[arg(long)]
        reset: bool,
    },

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,

    /// Run built-in scan scenarios against a mock camera
    Test {
        /// List available scenarios and exit
        #[arg(long)]
        list: bool,

        /// Scenario names to run (comma-separated or repeated); all when omitted
        #[arg(short, long, value_delimiter = ',')]
        scenario: Vec<String>,

        /// Run only scenarios tagged "quick"
        #[arg(long, conflicts_with = "scenario")]
        quick: bool,

        /// Stop on first failure
        #[arg(long)]
        fail_fast: bool,

        /// Write a JSON report to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Only print the summary line
        #[arg(short, long)]
        quiet: bool,
    },
}

//! Test Database Module
//!
//! Everything needed to exercise the scan pipeline without a camera: a mock
//! capture backend driven frame by frame, a library of named scan scenarios,
//! and a runner that plays them through a real `Scanner`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use material_scan::testdb::{RunnerConfig, ScenarioRunner};
//!
//! let mut runner = ScenarioRunner::with_config(RunnerConfig {
//!     verbose: true,
//!     ..Default::default()
//! });
//! let summary = runner.run_by_names(&["label_scan", "cancelled_scan"]);
//! println!("Passed: {}/{}", summary.passed, summary.total);
//! ```
//!
//! # Available Scenarios
//!
//! ## Successful scans
//! - `label_scan` - DataMatrix label after empty frames
//! - `tool_tag_scan` - QR tool tag, text returned verbatim
//! - `short_label` / `empty_label` - Labels too short for every field
//! - `flaky_camera` - Random run of empty frames first
//! - `last_device_selected` - Three cameras, the last one binds
//! - `frames_after_completion` - Later frames are ignored
//!
//! ## Rejected scans
//! - `wrong_code_for_label` / `wrong_code_for_tool` - Symbology mismatch
//! - `decoder_failure` - Decoder error ends the scan
//!
//! ## Device problems
//! - `no_camera` - Nothing to bind
//! - `camera_busy` - Stream fails to open
//!
//! ## Open-ended scans
//! - `nothing_in_view` - Runs until cancelled
//! - `cancelled_scan` - Cancel releases the camera, no callback

pub mod mock_camera;
pub mod runner;
pub mod scenarios;

// Re-export commonly used types for convenience
pub use mock_camera::{CaptureEvent, MockCaptureBackend};
pub use runner::{RunnerConfig, ScenarioResult, ScenarioRunner, TestSummary};
pub use scenarios::{ExpectedOutcome, ScanOutcome, ScanScenario, ScanTarget, ScenarioLibrary};

/// Serializes tests that start scan sessions.
///
/// Sessions preempt each other process-wide, so concurrently running tests
/// would stop each other's scans.
#[cfg(test)]
pub(crate) fn serial() -> std::sync::MutexGuard<'static, ()> {
    static SERIAL: std::sync::Mutex<()> = std::sync::Mutex::new(());
    SERIAL.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Get a list of all available tags
pub fn list_tags() -> Vec<String> {
    let mut tags: Vec<String> = ScenarioLibrary::all_scenarios()
        .into_iter()
        .flat_map(|s| s.tags)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Print available scenarios to console
pub fn print_available_scenarios() {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                  AVAILABLE SCAN SCENARIOS                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let scenarios = ScenarioLibrary::all_scenarios();

    // Group by first tag
    let mut by_category: std::collections::BTreeMap<String, Vec<&ScanScenario>> =
        std::collections::BTreeMap::new();

    for scenario in &scenarios {
        let category = scenario
            .tags
            .first()
            .cloned()
            .unwrap_or_else(|| "other".to_string());
        by_category.entry(category).or_default().push(scenario);
    }

    for (category, scenarios) in &by_category {
        println!("📁 {}", category.to_uppercase());
        for scenario in scenarios {
            println!("   • {} - {}", scenario.name, scenario.description);
        }
        println!();
    }

    println!("Total: {} scenarios available\n", scenarios.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_tags() {
        let tags = list_tags();
        assert!(tags.contains(&"quick".to_string()));
        assert!(tags.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_quick_scenarios_pass() {
        let _serial = serial();
        let summary = ScenarioRunner::new().run_quick();
        assert!(summary.total > 0);
        assert!(summary.all_passed());
    }
}

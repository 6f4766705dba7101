//! Scenario runner
//!
//! Runs each scenario through a real `Scanner` over a fresh
//! `MockCaptureBackend`, checks the outcome against the scenario's
//! expectations, and summarizes the run.

use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::mock_camera::MockCaptureBackend;
use super::scenarios::{ExpectedOutcome, ScanOutcome, ScanScenario, ScanTarget, ScenarioLibrary};
use crate::core::extractor;
use crate::core::scanner::{ScanHandle, Scanner};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// Whether the scenario passed
    pub passed: bool,
    /// Execution time
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    /// Frames pushed by the mock camera
    pub frames_emitted: usize,
    /// Frames that reached the classifier
    pub frames_processed: u64,
    /// Camera the session bound
    pub device: Option<String>,
    /// Failure reason (if any)
    pub failure_reason: Option<String>,
}

fn as_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

impl ScenarioResult {
    /// Create a new passing result
    pub fn passed(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            duration,
            frames_emitted: 0,
            frames_processed: 0,
            device: None,
            failure_reason: None,
        }
    }

    /// Create a new failing result
    pub fn failed(name: &str, duration: Duration, reason: &str) -> Self {
        Self {
            passed: false,
            failure_reason: Some(reason.to_string()),
            ..Self::passed(name, duration)
        }
    }

    fn with_stats(mut self, stats: &ExecutionStats) -> Self {
        self.frames_emitted = stats.frames_emitted;
        self.frames_processed = stats.frames_processed;
        self.device = stats.device.clone();
        self
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub total_duration: Duration,
    pub results: Vec<ScenarioResult>,
}

impl TestSummary {
    /// Calculate pass rate as percentage
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    /// Get all failed scenario names
    pub fn failed_scenarios(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Configuration for the scenario runner
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Print every result and the summary
    pub verbose: bool,
    /// Stop at the first failing scenario
    pub fail_fast: bool,
    /// Write a JSON report to this file
    pub json_report: Option<String>,
}

/// What a scenario run observed
#[derive(Debug, Clone, Default)]
struct ExecutionStats {
    frames_emitted: usize,
    frames_processed: u64,
    device: Option<String>,
    outcomes: Vec<ScanOutcome>,
    streams_left_open: usize,
}

/// Executes scan scenarios
///
/// Each scenario starts a real session, so running scenarios preempts any
/// other scan in the process.
pub struct ScenarioRunner {
    config: RunnerConfig,
    results: Vec<ScenarioResult>,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
        }
    }

    /// Run every scenario in the library
    pub fn run_all(&mut self) -> TestSummary {
        self.run_scenarios(ScenarioLibrary::all_scenarios())
    }

    /// Run scenarios tagged `quick`
    pub fn run_quick(&mut self) -> TestSummary {
        self.run_scenarios(ScenarioLibrary::quick_scenarios())
    }

    /// Run specific scenarios by name, in library order
    pub fn run_by_names(&mut self, names: &[&str]) -> TestSummary {
        let scenarios = ScenarioLibrary::all_scenarios()
            .into_iter()
            .filter(|s| names.contains(&s.name.as_str()))
            .collect();
        self.run_scenarios(scenarios)
    }

    /// Run a list of scenarios
    pub fn run_scenarios(&mut self, scenarios: Vec<ScanScenario>) -> TestSummary {
        let start = Instant::now();
        self.results.clear();

        if self.config.verbose {
            println!("\n╔══════════════════════════════════════════════════════════════╗");
            println!("║                 MATERIAL SCAN - SCENARIO RUNNER              ║");
            println!("╚══════════════════════════════════════════════════════════════╝\n");
            println!("  Running {} scenario(s)\n", scenarios.len());
        }

        for scenario in scenarios {
            let result = self.run_single_scenario(&scenario);

            if self.config.verbose {
                Self::print_result(&result);
            }

            let should_stop = self.config.fail_fast && !result.passed;
            self.results.push(result);

            if should_stop {
                if self.config.verbose {
                    println!("\n⚠️  Stopping early due to fail-fast mode\n");
                }
                break;
            }
        }

        let summary = TestSummary {
            total: self.results.len(),
            passed: self.results.iter().filter(|r| r.passed).count(),
            failed: self.results.iter().filter(|r| !r.passed).count(),
            total_duration: start.elapsed(),
            results: self.results.clone(),
        };

        if self.config.verbose {
            Self::print_summary(&summary);
        }

        if let Some(ref path) = self.config.json_report {
            match Self::write_json_report(Path::new(path), &summary) {
                Ok(()) if self.config.verbose => println!("📄 JSON report generated: {}", path),
                Ok(()) => {}
                Err(e) => log::warn!("Failed to write JSON report '{}': {}", path, e),
            }
        }

        summary
    }

    /// Results of the last run
    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    fn run_single_scenario(&self, scenario: &ScanScenario) -> ScenarioResult {
        let start = Instant::now();
        log::debug!("Running scenario {}: {}", scenario.name, scenario.description);

        let stats = Self::execute(scenario);
        let duration = start.elapsed();

        match Self::check(scenario, &stats) {
            Ok(()) => ScenarioResult::passed(&scenario.name, duration).with_stats(&stats),
            Err(reason) => {
                ScenarioResult::failed(&scenario.name, duration, &reason).with_stats(&stats)
            }
        }
    }

    fn execute(scenario: &ScanScenario) -> ExecutionStats {
        let backend = Arc::new(MockCaptureBackend::with_devices(scenario.devices.clone()));
        if let Some(ref message) = scenario.open_failure {
            backend.fail_open(message);
        }

        let scanner = Scanner::new(backend.clone());
        let (tx, rx) = mpsc::channel();
        let symbology = scenario.target.symbology();

        let handle: ScanHandle = match scenario.target {
            ScanTarget::Label => scanner.scan(symbology, move |outcome| {
                let _ = tx.send(outcome.map_or_else(ScanOutcome::Failed, ScanOutcome::Identifier));
            }),
            ScanTarget::Tool => {
                scanner.scan_with(symbology, extractor::extract_tool_code, move |outcome| {
                    let _ = tx.send(outcome.map_or_else(ScanOutcome::Failed, ScanOutcome::ToolCode));
                })
            }
        };

        let mut stats = ExecutionStats {
            frames_emitted: backend.emit_noise(scenario.noise),
            ..Default::default()
        };

        for (index, frame) in scenario.frames.iter().enumerate() {
            if scenario.cancel_after == Some(index) {
                handle.cancel();
            }
            backend.emit(frame.clone());
            stats.frames_emitted += 1;
        }
        if scenario.cancel_after == Some(scenario.frames.len()) {
            handle.cancel();
        }

        stats.frames_processed = handle.frames_processed();
        stats.device = handle.device().map(|d| d.id);
        stats.outcomes = rx.try_iter().collect();

        // Scans that are still running are the caller's to cancel
        if scenario.expected == ExpectedOutcome::NoCompletion && scenario.cancel_after.is_none() {
            handle.cancel();
        }
        stats.streams_left_open = backend.open_streams();
        stats
    }

    fn check(scenario: &ScanScenario, stats: &ExecutionStats) -> Result<(), String> {
        match &scenario.expected {
            ExpectedOutcome::Completes(expected) => match stats.outcomes.as_slice() {
                [actual] if actual == expected => {}
                [actual] => return Err(format!("expected {:?}, got {:?}", expected, actual)),
                [] => return Err(format!("expected {:?}, scan never completed", expected)),
                many => return Err(format!("callback fired {} times", many.len())),
            },
            ExpectedOutcome::NoCompletion => {
                if let Some(outcome) = stats.outcomes.first() {
                    return Err(format!("expected no completion, got {:?}", outcome));
                }
            }
        }

        if let Some(ref expected) = scenario.expected_device {
            if stats.device.as_ref() != Some(expected) {
                return Err(format!(
                    "expected device {}, bound {:?}",
                    expected, stats.device
                ));
            }
        }

        if let Some(expected) = scenario.expected_frames {
            if stats.frames_processed != expected {
                return Err(format!(
                    "expected {} processed frames, got {}",
                    expected, stats.frames_processed
                ));
            }
        }

        if stats.streams_left_open != 0 {
            return Err(format!(
                "{} stream(s) still open after the scan ended",
                stats.streams_left_open
            ));
        }

        Ok(())
    }

    fn write_json_report(path: &Path, summary: &TestSummary) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(path, json)
    }

    /// Print a single result to console
    fn print_result(result: &ScenarioResult) {
        let (status, color) = if result.passed {
            ("✓ PASS", "\x1b[32m")
        } else {
            ("✗ FAIL", "\x1b[31m")
        };

        println!(
            "  {}{}\x1b[0m - {} ({:.2}ms)",
            color,
            status,
            result.name,
            result.duration.as_secs_f64() * 1000.0
        );

        if let Some(ref reason) = result.failure_reason {
            println!("      └─ Reason: {}", reason);
        }
    }

    /// Print summary to console
    fn print_summary(summary: &TestSummary) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                        TEST SUMMARY                          ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!(
            "║  Total:    {:>4}                                              ║",
            summary.total
        );
        println!(
            "║  Passed:   {:>4} \x1b[32m✓\x1b[0m                                             ║",
            summary.passed
        );
        println!(
            "║  Failed:   {:>4} \x1b[31m✗\x1b[0m                                             ║",
            summary.failed
        );
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!(
            "║  Pass Rate: {:>5.1}%                                          ║",
            summary.pass_rate()
        );
        println!(
            "║  Duration:  {:>5.2}s                                          ║",
            summary.total_duration.as_secs_f64()
        );
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        if !summary.failed_scenarios().is_empty() {
            println!("Failed scenarios:");
            for name in summary.failed_scenarios() {
                println!("  • {}", name);
            }
            println!();
        }
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DecodeAttempt, Symbology};
    use tempfile::tempdir;

    #[test]
    fn test_every_library_scenario_passes() {
        let _serial = crate::testdb::serial();
        let mut runner = ScenarioRunner::new();
        let summary = runner.run_all();

        assert_eq!(summary.total, ScenarioLibrary::all_scenarios().len());
        assert!(
            summary.all_passed(),
            "failed: {:?}",
            summary
                .results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| (&r.name, &r.failure_reason))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_run_by_names() {
        let _serial = crate::testdb::serial();
        let mut runner = ScenarioRunner::new();
        let summary = runner.run_by_names(&["no_camera", "label_scan", "unknown"]);

        assert_eq!(summary.total, 2);
        assert_eq!(runner.results()[0].name, "label_scan");
        assert_eq!(runner.results()[0].device.as_deref(), Some("cam-back"));
    }

    #[test]
    fn test_wrong_expectation_fails() {
        let _serial = crate::testdb::serial();
        let scenario = ScanScenario::new(
            "bad_expectation",
            "Expects a tool code from a label scan",
            ScanTarget::Label,
            vec![DecodeAttempt::success("001", Symbology::DataMatrix)],
            ExpectedOutcome::Completes(ScanOutcome::ToolCode("001".to_string())),
        );

        let mut runner = ScenarioRunner::new();
        let summary = runner.run_scenarios(vec![scenario]);

        assert_eq!(summary.failed, 1);
        assert!(summary.results[0]
            .failure_reason
            .as_ref()
            .unwrap()
            .starts_with("expected ToolCode"));
    }

    #[test]
    fn test_fail_fast_stops_early() {
        let _serial = crate::testdb::serial();
        let failing = ScanScenario::new(
            "never_completes",
            "",
            ScanTarget::Tool,
            Vec::new(),
            ExpectedOutcome::Completes(ScanOutcome::ToolCode("001".to_string())),
        );

        let mut runner = ScenarioRunner::with_config(RunnerConfig {
            fail_fast: true,
            ..Default::default()
        });
        let summary = runner.run_scenarios(vec![failing, ScenarioLibrary::tool_tag_scan()]);

        assert_eq!(summary.total, 1);
        assert_eq!(summary.failed_scenarios(), vec!["never_completes"]);
    }

    #[test]
    fn test_summary_pass_rate() {
        let summary = TestSummary {
            total: 10,
            passed: 8,
            failed: 2,
            ..Default::default()
        };
        assert!((summary.pass_rate() - 80.0).abs() < 0.001);
        assert!((TestSummary::default().pass_rate() - 100.0).abs() < 0.001);
    }

    #[test]
    fn test_json_report() {
        let _serial = crate::testdb::serial();
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut runner = ScenarioRunner::with_config(RunnerConfig {
            json_report: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        });
        runner.run_by_names(&["tool_tag_scan"]);

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(report["total"], 1);
        assert_eq!(report["results"][0]["name"], "tool_tag_scan");
        assert_eq!(report["results"][0]["passed"], true);
    }
}

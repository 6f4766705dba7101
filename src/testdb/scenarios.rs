//! Predefined scan scenarios
//!
//! Each scenario describes a camera setup, the frames the camera produces,
//! and what the caller should be told at the end. The runner replays them
//! through a real `Scanner` over the mock backend.

use crate::core::error::ScanError;
use crate::core::extractor::{self, ParsedIdentifier};
use crate::device::{CaptureDevice, DecodeAttempt, Symbology};

/// Supplier label used across scenarios
pub const SAMPLE_LABEL: &str = "010789123456788214640030101234567ABCDEFGH123";

/// What kind of code a scan is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    /// DataMatrix supplier label; yields a parsed identifier
    Label,
    /// QR tool tag; yields the tag text
    Tool,
}

impl ScanTarget {
    pub fn symbology(&self) -> Symbology {
        match self {
            ScanTarget::Label => Symbology::DataMatrix,
            ScanTarget::Tool => Symbology::QrCode,
        }
    }
}

/// What the completion callback delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Identifier(ParsedIdentifier),
    ToolCode(String),
    Failed(ScanError),
}

/// How a scenario is expected to end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutcome {
    /// The callback fires exactly once with this outcome
    Completes(ScanOutcome),
    /// The callback never fires
    NoCompletion,
}

/// A complete scan scenario
#[derive(Debug, Clone)]
pub struct ScanScenario {
    /// Scenario name for identification
    pub name: String,
    /// Description of what this scenario tests
    pub description: String,
    /// Cameras the backend reports, in enumeration order
    pub devices: Vec<CaptureDevice>,
    pub target: ScanTarget,
    /// Frames pushed after the session is bound
    pub frames: Vec<DecodeAttempt>,
    /// Upper bound of random empty frames pushed before `frames`
    pub noise: usize,
    /// Opening the stream fails with this message
    pub open_failure: Option<String>,
    /// Cancel the scan after this many frames of `frames`
    pub cancel_after: Option<usize>,
    pub expected: ExpectedOutcome,
    /// Camera the session must bind
    pub expected_device: Option<String>,
    /// Frames that must have reached the classifier
    pub expected_frames: Option<u64>,
    /// Tags for filtering scenarios
    pub tags: Vec<String>,
}

impl ScanScenario {
    /// Create a scenario over the two default cameras
    pub fn new(
        name: &str,
        description: &str,
        target: ScanTarget,
        frames: Vec<DecodeAttempt>,
        expected: ExpectedOutcome,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            devices: default_devices(),
            target,
            frames,
            noise: 0,
            open_failure: None,
            cancel_after: None,
            expected,
            expected_device: None,
            expected_frames: None,
            tags: Vec::new(),
        }
    }

    pub fn with_devices(mut self, devices: Vec<CaptureDevice>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_noise(mut self, max_misses: usize) -> Self {
        self.noise = max_misses;
        self
    }

    pub fn with_open_failure(mut self, message: &str) -> Self {
        self.open_failure = Some(message.to_string());
        self
    }

    pub fn cancel_after(mut self, frames: usize) -> Self {
        self.cancel_after = Some(frames);
        self
    }

    pub fn expect_device(mut self, device_id: &str) -> Self {
        self.expected_device = Some(device_id.to_string());
        self
    }

    pub fn expect_frames(mut self, frames: u64) -> Self {
        self.expected_frames = Some(frames);
        self
    }

    /// Add tags to the scenario
    pub fn with_tags(mut self, tags: Vec<&str>) -> Self {
        self.tags = tags.into_iter().map(String::from).collect();
        self
    }
}

fn default_devices() -> Vec<CaptureDevice> {
    vec![
        CaptureDevice::new("cam-front", "Front Camera"),
        CaptureDevice::new("cam-back", "Back Camera"),
    ]
}

fn label(text: &str) -> DecodeAttempt {
    DecodeAttempt::success(text, Symbology::DataMatrix)
}

fn tag(text: &str) -> DecodeAttempt {
    DecodeAttempt::success(text, Symbology::QrCode)
}

fn identifier(text: &str) -> ExpectedOutcome {
    ExpectedOutcome::Completes(ScanOutcome::Identifier(extractor::extract(text)))
}

fn failure(err: ScanError) -> ExpectedOutcome {
    ExpectedOutcome::Completes(ScanOutcome::Failed(err))
}

/// Collection of all predefined scenarios
pub struct ScenarioLibrary;

impl ScenarioLibrary {
    // =========================================================================
    // SUCCESSFUL SCANS
    // =========================================================================

    /// Scenario: label read after a few empty frames
    pub fn label_scan() -> ScanScenario {
        ScanScenario::new(
            "label_scan",
            "DataMatrix label read after two empty frames",
            ScanTarget::Label,
            vec![DecodeAttempt::no_code(), DecodeAttempt::no_code(), label(SAMPLE_LABEL)],
            identifier(SAMPLE_LABEL),
        )
        .expect_device("cam-back")
        .expect_frames(3)
        .with_tags(vec!["label", "success", "quick"])
    }

    /// Scenario: tool tag read on the first frame
    pub fn tool_tag_scan() -> ScanScenario {
        ScanScenario::new(
            "tool_tag_scan",
            "QR tool tag text is returned verbatim",
            ScanTarget::Tool,
            vec![tag("001")],
            ExpectedOutcome::Completes(ScanOutcome::ToolCode("001".to_string())),
        )
        .expect_frames(1)
        .with_tags(vec!["tool", "success", "quick"])
    }

    /// Scenario: label shorter than the lot field
    pub fn short_label() -> ScanScenario {
        ScanScenario::new(
            "short_label",
            "Truncated label still completes with partial fields",
            ScanTarget::Label,
            vec![label("0107891234567882146")],
            identifier("0107891234567882146"),
        )
        .with_tags(vec!["label", "edge-case", "quick"])
    }

    /// Scenario: DataMatrix with no text at all
    pub fn empty_label() -> ScanScenario {
        ScanScenario::new(
            "empty_label",
            "Empty DataMatrix text yields empty fields",
            ScanTarget::Label,
            vec![label("")],
            identifier(""),
        )
        .with_tags(vec!["label", "edge-case"])
    }

    /// Scenario: noisy camera, random number of empty frames
    pub fn flaky_camera() -> ScanScenario {
        ScanScenario::new(
            "flaky_camera",
            "Up to 40 random empty frames before the label",
            ScanTarget::Label,
            vec![label(SAMPLE_LABEL)],
            identifier(SAMPLE_LABEL),
        )
        .with_noise(40)
        .with_tags(vec!["label", "success", "noise"])
    }

    /// Scenario: three cameras, the last one wins
    pub fn last_device_selected() -> ScanScenario {
        ScanScenario::new(
            "last_device_selected",
            "Session binds the last enumerated camera",
            ScanTarget::Tool,
            vec![tag("001")],
            ExpectedOutcome::Completes(ScanOutcome::ToolCode("001".to_string())),
        )
        .with_devices(vec![
            CaptureDevice::new("usb-0", "Dock Camera"),
            CaptureDevice::new("usb-1", "Front Camera"),
            CaptureDevice::new("usb-2", "Back Camera"),
        ])
        .expect_device("usb-2")
        .with_tags(vec!["device", "quick"])
    }

    /// Scenario: frames keep coming after the result
    pub fn frames_after_completion() -> ScanScenario {
        ScanScenario::new(
            "frames_after_completion",
            "Only the first qualifying frame is reported",
            ScanTarget::Label,
            vec![label(SAMPLE_LABEL), tag("001"), DecodeAttempt::fatal("late")],
            identifier(SAMPLE_LABEL),
        )
        .expect_frames(1)
        .with_tags(vec!["label", "concurrency", "quick"])
    }

    // =========================================================================
    // REJECTED SCANS
    // =========================================================================

    /// Scenario: tool tag in front of the label scanner
    pub fn wrong_code_for_label() -> ScanScenario {
        ScanScenario::new(
            "wrong_code_for_label",
            "QR code while a DataMatrix label is expected",
            ScanTarget::Label,
            vec![DecodeAttempt::no_code(), tag("001"), label(SAMPLE_LABEL)],
            failure(ScanError::SymbologyMismatch {
                expected: Symbology::DataMatrix,
                found: Symbology::QrCode,
            }),
        )
        .expect_frames(2)
        .with_tags(vec!["tool", "error", "quick"])
    }

    /// Scenario: label in front of the tool scanner
    pub fn wrong_code_for_tool() -> ScanScenario {
        ScanScenario::new(
            "wrong_code_for_tool",
            "DataMatrix label while a QR tool tag is expected",
            ScanTarget::Tool,
            vec![label(SAMPLE_LABEL)],
            failure(ScanError::SymbologyMismatch {
                expected: Symbology::QrCode,
                found: Symbology::DataMatrix,
            }),
        )
        .with_tags(vec!["tool", "error"])
    }

    /// Scenario: decoder gives up
    pub fn decoder_failure() -> ScanScenario {
        ScanScenario::new(
            "decoder_failure",
            "Decoder error ends the scan",
            ScanTarget::Label,
            vec![DecodeAttempt::no_code(), DecodeAttempt::fatal("sensor disconnected")],
            failure(ScanError::FatalError("sensor disconnected".to_string())),
        )
        .with_tags(vec!["error", "quick"])
    }

    // =========================================================================
    // DEVICE PROBLEMS
    // =========================================================================

    /// Scenario: no camera at all
    pub fn no_camera() -> ScanScenario {
        ScanScenario::new(
            "no_camera",
            "Enumeration returns no devices",
            ScanTarget::Label,
            vec![label(SAMPLE_LABEL)],
            failure(ScanError::NoDeviceAvailable),
        )
        .with_devices(Vec::new())
        .expect_frames(0)
        .with_tags(vec!["device", "error", "quick"])
    }

    /// Scenario: camera held by another process
    pub fn camera_busy() -> ScanScenario {
        ScanScenario::new(
            "camera_busy",
            "Opening the stream fails",
            ScanTarget::Tool,
            vec![tag("001")],
            failure(ScanError::FatalError("device busy".to_string())),
        )
        .with_open_failure("device busy")
        .with_tags(vec!["device", "error"])
    }

    // =========================================================================
    // OPEN-ENDED SCANS
    // =========================================================================

    /// Scenario: nothing in view, scan never ends on its own
    pub fn nothing_in_view() -> ScanScenario {
        ScanScenario::new(
            "nothing_in_view",
            "Only empty frames; the scan keeps running",
            ScanTarget::Label,
            vec![DecodeAttempt::no_code(); 100],
            ExpectedOutcome::NoCompletion,
        )
        .expect_frames(100)
        .with_tags(vec!["label", "edge-case"])
    }

    /// Scenario: operator closes the scan view
    pub fn cancelled_scan() -> ScanScenario {
        ScanScenario::new(
            "cancelled_scan",
            "Cancel releases the camera and reports nothing",
            ScanTarget::Label,
            vec![DecodeAttempt::no_code(), DecodeAttempt::no_code(), label(SAMPLE_LABEL)],
            ExpectedOutcome::NoCompletion,
        )
        .cancel_after(2)
        .expect_frames(2)
        .with_tags(vec!["cancel", "quick"])
    }

    // =========================================================================
    // COLLECTIONS
    // =========================================================================

    /// Every scenario
    pub fn all_scenarios() -> Vec<ScanScenario> {
        vec![
            Self::label_scan(),
            Self::tool_tag_scan(),
            Self::short_label(),
            Self::empty_label(),
            Self::flaky_camera(),
            Self::last_device_selected(),
            Self::frames_after_completion(),
            Self::wrong_code_for_label(),
            Self::wrong_code_for_tool(),
            Self::decoder_failure(),
            Self::no_camera(),
            Self::camera_busy(),
            Self::nothing_in_view(),
            Self::cancelled_scan(),
        ]
    }

    /// Scenarios tagged `quick`
    pub fn quick_scenarios() -> Vec<ScanScenario> {
        Self::scenarios_by_tag("quick")
    }

    pub fn scenarios_by_tag(tag: &str) -> Vec<ScanScenario> {
        Self::all_scenarios()
            .into_iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn get_by_name(name: &str) -> Option<ScanScenario> {
        Self::all_scenarios().into_iter().find(|s| s.name == name)
    }

    /// Names of every scenario, in library order
    pub fn names() -> Vec<String> {
        Self::all_scenarios().into_iter().map(|s| s.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let names = ScenarioLibrary::names();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn test_lookup_by_name() {
        let scenario = ScenarioLibrary::get_by_name("no_camera").unwrap();
        assert!(scenario.devices.is_empty());
        assert!(ScenarioLibrary::get_by_name("does_not_exist").is_none());
    }

    #[test]
    fn test_quick_subset() {
        let quick = ScenarioLibrary::quick_scenarios();
        assert!(!quick.is_empty());
        assert!(quick.len() < ScenarioLibrary::all_scenarios().len());
        assert!(quick.iter().all(|s| s.tags.contains(&"quick".to_string())));
    }

    #[test]
    fn test_target_symbology() {
        assert_eq!(ScanTarget::Label.symbology(), Symbology::DataMatrix);
        assert_eq!(ScanTarget::Tool.symbology(), Symbology::QrCode);
    }
}

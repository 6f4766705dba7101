//! Capture abstraction traits for testability
//!
//! This module defines the contract between the scan pipeline and whatever
//! delivers decoded frames: a real camera reader, the replay backend, or the
//! mock camera used in tests. All of them implement [`CaptureBackend`] and push
//! [`DecodeAttempt`]s into a registered [`FrameSink`].
//!
//! # Architecture
//!
//! - `CaptureBackend` - Enumerates devices, opens and closes frame streams
//! - `FrameSink` - Receives one `DecodeAttempt` per sampled frame
//! - `CaptureDevice` - Identifier and label of one camera
//! - `Symbology` - The barcode format reported alongside decoded text
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use material_scan::device::traits::{CaptureBackend, CaptureDevice};
//!
//! fn describe<B: CaptureBackend>(backend: &B) -> Result<(), String> {
//!     let devices = backend.enumerate_devices().map_err(|e| e.to_string())?;
//!     for device in &devices {
//!         println!("{}", device);
//!     }
//!     Ok(())
//! }
//! ```

use crate::core::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

/// Barcode/2D-code encoding reported by the decoder
///
/// The discriminants follow the format ids of the multi-format reader family
/// the labels are printed for, so a raw format id from such a reader maps
/// straight onto this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Symbology {
    Aztec = 0,
    Codabar = 1,
    Code39 = 2,
    Code93 = 3,
    Code128 = 4,
    /// Supplier labels (GS1 DataMatrix)
    DataMatrix = 5,
    Ean8 = 6,
    Ean13 = 7,
    Itf = 8,
    MaxiCode = 9,
    Pdf417 = 10,
    /// Tool tags
    QrCode = 11,
    Rss14 = 12,
    RssExpanded = 13,
    UpcA = 14,
    UpcE = 15,
    UpcEanExtension = 16,
}

impl Symbology {
    /// Every known symbology, in format-id order
    pub const ALL: [Symbology; 17] = [
        Symbology::Aztec,
        Symbology::Codabar,
        Symbology::Code39,
        Symbology::Code93,
        Symbology::Code128,
        Symbology::DataMatrix,
        Symbology::Ean8,
        Symbology::Ean13,
        Symbology::Itf,
        Symbology::MaxiCode,
        Symbology::Pdf417,
        Symbology::QrCode,
        Symbology::Rss14,
        Symbology::RssExpanded,
        Symbology::UpcA,
        Symbology::UpcE,
        Symbology::UpcEanExtension,
    ];

    /// Map a reader format id onto a symbology
    pub fn from_format_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// The reader format id for this symbology
    pub fn format_id(&self) -> u8 {
        *self as u8
    }

    /// Check if this is a two-dimensional code
    pub fn is_2d(&self) -> bool {
        matches!(
            self,
            Symbology::Aztec
                | Symbology::DataMatrix
                | Symbology::MaxiCode
                | Symbology::Pdf417
                | Symbology::QrCode
        )
    }

    /// Get a human-readable name for this symbology
    pub fn display_name(&self) -> &'static str {
        match self {
            Symbology::Aztec => "Aztec",
            Symbology::Codabar => "Codabar",
            Symbology::Code39 => "Code 39",
            Symbology::Code93 => "Code 93",
            Symbology::Code128 => "Code 128",
            Symbology::DataMatrix => "DataMatrix",
            Symbology::Ean8 => "EAN-8",
            Symbology::Ean13 => "EAN-13",
            Symbology::Itf => "ITF",
            Symbology::MaxiCode => "MaxiCode",
            Symbology::Pdf417 => "PDF417",
            Symbology::QrCode => "QR",
            Symbology::Rss14 => "RSS-14",
            Symbology::RssExpanded => "RSS Expanded",
            Symbology::UpcA => "UPC-A",
            Symbology::UpcE => "UPC-E",
            Symbology::UpcEanExtension => "UPC/EAN extension",
        }
    }
}

impl Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Symbology {
    type Err = String;

    /// Accepts names case-insensitively, ignoring `-`, `_` and spaces, as well
    /// as raw format ids ("5", "11").
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' ' | '/'))
            .collect::<String>()
            .to_lowercase();

        if let Ok(id) = key.parse::<u8>() {
            return Self::from_format_id(id).ok_or_else(|| format!("unknown format id: {}", id));
        }

        let symbology = match key.as_str() {
            "aztec" => Symbology::Aztec,
            "codabar" => Symbology::Codabar,
            "code39" => Symbology::Code39,
            "code93" => Symbology::Code93,
            "code128" => Symbology::Code128,
            "datamatrix" | "dm" => Symbology::DataMatrix,
            "ean8" => Symbology::Ean8,
            "ean13" => Symbology::Ean13,
            "itf" => Symbology::Itf,
            "maxicode" => Symbology::MaxiCode,
            "pdf417" => Symbology::Pdf417,
            "qr" | "qrcode" => Symbology::QrCode,
            "rss14" => Symbology::Rss14,
            "rssexpanded" => Symbology::RssExpanded,
            "upca" => Symbology::UpcA,
            "upce" => Symbology::UpcE,
            "upceanextension" => Symbology::UpcEanExtension,
            _ => return Err(format!("unknown symbology: {}", s)),
        };
        Ok(symbology)
    }
}

/// Why a frame produced no usable code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeFailureKind {
    /// Nothing decodable in this frame; keep sampling
    NoCodeFound,
    /// The camera or decoder broke
    FatalError,
}

/// Result of decoding one sampled frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeAttempt {
    /// A code was decoded
    Success { text: String, symbology: Symbology },
    /// Nothing usable was decoded
    Failure {
        kind: DecodeFailureKind,
        detail: String,
    },
}

impl DecodeAttempt {
    /// A successful decode
    pub fn success(text: impl Into<String>, symbology: Symbology) -> Self {
        DecodeAttempt::Success {
            text: text.into(),
            symbology,
        }
    }

    /// A frame without any code in it
    pub fn no_code() -> Self {
        DecodeAttempt::Failure {
            kind: DecodeFailureKind::NoCodeFound,
            detail: String::new(),
        }
    }

    /// A decoder or camera failure
    pub fn fatal(detail: impl Into<String>) -> Self {
        DecodeAttempt::Failure {
            kind: DecodeFailureKind::FatalError,
            detail: detail.into(),
        }
    }

    /// Check if this attempt decoded something
    pub fn is_success(&self) -> bool {
        matches!(self, DecodeAttempt::Success { .. })
    }
}

/// A camera known to the capture backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureDevice {
    /// Backend-specific device identifier
    pub id: String,
    /// Human-readable label (e.g., "Back Camera")
    #[serde(default)]
    pub label: String,
}

impl CaptureDevice {
    /// Create a new CaptureDevice
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

impl Display for CaptureDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.label, self.id)
        }
    }
}

/// Handle to an open frame stream, returned by [`CaptureBackend::open_stream`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    /// Backend-assigned stream id
    pub stream_id: u64,
    /// Device the stream is bound to
    pub device_id: String,
}

/// Receiver of decoded frames
///
/// Backends call `deliver` once per sampled frame, from whichever thread they
/// sample on. Implementations must tolerate calls that race with stream
/// shutdown.
pub trait FrameSink: Send + Sync {
    /// Push one decode attempt
    fn deliver(&self, attempt: DecodeAttempt);
}

/// Trait for the platform capture subsystem
///
/// Both the replay backend and the mock camera implement this trait.
pub trait CaptureBackend: Send + Sync {
    /// Enumerate the available capture devices, in platform order
    fn enumerate_devices(&self) -> Result<Vec<CaptureDevice>>;

    /// Start sampling `device`, pushing every decode attempt into `sink`
    ///
    /// # Arguments
    /// * `device` - The device to bind
    /// * `sink` - Where decode attempts are delivered until the stream closes
    fn open_stream(&self, device: &CaptureDevice, sink: Arc<dyn FrameSink>)
        -> Result<StreamHandle>;

    /// Stop sampling and release the device behind `handle`
    fn close_stream(&self, handle: StreamHandle) -> Result<()>;
}

/// Turn a backend failure into the terminal error a session reports
pub(crate) fn as_fatal(err: ScanError) -> ScanError {
    match err {
        ScanError::NoDeviceAvailable | ScanError::FatalError(_) => err,
        other => ScanError::FatalError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_id_round_trip() {
        assert_eq!(Symbology::from_format_id(5), Some(Symbology::DataMatrix));
        assert_eq!(Symbology::from_format_id(11), Some(Symbology::QrCode));
        assert_eq!(Symbology::from_format_id(17), None);

        for symbology in Symbology::ALL {
            assert_eq!(
                Symbology::from_format_id(symbology.format_id()),
                Some(symbology)
            );
        }
    }

    #[test]
    fn test_symbology_from_str() {
        let cases = vec![
            ("DataMatrix", Symbology::DataMatrix),
            ("data_matrix", Symbology::DataMatrix),
            ("QR", Symbology::QrCode),
            ("qr-code", Symbology::QrCode),
            ("Code 128", Symbology::Code128),
            ("ean-13", Symbology::Ean13),
            ("5", Symbology::DataMatrix),
            ("11", Symbology::QrCode),
        ];

        for (input, expected) in cases {
            assert_eq!(input.parse::<Symbology>(), Ok(expected), "Failed for: {}", input);
        }

        assert!("hologram".parse::<Symbology>().is_err());
        assert!("42".parse::<Symbology>().is_err());
    }

    #[test]
    fn test_symbology_display() {
        assert_eq!(Symbology::DataMatrix.to_string(), "DataMatrix");
        assert_eq!(Symbology::QrCode.to_string(), "QR");
        assert!(Symbology::DataMatrix.is_2d());
        assert!(!Symbology::Code128.is_2d());
    }

    #[test]
    fn test_decode_attempt_constructors() {
        let ok = DecodeAttempt::success("abc", Symbology::QrCode);
        assert!(ok.is_success());

        match DecodeAttempt::no_code() {
            DecodeAttempt::Failure { kind, .. } => assert_eq!(kind, DecodeFailureKind::NoCodeFound),
            other => panic!("unexpected: {:?}", other),
        }

        match DecodeAttempt::fatal("sensor gone") {
            DecodeAttempt::Failure { kind, detail } => {
                assert_eq!(kind, DecodeFailureKind::FatalError);
                assert_eq!(detail, "sensor gone");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_capture_device_display() {
        assert_eq!(
            CaptureDevice::new("cam-1", "Back Camera").to_string(),
            "Back Camera (cam-1)"
        );
        assert_eq!(CaptureDevice::new("cam-2", "").to_string(), "cam-2");
    }

    #[test]
    fn test_backend_errors_become_fatal() {
        assert_eq!(
            as_fatal(ScanError::IoError("pipe closed".to_string())),
            ScanError::FatalError("IO error: pipe closed".to_string())
        );
        assert_eq!(
            as_fatal(ScanError::NoDeviceAvailable),
            ScanError::NoDeviceAvailable
        );
    }
}

//! Error types for the scan pipeline
//!
//! `NoDeviceAvailable`, `SymbologyMismatch` and `FatalError` are the terminal
//! outcomes a scan session can report through its completion callback. The
//! remaining variants come from the ambient layers (replay scripts, catalog
//! files, file I/O) and never reach a completion callback.

use crate::device::Symbology;
use thiserror::Error;

/// Main error type for the scanner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Device enumeration returned nothing
    #[error("No capture device available. Connect a camera and try again.")]
    NoDeviceAvailable,

    /// A code was read, but not of the kind this scan was looking for
    #[error("Expected a {expected} code but read a {found} code")]
    SymbologyMismatch { expected: Symbology, found: Symbology },

    /// Underlying capture or decoder failure
    #[error("Capture failure: {0}")]
    FatalError(String),

    /// A replay script line could not be parsed
    #[error("Invalid replay script at line {line}: {message}")]
    InvalidReplay { line: usize, message: String },

    /// Catalog file could not be read or parsed
    #[error("Catalog error: {0}")]
    CatalogError(String),

    /// General I/O error
    #[error("IO error: {0}")]
    IoError(String),
}

impl ScanError {
    /// Whether a caller may reasonably re-run the scan without telling the user
    /// that something broke.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::SymbologyMismatch { .. })
    }

    /// Whether this error is one of the terminal scan outcomes
    pub fn is_scan_outcome(&self) -> bool {
        matches!(
            self,
            ScanError::NoDeviceAvailable
                | ScanError::SymbologyMismatch { .. }
                | ScanError::FatalError(_)
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ScanError>;

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::IoError(err.to_string())
    }
}

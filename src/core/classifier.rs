//! Per-frame classification of decode attempts
//!
//! Rules are applied in order:
//!
//! 1. no code in frame: keep sampling
//! 2. decoder/camera failure: stop, report `FatalError`
//! 3. decoded, wrong symbology: stop, report `SymbologyMismatch`
//! 4. decoded, expected symbology: stop, hand the text to extraction
//!
//! A transient miss never ends a session, while a code of the wrong kind ends
//! it immediately instead of scanning on.

use crate::core::error::ScanError;
use crate::device::{DecodeAttempt, DecodeFailureKind, Symbology};

/// What a session should do with one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing to act on; keep sampling
    Continue,
    /// Stop the session and report this error
    Reject(ScanError),
    /// Stop the session and extract fields from this text
    Accept(String),
}

impl Verdict {
    /// Whether this verdict ends the session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Verdict::Continue)
    }
}

/// Classify one decode attempt against the symbology the scan expects
pub fn classify(attempt: DecodeAttempt, expected: Symbology) -> Verdict {
    match attempt {
        DecodeAttempt::Failure {
            kind: DecodeFailureKind::NoCodeFound,
            ..
        } => Verdict::Continue,
        DecodeAttempt::Failure {
            kind: DecodeFailureKind::FatalError,
            detail,
        } => Verdict::Reject(ScanError::FatalError(detail)),
        DecodeAttempt::Success { symbology, .. } if symbology != expected => {
            Verdict::Reject(ScanError::SymbologyMismatch {
                expected,
                found: symbology,
            })
        }
        DecodeAttempt::Success { text, .. } => Verdict::Accept(text),
    }
}

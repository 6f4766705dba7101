//! Scanner: the caller-facing scan API
//!
//! A `Scanner` starts scan sessions over one capture backend. Sessions share
//! the process-wide session token: starting a scan force-stops whatever
//! session is still running, from this scanner or any other (its device is
//! released before the call continues), and only then binds a device for the
//! new session.
//!
//! # Example
//!
//! ```rust,no_run
//! use material_scan::core::scanner::Scanner;
//! use material_scan::device::Symbology;
//! use material_scan::testdb::MockCaptureBackend;
//! use std::sync::Arc;
//!
//! let scanner = Scanner::new(Arc::new(MockCaptureBackend::new()));
//! let handle = scanner.scan(Symbology::DataMatrix, |outcome| match outcome {
//!     Ok(id) => println!("supplier {} lot {}", id.supplier_code, id.lot_formatted),
//!     Err(e) => eprintln!("scan failed: {}", e),
//! });
//!
//! // User closed the scan view
//! handle.cancel();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::core::error::Result;
use crate::core::extractor::{self, ParsedIdentifier};
use crate::core::session::{Extractor, ScanSession, SessionControl, SessionState};
use crate::device::{CaptureBackend, CaptureDevice, Symbology};

/// Handle returned by [`Scanner::scan`]
#[derive(Clone)]
pub struct ScanHandle {
    session: Arc<dyn SessionControl>,
}

impl ScanHandle {
    /// Stop the scan and release the camera
    ///
    /// Safe to call any number of times, from any state.
    pub fn cancel(&self) {
        self.session.stop();
    }

    /// Current state of the underlying session
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the session is still sampling frames
    pub fn is_active(&self) -> bool {
        matches!(
            self.session.state(),
            SessionState::Starting | SessionState::Running
        )
    }

    /// Id of the underlying session
    pub fn session_id(&self) -> u64 {
        self.session.id()
    }

    /// Device the session bound, if any
    pub fn device(&self) -> Option<CaptureDevice> {
        self.session.bound_device()
    }

    /// Frames that reached the classifier so far
    pub fn frames_processed(&self) -> u64 {
        self.session.frames_processed()
    }
}

impl std::fmt::Debug for ScanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanHandle")
            .field("session_id", &self.session.id())
            .field("state", &self.session.state())
            .finish()
    }
}

/// Starts scan sessions over a capture backend
pub struct Scanner {
    /// Capture subsystem shared by all sessions
    backend: Arc<dyn CaptureBackend>,
    /// Most recent session this scanner started
    last: Mutex<Option<Arc<dyn SessionControl>>>,
}

impl Scanner {
    /// Create a scanner over a capture backend
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            last: Mutex::new(None),
        }
    }

    /// Scan a supplier label and extract supplier code and lot number
    pub fn scan<F>(&self, expected: Symbology, on_complete: F) -> ScanHandle
    where
        F: FnOnce(Result<ParsedIdentifier>) + Send + 'static,
    {
        self.scan_with(expected, extractor::extract, on_complete)
    }

    /// Scan a code and turn its text into a payload with `extract`
    pub fn scan_with<T, F>(
        &self,
        expected: Symbology,
        extract: Extractor<T>,
        on_complete: F,
    ) -> ScanHandle
    where
        T: Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let session = ScanSession::new(Arc::clone(&self.backend), expected, extract);
        debug!("Scanner starting session {} for {}", session.id(), expected);
        *self.last() = Some(session.clone() as Arc<dyn SessionControl>);
        session.start(on_complete);

        ScanHandle {
            session: session as Arc<dyn SessionControl>,
        }
    }

    /// Cancel this scanner's running session, if any
    pub fn cancel_active(&self) {
        let last = self.last().clone();
        if let Some(session) = last {
            session.stop();
        }
    }

    /// State of this scanner's most recent session (`Idle` if there never was one)
    pub fn active_state(&self) -> SessionState {
        self.last()
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Devices the backend currently reports, in enumeration order
    pub fn devices(&self) -> Result<Vec<CaptureDevice>> {
        self.backend.enumerate_devices()
    }

    fn last(&self) -> MutexGuard<'_, Option<Arc<dyn SessionControl>>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

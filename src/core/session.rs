//! Scan Session Module
//!
//! One `ScanSession` is one attempt to read one code. It binds a capture
//! device, receives decode attempts pushed by the backend, and reports exactly
//! one outcome (or none, when cancelled) through its completion callback.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──▶ Starting ──bind──▶ Running ──cancel / result──▶ Stopping ──release──▶ Idle
//!                    │                                                          ▲
//!                    └──────────────── no device / bind failure ────────────────┘
//! ```
//!
//! The `Running → Stopping` edge is a compare-and-swap on the session state.
//! Whoever wins it (a frame carrying a result, or a cancel) releases the
//! device; every frame delivered after that edge is dropped before it reaches
//! the classifier. A cancel that loses the edge waits for the winner's release
//! instead of releasing again.
//!
//! # Exclusivity
//!
//! At most one session runs per process. `start` takes the process-wide
//! session token, stops whatever session holds it (device released), and
//! binds only then. This applies whether the session came from a
//! [`Scanner`](crate::core::scanner::Scanner) or was started directly.
//!
//! Sessions are single-use. A second `start` on the same session is rejected.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, info, trace, warn};

use crate::core::classifier::{classify, Verdict};
use crate::core::error::{Result, ScanError};
use crate::device::enumerator::DeviceEnumerator;
use crate::device::traits::as_fatal;
use crate::device::{CaptureBackend, CaptureDevice, DecodeAttempt, FrameSink, StreamHandle, Symbology};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide exclusive token: the session that last acquired it
static ACTIVE_SESSION: Mutex<Option<Arc<dyn SessionControl>>> = Mutex::new(None);

// =============================================================================
// Session State
// =============================================================================

/// Current state of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Not bound to any device
    Idle = 0,
    /// Enumerating and binding a device
    Starting = 1,
    /// Receiving frames
    Running = 2,
    /// Terminal transition taken, device being released
    Stopping = 3,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            1 => SessionState::Starting,
            2 => SessionState::Running,
            3 => SessionState::Stopping,
            _ => SessionState::Idle,
        }
    }
}

/// Callback receiving the single outcome of a session
pub type Completion<T> = Box<dyn FnOnce(Result<T>) + Send>;

/// Turns the accepted text of a qualifying frame into the session's payload
pub type Extractor<T> = fn(&str) -> T;

/// Object-safe control surface shared by sessions of any payload type
pub trait SessionControl: Send + Sync {
    /// Process-unique session id
    fn id(&self) -> u64;

    /// Current lifecycle state
    fn state(&self) -> SessionState;

    /// Cancel the session and release its device
    ///
    /// Idempotent. Returns only after the device has been released.
    fn stop(&self);

    /// Device the session bound, if it got that far
    fn bound_device(&self) -> Option<CaptureDevice>;

    /// Number of frames that reached the classifier
    fn frames_processed(&self) -> u64;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State of the session holding the process-wide token (`Idle` if none)
pub fn active_session_state() -> SessionState {
    lock(&ACTIVE_SESSION)
        .as_ref()
        .map(|s| s.state())
        .unwrap_or(SessionState::Idle)
}

// =============================================================================
// Scan Session
// =============================================================================

/// A single scan attempt against one capture device
pub struct ScanSession<T> {
    /// Process-unique id, used in log lines
    id: u64,
    /// Symbology this scan is looking for
    expected: Symbology,
    /// Payload extraction for accepted text
    extractor: Extractor<T>,
    /// Capture subsystem
    backend: Arc<dyn CaptureBackend>,
    /// `SessionState` as u8
    state: AtomicU8,
    /// Set once a completion callback has been installed
    armed: AtomicBool,
    /// Serializes bind against cancel
    lifecycle: Mutex<()>,
    /// Open stream; taking it out is what releases the device
    stream: Mutex<Option<StreamHandle>>,
    /// Paired with `settled`; guards the `Stopping → Idle` notification
    settle_lock: Mutex<()>,
    /// Signalled once a release has finished and the session is `Idle`
    settled: Condvar,
    /// Device selected at bind time
    device: Mutex<Option<CaptureDevice>>,
    /// Pending completion callback
    on_complete: Mutex<Option<Completion<T>>>,
    /// Frames that reached the classifier
    frames_processed: AtomicU64,
}

impl<T: Send + 'static> ScanSession<T> {
    /// Create an idle session
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        expected: Symbology,
        extractor: Extractor<T>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            expected,
            extractor,
            backend,
            state: AtomicU8::new(SessionState::Idle as u8),
            armed: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            stream: Mutex::new(None),
            settle_lock: Mutex::new(()),
            settled: Condvar::new(),
            device: Mutex::new(None),
            on_complete: Mutex::new(None),
            frames_processed: AtomicU64::new(0),
        })
    }

    /// Symbology this session accepts
    pub fn expected(&self) -> Symbology {
        self.expected
    }

    /// Take the process-wide token, stop the previous session, bind a device
    /// and start sampling
    ///
    /// `on_complete` is called at most once: with the extracted payload, with
    /// `NoDeviceAvailable`, `SymbologyMismatch` or `FatalError`, or never if the
    /// session is cancelled first. A session preempted by a later `start`
    /// counts as cancelled.
    pub fn start<F>(self: &Arc<Self>, on_complete: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        if !self.arm(Box::new(on_complete)) {
            return;
        }

        let bound = {
            let mut active = lock(&ACTIVE_SESSION);
            if let Some(previous) = active.take() {
                if previous.state() != SessionState::Idle {
                    debug!(
                        "Stopping scan session {} before starting {}",
                        previous.id(),
                        self.id
                    );
                }
                previous.stop();
            }
            *active = Some(Arc::clone(self) as Arc<dyn SessionControl>);
            self.bind()
        };

        // Reported outside the token so the callback may start another scan
        if let Err(err) = bound {
            self.fail(err);
        }
    }

    /// Install the completion callback
    ///
    /// Returns false, after reporting the rejection to `on_complete`, if this
    /// session was already started once.
    fn arm(&self, on_complete: Completion<T>) -> bool {
        if self.armed.swap(true, Ordering::SeqCst) {
            warn!("Scan session {} was already started", self.id);
            on_complete(Err(ScanError::FatalError(
                "scan session was already started".to_string(),
            )));
            return false;
        }
        *lock(&self.on_complete) = Some(on_complete);
        true
    }

    /// Enumerate, select and bind a device: `Idle → Starting → Running`
    ///
    /// On error the session is back in `Idle` and the callback is still
    /// pending; the caller reports the error through [`ScanSession::fail`].
    fn bind(self: &Arc<Self>) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);

        if self.transition(SessionState::Idle, SessionState::Starting).is_err() {
            return Err(ScanError::FatalError(
                "scan session is not idle".to_string(),
            ));
        }
        debug!("Scan session {} starting", self.id);

        let device = match DeviceEnumerator::new(self.backend.as_ref()).select_device() {
            Ok(device) => device,
            Err(err) => {
                self.set_state(SessionState::Idle);
                return Err(as_fatal(err));
            }
        };
        *lock(&self.device) = Some(device.clone());

        let sink: Arc<dyn FrameSink> = self.clone();
        let handle = match self.backend.open_stream(&device, sink) {
            Ok(handle) => handle,
            Err(err) => {
                self.set_state(SessionState::Idle);
                return Err(as_fatal(err));
            }
        };

        info!(
            "Scan session {} bound {} (stream {}), expecting {}",
            self.id, device, handle.stream_id, self.expected
        );
        *lock(&self.stream) = Some(handle);
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Report an error that kept the session from ever running
    fn fail(&self, err: ScanError) {
        debug!("Scan session {} failed to start: {}", self.id, err);
        self.complete(Err(err));
    }

    fn complete(&self, outcome: Result<T>) {
        let callback = lock(&self.on_complete).take();
        match callback {
            Some(callback) => callback(outcome),
            None => trace!("Scan session {} has no pending callback", self.id),
        }
    }

    fn transition(
        &self,
        from: SessionState,
        to: SessionState,
    ) -> std::result::Result<(), SessionState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(SessionState::from)
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Close the stream if it is still open
    ///
    /// Only the winner of the `Running → Stopping` edge calls this. The handle
    /// is taken out before `close_stream`, which may join the delivery thread.
    fn release_device(&self) {
        let handle = lock(&self.stream).take();
        if let Some(handle) = handle {
            let stream_id = handle.stream_id;
            match self.backend.close_stream(handle) {
                Ok(()) => info!("Scan session {} released stream {}", self.id, stream_id),
                Err(e) => warn!(
                    "Scan session {} failed to release stream {}: {}",
                    self.id, stream_id, e
                ),
            }
        }
    }

    /// Terminal transition from a frame: `Running → Stopping → Idle`
    fn finish(&self, outcome: std::result::Result<String, ScanError>) {
        if self
            .transition(SessionState::Running, SessionState::Stopping)
            .is_err()
        {
            trace!("Scan session {} already stopping, result dropped", self.id);
            return;
        }

        let result = outcome.map(|text| (self.extractor)(&text));
        match &result {
            Ok(_) => info!("Scan session {} read a {} code", self.id, self.expected),
            Err(e) => info!("Scan session {} ended: {}", self.id, e),
        }

        self.release_device();
        self.settle();
        self.complete(result);
    }

    /// `Stopping → Idle`, waking any cancel waiting on the release
    fn settle(&self) {
        self.set_state(SessionState::Idle);
        let _settle = lock(&self.settle_lock);
        self.settled.notify_all();
    }

    /// Block until a release started by someone else has finished
    fn wait_settled(&self) {
        let mut guard = lock(&self.settle_lock);
        while self.state() == SessionState::Stopping {
            guard = self
                .settled
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T: Send + 'static> FrameSink for ScanSession<T> {
    fn deliver(&self, attempt: DecodeAttempt) {
        if self.state() != SessionState::Running {
            trace!(
                "Scan session {} dropped a frame while {:?}",
                self.id,
                self.state()
            );
            return;
        }
        self.frames_processed.fetch_add(1, Ordering::Relaxed);

        match classify(attempt, self.expected) {
            Verdict::Continue => trace!("Scan session {}: no code in frame", self.id),
            Verdict::Reject(err) => self.finish(Err(err)),
            Verdict::Accept(text) => self.finish(Ok(text)),
        }
    }
}

impl<T: Send + 'static> SessionControl for ScanSession<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    fn stop(&self) {
        let discarded = {
            let _lifecycle = lock(&self.lifecycle);

            match self.transition(SessionState::Running, SessionState::Stopping) {
                Ok(()) => {
                    debug!("Scan session {} cancelled", self.id);
                    self.release_device();
                    self.settle();
                    lock(&self.on_complete).take()
                }
                Err(SessionState::Stopping) => {
                    // A frame won the race; its release is in flight
                    trace!("Scan session {} waiting for in-flight release", self.id);
                    self.wait_settled();
                    None
                }
                Err(_) => {
                    trace!("Scan session {} not running, stop ignored", self.id);
                    None
                }
            }
        };

        // Cancelled sessions report nothing; the callback is dropped unlocked
        drop(discarded);
    }

    fn bound_device(&self) -> Option<CaptureDevice> {
        lock(&self.device).clone()
    }

    fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::{self, ParsedIdentifier};
    use crate::testdb::{CaptureEvent, MockCaptureBackend};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const LABEL: &str = "010789123456788214640030101234567ABCDEFGH123";

    fn supplier_session(
        backend: &Arc<MockCaptureBackend>,
    ) -> (
        Arc<ScanSession<ParsedIdentifier>>,
        mpsc::Receiver<Result<ParsedIdentifier>>,
    ) {
        let session = ScanSession::new(backend.clone(), Symbology::DataMatrix, extractor::extract);
        let (tx, rx) = mpsc::channel();
        session.start(move |outcome| {
            let _ = tx.send(outcome);
        });
        (session, rx)
    }

    #[test]
    fn test_state_conversion() {
        assert_eq!(SessionState::from(0), SessionState::Idle);
        assert_eq!(SessionState::from(1), SessionState::Starting);
        assert_eq!(SessionState::from(2), SessionState::Running);
        assert_eq!(SessionState::from(3), SessionState::Stopping);
        assert_eq!(SessionState::from(255), SessionState::Idle); // Invalid
    }

    #[test]
    fn test_start_binds_last_device() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, _rx) = supplier_session(&backend);

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.bound_device().unwrap().id, "mock-camera-back");
        assert!(backend.is_streaming());
    }

    #[test]
    fn test_qualifying_success_completes_once() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, rx) = supplier_session(&backend);

        backend.emit(DecodeAttempt::no_code());
        backend.emit(DecodeAttempt::success(LABEL, Symbology::DataMatrix));
        backend.emit(DecodeAttempt::success(LABEL, Symbology::DataMatrix));

        let id = rx.try_recv().unwrap().unwrap();
        assert_eq!(id.supplier_code, "821464003");
        assert_eq!(id.lot_formatted, "1234567.ABCDEFGH.123");
        assert!(rx.try_recv().is_err());

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.frames_processed(), 2);
        assert!(!backend.is_streaming());
        assert_eq!(backend.release_count(), 1);
    }

    #[test]
    fn test_only_misses_never_complete() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, rx) = supplier_session(&backend);

        for _ in 0..50 {
            backend.emit(DecodeAttempt::no_code());
        }

        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.frames_processed(), 50);
        assert!(backend.is_streaming());
    }

    #[test]
    fn test_symbology_mismatch_stops_session() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, rx) = supplier_session(&backend);

        backend.emit(DecodeAttempt::success("001", Symbology::QrCode));
        let delivered_after = backend.emit(DecodeAttempt::success(LABEL, Symbology::DataMatrix));

        assert_eq!(
            rx.try_recv().unwrap(),
            Err(ScanError::SymbologyMismatch {
                expected: Symbology::DataMatrix,
                found: Symbology::QrCode,
            })
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(delivered_after, 0);
        assert_eq!(session.frames_processed(), 1);
    }

    #[test]
    fn test_late_frame_on_stale_sink_is_dropped() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, rx) = supplier_session(&backend);
        let stale_sink: Arc<dyn FrameSink> = session.clone();

        backend.emit(DecodeAttempt::fatal("usb reset"));
        stale_sink.deliver(DecodeAttempt::success(LABEL, Symbology::DataMatrix));

        assert_eq!(
            rx.try_recv().unwrap(),
            Err(ScanError::FatalError("usb reset".to_string()))
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(session.frames_processed(), 1);
    }

    #[test]
    fn test_no_device_reports_once_and_never_runs() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::with_devices(Vec::new()));
        let (session, rx) = supplier_session(&backend);

        assert_eq!(rx.try_recv().unwrap(), Err(ScanError::NoDeviceAvailable));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.bound_device().is_none());
        assert_eq!(backend.bind_count(), 0);
    }

    #[test]
    fn test_bind_failure_is_fatal() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        backend.fail_open("device busy");
        let (session, rx) = supplier_session(&backend);

        assert_eq!(
            rx.try_recv().unwrap(),
            Err(ScanError::FatalError("device busy".to_string()))
        );
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_frames_during_bind_are_ignored() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        backend.deliver_on_open(vec![DecodeAttempt::success(LABEL, Symbology::DataMatrix)]);
        let (session, rx) = supplier_session(&backend);

        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.frames_processed(), 0);
    }

    #[test]
    fn test_cancel_releases_and_is_idempotent() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, rx) = supplier_session(&backend);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!backend.is_streaming());

        session.stop();
        assert_eq!(backend.release_count(), 1);

        backend.emit(DecodeAttempt::success(LABEL, Symbology::DataMatrix));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_before_start_is_noop() {
        let backend = Arc::new(MockCaptureBackend::new());
        let session = ScanSession::new(backend.clone(), Symbology::QrCode, extractor::extract_tool_code);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_release_failure_still_ends_session() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        backend.fail_close("driver hung");
        let (session, rx) = supplier_session(&backend);

        backend.emit(DecodeAttempt::success(LABEL, Symbology::DataMatrix));

        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(session.state(), SessionState::Idle);
        session.stop();
    }

    #[test]
    fn test_second_start_is_rejected() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, _rx) = supplier_session(&backend);

        let (tx, rx) = mpsc::channel();
        session.start(move |outcome| {
            let _ = tx.send(outcome);
        });

        assert!(matches!(rx.try_recv().unwrap(), Err(ScanError::FatalError(_))));
        assert_eq!(backend.bind_count(), 1);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_event_order_for_completed_session() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (_session, _rx) = supplier_session(&backend);
        backend.emit(DecodeAttempt::fatal("sensor"));

        let events = backend.events();
        assert!(matches!(events[0], CaptureEvent::Enumerated { count: 2 }));
        assert!(matches!(events[1], CaptureEvent::Bound { .. }));
        assert!(matches!(events[2], CaptureEvent::Released { .. }));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_concurrent_frames_complete_once() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, rx) = supplier_session(&backend);
        let sink: Arc<dyn FrameSink> = session.clone();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        sink.deliver(DecodeAttempt::no_code());
                        sink.deliver(DecodeAttempt::success(LABEL, Symbology::DataMatrix));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(rx.try_recv().unwrap().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(backend.release_count(), 1);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_start_preempts_session_on_another_backend() {
        let _serial = crate::testdb::serial();
        let first_backend = Arc::new(MockCaptureBackend::new());
        let second_backend = Arc::new(MockCaptureBackend::new());

        let (first, first_rx) = supplier_session(&first_backend);
        let (second, _second_rx) = supplier_session(&second_backend);

        assert_eq!(first.state(), SessionState::Idle);
        assert_eq!(second.state(), SessionState::Running);
        assert!(!first_backend.is_streaming());
        assert_eq!(first_backend.release_count(), 1);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(active_session_state(), SessionState::Running);
    }

    #[test]
    fn test_cancel_while_starting_waits_for_bind() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let gate = backend.hold_open();
        let session = ScanSession::new(backend.clone(), Symbology::DataMatrix, extractor::extract);
        let (tx, rx) = mpsc::channel();

        let starter = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                session.start(move |outcome| {
                    let _ = tx.send(outcome);
                })
            })
        };
        assert!(gate.wait_for_arrival(Duration::from_secs(5)));
        assert_eq!(session.state(), SessionState::Starting);

        let (done_tx, done_rx) = mpsc::channel();
        let canceller = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                session.stop();
                let _ = done_tx.send(());
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        gate.open();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        starter.join().unwrap();
        canceller.join().unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(backend.bind_count(), 1);
        assert_eq!(backend.release_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_during_completion_release_waits_for_it() {
        let _serial = crate::testdb::serial();
        let backend = Arc::new(MockCaptureBackend::new());
        let (session, rx) = supplier_session(&backend);
        let gate = backend.hold_close();

        let emitter = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || backend.emit(DecodeAttempt::success(LABEL, Symbology::DataMatrix)))
        };
        assert!(gate.wait_for_arrival(Duration::from_secs(5)));
        assert_eq!(session.state(), SessionState::Stopping);

        let (done_tx, done_rx) = mpsc::channel();
        let canceller = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                session.stop();
                let _ = done_tx.send(());
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        gate.open();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(emitter.join().unwrap(), 1);
        canceller.join().unwrap();

        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(gate.arrived(), 1);
        assert_eq!(backend.release_count(), 1);
        assert_eq!(session.state(), SessionState::Idle);
    }
}

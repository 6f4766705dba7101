//! Replay capture backend
//!
//! Feeds a recorded script of decode attempts into a session as if a camera
//! were producing them, one per frame interval. Useful for exercising the scan
//! pipeline from the command line and for reproducing field reports.
//!
//! # Script format
//!
//! One decode attempt per line; blank lines and `#` comments are ignored.
//!
//! ```text
//! # nothing in view yet
//! miss
//! miss
//! # operator pointed at the tool tag first
//! qr 001
//! datamatrix 010789123456788214640030101234567ABCDEFGH123
//! error sensor disconnected
//! ```
//!
//! When the script runs out the stream stays open and silent until it is
//! closed; scans have no deadline.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::core::error::{Result, ScanError};
use crate::device::traits::{
    CaptureBackend, CaptureDevice, DecodeAttempt, FrameSink, StreamHandle, Symbology,
};

/// Parse a replay script
pub fn parse_script(script: &str) -> Result<Vec<DecodeAttempt>> {
    let mut attempts = Vec::new();

    for (index, raw) in script.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim_start()),
            None => (line, ""),
        };

        let attempt = match keyword.to_lowercase().as_str() {
            "miss" | "none" => DecodeAttempt::no_code(),
            "error" => {
                let detail = if rest.is_empty() { "decoder error" } else { rest };
                DecodeAttempt::fatal(detail)
            }
            _ => {
                let symbology: Symbology =
                    keyword.parse().map_err(|message| ScanError::InvalidReplay {
                        line: index + 1,
                        message,
                    })?;
                if rest.is_empty() {
                    return Err(ScanError::InvalidReplay {
                        line: index + 1,
                        message: format!("missing decoded text after '{}'", keyword),
                    });
                }
                DecodeAttempt::success(rest, symbology)
            }
        };
        attempts.push(attempt);
    }

    Ok(attempts)
}

/// Read and parse a replay script from disk
pub fn load_script(path: &Path) -> Result<Vec<DecodeAttempt>> {
    let content = fs::read_to_string(path)?;
    parse_script(&content)
}

/// A stream currently being replayed
struct ReplayStream {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

/// Capture backend that replays a fixed script on every stream
pub struct ReplayBackend {
    devices: Vec<CaptureDevice>,
    script: Arc<Vec<DecodeAttempt>>,
    frame_interval: Duration,
    streams: Mutex<HashMap<u64, ReplayStream>>,
    next_stream_id: AtomicU64,
}

impl ReplayBackend {
    /// Create a backend exposing `devices` and replaying `script`
    pub fn new(devices: Vec<CaptureDevice>, script: Vec<DecodeAttempt>) -> Self {
        Self {
            devices,
            script: Arc::new(script),
            frame_interval: Duration::from_millis(100),
            streams: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU64::new(1),
        }
    }

    /// Set the delay between two frames
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Number of attempts in the script
    pub fn script_len(&self) -> usize {
        self.script.len()
    }

    /// Number of streams not yet closed
    pub fn open_streams(&self) -> usize {
        self.streams().len()
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<u64, ReplayStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replay_loop(
        script: Arc<Vec<DecodeAttempt>>,
        interval: Duration,
        stop: Arc<AtomicBool>,
        sink: Arc<dyn FrameSink>,
    ) {
        for attempt in script.iter() {
            let deadline = Instant::now() + interval;
            loop {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }

            trace!("Replaying {:?}", attempt);
            sink.deliver(attempt.clone());
        }
        debug!("Replay script exhausted; stream idle until closed");
    }
}

impl CaptureBackend for ReplayBackend {
    fn enumerate_devices(&self) -> Result<Vec<CaptureDevice>> {
        Ok(self.devices.clone())
    }

    fn open_stream(
        &self,
        device: &CaptureDevice,
        sink: Arc<dyn FrameSink>,
    ) -> Result<StreamHandle> {
        if !self.devices.iter().any(|d| d.id == device.id) {
            return Err(ScanError::FatalError(format!(
                "unknown capture device: {}",
                device.id
            )));
        }

        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let stop = Arc::new(AtomicBool::new(false));

        let script = Arc::clone(&self.script);
        let interval = self.frame_interval;
        let thread_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name(format!("replay-stream-{}", stream_id))
            .spawn(move || Self::replay_loop(script, interval, thread_stop, sink))?;

        self.streams().insert(stream_id, ReplayStream { stop, worker });
        debug!("Replay stream {} opened on {}", stream_id, device);

        Ok(StreamHandle {
            stream_id,
            device_id: device.id.clone(),
        })
    }

    fn close_stream(&self, handle: StreamHandle) -> Result<()> {
        let stream = self.streams().remove(&handle.stream_id).ok_or_else(|| {
            ScanError::FatalError(format!("unknown stream: {}", handle.stream_id))
        })?;

        stream.stop.store(true, Ordering::SeqCst);
        stream.worker.thread().unpark();

        // Closing from inside a delivery must not wait on its own thread
        if stream.worker.thread().id() != thread::current().id() {
            stream
                .worker
                .join()
                .map_err(|_| ScanError::FatalError("replay thread panicked".to_string()))?;
        }

        debug!("Replay stream {} closed", handle.stream_id);
        Ok(())
    }
}

impl Drop for ReplayBackend {
    fn drop(&mut self) {
        for (_, stream) in self.streams().drain() {
            stream.stop.store(true, Ordering::SeqCst);
            stream.worker.thread().unpark();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::Scanner;
    use crate::core::session::SessionState;
    use crate::device::DecodeFailureKind;
    use std::sync::mpsc;

    const LABEL: &str = "010789123456788214640030101234567ABCDEFGH123";

    fn slow_extract(text: &str) -> String {
        thread::sleep(Duration::from_millis(300));
        text.to_string()
    }

    struct Collector(Mutex<Vec<DecodeAttempt>>);

    impl FrameSink for Collector {
        fn deliver(&self, attempt: DecodeAttempt) {
            self.0.lock().unwrap().push(attempt);
        }
    }

    fn devices() -> Vec<CaptureDevice> {
        vec![
            CaptureDevice::new("front", "Front Camera"),
            CaptureDevice::new("back", "Back Camera"),
        ]
    }

    #[test]
    fn test_parse_script() {
        let script = "\
# comment
miss

QR 001
datamatrix  010789123456788214640030101234567ABCDEFGH123
error sensor disconnected
error
";
        let attempts = parse_script(script).unwrap();

        assert_eq!(attempts.len(), 5);
        assert_eq!(attempts[0], DecodeAttempt::no_code());
        assert_eq!(attempts[1], DecodeAttempt::success("001", Symbology::QrCode));
        assert_eq!(attempts[2], DecodeAttempt::success(LABEL, Symbology::DataMatrix));
        assert_eq!(attempts[3], DecodeAttempt::fatal("sensor disconnected"));
        match &attempts[4] {
            DecodeAttempt::Failure { kind, detail } => {
                assert_eq!(*kind, DecodeFailureKind::FatalError);
                assert_eq!(detail, "decoder error");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_script_keeps_inner_spaces() {
        let attempts = parse_script("qr TOOL 001 A").unwrap();
        assert_eq!(attempts[0], DecodeAttempt::success("TOOL 001 A", Symbology::QrCode));
    }

    #[test]
    fn test_parse_script_errors() {
        assert_eq!(
            parse_script("miss\nhologram 123"),
            Err(ScanError::InvalidReplay {
                line: 2,
                message: "unknown symbology: hologram".to_string(),
            })
        );
        assert!(matches!(
            parse_script("qr"),
            Err(ScanError::InvalidReplay { line: 1, .. })
        ));
    }

    #[test]
    fn test_load_script_missing_file() {
        let err = load_script(Path::new("/definitely/not/here.replay")).unwrap_err();
        assert!(matches!(err, ScanError::IoError(_)));
    }

    #[test]
    fn test_stream_delivers_script_in_order() {
        let script = vec![
            DecodeAttempt::no_code(),
            DecodeAttempt::success("001", Symbology::QrCode),
        ];
        let backend =
            ReplayBackend::new(devices(), script.clone()).with_frame_interval(Duration::from_millis(1));
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));

        let handle = backend
            .open_stream(&CaptureDevice::new("back", ""), collector.clone())
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while collector.0.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        backend.close_stream(handle).unwrap();

        assert_eq!(*collector.0.lock().unwrap(), script);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_close_stops_delivery() {
        let script = vec![DecodeAttempt::no_code(); 1000];
        let backend = ReplayBackend::new(devices(), script).with_frame_interval(Duration::from_secs(60));
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));

        let handle = backend
            .open_stream(&CaptureDevice::new("front", ""), collector.clone())
            .unwrap();
        backend.close_stream(handle.clone()).unwrap();

        assert!(collector.0.lock().unwrap().is_empty());
        assert!(backend.close_stream(handle).is_err());
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        let backend = ReplayBackend::new(devices(), Vec::new());
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));

        let err = backend
            .open_stream(&CaptureDevice::new("ghost", ""), collector)
            .unwrap_err();
        assert!(matches!(err, ScanError::FatalError(_)));
    }

    #[test]
    fn test_scanner_over_replay() {
        let _serial = crate::testdb::serial();
        let script = parse_script(&format!("miss\nmiss\ndatamatrix {}\nqr 001\n", LABEL)).unwrap();
        let backend = Arc::new(
            ReplayBackend::new(devices(), script).with_frame_interval(Duration::from_millis(1)),
        );
        let scanner = Scanner::new(backend.clone());
        let (tx, rx) = mpsc::channel();

        let handle = scanner.scan(Symbology::DataMatrix, move |outcome| {
            let _ = tx.send(outcome);
        });

        let id = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(id.supplier_code, "821464003");
        assert_eq!(handle.device().unwrap().id, "back");
        assert_eq!(handle.frames_processed(), 3);
        assert_eq!(backend.open_streams(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_cancel_racing_completion_returns() {
        let _serial = crate::testdb::serial();
        let script = parse_script(&format!("datamatrix {}\n", LABEL)).unwrap();
        let backend = Arc::new(
            ReplayBackend::new(devices(), script).with_frame_interval(Duration::from_millis(1)),
        );
        let scanner = Scanner::new(backend.clone());
        let (tx, rx) = mpsc::channel();

        let handle = scanner.scan_with(Symbology::DataMatrix, slow_extract, move |outcome| {
            let _ = tx.send(outcome);
        });

        // The delivery thread is inside the extractor once the session is stopping
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.state() != SessionState::Stopping && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.state(), SessionState::Stopping);

        let (done_tx, done_rx) = mpsc::channel();
        let canceller = {
            let handle = handle.clone();
            thread::spawn(move || {
                handle.cancel();
                let _ = done_tx.send(());
            })
        };
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        canceller.join().unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(LABEL.to_string()));
        assert_eq!(handle.state(), SessionState::Idle);
        assert_eq!(backend.open_streams(), 0);
    }
}

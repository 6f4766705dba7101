//! Mock capture backend for testing without a camera
//!
//! `MockCaptureBackend` implements [`CaptureBackend`] over an in-memory list
//! of devices. Frames are pushed by hand with [`MockCaptureBackend::emit`],
//! which delivers synchronously on the calling thread, so tests are fully
//! deterministic. Every enumerate/bind/release is appended to an event log
//! for ordering assertions.
//!
//! A [`Gate`] installed with [`MockCaptureBackend::hold_open`] or
//! [`MockCaptureBackend::hold_close`] parks the next backend calls until the
//! test opens it, which makes a session sit in `Starting` or mid-release.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::trace;
use rand::Rng;

use crate::core::error::{Result, ScanError};
use crate::device::{CaptureBackend, CaptureDevice, DecodeAttempt, FrameSink, StreamHandle};

/// Something the mock backend was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Devices were listed
    Enumerated { count: usize },
    /// A stream was opened
    Bound { stream_id: u64, device_id: String },
    /// A stream was closed
    Released { stream_id: u64, device_id: String },
}

/// A checkpoint that backend calls wait at until it is opened
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    open: bool,
    arrived: usize,
}

impl Gate {
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until at least one call is parked at the gate.
    ///
    /// Returns false if none arrived within `timeout`.
    pub fn wait_for_arrival(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        while state.arrived == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }

    /// Let parked and future calls through
    pub fn open(&self) {
        self.state().open = true;
        self.changed.notify_all();
    }

    /// Calls that reached the gate so far
    pub fn arrived(&self) -> usize {
        self.state().arrived
    }

    fn pass(&self) {
        let mut state = self.state();
        state.arrived += 1;
        self.changed.notify_all();
        while !state.open {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Injected failures
#[derive(Debug, Clone, Default)]
struct Faults {
    enumerate: Option<String>,
    open: Option<String>,
    close: Option<String>,
}

struct MockStream {
    device_id: String,
    sink: Arc<dyn FrameSink>,
}

#[derive(Default)]
struct MockState {
    streams: BTreeMap<u64, MockStream>,
    events: Vec<CaptureEvent>,
    faults: Faults,
    on_open: Vec<DecodeAttempt>,
    open_gate: Option<Arc<Gate>>,
    close_gate: Option<Arc<Gate>>,
    binds: usize,
    releases: usize,
}

/// Scriptable in-memory camera subsystem
pub struct MockCaptureBackend {
    devices: Vec<CaptureDevice>,
    state: Mutex<MockState>,
    next_stream_id: AtomicU64,
}

impl MockCaptureBackend {
    /// Two cameras; a scan binds `mock-camera-back`
    pub fn new() -> Self {
        Self::with_devices(vec![
            CaptureDevice::new("mock-camera-front", "Mock Front Camera"),
            CaptureDevice::new("mock-camera-back", "Mock Back Camera"),
        ])
    }

    pub fn with_devices(devices: Vec<CaptureDevice>) -> Self {
        Self {
            devices,
            state: Mutex::new(MockState::default()),
            next_stream_id: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next enumerations fail with a capture error
    pub fn fail_enumeration(&self, message: &str) {
        self.state().faults.enumerate = Some(message.to_string());
    }

    /// Make the next stream opens fail with a capture error
    pub fn fail_open(&self, message: &str) {
        self.state().faults.open = Some(message.to_string());
    }

    /// Make the next stream closes fail; the stream stays open
    pub fn fail_close(&self, message: &str) {
        self.state().faults.close = Some(message.to_string());
    }

    /// Remove every injected failure
    pub fn clear_faults(&self) {
        self.state().faults = Faults::default();
    }

    /// Frames delivered from inside `open_stream`, before it returns
    pub fn deliver_on_open(&self, attempts: Vec<DecodeAttempt>) {
        self.state().on_open = attempts;
    }

    /// Park every following `open_stream` call until the returned gate opens
    pub fn hold_open(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.state().open_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Park every following `close_stream` call until the returned gate opens
    pub fn hold_close(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.state().close_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Deliver one frame to every open stream.
    ///
    /// Returns the number of streams the frame reached.
    pub fn emit(&self, attempt: DecodeAttempt) -> usize {
        // Sinks may close their stream while handling the frame
        let sinks: Vec<Arc<dyn FrameSink>> = self
            .state()
            .streams
            .values()
            .map(|s| Arc::clone(&s.sink))
            .collect();

        for sink in &sinks {
            sink.deliver(attempt.clone());
        }
        sinks.len()
    }

    /// Deliver a random number of empty frames, up to `max_misses`
    pub fn emit_noise(&self, max_misses: usize) -> usize {
        let misses = if max_misses == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_misses)
        };
        trace!("Mock camera emitting {} empty frames", misses);
        for _ in 0..misses {
            self.emit(DecodeAttempt::no_code());
        }
        misses
    }

    pub fn is_streaming(&self) -> bool {
        !self.state().streams.is_empty()
    }

    pub fn open_streams(&self) -> usize {
        self.state().streams.len()
    }

    /// Successful stream opens so far
    pub fn bind_count(&self) -> usize {
        self.state().binds
    }

    /// Successful stream closes so far
    pub fn release_count(&self) -> usize {
        self.state().releases
    }

    /// Everything the backend was asked to do, oldest first
    pub fn events(&self) -> Vec<CaptureEvent> {
        self.state().events.clone()
    }
}

impl Default for MockCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockCaptureBackend {
    fn enumerate_devices(&self) -> Result<Vec<CaptureDevice>> {
        let mut state = self.state();
        if let Some(message) = &state.faults.enumerate {
            return Err(ScanError::FatalError(message.clone()));
        }
        state.events.push(CaptureEvent::Enumerated {
            count: self.devices.len(),
        });
        Ok(self.devices.clone())
    }

    fn open_stream(
        &self,
        device: &CaptureDevice,
        sink: Arc<dyn FrameSink>,
    ) -> Result<StreamHandle> {
        let gate = self.state().open_gate.clone();
        if let Some(gate) = gate {
            gate.pass();
        }

        let early_frames = {
            let mut state = self.state();
            if let Some(message) = &state.faults.open {
                return Err(ScanError::FatalError(message.clone()));
            }
            if !self.devices.iter().any(|d| d.id == device.id) {
                return Err(ScanError::FatalError(format!(
                    "unknown capture device: {}",
                    device.id
                )));
            }
            std::mem::take(&mut state.on_open)
        };

        for attempt in early_frames {
            sink.deliver(attempt);
        }

        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.streams.insert(
            stream_id,
            MockStream {
                device_id: device.id.clone(),
                sink,
            },
        );
        state.binds += 1;
        state.events.push(CaptureEvent::Bound {
            stream_id,
            device_id: device.id.clone(),
        });

        Ok(StreamHandle {
            stream_id,
            device_id: device.id.clone(),
        })
    }

    fn close_stream(&self, handle: StreamHandle) -> Result<()> {
        let gate = self.state().close_gate.clone();
        if let Some(gate) = gate {
            gate.pass();
        }

        let mut state = self.state();
        if let Some(message) = &state.faults.close {
            return Err(ScanError::FatalError(message.clone()));
        }

        let stream = state.streams.remove(&handle.stream_id).ok_or_else(|| {
            ScanError::FatalError(format!("unknown stream: {}", handle.stream_id))
        })?;
        state.releases += 1;
        state.events.push(CaptureEvent::Released {
            stream_id: handle.stream_id,
            device_id: stream.device_id,
        });
        drop(state);

        // The sink may be the last reference to a session; drop it unlocked
        drop(stream.sink);
        Ok(())
    }
}

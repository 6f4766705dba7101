//! Capture device module
//!
//! This module provides the capture side of the scan pipeline: the traits a
//! camera backend implements, device enumeration and selection, and a replay
//! backend that feeds recorded decode attempts.
//!
//! # Submodules
//!
//! - `traits` - Capture abstraction (`CaptureBackend`, `FrameSink`) and frame types
//! - `enumerator` - Device listing and the "last device" selection policy
//! - `replay` - Backend that replays a script of decode attempts
//!
//! # Architecture
//!
//! Sessions never talk to a camera directly. They ask a `CaptureBackend` to
//! open a stream with the session registered as the `FrameSink`; the backend
//! then pushes one `DecodeAttempt` per sampled frame until the stream is
//! closed. The replay backend and the mock camera in `testdb` both implement
//! the same trait, so the whole pipeline runs without hardware.

pub mod enumerator;
pub mod replay;
pub mod traits;

pub use enumerator::{select_last, DeviceEnumerator};
pub use replay::{parse_script, ReplayBackend};
pub use traits::{
    CaptureBackend, CaptureDevice, DecodeAttempt, DecodeFailureKind, FrameSink, StreamHandle,
    Symbology,
};

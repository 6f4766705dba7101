//! Capture device enumeration and selection
//!
//! A scan always binds the **last** device the backend reports. On phones and
//! tablets the rear camera is enumerated after the front one, and on desktops
//! the most recently attached camera comes last, so this is the device an
//! operator is pointing at a label.

use log::debug;

use crate::core::error::{Result, ScanError};
use crate::device::traits::{CaptureBackend, CaptureDevice};

/// Lists capture devices and picks the one a session binds
pub struct DeviceEnumerator<'a> {
    backend: &'a dyn CaptureBackend,
}

impl<'a> DeviceEnumerator<'a> {
    /// Create an enumerator over a capture backend
    pub fn new(backend: &'a dyn CaptureBackend) -> Self {
        Self { backend }
    }

    /// List available devices in backend order
    ///
    /// Fails with `NoDeviceAvailable` when the backend reports none.
    pub fn list_devices(&self) -> Result<Vec<CaptureDevice>> {
        let devices = self.backend.enumerate_devices()?;
        debug!("Enumerated {} capture device(s)", devices.len());

        if devices.is_empty() {
            return Err(ScanError::NoDeviceAvailable);
        }
        Ok(devices)
    }

    /// Enumerate and select the device to bind
    pub fn select_device(&self) -> Result<CaptureDevice> {
        let devices = self.list_devices()?;
        select_last(devices).ok_or(ScanError::NoDeviceAvailable)
    }
}

/// Selection policy: the last device in enumeration order
pub fn select_last(devices: Vec<CaptureDevice>) -> Option<CaptureDevice> {
    devices.into_iter().last()
}

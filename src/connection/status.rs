// Connection state of a device, readable from any thread
//
// The MIDI capture and the audio engine each own one. The monitor thread and
// the cpal error callback write it; the control context only reads.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceStatus {
    Disconnected,
    /// Opening, or waiting between reconnect attempts
    Connecting,
    Connected,
    /// Last open attempt failed, or the stream reported a fault
    Error,
}

impl DeviceStatus {
    pub fn is_connected(self) -> bool {
        self == DeviceStatus::Connected
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => DeviceStatus::Connecting,
            2 => DeviceStatus::Connected,
            3 => DeviceStatus::Error,
            _ => DeviceStatus::Disconnected,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Connected => "connected",
            DeviceStatus::Error => "error",
        })
    }
}

#[derive(Clone)]
pub struct AtomicDeviceStatus(Arc<AtomicU8>);

impl AtomicDeviceStatus {
    pub fn new(status: DeviceStatus) -> Self {
        Self(Arc::new(AtomicU8::new(status as u8)))
    }

    pub fn get(&self) -> DeviceStatus {
        DeviceStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: DeviceStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

impl Default for AtomicDeviceStatus {
    fn default() -> Self {
        Self::new(DeviceStatus::Disconnected)
    }
}

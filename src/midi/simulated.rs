// Simulated MIDI backend - Virtual input ports for tests and the demo binary
//
// Bytes sent to a port go through the same `CaptureHandler` a hardware
// connection uses, on the caller's thread.

use super::capture::{CaptureHandler, MidiBackend, MidiLink};
use crate::error::{Result, TrainerError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct VirtualPort {
    plugged: bool,
    handler: Option<CaptureHandler>,
}

#[derive(Default)]
struct SimulatedState {
    ports: BTreeMap<String, VirtualPort>,
    closes: usize,
}

#[derive(Clone, Default)]
pub struct SimulatedMidiBackend {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedMidiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(names: &[&str]) -> Self {
        let backend = Self::new();
        for name in names {
            backend.add_port(name);
        }
        backend
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_port(&self, name: &str) {
        self.state().ports.insert(
            name.to_string(),
            VirtualPort {
                plugged: true,
                handler: None,
            },
        );
    }

    /// Deliver raw bytes to whoever has `port` open. Returns false if nobody does.
    pub fn send(&self, port: &str, bytes: &[u8]) -> bool {
        // Release the lock before running the handler
        let handler = self
            .state()
            .ports
            .get(port)
            .and_then(|p| p.handler.clone());
        match handler {
            Some(handler) => {
                handler.on_message(bytes);
                true
            }
            None => false,
        }
    }

    pub fn note_on(&self, port: &str, pitch: u8, velocity: u8) -> bool {
        self.send(port, &[0x90, pitch & 0x7F, velocity & 0x7F])
    }

    pub fn note_off(&self, port: &str, pitch: u8) -> bool {
        self.send(port, &[0x80, pitch & 0x7F, 0])
    }

    /// Make the port vanish from the listing. An open connection stays
    /// registered but receives nothing, like a pulled USB cable.
    pub fn unplug(&self, port: &str) {
        if let Some(p) = self.state().ports.get_mut(port) {
            p.plugged = false;
            p.handler = None;
        }
    }

    pub fn replug(&self, port: &str) {
        if let Some(p) = self.state().ports.get_mut(port) {
            p.plugged = true;
        }
    }

    pub fn is_open(&self, port: &str) -> bool {
        self.state()
            .ports
            .get(port)
            .is_some_and(|p| p.handler.is_some())
    }

    /// Connections closed so far
    pub fn close_count(&self) -> usize {
        self.state().closes
    }
}

struct SimulatedLink {
    port: String,
    state: Arc<Mutex<SimulatedState>>,
}

impl MidiLink for SimulatedLink {
    fn close(self: Box<Self>) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(p) = state.ports.get_mut(&self.port) {
            p.handler = None;
        }
        state.closes += 1;
    }
}

impl MidiBackend for SimulatedMidiBackend {
    fn input_ports(&self) -> Result<Vec<String>> {
        Ok(self
            .state()
            .ports
            .iter()
            .filter(|(_, p)| p.plugged)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn open(&self, port_name: &str, handler: CaptureHandler) -> Result<Box<dyn MidiLink>> {
        let mut state = self.state();
        let port = state
            .ports
            .get_mut(port_name)
            .filter(|p| p.plugged)
            .ok_or_else(|| TrainerError::DeviceNotFound(port_name.to_string()))?;
        if port.handler.is_some() {
            return Err(TrainerError::ConnectionFailed {
                device: port_name.to_string(),
                reason: "port already open".to_string(),
            });
        }
        port.handler = Some(handler);
        Ok(Box::new(SimulatedLink {
            port: port_name.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

// MIDI capture - Device connection lifecycle and the input callback
//
// The input callback runs on the backend's thread. It parses the message,
// stamps it with clock time and pushes it onto the note event queue. It
// never blocks: the queue push is non-blocking and the sender lock is only
// ever try_lock'ed.

use super::device::{MidiDeviceInfo, describe_ports, find_port};
use super::event::{MidiEvent, RawMidiEvent};
use crate::connection::reconnect::ReconnectionStrategy;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::error::{Result, TrainerError};
use crate::messaging::channels::NoteEventSender;
use crate::messaging::command::ControlMessage;
use crate::sequencer::clock::SharedClock;
use crossbeam_channel::Sender;
use midir::{MidiInput as MidirInput, MidiInputConnection};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const CLIENT_NAME: &str = "Music Trainer MIDI Input";
const CONNECTION_NAME: &str = "music-trainer-input";

/// Granularity of the monitor's interruptible sleeps
const MONITOR_TICK: Duration = Duration::from_millis(20);

/// Per-connection input callback state. Cloned into every connection; the
/// queue producer itself is shared so it survives reconnections.
#[derive(Clone)]
pub struct CaptureHandler {
    sender: Arc<Mutex<NoteEventSender>>,
    dropped: Arc<AtomicU64>,
    clock: SharedClock,
    /// 0-based channel filter
    channel: Option<u8>,
}

impl CaptureHandler {
    /// Handle one raw MIDI message from the backend thread
    pub fn on_message(&self, bytes: &[u8]) {
        let timestamp = self.clock.now();
        let Some(event) = MidiEvent::from_bytes(bytes) else {
            return;
        };
        if let Some(channel) = self.channel {
            if event.channel() != channel {
                return;
            }
        }

        let raw = RawMidiEvent::from_event(event, timestamp);
        match self.sender.try_lock() {
            Ok(mut sender) => {
                sender.send(raw);
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// An open input connection
pub trait MidiLink: Send {
    fn close(self: Box<Self>);
}

/// Source of MIDI input ports (hardware through midir, or simulated)
pub trait MidiBackend: Send + Sync {
    fn input_ports(&self) -> Result<Vec<String>>;
    fn open(&self, port_name: &str, handler: CaptureHandler) -> Result<Box<dyn MidiLink>>;
}

/// Hardware backend
pub struct MidirBackend;

impl MidirBackend {
    pub fn new() -> Self {
        Self
    }

    fn client() -> Result<MidirInput> {
        MidirInput::new(CLIENT_NAME).map_err(|e| TrainerError::ConnectionFailed {
            device: "MIDI subsystem".to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for MidirBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct MidirLink {
    connection: MidiInputConnection<()>,
}

impl MidiLink for MidirLink {
    fn close(self: Box<Self>) {
        let _ = self.connection.close();
    }
}

impl MidiBackend for MidirBackend {
    fn input_ports(&self) -> Result<Vec<String>> {
        let midi_in = Self::client()?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    fn open(&self, port_name: &str, handler: CaptureHandler) -> Result<Box<dyn MidiLink>> {
        let midi_in = Self::client()?;
        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|name| name == port_name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| TrainerError::DeviceNotFound(port_name.to_string()))?;

        let connection = midi_in
            .connect(
                port,
                CONNECTION_NAME,
                move |_timestamp, message, _| handler.on_message(message),
                (),
            )
            .map_err(|e| TrainerError::ConnectionFailed {
                device: port_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(MidirLink { connection }))
    }
}

struct ActiveLink {
    device: String,
    link: Box<dyn MidiLink>,
}

struct CaptureShared {
    backend: Arc<dyn MidiBackend>,
    handler: CaptureHandler,
    link: Mutex<Option<ActiveLink>>,
    status: AtomicDeviceStatus,
}

impl CaptureShared {
    fn connected_device(&self) -> Option<String> {
        self.link
            .lock()
            .ok()
            .and_then(|link| link.as_ref().map(|l| l.device.clone()))
    }

    fn connect(&self, wanted: &str) -> Result<String> {
        let ports = self.backend.input_ports()?;
        let Some(index) = find_port(&ports, wanted) else {
            self.status.set(DeviceStatus::Disconnected);
            return Err(TrainerError::DeviceNotFound(wanted.to_string()));
        };
        self.open(&ports[index])
    }

    fn open(&self, device: &str) -> Result<String> {
        self.disconnect();
        self.status.set(DeviceStatus::Connecting);

        match self.backend.open(device, self.handler.clone()) {
            Ok(link) => {
                let mut guard = self.link.lock().map_err(|_| TrainerError::ConnectionFailed {
                    device: device.to_string(),
                    reason: "capture state poisoned".to_string(),
                })?;
                *guard = Some(ActiveLink {
                    device: device.to_string(),
                    link,
                });
                self.status.set(DeviceStatus::Connected);
                log::info!("MIDI connected: {}", device);
                Ok(device.to_string())
            }
            Err(e) => {
                self.status.set(DeviceStatus::Error);
                log::error!("Failed to connect to MIDI device '{}': {}", device, e);
                Err(e)
            }
        }
    }

    fn disconnect(&self) -> bool {
        let active = match self.link.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match active {
            Some(active) => {
                active.link.close();
                self.status.set(DeviceStatus::Disconnected);
                log::info!("MIDI disconnected: {}", active.device);
                true
            }
            None => false,
        }
    }
}

/// Owns the MIDI input connection and feeds the note event queue
pub struct MidiCapture {
    shared: Arc<CaptureShared>,
}

impl MidiCapture {
    /// `input_channel` is a 1-16 channel filter; `None` accepts all channels
    pub fn new(
        backend: Arc<dyn MidiBackend>,
        sender: NoteEventSender,
        clock: SharedClock,
        input_channel: Option<u8>,
    ) -> Self {
        let dropped = sender.drop_counter();
        let handler = CaptureHandler {
            sender: Arc::new(Mutex::new(sender)),
            dropped,
            clock,
            channel: input_channel.map(|c| c.clamp(1, 16) - 1),
        };
        Self {
            shared: Arc::new(CaptureShared {
                backend,
                handler,
                link: Mutex::new(None),
                status: AtomicDeviceStatus::default(),
            }),
        }
    }

    pub fn available_devices(&self) -> Result<Vec<MidiDeviceInfo>> {
        Ok(describe_ports(&self.shared.backend.input_ports()?))
    }

    /// Connect to the port named `device` (exact name, or a unique-enough part
    /// of it). Any existing connection is closed first. Returns the port name.
    pub fn connect(&self, device: &str) -> Result<String> {
        self.shared.connect(device)
    }

    pub fn connect_by_index(&self, index: usize) -> Result<String> {
        let ports = self.shared.backend.input_ports()?;
        let name = ports
            .get(index)
            .ok_or_else(|| TrainerError::DeviceNotFound(format!("port index {}", index)))?;
        self.shared.open(name)
    }

    /// Connect to `preferred` if given, otherwise to the first port
    pub fn connect_default(&self, preferred: Option<&str>) -> Result<String> {
        match preferred {
            Some(device) => self.connect(device),
            None => self.connect_by_index(0).map_err(|_| {
                TrainerError::DeviceNotFound("no MIDI input ports available".to_string())
            }),
        }
    }

    /// Close the connection. Safe to call at any time from any thread;
    /// returns whether a connection was actually closed.
    pub fn disconnect(&self) -> bool {
        self.shared.disconnect()
    }

    pub fn status(&self) -> DeviceStatus {
        self.shared.status.get()
    }

    pub fn connected_device(&self) -> Option<String> {
        self.shared.connected_device()
    }

    /// Start the device monitor. It polls the backend every `interval`; when
    /// the connected port disappears it disconnects, reports `DeviceLost` and
    /// tries to reconnect following `strategy`.
    pub fn spawn_monitor(
        &self,
        interval: Duration,
        strategy: ReconnectionStrategy,
        control: Sender<ControlMessage>,
    ) -> MonitorHandle {
        let shared = Arc::clone(&self.shared);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("midi-monitor".to_string())
            .spawn(move || monitor_loop(shared, interval, strategy, control, stop_flag));

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to start MIDI device monitor: {}", e);
                None
            }
        };
        MonitorHandle { stop, thread }
    }
}

impl Drop for MidiCapture {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

/// Sleep up to `duration`, waking early when `stop` is set. Returns false if stopped.
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(MONITOR_TICK));
    }
}

fn monitor_loop(
    shared: Arc<CaptureShared>,
    interval: Duration,
    mut strategy: ReconnectionStrategy,
    control: Sender<ControlMessage>,
    stop: Arc<AtomicBool>,
) {
    while sleep_unless_stopped(interval, &stop) {
        let Some(device) = shared.connected_device() else {
            continue;
        };
        let present = match shared.backend.input_ports() {
            Ok(ports) => ports.iter().any(|p| p == &device),
            Err(e) => {
                log::debug!("MIDI port poll failed: {}", e);
                continue;
            }
        };
        if present {
            continue;
        }

        log::warn!("MIDI device lost: {}", device);
        shared.disconnect();
        let _ = control.send(ControlMessage::DeviceLost {
            device: device.clone(),
        });

        strategy.reset();
        let mut reconnected = false;
        while let Some(delay) = strategy.next_delay() {
            log::info!(
                "MIDI: reconnection attempt {} in {:?}",
                strategy.current_attempt(),
                delay
            );
            if !sleep_unless_stopped(delay, &stop) {
                return;
            }
            if shared.connected_device().is_some() {
                // Connected elsewhere in the meantime
                reconnected = true;
                break;
            }
            if shared.open(&device).is_ok() {
                log::info!("MIDI reconnected: {}", device);
                let _ = control.send(ControlMessage::DeviceReconnected {
                    device: device.clone(),
                });
                reconnected = true;
                break;
            }
        }
        if !reconnected {
            log::warn!("MIDI: giving up on '{}' after {} attempts", device, strategy.current_attempt());
        }
    }
}

/// Stops and joins the monitor thread when dropped
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

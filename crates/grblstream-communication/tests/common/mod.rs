//! Scripted in-memory GRBL controller for integration tests
#![allow(dead_code)]

use grblstream_communication::{LinkConfig, PortOpener, SerialLink, SerialPortInfo, Transport};
use grblstream_core::{ConnectionError, ErrorKind, EventSink, Position, Progress, SinkEvent};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const PORT: &str = "/dev/ttyUSB0";
pub const OTHER_PORT: &str = "/dev/ttyACM0";
pub const STATUS_REPLY: &str = "<Idle|WPos:0.000,0.000,0.000|FS:0,0>";

#[derive(Debug, Default)]
struct SimState {
    outbound: VecDeque<u8>,
    received: Vec<String>,
    partial: Vec<u8>,
    realtime: Vec<u8>,
    rejected: Vec<String>,
    hold: bool,
    held: VecDeque<String>,
    read_fault: Option<String>,
    write_fault: Option<String>,
    fail_open: bool,
    opens: usize,
    live_readers: usize,
}

/// Simulated controller: answers each received line with `ok`, or with
/// `error:20` for lines registered through [`GrblSim::reject`]
#[derive(Debug, Default)]
pub struct GrblSim {
    state: Mutex<SimState>,
    changed: Condvar,
}

impl GrblSim {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue raw inbound bytes
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().outbound.extend(bytes.iter().copied());
        self.changed.notify_all();
    }

    /// Queue one inbound line
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.push_bytes(&bytes);
    }

    /// Answer `line` with an error instead of `ok`
    pub fn reject(&self, line: &str) {
        self.state.lock().rejected.push(line.to_string());
    }

    /// Hold back answers until [`GrblSim::release_held`]
    pub fn set_hold(&self, hold: bool) {
        self.state.lock().hold = hold;
    }

    /// Answer every held line
    pub fn release_held(&self) {
        let mut state = self.state.lock();
        while let Some(line) = state.held.pop_front() {
            Self::answer(&mut state, &line);
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Answer the oldest held line only
    pub fn answer_one(&self) -> bool {
        let mut state = self.state.lock();
        let Some(line) = state.held.pop_front() else {
            return false;
        };
        Self::answer(&mut state, &line);
        drop(state);
        self.changed.notify_all();
        true
    }

    fn answer(state: &mut SimState, line: &str) {
        let reply: &[u8] = if state.rejected.iter().any(|r| r == line) {
            b"error:20\n"
        } else {
            b"ok\n"
        };
        state.outbound.extend(reply.iter().copied());
    }

    /// Make the next read fail
    pub fn fail_reads(&self, reason: &str) {
        self.state.lock().read_fault = Some(reason.to_string());
        self.changed.notify_all();
    }

    /// Make every write fail
    pub fn fail_writes(&self, reason: &str) {
        self.state.lock().write_fault = Some(reason.to_string());
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Lines received so far, without terminators
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Real-time bytes received so far
    pub fn realtime(&self) -> Vec<u8> {
        self.state.lock().realtime.clone()
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// Reader handles not yet dropped
    pub fn live_readers(&self) -> usize {
        self.state.lock().live_readers
    }

    /// Block until `count` lines were received
    pub fn wait_received(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.received.len() < count {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.received.len() >= count;
            }
        }
        true
    }

    fn accept_byte(state: &mut SimState, byte: u8) {
        if state.partial.is_empty() && matches!(byte, b'!' | b'~' | b'?' | 0x18) {
            state.realtime.push(byte);
            if byte == b'?' {
                state.outbound.extend(STATUS_REPLY.bytes());
                state.outbound.push_back(b'\n');
            }
            return;
        }

        if byte != b'\n' {
            state.partial.push(byte);
            return;
        }

        let line = String::from_utf8_lossy(&state.partial).trim().to_string();
        state.partial.clear();
        state.received.push(line.clone());

        if state.hold {
            state.held.push_back(line);
        } else {
            Self::answer(state, &line);
        }
    }
}

struct SimTransport {
    sim: Arc<GrblSim>,
    read_timeout: Duration,
}

impl Write for SimTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.sim.state.lock();
        if let Some(reason) = &state.write_fault {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason.clone()));
        }
        for &byte in data {
            GrblSim::accept_byte(&mut state, byte);
        }
        drop(state);
        self.sim.changed.notify_all();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for SimTransport {
    fn try_clone_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        self.sim.state.lock().live_readers += 1;
        Ok(Box::new(SimReader {
            sim: Arc::clone(&self.sim),
            read_timeout: self.read_timeout,
        }))
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.sim.state.lock().outbound.clear();
        Ok(())
    }
}

struct SimReader {
    sim: Arc<GrblSim>,
    read_timeout: Duration,
}

impl Read for SimReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.sim.state.lock();
        if state.outbound.is_empty() && state.read_fault.is_none() {
            self.sim.changed.wait_for(&mut state, self.read_timeout);
        }
        if let Some(reason) = state.read_fault.take() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason));
        }
        if state.outbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }

        let count = buf.len().min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Drop for SimReader {
    fn drop(&mut self) {
        self.sim.state.lock().live_readers -= 1;
    }
}

/// Port opener backed by a [`GrblSim`]
pub struct SimOpener {
    pub sim: Arc<GrblSim>,
}

impl PortOpener for SimOpener {
    fn open(
        &self,
        port: &str,
        _baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, ConnectionError> {
        let mut state = self.sim.state.lock();
        if state.fail_open {
            return Err(ConnectionError::FailedToOpen {
                port: port.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        state.opens += 1;
        Ok(Box::new(SimTransport {
            sim: Arc::clone(&self.sim),
            read_timeout,
        }))
    }

    fn available_ports(&self) -> Result<Vec<SerialPortInfo>, ConnectionError> {
        Ok(vec![
            SerialPortInfo::new(PORT, "USB Serial Port").with_usb_ids(0x1a86, 0x7523),
            SerialPortInfo::new(OTHER_PORT, "USB Arduino Uno"),
        ])
    }
}

/// Sink that records every event
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    changed: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Block until an event matches or the timeout passes
    pub fn wait_for(&self, predicate: impl Fn(&SinkEvent) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        loop {
            if events.iter().any(&predicate) {
                return true;
            }
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return events.iter().any(&predicate);
            }
        }
    }

    pub fn progress(&self) -> Vec<Progress> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::StatusChanged { state, raw } => Some((state.clone(), raw.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Log(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_status_change(&self, state: &str, raw: &str) {
        self.record(SinkEvent::StatusChanged {
            state: state.to_string(),
            raw: raw.to_string(),
        });
    }

    fn on_position_update(&self, position: Position) {
        self.record(SinkEvent::PositionUpdated(position));
    }

    fn on_log(&self, text: &str) {
        self.record(SinkEvent::Log(text.to_string()));
    }

    fn on_progress(&self, progress: Progress) {
        self.record(SinkEvent::Progress(progress));
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.record(SinkEvent::Error {
            kind,
            message: message.to_string(),
        });
    }
}

pub const WAIT: Duration = Duration::from_secs(2);

pub fn fast_config() -> LinkConfig {
    LinkConfig {
        settle_delay: Duration::ZERO,
        read_timeout: Duration::from_millis(10),
    }
}

/// Link over a fresh simulator, not yet connected
pub fn sim_link() -> (Arc<SerialLink>, Arc<GrblSim>, Arc<RecordingSink>) {
    let sim = GrblSim::new();
    let sink = RecordingSink::new();
    let link = Arc::new(SerialLink::with_opener(
        Arc::new(SimOpener {
            sim: Arc::clone(&sim),
        }),
        fast_config(),
        sink.clone(),
    ));
    (link, sim, sink)
}

/// Link over a fresh simulator, connected to [`PORT`]
pub fn connected_link() -> (Arc<SerialLink>, Arc<GrblSim>, Arc<RecordingSink>) {
    let (link, sim, sink) = sim_link();
    link.connect(PORT, 115200).expect("connect to simulator");
    (link, sim, sink)
}

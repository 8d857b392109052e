//! Serial link manager
//!
//! Owns one connection to a GRBL controller. A background reader thread
//! turns inbound bytes into sink events and hands command answers to the
//! response slot; writes happen synchronously on the caller's thread.
//!
//! Teardown is explicit. Call [`SerialLink::disconnect`] or run work inside
//! [`SerialLink::session`]; dropping the link does not stop the reader.

use super::exchange::{ResponseOutcome, ResponseSlot};
use super::serial::{PortOpener, SerialPortInfo, SystemPortOpener, Transport};
use super::CommandLink;
use crate::firmware::grbl::commands::RealtimeCommand;
use crate::firmware::grbl::response_parser::GrblResponseParser;
use crate::firmware::grbl::status_parser::StatusParser;
use grblstream_core::{
    ConnectionError, ConnectionState, ErrorKind, EventSink, MachineStatus, Position,
};
use parking_lot::{Mutex, RwLock};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Timing parameters of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Pause after opening so the controller can finish its reset
    pub settle_delay: Duration,
    /// Transport read timeout; bounds how long the reader takes to notice a stop
    pub read_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(2000),
            read_timeout: Duration::from_millis(100),
        }
    }
}

struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// State shared with the reader thread
struct LinkShared {
    config: LinkConfig,
    sink: Arc<dyn EventSink>,
    state: RwLock<ConnectionState>,
    status: RwLock<Option<MachineStatus>>,
    position: RwLock<Option<Position>>,
    writer: Mutex<Option<Box<dyn Transport>>>,
    port_name: RwLock<Option<String>>,
    responses: ResponseSlot,
    stream_claim: AtomicBool,
    parser: GrblResponseParser,
}

impl LinkShared {
    /// Move to `next`, returning the previous state
    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.write();
        let previous = *state;
        if previous.can_transition_to(next) {
            tracing::trace!("Connection state {} -> {}", previous, next);
        } else {
            tracing::warn!("Unexpected connection state change {} -> {}", previous, next);
        }
        *state = next;
        previous
    }

    fn port_label(&self) -> String {
        self.port_name
            .read()
            .clone()
            .unwrap_or_else(|| "port".to_string())
    }

    /// Handle one raw line from the transport
    fn handle_bytes(&self, bytes: &[u8]) {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_line(text),
            Err(e) => {
                tracing::warn!("Dropped undecodable line ({} bytes): {}", bytes.len(), e);
                self.sink
                    .on_error(ErrorKind::Decode, &format!("Could not decode line: {}", e));
            }
        }
    }

    fn handle_line(&self, text: &str) {
        let line = text.trim();
        if line.is_empty() {
            return;
        }

        tracing::trace!("GRBL: {}", line);
        self.sink.on_log(&format!("GRBL: {}", line));

        if let Some(report) = StatusParser::parse(line) {
            *self.status.write() = Some(report.machine_status());
            if let Some(position) = report.work_position {
                *self.position.write() = Some(position);
            }

            self.sink.on_status_change(&report.state, &report.raw);
            if let Some(position) = report.work_position {
                self.sink.on_position_update(position);
            }
            for field_error in &report.field_errors {
                tracing::warn!(
                    "Bad status field '{}': {}",
                    field_error.field,
                    field_error.reason
                );
                self.sink.on_error(
                    ErrorKind::Decode,
                    &format!(
                        "Could not parse position '{}': {}",
                        field_error.field, field_error.reason
                    ),
                );
            }
            return;
        }

        match self.parser.parse(line) {
            Some(response) if response.answers_command() => {
                if !self.responses.offer(line) {
                    tracing::debug!("Unsolicited response: {}", line);
                }
            }
            _ => {}
        }
    }

    /// Reader-side teardown after a transport failure
    fn fault(&self, reason: &str) {
        let message = format!("Serial error: {}", reason);
        tracing::error!("{} ({})", message, self.port_label());
        self.sink.on_error(ErrorKind::Transport, &message);
        self.sink.on_status_change("Error", &message);

        self.set_state(ConnectionState::Faulted);
        self.writer.lock().take();
        self.responses.close();

        if self.set_state(ConnectionState::Disconnected) != ConnectionState::Disconnected {
            self.sink.on_status_change(
                "Disconnected",
                &format!("Disconnected from {}", self.port_label()),
            );
        }
    }
}

fn run_reader(shared: Arc<LinkShared>, source: Box<dyn Read + Send>, stop: Arc<AtomicBool>) {
    let mut reader = BufReader::new(source);
    let mut pending = Vec::new();

    tracing::debug!("Reader started on {}", shared.port_label());

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        // Bytes read before a timeout stay in `pending` and the line is
        // completed on a later pass.
        match reader.read_until(b'\n', &mut pending) {
            Ok(0) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                shared.fault("end of stream");
                break;
            }
            Ok(_) => {
                shared.handle_bytes(&pending);
                pending.clear();
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                shared.fault(&e.to_string());
                break;
            }
        }
    }

    tracing::debug!("Reader stopped on {}", shared.port_label());
}

/// Connection manager for one GRBL controller
pub struct SerialLink {
    shared: Arc<LinkShared>,
    opener: Arc<dyn PortOpener>,
    reader: Mutex<Option<ReaderHandle>>,
    lifecycle: Mutex<()>,
}

impl SerialLink {
    /// Create a link to host serial ports with default timing
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_opener(Arc::new(SystemPortOpener), LinkConfig::default(), sink)
    }

    /// Create a link to host serial ports
    pub fn with_config(config: LinkConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::with_opener(Arc::new(SystemPortOpener), config, sink)
    }

    /// Create a link that opens transports through `opener`
    pub fn with_opener(
        opener: Arc<dyn PortOpener>,
        config: LinkConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                config,
                sink,
                state: RwLock::new(ConnectionState::Disconnected),
                status: RwLock::new(None),
                position: RwLock::new(None),
                writer: Mutex::new(None),
                port_name: RwLock::new(None),
                responses: ResponseSlot::new(),
                stream_claim: AtomicBool::new(false),
                parser: GrblResponseParser::new(),
            }),
            opener,
            reader: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// List serial ports in the order the OS reports them
    pub fn list_available_ports(&self) -> Result<Vec<SerialPortInfo>, ConnectionError> {
        self.opener.available_ports()
    }

    /// Open `port` and start the reader
    ///
    /// Connecting to the port already in use is a no-op. Connecting to a
    /// different port tears the current session down first.
    pub fn connect(&self, port: &str, baud_rate: u32) -> Result<(), ConnectionError> {
        let _lifecycle = self.lifecycle.lock();
        let sink = &self.shared.sink;

        if self.state().is_connected() {
            if self.port_name().as_deref() == Some(port) {
                tracing::debug!("Already connected to {}", port);
                return Ok(());
            }
            self.teardown();
        }
        // A reader that faulted on its own has exited but is not joined yet.
        self.join_reader();

        self.shared.set_state(ConnectionState::Connecting);
        tracing::info!("Connecting to {} at {} baud", port, baud_rate);

        let mut transport = match self
            .opener
            .open(port, baud_rate, self.shared.config.read_timeout)
        {
            Ok(transport) => transport,
            Err(e) => {
                let e = match e {
                    ConnectionError::FailedToOpen { .. } => e,
                    other => ConnectionError::FailedToOpen {
                        port: port.to_string(),
                        reason: other.to_string(),
                    },
                };
                return Err(self.open_failed(e));
            }
        };

        thread::sleep(self.shared.config.settle_delay);
        if let Err(e) = transport.discard_input() {
            tracing::warn!("Could not discard input on {}: {}", port, e);
        }

        let source = match transport.try_clone_reader() {
            Ok(source) => source,
            Err(e) => {
                return Err(self.open_failed(ConnectionError::FailedToOpen {
                    port: port.to_string(),
                    reason: e.to_string(),
                }));
            }
        };

        *self.shared.writer.lock() = Some(transport);
        *self.shared.port_name.write() = Some(port.to_string());
        *self.shared.status.write() = None;
        *self.shared.position.write() = None;
        self.shared.responses.reopen();
        self.shared.set_state(ConnectionState::Connected);

        let stop = Arc::new(AtomicBool::new(false));
        let spawned = {
            let shared = Arc::clone(&self.shared);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("grbl-reader".to_string())
                .spawn(move || run_reader(shared, source, stop))
        };

        match spawned {
            Ok(thread) => {
                *self.reader.lock() = Some(ReaderHandle { stop, thread });
            }
            Err(e) => {
                self.shared.writer.lock().take();
                self.shared.responses.close();
                return Err(self.open_failed(ConnectionError::FailedToOpen {
                    port: port.to_string(),
                    reason: e.to_string(),
                }));
            }
        }

        tracing::info!("Connected to {} at {} baud", port, baud_rate);
        sink.on_status_change("Connected", &format!("Connected to {}", port));
        Ok(())
    }

    fn open_failed(&self, error: ConnectionError) -> ConnectionError {
        self.shared.set_state(ConnectionState::Faulted);
        tracing::error!("Failed to connect: {}", error);
        self.shared
            .sink
            .on_status_change("Error", &format!("Failed to connect: {}", error));
        error
    }

    /// Stop the reader and close the transport. No-op when disconnected.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.teardown();
    }

    fn teardown(&self) {
        self.join_reader();
        self.shared.writer.lock().take();
        self.shared.responses.close();

        if self.shared.set_state(ConnectionState::Disconnected) != ConnectionState::Disconnected {
            let port = self.shared.port_label();
            tracing::info!("Disconnected from {}", port);
            self.shared
                .sink
                .on_status_change("Disconnected", &format!("Disconnected from {}", port));
        }
    }

    fn join_reader(&self) {
        let Some(handle) = self.reader.lock().take() else {
            return;
        };
        handle.stop.store(true, Ordering::Release);

        if handle.thread.thread().id() == thread::current().id() {
            tracing::warn!("Disconnect requested from the reader thread; not joining");
            return;
        }
        if handle.thread.join().is_err() {
            tracing::error!("Reader thread panicked");
        }
    }

    /// Connect, run `f`, then always disconnect
    pub fn session<T, E, F>(&self, port: &str, baud_rate: u32, f: F) -> Result<T, E>
    where
        F: FnOnce(&SerialLink) -> Result<T, E>,
        E: From<ConnectionError>,
    {
        if let Err(e) = self.connect(port, baud_rate) {
            self.disconnect();
            return Err(e.into());
        }
        let result = f(self);
        self.disconnect();
        result
    }

    /// Send one line, appending the terminator
    pub fn send_line(&self, line: &str) -> Result<(), ConnectionError> {
        let mut data = String::with_capacity(line.len() + 1);
        data.push_str(line);
        data.push('\n');
        self.write_bytes(data.as_bytes(), line, true)
    }

    /// Send a single real-time byte without terminator
    pub fn send_realtime(&self, command: RealtimeCommand) -> Result<(), ConnectionError> {
        self.write_bytes(&[command.as_byte()], &command.to_string(), false)
    }

    /// `answered` marks writes the controller acknowledges with a line
    fn write_bytes(
        &self,
        data: &[u8],
        label: &str,
        answered: bool,
    ) -> Result<(), ConnectionError> {
        let result = {
            let mut writer = self.shared.writer.lock();
            match writer.as_mut() {
                Some(transport) if self.state().is_connected() => {
                    // Counted before writing; the answer can beat the write's return.
                    if answered {
                        self.shared.responses.note_sent();
                    }
                    transport.write_all(data).and_then(|_| transport.flush())
                }
                _ => {
                    let message = format!("[Not connected] Cannot send: {}", label);
                    tracing::warn!("{}", message);
                    self.shared.sink.on_log(&message);
                    return Err(ConnectionError::NotConnected);
                }
            }
        };

        match result {
            Ok(()) => {
                tracing::debug!("Sent: {}", label);
                self.shared.sink.on_log(&format!("Sent: {}", label));
                Ok(())
            }
            Err(e) => {
                let message = format!("Serial error: {}", e);
                tracing::error!("Write failed on {}: {}", self.shared.port_label(), e);
                self.shared.sink.on_error(ErrorKind::Transport, &message);
                self.shared.sink.on_status_change("Error", &message);
                self.shared.set_state(ConnectionState::Faulted);
                self.disconnect();
                Err(ConnectionError::IoError {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Whether lines can be sent
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Last status report received on the current connection
    pub fn machine_status(&self) -> Option<MachineStatus> {
        self.shared.status.read().clone()
    }

    /// Last work position received on the current connection
    pub fn position(&self) -> Option<Position> {
        *self.shared.position.read()
    }

    /// Port of the current or most recent connection
    pub fn port_name(&self) -> Option<String> {
        self.shared.port_name.read().clone()
    }

    /// Timing parameters
    pub fn config(&self) -> LinkConfig {
        self.shared.config
    }
}

impl CommandLink for SerialLink {
    fn is_connected(&self) -> bool {
        SerialLink::is_connected(self)
    }

    fn send_line(&self, line: &str) -> Result<(), ConnectionError> {
        SerialLink::send_line(self, line)
    }

    fn claim_stream(&self) -> bool {
        let claimed = self
            .shared
            .stream_claim
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.shared.responses.reset_cancel();
        }
        claimed
    }

    fn release_stream(&self) {
        self.shared.stream_claim.store(false, Ordering::Release);
    }

    fn expect_response(&self) {
        self.shared.responses.arm();
    }

    fn wait_response(&self) -> ResponseOutcome {
        self.shared.responses.wait()
    }

    fn cancel_response(&self) {
        self.shared.responses.cancel();
    }
}

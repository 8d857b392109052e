//! Serial port transport
//!
//! Provides the low-level serial operations the link is built on:
//! - Port enumeration and discovery
//! - Opening a port at a baud rate with a read timeout
//! - Splitting an open port into a write handle and a reader handle
//! - Discarding input buffered before the link is ready

use grblstream_core::ConnectionError;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Whether the name matches the usual USB controller device patterns
    pub fn is_likely_controller(&self) -> bool {
        is_likely_controller_port(&self.port_name)
    }
}

/// List the serial ports on this host, in the order the OS reports them
pub fn list_ports() -> Result<Vec<SerialPortInfo>, ConnectionError> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::PortEnumeration {
            reason: e.to_string(),
        }
    })?;

    Ok(ports
        .iter()
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, get_port_description(port));

            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb_info) => {
                    let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                    if let Some(ref mfg) = usb_info.manufacturer {
                        info = info.with_manufacturer(mfg);
                    }
                    if let Some(ref serial) = usb_info.serial_number {
                        info = info.with_serial_number(serial);
                    }
                    info
                }
                _ => info,
            }
        })
        .collect())
}

/// Pick a default port: the first likely controller, else the first port
pub fn auto_select_port(ports: &[SerialPortInfo]) -> Option<&SerialPortInfo> {
    ports
        .iter()
        .find(|p| p.is_likely_controller())
        .or_else(|| ports.first())
}

/// Check if a port name matches CNC controller patterns
///
/// - Windows: COM* (COM1, COM2, etc.)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
fn is_likely_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// An open byte-stream connection to a controller
///
/// The link keeps this as its write handle and reads through a separate
/// handle obtained from [`Transport::try_clone_reader`]. Reads on that handle
/// must honour the read timeout the port was opened with and report it as
/// `io::ErrorKind::TimedOut` or `WouldBlock`.
pub trait Transport: Write + Send {
    /// Obtain an independent read handle on the same port
    fn try_clone_reader(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Drop whatever input is buffered but not yet read
    fn discard_input(&mut self) -> io::Result<()>;
}

/// Opens transports by port name
pub trait PortOpener: Send + Sync {
    /// Open `port` at `baud_rate`; reads time out after `read_timeout`
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, ConnectionError>;

    /// Enumerate ports this opener can reach
    fn available_ports(&self) -> Result<Vec<SerialPortInfo>, ConnectionError>;
}

/// Real serial port implementation using the serialport crate
pub struct RealSerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl Write for RealSerialPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for RealSerialPort {
    fn try_clone_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        let reader = self.port.try_clone()?;
        Ok(Box::new(reader))
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

/// Opens host serial devices, 8N1 without flow control
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, ConnectionError> {
        let builder = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);

        match builder.open() {
            Ok(port) => Ok(Box::new(RealSerialPort { port })),
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", port, e);
                Err(ConnectionError::FailedToOpen {
                    port: port.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn available_ports(&self) -> Result<Vec<SerialPortInfo>, ConnectionError> {
        list_ports()
    }
}

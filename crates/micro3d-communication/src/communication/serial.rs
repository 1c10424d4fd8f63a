//! Serial port access
//!
//! Provides low-level serial port operations for the stage controller's
//! USB serial link.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Single-shot validated port selection
//! - Baud rate, framing, parity and flow control configuration
//! - Short-timeout blocking reads for the port pump

use crate::communication::{ConnectionParams, FlowControl, SerialParity};
use micro3d_core::{ConnectionError, Error, Result};
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

    /// Whether the port describes itself as a 3D printer board
    pub fn looks_like_printer(&self) -> bool {
        let needle = "3d printer";
        self.description.to_lowercase().contains(needle)
            || self
                .manufacturer
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(needle))
    }
}

/// List available serial ports on the system
///
/// Filters ports to USB serial patterns:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => {
            let port_infos: Vec<SerialPortInfo> = ports
                .iter()
                .filter(|port| is_valid_controller_port(&port.port_name))
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
                .collect();

            tracing::debug!(count = port_infos.len(), "Enumerated serial ports");
            Ok(port_infos)
        }
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(Error::other(format!("Failed to enumerate ports: {}", e)))
        }
    }
}

/// Pick a port from an enumeration
///
/// A single port is chosen without asking. Otherwise `answer` must be the
/// index of a listed port. There is no retry here: callers that want to ask
/// again loop on [`ConnectionError::InvalidSelection`].
pub fn select_port(
    ports: &[SerialPortInfo],
    answer: Option<&str>,
) -> std::result::Result<SerialPortInfo, ConnectionError> {
    match ports {
        [] => Err(ConnectionError::NoPortsFound),
        [only] => Ok(only.clone()),
        _ => {
            let answer = answer.unwrap_or("").trim();
            answer
                .parse::<usize>()
                .ok()
                .and_then(|idx| ports.get(idx))
                .cloned()
                .ok_or_else(|| ConnectionError::InvalidSelection {
                    answer: answer.to_string(),
                    max: ports.len() - 1,
                })
        }
    }
}

/// Check if a port name matches USB serial controller patterns
fn is_valid_controller_port(port_name: &str) -> bool {
    // Windows COM ports
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    // Linux USB and ACM devices
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }

    // macOS serial and modem devices
    port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem")
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

/// Convert a parity setting to serialport format
fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

fn to_serialport_flow_control(flow_control: FlowControl) -> serialport::FlowControl {
    match flow_control {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::XonXoff => serialport::FlowControl::Software,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
    }
}

/// Low-level serial port interface
///
/// One handle writes, a cloned handle is read by the port pump thread.
/// `read` returns `ErrorKind::TimedOut` when nothing arrived within the
/// port's read timeout and `Ok(0)` once the port has gone away.
pub trait SerialPort: Send {
    /// Write all of `data` and flush it to the device
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read available data from the port
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard unread input and unsent output held by the driver
    fn purge(&mut self) -> io::Result<()>;

    /// Open a second handle to the same port
    fn try_clone(&self) -> io::Result<Box<dyn SerialPort>>;

    /// Get the port name
    fn name(&self) -> String;

    /// Close the port; closing twice is a no-op
    fn close(&mut self) -> io::Result<()>;
}

/// Real serial port implementation using serialport crate
pub struct RealSerialPort {
    name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl RealSerialPort {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> std::result::Result<Self, ConnectionError> {
        params.validate()?;

        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.read_timeout_ms.max(1)))
            .data_bits(match params.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                _ => serialport::DataBits::Eight,
            })
            .stop_bits(match params.stop_bits {
                2 => serialport::StopBits::Two,
                _ => serialport::StopBits::One,
            })
            .parity(to_serialport_parity(params.parity))
            .flow_control(to_serialport_flow_control(params.flow_control));

        match builder.open() {
            Ok(port) => {
                tracing::info!(
                    port = %params.port,
                    baud = params.baud_rate,
                    flow_control = %params.flow_control,
                    "Opened serial port"
                );
                Ok(RealSerialPort {
                    name: params.port.clone(),
                    port: Some(port),
                })
            }
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Err(map_open_error(&params.port, e))
            }
        }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is closed"))
    }
}

fn map_open_error(port: &str, e: serialport::Error) -> ConnectionError {
    match e.kind() {
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            ConnectionError::PortNotFound {
                port: port.to_string(),
            }
        }
        serialport::ErrorKind::InvalidInput => ConnectionError::InvalidParameters {
            reason: e.description.clone(),
        },
        _ if e.description.to_lowercase().contains("busy") => ConnectionError::PortInUse {
            port: port.to_string(),
        },
        _ => ConnectionError::FailedToOpen {
            port: port.to_string(),
            reason: e.description.clone(),
        },
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port_mut()?.read(buf)
    }

    fn purge(&mut self) -> io::Result<()> {
        self.port_mut()?
            .clear(serialport::ClearBuffer::All)
            .map_err(io::Error::from)
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialPort>> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is closed"))?;
        let clone = port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(RealSerialPort {
            name: self.name.clone(),
            port: Some(clone),
        }))
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            tracing::debug!(port = %self.name, "Released serial handle");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(names: &[&str]) -> Vec<SerialPortInfo> {
        names
            .iter()
            .map(|n| SerialPortInfo::new(*n, "USB Serial Port"))
            .collect()
    }

    #[test]
    fn test_port_name_filter() {
        assert!(is_valid_controller_port("COM3"));
        assert!(!is_valid_controller_port("COM"));
        assert!(!is_valid_controller_port("COMx"));
        assert!(is_valid_controller_port("/dev/ttyUSB0"));
        assert!(is_valid_controller_port("/dev/ttyACM1"));
        assert!(is_valid_controller_port("/dev/cu.usbmodem14101"));
        assert!(!is_valid_controller_port("/dev/ttyS0"));
    }

    #[test]
    fn test_select_single_port_without_answer() {
        let list = ports(&["/dev/ttyUSB0"]);
        assert_eq!(select_port(&list, None).unwrap().port_name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_select_requires_valid_index() {
        let list = ports(&["COM3", "COM4"]);
        assert_eq!(select_port(&list, Some(" 1 ")).unwrap().port_name, "COM4");
        assert!(matches!(
            select_port(&list, Some("2")),
            Err(ConnectionError::InvalidSelection { max: 1, .. })
        ));
        assert!(matches!(
            select_port(&list, Some("abc")),
            Err(ConnectionError::InvalidSelection { .. })
        ));
        assert!(matches!(
            select_port(&[], Some("0")),
            Err(ConnectionError::NoPortsFound)
        ));
    }

    #[test]
    fn test_printer_hint() {
        let info = SerialPortInfo::new("COM5", "USB 3D Printer Board");
        assert!(info.looks_like_printer());
        assert!(!SerialPortInfo::new("COM6", "USB Serial Port").looks_like_printer());
    }

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let params = ConnectionParams::for_port("/dev/ttyUSB-micro3d-missing");
        assert!(RealSerialPort::open(&params).is_err());
    }
}

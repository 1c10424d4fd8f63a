//! Serial communication layer
//!
//! Provides the pieces between the operating system's serial port and the
//! command/response coordinator:
//! - Connection parameters (baud, framing, parity, flow control)
//! - Line framing of the raw byte stream
//! - The serial channel, which owns the port and pumps bytes off it
//! - The exchange coordinator, which runs one command at a time
//! - An in-memory virtual port for simulation and tests

pub mod channel;
pub mod exchange;
pub mod framer;
pub mod serial;
pub mod virtual_port;

use micro3d_core::constants::DEFAULT_BAUD_RATE;
use micro3d_core::ConnectionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

impl fmt::Display for SerialParity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Even => write!(f, "even"),
            Self::Odd => write!(f, "odd"),
        }
    }
}

/// Flow control setting
///
/// Marlin boards over USB are driven with software XON/XOFF in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// No flow control
    None,
    /// XON/XOFF in both directions
    #[default]
    XonXoff,
    /// RTS/CTS
    Hardware,
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::XonXoff => write!(f, "xonxoff"),
            Self::Hardware => write!(f, "hardware"),
        }
    }
}

/// Parameters for opening a serial connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: FlowControl,
    /// Read timeout of the port pump; bounds how quickly a close is noticed
    pub read_timeout_ms: u64,
    /// Capacity of the queue between the port pump and the line consumer
    pub queue_capacity: usize,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: FlowControl::XonXoff,
            read_timeout_ms: 50,
            queue_capacity: 64,
        }
    }
}

impl ConnectionParams {
    /// Default parameters for the given port
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Check the parameters before touching the operating system
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.port.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port name is empty".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            });
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("invalid data bits: {}", self.data_bits),
            });
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("invalid stop bits: {}", self.stop_bits),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "queue capacity must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_controller() {
        let params = ConnectionParams::for_port("/dev/ttyUSB0");
        assert_eq!(params.baud_rate, 115_200);
        assert_eq!(params.data_bits, 8);
        assert_eq!(params.stop_bits, 1);
        assert_eq!(params.parity, SerialParity::None);
        assert_eq!(params.flow_control, FlowControl::XonXoff);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_framing() {
        let mut params = ConnectionParams::for_port("COM3");
        params.data_bits = 9;
        assert!(params.validate().is_err());

        let params = ConnectionParams::default();
        assert!(matches!(
            params.validate(),
            Err(ConnectionError::InvalidParameters { .. })
        ));
    }
}

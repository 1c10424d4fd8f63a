//! Error handling for micro3d
//!
//! Provides error types for every layer of the stage driver:
//! - Connection errors (opening and losing the serial port)
//! - Exchange errors (command/response round trips)
//! - Validation errors (commands rejected before transmission)
//! - Parse errors (controller reports that do not match the expected format)
//! - Focus and capture errors (autofocus and imaging collaborators)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Raised while discovering, opening or holding the serial connection.
/// During startup these are fatal.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Port is already in use
    #[error("Port already in use: {port}")]
    PortInUse {
        /// The name of the port that is in use.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Port enumeration found nothing to connect to
    #[error("No serial ports found. Is the controller connected and powered on?")]
    NoPortsFound,

    /// The answer to the port selection prompt was not a listed port
    #[error("Invalid port selection '{answer}': expected a number from 0 to {max}")]
    InvalidSelection {
        /// What the user typed.
        answer: String,
        /// Highest valid index.
        max: usize,
    },
}

/// Exchange error type
///
/// Represents a failed command/response round trip.
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    /// Completion token did not arrive in time
    #[error("Timed out after {timeout_ms}ms waiting for `{token}` in reply to `{command}` ({} lines received)", .partial.len())]
    Timeout {
        /// The command that was sent (without newline).
        command: String,
        /// The completion token that never arrived.
        token: String,
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
        /// Lines received before the timeout, kept for diagnostics.
        partial: Vec<String>,
    },

    /// Reading from or writing to the port failed
    #[error("I/O error during `{command}`: {reason}")]
    Io {
        /// The command being exchanged.
        command: String,
        /// The reason for the I/O error.
        reason: String,
    },

    /// The line stream ended before the completion token arrived
    #[error("Line stream closed during `{command}` ({} lines received)", .partial.len())]
    StreamClosed {
        /// The command being exchanged.
        command: String,
        /// Lines received before the stream ended.
        partial: Vec<String>,
    },

    /// The coordinator has been shut down and accepts no new commands
    #[error("Coordinator is closed")]
    Closed,
}

impl ExchangeError {
    /// Lines received before the exchange failed, if any
    pub fn partial_lines(&self) -> &[String] {
        match self {
            ExchangeError::Timeout { partial, .. } | ExchangeError::StreamClosed { partial, .. } => {
                partial
            }
            _ => &[],
        }
    }
}

/// Validation error type
///
/// Commands that fail validation never reach the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Nothing to send
    #[error("Empty command")]
    EmptyCommand,

    /// Command does not start with an accepted prefix
    #[error("Rejecting command `{command}`: must start with G or M")]
    InvalidPrefix {
        /// The rejected command.
        command: String,
    },

    /// Console input matched no trigger and is not raw G-code
    #[error("Invalid command: '{input}'. Valid commands: {valid}")]
    UnknownTrigger {
        /// The rejected input.
        input: String,
        /// Comma separated list of valid triggers.
        valid: String,
    },

    /// Command embeds a line break and would be sent as several commands
    #[error("Rejecting command `{command}`: contains an embedded line break")]
    EmbeddedNewline {
        /// The rejected command.
        command: String,
    },
}

/// Parse error type
///
/// Raised when a controller report does not match the expected format.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    /// No line of the reply carried an `X:.. Y:.. Z:..` report
    #[error("No position report found in reply: {lines:?}")]
    PositionReportNotFound {
        /// The reply lines that were searched.
        lines: Vec<String>,
    },

    /// A captured field was not a number
    #[error("Invalid number '{value}' for {field}")]
    InvalidNumber {
        /// Field label.
        field: String,
        /// Raw text.
        value: String,
    },
}

/// Focus error type
#[derive(Error, Debug, Clone)]
pub enum FocusError {
    /// Bracket growth reached its limit without an interior maximum
    #[error("No interior focus maximum within {half_width} steps; best sample Z={best_z:.3} score={best_score:.2}")]
    BracketExhausted {
        /// Z of the best sample seen.
        best_z: f64,
        /// Score of the best sample seen.
        best_score: f64,
        /// The configured maximum half width in steps.
        half_width: u32,
    },

    /// The score function returned NaN or infinity
    #[error("Focus score at Z={z:.3} is not a finite number")]
    InvalidScore {
        /// Z of the bad sample.
        z: f64,
    },
}

/// Capture error type
///
/// Raised by camera and image sink collaborators.
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    /// Camera could not produce a frame
    #[error("Camera error: {reason}")]
    Device {
        /// The reason for the failure.
        reason: String,
    },

    /// Captured data could not be decoded
    #[error("Failed to decode captured image: {reason}")]
    Decode {
        /// The reason for the failure.
        reason: String,
    },

    /// Image could not be written
    #[error("Failed to save image {path}: {reason}")]
    Save {
        /// Target path.
        path: String,
        /// The reason for the failure.
        reason: String,
    },
}

/// Main error type for micro3d
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Exchange error
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Focus error
    #[error(transparent)]
    Focus(#[from] FocusError),

    /// Capture error
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stop was requested while a sequence was running
    #[error("Interrupted")]
    Interrupted,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Exchange(ExchangeError::Timeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if this is a parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the settings crate.

use std::io;
use thiserror::Error;

/// Errors that can occur during settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file could not be loaded.
    #[error("Failed to load settings from {path}: {reason}")]
    LoadError { path: String, reason: String },

    /// The configuration file could not be saved.
    #[error("Failed to save settings to {path}: {reason}")]
    SaveError { path: String, reason: String },

    /// A configuration value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The file extension is neither `.json` nor `.toml`.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl SettingsError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::invalid("connection.baud_rate", "must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid setting 'connection.baud_rate': must be > 0"
        );

        let err = SettingsError::UnsupportedFormat("yaml".to_string());
        assert_eq!(err.to_string(), "Unsupported config format: yaml");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: SettingsError = io_err.into();
        assert!(matches!(err, SettingsError::IoError(_)));
    }
}

//! micro3d Settings Crate
//!
//! Loads, validates and saves the configuration file: serial connection,
//! command deadlines, step sizes, scan and focus parameters, and the camera.

pub mod config;
pub mod error;

pub use config::{
    default_config_path, CameraSettings, Config, ConnectionSettings, FocusSettings,
    MachineSettings, ScanSettings, TimeoutSettings, AUTO_PORT, OUTPUT_PLACEHOLDER,
};
pub use error::{SettingsError, SettingsResult};

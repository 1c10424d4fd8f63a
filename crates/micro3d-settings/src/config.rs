//! Configuration for micro3d
//!
//! Provides configuration file handling and validation. Supports JSON and TOML
//! files; the default file lives in the platform config directory.
//!
//! Configuration is organized into sections:
//! - Connection settings (port, serial framing, boot delay)
//! - Command deadlines
//! - Machine step sizes
//! - Grid scan and Z stack parameters
//! - Autofocus bracket
//! - Camera capture program

use crate::error::{SettingsError, SettingsResult};
use micro3d_communication::{
    ConnectionParams, FlowControl, SerialParity, StageTimeouts, StepSizes,
};
use micro3d_core::constants::{DEFAULT_BAUD_RATE, SMALLEST_XY, SMALLEST_Z};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port value that means "discover the port at startup"
pub const AUTO_PORT: &str = "Auto";

/// Placeholder in the camera command replaced by the output file path
pub use micro3d_core::constants::OUTPUT_PLACEHOLDER;

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name, or `Auto`
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub data_bits: u8,
    /// Stop bits
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: FlowControl,
    /// Time the controller needs to boot after the port opens
    pub settle_delay_ms: u64,
    /// Read timeout of the port pump
    pub read_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: AUTO_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: FlowControl::XonXoff,
            settle_delay_ms: 2000,
            read_timeout_ms: 50,
        }
    }
}

impl ConnectionSettings {
    /// Whether the port has to be discovered
    pub fn is_auto(&self) -> bool {
        self.port.trim().is_empty() || self.port.eq_ignore_ascii_case(AUTO_PORT)
    }

    /// Serial parameters for `port`
    pub fn to_params(&self, port: &str) -> ConnectionParams {
        ConnectionParams {
            port: port.to_string(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            flow_control: self.flow_control,
            read_timeout_ms: self.read_timeout_ms,
            ..ConnectionParams::default()
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Command deadlines in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Moves and quick commands
    pub command_ms: u64,
    /// Homing
    pub home_ms: u64,
    /// Position queries
    pub position_ms: u64,
    /// Motor disable on shutdown
    pub shutdown_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            command_ms: 5000,
            home_ms: 30000,
            position_ms: 5000,
            shutdown_ms: 2000,
        }
    }
}

impl TimeoutSettings {
    pub fn to_stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            command: Duration::from_millis(self.command_ms),
            home: Duration::from_millis(self.home_ms),
            position: Duration::from_millis(self.position_ms),
            shutdown: Duration::from_millis(self.shutdown_ms),
        }
    }
}

/// Machine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Console X/Y step in mm
    pub step_xy: f64,
    /// Console and focus Z step in mm
    pub step_z: f64,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            step_xy: SMALLEST_XY,
            step_z: SMALLEST_Z,
        }
    }
}

impl MachineSettings {
    pub fn to_step_sizes(&self) -> StepSizes {
        StepSizes {
            xy: self.step_xy,
            z: self.step_z,
        }
    }
}

/// Grid scan and Z stack settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Order of the Moore curve that orders the grid
    pub curve_order: u32,
    /// Grid spacing as a multiple of the XY step
    pub step_multiplier: f64,
    /// Where captures and the project file are written
    pub output_dir: PathBuf,
    /// Frame width written into the project file
    pub image_width: u32,
    /// Frame height written into the project file
    pub image_height: u32,
    /// Frames in a Z stack
    pub stack_count: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            curve_order: 3,
            step_multiplier: 2.0,
            output_dir: PathBuf::from("./output"),
            image_width: 640,
            image_height: 480,
            stack_count: 200,
        }
    }
}

/// Autofocus settings, in Z steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusSettings {
    /// Samples on each side of the start Z before the hunt begins
    pub seed_radius: u32,
    /// The bracket may not grow further than this from the start Z
    pub max_half_width: u32,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            seed_radius: 5,
            max_half_width: 60,
        }
    }
}

/// Camera settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Capture program and arguments; `{output}` is replaced by the image path,
    /// e.g. `["fswebcam", "--no-banner", "-r", "640x480", "{output}"]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_command: Option<Vec<String>>,
    /// Time the sensor needs to adjust exposure before a frame is kept
    pub warmup_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            capture_command: None,
            warmup_ms: 750,
        }
    }
}

impl CameraSettings {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Command deadlines
    pub timeouts: TimeoutSettings,
    /// Machine step sizes
    pub machine: MachineSettings,
    /// Scan settings
    pub scan: ScanSettings,
    /// Focus settings
    pub focus: FocusSettings,
    /// Camera settings
    pub camera: CameraSettings,
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

/// `<platform config dir>/micro3d/config.toml`
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("micro3d");
    path.push("config.toml");
    path
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let load_error = |reason: String| SettingsError::LoadError {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| load_error(format!("invalid JSON: {}", e)))?,
            Format::Toml => toml::from_str(&content)
                .map_err(|e| load_error(format!("invalid TOML: {}", e)))?,
        };

        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path`, or the default file when it exists, or built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        let default_path = default_config_path();
        if default_path.is_file() {
            Self::load_from_file(&default_path)
        } else {
            tracing::debug!("No configuration file at {}, using defaults", default_path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating the parent directory
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = format_of(path)?;
        let save_error = |reason: String| SettingsError::SaveError {
            path: path.display().to_string(),
            reason,
        };

        let content = match format {
            Format::Json => {
                serde_json::to_string_pretty(self).map_err(|e| save_error(e.to_string()))?
            }
            Format::Toml => toml::to_string_pretty(self).map_err(|e| save_error(e.to_string()))?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).map_err(|e| save_error(e.to_string()))?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let c = &self.connection;
        if c.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if !(5..=8).contains(&c.data_bits) {
            return Err(SettingsError::invalid("connection.data_bits", "must be 5 to 8"));
        }
        if !(1..=2).contains(&c.stop_bits) {
            return Err(SettingsError::invalid("connection.stop_bits", "must be 1 or 2"));
        }
        if c.read_timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.read_timeout_ms", "must be > 0"));
        }

        let t = &self.timeouts;
        for (key, value) in [
            ("timeouts.command_ms", t.command_ms),
            ("timeouts.home_ms", t.home_ms),
            ("timeouts.position_ms", t.position_ms),
            ("timeouts.shutdown_ms", t.shutdown_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        for (key, value) in [
            ("machine.step_xy", self.machine.step_xy),
            ("machine.step_z", self.machine.step_z),
            ("scan.step_multiplier", self.scan.step_multiplier),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SettingsError::invalid(key, "must be a number > 0"));
            }
        }

        let s = &self.scan;
        if !(1..=8).contains(&s.curve_order) {
            return Err(SettingsError::invalid("scan.curve_order", "must be 1 to 8"));
        }
        if s.image_width == 0 || s.image_height == 0 {
            return Err(SettingsError::invalid("scan.image_width", "image dimensions must be > 0"));
        }
        if s.stack_count == 0 {
            return Err(SettingsError::invalid("scan.stack_count", "must be > 0"));
        }

        let f = &self.focus;
        if f.seed_radius == 0 {
            return Err(SettingsError::invalid("focus.seed_radius", "must be > 0"));
        }
        if f.max_half_width < f.seed_radius {
            return Err(SettingsError::invalid(
                "focus.max_half_width",
                format!("must be at least seed_radius ({})", f.seed_radius),
            ));
        }

        if let Some(command) = &self.camera.capture_command {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(SettingsError::invalid("camera.capture_command", "program is empty"));
            }
            if !command.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
                return Err(SettingsError::invalid(
                    "camera.capture_command",
                    format!("must contain {}", OUTPUT_PLACEHOLDER),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert!(config.connection.is_auto());
        assert_eq!(config.connection.baud_rate, 115_200);
        assert_eq!(config.timeouts.to_stage_timeouts().home, Duration::from_secs(30));
        assert_eq!(config.machine.to_step_sizes().z, 0.04);
    }

    #[test]
    fn test_to_params_carries_framing() {
        let mut connection = ConnectionSettings::default();
        connection.baud_rate = 250_000;
        let params = connection.to_params("/dev/ttyACM0");
        assert_eq!(params.port, "/dev/ttyACM0");
        assert_eq!(params.baud_rate, 250_000);
        assert_eq!(params.flow_control, FlowControl::XonXoff);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::new();
        config.machine.step_z = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "machine.step_z"
        ));

        let mut config = Config::new();
        config.focus.max_half_width = 2;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.camera.capture_command = Some(vec!["fswebcam".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            Config::load_from_file(Path::new("settings.yaml")),
            Err(SettingsError::UnsupportedFormat(_))
        ));
    }
}

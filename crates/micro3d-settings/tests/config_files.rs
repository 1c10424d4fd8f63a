//! Configuration files on disk

use micro3d_settings::{Config, SettingsError};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_toml_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::new();
    config.connection.port = "/dev/ttyUSB0".to_string();
    config.scan.output_dir = PathBuf::from("/tmp/scan");
    config.camera.capture_command = Some(vec![
        "fswebcam".to_string(),
        "--no-banner".to_string(),
        "{output}".to_string(),
    ]);
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::new();
    config.focus.seed_radius = 3;
    config.timeouts.home_ms = 45_000;
    config.save_to_file(&path).unwrap();

    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[connection]\nport = \"COM4\"\n\n[machine]\nstep_z = 0.08\n").unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.connection.port, "COM4");
    assert!(!config.connection.is_auto());
    assert_eq!(config.connection.baud_rate, 115_200);
    assert_eq!(config.machine.step_z, 0.08);
    assert_eq!(config.machine.step_xy, 0.1);
    assert_eq!(config.scan.stack_count, 200);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[timeouts]\ncommand_ms = 0\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));

    std::fs::write(&path, "[connection\nport = ").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::LoadError { .. })
    ));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    assert!(Config::load_from_file(&path).is_err());
    assert!(Config::load_or_default(Some(&path)).is_err());
}

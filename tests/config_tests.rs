// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use gazecursor::Config;
use gazecursor::config::ConfigError;
use std::io::Write;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.capture.pool_size, 4);
    assert_eq!((config.capture.width, config.capture.height), (640, 480));
    assert_eq!(config.transport.subscriber_hwm, 10);
    assert!(config.cursor.mirror, "Mirroring should be enabled by default");
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_task_table() {
    let tasks = Config::default().tasks;

    // (cpu, priority, period) per stage
    assert_eq!((tasks.cursor.cpu, tasks.cursor.priority, tasks.cursor.period_ms), (0, 99, 50));
    assert_eq!((tasks.capture.cpu, tasks.capture.priority, tasks.capture.period_ms), (0, 98, 60));
    assert_eq!(
        (tasks.detection.cpu, tasks.detection.priority, tasks.detection.period_ms),
        (0, 97, 100)
    );
    assert_eq!(
        (tasks.compression.cpu, tasks.compression.priority, tasks.compression.period_ms),
        (1, 99, 70)
    );
    assert_eq!((tasks.logging.cpu, tasks.logging.priority, tasks.logging.period_ms), (1, 98, 250));
}

#[test]
fn test_load_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"capture": {{"device_path": "/dev/video2"}}, "tasks": {{"cursor": {{"cpu": 1, "priority": 90, "period_ms": 40}}}}}}"#
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    if std::env::var_os("GAZECURSOR_DEVICE").is_none() {
        assert_eq!(config.capture.device_path, "/dev/video2");
    }
    assert_eq!(config.tasks.cursor.period_ms, 40);
    // Untouched sections keep their defaults
    assert_eq!(config.tasks.logging.period_ms, 250);
}

#[test]
fn test_load_missing_explicit_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(Some(&dir.path().join("absent.json")));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_load_invalid_json_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_load_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"output": {{"jpeg_quality": 0}}}}"#).unwrap();
    assert!(matches!(
        Config::load(Some(file.path())),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn test_validate_rejects_empty_display() {
    let mut config = Config::default();
    config.cursor.display_width = 0;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

    let mut config = Config::default();
    config.cursor.display_height = -1;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
}

#[test]
fn test_config_serializes_back() {
    let config = Config::default();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

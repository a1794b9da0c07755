//! Integration tests for logging and configuration bootstrap

use core_runtime::config::ServiceConfig;
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::time::Duration;

#[test]
fn test_logging_initialization() {
    // Only one global subscriber per process: the first init succeeds, the
    // second reports a configuration error instead of panicking.
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_spans(false);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    tracing::info!(target: "core_runtime", "logging initialised");
}

#[test]
fn test_format_selection() {
    // Debug builds should default to Pretty
    #[cfg(debug_assertions)]
    assert_eq!(LogFormat::default(), LogFormat::Pretty);

    // Release builds should default to Json
    #[cfg(not(debug_assertions))]
    assert_eq!(LogFormat::default(), LogFormat::Json);
}

#[test]
fn test_config_file_round_trip() {
    let dir = std::env::temp_dir().join(format!("audio-pipeline-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("service.json");

    let original = ServiceConfig::default()
        .with_workers(3)
        .with_queue_depth(1)
        .with_codec_program("/usr/local/bin/ffmpeg");
    std::fs::write(&path, serde_json::to_string_pretty(&original).unwrap()).unwrap();

    let loaded = ServiceConfig::from_file(&path).unwrap();
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(loaded, original);
    assert_eq!(loaded.limits.max_seconds, Duration::from_secs(60));
}

#[test]
fn test_missing_config_file() {
    let path = std::env::temp_dir().join("audio-pipeline-does-not-exist.json");
    let err = ServiceConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to read configuration file"));
}

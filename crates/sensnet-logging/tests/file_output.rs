//! Installing the global subscriber with file output
//!
//! Lives in its own test binary: a process gets exactly one global
//! subscriber.

use std::fs;

use sensnet_logging::{FileConfig, LogConfig, LoggingError, RotationStrategy, SubscriberBuilder};

#[test]
fn test_events_reach_the_log_file_once_installed() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        default_level: "info".to_string(),
        console: sensnet_logging::ConsoleConfig {
            enabled: false,
            ..Default::default()
        },
        file: Some(FileConfig {
            directory: dir.path().to_path_buf(),
            prefix: "node".to_string(),
            rotation: RotationStrategy::Never,
        }),
    };

    let guard = SubscriberBuilder::new()
        .with_config(config.clone())
        .try_init()
        .unwrap();
    assert!(guard.is_some());

    tracing::warn!(node = "alpha", "Window aggregated");
    drop(guard);

    let contents = fs::read_to_string(dir.path().join("node.log")).unwrap();
    let line = contents.lines().next().unwrap();
    let event: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(event["message"], "Window aggregated");
    assert_eq!(event["node"], "alpha");

    let second = SubscriberBuilder::new().with_config(config).try_init();
    assert!(matches!(second, Err(LoggingError::AlreadyInitialized(_))));
}

//! A log handle registered on a file-backed container follows level changes.

use std::sync::Arc;

use strata_config::{Loader, MemFs};
use strata_telemetry::{subscriber, LogConfig};

#[test]
fn test_level_follows_config_file() {
    let fs = Arc::new(MemFs::new());
    fs.write("app.yaml", "logging:\n  level: info\n  format: json\n");

    let config = Loader::new()
        .with_fs(fs.clone())
        .with_file("app.yaml")
        .without_automatic_env()
        .load()
        .unwrap();

    let log_config = LogConfig::from_container(&config);
    assert_eq!(log_config.level, "info");
    assert!(log_config.json_format);

    let (_subscriber, handle) = subscriber(&log_config).unwrap();
    config.add_observer(handle.clone());

    fs.write("app.yaml", "logging:\n  level: strata_config=debug,warn\n");
    assert!(config.reload());
    config.notify_observers();
    assert_eq!(handle.level(), "strata_config=debug,warn");

    // Removing the key keeps the last applied level
    fs.write("app.yaml", "server:\n  port: 1\n");
    config.reload();
    config.notify_observers();
    assert_eq!(handle.level(), "strata_config=debug,warn");
}

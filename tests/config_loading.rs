//! Loading configuration from disk and applying it to a core.

use resilient_cache::config::{load_config, ConfigError};
use resilient_cache::ResilienceCore;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_partial_file_uses_defaults() {
    let file = write_config(
        r#"
[circuit_breaker]
failure_threshold = 3

[cache.ttl]
short = 120

[observability]
log_format = "json"
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.reset_timeout_secs, 60);
    assert_eq!(config.cache.ttl.short, 120);
    assert_eq!(config.cache.ttl.medium, 1800);
    assert_eq!(config.retry.max_attempts, 3);

    let core = ResilienceCore::new(config, None).unwrap();
    assert_eq!(core.registry().breaker("svc").config().failure_threshold, 3);
}

#[tokio::test]
async fn test_invalid_file_reports_every_violation() {
    let file = write_config(
        r#"
[retry]
base_delay_ms = 5000
max_delay_ms = 1000

[batch]
batch_size = 0
"#,
    );

    match load_config(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.len() >= 2);
            assert!(errors.iter().any(|e| e.field == "batch.batch_size"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reload_through_watcher_channel() {
    let core = std::sync::Arc::new(ResilienceCore::new(Default::default(), None).unwrap());
    let shutdown = resilient_cache::Shutdown::new();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = core.clone().watch_config(rx, &shutdown);

    let mut updated = resilient_cache::CoreConfig::default();
    updated.batch.batch_size = 25;
    tx.send(updated).unwrap();
    drop(tx);
    handle.await.unwrap();

    assert_eq!(core.config().batch.batch_size, 25);
}

//! Every fail-open branch leaves a log record at the documented severity.

mod common;

use std::time::Duration;

use common::{harness, harness_with};
use fscache::backends::DfsClient;
use fscache::{CacheError, RegistryConfig};
use tracing::Level;

#[tokio::test]
async fn blank_path_warns() {
    let h = harness();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    assert!(h.registry.list("  ").await.is_err());
    assert!(events.contains(Level::WARN, "blank path passed to list()"));
}

#[tokio::test]
async fn unclassifiable_path_warns() {
    let h = harness();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    let err = h.registry.is_stale("missing.txt").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(events.contains(Level::WARN, "cannot determine path as either file or directory"));
    assert_eq!(events.count(Level::ERROR), 0);
}

#[tokio::test]
async fn auto_registration_warns_but_explicit_registration_does_not() {
    let h = harness();
    h.dfs.write_file("a.txt", "x").unwrap();
    h.dfs.write_file("b.txt", "x").unwrap();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    h.registry.register("a.txt").await.unwrap();
    assert_eq!(events.count(Level::WARN), 0);
    assert!(events.contains(Level::DEBUG, "registered"));

    h.registry.is_stale("b.txt").await.unwrap();
    let warned = events.at_level(Level::WARN);
    assert_eq!(warned.len(), 1);
    assert!(warned[0].message.contains("path not registered"));
    assert_eq!(warned[0].field("path"), Some("b.txt"));
}

#[tokio::test]
async fn registration_failure_is_an_error() {
    let h = harness();
    h.dfs.write_file("a.txt", "x").unwrap();
    h.backend.mismatch_next();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    let err = h.registry.open_stream("a.txt").await.unwrap_err();
    assert!(matches!(err, CacheError::KindMismatch { .. }));
    assert!(events.contains(Level::ERROR, "registration failed"));
    // first attempt is announced separately, at a lower severity
    assert!(events.contains(Level::WARN, "path not registered"));
}

#[tokio::test]
async fn failed_move_warns_about_the_unregistered_source() {
    let h = harness();
    h.dfs.write_file("a.txt", "x").unwrap();
    h.registry.register("a.txt").await.unwrap();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    assert!(h.registry.move_path("a.txt", "no/such/dir/a.txt").await.is_err());
    assert!(events.contains(Level::WARN, "move failed; a.txt is left unregistered"));
}

#[tokio::test]
async fn unregistering_unknown_path_warns() {
    let h = harness();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    assert!(!h.registry.unregister("ghost").await.unwrap());
    assert!(events.contains(Level::WARN, "not registered; nothing to unregister"));
}

#[tokio::test]
async fn directory_stream_request_warns() {
    let h = harness();
    h.dfs.mkdirs("dir").await.unwrap();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    assert!(matches!(
        h.registry.open_stream("dir").await,
        Err(CacheError::NotAFile(_))
    ));
    assert!(events.contains(Level::WARN, "not a file"));
}

#[tokio::test]
async fn fresh_cached_stream_is_returned_silently() {
    let h = harness();
    h.dfs.write_file("a.txt", "x").unwrap();
    h.registry.open_stream("a.txt").await.unwrap();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    h.registry.open_stream("a.txt").await.unwrap();
    assert_eq!(events.count(Level::WARN), 0);
}

#[tokio::test]
async fn backend_shutdown_failure_is_an_error() {
    let h = harness();
    h.dfs.close().await.unwrap();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    let err = h.registry.destroy().await.unwrap_err();
    assert!(matches!(err, CacheError::Shutdown(_)));
    assert!(events.contains(Level::ERROR, "backend shutdown failed"));

    // the registry is gone regardless
    h.registry.destroy().await.unwrap();
    assert!(events.contains(Level::WARN, "registry already destroyed"));
}

#[tokio::test(start_paused = true)]
async fn stalled_classification_times_out_and_warns() {
    let config = RegistryConfig {
        auto_create: false,
        call_timeout_ms: Some(100),
    };
    let h = harness_with(&config, Some(Duration::from_secs(60)));
    h.dfs.write_file("a.txt", "x").unwrap();
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    let err = h.registry.register("a.txt").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(events.contains(Level::WARN, "is_file timed out"));
    assert!(events.contains(Level::WARN, "is_dir timed out"));
}

#[tokio::test]
async fn unclassifiable_cached_path_warns_and_keeps_entry() {
    let h = harness();
    h.dfs.write_file("a.txt", "x").unwrap();
    h.registry.open_stream("a.txt").await.unwrap();
    h.backend.set_blind(true);
    let (subscriber, events) = fscache_telemetry::capturing();
    let _guard = tracing::subscriber::set_default(subscriber);

    assert!(h.registry.is_stale("a.txt").await.unwrap_err().is_not_found());
    assert!(events.contains(Level::WARN, "keeping entry"));
    assert!(!events.contains(Level::WARN, "dropped entry"));
    assert_eq!(events.count(Level::ERROR), 0);
}

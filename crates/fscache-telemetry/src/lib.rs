//! Tracing setup for fscache.
//!
//! The registry reports every fail-open branch through `tracing` instead of
//! returning panics or opaque nulls. Applications embedding it install a
//! subscriber once at startup:
//!
//! ```no_run
//! fscache_telemetry::init("info").expect("tracing already initialized");
//! ```
//!
//! `RUST_LOG` overrides the default filter, e.g. `RUST_LOG=fscache=debug`.
//!
//! [`capturing`] builds a subscriber that records events in memory so tests
//! can assert that a warning or error was emitted.

mod capture;

pub use capture::{CaptureLayer, CapturedEvent, CapturedEvents};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the stderr subscriber without installing it.
///
/// Uses `RUST_LOG` when set, otherwise `default_filter`.
pub fn subscriber(default_filter: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
}

/// Install the stderr subscriber as the global default.
pub fn init(default_filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    subscriber(default_filter).try_init()
}

/// Build a subscriber that records every event into the returned handle.
///
/// Install it with `tracing::subscriber::set_default` for the scope of a test.
pub fn capturing() -> (impl tracing::Subscriber + Send + Sync + 'static, CapturedEvents) {
    let (layer, events) = CaptureLayer::new();
    (tracing_subscriber::registry().with(layer), events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_capturing_subscriber_records_events() {
        let (subscriber, events) = capturing();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(path = "a/b.txt", "cannot classify path");
            tracing::debug!("registered");
        });

        assert_eq!(events.len(), 2);
        assert_eq!(events.count(Level::WARN), 1);
        assert!(events.contains(Level::WARN, "cannot classify"));
        assert!(events.contains(Level::DEBUG, "registered"));
    }

    #[test]
    fn test_stderr_subscriber_accepts_events() {
        let subscriber = subscriber("fscache=debug");
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("stderr subscriber smoke test");
        });
    }
}

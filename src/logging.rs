//! # Structured Logging
//!
//! Environment-aware tracing initialization. Output defaults to a compact
//! console format; setting `PIPESTACK_LOG_FORMAT=json` switches to JSON for
//! log aggregation. Filtering follows `RUST_LOG` with an `info` default.

use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber. Safe to call more than once;
/// only the first call installs a subscriber.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json_output = std::env::var("PIPESTACK_LOG_FORMAT")
            .map(|format| format == "json")
            .unwrap_or(false);

        if json_output {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true).json())
                .try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true))
                .try_init();
        }
    });
}

//! Structured logging for the Health ID service.
//!
//! - Uses `tracing-subscriber` with pretty-printed output.
//! - Pulls filtering rules from `RUST_LOG` or defaults to `info`.
//! - Includes thread ID, file, and line number for traceability.
//! - Timestamped using local time (RFC 3339 format).
//!
//! Events are only emitted when the `tracing` feature is enabled; otherwise
//! the subscriber is installed but stays silent.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;
    Ok(())
}

//! Optional `tracing-subscriber` wiring (§4.9, "Logging").
//!
//! The engine never calls this on its own — every component crate emits
//! `tracing` spans/events unconditionally, and it is a library, not a binary,
//! so initialising a global subscriber is the caller's decision to make
//! exactly once at process start.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output shape for the default subscriber [`init_tracing`] installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, single-line-per-event. Default.
    #[default]
    Compact,
    /// Structured JSON, one object per line — suited to log aggregation.
    Json,
}

/// Install a global `tracing` subscriber driven by `RUST_LOG`, falling back
/// to `reelforge=info,warn` when unset. Returns an error if a subscriber is
/// already installed; callers that embed the engine inside a larger
/// application should skip this and install their own.
pub fn init_tracing(format: LogFormat) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reelforge=info,warn"));

    match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).compact())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(false))
            .try_init(),
    }
}

//! Observability infrastructure: tracing and metrics.
//!
//! The CLI initialises tracing once at startup from the resolved `Config`.
//! Library code only emits through `tracing` and the `metrics` facade.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` is used when set. Otherwise the level is INFO, or TRACE when
/// `trace` is on. Logs go to stderr so reports on stdout stay parseable.
pub fn init(trace: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(trace)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(trace)
                .with_level(true),
        )
        .try_init()?;

    tracing::debug!(trace, "Observability initialized");
    metrics::register_core_metrics();

    Ok(())
}

fn default_directive(trace: bool) -> &'static str {
    if trace {
        "trace"
    } else {
        "info"
    }
}

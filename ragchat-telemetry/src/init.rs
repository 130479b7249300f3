//! Global subscriber installation.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber.
///
/// Returns `false` when a global subscriber was already set; in that case the
/// existing subscriber is left in place.
pub fn init_telemetry(service_name: &str) -> bool {
    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(service.name = service_name, "telemetry initialized");
    }
    installed
}

/// Install a subscriber that writes one JSON object per event.
///
/// Same idempotency rules as [`init_telemetry`].
pub fn init_json_telemetry(service_name: &str) -> bool {
    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_current_span(true).with_span_list(true))
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(service.name = service_name, "telemetry initialized (json)");
    }
    installed
}

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const RELAY_REQUESTS_TOTAL: &str = "promptshot_relay_requests_total";
pub const UPSTREAM_MS: &str = "promptshot_upstream_ms";
pub const CAPTURE_MS: &str = "promptshot_capture_ms";
pub const CAPTURE_REJECTED_TOTAL: &str = "promptshot_capture_rejected_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            RELAY_REQUESTS_TOTAL,
            Unit::Count,
            "Total relay requests by outcome."
        );
        describe_histogram!(
            UPSTREAM_MS,
            Unit::Milliseconds,
            "Upstream completion latency in milliseconds."
        );
        describe_histogram!(
            CAPTURE_MS,
            Unit::Milliseconds,
            "Browser capture latency in milliseconds, including publish."
        );
        describe_counter!(
            CAPTURE_REJECTED_TOTAL,
            Unit::Count,
            "Captures rejected because no render slot freed up in time."
        );
    });
}

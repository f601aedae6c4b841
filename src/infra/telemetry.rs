use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

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
            "boa_render_documents_total",
            Unit::Count,
            "Documents produced, labelled by result kind and the tier that produced them."
        );
        describe_counter!(
            "boa_render_fallback_total",
            Unit::Count,
            "Fallback transitions, labelled by the tier that failed."
        );
        describe_counter!(
            "boa_render_browser_launch_total",
            Unit::Count,
            "Headless browser launch attempts by result."
        );
        describe_gauge!(
            "boa_render_open_pages",
            Unit::Count,
            "Browser pages currently open."
        );
        describe_histogram!(
            "boa_render_pdf_ms",
            Unit::Milliseconds,
            "Browser PDF render latency in milliseconds."
        );
    });
}

//! Telemetry and observability setup.

use crate::config::{LogFormat, ObservabilityConfig};
use crate::error::Result;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize the tracing subscriber for the AM process.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_span_events(FmtSpan::CLOSE).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    Registry::default().with(env_filter).with(fmt_layer).init();

    Ok(())
}

/// Helper macro for structured event logging, matching the shape every
/// state-machine transition uses to log its subject id and outgoing events.
#[macro_export]
macro_rules! log_event {
    ($level:expr, $message:expr, $($key:expr => $value:expr),*) => {
        tracing::event!(
            $level,
            message = $message,
            $($key = ?$value,)*
        );
    };
}

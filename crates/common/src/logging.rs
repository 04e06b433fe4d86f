use crate::config::Environment;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter from `RUST_LOG`, falling back to `default_level`.
pub(crate) fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Formatting layer: JSON in production, pretty with colours in development.
pub(crate) fn fmt_layer<S>(environment: Environment) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(true)
            .boxed(),
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Use
/// [`crate::telemetry::TelemetryGuard`] instead when spans should be exported.
pub fn setup_logging(default_level: &str, environment: Environment) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(fmt_layer(environment))
        .init();
}

use crate::Environment;
use crate::logging::{env_filter, fmt_layer};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Owns the OTLP tracer and meter providers. Dropping the guard flushes and
/// shuts both down, so keep it alive for the lifetime of `main`.
///
/// Replaces [`crate::setup_logging`]: it installs the same formatting layer
/// plus a `tracing-opentelemetry` bridge exporting spans to the collector.
///
/// # Example
/// ```ignore
/// let _telemetry = TelemetryGuard::init("firewatch", "http://localhost:4317", "info", Environment::Production)?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Must be called from within a Tokio runtime: the OTLP exporters use tonic.
    pub fn init(
        service_name: &str,
        endpoint: &str,
        default_level: &str,
        environment: Environment,
    ) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());
        let resource = service_resource(service_name, environment);

        let tracer_provider = tracer_provider(endpoint, resource.clone())?;
        global::set_tracer_provider(tracer_provider.clone());

        let meter_provider = meter_provider(endpoint, resource)?;
        global::set_meter_provider(meter_provider.clone());

        tracing_subscriber::registry()
            .with(env_filter(default_level))
            .with(tracing_opentelemetry::layer().with_tracer(global::tracer(service_name.to_string())))
            .with(fmt_layer(environment))
            .try_init()?;

        tracing::info!(endpoint, "OpenTelemetry export enabled");
        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

fn service_resource(service_name: &str, environment: Environment) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, service_name.to_string()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

fn tracer_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // The subscriber may already be gone here, so report on stderr.
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {e:?}");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Failed to shut down meter provider: {e:?}");
        }
    }
}

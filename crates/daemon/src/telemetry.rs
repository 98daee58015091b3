//! Telemetry setup for OpenTelemetry integration

use anyhow::Result;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// OpenTelemetry layer if an OTLP endpoint is configured
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: Service name (default: perf-agent)
///
/// # Example
///
/// ```text
/// OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
/// OTEL_SERVICE_NAME=perf-agent-lab3 \
///     ./perf-agent
/// ```
pub fn layer<S>() -> Result<Option<BoxedLayer<S>>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return Ok(None);
    };

    #[cfg(feature = "telemetry")]
    {
        otel_layer(&endpoint).map(Some)
    }

    #[cfg(not(feature = "telemetry"))]
    {
        // the subscriber is not installed yet, so report on stderr
        eprintln!(
            "OTEL_EXPORTER_OTLP_ENDPOINT={} ignored: rebuild with --features telemetry",
            endpoint
        );
        Ok(None)
    }
}

#[cfg(feature = "telemetry")]
fn otel_layer<S>(endpoint: &str) -> Result<BoxedLayer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "perf-agent".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

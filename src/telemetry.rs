use crate::config::{LogFormat, TelemetryConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    logs::SdkLoggerProvider,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::SdkTracerProvider,
};
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "threadline-server";
const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn,tower_http=info";

/// Keeps the OTLP providers alive; call [`TelemetryGuard::shutdown`] to flush them on exit.
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl TelemetryGuard {
    /// Flushes and shuts down every provider that was started.
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Failed to shut down tracer provider");
        }
        if let Some(provider) = self.meter_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Failed to shut down meter provider");
        }
        if let Some(provider) = self.logger_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Failed to shut down logger provider");
        }
    }
}

/// Installs the tracing subscriber and, when an OTLP endpoint is configured, the trace,
/// metric and log exporters.
///
/// # Errors
/// Returns an error if an exporter cannot be built or a subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = Registry::default().with(filter);

    let mut guard = TelemetryGuard::default();
    let (trace_layer, log_layer) = if let Some(endpoint) = &config.otlp_endpoint {
        let resource = Resource::builder()
            .with_service_name(SERVICE_NAME)
            .with_attributes([KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION"))])
            .build();

        global::set_text_map_propagator(TraceContextPropagator::new());

        let span_exporter =
            opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint.clone()).build()?;
        let tracer_provider =
            SdkTracerProvider::builder().with_resource(resource.clone()).with_batch_exporter(span_exporter).build();
        let tracer = tracer_provider.tracer(SERVICE_NAME);
        global::set_tracer_provider(tracer_provider.clone());

        let metric_exporter =
            opentelemetry_otlp::MetricExporter::builder().with_tonic().with_endpoint(endpoint.clone()).build()?;
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(PeriodicReader::builder(metric_exporter).build())
            .build();
        global::set_meter_provider(meter_provider.clone());

        let log_exporter =
            opentelemetry_otlp::LogExporter::builder().with_tonic().with_endpoint(endpoint.clone()).build()?;
        let logger_provider =
            SdkLoggerProvider::builder().with_resource(resource).with_batch_exporter(log_exporter).build();
        let log_layer = OpenTelemetryTracingBridge::new(&logger_provider);

        guard = TelemetryGuard {
            tracer_provider: Some(tracer_provider),
            meter_provider: Some(meter_provider),
            logger_provider: Some(logger_provider),
        };
        (Some(tracing_opentelemetry::layer().with_tracer(tracer)), Some(log_layer))
    } else {
        (None, None)
    };

    // Option<Layer> implements Layer, so absent exporters are no-ops.
    let registry = registry.with(trace_layer).with(log_layer);

    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init()?,
    }

    Ok(guard)
}

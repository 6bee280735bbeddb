//! Logging/tracing initialization (SPEC_FULL §A.1).
//!
//! Grounded on `everruns::core::telemetry`'s `TelemetryConfig`/
//! `init_telemetry` pair: a console `tracing-subscriber` layer gated by
//! an `EnvFilter`, with an optional OTLP span exporter layered in via
//! `tracing-opentelemetry` when an endpoint is configured. Simplified
//! to what the worker actually needs — no gen-ai semantic-convention
//! constants, no content-recording toggle.

use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub log_filter: String,
}

impl TelemetryConfig {
    /// - `OTEL_SERVICE_NAME` (default `"hermod-worker"`)
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT` (e.g. `http://localhost:4317`)
    /// - `RUST_LOG` (default `"info"`)
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "hermod-worker".to_string()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            log_filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// Keeps the OTLP tracer provider alive for the process lifetime; drop
/// it to flush and shut the exporter down.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to shut down tracer provider: {err:?}");
            }
        }
    }
}

pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let filter =
        EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter);

    let (provider, otel_layer) = match &config.otlp_endpoint {
        Some(endpoint) => match build_otlp_tracer(endpoint, &config.service_name) {
            Ok((provider, tracer)) => (
                Some(provider),
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            ),
            Err(err) => {
                eprintln!("failed to initialize OTLP exporter, continuing without it: {err}");
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(otel_layer)
        .init();

    match &config.otlp_endpoint {
        Some(endpoint) if provider.is_some() => {
            tracing::info!(endpoint, "OpenTelemetry tracing enabled");
        }
        Some(_) => tracing::warn!("OTEL_EXPORTER_OTLP_ENDPOINT set but exporter failed to start"),
        None => tracing::debug!("OpenTelemetry tracing disabled, no endpoint configured"),
    }

    TelemetryGuard { provider }
}

fn build_otlp_tracer(
    endpoint: &str,
    service_name: &str,
) -> Result<(SdkTracerProvider, opentelemetry_sdk::trace::Tracer), opentelemetry::trace::TraceError>
{
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(10))
        .build()?;

    let resource = Resource::builder()
        .with_attributes(vec![KeyValue::new("service.name", service_name.to_string())])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("hermod-worker");
    Ok((provider, tracer))
}

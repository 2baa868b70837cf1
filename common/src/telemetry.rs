// Telemetry module for structured logging, metrics, and tracing

use crate::config::{LogFormat, ObservabilityConfig};
use anyhow::Result;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const SERVICE_NAME: &str = "profile-worker";

/// Initialize the tracing subscriber.
///
/// `json` output is meant for log aggregators in production, `text` output is
/// for local development. `RUST_LOG` takes precedence over the configured
/// level. When `tracing_endpoint` is set, spans are also exported over OTLP.
pub fn init_logging(observability: &ObservabilityConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&observability.log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match observability.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter));

    if let Some(endpoint) = observability.tracing_endpoint.as_deref() {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = %observability.log_level,
        log_format = ?observability.log_format,
        tracing_endpoint = observability.tracing_endpoint.as_deref(),
        "Logging initialized"
    );

    Ok(())
}

/// Initialize an OpenTelemetry tracer with a batch OTLP exporter
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    Ok(tracer_provider.tracer(SERVICE_NAME))
}

/// Flush remaining spans; call once on graceful shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter and describe the worker metrics.
/// A port of 0 leaves metrics unexported; recording stays a no-op.
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    if metrics_port == 0 {
        tracing::debug!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "image_checker_messages_total",
        "Storage events handled by the image checker, by outcome"
    );
    describe_counter!(
        "image_checker_fetch_errors_total",
        "Non-cancellation errors returned while fetching storage events"
    );
    describe_counter!(
        "image_checker_commit_errors_total",
        "Storage events whose offset could not be committed"
    );
    describe_counter!(
        "workers_exited_total",
        "Background worker exits, by worker and reason"
    );

    tracing::info!(
        metrics_port = metrics_port,
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_message_outcome(outcome: &'static str) {
    counter!("image_checker_messages_total", "outcome" => outcome).increment(1);
}

#[inline]
pub fn record_fetch_error() {
    counter!("image_checker_fetch_errors_total").increment(1);
}

#[inline]
pub fn record_commit_error() {
    counter!("image_checker_commit_errors_total").increment(1);
}

#[inline]
pub fn record_worker_exit(worker: &str, reason: &'static str) {
    counter!(
        "workers_exited_total",
        "worker" => worker.to_string(),
        "reason" => reason
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording_without_exporter() {
        record_message_outcome("retained");
        record_fetch_error();
        record_commit_error();
        record_worker_exit("profile-image-checker", "stopped");
    }

    #[test]
    fn test_disabled_metrics_exporter() {
        assert!(init_metrics(0).is_ok());
    }
}

use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{Resource, logs::SdkLoggerProvider, trace::SdkTracerProvider};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Target of the server binary's own events (request spans, startup).
const BIN_TARGET: &str = "server";

/// Holds the span and log providers until [`TelemetryGuard::shutdown`] flushes them.
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    logger_provider: SdkLoggerProvider,
}

impl TelemetryGuard {
    pub fn shutdown(&self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Error shutting down tracer provider: {e}");
        }
        if let Err(e) = self.logger_provider.shutdown() {
            eprintln!("Error shutting down logger provider: {e}");
        }
    }
}

fn storage_backend(config: &Config) -> &'static str {
    if config.database_url.is_some() {
        "postgres"
    } else {
        "in-memory"
    }
}

fn resource(config: &Config) -> Resource {
    Resource::builder()
        .with_service_name(config.otel_service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.namespace", config.otel_service_namespace.clone()),
            KeyValue::new("deployment.environment", config.environment.clone()),
            KeyValue::new("report.storage.backend", storage_backend(config)),
            KeyValue::new(
                "report.generation.max_concurrent",
                config.max_concurrent_generations as i64,
            ),
        ])
        .build()
}

/// Filter used when `RUST_LOG` is unset. Dependencies stay at warn and the
/// exporter transport (h2, tonic) is off.
fn default_directives(config: &Config) -> String {
    let level = &config.log_level;
    let http = if config.is_production() { "info" } else { "debug" };
    format!(
        "warn,{crate_target}={level},{BIN_TARGET}={level},tower_http={http},sqlx=warn,h2=off,tonic=off",
        crate_target = env!("CARGO_CRATE_NAME"),
    )
}

fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(config)))
}

pub fn init_telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    let resource = resource(config);
    let timeout = Duration::from_secs(config.otel_export_timeout_secs);

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(
            SpanExporter::builder()
                .with_tonic()
                .with_endpoint(&config.otel_exporter_endpoint)
                .with_timeout(timeout)
                .build()?,
        )
        .with_resource(resource.clone())
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    let logger_provider = SdkLoggerProvider::builder()
        .with_batch_exporter(
            LogExporter::builder()
                .with_tonic()
                .with_endpoint(&config.otel_exporter_endpoint)
                .with_timeout(timeout)
                .build()?,
        )
        .with_resource(resource)
        .build();

    let fmt_layer = if config.is_production() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(OpenTelemetryLayer::new(global::tracer(
            config.otel_service_name.clone(),
        )))
        .with(OpenTelemetryTracingBridge::new(&logger_provider))
        .with(fmt_layer)
        .init();

    tracing::info!(
        service = %config.otel_service_name,
        namespace = %config.otel_service_namespace,
        endpoint = %config.otel_exporter_endpoint,
        backend = storage_backend(config),
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        tracer_provider,
        logger_provider,
    })
}

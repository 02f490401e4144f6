//! Tracing and telemetry
//!
//! Structured logs via `tracing`; optional OTLP span export when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set. Log level comes from
//! `LOG_LEVEL` (or `RUST_LOG`), format from `LOG_JSON`.

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{self as sdktrace, RandomIdGenerator, Sampler},
    Resource,
};
use std::time::Duration;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub sample_rate: f64,
    pub json_format: bool,
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "did-gateway".to_string(),
            otlp_endpoint: None,
            sample_rate: 1.0,
            json_format: false,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "did-gateway".to_string()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            sample_rate: std::env::var("OTEL_SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            json_format: std::env::var("LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            log_level: std::env::var("LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// Initialize the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let fmt_layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json_format {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        Box::new(tracing_subscriber::fmt::layer().with_target(true).compact())
    };
    let subscriber = subscriber.with(fmt_layer);

    match &config.otlp_endpoint {
        Some(endpoint) => {
            let provider = init_tracer_provider(config, endpoint)?;
            let tracer = provider.tracer("did-gateway");
            subscriber.with(OpenTelemetryLayer::new(tracer)).init();
        }
        None => subscriber.init(),
    }

    Ok(())
}

fn init_tracer_provider(
    config: &TelemetryConfig,
    endpoint: &str,
) -> Result<sdktrace::TracerProvider, Box<dyn std::error::Error>> {
    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new(
            "deployment.environment",
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        ),
    ]);

    let sampler = if config.sample_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sample_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.sample_rate)
    };

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_secs(5)),
        )
        .with_trace_config(
            sdktrace::Config::default()
                .with_sampler(sampler)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    Ok(provider)
}

/// Flush pending spans on shutdown.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

/// Span attribute keys used across the pipeline
pub mod attributes {
    pub const DID: &str = "did";
    pub const DID_METHOD: &str = "did.method";
    pub const POLICY_ID: &str = "policy.id";
    pub const SCOPES: &str = "auth.scopes";
    pub const CIRCUIT: &str = "circuit";
    pub const CACHE_HIT: &str = "cache.hit";
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "did-gateway");
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.sample_rate, 1.0);
        assert!(!config.json_format);
    }
}

//! Tracing setup: console logging plus optional OTLP span export.
//!
//! Log levels follow `RUST_LOG` (default `info`). OTLP export is off unless `enable_otel_export`
//! is set, in which case the exporter reads the standard variables:
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` (default `http://localhost:4318`)
//! - `OTEL_EXPORTER_OTLP_PROTOCOL`: `http/protobuf` (default) or `http/json`
//! - `OTEL_EXPORTER_OTLP_HEADERS`: comma-separated `key=value` pairs, `%20` decoded as a space
//! - `OTEL_SERVICE_NAME` (default `threadline`)
//!
//! ```bash
//! export THREADLINE_ENABLE_OTEL_EXPORT=true
//! export OTEL_EXPORTER_OTLP_ENDPOINT="https://otlp-gateway.example.com/otlp"
//! export OTEL_EXPORTER_OTLP_HEADERS="Authorization=Basic%20<token>"
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "threadline";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Kept so pending spans can be flushed on shutdown; the tracing layer only holds a tracer.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Install the global subscriber.
pub fn init_telemetry(enable_otel_export: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    if !enable_otel_export {
        registry.try_init()?;
        info!("Telemetry initialized (OTLP export disabled)");
        return Ok(());
    }

    match create_otlp_tracer(&OtlpSettings::from_env()) {
        Ok((tracer, settings)) => {
            registry.with(tracing_opentelemetry::layer().with_tracer(tracer)).try_init()?;
            info!(
                service_name = %settings.service_name,
                endpoint = %settings.endpoint,
                headers = settings.headers.len(),
                "Telemetry initialized with OTLP export enabled"
            );
        }
        Err(e) => {
            registry.try_init()?;
            warn!("Telemetry initialized without OTLP export: {:#}", e);
        }
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct OtlpSettings {
    service_name: String,
    endpoint: String,
    protocol: Protocol,
    headers: HashMap<String, String>,
}

impl OtlpSettings {
    fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self::from_vars(
            var("OTEL_SERVICE_NAME"),
            var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            var("OTEL_EXPORTER_OTLP_PROTOCOL"),
            var("OTEL_EXPORTER_OTLP_HEADERS"),
        )
    }

    fn from_vars(service_name: Option<String>, endpoint: Option<String>, protocol: Option<String>, headers: Option<String>) -> Self {
        let protocol = match protocol.as_deref() {
            Some("http/json") => Protocol::HttpJson,
            _ => Protocol::HttpBinary,
        };

        Self {
            service_name: service_name.unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string()),
            protocol,
            headers: headers.as_deref().map(parse_headers).unwrap_or_default(),
        }
    }
}

/// `key=value,key2=value2`, with `%20` standing in for spaces.
fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.replace("%20", " ")
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn create_otlp_tracer(settings: &OtlpSettings) -> anyhow::Result<(opentelemetry_sdk::trace::Tracer, OtlpSettings)> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(&settings.endpoint)
        .with_protocol(settings.protocol)
        .with_headers(settings.headers.clone())
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attribute(KeyValue::new("service.name", settings.service_name.clone()))
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(settings.service_name.clone());
    let _ = TRACER_PROVIDER.set(tracer_provider);

    Ok((tracer, settings.clone()))
}

/// Flush pending spans. Call before exit.
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        tracing::error!("Failed to shutdown tracer provider: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_split_and_decoded() {
        let headers = parse_headers("Authorization=Basic%20abc, x-tenant = blue,broken,=empty");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Basic abc");
        assert_eq!(headers["x-tenant"], "blue");
    }

    #[test]
    fn settings_default_when_unset() {
        let settings = OtlpSettings::from_vars(None, None, None, None);

        assert_eq!(settings.service_name, "threadline");
        assert_eq!(settings.endpoint, "http://localhost:4318");
        assert_eq!(settings.protocol, Protocol::HttpBinary);
        assert!(settings.headers.is_empty());
    }

    #[test]
    fn json_protocol_is_recognised() {
        let settings = OtlpSettings::from_vars(None, None, Some("http/json".into()), None);
        assert_eq!(settings.protocol, Protocol::HttpJson);

        let settings = OtlpSettings::from_vars(None, None, Some("grpc".into()), None);
        assert_eq!(settings.protocol, Protocol::HttpBinary);
    }
}

//! OTLP exporters and SDK providers for each signal.
//!
//! One builder per signal, each returning a fully wired SDK provider or an
//! [`AgentError::Provider`] naming the signal that failed:
//!
//! - traces: OTLP span exporter, wrapped for scrubbing and health reporting, behind a
//!   batch span processor, with the configured sampler and span limits
//! - metrics: OTLP metric exporter behind a periodic reader
//! - logs: OTLP log exporter behind a batch log processor
//!
//! # Endpoints
//!
//! The configured endpoint may omit the scheme, in which case `http://` is used for
//! insecure transports and `https://` otherwise. gRPC exporters use it as is. HTTP
//! exporters append the per-signal path (`/v1/traces`, `/v1/metrics`, `/v1/logs`).
//!
//! HTTP exporters use the blocking reqwest client. The batch processors export from
//! their own background threads, where an async client would deadlock.

use crate::config::{AgentConfig, SamplingConfig};
use crate::error::AgentError;
use crate::health::{ExporterHealth, HealthReportingSpanExporter};
use crate::protocol::{ExportProtocol, Signal};
use crate::scrub::{AttributeScrubber, ScrubbingSpanExporter};

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{
    LogExporter as OtlpLogExporter, MetricExporter as OtlpMetricExporter, Protocol,
    SpanExporter as OtlpSpanExporter, WithExportConfig, WithHttpConfig, WithTonicConfig,
};
use opentelemetry_sdk::{
    logs::{BatchConfigBuilder as LogBatchConfigBuilder, BatchLogProcessor, SdkLoggerProvider},
    metrics::{PeriodicReader, SdkMeterProvider},
    trace::{
        BatchConfigBuilder as TraceBatchConfigBuilder, BatchSpanProcessor, Sampler,
        SdkTracerProvider,
    },
    Resource,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Transport settings for one signal's exporter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExportSettings {
    pub(crate) protocol: ExportProtocol,
    pub(crate) endpoint: String,
    pub(crate) timeout: Duration,
    pub(crate) headers: HashMap<String, String>,
}

impl ExportSettings {
    pub(crate) fn for_signal(
        config: &AgentConfig,
        protocol: ExportProtocol,
        signal: Signal,
    ) -> Self {
        let base = with_scheme(config.endpoint.trim(), config.insecure);
        let endpoint = if protocol.is_http() {
            let base = base.trim_end_matches('/');
            if base.ends_with(signal.http_path()) {
                base.to_string()
            } else {
                format!("{base}{}", signal.http_path())
            }
        } else {
            base
        };

        Self {
            protocol,
            endpoint,
            timeout: config.timeout,
            headers: config.headers.clone(),
        }
    }

    fn metadata(&self) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        for (key, value) in &self.headers {
            match (
                key.parse::<MetadataKey<_>>(),
                value.parse::<MetadataValue<_>>(),
            ) {
                (Ok(k), Ok(v)) => {
                    metadata.insert(k, v);
                }
                _ => tracing::warn!(
                    target: "otel_agent",
                    header = %key,
                    "Skipping header that is not valid gRPC metadata"
                ),
            }
        }
        metadata
    }

    fn http_protocol(&self) -> Protocol {
        match self.protocol {
            ExportProtocol::HttpJson => Protocol::HttpJson,
            _ => Protocol::HttpBinary,
        }
    }
}

fn with_scheme(endpoint: &str, insecure: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if insecure {
        format!("http://{endpoint}")
    } else {
        format!("https://{endpoint}")
    }
}

macro_rules! build_exporter {
    ($exporter:ident, $settings:expr) => {{
        let settings: &ExportSettings = $settings;
        match settings.protocol {
            ExportProtocol::Grpc => $exporter::builder()
                .with_tonic()
                .with_endpoint(&settings.endpoint)
                .with_timeout(settings.timeout)
                .with_metadata(settings.metadata())
                .build(),
            ExportProtocol::HttpBinary | ExportProtocol::HttpJson => $exporter::builder()
                .with_http()
                .with_endpoint(&settings.endpoint)
                .with_timeout(settings.timeout)
                .with_protocol(settings.http_protocol())
                .with_headers(settings.headers.clone())
                .build(),
        }
    }};
}

/// Root sampler for the configured strategy. Ratio samplers respect the parent's
/// decision.
pub fn build_sampler(sampling: &SamplingConfig) -> Sampler {
    let rate = if sampling.rate.is_nan() {
        1.0
    } else {
        sampling.rate.clamp(0.0, 1.0)
    };

    match sampling.kind.trim().to_lowercase().as_str() {
        "always_on" | "always" => Sampler::AlwaysOn,
        "always_off" | "never" => Sampler::AlwaysOff,
        "" | "parent_based" | "parentbased" | "ratio" | "traceidratio"
        | "parentbased_traceidratio" => {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate)))
        }
        other => {
            tracing::warn!(
                target: "otel_agent",
                sampler = %other,
                "Unknown sampler, falling back to parent_based"
            );
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate)))
        }
    }
}

pub(crate) fn build_tracer_provider(
    config: &AgentConfig,
    protocol: ExportProtocol,
    resource: Resource,
    scrubber: Arc<AttributeScrubber>,
    health: Arc<ExporterHealth>,
) -> Result<SdkTracerProvider, AgentError> {
    let settings = ExportSettings::for_signal(config, protocol, Signal::Traces);
    let exporter = build_exporter!(OtlpSpanExporter, &settings)
        .map_err(|e| AgentError::provider(Signal::Traces, e))?;

    let exporter =
        HealthReportingSpanExporter::new(ScrubbingSpanExporter::new(exporter, scrubber), health);

    let batch = config.traces.batch;
    let batch_config = TraceBatchConfigBuilder::default()
        .with_max_queue_size(batch.max_queue_size)
        .with_max_export_batch_size(batch.max_export_batch_size)
        .with_scheduled_delay(batch.scheduled_delay)
        .build();

    let span_processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    Ok(SdkTracerProvider::builder()
        .with_span_processor(span_processor)
        .with_sampler(build_sampler(&config.traces.sampling))
        .with_max_attributes_per_span(config.traces.max_attributes_per_span)
        .with_max_events_per_span(config.traces.max_events_per_span)
        .with_max_links_per_span(config.traces.max_links_per_span)
        .with_resource(resource)
        .build())
}

pub(crate) fn build_meter_provider(
    config: &AgentConfig,
    protocol: ExportProtocol,
    resource: Resource,
) -> Result<SdkMeterProvider, AgentError> {
    let settings = ExportSettings::for_signal(config, protocol, Signal::Metrics);
    let exporter = build_exporter!(OtlpMetricExporter, &settings)
        .map_err(|e| AgentError::provider(Signal::Metrics, e))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.metrics.export_interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

pub(crate) fn build_logger_provider(
    config: &AgentConfig,
    protocol: ExportProtocol,
    resource: Resource,
) -> Result<SdkLoggerProvider, AgentError> {
    let settings = ExportSettings::for_signal(config, protocol, Signal::Logs);
    let exporter = build_exporter!(OtlpLogExporter, &settings)
        .map_err(|e| AgentError::provider(Signal::Logs, e))?;

    let batch = config.logs.batch;
    let batch_config = LogBatchConfigBuilder::default()
        .with_max_queue_size(batch.max_queue_size)
        .with_max_export_batch_size(batch.max_export_batch_size)
        .with_scheduled_delay(batch.scheduled_delay)
        .build();

    let log_processor = BatchLogProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    Ok(SdkLoggerProvider::builder()
        .with_log_processor(log_processor)
        .with_resource(resource)
        .build())
}

/// Installs the global `tracing` subscriber: an `EnvFilter` (default `info`), a fmt
/// layer, and the OpenTelemetry span and log bridges for whichever providers exist.
pub(crate) fn install_subscriber(
    tracer_provider: Option<&SdkTracerProvider>,
    logger_provider: Option<&SdkLoggerProvider>,
) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    match (tracer_provider, logger_provider) {
        (Some(tp), Some(lp)) => {
            let telemetry_layer =
                tracing_opentelemetry::layer().with_tracer(tp.tracer(env!("CARGO_PKG_NAME")));
            let log_layer = OpenTelemetryTracingBridge::new(lp);
            registry.with(telemetry_layer).with(log_layer).try_init()
        }
        (Some(tp), None) => {
            let telemetry_layer =
                tracing_opentelemetry::layer().with_tracer(tp.tracer(env!("CARGO_PKG_NAME")));
            registry.with(telemetry_layer).try_init()
        }
        (None, Some(lp)) => registry.with(OpenTelemetryTracingBridge::new(lp)).try_init(),
        (None, None) => registry.try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogsConfig, MetricsConfig, ScrubConfig};

    fn config(endpoint: &str) -> AgentConfig {
        AgentConfig::builder()
            .service_name("orders")
            .endpoint(endpoint)
            .headers(HashMap::from([(
                "x-tenant".to_string(),
                "acme".to_string(),
            )]))
            .build()
    }

    #[test]
    fn test_grpc_endpoint_gets_scheme() {
        let settings = ExportSettings::for_signal(
            &config("localhost:4317"),
            ExportProtocol::Grpc,
            Signal::Traces,
        );
        assert_eq!(settings.endpoint, "http://localhost:4317");

        let secure = AgentConfig {
            insecure: false,
            ..config("collector:4317")
        };
        let settings = ExportSettings::for_signal(&secure, ExportProtocol::Grpc, Signal::Metrics);
        assert_eq!(settings.endpoint, "https://collector:4317");
    }

    #[test]
    fn test_http_endpoint_gets_signal_path() {
        let settings = ExportSettings::for_signal(
            &config("http://collector:4318/"),
            ExportProtocol::HttpBinary,
            Signal::Logs,
        );
        assert_eq!(settings.endpoint, "http://collector:4318/v1/logs");

        let settings = ExportSettings::for_signal(
            &config("http://collector:4318/v1/traces"),
            ExportProtocol::HttpJson,
            Signal::Traces,
        );
        assert_eq!(settings.endpoint, "http://collector:4318/v1/traces");
        assert_eq!(settings.http_protocol(), Protocol::HttpJson);
    }

    #[test]
    fn test_headers_become_metadata() {
        let mut cfg = config("localhost:4317");
        cfg.headers.insert("bad header".to_string(), "x".to_string());

        let settings = ExportSettings::for_signal(&cfg, ExportProtocol::Grpc, Signal::Traces);
        let metadata = settings.metadata();

        assert_eq!(metadata.get("x-tenant").unwrap().to_str().unwrap(), "acme");
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn test_sampler_selection() {
        let sampler = |kind: &str, rate: f64| {
            format!(
                "{:?}",
                build_sampler(&SamplingConfig {
                    kind: kind.to_string(),
                    rate,
                })
            )
        };

        assert_eq!(sampler("always_on", 0.1), format!("{:?}", Sampler::AlwaysOn));
        assert_eq!(sampler("never", 0.1), format!("{:?}", Sampler::AlwaysOff));
        assert_eq!(
            sampler("ratio", 0.25),
            format!(
                "{:?}",
                Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(0.25)))
            )
        );
        assert_eq!(
            sampler("bogus", 7.0),
            format!(
                "{:?}",
                Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(1.0)))
            )
        );
    }

    #[tokio::test]
    async fn test_http_providers_build_without_a_collector() {
        let cfg = AgentConfig {
            exporter_protocol: "http/protobuf".to_string(),
            metrics: MetricsConfig::default(),
            logs: LogsConfig::default(),
            ..config("localhost:4318")
        };
        let resource = crate::resource::build_resource(&cfg);
        let scrubber = Arc::new(AttributeScrubber::new(&ScrubConfig::default()));
        let health = Arc::new(ExporterHealth::new());

        let tracer_provider = build_tracer_provider(
            &cfg,
            ExportProtocol::HttpBinary,
            resource.clone(),
            scrubber,
            health,
        )
        .unwrap();
        let meter_provider =
            build_meter_provider(&cfg, ExportProtocol::HttpBinary, resource.clone()).unwrap();
        let logger_provider =
            build_logger_provider(&cfg, ExportProtocol::HttpBinary, resource).unwrap();

        // Nothing was recorded, so shutting down does not need the collector.
        let _ = tokio::task::spawn_blocking(move || {
            let _ = tracer_provider.shutdown();
            let _ = meter_provider.shutdown();
            let _ = logger_provider.shutdown();
        })
        .await;
    }
}

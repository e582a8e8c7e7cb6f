//! Configuration for the agent and its building blocks.
//!
//! [`AgentConfig`] is plain data: the agent never reads the environment on its own.
//! Build it in code with the builder, start from [`AgentConfig::default`], or load
//! it from `OTEL_*` variables with [`AgentConfig::from_env`].
//!
//! ```
//! use otel_agent::{AgentConfig, ScrubConfig};
//!
//! let config = AgentConfig::builder()
//!     .service_name("checkout")
//!     .environment("production")
//!     .scrub(ScrubConfig {
//!         enabled: true,
//!         ..ScrubConfig::default()
//!     })
//!     .build();
//!
//! assert_eq!(config.service_name, "checkout");
//! assert!(config.route_exclusion.exact_paths.contains(&"/health".to_string()));
//! ```

use crate::constants::defaults;

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level agent configuration.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Master switch. A disabled agent never touches the network.
    #[builder(default = true)]
    pub enabled: bool,

    #[builder(into, default)]
    pub service_name: String,

    #[builder(into, default)]
    pub service_namespace: String,

    #[builder(into, default = defaults::SERVICE_VERSION.to_string())]
    pub service_version: String,

    #[builder(into, default = defaults::ENVIRONMENT.to_string())]
    pub environment: String,

    /// Collector address, with or without a scheme.
    #[builder(into, default = defaults::ENDPOINT.to_string())]
    pub endpoint: String,

    /// Protocol name, validated during `init`.
    #[builder(into, default = defaults::PROTOCOL.to_string())]
    pub exporter_protocol: String,

    /// Use plain-text transport when the endpoint carries no scheme.
    #[builder(default = true)]
    pub insecure: bool,

    #[builder(default = defaults::TIMEOUT)]
    pub timeout: Duration,

    /// Extra headers (HTTP) or metadata (gRPC) sent with every export.
    #[builder(default)]
    pub headers: HashMap<String, String>,

    #[builder(default = defaults::SHUTDOWN_TIMEOUT)]
    pub shutdown_timeout: Duration,

    #[builder(default)]
    pub resource: ResourceConfig,

    #[builder(default)]
    pub traces: TracesConfig,

    #[builder(default)]
    pub metrics: MetricsConfig,

    #[builder(default)]
    pub logs: LogsConfig,

    #[builder(default = RouteExclusionConfig::health_checks())]
    pub route_exclusion: RouteExclusionConfig,

    #[builder(default)]
    pub scrub: ScrubConfig,

    #[builder(default)]
    pub http: HttpConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig::builder().build()
    }
}

impl AgentConfig {
    /// Whether at least one signal would be exported.
    pub fn any_signal_enabled(&self) -> bool {
        self.traces.enabled || self.metrics.enabled || self.logs.enabled
    }
}

/// Identity attributes attached to every piece of telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub service_instance: String,
    pub k8s_pod_name: String,
    pub k8s_pod_ip: String,
    pub k8s_namespace: String,
    pub k8s_node_name: String,
    pub k8s_cluster_name: String,
    pub container_name: String,
    pub container_id: String,
    pub custom_attributes: HashMap<String, String>,
}

/// Sampling strategy for root spans.
///
/// `kind` accepts `always_on`/`always`, `always_off`/`never`, `ratio`/`traceidratio`
/// and `parent_based` (the default). Every ratio variant is wrapped in a parent-based
/// sampler so that sampling decisions follow the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub kind: String,
    pub rate: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            kind: defaults::SAMPLER.to_string(),
            rate: defaults::SAMPLING_RATE,
        }
    }
}

/// Batch processor tuning shared by spans and log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub scheduled_delay: Duration,
    pub max_export_batch_size: usize,
    pub max_queue_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scheduled_delay: defaults::BATCH_TIMEOUT,
            max_export_batch_size: defaults::BATCH_SIZE,
            max_queue_size: defaults::QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracesConfig {
    pub enabled: bool,
    pub sampling: SamplingConfig,
    pub max_attributes_per_span: u32,
    pub max_events_per_span: u32,
    pub max_links_per_span: u32,
    pub batch: BatchConfig,
}

impl Default for TracesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling: SamplingConfig::default(),
            max_attributes_per_span: defaults::SPAN_LIMIT,
            max_events_per_span: defaults::SPAN_LIMIT,
            max_links_per_span: defaults::SPAN_LIMIT,
            batch: BatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// How often the periodic reader pushes metrics.
    pub export_interval: Duration,
    /// How often the runtime collector samples.
    pub runtime_interval: Duration,
    /// Whether the runtime collector runs at all.
    pub runtime: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            export_interval: defaults::METRIC_EXPORT_INTERVAL,
            runtime_interval: defaults::RUNTIME_METRIC_INTERVAL,
            runtime: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub enabled: bool,
    pub batch: BatchConfig,
    /// Install a global `tracing` subscriber bridging events into OpenTelemetry logs
    /// and spans. Off by default so libraries embedding the agent keep control.
    pub install_subscriber: bool,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch: BatchConfig::default(),
            install_subscriber: false,
        }
    }
}

/// Rules for paths that should not be traced.
///
/// The default is empty, which excludes nothing. [`AgentConfig::default`] seeds the
/// usual health-check paths through [`RouteExclusionConfig::health_checks`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteExclusionConfig {
    pub exact_paths: Vec<String>,
    pub prefix_paths: Vec<String>,
    pub patterns: Vec<String>,
}

impl RouteExclusionConfig {
    /// Exclusion rules for the conventional health and metrics endpoints.
    pub fn health_checks() -> Self {
        Self {
            exact_paths: defaults::EXCLUDED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ..Self::default()
        }
    }
}

/// Attribute scrubbing rules.
///
/// `db_statement_max_length` is `0` for no limit, a positive byte count to truncate,
/// or `-1` to redact captured statements entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubConfig {
    pub enabled: bool,
    pub sensitive_keys: Vec<String>,
    pub sensitive_patterns: Vec<String>,
    pub redacted_value: String,
    pub db_statement_max_length: i64,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sensitive_keys: to_strings(defaults::SENSITIVE_KEYS),
            sensitive_patterns: to_strings(defaults::SENSITIVE_PATTERNS),
            redacted_value: defaults::REDACTED_VALUE.to_string(),
            db_statement_max_length: defaults::DB_STATEMENT_MAX_LENGTH,
        }
    }
}

impl ScrubConfig {
    /// The redaction literal, falling back to `[REDACTED]` when blank.
    pub fn redaction(&self) -> &str {
        if self.redacted_value.is_empty() {
            defaults::REDACTED_VALUE
        } else {
            &self.redacted_value
        }
    }
}

/// What the HTTP adapters may capture from requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub capture_request_headers: bool,
    pub capture_response_headers: bool,
    pub allowed_request_headers: Vec<String>,
    pub allowed_response_headers: Vec<String>,
    pub capture_query_params: bool,
    pub capture_request_body: bool,
    pub capture_response_body: bool,
    pub request_body_max_size: usize,
    pub response_body_max_size: usize,
    pub body_allowed_content_types: Vec<String>,
    pub record_exception_events: bool,
    pub sensitive_headers: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            capture_request_headers: true,
            capture_response_headers: true,
            allowed_request_headers: Vec::new(),
            allowed_response_headers: Vec::new(),
            capture_query_params: true,
            capture_request_body: false,
            capture_response_body: false,
            request_body_max_size: defaults::BODY_MAX_SIZE,
            response_body_max_size: defaults::BODY_MAX_SIZE,
            body_allowed_content_types: to_strings(defaults::BODY_ALLOWED_CONTENT_TYPES),
            record_exception_events: true,
            sensitive_headers: to_strings(defaults::SENSITIVE_HEADERS),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

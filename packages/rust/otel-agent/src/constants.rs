//! Constants for the otel-agent package.
//!
//! This file centralizes environment variable names, default values and attribute
//! keys so the configuration loader, the agent and the tests agree on them.

/// Environment variable names read by [`AgentConfig::from_env`](crate::AgentConfig::from_env).
pub mod env_vars {
    /// Master switch for the agent.
    pub const ENABLED: &str = "OTEL_ENABLED";

    /// Service name for telemetry.
    pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

    /// Logical namespace the service belongs to.
    pub const SERVICE_NAMESPACE: &str = "OTEL_SERVICE_NAMESPACE";

    /// Service version, falls back to `VERSION`.
    pub const SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";
    pub const VERSION: &str = "VERSION";

    /// Deployment environment, falls back to `DEPLOYMENT_ENVIRONMENT`.
    pub const ENVIRONMENT: &str = "ENV";
    pub const DEPLOYMENT_ENVIRONMENT: &str = "DEPLOYMENT_ENVIRONMENT";

    /// Stable instance identifier, defaults to the host name.
    pub const SERVICE_INSTANCE: &str = "OTEL_SERVICE_INSTANCE";
    pub const HOSTNAME: &str = "HOSTNAME";

    /// OTLP exporter settings.
    pub const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const OTLP_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
    pub const OTLP_INSECURE: &str = "OTEL_EXPORTER_OTLP_INSECURE";
    pub const OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
    pub const OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";

    /// Resource attributes in KEY=VALUE,KEY2=VALUE2 format.
    pub const RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";

    /// Kubernetes and container identity.
    pub const K8S_POD_NAME: &str = "K8S_POD_NAME";
    pub const POD_NAME: &str = "POD_NAME";
    pub const K8S_POD_IP: &str = "K8S_POD_IP";
    pub const POD_IP: &str = "POD_IP";
    pub const K8S_NAMESPACE: &str = "K8S_NAMESPACE";
    pub const POD_NAMESPACE: &str = "POD_NAMESPACE";
    pub const K8S_NODE_NAME: &str = "K8S_NODE_NAME";
    pub const NODE_NAME: &str = "NODE_NAME";
    pub const K8S_CLUSTER_NAME: &str = "K8S_CLUSTER_NAME";
    pub const CONTAINER_NAME: &str = "CONTAINER_NAME";
    pub const CONTAINER_ID: &str = "CONTAINER_ID";

    /// Traces.
    pub const TRACES_ENABLED: &str = "OTEL_TRACES_ENABLED";
    pub const TRACES_SAMPLER: &str = "OTEL_TRACES_SAMPLER";
    pub const TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";
    pub const SPAN_ATTRIBUTE_COUNT_LIMIT: &str = "OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT";
    pub const SPAN_EVENT_COUNT_LIMIT: &str = "OTEL_SPAN_EVENT_COUNT_LIMIT";
    pub const SPAN_LINK_COUNT_LIMIT: &str = "OTEL_SPAN_LINK_COUNT_LIMIT";
    pub const BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
    pub const BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";
    pub const BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";

    /// Metrics.
    pub const METRICS_ENABLED: &str = "OTEL_METRICS_ENABLED";
    pub const METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
    pub const RUNTIME_METRIC_INTERVAL: &str = "OTEL_RUNTIME_METRIC_INTERVAL";
    pub const METRICS_RUNTIME_ENABLED: &str = "OTEL_METRICS_RUNTIME_ENABLED";

    /// Logs.
    pub const LOGS_ENABLED: &str = "OTEL_LOGS_ENABLED";
    pub const BLRP_SCHEDULE_DELAY: &str = "OTEL_BLRP_SCHEDULE_DELAY";
    pub const BLRP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE";
    pub const BLRP_MAX_QUEUE_SIZE: &str = "OTEL_BLRP_MAX_QUEUE_SIZE";
    pub const LOGS_INSTALL_SUBSCRIBER: &str = "OTEL_LOGS_INSTALL_SUBSCRIBER";

    /// Route exclusion.
    pub const EXCLUDED_PATHS: &str = "OTEL_TRACES_EXCLUDED_PATHS";
    pub const EXCLUDED_PREFIXES: &str = "OTEL_TRACES_EXCLUDED_PREFIXES";
    pub const EXCLUDED_PATTERNS: &str = "OTEL_TRACES_EXCLUDED_PATTERNS";

    /// PII scrubbing.
    pub const PII_SCRUB_ENABLED: &str = "OTEL_PII_SCRUB_ENABLED";
    pub const PII_SENSITIVE_KEYS: &str = "OTEL_PII_SENSITIVE_KEYS";
    pub const PII_SENSITIVE_PATTERNS: &str = "OTEL_PII_SENSITIVE_PATTERNS";
    pub const PII_REDACTED_VALUE: &str = "OTEL_PII_REDACTED_VALUE";
    pub const PII_DB_STATEMENT_MAX_LENGTH: &str = "OTEL_PII_DB_STATEMENT_MAX_LENGTH";

    /// HTTP capture.
    pub const HTTP_CAPTURE_REQUEST_HEADERS: &str = "OTEL_HTTP_CAPTURE_REQUEST_HEADERS";
    pub const HTTP_CAPTURE_RESPONSE_HEADERS: &str = "OTEL_HTTP_CAPTURE_RESPONSE_HEADERS";
    pub const HTTP_ALLOWED_REQUEST_HEADERS: &str = "OTEL_HTTP_ALLOWED_REQUEST_HEADERS";
    pub const HTTP_ALLOWED_RESPONSE_HEADERS: &str = "OTEL_HTTP_ALLOWED_RESPONSE_HEADERS";
    pub const HTTP_CAPTURE_QUERY_PARAMS: &str = "OTEL_HTTP_CAPTURE_QUERY_PARAMS";
    pub const HTTP_CAPTURE_REQUEST_BODY: &str = "OTEL_HTTP_CAPTURE_REQUEST_BODY";
    pub const HTTP_CAPTURE_RESPONSE_BODY: &str = "OTEL_HTTP_CAPTURE_RESPONSE_BODY";
    pub const HTTP_REQUEST_BODY_MAX_SIZE: &str = "OTEL_HTTP_REQUEST_BODY_MAX_SIZE";
    pub const HTTP_RESPONSE_BODY_MAX_SIZE: &str = "OTEL_HTTP_RESPONSE_BODY_MAX_SIZE";
    pub const HTTP_BODY_ALLOWED_CONTENT_TYPES: &str = "OTEL_HTTP_BODY_ALLOWED_CONTENT_TYPES";
    pub const HTTP_RECORD_EXCEPTION_EVENTS: &str = "OTEL_HTTP_RECORD_EXCEPTION_EVENTS";
    pub const HTTP_SENSITIVE_HEADERS: &str = "OTEL_HTTP_SENSITIVE_HEADERS";
}

/// Default values for configuration parameters.
pub mod defaults {
    use std::time::Duration;

    pub const SERVICE_VERSION: &str = "0.0.0";
    pub const ENVIRONMENT: &str = "development";
    pub const ENDPOINT: &str = "localhost:4317";
    pub const PROTOCOL: &str = "grpc";
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    /// Upper bound for [`Agent::shutdown`](crate::Agent::shutdown).
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

    pub const SAMPLER: &str = "parent_based";
    pub const SAMPLING_RATE: f64 = 1.0;
    pub const SPAN_LIMIT: u32 = 128;

    pub const BATCH_TIMEOUT: Duration = Duration::from_secs(5);
    pub const BATCH_SIZE: usize = 512;
    pub const QUEUE_SIZE: usize = 2048;

    pub const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(30);
    pub const RUNTIME_METRIC_INTERVAL: Duration = Duration::from_secs(10);

    /// Paths excluded from tracing when no explicit list is configured.
    pub const EXCLUDED_PATHS: &[&str] = &[
        "/health",
        "/healthz",
        "/health_check",
        "/metrics",
        "/ready",
        "/live",
    ];

    pub const SENSITIVE_KEYS: &[&str] = &["password", "token", "secret", "key", "email"];
    pub const SENSITIVE_PATTERNS: &[&str] = &[".*password.*", ".*token.*", ".*secret.*"];
    pub const REDACTED_VALUE: &str = "[REDACTED]";
    pub const DB_STATEMENT_MAX_LENGTH: i64 = 2048;

    pub const BODY_MAX_SIZE: usize = 8192;
    pub const BODY_ALLOWED_CONTENT_TYPES: &[&str] =
        &["application/json", "application/xml", "text/plain"];
    pub const SENSITIVE_HEADERS: &[&str] = &[
        "authorization",
        "cookie",
        "set-cookie",
        "x-api-key",
        "x-auth-token",
    ];

    /// Consecutive export failures before a signal is reported degraded.
    pub const DEGRADED_THRESHOLD: u32 = 3;
    /// Consecutive export failures before a signal is reported unhealthy.
    pub const UNHEALTHY_THRESHOLD: u32 = 10;

    /// Component used by the metric helpers when the caller does not name one.
    pub const COMPONENT: &str = "default";
}

/// Attribute keys written or inspected by the agent.
pub mod attributes {
    /// Attribute holding captured database statements.
    pub const DB_STATEMENT: &str = "db.statement";

    /// Attribute attached by the metric helpers.
    pub const COMPONENT: &str = "component";

    pub const OPERATION: &str = "operation";

    /// Wall-clock duration recorded by [`trace_fn`](crate::trace_fn).
    pub const DURATION_MS: &str = "duration_ms";

    pub const SERVICE_NAMESPACE: &str = "service.namespace";
    pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";
    pub const ENVIRONMENT: &str = "environment";
    pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
    pub const K8S_POD_NAME: &str = "k8s.pod.name";
    pub const K8S_POD_IP: &str = "k8s.pod.ip";
    pub const K8S_NAMESPACE_NAME: &str = "k8s.namespace.name";
    pub const K8S_NODE_NAME: &str = "k8s.node.name";
    pub const K8S_CLUSTER_NAME: &str = "k8s.cluster.name";
    pub const CONTAINER_NAME: &str = "container.name";
    pub const CONTAINER_ID: &str = "container.id";
    pub const PROCESS_RUNTIME_NAME: &str = "process.runtime.name";
    pub const TELEMETRY_AGENT_NAME: &str = "telemetry.agent.name";
    pub const TELEMETRY_AGENT_VERSION: &str = "telemetry.agent.version";
}

/// Signal names used as keys in the exporter health tracker.
pub mod signals {
    pub const TRACES: &str = "traces";
    pub const METRICS: &str = "metrics";
    pub const LOGS: &str = "logs";
}

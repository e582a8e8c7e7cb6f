//! Loading [`AgentConfig`] from `OTEL_*` environment variables.
//!
//! Unset or unparsable variables keep the default. Booleans accept `true`, `1` and
//! `yes`. Durations accept `500ms`, `5s`, `2m` or a bare number of milliseconds.
//! Lists are comma separated with blank entries dropped.

use crate::config::{
    AgentConfig, BatchConfig, HttpConfig, LogsConfig, MetricsConfig, ResourceConfig,
    RouteExclusionConfig, SamplingConfig, ScrubConfig, TracesConfig,
};
use crate::constants::{defaults, env_vars};

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use urlencoding::decode;

impl AgentConfig {
    /// Build a configuration from the process environment.
    ///
    /// ```no_run
    /// use otel_agent::AgentConfig;
    ///
    /// std::env::set_var("OTEL_SERVICE_NAME", "billing");
    /// let config = AgentConfig::from_env();
    /// assert_eq!(config.service_name, "billing");
    /// ```
    pub fn from_env() -> Self {
        let environment = string_var(
            defaults::ENVIRONMENT,
            &[env_vars::ENVIRONMENT, env_vars::DEPLOYMENT_ENVIRONMENT],
        );

        AgentConfig {
            enabled: bool_var(true, &[env_vars::ENABLED]),
            service_name: string_var("", &[env_vars::SERVICE_NAME]),
            service_namespace: string_var("", &[env_vars::SERVICE_NAMESPACE]),
            service_version: string_var(
                defaults::SERVICE_VERSION,
                &[env_vars::SERVICE_VERSION, env_vars::VERSION],
            ),
            endpoint: strip_url_scheme(&string_var(
                defaults::ENDPOINT,
                &[env_vars::OTLP_ENDPOINT],
            )),
            exporter_protocol: string_var(defaults::PROTOCOL, &[env_vars::OTLP_PROTOCOL]),
            insecure: bool_var(true, &[env_vars::OTLP_INSECURE]),
            timeout: duration_var(env_vars::OTLP_TIMEOUT, defaults::TIMEOUT),
            headers: env::var(env_vars::OTLP_HEADERS)
                .map(|v| parse_key_value_pairs(&v))
                .unwrap_or_default(),
            shutdown_timeout: defaults::SHUTDOWN_TIMEOUT,
            resource: load_resource(),
            traces: load_traces(&environment),
            metrics: load_metrics(),
            logs: load_logs(),
            route_exclusion: load_route_exclusion(),
            scrub: load_scrub(),
            http: load_http(),
            environment,
        }
    }
}

fn load_resource() -> ResourceConfig {
    ResourceConfig {
        service_instance: string_var(&hostname(), &[env_vars::SERVICE_INSTANCE]),
        k8s_pod_name: string_var("", &[env_vars::POD_NAME, env_vars::K8S_POD_NAME]),
        k8s_pod_ip: string_var("", &[env_vars::POD_IP, env_vars::K8S_POD_IP]),
        k8s_namespace: string_var("", &[env_vars::POD_NAMESPACE, env_vars::K8S_NAMESPACE]),
        k8s_node_name: string_var("", &[env_vars::NODE_NAME, env_vars::K8S_NODE_NAME]),
        k8s_cluster_name: string_var("", &[env_vars::K8S_CLUSTER_NAME]),
        container_name: string_var("", &[env_vars::CONTAINER_NAME]),
        container_id: string_var("", &[env_vars::CONTAINER_ID]),
        custom_attributes: env::var(env_vars::RESOURCE_ATTRIBUTES)
            .map(|v| parse_key_value_pairs(&v))
            .unwrap_or_default(),
    }
}

fn load_traces(environment: &str) -> TracesConfig {
    TracesConfig {
        enabled: bool_var(true, &[env_vars::TRACES_ENABLED]),
        sampling: SamplingConfig {
            kind: string_var(defaults::SAMPLER, &[env_vars::TRACES_SAMPLER]),
            rate: parsed_var(
                env_vars::TRACES_SAMPLER_ARG,
                default_sampling_rate(environment),
            ),
        },
        max_attributes_per_span: parsed_var(
            env_vars::SPAN_ATTRIBUTE_COUNT_LIMIT,
            defaults::SPAN_LIMIT,
        ),
        max_events_per_span: parsed_var(env_vars::SPAN_EVENT_COUNT_LIMIT, defaults::SPAN_LIMIT),
        max_links_per_span: parsed_var(env_vars::SPAN_LINK_COUNT_LIMIT, defaults::SPAN_LIMIT),
        batch: BatchConfig {
            scheduled_delay: duration_var(env_vars::BSP_SCHEDULE_DELAY, defaults::BATCH_TIMEOUT),
            max_export_batch_size: parsed_var(
                env_vars::BSP_MAX_EXPORT_BATCH_SIZE,
                defaults::BATCH_SIZE,
            ),
            max_queue_size: parsed_var(env_vars::BSP_MAX_QUEUE_SIZE, defaults::QUEUE_SIZE),
        },
    }
}

fn load_metrics() -> MetricsConfig {
    MetricsConfig {
        enabled: bool_var(true, &[env_vars::METRICS_ENABLED]),
        export_interval: duration_var(
            env_vars::METRIC_EXPORT_INTERVAL,
            defaults::METRIC_EXPORT_INTERVAL,
        ),
        runtime_interval: duration_var(
            env_vars::RUNTIME_METRIC_INTERVAL,
            defaults::RUNTIME_METRIC_INTERVAL,
        ),
        runtime: bool_var(true, &[env_vars::METRICS_RUNTIME_ENABLED]),
    }
}

fn load_logs() -> LogsConfig {
    LogsConfig {
        enabled: bool_var(true, &[env_vars::LOGS_ENABLED]),
        batch: BatchConfig {
            scheduled_delay: duration_var(env_vars::BLRP_SCHEDULE_DELAY, defaults::BATCH_TIMEOUT),
            max_export_batch_size: parsed_var(
                env_vars::BLRP_MAX_EXPORT_BATCH_SIZE,
                defaults::BATCH_SIZE,
            ),
            max_queue_size: parsed_var(env_vars::BLRP_MAX_QUEUE_SIZE, defaults::QUEUE_SIZE),
        },
        install_subscriber: bool_var(false, &[env_vars::LOGS_INSTALL_SUBSCRIBER]),
    }
}

fn load_route_exclusion() -> RouteExclusionConfig {
    let health_checks = RouteExclusionConfig::health_checks();
    RouteExclusionConfig {
        exact_paths: list_var(env_vars::EXCLUDED_PATHS, health_checks.exact_paths),
        prefix_paths: list_var(env_vars::EXCLUDED_PREFIXES, Vec::new()),
        patterns: list_var(env_vars::EXCLUDED_PATTERNS, Vec::new()),
    }
}

fn load_scrub() -> ScrubConfig {
    let fallback = ScrubConfig::default();
    ScrubConfig {
        enabled: bool_var(false, &[env_vars::PII_SCRUB_ENABLED]),
        sensitive_keys: list_var(env_vars::PII_SENSITIVE_KEYS, fallback.sensitive_keys),
        sensitive_patterns: list_var(
            env_vars::PII_SENSITIVE_PATTERNS,
            fallback.sensitive_patterns,
        ),
        redacted_value: string_var(&fallback.redacted_value, &[env_vars::PII_REDACTED_VALUE]),
        db_statement_max_length: parsed_var(
            env_vars::PII_DB_STATEMENT_MAX_LENGTH,
            fallback.db_statement_max_length,
        ),
    }
}

fn load_http() -> HttpConfig {
    let fallback = HttpConfig::default();
    HttpConfig {
        capture_request_headers: bool_var(true, &[env_vars::HTTP_CAPTURE_REQUEST_HEADERS]),
        capture_response_headers: bool_var(true, &[env_vars::HTTP_CAPTURE_RESPONSE_HEADERS]),
        allowed_request_headers: list_var(env_vars::HTTP_ALLOWED_REQUEST_HEADERS, Vec::new()),
        allowed_response_headers: list_var(env_vars::HTTP_ALLOWED_RESPONSE_HEADERS, Vec::new()),
        capture_query_params: bool_var(true, &[env_vars::HTTP_CAPTURE_QUERY_PARAMS]),
        capture_request_body: bool_var(false, &[env_vars::HTTP_CAPTURE_REQUEST_BODY]),
        capture_response_body: bool_var(false, &[env_vars::HTTP_CAPTURE_RESPONSE_BODY]),
        request_body_max_size: parsed_var(
            env_vars::HTTP_REQUEST_BODY_MAX_SIZE,
            fallback.request_body_max_size,
        ),
        response_body_max_size: parsed_var(
            env_vars::HTTP_RESPONSE_BODY_MAX_SIZE,
            fallback.response_body_max_size,
        ),
        body_allowed_content_types: list_var(
            env_vars::HTTP_BODY_ALLOWED_CONTENT_TYPES,
            fallback.body_allowed_content_types,
        ),
        record_exception_events: bool_var(true, &[env_vars::HTTP_RECORD_EXCEPTION_EVENTS]),
        sensitive_headers: list_var(env_vars::HTTP_SENSITIVE_HEADERS, fallback.sensitive_headers),
    }
}

/// First non-empty value among `keys`, or `default`.
fn string_var(default: &str, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn bool_var(default: bool, keys: &[&str]) -> bool {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .map(|value| matches!(value.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn duration_var(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| parse_duration(&value))
        .unwrap_or(default)
}

fn list_var(key: &str, default: Vec<String>) -> Vec<String> {
    let values: Vec<String> = env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    if values.is_empty() {
        default
    } else {
        values
    }
}

pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<u64>() {
        return Some(Duration::from_millis(millis));
    }

    let (number, unit) = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .map(|idx| value.split_at(idx))?;
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }

    let seconds = match unit {
        "ms" => number / 1000.0,
        "s" => number,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(seconds).ok()
}

/// Parse `key=value,key2=value2`, URL-decoding values.
pub(crate) fn parse_key_value_pairs(value: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    for pair in value.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            continue;
        }
        let value = decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        result.insert(key.to_string(), value);
    }
    result
}

fn default_sampling_rate(environment: &str) -> f64 {
    match environment {
        "production" => 0.1,
        "staging" => 0.5,
        _ => defaults::SAMPLING_RATE,
    }
}

fn strip_url_scheme(endpoint: &str) -> String {
    match endpoint.split_once("://") {
        Some((_, rest)) => rest.trim_end_matches('/').to_string(),
        None => endpoint.to_string(),
    }
}

fn hostname() -> String {
    env::var(env_vars::HOSTNAME).unwrap_or_else(|_| "unknown".to_string())
}

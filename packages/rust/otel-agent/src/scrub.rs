//! Span attribute scrubbing.
//!
//! [`AttributeScrubber`] redacts the values of sensitive attributes and bounds the
//! size of captured database statements. It is applied to finished spans by
//! [`ScrubbingSpanExporter`], which sits between the batch processor and the OTLP
//! exporter, so every exported attribute passes through it regardless of when it was
//! set on the span.
//!
//! # Rules
//!
//! - A key is sensitive when it equals one of the configured keys, or when any
//!   configured pattern matches it case-insensitively.
//! - Sensitive values are replaced with the redaction literal (`[REDACTED]` unless
//!   configured otherwise).
//! - `db.statement` additionally follows `db_statement_max_length`: a positive value
//!   truncates to that many bytes and appends `...`, `-1` redacts, `0` leaves it alone.
//!   When the key is also sensitive, redaction happens first.
//!
//! A disabled scrubber leaves everything untouched.
//!
//! ```
//! use opentelemetry::KeyValue;
//! use otel_agent::{AttributeScrubber, ScrubConfig};
//!
//! let scrubber = AttributeScrubber::new(&ScrubConfig {
//!     enabled: true,
//!     ..ScrubConfig::default()
//! });
//!
//! let mut attributes = vec![
//!     KeyValue::new("user.password", "hunter2"),
//!     KeyValue::new("http.method", "GET"),
//! ];
//! scrubber.scrub(&mut attributes);
//!
//! assert_eq!(attributes[0].value.as_str(), "[REDACTED]");
//! assert_eq!(attributes[1].value.as_str(), "GET");
//! ```

use crate::config::ScrubConfig;
use crate::constants::attributes;

use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::{
    error::OTelSdkResult,
    trace::{SpanData, SpanExporter},
    Resource,
};
use regex::{Regex, RegexBuilder};
use std::{collections::HashSet, future::Future, sync::Arc};

/// Compiled attribute scrubbing rules.
#[derive(Debug, Clone)]
pub struct AttributeScrubber {
    enabled: bool,
    sensitive_keys: HashSet<String>,
    patterns: Vec<Regex>,
    redacted_value: String,
    db_statement_max_length: i64,
}

impl AttributeScrubber {
    pub fn new(config: &ScrubConfig) -> Self {
        Self {
            enabled: config.enabled,
            sensitive_keys: config.sensitive_keys.iter().cloned().collect(),
            patterns: compile_patterns(&config.sensitive_patterns),
            redacted_value: config.redaction().to_string(),
            db_statement_max_length: config.db_statement_max_length,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn redacted_value(&self) -> &str {
        &self.redacted_value
    }

    /// Whether values stored under `key` must be redacted.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive_keys.contains(key) || self.patterns.iter().any(|re| re.is_match(key))
    }

    /// Scrubs attributes in place. No-op when disabled.
    pub fn scrub(&self, attributes: &mut [KeyValue]) {
        if !self.enabled {
            return;
        }

        for attribute in attributes.iter_mut() {
            if let Some(value) = self.scrubbed_value(attribute) {
                attribute.value = value;
            }
        }
    }

    /// Returns the scrubbed form of a single attribute.
    pub fn scrub_attribute(&self, attribute: KeyValue) -> KeyValue {
        if !self.enabled {
            return attribute;
        }

        match self.scrubbed_value(&attribute) {
            Some(value) => KeyValue::new(attribute.key, value),
            None => attribute,
        }
    }

    /// Scrubs span and event attributes of a finished span.
    pub fn scrub_span(&self, span: &mut SpanData) {
        if !self.enabled {
            return;
        }

        self.scrub(&mut span.attributes);
        for event in span.events.events.iter_mut() {
            self.scrub(&mut event.attributes);
        }
    }

    // None means the attribute passes through unchanged.
    fn scrubbed_value(&self, attribute: &KeyValue) -> Option<Value> {
        let key = attribute.key.as_str();
        let sensitive = self.is_sensitive(key);
        let is_statement = key == attributes::DB_STATEMENT;

        if !sensitive && !is_statement {
            return None;
        }

        let mut value = if sensitive {
            self.redacted_value.clone()
        } else {
            attribute.value.as_str().into_owned()
        };

        if is_statement {
            match self.db_statement_max_length {
                -1 => value = self.redacted_value.clone(),
                max if max > 0 => {
                    let max = usize::try_from(max).unwrap_or(usize::MAX);
                    if value.len() > max {
                        value = format!("{}...", truncate_at_char_boundary(&value, max));
                    } else if !sensitive {
                        return None;
                    }
                }
                _ if !sensitive => return None,
                _ => {}
            }
        }

        Some(Value::from(value))
    }
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char boundary.
pub(crate) fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Compiles case-insensitive patterns, dropping the ones that fail.
pub(crate) fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .filter_map(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(
                        target: "otel_agent",
                        pattern = %pattern,
                        error = %e,
                        "Dropping invalid sensitive pattern"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Span exporter wrapper that scrubs every span before handing the batch on.
#[derive(Debug)]
pub struct ScrubbingSpanExporter<E> {
    inner: E,
    scrubber: Arc<AttributeScrubber>,
}

impl<E> ScrubbingSpanExporter<E> {
    pub fn new(inner: E, scrubber: Arc<AttributeScrubber>) -> Self {
        Self { inner, scrubber }
    }
}

impl<E> SpanExporter for ScrubbingSpanExporter<E>
where
    E: SpanExporter,
{
    fn export(&self, mut batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        if self.scrubber.is_enabled() {
            for span in batch.iter_mut() {
                self.scrubber.scrub_span(span);
            }
        }
        self.inner.export(batch)
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.inner.shutdown()
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{
        trace::{Event, SpanContext, SpanId, TraceFlags, TraceId, TraceState},
        InstrumentationScope,
    };
    use opentelemetry_sdk::trace::{SpanEvents, SpanLinks};
    use std::{borrow::Cow, sync::Mutex};

    fn enabled_config() -> ScrubConfig {
        ScrubConfig {
            enabled: true,
            ..ScrubConfig::default()
        }
    }

    fn value_of<'a>(attributes: &'a [KeyValue], key: &str) -> Cow<'a, str> {
        attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str())
            .unwrap()
    }

    #[derive(Debug, Default)]
    struct MockExporter {
        spans: Arc<Mutex<Vec<SpanData>>>,
    }

    impl SpanExporter for MockExporter {
        fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
            self.spans.lock().unwrap().extend(batch);
            std::future::ready(Ok(()))
        }

        fn shutdown(&mut self) -> OTelSdkResult {
            Ok(())
        }
    }

    fn create_test_span(attributes: Vec<KeyValue>) -> SpanData {
        let mut events = SpanEvents::default();
        events.events.push(Event::new(
            "login",
            std::time::SystemTime::now(),
            vec![KeyValue::new("auth.token", "abc123")],
            0,
        ));

        SpanData {
            span_context: SpanContext::new(
                TraceId::from_hex("01000000000000000000000000000000").unwrap(),
                SpanId::from_hex("0100000000000001").unwrap(),
                TraceFlags::default().with_sampled(true),
                false,
                TraceState::default(),
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: opentelemetry::trace::SpanKind::Internal,
            name: Cow::Borrowed("test"),
            start_time: std::time::SystemTime::now(),
            end_time: std::time::SystemTime::now(),
            attributes,
            dropped_attributes_count: 0,
            events,
            links: SpanLinks::default(),
            status: opentelemetry::trace::Status::default(),
            instrumentation_scope: InstrumentationScope::builder("test").build(),
        }
    }

    #[test]
    fn test_is_sensitive_exact_and_pattern() {
        let scrubber = AttributeScrubber::new(&enabled_config());

        assert!(scrubber.is_sensitive("password"));
        assert!(scrubber.is_sensitive("email"));
        assert!(scrubber.is_sensitive("user.PASSWORD.hash"));
        assert!(scrubber.is_sensitive("X-Auth-Token"));
        assert!(!scrubber.is_sensitive("http.method"));
        // Exact keys are literal: "key" does not match "api_key" on its own.
        assert!(!scrubber.is_sensitive("monkey.name"));
    }

    #[test]
    fn test_disabled_scrubber_changes_nothing() {
        let scrubber = AttributeScrubber::new(&ScrubConfig::default());
        let mut attributes = vec![
            KeyValue::new("password", "hunter2"),
            KeyValue::new("db.statement", "x".repeat(5000)),
        ];

        scrubber.scrub(&mut attributes);

        assert_eq!(value_of(&attributes, "password"), "hunter2");
        assert_eq!(value_of(&attributes, "db.statement").len(), 5000);
    }

    #[test]
    fn test_custom_redaction_literal() {
        let scrubber = AttributeScrubber::new(&ScrubConfig {
            redacted_value: "***".to_string(),
            ..enabled_config()
        });

        let scrubbed = scrubber.scrub_attribute(KeyValue::new("secret", "value"));
        assert_eq!(scrubbed.value.as_str(), "***");
        assert_eq!(scrubbed.key.as_str(), "secret");
    }

    #[test]
    fn test_db_statement_truncation() {
        let scrubber = AttributeScrubber::new(&ScrubConfig {
            db_statement_max_length: 10,
            ..enabled_config()
        });

        let scrubbed =
            scrubber.scrub_attribute(KeyValue::new("db.statement", "SELECT * FROM users"));
        assert_eq!(scrubbed.value.as_str(), "SELECT * F...");

        let short = scrubber.scrub_attribute(KeyValue::new("db.statement", "SELECT 1"));
        assert_eq!(short.value.as_str(), "SELECT 1");
    }

    #[test]
    fn test_db_statement_truncation_respects_char_boundaries() {
        let scrubber = AttributeScrubber::new(&ScrubConfig {
            db_statement_max_length: 2,
            ..enabled_config()
        });

        let scrubbed = scrubber.scrub_attribute(KeyValue::new("db.statement", "héllo"));
        assert_eq!(scrubbed.value.as_str(), "h...");
    }

    #[test]
    fn test_db_statement_redaction_and_passthrough() {
        let redacting = AttributeScrubber::new(&ScrubConfig {
            db_statement_max_length: -1,
            ..enabled_config()
        });
        let scrubbed = redacting.scrub_attribute(KeyValue::new("db.statement", "SELECT 1"));
        assert_eq!(scrubbed.value.as_str(), "[REDACTED]");

        let unlimited = AttributeScrubber::new(&ScrubConfig {
            db_statement_max_length: 0,
            ..enabled_config()
        });
        let statement = "x".repeat(10_000);
        let scrubbed = unlimited.scrub_attribute(KeyValue::new("db.statement", statement.clone()));
        assert_eq!(scrubbed.value.as_str(), statement);
    }

    #[test]
    fn test_sensitive_db_statement_is_redacted_then_bounded() {
        let scrubber = AttributeScrubber::new(&ScrubConfig {
            sensitive_keys: vec!["db.statement".to_string()],
            db_statement_max_length: 4,
            ..enabled_config()
        });

        let scrubbed = scrubber.scrub_attribute(KeyValue::new("db.statement", "SELECT 1"));
        assert_eq!(scrubbed.value.as_str(), "[RED...");
    }

    #[test]
    fn test_invalid_patterns_are_dropped() {
        let scrubber = AttributeScrubber::new(&ScrubConfig {
            sensitive_patterns: vec!["(unclosed".to_string(), ".*ssn.*".to_string()],
            ..enabled_config()
        });

        assert!(scrubber.is_sensitive("customer.ssn"));
        assert!(!scrubber.is_sensitive("(unclosed"));
    }

    #[test]
    fn test_truncate_at_char_boundary() {
        assert_eq!(truncate_at_char_boundary("abc", 10), "abc");
        assert_eq!(truncate_at_char_boundary("abcdef", 3), "abc");
        assert_eq!(truncate_at_char_boundary("日本語", 4), "日");
        assert_eq!(truncate_at_char_boundary("日本語", 0), "");
    }

    #[tokio::test]
    async fn test_scrubbing_exporter_redacts_before_export() {
        let mock = MockExporter::default();
        let exported = mock.spans.clone();
        let scrubber = Arc::new(AttributeScrubber::new(&enabled_config()));
        let exporter = ScrubbingSpanExporter::new(mock, scrubber);

        let span = create_test_span(vec![
            KeyValue::new("email", "jane@example.com"),
            KeyValue::new("http.route", "/login"),
        ]);
        exporter.export(vec![span]).await.unwrap();

        let exported = exported.lock().unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(value_of(&exported[0].attributes, "email"), "[REDACTED]");
        assert_eq!(value_of(&exported[0].attributes, "http.route"), "/login");
        assert_eq!(
            value_of(&exported[0].events.events[0].attributes, "auth.token"),
            "[REDACTED]"
        );
    }

    #[tokio::test]
    async fn test_scrubbing_exporter_passthrough_when_disabled() {
        let mock = MockExporter::default();
        let exported = mock.spans.clone();
        let scrubber = Arc::new(AttributeScrubber::new(&ScrubConfig::default()));
        let exporter = ScrubbingSpanExporter::new(mock, scrubber);

        exporter
            .export(vec![create_test_span(vec![KeyValue::new("password", "pw")])])
            .await
            .unwrap();

        let exported = exported.lock().unwrap();
        assert_eq!(value_of(&exported[0].attributes, "password"), "pw");
    }
}

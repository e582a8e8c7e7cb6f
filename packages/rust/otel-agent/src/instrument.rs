//! Span helpers for application code.
//!
//! [`trace_fn`] wraps an async operation in a span: the callback runs with the span
//! as its current context, `duration_ms` is recorded when it finishes, and an `Err`
//! marks the span as failed with the error message. [`trace_and_measure`] adds a
//! duration histogram and operation counters on top.
//!
//! The context helpers ([`add_event`], [`set_attributes`], [`record_error`]) act on
//! the span in a [`Context`] and do nothing when no valid span is present.
//!
//! ```no_run
//! use otel_agent::{trace_fn, AgentConfig, Agent, SpanOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let agent = Agent::new(AgentConfig::builder().service_name("orders").build());
//! agent.init().await?;
//!
//! let _total = trace_fn(&agent, "compute_total", &SpanOptions::component("billing"), |_cx| async {
//!     Ok::<_, std::io::Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::constants::{attributes, defaults};
use crate::global::TelemetryProvider;
use crate::metrics::{increment_counter, record_duration, MetricOptions};

use opentelemetry::{
    trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer},
    Context, KeyValue,
};
use std::{error::Error as StdError, future::Future, time::Instant};

/// Options for spans started by the helpers.
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    /// Tracer name and `component` attribute. Defaults to `"default"`.
    pub component: Option<String>,
    /// Optional `operation` attribute.
    pub operation: Option<String>,
    pub attributes: Vec<KeyValue>,
    pub kind: Option<SpanKind>,
}

impl SpanOptions {
    pub fn component(component: impl Into<String>) -> Self {
        Self {
            component: Some(component.into()),
            ..Self::default()
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    fn component_name(&self) -> &str {
        self.component
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(defaults::COMPONENT)
    }
}

/// Starts a span named `name` under `parent` and returns the context holding it.
///
/// A disabled provider returns `parent` unchanged.
pub fn start_span(
    provider: &dyn TelemetryProvider,
    parent: &Context,
    name: &str,
    options: &SpanOptions,
) -> Context {
    if !provider.is_enabled() {
        return parent.clone();
    }

    let component = options.component_name();
    let tracer = provider.tracer(component);

    let mut builder = tracer.span_builder(name.to_string());
    if let Some(kind) = &options.kind {
        builder = builder.with_kind(kind.clone());
    }

    let mut attrs = options.attributes.clone();
    attrs.push(KeyValue::new(attributes::COMPONENT, component.to_string()));
    if let Some(operation) = options.operation.as_deref().filter(|op| !op.is_empty()) {
        attrs.push(KeyValue::new(attributes::OPERATION, operation.to_string()));
    }
    builder = builder.with_attributes(attrs);

    let span = tracer.build_with_context(builder, parent);
    parent.with_span(span)
}

/// Runs `f` inside a new span and records its outcome.
///
/// `f` receives the span's context, which is also current while its future is
/// polled. The span ends when the future completes.
pub async fn trace_fn<T, E, F, Fut>(
    provider: &dyn TelemetryProvider,
    name: &str,
    options: &SpanOptions,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError,
{
    if !provider.is_enabled() {
        return f(Context::current()).await;
    }
    let cx = start_span(provider, &Context::current(), name, options);

    let start = Instant::now();
    let result = f(cx.clone()).with_context(cx.clone()).await;
    let elapsed = start.elapsed();

    let span = cx.span();
    span.set_attribute(KeyValue::new(
        attributes::DURATION_MS,
        i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
    ));
    match &result {
        Ok(_) => span.set_status(Status::Ok),
        Err(err) => {
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
        }
    }
    span.end();

    result
}

/// [`trace_fn`] plus metrics.
///
/// Records the histogram `{name}_duration_seconds` with a `success` attribute,
/// increments `{component}_operations_total` with `operation` and `success`, and
/// on failure increments `errors_total` with `operation` and `error_type`. The error
/// message is kept out of metric attributes to bound cardinality.
pub async fn trace_and_measure<T, E, F, Fut>(
    provider: &dyn TelemetryProvider,
    name: &str,
    options: &SpanOptions,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError,
{
    let start = Instant::now();
    let result = trace_fn(provider, name, options, f).await;
    let elapsed = start.elapsed();

    let component = options.component_name();
    let success = result.is_ok();

    record_duration(
        provider,
        &format!("{name}_duration_seconds"),
        elapsed,
        &MetricOptions::component(component).with_attribute(KeyValue::new("success", success)),
    );
    increment_counter(
        provider,
        &format!("{component}_operations_total"),
        1,
        &MetricOptions::component(component)
            .with_attribute(KeyValue::new(attributes::OPERATION, name.to_string()))
            .with_attribute(KeyValue::new("success", success)),
    );
    if !success {
        increment_counter(
            provider,
            "errors_total",
            1,
            &MetricOptions::component(component)
                .with_attribute(KeyValue::new(attributes::OPERATION, name.to_string()))
                .with_attribute(KeyValue::new("error_type", std::any::type_name::<E>())),
        );
    }

    result
}

/// Hex trace id of the span in `cx`, if it is valid.
pub fn trace_id(cx: &Context) -> Option<String> {
    let span = cx.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}

/// Hex span id of the span in `cx`, if it is valid.
pub fn span_id(cx: &Context) -> Option<String> {
    let span = cx.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.span_id().to_string())
}

pub fn is_tracing(cx: &Context) -> bool {
    cx.span().span_context().is_valid()
}

pub fn add_event(cx: &Context, name: &str, attributes: Vec<KeyValue>) {
    let span = cx.span();
    if span.span_context().is_valid() {
        span.add_event(name.to_string(), attributes);
    }
}

pub fn set_attributes(cx: &Context, attributes: Vec<KeyValue>) {
    let span = cx.span();
    if span.span_context().is_valid() {
        span.set_attributes(attributes);
    }
}

/// Records `err` as an exception event and sets an error status.
pub fn record_error(cx: &Context, err: &dyn StdError, attributes: Vec<KeyValue>) {
    let span = cx.span();
    if !span.span_context().is_valid() {
        return;
    }

    let mut event_attributes = vec![KeyValue::new("exception.message", err.to_string())];
    event_attributes.extend(attributes);
    span.add_event("exception", event_attributes);
    span.set_status(Status::error(err.to_string()));
}

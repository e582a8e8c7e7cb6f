//! Context propagation over plain string maps.
//!
//! Message headers, job payloads and similar carriers are modelled as
//! `HashMap<String, String>`. [`Agent::init`](crate::Agent::init) installs the
//! composite propagator built by [`composite_propagator`] (W3C trace context plus
//! baggage), and the functions here go through whatever propagator is installed
//! globally.

use opentelemetry::{
    baggage::BaggageExt,
    global,
    propagation::{TextMapCompositePropagator, TextMapPropagator},
    Context, KeyValue,
};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use std::collections::HashMap;

/// W3C `traceparent`/`tracestate` followed by W3C `baggage`.
pub fn composite_propagator() -> TextMapCompositePropagator {
    let propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>> = vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ];
    TextMapCompositePropagator::new(propagators)
}

/// Writes `cx` into `carrier` using the global propagator.
pub fn inject_context(cx: &Context, carrier: &mut HashMap<String, String>) {
    global::get_text_map_propagator(|propagator| propagator.inject_context(cx, carrier));
}

/// Reads a context from `carrier` using the global propagator.
///
/// Missing or malformed headers yield a context without a remote span.
pub fn extract_context(carrier: &HashMap<String, String>) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(carrier))
}

/// Returns `cx` with `key` set to `value` in its baggage, keeping other entries.
pub fn set_baggage(cx: &Context, key: impl Into<String>, value: impl Into<String>) -> Context {
    cx.with_baggage([KeyValue::new(key.into(), value.into())])
}

pub fn get_baggage(cx: &Context, key: &str) -> Option<String> {
    cx.baggage().get(key).map(|value| value.to_string())
}

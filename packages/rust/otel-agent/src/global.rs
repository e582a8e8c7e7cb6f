//! Process-wide telemetry provider used by the convenience functions.
//!
//! [`Agent::init`](crate::Agent::init) publishes the agent here and
//! [`Agent::shutdown`](crate::Agent::shutdown) withdraws it, so library code can
//! call [`trace`], [`measure`] and [`count`] without threading an agent through
//! every call site. With no provider installed the functions do nothing.

use crate::cache::InstrumentCache;
use crate::instrument::{start_span, SpanOptions};
use crate::metrics::{increment_counter, record_duration, MetricOptions};

use opentelemetry::{global::BoxedTracer, metrics::Meter, Context};
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

/// Source of tracers, meters and cached instruments.
///
/// Implemented by [`Agent`](crate::Agent). Handles returned by an implementation
/// must always be usable, falling back to no-op handles when telemetry is off.
pub trait TelemetryProvider: Send + Sync {
    fn tracer(&self, name: &str) -> Arc<BoxedTracer>;
    fn meter(&self, name: &str) -> Arc<Meter>;
    fn is_enabled(&self) -> bool;
    fn instruments(&self) -> &InstrumentCache;
}

static GLOBAL_PROVIDER: RwLock<Option<Arc<dyn TelemetryProvider>>> = RwLock::new(None);

/// Installs `provider`, replacing any previous one.
pub fn set_global_provider(provider: Arc<dyn TelemetryProvider>) {
    let mut slot = GLOBAL_PROVIDER
        .write()
        .unwrap_or_else(|poison| poison.into_inner());
    *slot = Some(provider);
}

pub fn global_provider() -> Option<Arc<dyn TelemetryProvider>> {
    GLOBAL_PROVIDER
        .read()
        .unwrap_or_else(|poison| poison.into_inner())
        .clone()
}

pub fn clear_global_provider() {
    let mut slot = GLOBAL_PROVIDER
        .write()
        .unwrap_or_else(|poison| poison.into_inner());
    *slot = None;
}

/// Clears the slot only if it still holds `provider`.
pub(crate) fn release_global_provider(provider: &Arc<dyn TelemetryProvider>) {
    let mut slot = GLOBAL_PROVIDER
        .write()
        .unwrap_or_else(|poison| poison.into_inner());
    if slot.as_ref().is_some_and(|current| same_provider(current, provider)) {
        *slot = None;
    }
}

/// Returns the process to its pristine state: no provider in the slot and no-op
/// OpenTelemetry tracer and meter providers. Meant for tests.
#[doc(hidden)]
pub fn reset_global_provider() {
    clear_global_provider();
    opentelemetry::global::set_tracer_provider(
        opentelemetry::trace::noop::NoopTracerProvider::new(),
    );
    opentelemetry::global::set_meter_provider(crate::noop::noop_meter_provider());
}

fn same_provider(a: &Arc<dyn TelemetryProvider>, b: &Arc<dyn TelemetryProvider>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Starts a span through the global provider as a child of the current context.
///
/// The returned context carries the new span; end it with
/// `cx.span().end()`. Without a provider the current context is returned as is.
pub fn trace(name: &str, options: &SpanOptions) -> Context {
    let parent = Context::current();
    match global_provider() {
        Some(provider) => start_span(provider.as_ref(), &parent, name, options),
        None => parent,
    }
}

/// Records a duration through the global provider.
pub fn measure(name: &str, duration: Duration, options: &MetricOptions) {
    if let Some(provider) = global_provider() {
        record_duration(provider.as_ref(), name, duration, options);
    }
}

/// Increments a counter through the global provider.
pub fn count(name: &str, value: u64, options: &MetricOptions) {
    if let Some(provider) = global_provider() {
        increment_counter(provider.as_ref(), name, value, options);
    }
}

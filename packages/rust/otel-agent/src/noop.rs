//! Always-usable stand-ins for tracers and meters.
//!
//! Handed out by the agent whenever the real provider is unavailable, so callers
//! never need to check for a missing handle.

use opentelemetry::{
    global::BoxedTracer,
    metrics::{Meter, MeterProvider as _},
    trace::noop::NoopTracer,
    InstrumentationScope,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::sync::{Arc, OnceLock};

// A meter provider without readers drops every measurement.
static NOOP_METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// A tracer whose spans are never recorded.
pub fn noop_tracer() -> Arc<BoxedTracer> {
    Arc::new(BoxedTracer::new(Box::new(NoopTracer::new())))
}

/// A meter whose instruments accept and discard measurements.
pub fn noop_meter(name: &str) -> Arc<Meter> {
    let provider = noop_meter_provider();
    Arc::new(provider.meter_with_scope(InstrumentationScope::builder(name.to_string()).build()))
}

/// Installed as the global meter provider when the agent releases its own.
pub(crate) fn noop_meter_provider() -> SdkMeterProvider {
    NOOP_METER_PROVIDER
        .get_or_init(|| SdkMeterProvider::builder().build())
        .clone()
}

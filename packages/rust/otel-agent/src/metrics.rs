//! Cached metric helpers.
//!
//! Each helper looks up (or creates once) an instrument in the provider's
//! [`InstrumentCache`](crate::InstrumentCache) under the key `component:name`, then
//! records with a `component` attribute followed by the caller's attributes. The
//! meter is named after the component.
//!
//! Recording never fails from the caller's point of view. A disabled provider is a
//! no-op, and an instrument that cannot be created (for example because the same
//! key is already used by another instrument kind) is logged at debug level and the
//! measurement is dropped.

use crate::constants::{attributes, defaults};
use crate::error::AgentError;
use crate::global::TelemetryProvider;

use opentelemetry::{metrics::Meter, KeyValue};
use std::time::Duration;

/// Component and extra attributes for a measurement.
#[derive(Debug, Clone, Default)]
pub struct MetricOptions {
    pub component: Option<String>,
    pub attributes: Vec<KeyValue>,
}

impl MetricOptions {
    pub fn component(component: impl Into<String>) -> Self {
        Self {
            component: Some(component.into()),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub(crate) fn component_name(&self) -> &str {
        self.component
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(defaults::COMPONENT)
    }

    fn measurement_attributes(&self) -> Vec<KeyValue> {
        let mut attrs = Vec::with_capacity(self.attributes.len() + 1);
        attrs.push(KeyValue::new(
            attributes::COMPONENT,
            self.component_name().to_string(),
        ));
        attrs.extend(self.attributes.iter().cloned());
        attrs
    }
}

/// Records `duration` in seconds on the histogram `name`.
pub fn record_duration(
    provider: &dyn TelemetryProvider,
    name: &str,
    duration: Duration,
    options: &MetricOptions,
) {
    if !provider.is_enabled() {
        return;
    }

    let component = options.component_name();
    let histogram = instrument(provider, component, name, |meter| {
        meter
            .f64_histogram(name.to_string())
            .with_description(format!("Duration of {name} operations"))
            .with_unit("s")
            .build()
    });

    if let Some(histogram) = histogram {
        histogram.record(duration.as_secs_f64(), &options.measurement_attributes());
    }
}

/// Adds `value` to the counter `name`.
pub fn increment_counter(
    provider: &dyn TelemetryProvider,
    name: &str,
    value: u64,
    options: &MetricOptions,
) {
    if !provider.is_enabled() {
        return;
    }

    let component = options.component_name();
    let counter = instrument(provider, component, name, |meter| {
        meter
            .u64_counter(name.to_string())
            .with_description(format!("Counter for {name} events"))
            .build()
    });

    if let Some(counter) = counter {
        counter.add(value, &options.measurement_attributes());
    }
}

/// Records `value` on the gauge `name`.
pub fn set_gauge(provider: &dyn TelemetryProvider, name: &str, value: i64, options: &MetricOptions) {
    if !provider.is_enabled() {
        return;
    }

    let component = options.component_name();
    let gauge = instrument(provider, component, name, |meter| {
        meter
            .i64_gauge(name.to_string())
            .with_description(format!("Gauge for {name} values"))
            .build()
    });

    if let Some(gauge) = gauge {
        gauge.record(value, &options.measurement_attributes());
    }
}

fn instrument<T, F>(
    provider: &dyn TelemetryProvider,
    component: &str,
    name: &str,
    build: F,
) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(&Meter) -> T,
{
    let key = format!("{component}:{name}");
    let result = provider.instruments().get_or_create(&key, || {
        let meter = provider.meter(component);
        Ok::<_, AgentError>(build(&meter))
    });

    match result {
        Ok(instrument) => Some(instrument),
        Err(err) => {
            tracing::debug!(target: "otel_agent", key = %key, error = %err, "Dropping measurement");
            None
        }
    }
}

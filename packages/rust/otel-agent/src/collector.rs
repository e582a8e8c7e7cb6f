//! Background metric collectors.
//!
//! Collectors are tokio tasks sampling on a fixed interval. They share one
//! [`CancellationToken`] and are stopped by [`CollectorSet::stop`] before the
//! providers are shut down, so no sample races a closed exporter.

use crate::config::MetricsConfig;
use crate::constants::defaults;

use opentelemetry::metrics::{Gauge, Meter};
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Running collector tasks.
#[derive(Debug)]
pub(crate) struct CollectorSet {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl CollectorSet {
    /// Spawns the collectors enabled in `config` on the current runtime.
    ///
    /// Returns an empty set when called outside a tokio runtime.
    pub(crate) fn start(meter: &Meter, config: &MetricsConfig) -> Self {
        let token = CancellationToken::new();
        let mut handles = Vec::new();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(target: "otel_agent", "No tokio runtime, metric collectors not started");
            return Self { token, handles };
        };

        if config.runtime {
            let collector = RuntimeCollector::new(meter);
            let interval = non_zero(config.runtime_interval);
            handles.push(runtime.spawn(collector.run(interval, token.clone())));
        }

        let uptime = UptimeCollector::new(meter);
        let interval = non_zero(config.export_interval);
        handles.push(runtime.spawn(uptime.run(interval, token.clone())));

        tracing::debug!(target: "otel_agent", collectors = handles.len(), "Metric collectors started");
        Self { token, handles }
    }

    pub(crate) fn empty() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Signals every collector and waits for them until `deadline`.
    ///
    /// Tasks still running at the deadline are aborted. Returns `false` if that
    /// happened.
    pub(crate) async fn stop(self, deadline: Instant) -> bool {
        self.token.cancel();

        let mut clean = true;
        for handle in self.handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                abort.abort();
                clean = false;
            }
        }
        clean
    }
}

fn non_zero(interval: Duration) -> Duration {
    if interval.is_zero() {
        defaults::RUNTIME_METRIC_INTERVAL
    } else {
        interval
    }
}

async fn tick_until_cancelled<F>(interval: Duration, token: CancellationToken, mut sample: F)
where
    F: FnMut(),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => sample(),
        }
    }
}

/// Samples the tokio runtime the agent was initialized on.
struct RuntimeCollector {
    workers: Gauge<u64>,
    alive_tasks: Gauge<u64>,
}

impl RuntimeCollector {
    fn new(meter: &Meter) -> Self {
        Self {
            workers: meter
                .u64_gauge("tokio_runtime_workers")
                .with_description("Number of worker threads used by the runtime")
                .build(),
            alive_tasks: meter
                .u64_gauge("tokio_runtime_alive_tasks")
                .with_description("Current number of alive tasks in the runtime")
                .build(),
        }
    }

    async fn run(self, interval: Duration, token: CancellationToken) {
        tick_until_cancelled(interval, token, || {
            let metrics = tokio::runtime::Handle::current().metrics();
            self.workers.record(metrics.num_workers() as u64, &[]);
            self.alive_tasks.record(metrics.num_alive_tasks() as u64, &[]);
        })
        .await;
    }
}

struct UptimeCollector {
    uptime: Gauge<u64>,
    started: Instant,
}

impl UptimeCollector {
    fn new(meter: &Meter) -> Self {
        Self {
            uptime: meter
                .u64_gauge("uptime_seconds")
                .with_description("Time since the agent started")
                .with_unit("s")
                .build(),
            started: Instant::now(),
        }
    }

    async fn run(self, interval: Duration, token: CancellationToken) {
        tick_until_cancelled(interval, token, || {
            self.uptime.record(self.started.elapsed().as_secs(), &[]);
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{metrics::MeterProvider as _, InstrumentationScope};
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};

    fn meter_provider() -> (SdkMeterProvider, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone()).build();
        (
            SdkMeterProvider::builder().with_reader(reader).build(),
            exporter,
        )
    }

    fn config(runtime: bool) -> MetricsConfig {
        MetricsConfig {
            runtime,
            runtime_interval: Duration::from_millis(10),
            export_interval: Duration::from_millis(10),
            ..MetricsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_collectors_record_and_stop() {
        let (provider, exporter) = meter_provider();
        let meter = provider.meter_with_scope(InstrumentationScope::builder("test").build());

        let set = CollectorSet::start(&meter, &config(true));
        assert_eq!(set.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let clean = set.stop(Instant::now() + Duration::from_secs(1)).await;
        assert!(clean);

        provider.force_flush().unwrap();
        let names: Vec<String> = exporter
            .get_finished_metrics()
            .unwrap()
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
            .map(|m| m.name.to_string())
            .collect();
        assert!(names.contains(&"tokio_runtime_workers".to_string()));
        assert!(names.contains(&"tokio_runtime_alive_tasks".to_string()));
        assert!(names.contains(&"uptime_seconds".to_string()));
    }

    #[tokio::test]
    async fn test_runtime_collector_can_be_disabled() {
        let (provider, _exporter) = meter_provider();
        let meter = provider.meter_with_scope(InstrumentationScope::builder("test").build());

        let set = CollectorSet::start(&meter, &config(false));
        assert_eq!(set.len(), 1);
        assert!(set.stop(Instant::now() + Duration::from_secs(1)).await);
    }

    #[test]
    fn test_start_outside_runtime_is_empty() {
        let (provider, _exporter) = meter_provider();
        let meter = provider.meter_with_scope(InstrumentationScope::builder("test").build());

        let set = CollectorSet::start(&meter, &config(true));
        assert_eq!(set.len(), 0);
    }

    #[tokio::test]
    async fn test_stop_empty_set() {
        assert!(CollectorSet::empty().stop(Instant::now()).await);
    }

    #[test]
    fn test_zero_interval_uses_default() {
        assert_eq!(non_zero(Duration::ZERO), defaults::RUNTIME_METRIC_INTERVAL);
        assert_eq!(non_zero(Duration::from_secs(3)), Duration::from_secs(3));
    }
}

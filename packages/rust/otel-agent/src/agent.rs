//! The telemetry agent and its lifecycle.
//!
//! An [`Agent`] moves through these states:
//!
//! ```text
//! Uninitialized --init--> Running --shutdown--> ShuttingDown --> Shutdown
//!       |
//!       +--init (telemetry disabled)--> Disabled
//! ```
//!
//! Construction performs no I/O. [`Agent::init`] builds the providers for every
//! enabled signal, installs them as the OpenTelemetry globals, starts the background
//! collectors and publishes the agent as the process-wide
//! [`TelemetryProvider`](crate::TelemetryProvider). [`Agent::shutdown`] undoes all of
//! that within `shutdown_timeout`.
//!
//! Accessors never hand out unusable handles. Before `init`, after `shutdown`, when
//! telemetry is disabled or when a signal is turned off, [`Agent::tracer`] and
//! [`Agent::meter`] return no-op handles.
//!
//! # Partial initialization
//!
//! If building a provider fails, `init` returns the error and the agent stays
//! `Uninitialized`. Providers built before the failure stay installed and are kept by
//! the agent: a later `init` only builds the missing ones, and `shutdown` releases
//! them.
//!
//! ```no_run
//! use otel_agent::{Agent, AgentConfig};
//!
//! # async fn example() -> Result<(), otel_agent::AgentError> {
//! let agent = Agent::new(AgentConfig::builder().service_name("orders").build());
//! agent.init().await?;
//!
//! let tracer = agent.tracer("orders.http");
//! // ...
//! agent.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::cache::InstrumentCache;
use crate::collector::CollectorSet;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::global::{release_global_provider, set_global_provider, TelemetryProvider};
use crate::health::{Diagnostics, ExporterHealth, HealthStatus};
use crate::http_scrubber::HttpScrubber;
use crate::logger::{log_error, Fields, Logger, TracingLogger};
use crate::noop::{noop_meter, noop_meter_provider, noop_tracer};
use crate::propagation::composite_propagator;
use crate::protocol::{ExportProtocol, Signal};
use crate::providers::{
    build_logger_provider, build_meter_provider, build_tracer_provider, install_subscriber,
};
use crate::resource::build_resource;
use crate::route_matcher::RouteMatcher;
use crate::scrub::AttributeScrubber;

use opentelemetry::{
    global::{self, BoxedTracer},
    metrics::{Meter, MeterProvider as _},
    trace::{noop::NoopTracerProvider, TracerProvider as _},
    InstrumentationScope,
};
use opentelemetry_sdk::{
    error::OTelSdkError, logs::SdkLoggerProvider, metrics::SdkMeterProvider,
    trace::SdkTracerProvider,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{Arc, RwLock},
};
use tokio::time::Instant;

/// Lifecycle state of an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Uninitialized,
    Running,
    ShuttingDown,
    Shutdown,
    /// Telemetry is disabled by configuration. Terminal.
    Disabled,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Uninitialized => "uninitialized",
            AgentState::Running => "running",
            AgentState::ShuttingDown => "shutting_down",
            AgentState::Shutdown => "shutdown",
            AgentState::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

#[derive(Default, Clone)]
struct Providers {
    tracer: Option<SdkTracerProvider>,
    meter: Option<SdkMeterProvider>,
    logger: Option<SdkLoggerProvider>,
}

impl Providers {
    fn is_empty(&self) -> bool {
        self.tracer.is_none() && self.meter.is_none() && self.logger.is_none()
    }
}

struct Lifecycle {
    state: AgentState,
    providers: Providers,
    collectors: Option<CollectorSet>,
}

struct AgentInner {
    config: AgentConfig,
    route_matcher: Arc<RouteMatcher>,
    scrubber: Arc<AttributeScrubber>,
    http_scrubber: Arc<HttpScrubber>,
    health: Arc<ExporterHealth>,
    logger: Arc<dyn Logger>,
    lifecycle: RwLock<Lifecycle>,
    // Serializes init and shutdown. Accessors never take it.
    transition: tokio::sync::Mutex<()>,
    tracers: InstrumentCache,
    meters: InstrumentCache,
    instruments: InstrumentCache,
}

/// Owns the telemetry providers for one service.
///
/// Cloning is cheap and every clone refers to the same agent.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("service_name", &self.inner.config.service_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Creates an agent logging through [`TracingLogger`].
    pub fn new(config: AgentConfig) -> Self {
        Self::with_logger(config, Arc::new(TracingLogger::new()))
    }

    /// Creates an agent with a custom diagnostics logger.
    pub fn with_logger(config: AgentConfig, logger: Arc<dyn Logger>) -> Self {
        let inner = AgentInner {
            route_matcher: Arc::new(RouteMatcher::new(&config.route_exclusion)),
            scrubber: Arc::new(AttributeScrubber::new(&config.scrub)),
            http_scrubber: Arc::new(HttpScrubber::new(&config.http, &config.scrub)),
            health: Arc::new(ExporterHealth::new()),
            logger,
            lifecycle: RwLock::new(Lifecycle {
                state: AgentState::Uninitialized,
                providers: Providers::default(),
                collectors: None,
            }),
            transition: tokio::sync::Mutex::new(()),
            tracers: InstrumentCache::new(),
            meters: InstrumentCache::new(),
            instruments: InstrumentCache::new(),
            config,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Builds and installs the providers for every enabled signal.
    ///
    /// # Errors
    ///
    /// - [`AgentError::AlreadyInitialized`] unless the agent is uninitialized
    /// - [`AgentError::MissingServiceName`] when telemetry is enabled without a name
    /// - [`AgentError::UnsupportedProtocol`] for an unknown exporter protocol
    /// - [`AgentError::Provider`] naming the signal whose provider failed
    pub async fn init(&self) -> Result<(), AgentError> {
        let _transition = self.inner.transition.lock().await;
        let config = &self.inner.config;

        if self.state() != AgentState::Uninitialized {
            return Err(AgentError::AlreadyInitialized);
        }

        if !config.enabled {
            self.inner.write_lifecycle().state = AgentState::Disabled;
            self.inner.logger.info("Telemetry disabled", &Fields::new());
            return Ok(());
        }

        if config.service_name.trim().is_empty() {
            return Err(AgentError::MissingServiceName);
        }

        let protocol: ExportProtocol = config.exporter_protocol.parse()?;
        let resource = build_resource(config);

        if config.traces.enabled && self.inner.read_lifecycle().providers.tracer.is_none() {
            let provider = build_tracer_provider(
                config,
                protocol,
                resource.clone(),
                self.inner.scrubber.clone(),
                self.inner.health.clone(),
            )?;
            global::set_tracer_provider(provider.clone());
            global::set_text_map_propagator(composite_propagator());
            self.inner.write_lifecycle().providers.tracer = Some(provider);
        }

        if config.metrics.enabled && self.inner.read_lifecycle().providers.meter.is_none() {
            let provider = build_meter_provider(config, protocol, resource.clone())?;
            global::set_meter_provider(provider.clone());
            self.inner.write_lifecycle().providers.meter = Some(provider);
        }

        if config.logs.enabled && self.inner.read_lifecycle().providers.logger.is_none() {
            let provider = build_logger_provider(config, protocol, resource)?;
            self.inner.write_lifecycle().providers.logger = Some(provider);
        }

        let providers = self.inner.read_lifecycle().providers.clone();

        if config.logs.install_subscriber {
            if let Err(err) =
                install_subscriber(providers.tracer.as_ref(), providers.logger.as_ref())
            {
                self.inner.logger.debug(
                    "Tracing subscriber already installed",
                    &Fields::from([("error".to_string(), err.to_string())]),
                );
            }
        }

        let collectors = match &providers.meter {
            Some(provider) => {
                let meter = provider.meter_with_scope(
                    InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
                        .with_version(env!("CARGO_PKG_VERSION"))
                        .build(),
                );
                CollectorSet::start(&meter, &config.metrics)
            }
            None => CollectorSet::empty(),
        };

        {
            let mut lifecycle = self.inner.write_lifecycle();
            // Handles requested before init are no-ops; drop them so the next lookup
            // binds to the real providers.
            self.inner.tracers.clear();
            self.inner.meters.clear();
            self.inner.instruments.clear();
            lifecycle.collectors = Some(collectors);
            lifecycle.state = AgentState::Running;
        }
        set_global_provider(self.inner.clone());

        self.inner.logger.info(
            "Telemetry agent initialized",
            &Fields::from([
                ("service".to_string(), config.service_name.clone()),
                ("version".to_string(), config.service_version.clone()),
                ("endpoint".to_string(), config.endpoint.clone()),
                ("protocol".to_string(), protocol.to_string()),
                ("traces".to_string(), config.traces.enabled.to_string()),
                ("metrics".to_string(), config.metrics.enabled.to_string()),
                ("logs".to_string(), config.logs.enabled.to_string()),
            ]),
        );
        Ok(())
    }

    /// Stops the collectors and shuts every provider down within `shutdown_timeout`.
    ///
    /// Individual provider failures are logged and do not stop the remaining
    /// providers from being released. The agent always ends up `Shutdown`.
    ///
    /// # Errors
    ///
    /// [`AgentError::ShutdownTimeout`] if the deadline elapsed before every step
    /// finished.
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        let _transition = self.inner.transition.lock().await;

        let (providers, collectors) = {
            let mut lifecycle = self.inner.write_lifecycle();
            match lifecycle.state {
                AgentState::Running => {}
                AgentState::Uninitialized if !lifecycle.providers.is_empty() => {}
                _ => return Ok(()),
            }
            lifecycle.state = AgentState::ShuttingDown;
            (
                std::mem::take(&mut lifecycle.providers),
                lifecycle.collectors.take(),
            )
        };

        let provider: Arc<dyn TelemetryProvider> = self.inner.clone();
        release_global_provider(&provider);
        self.inner.tracers.clear();
        self.inner.meters.clear();
        self.inner.instruments.clear();
        if providers.tracer.is_some() {
            global::set_tracer_provider(NoopTracerProvider::new());
        }
        if providers.meter.is_some() {
            global::set_meter_provider(noop_meter_provider());
        }

        let deadline = Instant::now() + self.inner.config.shutdown_timeout;
        let mut timed_out = false;

        if let Some(collectors) = collectors {
            if !collectors.stop(deadline).await {
                timed_out = true;
                self.inner
                    .logger
                    .warn("Metric collectors did not stop in time", &Fields::new());
            }
        }

        if let Some(provider) = providers.tracer {
            timed_out |= !self
                .shutdown_provider(Signal::Traces, deadline, move || provider.shutdown())
                .await;
        }
        if let Some(provider) = providers.meter {
            timed_out |= !self
                .shutdown_provider(Signal::Metrics, deadline, move || provider.shutdown())
                .await;
        }
        if let Some(provider) = providers.logger {
            timed_out |= !self
                .shutdown_provider(Signal::Logs, deadline, move || provider.shutdown())
                .await;
        }

        self.inner.write_lifecycle().state = AgentState::Shutdown;
        self.inner
            .logger
            .info("Telemetry agent shut down", &Fields::new());

        if timed_out {
            Err(AgentError::ShutdownTimeout)
        } else {
            Ok(())
        }
    }

    /// Exports everything buffered by the active providers.
    ///
    /// Every provider is flushed even if an earlier one fails; the first failure is
    /// returned. Does nothing unless the agent is running.
    pub async fn force_flush(&self) -> Result<(), AgentError> {
        let providers = {
            let lifecycle = self.inner.read_lifecycle();
            if lifecycle.state != AgentState::Running {
                return Ok(());
            }
            lifecycle.providers.clone()
        };

        let mut first_error = None;

        if let Some(provider) = providers.tracer {
            self.flush_provider(Signal::Traces, &mut first_error, move || {
                provider.force_flush()
            })
            .await;
        }
        if let Some(provider) = providers.meter {
            self.flush_provider(Signal::Metrics, &mut first_error, move || {
                provider.force_flush()
            })
            .await;
        }
        if let Some(provider) = providers.logger {
            self.flush_provider(Signal::Logs, &mut first_error, move || {
                provider.force_flush()
            })
            .await;
        }

        first_error.map_or(Ok(()), Err)
    }

    /// A tracer named `name`, cached per name while the agent runs.
    pub fn tracer(&self, name: &str) -> Arc<BoxedTracer> {
        self.inner.tracer(name)
    }

    /// A meter named `name`, cached per name while the agent runs.
    pub fn meter(&self, name: &str) -> Arc<Meter> {
        self.inner.meter(name)
    }

    pub fn state(&self) -> AgentState {
        self.inner.read_lifecycle().state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    /// Whether telemetry is enabled by configuration.
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    pub fn is_running(&self) -> bool {
        self.state() == AgentState::Running
    }

    pub fn route_matcher(&self) -> Arc<RouteMatcher> {
        self.inner.route_matcher.clone()
    }

    pub fn scrubber(&self) -> Arc<AttributeScrubber> {
        self.inner.scrubber.clone()
    }

    pub fn http_scrubber(&self) -> Arc<HttpScrubber> {
        self.inner.http_scrubber.clone()
    }

    pub fn exporter_health(&self) -> Arc<ExporterHealth> {
        self.inner.health.clone()
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.inner.logger.clone()
    }

    /// The live SDK tracer provider, if traces are running.
    pub fn tracer_provider(&self) -> Option<SdkTracerProvider> {
        self.inner.read_lifecycle().providers.tracer.clone()
    }

    /// The live SDK logger provider, if logs are running.
    pub fn logger_provider(&self) -> Option<SdkLoggerProvider> {
        self.inner.read_lifecycle().providers.logger.clone()
    }

    /// Liveness summary built from the exporter health tracker.
    pub fn health_check(&self) -> HealthStatus {
        if !self.is_enabled() {
            return HealthStatus {
                status: AgentState::Disabled.to_string(),
                signals: Default::default(),
                running: false,
                enabled: false,
            };
        }

        HealthStatus {
            status: self.inner.health.overall_status().to_string(),
            signals: self.inner.health.signal_statuses(),
            running: self.is_running(),
            enabled: true,
        }
    }

    /// Ready once `init` has completed, including when telemetry is disabled.
    pub fn readiness_check(&self) -> bool {
        matches!(self.state(), AgentState::Running | AgentState::Disabled)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let config = &self.inner.config;
        Diagnostics {
            enabled: config.enabled,
            running: self.is_running(),
            environment: config.environment.clone(),
            service_name: config.service_name.clone(),
            namespace: config.service_namespace.clone(),
            version: config.service_version.clone(),
            endpoint: config.endpoint.clone(),
            protocol: config.exporter_protocol.clone(),
            sampling_rate: config.traces.sampling.rate,
            traces_enabled: config.traces.enabled,
            metrics_enabled: config.metrics.enabled,
            logs_enabled: config.logs.enabled,
        }
    }

    // Returns false only when the deadline elapsed.
    async fn shutdown_provider<F>(&self, signal: Signal, deadline: Instant, shutdown: F) -> bool
    where
        F: FnOnce() -> Result<(), OTelSdkError> + Send + 'static,
    {
        let fields = |error: String| {
            Fields::from([
                ("signal".to_string(), signal.to_string()),
                ("error".to_string(), error),
            ])
        };

        match tokio::time::timeout_at(deadline, tokio::task::spawn_blocking(shutdown)).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(err))) => {
                self.inner
                    .logger
                    .error("Failed to shut down provider", &fields(err.to_string()));
                true
            }
            Ok(Err(join_err)) => {
                self.inner
                    .logger
                    .error("Provider shutdown panicked", &fields(join_err.to_string()));
                true
            }
            Err(_) => {
                self.inner.logger.error(
                    "Provider shutdown timed out",
                    &fields("deadline elapsed".to_string()),
                );
                false
            }
        }
    }

    async fn flush_provider<F>(
        &self,
        signal: Signal,
        first_error: &mut Option<AgentError>,
        flush: F,
    ) where
        F: FnOnce() -> Result<(), OTelSdkError> + Send + 'static,
    {
        let source = match tokio::task::spawn_blocking(flush).await {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(join_err) => OTelSdkError::InternalFailure(join_err.to_string()),
        };

        let err = AgentError::Flush { signal, source };
        log_error(self.inner.logger.as_ref(), "Failed to flush provider", &err);
        first_error.get_or_insert(err);
    }
}

impl AgentInner {
    fn read_lifecycle(&self) -> std::sync::RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn write_lifecycle(&self) -> std::sync::RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn tracer(&self, name: &str) -> Arc<BoxedTracer> {
        let lifecycle = self.read_lifecycle();
        let provider = match (&lifecycle.state, &lifecycle.providers.tracer) {
            (AgentState::Running, Some(provider)) => provider,
            _ => return noop_tracer(),
        };

        let tracer = self.tracers.get_or_create(name, || {
            let tracer = provider.tracer_with_scope(
                InstrumentationScope::builder(name.to_string()).build(),
            );
            Ok(Arc::new(BoxedTracer::new(Box::new(tracer))))
        });
        tracer.unwrap_or_else(|_| noop_tracer())
    }

    fn meter(&self, name: &str) -> Arc<Meter> {
        let lifecycle = self.read_lifecycle();
        let provider = match (&lifecycle.state, &lifecycle.providers.meter) {
            (AgentState::Running, Some(provider)) => provider,
            _ => return noop_meter(name),
        };

        let meter = self.meters.get_or_create(name, || {
            let meter = provider
                .meter_with_scope(InstrumentationScope::builder(name.to_string()).build());
            Ok(Arc::new(meter))
        });
        meter.unwrap_or_else(|_| noop_meter(name))
    }
}

impl TelemetryProvider for AgentInner {
    fn tracer(&self, name: &str) -> Arc<BoxedTracer> {
        AgentInner::tracer(self, name)
    }

    fn meter(&self, name: &str) -> Arc<Meter> {
        AgentInner::meter(self, name)
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn instruments(&self) -> &InstrumentCache {
        &self.instruments
    }
}

impl TelemetryProvider for Agent {
    fn tracer(&self, name: &str) -> Arc<BoxedTracer> {
        self.inner.tracer(name)
    }

    fn meter(&self, name: &str) -> Arc<Meter> {
        self.inner.meter(name)
    }

    fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    fn instruments(&self) -> &InstrumentCache {
        &self.inner.instruments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogsConfig, MetricsConfig, TracesConfig};
    use crate::global::{global_provider, reset_global_provider};
    use crate::health::ExporterStatus;
    use crate::instrument::SpanOptions;
    use crate::logger::NoopLogger;
    use crate::metrics::{increment_counter, MetricOptions};
    use mockall::mock;
    use opentelemetry::trace::{Span, TraceContextExt, Tracer};
    use sealed_test::prelude::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    mock! {
        pub Sink {}

        impl Logger for Sink {
            fn debug(&self, message: &str, fields: &Fields);
            fn info(&self, message: &str, fields: &Fields);
            fn warn(&self, message: &str, fields: &Fields);
            fn error(&self, message: &str, fields: &Fields);
        }
    }

    fn traces_only() -> AgentConfig {
        AgentConfig::builder()
            .service_name("orders")
            .endpoint("localhost:4318")
            .exporter_protocol("http/protobuf")
            .metrics(MetricsConfig {
                enabled: false,
                ..MetricsConfig::default()
            })
            .logs(LogsConfig {
                enabled: false,
                ..LogsConfig::default()
            })
            .build()
    }

    fn quiet(config: AgentConfig) -> Agent {
        Agent::with_logger(config, Arc::new(NoopLogger))
    }

    #[test]
    fn test_new_agent_is_uninitialized_and_hands_out_noops() {
        let agent = quiet(traces_only());

        assert_eq!(agent.state(), AgentState::Uninitialized);
        assert!(!agent.is_running());
        assert!(!agent.readiness_check());

        let mut span = agent.tracer("orders").start("noop");
        assert!(!span.span_context().is_valid());
        span.end();
        agent.meter("orders").u64_counter("requests").build().add(1, &[]);
        assert!(agent.route_matcher().should_exclude("/health"));
    }

    #[tokio::test]
    #[serial]
    async fn test_init_and_shutdown() {
        reset_global_provider();
        let agent = quiet(traces_only());

        agent.init().await.unwrap();
        assert!(agent.is_running());
        assert!(agent.readiness_check());
        assert!(agent.tracer_provider().is_some());
        assert!(global_provider().is_some());

        let mut span = agent.tracer("orders").start("work");
        assert!(span.span_context().is_valid());
        span.end();

        agent.shutdown().await.unwrap();
        assert_eq!(agent.state(), AgentState::Shutdown);
        assert!(agent.tracer_provider().is_none());
        assert!(global_provider().is_none());
        assert!(!agent.tracer("orders").start("after").span_context().is_valid());
    }

    #[tokio::test]
    #[serial]
    async fn test_second_init_fails() {
        reset_global_provider();
        let agent = quiet(traces_only());

        agent.init().await.unwrap();
        let err = agent.init().await.unwrap_err();
        assert!(matches!(err, AgentError::AlreadyInitialized));
        assert!(agent.is_running());

        agent.shutdown().await.unwrap();
        assert!(matches!(
            agent.init().await.unwrap_err(),
            AgentError::AlreadyInitialized
        ));
    }

    #[tokio::test]
    #[serial]
    async fn test_tracers_and_meters_are_cached_per_name() {
        reset_global_provider();
        let agent = quiet(traces_only());
        agent.init().await.unwrap();

        let a = agent.tracer("orders");
        let b = agent.tracer("orders");
        let c = agent.tracer("payments");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        // Metrics are disabled, so meters are fresh no-ops.
        assert!(!Arc::ptr_eq(&agent.meter("m"), &agent.meter("m")));

        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_agent() {
        let mut logger = MockSink::new();
        logger
            .expect_info()
            .withf(|message, _| message == "Telemetry disabled")
            .times(1)
            .return_const(());
        let config = AgentConfig::builder().enabled(false).build();
        let agent = Agent::with_logger(config, Arc::new(logger));

        agent.init().await.unwrap();
        assert_eq!(agent.state(), AgentState::Disabled);
        assert!(agent.readiness_check());
        assert!(!agent.is_running());
        assert!(!agent.tracer("x").start("y").span_context().is_valid());

        let health = agent.health_check();
        assert_eq!(health.status, "disabled");
        assert!(!health.enabled);

        assert!(agent.shutdown().await.is_ok());
        assert_eq!(agent.state(), AgentState::Disabled);
        assert!(matches!(
            agent.init().await.unwrap_err(),
            AgentError::AlreadyInitialized
        ));
    }

    #[tokio::test]
    async fn test_missing_service_name() {
        let config = AgentConfig {
            service_name: "  ".to_string(),
            ..traces_only()
        };
        let agent = quiet(config);

        assert!(matches!(
            agent.init().await.unwrap_err(),
            AgentError::MissingServiceName
        ));
        assert_eq!(agent.state(), AgentState::Uninitialized);
    }

    #[tokio::test]
    async fn test_unsupported_protocol_fails_before_building() {
        let config = AgentConfig {
            exporter_protocol: "carrier-pigeon".to_string(),
            ..traces_only()
        };
        let agent = quiet(config);

        let err = agent.init().await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedProtocol(_)));
        assert!(agent.tracer_provider().is_none());
        assert_eq!(agent.state(), AgentState::Uninitialized);
    }

    #[tokio::test]
    async fn test_shutdown_before_init_is_noop() {
        let agent = quiet(traces_only());

        agent.shutdown().await.unwrap();
        assert_eq!(agent.state(), AgentState::Uninitialized);
        agent.force_flush().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn test_shutdown_is_idempotent() {
        reset_global_provider();
        let agent = quiet(traces_only());
        agent.init().await.unwrap();

        agent.shutdown().await.unwrap();
        agent.shutdown().await.unwrap();
        assert_eq!(agent.state(), AgentState::Shutdown);
    }

    #[tokio::test]
    #[serial]
    async fn test_force_flush_when_running() {
        reset_global_provider();
        let agent = quiet(traces_only());
        agent.init().await.unwrap();

        agent.force_flush().await.unwrap();
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn test_instruments_requested_before_init_are_rebuilt() {
        reset_global_provider();
        let config = AgentConfig {
            traces: TracesConfig {
                enabled: false,
                ..TracesConfig::default()
            },
            metrics: MetricsConfig {
                runtime: false,
                ..MetricsConfig::default()
            },
            ..traces_only()
        };
        let agent = quiet(config);

        increment_counter(&agent, "requests", 1, &MetricOptions::default());
        assert_eq!(agent.instruments().len(), 1);

        agent.init().await.unwrap();
        assert!(agent.instruments().is_empty());

        let calls = AtomicUsize::new(0);
        let _: u64 = agent
            .instruments()
            .get_or_create("default:requests", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_provider_shutdown_past_deadline_reports_timeout() {
        let mut logger = MockSink::new();
        logger
            .expect_error()
            .withf(|message, fields| {
                message == "Provider shutdown timed out"
                    && fields.get("signal").map(String::as_str) == Some("traces")
            })
            .times(1)
            .return_const(());
        let agent = Agent::with_logger(traces_only(), Arc::new(logger));
        let deadline = Instant::now() + Duration::from_millis(20);

        let finished = agent
            .shutdown_provider(Signal::Traces, deadline, || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await;
        assert!(!finished);

        // The next provider still gets its turn after the deadline.
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let finished = agent
            .shutdown_provider(Signal::Metrics, Instant::now() + Duration::from_secs(5), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(finished);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[serial]
    async fn test_shutdown_timeout_still_ends_in_shutdown() {
        reset_global_provider();
        let config = AgentConfig {
            shutdown_timeout: Duration::ZERO,
            ..traces_only()
        };
        let agent = quiet(config);
        agent.init().await.unwrap();

        let err = agent.shutdown().await.unwrap_err();
        assert!(matches!(err, AgentError::ShutdownTimeout));
        assert_eq!(agent.state(), AgentState::Shutdown);
        assert!(agent.tracer_provider().is_none());
        assert!(global_provider().is_none());
    }

    #[tokio::test]
    async fn test_flush_continues_past_failure_and_keeps_first_error() {
        let agent = quiet(traces_only());
        let mut first_error = None;
        let flushed = Arc::new(AtomicUsize::new(0));

        agent
            .flush_provider(Signal::Traces, &mut first_error, || {
                Err(OTelSdkError::InternalFailure("collector down".to_string()))
            })
            .await;

        let counter = flushed.clone();
        agent
            .flush_provider(Signal::Metrics, &mut first_error, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        agent
            .flush_provider(Signal::Logs, &mut first_error, || {
                Err(OTelSdkError::InternalFailure("queue closed".to_string()))
            })
            .await;

        assert_eq!(flushed.load(Ordering::SeqCst), 1);
        match first_error {
            Some(AgentError::Flush { signal, source }) => {
                assert_eq!(signal, Signal::Traces);
                assert!(source.to_string().contains("collector down"));
            }
            other => panic!("expected traces flush error, got {other:?}"),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_health_reflects_exporter_failures() {
        reset_global_provider();
        let agent = quiet(traces_only());
        agent.init().await.unwrap();

        let health = agent.exporter_health();
        for _ in 0..3 {
            health.record_failure("traces");
        }

        let status = agent.health_check();
        assert_eq!(status.status, "degraded");
        assert_eq!(status.signals["traces"], ExporterStatus::Degraded);
        assert!(status.running);

        health.record_success("traces");
        assert_eq!(agent.health_check().status, "healthy");

        agent.shutdown().await.unwrap();
    }

    #[test]
    fn test_diagnostics() {
        let diagnostics = quiet(traces_only()).diagnostics();

        assert_eq!(diagnostics.service_name, "orders");
        assert_eq!(diagnostics.protocol, "http/protobuf");
        assert!(diagnostics.traces_enabled);
        assert!(!diagnostics.metrics_enabled);
        assert!(!diagnostics.running);
        assert_eq!(diagnostics.sampling_rate, 1.0);
    }

    #[tokio::test]
    #[serial]
    async fn test_helpers_route_through_published_agent() {
        reset_global_provider();
        let agent = quiet(traces_only());
        agent.init().await.unwrap();

        let cx = crate::global::trace("checkout", &SpanOptions::default());
        assert!(cx.span().span_context().is_valid());
        cx.span().end();

        agent.shutdown().await.unwrap();
        let cx = crate::global::trace("checkout", &SpanOptions::default());
        assert!(!cx.span().span_context().is_valid());
    }

    #[tokio::test]
    #[sealed_test(env = [
        ("OTEL_ENABLED", "false"),
        ("OTEL_SERVICE_NAME", "from-env"),
    ])]
    async fn test_agent_from_environment() {
        let agent = quiet(AgentConfig::from_env());

        assert_eq!(agent.config().service_name, "from-env");
        assert!(!agent.is_enabled());
        agent.init().await.unwrap();
        assert_eq!(agent.state(), AgentState::Disabled);
    }
}

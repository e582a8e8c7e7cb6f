//! Crash-proof OpenTelemetry agent for long-running services.
//!
//! The agent wires OTLP exporters for traces, metrics and logs, installs them as the
//! OpenTelemetry globals, and adds the pieces most services end up writing by hand:
//!
//! - **Route exclusion**: skip tracing for health checks and other noisy paths
//! - **Attribute scrubbing**: redact credentials and PII before spans leave the process
//! - **HTTP scrubbing**: drop sensitive headers and query parameters
//! - **Exporter health**: consecutive failure tracking per signal, surfaced through
//!   [`Agent::health_check`]
//! - **Lazy instrumentation**: tracers that resolve the real provider on every span,
//!   so instrumentation created before `init` still records
//! - **Helpers**: cached metric instruments, span wrappers and context propagation
//!
//! Telemetry must never take the application down. Recording paths swallow their
//! errors and the agent hands out no-op tracers and meters whenever the real ones are
//! unavailable.
//!
//! # Quick Start
//!
//! ```no_run
//! use otel_agent::{trace_fn, Agent, AgentConfig, SpanOptions};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("payment declined")]
//! struct Declined;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = Agent::new(AgentConfig::from_env());
//!     agent.init().await?;
//!
//!     let result = trace_fn(
//!         &agent,
//!         "charge",
//!         &SpanOptions::component("payments"),
//!         |_cx| async { Ok::<_, Declined>(42) },
//!     )
//!     .await;
//!     println!("{result:?}");
//!
//!     agent.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! [`AgentConfig`] is plain data. [`AgentConfig::from_env`] reads the standard
//! `OTEL_*` variables plus a few agent-specific ones (see [`constants::env_vars`]):
//!
//! - `OTEL_ENABLED`: master switch, defaults to `true`
//! - `OTEL_SERVICE_NAME`: required when telemetry is enabled
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` / `OTEL_EXPORTER_OTLP_PROTOCOL`: collector address
//!   and `grpc`, `http/protobuf` or `http/json`
//! - `OTEL_TRACES_SAMPLER` / `OTEL_TRACES_SAMPLER_ARG`: sampling strategy and ratio
//!
//! # Global helpers
//!
//! [`Agent::init`] publishes the agent as the process-wide [`TelemetryProvider`].
//! [`trace`], [`measure`] and [`count`] go through it and do nothing when no agent
//! is running.

mod agent;
mod cache;
mod collector;
mod config;
pub mod constants;
mod env;
mod error;
mod global;
mod health;
mod http_scrubber;
mod instrument;
mod lazy;
pub mod logger;
mod metrics;
mod noop;
mod propagation;
mod protocol;
mod providers;
mod resource;
mod route_matcher;
mod scrub;

pub use agent::{Agent, AgentState};
pub use cache::InstrumentCache;
pub use config::{
    AgentConfig, BatchConfig, HttpConfig, LogsConfig, MetricsConfig, ResourceConfig,
    RouteExclusionConfig, SamplingConfig, ScrubConfig, TracesConfig,
};
pub use error::{AgentError, BoxError};
pub use global::{
    clear_global_provider, count, global_provider, measure, reset_global_provider,
    set_global_provider, trace, TelemetryProvider,
};
pub use health::{
    Diagnostics, ExporterHealth, ExporterStatus, HealthReportingSpanExporter, HealthStatus,
};
pub use http_scrubber::HttpScrubber;
pub use instrument::{
    add_event, is_tracing, record_error, set_attributes, span_id, start_span, trace_and_measure,
    trace_fn, trace_id, SpanOptions,
};
pub use lazy::{LazyInstrumentation, LazyTracer, LazyTracerProvider};
pub use metrics::{increment_counter, record_duration, set_gauge, MetricOptions};
pub use noop::{noop_meter, noop_tracer};
pub use propagation::{
    composite_propagator, extract_context, get_baggage, inject_context, set_baggage,
};
pub use protocol::{ExportProtocol, Signal};
pub use providers::build_sampler;
pub use resource::build_resource;
pub use route_matcher::{should_exclude, RouteMatcher};
pub use scrub::{AttributeScrubber, ScrubbingSpanExporter};

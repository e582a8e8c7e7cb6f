//! Exporter health tracking.
//!
//! [`ExporterHealth`] counts consecutive export failures per signal and maps the
//! count onto a three-level [`ExporterStatus`]:
//!
//! | consecutive failures | status |
//! |---|---|
//! | below the degraded threshold (3) | `healthy` |
//! | from the degraded threshold up to the unhealthy threshold (10) | `degraded` |
//! | at or above the unhealthy threshold | `unhealthy` |
//!
//! One successful export resets the counter. Signals that never reported anything
//! are healthy. Span exports are reported automatically by
//! [`HealthReportingSpanExporter`]; other signals can be reported by callers.
//!
//! The agent folds this into [`HealthStatus`] for liveness endpoints and
//! [`Diagnostics`] for debugging.

use crate::constants::{defaults, signals};
use crate::error::AgentError;

use opentelemetry_sdk::{
    error::OTelSdkResult,
    trace::{SpanData, SpanExporter},
    Resource,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    future::Future,
    sync::{Arc, RwLock},
    time::SystemTime,
};

/// Health of one exporter. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ExporterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExporterStatus::Healthy => "healthy",
            ExporterStatus::Degraded => "degraded",
            ExporterStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for ExporterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SignalHealth {
    consecutive_failures: u32,
    last_success: Option<SystemTime>,
    last_failure: Option<SystemTime>,
}

/// Per-signal consecutive failure tracker.
#[derive(Debug)]
pub struct ExporterHealth {
    signals: RwLock<HashMap<String, SignalHealth>>,
    degraded_threshold: u32,
    unhealthy_threshold: u32,
}

impl Default for ExporterHealth {
    fn default() -> Self {
        Self {
            signals: RwLock::new(HashMap::new()),
            degraded_threshold: defaults::DEGRADED_THRESHOLD,
            unhealthy_threshold: defaults::UNHEALTHY_THRESHOLD,
        }
    }
}

impl ExporterHealth {
    /// Tracker with the default thresholds (3 and 10).
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker with custom thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] unless `0 < degraded < unhealthy`.
    pub fn with_thresholds(degraded: u32, unhealthy: u32) -> Result<Self, AgentError> {
        if degraded == 0 || degraded >= unhealthy {
            return Err(AgentError::InvalidConfig(format!(
                "exporter health thresholds must satisfy 0 < degraded ({degraded}) < unhealthy ({unhealthy})"
            )));
        }

        Ok(Self {
            degraded_threshold: degraded,
            unhealthy_threshold: unhealthy,
            ..Self::default()
        })
    }

    pub fn record_success(&self, signal: &str) {
        let mut signals = self.signals.write().unwrap_or_else(|poison| poison.into_inner());
        let entry = signals.entry(signal.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.last_success = Some(SystemTime::now());
    }

    pub fn record_failure(&self, signal: &str) {
        let mut signals = self.signals.write().unwrap_or_else(|poison| poison.into_inner());
        let entry = signals.entry(signal.to_string()).or_default();
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_failure = Some(SystemTime::now());
    }

    pub fn status(&self, signal: &str) -> ExporterStatus {
        self.consecutive_failures(signal)
            .map(|failures| self.classify(failures))
            .unwrap_or(ExporterStatus::Healthy)
    }

    /// Worst status across every signal seen so far.
    pub fn overall_status(&self) -> ExporterStatus {
        let signals = self.signals.read().unwrap_or_else(|poison| poison.into_inner());
        signals
            .values()
            .map(|health| self.classify(health.consecutive_failures))
            .max()
            .unwrap_or(ExporterStatus::Healthy)
    }

    pub fn signal_statuses(&self) -> BTreeMap<String, ExporterStatus> {
        let signals = self.signals.read().unwrap_or_else(|poison| poison.into_inner());
        signals
            .iter()
            .map(|(name, health)| (name.clone(), self.classify(health.consecutive_failures)))
            .collect()
    }

    /// `None` for signals that never reported.
    pub fn consecutive_failures(&self, signal: &str) -> Option<u32> {
        self.with_signal(signal, |health| health.consecutive_failures)
    }

    pub fn last_success(&self, signal: &str) -> Option<SystemTime> {
        self.with_signal(signal, |health| health.last_success).flatten()
    }

    pub fn last_failure(&self, signal: &str) -> Option<SystemTime> {
        self.with_signal(signal, |health| health.last_failure).flatten()
    }

    fn with_signal<T>(&self, signal: &str, f: impl FnOnce(&SignalHealth) -> T) -> Option<T> {
        let signals = self.signals.read().unwrap_or_else(|poison| poison.into_inner());
        signals.get(signal).map(f)
    }

    fn classify(&self, failures: u32) -> ExporterStatus {
        if failures >= self.unhealthy_threshold {
            ExporterStatus::Unhealthy
        } else if failures >= self.degraded_threshold {
            ExporterStatus::Degraded
        } else {
            ExporterStatus::Healthy
        }
    }
}

/// Liveness summary returned by [`Agent::health_check`](crate::Agent::health_check).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy`, `degraded`, `unhealthy` or `disabled`.
    pub status: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signals: BTreeMap<String, ExporterStatus>,
    pub running: bool,
    pub enabled: bool,
}

/// Effective runtime configuration, for debugging telemetry pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub enabled: bool,
    pub running: bool,
    pub environment: String,
    pub service_name: String,
    pub namespace: String,
    pub version: String,
    pub endpoint: String,
    pub protocol: String,
    pub sampling_rate: f64,
    pub traces_enabled: bool,
    pub metrics_enabled: bool,
    pub logs_enabled: bool,
}

/// Span exporter wrapper that reports every export outcome under `traces`.
#[derive(Debug)]
pub struct HealthReportingSpanExporter<E> {
    inner: E,
    health: Arc<ExporterHealth>,
}

impl<E> HealthReportingSpanExporter<E> {
    pub fn new(inner: E, health: Arc<ExporterHealth>) -> Self {
        Self { inner, health }
    }
}

impl<E> SpanExporter for HealthReportingSpanExporter<E>
where
    E: SpanExporter,
{
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        let export = self.inner.export(batch);
        let health = self.health.clone();
        async move {
            let result = export.await;
            match &result {
                Ok(()) => health.record_success(signals::TRACES),
                Err(e) => {
                    health.record_failure(signals::TRACES);
                    tracing::debug!(
                        target: "otel_agent",
                        error = %e,
                        status = %health.status(signals::TRACES),
                        "Span export failed"
                    );
                }
            }
            result
        }
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

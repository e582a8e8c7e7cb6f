//! Logging collaborator used by the agent for lifecycle diagnostics.
//!
//! The agent never prints on its own. Everything it has to say about startup,
//! shutdown and flush failures goes through a [`Logger`], which defaults to
//! [`TracingLogger`] and can be replaced with [`NoopLogger`] or any custom sink.
//!
//! Error types can contribute structured fields by implementing [`HasLogFields`].
//!
//! ```
//! use otel_agent::logger::{Fields, Logger, TracingLogger};
//!
//! let logger = TracingLogger::new();
//! logger.info(
//!     "cache warmed",
//!     &Fields::from([("entries".to_string(), "128".to_string())]),
//! );
//! ```

use crate::error::AgentError;

use opentelemetry::trace::TraceContextExt;
use std::collections::BTreeMap;
use std::error::Error as StdError;

/// Structured fields attached to a log line.
pub type Fields = BTreeMap<String, String>;

/// Structured, leveled log sink.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, fields: &Fields);
    fn info(&self, message: &str, fields: &Fields);
    fn warn(&self, message: &str, fields: &Fields);
    fn error(&self, message: &str, fields: &Fields);
}

/// Forwards to the `tracing` macros under the `otel_agent` target.
///
/// The trace and span ids of the active OpenTelemetry context are added to the
/// fields when a span is in scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str, fields: &Fields) {
        tracing::debug!(target: "otel_agent", fields = %correlated(fields), "{message}");
    }

    fn info(&self, message: &str, fields: &Fields) {
        tracing::info!(target: "otel_agent", fields = %correlated(fields), "{message}");
    }

    fn warn(&self, message: &str, fields: &Fields) {
        tracing::warn!(target: "otel_agent", fields = %correlated(fields), "{message}");
    }

    fn error(&self, message: &str, fields: &Fields) {
        tracing::error!(target: "otel_agent", fields = %correlated(fields), "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _message: &str, _fields: &Fields) {}
    fn info(&self, _message: &str, _fields: &Fields) {}
    fn warn(&self, _message: &str, _fields: &Fields) {}
    fn error(&self, _message: &str, _fields: &Fields) {}
}

/// Errors that know how to describe themselves as structured fields.
pub trait HasLogFields {
    fn log_fields(&self) -> Fields;
}

impl HasLogFields for AgentError {
    fn log_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("error".to_string(), self.to_string());

        match self {
            AgentError::Provider { signal, .. } | AgentError::Flush { signal, .. } => {
                fields.insert("signal".to_string(), signal.to_string());
            }
            AgentError::InstrumentKindMismatch { key } | AgentError::Instrument { key, .. } => {
                fields.insert("instrument".to_string(), key.clone());
            }
            AgentError::UnsupportedProtocol(protocol) => {
                fields.insert("protocol".to_string(), protocol.clone());
            }
            _ => {}
        }

        if let Some(source) = self.source() {
            fields.insert("cause".to_string(), source.to_string());
        }
        fields
    }
}

/// Logs `err` at error level, using its structured fields when it is an
/// [`AgentError`] and its message (plus the first cause) otherwise.
pub fn log_error(logger: &dyn Logger, message: &str, err: &(dyn StdError + 'static)) {
    let fields = match err.downcast_ref::<AgentError>() {
        Some(agent_error) => agent_error.log_fields(),
        None => {
            let mut fields = Fields::new();
            fields.insert("error".to_string(), err.to_string());
            if let Some(source) = err.source() {
                fields.insert("cause".to_string(), source.to_string());
            }
            fields
        }
    };
    logger.error(message, &with_trace_context(fields));
}

/// Logs an error that carries its own fields.
pub fn log_error_fields<E>(logger: &dyn Logger, message: &str, err: &E)
where
    E: HasLogFields + ?Sized,
{
    logger.error(message, &with_trace_context(err.log_fields()));
}

fn with_trace_context(mut fields: Fields) -> Fields {
    let context = opentelemetry::Context::current();
    let span = context.span();
    let span_context = span.span_context();
    if span_context.is_valid() {
        fields.insert("trace_id".to_string(), span_context.trace_id().to_string());
        fields.insert("span_id".to_string(), span_context.span_id().to_string());
    }
    fields
}

fn correlated(fields: &Fields) -> String {
    render(&with_trace_context(fields.clone()))
}

fn render(fields: &Fields) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

use crate::protocol::Signal;

use opentelemetry_sdk::error::OTelSdkError;
use std::error::Error as StdError;

/// Boxed error carried as the source of provider construction failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors returned by the agent and its building blocks.
///
/// Recording paths (spans, metric helpers, scrubbing) never return these; only
/// lifecycle calls and explicit cache lookups do.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// `init` was called on an agent that already left the uninitialized state.
    #[error("agent already initialized")]
    AlreadyInitialized,

    /// Telemetry is enabled but no service name was configured.
    #[error("service name is required when telemetry is enabled")]
    MissingServiceName,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported OTLP protocol: {0} (use 'grpc', 'http/protobuf' or 'http/json')")]
    UnsupportedProtocol(String),

    /// An exporter or provider for one signal could not be built.
    #[error("failed to create {signal} provider: {source}")]
    Provider {
        signal: Signal,
        #[source]
        source: BoxError,
    },

    #[error("failed to flush {signal} provider: {source}")]
    Flush {
        signal: Signal,
        #[source]
        source: OTelSdkError,
    },

    /// Shutdown completed but at least one teardown step hit the deadline.
    #[error("shutdown did not complete within the deadline")]
    ShutdownTimeout,

    /// A cache key is already bound to an instrument of another kind.
    #[error("instrument '{key}' is already registered with a different kind")]
    InstrumentKindMismatch { key: String },

    #[error("failed to create instrument '{key}': {message}")]
    Instrument { key: String, message: String },
}

impl AgentError {
    pub(crate) fn provider<E>(signal: Signal, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        AgentError::Provider {
            signal,
            source: source.into(),
        }
    }
}

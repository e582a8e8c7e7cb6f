use crate::constants::signals;
use crate::error::AgentError;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Wire protocol used by the OTLP exporters.
///
/// Parsed from the configured protocol name when the agent initializes, so a typo
/// in configuration fails [`Agent::init`](crate::Agent::init) instead of silently
/// falling back to another transport.
///
/// # Accepted names
///
/// - `grpc`
/// - `http` and `http/protobuf` (binary protobuf over HTTP)
/// - `http/json`
///
/// ```
/// use otel_agent::ExportProtocol;
///
/// let protocol: ExportProtocol = "http/protobuf".parse().unwrap();
/// assert_eq!(protocol, ExportProtocol::HttpBinary);
/// assert!("carrier-pigeon".parse::<ExportProtocol>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportProtocol {
    /// OTLP over gRPC (tonic).
    Grpc,
    /// OTLP protobuf over HTTP.
    HttpBinary,
    /// OTLP JSON over HTTP.
    HttpJson,
}

impl ExportProtocol {
    /// Whether the protocol is one of the HTTP variants.
    pub fn is_http(&self) -> bool {
        matches!(self, ExportProtocol::HttpBinary | ExportProtocol::HttpJson)
    }
}

impl fmt::Display for ExportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportProtocol::Grpc => write!(f, "grpc"),
            ExportProtocol::HttpBinary => write!(f, "http/protobuf"),
            ExportProtocol::HttpJson => write!(f, "http/json"),
        }
    }
}

impl FromStr for ExportProtocol {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "grpc" => Ok(ExportProtocol::Grpc),
            "http" | "http/protobuf" => Ok(ExportProtocol::HttpBinary),
            "http/json" => Ok(ExportProtocol::HttpJson),
            _ => Err(AgentError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// An independently enabled telemetry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    /// Name used as the exporter health key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => signals::TRACES,
            Signal::Metrics => signals::METRICS,
            Signal::Logs => signals::LOGS,
        }
    }

    /// HTTP path suffix for the signal's OTLP endpoint.
    pub(crate) fn http_path(&self) -> &'static str {
        match self {
            Signal::Traces => "/v1/traces",
            Signal::Metrics => "/v1/metrics",
            Signal::Logs => "/v1/logs",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Redaction for HTTP request and response data captured by web adapters.
//!
//! Sensitive headers (`authorization`, `cookie` and friends) are redacted whether or
//! not scrubbing is enabled. Query strings and bodies are only rewritten by the
//! sensitive patterns when scrubbing is enabled; body truncation always applies.

use crate::config::{HttpConfig, ScrubConfig};
use crate::scrub::{compile_patterns, truncate_at_char_boundary};

use http::HeaderMap;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

const TRUNCATION_MARKER: &str = "...[truncated]";

/// Compiled header, query string and body scrubbing rules.
#[derive(Debug, Clone)]
pub struct HttpScrubber {
    enabled: bool,
    sensitive_headers: HashSet<String>,
    allowed_content_types: HashSet<String>,
    patterns: Vec<Regex>,
    redacted_value: String,
    request_body_max_size: usize,
    response_body_max_size: usize,
}

impl HttpScrubber {
    pub fn new(http: &HttpConfig, scrub: &ScrubConfig) -> Self {
        let patterns = if scrub.enabled {
            compile_patterns(&scrub.sensitive_patterns)
        } else {
            Vec::new()
        };

        Self {
            enabled: scrub.enabled,
            sensitive_headers: http
                .sensitive_headers
                .iter()
                .map(|h| h.trim().to_lowercase())
                .collect(),
            allowed_content_types: http
                .body_allowed_content_types
                .iter()
                .map(|ct| ct.trim().to_lowercase())
                .filter(|ct| !ct.is_empty())
                .collect(),
            patterns,
            redacted_value: scrub.redaction().to_string(),
            request_body_max_size: http.request_body_max_size,
            response_body_max_size: http.response_body_max_size,
        }
    }

    /// Filters and redacts headers into span-attribute-ready pairs.
    ///
    /// Names are lower-cased. A non-empty `allow_list` drops every header not on it.
    /// Multiple values for one name are joined with `", "`.
    pub fn scrub_headers(
        &self,
        headers: &HeaderMap,
        allow_list: &[String],
    ) -> BTreeMap<String, String> {
        let allowed: HashSet<String> = allow_list.iter().map(|h| h.to_lowercase()).collect();
        let mut result = BTreeMap::new();

        for name in headers.keys() {
            let lower = name.as_str().to_lowercase();
            if !allowed.is_empty() && !allowed.contains(&lower) {
                continue;
            }

            let value = if self.sensitive_headers.contains(&lower) {
                self.redacted_value.clone()
            } else {
                headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ")
            };

            result.insert(lower, value);
        }

        result
    }

    /// Redacts the values of query parameters whose key matches a sensitive pattern.
    ///
    /// Returns the input unchanged when scrubbing is disabled. Segments without `=`
    /// are kept as they are.
    pub fn scrub_query_string(&self, raw: &str) -> String {
        if raw.is_empty() || !self.enabled {
            return raw.to_string();
        }

        raw.split('&')
            .map(|part| match part.split_once('=') {
                Some((key, _)) if self.is_key_match(key) => {
                    format!("{key}={}", self.redacted_value)
                }
                _ => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Truncates a body to `max_size` bytes (0 means no limit) and, when scrubbing
    /// is enabled, replaces every sensitive pattern match.
    pub fn scrub_body(&self, body: &[u8], max_size: usize) -> String {
        if body.is_empty() {
            return String::new();
        }

        let text = String::from_utf8_lossy(body);
        let mut scrubbed = if max_size > 0 && text.len() > max_size {
            format!("{}{TRUNCATION_MARKER}", truncate_at_char_boundary(&text, max_size))
        } else {
            text.into_owned()
        };

        if self.enabled {
            for re in &self.patterns {
                scrubbed = re
                    .replace_all(&scrubbed, self.redacted_value.as_str())
                    .into_owned();
            }
        }

        scrubbed
    }

    /// Whether a body with this content type may be captured. Parameters after `;`
    /// are ignored. An empty allow-list allows everything.
    pub fn is_allowed_content_type(&self, content_type: &str) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }

        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        self.allowed_content_types.contains(&media_type)
    }

    pub fn request_body_max_size(&self) -> usize {
        self.request_body_max_size
    }

    pub fn response_body_max_size(&self) -> usize {
        self.response_body_max_size
    }

    fn is_key_match(&self, key: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(key))
    }
}

//! Route exclusion for request tracing.
//!
//! A [`RouteMatcher`] is compiled once from a [`RouteExclusionConfig`] and answers a
//! single question: should a request for this path be traced at all? Rules are
//! checked in three layers, cheapest first:
//!
//! 1. **Exact paths**: hash set lookup.
//! 2. **Prefixes**: plain `starts_with`, so `/internal` also matches `/internalize`.
//! 3. **Glob patterns**: `*` matches within a single path segment and never crosses `/`.
//!
//! The first layer that matches wins. Blank entries are ignored and patterns that
//! fail to compile are dropped with a warning, so a bad rule never disables tracing
//! for unrelated routes.
//!
//! ```
//! use otel_agent::{RouteExclusionConfig, RouteMatcher};
//!
//! let matcher = RouteMatcher::new(&RouteExclusionConfig {
//!     exact_paths: vec!["/health".to_string()],
//!     prefix_paths: vec!["/internal/".to_string()],
//!     patterns: vec!["/api/*/status".to_string()],
//! });
//!
//! assert!(matcher.should_exclude("/health"));
//! assert!(matcher.should_exclude("/internal/jobs"));
//! assert!(matcher.should_exclude("/api/v1/status"));
//! assert!(!matcher.should_exclude("/api/v1/users/status"));
//! ```

use crate::config::RouteExclusionConfig;

use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashSet;

/// Pre-compiled path exclusion rules. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    exact: HashSet<String>,
    prefixes: Vec<String>,
    globs: Vec<GlobMatcher>,
}

impl RouteMatcher {
    pub fn new(config: &RouteExclusionConfig) -> Self {
        let exact = config
            .exact_paths
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();

        let prefixes = config
            .prefix_paths
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();

        let globs = config
            .patterns
            .iter()
            .filter(|p| !p.is_empty())
            .filter_map(|pattern| {
                match GlobBuilder::new(pattern).literal_separator(true).build() {
                    Ok(glob) => Some(glob.compile_matcher()),
                    Err(e) => {
                        tracing::warn!(
                            target: "otel_agent",
                            pattern = %pattern,
                            error = %e,
                            "Dropping invalid route exclusion pattern"
                        );
                        None
                    }
                }
            })
            .collect();

        Self {
            exact,
            prefixes,
            globs,
        }
    }

    /// Whether requests for `path` should not be traced.
    pub fn should_exclude(&self, path: &str) -> bool {
        if self.exact.contains(path) {
            return true;
        }

        if self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return true;
        }

        self.globs.iter().any(|glob| glob.is_match(path))
    }

    /// Whether no rule survived construction.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty() && self.globs.is_empty()
    }
}

/// Checks `path` against an optional matcher. An absent matcher excludes nothing.
pub fn should_exclude(matcher: Option<&RouteMatcher>, path: &str) -> bool {
    matcher.is_some_and(|m| m.should_exclude(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(exact: &[&str], prefixes: &[&str], patterns: &[&str]) -> RouteMatcher {
        let to_vec = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        RouteMatcher::new(&RouteExclusionConfig {
            exact_paths: to_vec(exact),
            prefix_paths: to_vec(prefixes),
            patterns: to_vec(patterns),
        })
    }

    #[test]
    fn test_exact_match() {
        let m = matcher(&["/health", "/ready"], &[], &[]);

        assert!(m.should_exclude("/health"));
        assert!(m.should_exclude("/ready"));
        assert!(!m.should_exclude("/health/deep"));
        assert!(!m.should_exclude("/healthz"));
    }

    #[test]
    fn test_prefix_match_is_not_segment_aware() {
        let m = matcher(&[], &["/internal"], &[]);

        assert!(m.should_exclude("/internal"));
        assert!(m.should_exclude("/internal/metrics"));
        assert!(m.should_exclude("/internalize"));
        assert!(!m.should_exclude("/api/internal"));
    }

    #[test]
    fn test_glob_does_not_cross_separator() {
        let m = matcher(&[], &[], &["/api/*/health"]);

        assert!(m.should_exclude("/api/v1/health"));
        assert!(m.should_exclude("/api/v2/health"));
        assert!(!m.should_exclude("/api/v1/x/health"));
        assert!(!m.should_exclude("/api/health"));
    }

    #[test]
    fn test_glob_character_classes() {
        let m = matcher(&[], &[], &["/static/*.css", "/v[12]/ping"]);

        assert!(m.should_exclude("/static/site.css"));
        assert!(!m.should_exclude("/static/css/site.css"));
        assert!(m.should_exclude("/v1/ping"));
        assert!(!m.should_exclude("/v3/ping"));
    }

    #[test]
    fn test_empty_config_excludes_nothing() {
        let m = RouteMatcher::new(&RouteExclusionConfig::default());

        assert!(m.is_empty());
        assert!(!m.should_exclude("/"));
        assert!(!m.should_exclude("/health"));
    }

    #[test]
    fn test_blank_entries_are_filtered() {
        let m = matcher(&[""], &[""], &[""]);

        assert!(m.is_empty());
        // A blank prefix would otherwise match every path.
        assert!(!m.should_exclude("/orders"));
    }

    #[test]
    fn test_invalid_pattern_is_dropped() {
        let m = matcher(&[], &[], &["/api/[unclosed", "/ok/*"]);

        assert!(!m.should_exclude("/api/[unclosed"));
        assert!(m.should_exclude("/ok/anything"));
    }

    #[test]
    fn test_absent_matcher_excludes_nothing() {
        assert!(!should_exclude(None, "/health"));

        let m = matcher(&["/health"], &[], &[]);
        assert!(should_exclude(Some(&m), "/health"));
        assert!(!should_exclude(Some(&m), "/orders"));
    }

    #[test]
    fn test_health_check_defaults() {
        let m = RouteMatcher::new(&RouteExclusionConfig::health_checks());

        for path in ["/health", "/healthz", "/health_check", "/metrics", "/ready", "/live"] {
            assert!(m.should_exclude(path), "expected {path} to be excluded");
        }
        assert!(!m.should_exclude("/orders"));
    }
}

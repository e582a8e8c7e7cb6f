//! Tracers that resolve the global provider at span start instead of at creation.
//!
//! Framework adapters are usually wired while the application is being assembled,
//! which can happen before [`Agent::init`](crate::Agent::init) has installed the real
//! tracer provider. An adapter that grabbed a tracer at that point would hold a
//! no-op tracer forever. The types here only remember the instrumentation scope and
//! look up [`opentelemetry::global::tracer_provider`] every time a span starts, so
//! spans follow whatever provider is installed at that moment, including after a
//! shutdown and re-initialization.
//!
//! ```
//! use opentelemetry::trace::{Span, Tracer, TracerProvider};
//! use otel_agent::LazyTracerProvider;
//!
//! // Safe to call before any provider exists.
//! let tracer = LazyTracerProvider::new().tracer("orders-db");
//! let mut span = tracer.start("SELECT orders");
//! span.end();
//! ```

use opentelemetry::{
    global::{self, BoxedSpan},
    trace::{SpanBuilder, SpanKind, Tracer, TracerProvider},
    Context, InstrumentationScope, KeyValue,
};
use std::{
    borrow::Cow,
    fmt,
    sync::{Arc, OnceLock},
};

/// A [`TracerProvider`] handing out [`LazyTracer`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyTracerProvider;

impl LazyTracerProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TracerProvider for LazyTracerProvider {
    type Tracer = LazyTracer;

    fn tracer_with_scope(&self, scope: InstrumentationScope) -> Self::Tracer {
        LazyTracer::with_scope(scope)
    }
}

/// A tracer that holds only its scope and start options.
///
/// Each span is started on a tracer freshly obtained from the global provider.
#[derive(Debug, Clone)]
pub struct LazyTracer {
    scope: InstrumentationScope,
    default_kind: Option<SpanKind>,
    default_attributes: Vec<KeyValue>,
}

impl LazyTracer {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_scope(InstrumentationScope::builder(name).build())
    }

    pub fn with_scope(scope: InstrumentationScope) -> Self {
        Self {
            scope,
            default_kind: None,
            default_attributes: Vec::new(),
        }
    }

    /// Span kind used when a builder does not set one.
    pub fn with_span_kind(mut self, kind: SpanKind) -> Self {
        self.default_kind = Some(kind);
        self
    }

    /// Attributes added to spans whose builder carries none.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.default_attributes = attributes.into_iter().collect();
        self
    }

    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }
}

impl Tracer for LazyTracer {
    type Span = BoxedSpan;

    fn build_with_context(&self, mut builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        if builder.span_kind.is_none() {
            builder.span_kind = self.default_kind.clone();
        }
        if builder.attributes.is_none() && !self.default_attributes.is_empty() {
            builder.attributes = Some(self.default_attributes.clone());
        }

        global::tracer_provider()
            .tracer_with_scope(self.scope.clone())
            .build_with_context(builder, parent_cx)
    }
}

type Setup<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// A [`LazyTracer`] paired with state that is built once, on the first span.
///
/// Adapters use the state for things derived from the running agent, such as a
/// compiled scrubber or cached instruments. The setup closure runs exactly once,
/// even when the first spans start concurrently, and never at construction.
pub struct LazyInstrumentation<S> {
    tracer: LazyTracer,
    state: OnceLock<S>,
    setup: Setup<S>,
}

impl<S> LazyInstrumentation<S> {
    pub fn new<F>(tracer: LazyTracer, setup: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            tracer,
            state: OnceLock::new(),
            setup: Arc::new(setup),
        }
    }

    /// The derived state, building it on first access.
    pub fn state(&self) -> &S {
        self.state.get_or_init(|| (self.setup)())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    pub fn tracer(&self) -> &LazyTracer {
        &self.tracer
    }

    /// Starts a span under `parent_cx`, returning it with the derived state.
    pub fn start_span(
        &self,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> (BoxedSpan, &S) {
        let state = self.state();
        (self.tracer.build_with_context(builder, parent_cx), state)
    }
}

impl<S: fmt::Debug> fmt::Debug for LazyInstrumentation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyInstrumentation")
            .field("tracer", &self.tracer)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

const _: fn() = || {
    fn assert_tracer_provider<T: TracerProvider<Tracer = LazyTracer>>() {}
    fn assert_tracer<T: Tracer<Span = BoxedSpan>>() {}
    fn assert_send_sync<T: Send + Sync>() {}

    assert_tracer_provider::<LazyTracerProvider>();
    assert_tracer::<LazyTracer>();
    assert_send_sync::<LazyTracerProvider>();
    assert_send_sync::<LazyTracer>();
    assert_send_sync::<LazyInstrumentation<String>>();
};

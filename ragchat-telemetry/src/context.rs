//! Explicit per-session logging context.

use tracing::span::Entered;
use tracing::{Span, info_span};

/// A logging handle passed to components at construction.
///
/// Wraps a [`tracing::Span`]. The orchestrator creates the root context for
/// its collection and hands each component a child obtained through
/// [`component`](LogContext::component), so every event a component emits is
/// attributed to both the component and the owning session.
///
/// Synchronous code enters the span with [`enter`](LogContext::enter); async
/// code attaches it with `tracing::Instrument::instrument(fut, ctx.span().clone())`.
#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
}

impl LogContext {
    /// Create a root context for a session or collection.
    pub fn new(scope: &str) -> Self {
        Self { span: info_span!("ragchat", scope = %scope) }
    }

    /// A context that records nothing. Used when a component is built
    /// standalone, outside an orchestrator.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Derive the context for a named component.
    ///
    /// The child of a disabled context is disabled too, whatever subscriber
    /// is installed.
    pub fn component(&self, name: &'static str) -> Self {
        if self.span.is_none() {
            return Self::disabled();
        }
        Self { span: info_span!(parent: &self.span, "component", name = name) }
    }

    /// The underlying span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the span for the lifetime of the returned guard.
    ///
    /// Do not hold the guard across an `.await`.
    pub fn enter(&self) -> Entered<'_> {
        self.span.enter()
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::disabled()
    }
}

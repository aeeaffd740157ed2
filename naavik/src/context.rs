use std::future::Future;

use tracing::Instrument;
use uuid::Uuid;

/// Carries the `tracing::Span` an event is processed under from the
/// informer callback all the way through handler/executor dispatch, the
/// Rust-native analogue of the source's `context.Context{Log, Context}`
/// pair (a logger handle riding alongside a cancellation context).
#[derive(Clone, Debug)]
pub struct EventContext {
    pub span: tracing::Span,
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EventContext {
    pub fn new() -> Self {
        Self {
            span: tracing::info_span!("event", event_id = %Uuid::new_v4()),
        }
    }

    pub fn with_fields(controller_name: &str, key: &str, event_type: &str) -> Self {
        Self {
            span: tracing::info_span!(
                "event",
                event_id = %Uuid::new_v4(),
                controller_name = controller_name,
                resource = key,
                event_type = event_type,
            ),
        }
    }

    /// Derives a child context for a `CreateChildEvent`, carrying a fresh
    /// `child_event_id` field while keeping the parent span as its parent.
    pub fn child(&self) -> Self {
        let child_event_id = Uuid::new_v4();
        Self {
            span: tracing::info_span!(parent: &self.span, "child_event", %child_event_id),
        }
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Instruments `fut` with this context's span. Unlike [`Self::enter`],
    /// the returned future only holds the span for the duration of each
    /// poll rather than across `.await` points, so it stays `Send` even
    /// when driven from a `Box<dyn Future + Send>` (spec.md §5, async
    /// handler dispatch).
    pub fn instrument<F: Future>(&self, fut: F) -> tracing::instrument::Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

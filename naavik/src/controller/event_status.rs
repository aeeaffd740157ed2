use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::context::EventContext;

/// Status channels are buffered so a handler can emit a few status updates
/// (e.g. a retry followed later by completion) without blocking on the
/// controller's drain loop.
pub const EVENT_STATUS_CHANNEL_CAPACITY: usize = 5;
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 5;

/// Terminal outcomes a handler can report. `Processing` is included for
/// parity with the source but is not itself terminal — handlers emit it via
/// [`EventProcessStatus::send`] while a longer-running operation is in
/// flight, followed eventually by one of the other variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    PartialCompleted,
    Failure,
    Processing,
    Skip,
    MaxRetryReached,
}

impl Terminal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminal::Completed => "Completed",
            Terminal::PartialCompleted => "PartialCompleted",
            Terminal::Failure => "Failure",
            Terminal::Processing => "Processing",
            Terminal::Skip => "Skip",
            Terminal::MaxRetryReached => "MaxRetryReached",
        }
    }
}

pub type OnStatusFn = Box<dyn FnMut(EventContext, EventProcessStatus) + Send>;

/// A pending or completed status, collapsing the source's `EventCreateChild`
/// / `EventRetry` / terminal tags into the three variants a reimplementation
/// needs to actually dispatch on — a plain terminal result, a retry request,
/// or the spawning of a recursively-handled child event.
pub enum EventStatus {
    Terminal(Terminal),
    Retry {
        after: Option<Duration>,
    },
    Child {
        ctx: EventContext,
        on_status: Option<OnStatusFn>,
        rx: mpsc::Receiver<EventProcessStatus>,
    },
}

impl EventStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            EventStatus::Terminal(t) => t.as_str(),
            EventStatus::Retry { .. } => "Retry",
            EventStatus::Child { .. } => "CreateChildEvent",
        }
    }
}

/// The value sent over an event's status channel. Mirrors the source's
/// `EventProcessStatus` struct, minus the fields now folded into
/// [`EventStatus`] itself.
pub struct EventProcessStatus {
    pub status: EventStatus,
    pub retry_count: u32,
    pub max_retry_count: u32,
    pub message: HashMap<String, String>,
    pub error: Option<String>,
}

impl EventProcessStatus {
    pub fn completed() -> Self {
        Self {
            status: EventStatus::Terminal(Terminal::Completed),
            retry_count: 0,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            message: HashMap::new(),
            error: None,
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_retry(mut self, after: Option<Duration>) -> Self {
        self.status = EventStatus::Retry { after };
        self
    }

    pub fn with_max_retry(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    pub fn with_message(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, err: impl std::fmt::Display) -> Self {
        self.error = Some(err.to_string());
        self
    }

    /// Must be called exactly once per event: forces a [`Terminal::Skip`]
    /// status and closes the channel (by consuming and dropping `tx`).
    pub async fn skip_close(mut self, tx: mpsc::Sender<EventProcessStatus>) -> &'static str {
        self.status = EventStatus::Terminal(Terminal::Skip);
        let tag = self.status.tag();
        let _ = tx.send(self).await;
        tag
    }

    /// Sends an in-flight status update without closing the channel. Can be
    /// called more than once for the same event.
    pub async fn send(self, tx: &mpsc::Sender<EventProcessStatus>) -> &'static str {
        let tag = self.status.tag();
        let _ = tx.send(self).await;
        tag
    }

    /// Sends the final status for an event and closes the channel. Must be
    /// called at most once per event.
    pub async fn send_close(self, tx: mpsc::Sender<EventProcessStatus>) -> &'static str {
        let tag = self.status.tag();
        let _ = tx.send(self).await;
        tag
    }

    /// Allocates a child event: a fresh buffered status channel and child
    /// context, recursively drained by the controller's status loop. The
    /// returned sender is handed to whatever does the child's work; `self`
    /// (carrying the receiver) is what gets sent on the parent's channel.
    pub fn create_child_event(
        parent_ctx: &EventContext,
        on_status: Option<OnStatusFn>,
    ) -> (Self, EventContext, mpsc::Sender<EventProcessStatus>) {
        let (tx, rx) = mpsc::channel(EVENT_STATUS_CHANNEL_CAPACITY);
        let child_ctx = parent_ctx.child();
        let eps = Self {
            status: EventStatus::Child {
                ctx: child_ctx.clone(),
                on_status,
                rx,
            },
            ..Self::completed()
        };
        (eps, child_ctx, tx)
    }
}

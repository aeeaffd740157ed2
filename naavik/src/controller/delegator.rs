use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::event_status::EventProcessStatus;
use crate::context::EventContext;

/// Business logic invoked by the controller runtime for each dequeued event
/// (spec.md §4.2's "handler"). Implementations must send exactly one
/// terminal [`EventProcessStatus`] on `status_tx` and let it drop (closing
/// the channel) — the runtime never closes it itself.
#[async_trait]
pub trait Handler<K>: Send + Sync + 'static {
    async fn added(
        &self,
        ctx: EventContext,
        key: &str,
        obj: Arc<K>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    );

    async fn updated(
        &self,
        ctx: EventContext,
        key: &str,
        old: Arc<K>,
        new: Arc<K>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    );

    async fn deleted(
        &self,
        ctx: EventContext,
        key: &str,
        obj: Arc<K>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    );

    /// Called by the status-handler loop for every status that isn't itself
    /// routed to a `Create-child` callback (spec.md §4.2).
    fn on_status(&self, ctx: &EventContext, status: &EventProcessStatus);
}

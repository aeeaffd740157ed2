use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tokio::sync::mpsc;

use crate::context::EventContext;
use crate::controller::delegator::Handler;
use crate::controller::event_status::EventProcessStatus;
use crate::remotecluster::resolver::Resolver;
use crate::util::resource::is_sync_enabled;

/// Watches cluster-registration secrets on the main cluster and hands their
/// data to the remote-cluster resolver (spec.md §4.4, C12). The secret's own
/// identifier — not its contents — is what the resolver keys clusters by;
/// this handler only decides whether a secret is currently opted in to sync.
pub struct SecretHandler {
    resolver: Arc<Resolver>,
}

impl SecretHandler {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Handler<Secret> for SecretHandler {
    async fn added(&self, ctx: EventContext, key: &str, obj: Arc<Secret>, status_tx: mpsc::Sender<EventProcessStatus>) {
        ctx.instrument(async move {
            let meta = obj.meta().clone();
            if !is_sync_enabled(&meta) {
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            }
            let Some(data) = &obj.data else {
                tracing::warn!(key, "sync-enabled secret carries no data, skipping");
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            };
            self.resolver.admit_secret(&obj.name_any(), data).await;
            EventProcessStatus::completed().send_close(status_tx).await;
        })
        .await
    }

    async fn updated(
        &self,
        ctx: EventContext,
        key: &str,
        old: Arc<Secret>,
        new: Arc<Secret>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    ) {
        ctx.instrument(async move {
            let meta = new.meta().clone();
            let secret_identifier = new.name_any();
            if is_sync_enabled(&meta) {
                let Some(data) = &new.data else {
                    tracing::warn!(key, "sync-enabled secret carries no data, skipping");
                    EventProcessStatus::completed().skip_close(status_tx).await;
                    return;
                };
                self.resolver.admit_secret(&secret_identifier, data).await;
            } else if let Some(data) = &old.data {
                self.resolver.remove_secret(&secret_identifier, data).await;
            }
            EventProcessStatus::completed().send_close(status_tx).await;
        })
        .await
    }

    async fn deleted(&self, ctx: EventContext, _key: &str, obj: Arc<Secret>, status_tx: mpsc::Sender<EventProcessStatus>) {
        ctx.instrument(async move {
            if let Some(data) = &obj.data {
                self.resolver.remove_secret(&obj.name_any(), data).await;
            }
            EventProcessStatus::completed().send_close(status_tx).await;
        })
        .await
    }

    fn on_status(&self, ctx: &EventContext, status: &EventProcessStatus) {
        let _enter = ctx.enter();
        tracing::trace!(tag = status.status.tag(), "secret event status");
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use mesh_types::Dependency;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::cache::IdentityDependencyCache;
use crate::context::EventContext;
use crate::controller::delegator::Handler;
use crate::controller::event_status::EventProcessStatus;
use crate::handler::trafficconfig::TrafficConfigHandler;

/// Maintains the symmetric dependency/dependent edge maps and triggers a
/// traffic-config reconciliation for every destination a `Dependency`
/// resource names (spec.md §4.6, C14).
pub struct DependencyHandler {
    dependencies: Arc<IdentityDependencyCache>,
    trafficconfig: Arc<TrafficConfigHandler>,
}

impl DependencyHandler {
    pub fn new(dependencies: Arc<IdentityDependencyCache>, trafficconfig: Arc<TrafficConfigHandler>) -> Self {
        Self {
            dependencies,
            trafficconfig,
        }
    }
}

#[async_trait]
impl Handler<Dependency> for DependencyHandler {
    async fn added(&self, ctx: EventContext, key: &str, obj: Arc<Dependency>, status_tx: mpsc::Sender<EventProcessStatus>) {
        let span = ctx.span.clone();
        async move {
            let source = obj.spec.source.clone();
            if source.is_empty() {
                tracing::warn!(key, "dependency resource has no source, skipping");
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            }

            for destination in &obj.spec.destinations {
                if destination.is_empty() {
                    continue;
                }
                self.dependencies.add_dependency(&source, destination);
                self.dependencies.add_dependent(destination, &source);
                if mesh_common::options::is_cache_warmed_up() {
                    self.trafficconfig.trigger_for_identity(&ctx, destination).await;
                }
            }
            EventProcessStatus::completed().send_close(status_tx).await;
        }
        .instrument(span)
        .await
    }

    async fn updated(
        &self,
        ctx: EventContext,
        key: &str,
        old: Arc<Dependency>,
        new: Arc<Dependency>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    ) {
        let span = ctx.span.clone();
        async move {
            let source = new.spec.source.clone();
            if source.is_empty() {
                tracing::warn!(key, "dependency resource has no source, skipping");
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            }

            let old_destinations: std::collections::HashSet<&String> =
                if old.spec.source == source { old.spec.destinations.iter().collect() } else { Default::default() };

            for destination in &new.spec.destinations {
                if destination.is_empty() {
                    continue;
                }
                self.dependencies.add_dependency(&source, destination);
                self.dependencies.add_dependent(destination, &source);
                if !old_destinations.contains(destination) && mesh_common::options::is_cache_warmed_up() {
                    self.trafficconfig.trigger_for_identity(&ctx, destination).await;
                }
            }
            EventProcessStatus::completed().send_close(status_tx).await;
        }
        .instrument(span)
        .await
    }

    /// Open question (spec.md §9): deletion leaves the dependency/dependent
    /// edge maps untouched. Preserved verbatim — matches
    /// `IdentityClusterCache::delete_cluster_from_identity`'s own stance on
    /// not pruning derived state on delete.
    async fn deleted(&self, ctx: EventContext, _key: &str, _obj: Arc<Dependency>, status_tx: mpsc::Sender<EventProcessStatus>) {
        ctx.instrument(async move { EventProcessStatus::completed().skip_close(status_tx).await }).await
    }

    fn on_status(&self, ctx: &EventContext, status: &EventProcessStatus) {
        let _enter = ctx.enter();
        tracing::trace!(tag = status.status.tag(), "dependency event status");
    }
}

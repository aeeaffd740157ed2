use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use mesh_types::Rollout;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::cache::{IdentityClusterCache, ServiceCache, WorkloadCache};
use crate::context::EventContext;
use crate::controller::delegator::Handler;
use crate::controller::event_status::{EventProcessStatus, EventStatus, Terminal};
use crate::handler::trafficconfig::TrafficConfigHandler;
use crate::util::resource::{derive_identity_env, should_skip_workload, HasPodTemplate};

/// Shared `Deployment`/`Rollout` handler (spec.md §4.5: "Per-kind handlers
/// ... implement the handler contract"). One instance per (cluster,
/// resource-kind) pair, wired by the remote-cluster resolver.
pub struct WorkloadHandler<T> {
    cluster_id: String,
    cache: Arc<WorkloadCache<T>>,
    identity_clusters: Arc<IdentityClusterCache>,
    trafficconfig: Arc<TrafficConfigHandler>,
}

pub type DeploymentHandler = WorkloadHandler<Deployment>;
pub type RolloutHandler = WorkloadHandler<Rollout>;

impl<T> WorkloadHandler<T> {
    pub fn new(
        cluster_id: impl Into<String>,
        cache: Arc<WorkloadCache<T>>,
        identity_clusters: Arc<IdentityClusterCache>,
        trafficconfig: Arc<TrafficConfigHandler>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            cache,
            identity_clusters,
            trafficconfig,
        }
    }
}

#[async_trait]
impl<T> Handler<T> for WorkloadHandler<T>
where
    T: HasPodTemplate + ResourceExt + Clone + Send + Sync + 'static,
{
    async fn added(&self, ctx: EventContext, key: &str, obj: Arc<T>, status_tx: mpsc::Sender<EventProcessStatus>) {
        let span = ctx.span.clone();
        async move {
            if should_skip_workload(obj.as_ref()) {
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            }
            let (identity, _env) = derive_identity_env(obj.as_ref());
            if identity.is_empty() {
                tracing::warn!(key, "empty workload identity, aborting");
                EventProcessStatus::completed()
                    .with_status(EventStatus::Terminal(Terminal::Failure))
                    .send_close(status_tx)
                    .await;
                return;
            }

            self.identity_clusters.add_cluster_to_identity(&identity, &self.cluster_id);
            self.cache.add(&self.cluster_id, (*obj).clone());

            if mesh_common::options::is_cache_warmed_up() {
                self.trafficconfig.trigger_for_identity(&ctx, &identity).await;
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
        old: Arc<T>,
        new: Arc<T>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    ) {
        let span = ctx.span.clone();
        async move {
            if should_skip_workload(new.as_ref()) {
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            }
            let (new_identity, _) = derive_identity_env(new.as_ref());
            if new_identity.is_empty() {
                tracing::warn!(key, "empty workload identity on update, aborting");
                EventProcessStatus::completed()
                    .with_status(EventStatus::Terminal(Terminal::Failure))
                    .send_close(status_tx)
                    .await;
                return;
            }

            let (old_identity, _) = derive_identity_env(old.as_ref());
            if !old_identity.is_empty() && old_identity != new_identity {
                self.cache.delete(&self.cluster_id, &old);
            }
            self.cache.add(&self.cluster_id, (*new).clone());
            self.identity_clusters.add_cluster_to_identity(&new_identity, &self.cluster_id);

            EventProcessStatus::completed().send_close(status_tx).await;
        }
        .instrument(span)
        .await
    }

    async fn deleted(&self, ctx: EventContext, _key: &str, obj: Arc<T>, status_tx: mpsc::Sender<EventProcessStatus>) {
        ctx.instrument(async move {
            self.cache.delete(&self.cluster_id, &obj);
            EventProcessStatus::completed().send_close(status_tx).await;
        })
        .await
    }

    fn on_status(&self, ctx: &EventContext, status: &EventProcessStatus) {
        let _enter = ctx.enter();
        tracing::trace!(tag = status.status.tag(), "workload event status");
    }
}

/// `Service` has no pod template, so it skips identity/env derivation and
/// the traffic-config trigger entirely (spec.md §4.5: "The service handler
/// is simpler").
pub struct ServiceHandler {
    cluster_id: String,
    cache: Arc<ServiceCache>,
}

impl ServiceHandler {
    pub fn new(cluster_id: impl Into<String>, cache: Arc<ServiceCache>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            cache,
        }
    }
}

#[async_trait]
impl Handler<Service> for ServiceHandler {
    async fn added(&self, ctx: EventContext, _key: &str, obj: Arc<Service>, status_tx: mpsc::Sender<EventProcessStatus>) {
        ctx.instrument(async move {
            self.cache.add(&self.cluster_id, (*obj).clone());
            EventProcessStatus::completed().send_close(status_tx).await;
        })
        .await
    }

    async fn updated(
        &self,
        ctx: EventContext,
        _key: &str,
        _old: Arc<Service>,
        new: Arc<Service>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    ) {
        ctx.instrument(async move {
            self.cache.add(&self.cluster_id, (*new).clone());
            EventProcessStatus::completed().send_close(status_tx).await;
        })
        .await
    }

    async fn deleted(&self, ctx: EventContext, _key: &str, obj: Arc<Service>, status_tx: mpsc::Sender<EventProcessStatus>) {
        ctx.instrument(async move {
            self.cache.delete(&self.cluster_id, &obj);
            EventProcessStatus::completed().send_close(status_tx).await;
        })
        .await
    }

    fn on_status(&self, ctx: &EventContext, status: &EventProcessStatus) {
        let _enter = ctx.enter();
        tracing::trace!(tag = status.status.tag(), "service event status");
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use mesh_types::TrafficConfig;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::cache::{IdentityDependencyCache, TrafficConfigCache};
use crate::context::EventContext;
use crate::controller::delegator::Handler;
use crate::controller::event_status::EventProcessStatus;
use crate::gate::ReadOnlyGate;
use crate::reconcile::{FeatureReconciler, ReconcileEventKind, ReconcileRequest};
use crate::util::resource::{get_traffic_config_identity, is_marked_disabled, is_resource_ignored};

/// Owns the traffic-config cache and fans reconciliation out to the
/// configured feature reconcilers (spec.md §4.7, C15).
pub struct TrafficConfigHandler {
    cache: Arc<TrafficConfigCache>,
    dependencies: Arc<IdentityDependencyCache>,
    gate: Arc<dyn ReadOnlyGate>,
    reconcilers: Vec<Arc<dyn FeatureReconciler>>,
}

impl TrafficConfigHandler {
    pub fn new(
        cache: Arc<TrafficConfigCache>,
        dependencies: Arc<IdentityDependencyCache>,
        gate: Arc<dyn ReadOnlyGate>,
        reconcilers: Vec<Arc<dyn FeatureReconciler>>,
    ) -> Self {
        Self {
            cache,
            dependencies,
            gate,
            reconcilers,
        }
    }

    fn reconcile_identity(
        &self,
        ctx: &EventContext,
        identity: &str,
        kind: ReconcileEventKind,
        source_identity: Option<String>,
    ) {
        if self.gate.is_read_only() {
            tracing::info!(identity, "read-only gate active, skipping feature reconcilers");
            return;
        }
        if !mesh_common::options::is_cache_warmed_up() {
            tracing::debug!(identity, "cache not warmed up yet, skipping feature reconcilers");
            return;
        }
        for (env, entry) in self.cache.get_all_envs(identity) {
            let request = ReconcileRequest {
                identity: identity.to_string(),
                env,
                kind,
                route_view: Some(entry.route_view.clone()),
                source_identity: source_identity.clone(),
            };
            let child_ctx = ctx.child();
            for reconciler in &self.reconcilers {
                reconciler.reconcile(&child_ctx, &request);
            }
        }
    }

    /// Public reconciliation fan-out (spec.md §4.7, `TriggerForIdentity`):
    /// the identity's own traffic config, then every identity that depends
    /// on it, each narrowed to `identity` via `source_identity`.
    pub async fn trigger_for_identity(&self, ctx: &EventContext, identity: &str) {
        self.reconcile_identity(ctx, identity, ReconcileEventKind::Update, None);
        for dependent in self.dependencies.get_dependents_for_identity(identity) {
            self.reconcile_identity(ctx, &dependent, ReconcileEventKind::Update, Some(identity.to_string()));
        }
    }

    async fn upsert(
        &self,
        ctx: EventContext,
        policy: TrafficConfig,
        status_tx: mpsc::Sender<EventProcessStatus>,
        kind: ReconcileEventKind,
    ) {
        let span = ctx.span.clone();
        async move {
            let meta = policy.meta().clone();
            if is_marked_disabled(&meta) || is_resource_ignored(&meta) {
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            }
            let identity = get_traffic_config_identity(&meta);
            self.cache.add_traffic_config_to_cache(policy);
            if identity.is_empty() {
                EventProcessStatus::completed().send_close(status_tx).await;
                return;
            }
            self.reconcile_identity(&ctx, &identity, kind, None);
            EventProcessStatus::completed().send_close(status_tx).await;
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl Handler<TrafficConfig> for TrafficConfigHandler {
    async fn added(&self, ctx: EventContext, _key: &str, obj: Arc<TrafficConfig>, status_tx: mpsc::Sender<EventProcessStatus>) {
        self.upsert(ctx, (*obj).clone(), status_tx, ReconcileEventKind::Add).await;
    }

    async fn updated(
        &self,
        ctx: EventContext,
        _key: &str,
        _old: Arc<TrafficConfig>,
        new: Arc<TrafficConfig>,
        status_tx: mpsc::Sender<EventProcessStatus>,
    ) {
        self.upsert(ctx, (*new).clone(), status_tx, ReconcileEventKind::Update).await;
    }

    async fn deleted(&self, ctx: EventContext, _key: &str, obj: Arc<TrafficConfig>, status_tx: mpsc::Sender<EventProcessStatus>) {
        let span = ctx.span.clone();
        async move {
            let meta = obj.meta().clone();
            let identity = get_traffic_config_identity(&meta);
            let env = crate::util::resource::label_or_annotation(&meta, &mesh_common::options::get().args.env_key)
                .unwrap_or_default();
            if !identity.is_empty() && !env.is_empty() {
                self.cache.delete(&identity, &env, &obj.name_any());
            }
            if !identity.is_empty() {
                self.reconcile_identity(&ctx, &identity, ReconcileEventKind::Delete, None);
            }
            EventProcessStatus::completed().send_close(status_tx).await;
        }
        .instrument(span)
        .await
    }

    fn on_status(&self, ctx: &EventContext, status: &EventProcessStatus) {
        let _enter = ctx.enter();
        tracing::trace!(tag = status.status.tag(), "traffic-config event status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use mesh_types::TrafficConfigSpec;
    use std::collections::BTreeMap as Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReconciler(Arc<AtomicUsize>);
    impl FeatureReconciler for CountingReconciler {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn reconcile(&self, _ctx: &EventContext, _request: &ReconcileRequest) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct AlwaysReadOnly;
    impl ReadOnlyGate for AlwaysReadOnly {
        fn is_read_only(&self) -> bool {
            true
        }
    }

    fn init_opts() {
        use clap::Parser;
        mesh_common::options::init(mesh_common::options::CliArgs::parse_from(["naavik"]));
    }

    fn policy(name: &str, identity: &str, env: &str) -> TrafficConfig {
        let mut labels = Map::new();
        labels.insert("asset".to_string(), identity.to_string());
        labels.insert("admiral.io/env".to_string(), env.to_string());
        TrafficConfig {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("admiral".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: TrafficConfigSpec {
                workload_env: vec![env.to_string()],
                ..Default::default()
            },
        }
    }

    /// Invariants 9 & 10: the cache is kept current regardless of the
    /// read-only gate or cache warm-up state, but reconcilers are only
    /// invoked once both the gate is open and the cache is warmed up. A
    /// freshly-initialized process is never warmed up (default
    /// `cache_refresh_interval_secs=60`), so this also covers invariant 10
    /// without needing to sleep real wall-clock time in a test.
    #[tokio::test]
    async fn read_only_and_warm_up_gates_suppress_reconcilers_but_not_cache_writes() {
        init_opts();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(TrafficConfigCache::new());
        let dependencies = Arc::new(IdentityDependencyCache::new());
        let handler = TrafficConfigHandler::new(
            cache.clone(),
            dependencies,
            Arc::new(AlwaysReadOnly),
            vec![Arc::new(CountingReconciler(calls.clone()))],
        );

        let (tx, mut rx) = mpsc::channel(5);
        handler
            .added(EventContext::new(), "admiral/p1", Arc::new(policy("p1", "svc-a", "qa")), tx)
            .await;
        while rx.recv().await.is_some() {}

        assert!(cache.get("svc-a", "qa").is_some(), "cache must stay current under the gates");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "reconcilers must not run while read-only/not warmed up");
    }
}

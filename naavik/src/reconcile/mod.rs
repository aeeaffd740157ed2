//! Feature reconcilers: external collaborators that materialize a traffic
//! config policy into cluster artifacts (spec.md §1: "explicitly out of
//! scope: the mesh-artifact construction"). Only the trait surface the
//! traffic-config handler (C15) calls through is modeled here.

use std::sync::Arc;

use mesh_types::ServiceRouteConfig;

use crate::context::EventContext;

pub const THROTTLE_FILTER: &str = "throttle-filter";
pub const VIRTUAL_SERVICE: &str = "virtual-service";

/// The full recognized feature set (spec.md §4.7): `--disabled_features`
/// names a subset of these to suppress.
pub const ALL_FEATURES: &[&str] = &[THROTTLE_FILTER, VIRTUAL_SERVICE];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileEventKind {
    Add,
    Update,
    Delete,
}

/// One reconciliation request: an identity/env's route view, the event that
/// triggered it, and (for dependent fan-out, spec.md §4.7) the identity whose
/// own change caused this call, letting the reconciler narrow work to only
/// that identity's cluster.
pub struct ReconcileRequest {
    pub identity: String,
    pub env: String,
    pub kind: ReconcileEventKind,
    pub route_view: Option<ServiceRouteConfig>,
    pub source_identity: Option<String>,
}

/// A feature that materializes `ServiceRouteConfig`s into live cluster state
/// (envoy filters, virtual services, ...). Implementations are entirely
/// external to this fabric; the stub below exists so the traffic-config
/// handler has something to call in a standalone build.
pub trait FeatureReconciler: Send + Sync {
    fn name(&self) -> &'static str;
    fn reconcile(&self, ctx: &EventContext, request: &ReconcileRequest);
}

/// Logs and does nothing else — the default wiring for every feature this
/// fabric doesn't implement itself.
pub struct NoOpFeatureReconciler(pub &'static str);

impl FeatureReconciler for NoOpFeatureReconciler {
    fn name(&self) -> &'static str {
        self.0
    }

    fn reconcile(&self, ctx: &EventContext, request: &ReconcileRequest) {
        let _enter = ctx.enter();
        tracing::debug!(
            feature = self.0,
            identity = %request.identity,
            env = %request.env,
            "no-op reconciler invoked"
        );
    }
}

/// The feature reconcilers enabled for this process, filtered by
/// `--disabled_features` at construction time (spec.md §4.7).
pub fn enabled_reconcilers() -> Vec<Arc<dyn FeatureReconciler>> {
    ALL_FEATURES
        .iter()
        .filter(|name| mesh_common::options::is_feature_enabled(name))
        .map(|name| Arc::new(NoOpFeatureReconciler(name)) as Arc<dyn FeatureReconciler>)
        .collect()
}

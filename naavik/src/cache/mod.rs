//! The cross-indexed in-memory cache layer (spec.md §4.1, C4) plus the
//! controller registry (C5) — both process-scoped singletons, wired up in
//! [`Caches`] and published once from [`crate::bootstrap`].

pub mod controller_registry;
pub mod identity_cluster;
pub mod identity_dependency;
pub mod service;
pub mod traffic_config;
pub mod workload;

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use mesh_types::Rollout;

pub use controller_registry::{ControllerHandle, ControllerRegistry};
pub use identity_cluster::IdentityClusterCache;
pub use identity_dependency::IdentityDependencyCache;
pub use service::{ServiceCache, ServiceItem};
pub use traffic_config::{TrafficConfigCache, TrafficConfigEntry};
pub use workload::{WorkloadCache, WorkloadItem};

pub type DeploymentCache = WorkloadCache<Deployment>;
pub type RolloutCache = WorkloadCache<Rollout>;

/// Every process-singleton cache the handlers and HTTP API read/write. Each
/// field is independently `Arc`-wrapped so a handler or controller can hold
/// onto just the one cache it needs instead of the whole bundle (spec.md
/// §4.1, C4).
pub struct Caches {
    pub deployments: Arc<DeploymentCache>,
    pub rollouts: Arc<RolloutCache>,
    pub services: Arc<ServiceCache>,
    pub identity_clusters: Arc<IdentityClusterCache>,
    pub identity_dependencies: Arc<IdentityDependencyCache>,
    pub traffic_configs: Arc<TrafficConfigCache>,
    pub controllers: Arc<ControllerRegistry>,
}

impl Default for Caches {
    fn default() -> Self {
        Self {
            deployments: Arc::new(DeploymentCache::new()),
            rollouts: Arc::new(RolloutCache::new()),
            services: Arc::new(ServiceCache::new()),
            identity_clusters: Arc::new(IdentityClusterCache::new()),
            identity_dependencies: Arc::new(IdentityDependencyCache::new()),
            traffic_configs: Arc::new(TrafficConfigCache::new()),
            controllers: Arc::new(ControllerRegistry::new()),
        }
    }
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }
}

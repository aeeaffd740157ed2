use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Api;
use kube::runtime::watcher;
use mesh_types::Rollout;

use crate::cache::Caches;
use crate::clients::{CredentialResolver, load_client_bundle};
use crate::controller::{Controller, ControllerConfig};
use crate::executor::AsyncKeyExecutor;
use crate::handler::{DeploymentHandler, RolloutHandler, ServiceHandler, TrafficConfigHandler};
use crate::remotecluster::types::{RemoteCluster, RemoteClusterRegistry};

/// Prefix the main-cluster controllers are registered under — the resolver
/// must never stop these when tearing down a remote cluster (spec.md §4.4:
/// "secret/dependency/trafficconfig controllers always run on the main
/// cluster").
const MAIN_CLUSTER_CONTROLLER_PREFIXES: [&str; 3] = ["secret-controller", "dependency-controller", "trafficconfig-controller"];

fn deployment_controller_name(cluster_id: &str) -> String {
    format!("deployment-controller/{cluster_id}")
}

fn rollout_controller_name(cluster_id: &str) -> String {
    format!("rollout-controller/{cluster_id}")
}

fn service_controller_name(cluster_id: &str) -> String {
    format!("service-controller/{cluster_id}")
}

/// Turns cluster-registration secrets into live `RemoteCluster`s with running
/// controllers, and tears them down again when a secret is removed or its
/// sync opt-out flips (spec.md §4.4, C11).
pub struct Resolver {
    clusters: Arc<RemoteClusterRegistry>,
    caches: Arc<Caches>,
    credential_resolver: Arc<dyn CredentialResolver>,
    trafficconfig_handler: Arc<TrafficConfigHandler>,
}

impl Resolver {
    pub fn new(
        clusters: Arc<RemoteClusterRegistry>,
        caches: Arc<Caches>,
        credential_resolver: Arc<dyn CredentialResolver>,
        trafficconfig_handler: Arc<TrafficConfigHandler>,
    ) -> Self {
        Self {
            clusters,
            caches,
            credential_resolver,
            trafficconfig_handler,
        }
    }

    /// Admits every `(clusterId, kubeconfigBytes)` entry in a sync-enabled
    /// secret (spec.md §4.4). Each cluster id not yet known to the registry,
    /// or known under a different secret identifier, is resolved and started;
    /// conflicting or already-present entries are logged and skipped.
    pub async fn admit_secret(&self, secret_identifier: &str, data: &BTreeMap<String, ByteString>) {
        for (cluster_id, raw) in data {
            self.admit_cluster(secret_identifier, cluster_id, &raw.0).await;
        }
    }

    async fn admit_cluster(&self, secret_identifier: &str, cluster_id: &str, raw: &[u8]) {
        if !mesh_common::options::is_cluster_in_allowed_scope(cluster_id) {
            tracing::debug!(cluster_id, "cluster outside allowed scope, skipping");
            return;
        }

        match self.clusters.secret_identifier_for(cluster_id) {
            Some(existing) if existing == secret_identifier => {
                tracing::debug!(cluster_id, secret_identifier, "cluster already registered under this secret");
                return;
            }
            Some(existing) => {
                tracing::warn!(
                    cluster_id,
                    existing_secret = existing,
                    incoming_secret = secret_identifier,
                    "cluster already registered under a different secret, skipping"
                );
                return;
            }
            None => {}
        }

        let credentials = match self.credential_resolver.resolve(secret_identifier, raw) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(cluster_id, error = %err, "failed to resolve cluster credentials");
                return;
            }
        };

        let (clients, context_name, host) = match load_client_bundle(&credentials).await {
            Ok(bundle) => bundle,
            Err(err) => {
                tracing::warn!(cluster_id, error = %err, "failed to build client bundle for cluster");
                return;
            }
        };

        let cluster = Arc::new(RemoteCluster {
            cluster_id: cluster_id.to_string(),
            context_name,
            secret_identifier: secret_identifier.to_string(),
            host,
            clients,
        });
        self.clusters.insert(cluster.clone());
        self.start_cluster_controllers(&cluster);
    }

    /// Starts the per-cluster Service/Deployment/Rollout controllers, each
    /// with its own [`AsyncKeyExecutor`] sized by `--async_executor_max_goroutines`
    /// (spec.md §4.3: "per key, per controller" ordering requires separate
    /// executor instances so kinds never collide on the same key).
    fn start_cluster_controllers(&self, cluster: &Arc<RemoteCluster>) {
        let cluster_id = cluster.cluster_id.clone();
        let concurrency = mesh_common::options::get().args.worker_concurrency;
        let max_goroutines = mesh_common::options::get().args.async_executor_max_goroutines.max(1) as usize;

        let service_api: Api<Service> = Api::all(cluster.clients.k8s.clone());
        Controller::new(
            ControllerConfig {
                name: service_controller_name(&cluster_id),
                concurrency,
                api: service_api,
                watcher_config: watcher::Config::default(),
                async_executor: Some(Arc::new(AsyncKeyExecutor::new(max_goroutines))),
            },
            Arc::new(ServiceHandler::new(cluster_id.clone(), self.caches.services.clone())),
            self.caches.controllers.clone(),
        )
        .start();

        let deployment_api: Api<Deployment> = Api::all(cluster.clients.k8s.clone());
        Controller::new(
            ControllerConfig {
                name: deployment_controller_name(&cluster_id),
                concurrency,
                api: deployment_api,
                watcher_config: watcher::Config::default(),
                async_executor: Some(Arc::new(AsyncKeyExecutor::new(max_goroutines))),
            },
            Arc::new(DeploymentHandler::new(
                cluster_id.clone(),
                self.caches.deployments.clone(),
                self.caches.identity_clusters.clone(),
                self.trafficconfig_handler.clone(),
            )),
            self.caches.controllers.clone(),
        )
        .start();

        if mesh_common::options::get().args.argo_rollouts_enabled {
            let rollout_api: Api<Rollout> = Api::all(cluster.clients.argo.clone());
            Controller::new(
                ControllerConfig {
                    name: rollout_controller_name(&cluster_id),
                    concurrency,
                    api: rollout_api,
                    watcher_config: watcher::Config::default(),
                    async_executor: Some(Arc::new(AsyncKeyExecutor::new(max_goroutines))),
                },
                Arc::new(RolloutHandler::new(
                    cluster_id.clone(),
                    self.caches.rollouts.clone(),
                    self.caches.identity_clusters.clone(),
                    self.trafficconfig_handler.clone(),
                )),
                self.caches.controllers.clone(),
            )
            .start();
        }
    }

    /// Removes every cluster id named in a secret that was sync-disabled or
    /// deleted (spec.md §4.4).
    pub async fn remove_secret(&self, secret_identifier: &str, data: &BTreeMap<String, ByteString>) {
        for cluster_id in data.keys() {
            self.remove_cluster(secret_identifier, cluster_id).await;
        }
    }

    async fn remove_cluster(&self, secret_identifier: &str, cluster_id: &str) {
        match self.clusters.secret_identifier_for(cluster_id) {
            Some(existing) if existing == secret_identifier => {}
            _ => return,
        }
        self.stop_cluster_controllers(cluster_id).await;
        self.clusters.remove(cluster_id);
    }

    /// Stops every controller registered for `cluster_id`, excluding the
    /// fixed main-cluster controllers (spec.md §4.4 invariant).
    async fn stop_cluster_controllers(&self, cluster_id: &str) {
        for name in self.caches.controllers.list_matching(cluster_id) {
            if MAIN_CLUSTER_CONTROLLER_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix))
            {
                continue;
            }
            let Some(handle) = self.caches.controllers.deregister(&name) else {
                continue;
            };
            handle.stop.cancel();
            for worker_cancel in &handle.worker_cancels {
                worker_cancel.cancelled().await;
            }
        }
    }
}

use std::collections::HashMap;

use kube::ResourceExt;
use parking_lot::RwLock;

use crate::normalize;
use crate::util::resource::{HasPodTemplate, derive_identity_env};

/// One cached workload: the resource itself plus the cluster it was
/// observed on (spec.md §3, `DeploymentEntry`/`RolloutEntry`'s `item`).
#[derive(Clone, Debug)]
pub struct WorkloadItem<T> {
    pub resource: T,
    pub cluster_id: String,
}

/// Cross-indexed `clusterId -> identity -> env -> item` cache shared by the
/// deployment and rollout handlers (spec.md §4.1, "Deployments / Rollouts
/// (symmetric)"). Both `naavik::cache::DeploymentCache` and `RolloutCache`
/// are instantiations of this generic type.
pub struct WorkloadCache<T> {
    data: RwLock<HashMap<String, HashMap<String, HashMap<String, WorkloadItem<T>>>>>,
}

impl<T> Default for WorkloadCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + HasPodTemplate + ResourceExt> WorkloadCache<T> {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Derives `(identity, env)` off the resource's pod template and inserts
    /// it; a no-op if either is empty.
    pub fn add(&self, cluster_id: &str, resource: T) {
        let (identity, env) = derive_identity_env(&resource);
        if identity.is_empty() || env.is_empty() {
            return;
        }
        let cluster_id = normalize(cluster_id);
        let identity = normalize(&identity);
        let env = normalize(&env);
        let item = WorkloadItem {
            resource,
            cluster_id: cluster_id.clone(),
        };
        let mut data = self.data.write();
        data.entry(cluster_id)
            .or_default()
            .entry(identity)
            .or_default()
            .insert(env, item);
    }

    /// Mirrors `add`'s key derivation and prunes any sub-maps left empty.
    pub fn delete(&self, cluster_id: &str, resource: &T) {
        let (identity, env) = derive_identity_env(resource);
        if identity.is_empty() || env.is_empty() {
            return;
        }
        let cluster_id = normalize(cluster_id);
        let identity = normalize(&identity);
        let env = normalize(&env);

        let mut data = self.data.write();
        if let Some(by_identity) = data.get_mut(&cluster_id) {
            if let Some(by_env) = by_identity.get_mut(&identity) {
                by_env.remove(&env);
                if by_env.is_empty() {
                    by_identity.remove(&identity);
                }
            }
            if by_identity.is_empty() {
                data.remove(&cluster_id);
            }
        }
    }

    pub fn get_by_cluster_identity_env(
        &self,
        cluster_id: &str,
        identity: &str,
        env: &str,
    ) -> Option<WorkloadItem<T>> {
        let data = self.data.read();
        data.get(&normalize(cluster_id))?
            .get(&normalize(identity))?
            .get(&normalize(env))
            .cloned()
    }

    pub fn get_by_cluster_identity(
        &self,
        cluster_id: &str,
        identity: &str,
    ) -> HashMap<String, WorkloadItem<T>> {
        self.data
            .read()
            .get(&normalize(cluster_id))
            .and_then(|by_identity| by_identity.get(&normalize(identity)))
            .cloned()
            .unwrap_or_default()
    }

    /// Walks every cluster, returning per-cluster env maps for `identity`.
    pub fn get_by_identity(
        &self,
        identity: &str,
    ) -> HashMap<String, HashMap<String, WorkloadItem<T>>> {
        let identity = normalize(identity);
        let data = self.data.read();
        let mut out = HashMap::new();
        for (cluster_id, by_identity) in data.iter() {
            if let Some(by_env) = by_identity.get(&identity) {
                out.insert(cluster_id.clone(), by_env.clone());
            }
        }
        out
    }

    pub fn count(&self) -> usize {
        self.data
            .read()
            .values()
            .flat_map(|by_identity| by_identity.values())
            .map(|by_env| by_env.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use std::collections::BTreeMap;

    fn init_opts() {
        use clap::Parser;
        mesh_common::options::init(mesh_common::options::CliArgs::parse_from(["naavik"]));
    }

    fn deployment(name: &str, namespace: &str, identity: &str, env: &str) -> Deployment {
        let mut labels = BTreeMap::new();
        labels.insert(
            "alpha.istio.io/identity".to_string(),
            identity.to_string(),
        );
        labels.insert("admiral.io/env".to_string(), env.to_string());
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector::default(),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: None,
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn add_get_delete_round_trip() {
        init_opts();
        let cache: WorkloadCache<Deployment> = WorkloadCache::new();
        let dep = deployment("web", "team-qa", "web-svc", "qa");
        cache.add("Cluster-1", dep.clone());

        let got = cache
            .get_by_cluster_identity_env("cluster-1", "WEB-SVC", "QA")
            .expect("present under any case");
        assert_eq!(got.cluster_id, "cluster-1");

        cache.delete("cluster-1", &dep);
        assert!(cache.get_by_cluster_identity_env("cluster-1", "web-svc", "qa").is_none());
        assert!(cache.get_by_cluster_identity("cluster-1", "web-svc").is_empty());
    }

    #[test]
    fn count_and_get_by_identity_span_clusters() {
        init_opts();
        let cache: WorkloadCache<Deployment> = WorkloadCache::new();
        cache.add("c1", deployment("a", "ns-qa", "svc", "qa"));
        cache.add("c2", deployment("b", "ns-e2e", "svc", "e2e"));
        assert_eq!(cache.count(), 2);
        let by_identity = cache.get_by_identity("svc");
        assert_eq!(by_identity.len(), 2);
    }

    #[test]
    fn empty_identity_is_a_no_op() {
        init_opts();
        let cache: WorkloadCache<Deployment> = WorkloadCache::new();
        let mut dep = deployment("a", "ns", "", "qa");
        dep.spec.as_mut().unwrap().template.metadata = Some(ObjectMeta::default());
        cache.add("c1", dep);
        assert_eq!(cache.count(), 0);
    }
}

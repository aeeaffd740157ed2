use std::collections::HashMap;

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use parking_lot::RwLock;

use crate::normalize;

#[derive(Clone, Debug)]
pub struct ServiceItem {
    pub service: Service,
    pub cluster_id: String,
}

/// `clusterId -> namespace -> svcName -> item` cache (spec.md §3,
/// `ServiceEntry`).
pub struct ServiceCache {
    data: RwLock<HashMap<String, HashMap<String, HashMap<String, ServiceItem>>>>,
}

impl Default for ServiceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCache {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, cluster_id: &str, resource: Service) {
        let Some(namespace) = resource.namespace() else {
            return;
        };
        let Some(name) = resource.meta().name.clone() else {
            return;
        };
        let cluster_id = normalize(cluster_id);
        let namespace = normalize(&namespace);
        let name = normalize(&name);
        let item = ServiceItem {
            service: resource,
            cluster_id: cluster_id.clone(),
        };
        self.data
            .write()
            .entry(cluster_id)
            .or_default()
            .entry(namespace)
            .or_default()
            .insert(name, item);
    }

    pub fn delete(&self, cluster_id: &str, resource: &Service) {
        let Some(namespace) = resource.namespace() else {
            return;
        };
        let Some(name) = resource.meta().name.clone() else {
            return;
        };
        let cluster_id = normalize(cluster_id);
        let namespace = normalize(&namespace);
        let name = normalize(&name);

        let mut data = self.data.write();
        if let Some(by_namespace) = data.get_mut(&cluster_id) {
            if let Some(by_name) = by_namespace.get_mut(&namespace) {
                by_name.remove(&name);
                if by_name.is_empty() {
                    by_namespace.remove(&namespace);
                }
            }
            if by_namespace.is_empty() {
                data.remove(&cluster_id);
            }
        }
    }

    /// Deep copy of the entire `namespace` entry for `cluster_id`.
    pub fn get_by_cluster_namespace(
        &self,
        cluster_id: &str,
        namespace: &str,
    ) -> HashMap<String, ServiceItem> {
        self.data
            .read()
            .get(&normalize(cluster_id))
            .and_then(|by_namespace| by_namespace.get(&normalize(namespace)))
            .cloned()
            .unwrap_or_default()
    }

    /// Walks every cluster, returning each cluster's entry for `namespace`.
    pub fn get_by_namespace(&self, namespace: &str) -> HashMap<String, HashMap<String, ServiceItem>> {
        let namespace = normalize(namespace);
        let data = self.data.read();
        let mut out = HashMap::new();
        for (cluster_id, by_namespace) in data.iter() {
            if let Some(by_name) = by_namespace.get(&namespace) {
                out.insert(cluster_id.clone(), by_name.clone());
            }
        }
        out
    }

    pub fn count(&self) -> usize {
        self.data
            .read()
            .values()
            .flat_map(|by_namespace| by_namespace.values())
            .map(|by_name| by_name.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn svc(name: &str, namespace: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: None,
            status: None,
        }
    }

    #[test]
    fn add_get_delete_case_insensitive() {
        let cache = ServiceCache::new();
        cache.add("Cluster1", svc("Web", "Team-Qa"));
        let ns = cache.get_by_cluster_namespace("cluster1", "team-qa");
        assert_eq!(ns.len(), 1);
        assert!(ns.contains_key("web"));

        cache.delete("CLUSTER1", &svc("WEB", "TEAM-QA"));
        assert!(cache.get_by_cluster_namespace("cluster1", "team-qa").is_empty());
    }

    #[test]
    fn get_by_namespace_spans_clusters() {
        let cache = ServiceCache::new();
        cache.add("c1", svc("web", "ns"));
        cache.add("c2", svc("api", "ns"));
        assert_eq!(cache.get_by_namespace("ns").len(), 2);
    }
}

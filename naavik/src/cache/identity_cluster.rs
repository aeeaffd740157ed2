use std::collections::HashMap;

use mesh_common::set::Set;
use parking_lot::RwLock;

use crate::normalize;

/// `identity -> set<clusterId>` (spec.md §3, `IdentityCluster`).
#[derive(Default)]
pub struct IdentityClusterCache {
    data: RwLock<HashMap<String, Set<String>>>,
}

impl IdentityClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cluster_to_identity(&self, identity: &str, cluster_id: &str) {
        let identity = normalize(identity);
        let cluster_id = normalize(cluster_id);
        let data = self.data.read();
        if let Some(set) = data.get(&identity) {
            set.add(cluster_id);
            return;
        }
        drop(data);
        let mut data = self.data.write();
        data.entry(identity).or_default().add(cluster_id);
    }

    /// Open question (spec.md §9): does *not* prune the identity entry when
    /// its cluster set becomes empty. Preserved verbatim.
    pub fn delete_cluster_from_identity(&self, identity: &str, cluster_id: &str) {
        let identity = normalize(identity);
        let cluster_id = normalize(cluster_id);
        if let Some(set) = self.data.read().get(&identity) {
            set.delete(&cluster_id);
        }
    }

    pub fn get_clusters_for_identity(&self, identity: &str) -> Vec<String> {
        self.data
            .read()
            .get(&normalize(identity))
            .map(|set| set.items())
            .unwrap_or_default()
    }

    pub fn list_identities(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    pub fn is_cluster_present_in_identity(&self, identity: &str, cluster_id: &str) -> bool {
        self.data
            .read()
            .get(&normalize(identity))
            .map(|set| set.has(&normalize(cluster_id)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_get_is_case_insensitive() {
        let cache = IdentityClusterCache::new();
        cache.add_cluster_to_identity("SVC-A", "Cluster-1");
        assert!(cache.is_cluster_present_in_identity("svc-a", "cluster-1"));
        assert_eq!(cache.get_clusters_for_identity("svc-a"), vec!["cluster-1"]);
    }

    #[test]
    fn emptied_identity_entry_is_retained() {
        let cache = IdentityClusterCache::new();
        cache.add_cluster_to_identity("svc-a", "cluster-1");
        cache.delete_cluster_from_identity("svc-a", "cluster-1");
        assert!(cache.get_clusters_for_identity("svc-a").is_empty());
        assert!(cache.list_identities().contains(&"svc-a".to_string()));
    }
}

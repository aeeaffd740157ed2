use std::collections::{BTreeMap, HashMap};

use kube::ResourceExt;
use mesh_types::{Route, ServiceRouteConfig, TrafficConfig, well_known};
use parking_lot::RwLock;

use crate::normalize;
use crate::util::resource::{get_traffic_config_identity, label_or_annotation};

#[derive(Clone, Debug)]
pub struct TrafficConfigEntry {
    pub policy: TrafficConfig,
    pub route_view: ServiceRouteConfig,
}

/// `identity -> env -> entry` (spec.md §3, `TrafficConfigEntry`; §4.8 for the
/// compact route view).
#[derive(Default)]
pub struct TrafficConfigCache {
    data: RwLock<HashMap<String, HashMap<String, TrafficConfigEntry>>>,
}

fn compact_route_view(identity: &str, policy: &TrafficConfig) -> ServiceRouteConfig {
    let revision = policy
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(well_known::REVISION_NUMBER_KEY))
        .cloned()
        .unwrap_or_default();

    let mut workload_env_revision = BTreeMap::new();
    for env in &policy.spec.workload_env {
        workload_env_revision.insert(env.clone(), revision.clone());
    }

    let routes: Vec<Route> = policy
        .spec
        .edge_service
        .as_ref()
        .map(|edge| {
            edge.routes
                .iter()
                .filter(|r| !r.workload_envs.is_empty())
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    ServiceRouteConfig {
        workload_env_revision,
        service_asset_alias: identity.to_string(),
        routes,
    }
}

impl TrafficConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives `(identity, env)` off the policy's own labels/annotations and
    /// inserts it together with the precomputed route view. A no-op if
    /// either key resolves empty.
    pub fn add_traffic_config_to_cache(&self, policy: TrafficConfig) {
        let meta = policy.meta().clone();
        let identity = get_traffic_config_identity(&meta);
        if identity.is_empty() {
            return;
        }
        let env = label_or_annotation(&meta, &mesh_common::options::get().args.env_key)
            .unwrap_or_default();
        if env.is_empty() {
            return;
        }
        let identity = normalize(&identity);
        let env = normalize(&env);
        let route_view = compact_route_view(&identity, &policy);
        let entry = TrafficConfigEntry { policy, route_view };
        self.data
            .write()
            .entry(identity)
            .or_default()
            .insert(env, entry);
    }

    pub fn get(&self, identity: &str, env: &str) -> Option<TrafficConfigEntry> {
        self.data
            .read()
            .get(&normalize(identity))
            .and_then(|by_env| by_env.get(&normalize(env)))
            .cloned()
    }

    pub fn get_all_envs(&self, identity: &str) -> HashMap<String, TrafficConfigEntry> {
        self.data
            .read()
            .get(&normalize(identity))
            .cloned()
            .unwrap_or_default()
    }

    /// Guarded delete (spec.md invariant 4): ignored unless `policy_name`
    /// matches the name of the currently-cached policy for `(identity,
    /// env)`, so a stale delete can't evict a newer object sharing the env.
    pub fn delete(&self, identity: &str, env: &str, policy_name: &str) {
        let identity = normalize(identity);
        let env = normalize(env);
        let mut data = self.data.write();
        if let Some(by_env) = data.get_mut(&identity) {
            let matches = by_env
                .get(&env)
                .is_some_and(|entry| entry.policy.name_any() == policy_name);
            if matches {
                by_env.remove(&env);
            }
            if by_env.is_empty() {
                data.remove(&identity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use mesh_types::TrafficConfigSpec;
    use std::collections::BTreeMap as Map;

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

    #[test]
    fn guarded_delete_ignores_name_mismatch() {
        init_opts();
        let cache = TrafficConfigCache::new();
        cache.add_traffic_config_to_cache(policy("n1", "svc-a", "qa"));
        assert!(cache.get("svc-a", "qa").is_some());

        cache.delete("svc-a", "qa", "n2");
        assert!(
            cache.get("svc-a", "qa").is_some(),
            "delete with mismatched policy name must not evict"
        );

        cache.delete("svc-a", "qa", "n1");
        assert!(cache.get("svc-a", "qa").is_none());
    }

    #[test]
    fn latest_write_wins() {
        init_opts();
        let cache = TrafficConfigCache::new();
        cache.add_traffic_config_to_cache(policy("n1", "svc-a", "qa"));
        cache.add_traffic_config_to_cache(policy("n2", "svc-a", "qa"));
        let entry = cache.get("svc-a", "qa").unwrap();
        assert_eq!(entry.policy.name_any(), "n2");
    }
}

use std::collections::HashMap;

use mesh_common::set::Set;
use parking_lot::RwLock;

use crate::normalize;

/// Two symmetric edge maps: `identity -> set<dependencyIdentity>` and
/// `identity -> set<dependentIdentity>` (spec.md §3, `IdentityDependency`).
/// Callers are responsible for maintaining the symmetry invariant — adding
/// `A -> B` to the dependency map and `B -> A` to the dependent map — this
/// cache just stores what it is told (spec.md invariant 3).
#[derive(Default)]
pub struct IdentityDependencyCache {
    dependencies: RwLock<HashMap<String, Set<String>>>,
    dependents: RwLock<HashMap<String, Set<String>>>,
}

fn add_edge(map: &RwLock<HashMap<String, Set<String>>>, from: &str, to: &str) {
    let from = normalize(from);
    let to = normalize(to);
    let data = map.read();
    if let Some(set) = data.get(&from) {
        set.add(to);
        return;
    }
    drop(data);
    map.write().entry(from).or_default().add(to);
}

fn delete_edge(map: &RwLock<HashMap<String, Set<String>>>, from: &str, to: &str) {
    let from = normalize(from);
    let to = normalize(to);
    if let Some(set) = map.read().get(&from) {
        set.delete(&to);
    }
}

fn get_edges(map: &RwLock<HashMap<String, Set<String>>>, identity: &str) -> Vec<String> {
    map.read()
        .get(&normalize(identity))
        .map(|set| set.items())
        .unwrap_or_default()
}

impl IdentityDependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dependency(&self, identity: &str, dependency_identity: &str) {
        add_edge(&self.dependencies, identity, dependency_identity);
    }

    pub fn add_dependent(&self, identity: &str, dependent_identity: &str) {
        add_edge(&self.dependents, identity, dependent_identity);
    }

    pub fn delete_dependency(&self, identity: &str, dependency_identity: &str) {
        delete_edge(&self.dependencies, identity, dependency_identity);
    }

    pub fn delete_dependent(&self, identity: &str, dependent_identity: &str) {
        delete_edge(&self.dependents, identity, dependent_identity);
    }

    pub fn get_dependencies_for_identity(&self, identity: &str) -> Vec<String> {
        get_edges(&self.dependencies, identity)
    }

    pub fn get_dependents_for_identity(&self, identity: &str) -> Vec<String> {
        get_edges(&self.dependents, identity)
    }

    /// Visits every `(identity, dependencies)` pair; `f` returning `false`
    /// stops the walk early.
    pub fn ranged_dependencies(&self, mut f: impl FnMut(&str, &[String]) -> bool) {
        let data = self.dependencies.read();
        for (identity, set) in data.iter() {
            let items = set.items();
            if !f(identity, &items) {
                break;
            }
        }
    }

    /// Unique identity count on the dependency side.
    pub fn get_total_dependencies(&self) -> usize {
        self.dependencies.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetry_holds_after_unrelated_inserts() {
        let cache = IdentityDependencyCache::new();
        cache.add_dependency("svc-a", "svc-b");
        cache.add_dependent("svc-b", "svc-a");
        cache.add_dependency("svc-c", "svc-d");

        assert_eq!(cache.get_dependencies_for_identity("SVC-A"), vec!["svc-b"]);
        assert_eq!(cache.get_dependents_for_identity("svc-B"), vec!["svc-a"]);
        assert_eq!(cache.get_total_dependencies(), 2);
    }
}

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::normalize;

/// Registered at controller start, deregistered at stop (spec.md §3,
/// `ControllerHandle`). `stop` cancels the informer/queue loop; each worker
/// gets its own `worker_cancels` entry so shutdown can wait for every worker
/// to actually finish its in-flight item before the entry is removed.
#[derive(Clone)]
pub struct ControllerHandle {
    pub stop: CancellationToken,
    pub worker_cancels: Vec<CancellationToken>,
}

impl ControllerHandle {
    pub fn new(concurrency: usize) -> Self {
        Self {
            stop: CancellationToken::new(),
            worker_cancels: (0..concurrency).map(|_| CancellationToken::new()).collect(),
        }
    }
}

/// Process-singleton named registry of running controllers (spec.md §4.2,
/// C5). Names are matched case-insensitively, mirroring every other cache
/// key in the fabric.
#[derive(Default)]
pub struct ControllerRegistry {
    data: RwLock<HashMap<String, ControllerHandle>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, handle: ControllerHandle) {
        self.data.write().insert(normalize(name), handle);
    }

    pub fn deregister(&self, name: &str) -> Option<ControllerHandle> {
        self.data.write().remove(&normalize(name))
    }

    pub fn get(&self, name: &str) -> Option<ControllerHandle> {
        self.data.read().get(&normalize(name)).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Names of every registered controller whose (case-insensitive) name
    /// contains `needle` — used by the remote-cluster resolver to find all
    /// per-cluster controllers to stop (spec.md §4.4).
    pub fn list_matching(&self, needle: &str) -> Vec<String> {
        let needle = normalize(needle);
        self.data
            .read()
            .keys()
            .filter(|name| name.contains(&needle))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_dedupes_case_insensitively() {
        let registry = ControllerRegistry::new();
        for name in ["controller1", "conTroller2", "controller2", "controller3"] {
            registry.register(name, ControllerHandle::new(1));
        }
        assert_eq!(registry.list().len(), 3);

        registry.deregister("controller1");
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn list_matching_finds_cluster_scoped_controllers() {
        let registry = ControllerRegistry::new();
        registry.register("deployment-controller/cluster-1", ControllerHandle::new(1));
        registry.register("service-controller/cluster-1", ControllerHandle::new(1));
        registry.register("secret-controller/main", ControllerHandle::new(1));
        assert_eq!(registry.list_matching("cluster-1").len(), 2);
    }
}

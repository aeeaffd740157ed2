use std::collections::HashSet;
use std::hash::Hash;
use std::sync::RwLock;

/// Thread-safe generic set, the Rust-native analogue of a hand-rolled
/// `sync.RWMutex`-guarded `map[E]struct{}`. Deliberately minimal: a crate
/// dependency isn't warranted for something this small.
pub struct Set<E: Eq + Hash + Clone> {
    items: RwLock<HashSet<E>>,
}

impl<E: Eq + Hash + Clone> Default for Set<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Eq + Hash + Clone> Set<E> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_items(data: impl IntoIterator<Item = E>) -> Self {
        let set = Self::new();
        for item in data {
            set.add(item);
        }
        set
    }

    pub fn add(&self, item: E) {
        self.items.write().unwrap().insert(item);
    }

    pub fn clear(&self) {
        self.items.write().unwrap().clear();
    }

    /// Returns `true` if the item was present and removed.
    pub fn delete(&self, item: &E) -> bool {
        self.items.write().unwrap().remove(item)
    }

    pub fn has(&self, item: &E) -> bool {
        self.items.read().unwrap().contains(item)
    }

    pub fn items(&self) -> Vec<E> {
        self.items.read().unwrap().iter().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_has_delete() {
        let s: Set<String> = Set::new();
        s.add("a".to_string());
        assert!(s.has(&"a".to_string()));
        assert_eq!(s.size(), 1);
        assert!(s.delete(&"a".to_string()));
        assert!(!s.has(&"a".to_string()));
        assert!(!s.delete(&"a".to_string()));
    }
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use entcache_types::EntityKey;

use crate::entity::Entity;

/// Cross-type identity map: `(type, identifier)` → live instance.
///
/// Mirrors the per-type model stores for single-lookup identity checks.
#[derive(Default)]
pub struct EntityRegistry {
    entries: RwLock<HashMap<EntityKey, Arc<Entity>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, entity: Arc<Entity>) -> Option<Arc<Entity>> {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(entity.key().clone(), entity)
    }

    pub fn get(&self, key: &EntityKey) -> Option<Arc<Entity>> {
        self.entries.read().expect("lock poisoned").get(key).cloned()
    }

    pub fn delete(&self, key: &EntityKey) -> Option<Arc<Entity>> {
        self.entries.write().expect("lock poisoned").remove(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.read().expect("lock poisoned").contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Sorted keys of all registered entities.
    pub fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self
            .entries
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entity_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn put_get_delete() {
        let registry = EntityRegistry::new();
        let key = EntityKey::new("Item", "a");
        let entity = Entity::new(key.clone(), BTreeMap::new());

        assert!(registry.put(entity.clone()).is_none());
        assert!(registry.contains(&key));
        assert!(Arc::ptr_eq(&registry.get(&key).unwrap(), &entity));
        assert_eq!(registry.len(), 1);

        assert!(registry.delete(&key).is_some());
        assert!(registry.is_empty());
        assert!(registry.get(&key).is_none());
    }

    #[test]
    fn keys_are_sorted() {
        let registry = EntityRegistry::new();
        for key in ["User:b", "Item:z", "Item:a"] {
            let key = EntityKey::parse(key).unwrap();
            registry.put(Entity::new(key, BTreeMap::new()));
        }
        let keys: Vec<String> = registry.keys().iter().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["Item:a", "Item:z", "User:b"]);
    }
}

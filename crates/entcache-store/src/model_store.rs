use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use entcache_schema::ModelType;
use entcache_types::Identifier;

use crate::entity::Entity;

/// Owning container for every live instance of one entity type.
pub struct ModelStore {
    model: Arc<ModelType>,
    entities: RwLock<HashMap<Identifier, Arc<Entity>>>,
}

impl ModelStore {
    pub fn new(model: Arc<ModelType>) -> Self {
        Self {
            model,
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    /// Store an instance, returning the one it displaced.
    pub fn put(&self, id: Identifier, entity: Arc<Entity>) -> Option<Arc<Entity>> {
        self.entities
            .write()
            .expect("lock poisoned")
            .insert(id, entity)
    }

    pub fn get(&self, id: &Identifier) -> Option<Arc<Entity>> {
        self.entities.read().expect("lock poisoned").get(id).cloned()
    }

    /// Remove and destroy `instance` if it is the one stored under `id`.
    pub fn delete(&self, id: &Identifier, instance: &Arc<Entity>) -> bool {
        let mut entities = self.entities.write().expect("lock poisoned");
        match entities.get(id) {
            Some(current) if Arc::ptr_eq(current, instance) => {
                entities.remove(id);
                instance.destroy();
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().expect("lock poisoned").is_empty()
    }

    /// Sorted identifiers of all stored instances.
    pub fn ids(&self) -> Vec<Identifier> {
        let mut ids: Vec<Identifier> = self
            .entities
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn find(&self, predicate: impl Fn(&Entity) -> bool) -> Vec<Arc<Entity>> {
        let mut found: Vec<Arc<Entity>> = self
            .entities
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        found
    }

    /// Destroy and drop every instance.
    pub fn clear(&self) {
        let mut entities = self.entities.write().expect("lock poisoned");
        for entity in entities.values() {
            entity.destroy();
        }
        entities.clear();
    }
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("type", &self.name())
            .field("entity_count", &self.len())
            .finish()
    }
}

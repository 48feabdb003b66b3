use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use entcache_schema::ModelType;
use entcache_types::EntityKey;
use parking_lot::ReentrantMutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::event::{ChangeBatch, ChangeEvent};
use crate::model_store::ModelStore;
use crate::node::{Reference, Resolved};
use crate::registry::EntityRegistry;
use crate::scope::{MutationScope, ScopeLock, ScopeState};

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Root of the entity graph: one model store per registered entity type
/// plus the cross-type registry.
///
/// The root is the single owner of every live entity. Its lifecycle bounds
/// theirs: [`RootStore::reset`] destroys everything it holds.
pub struct RootStore {
    stores: RwLock<BTreeMap<String, ModelStore>>,
    registry: Arc<EntityRegistry>,
    scope: ScopeLock,
    events: broadcast::Sender<ChangeBatch>,
}

impl RootStore {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a root whose change channel buffers `capacity` batches.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            stores: RwLock::new(BTreeMap::new()),
            registry: Arc::new(EntityRegistry::new()),
            scope: ReentrantMutex::new(RefCell::new(ScopeState::default())),
            events,
        }
    }

    /// Register the model store for an entity type.
    ///
    /// Returns `false` if a store for this type name already exists.
    pub fn register_model(&self, model: Arc<ModelType>) -> StoreResult<bool> {
        if !model.is_entity() {
            return Err(StoreError::NotAnEntityType(model.name().to_string()));
        }
        let mut stores = self.stores.write().expect("lock poisoned");
        if stores.contains_key(model.name()) {
            return Ok(false);
        }
        debug!(model = model.name(), "model store registered");
        stores.insert(model.name().to_string(), ModelStore::new(model));
        Ok(true)
    }

    pub fn has_model(&self, type_name: &str) -> bool {
        self.stores
            .read()
            .expect("lock poisoned")
            .contains_key(type_name)
    }

    pub fn model(&self, type_name: &str) -> Option<Arc<ModelType>> {
        self.stores
            .read()
            .expect("lock poisoned")
            .get(type_name)
            .map(|s| s.model().clone())
    }

    pub fn model_names(&self) -> Vec<String> {
        self.stores
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Open a write scope. See [`MutationScope`].
    pub fn begin_mutation(&self) -> MutationScope<'_> {
        MutationScope::enter(&self.scope, &self.events)
    }

    pub fn get(&self, key: &EntityKey) -> Option<Arc<Entity>> {
        self.registry.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.registry.contains(key)
    }

    /// Resolve a reference against the registry rather than its cached
    /// pointer, so an entity recreated under the same key is found.
    pub fn resolve(&self, reference: &Reference) -> Resolved {
        match self.registry.get(reference.key()) {
            Some(entity) => Resolved::Entity(entity),
            None => Resolved::Identifier(reference.key().id().clone()),
        }
    }

    /// A reference to `key` that resolves through this root's registry,
    /// including for an entity that has not arrived yet.
    pub fn reference(&self, key: EntityKey) -> Reference {
        Reference::in_registry(key, &self.registry)
    }

    /// Register a new instance with its model store and the registry.
    ///
    /// Fails eagerly if no store is registered for the type, or if a
    /// different live instance already holds the key.
    pub fn insert(&self, scope: &MutationScope<'_>, entity: Arc<Entity>) -> StoreResult<()> {
        let key = entity.key().clone();
        let stores = self.stores.read().expect("lock poisoned");
        let store = stores
            .get(key.type_name())
            .ok_or_else(|| StoreError::MissingStore(key.type_name().to_string()))?;

        if let Some(existing) = self.registry.get(&key) {
            if Arc::ptr_eq(&existing, &entity) {
                return Ok(());
            }
            return Err(StoreError::DuplicateIdentity(key));
        }

        entity.attach(Arc::downgrade(&self.registry));
        store.put(key.id().clone(), entity.clone());
        self.registry.put(entity);
        scope.record(ChangeEvent::created(key.clone()));
        debug!(entity = %key, "entity created");
        Ok(())
    }

    /// Remove and destroy an entity. Returns `false` if it was not present.
    pub fn remove(&self, scope: &MutationScope<'_>, key: &EntityKey) -> bool {
        let Some(entity) = self.registry.delete(key) else {
            return false;
        };
        if let Some(store) = self.stores.read().expect("lock poisoned").get(key.type_name()) {
            store.delete(key.id(), &entity);
        }
        entity.destroy();
        scope.record(ChangeEvent::removed(key.clone()));
        debug!(entity = %key, "entity removed");
        true
    }

    /// Live instances of one type matching a predicate, sorted by id.
    pub fn find(
        &self,
        type_name: &str,
        predicate: impl Fn(&Entity) -> bool,
    ) -> StoreResult<Vec<Arc<Entity>>> {
        let stores = self.stores.read().expect("lock poisoned");
        let store = stores
            .get(type_name)
            .ok_or_else(|| StoreError::MissingStore(type_name.to_string()))?;
        Ok(store.find(predicate))
    }

    /// Total live entities across all types.
    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    /// Live entities of one type.
    pub fn count_of(&self, type_name: &str) -> usize {
        self.stores
            .read()
            .expect("lock poisoned")
            .get(type_name)
            .map(ModelStore::len)
            .unwrap_or(0)
    }

    /// Sorted keys of all live entities.
    pub fn keys(&self) -> Vec<EntityKey> {
        self.registry.keys()
    }

    /// Receive a [`ChangeBatch`] per outermost mutation scope.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.events.subscribe()
    }

    /// Destroy every entity. Registered model types are kept.
    pub fn reset(&self) {
        let scope = self.begin_mutation();
        let keys = self.registry.keys();
        for key in &keys {
            scope.record(ChangeEvent::removed(key.clone()));
        }
        for store in self.stores.read().expect("lock poisoned").values() {
            store.clear();
        }
        self.registry.clear();
        info!(entities = keys.len(), "root store reset");
    }
}

impl Default for RootStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RootStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootStore")
            .field("models", &self.model_names())
            .field("entity_count", &self.entity_count())
            .finish()
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};

use entcache_types::{EntityKey, Identifier};
use serde_json::Value;

use crate::event::ChangeEvent;
use crate::node::Node;
use crate::registry::EntityRegistry;
use crate::scope::MutationScope;

/// A live, identified entity instance.
///
/// Instances are shared as `Arc<Entity>` and updated in place, so holders
/// of an old handle observe later merges rather than a stale copy.
pub struct Entity {
    key: EntityKey,
    fields: RwLock<BTreeMap<String, Node>>,
    alive: AtomicBool,
    registry: OnceLock<Weak<EntityRegistry>>,
}

impl Entity {
    /// Create an unregistered instance. Register it with
    /// [`RootStore::insert`](crate::RootStore::insert).
    pub fn new(key: EntityKey, fields: BTreeMap<String, Node>) -> Arc<Self> {
        Arc::new(Self {
            key,
            fields: RwLock::new(fields),
            alive: AtomicBool::new(true),
            registry: OnceLock::new(),
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn type_name(&self) -> &str {
        self.key.type_name()
    }

    pub fn id(&self) -> &Identifier {
        self.key.id()
    }

    /// `false` once the owning model store has destroyed this instance.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn get(&self, field: &str) -> Option<Node> {
        self.fields.read().expect("lock poisoned").get(field).cloned()
    }

    /// Resolve a `/`-separated path starting at this entity.
    pub fn pointer(&self, path: &str) -> Option<Node> {
        let path = path.trim_start_matches('/');
        let (head, rest) = path.split_once('/').unwrap_or((path, ""));
        self.get(head)?.pointer(rest)
    }

    /// Copy of all fields.
    pub fn fields(&self) -> BTreeMap<String, Node> {
        self.fields.read().expect("lock poisoned").clone()
    }

    /// Read the fields without copying them.
    pub fn with_fields<R>(&self, f: impl FnOnce(&BTreeMap<String, Node>) -> R) -> R {
        let fields = self.fields.read().expect("lock poisoned");
        f(&*fields)
    }

    /// JSON snapshot of the entity.
    pub fn snapshot(&self) -> Value {
        let fields = self.fields.read().expect("lock poisoned");
        Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Assign one field. Returns `true` if the value changed.
    pub fn set(&self, scope: &MutationScope<'_>, field: &str, value: Node) -> bool {
        let changed = {
            let mut fields = self.fields.write().expect("lock poisoned");
            match fields.get(field) {
                Some(current) if *current == value => false,
                _ => {
                    fields.insert(field.to_string(), value);
                    true
                }
            }
        };
        if changed {
            scope.record(ChangeEvent::updated(self.key.clone(), vec![field.to_string()]));
        }
        changed
    }

    /// Apply an in-place update. `f` returns the names of the fields it
    /// changed; an update event is recorded when that list is not empty.
    pub fn update<F>(&self, scope: &MutationScope<'_>, f: F) -> Vec<String>
    where
        F: FnOnce(&mut BTreeMap<String, Node>) -> Vec<String>,
    {
        let changed = {
            let mut fields = self.fields.write().expect("lock poisoned");
            f(&mut *fields)
        };
        if !changed.is_empty() {
            scope.record(ChangeEvent::updated(self.key.clone(), changed.clone()));
        }
        changed
    }

    /// Registry this instance was inserted into, if any.
    pub(crate) fn registry(&self) -> Weak<EntityRegistry> {
        self.registry.get().cloned().unwrap_or_default()
    }

    pub(crate) fn attach(&self, registry: Weak<EntityRegistry>) {
        let _ = self.registry.set(registry);
    }

    pub(crate) fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("key", &self.key)
            .field("alive", &self.is_alive())
            .finish()
    }
}

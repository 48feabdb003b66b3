use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, SecondsFormat, Utc};
use entcache_types::{EntityKey, Identifier};
use serde_json::{Number, Value};

use crate::entity::Entity;
use crate::registry::EntityRegistry;

/// A merged value in the entity graph.
///
/// Identified entities never appear inline: they are held as [`Reference`]s
/// to the instance owned by a model store.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    /// Opaque blob, replaced wholesale on merge.
    Frozen(Value),
    Array(Vec<Node>),
    /// Value object: non-identified nested structure.
    Object(BTreeMap<String, Node>),
    Ref(Reference),
}

impl Node {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Node>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The live entity behind a reference node.
    pub fn as_entity(&self) -> Option<Arc<Entity>> {
        self.as_reference().and_then(Reference::resolve)
    }

    /// Child value by field name. Follows references into live entities.
    pub fn get(&self, field: &str) -> Option<Node> {
        match self {
            Self::Object(map) => map.get(field).cloned(),
            Self::Ref(r) => r.resolve().and_then(|e| e.get(field)),
            _ => None,
        }
    }

    /// Look up a value by a `/`-separated path (`/items/0/createdBy/name`).
    ///
    /// Array segments are indices. References are followed into their live
    /// entities; a dangling reference ends the lookup.
    pub fn pointer(&self, path: &str) -> Option<Node> {
        let mut current = self.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match &current {
                Self::Array(items) => items.get(segment.parse::<usize>().ok()?)?.clone(),
                other => other.get(segment)?,
            };
        }
        Some(current)
    }

    /// Mutable lookup by path within this value only.
    ///
    /// References are not followed: entity fields are written through the
    /// entity itself.
    pub fn pointer_mut(&mut self, path: &str) -> Option<&mut Node> {
        let mut current = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match current {
                Self::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                Self::Object(map) => map.get_mut(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Snapshot as JSON. References snapshot as their identifier.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Frozen(v) => v.clone(),
            Self::Array(items) => Value::Array(items.iter().map(Node::to_json).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Ref(r) => r.key().id().to_json(),
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A reference to an entity: persisted as its key, observed as the live
/// instance registered under that key.
///
/// The instance seen at merge time is cached; when it is gone, the key is
/// looked up again in the registry, so an entity that arrives or is
/// recreated later is found.
#[derive(Clone)]
pub struct Reference {
    key: EntityKey,
    target: Weak<Entity>,
    registry: Weak<EntityRegistry>,
}

impl Reference {
    /// Reference a live entity.
    pub fn to(entity: &Arc<Entity>) -> Self {
        Self {
            key: entity.key().clone(),
            target: Arc::downgrade(entity),
            registry: entity.registry(),
        }
    }

    /// Reference a key with no registry to resolve it against.
    pub fn dangling(key: EntityKey) -> Self {
        Self {
            key,
            target: Weak::new(),
            registry: Weak::new(),
        }
    }

    /// Reference a key in `registry`, present yet or not.
    pub(crate) fn in_registry(key: EntityKey, registry: &Arc<EntityRegistry>) -> Self {
        let target = registry
            .get(&key)
            .map(|e| Arc::downgrade(&e))
            .unwrap_or_default();
        Self {
            key,
            target,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// The referenced instance, if one is alive.
    pub fn resolve(&self) -> Option<Arc<Entity>> {
        self.target
            .upgrade()
            .filter(|e| e.is_alive())
            .or_else(|| self.registry.upgrade()?.get(&self.key))
            .filter(|e| e.is_alive())
    }

    /// The observed form: the live entity, or the bare identifier.
    pub fn observe(&self) -> Resolved {
        match self.resolve() {
            Some(entity) => Resolved::Entity(entity),
            None => Resolved::Identifier(self.key.id().clone()),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.key)
    }
}

/// Observed form of a [`Reference`].
#[derive(Clone, Debug)]
pub enum Resolved {
    Entity(Arc<Entity>),
    Identifier(Identifier),
}

impl Resolved {
    pub fn is_entity(&self) -> bool {
        matches!(self, Self::Entity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kim() -> Arc<Entity> {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Node::from("ko"));
        fields.insert("name".to_string(), Node::from("Kim"));
        Entity::new(EntityKey::new("User", "ko"), fields)
    }

    #[test]
    fn pointer_walks_objects_arrays_and_references() {
        let user = kim();
        let mut item = BTreeMap::new();
        item.insert("createdBy".to_string(), Node::Ref(Reference::to(&user)));
        let data = Node::Object(BTreeMap::from([(
            "items".to_string(),
            Node::Array(vec![Node::Object(item)]),
        )]));

        assert_eq!(data.pointer("/items/0/createdBy/name"), Some(Node::from("Kim")));
        assert_eq!(data.pointer("/items/1"), None);
        assert_eq!(data.pointer("/items/x"), None);
        assert_eq!(data.pointer(""), Some(data.clone()));
    }

    #[test]
    fn reference_falls_back_to_identifier() {
        let reference = Reference::dangling(EntityKey::new("User", "ghost"));
        match reference.observe() {
            Resolved::Identifier(id) => assert_eq!(id.as_str(), "ghost"),
            Resolved::Entity(_) => panic!("dangling reference resolved"),
        }
        assert!(Node::Ref(reference).get("name").is_none());
    }

    #[test]
    fn reference_stops_resolving_after_entity_dropped() {
        let user = kim();
        let reference = Reference::to(&user);
        assert!(reference.observe().is_entity());
        drop(user);
        assert!(reference.resolve().is_none());
    }

    #[test]
    fn references_compare_by_key() {
        let a = Node::Ref(Reference::to(&kim()));
        let b = Node::Ref(Reference::dangling(EntityKey::new("User", "ko")));
        assert_eq!(a, b);
    }

    #[test]
    fn to_json_snapshots_references_as_identifiers() {
        let user = kim();
        let node = Node::Object(BTreeMap::from([
            ("owner".to_string(), Node::Ref(Reference::to(&user))),
            ("tags".to_string(), Node::Array(vec![Node::from("a"), Node::from(1i64)])),
            ("blob".to_string(), Node::Frozen(json!({"x": [1, 2]}))),
        ]));
        assert_eq!(
            node.to_json(),
            json!({"owner": "ko", "tags": ["a", 1], "blob": {"x": [1, 2]}})
        );
    }

    #[test]
    fn date_snapshot_is_rfc3339() {
        let date = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Node::Date(date).to_json(), json!("2024-05-01T10:00:00.000Z"));
    }

    #[test]
    fn pointer_mut_edits_in_place() {
        let mut data = Node::Object(BTreeMap::from([(
            "items".to_string(),
            Node::Array(vec![Node::from(1i64)]),
        )]));
        data.pointer_mut("/items")
            .and_then(Node::as_array_mut)
            .unwrap()
            .push(Node::from(2i64));
        assert_eq!(data.pointer("/items/1"), Some(Node::from(2i64)));
    }
}

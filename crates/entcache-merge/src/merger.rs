use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use entcache_schema::{ModelType, ScalarKind, TypeDescriptor, TypeResolver, UnionType, MAX_LAZY_DEPTH};
use entcache_store::{Entity, MutationScope, Node, Reference, RootStore};
use entcache_types::{EntityKey, Identifier};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{MergeError, MergeResult};
use crate::reconcile::merge_objects;

/// Merge `raw` as query data of type `desc` inside a fresh mutation scope.
///
/// A new entity missing a required field is rejected before anything
/// nested inside it is merged. Entities already merged from earlier
/// siblings (array elements, other fields) stay in the graph.
pub fn merge(
    root: &RootStore,
    resolver: &TypeResolver,
    raw: &Value,
    desc: &TypeDescriptor,
) -> MergeResult<Node> {
    let scope = root.begin_mutation();
    Merger::new(root, resolver, &scope).merge(raw, desc)
}

#[derive(Clone, Debug)]
enum Segment {
    Field(String),
    Index(usize),
}

/// Data path of the value being merged, for error messages.
#[derive(Clone, Debug, Default)]
struct DataPath(Vec<Segment>);

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => f.write_str(name)?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Recursive merge of raw data into the entity graph.
///
/// A merger borrows an open [`MutationScope`], so everything it writes is
/// delivered to observers as part of that scope's change batch.
pub struct Merger<'a, 's> {
    root: &'a RootStore,
    resolver: &'a TypeResolver,
    scope: &'a MutationScope<'s>,
    path: DataPath,
}

impl<'a, 's> Merger<'a, 's> {
    pub fn new(root: &'a RootStore, resolver: &'a TypeResolver, scope: &'a MutationScope<'s>) -> Self {
        Self {
            root,
            resolver,
            scope,
            path: DataPath(vec![Segment::Field("data".to_string())]),
        }
    }

    /// Use `label` as the first segment of reported paths (`data`,
    /// `request`, `pagination`).
    pub fn at(mut self, label: impl Into<String>) -> Self {
        self.path = DataPath(vec![Segment::Field(label.into())]);
        self
    }

    pub fn merge(&mut self, raw: &Value, desc: &TypeDescriptor) -> MergeResult<Node> {
        self.merge_value(raw, desc, 0)
    }

    /// Merge one identified object and return the live instance.
    pub fn merge_entity(&mut self, raw: &Value, model: &Arc<ModelType>) -> MergeResult<Arc<Entity>> {
        match raw {
            Value::Object(map) => self.merge_entity_object(map, model),
            other => Err(self.mismatch(model.name(), other)),
        }
    }

    fn merge_value(&mut self, raw: &Value, desc: &TypeDescriptor, lazy_depth: usize) -> MergeResult<Node> {
        if raw.is_null() {
            return Ok(Node::Null);
        }
        match desc {
            TypeDescriptor::Optional(inner) => self.merge_value(raw, inner, lazy_depth),
            TypeDescriptor::Lazy(lazy) => {
                if lazy_depth >= MAX_LAZY_DEPTH {
                    return Err(MergeError::UnresolvedLazy {
                        path: self.path.to_string(),
                        name: lazy.name().to_string(),
                    });
                }
                self.merge_value(raw, &lazy.evaluate(), lazy_depth + 1)
            }
            TypeDescriptor::Frozen => Ok(Node::Frozen(raw.clone())),
            TypeDescriptor::Scalar(kind) => self.merge_scalar(raw, *kind),
            TypeDescriptor::Array(inner) => self.merge_array(raw, inner),
            TypeDescriptor::Reference(inner) => self.merge_reference(raw, inner, lazy_depth),
            TypeDescriptor::Union(union) => self.merge_union(raw, desc, union, lazy_depth),
            TypeDescriptor::Entity(model) => match raw {
                Value::String(_) | Value::Number(_) => self.reference_by_id(raw, model),
                other => {
                    let entity = self.merge_entity(other, model)?;
                    Ok(Node::Ref(Reference::to(&entity)))
                }
            },
            TypeDescriptor::ValueObject(model) => match raw {
                Value::Object(map) => Ok(Node::Object(self.merge_fields(map, model)?)),
                other => Err(self.mismatch(model.name(), other)),
            },
        }
    }

    fn merge_scalar(&self, raw: &Value, kind: ScalarKind) -> MergeResult<Node> {
        let node = match (kind, raw) {
            (ScalarKind::String | ScalarKind::Any, Value::String(s)) => Node::String(s.clone()),
            (ScalarKind::Number | ScalarKind::Any, Value::Number(n)) => Node::Number(n.clone()),
            (ScalarKind::Boolean | ScalarKind::Any, Value::Bool(b)) => Node::Bool(*b),
            (ScalarKind::Date, Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(date) => Node::Date(date.with_timezone(&Utc)),
                Err(_) => return Err(self.mismatch("RFC 3339 date", raw)),
            },
            (ScalarKind::Date, Value::Number(n)) => {
                match n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis) {
                    Some(date) => Node::Date(date),
                    None => return Err(self.mismatch("epoch milliseconds", raw)),
                }
            }
            _ => return Err(self.mismatch(&kind.to_string(), raw)),
        };
        Ok(node)
    }

    fn merge_array(&mut self, raw: &Value, inner: &TypeDescriptor) -> MergeResult<Node> {
        let Value::Array(items) = raw else {
            return Err(self.mismatch(&format!("[{inner}]"), raw));
        };
        let mut merged = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            self.path.0.push(Segment::Index(index));
            let node = self.merge_value(item, inner, 0);
            self.path.0.pop();
            merged.push(node?);
        }
        Ok(Node::Array(merged))
    }

    fn merge_reference(&mut self, raw: &Value, inner: &TypeDescriptor, lazy_depth: usize) -> MergeResult<Node> {
        match raw {
            Value::Object(_) => self.merge_value(raw, inner, lazy_depth),
            Value::String(_) | Value::Number(_) => {
                match self.resolver.resolve(inner, None) {
                    TypeDescriptor::Entity(model) => self.reference_by_id(raw, &model),
                    TypeDescriptor::Union(union) => Err(MergeError::AmbiguousUnion {
                        path: self.path.to_string(),
                        union: TypeDescriptor::Union(union).to_string(),
                    }),
                    other => Err(self.mismatch(&format!("ref({other})"), raw)),
                }
            }
            other => Err(self.mismatch(&format!("ref({inner})"), other)),
        }
    }

    /// A bare identifier: resolves through the registry, so it observes the
    /// entity once it arrives.
    fn reference_by_id(&self, raw: &Value, model: &Arc<ModelType>) -> MergeResult<Node> {
        let id = Identifier::from_json(raw).ok_or_else(|| self.mismatch("identifier", raw))?;
        Ok(Node::Ref(self.root.reference(EntityKey::new(model.name(), id))))
    }

    fn merge_union(
        &mut self,
        raw: &Value,
        desc: &TypeDescriptor,
        union: &UnionType,
        lazy_depth: usize,
    ) -> MergeResult<Node> {
        match self.resolver.select_branch(union, raw) {
            Some(branch) => self.merge_value(raw, &branch, lazy_depth),
            None if raw.is_object() && structured_branches(union) > 1 => Err(MergeError::AmbiguousUnion {
                path: self.path.to_string(),
                union: desc.to_string(),
            }),
            None => Err(self.mismatch(&desc.to_string(), raw)),
        }
    }

    fn merge_entity_object(&mut self, map: &Map<String, Value>, model: &Arc<ModelType>) -> MergeResult<Arc<Entity>> {
        let id_field = model.identifier().ok_or_else(|| self.mismatch("entity type", &Value::Null))?;
        let id = map
            .get(id_field)
            .and_then(Identifier::from_json)
            .ok_or_else(|| MergeError::MissingIdentifier {
                path: self.path.to_string(),
                type_name: model.name().to_string(),
                field: id_field.to_string(),
            })?;
        let key = EntityKey::new(model.name(), id.clone());
        if !self.root.contains(&key) {
            self.check_required(map, model)?;
        }

        // Nested entities are registered before the parent is looked up, so
        // a payload that embeds its own entity resolves to one instance.
        let mut fields = self.merge_fields(map, model)?;
        fields.insert(id_field.to_string(), Node::String(id.as_str().to_string()));

        if let Some(existing) = self.root.get(&key) {
            existing.update(self.scope, |current| merge_objects(current, fields));
            return Ok(existing);
        }

        for (name, desc) in model.fields() {
            if fields.contains_key(name) {
                continue;
            }
            match default_for(desc, 0) {
                Some(value) => {
                    fields.insert(name.to_string(), value);
                }
                None => {
                    return Err(MergeError::MissingField {
                        path: self.path.to_string(),
                        type_name: model.name().to_string(),
                        field: name.to_string(),
                    })
                }
            }
        }

        let entity = Entity::new(key, fields);
        self.root.insert(self.scope, entity.clone())?;
        Ok(entity)
    }

    /// Every declared field without a default must be in the payload of a
    /// new entity.
    fn check_required(&self, map: &Map<String, Value>, model: &ModelType) -> MergeResult<()> {
        let missing = model
            .fields()
            .find(|(name, desc)| !map.contains_key(*name) && default_for(desc, 0).is_none());
        match missing {
            Some((name, _)) => Err(MergeError::MissingField {
                path: self.path.to_string(),
                type_name: model.name().to_string(),
                field: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Merge every declared field present in `map`. Undeclared keys are
    /// dropped.
    fn merge_fields(&mut self, map: &Map<String, Value>, model: &ModelType) -> MergeResult<BTreeMap<String, Node>> {
        let mut fields = BTreeMap::new();
        for (name, value) in map {
            if model.identifier() == Some(name.as_str()) {
                continue;
            }
            let Some(desc) = model.field(name) else {
                trace!(model = model.name(), field = %name, "ignoring undeclared field");
                continue;
            };
            self.path.0.push(Segment::Field(name.clone()));
            let node = self.merge_value(value, desc, 0);
            self.path.0.pop();
            fields.insert(name.clone(), node?);
        }
        Ok(fields)
    }

    fn mismatch(&self, expected: &str, found: &Value) -> MergeError {
        MergeError::SchemaMismatch {
            path: self.path.to_string(),
            expected: expected.to_string(),
            found: json_kind(found).to_string(),
        }
    }
}

fn default_for(desc: &TypeDescriptor, depth: usize) -> Option<Node> {
    match desc {
        TypeDescriptor::Array(_) => Some(Node::Array(Vec::new())),
        TypeDescriptor::Optional(_) | TypeDescriptor::Frozen => Some(Node::Null),
        TypeDescriptor::Lazy(lazy) if depth < MAX_LAZY_DEPTH => default_for(&lazy.evaluate(), depth + 1),
        _ => None,
    }
}

fn structured_branches(union: &UnionType) -> usize {
    union.branches.iter().filter(|b| b.is_structured()).count()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entcache_schema::UnionPolicy;
    use entcache_store::ChangeKind;
    use serde_json::json;

    fn user() -> Arc<ModelType> {
        ModelType::entity("User", "id")
            .field("name", TypeDescriptor::string())
            .build()
    }

    fn item() -> Arc<ModelType> {
        ModelType::entity("Item", "id")
            .field("description", TypeDescriptor::string())
            .field("count", TypeDescriptor::number())
            .field("createdBy", TypeDescriptor::reference(TypeDescriptor::model(user())))
            .field("tags", TypeDescriptor::array(TypeDescriptor::string()))
            .field("note", TypeDescriptor::optional(TypeDescriptor::string()))
            .build()
    }

    fn root() -> RootStore {
        let root = RootStore::new();
        root.register_model(item()).unwrap();
        root.register_model(user()).unwrap();
        root
    }

    fn item_payload(id: &str) -> Value {
        json!({
            "id": id,
            "description": "Test item",
            "count": 4,
            "createdBy": {"id": "ko", "name": "Kim"}
        })
    }

    // -----------------------------------------------------------------------
    // Entity path
    // -----------------------------------------------------------------------

    #[test]
    fn basic_fetch_normalizes_nested_entities() {
        let root = root();
        let node = merge(&root, &TypeResolver::default(), &item_payload("test"), &TypeDescriptor::model(item())).unwrap();

        assert_eq!(node.get("id").unwrap().as_str(), Some("test"));
        assert_eq!(node.pointer("/createdBy/name").unwrap().as_str(), Some("Kim"));
        assert!(root.contains(&EntityKey::new("Item", "test")));
        assert!(root.contains(&EntityKey::new("User", "ko")));
        assert_eq!(root.entity_count(), 2);
    }

    #[test]
    fn same_identity_merges_into_one_instance() {
        let root = root();
        let resolver = TypeResolver::default();
        let desc = TypeDescriptor::model(item());

        let first = merge(&root, &resolver, &item_payload("a"), &desc).unwrap();
        let second = merge(&root, &resolver, &json!({"id": "a", "count": 9}), &desc).unwrap();

        let (first, second) = (first.as_entity().unwrap(), second.as_entity().unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.get("count").unwrap().as_i64(), Some(9));
        assert_eq!(first.get("description").unwrap().as_str(), Some("Test item"));
        assert_eq!(root.count_of("Item"), 1);
    }

    #[test]
    fn numeric_and_string_ids_address_the_same_entity() {
        let root = root();
        let resolver = TypeResolver::default();
        let desc = TypeDescriptor::model(user());
        let a = merge(&root, &resolver, &json!({"id": 4, "name": "Ann"}), &desc).unwrap();
        let b = merge(&root, &resolver, &json!({"id": "4", "name": "Ann"}), &desc).unwrap();
        assert!(Arc::ptr_eq(&a.as_entity().unwrap(), &b.as_entity().unwrap()));
        assert_eq!(a.get("id").unwrap().as_str(), Some("4"));
    }

    #[test]
    fn identical_merge_emits_no_second_batch() {
        let root = root();
        let resolver = TypeResolver::default();
        let desc = TypeDescriptor::model(item());
        let mut rx = root.subscribe();

        merge(&root, &resolver, &item_payload("a"), &desc).unwrap();
        let batch = rx.try_recv().unwrap();
        assert!(batch.iter().all(|e| e.kind == ChangeKind::Created));

        merge(&root, &resolver, &item_payload("a"), &desc).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn update_reports_changed_fields() {
        let root = root();
        let resolver = TypeResolver::default();
        let desc = TypeDescriptor::model(item());
        merge(&root, &resolver, &item_payload("a"), &desc).unwrap();

        let mut rx = root.subscribe();
        merge(&root, &resolver, &json!({"id": "a", "count": 5, "description": "Test item"}), &desc).unwrap();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch[0].kind,
            ChangeKind::Updated {
                fields: vec!["count".to_string()]
            }
        );
    }

    #[test]
    fn payload_embedding_its_own_entity_yields_one_instance() {
        let node_type = ModelType::entity("Node", "id")
            .field("name", TypeDescriptor::optional(TypeDescriptor::string()))
            .field(
                "parent",
                TypeDescriptor::optional(TypeDescriptor::reference(TypeDescriptor::lazy("Node", || {
                    TypeDescriptor::model(
                        ModelType::entity("Node", "id")
                            .field("name", TypeDescriptor::optional(TypeDescriptor::string()))
                            .build(),
                    )
                }))),
            )
            .build();
        let root = RootStore::new();
        root.register_model(node_type.clone()).unwrap();

        let payload = json!({"id": "n1", "name": "outer", "parent": {"id": "n1", "name": "inner"}});
        let node = merge(&root, &TypeResolver::default(), &payload, &TypeDescriptor::model(node_type)).unwrap();

        assert_eq!(root.entity_count(), 1);
        let entity = node.as_entity().unwrap();
        assert_eq!(entity.get("name").unwrap().as_str(), Some("outer"));
        let parent = entity.get("parent").unwrap().as_entity().unwrap();
        assert!(Arc::ptr_eq(&entity, &parent));
    }

    // -----------------------------------------------------------------------
    // Defaults and validation
    // -----------------------------------------------------------------------

    #[test]
    fn missing_defaultable_fields_are_filled_on_create() {
        let root = root();
        let node = merge(&root, &TypeResolver::default(), &item_payload("a"), &TypeDescriptor::model(item())).unwrap();
        let entity = node.as_entity().unwrap();
        assert_eq!(entity.get("tags"), Some(Node::Array(vec![])));
        assert_eq!(entity.get("note"), Some(Node::Null));
    }

    #[test]
    fn missing_required_field_is_reported_with_path() {
        let root = root();
        let desc = TypeDescriptor::array(TypeDescriptor::model(item()));
        let payload = json!([item_payload("a"), {"id": "b", "description": "no count", "createdBy": "ko"}]);
        let err = merge(&root, &TypeResolver::default(), &payload, &desc).unwrap_err();
        match err {
            MergeError::MissingField { path, field, type_name } => {
                assert_eq!(path, "data[1]");
                assert_eq!(field, "count");
                assert_eq!(type_name, "Item");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejected_entity_leaves_nested_entities_unmerged() {
        let root = root();
        let mut rx = root.subscribe();
        let payload = json!({"id": "a", "createdBy": {"id": "ko", "name": "Kim"}});
        let err = merge(&root, &TypeResolver::default(), &payload, &TypeDescriptor::model(item())).unwrap_err();

        assert!(matches!(err, MergeError::MissingField { ref field, .. } if field == "count"));
        assert_eq!(root.entity_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn lazy_cycle_field_is_required_not_recursed() {
        fn looping() -> TypeDescriptor {
            TypeDescriptor::lazy("Loop", looping)
        }
        let model = ModelType::entity("Knot", "id").field("next", looping()).build();
        let root = RootStore::new();
        root.register_model(model.clone()).unwrap();
        let resolver = TypeResolver::default();

        let err = merge(&root, &resolver, &json!({"id": "k"}), &TypeDescriptor::model(model.clone())).unwrap_err();
        assert!(matches!(err, MergeError::MissingField { ref field, .. } if field == "next"));

        let err = merge(&root, &resolver, &json!({"id": "k", "next": 1}), &TypeDescriptor::model(model)).unwrap_err();
        assert!(matches!(err, MergeError::UnresolvedLazy { .. }));
    }

    #[test]
    fn schema_mismatch_carries_nested_path() {
        let root = root();
        let payload = json!({"id": "a", "description": "x", "count": 1, "createdBy": {"id": "ko", "name": 7}});
        let err = merge(&root, &TypeResolver::default(), &payload, &TypeDescriptor::model(item())).unwrap_err();
        assert!(matches!(
            err,
            MergeError::SchemaMismatch { ref path, .. } if path == "data.createdBy.name"
        ));
    }

    #[test]
    fn missing_identifier_is_an_error() {
        let root = root();
        let err = merge(&root, &TypeResolver::default(), &json!({"name": "Kim"}), &TypeDescriptor::model(user())).unwrap_err();
        assert!(matches!(err, MergeError::MissingIdentifier { .. }));
    }

    #[test]
    fn unregistered_type_fails_with_missing_store() {
        let root = RootStore::new();
        let err = merge(&root, &TypeResolver::default(), &json!({"id": "ko", "name": "Kim"}), &TypeDescriptor::model(user())).unwrap_err();
        assert!(matches!(err, MergeError::Store(_)));
    }

    #[test]
    fn undeclared_fields_are_ignored() {
        let root = root();
        let node = merge(
            &root,
            &TypeResolver::default(),
            &json!({"id": "ko", "name": "Kim", "__typename": "User"}),
            &TypeDescriptor::model(user()),
        )
        .unwrap();
        assert!(node.get("__typename").is_none());
    }

    // -----------------------------------------------------------------------
    // Value objects, references, scalars
    // -----------------------------------------------------------------------

    #[test]
    fn partial_update_replaces_nested_arrays() {
        let entry = ModelType::value("Entry").field("baha", TypeDescriptor::string()).build();
        let prop = ModelType::value("Prop")
            .field("ids", TypeDescriptor::array(TypeDescriptor::model(entry)))
            .field("label", TypeDescriptor::optional(TypeDescriptor::string()))
            .build();
        let thing = ModelType::entity("Thing", "id")
            .field("prop", TypeDescriptor::model(prop))
            .build();
        let root = RootStore::new();
        root.register_model(thing.clone()).unwrap();
        let resolver = TypeResolver::default();
        let desc = TypeDescriptor::model(thing);

        merge(
            &root,
            &resolver,
            &json!({"id": "t", "prop": {"label": "keep", "ids": [{"baha": "hey"}, {"baha": "hello"}]}}),
            &desc,
        )
        .unwrap();
        let node = merge(
            &root,
            &resolver,
            &json!({"id": "t", "prop": {"ids": [{"baha": "hey2"}, {"baha": "hello2"}]}}),
            &desc,
        )
        .unwrap();

        assert_eq!(node.pointer("/prop/ids/0/baha").unwrap().as_str(), Some("hey2"));
        assert_eq!(node.pointer("/prop/ids/1/baha").unwrap().as_str(), Some("hello2"));
        assert_eq!(node.pointer("/prop/label").unwrap().as_str(), Some("keep"));
    }

    #[test]
    fn bare_identifier_reference_resolves_once_entity_arrives() {
        let root = root();
        let resolver = TypeResolver::default();
        let payload = json!({"id": "a", "description": "x", "count": 1, "createdBy": "ko"});
        let node = merge(&root, &resolver, &payload, &TypeDescriptor::model(item())).unwrap();

        let created_by = node.get("createdBy").unwrap();
        let reference = created_by.as_reference().unwrap();
        assert!(reference.resolve().is_none());
        assert!(node.pointer("/createdBy/name").is_none());
        assert_eq!(created_by.to_json(), json!("ko"));

        merge(&root, &resolver, &json!({"id": "ko", "name": "Kim"}), &TypeDescriptor::model(user())).unwrap();
        assert!(reference.observe().is_entity());
        assert_eq!(node.pointer("/createdBy/name").unwrap().as_str(), Some("Kim"));

        merge(&root, &resolver, &payload, &TypeDescriptor::model(item())).unwrap();
        assert_eq!(node.pointer("/createdBy/name").unwrap().as_str(), Some("Kim"));
    }

    #[test]
    fn dates_accept_rfc3339_and_epoch_millis() {
        let root = RootStore::new();
        let resolver = TypeResolver::default();
        let from_str = merge(&root, &resolver, &json!("2024-01-02T03:04:05.000Z"), &TypeDescriptor::date()).unwrap();
        let from_ms = merge(&root, &resolver, &json!(1704164645000i64), &TypeDescriptor::date()).unwrap();
        assert_eq!(from_str, from_ms);
        assert_eq!(from_str.to_json(), json!("2024-01-02T03:04:05.000Z"));
    }

    #[test]
    fn frozen_values_are_kept_opaque() {
        let root = RootStore::new();
        let raw = json!({"anything": [1, {"goes": true}]});
        let node = merge(&root, &TypeResolver::default(), &raw, &TypeDescriptor::Frozen).unwrap();
        assert_eq!(node, Node::Frozen(raw));
    }

    #[test]
    fn null_passes_through() {
        let root = root();
        let node = merge(&root, &TypeResolver::default(), &Value::Null, &TypeDescriptor::model(item())).unwrap();
        assert!(node.is_null());
    }

    // -----------------------------------------------------------------------
    // Unions
    // -----------------------------------------------------------------------

    fn post() -> Arc<ModelType> {
        ModelType::entity("Post", "id")
            .field("title", TypeDescriptor::string())
            .build()
    }

    #[test]
    fn dispatcher_selects_union_branch() {
        let root = RootStore::new();
        root.register_model(user()).unwrap();
        root.register_model(post()).unwrap();
        let desc = TypeDescriptor::union_with(
            vec![TypeDescriptor::model(user()), TypeDescriptor::model(post())],
            |v| match v.get("kind").and_then(Value::as_str) {
                Some("post") => Some(1),
                _ => Some(0),
            },
        );
        let node = merge(
            &root,
            &TypeResolver::default(),
            &json!({"kind": "post", "id": "p1", "title": "Hello"}),
            &desc,
        )
        .unwrap();
        assert_eq!(node.as_entity().unwrap().type_name(), "Post");
    }

    #[test]
    fn union_with_scalar_branch_accepts_scalars() {
        let root = root();
        let desc = TypeDescriptor::union(vec![TypeDescriptor::string(), TypeDescriptor::model(user())]);
        let resolver = TypeResolver::default();
        assert_eq!(merge(&root, &resolver, &json!("plain"), &desc).unwrap(), Node::from("plain"));
        let node = merge(&root, &resolver, &json!({"id": "ko", "name": "Kim"}), &desc).unwrap();
        assert!(node.as_entity().is_some());
    }

    #[test]
    fn strict_policy_reports_ambiguous_union() {
        let root = RootStore::new();
        root.register_model(user()).unwrap();
        root.register_model(post()).unwrap();
        let desc = TypeDescriptor::union(vec![TypeDescriptor::model(user()), TypeDescriptor::model(post())]);
        let resolver = TypeResolver::new(UnionPolicy::Strict);
        let err = merge(&root, &resolver, &json!({"title": "no id"}), &desc).unwrap_err();
        assert!(matches!(err, MergeError::AmbiguousUnion { .. }));
    }

    #[test]
    fn bare_id_against_entity_union_is_ambiguous() {
        let root = RootStore::new();
        let desc = TypeDescriptor::reference(TypeDescriptor::union(vec![
            TypeDescriptor::model(user()),
            TypeDescriptor::model(post()),
        ]));
        let resolver = TypeResolver::new(UnionPolicy::Strict);
        let err = merge(&root, &resolver, &json!("x"), &desc).unwrap_err();
        assert!(matches!(err, MergeError::AmbiguousUnion { .. }));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn merged_identities_are_unique(ids in proptest::collection::vec(0u8..8, 1..24)) {
                let root = root();
                let resolver = TypeResolver::default();
                let desc = TypeDescriptor::model(user());
                let mut seen: BTreeMap<String, Arc<Entity>> = BTreeMap::new();

                for id in &ids {
                    let raw = json!({"id": id.to_string(), "name": format!("user {id}")});
                    let entity = merge(&root, &resolver, &raw, &desc).unwrap().as_entity().unwrap();
                    if let Some(previous) = seen.get(&id.to_string()) {
                        prop_assert!(Arc::ptr_eq(previous, &entity));
                    }
                    seen.insert(id.to_string(), entity);
                }
                prop_assert_eq!(root.count_of("User"), seen.len());
            }

            #[test]
            fn merge_is_idempotent(count in any::<i32>(), description in "[a-z]{0,12}") {
                let root = root();
                let resolver = TypeResolver::default();
                let desc = TypeDescriptor::model(item());
                let raw = json!({"id": "x", "description": description, "count": count, "createdBy": "ko"});

                let first = merge(&root, &resolver, &raw, &desc).unwrap().as_entity().unwrap().snapshot();
                let second = merge(&root, &resolver, &raw, &desc).unwrap().as_entity().unwrap().snapshot();
                prop_assert_eq!(first, second);
                prop_assert_eq!(root.entity_count(), 1);
            }
        }
    }
}

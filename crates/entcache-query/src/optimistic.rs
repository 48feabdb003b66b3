use std::sync::Arc;

use entcache_merge::Merger;
use entcache_schema::ModelType;
use entcache_store::{Node, Reference};
use entcache_types::{EntityKey, Identifier};
use serde_json::Value;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::query::{FetchResult, Query, QueryHandle};
use crate::variables::Variables;

/// Optimistic list insert around a mutation.
///
/// Before the mutation runs, `payload` is merged as a `model` entity and a
/// reference to it is appended to the array at `path` inside the target
/// query's `data` (`""` for a top-level array). When the mutation succeeds
/// with an entity, that element is swapped in place for the authoritative
/// entity, so the list length does not change. When it fails or is
/// discarded, the insert is rolled back.
///
/// The array must live in the query's own data, not inside an entity. The
/// placeholder id must not name an entity already in the store, since the
/// rollback removes it.
#[derive(Debug)]
pub struct OptimisticInsert {
    target: QueryHandle,
    path: String,
    model: Arc<ModelType>,
    payload: Value,
}

impl OptimisticInsert {
    pub fn new(target: QueryHandle, path: impl Into<String>, model: Arc<ModelType>, payload: Value) -> Self {
        Self {
            target,
            path: path.into(),
            model,
            payload,
        }
    }

    /// Insert, run the mutation, then swap or roll back.
    pub async fn run(self, mutation: &Query, vars: Variables) -> QueryResult<FetchResult> {
        let placeholder = self.insert(mutation)?;

        let result = match mutation.mutate(vars).await {
            Ok(result) => result,
            Err(err) => {
                self.rollback(mutation, &placeholder);
                return Err(err);
            }
        };

        match result.data.as_ref().and_then(Node::as_entity) {
            Some(authoritative) if result.is_ok() => {
                let replacement = Node::Ref(Reference::to(&authoritative));
                self.target.update_data(|data| {
                    if let Some(slot) = find_slot(data, &self.path, &placeholder) {
                        *slot = replacement;
                    }
                });
                if authoritative.key() != &placeholder {
                    let scope = mutation.root().begin_mutation();
                    mutation.root().remove(&scope, &placeholder);
                }
                debug!(placeholder = %placeholder, entity = %authoritative.key(), "optimistic insert settled");
            }
            _ => self.rollback(mutation, &placeholder),
        }
        Ok(result)
    }

    fn insert(&self, mutation: &Query) -> QueryResult<EntityKey> {
        let root = mutation.root();
        if let Some(existing) = self.placeholder_key().filter(|key| root.contains(key)) {
            return Err(QueryError::PlaceholderExists(existing.to_string()));
        }
        let scope = root.begin_mutation();
        let entity = Merger::new(root, mutation.resolver(), &scope)
            .at("optimistic")
            .merge_entity(&self.payload, &self.model)?;
        drop(scope);
        let key = entity.key().clone();

        let mut appended = false;
        self.target.update_data(|data| {
            if let Some(items) = array_at(data, &self.path) {
                items.push(Node::Ref(Reference::to(&entity)));
                appended = true;
            }
        });
        if !appended {
            let scope = root.begin_mutation();
            root.remove(&scope, &key);
            return Err(QueryError::NotAnArray(format!("{}{}", self.target.name(), self.path)));
        }
        debug!(placeholder = %key, target = self.target.name(), "optimistic insert");
        Ok(key)
    }

    fn placeholder_key(&self) -> Option<EntityKey> {
        let id = Identifier::from_json(self.payload.get(self.model.identifier()?)?)?;
        Some(EntityKey::new(self.model.name(), id))
    }

    fn rollback(&self, mutation: &Query, placeholder: &EntityKey) {
        self.target.update_data(|data| {
            if let Some(items) = array_at(data, &self.path) {
                items.retain(|node| node.as_reference().map(Reference::key) != Some(placeholder));
            }
        });
        let scope = mutation.root().begin_mutation();
        mutation.root().remove(&scope, placeholder);
        debug!(placeholder = %placeholder, "optimistic insert rolled back");
    }
}

fn array_at<'a>(data: &'a mut Node, path: &str) -> Option<&'a mut Vec<Node>> {
    let node = if path.is_empty() {
        data
    } else {
        data.pointer_mut(path)?
    };
    node.as_array_mut()
}

fn find_slot<'a>(data: &'a mut Node, path: &str, key: &EntityKey) -> Option<&'a mut Node> {
    array_at(data, path)?
        .iter_mut()
        .find(|node| node.as_reference().map(Reference::key) == Some(key))
}

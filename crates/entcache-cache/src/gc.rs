use std::collections::{BTreeMap, HashSet};

use entcache_store::{MutationScope, Node, RootStore};
use entcache_types::EntityKey;
use serde::Serialize;

/// Result of one collection pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub entities_removed: usize,
    pub removed_by_type: BTreeMap<String, usize>,
    pub reachable: usize,
}

/// What a call to [`QueryCache::run_gc`](crate::QueryCache::run_gc) did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GcOutcome {
    /// A deferred pass is already pending.
    Skipped,
    /// A request is in flight; the pass will be retried.
    Deferred,
    Collected(GcReport),
}

impl GcOutcome {
    pub fn report(&self) -> Option<&GcReport> {
        match self {
            Self::Collected(report) => Some(report),
            _ => None,
        }
    }
}

/// Mark phase: keys of every live entity reachable from `roots`.
///
/// Only arrays, value objects and references are followed. Each entity is
/// visited once, and references to entities that are gone end the walk.
pub fn collect_reachable<'a>(root: &RootStore, roots: impl IntoIterator<Item = &'a Node>) -> HashSet<EntityKey> {
    let mut reachable = HashSet::new();
    let mut stack: Vec<Node> = roots.into_iter().cloned().collect();

    while let Some(node) = stack.pop() {
        match node {
            Node::Array(items) => stack.extend(items),
            Node::Object(fields) => stack.extend(fields.into_values()),
            Node::Ref(reference) => {
                if reachable.contains(reference.key()) {
                    continue;
                }
                let Some(entity) = root.get(reference.key()).filter(|e| e.is_alive()) else {
                    continue;
                };
                reachable.insert(reference.key().clone());
                stack.extend(entity.fields().into_values());
            }
            _ => {}
        }
    }
    reachable
}

/// Sweep phase: remove every entity whose key is not in `reachable`.
pub fn sweep(root: &RootStore, scope: &MutationScope<'_>, reachable: &HashSet<EntityKey>) -> GcReport {
    let mut report = GcReport {
        reachable: reachable.len(),
        ..GcReport::default()
    };
    for key in root.keys() {
        if reachable.contains(&key) {
            continue;
        }
        if root.remove(scope, &key) {
            report.entities_removed += 1;
            *report
                .removed_by_type
                .entry(key.type_name().to_string())
                .or_default() += 1;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use entcache_schema::ModelType;
    use entcache_store::{Entity, Reference};

    fn root() -> RootStore {
        let root = RootStore::new();
        root.register_model(ModelType::entity("User", "id").build()).unwrap();
        root
    }

    fn user(root: &RootStore, id: &str, friend: Option<&Arc<Entity>>) -> Arc<Entity> {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Node::from(id));
        if let Some(friend) = friend {
            fields.insert("friend".to_string(), Node::Ref(Reference::to(friend)));
        }
        let entity = Entity::new(EntityKey::new("User", id), fields);
        let scope = root.begin_mutation();
        root.insert(&scope, entity.clone()).unwrap();
        entity
    }

    // -----------------------------------------------------------------------
    // Mark
    // -----------------------------------------------------------------------

    #[test]
    fn follows_references_through_entities() {
        let root = root();
        let c = user(&root, "c", None);
        let b = user(&root, "b", Some(&c));
        let a = user(&root, "a", Some(&b));
        user(&root, "orphan", None);

        let data = Node::Array(vec![Node::Ref(Reference::to(&a))]);
        let reachable = collect_reachable(&root, [&data]);
        assert_eq!(reachable.len(), 3);
        assert!(!reachable.contains(&EntityKey::new("User", "orphan")));
    }

    #[test]
    fn cycles_terminate() {
        let root = root();
        let a = user(&root, "a", None);
        let b = user(&root, "b", Some(&a));
        {
            let scope = root.begin_mutation();
            a.set(&scope, "friend", Node::Ref(Reference::to(&b)));
        }
        let data = Node::Ref(Reference::to(&a));
        assert_eq!(collect_reachable(&root, [&data]).len(), 2);
    }

    #[test]
    fn value_objects_and_frozen_blobs() {
        let root = root();
        let a = user(&root, "a", None);
        let data = Node::Object(BTreeMap::from([
            ("nested".to_string(), Node::Object(BTreeMap::from([("who".to_string(), Node::Ref(Reference::to(&a)))]))),
            ("blob".to_string(), Node::Frozen(serde_json::json!({"id": "b"}))),
        ]));
        let reachable = collect_reachable(&root, [&data]);
        assert_eq!(reachable.len(), 1);
    }

    #[test]
    fn dead_references_are_skipped() {
        let root = root();
        let a = user(&root, "a", None);
        let data = Node::Ref(Reference::to(&a));
        {
            let scope = root.begin_mutation();
            root.remove(&scope, a.key());
        }
        assert!(collect_reachable(&root, [&data]).is_empty());
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    #[test]
    fn sweep_removes_unreachable_only() {
        let root = root();
        let keep = user(&root, "keep", None);
        let drop_me = user(&root, "drop", None);

        let data = Node::Ref(Reference::to(&keep));
        let reachable = collect_reachable(&root, [&data]);
        let report = {
            let scope = root.begin_mutation();
            sweep(&root, &scope, &reachable)
        };

        assert_eq!(report.entities_removed, 1);
        assert_eq!(report.removed_by_type.get("User"), Some(&1));
        assert_eq!(report.reachable, 1);
        assert!(keep.is_alive());
        assert!(!drop_me.is_alive());
    }
}

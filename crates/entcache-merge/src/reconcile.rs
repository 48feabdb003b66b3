//! Field reconciliation for entities and value objects.

use std::collections::BTreeMap;

use entcache_store::Node;

/// Overlay `incoming` onto `target` and return the top-level fields whose
/// value changed.
///
/// A plain nested object arriving on top of a plain nested object is
/// overlaid key by key, so sibling fields absent from a partial update
/// survive. Everything else (arrays, frozen blobs, scalars, references) is
/// assigned wholesale when it differs.
pub fn merge_objects(target: &mut BTreeMap<String, Node>, incoming: BTreeMap<String, Node>) -> Vec<String> {
    let mut changed = Vec::new();
    for (field, value) in incoming {
        if overlay(target, field.clone(), value) {
            changed.push(field);
        }
    }
    changed
}

fn overlay(target: &mut BTreeMap<String, Node>, field: String, value: Node) -> bool {
    if let Node::Object(next) = value {
        if let Some(Node::Object(existing)) = target.get_mut(&field) {
            let mut changed = false;
            for (key, nested) in next {
                changed |= overlay(existing, key, nested);
            }
            return changed;
        }
        return assign(target, field, Node::Object(next));
    }
    assign(target, field, value)
}

fn assign(target: &mut BTreeMap<String, Node>, field: String, value: Node) -> bool {
    match target.get(&field) {
        Some(current) if *current == value => false,
        _ => {
            target.insert(field, value);
            true
        }
    }
}

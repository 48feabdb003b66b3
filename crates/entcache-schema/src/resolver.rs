//! Type resolution: unwrap a descriptor down to its concrete type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::descriptor::{TypeDescriptor, UnionType, MAX_LAZY_DEPTH};

/// How a union without a dispatcher picks a structured branch.
///
/// Every policy is a heuristic. A union of several entity types without a
/// dispatcher cannot be resolved correctly for every schema; declare a
/// dispatcher when the branches overlap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionPolicy {
    /// Prefer the first branch that resolves to a model type.
    #[default]
    FirstStructured,
    /// Prefer the first model branch whose shape matches the observed
    /// object, then fall back to `FirstStructured`.
    ShapeMatch,
    /// Only resolve when exactly one branch is a model type.
    Strict,
}

/// Resolves descriptors to concrete types. Pure, no state beyond policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeResolver {
    policy: UnionPolicy,
}

impl TypeResolver {
    pub fn new(policy: UnionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnionPolicy {
        self.policy
    }

    /// Resolve the concrete type behind `desc`.
    ///
    /// Optional, array, reference and lazy wrappers are unwrapped one level
    /// at a time. A union uses its dispatcher when both a dispatcher and an
    /// observed value are present, otherwise the configured [`UnionPolicy`].
    /// An unresolvable union is returned as-is.
    pub fn resolve(&self, desc: &TypeDescriptor, observed: Option<&Value>) -> TypeDescriptor {
        self.resolve_at(desc, observed, 0)
    }

    /// Resolve straight to a model type, if one can be determined.
    pub fn resolve_model(
        &self,
        desc: &TypeDescriptor,
        observed: Option<&Value>,
    ) -> Option<std::sync::Arc<crate::ModelType>> {
        self.resolve(desc, observed).as_model().cloned()
    }

    fn resolve_at(
        &self,
        desc: &TypeDescriptor,
        observed: Option<&Value>,
        depth: usize,
    ) -> TypeDescriptor {
        if depth > MAX_LAZY_DEPTH {
            trace!(desc = %desc, "resolution depth exceeded");
            return desc.clone();
        }
        match desc {
            TypeDescriptor::Optional(inner) => {
                let observed = observed.filter(|v| !v.is_null());
                self.resolve_at(inner, observed, depth + 1)
            }
            // The observed value is the array itself, not an element.
            TypeDescriptor::Array(inner) => self.resolve_at(inner, None, depth + 1),
            TypeDescriptor::Reference(inner) => {
                let observed = observed.filter(|v| v.is_object());
                self.resolve_at(inner, observed, depth + 1)
            }
            TypeDescriptor::Lazy(lazy) => self.resolve_at(&lazy.evaluate(), observed, depth + 1),
            TypeDescriptor::Union(union) => self.resolve_union(desc, union, observed, depth),
            _ => desc.clone(),
        }
    }

    fn resolve_union(
        &self,
        desc: &TypeDescriptor,
        union: &UnionType,
        observed: Option<&Value>,
        depth: usize,
    ) -> TypeDescriptor {
        if let (Some(dispatch), Some(value)) = (&union.dispatcher, observed) {
            if let Some(branch) = dispatch(value).and_then(|i| union.branches.get(i)) {
                return self.resolve_at(branch, observed, depth + 1);
            }
        }

        let resolved: Vec<TypeDescriptor> = union
            .branches
            .iter()
            .map(|b| self.resolve_at(b, observed, depth + 1))
            .collect();

        match self.pick_structured(&resolved, observed) {
            Some(found) => found,
            None => desc.clone(),
        }
    }

    fn pick_structured(
        &self,
        resolved: &[TypeDescriptor],
        observed: Option<&Value>,
    ) -> Option<TypeDescriptor> {
        let mut structured = resolved.iter().filter(|d| d.is_structured());
        match self.policy {
            UnionPolicy::FirstStructured => structured.next().cloned(),
            UnionPolicy::ShapeMatch => {
                let matching = observed.and_then(|value| {
                    resolved
                        .iter()
                        .filter(|d| d.is_structured())
                        .find(|d| model_shape_matches(d, value))
                });
                matching.or_else(|| structured.next()).cloned()
            }
            UnionPolicy::Strict => {
                let first = structured.next()?;
                if structured.next().is_some() {
                    None
                } else {
                    Some(first.clone())
                }
            }
        }
    }

    /// Pick the union branch to merge an observed value against.
    ///
    /// Order: the dispatcher, then (for objects) the union policy, then the
    /// first branch whose wire shape accepts the value. Returns `None` when
    /// no branch fits.
    pub fn select_branch(&self, union: &UnionType, observed: &Value) -> Option<TypeDescriptor> {
        if let Some(dispatch) = &union.dispatcher {
            if let Some(branch) = dispatch(observed).and_then(|i| union.branches.get(i)) {
                return Some(branch.clone());
            }
        }

        if observed.is_object() {
            let resolved: Vec<TypeDescriptor> = union
                .branches
                .iter()
                .map(|b| self.resolve(b, Some(observed)))
                .collect();
            if let Some(found) = self.pick_structured(&resolved, Some(observed)) {
                return Some(found);
            }
        }

        union
            .branches
            .iter()
            .find(|b| b.accepts_shape(observed))
            .cloned()
    }
}

fn model_shape_matches(desc: &TypeDescriptor, value: &Value) -> bool {
    let (Some(model), Value::Object(map)) = (desc.as_model(), value) else {
        return false;
    };
    if let Some(id) = model.identifier() {
        if !map.contains_key(id) {
            return false;
        }
    }
    map.keys().all(|k| model.field(k).is_some())
}

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ModelType;

/// Scalar leaf kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
    /// RFC 3339 string or epoch milliseconds on the wire.
    Date,
    /// Any JSON scalar.
    Any,
}

impl ScalarKind {
    /// Whether a JSON value has the wire shape of this scalar.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Date => value.is_string() || value.is_number(),
            Self::Any => !value.is_object() && !value.is_array(),
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Lazy chains deeper than this are treated as unresolvable.
pub const MAX_LAZY_DEPTH: usize = 64;

/// Picks a union branch (by index) for an observed value.
pub type Dispatcher = Arc<dyn Fn(&Value) -> Option<usize> + Send + Sync>;

/// A union of alternative types, optionally with a dispatcher.
#[derive(Clone)]
pub struct UnionType {
    pub branches: Vec<TypeDescriptor>,
    pub dispatcher: Option<Dispatcher>,
}

impl fmt::Debug for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionType")
            .field("branches", &self.branches)
            .field("dispatcher", &self.dispatcher.is_some())
            .finish()
    }
}

/// A lazily evaluated descriptor, used for self-referential schemas.
#[derive(Clone)]
pub struct LazyType {
    name: String,
    thunk: Arc<dyn Fn() -> TypeDescriptor + Send + Sync>,
}

impl LazyType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self) -> TypeDescriptor {
        (self.thunk)()
    }
}

impl fmt::Debug for LazyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyType({})", self.name)
    }
}

/// Declared type of a value in fetched data.
#[derive(Clone, Debug)]
pub enum TypeDescriptor {
    Scalar(ScalarKind),
    /// Opaque JSON blob, stored and replaced wholesale.
    Frozen,
    /// Identified model, tracked by the entity registry.
    Entity(Arc<ModelType>),
    /// Non-identified model, reconciled structurally.
    ValueObject(Arc<ModelType>),
    Array(Box<TypeDescriptor>),
    /// Persisted as an identifier, observed as the live entity.
    Reference(Box<TypeDescriptor>),
    Union(UnionType),
    Optional(Box<TypeDescriptor>),
    Lazy(LazyType),
}

impl TypeDescriptor {
    pub fn string() -> Self {
        Self::Scalar(ScalarKind::String)
    }

    pub fn number() -> Self {
        Self::Scalar(ScalarKind::Number)
    }

    pub fn boolean() -> Self {
        Self::Scalar(ScalarKind::Boolean)
    }

    pub fn date() -> Self {
        Self::Scalar(ScalarKind::Date)
    }

    /// `Entity` when the model declares an identifier, `ValueObject` otherwise.
    pub fn model(model: Arc<ModelType>) -> Self {
        if model.is_entity() {
            Self::Entity(model)
        } else {
            Self::ValueObject(model)
        }
    }

    pub fn array(inner: TypeDescriptor) -> Self {
        Self::Array(Box::new(inner))
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn reference(inner: TypeDescriptor) -> Self {
        Self::Reference(Box::new(inner))
    }

    pub fn union(branches: Vec<TypeDescriptor>) -> Self {
        Self::Union(UnionType {
            branches,
            dispatcher: None,
        })
    }

    pub fn union_with<F>(branches: Vec<TypeDescriptor>, dispatcher: F) -> Self
    where
        F: Fn(&Value) -> Option<usize> + Send + Sync + 'static,
    {
        Self::Union(UnionType {
            branches,
            dispatcher: Some(Arc::new(dispatcher)),
        })
    }

    pub fn lazy<F>(name: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> TypeDescriptor + Send + Sync + 'static,
    {
        Self::Lazy(LazyType {
            name: name.into(),
            thunk: Arc::new(thunk),
        })
    }

    /// Whether this is a model type (entity or value object).
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Entity(_) | Self::ValueObject(_))
    }

    /// The model behind an `Entity` or `ValueObject` descriptor.
    pub fn as_model(&self) -> Option<&Arc<ModelType>> {
        match self {
            Self::Entity(m) | Self::ValueObject(m) => Some(m),
            _ => None,
        }
    }

    /// Whether a declared field of this type may be absent when an entity
    /// is first created.
    pub fn is_defaultable(&self) -> bool {
        self.is_defaultable_at(0)
    }

    fn is_defaultable_at(&self, depth: usize) -> bool {
        match self {
            Self::Optional(_) | Self::Array(_) | Self::Frozen => true,
            Self::Lazy(lazy) if depth < MAX_LAZY_DEPTH => lazy.evaluate().is_defaultable_at(depth + 1),
            _ => false,
        }
    }

    /// Whether a value has the wire shape of this type, without looking
    /// past the first level of a model.
    pub fn accepts_shape(&self, value: &Value) -> bool {
        self.accepts_shape_at(value, 0)
    }

    fn accepts_shape_at(&self, value: &Value, depth: usize) -> bool {
        match self {
            Self::Scalar(kind) => kind.accepts(value),
            Self::Frozen => true,
            Self::Entity(model) => match value {
                Value::Object(map) => model.identifier().is_some_and(|id| map.contains_key(id)),
                other => other.is_string() || other.is_number(),
            },
            Self::ValueObject(_) => value.is_object(),
            Self::Array(_) => value.is_array(),
            Self::Reference(inner) => match value {
                Value::String(_) | Value::Number(_) => true,
                other => inner.accepts_shape_at(other, depth),
            },
            Self::Union(u) => u.branches.iter().any(|b| b.accepts_shape_at(value, depth)),
            Self::Optional(inner) => value.is_null() || inner.accepts_shape_at(value, depth),
            Self::Lazy(lazy) => depth < MAX_LAZY_DEPTH && lazy.evaluate().accepts_shape_at(value, depth + 1),
        }
    }
}

impl From<Arc<ModelType>> for TypeDescriptor {
    fn from(model: Arc<ModelType>) -> Self {
        Self::model(model)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Frozen => f.write_str("frozen"),
            Self::Entity(m) | Self::ValueObject(m) => f.write_str(m.name()),
            Self::Array(inner) => write!(f, "[{inner}]"),
            Self::Reference(inner) => write!(f, "ref({inner})"),
            Self::Optional(inner) => write!(f, "{inner}?"),
            Self::Lazy(lazy) => write!(f, "lazy({})", lazy.name()),
            Self::Union(u) => {
                for (i, branch) in u.branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{branch}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item() -> Arc<ModelType> {
        ModelType::entity("Item", "id")
            .field("description", TypeDescriptor::string())
            .build()
    }

    #[test]
    fn model_picks_entity_or_value_object() {
        assert!(matches!(TypeDescriptor::model(item()), TypeDescriptor::Entity(_)));
        let addr = ModelType::value("Address").build();
        assert!(matches!(TypeDescriptor::model(addr), TypeDescriptor::ValueObject(_)));
    }

    #[test]
    fn display_describes_wrappers() {
        let desc = TypeDescriptor::optional(TypeDescriptor::array(TypeDescriptor::reference(
            TypeDescriptor::model(item()),
        )));
        assert_eq!(desc.to_string(), "[ref(Item)]?");

        let u = TypeDescriptor::union(vec![TypeDescriptor::string(), TypeDescriptor::number()]);
        assert_eq!(u.to_string(), "string | number");
    }

    #[test]
    fn defaultable_fields() {
        assert!(TypeDescriptor::array(TypeDescriptor::string()).is_defaultable());
        assert!(TypeDescriptor::optional(TypeDescriptor::string()).is_defaultable());
        assert!(TypeDescriptor::Frozen.is_defaultable());
        assert!(!TypeDescriptor::string().is_defaultable());
        assert!(!TypeDescriptor::model(item()).is_defaultable());
    }

    #[test]
    fn shape_acceptance() {
        let entity = TypeDescriptor::model(item());
        assert!(entity.accepts_shape(&json!({"id": "a"})));
        assert!(!entity.accepts_shape(&json!({"description": "no id"})));
        assert!(entity.accepts_shape(&json!("a")));
        assert!(TypeDescriptor::date().accepts_shape(&json!("2024-01-01T00:00:00Z")));
        assert!(!TypeDescriptor::boolean().accepts_shape(&json!(1)));
        assert!(TypeDescriptor::optional(TypeDescriptor::number()).accepts_shape(&json!(null)));
    }

    fn looping() -> TypeDescriptor {
        TypeDescriptor::lazy("Loop", looping)
    }

    #[test]
    fn lazy_cycles_are_neither_defaultable_nor_accepting() {
        assert!(!looping().is_defaultable());
        assert!(!looping().accepts_shape(&json!({"id": "a"})));
        assert!(!TypeDescriptor::optional(looping()).accepts_shape(&json!(1)));

        let wrapped = TypeDescriptor::lazy("Tags", || TypeDescriptor::array(TypeDescriptor::string()));
        assert!(wrapped.is_defaultable());
    }

    #[test]
    fn lazy_evaluates_thunk() {
        let lazy = TypeDescriptor::lazy("Item", || TypeDescriptor::model(item()));
        match lazy {
            TypeDescriptor::Lazy(l) => {
                assert_eq!(l.name(), "Item");
                assert!(l.evaluate().is_structured());
            }
            other => panic!("expected Lazy, got {other:?}"),
        }
    }
}

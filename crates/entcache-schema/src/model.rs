use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::{ScalarKind, TypeDescriptor};

/// A declared model: either an identified entity type or a value object.
#[derive(Debug)]
pub struct ModelType {
    name: String,
    identifier: Option<String>,
    fields: BTreeMap<String, TypeDescriptor>,
}

impl ModelType {
    /// Start declaring an entity type whose identity lives in `id_field`.
    ///
    /// The identifier field is declared as a string unless overridden with
    /// [`ModelTypeBuilder::field`].
    pub fn entity(name: impl Into<String>, id_field: impl Into<String>) -> ModelTypeBuilder {
        let id_field = id_field.into();
        let mut fields = BTreeMap::new();
        fields.insert(id_field.clone(), TypeDescriptor::Scalar(ScalarKind::String));
        ModelTypeBuilder {
            name: name.into(),
            identifier: Some(id_field),
            fields,
        }
    }

    /// Start declaring a value object type (no identity).
    pub fn value(name: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            name: name.into(),
            identifier: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the identifier field, if this is an entity type.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn is_entity(&self) -> bool {
        self.identifier.is_some()
    }

    pub fn field(&self, name: &str) -> Option<&TypeDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &TypeDescriptor)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Builder returned by [`ModelType::entity`] and [`ModelType::value`].
pub struct ModelTypeBuilder {
    name: String,
    identifier: Option<String>,
    fields: BTreeMap<String, TypeDescriptor>,
}

impl ModelTypeBuilder {
    /// Declare (or redeclare) a field.
    pub fn field(mut self, name: impl Into<String>, desc: TypeDescriptor) -> Self {
        self.fields.insert(name.into(), desc);
        self
    }

    pub fn build(self) -> Arc<ModelType> {
        Arc::new(ModelType {
            name: self.name,
            identifier: self.identifier,
            fields: self.fields,
        })
    }
}

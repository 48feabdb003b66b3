use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Identifier of an entity within its type.
///
/// Payloads may carry identifiers as strings or integers. Both are
/// normalised to their string form, so `4` and `"4"` address the same
/// entity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(Arc<str>);

impl Identifier {
    /// Create an identifier from its string form.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Read an identifier out of a JSON value.
    ///
    /// Returns `None` for anything other than a string or an integral number.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::new(s)),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self::new(n.to_string())),
            _ => None,
        }
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// JSON form of the identifier (always a string).
    pub fn to_json(&self) -> Value {
        Value::String(self.0.to_string())
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<i64> for Identifier {
    fn from(n: i64) -> Self {
        Self::new(n.to_string())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry key of an entity: its type name plus its identifier.
///
/// At most one live entity exists per key within a root store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    type_name: Arc<str>,
    id: Identifier,
}

impl EntityKey {
    pub fn new(type_name: impl AsRef<str>, id: impl Into<Identifier>) -> Self {
        Self {
            type_name: Arc::from(type_name.as_ref()),
            id: id.into(),
        }
    }

    /// Parse a key from its `Type:id` display form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        match s.split_once(':') {
            Some((ty, id)) if !ty.is_empty() && !id.is_empty() => Ok(Self::new(ty, id)),
            _ => Err(TypeError::InvalidKey(s.to_string())),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({}:{})", self.type_name, self.id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_string_ids_normalise() {
        let a = Identifier::from_json(&json!(4)).unwrap();
        let b = Identifier::from_json(&json!("4")).unwrap();
        assert_eq!(a, b);
        assert_eq!(Identifier::from(4i64), b);
    }

    #[test]
    fn non_identifier_json_is_rejected() {
        assert!(Identifier::from_json(&json!(1.5)).is_none());
        assert!(Identifier::from_json(&json!(null)).is_none());
        assert!(Identifier::from_json(&json!({"id": 1})).is_none());
        assert!(Identifier::from_json(&json!(true)).is_none());
    }

    #[test]
    fn key_display_and_parse() {
        let key = EntityKey::new("Item", "test");
        assert_eq!(key.to_string(), "Item:test");
        assert_eq!(EntityKey::parse("Item:test").unwrap(), key);
        assert_eq!(key.type_name(), "Item");
        assert_eq!(key.id().as_str(), "test");
    }

    #[test]
    fn parse_keeps_colons_in_id() {
        let key = EntityKey::parse("Doc:a:b").unwrap();
        assert_eq!(key.id().as_str(), "a:b");
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert!(EntityKey::parse("Item").is_err());
        assert!(EntityKey::parse(":x").is_err());
        assert!(EntityKey::parse("Item:").is_err());
    }

    #[test]
    fn keys_differ_by_type() {
        assert_ne!(EntityKey::new("Item", "1"), EntityKey::new("User", "1"));
    }

    #[test]
    fn identifier_serializes_as_plain_string() {
        let id = Identifier::new("ko");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("ko"));
        assert_eq!(id.to_json(), json!("ko"));
    }

    #[test]
    fn keys_deserialize_from_json() {
        let key = EntityKey::new("User", "ko");
        let value = serde_json::to_value(&key).unwrap();
        let back: EntityKey = serde_json::from_value(value).unwrap();
        assert_eq!(back, key);

        let id: Identifier = serde_json::from_value(json!("4")).unwrap();
        assert_eq!(id, Identifier::from(4i64));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn display_parse_roundtrip(ty in "[A-Z][a-zA-Z]{0,12}", id in "[a-z0-9:-]{1,16}") {
            let key = EntityKey::new(&ty, id.as_str());
            prop_assert_eq!(EntityKey::parse(&key.to_string()).unwrap(), key);
        }

        #[test]
        fn integer_ids_match_their_string_form(n in any::<i64>()) {
            let from_json = Identifier::from_json(&Value::from(n)).unwrap();
            prop_assert_eq!(from_json, Identifier::new(n.to_string()));
        }
    }
}

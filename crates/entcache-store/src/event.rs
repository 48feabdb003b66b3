use std::sync::Arc;

use entcache_types::EntityKey;

/// What happened to an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated { fields: Vec<String> },
    Removed,
}

/// A single recorded change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: EntityKey,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn created(key: EntityKey) -> Self {
        Self {
            key,
            kind: ChangeKind::Created,
        }
    }

    pub fn updated(key: EntityKey, fields: Vec<String>) -> Self {
        Self {
            key,
            kind: ChangeKind::Updated { fields },
        }
    }

    pub fn removed(key: EntityKey) -> Self {
        Self {
            key,
            kind: ChangeKind::Removed,
        }
    }
}

/// All changes recorded by one outermost mutation scope.
pub type ChangeBatch = Arc<Vec<ChangeEvent>>;

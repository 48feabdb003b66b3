use entcache_types::EntityKey;

/// Errors from root store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No model store is registered for the entity's type.
    #[error("no model store registered for type {0}")]
    MissingStore(String),

    /// A different live instance already holds this key.
    #[error("entity {0} already exists")]
    DuplicateIdentity(EntityKey),

    /// Only identified model types get a model store.
    #[error("model {0} has no identifier and cannot be stored")]
    NotAnEntityType(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

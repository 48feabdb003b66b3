use entcache_store::StoreError;
use thiserror::Error;

/// Merge failures. All of these indicate a schema or configuration problem
/// rather than a runtime condition.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("schema mismatch at {path}: expected {expected}, found {found}")]
    SchemaMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("missing identifier `{field}` for {type_name} at {path}")]
    MissingIdentifier {
        path: String,
        type_name: String,
        field: String,
    },

    #[error("missing required field `{field}` for {type_name} at {path}")]
    MissingField {
        path: String,
        type_name: String,
        field: String,
    },

    #[error("ambiguous union at {path}: {union}")]
    AmbiguousUnion { path: String, union: String },

    #[error("lazy type `{name}` does not resolve at {path}")]
    UnresolvedLazy { path: String, name: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type MergeResult<T> = Result<T, MergeError>;

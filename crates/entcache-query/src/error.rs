use entcache_merge::MergeError;
use thiserror::Error;

/// Configuration and schema failures. Endpoint failures are not errors at
/// this level; they are recorded on the query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no endpoint configured for {0}")]
    NoEndpoint(String),

    #[error("query {0} is disposed")]
    Disposed(String),

    #[error("optimistic target {0} is not an array")]
    NotAnArray(String),

    #[error("optimistic placeholder {0} already exists")]
    PlaceholderExists(String),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),
}

pub type QueryResult<T> = Result<T, QueryError>;

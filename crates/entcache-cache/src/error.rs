use entcache_types::QueryId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("query not cached: {0}")]
    QueryNotFound(QueryId),
}

pub type CacheResult<T> = Result<T, CacheError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("client is disposed")]
    Disposed,

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("store error: {0}")]
    Store(#[from] entcache_store::StoreError),

    #[error("merge error: {0}")]
    Merge(#[from] entcache_merge::MergeError),

    #[error("query error: {0}")]
    Query(#[from] entcache_query::QueryError),

    #[error("cache error: {0}")]
    Cache(#[from] entcache_cache::CacheError),
}

pub type SdkResult<T> = Result<T, SdkError>;

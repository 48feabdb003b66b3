//! Client API for entcache.
//!
//! A [`Client`] owns one entity graph ([`RootStore`]) and one
//! [`QueryCache`]. Queries fetched through it are normalized into the
//! graph, share entity instances with every other query, and keep their
//! entities alive until they are released and collected.
//!
//! ```no_run
//! use entcache_sdk::{endpoint_fn, Client, ModelType, QueryDef, TypeDescriptor, Variables};
//! use serde_json::json;
//!
//! # async fn demo() -> entcache_sdk::SdkResult<()> {
//! let user = ModelType::entity("User", "id")
//!     .field("name", TypeDescriptor::string())
//!     .build();
//! let client = Client::builder().model(user.clone()).build()?;
//!
//! let def = QueryDef::query("me", TypeDescriptor::model(user))
//!     .endpoint(endpoint_fn(|_| async { Ok(json!({"id": "ko", "name": "Kim"})) }))
//!     .build();
//! let me = client.query(def, Variables::new()).await?;
//! assert_eq!(me.data().get("name").unwrap().as_str(), Some("Kim"));
//! client.release(&me)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{SdkError, SdkResult};

pub use entcache_cache::{GcOutcome, GcReport, QueryCache};
pub use entcache_query::{
    endpoint_fn, AbortSignal, Endpoint, EndpointArgs, EndpointError, FetchResult, OptimisticInsert, Query,
    QueryDef, QueryHandle, QueryKind, QueryStatus, RunMode, Variables,
};
pub use entcache_schema::{ModelType, TypeDescriptor, TypeResolver, UnionPolicy};
pub use entcache_store::{ChangeBatch, ChangeEvent, ChangeKind, Entity, Node, Reference, Resolved, RootStore};
pub use entcache_types::{EntityKey, Identifier, QueryId};

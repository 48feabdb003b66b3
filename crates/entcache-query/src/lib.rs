//! Query, mutation and subscription lifecycle for entcache.
//!
//! A [`Query`] binds one [`QueryDef`] to its fetch state: merged `data`,
//! `request` and `pagination`, in-flight flags, the last endpoint error and
//! the time of the last successful completion. Each handler allows a single
//! request in flight; starting a new one aborts and discards the previous.
//!
//! ```text
//! idle ──► loading ──► fetched | errored
//! fetched ──► refetching ──► fetched | errored
//! fetched ──► fetching more ──► fetched
//! ```

pub mod def;
pub mod endpoint;
pub mod error;
pub mod optimistic;
pub mod query;
pub mod signal;
pub mod status;
pub mod variables;

pub use def::{QueryDef, QueryKind};
pub use endpoint::{endpoint_fn, Endpoint, EndpointArgs, EndpointError};
pub use error::{QueryError, QueryResult};
pub use optimistic::OptimisticInsert;
pub use query::{FetchResult, Query, QueryHandle, QueryOptions, RunMode};
pub use signal::AbortSignal;
pub use status::QueryStatus;
pub use variables::Variables;

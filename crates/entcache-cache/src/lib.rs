//! Query cache and entity garbage collection for entcache.
//!
//! The [`QueryCache`] tracks every live query, mutation and subscription,
//! grouped by definition name. Removing a query triggers a mark-and-sweep
//! pass over the entity graph: entities not reachable from the `data`,
//! `request` or `pagination` of any cached query are removed.
//!
//! A pass never runs while a request is in flight. It is deferred and
//! retried after a fixed delay, with at most one retry pending at a time.

pub mod cache;
pub mod error;
pub mod gc;

pub use cache::QueryCache;
pub use error::{CacheError, CacheResult};
pub use gc::{collect_reachable, sweep, GcOutcome, GcReport};

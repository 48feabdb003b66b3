//! Foundation types for entcache.
//!
//! Every other entcache crate depends on `entcache-types`. It carries the
//! identity primitives used to key the entity registry and the query cache.
//!
//! # Key Types
//!
//! - [`Identifier`]: Entity identifier, normalised to its string form
//! - [`EntityKey`]: `(type name, identifier)` pair, unique per live entity
//! - [`QueryId`]: UUID v7 identifier for a query/mutation/subscription instance

pub mod error;
pub mod identity;
pub mod query_id;

pub use error::TypeError;
pub use identity::{EntityKey, Identifier};
pub use query_id::QueryId;

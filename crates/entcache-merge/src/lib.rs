//! Merge engine for entcache.
//!
//! Converts raw fetched JSON into graph-consistent [`Node`]s. Identified
//! objects are normalized into the entity graph: an existing instance is
//! reconciled in place, a new one is created and registered. Values without
//! an identifier are merged structurally and never registered.
//!
//! ```text
//! raw JSON ──► Merger ──► TypeResolver (union / lazy / wrapper dispatch)
//!                │
//!                ├─► RootStore::get      existing entity? update in place
//!                └─► RootStore::insert   otherwise create
//! ```
//!
//! [`Node`]: entcache_store::Node

pub mod error;
pub mod merger;
pub mod reconcile;

pub use error::{MergeError, MergeResult};
pub use merger::{merge, Merger};
pub use reconcile::merge_objects;

//! Canonical in-memory entity graph for entcache.
//!
//! This crate owns every live entity instance. Each registered entity type
//! gets one [`ModelStore`] (identifier → instance); the [`EntityRegistry`]
//! mirrors all stores under a cross-type [`EntityKey`](entcache_types::EntityKey)
//! index so the merge engine can answer "does this entity already exist"
//! in one lookup. Both live inside a [`RootStore`].
//!
//! # Design Rules
//!
//! 1. At most one live instance exists per `(type, identifier)`.
//! 2. Entities are updated in place, never replaced.
//! 3. References never own entities; the model store does.
//! 4. Every write happens inside a [`MutationScope`]. Change events recorded
//!    in a scope are delivered as one batch when the outermost scope ends.
//! 5. Writes that do not change a value record nothing.

pub mod entity;
pub mod error;
pub mod event;
pub mod model_store;
pub mod node;
pub mod registry;
pub mod root;
pub mod scope;

pub use entity::Entity;
pub use error::{StoreError, StoreResult};
pub use event::{ChangeBatch, ChangeEvent, ChangeKind};
pub use model_store::ModelStore;
pub use node::{Node, Reference, Resolved};
pub use registry::EntityRegistry;
pub use root::RootStore;
pub use scope::MutationScope;

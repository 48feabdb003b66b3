//! Schema declarations and type resolution for entcache.
//!
//! Callers describe the shape of fetched data with a [`TypeDescriptor`]: a
//! closed set of wrappers (array, optional, reference, union, lazy) around
//! scalars and model types. Model types with an identifier field are
//! entities; model types without one are value objects.
//!
//! The [`TypeResolver`] unwraps a descriptor down to the concrete type it
//! stands for, optionally consulting an observed JSON value to pick a union
//! branch. Resolution is pure: it never touches a store.

pub mod descriptor;
pub mod model;
pub mod resolver;

pub use descriptor::{Dispatcher, LazyType, ScalarKind, TypeDescriptor, UnionType, MAX_LAZY_DEPTH};
pub use model::{ModelType, ModelTypeBuilder};
pub use resolver::{TypeResolver, UnionPolicy};

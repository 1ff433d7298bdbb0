//! # ember_core - Ember Runtime Core
//!
//! Small, dependency-light primitives the component runtime is built on:
//! - **Handles**: generational `(slot, generation)` references with stale detection
//! - **Type hashes**: stable 32-bit identities derived from declared type names
//! - **Type registry**: names, kinds and single-inheritance chains keyed by hash
//!
//! Nothing in here knows about scene objects or components; `ember_world`
//! layers the object graph, message routing and scheduling on top.

pub mod error;
pub mod handle;
pub mod type_hash;
pub mod type_registry;

pub use error::*;
pub use handle::*;
pub use type_hash::*;
pub use type_registry::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, HandleError, Result, TypeRegistryError};
    pub use crate::handle::{Handle, HandleMap};
    pub use crate::type_hash::TypeHash;
    pub use crate::type_registry::{TypeInfo, TypeKind, TypeRegistry};
}

//! Error types for the world runtime

use ember_core::{HandleError, TypeHash, TypeRegistryError};
use thiserror::Error;

use crate::object::ObjectHandle;

/// Errors reported by world operations
///
/// Lookups and message sends never produce these; a stale handle there just
/// means "not found". Only creation and configuration report failures.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The handle does not refer to a live object or component
    #[error("Invalid handle: {0}")]
    InvalidHandle(HandleError),

    /// The object or component table is full
    #[error("{table} table is full ({capacity} slots)")]
    CapacityExceeded { table: &'static str, capacity: u32 },

    /// No factory is registered for the requested component type
    #[error("Unknown component type {0}")]
    UnknownComponentType(TypeHash),

    /// A concrete component type was used before being registered
    #[error("Component type '{0}' is not registered")]
    UnregisteredComponentType(&'static str),

    /// Re-parenting would make an object its own ancestor
    #[error("Parenting {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        child: ObjectHandle,
        parent: ObjectHandle,
    },

    /// Registration failed
    #[error("Registry error: {0}")]
    Registry(#[from] TypeRegistryError),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl WorldError {
    pub(crate) fn from_handle(table: &'static str, error: HandleError) -> Self {
        match error {
            HandleError::CapacityExceeded { capacity } => Self::CapacityExceeded { table, capacity },
            other => Self::InvalidHandle(other),
        }
    }
}

/// Result type alias for world operations
pub type WorldResult<T> = Result<T, WorldError>;

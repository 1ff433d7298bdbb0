//! Error types for the core library

use thiserror::Error;

use crate::type_hash::TypeHash;

/// The core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Handle error
    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),
    /// Type registry error
    #[error("Type registry error: {0}")]
    TypeRegistry(#[from] TypeRegistryError),
    /// Generic error with message
    #[error("{0}")]
    Message(Box<str>),
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

/// Handle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    /// Handle is null
    #[error("Handle is null")]
    Null,
    /// Handle is stale (generation mismatch)
    #[error("Handle is stale (already freed)")]
    Stale,
    /// Handle index out of bounds
    #[error("Handle index out of bounds")]
    OutOfBounds,
    /// Every slot of a bounded table is in use
    #[error("Handle table capacity of {capacity} slots exceeded")]
    CapacityExceeded { capacity: u32 },
}

/// Type registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeRegistryError {
    /// Two different declared names produced the same 32-bit hash
    #[error("Type '{name}' hashes to {hash} which is already taken by '{existing}'")]
    HashCollision {
        name: Box<str>,
        existing: Box<str>,
        hash: TypeHash,
    },
    /// A component type names a base type that was never registered
    #[error("Type '{name}' derives from unregistered base '{base}'")]
    UnknownBase { name: Box<str>, base: Box<str> },
    /// A name was registered once as a message and once as a component
    #[error("Type '{name}' is already registered with a different kind")]
    KindMismatch { name: Box<str> },
    /// A component kind was registered again with a different base
    #[error("Type '{name}' is already registered with a different base type")]
    BaseChanged { name: Box<str> },
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Message(s.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Message(s.into_boxed_str())
    }
}

//! Registry of declared type identities
//!
//! Maps a [`TypeHash`] back to the declared name, the kind of type it
//! identifies, and (for components) the single base type it derives from.
//! "Is-a-kind-of" queries walk the recorded base chain instead of relying on
//! any language-level inheritance.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::TypeRegistryError;
use crate::type_hash::TypeHash;

/// What a registered identity describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A message kind
    Message,
    /// A component kind
    Component,
}

/// Information about a registered type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    /// Stable identity
    pub hash: TypeHash,
    /// Declared name the identity was derived from
    pub name: Box<str>,
    /// Message or component
    pub kind: TypeKind,
    /// Base type for components with a parent type
    pub base: Option<TypeHash>,
}

/// Central registry for all declared type identities
#[derive(Default)]
pub struct TypeRegistry {
    by_hash: BTreeMap<TypeHash, TypeInfo>,
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message kind by its declared name.
    ///
    /// Registering the same name again returns the same identity.
    pub fn register_message_type(&mut self, name: &str) -> Result<TypeHash, TypeRegistryError> {
        self.insert(name, TypeKind::Message, None)
    }

    /// Register a component kind, optionally deriving from an already registered base.
    ///
    /// The base of a registered kind is fixed; registering it again with a
    /// different base fails, which keeps every base chain acyclic.
    pub fn register_component_type(
        &mut self,
        name: &str,
        base: Option<&str>,
    ) -> Result<TypeHash, TypeRegistryError> {
        let base_hash = match base {
            Some(base_name) => {
                let hash = TypeHash::of_name(base_name);
                match self.by_hash.get(&hash) {
                    Some(info) if info.kind == TypeKind::Component && &*info.name == base_name => {
                        Some(hash)
                    }
                    _ => {
                        return Err(TypeRegistryError::UnknownBase {
                            name: name.into(),
                            base: base_name.into(),
                        })
                    }
                }
            }
            None => None,
        };
        self.insert(name, TypeKind::Component, base_hash)
    }

    fn insert(
        &mut self,
        name: &str,
        kind: TypeKind,
        base: Option<TypeHash>,
    ) -> Result<TypeHash, TypeRegistryError> {
        let hash = TypeHash::of_name(name);

        if let Some(existing) = self.by_hash.get(&hash) {
            if &*existing.name != name {
                return Err(TypeRegistryError::HashCollision {
                    name: name.into(),
                    existing: existing.name.clone(),
                    hash,
                });
            }
            if existing.kind != kind {
                return Err(TypeRegistryError::KindMismatch { name: name.into() });
            }
            if existing.base != base {
                return Err(TypeRegistryError::BaseChanged { name: name.into() });
            }
            return Ok(hash);
        }

        self.by_hash.insert(
            hash,
            TypeInfo {
                hash,
                name: name.into(),
                kind,
                base,
            },
        );
        Ok(hash)
    }

    /// Get type info by hash
    pub fn get(&self, hash: TypeHash) -> Option<&TypeInfo> {
        self.by_hash.get(&hash)
    }

    /// Get type info by declared name
    pub fn get_by_name(&self, name: &str) -> Option<&TypeInfo> {
        self.get(TypeHash::of_name(name))
            .filter(|info| &*info.name == name)
    }

    /// Check if a hash is registered
    pub fn contains(&self, hash: TypeHash) -> bool {
        self.by_hash.contains_key(&hash)
    }

    /// Get the base type of a component type
    pub fn base_of(&self, hash: TypeHash) -> Option<TypeHash> {
        self.by_hash.get(&hash).and_then(|info| info.base)
    }

    /// Iterate `hash` followed by each of its ancestors, nearest first
    pub fn ancestry(&self, hash: TypeHash) -> impl Iterator<Item = TypeHash> + '_ {
        let start = self.contains(hash).then_some(hash);
        std::iter::successors(start, move |current| self.base_of(*current))
    }

    /// Check whether `hash` is `ancestor` or derives from it
    pub fn is_kind_of(&self, hash: TypeHash, ancestor: TypeHash) -> bool {
        self.ancestry(hash).any(|h| h == ancestor)
    }

    /// Iterate over all registered types
    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.by_hash.values()
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.by_hash.len())
            .finish()
    }
}

//! Messages exchanged between components
//!
//! Every message carries a [`TypeHash`] identity derived from its declared
//! name. Native message structs implement [`MessageType`] and get the
//! object-safe [`Message`] trait for free; messages declared only by name on
//! the script side travel as [`ScriptMessage`].

use std::any::Any;
use std::fmt;

use ember_core::TypeHash;
use serde::{Deserialize, Serialize};

use crate::component::ComponentHandle;
use crate::object::ObjectHandle;

/// A typed, mutable record delivered to component handlers
pub trait Message: Any + Send {
    /// Identity used to look up handlers
    fn type_hash(&self) -> TypeHash;

    /// Declared name, for diagnostics
    fn type_name(&self) -> &str;

    /// Whether a handler marked the message as handled
    fn is_consumed(&self) -> bool {
        false
    }

    /// Mark the message as handled (no-op for kinds without the flag)
    fn set_consumed(&mut self, _consumed: bool) {}

    /// Owned copy, used when a delivery has to wait for a busy component
    fn boxed_clone(&self) -> Box<dyn Message>;

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting to the concrete type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Message {
    /// Downcast to a concrete message type
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref()
    }

    /// Downcast to a mutable concrete message type
    pub fn downcast_mut<M: Message>(&mut self) -> Option<&mut M> {
        self.as_any_mut().downcast_mut()
    }
}

impl fmt::Debug for dyn Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name())
            .field("hash", &self.type_hash())
            .finish()
    }
}

/// A native message kind with a declared name.
///
/// Messages are plain records and must be `Clone`.
///
/// ```ignore
/// #[derive(Clone)]
/// struct MsgDamage { amount: f32 }
///
/// impl MessageType for MsgDamage {
///     const NAME: &'static str = "MsgDamage";
/// }
/// ```
pub trait MessageType: Any + Send + Clone {
    /// Declared name; the type identity is derived from it
    const NAME: &'static str;

    /// Type identity of this message kind
    const HASH: TypeHash = TypeHash::of_name(Self::NAME);

    /// Whether a handler marked the message as handled
    fn is_consumed(&self) -> bool {
        false
    }

    /// Mark the message as handled
    fn set_consumed(&mut self, _consumed: bool) {}
}

impl<M: MessageType> Message for M {
    fn type_hash(&self) -> TypeHash {
        M::HASH
    }

    fn type_name(&self) -> &str {
        M::NAME
    }

    fn is_consumed(&self) -> bool {
        MessageType::is_consumed(self)
    }

    fn set_consumed(&mut self, consumed: bool) {
        MessageType::set_consumed(self, consumed)
    }

    fn boxed_clone(&self) -> Box<dyn Message> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Script Messages
// ============================================================================

/// A message whose kind is only known by its declared name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptMessage {
    name: String,
    #[serde(skip)]
    hash: Option<TypeHash>,
    /// Kind-specific fields
    pub payload: serde_json::Value,
    /// Set by handlers that acted on the message
    pub consumed: bool,
}

impl ScriptMessage {
    /// Create a message of the named kind with an empty payload
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let hash = TypeHash::of_name(&name);
        Self {
            name,
            hash: Some(hash),
            payload: serde_json::Value::Null,
            consumed: false,
        }
    }

    /// Attach a payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Message for ScriptMessage {
    fn type_hash(&self) -> TypeHash {
        self.hash.unwrap_or_else(|| TypeHash::of_name(&self.name))
    }

    fn type_name(&self) -> &str {
        &self.name
    }

    fn is_consumed(&self) -> bool {
        self.consumed
    }

    fn set_consumed(&mut self, consumed: bool) {
        self.consumed = consumed;
    }

    fn boxed_clone(&self) -> Box<dyn Message> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Where a posted message is delivered once it is due
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    /// All components of one object
    Object(ObjectHandle),
    /// An object and all of its descendants, depth first
    ObjectRecursive(ObjectHandle),
    /// A single component
    Component(ComponentHandle),
    /// The broadcast path starting at an object
    Event(ObjectHandle),
}

impl From<ObjectHandle> for MessageTarget {
    fn from(handle: ObjectHandle) -> Self {
        MessageTarget::Object(handle)
    }
}

impl From<ComponentHandle> for MessageTarget {
    fn from(handle: ComponentHandle) -> Self {
        MessageTarget::Component(handle)
    }
}

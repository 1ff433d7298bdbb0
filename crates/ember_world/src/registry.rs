//! Component factories and message handler bindings
//!
//! The [`Registry`] is process-scoped state: build it once at startup, wrap it
//! in a [`SharedRegistry`] and hand it to every world. Handlers are stored as
//! typed function values at registration time; dispatch looks them up by
//! `(component type, message type)` identity and never by name. A component
//! kind inherits the handlers of its base kinds; a binding on a nearer kind
//! overrides one further up the chain.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ember_core::{TypeHash, TypeRegistry};
use parking_lot::RwLock;

use crate::component::{Component, ComponentType};
use crate::context::Context;
use crate::error::WorldResult;
use crate::message::{Message, MessageType, ScriptMessage};

/// Creates a fresh component instance
pub type ComponentFactory = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// Type-erased message handler.
///
/// Returns false without doing anything if the component or message is not
/// of the concrete type the handler was written for.
pub type MessageHandler = Arc<dyn Fn(&mut dyn Component, &mut dyn Message, &mut Context<'_>) -> bool + Send + Sync>;

/// Registry shared by all worlds of a process
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Type identities plus the construction and dispatch tables built on them
#[derive(Default)]
pub struct Registry {
    types: TypeRegistry,
    factories: BTreeMap<TypeHash, ComponentFactory>,
    handlers: BTreeMap<(TypeHash, TypeHash), MessageHandler>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into the shared form worlds expect
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Underlying type identity table
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Register a message kind by declared name
    pub fn register_message_type(&mut self, name: &str) -> WorldResult<TypeHash> {
        Ok(self.types.register_message_type(name)?)
    }

    /// Register a native message kind
    pub fn register_message<M: MessageType>(&mut self) -> WorldResult<TypeHash> {
        self.register_message_type(M::NAME)
    }

    /// Register a component kind by declared name with a custom factory
    pub fn register_component_type<F>(
        &mut self,
        name: &str,
        base: Option<&str>,
        factory: F,
    ) -> WorldResult<TypeHash>
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        let hash = self.types.register_component_type(name, base)?;
        self.factories.insert(hash, Arc::new(factory));
        log::debug!("Registered component type '{}' ({})", name, hash);
        Ok(hash)
    }

    /// Register a native component kind, constructed with `Default`
    pub fn register_component<C: ComponentType>(&mut self) -> WorldResult<TypeHash> {
        self.register_component_type(C::NAME, C::BASE, || Box::new(C::default()))
    }

    /// Check whether `component_type` is `ancestor` or derives from it
    pub fn is_kind_of(&self, component_type: TypeHash, ancestor: TypeHash) -> bool {
        self.types.is_kind_of(component_type, ancestor)
    }

    pub(crate) fn factory(&self, component_type: TypeHash) -> Option<ComponentFactory> {
        self.factories.get(&component_type).cloned()
    }

    // ------------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------------

    /// Bind a type-erased handler to a `(component type, message type)` pair.
    ///
    /// Exactly one binding exists per pair; a second registration replaces
    /// the first and is reported as a warning.
    pub fn register_handler_raw(
        &mut self,
        component_type: TypeHash,
        message_type: TypeHash,
        handler: MessageHandler,
    ) -> Option<MessageHandler> {
        let previous = self.handlers.insert((component_type, message_type), handler);
        if previous.is_some() {
            log::warn!(
                "Handler for message {} on component {} registered twice; the last registration wins",
                self.describe(message_type),
                self.describe(component_type)
            );
        }
        previous
    }

    /// Bind a typed handler for a native message on a native component
    pub fn register_handler<C, M, F>(&mut self, handler: F) -> Option<MessageHandler>
    where
        C: ComponentType,
        M: MessageType,
        F: Fn(&mut C, &mut M, &mut Context<'_>) + Send + Sync + 'static,
    {
        let erased: MessageHandler = Arc::new(
            move |component: &mut dyn Component, message: &mut dyn Message, ctx: &mut Context<'_>| {
                let (Some(component), Some(message)) =
                    (component.downcast_mut::<C>(), message.downcast_mut::<M>())
                else {
                    return false;
                };
                handler(component, message, ctx);
                true
            },
        );
        self.register_handler_raw(C::HASH, M::HASH, erased)
    }

    /// Bind a handler for a script-declared message kind on a native component
    pub fn register_script_handler<C, F>(&mut self, message_name: &str, handler: F) -> Option<MessageHandler>
    where
        C: ComponentType,
        F: Fn(&mut C, &mut ScriptMessage, &mut Context<'_>) + Send + Sync + 'static,
    {
        let erased: MessageHandler = Arc::new(
            move |component: &mut dyn Component, message: &mut dyn Message, ctx: &mut Context<'_>| {
                let (Some(component), Some(message)) =
                    (component.downcast_mut::<C>(), message.downcast_mut::<ScriptMessage>())
                else {
                    return false;
                };
                handler(component, message, ctx);
                true
            },
        );
        self.register_handler_raw(C::HASH, TypeHash::of_name(message_name), erased)
    }

    /// Find the handler a component kind uses for a message kind, searching
    /// the kind itself first and then each base kind
    pub fn find_handler(&self, component_type: TypeHash, message_type: TypeHash) -> Option<MessageHandler> {
        self.handler_chain(component_type, message_type).next()
    }

    /// Every handler bound for `message_type` along the base chain of
    /// `component_type`, nearest kind first
    pub fn handler_chain(
        &self,
        component_type: TypeHash,
        message_type: TypeHash,
    ) -> impl Iterator<Item = MessageHandler> + '_ {
        self.types
            .ancestry(component_type)
            .filter_map(move |kind| self.handlers.get(&(kind, message_type)).cloned())
    }

    /// Whether a component type reacts to a message type at all
    pub fn handles(&self, component_type: TypeHash, message_type: TypeHash) -> bool {
        self.find_handler(component_type, message_type).is_some()
    }

    fn describe(&self, hash: TypeHash) -> String {
        match self.types.get(hash) {
            Some(info) => format!("'{}'", info.name),
            None => hash.to_string(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.len())
            .field("factories", &self.factories.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

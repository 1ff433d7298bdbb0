//! Components and their lifecycle state
//!
//! A component is a behavior unit attached to exactly one scene object. The
//! world drives every component through the same sequence of states and calls
//! the matching optional callback on the way:
//!
//! ```text
//! Constructed -> Initialized -> (Activated <-> Deactivated) -> Deinitialized -> Destroyed
//! ```
//!
//! Callbacks receive a [`Context`] that gives access to the world, so a
//! component can send and post messages, change its tick interval or create
//! and destroy objects from inside any callback.

use std::any::Any;

use ember_core::{Handle, TypeHash};

use crate::context::Context;
use crate::object::ObjectHandle;

/// Handle to a component
pub type ComponentHandle = Handle<ComponentSlot>;

/// Upcasting helper implemented for every `'static` type
pub trait AsAny: Any {
    /// Upcast to `&dyn Any`
    fn as_any(&self) -> &dyn Any;
    /// Upcast to `&mut dyn Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A behavior unit attached to a scene object.
///
/// Every callback is optional; the defaults do nothing.
pub trait Component: AsAny + Send {
    /// Runs once, before the component can be activated
    fn initialize(&mut self, _ctx: &mut Context<'_>) {}

    /// Runs whenever the component becomes effectively active
    fn on_activated(&mut self, _ctx: &mut Context<'_>) {}

    /// Runs once, the first time the component is active while the world simulates
    fn on_simulation_started(&mut self, _ctx: &mut Context<'_>) {}

    /// Runs whenever the component stops being effectively active
    fn on_deactivated(&mut self, _ctx: &mut Context<'_>) {}

    /// Runs once, right before destruction
    fn deinitialize(&mut self, _ctx: &mut Context<'_>) {}

    /// Runs at the interval requested with `set_tick_interval`
    fn tick(&mut self, _ctx: &mut Context<'_>) {}
}

impl dyn Component {
    /// Downcast to a concrete component type
    pub fn downcast_ref<C: Component>(&self) -> Option<&C> {
        self.as_any().downcast_ref()
    }

    /// Downcast to a mutable concrete component type
    pub fn downcast_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.as_any_mut().downcast_mut()
    }
}

/// A native component kind with a declared name and optional base kind
pub trait ComponentType: Component + Default {
    /// Declared name; the type identity is derived from it
    const NAME: &'static str;

    /// Declared name of the base kind, which must be registered first
    const BASE: Option<&'static str> = None;

    /// Type identity of this component kind
    const HASH: TypeHash = TypeHash::of_name(Self::NAME);
}

/// Lifecycle states, strictly sequential
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    /// Created, `initialize` not run yet
    Constructed,
    /// `initialize` has run, never activated
    Initialized,
    /// Effectively active
    Activated,
    /// Was active, currently not
    Deactivated,
    /// `deinitialize` has run
    Deinitialized,
    /// Released
    Destroyed,
}

impl LifecycleState {
    /// Whether `initialize` ran and `deinitialize` did not
    pub fn is_initialized(self) -> bool {
        matches!(
            self,
            LifecycleState::Initialized | LifecycleState::Activated | LifecycleState::Deactivated
        )
    }
}

/// Storage slot for a component in the world's component table
pub struct ComponentSlot {
    pub(crate) owner: ObjectHandle,
    pub(crate) type_hash: TypeHash,
    pub(crate) state: LifecycleState,
    /// The component's own active flag
    pub(crate) active_flag: bool,
    pub(crate) simulation_started: bool,
    pub(crate) pending_delete: bool,
    /// Activity changed while a callback was running
    pub(crate) activation_dirty: bool,
    /// Empty while one of the component's callbacks is running
    pub(crate) instance: Option<Box<dyn Component>>,
}

impl ComponentSlot {
    pub(crate) fn new(owner: ObjectHandle, type_hash: TypeHash, instance: Box<dyn Component>) -> Self {
        Self {
            owner,
            type_hash,
            state: LifecycleState::Constructed,
            active_flag: true,
            simulation_started: false,
            pending_delete: false,
            activation_dirty: false,
            instance: Some(instance),
        }
    }

    /// Owning object
    pub fn owner(&self) -> ObjectHandle {
        self.owner
    }

    /// Type identity
    pub fn type_hash(&self) -> TypeHash {
        self.type_hash
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The component's own active flag
    pub fn active_flag(&self) -> bool {
        self.active_flag
    }

    /// Whether `on_simulation_started` has run
    pub fn simulation_started(&self) -> bool {
        self.simulation_started
    }

    /// Whether the component is queued for end-of-update destruction
    pub fn is_pending_delete(&self) -> bool {
        self.pending_delete
    }

    /// Whether one of the component's callbacks is on the stack
    pub fn is_busy(&self) -> bool {
        self.instance.is_none()
    }
}

impl std::fmt::Debug for ComponentSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSlot")
            .field("owner", &self.owner)
            .field("type_hash", &self.type_hash)
            .field("state", &self.state)
            .field("active_flag", &self.active_flag)
            .finish()
    }
}

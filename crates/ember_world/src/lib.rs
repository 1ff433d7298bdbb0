//! # ember_world - Scene Object Runtime
//!
//! The runtime script components live in:
//! - Scene objects in a parent/child tree, addressed by generational handles
//! - Components with a fixed lifecycle (initialize, activate, deactivate, deinitialize)
//! - Message dispatch keyed by `(component type, message type)` hashes
//! - A logical-time scheduler for ticks and delayed messages
//! - A pluggable spatial query collaborator
//!
//! ## Example
//!
//! ```ignore
//! use ember_world::prelude::*;
//!
//! #[derive(Default)]
//! struct Door { open: bool }
//! impl Component for Door {}
//! impl ComponentType for Door { const NAME: &'static str = "Door"; }
//!
//! #[derive(Clone)]
//! struct MsgOpen;
//! impl MessageType for MsgOpen { const NAME: &'static str = "MsgOpen"; }
//!
//! let mut registry = Registry::new();
//! registry.register_component::<Door>()?;
//! registry.register_message::<MsgOpen>()?;
//! registry.register_handler::<Door, MsgOpen, _>(|door, _, _| door.open = true);
//!
//! let mut world = World::with_registry(registry.into_shared());
//! let object = world.create_object(ObjectDesc::named("door").with_global_key("MainDoor"))?;
//! world.add_component(object, Door::default())?;
//!
//! world.post_message(object, MsgOpen, Duration::from_secs(1));
//! world.advance_time(Duration::from_secs(1));
//! ```

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod object;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod spatial;
pub mod world;

pub use component::{AsAny, Component, ComponentHandle, ComponentSlot, ComponentType, LifecycleState};
pub use config::WorldConfig;
pub use context::Context;
pub use error::{WorldError, WorldResult};
pub use message::{Message, MessageTarget, MessageType, ScriptMessage};
pub use object::{LocalTransform, ObjectDesc, ObjectHandle, SceneObject};
pub use registry::{ComponentFactory, MessageHandler, Registry, SharedRegistry};
pub use scheduler::{ScheduledMessage, Scheduler, TickInterval, TickRegistration};
pub use spatial::SpatialQuery;
pub use world::World;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::component::{Component, ComponentHandle, ComponentType, LifecycleState};
    pub use crate::config::WorldConfig;
    pub use crate::context::Context;
    pub use crate::error::{WorldError, WorldResult};
    pub use crate::message::{Message, MessageTarget, MessageType, ScriptMessage};
    pub use crate::object::{LocalTransform, ObjectDesc, ObjectHandle, SceneObject};
    pub use crate::registry::{Registry, SharedRegistry};
    pub use crate::scheduler::TickInterval;
    pub use crate::spatial::SpatialQuery;
    pub use crate::world::World;
    pub use ember_core::TypeHash;
    pub use glam::{Quat, Vec3};
    pub use std::time::Duration;
}

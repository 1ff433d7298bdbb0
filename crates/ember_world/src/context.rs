//! Callback context handed to components
//!
//! A [`Context`] dereferences to the [`World`], so everything a host can do
//! a component can do from inside a callback. On top of that it knows which
//! component is running, which is what self-targeted helpers need.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::component::ComponentHandle;
use crate::message::{Message, MessageTarget};
use crate::object::ObjectHandle;
use crate::scheduler::TickInterval;
use crate::world::World;

/// World access for the component whose callback is running
pub struct Context<'w> {
    world: &'w mut World,
    component: ComponentHandle,
    owner: ObjectHandle,
}

impl<'w> Context<'w> {
    pub(crate) fn new(world: &'w mut World, component: ComponentHandle, owner: ObjectHandle) -> Self {
        Self {
            world,
            component,
            owner,
        }
    }

    /// Handle of the running component
    pub fn handle(&self) -> ComponentHandle {
        self.component
    }

    /// Handle of the object owning the running component
    pub fn owner(&self) -> ObjectHandle {
        self.owner
    }

    /// Change how often the running component is ticked
    pub fn set_tick_interval(&mut self, interval: TickInterval) {
        let component = self.component;
        self.world.set_tick_interval(component, interval);
    }

    /// Post a message back to the running component
    pub fn post_to_self<M: Message>(&mut self, message: M, delay: Duration) {
        let component = self.component;
        self.world.post_message(component, message, delay);
    }

    /// Post a message to the owner's broadcast path
    pub fn post_event<M: Message>(&mut self, message: M, delay: Duration) {
        let owner = self.owner;
        self.world.post_message(MessageTarget::Event(owner), message, delay);
    }

    /// Queue the owning object for destruction at the end of the update
    pub fn destroy_owner_deferred(&mut self) {
        let owner = self.owner;
        self.world.destroy_object_deferred(owner);
    }
}

impl Deref for Context<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world
    }
}

impl DerefMut for Context<'_> {
    fn deref_mut(&mut self) -> &mut World {
        self.world
    }
}

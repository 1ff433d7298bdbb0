//! Message router
//!
//! Synchronous delivery of messages to components. A component receives a
//! message only if a handler is bound for its exact type and the message
//! type, and only while it is activated. A component that has not been
//! initialized yet is initialized first, so it never sees a message before
//! `initialize` and `on_activated` have run.
//!
//! Sending to a component whose own callback is running (a handler that
//! messages its own object, for instance) cannot reenter it. The message is
//! copied and held, and runs as soon as the running callback returns. The
//! held copy is separate, so its consumed flag is not visible to the sender.

use crate::component::{ComponentHandle, LifecycleState};
use crate::message::{Message, MessageTarget};
use crate::object::ObjectHandle;
use crate::registry::MessageHandler;
use crate::world::World;

impl World {
    /// Deliver to every component of one object, in component order.
    ///
    /// Returns true if at least one handler ran. A stale handle delivers
    /// nothing.
    pub fn send_message(&mut self, target: ObjectHandle, message: &mut dyn Message) -> bool {
        let Some(object) = self.objects.get(target) else {
            return false;
        };
        let components = object.components.clone();
        let mut delivered = false;
        for component in components {
            delivered |= self.deliver(component, message);
        }
        delivered
    }

    /// Deliver to an object, then depth first to each child subtree in child order
    pub fn send_message_recursive(&mut self, target: ObjectHandle, message: &mut dyn Message) -> bool {
        let mut delivered = self.send_message(target, message);
        let children = match self.objects.get(target) {
            Some(object) => object.children.clone(),
            None => return delivered,
        };
        for child in children {
            delivered |= self.send_message_recursive(child, message);
        }
        delivered
    }

    /// Deliver to a single component
    pub fn send_to_component(&mut self, target: ComponentHandle, message: &mut dyn Message) -> bool {
        self.deliver(target, message)
    }

    /// Deliver a "something happened" notification.
    ///
    /// The source object's components receive it first, then each ancestor in
    /// turn up to and including the nearest event root. If no ancestor is an
    /// event root, the message instead goes to the whole tree the source
    /// belongs to (depth first from its topmost ancestor), skipping the
    /// source, which was already served.
    pub fn broadcast(&mut self, source: ObjectHandle, message: &mut dyn Message) -> bool {
        let Some(object) = self.objects.get(source) else {
            return false;
        };
        let source_is_root = object.event_root;
        let mut current = object.parent;

        let mut delivered = self.send_message(source, message);
        if source_is_root {
            return delivered;
        }

        let mut chain = Vec::new();
        let mut found_root = false;
        while let Some(ancestor) = current {
            let Some(object) = self.objects.get(ancestor) else {
                break;
            };
            chain.push(ancestor);
            if object.event_root {
                found_root = true;
                break;
            }
            current = object.parent;
        }

        if found_root {
            for ancestor in chain {
                delivered |= self.send_message(ancestor, message);
            }
        } else {
            let top = chain.last().copied().unwrap_or(source);
            delivered |= self.send_message_recursive_skipping(top, source, message);
        }
        delivered
    }

    /// Deliver to whatever a scheduled message was posted to
    pub fn dispatch(&mut self, target: MessageTarget, message: &mut dyn Message) -> bool {
        match target {
            MessageTarget::Object(object) => self.send_message(object, message),
            MessageTarget::ObjectRecursive(object) => self.send_message_recursive(object, message),
            MessageTarget::Component(component) => self.send_to_component(component, message),
            MessageTarget::Event(object) => self.broadcast(object, message),
        }
    }

    fn send_message_recursive_skipping(
        &mut self,
        target: ObjectHandle,
        skip: ObjectHandle,
        message: &mut dyn Message,
    ) -> bool {
        let mut delivered = false;
        if target != skip {
            delivered |= self.send_message(target, message);
        }
        let children = match self.objects.get(target) {
            Some(object) => object.children.clone(),
            None => return delivered,
        };
        for child in children {
            delivered |= self.send_message_recursive_skipping(child, skip, message);
        }
        delivered
    }

    fn deliver(&mut self, component: ComponentHandle, message: &mut dyn Message) -> bool {
        if self.component_state(component) == Some(LifecycleState::Constructed) {
            self.initialize_component(component);
        }
        let Some(slot) = self.components.get(component) else {
            return false;
        };
        if slot.state != LifecycleState::Activated {
            return false;
        }
        let (component_type, busy) = (slot.type_hash, slot.is_busy());
        let handlers: Vec<MessageHandler> = self
            .registry()
            .read()
            .handler_chain(component_type, message.type_hash())
            .collect();
        if handlers.is_empty() {
            return false;
        }

        if busy {
            log::trace!(
                "Holding {:?} for {:?} until its running callback returns",
                message,
                component
            );
            self.held_deliveries.push((component, message.boxed_clone()));
            return true;
        }

        self.with_component(component, |instance, ctx| {
            handlers
                .iter()
                .any(|handler| handler(&mut *instance, &mut *message, &mut *ctx))
        })
        .unwrap_or(false)
    }

    /// Deliver the messages that arrived while a component's callback was
    /// running, in arrival order
    pub(crate) fn run_held_deliveries(&mut self, component: ComponentHandle) {
        while let Some(position) = self.held_deliveries.iter().position(|(target, _)| *target == component) {
            let (_, mut message) = self.held_deliveries.remove(position);
            self.deliver(component, message.as_mut());
        }
    }
}

//! Lifecycle controller
//!
//! Drives components through `Constructed -> Initialized -> Activated <->
//! Deactivated`. The state is updated before the matching callback runs, so
//! code inside the callback already observes the new state.
//!
//! An object is effectively active only if it and every ancestor are; a
//! component is effectively active if its own flag is set and its owner is
//! effectively active. Destruction (`Deactivated -> Deinitialized`) lives in
//! the world module next to the rest of the teardown.

use crate::component::{ComponentHandle, LifecycleState};
use crate::object::ObjectHandle;
use crate::world::World;

impl World {
    /// Initialize every component created since the last pass
    pub fn initialize_pending_components(&mut self) {
        loop {
            let batch = std::mem::take(&mut self.to_initialize);
            if batch.is_empty() {
                break;
            }
            log::trace!("Initializing {} pending components", batch.len());
            for component in batch {
                self.initialize_component(component);
            }
        }
    }

    /// Run `initialize` on a constructed component, then activate it if it
    /// is effectively active. No-op for any other state.
    pub(crate) fn initialize_component(&mut self, handle: ComponentHandle) {
        if self.component_state(handle) != Some(LifecycleState::Constructed) {
            return;
        }
        self.set_component_state(handle, LifecycleState::Initialized);
        self.with_component(handle, |component, ctx| component.initialize(ctx));
        self.update_component_activation(handle);
    }

    /// Whether a component's own flag and its owner's effective state are set
    pub fn is_component_active(&self, handle: ComponentHandle) -> bool {
        self.components.get(handle).is_some_and(|slot| {
            slot.active_flag && self.objects.get(slot.owner).is_some_and(|o| o.active_state)
        })
    }

    /// Set a component's own active flag
    pub fn set_component_active(&mut self, handle: ComponentHandle, active: bool) {
        let Some(slot) = self.components.get_mut(handle) else {
            return;
        };
        if slot.active_flag == active {
            return;
        }
        slot.active_flag = active;
        self.update_component_activation(handle);
    }

    /// Set an object's own active flag and propagate to its subtree
    pub fn set_object_active(&mut self, handle: ObjectHandle, active: bool) {
        let Some(object) = self.objects.get_mut(handle) else {
            return;
        };
        if object.active_flag == active {
            return;
        }
        object.active_flag = active;
        self.refresh_active_state(handle);
    }

    /// Recompute the effective state of an object and its descendants,
    /// activating or deactivating components whose state flips
    pub(crate) fn refresh_active_state(&mut self, handle: ObjectHandle) {
        let parent_active = match self.objects.get(handle).and_then(|o| o.parent) {
            Some(parent) => self.objects.get(parent).is_some_and(|p| p.active_state),
            None => true,
        };
        let Some(object) = self.objects.get_mut(handle) else {
            return;
        };
        object.active_state = object.active_flag && parent_active;
        let components = object.components.clone();
        let children = object.children.clone();

        for component in components {
            self.update_component_activation(component);
        }
        for child in children {
            self.refresh_active_state(child);
        }
    }

    /// Bring a component's lifecycle state in line with its effective activity
    pub(crate) fn update_component_activation(&mut self, handle: ComponentHandle) {
        let should_be_active = self.is_component_active(handle);
        let Some(slot) = self.components.get_mut(handle) else {
            return;
        };
        if !slot.state.is_initialized() {
            return;
        }
        if slot.is_busy() {
            // Re-evaluated once the running callback returns
            slot.activation_dirty = true;
            return;
        }

        match (slot.state, should_be_active) {
            (LifecycleState::Initialized | LifecycleState::Deactivated, true) => {
                slot.state = LifecycleState::Activated;
                self.with_component(handle, |component, ctx| component.on_activated(ctx));
                self.start_simulation_if_needed(handle);
            }
            (LifecycleState::Activated, false) => {
                slot.state = LifecycleState::Deactivated;
                self.with_component(handle, |component, ctx| component.on_deactivated(ctx));
            }
            _ => {}
        }
    }

    fn start_simulation_if_needed(&mut self, handle: ComponentHandle) {
        if !self.simulating {
            return;
        }
        let Some(slot) = self.components.get_mut(handle) else {
            return;
        };
        if slot.state != LifecycleState::Activated || slot.simulation_started {
            return;
        }
        slot.simulation_started = true;
        self.with_component(handle, |component, ctx| component.on_simulation_started(ctx));
    }

    /// Call `on_simulation_started` on every active component that missed it
    pub(crate) fn start_simulation_for_active_components(&mut self) {
        let pending: Vec<ComponentHandle> = self
            .components
            .iter()
            .filter(|(_, slot)| slot.state == LifecycleState::Activated && !slot.simulation_started)
            .map(|(handle, _)| handle)
            .collect();
        for component in pending {
            self.start_simulation_if_needed(component);
        }
    }
}

//! World - owner of the object graph
//!
//! The World stores every scene object and component in generational handle
//! tables, keeps the global key table, and owns the scheduler. Lifecycle,
//! routing and scheduling live in their own modules as further `impl World`
//! blocks; this file covers structure: creation, destruction, hierarchy and
//! lookups.

use std::collections::BTreeMap;
use std::time::Duration;

use ember_core::{HandleError, HandleMap, TypeHash};

use crate::component::{Component, ComponentHandle, ComponentSlot, ComponentType, LifecycleState};
use crate::config::WorldConfig;
use crate::context::Context;
use crate::error::{WorldError, WorldResult};
use crate::message::Message;
use crate::object::{LocalTransform, ObjectDesc, ObjectHandle, SceneObject};
use crate::registry::SharedRegistry;
use crate::scheduler::Scheduler;
use crate::spatial::SpatialQuery;

/// Container for one simulation's objects, components and pending work
pub struct World {
    config: WorldConfig,
    registry: SharedRegistry,
    pub(crate) objects: HandleMap<SceneObject>,
    pub(crate) components: HandleMap<ComponentSlot>,
    global_keys: BTreeMap<String, ObjectHandle>,
    pub(crate) scheduler: Scheduler,
    pub(crate) spatial: Option<Box<dyn SpatialQuery>>,
    /// Components waiting for `initialize`, in creation order
    pub(crate) to_initialize: Vec<ComponentHandle>,
    pending_object_deletions: Vec<ObjectHandle>,
    pending_component_deletions: Vec<ComponentHandle>,
    /// Messages sent to components that were busy at the time
    pub(crate) held_deliveries: Vec<(ComponentHandle, Box<dyn Message>)>,
    /// Number of component callbacks currently on the stack
    pub(crate) dispatch_depth: u32,
    pub(crate) simulating: bool,
    pub(crate) simulation_start_pending: bool,
}

impl World {
    /// Create an empty world
    pub fn new(config: WorldConfig, registry: SharedRegistry) -> Self {
        log::debug!(
            "Creating world '{}' (objects: {}, components: {})",
            config.name,
            config.max_objects,
            config.max_components
        );
        Self {
            objects: HandleMap::with_limit(config.max_objects),
            components: HandleMap::with_limit(config.max_components),
            global_keys: BTreeMap::new(),
            scheduler: Scheduler::new(),
            spatial: None,
            to_initialize: Vec::new(),
            pending_object_deletions: Vec::new(),
            pending_component_deletions: Vec::new(),
            held_deliveries: Vec::new(),
            dispatch_depth: 0,
            simulating: config.simulate,
            simulation_start_pending: false,
            config,
            registry,
        }
    }

    /// Create an empty world with default configuration
    pub fn with_registry(registry: SharedRegistry) -> Self {
        Self::new(WorldConfig::default(), registry)
    }

    /// World configuration
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Registry shared with other worlds
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Install the spatial query collaborator
    pub fn set_spatial_query(&mut self, spatial: impl SpatialQuery + 'static) {
        self.spatial = Some(Box::new(spatial));
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Advance the logical clock and run one update.
    ///
    /// Order within one update:
    /// 1. pending component initializations
    /// 2. deferred `on_simulation_started` calls
    /// 3. due ticks
    /// 4. due scheduled messages
    /// 5. deferred destructions
    /// 6. initializations requested during this update
    pub fn advance_time(&mut self, delta: Duration) {
        self.scheduler.advance_clock(delta);

        self.initialize_pending_components();
        if self.simulating && self.simulation_start_pending {
            self.simulation_start_pending = false;
            self.start_simulation_for_active_components();
        }

        self.run_ticks();
        self.drain_messages();
        self.flush_pending_deletions();
        self.initialize_pending_components();
    }

    /// Current logical time
    pub fn time(&self) -> Duration {
        self.scheduler.now()
    }

    /// Number of completed `advance_time` calls
    pub fn frame(&self) -> u64 {
        self.scheduler.frame()
    }

    /// Switch simulation (play) mode on or off
    pub fn set_simulation_enabled(&mut self, enabled: bool) {
        if enabled && !self.simulating {
            self.simulation_start_pending = true;
        }
        self.simulating = enabled;
    }

    /// Whether the world is simulating
    pub fn is_simulating(&self) -> bool {
        self.simulating
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Create a scene object.
    ///
    /// Fails when the parent handle is stale or the object table is full. A
    /// global key already held by another object moves to the new object.
    pub fn create_object(&mut self, desc: ObjectDesc) -> WorldResult<ObjectHandle> {
        let parent_active = match desc.parent {
            Some(parent) => match self.objects.get(parent) {
                Some(object) => object.active_state,
                None => return Err(invalid_handle(parent)),
            },
            None => true,
        };

        let handle = self
            .objects
            .insert(SceneObject::from_desc(&desc, parent_active))
            .map_err(|e| WorldError::from_handle("object", e))?;

        if let Some(parent) = desc.parent.and_then(|p| self.objects.get_mut(p)) {
            parent.children.push(handle);
        }
        if let Some(key) = desc.global_key.as_deref() {
            self.set_global_key(handle, key);
        }

        log::trace!("Created object '{}' {:?}", desc.name, handle);
        Ok(handle)
    }

    /// Destroy an object, its components and all its descendants.
    ///
    /// Called from inside a component callback this behaves like
    /// [`destroy_object_deferred`](Self::destroy_object_deferred), so handles
    /// the running code still holds stay valid until the end of the update.
    pub fn destroy_object_now(&mut self, handle: ObjectHandle) {
        if !self.objects.contains(handle) {
            return;
        }
        if self.dispatch_depth > 0 {
            self.destroy_object_deferred(handle);
            return;
        }
        self.destroy_object_tree(handle);
        self.flush_pending_deletions();
    }

    /// Mark an object for destruction at the end of the current update
    pub fn destroy_object_deferred(&mut self, handle: ObjectHandle) {
        let Some(object) = self.objects.get_mut(handle) else {
            return;
        };
        if !object.pending_delete {
            object.pending_delete = true;
            self.pending_object_deletions.push(handle);
        }
    }

    /// Check whether an object handle is live
    pub fn is_valid_object(&self, handle: ObjectHandle) -> bool {
        self.objects.contains(handle)
    }

    /// Borrow an object
    pub fn object(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.objects.get(handle)
    }

    /// Mutably borrow an object for metadata edits
    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut SceneObject> {
        self.objects.get_mut(handle)
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Objects without a parent
    pub fn root_objects(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.objects
            .iter()
            .filter(|(_, object)| object.parent.is_none())
            .map(|(handle, _)| handle)
    }

    /// Change an object's parent; `None` makes it a root.
    ///
    /// Effective activity of the moved subtree is recomputed.
    pub fn set_parent(&mut self, child: ObjectHandle, parent: Option<ObjectHandle>) -> WorldResult<()> {
        let old_parent = match self.objects.get(child) {
            Some(object) => object.parent,
            None => return Err(invalid_handle(child)),
        };
        if let Some(parent) = parent {
            if !self.objects.contains(parent) {
                return Err(invalid_handle(parent));
            }
            if parent == child || self.is_ancestor_of(child, parent) {
                return Err(WorldError::CycleDetected { child, parent });
            }
        }
        if old_parent == parent {
            return Ok(());
        }

        if let Some(old) = old_parent.and_then(|p| self.objects.get_mut(p)) {
            old.children.retain(|&c| c != child);
        }
        if let Some(new) = parent.and_then(|p| self.objects.get_mut(p)) {
            new.children.push(child);
        }
        if let Some(object) = self.objects.get_mut(child) {
            object.parent = parent;
        }

        self.refresh_active_state(child);
        Ok(())
    }

    /// Check whether `ancestor` appears in the parent chain of `handle`
    pub fn is_ancestor_of(&self, ancestor: ObjectHandle, handle: ObjectHandle) -> bool {
        let mut current = self.objects.get(handle).and_then(|o| o.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.objects.get(parent).and_then(|o| o.parent);
        }
        false
    }

    /// Transform relative to the world, composed through the parent chain
    pub fn global_transform(&self, handle: ObjectHandle) -> Option<LocalTransform> {
        let object = self.objects.get(handle)?;
        let mut global = object.transform;
        let mut current = object.parent;
        while let Some(parent) = current.and_then(|p| self.objects.get(p)) {
            global = parent.transform.mul_transform(&global);
            current = parent.parent;
        }
        Some(global)
    }

    // ========================================================================
    // Global Keys
    // ========================================================================

    /// Register `key` for an object, replacing any previous holder.
    ///
    /// Returns false if the object handle is stale.
    pub fn set_global_key(&mut self, handle: ObjectHandle, key: &str) -> bool {
        if !self.objects.contains(handle) {
            return false;
        }
        self.clear_global_key(handle);

        if let Some(previous) = self.global_keys.insert(key.to_string(), handle) {
            if let Some(object) = self.objects.get_mut(previous) {
                log::warn!(
                    "Global key '{}' moved from {:?} to {:?}; the previous holder lost its key",
                    key,
                    previous,
                    handle
                );
                object.global_key = None;
            }
        }
        if let Some(object) = self.objects.get_mut(handle) {
            object.global_key = Some(key.to_string());
        }
        true
    }

    /// Remove an object's global key, if it has one
    pub fn clear_global_key(&mut self, handle: ObjectHandle) {
        let Some(key) = self.objects.get_mut(handle).and_then(|o| o.global_key.take()) else {
            return;
        };
        if self.global_keys.get(&key) == Some(&handle) {
            self.global_keys.remove(&key);
        }
    }

    /// Look up an object by global key
    pub fn try_get_object_by_global_key(&self, key: &str) -> Option<ObjectHandle> {
        self.global_keys
            .get(key)
            .copied()
            .filter(|&handle| self.objects.contains(handle))
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Find a child by name.
    ///
    /// Direct children are checked first; with `recursive` each child's
    /// subtree is searched afterwards, in child order.
    pub fn find_child_by_name(&self, owner: ObjectHandle, name: &str, recursive: bool) -> Option<ObjectHandle> {
        let object = self.objects.get(owner)?;
        let direct = object
            .children
            .iter()
            .copied()
            .find(|&child| self.objects.get(child).is_some_and(|c| c.name == name));
        if direct.is_some() || !recursive {
            return direct;
        }
        object
            .children
            .iter()
            .find_map(|&child| self.find_child_by_name(child, name, true))
    }

    /// Follow a `/`-separated path of direct child names
    pub fn find_child_by_path(&self, owner: ObjectHandle, path: &str) -> Option<ObjectHandle> {
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        segments.peek()?;
        segments.try_fold(owner, |current, segment| self.find_child_by_name(current, segment, false))
    }

    /// First component on `owner` whose type is `component_type` or derives from it
    pub fn try_get_component_of_type(&self, owner: ObjectHandle, component_type: TypeHash) -> Option<ComponentHandle> {
        let object = self.objects.get(owner)?;
        let registry = self.registry.read();
        object.components.iter().copied().find(|&handle| {
            self.components
                .get(handle)
                .is_some_and(|slot| registry.is_kind_of(slot.type_hash, component_type))
        })
    }

    /// First component on `owner` of kind `C`
    pub fn try_get_component<C: ComponentType>(&self, owner: ObjectHandle) -> Option<ComponentHandle> {
        self.try_get_component_of_type(owner, C::HASH)
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Create a component of a registered type on `owner`.
    ///
    /// The component is initialized before its first callback of any kind:
    /// at the start of the next update, or on first message delivery.
    pub fn create_component(&mut self, owner: ObjectHandle, component_type: TypeHash) -> WorldResult<ComponentHandle> {
        if !self.objects.contains(owner) {
            return Err(invalid_handle(owner));
        }
        let factory = self
            .registry
            .read()
            .factory(component_type)
            .ok_or(WorldError::UnknownComponentType(component_type))?;
        self.insert_component(owner, component_type, factory())
    }

    /// Attach an already constructed native component
    pub fn add_component<C: ComponentType>(&mut self, owner: ObjectHandle, component: C) -> WorldResult<ComponentHandle> {
        if !self.objects.contains(owner) {
            return Err(invalid_handle(owner));
        }
        if !self.registry.read().types().contains(C::HASH) {
            return Err(WorldError::UnregisteredComponentType(C::NAME));
        }
        self.insert_component(owner, C::HASH, Box::new(component))
    }

    fn insert_component(
        &mut self,
        owner: ObjectHandle,
        component_type: TypeHash,
        instance: Box<dyn Component>,
    ) -> WorldResult<ComponentHandle> {
        let handle = self
            .components
            .insert(ComponentSlot::new(owner, component_type, instance))
            .map_err(|e| WorldError::from_handle("component", e))?;
        if let Some(object) = self.objects.get_mut(owner) {
            object.components.push(handle);
        }
        self.to_initialize.push(handle);
        log::trace!("Created component {} {:?} on {:?}", component_type, handle, owner);
        Ok(handle)
    }

    /// Destroy a component, driving it through deactivation and deinitialization.
    ///
    /// Called from inside a component callback this is deferred to the end
    /// of the update.
    pub fn destroy_component(&mut self, handle: ComponentHandle) {
        if !self.components.contains(handle) {
            return;
        }
        if self.dispatch_depth > 0 {
            self.destroy_component_deferred(handle);
            return;
        }
        self.destroy_component_internal(handle);
        self.flush_pending_deletions();
    }

    /// Mark a component for destruction at the end of the current update
    pub fn destroy_component_deferred(&mut self, handle: ComponentHandle) {
        let Some(slot) = self.components.get_mut(handle) else {
            return;
        };
        if !slot.pending_delete {
            slot.pending_delete = true;
            self.pending_component_deletions.push(handle);
        }
    }

    /// Check whether a component handle is live
    pub fn is_valid_component(&self, handle: ComponentHandle) -> bool {
        self.components.contains(handle)
    }

    /// Storage slot of a component
    pub fn component_slot(&self, handle: ComponentHandle) -> Option<&ComponentSlot> {
        self.components.get(handle)
    }

    /// Lifecycle state of a component
    pub fn component_state(&self, handle: ComponentHandle) -> Option<LifecycleState> {
        self.components.get(handle).map(|slot| slot.state)
    }

    /// Object owning a component
    pub fn component_owner(&self, handle: ComponentHandle) -> Option<ObjectHandle> {
        self.components.get(handle).map(|slot| slot.owner)
    }

    /// Borrow a component as its concrete type.
    ///
    /// `None` if the handle is stale, the type does not match, or one of the
    /// component's own callbacks is running.
    pub fn component<C: Component>(&self, handle: ComponentHandle) -> Option<&C> {
        self.components.get(handle)?.instance.as_deref()?.downcast_ref::<C>()
    }

    /// Mutably borrow a component as its concrete type
    pub fn component_mut<C: Component>(&mut self, handle: ComponentHandle) -> Option<&mut C> {
        self.components.get_mut(handle)?.instance.as_deref_mut()?.downcast_mut::<C>()
    }

    /// Number of live components
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Destroy every object with full lifecycle callbacks and drop all
    /// scheduled work
    pub fn clear(&mut self) {
        let roots: Vec<ObjectHandle> = self.root_objects().collect();
        log::debug!("Clearing world '{}' ({} roots)", self.config.name, roots.len());
        for root in roots {
            self.destroy_object_now(root);
        }
        if self.dispatch_depth == 0 {
            self.scheduler.clear();
            self.to_initialize.clear();
            self.held_deliveries.clear();
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Run a callback on a component with the instance taken out of its slot.
    ///
    /// Returns `None` without calling `f` if the handle is stale or a
    /// callback of the same component is already running.
    /// Messages held for the component while `f` ran are delivered before
    /// this returns.
    pub(crate) fn with_component<R>(
        &mut self,
        handle: ComponentHandle,
        f: impl FnOnce(&mut dyn Component, &mut Context<'_>) -> R,
    ) -> Option<R> {
        let slot = self.components.get_mut(handle)?;
        let owner = slot.owner;
        let Some(mut instance) = slot.instance.take() else {
            log::warn!("Component {:?} is already running a callback; reentrant call skipped", handle);
            return None;
        };

        self.dispatch_depth += 1;
        let result = {
            let mut ctx = Context::new(self, handle, owner);
            f(instance.as_mut(), &mut ctx)
        };
        self.dispatch_depth -= 1;

        let dirty = match self.components.get_mut(handle) {
            Some(slot) => {
                slot.instance = Some(instance);
                std::mem::take(&mut slot.activation_dirty)
            }
            None => false,
        };
        if dirty {
            self.update_component_activation(handle);
        }
        self.run_held_deliveries(handle);
        Some(result)
    }

    /// Destroy everything queued by deferred destruction requests
    pub(crate) fn flush_pending_deletions(&mut self) {
        if self.dispatch_depth > 0 {
            return;
        }
        loop {
            let components = std::mem::take(&mut self.pending_component_deletions);
            let objects = std::mem::take(&mut self.pending_object_deletions);
            if components.is_empty() && objects.is_empty() {
                break;
            }
            log::trace!(
                "Flushing {} deferred component and {} deferred object deletions",
                components.len(),
                objects.len()
            );
            for component in components {
                if self.components.contains(component) {
                    self.destroy_component_internal(component);
                }
            }
            for object in objects {
                if self.objects.contains(object) {
                    self.destroy_object_tree(object);
                }
            }
        }
    }

    fn destroy_object_tree(&mut self, handle: ObjectHandle) {
        let Some(object) = self.objects.get_mut(handle) else {
            return;
        };
        object.pending_delete = true;

        // Callbacks may attach new children or components to the dying
        // object, so repeat until both lists stay empty.
        loop {
            let Some(object) = self.objects.get_mut(handle) else {
                return;
            };
            let children = std::mem::take(&mut object.children);
            let components = object.components.clone();
            if children.is_empty() && components.is_empty() {
                break;
            }
            for child in children {
                self.destroy_object_tree(child);
            }
            for component in components {
                self.destroy_component_internal(component);
            }
        }

        let Some(object) = self.objects.get(handle) else {
            return;
        };
        if let Some(parent) = object.parent.and_then(|p| self.objects.get_mut(p)) {
            parent.children.retain(|&c| c != handle);
        }
        self.clear_global_key(handle);
        self.scheduler.remove_object(handle);
        if let Some(object) = self.objects.remove(handle) {
            log::trace!("Destroyed object '{}' {:?}", object.name, handle);
        }
    }

    fn destroy_component_internal(&mut self, handle: ComponentHandle) {
        let Some(slot) = self.components.get(handle) else {
            return;
        };
        let owner = slot.owner;

        if slot.state == LifecycleState::Activated {
            self.set_component_state(handle, LifecycleState::Deactivated);
            self.with_component(handle, |component, ctx| component.on_deactivated(ctx));
        }
        if self.components.get(handle).is_some_and(|slot| slot.state.is_initialized()) {
            self.set_component_state(handle, LifecycleState::Deinitialized);
            self.with_component(handle, |component, ctx| component.deinitialize(ctx));
        }

        if let Some(object) = self.objects.get_mut(owner) {
            object.components.retain(|&c| c != handle);
        }
        self.scheduler.remove_component(handle);
        self.held_deliveries.retain(|(target, _)| *target != handle);
        if let Some(mut slot) = self.components.remove(handle) {
            slot.state = LifecycleState::Destroyed;
            log::trace!("Destroyed component {} {:?}", slot.type_hash, handle);
        }
    }

    pub(crate) fn set_component_state(&mut self, handle: ComponentHandle, state: LifecycleState) {
        if let Some(slot) = self.components.get_mut(handle) {
            slot.state = state;
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("name", &self.config.name)
            .field("objects", &self.objects.len())
            .field("components", &self.components.len())
            .field("time", &self.scheduler.now())
            .field("simulating", &self.simulating)
            .finish()
    }
}

fn invalid_handle<T>(handle: ember_core::Handle<T>) -> WorldError {
    if handle.is_null() {
        WorldError::InvalidHandle(HandleError::Null)
    } else {
        WorldError::InvalidHandle(HandleError::Stale)
    }
}

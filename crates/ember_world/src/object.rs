//! Scene objects and their creation descriptor
//!
//! A [`SceneObject`] is a node in the world's object tree. It owns its
//! components and its children; its parent is only a back-reference. All
//! structural edits (parenting, activation, global keys, destruction) go
//! through [`World`](crate::World) so the tree and lookup tables stay in sync;
//! plain metadata (name, tags, team, transform) can be edited directly.

use std::collections::BTreeSet;

use ember_core::Handle;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::component::ComponentHandle;

/// Handle to a scene object
pub type ObjectHandle = Handle<SceneObject>;

// ============================================================================
// Transform
// ============================================================================

/// Transform relative to the parent object (or the world for roots)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalTransform {
    /// Translation in parent space
    pub position: Vec3,
    /// Rotation in parent space
    pub rotation: Quat,
    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl LocalTransform {
    /// Identity transform (no translation, no rotation, unit scale)
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create from translation only
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Express `child` (given relative to `self`) in the space `self` is relative to
    pub fn mul_transform(&self, child: &LocalTransform) -> LocalTransform {
        LocalTransform {
            position: self.position + self.rotation * (self.scale * child.position),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale * child.scale,
        }
    }

    /// Forward direction (-Z rotated)
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// Everything needed to create a scene object.
///
/// Transform parts are independently optional; missing ones default to
/// zero translation, identity rotation and unit scale.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDesc {
    /// Parent object; `None` creates a root
    #[serde(skip)]
    pub parent: Option<ObjectHandle>,
    /// Display name used by name and path lookups
    pub name: String,
    /// Optional key for world-wide lookup
    pub global_key: Option<String>,
    /// The object's own active flag
    pub active: bool,
    /// Whether the object is expected to move
    pub dynamic: bool,
    /// Team the object belongs to
    pub team_id: u16,
    /// Initial tags
    pub tags: Vec<String>,
    /// Stops broadcast messages from propagating further up
    pub event_root: bool,
    /// Local translation
    pub local_position: Option<Vec3>,
    /// Local rotation
    pub local_rotation: Option<Quat>,
    /// Local scale
    pub local_scale: Option<Vec3>,
}

impl Default for ObjectDesc {
    fn default() -> Self {
        Self {
            parent: None,
            name: String::new(),
            global_key: None,
            active: true,
            dynamic: false,
            team_id: 0,
            tags: Vec::new(),
            event_root: false,
            local_position: None,
            local_rotation: None,
            local_scale: None,
        }
    }
}

impl ObjectDesc {
    /// Descriptor for a named root object
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the parent
    pub fn with_parent(mut self, parent: ObjectHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the global key
    pub fn with_global_key(mut self, key: impl Into<String>) -> Self {
        self.global_key = Some(key.into());
        self
    }

    /// Set the initial active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Set the local position
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.local_position = Some(position);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Mark as an event root
    pub fn as_event_root(mut self) -> Self {
        self.event_root = true;
        self
    }

    pub(crate) fn local_transform(&self) -> LocalTransform {
        LocalTransform {
            position: self.local_position.unwrap_or(Vec3::ZERO),
            rotation: self.local_rotation.unwrap_or(Quat::IDENTITY),
            scale: self.local_scale.unwrap_or(Vec3::ONE),
        }
    }
}

// ============================================================================
// Scene Object
// ============================================================================

/// A node in the object tree
#[derive(Debug)]
pub struct SceneObject {
    pub(crate) name: String,
    pub(crate) global_key: Option<String>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) team_id: u16,
    pub(crate) dynamic: bool,
    pub(crate) event_root: bool,
    pub(crate) transform: LocalTransform,
    /// The object's own flag
    pub(crate) active_flag: bool,
    /// Own flag combined with every ancestor's flag
    pub(crate) active_state: bool,
    pub(crate) pending_delete: bool,
    pub(crate) parent: Option<ObjectHandle>,
    pub(crate) children: Vec<ObjectHandle>,
    pub(crate) components: Vec<ComponentHandle>,
}

impl SceneObject {
    pub(crate) fn from_desc(desc: &ObjectDesc, parent_active: bool) -> Self {
        Self {
            name: desc.name.clone(),
            global_key: None,
            tags: desc.tags.iter().cloned().collect(),
            team_id: desc.team_id,
            dynamic: desc.dynamic,
            event_root: desc.event_root,
            transform: desc.local_transform(),
            active_flag: desc.active,
            active_state: desc.active && parent_active,
            pending_delete: false,
            parent: desc.parent,
            children: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the object
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Global lookup key, if one is registered
    pub fn global_key(&self) -> Option<&str> {
        self.global_key.as_deref()
    }

    /// The object's own active flag
    pub fn active_flag(&self) -> bool {
        self.active_flag
    }

    /// Whether the object and all its ancestors are active
    pub fn is_active(&self) -> bool {
        self.active_state
    }

    /// Whether the object is queued for end-of-update destruction
    pub fn is_pending_delete(&self) -> bool {
        self.pending_delete
    }

    /// Parent object, `None` for roots
    pub fn parent(&self) -> Option<ObjectHandle> {
        self.parent
    }

    /// Children in creation order
    pub fn children(&self) -> &[ObjectHandle] {
        &self.children
    }

    /// Owned components in creation order
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    /// Team identifier
    pub fn team_id(&self) -> u16 {
        self.team_id
    }

    /// Set the team identifier
    pub fn set_team_id(&mut self, team_id: u16) {
        self.team_id = team_id;
    }

    /// Whether the object is expected to move
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Whether broadcast propagation stops at this object
    pub fn is_event_root(&self) -> bool {
        self.event_root
    }

    /// Mark or unmark this object as an event root
    pub fn set_event_root(&mut self, event_root: bool) {
        self.event_root = event_root;
    }

    /// Transform relative to the parent
    pub fn local_transform(&self) -> &LocalTransform {
        &self.transform
    }

    /// Replace the local transform
    pub fn set_local_transform(&mut self, transform: LocalTransform) {
        self.transform = transform;
    }

    /// Set the local position
    pub fn set_local_position(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    /// Set the local rotation
    pub fn set_local_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
    }

    /// Set the local scale
    pub fn set_local_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
    }

    // ------------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------------

    /// All tags
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Replace all tags
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
    }

    /// Add tags
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
    }

    /// Remove tags
    pub fn remove_tags<'a, I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for tag in tags {
            self.tags.remove(tag);
        }
    }

    /// True if the object carries at least one of the tags
    pub fn has_any_tags<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        tags.into_iter().any(|tag| self.tags.contains(tag))
    }

    /// True if the object carries every one of the tags
    pub fn has_all_tags<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        tags.into_iter().all(|tag| self.tags.contains(tag))
    }
}

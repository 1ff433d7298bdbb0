//! Spatial query collaborator
//!
//! The world does not index positions itself. A host installs a
//! [`SpatialQuery`] implementation and the world forwards range queries to
//! it, filtering out handles that no longer resolve.

use glam::Vec3;

use crate::object::ObjectHandle;
use crate::world::World;

/// Range queries over scene objects, provided by the host.
///
/// `visit` returns false to stop the query early.
pub trait SpatialQuery: Send {
    /// Visit objects within `radius` of `center`
    fn find_in_sphere(&self, center: Vec3, radius: f32, visit: &mut dyn FnMut(ObjectHandle) -> bool);

    /// Visit objects inside the axis-aligned box `[min, max]`
    fn find_in_box(&self, min: Vec3, max: Vec3, visit: &mut dyn FnMut(ObjectHandle) -> bool);
}

impl World {
    /// Whether a spatial query provider is installed
    pub fn has_spatial_query(&self) -> bool {
        self.spatial.is_some()
    }

    /// Visit live objects within a sphere.
    ///
    /// Returns false if no provider is installed.
    pub fn find_objects_in_sphere(
        &self,
        center: Vec3,
        radius: f32,
        mut visit: impl FnMut(ObjectHandle) -> bool,
    ) -> bool {
        let Some(spatial) = self.spatial.as_deref() else {
            return false;
        };
        let objects = &self.objects;
        spatial.find_in_sphere(center, radius, &mut |handle| {
            !objects.contains(handle) || visit(handle)
        });
        true
    }

    /// Visit live objects inside an axis-aligned box.
    ///
    /// Returns false if no provider is installed.
    pub fn find_objects_in_box(&self, min: Vec3, max: Vec3, mut visit: impl FnMut(ObjectHandle) -> bool) -> bool {
        let Some(spatial) = self.spatial.as_deref() else {
            return false;
        };
        let objects = &self.objects;
        spatial.find_in_box(min, max, &mut |handle| !objects.contains(handle) || visit(handle));
        true
    }

    /// Collect live objects within a sphere
    pub fn collect_objects_in_sphere(&self, center: Vec3, radius: f32) -> Vec<ObjectHandle> {
        let mut found = Vec::new();
        self.find_objects_in_sphere(center, radius, |handle| {
            found.push(handle);
            true
        });
        found
    }
}

//! Scene management

mod camera;
mod sphere_field;
mod transform;

pub use camera::*;
pub use sphere_field::*;
pub use transform::*;

use crate::resources::Mesh;
use glam::{Mat4, Vec3, Vec4};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a [`Scene`]; GPU caches are keyed on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(u64);

impl SceneId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index of a mesh registered with a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub usize);

/// Index of an object in a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub usize);

/// A renderable object in the scene
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub mesh: MeshId,
    /// Unlit RGBA colour
    pub color: Vec4,
    pub transform: Transform,
    pub visible: bool,
    parent: Option<ObjectId>,
    world: Mat4,
}

impl SceneObject {
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            color: Vec4::ONE,
            transform: Transform::default(),
            visible: true,
            parent: None,
            world: Mat4::IDENTITY,
        }
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// World matrix as of the last [`Scene::update_matrix_world`]
    pub fn matrix_world(&self) -> Mat4 {
        self.world
    }
}

/// The scene containing all renderable content
#[derive(Debug)]
pub struct Scene {
    id: SceneId,
    /// Clear colour for each eye; `None` keeps whatever the target was cleared to
    pub background: Option<Vec4>,
    pub matrix_world_auto_update: bool,
    meshes: Vec<Mesh>,
    objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            id: SceneId::next(),
            background: None,
            matrix_world_auto_update: true,
            meshes: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn with_background(mut self, color: Vec4) -> Self {
        self.background = Some(color);
        self
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.meshes.len());
        self.meshes.push(mesh);
        id
    }

    /// Add a root object to the scene
    pub fn add_object(&mut self, object: SceneObject) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(SceneObject {
            parent: None,
            ..object
        });
        id
    }

    /// Add an object under an existing parent. Returns `None` for an unknown parent.
    pub fn add_child(&mut self, parent: ObjectId, object: SceneObject) -> Option<ObjectId> {
        if parent.0 >= self.objects.len() {
            return None;
        }
        let id = ObjectId(self.objects.len());
        self.objects.push(SceneObject {
            parent: Some(parent),
            ..object
        });
        Some(id)
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id.0)
    }

    /// Recompute every object's world matrix.
    ///
    /// Parents always precede their children, so one forward pass suffices.
    pub fn update_matrix_world(&mut self) {
        for i in 0..self.objects.len() {
            let local = self.objects[i].transform.matrix();
            let world = match self.objects[i].parent {
                Some(parent) => self.objects[parent.0].world * local,
                None => local,
            };
            self.objects[i].world = world;
        }
    }

    pub fn world_matrix(&self, id: ObjectId) -> Option<Mat4> {
        self.objects.get(id.0).map(|o| o.world)
    }
}

// A clone can diverge from its source, so it never shares the source's id
impl Clone for Scene {
    fn clone(&self) -> Self {
        Self {
            id: SceneId::next(),
            background: self.background,
            matrix_world_auto_update: self.matrix_world_auto_update,
            meshes: self.meshes.clone(),
            objects: self.objects.clone(),
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_world_composes_parent() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::cube(1.0));
        let parent = scene.add_object(
            SceneObject::new(mesh)
                .with_position(Vec3::new(1.0, 0.0, 0.0))
                .with_scale(Vec3::splat(2.0)),
        );
        let child = scene
            .add_child(parent, SceneObject::new(mesh).with_position(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();

        scene.update_matrix_world();

        let origin = scene.world_matrix(child).unwrap().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
        assert_eq!(scene.object(child).unwrap().parent(), Some(parent));
    }

    #[test]
    fn add_child_rejects_unknown_parent() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::quad(1.0, 1.0));
        assert!(scene.add_child(ObjectId(3), SceneObject::new(mesh)).is_none());
        assert!(scene.objects().is_empty());
    }

    #[test]
    fn scenes_and_clones_get_distinct_ids() {
        let scene = Scene::new();
        let other = Scene::new();
        let copy = scene.clone();

        assert_ne!(scene.id(), other.id());
        assert_ne!(scene.id(), copy.id());
        assert_eq!(scene.id(), scene.id());
    }
}

//! Camera system

use super::Transform;
use glam::{Mat4, Vec3};

/// Perspective projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perspective {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fov_y_degrees: 50.0,
            aspect: 1.0,
            near: 0.1,
            far: 2000.0,
        }
    }
}

impl Perspective {
    pub fn fov_y_radians(&self) -> f32 {
        self.fov_y_degrees.to_radians()
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians(), self.aspect, self.near, self.far)
    }
}

/// Orthographic projection volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orthographic {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Orthographic {
    pub fn new(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::orthographic_rh(self.left, self.right, self.bottom, self.top, self.near, self.far)
    }
}

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective(Perspective),
    Orthographic(Orthographic),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective(Perspective::default())
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective(Perspective {
            fov_y_degrees,
            aspect,
            near,
            far,
        })
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        Projection::Orthographic(Orthographic::new(width, height, near, far))
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective(p) => p.matrix(),
            Projection::Orthographic(o) => o.matrix(),
        }
    }

    pub fn as_perspective(&self) -> Option<&Perspective> {
        match self {
            Projection::Perspective(p) => Some(p),
            Projection::Orthographic(_) => None,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective(p) = self {
            p.aspect = aspect;
        }
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone)]
pub struct Camera {
    pub transform: Transform,
    pub projection: Projection,
    /// World matrix of the node the camera hangs under, if any.
    /// A parented camera's world matrix is the host's job to refresh.
    pub parent: Option<Mat4>,
    pub matrix_world_auto_update: bool,
    world: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Projection::default())
    }
}

impl Camera {
    pub fn new(projection: Projection) -> Self {
        Self {
            transform: Transform::default(),
            projection,
            parent: None,
            matrix_world_auto_update: true,
            world: Mat4::IDENTITY,
        }
    }

    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::perspective(fov_y_degrees, aspect, near, far))
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::orthographic(width, height, near, far))
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    /// Recompute the world matrix from the local transform and the parent
    pub fn update_matrix_world(&mut self) {
        let local = self.transform.matrix();
        self.world = match self.parent {
            Some(parent) => parent * local,
            None => local,
        };
    }

    /// World matrix as of the last `update_matrix_world`
    pub fn matrix_world(&self) -> Mat4 {
        self.world
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.transform.look_at(target, Vec3::Y);
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.projection.set_aspect(width / height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_matrix_follows_parent() {
        let mut camera = Camera::default().with_position(Vec3::new(0.0, 0.0, 3.0));
        camera.parent = Some(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        camera.update_matrix_world();

        let origin = camera.matrix_world().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(1.0, 0.0, 3.0), 1e-6));
    }

    #[test]
    fn set_aspect_only_touches_perspective() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.01, 100.0);
        camera.set_aspect(1280.0, 720.0);
        let aspect = camera.projection.as_perspective().unwrap().aspect;
        assert!((aspect - 16.0 / 9.0).abs() < 1e-6);

        let mut ortho = Camera::orthographic(2.0, 2.0, 0.1, 10.0);
        let before = ortho.projection;
        ortho.set_aspect(1280.0, 720.0);
        assert_eq!(ortho.projection, before);
    }
}

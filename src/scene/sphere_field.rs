//! Orbiting sphere field and pointer-follow camera rig used by the demo

use super::{Camera, ObjectId, Scene, SceneObject};
use crate::resources::Mesh;
use glam::{Vec2, Vec3, Vec4};
use std::time::Duration;

pub const DEFAULT_SPHERE_COUNT: usize = 50;
pub const SPHERE_RADIUS: f32 = 0.1;
/// Unlit white, the spheres carry no material of their own
pub const SPHERE_COLOR: Vec4 = Vec4::ONE;

/// Half extent of the cube spheres are scattered in
const FIELD_EXTENT: f32 = 5.0;
const ORBIT_RADIUS: f32 = 5.0;
const TIME_SCALE: f32 = 0.0001;
const POINTER_SCALE: f32 = 100.0;
const CAMERA_EASING: f32 = 0.05;

/// Per-frame inputs for animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    /// Time since the animation started
    pub elapsed: Duration,
    /// Pointer position in window pixels
    pub pointer: Vec2,
    /// Viewport size in window pixels
    pub viewport: Vec2,
}

impl FrameInput {
    /// Input with the pointer resting at the viewport center
    pub fn centered(elapsed: Duration, viewport: Vec2) -> Self {
        Self {
            elapsed,
            pointer: viewport * 0.5,
            viewport,
        }
    }
}

/// xorshift64* pseudo random generator
#[derive(Debug, Clone)]
pub struct Xorshift64Star {
    state: u64,
}

impl Xorshift64Star {
    pub fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform value in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform value in [min, max)
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}

/// A set of small spheres orbiting the origin
#[derive(Debug, Clone)]
pub struct SphereField {
    spheres: Vec<ObjectId>,
}

impl SphereField {
    /// Scatter `count` spheres through the scene
    pub fn populate(scene: &mut Scene, count: usize, seed: u64) -> Self {
        let mesh = scene.add_mesh(Mesh::sphere(SPHERE_RADIUS, 32, 16));
        let mut rng = Xorshift64Star::new(seed);

        let spheres = (0..count)
            .map(|_| {
                let position = Vec3::new(
                    rng.range(-FIELD_EXTENT, FIELD_EXTENT),
                    rng.range(-FIELD_EXTENT, FIELD_EXTENT),
                    rng.range(-FIELD_EXTENT, FIELD_EXTENT),
                );
                let scale = rng.range(1.0, 4.0);
                scene.add_object(
                    SceneObject::new(mesh)
                        .with_position(position)
                        .with_scale(Vec3::splat(scale))
                        .with_color(SPHERE_COLOR),
                )
            })
            .collect();

        log::debug!("Populated sphere field with {} spheres (seed {})", count, seed);
        Self { spheres }
    }

    pub fn spheres(&self) -> &[ObjectId] {
        &self.spheres
    }

    /// Move every sphere along its orbit for the given frame
    pub fn animate(&self, scene: &mut Scene, input: &FrameInput) {
        let timer = TIME_SCALE * input.elapsed.as_secs_f32() * 1000.0;
        for (i, &id) in self.spheres.iter().enumerate() {
            let Some(object) = scene.object_mut(id) else {
                continue;
            };
            let i = i as f32;
            object.transform.position.x = ORBIT_RADIUS * (timer + i).cos();
            object.transform.position.y = ORBIT_RADIUS * (timer + i * 1.1).sin();
        }
    }
}

/// Eases the camera toward the pointer and keeps it aimed at the origin
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerFollowRig;

impl PointerFollowRig {
    pub fn new() -> Self {
        Self
    }

    pub fn update(&self, camera: &mut Camera, input: &FrameInput) {
        let target = (input.pointer - input.viewport * 0.5) / POINTER_SCALE;
        let position = &mut camera.transform.position;
        position.x += (target.x - position.x) * CAMERA_EASING;
        position.y += (-target.y - position.y) * CAMERA_EASING;
        camera.look_at(Vec3::ZERO);
    }
}

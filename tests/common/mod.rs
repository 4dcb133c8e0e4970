//! Common utilities for renderer integration tests.
//!
//! Provides a test context over either backend so the same test body can run
//! against the recording backend and a real (headless) wgpu device.

#![allow(dead_code)]

use glam::{Vec3, Vec4};
use stereo_anaglyph::backend::{Command, GraphicsBackend, RecordingBackend, WgpuBackend};
use stereo_anaglyph::resources::Mesh;
use stereo_anaglyph::scene::{Camera, Scene, SceneObject};

/// Available backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Recording backend (no actual GPU operations).
    Recording,
    /// wgpu with an offscreen screen texture.
    Wgpu,
}

enum Device {
    Recording(RecordingBackend),
    Wgpu(WgpuBackend),
}

/// Test context holding one backend instance
pub struct TestContext {
    pub backend: Backend,
    device: Device,
}

impl TestContext {
    /// Create a context with a `width` x `height` screen.
    ///
    /// Returns `None` if the backend is not available on this machine.
    pub fn with_size(backend: Backend, width: u32, height: u32) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let device = match backend {
            Backend::Recording => Device::Recording(RecordingBackend::new(width, height)),
            Backend::Wgpu => match WgpuBackend::new_headless(width, height) {
                Ok(gpu) => Device::Wgpu(gpu),
                Err(e) => {
                    log::warn!("wgpu unavailable: {}", e);
                    return None;
                }
            },
        };

        Some(Self { backend, device })
    }

    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_size(backend, 512, 512)
    }

    pub fn gpu(&mut self) -> &mut dyn GraphicsBackend {
        match &mut self.device {
            Device::Recording(b) => b as &mut dyn GraphicsBackend,
            Device::Wgpu(b) => b as &mut dyn GraphicsBackend,
        }
    }

    pub fn recording(&mut self) -> Option<&mut RecordingBackend> {
        match &mut self.device {
            Device::Recording(b) => Some(b),
            Device::Wgpu(_) => None,
        }
    }

    /// Commands recorded so far; `None` for real devices
    pub fn commands(&self) -> Option<&[Command]> {
        match &self.device {
            Device::Recording(b) => Some(b.commands()),
            Device::Wgpu(_) => None,
        }
    }

    /// Read the screen back as RGBA8; `None` for the recording backend
    pub fn screen_pixels(&self) -> Option<Vec<u8>> {
        match &self.device {
            Device::Recording(_) => None,
            Device::Wgpu(b) => Some(b.read_screen_pixels().expect("Failed to read back screen")),
        }
    }
}

/// Fetch one RGBA8 pixel from tightly packed rows
pub fn get_pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    [
        pixels[offset],
        pixels[offset + 1],
        pixels[offset + 2],
        pixels[offset + 3],
    ]
}

/// Quantize a colour the way an `Rgba8Unorm` target stores it
pub fn quantize(color: Vec4) -> Vec4 {
    (color * 255.0).round() / 255.0
}

pub fn to_rgba8(color: Vec4) -> [u8; 4] {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

/// Assert a pixel matches within a per-channel tolerance
pub fn verify_pixel(actual: [u8; 4], expected: [u8; 4], tolerance: u8, context: &str) {
    for channel in 0..4 {
        let diff = actual[channel].abs_diff(expected[channel]);
        assert!(
            diff <= tolerance,
            "{context}: pixel {:?} differs from expected {:?} in channel {}",
            actual,
            expected,
            channel
        );
    }
}

/// The camera used by the pixel tests
pub fn test_camera(z: f32) -> Camera {
    Camera::perspective(60.0, 1.0, 0.01, 100.0).with_position(Vec3::new(0.0, 0.0, z))
}

/// A scene with one flat-coloured quad large enough to fill both eyes' views
/// from a camera at `camera_z`
pub fn uniform_quad_scene(color: Vec4, camera_z: f32) -> Scene {
    let mut scene = Scene::new();
    let quad = scene.add_mesh(Mesh::quad(20.0, 20.0));
    scene.add_object(
        SceneObject::new(quad)
            .with_color(color)
            .with_position(Vec3::new(0.0, 0.0, camera_z - 5.0)),
    );
    scene
}

/// Labels of every render pass begun, in order
pub fn pass_labels(commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::BeginRenderPass { label, .. } => Some(label.clone().unwrap_or_default()),
            _ => None,
        })
        .collect()
}

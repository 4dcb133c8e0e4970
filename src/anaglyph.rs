//! Red/cyan anaglyph renderer
//!
//! Renders a scene once per eye into offscreen targets, then composites both
//! images onto the screen with the Dubois colour matrices.
//!
//! ```no_run
//! use stereo_anaglyph::{AnaglyphRenderer, GraphicsBackend, WgpuBackend};
//! use stereo_anaglyph::scene::{Camera, Scene};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = WgpuBackend::new_headless(512, 512)?;
//! let mut renderer = AnaglyphRenderer::with_size(&mut backend, 512, 512)?;
//! let mut scene = Scene::new();
//! let mut camera = Camera::perspective(60.0, 1.0, 0.01, 100.0);
//!
//! backend.begin_frame()?;
//! renderer.render(&mut backend, &mut scene, &mut camera)?;
//! backend.end_frame()?;
//! renderer.dispose(&mut backend);
//! # Ok(())
//! # }
//! ```

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::scene_pass::ScenePass;
use crate::pipeline::{AnaglyphCompositePass, DuboisMatrices};
use crate::scene::{Camera, Projection, Scene};
use crate::stereo::{Eye, StereoCamera, StereoSettings};
use thiserror::Error;

/// Anaglyph renderer error type
#[derive(Error, Debug)]
pub enum AnaglyphError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Anaglyph renderer has been disposed")]
    Disposed,
}

/// Outcome of [`AnaglyphRenderer::render`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Both eyes were drawn and composited onto the screen
    Rendered,
    /// The camera cannot be split into a stereo pair; nothing was drawn
    Skipped,
}

/// Configuration for creating an [`AnaglyphRenderer`]
#[derive(Debug, Clone)]
pub struct AnaglyphConfig {
    /// Initial eye target width
    pub width: u32,
    /// Initial eye target height
    pub height: u32,
    pub stereo: StereoSettings,
    pub matrices: DuboisMatrices,
    /// Colour format of both eye targets
    pub eye_format: TextureFormat,
}

impl Default for AnaglyphConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            stereo: StereoSettings::default(),
            matrices: DuboisMatrices::default(),
            eye_format: TextureFormat::Rgba8Unorm,
        }
    }
}

/// Offscreen colour and depth attachments for one eye
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeTarget {
    pub color: TextureHandle,
    pub color_view: TextureViewHandle,
    pub depth: TextureHandle,
    pub depth_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

impl EyeTarget {
    fn create<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        eye: Eye,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let (width, height) = (width.max(1), height.max(1));

        let color = backend.create_texture(&TextureDescriptor {
            label: Some(format!("{} Color", eye.label())),
            width,
            height,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_SRC,
        })?;

        let rest = (|| -> BackendResult<_> {
            let color_view = backend.create_texture_view(color)?;
            let depth = match backend.create_texture(&TextureDescriptor {
                label: Some(format!("{} Depth", eye.label())),
                width,
                height,
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::RENDER_ATTACHMENT,
            }) {
                Ok(depth) => depth,
                Err(e) => {
                    backend.destroy_texture_view(color_view);
                    return Err(e);
                }
            };
            match backend.create_texture_view(depth) {
                Ok(depth_view) => Ok((color_view, depth, depth_view)),
                Err(e) => {
                    backend.destroy_texture(depth);
                    backend.destroy_texture_view(color_view);
                    Err(e)
                }
            }
        })();

        match rest {
            Ok((color_view, depth, depth_view)) => Ok(Self {
                color,
                color_view,
                depth,
                depth_view,
                width,
                height,
            }),
            Err(e) => {
                backend.destroy_texture(color);
                Err(e)
            }
        }
    }

    /// Create both eyes, or neither
    fn create_pair<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<[Self; 2]> {
        let left = Self::create(backend, Eye::Left, width, height, format)?;
        match Self::create(backend, Eye::Right, width, height, format) {
            Ok(right) => Ok([left, right]),
            Err(e) => {
                left.release(backend);
                Err(e)
            }
        }
    }

    pub fn render_target(&self) -> RenderTarget {
        RenderTarget {
            color: self.color_view,
            depth: Some(self.depth_view),
            width: self.width,
            height: self.height,
        }
    }

    fn release<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        backend.destroy_texture_view(self.color_view);
        backend.destroy_texture_view(self.depth_view);
        backend.destroy_texture(self.color);
        backend.destroy_texture(self.depth);
    }
}

/// Stereo anaglyph renderer.
///
/// The renderer never owns the backend; every call borrows it for its duration.
pub struct AnaglyphRenderer {
    config: AnaglyphConfig,
    stereo: StereoCamera,
    targets: Option<[EyeTarget; 2]>,
    composite: AnaglyphCompositePass,
    scene_pass: ScenePass,
}

impl AnaglyphRenderer {
    /// Create the eye targets, composite program and scene pass.
    ///
    /// Targets are created at exactly `config.width` x `config.height`; the pixel
    /// ratio only applies from the first [`resize`](Self::resize).
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, config: AnaglyphConfig) -> Result<Self, AnaglyphError> {
        let targets = EyeTarget::create_pair(backend, config.width, config.height, config.eye_format)?;
        let [left, right] = targets;

        let composite = match AnaglyphCompositePass::new(backend, &config.matrices, left.color_view, right.color_view) {
            Ok(composite) => composite,
            Err(e) => {
                left.release(backend);
                right.release(backend);
                return Err(e.into());
            }
        };

        let scene_pass = match ScenePass::new(backend, config.eye_format) {
            Ok(scene_pass) => scene_pass,
            Err(e) => {
                let mut composite = composite;
                composite.release(backend);
                left.release(backend);
                right.release(backend);
                return Err(e.into());
            }
        };

        log::info!(
            "Anaglyph renderer created: {}x{} eye targets ({:?})",
            left.width,
            left.height,
            config.eye_format
        );

        Ok(Self {
            stereo: StereoCamera::new(config.stereo),
            config,
            targets: Some(targets),
            composite,
            scene_pass,
        })
    }

    /// Create a renderer with default settings and the given target size
    pub fn with_size<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<Self, AnaglyphError> {
        Self::new(
            backend,
            AnaglyphConfig {
                width,
                height,
                ..Default::default()
            },
        )
    }

    /// Resize the screen to a logical size and the eye targets to match in physical pixels
    pub fn resize<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<(), AnaglyphError> {
        let Some([left, right]) = self.targets else {
            return Err(AnaglyphError::Disposed);
        };

        backend.set_size(width, height);
        let (target_width, target_height) = scaled_size(width, height, backend.pixel_ratio());
        if (target_width, target_height) == (left.width, left.height) {
            return Ok(());
        }

        let [new_left, new_right] =
            EyeTarget::create_pair(backend, target_width, target_height, self.config.eye_format)?;
        if let Err(e) = self.composite.rebind(backend, new_left.color_view, new_right.color_view) {
            new_left.release(backend);
            new_right.release(backend);
            return Err(e.into());
        }

        left.release(backend);
        right.release(backend);
        self.targets = Some([new_left, new_right]);

        log::debug!("Eye targets resized to {}x{}", target_width, target_height);
        Ok(())
    }

    /// Render one anaglyph frame of `scene` as seen by `camera` onto the screen.
    ///
    /// A frame must be in flight. The render target active before the call is
    /// active again afterwards.
    pub fn render<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &mut Scene,
        camera: &mut Camera,
    ) -> Result<FrameStatus, AnaglyphError> {
        let Some(targets) = self.targets else {
            return Err(AnaglyphError::Disposed);
        };

        let perspective = match &camera.projection {
            Projection::Perspective(perspective) => *perspective,
            Projection::Orthographic(_) => {
                log::warn!("Anaglyph rendering needs a perspective camera; frame skipped");
                return Ok(FrameStatus::Skipped);
            }
        };

        let Some(screen) = backend.screen_target() else {
            return Err(BackendError::NoActiveFrame.into());
        };

        if scene.matrix_world_auto_update {
            scene.update_matrix_world();
        }
        if camera.parent.is_none() && camera.matrix_world_auto_update {
            camera.update_matrix_world();
        }

        self.stereo.update(&perspective, camera.matrix_world());
        self.scene_pass.prepare(backend, scene, &self.stereo)?;

        let saved_target = backend.render_target();

        for eye in Eye::BOTH {
            backend.set_render_target(Some(targets[eye.index()].render_target()));
            backend.clear();
            self.scene_pass.draw(backend, scene, eye);
        }

        backend.set_render_target(None);
        self.composite.execute(backend, screen);

        backend.set_render_target(saved_target);

        Ok(FrameStatus::Rendered)
    }

    /// Release every GPU resource. Later calls to `render` and `resize` fail with
    /// [`AnaglyphError::Disposed`]; disposing twice is a no-op.
    pub fn dispose<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        let Some(targets) = self.targets.take() else {
            return;
        };
        for target in &targets {
            target.release(backend);
        }
        self.composite.release(backend);
        self.scene_pass.release(backend);
        log::debug!("Anaglyph renderer disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.targets.is_none()
    }

    /// Current eye target size in physical pixels
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.targets.map(|[left, _]| (left.width, left.height))
    }

    /// Eye cameras as of the last rendered frame
    pub fn stereo(&self) -> &StereoCamera {
        &self.stereo
    }

    pub fn config(&self) -> &AnaglyphConfig {
        &self.config
    }

    /// Left and right colour textures
    pub fn eye_textures(&self) -> Option<[TextureHandle; 2]> {
        self.targets.map(|[left, right]| [left.color, right.color])
    }

    pub fn eye_targets(&self) -> Option<&[EyeTarget; 2]> {
        self.targets.as_ref()
    }

    /// Pipelines owned by the renderer
    pub fn pipelines(&self) -> [RenderPipelineHandle; 2] {
        [self.scene_pass.pipeline(), self.composite.pipeline()]
    }

    /// Change eye separation and focus; projections are rebuilt on the next frame
    pub fn set_stereo_settings(&mut self, settings: StereoSettings) {
        self.config.stereo = settings;
        self.stereo.settings = settings;
    }

    /// Replace the colour matrices used by the composite
    pub fn set_matrices<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        matrices: DuboisMatrices,
    ) -> Result<(), AnaglyphError> {
        if self.is_disposed() {
            return Err(AnaglyphError::Disposed);
        }
        self.composite.set_matrices(backend, &matrices);
        self.config.matrices = matrices;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn construction_failure_releases_partial_resources() {
        let mut backend = RecordingBackend::new(64, 64);
        backend.fail_texture_creation(true);
        let result = AnaglyphRenderer::with_size(&mut backend, 64, 64);
        assert!(matches!(
            result,
            Err(AnaglyphError::Backend(BackendError::TextureCreationFailed(_)))
        ));
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn eye_targets_pair_colour_with_depth() {
        let mut backend = RecordingBackend::new(64, 64);
        let renderer = AnaglyphRenderer::with_size(&mut backend, 96, 48).unwrap();

        for target in renderer.eye_targets().unwrap() {
            let color = backend.texture_descriptor(target.color).unwrap();
            assert_eq!(color.format, TextureFormat::Rgba8Unorm);
            assert!(color.usage.contains(TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING));

            let depth = backend.texture_descriptor(target.depth).unwrap();
            assert_eq!(depth.format, TextureFormat::Depth32Float);

            assert_eq!(backend.texture_size(target.color), Some((96, 48)));
            assert_eq!(backend.texture_size(target.depth), Some((96, 48)));
        }
    }

    #[test]
    fn failed_resize_keeps_previous_targets() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut renderer = AnaglyphRenderer::with_size(&mut backend, 64, 64).unwrap();
        let before = renderer.eye_textures().unwrap();

        backend.fail_texture_creation(true);
        assert!(renderer.resize(&mut backend, 128, 128).is_err());
        assert_eq!(renderer.eye_textures(), Some(before));
        assert_eq!(renderer.target_size(), Some((64, 64)));
        assert!(before.iter().all(|&t| backend.has_texture(t)));
    }

    #[test]
    fn set_stereo_settings_reaches_eye_cameras() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut renderer = AnaglyphRenderer::with_size(&mut backend, 64, 64).unwrap();
        let settings = StereoSettings {
            eye_separation: 0.1,
            focus: 3.0,
        };
        renderer.set_stereo_settings(settings);
        assert_eq!(renderer.stereo().settings, settings);
        assert_eq!(renderer.config().stereo, settings);
    }
}

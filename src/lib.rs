//! Stereo Anaglyph - red/cyan stereoscopic rendering on wgpu
//!
//! A scene is drawn once per eye from an off-axis stereo camera pair, then the
//! two images are mixed with the Dubois colour matrices into a single frame
//! viewable with red/cyan glasses.
//!
//! # Features
//! - [`AnaglyphRenderer`]: eye targets, stereo derivation and the composite pass
//! - Handle-based [`GraphicsBackend`] with a wgpu implementation (windowed or
//!   headless with pixel readback) and a recording implementation for tests
//! - Minimal scene graph, perspective/orthographic cameras and mesh generators
//! - Orbiting sphere field and pointer-follow camera rig for the demo

pub mod anaglyph;
pub mod backend;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod stereo;
pub mod window;

pub use anaglyph::{AnaglyphConfig, AnaglyphError, AnaglyphRenderer, EyeTarget, FrameStatus};
pub use backend::traits::{BackendError, BackendResult, GraphicsBackend};
pub use backend::{RecordingBackend, WgpuBackend};
pub use pipeline::{composite_texel, DuboisMatrices};
pub use stereo::{Eye, EyeCamera, StereoCamera, StereoSettings};
pub use window::Window;

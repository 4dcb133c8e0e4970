//! Integration tests for the anaglyph renderer.
//!
//! Tests are parameterized using `rstest` to run against the recording backend
//! and, where an adapter is available, a headless wgpu device.
//!
//! # Test Categories
//!
//! - **Frame Tests**: pass order, target restore, skip and error paths
//! - **Lifecycle Tests**: resize idempotency and disposal
//! - **Pixel Tests**: composite output read back from the wgpu screen
//!
//! ```bash
//! cargo test --test anaglyph_tests
//! ```

mod common;

use common::{
    get_pixel, pass_labels, quantize, test_camera, to_rgba8, uniform_quad_scene, verify_pixel, Backend,
    TestContext,
};
use glam::{Mat4, Vec3, Vec4};
use rstest::rstest;
use stereo_anaglyph::backend::{BackendError, Command, GraphicsBackend, RenderTarget, TextureDescriptor, TextureUsage};
use stereo_anaglyph::resources::Mesh;
use stereo_anaglyph::scene::{Camera, Scene, SceneObject};
use stereo_anaglyph::{composite_texel, AnaglyphError, AnaglyphRenderer, DuboisMatrices, FrameStatus};

// ============================================================================
// Frame Tests
// ============================================================================

/// Passes run left clear, left draw, right clear, right draw, then the composite
/// onto the frame's screen view.
#[test]
fn test_pass_order() {
    let mut ctx = TestContext::new(Backend::Recording).unwrap();
    let mut renderer = AnaglyphRenderer::with_size(ctx.gpu(), 512, 512).unwrap();
    let mut scene = uniform_quad_scene(Vec4::ONE, 3.0);
    let mut camera = test_camera(3.0);

    let gpu = ctx.recording().unwrap();
    gpu.begin_frame().unwrap();
    gpu.clear_commands();
    let status = renderer.render(gpu, &mut scene, &mut camera).unwrap();
    let screen = gpu.frame_view().unwrap();
    gpu.end_frame().unwrap();
    assert_eq!(status, FrameStatus::Rendered);

    let commands = ctx.commands().unwrap();
    assert_eq!(
        pass_labels(commands),
        [
            "Clear",
            "Left Eye Scene Pass",
            "Clear",
            "Right Eye Scene Pass",
            "Anaglyph Composite"
        ]
    );

    let [left, right] = *renderer.eye_targets().unwrap();
    let colors: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::BeginRenderPass { color, .. } => Some(*color),
            _ => None,
        })
        .collect();
    assert_eq!(
        colors,
        [left.color_view, left.color_view, right.color_view, right.color_view, screen]
    );

    // Composite draws one full-screen triangle
    assert_eq!(commands.last(), Some(&Command::EndRenderPass));
    assert!(commands.contains(&Command::Draw { vertices: 0..3 }));

    // All uploads precede the first pass
    let first_pass = commands
        .iter()
        .position(|c| matches!(c, Command::BeginRenderPass { .. }))
        .unwrap();
    assert!(commands[first_pass..]
        .iter()
        .all(|c| !matches!(c, Command::WriteBuffer { .. })));
}

#[rstest]
#[case::recording(Backend::Recording)]
#[case::wgpu(Backend::Wgpu)]
fn test_render_target_restored(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let gpu = ctx.gpu();
    let mut renderer = AnaglyphRenderer::with_size(gpu, 64, 64).unwrap();

    let texture = gpu
        .create_texture(&TextureDescriptor {
            label: Some("Host Target".into()),
            width: 64,
            height: 64,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        })
        .unwrap();
    let view = gpu.create_texture_view(texture).unwrap();
    let host_target = RenderTarget {
        color: view,
        depth: None,
        width: 64,
        height: 64,
    };

    let mut scene = Scene::new();
    let mut camera = test_camera(3.0);

    gpu.begin_frame().unwrap();
    gpu.set_render_target(Some(host_target));
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    assert_eq!(gpu.render_target(), Some(host_target));

    gpu.set_render_target(None);
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    assert_eq!(gpu.render_target(), None);
    gpu.end_frame().unwrap();
}

#[rstest]
#[case::recording(Backend::Recording)]
#[case::wgpu(Backend::Wgpu)]
fn test_orthographic_camera_is_skipped(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::with_size(backend, 64, 64) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut renderer = AnaglyphRenderer::with_size(ctx.gpu(), 64, 64).unwrap();
    let mut scene = uniform_quad_scene(Vec4::ONE, 3.0);

    // Put a known frame on screen first
    let mut perspective = test_camera(3.0);
    let gpu = ctx.gpu();
    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut perspective).unwrap();
    gpu.end_frame().unwrap();
    let before = ctx.screen_pixels();

    if let Some(recording) = ctx.recording() {
        recording.clear_commands();
    }

    let mut ortho = Camera::orthographic(2.0, 2.0, 0.1, 100.0);
    let gpu = ctx.gpu();
    gpu.begin_frame().unwrap();
    let status = renderer.render(gpu, &mut scene, &mut ortho).unwrap();
    gpu.end_frame().unwrap();

    assert_eq!(status, FrameStatus::Skipped);
    if let Some(commands) = ctx.commands() {
        assert!(commands.is_empty(), "skipped frame recorded {:?}", commands);
    }
    assert_eq!(ctx.screen_pixels(), before);
}

#[test]
fn test_render_without_frame_fails_before_gpu_work() {
    let mut ctx = TestContext::new(Backend::Recording).unwrap();
    let mut renderer = AnaglyphRenderer::with_size(ctx.gpu(), 64, 64).unwrap();
    let mut scene = uniform_quad_scene(Vec4::ONE, 3.0);
    let mut camera = test_camera(3.0);

    let gpu = ctx.recording().unwrap();
    gpu.clear_commands();
    let result = renderer.render(gpu, &mut scene, &mut camera);

    assert!(matches!(result, Err(AnaglyphError::Backend(BackendError::NoActiveFrame))));
    assert!(gpu.commands().is_empty());
}

#[test]
fn test_auto_update_flags_are_honoured() {
    let mut ctx = TestContext::new(Backend::Recording).unwrap();
    let mut renderer = AnaglyphRenderer::with_size(ctx.gpu(), 64, 64).unwrap();
    let mut scene = uniform_quad_scene(Vec4::ONE, 3.0);
    scene.matrix_world_auto_update = false;

    // A parented camera is left for its host to update
    let mut camera = test_camera(3.0);
    camera.parent = Some(Mat4::IDENTITY);

    let gpu = ctx.gpu();
    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    assert_eq!(scene.objects()[0].matrix_world(), Mat4::IDENTITY);
    let center = (renderer.stereo().left().position() + renderer.stereo().right().position()) * 0.5;
    assert!(center.abs_diff_eq(Vec3::ZERO, 1e-6));

    scene.matrix_world_auto_update = true;
    camera.parent = None;
    let gpu = ctx.gpu();
    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    assert_eq!(scene.objects()[0].matrix_world().w_axis.z, -2.0);
    let center = (renderer.stereo().left().position() + renderer.stereo().right().position()) * 0.5;
    assert!(center.abs_diff_eq(Vec3::new(0.0, 0.0, 3.0), 1e-6));
}

#[test]
fn test_camera_translation_moves_both_eyes() {
    let mut ctx = TestContext::new(Backend::Recording).unwrap();
    let mut renderer = AnaglyphRenderer::with_size(ctx.gpu(), 64, 64).unwrap();
    let mut scene = Scene::new();
    let mut camera = test_camera(3.0);
    camera.look_at(Vec3::new(1.0, 0.5, 0.0));

    let gpu = ctx.gpu();
    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    let left_before = renderer.stereo().left().position();
    let right_before = renderer.stereo().right().position();

    let delta = Vec3::new(-0.75, 2.0, 0.5);
    camera.transform.translate(delta);
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    assert!((renderer.stereo().left().position() - left_before).abs_diff_eq(delta, 1e-5));
    assert!((renderer.stereo().right().position() - right_before).abs_diff_eq(delta, 1e-5));
    assert_eq!(renderer.stereo().projection_updates(), 1);
}

/// Each frame draws the geometry of the scene it was given, even when the
/// renderer saw a different scene before.
#[test]
fn test_switching_scenes_draws_new_geometry() {
    let mut ctx = TestContext::new(Backend::Recording).unwrap();
    let mut renderer = AnaglyphRenderer::with_size(ctx.gpu(), 64, 64).unwrap();
    let mut camera = test_camera(3.0);

    let mut cubes = Scene::new();
    let cube = cubes.add_mesh(Mesh::cube(1.0));
    cubes.add_object(SceneObject::new(cube).with_position(Vec3::new(0.0, 0.0, -2.0)));

    let mut quads = uniform_quad_scene(Vec4::ONE, 3.0);

    let gpu = ctx.recording().unwrap();
    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut cubes, &mut camera).unwrap();
    gpu.end_frame().unwrap();
    let live_after_cubes = gpu.live_resources();

    gpu.begin_frame().unwrap();
    gpu.clear_commands();
    renderer.render(gpu, &mut quads, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    let drawn: Vec<_> = gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexed { indices } => Some(indices.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(drawn, [0..6, 0..6]);
    // The cube scene's buffers were swapped for the quad scene's, not kept alongside
    assert_eq!(gpu.live_resources(), live_after_cubes);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[rstest]
#[case::recording(Backend::Recording)]
#[case::wgpu(Backend::Wgpu)]
fn test_resize_scales_and_is_idempotent(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let gpu = ctx.gpu();
    let mut renderer = AnaglyphRenderer::with_size(gpu, 512, 512).unwrap();
    gpu.set_pixel_ratio(2.0);

    // Construction ignores the pixel ratio
    assert_eq!(renderer.target_size(), Some((512, 512)));

    renderer.resize(gpu, 100, 50).unwrap();
    assert_eq!(renderer.target_size(), Some((200, 100)));
    assert_eq!(gpu.surface_size(), (200, 100));
    let textures = renderer.eye_textures().unwrap();

    renderer.resize(gpu, 100, 50).unwrap();
    assert_eq!(renderer.eye_textures(), Some(textures));
    assert!(textures.iter().all(|&t| gpu.has_texture(t)));

    renderer.resize(gpu, 120, 50).unwrap();
    assert_eq!(renderer.target_size(), Some((240, 100)));
    assert!(textures.iter().all(|&t| !gpu.has_texture(t)));
}

#[rstest]
#[case::recording(Backend::Recording)]
#[case::wgpu(Backend::Wgpu)]
fn test_dispose_releases_everything(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let gpu = ctx.gpu();
    let mut renderer = AnaglyphRenderer::with_size(gpu, 64, 64).unwrap();
    let mut scene = uniform_quad_scene(Vec4::ONE, 3.0);
    let mut camera = test_camera(3.0);

    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    let [left, right] = *renderer.eye_targets().unwrap();
    let pipelines = renderer.pipelines();

    renderer.dispose(gpu);
    assert!(renderer.is_disposed());
    assert_eq!(renderer.eye_textures(), None);
    for texture in [left.color, left.depth, right.color, right.depth] {
        assert!(!gpu.has_texture(texture));
    }
    for pipeline in pipelines {
        assert!(!gpu.has_render_pipeline(pipeline));
    }

    // Second dispose is a no-op
    renderer.dispose(gpu);

    gpu.begin_frame().unwrap();
    assert!(matches!(
        renderer.render(gpu, &mut scene, &mut camera),
        Err(AnaglyphError::Disposed)
    ));
    let mut ortho = Camera::orthographic(2.0, 2.0, 0.1, 10.0);
    assert!(matches!(
        renderer.render(gpu, &mut scene, &mut ortho),
        Err(AnaglyphError::Disposed)
    ));
    gpu.end_frame().unwrap();
    assert!(matches!(renderer.resize(gpu, 10, 10), Err(AnaglyphError::Disposed)));

    if let Some(recording) = ctx.recording() {
        assert_eq!(recording.live_resources(), 0);
    }
}

// ============================================================================
// Pixel Tests
// ============================================================================

/// A flat colour seen by both eyes composites to `composite_texel(C, C)`,
/// wherever the camera sits along its view axis.
#[rstest]
#[case::white(Vec4::ONE, 3.0)]
#[case::white_far(Vec4::ONE, 40.0)]
#[case::orange(Vec4::new(0.8, 0.4, 0.2, 1.0), 3.0)]
#[case::orange_behind(Vec4::new(0.8, 0.4, 0.2, 1.0), -12.5)]
#[case::teal(Vec4::new(0.1, 0.6, 0.7, 1.0), 7.0)]
fn test_uniform_quad_composite(#[case] color: Vec4, #[case] camera_z: f32) {
    let Some(mut ctx) = TestContext::new(Backend::Wgpu) else {
        eprintln!("Backend {:?} not available, skipping", Backend::Wgpu);
        return;
    };
    let gpu = ctx.gpu();
    let mut renderer = AnaglyphRenderer::with_size(gpu, 512, 512).unwrap();
    let mut scene = uniform_quad_scene(color, camera_z);
    let mut camera = test_camera(camera_z);

    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    let pixels = ctx.screen_pixels().unwrap();
    let eye = quantize(color);
    let expected = to_rgba8(composite_texel(eye, eye, &DuboisMatrices::default()));

    for (x, y) in [(0, 0), (256, 256), (511, 0), (0, 511), (511, 511), (100, 400)] {
        verify_pixel(get_pixel(&pixels, 512, x, y), expected, 2, &format!("({x}, {y})"));
    }
}

#[test]
fn test_white_composites_to_white() {
    let Some(mut ctx) = TestContext::new(Backend::Wgpu) else {
        eprintln!("Backend {:?} not available, skipping", Backend::Wgpu);
        return;
    };
    let gpu = ctx.gpu();
    let mut renderer = AnaglyphRenderer::with_size(gpu, 512, 512).unwrap();
    let mut scene = uniform_quad_scene(Vec4::ONE, 3.0);
    let mut camera = test_camera(3.0);

    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    let pixels = ctx.screen_pixels().unwrap();
    verify_pixel(get_pixel(&pixels, 512, 256, 256), [255, 255, 255, 255], 1, "center");
}

#[test]
fn test_background_fills_eyes() {
    let Some(mut ctx) = TestContext::with_size(Backend::Wgpu, 128, 128) else {
        eprintln!("Backend {:?} not available, skipping", Backend::Wgpu);
        return;
    };
    let gpu = ctx.gpu();
    let mut renderer = AnaglyphRenderer::with_size(gpu, 128, 128).unwrap();
    let background = Vec4::new(0.0, 0.0, 1.0, 1.0);
    let mut scene = Scene::new().with_background(background);
    let mut camera = test_camera(3.0);

    gpu.begin_frame().unwrap();
    renderer.render(gpu, &mut scene, &mut camera).unwrap();
    gpu.end_frame().unwrap();

    let pixels = ctx.screen_pixels().unwrap();
    let expected = to_rgba8(composite_texel(background, background, &DuboisMatrices::default()));
    verify_pixel(get_pixel(&pixels, 128, 64, 64), expected, 2, "center");
}

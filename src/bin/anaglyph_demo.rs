//! Orbiting spheres rendered as a red/cyan anaglyph
//!
//! Run with:
//!   cargo run --bin anaglyph_demo
//!   cargo run --bin anaglyph_demo -- --headless --frames 60 --screenshot out.png
//!
//! Move the mouse to sway the camera. Close the window to exit.

use clap::Parser;
use glam::{Vec2, Vec3, Vec4};
use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use stereo_anaglyph::{
    backend::BackendError,
    scene::{Camera, FrameInput, PointerFollowRig, Scene, SphereField, DEFAULT_SPHERE_COUNT},
    window, AnaglyphConfig, AnaglyphError, AnaglyphRenderer, GraphicsBackend, StereoSettings, WgpuBackend,
    Window,
};
use winit::event_loop::EventLoop;

/// Simulated frame interval in headless mode
const HEADLESS_FRAME_TIME: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(
    name = "anaglyph_demo",
    about = "Orbiting spheres rendered as a red/cyan anaglyph"
)]
struct Args {
    /// Logical width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Logical height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Number of spheres.
    #[arg(long, default_value_t = DEFAULT_SPHERE_COUNT)]
    spheres: usize,

    /// Seed for the sphere layout.
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Distance between the eyes in world units.
    #[arg(long, default_value = "0.064", value_parser = positive_f32)]
    eye_separation: f32,

    /// Distance to the zero-parallax plane.
    #[arg(long, default_value = "10", value_parser = positive_f32)]
    focus: f32,

    /// Disable vertical sync (may cause tearing).
    #[arg(long)]
    no_vsync: bool,

    /// Render offscreen without opening a window.
    #[arg(long)]
    headless: bool,

    /// Number of frames to render in headless mode.
    #[arg(long, default_value = "1")]
    frames: u32,

    /// Save the last headless frame as a PNG.
    #[arg(long, requires = "headless")]
    screenshot: Option<PathBuf>,
}

fn positive_f32(value: &str) -> Result<f32, String> {
    let parsed: f32 = value.parse().map_err(|e| format!("`{value}` is not a number: {e}"))?;
    if parsed > 0.0 && parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(format!("`{value}` must be a positive distance"))
    }
}

/// Scene, camera and animation shared by both modes
struct Demo {
    scene: Scene,
    camera: Camera,
    field: SphereField,
    rig: PointerFollowRig,
}

impl Demo {
    fn new(args: &Args) -> Self {
        let mut scene = Scene::new().with_background(Vec4::new(0.0, 0.0, 0.0, 1.0));
        let field = SphereField::populate(&mut scene, args.spheres, args.seed);
        let camera = Camera::perspective(60.0, args.width as f32 / args.height.max(1) as f32, 0.01, 100.0)
            .with_position(Vec3::new(0.0, 0.0, 3.0));

        Self {
            scene,
            camera,
            field,
            rig: PointerFollowRig::new(),
        }
    }

    fn animate(&mut self, input: &FrameInput) {
        self.field.animate(&mut self.scene, input);
        self.rig.update(&mut self.camera, input);
    }
}

fn renderer_config(args: &Args) -> AnaglyphConfig {
    AnaglyphConfig {
        width: args.width,
        height: args.height,
        stereo: StereoSettings {
            eye_separation: args.eye_separation,
            focus: args.focus,
        },
        ..Default::default()
    }
}

fn run_headless(args: &Args) -> Result<(), Box<dyn Error>> {
    let mut backend = WgpuBackend::new_headless(args.width, args.height)?;
    let mut renderer = AnaglyphRenderer::new(&mut backend, renderer_config(args))?;
    let mut demo = Demo::new(args);
    let viewport = Vec2::new(args.width as f32, args.height as f32);

    for frame in 0..args.frames.max(1) {
        let input = FrameInput::centered(HEADLESS_FRAME_TIME * frame, viewport);
        demo.animate(&input);

        backend.begin_frame()?;
        renderer.render(&mut backend, &mut demo.scene, &mut demo.camera)?;
        backend.end_frame()?;
    }
    log::info!("Rendered {} headless frame(s)", args.frames.max(1));

    if let Some(path) = &args.screenshot {
        let (width, height) = backend.surface_size();
        let pixels = backend.read_screen_pixels()?;
        let image = image::RgbaImage::from_raw(width, height, pixels)
            .ok_or("screen readback has an unexpected size")?;
        image.save(path)?;
        log::info!("Saved screenshot to {}", path.display());
    }

    renderer.dispose(&mut backend);
    Ok(())
}

fn run_windowed(args: &Args) -> Result<(), Box<dyn Error>> {
    let event_loop = EventLoop::new()?;
    let window = Window::new(&event_loop, "Stereo Anaglyph", args.width, args.height)?;

    let mut backend = WgpuBackend::new(window.window_arc(), !args.no_vsync)?;
    backend.set_pixel_ratio(window.scale_factor() as f32);

    let mut renderer = AnaglyphRenderer::new(&mut backend, renderer_config(args))?;
    let (width, height) = window.logical_dimensions();
    renderer.resize(&mut backend, width, height)?;

    let mut demo = Demo::new(args);
    demo.camera.set_aspect(width as f32, height as f32);
    let start = Instant::now();

    window::run(event_loop, window, move |window| {
        if window.should_close() {
            renderer.dispose(&mut backend);
            return false;
        }

        let (width, height) = window.logical_dimensions();
        if window.was_resized() {
            window.clear_resize_flag();
            backend.set_pixel_ratio(window.scale_factor() as f32);
            demo.camera.set_aspect(width as f32, height as f32);
            if let Err(e) = renderer.resize(&mut backend, width, height) {
                log::error!("Resize failed: {}", e);
            }
        }

        let input = FrameInput {
            elapsed: start.elapsed(),
            pointer: window.cursor(),
            viewport: Vec2::new(width as f32, height as f32),
        };
        demo.animate(&input);

        match backend.begin_frame() {
            Ok(_) => {}
            Err(BackendError::SurfaceLost) => {
                let (physical_width, physical_height) = window.dimensions();
                backend.resize(physical_width, physical_height);
                return true;
            }
            Err(e) => {
                log::error!("Failed to acquire frame: {}", e);
                return true;
            }
        }

        let result = renderer.render(&mut backend, &mut demo.scene, &mut demo.camera);
        if let Err(e) = backend.end_frame() {
            log::error!("Failed to present frame: {}", e);
        }

        match result {
            Ok(_) => true,
            Err(AnaglyphError::Disposed) => false,
            Err(e) => {
                log::error!("Anaglyph render failed: {}", e);
                true
            }
        }
    })?;

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!(
        "Anaglyph demo: {}x{}, {} spheres, seed {}",
        args.width,
        args.height,
        args.spheres,
        args.seed
    );

    if args.headless {
        run_headless(&args)
    } else {
        run_windowed(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let args = Args::try_parse_from(["anaglyph_demo"]).unwrap();
        assert_eq!(args.focus, 10.0);
        assert_eq!(args.eye_separation, 0.064);
        assert_eq!(args.spheres, DEFAULT_SPHERE_COUNT);
    }

    #[test]
    fn stereo_distances_must_be_positive() {
        for bad in [["--focus", "0"], ["--focus", "-1"], ["--eye-separation", "0"], ["--focus", "inf"]] {
            let argv = ["anaglyph_demo", bad[0], bad[1]];
            assert!(Args::try_parse_from(argv).is_err(), "{:?} was accepted", bad);
        }
        let args = Args::try_parse_from(["anaglyph_demo", "--focus", "2.5"]).unwrap();
        assert_eq!(args.focus, 2.5);
    }
}

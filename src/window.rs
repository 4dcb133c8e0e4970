//! Window management using winit

use glam::Vec2;
use std::sync::Arc;
use winit::{
    dpi::LogicalSize,
    error::{EventLoopError, OsError},
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    scale_factor: f64,
    cursor: Vec2,
    resized: bool,
    close_requested: bool,
}

impl Window {
    /// Create a new window with the given title and logical dimensions
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Result<Self, OsError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(LogicalSize::new(width, height))
                .build(event_loop)?,
        );

        let size = window.inner_size();
        let scale_factor = window.scale_factor();
        Ok(Self {
            window,
            width: size.width,
            height: size.height,
            scale_factor,
            cursor: Vec2::new(width as f32, height as f32) * 0.5,
            resized: false,
            close_requested: false,
        })
    }

    /// Get the raw window for backend initialization
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Current window dimensions in physical pixels
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Current window dimensions in logical pixels
    pub fn logical_dimensions(&self) -> (u32, u32) {
        let size = winit::dpi::PhysicalSize::new(self.width, self.height).to_logical::<f64>(self.scale_factor);
        (size.width.round() as u32, size.height.round() as u32)
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Last cursor position in logical pixels
    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }

    /// Check if window was resized since last frame
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Clear the resize flag
    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = *scale_factor;
                self.resized = true;
            }
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(self.scale_factor);
                self.cursor = Vec2::new(logical.x, logical.y);
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Run the event loop, calling `callback` once per frame until it returns `false`
/// or the window is closed
pub fn run<F>(event_loop: EventLoop<()>, mut window: Window, mut callback: F) -> Result<(), EventLoopError>
where
    F: FnMut(&mut Window) -> bool + 'static,
{
    event_loop.run(move |event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                window.handle_event(&event);

                if let WindowEvent::CloseRequested = event {
                    elwt.exit();
                }
            }
            Event::AboutToWait => {
                if !callback(&mut window) {
                    elwt.exit();
                    return;
                }
                window.request_redraw();
            }
            _ => {}
        }
    })
}

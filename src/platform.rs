// Window system integration
//
// A thin polling facade over winit: the renderer drives its own loop and
// asks the window to pump events between frames, instead of handing
// control to `EventLoop::run_app`.

use crate::error::{RendererError, RendererResult};
use raw_window_handle::{
    HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

/// How long to wait for the platform to hand us a window
const CREATE_PUMP_ATTEMPTS: u32 = 200;
const CREATE_PUMP_TIMEOUT: Duration = Duration::from_millis(10);

/// What the renderer needs from a window to present into it
pub trait SurfaceProvider {
    fn raw_display_handle(&self) -> RawDisplayHandle;
    fn raw_window_handle(&self) -> RawWindowHandle;
    /// Drawable size in pixels
    fn extent(&self) -> (u32, u32);
}

/// Receives winit callbacks while events are pumped
struct WindowHandler {
    attributes: Option<WindowAttributes>,
    window: Option<Window>,
    create_error: Option<String>,
    close_requested: bool,
}

impl ApplicationHandler for WindowHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };

        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.create_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                }
            }
            _ => {}
        }
    }
}

/// The application window plus the event loop that feeds it
pub struct AppWindow {
    // Dropped before the event loop
    window: Window,
    event_loop: EventLoop<()>,
    handler: WindowHandler,
}

impl AppWindow {
    /// Create a fixed-size window and wait until the platform has shown it
    pub fn create(width: u32, height: u32, title: &str) -> RendererResult<Self> {
        log::info!("Creating window: {}x{} \"{}\"", width, height, title);

        let mut event_loop =
            EventLoop::new().map_err(|e| RendererError::Window(format!("event loop: {}", e)))?;

        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(false);

        let mut handler = WindowHandler {
            attributes: Some(attributes),
            window: None,
            create_error: None,
            close_requested: false,
        };

        for _ in 0..CREATE_PUMP_ATTEMPTS {
            let status = event_loop.pump_app_events(Some(CREATE_PUMP_TIMEOUT), &mut handler);

            if let Some(e) = handler.create_error.take() {
                return Err(RendererError::Window(e));
            }
            if let Some(window) = handler.window.take() {
                return Ok(Self {
                    window,
                    event_loop,
                    handler,
                });
            }
            if let PumpStatus::Exit(code) = status {
                return Err(RendererError::Window(format!(
                    "event loop exited ({}) before the window appeared",
                    code
                )));
            }
        }

        Err(RendererError::Window("timed out waiting for the window".into()))
    }

    /// Process pending events without blocking
    pub fn poll_events(&mut self) {
        if let PumpStatus::Exit(_) = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler)
        {
            self.handler.close_requested = true;
        }
    }

    pub fn should_close(&self) -> bool {
        self.handler.close_requested
    }

    /// Must be called after every GPU object referencing the window is gone
    pub fn destroy(self) {
        drop(self);
        log::info!("Window destroyed");
    }
}

impl SurfaceProvider for AppWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.raw_display_handle()
    }

    fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.raw_window_handle()
    }

    fn extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

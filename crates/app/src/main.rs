//! Vulkan Triangle - Main Entry Point
//!
//! Opens a resizable window and draws a single colored triangle until the
//! window is closed. Any fatal renderer error ends the loop and is reported
//! on stderr with a non-zero exit code.

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use triangle_core::RendererConfig;
use triangle_platform::{SurfaceEvent, Window, classify_event};
use triangle_renderer::Renderer;

struct App {
    config: RendererConfig,
    // Declared before `window` so the renderer is torn down first
    renderer: Option<Renderer>,
    window: Option<Window>,
    /// First fatal error; the event loop exits as soon as it is set.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config).context("Failed to create window")?;
        let renderer = Renderer::new(&window, self.config.clone())
            .context("Failed to create renderer")?;

        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(surface_event) = classify_event(&event) else {
            return;
        };

        let result = match (surface_event, self.renderer.as_mut()) {
            (SurfaceEvent::QuitRequested, _) => {
                info!("Close requested, shutting down");
                event_loop.exit();
                Ok(())
            }
            (SurfaceEvent::Resized { width, height }, Some(renderer)) => {
                debug!("Window resized to {}x{}", width, height);
                renderer.resize(width, height).context("Swapchain rebuild failed")
            }
            (SurfaceEvent::RedrawRequested, Some(renderer)) => {
                renderer.draw_frame().context("Frame failed")
            }
            (_, None) => Ok(()),
        };

        if let Err(e) = result {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    triangle_core::init_logging();
    info!("Starting Vulkan Triangle");

    let config = RendererConfig::default();
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Orderly shutdown before the window goes away
    drop(app.renderer.take());
    drop(app.window.take());

    match app.failure {
        Some(err) => Err(err),
        None => {
            info!("Exited cleanly");
            Ok(())
        }
    }
}

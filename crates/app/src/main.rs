//! vkcraft - textured model viewer.
//!
//! Opens a window, loads the configured OBJ model and texture, and draws it
//! spinning until the window is closed or Escape is pressed.

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkcraft_core::{FrameTimer, RunConfig};
use vkcraft_platform::{EventBus, InputEvent, InputState, KeyCode, Window};
use vkcraft_renderer::{FrameOutcome, Renderer, RendererConfig};
use vkcraft_scene::CameraController;

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

const EXIT_KEY: KeyCode = KeyCode::Escape;

struct App {
    config: RendererConfig,
    // Dropped before the window it draws into.
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    events: EventBus,
    controller: CameraController,
    timer: FrameTimer,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        let events = EventBus::new();
        let mut controller = CameraController::new();
        controller.attach(&events);

        Self {
            config,
            renderer: None,
            window: None,
            input: InputState::new(),
            events,
            controller,
            timer: FrameTimer::new(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            WINDOW_WIDTH,
            WINDOW_HEIGHT,
            &self.config.window_title,
        )
        .context("failed to create window")?;
        let renderer =
            Renderer::new(&window, &self.config).context("failed to initialize renderer")?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        self.timer.reset();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let frame = self.timer.frame();
        self.controller
            .update(renderer.camera_mut(), &self.input, frame.delta);
        self.input.begin_frame();

        match renderer.draw_frame(window, frame.elapsed)? {
            FrameOutcome::Skipped => event_loop.set_control_flow(ControlFlow::Wait),
            FrameOutcome::Recreated => debug!("Swapchain recreated"),
            FrameOutcome::Presented => {}
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.as_ref()
            && let Err(e) = renderer.wait_idle()
        {
            error!("Failed to wait for device idle on shutdown: {e}");
        }
        self.renderer = None;
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(input_event) = InputEvent::from_window_event(&event) {
            self.input.apply(&input_event);
            self.events.publish(&input_event);

            if input_event.is_key_press(EXIT_KEY) {
                info!("Escape pressed, shutting down");
                event_loop.exit();
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!(width = size.width, height = size.height, "Window resized");
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.notify_resized();
                }
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw(event_loop) {
                    self.fail(event_loop, e.context("frame failed"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.as_ref() else {
            return;
        };

        // A minimized window sleeps until the next event.
        if window.is_minimized() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    vkcraft_core::init_logging();
    info!("Starting vkcraft");

    let run_config = RunConfig::locate().context("failed to read run configuration")?;
    let config = RendererConfig::from_run_config(&run_config);
    info!(
        model = %config.model_path.display(),
        texture = %config.texture_path.display(),
        validation = config.enable_validation,
        "Configuration loaded"
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.shutdown();

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

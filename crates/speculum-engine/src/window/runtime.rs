use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App, AppControl};
use crate::device::{GpuInit, WgpuBackend};

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "speculum".to_string(),
            initial_size: LogicalSize::new(800.0, 800.0),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Runs the event loop until the window closes or the app exits.
    ///
    /// `build` receives the window's backend once the window exists and returns
    /// the application; construction errors end the loop.
    pub fn run<A, F>(config: RuntimeConfig, gpu_init: GpuInit, build: F) -> Result<()>
    where
        A: App + 'static,
        F: FnOnce(WgpuBackend) -> Result<A> + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            gpu_init,
            build: Some(build),
            window: None,
            app: None,
            error: None,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct AppState<A, F> {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    build: Option<F>,

    window: Option<Arc<Window>>,
    app: Option<A>,
    error: Option<anyhow::Error>,
}

impl<A, F> AppState<A, F>
where
    A: App + 'static,
    F: FnOnce(WgpuBackend) -> Result<A> + 'static,
{
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let build = self.build.take().context("application already built")?;

        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let backend = pollster::block_on(WgpuBackend::new(window.clone(), self.gpu_init.clone()))
            .context("GPU initialization failed")?;
        let app = build(backend).context("failed to build application")?;

        window.request_redraw();
        self.window = Some(window);
        self.app = Some(app);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl<A, F> ApplicationHandler for AppState<A, F>
where
    A: App + 'static,
    F: FnOnce(WgpuBackend) -> Result<A> + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // The redraw request is the host frame callback; only ask while the app wants one.
        if let (Some(app), Some(window)) = (&self.app, &self.window) {
            if app.wants_frame() {
                window.request_redraw();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let (Some(app), Some(window)) = (self.app.as_mut(), self.window.as_ref()) else {
            return;
        };

        if app.on_window_event(&event) == AppControl::Exit {
            event_loop.exit();
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => {
                app.on_resize(size);
                window.request_redraw();
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                app.on_resize(window.inner_size());
                window.request_redraw();
            }

            WindowEvent::RedrawRequested => {
                if app.on_frame(Instant::now()) == AppControl::Exit {
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}

use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::info;
use pollster::block_on;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::platform::run_on_demand::EventLoopExtRunOnDemand;
use winit::window::WindowBuilder;

use stagelight::render::{drawable_extent, Renderer};
use stagelight::{App, StageConfig, StopHandle};

/// Radians of orbit per pixel of mouse drag.
const DRAG_SENSITIVITY: f32 = 0.005;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let config = match &options.stage {
        Some(path) => StageConfig::load(path)?,
        None => StageConfig::default(),
    };

    let mut app = App::new(config);
    println!(
        "Loaded stage with {} nodes ({} meshes)",
        app.scene.node_count(),
        app.scene.mesh_count()
    );
    println!("Launched {} asset load(s)", app.requested_loads());

    if options.summary_only {
        app.run_headless(options.frames);
        return Ok(());
    }

    match run_interactive(&mut app) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                app.run_headless(options.frames);
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn run_interactive(app: &mut App) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let mut event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Stagelight")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer = block_on(Renderer::new(
        Arc::clone(&window),
        app.config.light.shadow.map_size,
        Arc::clone(&app.settings),
    ))?;

    let initial_size = window.inner_size();
    let stop = app.stop_handle();
    let mut state = AppState {
        renderer,
        app,
        stop,
        dragging: false,
        last_cursor: None,
        last_error: None,
    };
    // The first surface configuration must honor the pixel-ratio cap too.
    state.apply_resize(initial_size);

    event_loop.run_on_demand(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        if let Err(err) = state.process_event(&event, elwt) {
            state.last_error = Some(err);
            elwt.exit();
        }
    })?;

    let failure = state.last_error.take();
    drop(state);
    if let Some(err) = failure {
        return Err(err);
    }

    println!("Final stage state:");
    for line in app.scene.summary() {
        println!("  {line}");
    }
    Ok(())
}

struct AppState<'a> {
    renderer: Renderer,
    app: &'a mut App,
    stop: StopHandle,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
    last_error: Option<anyhow::Error>,
}

impl AppState<'_> {
    fn process_event(
        &mut self,
        event: &Event<()>,
        elwt: &EventLoopWindowTarget<()>,
    ) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        self.stop.request_stop();
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.apply_resize(*size);
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = self.renderer.window().inner_size();
                        self.apply_resize(size);
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state == ElementState::Pressed
                            && event.logical_key == Key::Named(NamedKey::Escape)
                        {
                            self.stop.request_stop();
                        }
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        if *button == MouseButton::Left {
                            self.dragging = *state == ElementState::Pressed;
                            if !self.dragging {
                                self.last_cursor = None;
                            }
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        if self.dragging {
                            if let Some((last_x, last_y)) = self.last_cursor {
                                let dx = (position.x - last_x) as f32;
                                let dy = (position.y - last_y) as f32;
                                self.app
                                    .controls
                                    .rotate(-dx * DRAG_SENSITIVITY, -dy * DRAG_SENSITIVITY);
                            }
                            self.last_cursor = Some((position.x, position.y));
                        }
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let steps = match delta {
                            MouseScrollDelta::LineDelta(_, y) => -y,
                            MouseScrollDelta::PixelDelta(position) => -(position.y as f32) / 50.0,
                        };
                        self.app.controls.zoom(steps);
                    }
                    WindowEvent::RedrawRequested => {
                        self.redraw()?;
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.app.pump_assets();
                if self.stop.is_stopped() {
                    elwt.exit();
                } else {
                    self.renderer.window().request_redraw();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Resizes the drawable, clamping the device pixel ratio at 2.
    fn apply_resize(&mut self, size: PhysicalSize<u32>) {
        let scale = self.renderer.window().scale_factor();
        let (width, height) = drawable_extent(size.width, size.height, scale);
        self.renderer.resize(PhysicalSize::new(width, height));
        self.app.handle_resize(width, height);
    }

    fn redraw(&mut self) -> Result<()> {
        self.app.tick();
        let draws = self.app.scene.draw_list();
        let globals = self.app.frame_globals();
        if let Err(err) = self.renderer.render(&draws, &globals) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.renderer.window().inner_size();
                    self.apply_resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("Surface timeout; retrying next frame");
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

struct CliOptions {
    stage: Option<String>,
    summary_only: bool,
    frames: u32,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let mut stage = None;
        let mut summary_only = false;
        let mut frames = 3;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--frames" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames expects a number"))?;
                    frames = value
                        .parse()
                        .map_err(|err| anyhow!("invalid --frames value {value:?}: {err}"))?;
                }
                other if !other.starts_with("--") && stage.is_none() => {
                    stage = Some(other.to_string());
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Usage: stagelight [stage.xml] [--summary-only] [--frames N]"
                    ));
                }
            }
        }
        Ok(Self {
            stage,
            summary_only,
            frames,
        })
    }
}

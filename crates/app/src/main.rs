//! Vesper demo: a lit cube floating over reflective water.
//!
//! Controls:
//! - Left drag: orbit, scroll: zoom
//! - `M`: toggle deferred/forward shading
//! - `R`: toggle screen-space reflections
//! - `H`: toggle the water surface
//! - `Escape`: quit

use std::path::Path;

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};
use tracing::{error, info, warn};

use vesper_core::{RenderMode, RendererConfig, Timer};
use vesper_platform::{
    ActiveEventLoop, ApplicationHandler, ControlFlow, EventLoop, InputState, KeyCode, MouseButton,
    Window, WindowEvent, WindowId,
};
use vesper_renderer::{FrameStatus, Renderer};
use vesper_resources::{MaterialIdentity, MeshData};
use vesper_scene::{
    Camera, DirectionalLight, DrawItem, FrameParameters, OrbitController, PointLight,
    SceneLights, WaterSurface,
};

const CONFIG_PATH: &str = "vesper.toml";

struct Scene {
    camera: Camera,
    orbit: OrbitController,
    lights: SceneLights,
    draws: Vec<DrawItem>,
    water: WaterSurface,
}

impl Scene {
    fn new(
        renderer: &mut Renderer,
        config: &RendererConfig,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let cube = renderer
            .upload_mesh("cube", &MeshData::cube())
            .context("uploading cube mesh")?;

        let mut camera = Camera::default();
        camera.set_viewport(width, height);
        let orbit = OrbitController::default();
        orbit.apply(&mut camera);

        let lights = SceneLights::new(DirectionalLight::default()).with_point_light(
            PointLight::new(Vec3::new(2.0, 1.5, 2.0), Vec3::new(1.0, 0.8, 0.6), 4.0, 8.0),
        );

        Ok(Self {
            camera,
            orbit,
            lights,
            draws: vec![DrawItem::new(
                Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)),
                cube,
                MaterialIdentity::untextured(),
            )],
            water: WaterSurface::at_height(config.water.height),
        })
    }

    fn update(&mut self, input: &InputState, seconds: f32) {
        if input.is_mouse_pressed(MouseButton::Left) {
            let (dx, dy) = input.mouse_delta();
            self.orbit.rotate(dx, dy);
        }
        let lines = input.scroll_lines();
        if lines != 0.0 {
            self.orbit.zoom(lines);
        }
        self.orbit.apply(&mut self.camera);

        // Slow spin so the reflection visibly changes.
        let spin = Quat::from_rotation_y(seconds * 0.4);
        if let Some(cube) = self.draws.first_mut() {
            cube.model = Mat4::from_rotation_translation(spin, Vec3::new(0.0, 0.5, 0.0));
        }
    }

    fn params(&self) -> FrameParameters<'_> {
        FrameParameters::new(&self.camera, &self.lights, &self.draws).with_water(self.water)
    }
}

struct App {
    config: RendererConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    scene: Option<Scene>,
    input: InputState,
    timer: Timer,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            scene: None,
            input: InputState::new(),
            timer: Timer::new(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let mut renderer = Renderer::new(&window, &self.config).context("creating renderer")?;
        let scene = Scene::new(&mut renderer, &self.config, window.width(), window.height())?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.scene = Some(scene);
        self.update_title();
        Ok(())
    }

    fn handle_toggles(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let orchestrator = renderer.orchestrator_mut();
        let mut changed = false;

        if self.input.is_key_just_pressed(KeyCode::KeyM) {
            let mode = match orchestrator.mode() {
                RenderMode::Deferred => RenderMode::Forward,
                RenderMode::Forward => RenderMode::Deferred,
            };
            orchestrator.set_mode(mode);
            changed = true;
        }
        if self.input.is_key_just_pressed(KeyCode::KeyR) {
            orchestrator.set_ssr_enabled(!orchestrator.ssr_enabled());
            changed = true;
        }
        if self.input.is_key_just_pressed(KeyCode::KeyH) {
            orchestrator.set_water_enabled(!orchestrator.water_enabled());
            changed = true;
        }

        if changed {
            self.update_title();
        }
    }

    fn update_title(&self) {
        let (Some(window), Some(renderer)) = (&self.window, &self.renderer) else {
            return;
        };
        let orchestrator = renderer.orchestrator();
        let on_off = |enabled: bool| if enabled { "on" } else { "off" };
        window.set_title(&format!(
            "{} | {:?} | SSR {} | water {}",
            self.config.window.title,
            orchestrator.mode(),
            on_off(orchestrator.ssr_enabled()),
            on_off(orchestrator.water_enabled()),
        ));
    }

    fn redraw(&mut self) {
        let (Some(window), Some(renderer), Some(scene)) =
            (&self.window, &mut self.renderer, &self.scene)
        else {
            return;
        };
        if window.is_minimized() {
            return;
        }

        match renderer.render(&scene.params()) {
            Ok(FrameStatus::OutOfDate) => {
                info!("Swapchain out of date, recreating next frame");
            }
            Ok(_) => {}
            Err(e) => error!("Render error: {:?}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("Initialization failed: {:?}", e);
            event_loop.exit();
            return;
        }
        info!("Initialization complete, entering main loop");
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.input.handle_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                if let Some(scene) = self.scene.as_mut() {
                    scene.camera.set_viewport(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.input.is_key_just_pressed(KeyCode::Escape) {
            event_loop.exit();
            return;
        }
        self.handle_toggles();

        let seconds = self.timer.elapsed().as_secs_f32();
        if let Some(scene) = self.scene.as_mut() {
            scene.update(&self.input, seconds);
        }
        self.input.begin_frame();

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    vesper_core::init_logging();
    info!("Starting Vesper");

    let config = match RendererConfig::load_or_default(Path::new(CONFIG_PATH)) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring {}: {}", CONFIG_PATH, e);
            RendererConfig::default()
        }
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

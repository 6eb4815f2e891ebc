use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};

use crate::animation::{turntable_rotation, Clock};
use crate::assets::{AssetLoader, LoadEvent};
use crate::camera::{OrbitControls, PerspectiveCamera};
use crate::config::{StageConfig, MODEL_NODE};
use crate::geometry;
use crate::panel::Panel;
use crate::render::{settings_handle, FrameGlobals, SettingsHandle, ToneMapping};
use crate::scene::{DirectionalLight, Material, Node, Scene, Transform};

/// Cooperative shutdown flag shared between the event loop and the app.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Everything the update thread owns: the scene graph, the camera rig,
/// the asset loader, the shared renderer settings and the tuning panel.
///
/// The render loop drives it through [`App::pump_assets`] and [`App::tick`];
/// nothing here touches the GPU.
pub struct App {
    pub scene: Scene,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub settings: SettingsHandle,
    pub config: StageConfig,
    clock: Clock,
    loader: AssetLoader,
    panel: Panel,
    stop: StopHandle,
}

impl App {
    /// Builds the stage from the configuration and launches the asset loads.
    pub fn new(config: StageConfig) -> Self {
        let scene = Scene::new();

        let mut sun = Node::light(
            "sun",
            DirectionalLight {
                color: config.light.color,
                intensity: config.light.intensity,
                shadow: config.light.shadow,
            },
        );
        sun.transform.position = config.light.position;
        scene.add(sun);

        for surface in config.surfaces() {
            let mesh = geometry::plane(surface.size, surface.size);
            let mut node = Node::mesh(
                &surface.name,
                Arc::new(mesh),
                Material {
                    color_texture: Some(surface.color_texture),
                    normal_texture: Some(surface.normal_texture),
                    arm_texture: Some(surface.arm_texture),
                    ..Default::default()
                },
            );
            node.transform = Transform {
                position: surface.position,
                rotation: surface.rotation,
                ..Default::default()
            };
            scene.add(node);
        }

        scene.set_environment_intensity(config.environment.intensity);
        let touched = scene.update_all_materials();
        info!("initial material pass touched {touched} meshes");

        let mut loader = AssetLoader::new();
        loader.request_model(MODEL_NODE, config.model.path.clone());
        loader.request_environment(config.environment.path.clone());

        let camera = PerspectiveCamera::new(
            config.camera.fov,
            1.0,
            config.camera.near,
            config.camera.far,
            config.camera.position,
        );
        let mut controls = OrbitControls::new(config.camera.position, config.camera.target);
        controls.damping = config.camera.damping;

        let settings = settings_handle(config.render);
        let panel = build_panel(&scene, &settings);

        Self {
            scene,
            camera,
            controls,
            settings,
            config,
            clock: Clock::new(),
            loader,
            panel,
            stop: StopHandle::new(),
        }
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Number of asynchronous loads launched so far.
    pub fn requested_loads(&self) -> usize {
        self.loader.requested()
    }

    /// Launches an additional model load; it attaches under `name` with the
    /// configured model transform when it completes.
    pub fn request_model(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.loader.request_model(name, path);
    }

    /// Launches an additional environment map load.
    pub fn request_environment(&mut self, path: impl Into<String>) {
        self.loader.request_environment(path);
    }

    /// Applies every load that completed since the last call.
    ///
    /// Attachment order is irrelevant; each one is followed by a fresh
    /// material pass so late arrivals pick up the shadow flags.
    pub fn pump_assets(&mut self) -> usize {
        let events = self.loader.drain();
        let applied = events.len();
        for event in events {
            match event {
                LoadEvent::Model(model) => {
                    let mut node = Node::mesh(&model.name, model.mesh, Material::default());
                    node.transform = Transform {
                        position: self.config.model.position,
                        scale: self.config.model.scale,
                        ..Default::default()
                    };
                    self.scene.add(node);
                    let touched = self.scene.update_all_materials();
                    info!(
                        "attached model {} from {}; material pass touched {touched} meshes",
                        model.name, model.path
                    );
                }
                LoadEvent::Environment(environment) => {
                    info!(
                        "applied environment {} ({}x{})",
                        environment.name, environment.width, environment.height
                    );
                    self.scene.set_environment(environment);
                    self.scene.update_all_materials();
                }
                LoadEvent::Failed { path, error } => {
                    // The stage stays up with whatever has loaded so far.
                    error!("failed to load {path}: {error}");
                }
            }
        }
        applied
    }

    /// Advances one frame: turntable animation, then camera damping.
    pub fn tick(&mut self) -> f32 {
        let elapsed = self.clock.elapsed_seconds();
        self.animate(elapsed);
        self.controls.update(&mut self.camera);
        elapsed
    }

    fn animate(&self, elapsed: f32) {
        // No-op until the model has attached.
        self.scene.set_rotation(MODEL_NODE, turntable_rotation(elapsed));
    }

    /// Adjusts the projection to a new drawable size.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
    }

    /// Per-frame global state handed to the renderer.
    pub fn frame_globals(&self) -> FrameGlobals {
        FrameGlobals {
            view_proj: self.camera.view_projection(self.controls.target),
            camera_position: self.camera.position,
            light: self.scene.directional_light(),
            environment_intensity: self.scene.environment_intensity(),
        }
    }

    /// Blocks until every in-flight load has finished, then applies them.
    pub fn wait_for_assets(&mut self) -> usize {
        self.loader.wait();
        self.pump_assets()
    }

    /// Runs a fixed number of frames without a window, then prints the
    /// final stage state.
    pub fn run_headless(&mut self, frames: u32) {
        for _ in 0..frames {
            self.pump_assets();
            self.tick();
            if self.stop.is_stopped() {
                break;
            }
        }
        self.wait_for_assets();
        self.tick();

        println!("Final stage state:");
        for line in self.scene.summary() {
            println!("  {line}");
        }
    }
}

fn build_panel(scene: &Scene, settings: &SettingsHandle) -> Panel {
    let mut panel = Panel::new();

    {
        let get = scene.clone();
        let set = scene.clone();
        panel.bind_number(
            "Environment Intensity",
            0.0,
            10.0,
            0.001,
            move || get.environment_intensity(),
            move |v| set.set_environment_intensity(v),
        );
    }
    {
        let get = scene.clone();
        let set = scene.clone();
        panel.bind_number(
            "Light Intensity",
            0.0,
            10.0,
            0.001,
            move || get.with_light_mut(|light| light.intensity).unwrap_or(0.0),
            move |v| {
                set.with_light_mut(|light| light.intensity = v);
            },
        );
    }

    for (label, axis) in [("Light X", 0usize), ("Light Y", 1), ("Light Z", 2)] {
        let get = scene.clone();
        let set = scene.clone();
        panel.bind_number(
            label,
            -10.0,
            10.0,
            0.001,
            move || {
                get.with_node_mut("sun", |node| node.transform.position[axis])
                    .unwrap_or(0.0)
            },
            move |v| {
                set.with_node_mut("sun", |node| node.transform.position[axis] = v);
            },
        );
    }

    {
        let get = scene.clone();
        let set = scene.clone();
        panel.bind_number(
            "Shadow Normal Bias",
            -0.05,
            0.05,
            0.001,
            move || {
                get.with_light_mut(|light| light.shadow.normal_bias)
                    .unwrap_or(0.0)
            },
            move |v| {
                set.with_light_mut(|light| light.shadow.normal_bias = v);
            },
        );
    }
    {
        let get = scene.clone();
        let set = scene.clone();
        panel.bind_number(
            "Shadow Bias",
            -0.05,
            0.05,
            0.001,
            move || get.with_light_mut(|light| light.shadow.bias).unwrap_or(0.0),
            move |v| {
                set.with_light_mut(|light| light.shadow.bias = v);
            },
        );
    }

    {
        let get = Arc::clone(settings);
        let set = Arc::clone(settings);
        panel.bind_number(
            "Tone Mapping Exposure",
            0.0,
            10.0,
            0.001,
            move || get.read().exposure,
            move |v| set.write().exposure = v,
        );
    }
    {
        let get = Arc::clone(settings);
        let set = Arc::clone(settings);
        let refresh = scene.clone();
        panel
            .bind_choice(
                "Tone Mapping",
                ToneMapping::ALL
                    .iter()
                    .map(|mode| mode.label().to_string())
                    .collect(),
                move || get.read().tone_mapping.label().to_string(),
                move |label| {
                    if let Some(mode) = ToneMapping::from_label(&label) {
                        set.write().tone_mapping = mode;
                    }
                },
            )
            .on_change(move || {
                // Tone mapping swaps the output curve under every material.
                refresh.update_all_materials();
            });
    }
    {
        let get = Arc::clone(settings);
        let set = Arc::clone(settings);
        panel.bind_toggle(
            "Antialias",
            move || get.read().antialias,
            move |v| set.write().antialias = v,
        );
    }

    panel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeKind;
    use glam::Vec3;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
    const SAMPLE_HDR: &str = "#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 512 +X 1024\n";

    fn temp_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    fn stage_with_assets(model: &NamedTempFile, env: &NamedTempFile) -> StageConfig {
        let mut config = StageConfig::default();
        config.model.path = model.path().to_string_lossy().into_owned();
        config.environment.path = env.path().to_string_lossy().into_owned();
        config
    }

    #[test]
    fn model_attaches_with_the_configured_transform_and_flags() {
        let model = temp_file(SAMPLE_OBJ);
        let env = temp_file(SAMPLE_HDR);
        let mut app = App::new(stage_with_assets(&model, &env));

        app.wait_for_assets();

        assert!(app.scene.contains(MODEL_NODE));
        let (scale, cast, receive) = app
            .scene
            .with_node_mut(MODEL_NODE, |node| {
                let (cast, receive) = match node.kind {
                    NodeKind::Mesh { ref material, .. } => {
                        (material.cast_shadow, material.receive_shadow)
                    }
                    _ => panic!("expected mesh node"),
                };
                (node.transform.scale, cast, receive)
            })
            .expect("model node");
        assert_eq!(scale, Vec3::splat(0.4));
        // The material pass after attachment must have reached the model.
        assert!(cast && receive);
        assert!(app.scene.environment().is_some());
    }

    /// App with both startup loads already failed and flushed, so tests can
    /// stagger their own completions one at a time.
    fn app_with_flushed_loads() -> App {
        let mut config = StageConfig::default();
        config.model.path = "/no/such/model.obj".to_string();
        config.environment.path = "/no/such/env.hdr".to_string();
        let mut app = App::new(config);
        app.wait_for_assets();
        app
    }

    fn cast_flag(app: &App, name: &str) -> bool {
        app.scene
            .with_node_mut(name, |node| match node.kind {
                NodeKind::Mesh { ref material, .. } => material.cast_shadow,
                _ => false,
            })
            .expect("mesh node")
    }

    #[test]
    fn model_arriving_first_gets_its_pass_before_the_environment() {
        let model = temp_file(SAMPLE_OBJ);
        let env = temp_file(SAMPLE_HDR);
        let mut app = app_with_flushed_loads();

        app.request_model(MODEL_NODE, model.path().to_string_lossy());
        assert_eq!(app.wait_for_assets(), 1);
        assert!(app.scene.contains(MODEL_NODE));
        // The pass following the attachment reached the model immediately,
        // without waiting for the other load.
        assert!(cast_flag(&app, MODEL_NODE));
        assert!(app.scene.environment().is_none());

        // A node added between attachments stays unflagged until the next
        // attachment runs its own pass: no stray passes in between.
        app.scene.add(Node::mesh(
            "late",
            Arc::new(crate::geometry::unit_cube()),
            Material::default(),
        ));
        app.tick();
        assert!(!cast_flag(&app, "late"));

        app.request_environment(env.path().to_string_lossy());
        assert_eq!(app.wait_for_assets(), 1);
        assert!(app.scene.environment().is_some());
        assert!(cast_flag(&app, "late"));
    }

    #[test]
    fn environment_arriving_first_is_equivalent() {
        let model = temp_file(SAMPLE_OBJ);
        let env = temp_file(SAMPLE_HDR);
        let mut app = app_with_flushed_loads();

        app.request_environment(env.path().to_string_lossy());
        assert_eq!(app.wait_for_assets(), 1);
        assert!(app.scene.environment().is_some());
        assert!(!app.scene.contains(MODEL_NODE));

        app.request_model(MODEL_NODE, model.path().to_string_lossy());
        assert_eq!(app.wait_for_assets(), 1);
        assert!(app.scene.contains(MODEL_NODE));
        assert!(cast_flag(&app, MODEL_NODE));
    }

    #[test]
    fn missing_assets_leave_the_stage_running() {
        let mut config = StageConfig::default();
        config.model.path = "/no/such/model.obj".to_string();
        config.environment.path = "/no/such/env.hdr".to_string();
        let mut app = App::new(config);

        app.wait_for_assets();
        app.tick();

        assert!(!app.scene.contains(MODEL_NODE));
        // Light plus both surfaces survive the failures.
        assert_eq!(app.scene.node_count(), 3);
    }

    #[test]
    fn turntable_only_animates_an_attached_model() {
        let mut config = StageConfig::default();
        config.model.path = "/no/such/model.obj".to_string();
        config.environment.path = "/no/such/env.hdr".to_string();
        let mut app = App::new(config);
        app.wait_for_assets();
        app.tick();

        let mesh = crate::geometry::unit_cube();
        app.scene
            .add(Node::mesh(MODEL_NODE, Arc::new(mesh), Material::default()));
        app.tick();

        let rotation = app
            .scene
            .with_node_mut(MODEL_NODE, |node| node.transform.rotation)
            .expect("model node");
        // At any elapsed time the sway components stay on the unit circle.
        assert!(rotation.x.abs() <= 1.0 && rotation.z.abs() <= 1.0);
        assert!(rotation.x != 0.0 || rotation.z != 0.0);
    }

    #[test]
    fn resize_updates_the_projection_aspect() {
        let model = temp_file(SAMPLE_OBJ);
        let env = temp_file(SAMPLE_HDR);
        let mut app = App::new(stage_with_assets(&model, &env));
        app.handle_resize(200, 100);
        assert_eq!(app.camera.aspect, 2.0);
    }

    #[test]
    fn panel_writes_through_to_scene_and_settings() {
        let model = temp_file(SAMPLE_OBJ);
        let env = temp_file(SAMPLE_HDR);
        let app = App::new(stage_with_assets(&model, &env));

        app.panel()
            .set_number("Environment Intensity", 5.0)
            .unwrap();
        assert_eq!(app.scene.environment_intensity(), 5.0);

        app.panel().set_number("Light Y", 8.0).unwrap();
        let y = app
            .scene
            .with_node_mut("sun", |node| node.transform.position.y)
            .expect("sun node");
        assert_eq!(y, 8.0);

        app.panel().set_choice("Tone Mapping", "ACESFilmic").unwrap();
        assert_eq!(app.settings.read().tone_mapping, ToneMapping::AcesFilmic);

        app.panel().set_toggle("Antialias", false).unwrap();
        assert!(!app.settings.read().antialias);
    }

    #[test]
    fn tone_mapping_change_refreshes_late_materials() {
        let model = temp_file(SAMPLE_OBJ);
        let env = temp_file(SAMPLE_HDR);
        let app = App::new(stage_with_assets(&model, &env));

        // A node attached outside the loader path has no shadow flags yet.
        let mesh = crate::geometry::unit_cube();
        app.scene
            .add(Node::mesh("extra", Arc::new(mesh), Material::default()));

        app.panel().set_choice("Tone Mapping", "Cineon").unwrap();

        let flagged = app
            .scene
            .with_node_mut("extra", |node| match node.kind {
                NodeKind::Mesh { ref material, .. } => material.cast_shadow,
                _ => false,
            })
            .expect("extra node");
        assert!(flagged);
    }

    #[test]
    fn stop_handle_round_trips() {
        let handle = StopHandle::new();
        assert!(!handle.is_stopped());
        let observer = handle.clone();
        handle.request_stop();
        assert!(observer.is_stopped());
    }
}

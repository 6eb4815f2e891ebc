use std::sync::Arc;

use glam::{Mat4, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::geometry::MeshData;

/// Local transform of a scene node. Rotation is Euler angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Composes the local matrix as translation * rotation(ZYX) * scale.
    pub fn matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let rotation = Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_x(self.rotation.x);
        let scale = Mat4::from_scale(self.scale);
        translation * rotation * scale
    }
}

/// Shading state attached to a mesh node.
///
/// Texture fields are opaque asset paths; the shadow flags are not intrinsic
/// to the material and are only ever set by [`Scene::update_all_materials`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub color: Vec3,
    pub color_texture: Option<String>,
    pub normal_texture: Option<String>,
    pub arm_texture: Option<String>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            color_texture: None,
            normal_texture: None,
            arm_texture: None,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

/// Orthographic shadow projection of a directional light, plus bias terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    pub near: f32,
    pub far: f32,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub map_size: u32,
    pub bias: f32,
    pub normal_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            near: 0.5,
            far: 15.0,
            left: -10.0,
            right: 10.0,
            top: 10.0,
            bottom: -10.0,
            map_size: 1024,
            bias: -0.004,
            normal_bias: 0.027,
        }
    }
}

/// Directional light node payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub shadow: ShadowSettings,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            shadow: ShadowSettings::default(),
        }
    }
}

/// How an environment texture wraps the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingMode {
    EquirectangularReflection,
}

/// Image-based lighting environment applied to the whole scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentMap {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mapping: MappingMode,
}

/// Role-specific payload of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh {
        mesh: Arc<MeshData>,
        material: Material,
    },
    Light(DirectionalLight),
}

/// A node in the scene tree. The tree exclusively owns its children.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            kind: NodeKind::Group,
            children: Vec::new(),
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: Arc<MeshData>, material: Material) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            kind: NodeKind::Mesh { mesh, material },
            children: Vec::new(),
        }
    }

    pub fn light(name: impl Into<String>, light: DirectionalLight) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            kind: NodeKind::Light(light),
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            NodeKind::Group => "group",
            NodeKind::Mesh { .. } => "mesh",
            NodeKind::Light(_) => "light",
        }
    }
}

/// Flattened draw command produced from the tree for one frame.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub mesh_key: String,
    pub mesh: Arc<MeshData>,
    pub model: Mat4,
    pub color: Vec3,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// Directional light state consumed by the renderer, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow: ShadowSettings,
}

#[derive(Debug, Default)]
struct SceneInner {
    roots: Vec<Node>,
    environment: Option<EnvironmentMap>,
    environment_intensity: f32,
}

/// Shared handle over the scene tree.
///
/// Clones are cheap and refer to the same tree; all mutation happens on the
/// single logical update thread, the lock only keeps the tuning panel's
/// write-through closures sound.
#[derive(Debug)]
pub struct Scene {
    inner: Arc<RwLock<SceneInner>>,
}

impl Clone for Scene {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SceneInner {
                roots: Vec::new(),
                environment: None,
                environment_intensity: 1.0,
            })),
        }
    }

    /// Attaches a node (and the subtree it owns) at the root.
    pub fn add(&self, node: Node) {
        self.inner.write().roots.push(node);
    }

    pub fn contains(&self, name: &str) -> bool {
        let mut guard = self.inner.write();
        find_mut(&mut guard.roots, name).is_some()
    }

    /// Applies a mutation to the first node with the given name.
    pub fn with_node_mut<R>(&self, name: &str, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        let mut guard = self.inner.write();
        find_mut(&mut guard.roots, name).map(f)
    }

    /// Sets the rotation of a node, reporting whether it exists yet.
    pub fn set_rotation(&self, name: &str, rotation: Vec3) -> bool {
        self.with_node_mut(name, |node| node.transform.rotation = rotation)
            .is_some()
    }

    /// Applies a mutation to the first directional light in the tree.
    pub fn with_light_mut<R>(&self, f: impl FnOnce(&mut DirectionalLight) -> R) -> Option<R> {
        let mut guard = self.inner.write();
        let mut f = Some(f);
        let mut result = None;
        visit_mut(&mut guard.roots, &mut |node| {
            if result.is_none() {
                if let NodeKind::Light(ref mut light) = node.kind {
                    if let Some(f) = f.take() {
                        result = Some(f(light));
                    }
                }
            }
        });
        result
    }

    /// Marks every mesh in the tree as casting and receiving shadows.
    ///
    /// Idempotent; must run after the initial build and after every
    /// asynchronous attachment, since earlier passes never saw those nodes.
    /// Returns the number of mesh nodes visited.
    pub fn update_all_materials(&self) -> usize {
        let mut guard = self.inner.write();
        let mut touched = 0;
        visit_mut(&mut guard.roots, &mut |node| {
            if let NodeKind::Mesh { ref mut material, .. } = node.kind {
                material.cast_shadow = true;
                material.receive_shadow = true;
                touched += 1;
            }
        });
        touched
    }

    /// Resolves world matrices into a flat snapshot for the renderer.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let guard = self.inner.read();
        let mut items = Vec::new();
        for root in &guard.roots {
            flatten(root, Mat4::IDENTITY, &mut items);
        }
        items
    }

    /// Returns the first directional light with its world-space position.
    pub fn directional_light(&self) -> Option<LightParams> {
        let guard = self.inner.read();
        let mut found = None;
        for root in &guard.roots {
            find_light(root, Mat4::IDENTITY, &mut found);
        }
        found
    }

    pub fn set_environment(&self, environment: EnvironmentMap) {
        self.inner.write().environment = Some(environment);
    }

    pub fn environment(&self) -> Option<EnvironmentMap> {
        self.inner.read().environment.clone()
    }

    pub fn environment_intensity(&self) -> f32 {
        self.inner.read().environment_intensity
    }

    pub fn set_environment_intensity(&self, intensity: f32) {
        self.inner.write().environment_intensity = intensity;
    }

    pub fn node_count(&self) -> usize {
        let guard = self.inner.read();
        let mut count = 0;
        for root in &guard.roots {
            count_nodes(root, &mut count);
        }
        count
    }

    pub fn mesh_count(&self) -> usize {
        self.draw_list().len()
    }

    /// One human-readable line per node, depth-first.
    pub fn summary(&self) -> Vec<String> {
        let guard = self.inner.read();
        let mut lines = Vec::new();
        for root in &guard.roots {
            summarize(root, &mut lines);
        }
        lines
    }
}

fn find_mut<'a>(nodes: &'a mut [Node], name: &str) -> Option<&'a mut Node> {
    for node in nodes {
        if node.name == name {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, name) {
            return Some(found);
        }
    }
    None
}

fn visit_mut(nodes: &mut [Node], f: &mut impl FnMut(&mut Node)) {
    for node in nodes {
        f(node);
        visit_mut(&mut node.children, f);
    }
}

fn flatten(node: &Node, parent: Mat4, items: &mut Vec<DrawItem>) {
    let world = parent * node.transform.matrix();
    if let NodeKind::Mesh { ref mesh, ref material } = node.kind {
        items.push(DrawItem {
            mesh_key: node.name.clone(),
            mesh: Arc::clone(mesh),
            model: world,
            color: material.color,
            cast_shadow: material.cast_shadow,
            receive_shadow: material.receive_shadow,
        });
    }
    for child in &node.children {
        flatten(child, world, items);
    }
}

fn find_light(node: &Node, parent: Mat4, found: &mut Option<LightParams>) {
    if found.is_some() {
        return;
    }
    let world = parent * node.transform.matrix();
    if let NodeKind::Light(light) = node.kind {
        *found = Some(LightParams {
            position: world.transform_point3(Vec3::ZERO),
            color: light.color,
            intensity: light.intensity,
            shadow: light.shadow,
        });
        return;
    }
    for child in &node.children {
        find_light(child, world, found);
    }
}

fn count_nodes(node: &Node, count: &mut usize) {
    *count += 1;
    for child in &node.children {
        count_nodes(child, count);
    }
}

fn summarize(node: &Node, lines: &mut Vec<String>) {
    let p = node.transform.position;
    let mut line = format!(
        "{} ({}) pos=({:.2}, {:.2}, {:.2})",
        node.name,
        node.kind_label(),
        p.x,
        p.y,
        p.z
    );
    match node.kind {
        NodeKind::Mesh { ref material, .. } => {
            line.push_str(&format!(
                " shadow=cast:{} receive:{}",
                material.cast_shadow, material.receive_shadow
            ));
        }
        NodeKind::Light(ref light) => {
            line.push_str(&format!(" intensity={:.2}", light.intensity));
        }
        NodeKind::Group => {}
    }
    lines.push(line);
    for child in &node.children {
        summarize(child, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;

    fn mesh_node(name: &str) -> Node {
        Node::mesh(
            name,
            Arc::new(geometry::unit_cube()),
            Material::default(),
        )
    }

    fn shadow_flags(scene: &Scene, name: &str) -> (bool, bool) {
        scene
            .with_node_mut(name, |node| match node.kind {
                NodeKind::Mesh { ref material, .. } => {
                    (material.cast_shadow, material.receive_shadow)
                }
                _ => panic!("expected mesh node"),
            })
            .expect("node exists")
    }

    #[test]
    fn post_processor_flags_every_mesh_including_nested() {
        let scene = Scene::new();
        let mut group = Node::group("stage");
        group.add_child(mesh_node("floor"));
        group.add_child(mesh_node("wall"));
        scene.add(group);
        scene.add(Node::light("sun", DirectionalLight::default()));

        assert_eq!(shadow_flags(&scene, "floor"), (false, false));
        let touched = scene.update_all_materials();
        assert_eq!(touched, 2);
        assert_eq!(shadow_flags(&scene, "floor"), (true, true));
        assert_eq!(shadow_flags(&scene, "wall"), (true, true));
    }

    #[test]
    fn post_processor_is_idempotent_and_leaves_lights_alone() {
        let scene = Scene::new();
        scene.add(mesh_node("floor"));
        let mut light = DirectionalLight::default();
        light.intensity = 2.0;
        scene.add(Node::light("sun", light));

        assert_eq!(scene.update_all_materials(), 1);
        assert_eq!(scene.update_all_materials(), 1);
        assert_eq!(shadow_flags(&scene, "floor"), (true, true));
        let intensity = scene.with_light_mut(|l| l.intensity).unwrap();
        assert_eq!(intensity, 2.0);
    }

    #[test]
    fn late_attachments_need_a_fresh_pass() {
        let scene = Scene::new();
        scene.add(mesh_node("floor"));
        scene.update_all_materials();

        // A node spliced in later starts unflagged, as if freshly loaded.
        scene.add(mesh_node("model"));
        assert_eq!(shadow_flags(&scene, "model"), (false, false));
        scene.update_all_materials();
        assert_eq!(shadow_flags(&scene, "model"), (true, true));
        assert_eq!(shadow_flags(&scene, "floor"), (true, true));
    }

    #[test]
    fn draw_list_applies_parent_transforms() {
        let scene = Scene::new();
        let mut group = Node::group("stage");
        group.transform.position = Vec3::new(0.0, 2.0, 0.0);
        let mut child = mesh_node("model");
        child.transform.position = Vec3::new(1.0, 0.0, 0.0);
        group.add_child(child);
        scene.add(group);

        let draws = scene.draw_list();
        assert_eq!(draws.len(), 1);
        let origin = draws[0].model.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn missing_node_is_not_an_error() {
        let scene = Scene::new();
        assert!(!scene.set_rotation("model", Vec3::ONE));
        assert!(scene.draw_list().is_empty());
        assert!(scene.directional_light().is_none());
    }

    #[test]
    fn light_position_is_world_space() {
        let scene = Scene::new();
        let mut rig = Node::group("rig");
        rig.transform.position = Vec3::new(-4.0, 6.5, 2.5);
        rig.add_child(Node::light("sun", DirectionalLight::default()));
        scene.add(rig);
        let light = scene.directional_light().unwrap();
        assert!((light.position - Vec3::new(-4.0, 6.5, 2.5)).length() < 1e-6);
    }
}

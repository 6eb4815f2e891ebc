use std::f32::consts::FRAC_PI_2;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::render::{RendererSettings, ShadowMapMode, ToneMapping};
use crate::scene::ShadowSettings;

/// Name under which the asynchronously loaded model attaches to the graph.
pub const MODEL_NODE: &str = "model";

/// Asynchronously loaded showcase model and its normalizing transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub scale: Vec3,
    pub position: Vec3,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "assets/models/hamburger.obj".to_string(),
            scale: Vec3::splat(0.4),
            position: Vec3::new(0.0, 2.5, 0.0),
        }
    }
}

/// Image-based lighting environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub path: String,
    pub intensity: f32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            path: "assets/environment/2k.hdr".to_string(),
            intensity: 1.0,
        }
    }
}

/// The single directional light and its shadow projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
    pub shadow: ShadowSettings,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 2.0,
            position: Vec3::new(-4.0, 6.5, 2.5),
            shadow: ShadowSettings::default(),
        }
    }
}

/// Camera projection and orbit target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub damping: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 100.0,
            position: Vec3::new(4.0, 5.0, 4.0),
            target: Vec3::new(0.0, 3.5, 0.0),
            damping: true,
        }
    }
}

/// A static textured plane (floor or wall). Rotation in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub name: String,
    pub size: f32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub color_texture: String,
    pub normal_texture: String,
    pub arm_texture: String,
}

/// Complete stage description with the showcase defaults baked in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageConfig {
    pub model: ModelConfig,
    pub environment: EnvironmentConfig,
    pub light: LightConfig,
    pub camera: CameraConfig,
    pub render: RendererSettings,
}

impl StageConfig {
    /// Reads a stage XML document from disk and applies it over the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read stage file {}", path.display()))?;
        Self::from_xml(&text)
    }

    /// Parses stage XML. Every element is optional; missing values keep
    /// their defaults. Angles in the document are degrees.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid stage XML")?;
        let root = document.root_element();
        if !root.has_tag_name("stage") {
            return Err(anyhow!("expected <stage> root element"));
        }

        let mut config = Self::default();

        if let Some(node) = child(&root, "model") {
            config.model.path = optional_text(&node, "path").unwrap_or(config.model.path);
            config.model.scale = parse_vec3(optional_text(&node, "scale"), config.model.scale)?;
            config.model.position =
                parse_vec3(optional_text(&node, "position"), config.model.position)?;
        }

        if let Some(node) = child(&root, "environment") {
            config.environment.path =
                optional_text(&node, "path").unwrap_or(config.environment.path);
            config.environment.intensity = parse_f32(
                optional_text(&node, "intensity"),
                config.environment.intensity,
            )?;
        }

        if let Some(node) = child(&root, "light") {
            config.light.color = parse_vec3(optional_text(&node, "color"), config.light.color)?;
            config.light.intensity =
                parse_f32(optional_text(&node, "intensity"), config.light.intensity)?;
            config.light.position =
                parse_vec3(optional_text(&node, "position"), config.light.position)?;
            if let Some(shadow) = child(&node, "shadow") {
                let defaults = config.light.shadow;
                config.light.shadow = ShadowSettings {
                    near: parse_f32(optional_text(&shadow, "near"), defaults.near)?,
                    far: parse_f32(optional_text(&shadow, "far"), defaults.far)?,
                    left: parse_f32(optional_text(&shadow, "left"), defaults.left)?,
                    right: parse_f32(optional_text(&shadow, "right"), defaults.right)?,
                    top: parse_f32(optional_text(&shadow, "top"), defaults.top)?,
                    bottom: parse_f32(optional_text(&shadow, "bottom"), defaults.bottom)?,
                    map_size: parse_u32(optional_text(&shadow, "map-size"), defaults.map_size)?,
                    bias: parse_f32(optional_text(&shadow, "bias"), defaults.bias)?,
                    normal_bias: parse_f32(
                        optional_text(&shadow, "normal-bias"),
                        defaults.normal_bias,
                    )?,
                };
            }
        }

        if let Some(node) = child(&root, "camera") {
            config.camera.fov = parse_f32(optional_text(&node, "fov"), config.camera.fov)?;
            config.camera.near = parse_f32(optional_text(&node, "near"), config.camera.near)?;
            config.camera.far = parse_f32(optional_text(&node, "far"), config.camera.far)?;
            config.camera.position =
                parse_vec3(optional_text(&node, "position"), config.camera.position)?;
            config.camera.target =
                parse_vec3(optional_text(&node, "target"), config.camera.target)?;
            config.camera.damping =
                parse_bool(optional_text(&node, "damping"), config.camera.damping)?;
        }

        if let Some(node) = child(&root, "render") {
            if let Some(label) = optional_text(&node, "tone-mapping") {
                config.render.tone_mapping = ToneMapping::from_label(&label)
                    .ok_or_else(|| anyhow!("unknown tone mapping mode {label:?}"))?;
            }
            config.render.exposure =
                parse_f32(optional_text(&node, "exposure"), config.render.exposure)?;
            if let Some(label) = optional_text(&node, "shadow-map") {
                config.render.shadow_map = ShadowMapMode::from_label(&label)
                    .ok_or_else(|| anyhow!("unknown shadow map mode {label:?}"))?;
            }
            config.render.antialias =
                parse_bool(optional_text(&node, "antialias"), config.render.antialias)?;
        }

        Ok(config)
    }

    /// The two static textured planes of the stage.
    pub fn surfaces(&self) -> Vec<SurfaceConfig> {
        vec![
            SurfaceConfig {
                name: "floor".to_string(),
                size: 8.0,
                position: Vec3::ZERO,
                rotation: Vec3::new(-FRAC_PI_2, 0.0, 0.0),
                color_texture: "assets/textures/wood_cabinet_worn_long_diff_1k.jpg".to_string(),
                normal_texture: "assets/textures/wood_cabinet_worn_long_nor_gl_1k.png".to_string(),
                arm_texture: "assets/textures/wood_cabinet_worn_long_arm_1k.jpg".to_string(),
            },
            SurfaceConfig {
                name: "wall".to_string(),
                size: 8.0,
                position: Vec3::new(0.0, 4.0, -4.0),
                rotation: Vec3::ZERO,
                color_texture: "assets/textures/castle_brick_broken_06_diff_1k.jpg".to_string(),
                normal_texture: "assets/textures/castle_brick_broken_06_nor_gl_1k.png".to_string(),
                arm_texture: "assets/textures/castle_brick_broken_06_arm_1k.jpg".to_string(),
            },
        ]
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let x = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let y = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let z = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    Ok(Vec3::new(x, y, z))
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(anyhow!("expected true/false, got {other:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_showcase() {
        let config = StageConfig::default();
        assert_eq!(config.light.intensity, 2.0);
        assert_eq!(config.light.position, Vec3::new(-4.0, 6.5, 2.5));
        assert_eq!(config.camera.fov, 75.0);
        assert_eq!(config.render.tone_mapping, ToneMapping::Reinhard);
        assert_eq!(config.render.exposure, 3.0);
        assert_eq!(config.surfaces().len(), 2);
    }

    #[test]
    fn xml_overrides_selected_values() {
        let xml = r#"
        <stage>
            <model>
                <path>models/helmet.obj</path>
                <scale>10 10 10</scale>
            </model>
            <light>
                <intensity>4.5</intensity>
                <shadow><bias>-0.01</bias></shadow>
            </light>
            <camera><fov>60</fov></camera>
            <render>
                <tone-mapping>ACESFilmic</tone-mapping>
                <antialias>false</antialias>
            </render>
        </stage>
        "#;
        let config = StageConfig::from_xml(xml).unwrap();
        assert_eq!(config.model.path, "models/helmet.obj");
        assert_eq!(config.model.scale, Vec3::splat(10.0));
        // Untouched values keep their defaults.
        assert_eq!(config.model.position, Vec3::new(0.0, 2.5, 0.0));
        assert_eq!(config.light.intensity, 4.5);
        assert!((config.light.shadow.bias + 0.01).abs() < 1e-6);
        assert_eq!(config.light.shadow.normal_bias, 0.027);
        assert_eq!(config.camera.fov, 60.0);
        assert_eq!(config.render.tone_mapping, ToneMapping::AcesFilmic);
        assert!(!config.render.antialias);
    }

    #[test]
    fn unknown_tone_mapping_is_an_error() {
        let xml = "<stage><render><tone-mapping>Bogus</tone-mapping></render></stage>";
        assert!(StageConfig::from_xml(xml).is_err());
    }

    #[test]
    fn wrong_root_is_an_error() {
        assert!(StageConfig::from_xml("<scene></scene>").is_err());
    }
}

pub mod native;

pub use native::{FrameGlobals, Renderer};

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Output curve compressing lit color values into displayable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneMapping {
    None,
    Linear,
    Reinhard,
    Cineon,
    AcesFilmic,
}

impl ToneMapping {
    pub const ALL: [ToneMapping; 5] = [
        ToneMapping::None,
        ToneMapping::Linear,
        ToneMapping::Reinhard,
        ToneMapping::Cineon,
        ToneMapping::AcesFilmic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ToneMapping::None => "None",
            ToneMapping::Linear => "Linear",
            ToneMapping::Reinhard => "Reinhard",
            ToneMapping::Cineon => "Cineon",
            ToneMapping::AcesFilmic => "ACESFilmic",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.label() == label)
    }

    /// Selector passed to the shader.
    pub fn index(self) -> u32 {
        match self {
            ToneMapping::None => 0,
            ToneMapping::Linear => 1,
            ToneMapping::Reinhard => 2,
            ToneMapping::Cineon => 3,
            ToneMapping::AcesFilmic => 4,
        }
    }
}

/// Shadow lookup quality applied by the main pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowMapMode {
    Off,
    Basic,
    Pcf,
    PcfSoft,
}

impl ShadowMapMode {
    pub const ALL: [ShadowMapMode; 4] = [
        ShadowMapMode::Off,
        ShadowMapMode::Basic,
        ShadowMapMode::Pcf,
        ShadowMapMode::PcfSoft,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ShadowMapMode::Off => "Off",
            ShadowMapMode::Basic => "Basic",
            ShadowMapMode::Pcf => "PCF",
            ShadowMapMode::PcfSoft => "PCFSoft",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.label() == label)
    }

    pub fn index(self) -> u32 {
        match self {
            ShadowMapMode::Off => 0,
            ShadowMapMode::Basic => 1,
            ShadowMapMode::Pcf => 2,
            ShadowMapMode::PcfSoft => 3,
        }
    }
}

/// Live-tunable renderer state shared with the tuning panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RendererSettings {
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    pub shadow_map: ShadowMapMode,
    pub antialias: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            tone_mapping: ToneMapping::Reinhard,
            exposure: 3.0,
            shadow_map: ShadowMapMode::PcfSoft,
            antialias: true,
        }
    }
}

/// Shared handle to the renderer settings.
pub type SettingsHandle = Arc<RwLock<RendererSettings>>;

pub fn settings_handle(settings: RendererSettings) -> SettingsHandle {
    Arc::new(RwLock::new(settings))
}

/// Bounds the device pixel-density scale to cap fill-rate cost.
pub fn clamped_pixel_ratio(scale: f64) -> f64 {
    scale.clamp(0.1, 2.0)
}

/// Drawable size for a window-reported *physical* size, with the
/// pixel-density clamp applied. Every surface (re)configuration goes
/// through this, so a dense display never gets more than 2x pixels.
pub fn drawable_extent(physical_width: u32, physical_height: u32, scale: f64) -> (u32, u32) {
    let factor = clamped_pixel_ratio(scale) / scale.max(0.1);
    (
        ((physical_width as f64) * factor).round().max(1.0) as u32,
        ((physical_height as f64) * factor).round().max(1.0) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_mapping_labels_round_trip() {
        for mode in ToneMapping::ALL {
            assert_eq!(ToneMapping::from_label(mode.label()), Some(mode));
        }
        assert_eq!(ToneMapping::from_label("Filmic"), None);
    }

    #[test]
    fn shadow_mode_labels_round_trip() {
        for mode in ShadowMapMode::ALL {
            assert_eq!(ShadowMapMode::from_label(mode.label()), Some(mode));
        }
    }

    #[test]
    fn pixel_ratio_is_capped_at_two() {
        assert_eq!(clamped_pixel_ratio(1.0), 1.0);
        assert_eq!(clamped_pixel_ratio(1.5), 1.5);
        assert_eq!(clamped_pixel_ratio(3.0), 2.0);
    }

    #[test]
    fn drawable_extent_caps_dense_physical_sizes() {
        // Window reports logical * scale physical pixels; above 2x the
        // drawable shrinks back to logical * 2.
        assert_eq!(drawable_extent(3840, 2160, 3.0), (2560, 1440));
        assert_eq!(drawable_extent(2560, 1440, 2.0), (2560, 1440));
        assert_eq!(drawable_extent(1280, 720, 1.0), (1280, 720));
        assert_eq!(drawable_extent(0, 0, 1.0), (1, 1));
    }
}

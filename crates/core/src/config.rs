//! Renderer configuration loaded from `vesper.toml`.
//!
//! Every field has a default, so an absent file or a partial file is valid:
//!
//! ```toml
//! [render]
//! mode = "forward"
//! ssr_enabled = false
//!
//! [water_ssr]
//! thickness = 0.75
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Shading path used for opaque geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// G-buffer followed by the full-screen lighting composite.
    #[default]
    Deferred,
    /// Geometry is shaded directly into the target after the G-buffer pass.
    Forward,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Vesper".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub ssr_enabled: bool,
    pub water_enabled: bool,
    /// Enable the Khronos validation layer when available.
    pub validation: bool,
    /// Directory holding the compiled `*.spv` blobs.
    pub shader_dir: PathBuf,
    /// Materials per descriptor pool segment.
    pub material_segment_capacity: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Deferred,
            ssr_enabled: true,
            water_enabled: true,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders/spirv"),
            material_segment_capacity: 32,
        }
    }
}

/// Ray-march limits for one screen-space reflection consumer.
///
/// `thickness` and `max_distance` are view-space world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrConfig {
    pub max_distance: f32,
    pub max_steps: u32,
    pub thickness: f32,
}

impl SsrConfig {
    /// Defaults for the standalone reflection pass.
    pub const STANDALONE: Self = Self {
        max_distance: 32.0,
        max_steps: 96,
        thickness: 0.1,
    };

    /// Defaults for the ray march inlined in the water shader.
    pub const WATER: Self = Self {
        max_distance: 64.0,
        max_steps: 48,
        thickness: 0.5,
    };

    fn validate(&self, section: &str) -> Result<()> {
        if self.max_steps == 0 {
            return Err(Error::Config(format!("[{section}] max_steps must be > 0")));
        }
        if !(self.thickness > 0.0 && self.thickness.is_finite()) {
            return Err(Error::Config(format!(
                "[{section}] thickness must be positive, got {}",
                self.thickness
            )));
        }
        if !(self.max_distance > 0.0 && self.max_distance.is_finite()) {
            return Err(Error::Config(format!(
                "[{section}] max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        Ok(())
    }
}

impl Default for SsrConfig {
    fn default() -> Self {
        Self::STANDALONE
    }
}

/// A partially specified `[water_ssr]` table, filled from [`SsrConfig::WATER`].
#[derive(Deserialize)]
struct PartialSsr {
    max_distance: Option<f32>,
    max_steps: Option<u32>,
    thickness: Option<f32>,
}

fn deserialize_water_ssr<'de, D>(deserializer: D) -> std::result::Result<SsrConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let partial = PartialSsr::deserialize(deserializer)?;
    let base = SsrConfig::WATER;
    Ok(SsrConfig {
        max_distance: partial.max_distance.unwrap_or(base.max_distance),
        max_steps: partial.max_steps.unwrap_or(base.max_steps),
        thickness: partial.thickness.unwrap_or(base.thickness),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    pub wave_speed: f32,
    pub wave_strength: f32,
    pub color: [f32; 3],
    pub opacity: f32,
    pub fresnel_power: f32,
    /// Edge length of the square water grid in world units.
    pub size: f32,
    pub subdivisions: u32,
    /// World-space height of the water plane.
    pub height: f32,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            wave_speed: 1.0,
            wave_strength: 0.05,
            color: [0.05, 0.25, 0.35],
            opacity: 0.85,
            fresnel_power: 5.0,
            size: 40.0,
            subdivisions: 64,
            height: -0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: [f32; 3],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: [0.03, 0.03, 0.04],
        }
    }
}

/// Complete renderer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub ssr: SsrConfig,
    #[serde(deserialize_with = "deserialize_water_ssr")]
    pub water_ssr: SsrConfig,
    pub water: WaterConfig,
    pub lighting: LightingConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            render: RenderConfig::default(),
            ssr: SsrConfig::STANDALONE,
            water_ssr: SsrConfig::WATER,
            water: WaterConfig::default(),
            lighting: LightingConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded renderer configuration from {:?}", path);
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Reject values that would break pass construction.
    pub fn validate(&self) -> Result<()> {
        if self.render.material_segment_capacity == 0 {
            return Err(Error::Config(
                "[render] material_segment_capacity must be > 0".to_string(),
            ));
        }
        self.ssr.validate("ssr")?;
        self.water_ssr.validate("water_ssr")?;
        if self.water.subdivisions == 0 {
            return Err(Error::Config(
                "[water] subdivisions must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.water.opacity) {
            return Err(Error::Config(format!(
                "[water] opacity must be within 0..=1, got {}",
                self.water.opacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.render.mode, RenderMode::Deferred);
    }

    #[test]
    fn test_ssr_consumers_have_independent_defaults() {
        let config = RendererConfig::default();
        assert_ne!(config.ssr, config.water_ssr);
        assert!(config.water_ssr.thickness > config.ssr.thickness);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            [render]
            mode = "forward"

            [water_ssr]
            thickness = 0.75
            "#,
        )
        .unwrap();

        assert_eq!(config.render.mode, RenderMode::Forward);
        assert!(config.render.ssr_enabled);
        assert_eq!(config.water_ssr.thickness, 0.75);
        assert_eq!(config.water_ssr.max_steps, SsrConfig::WATER.max_steps);
        assert_eq!(config.ssr, SsrConfig::STANDALONE);
    }

    #[test]
    fn test_rejects_zero_steps() {
        let err = RendererConfig::from_toml_str("[ssr]\nmax_steps = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_segment_capacity() {
        let err = RendererConfig::from_toml_str("[render]\nmaterial_segment_capacity = 0\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = RendererConfig::from_toml_str("[render\nmode = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\nwidth = 640\nheight = 480").unwrap();

        let config = RendererConfig::load(file.path()).unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.window.title, "Vesper");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RendererConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, RendererConfig::default());
    }
}

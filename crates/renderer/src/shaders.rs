//! Locating compiled shaders.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vesper_rhi::device::Device;
use vesper_rhi::shader::{Shader, ShaderStage};

use crate::error::RenderResult;

/// SPIR-V blob names (without `.spv`) used by the passes.
pub mod names {
    pub const GBUFFER_VERT: &str = "gbuffer.vert";
    pub const GBUFFER_FRAG: &str = "gbuffer.frag";
    pub const FULLSCREEN_VERT: &str = "fullscreen.vert";
    pub const SSR_FRAG: &str = "ssr.frag";
    pub const LIGHTING_FRAG: &str = "lighting.frag";
    pub const FORWARD_VERT: &str = "forward.vert";
    pub const FORWARD_FRAG: &str = "forward.frag";
    pub const WATER_VERT: &str = "water.vert";
    pub const WATER_FRAG: &str = "water.frag";

    pub const ALL: [&str; 9] = [
        GBUFFER_VERT,
        GBUFFER_FRAG,
        FULLSCREEN_VERT,
        SSR_FRAG,
        LIGHTING_FRAG,
        FORWARD_VERT,
        FORWARD_FRAG,
        WATER_VERT,
        WATER_FRAG,
    ];
}

/// Loads shader modules from a directory of `<name>.spv` files.
#[derive(Clone)]
pub struct ShaderSet {
    device: Arc<Device>,
    dir: PathBuf,
}

impl ShaderSet {
    pub fn new(device: Arc<Device>, dir: impl Into<PathBuf>) -> Self {
        Self {
            device,
            dir: dir.into(),
        }
    }

    pub fn load(&self, name: &str, stage: ShaderStage) -> RenderResult<Shader> {
        Ok(Shader::load(self.device.clone(), &self.dir, name, stage)?)
    }

    pub fn vertex(&self, name: &str) -> RenderResult<Shader> {
        self.load(name, ShaderStage::Vertex)
    }

    pub fn fragment(&self, name: &str) -> RenderResult<Shader> {
        self.load(name, ShaderStage::Fragment)
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of blobs missing from the directory.
    pub fn missing(&self) -> Vec<&'static str> {
        missing_in(&self.dir)
    }
}

/// Names of blobs missing from `dir`.
pub fn missing_in(dir: &Path) -> Vec<&'static str> {
    names::ALL
        .into_iter()
        .filter(|name| !dir.join(format!("{name}.spv")).is_file())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_absent_blobs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ssr.frag.spv"), [0u8; 4]).unwrap();

        let missing = missing_in(dir.path());
        assert_eq!(missing.len(), names::ALL.len() - 1);
        assert!(!missing.contains(&names::SSR_FRAG));
    }
}

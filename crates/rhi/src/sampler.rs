//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Filtering and addressing presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerKind {
    /// Trilinear, repeating; used for material textures.
    LinearRepeat,
    /// Bilinear, clamped; used for screen-space inputs that are filtered.
    LinearClamp,
    /// Point sampling, clamped; used for G-buffer and depth fetches.
    NearestClamp,
}

impl SamplerKind {
    fn filter(self) -> vk::Filter {
        match self {
            SamplerKind::LinearRepeat | SamplerKind::LinearClamp => vk::Filter::LINEAR,
            SamplerKind::NearestClamp => vk::Filter::NEAREST,
        }
    }

    fn address_mode(self) -> vk::SamplerAddressMode {
        match self {
            SamplerKind::LinearRepeat => vk::SamplerAddressMode::REPEAT,
            SamplerKind::LinearClamp | SamplerKind::NearestClamp => {
                vk::SamplerAddressMode::CLAMP_TO_EDGE
            }
        }
    }
}

pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
    kind: SamplerKind,
}

impl Sampler {
    pub fn new(device: Arc<Device>, kind: SamplerKind) -> RhiResult<Self> {
        let filter = kind.filter();
        let address = kind.address_mode();
        let anisotropy = kind == SamplerKind::LinearRepeat && device.anisotropy_enabled();

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy {
                device.limits().max_sampler_anisotropy.min(8.0)
            } else {
                1.0
            })
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!("Created {:?} sampler", kind);

        Ok(Self {
            device,
            sampler,
            kind,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn kind(&self) -> SamplerKind {
        self.kind
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed {:?} sampler", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_space_samplers_clamp() {
        assert_eq!(
            SamplerKind::NearestClamp.address_mode(),
            vk::SamplerAddressMode::CLAMP_TO_EDGE
        );
        assert_eq!(SamplerKind::NearestClamp.filter(), vk::Filter::NEAREST);
        assert_eq!(
            SamplerKind::LinearRepeat.address_mode(),
            vk::SamplerAddressMode::REPEAT
        );
    }
}

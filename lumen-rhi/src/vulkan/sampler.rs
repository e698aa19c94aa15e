use ash::vk;
use lumen_rhi_derive::DeviceObject;
use crate::error::Result;
use crate::types::{AddressMode, FilterMode, SamplerDesc};

#[DeviceObject]
pub struct Sampler {
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(device: &ash::Device, desc: &SamplerDesc) -> Result<Self> {
        let filter = match desc.filter {
            FilterMode::Nearest => vk::Filter::NEAREST,
            FilterMode::Linear => vk::Filter::LINEAR,
        };
        let address_mode = match desc.address_mode {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        };

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe { device.create_sampler(&create_info, None)? };
        Ok(Self { sampler, device: device.clone() })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}

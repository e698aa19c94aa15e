//! Device-local 2D images with a single mip level.

use ash::vk;
use lumen_rhi_derive::DeviceObject;
use crate::error::Result;
use crate::types::{Format, Size};
use super::utility::{allocate_memory, aspect_of, to_vk_format};

#[DeviceObject]
pub struct Texture {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: Format,
    size: Size,
}

impl Texture {
    /// A texture sampled by shaders and filled through a staging copy.
    pub fn sampled(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: Size,
        format: Format,
    ) -> Result<Self> {
        Self::new(
            device,
            memory_properties,
            size,
            format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )
    }

    /// A depth attachment owned by a swapchain.
    pub fn depth_attachment(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: Size,
        format: Format,
    ) -> Result<Self> {
        Self::new(device, memory_properties, size, format, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
    }

    fn new(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: Size,
        format: Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        let vk_format = to_vk_format(format);
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk_format)
            .extent(vk::Extent3D { width: size.width, height: size.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe {
            let image = device.create_image(&create_info, None)?;
            let requirements = device.get_image_memory_requirements(image);
            let memory = match allocate_memory(device, memory_properties, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(memory) => memory,
                Err(err) => {
                    device.destroy_image(image, None);
                    return Err(err);
                }
            };

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(vk_format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(aspect_of(format))
                        .level_count(1)
                        .layer_count(1),
                );
            let view = device
                .bind_image_memory(image, memory, 0)
                .and_then(|_| device.create_image_view(&view_info, None));
            let view = match view {
                Ok(view) => view,
                Err(err) => {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                    return Err(err.into());
                }
            };

            Ok(Self { image, memory, view, format, size, device: device.clone() })
        }
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_of(self.format)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

//! Vulkan logical device and the resource tables behind the handles it hands out.

use std::mem::ManuallyDrop;
use std::rc::Rc;
use std::time::Duration;
use ash::vk;
use log::info;
use slotmap::SlotMap;
use crate::backend::DeviceBackend;
use crate::command::CommandList;
use crate::error::{GpuError, Result};
use crate::handle::*;
use crate::image::ImageData;
use crate::shader::ShaderModule;
use crate::types::*;
use super::barrier::{transition_image, ImageState};
use super::buffer::Buffer;
use super::command::{ImmediateCommandEncoder, ResourceTables};
use super::core::{PhysicalDevice, VulkanInstance};
use super::descriptor::{write_descriptor, DescriptorAllocator, DescriptorResource, DescriptorSet, DescriptorSetLayout};
use super::pipeline::{GraphicPipeline, GraphicPipelineInfo, Shader};
use super::sampler::Sampler;
use super::swapchain::{Swapchain, SwapchainContext};
use super::texture::Texture;

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A Vulkan object that owns a handle created from a logical device.
pub(crate) trait DeviceObject: sealed::Sealed {
    fn device(&self) -> &ash::Device;
}

/// Objects destroyed before the logical device, in field order.
struct DeviceObjects {
    surfaces: SlotMap<SurfaceId, Swapchain>,
    pipelines: SlotMap<PipelineId, GraphicPipeline>,
    bind_groups: SlotMap<BindGroupId, DescriptorSet>,
    layouts: SlotMap<BindGroupLayoutId, DescriptorSetLayout>,
    shader_modules: SlotMap<ShaderModuleId, Shader>,
    samplers: SlotMap<SamplerId, Sampler>,
    textures: SlotMap<TextureId, Texture>,
    buffers: SlotMap<BufferId, Buffer>,
    descriptors: DescriptorAllocator,
    uploader: ImmediateCommandEncoder,
}

pub struct VulkanDevice {
    objects: ManuallyDrop<DeviceObjects>,
    swapchain_loader: Option<ash::khr::swapchain::Device>,
    queue: vk::Queue,
    queue_family: u32,
    /// Bound for host waits on frame fences.
    wait_timeout: Duration,
    physical: PhysicalDevice,
    device: ash::Device,
    instance: Rc<VulkanInstance>,
}

impl VulkanDevice {
    #[profiling::function]
    pub fn new(instance: Rc<VulkanInstance>, physical: PhysicalDevice, queue_family: u32) -> Result<Self> {
        let present = instance.surface_loader().is_some();
        let extensions = if present { vec![ash::khr::swapchain::NAME.as_ptr()] } else { Vec::new() };

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)];
        let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .push_next(&mut vulkan_13_features);

        let device = unsafe { instance.instance().create_device(physical.handle(), &create_info, None)? };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let objects = DescriptorAllocator::new(&device).and_then(|descriptors| {
            Ok(DeviceObjects {
                surfaces: SlotMap::with_key(),
                pipelines: SlotMap::with_key(),
                bind_groups: SlotMap::with_key(),
                layouts: SlotMap::with_key(),
                shader_modules: SlotMap::with_key(),
                samplers: SlotMap::with_key(),
                textures: SlotMap::with_key(),
                buffers: SlotMap::with_key(),
                descriptors,
                uploader: ImmediateCommandEncoder::new(&device, queue, queue_family)?,
            })
        });
        let objects = match objects {
            Ok(objects) => objects,
            Err(err) => {
                unsafe { device.destroy_device(None) };
                return Err(err);
            }
        };

        let swapchain_loader = present.then(|| ash::khr::swapchain::Device::new(instance.instance(), &device));
        info!("Vulkan device created on queue family {queue_family}.");

        Ok(Self {
            objects: ManuallyDrop::new(objects),
            swapchain_loader,
            queue,
            queue_family,
            wait_timeout: Duration::from_secs(2),
            physical,
            device,
            instance,
        })
    }

    /// Host writes go straight into mapped memory, so wait for the frames that may read it.
    fn wait_for_readers(&self) -> Result<()> {
        let timeout_ns = u64::try_from(self.wait_timeout.as_nanos()).unwrap_or(u64::MAX);
        for surface in self.objects.surfaces.values() {
            surface.wait_frames(timeout_ns)?;
        }
        Ok(())
    }
}

fn swapchain_context<'a>(
    instance: &'a VulkanInstance,
    swapchain_loader: Option<&'a ash::khr::swapchain::Device>,
    physical: &'a PhysicalDevice,
    queue_family: u32,
) -> Result<SwapchainContext<'a>> {
    match (instance.surface_loader(), swapchain_loader) {
        (Some(surface_loader), Some(swapchain_loader)) => Ok(SwapchainContext {
            surface_loader,
            swapchain_loader,
            physical_device: physical.handle(),
            memory_properties: physical.memory_properties(),
            queue_family,
        }),
        _ => Err(GpuError::Unsupported("the GPU was created without a display".into())),
    }
}

impl DeviceBackend for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.physical.limits()
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn set_wait_timeout(&mut self, timeout: Duration) {
        self.wait_timeout = timeout;
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        let buffer = Buffer::new(&self.device, self.physical.memory_properties(), desc)?;
        Ok(self.objects.buffers.insert(buffer))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        self.wait_for_readers()?;
        self.objects.buffers[buffer].write(offset, data)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.objects.buffers.remove(buffer).expect("destroying an unknown buffer");
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        let texture = Texture::sampled(&self.device, self.physical.memory_properties(), desc.size, desc.format)?;
        let (image, aspect) = (texture.image(), texture.aspect());
        let id = self.objects.textures.insert(texture);

        self.objects.uploader.submit_and_wait(|device, cmd| {
            transition_image(device, cmd, image, aspect, ImageState::Undefined, ImageState::ShaderRead);
        })?;
        Ok(id)
    }

    #[profiling::function]
    fn write_texture(&mut self, texture: TextureId, image: &ImageData) -> Result<()> {
        self.wait_for_readers()?;
        let objects = &mut *self.objects;
        let target = &objects.textures[texture];
        if target.size() != image.size() {
            return Err(GpuError::config(
                "texture",
                format!("image is {:?} but the texture is {:?}", image.size(), target.size()),
            ));
        }

        let staging = Buffer::staging(&self.device, self.physical.memory_properties(), image.rgba.len() as u64)?;
        staging.write(0, &image.rgba)?;

        let (dst, aspect, size) = (target.image(), target.aspect(), target.size());
        objects.uploader.submit_and_wait(|device, cmd| {
            transition_image(device, cmd, dst, aspect, ImageState::Undefined, ImageState::TransferDst);
            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(aspect)
                        .layer_count(1),
                )
                .image_extent(vk::Extent3D { width: size.width, height: size.height, depth: 1 });
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                )
            };
            transition_image(device, cmd, dst, aspect, ImageState::TransferDst, ImageState::ShaderRead);
        })
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.objects.textures.remove(texture).expect("destroying an unknown texture");
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId> {
        let sampler = Sampler::new(&self.device, desc)?;
        Ok(self.objects.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.objects.samplers.remove(sampler).expect("destroying an unknown sampler");
    }

    fn create_shader_module(&mut self, module: &ShaderModule) -> Result<ShaderModuleId> {
        let shader = Shader::new(&self.device, module)?;
        Ok(self.objects.shader_modules.insert(shader))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        self.objects.shader_modules.remove(module).expect("destroying an unknown shader module");
    }

    fn create_bind_group_layout(&mut self, desc: &BindGroupLayoutDesc) -> Result<BindGroupLayoutId> {
        let layout = DescriptorSetLayout::new(&self.device, desc)?;
        Ok(self.objects.layouts.insert(layout))
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        self.objects.layouts.remove(layout).expect("destroying an unknown bind group layout");
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> Result<BindGroupId> {
        let objects = &mut *self.objects;
        let layout = &objects.layouts[desc.layout];
        let set = objects.descriptors.allocate(layout)?;

        for entry in &desc.entries {
            let kind = layout.kind_of(entry.binding);
            let resource = match (kind, entry.resource) {
                (Some(BindingKind::UniformDynamic { .. } | BindingKind::StorageDynamic { .. }), BindingResource::Buffer { buffer, offset, size }) => {
                    DescriptorResource::Buffer { buffer: objects.buffers[buffer].handle(), offset, size }
                }
                (Some(BindingKind::SampledTexture), BindingResource::Texture(texture)) => {
                    DescriptorResource::Image(objects.textures[texture].view())
                }
                (Some(BindingKind::Sampler), BindingResource::Sampler(sampler)) => {
                    DescriptorResource::Sampler(objects.samplers[sampler].handle())
                }
                _ => {
                    objects.descriptors.free(set);
                    return Err(GpuError::config(
                        desc.label.as_str(),
                        format!("binding {} does not match its layout", entry.binding),
                    ));
                }
            };
            if let Some(kind) = kind {
                write_descriptor(&self.device, set.set, entry.binding, kind, resource);
            }
        }

        Ok(objects.bind_groups.insert(set))
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        let set = self.objects.bind_groups.remove(group).expect("destroying an unknown bind group");
        self.objects.descriptors.free(set);
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId> {
        if desc.sample_count != 1 {
            return Err(GpuError::Unsupported(format!("{} samples per pixel", desc.sample_count)));
        }
        let objects = &mut *self.objects;
        let info = GraphicPipelineInfo {
            desc,
            vertex: objects.shader_modules[desc.vertex.module].handle(),
            fragment: desc.fragment.as_ref().map(|f| objects.shader_modules[f.module].handle()),
            set_layouts: desc.bind_group_layouts.iter().map(|id| objects.layouts[*id].handle()).collect(),
        };
        let pipeline = GraphicPipeline::new(&self.device, &info)?;
        Ok(objects.pipelines.insert(pipeline))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.objects.pipelines.remove(pipeline).expect("destroying an unknown pipeline");
    }

    fn create_surface(&mut self, target: &SurfaceTarget, config: &SurfaceConfig) -> Result<(SurfaceId, SurfaceInfo)> {
        let SurfaceTarget::Window { display, window } = *target else {
            return Err(GpuError::Unsupported("offscreen surfaces on Vulkan".into()));
        };
        let ctx = swapchain_context(&self.instance, self.swapchain_loader.as_ref(), &self.physical, self.queue_family)?;

        let surface = unsafe {
            ash_window::create_surface(self.instance.entry(), self.instance.instance(), display, window, None)?
        };
        let supported = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_support(self.physical.handle(), self.queue_family, surface)
                .unwrap_or(false)
        };
        if !supported {
            unsafe { ctx.surface_loader.destroy_surface(surface, None) };
            return Err(GpuError::Unsupported("the queue family cannot present to this window".into()));
        }

        let swapchain = match Swapchain::new(&self.device, &ctx, surface, config) {
            Ok(swapchain) => swapchain,
            Err(err) => {
                unsafe { ctx.surface_loader.destroy_surface(surface, None) };
                return Err(err);
            }
        };
        let info = swapchain.info();
        Ok((self.objects.surfaces.insert(swapchain), info))
    }

    fn configure_surface(&mut self, surface: SurfaceId, config: &SurfaceConfig) -> Result<SurfaceInfo> {
        self.wait_idle()?;
        let ctx = swapchain_context(&self.instance, self.swapchain_loader.as_ref(), &self.physical, self.queue_family)?;
        self.objects.surfaces[surface].configure(&ctx, config)
    }

    fn acquire_image(&mut self, surface: SurfaceId, timeout: Duration) -> Result<AcquiredImage> {
        self.objects.surfaces[surface].acquire(timeout)
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let objects = &mut *self.objects;
        let tables = ResourceTables {
            pipelines: &objects.pipelines,
            bind_groups: &objects.bind_groups,
            buffers: &objects.buffers,
        };
        objects.surfaces[commands.surface].submit(self.queue, commands, &tables)
    }

    fn present(&mut self, surface: SurfaceId, image_index: u32) -> Result<()> {
        self.objects.surfaces[surface].present(self.queue, image_index)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if let Err(err) = self.wait_idle() {
            log::error!("Failed to wait for the device before destroying a surface: {err}");
        }
        self.objects.surfaces.remove(surface).expect("destroying an unknown surface");
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                log::error!("Failed to wait for the device on shutdown: {err}");
            }
            ManuallyDrop::drop(&mut self.objects);
            self.device.destroy_device(None);
        }
    }
}

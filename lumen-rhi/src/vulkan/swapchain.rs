//! Window surfaces and their swapchain frame rings.

use std::time::Duration;
use ash::vk;
use log::{info, warn};
use lumen_rhi_derive::DeviceObject;
use crate::command::CommandList;
use crate::error::{GpuError, Result};
use crate::types::{Format, PresentMode, Size, SurfaceConfig, SurfaceInfo, AcquiredImage};
use super::device::DeviceObject;
use super::command::{record_command_list, CommandPool, RenderTarget, ResourceTables};
use super::sync::{Fence, Semaphore};
use super::texture::Texture;
use super::utility::{from_vk_format, to_vk_present_mode};

/// Per frame-in-flight objects.
struct FrameSlot {
    pool: CommandPool,
    image_available: Semaphore,
    in_flight: Fence,
    depth: Option<Texture>,
}

/// Everything that is torn down and rebuilt on reconfiguration.
struct FrameRing {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    render_finished: Vec<Semaphore>,
    frames: Vec<FrameSlot>,
    extent: vk::Extent2D,
}

/// Static creation context shared by every ring rebuild.
pub struct SwapchainContext<'a> {
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub swapchain_loader: &'a ash::khr::swapchain::Device,
    pub physical_device: vk::PhysicalDevice,
    pub memory_properties: &'a vk::PhysicalDeviceMemoryProperties,
    pub queue_family: u32,
}

#[DeviceObject]
pub struct Swapchain {
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    config: SurfaceConfig,
    ring: FrameRing,
    current_frame: usize,
    /// (image index, frame slot) of the outstanding acquire.
    acquired: Option<(u32, usize)>,
}

impl Swapchain {
    #[profiling::function]
    pub fn new(
        device: &ash::Device,
        ctx: &SwapchainContext,
        surface: vk::SurfaceKHR,
        config: &SurfaceConfig,
    ) -> Result<Self> {
        let formats = unsafe {
            ctx.surface_loader.get_physical_device_surface_formats(ctx.physical_device, surface)?
        };
        let format = choose_surface_format(&formats)
            .ok_or_else(|| GpuError::Unsupported("no supported swapchain format".into()))?;

        let ring = create_ring(device, ctx, surface, format, config, vk::SwapchainKHR::null())?;
        Ok(Self {
            surface_loader: ctx.surface_loader.clone(),
            swapchain_loader: ctx.swapchain_loader.clone(),
            surface,
            format,
            config: *config,
            ring,
            current_frame: 0,
            acquired: None,
            device: device.clone(),
        })
    }

    pub fn info(&self) -> SurfaceInfo {
        SurfaceInfo {
            format: from_vk_format(self.format.format).unwrap_or(Format::Bgra8Srgb),
            size: Size::new(self.ring.extent.width, self.ring.extent.height),
            image_count: self.ring.images.len() as u32,
            depth_format: self.config.depth_format,
        }
    }

    /// Rebuild the ring for `config`. The device must be idle.
    pub fn configure(&mut self, ctx: &SwapchainContext, config: &SurfaceConfig) -> Result<SurfaceInfo> {
        let ring = create_ring(&self.device, ctx, self.surface, self.format, config, self.ring.swapchain)?;
        let old = std::mem::replace(&mut self.ring, ring);
        destroy_ring(&self.device, &self.swapchain_loader, old);

        self.config = *config;
        self.current_frame = 0;
        self.acquired = None;
        Ok(self.info())
    }

    /// Wait until no frame slot has work on the queue.
    #[profiling::function]
    pub fn wait_frames(&self, timeout_ns: u64) -> Result<()> {
        let fences: Vec<vk::Fence> = self.ring.frames.iter().map(|slot| slot.in_flight.handle()).collect();
        unsafe { self.device.wait_for_fences(&fences, true, timeout_ns)? };
        Ok(())
    }

    #[profiling::function]
    pub fn acquire(&mut self, timeout: Duration) -> Result<AcquiredImage> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let slot = &self.ring.frames[self.current_frame];
        slot.in_flight.wait(timeout_ns)?;

        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.ring.swapchain,
                timeout_ns,
                slot.image_available.handle(),
                vk::Fence::null(),
            )?
        };
        self.acquired = Some((index, self.current_frame));
        Ok(AcquiredImage { index, suboptimal })
    }

    #[profiling::function]
    pub fn submit(&mut self, queue: vk::Queue, list: &CommandList, tables: &ResourceTables) -> Result<()> {
        let (image, slot_index) = match self.acquired {
            Some((image, slot)) if image == list.image_index => (image, slot),
            _ => return Err(GpuError::FrameOrder(format!("image {} was not acquired", list.image_index))),
        };
        let slot = &self.ring.frames[slot_index];

        let target = RenderTarget {
            color: self.ring.images[image as usize],
            color_view: self.ring.views[image as usize],
            depth: slot.depth.as_ref().map(|d| (d.image(), d.view(), d.aspect())),
            extent: self.ring.extent,
        };

        let cmd = slot.pool.begin()?;
        record_command_list(&self.device, cmd, list, &target, tables)?;
        let cmd = slot.pool.end()?;

        let wait = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.image_available.handle())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(self.ring.render_finished[image as usize].handle())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let cmd_info = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];
        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait)
            .signal_semaphore_infos(&signal)
            .command_buffer_infos(&cmd_info);

        slot.in_flight.reset()?;
        unsafe { self.device.queue_submit2(queue, &[submit_info], slot.in_flight.handle())? };
        Ok(())
    }

    #[profiling::function]
    pub fn present(&mut self, queue: vk::Queue, image_index: u32) -> Result<()> {
        if !matches!(self.acquired, Some((image, _)) if image == image_index) {
            return Err(GpuError::FrameOrder(format!("image {image_index} was not acquired")));
        }

        let swapchains = [self.ring.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [self.ring.render_finished[image_index as usize].handle()];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        self.acquired = None;
        self.current_frame = (self.current_frame + 1) % self.ring.frames.len();

        match result {
            Ok(true) => {
                log::debug!("Swapchain is suboptimal.");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let ring = std::mem::replace(
            &mut self.ring,
            FrameRing {
                swapchain: vk::SwapchainKHR::null(),
                images: Vec::new(),
                views: Vec::new(),
                render_finished: Vec::new(),
                frames: Vec::new(),
                extent: vk::Extent2D::default(),
            },
        );
        destroy_ring(self.device(), &self.swapchain_loader, ring);
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

fn create_ring(
    device: &ash::Device,
    ctx: &SwapchainContext,
    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    config: &SurfaceConfig,
    old_swapchain: vk::SwapchainKHR,
) -> Result<FrameRing> {
    let capabilities = unsafe {
        ctx.surface_loader.get_physical_device_surface_capabilities(ctx.physical_device, surface)?
    };
    let present_modes = unsafe {
        ctx.surface_loader.get_physical_device_surface_present_modes(ctx.physical_device, surface)?
    };
    let present_mode = choose_present_mode(&present_modes, config.present_mode);
    let extent = get_swapchain_extent(&capabilities, config.size);
    if extent.width == 0 || extent.height == 0 {
        return Err(GpuError::SurfaceOutdated);
    }

    let mut image_count = (config.frames_in_flight.max(1) + 1).max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        image_count = image_count.min(capabilities.max_image_count);
    }

    info!(
        "Creating swapchain: {:?} {}x{}, {} images, {:?}",
        format.format, extent.width, extent.height, image_count, present_mode
    );

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { ctx.swapchain_loader.create_swapchain(&create_info, None)? };
    let mut ring = FrameRing {
        swapchain,
        images: Vec::new(),
        views: Vec::new(),
        render_finished: Vec::new(),
        frames: Vec::new(),
        extent,
    };

    if let Err(err) = fill_ring(device, ctx, format.format, config, &mut ring) {
        destroy_ring(device, ctx.swapchain_loader, ring);
        return Err(err);
    }
    Ok(ring)
}

fn fill_ring(
    device: &ash::Device,
    ctx: &SwapchainContext,
    format: vk::Format,
    config: &SurfaceConfig,
    ring: &mut FrameRing,
) -> Result<()> {
    ring.images = unsafe { ctx.swapchain_loader.get_swapchain_images(ring.swapchain)? };

    for &image in &ring.images {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        ring.views.push(unsafe { device.create_image_view(&view_info, None)? });
        ring.render_finished.push(Semaphore::new(device)?);
    }

    let size = Size::new(ring.extent.width, ring.extent.height);
    for _ in 0..config.frames_in_flight.max(1) {
        let depth = config
            .depth_format
            .map(|format| Texture::depth_attachment(device, ctx.memory_properties, size, format))
            .transpose()?;
        ring.frames.push(FrameSlot {
            pool: CommandPool::new(device, ctx.queue_family)?,
            image_available: Semaphore::new(device)?,
            in_flight: Fence::new(device, true)?,
            depth,
        });
    }
    Ok(())
}

fn destroy_ring(device: &ash::Device, swapchain_loader: &ash::khr::swapchain::Device, ring: FrameRing) {
    unsafe {
        for view in &ring.views {
            device.destroy_image_view(*view, None);
        }
        if ring.swapchain != vk::SwapchainKHR::null() {
            swapchain_loader.destroy_swapchain(ring.swapchain, None);
        }
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.iter().find(|f| from_vk_format(f.format).is_some_and(|f| !f.is_depth())))
        .copied()
}

fn choose_present_mode(modes: &[vk::PresentModeKHR], preferred: PresentMode) -> vk::PresentModeKHR {
    let preferred = to_vk_present_mode(preferred);
    if modes.contains(&preferred) {
        preferred
    } else {
        warn!("Present mode {preferred:?} unsupported, falling back to FIFO.");
        vk::PresentModeKHR::FIFO
    }
}

fn get_swapchain_extent(capabilities: &vk::SurfaceCapabilitiesKHR, size: Size) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: size.width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
            height: size.height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
        }
    }
}

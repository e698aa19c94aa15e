//! Capability interface every graphics backend implements.
//!
//! The GPU, device and system layers above only talk to these traits, so a
//! backend is swapped without touching them.

use std::time::Duration;
use crate::command::CommandList;
use crate::error::Result;
use crate::handle::*;
use crate::image::ImageData;
use crate::shader::ShaderModule;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Vulkan,
    Headless,
}

/// Instance-level entry point of a backend.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn adapters(&self) -> &[AdapterInfo];

    /// Create a logical device with one queue from `queue_family` of adapter `adapter`.
    fn create_device(&self, adapter: usize, queue_family: u32) -> Result<Box<dyn DeviceBackend>>;
}

/// A logical device and its queue.
///
/// Handles passed in must have been created by this device and not yet destroyed;
/// implementations panic otherwise.
pub trait DeviceBackend {
    fn limits(&self) -> DeviceLimits;

    /// Block until all submitted work finished.
    fn wait_idle(&mut self) -> Result<()>;
    /// Upper bound for the waits a write does on frames still reading the target.
    fn set_wait_timeout(&mut self, timeout: Duration);

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId>;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;
    fn write_texture(&mut self, texture: TextureId, image: &ImageData) -> Result<()>;
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId>;
    fn destroy_sampler(&mut self, sampler: SamplerId);

    fn create_shader_module(&mut self, module: &ShaderModule) -> Result<ShaderModuleId>;
    fn destroy_shader_module(&mut self, module: ShaderModuleId);

    fn create_bind_group_layout(&mut self, desc: &BindGroupLayoutDesc) -> Result<BindGroupLayoutId>;
    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId);

    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> Result<BindGroupId>;
    fn destroy_bind_group(&mut self, group: BindGroupId);

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId>;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    /// Create a surface and build its first frame ring.
    fn create_surface(&mut self, target: &SurfaceTarget, config: &SurfaceConfig) -> Result<(SurfaceId, SurfaceInfo)>;
    /// Tear down the current frame ring and build a new one.
    fn configure_surface(&mut self, surface: SurfaceId, config: &SurfaceConfig) -> Result<SurfaceInfo>;
    /// Wait for the next frame slot and acquire an image from the ring.
    fn acquire_image(&mut self, surface: SurfaceId, timeout: Duration) -> Result<AcquiredImage>;
    fn submit(&mut self, commands: &CommandList) -> Result<()>;
    fn present(&mut self, surface: SurfaceId, image_index: u32) -> Result<()>;
    fn destroy_surface(&mut self, surface: SurfaceId);
}

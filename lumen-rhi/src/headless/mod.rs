//! CPU-only backend.
//!
//! Keeps every resource in host memory and validates recorded command lists
//! instead of rasterising them. Used by the test-suite and for offscreen
//! targets; [`HeadlessProbe`] exposes its internals for inspection.

mod probe;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use slotmap::SlotMap;
use enumflags2::BitFlags;
use crate::backend::{Backend, BackendKind, DeviceBackend};
use crate::command::{CommandList, RenderCommand};
use crate::error::{GpuError, Result};
use crate::handle::*;
use crate::image::ImageData;
use crate::shader::ShaderModule;
use crate::types::*;

pub use probe::{HeadlessProbe, HeadlessStats};

pub const HEADLESS_ADAPTER_NAME: &str = "Lumen Headless Adapter";
pub const HEADLESS_SURFACE_FORMAT: Format = Format::Bgra8Srgb;

const LIMITS: DeviceLimits = DeviceLimits {
    min_uniform_buffer_offset_alignment: 256,
    min_storage_buffer_offset_alignment: 256,
    max_texture_dimension_2d: 8192,
    max_bind_groups: 8,
};

struct HeadlessBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

struct HeadlessTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

struct HeadlessSurface {
    config: SurfaceConfig,
    info: SurfaceInfo,
    next_image: u32,
}

#[derive(Default)]
struct FaultPlan {
    outdated_acquires: u32,
    acquire_timeouts: u32,
    outdated_presents: u32,
}

#[derive(Default)]
pub(crate) struct HeadlessState {
    buffers: SlotMap<BufferId, HeadlessBuffer>,
    textures: SlotMap<TextureId, HeadlessTexture>,
    samplers: SlotMap<SamplerId, SamplerDesc>,
    shader_modules: SlotMap<ShaderModuleId, String>,
    layouts: SlotMap<BindGroupLayoutId, BindGroupLayoutDesc>,
    bind_groups: SlotMap<BindGroupId, BindGroupDesc>,
    pipelines: SlotMap<PipelineId, PipelineDesc>,
    surfaces: SlotMap<SurfaceId, HeadlessSurface>,
    live_devices: usize,
    wait_timeout: Option<Duration>,
    submitted: Vec<CommandList>,
    stats: HeadlessStats,
    faults: FaultPlan,
}

/// Instance of the headless backend.
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
    adapters: Vec<AdapterInfo>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// One CPU adapter with a universal queue family and a transfer-only family.
    pub fn new() -> Self {
        Self::with_queue_families(vec![
            QueueCapability::Graphics | QueueCapability::Compute | QueueCapability::Transfer,
            BitFlags::from(QueueCapability::Transfer),
        ])
    }

    pub fn with_queue_families(families: Vec<QueueCapabilities>) -> Self {
        let queue_families = families
            .into_iter()
            .enumerate()
            .map(|(index, capabilities)| QueueFamilyInfo {
                index: index as u32,
                capabilities,
                queue_count: 1,
            })
            .collect();

        Self {
            state: Rc::new(RefCell::new(HeadlessState::default())),
            adapters: vec![AdapterInfo {
                name: HEADLESS_ADAPTER_NAME.to_owned(),
                kind: AdapterKind::Cpu,
                api_version: (1, 3, 0),
                vram_bytes: 0,
                queue_families,
            }],
        }
    }

    /// A probe sharing this backend's state.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe::new(self.state.clone())
    }
}

impl Backend for HeadlessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Headless
    }

    fn adapters(&self) -> &[AdapterInfo] {
        &self.adapters
    }

    fn create_device(&self, adapter: usize, queue_family: u32) -> Result<Box<dyn DeviceBackend>> {
        let info = self
            .adapters
            .get(adapter)
            .ok_or_else(|| GpuError::NoSuitableAdapter(format!("adapter index {adapter}")))?;
        if !info.queue_families.iter().any(|f| f.index == queue_family) {
            return Err(GpuError::NoSuitableQueue { requested: format!("family {queue_family}") });
        }

        self.state.borrow_mut().live_devices += 1;
        log::debug!("headless device created on queue family {queue_family}");
        Ok(Box::new(HeadlessDevice { state: self.state.clone() }))
    }
}

/// Logical device of the headless backend.
pub struct HeadlessDevice {
    state: Rc<RefCell<HeadlessState>>,
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        self.state.borrow_mut().live_devices -= 1;
        log::debug!("headless device destroyed");
    }
}

fn stale(what: &str) -> GpuError {
    GpuError::Backend(format!("command list references a destroyed {what}"))
}

impl HeadlessState {
    fn validate_commands(&self, list: &CommandList) -> Result<()> {
        let mut in_pass = false;
        let mut pipeline: Option<&PipelineDesc> = None;

        for command in &list.commands {
            match command {
                RenderCommand::BeginRenderPass(desc) => {
                    if in_pass {
                        return Err(GpuError::Backend("nested render pass".to_owned()));
                    }
                    let surface = self.surfaces.get(desc.surface).ok_or_else(|| stale("surface"))?;
                    if desc.surface != list.surface || desc.image_index != list.image_index {
                        return Err(GpuError::Backend("render pass targets a different image than the submission".to_owned()));
                    }
                    if desc.image_index >= surface.info.image_count {
                        return Err(GpuError::Backend(format!("image index {} out of range", desc.image_index)));
                    }
                    if desc.depth.is_some() && surface.info.depth_format.is_none() {
                        return Err(GpuError::Backend("depth load op on a surface without depth".to_owned()));
                    }
                    in_pass = true;
                }
                RenderCommand::EndRenderPass => {
                    if !in_pass {
                        return Err(GpuError::Backend("end of render pass without begin".to_owned()));
                    }
                    in_pass = false;
                    pipeline = None;
                }
                RenderCommand::BindPipeline(id) => {
                    pipeline = Some(self.pipelines.get(*id).ok_or_else(|| stale("pipeline"))?);
                }
                RenderCommand::BindGroup { index, group, dynamic_offsets } => {
                    let group = self.bind_groups.get(*group).ok_or_else(|| stale("bind group"))?;
                    let layout = self.layouts.get(group.layout).ok_or_else(|| stale("bind group layout"))?;
                    let pipeline = pipeline.ok_or_else(|| GpuError::Backend("bind group without pipeline".to_owned()))?;
                    if pipeline.bind_group_layouts.get(*index as usize).is_none() {
                        return Err(GpuError::Backend(format!("pipeline has no bind group {index}")));
                    }
                    let dynamic: Vec<_> = layout.entries.iter().filter(|e| e.kind.is_dynamic()).collect();
                    if dynamic.len() != dynamic_offsets.len() {
                        return Err(GpuError::Backend(format!(
                            "bind group {index} expects {} dynamic offsets, got {}",
                            dynamic.len(),
                            dynamic_offsets.len()
                        )));
                    }
                    for (entry, offset) in dynamic.iter().zip(dynamic_offsets) {
                        let resource = group.entries.iter().find(|e| e.binding == entry.binding);
                        if let Some(BindingResource::Buffer { buffer, offset: base, size }) = resource.map(|e| e.resource) {
                            let buffer = self.buffers.get(buffer).ok_or_else(|| stale("buffer"))?;
                            if base + *offset as u64 + size > buffer.desc.size {
                                return Err(GpuError::Backend(format!(
                                    "dynamic offset {offset} overruns buffer `{}`",
                                    buffer.desc.label
                                )));
                            }
                        }
                    }
                }
                RenderCommand::BindVertexBuffer { buffer, offset, .. }
                | RenderCommand::BindIndexBuffer { buffer, offset, .. } => {
                    let buffer = self.buffers.get(*buffer).ok_or_else(|| stale("buffer"))?;
                    if *offset > buffer.desc.size {
                        return Err(GpuError::Backend(format!("offset {offset} beyond buffer `{}`", buffer.desc.label)));
                    }
                }
                RenderCommand::Draw { .. } | RenderCommand::DrawIndexed { .. } => {
                    if !in_pass || pipeline.is_none() {
                        return Err(GpuError::Backend("draw outside a render pass or without pipeline".to_owned()));
                    }
                }
            }
        }

        if in_pass {
            return Err(GpuError::Backend("render pass left open".to_owned()));
        }
        Ok(())
    }

    fn build_ring(&mut self, config: &SurfaceConfig) -> SurfaceInfo {
        self.stats.ring_builds += 1;
        SurfaceInfo {
            format: HEADLESS_SURFACE_FORMAT,
            size: config.size,
            image_count: config.frames_in_flight.max(1) + 1,
            depth_format: config.depth_format,
        }
    }
}

impl DeviceBackend for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        LIMITS
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.state.borrow_mut().stats.wait_idles += 1;
        Ok(())
    }

    fn set_wait_timeout(&mut self, timeout: Duration) {
        self.state.borrow_mut().wait_timeout = Some(timeout);
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        let mut state = self.state.borrow_mut();
        log::trace!("headless buffer `{}` ({} bytes) created", desc.label, desc.size);
        Ok(state.buffers.insert(HeadlessBuffer {
            desc: desc.clone(),
            data: vec![0; desc.size as usize],
        }))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let target = state.buffers.get_mut(buffer).expect("write to a destroyed buffer");
        let end = offset as usize + data.len();
        if end > target.data.len() {
            return Err(GpuError::Backend(format!(
                "write of {} bytes at {offset} overruns buffer `{}` ({} bytes)",
                data.len(),
                target.desc.label,
                target.data.len()
            )));
        }
        target.data[offset as usize..end].copy_from_slice(data);
        state.stats.buffer_writes += 1;
        state.stats.bytes_written += data.len() as u64;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        let removed = self.state.borrow_mut().buffers.remove(buffer);
        let buffer = removed.expect("buffer destroyed twice");
        log::trace!("headless buffer `{}` destroyed", buffer.desc.label);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.size.width > LIMITS.max_texture_dimension_2d || desc.size.height > LIMITS.max_texture_dimension_2d {
            return Err(GpuError::OutOfMemory("device"));
        }
        let bytes = desc.size.width as usize * desc.size.height as usize * desc.format.bytes_per_pixel() as usize;
        Ok(self.state.borrow_mut().textures.insert(HeadlessTexture {
            desc: desc.clone(),
            data: vec![0; bytes],
        }))
    }

    fn write_texture(&mut self, texture: TextureId, image: &ImageData) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let target = state.textures.get_mut(texture).expect("write to a destroyed texture");
        if target.desc.size != image.size() {
            return Err(GpuError::Backend(format!(
                "image {}x{} does not match texture `{}`",
                image.width, image.height, target.desc.label
            )));
        }
        target.data.copy_from_slice(&image.rgba);
        state.stats.texture_writes += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.state.borrow_mut().textures.remove(texture).expect("texture destroyed twice");
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId> {
        Ok(self.state.borrow_mut().samplers.insert(desc.clone()))
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.state.borrow_mut().samplers.remove(sampler).expect("sampler destroyed twice");
    }

    fn create_shader_module(&mut self, module: &ShaderModule) -> Result<ShaderModuleId> {
        Ok(self.state.borrow_mut().shader_modules.insert(module.label().to_owned()))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        self.state.borrow_mut().shader_modules.remove(module).expect("shader module destroyed twice");
    }

    fn create_bind_group_layout(&mut self, desc: &BindGroupLayoutDesc) -> Result<BindGroupLayoutId> {
        Ok(self.state.borrow_mut().layouts.insert(desc.clone()))
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        self.state.borrow_mut().layouts.remove(layout).expect("bind group layout destroyed twice");
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> Result<BindGroupId> {
        let mut state = self.state.borrow_mut();
        let layout = state.layouts.get(desc.layout).expect("stale bind group layout handle");
        for entry in &layout.entries {
            let resource = desc
                .entries
                .iter()
                .find(|e| e.binding == entry.binding)
                .map(|e| e.resource)
                .ok_or_else(|| GpuError::Backend(format!("`{}` misses binding {}", desc.label, entry.binding)))?;
            let matches = match (entry.kind, resource) {
                (BindingKind::UniformDynamic { .. } | BindingKind::StorageDynamic { .. }, BindingResource::Buffer { buffer, .. }) => {
                    state.buffers.contains_key(buffer)
                }
                (BindingKind::SampledTexture, BindingResource::Texture(texture)) => state.textures.contains_key(texture),
                (BindingKind::Sampler, BindingResource::Sampler(sampler)) => state.samplers.contains_key(sampler),
                _ => false,
            };
            if !matches {
                return Err(GpuError::Backend(format!(
                    "`{}` binding {} does not match its layout",
                    desc.label, entry.binding
                )));
            }
        }
        Ok(state.bind_groups.insert(desc.clone()))
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        self.state.borrow_mut().bind_groups.remove(group).expect("bind group destroyed twice");
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId> {
        let mut state = self.state.borrow_mut();
        assert!(state.shader_modules.contains_key(desc.vertex.module), "stale shader module handle");
        for layout in &desc.bind_group_layouts {
            assert!(state.layouts.contains_key(*layout), "stale bind group layout handle");
        }
        if desc.sample_count != 1 {
            return Err(GpuError::Unsupported(format!("{} samples", desc.sample_count)));
        }
        log::debug!("headless pipeline `{}` created", desc.label);
        Ok(state.pipelines.insert(desc.clone()))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.state.borrow_mut().pipelines.remove(pipeline).expect("pipeline destroyed twice");
    }

    fn create_surface(&mut self, _target: &SurfaceTarget, config: &SurfaceConfig) -> Result<(SurfaceId, SurfaceInfo)> {
        let mut state = self.state.borrow_mut();
        let info = state.build_ring(config);
        let id = state.surfaces.insert(HeadlessSurface {
            config: *config,
            info,
            next_image: 0,
        });
        log::info!(
            "headless surface {}x{} with {} images",
            info.size.width,
            info.size.height,
            info.image_count
        );
        Ok((id, info))
    }

    fn configure_surface(&mut self, surface: SurfaceId, config: &SurfaceConfig) -> Result<SurfaceInfo> {
        let mut state = self.state.borrow_mut();
        assert!(state.surfaces.contains_key(surface), "configure of a destroyed surface");
        state.stats.ring_releases += 1;
        let info = state.build_ring(config);
        let target = &mut state.surfaces[surface];
        target.config = *config;
        target.info = info;
        target.next_image = 0;
        Ok(info)
    }

    fn acquire_image(&mut self, surface: SurfaceId, _timeout: Duration) -> Result<AcquiredImage> {
        let mut state = self.state.borrow_mut();
        if state.faults.acquire_timeouts > 0 {
            state.faults.acquire_timeouts -= 1;
            return Err(GpuError::Timeout("surface image"));
        }
        if state.faults.outdated_acquires > 0 {
            state.faults.outdated_acquires -= 1;
            return Err(GpuError::SurfaceOutdated);
        }
        state.stats.acquires += 1;
        let target = state.surfaces.get_mut(surface).expect("acquire on a destroyed surface");
        let index = target.next_image;
        target.next_image = (index + 1) % target.info.image_count;
        Ok(AcquiredImage { index, suboptimal: false })
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.validate_commands(commands)?;
        state.stats.submissions += 1;
        state.submitted.push(commands.clone());
        Ok(())
    }

    fn present(&mut self, surface: SurfaceId, image_index: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.faults.outdated_presents > 0 {
            state.faults.outdated_presents -= 1;
            return Err(GpuError::SurfaceOutdated);
        }
        let target = state.surfaces.get(surface).expect("present on a destroyed surface");
        assert!(image_index < target.info.image_count, "present of an image outside the ring");
        state.stats.presents += 1;
        Ok(())
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        let mut state = self.state.borrow_mut();
        state.surfaces.remove(surface).expect("surface destroyed twice");
        state.stats.ring_releases += 1;
    }
}

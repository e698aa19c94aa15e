//! Command pools, one-shot submission and command list translation.

use ash::vk;
use slotmap::SlotMap;
use lumen_rhi_derive::DeviceObject;
use crate::command::{CommandList, LoadOp, RenderCommand};
use crate::error::{GpuError, Result};
use crate::handle::{BindGroupId, BufferId, PipelineId};
use super::barrier::{transition_image, ImageState};
use super::buffer::Buffer;
use super::descriptor::DescriptorSet;
use super::pipeline::GraphicPipeline;
use super::sync::Fence;
use super::utility::to_vk_index_type;

/// A command pool holding a single primary command buffer, reset before every use.
#[DeviceObject]
pub struct CommandPool {
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
}

impl CommandPool {
    pub fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(err) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(err.into());
            }
        };

        Ok(Self { pool, cmd, device: device.clone() })
    }

    /// Reset the pool and begin recording a one-time command buffer.
    pub fn begin(&self) -> Result<vk::CommandBuffer> {
        unsafe {
            self.device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
            let begin_info =
                vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(self.cmd, &begin_info)?;
        }
        Ok(self.cmd)
    }

    pub fn end(&self) -> Result<vk::CommandBuffer> {
        unsafe { self.device.end_command_buffer(self.cmd)? };
        Ok(self.cmd)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// Submits commands to a queue and blocks on a fence until they complete.
pub struct ImmediateCommandEncoder {
    device: ash::Device,
    queue: vk::Queue,
    pool: CommandPool,
    fence: Fence,
}

impl ImmediateCommandEncoder {
    pub fn new(device: &ash::Device, queue: vk::Queue, queue_family: u32) -> Result<Self> {
        Ok(Self {
            device: device.clone(),
            queue,
            pool: CommandPool::new(device, queue_family)?,
            fence: Fence::new(device, false)?,
        })
    }

    pub fn submit_and_wait<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let cmd = self.pool.begin()?;
        record(&self.device, cmd);
        let cmd = self.pool.end()?;

        let cmd_info = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];
        let submit_info = vk::SubmitInfo2::default().command_buffer_infos(&cmd_info);

        unsafe { self.device.queue_submit2(self.queue, &[submit_info], self.fence.handle())? };
        self.fence.wait(u64::MAX)?;
        self.fence.reset()
    }
}

/// The images a command list renders into.
pub struct RenderTarget {
    pub color: vk::Image,
    pub color_view: vk::ImageView,
    pub depth: Option<(vk::Image, vk::ImageView, vk::ImageAspectFlags)>,
    pub extent: vk::Extent2D,
}

/// Backend objects referenced by recorded commands.
pub struct ResourceTables<'a> {
    pub pipelines: &'a SlotMap<PipelineId, GraphicPipeline>,
    pub bind_groups: &'a SlotMap<BindGroupId, DescriptorSet>,
    pub buffers: &'a SlotMap<BufferId, Buffer>,
}

/// Translate `list` into `cmd`, leaving the color image ready to present.
#[profiling::function]
pub fn record_command_list(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    list: &CommandList,
    target: &RenderTarget,
    tables: &ResourceTables,
) -> Result<()> {
    transition_image(
        device,
        cmd,
        target.color,
        vk::ImageAspectFlags::COLOR,
        ImageState::Undefined,
        ImageState::ColorAttachment,
    );
    if let Some((image, _, aspect)) = target.depth {
        transition_image(device, cmd, image, aspect, ImageState::Undefined, ImageState::DepthAttachment);
    }

    let mut layout = None;
    for command in &list.commands {
        match command {
            RenderCommand::BeginRenderPass(desc) => {
                let color = vk::RenderingAttachmentInfo::default()
                    .image_view(target.color_view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .store_op(vk::AttachmentStoreOp::STORE);
                let color = match desc.color {
                    LoadOp::Clear(rgba) => color
                        .load_op(vk::AttachmentLoadOp::CLEAR)
                        .clear_value(vk::ClearValue { color: vk::ClearColorValue { float32: rgba } }),
                    LoadOp::Load => color.load_op(vk::AttachmentLoadOp::LOAD),
                };
                let color_attachments = [color];

                let depth = match (desc.depth, target.depth) {
                    (Some(load), Some((_, view, _))) => {
                        let depth = vk::RenderingAttachmentInfo::default()
                            .image_view(view)
                            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                            .store_op(vk::AttachmentStoreOp::DONT_CARE);
                        Some(match load {
                            LoadOp::Clear(value) => depth.load_op(vk::AttachmentLoadOp::CLEAR).clear_value(
                                vk::ClearValue {
                                    depth_stencil: vk::ClearDepthStencilValue { depth: value, stencil: 0 },
                                },
                            ),
                            LoadOp::Load => depth.load_op(vk::AttachmentLoadOp::LOAD),
                        })
                    }
                    (Some(_), None) => {
                        return Err(GpuError::RenderPass("surface has no depth attachment".into()));
                    }
                    (None, _) => None,
                };

                let render_area = vk::Rect2D { offset: vk::Offset2D::default(), extent: target.extent };
                let mut rendering_info = vk::RenderingInfo::default()
                    .render_area(render_area)
                    .layer_count(1)
                    .color_attachments(&color_attachments);
                if let Some(depth) = depth.as_ref() {
                    rendering_info = rendering_info.depth_attachment(depth);
                }

                let viewport = vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: target.extent.width as f32,
                    height: target.extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                unsafe {
                    device.cmd_begin_rendering(cmd, &rendering_info);
                    device.cmd_set_viewport(cmd, 0, &[viewport]);
                    device.cmd_set_scissor(cmd, 0, &[render_area]);
                }
            }
            RenderCommand::EndRenderPass => unsafe {
                device.cmd_end_rendering(cmd);
                layout = None;
            },
            RenderCommand::BindPipeline(id) => {
                let pipeline = &tables.pipelines[*id];
                unsafe { device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle()) };
                layout = Some(pipeline.layout());
            }
            RenderCommand::BindGroup { index, group, dynamic_offsets } => {
                let layout = layout.ok_or_else(|| GpuError::RenderPass("bind group without a pipeline".into()))?;
                let set = tables.bind_groups[*group].set;
                unsafe {
                    device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        layout,
                        *index,
                        &[set],
                        dynamic_offsets,
                    )
                };
            }
            RenderCommand::BindVertexBuffer { slot, buffer, offset } => unsafe {
                device.cmd_bind_vertex_buffers(cmd, *slot, &[tables.buffers[*buffer].handle()], &[*offset]);
            },
            RenderCommand::BindIndexBuffer { buffer, offset, format } => unsafe {
                device.cmd_bind_index_buffer(cmd, tables.buffers[*buffer].handle(), *offset, to_vk_index_type(*format));
            },
            RenderCommand::Draw { vertices, instances } => unsafe {
                device.cmd_draw(cmd, vertices.len() as u32, instances.len() as u32, vertices.start, instances.start);
            },
            RenderCommand::DrawIndexed { indices, base_vertex, instances } => unsafe {
                device.cmd_draw_indexed(
                    cmd,
                    indices.len() as u32,
                    instances.len() as u32,
                    indices.start,
                    *base_vertex,
                    instances.start,
                );
            },
        }
    }

    transition_image(
        device,
        cmd,
        target.color,
        vk::ImageAspectFlags::COLOR,
        ImageState::ColorAttachment,
        ImageState::Present,
    );
    Ok(())
}

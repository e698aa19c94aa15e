//! Shader modules and graphics pipelines built for dynamic rendering.

use std::ffi::CString;
use ash::vk;
use lumen_rhi_derive::DeviceObject;
use crate::error::{GpuError, Result};
use crate::shader::ShaderModule;
use crate::types::{BlendMode, PipelineDesc};
use super::utility::*;

#[DeviceObject]
pub struct Shader {
    module: vk::ShaderModule,
}

impl Shader {
    pub fn new(device: &ash::Device, module: &ShaderModule) -> Result<Self> {
        let words = module.to_spirv()?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { device.create_shader_module(&create_info, None)? };
        Ok(Self { module, device: device.clone() })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

/// Resolved shader modules and set layouts for a [`PipelineDesc`].
pub struct GraphicPipelineInfo<'a> {
    pub desc: &'a PipelineDesc,
    pub vertex: vk::ShaderModule,
    pub fragment: Option<vk::ShaderModule>,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
}

#[DeviceObject]
pub struct GraphicPipeline {
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl GraphicPipeline {
    #[profiling::function]
    pub fn new(device: &ash::Device, info: &GraphicPipelineInfo) -> Result<Self> {
        let desc = info.desc;

        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&info.set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let to_name = |entry: &str| {
            CString::new(entry).map_err(|_| GpuError::config(desc.label.as_str(), "entry point name contains a NUL byte"))
        };
        let vertex_name = to_name(&desc.vertex.entry)?;
        let fragment_name = desc.fragment.as_ref().map(|f| to_name(&f.entry)).transpose()?;

        let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(info.vertex)
            .name(&vertex_name)];
        if let (Some(module), Some(name)) = (info.fragment, fragment_name.as_ref()) {
            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(module)
                    .name(name),
            );
        }

        let bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_buffers
            .iter()
            .map(|vb| vk::VertexInputBindingDescription {
                binding: vb.slot,
                stride: vb.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_buffers
            .iter()
            .flat_map(|vb| {
                vb.attributes.iter().map(move |attr| vk::VertexInputAttributeDescription {
                    location: attr.location,
                    binding: vb.slot,
                    format: to_vk_vertex_format(attr.format),
                    offset: attr.offset,
                })
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(to_vk_topology(desc.topology));

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(to_vk_cull_mode(desc.cull_mode))
            .front_face(to_vk_front_face(desc.front_face))
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachment = match desc.blend {
            BlendMode::Replace => vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA),
            BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA),
        };
        let blend_attachments = [blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [to_vk_format(desc.color_format)];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
        if let Some(depth_format) = desc.depth_format {
            rendering_info = rendering_info.depth_attachment_format(to_vk_format(depth_format));
        }

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);
        if desc.depth_format.is_some() {
            pipeline_info = pipeline_info.depth_stencil_state(&depth_stencil);
        }

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(err.into());
            }
        };

        log::debug!("Created graphics pipeline {}.", desc.label);
        Ok(Self { layout, pipeline, device: device.clone() })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

use std::rc::Rc;
use log::{debug, info};
use lumen_rhi::{CommandList, Format, GpuError, LoadOp, RenderCommand, RenderPassDesc, Result, SurfaceId};
use crate::device::{Device, DeviceShared};
use crate::memory::Memory;
use crate::pipeline::{Pipeline, PipelineState};
use crate::surface::{Frame, Surface};
use crate::vars::Vars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadAction {
    #[default]
    Clear,
    Load,
}

/// Attachment formats and load behaviour shared by every render pass of a system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    pub color_format: Format,
    pub depth_format: Option<Format>,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub color_load: LoadAction,
    pub depth_load: LoadAction,
    pub sample_count: u32,
}

impl RenderConfig {
    /// Clear to opaque black and to the far depth plane, matching the formats of `surface`.
    pub fn for_surface(surface: &Surface) -> Self {
        Self {
            color_format: surface.format(),
            depth_format: surface.depth_format(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            color_load: LoadAction::Clear,
            depth_load: LoadAction::Clear,
            sample_count: 1,
        }
    }

    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }
}

/// Commands of one render pass under recording.
#[derive(Debug)]
pub struct CommandEncoder {
    surface: SurfaceId,
    image_index: u32,
    commands: Vec<RenderCommand>,
    /// Index of the bound pipeline in its system.
    pipeline: Option<usize>,
    vars_bound: bool,
}

impl CommandEncoder {
    #[inline]
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Draw { .. } | RenderCommand::DrawIndexed { .. }))
            .count()
    }
}

/// Pipelines sharing one set of variables and one render configuration.
pub struct System {
    device: Rc<DeviceShared>,
    name: String,
    memory: Memory,
    pipelines: Vec<Pipeline>,
    render: Option<RenderConfig>,
}

impl System {
    pub fn new(device: &Device, name: &str) -> Self {
        Self {
            device: device.shared().clone(),
            name: name.to_owned(),
            memory: Memory::new(device, name),
            pipelines: Vec::new(),
            render: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vars(&self) -> &Vars {
        self.memory.vars()
    }

    #[inline]
    pub fn vars_mut(&mut self) -> &mut Vars {
        self.memory.vars_mut()
    }

    #[inline]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    #[inline]
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn add_pipeline(&mut self, name: &str) -> Result<&mut Pipeline> {
        if self.pipelines.iter().any(|pipeline| pipeline.name() == name) {
            return Err(GpuError::config(
                format!("system `{}`", self.name),
                format!("pipeline `{name}` already exists"),
            ));
        }
        self.pipelines.push(Pipeline::new(name));
        let last = self.pipelines.len() - 1;
        Ok(&mut self.pipelines[last])
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|pipeline| pipeline.name() == name)
    }

    pub fn pipeline_mut(&mut self, name: &str) -> Result<&mut Pipeline> {
        let index = self.pipeline_index(name)?;
        Ok(&mut self.pipelines[index])
    }

    fn pipeline_index(&self, name: &str) -> Result<usize> {
        self.pipelines
            .iter()
            .position(|pipeline| pipeline.name() == name)
            .ok_or_else(|| GpuError::config(format!("system `{}`", self.name), format!("no pipeline `{name}`")))
    }

    /// Fix attachment formats, clear values and load operations. Allowed once.
    pub fn config_render(&mut self, config: RenderConfig) -> Result<()> {
        if self.render.is_some() {
            return Err(GpuError::AlreadyConfigured {
                what: format!("render configuration of system `{}`", self.name),
            });
        }
        if config.sample_count != 1 {
            return Err(GpuError::Unsupported(format!("{} samples per pixel", config.sample_count)));
        }
        self.render = Some(config);
        Ok(())
    }

    #[inline]
    pub fn render_config(&self) -> Option<&RenderConfig> {
        self.render.as_ref()
    }

    fn require_render(&self) -> Result<RenderConfig> {
        self.render.ok_or_else(|| GpuError::NotConfigured {
            what: format!("render configuration of system `{}`", self.name),
        })
    }

    /// True once memory is allocated and every pipeline is configured.
    pub fn is_configured(&self) -> bool {
        self.memory.is_configured() && self.pipelines.iter().all(|p| p.state() == PipelineState::Configured)
    }

    /// Configure memory for the current value counts and every pipeline that is not configured yet.
    ///
    /// Fails with `AlreadyConfigured` when there is nothing left to configure; use
    /// [`System::reconfig_memory`] to reallocate for new value counts.
    #[profiling::function]
    pub fn config(&mut self) -> Result<()> {
        let render = self.require_render()?;
        if self.is_configured() {
            return Err(GpuError::AlreadyConfigured {
                what: format!("system `{}`", self.name),
            });
        }
        self.memory.config()?;
        for pipeline in &mut self.pipelines {
            if pipeline.state() != PipelineState::Configured {
                pipeline.config(&self.device, &self.memory, &render)?;
            }
        }
        info!("System `{}` configured with {} pipeline(s)", self.name, self.pipelines.len());
        Ok(())
    }

    /// Reallocate memory for the current value counts, keeping pipelines as they are.
    #[profiling::function]
    pub fn reconfig_memory(&mut self) -> Result<()> {
        self.require_render()?;
        if !self.memory.is_configured() {
            return Err(GpuError::NotConfigured {
                what: format!("memory of system `{}`", self.name),
            });
        }
        self.memory.config()?;
        debug!("memory of system `{}` reconfigured", self.name);
        Ok(())
    }

    /// Configure one pipeline. Fails if it is already configured.
    pub fn config_pipeline(&mut self, name: &str) -> Result<()> {
        let render = self.require_render()?;
        let index = self.pipeline_index(name)?;
        self.pipelines[index].config(&self.device, &self.memory, &render)
    }

    pub fn release_pipeline(&mut self, name: &str) -> Result<()> {
        let index = self.pipeline_index(name)?;
        self.pipelines[index].release(&self.device);
        debug!("pipeline `{name}` of system `{}` released", self.name);
        Ok(())
    }

    /// Copy dirty values to the GPU. Returns the number of values copied.
    pub fn sync_to_gpu(&mut self) -> Result<usize> {
        self.memory.sync_to_gpu()
    }

    /// Start recording a render pass into `frame`.
    #[profiling::function]
    pub fn begin_render_pass(&self, frame: &Frame) -> Result<CommandEncoder> {
        let render = self.require_render()?;
        if render.color_format != frame.format() || render.depth_format != frame.depth_format() {
            return Err(GpuError::RenderPass(format!(
                "system `{}` renders to {:?}/{:?} but the frame is {:?}/{:?}",
                self.name,
                render.color_format,
                render.depth_format,
                frame.format(),
                frame.depth_format()
            )));
        }

        let color = match render.color_load {
            LoadAction::Clear => LoadOp::Clear(render.clear_color),
            LoadAction::Load => LoadOp::Load,
        };
        let depth = render.depth_format.map(|_| match render.depth_load {
            LoadAction::Clear => LoadOp::Clear(render.clear_depth),
            LoadAction::Load => LoadOp::Load,
        });

        Ok(CommandEncoder {
            surface: frame.surface(),
            image_index: frame.index(),
            commands: vec![RenderCommand::BeginRenderPass(RenderPassDesc {
                surface: frame.surface(),
                image_index: frame.index(),
                size: frame.size(),
                color,
                depth,
            })],
            pipeline: None,
            vars_bound: false,
        })
    }

    pub fn bind_pipeline(&self, encoder: &mut CommandEncoder, name: &str) -> Result<()> {
        let index = self
            .pipeline_index(name)
            .map_err(|_| GpuError::RenderPass(format!("unknown pipeline `{name}`")))?;
        let handle = self.pipelines[index].handle()?;
        encoder.commands.push(RenderCommand::BindPipeline(handle));
        encoder.pipeline = Some(index);
        encoder.vars_bound = false;
        Ok(())
    }

    /// Bind the selected value of every variable.
    pub fn bind_vars(&self, encoder: &mut CommandEncoder) -> Result<()> {
        if encoder.pipeline.is_none() {
            return Err(GpuError::RenderPass("variables bound before a pipeline".to_owned()));
        }
        let commands = self.memory.bind_commands()?;
        encoder.commands.extend(commands);
        encoder.vars_bound = true;
        Ok(())
    }

    fn check_drawable(&self, encoder: &CommandEncoder) -> Result<()> {
        let Some(index) = encoder.pipeline else {
            return Err(GpuError::RenderPass("draw without a bound pipeline".to_owned()));
        };
        self.pipelines[index].handle()?;
        if !encoder.vars_bound {
            return Err(GpuError::RenderPass("draw before the variables were bound".to_owned()));
        }
        Ok(())
    }

    pub fn draw(&self, encoder: &mut CommandEncoder, vertex_count: u32) -> Result<()> {
        self.check_drawable(encoder)?;
        encoder.commands.push(RenderCommand::Draw {
            vertices: 0..vertex_count,
            instances: 0..1,
        });
        Ok(())
    }

    /// Draw the selected index value.
    pub fn draw_indexed(&self, encoder: &mut CommandEncoder) -> Result<()> {
        self.check_drawable(encoder)?;
        let count = self
            .memory
            .index_count()
            .ok_or_else(|| GpuError::RenderPass(format!("system `{}` has no index variable", self.name)))?;
        encoder.commands.push(RenderCommand::DrawIndexed {
            indices: 0..count,
            base_vertex: 0,
            instances: 0..1,
        });
        Ok(())
    }

    pub fn bind_draw_indexed(&self, encoder: &mut CommandEncoder, pipeline: &str) -> Result<()> {
        self.bind_pipeline(encoder, pipeline)?;
        self.bind_vars(encoder)?;
        self.draw_indexed(encoder)
    }

    /// Finish the pass and hand out the command list for submission.
    pub fn end_render_pass(&self, mut encoder: CommandEncoder) -> Result<CommandList> {
        encoder.commands.push(RenderCommand::EndRenderPass);
        Ok(CommandList {
            surface: encoder.surface,
            image_index: encoder.image_index,
            commands: encoder.commands,
        })
    }

    /// Release pipelines, memory and layouts. Destruction waits for frames still using them.
    pub fn release(self) {}
}

impl Drop for System {
    fn drop(&mut self) {
        for pipeline in &mut self.pipelines {
            pipeline.release(&self.device);
        }
        debug!("system `{}` released", self.name);
    }
}

use log::info;
use lumen_rhi::{
    BlendMode, CullMode, FrontFace, GpuError, PipelineDesc, PipelineId, PrimitiveTopology, ResourceBinding,
    ResourceKind, Result, ShaderEntry, ShaderModule, ShaderModuleId, ShaderSource, ShaderStage,
};
use crate::device::{DeviceShared, Garbage};
use crate::memory::Memory;
use crate::system::RenderConfig;
use crate::vars::{VarRole, Vars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unconfigured,
    Configured,
    Released,
}

#[derive(Debug, Clone)]
struct PipelineEntry {
    shader: String,
    stage: ShaderStage,
    entry: String,
}

#[derive(Debug)]
struct PipelineObjects {
    pipeline: PipelineId,
    modules: Vec<ShaderModuleId>,
}

/// Shader stages and fixed-function state of one graphics pipeline.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    shaders: Vec<(String, ShaderSource)>,
    entries: Vec<PipelineEntry>,
    topology: PrimitiveTopology,
    cull_mode: CullMode,
    front_face: FrontFace,
    blend: BlendMode,
    state: PipelineState,
    objects: Option<PipelineObjects>,
}

impl Pipeline {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            shaders: Vec::new(),
            entries: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            blend: BlendMode::Replace,
            state: PipelineState::Unconfigured,
            objects: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn what(&self) -> String {
        format!("pipeline `{}`", self.name)
    }

    fn check_unconfigured(&self) -> Result<()> {
        match self.state {
            PipelineState::Unconfigured => Ok(()),
            _ => Err(GpuError::AlreadyConfigured { what: self.what() }),
        }
    }

    /// Register shader code under `name`.
    pub fn add_shader(&mut self, name: &str, source: ShaderSource) -> Result<&mut Self> {
        self.check_unconfigured()?;
        if self.shaders.iter().any(|(existing, _)| existing == name) {
            return Err(GpuError::config(self.what(), format!("shader `{name}` is already registered")));
        }
        self.shaders.push((name.to_owned(), source));
        Ok(self)
    }

    /// Use entry point `entry` of shader `shader` for `stage`.
    pub fn add_entry(&mut self, shader: &str, stage: ShaderStage, entry: &str) -> Result<&mut Self> {
        self.check_unconfigured()?;
        if self.entries.iter().any(|existing| existing.stage == stage) {
            return Err(GpuError::config(self.what(), format!("a {stage:?} entry point is already registered")));
        }
        self.entries.push(PipelineEntry {
            shader: shader.to_owned(),
            stage,
            entry: entry.to_owned(),
        });
        Ok(self)
    }

    pub fn set_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.topology = topology;
        self
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) -> &mut Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) -> &mut Self {
        self.front_face = front_face;
        self
    }

    pub fn set_blend(&mut self, blend: BlendMode) -> &mut Self {
        self.blend = blend;
        self
    }

    fn entry(&self, stage: ShaderStage) -> Option<&PipelineEntry> {
        self.entries.iter().find(|entry| entry.stage == stage)
    }

    /// Validate shaders against the variables of `memory` and build the backend pipeline.
    #[profiling::function]
    pub(crate) fn config(&mut self, device: &DeviceShared, memory: &Memory, render: &RenderConfig) -> Result<()> {
        if self.state == PipelineState::Configured {
            return Err(GpuError::AlreadyConfigured { what: self.what() });
        }
        if !memory.is_configured() {
            return Err(GpuError::NotConfigured { what: format!("memory of {}", self.what()) });
        }
        if self.entry(ShaderStage::Compute).is_some() {
            return Err(GpuError::Unsupported(format!("compute entry point in {}", self.what())));
        }
        let vertex = self
            .entry(ShaderStage::Vertex)
            .ok_or_else(|| GpuError::config(self.what(), "no vertex entry point"))?;

        let mut modules: Vec<(&str, ShaderModule)> = Vec::new();
        for entry in &self.entries {
            if modules.iter().any(|(name, _)| *name == entry.shader) {
                continue;
            }
            let (name, source) = self
                .shaders
                .iter()
                .find(|(name, _)| *name == entry.shader)
                .ok_or_else(|| GpuError::config(self.what(), format!("unknown shader `{}`", entry.shader)))?;
            let module = ShaderModule::parse(&format!("{}/{name}", self.name), source)?;
            modules.push((name.as_str(), module));
        }
        let module_of = |shader: &str| modules.iter().position(|(name, _)| *name == shader);

        for entry in &self.entries {
            let Some(index) = module_of(&entry.shader) else { continue };
            let reflection = modules[index].1.reflection();
            let info = reflection.entry_point(&entry.entry).ok_or_else(|| {
                GpuError::config(self.what(), format!("shader `{}` has no entry point `{}`", entry.shader, entry.entry))
            })?;
            if info.stage != entry.stage {
                return Err(GpuError::config(
                    self.what(),
                    format!("`{}` is a {:?} entry point, declared as {:?}", entry.entry, info.stage, entry.stage),
                ));
            }
        }

        let vars = memory.vars();
        for (shader, module) in &modules {
            for resource in &module.reflection().resources {
                if let Some(problem) = unmatched_resource(vars, resource) {
                    return Err(GpuError::config(self.what(), format!("shader `{shader}` {problem}")));
                }
            }
        }

        let vertex_module = &modules[module_of(&vertex.shader).unwrap_or_default()].1;
        if let Some(info) = vertex_module.reflection().entry_point(&vertex.entry) {
            for location in &info.vertex_inputs {
                let fed = vars.vertex_set().vars().iter().any(|var| var.feeds_location(*location));
                if !fed {
                    return Err(GpuError::config(
                        self.what(),
                        format!("vertex input @location({location}) matches no vertex variable"),
                    ));
                }
            }
        }

        let mut ids = Vec::with_capacity(modules.len());
        for (_, module) in &modules {
            let created = device.backend().create_shader_module(module);
            match created {
                Ok(id) => ids.push(id),
                Err(err) => {
                    destroy_modules(device, ids);
                    return Err(err);
                }
            }
        }

        let stage_entry = |entry: &PipelineEntry| ShaderEntry {
            module: ids[module_of(&entry.shader).unwrap_or_default()],
            entry: entry.entry.clone(),
        };
        let desc = PipelineDesc {
            label: self.name.clone(),
            vertex: stage_entry(vertex),
            fragment: self.entry(ShaderStage::Fragment).map(stage_entry),
            bind_group_layouts: memory.layouts().to_vec(),
            vertex_buffers: memory.vertex_buffer_layouts(),
            topology: self.topology,
            cull_mode: self.cull_mode,
            front_face: self.front_face,
            blend: self.blend,
            color_format: render.color_format,
            depth_format: render.depth_format,
            sample_count: render.sample_count,
        };

        let created = device.backend().create_pipeline(&desc);
        let pipeline = match created {
            Ok(pipeline) => pipeline,
            Err(err) => {
                destroy_modules(device, ids);
                return Err(err);
            }
        };

        self.objects = Some(PipelineObjects { pipeline, modules: ids });
        self.state = PipelineState::Configured;
        info!("Pipeline `{}` configured ({} shader module(s))", self.name, modules.len());
        Ok(())
    }

    /// Free the backend objects. Binding the pipeline afterwards fails until it is configured again.
    pub(crate) fn release(&mut self, device: &DeviceShared) {
        if let Some(objects) = self.objects.take() {
            device.retire(Garbage::Pipeline(objects.pipeline));
            for module in objects.modules {
                device.retire(Garbage::ShaderModule(module));
            }
        }
        self.state = PipelineState::Released;
    }

    pub(crate) fn handle(&self) -> Result<PipelineId> {
        match (&self.state, &self.objects) {
            (PipelineState::Configured, Some(objects)) => Ok(objects.pipeline),
            (PipelineState::Released, _) => Err(GpuError::Released { what: self.what() }),
            _ => Err(GpuError::NotConfigured { what: self.what() }),
        }
    }
}

fn destroy_modules(device: &DeviceShared, modules: Vec<ShaderModuleId>) {
    let mut backend = device.backend();
    for module in modules {
        backend.destroy_shader_module(module);
    }
}

/// Describe why `resource` has no matching variable, if it has none.
fn unmatched_resource(vars: &Vars, resource: &ResourceBinding) -> Option<String> {
    let (group, binding) = (resource.group, resource.binding);
    let Some(set) = vars.set(group) else {
        return Some(format!("uses @group({group}) @binding({binding}) but there is no set {group}"));
    };
    let matched = set.vars().iter().any(|var| match resource.kind {
        ResourceKind::Uniform => var.role() == VarRole::Uniform && var.binding() == binding,
        ResourceKind::Storage => var.role() == VarRole::Storage && var.binding() == binding,
        ResourceKind::Texture => var.role() == VarRole::Texture && var.binding() == binding,
        ResourceKind::Sampler => var.role() == VarRole::Texture && var.binding() + 1 == binding,
    });
    (!matched).then(|| {
        format!(
            "uses a {:?} at @group({group}) @binding({binding}) which matches no variable",
            resource.kind
        )
    })
}
